//! Value overrides: values files, `--set` style assignments and coalescing
//!
//! Values are plain JSON-style maps. Files are YAML and are parsed straight into
//! that representation so numbers, booleans and nesting survive unchanged.

pub mod strvals;

use crate::transport::{build_http_client, TlsFiles, TransportError};
use serde_json::{Map, Value};
use std::io::Read;
use thiserror::Error;
use tracing::debug;

pub use strvals::{StrvalsError, ValueMode};

/// A values mapping (chart defaults, stored release config or overrides)
pub type Values = Map<String, Value>;

/// Image override keys that address a single variant during a rollout
pub const IMAGE_KEYS: [&str; 2] = ["image.repository", "image.tag"];

#[derive(Debug, Error)]
pub enum ValuesError {
    #[error("failed to parse {source_name}: {message}")]
    Parse { source_name: String, message: String },

    #[error("{0}: values must be a mapping at the top level")]
    NotAMapping(String),

    #[error("cannot read values file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch values from {url}: {message}")]
    Fetch { url: String, message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed parsing --{flag} data: {source}")]
    Set {
        flag: &'static str,
        #[source]
        source: StrvalsError,
    },

    #[error("failed to render values: {0}")]
    Render(String),
}

/// Parse a YAML document into a values map
///
/// An empty document yields an empty map.
pub fn read_values(source_name: &str, yaml: &str) -> Result<Values, ValuesError> {
    if yaml.trim().is_empty() {
        return Ok(Map::new());
    }
    let value: Value = serde_yaml::from_str(yaml).map_err(|e| ValuesError::Parse {
        source_name: source_name.to_string(),
        message: e.to_string(),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(ValuesError::NotAMapping(source_name.to_string())),
    }
}

/// Render a values map as YAML
pub fn to_yaml(values: &Values) -> Result<String, ValuesError> {
    serde_yaml::to_string(values).map_err(|e| ValuesError::Render(e.to_string()))
}

/// Deep merge `src` into `dest`
///
/// Maps present on both sides are merged recursively; anything else in `src`
/// replaces the value in `dest`.
pub fn merge_values(dest: &mut Values, src: Values) {
    for (key, value) in src {
        if let Value::Object(incoming) = value {
            if let Some(Value::Object(existing)) = dest.get_mut(&key) {
                merge_values(existing, incoming);
                continue;
            }
            dest.insert(key, Value::Object(incoming));
        } else {
            dest.insert(key, value);
        }
    }
}

/// Coalesce stored release config over chart defaults
///
/// Config wins. A `null` in config removes the default key entirely.
pub fn coalesce(defaults: &Values, config: &Values) -> Values {
    let mut out = defaults.clone();
    coalesce_into(&mut out, config);
    out
}

fn coalesce_into(dest: &mut Values, config: &Values) {
    for (key, value) in config {
        match value {
            Value::Null => {
                dest.remove(key);
            }
            Value::Object(incoming) => {
                if let Some(Value::Object(existing)) = dest.get_mut(key) {
                    coalesce_into(existing, incoming);
                    continue;
                }
                let mut fresh = Map::new();
                coalesce_into(&mut fresh, incoming);
                dest.insert(key.clone(), Value::Object(fresh));
            }
            _ => {
                dest.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Prefix the image keys of one `--set` entry with `variant`
///
/// Only whole keys match; values and other keys are left alone.
pub fn rewrite_image_keys(entry: &str, variant: &str) -> String {
    strvals::rewrite_keys(entry, |key| {
        IMAGE_KEYS
            .iter()
            .any(|k| *k == key)
            .then(|| format!("{}.{}", variant, key))
    })
}

/// Every user-supplied source of value overrides, in CLI order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueSources {
    /// `-f/--values`: local paths, `-` for stdin, or http(s) URLs
    pub value_files: Vec<String>,
    /// `--set`
    pub set: Vec<String>,
    /// `--set-string`
    pub set_string: Vec<String>,
    /// `--set-file`
    pub set_file: Vec<String>,
}

impl ValueSources {
    /// Copy of these sources with one extra `--set` entry appended
    pub fn with_set(&self, entry: impl Into<String>) -> Self {
        let mut sources = self.clone();
        sources.set.push(entry.into());
        sources
    }

    /// Move image overrides in `--set` and `--set-string` under `variant`
    pub fn rewrite_image_keys(&mut self, variant: &str) {
        for entry in self.set.iter_mut().chain(self.set_string.iter_mut()) {
            *entry = rewrite_image_keys(entry, variant);
        }
    }

    /// Merge every source into one values map
    ///
    /// Files are merged first in order, then `--set`, `--set-string` and
    /// `--set-file`, so later sources win.
    pub async fn build(&self, tls: &TlsFiles) -> Result<Values, ValuesError> {
        let mut base = Map::new();

        for file in &self.value_files {
            let content = read_source(file, tls).await?;
            let values = read_values(file, &content)?;
            debug!(source = %file, keys = values.len(), "Merged values file");
            merge_values(&mut base, values);
        }

        for (flag, entries, mode) in [
            ("set", &self.set, ValueMode::Typed),
            ("set-string", &self.set_string, ValueMode::String),
            ("set-file", &self.set_file, ValueMode::File),
        ] {
            for entry in entries {
                strvals::parse_into(entry, &mut base, mode)
                    .map_err(|source| ValuesError::Set { flag, source })?;
            }
        }

        Ok(base)
    }
}

async fn read_source(file: &str, tls: &TlsFiles) -> Result<String, ValuesError> {
    if file == "-" {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .map_err(|source| ValuesError::Read {
                path: file.to_string(),
                source,
            })?;
        return Ok(content);
    }

    if file.starts_with("http://") || file.starts_with("https://") {
        let client = build_http_client(tls, false)?;
        let fetch_err = |e: reqwest::Error| ValuesError::Fetch {
            url: file.to_string(),
            message: e.to_string(),
        };
        let response = client
            .get(file)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_err)?;
        return response.text().await.map_err(fetch_err);
    }

    tokio::fs::read_to_string(file)
        .await
        .map_err(|source| ValuesError::Read {
            path: file.to_string(),
            source,
        })
}
