//! Parser for `--set` style value assignments
//!
//! Grammar (one argument may hold several assignments separated by commas):
//! - `a.b.c=value` nested keys
//! - `list={x,y,z}` list values
//! - `list[2]=value` or `list[0].name=value` indexed assignment
//! - `\,` `\.` `\=` `\\` escapes
//!
//! How the right hand side is interpreted depends on [`ValueMode`].

use super::Values;
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

/// Largest list index accepted in `key[n]` assignments
pub const MAX_INDEX: usize = 65_536;

#[derive(Debug, Error)]
pub enum StrvalsError {
    #[error("key {0:?} has no value")]
    MissingValue(String),

    #[error("key map {0:?} has no value")]
    EmptyKey(String),

    #[error("invalid list index in {0:?}")]
    InvalidIndex(String),

    #[error("list index {index} in {key:?} exceeds maximum of {max}", max = MAX_INDEX)]
    IndexTooLarge { key: String, index: usize },

    #[error("unterminated list value for key {0:?}")]
    UnterminatedList(String),

    #[error("cannot read value file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How assignment values are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMode {
    /// `--set`: infer booleans, null and integers
    Typed,
    /// `--set-string`: keep every value as a string
    String,
    /// `--set-file`: the value names a file whose content becomes the value
    File,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(String, usize),
}

/// Parse `input` and apply every assignment to `dest`
pub fn parse_into(input: &str, dest: &mut Values, mode: ValueMode) -> Result<(), StrvalsError> {
    for assignment in split_unescaped(input, ',') {
        if assignment.is_empty() {
            continue;
        }
        let (raw_key, raw_value) = split_once_unescaped(assignment, '=')
            .ok_or_else(|| StrvalsError::MissingValue(unescape(assignment)))?;
        if raw_key.is_empty() {
            return Err(StrvalsError::EmptyKey(unescape(assignment)));
        }
        let path = parse_key(raw_key)?;
        let value = parse_value(raw_key, raw_value, mode)?;
        set_path(dest, &path, value)?;
    }
    Ok(())
}

/// Rewrite selected keys of every assignment in `input`
///
/// `rename` receives the raw key and returns a replacement, or `None` to keep it.
pub fn rewrite_keys<F>(input: &str, rename: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    split_unescaped(input, ',')
        .into_iter()
        .map(|assignment| match split_once_unescaped(assignment, '=') {
            Some((key, value)) => match rename(key) {
                Some(new_key) => format!("{}={}", new_key, value),
                None => assignment.to_string(),
            },
            None => assignment.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_key(raw_key: &str) -> Result<Vec<Segment>, StrvalsError> {
    split_unescaped(raw_key, '.')
        .into_iter()
        .map(|part| {
            if part.is_empty() {
                return Err(StrvalsError::EmptyKey(unescape(raw_key)));
            }
            match part.strip_suffix(']').and_then(|p| p.rsplit_once('[')) {
                Some((name, index)) => {
                    let index: usize = index
                        .parse()
                        .map_err(|_| StrvalsError::InvalidIndex(unescape(raw_key)))?;
                    if index > MAX_INDEX {
                        return Err(StrvalsError::IndexTooLarge {
                            key: unescape(raw_key),
                            index,
                        });
                    }
                    if name.is_empty() {
                        return Err(StrvalsError::EmptyKey(unescape(raw_key)));
                    }
                    Ok(Segment::Index(unescape(name), index))
                }
                None => Ok(Segment::Key(unescape(part))),
            }
        })
        .collect()
}

fn parse_value(raw_key: &str, raw_value: &str, mode: ValueMode) -> Result<Value, StrvalsError> {
    if raw_value.starts_with('{') {
        let inner = raw_value
            .strip_prefix('{')
            .and_then(|v| v.strip_suffix('}'))
            .ok_or_else(|| StrvalsError::UnterminatedList(unescape(raw_key)))?;
        if inner.is_empty() {
            return Ok(Value::Array(vec![]));
        }
        return split_unescaped(inner, ',')
            .into_iter()
            .map(|item| scalar(&unescape(item), mode))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    scalar(&unescape(raw_value), mode)
}

fn scalar(value: &str, mode: ValueMode) -> Result<Value, StrvalsError> {
    match mode {
        ValueMode::String => Ok(Value::String(value.to_string())),
        ValueMode::Typed => Ok(typed_value(value)),
        ValueMode::File => {
            let path = PathBuf::from(value);
            std::fs::read_to_string(&path)
                .map(Value::String)
                .map_err(|source| StrvalsError::ReadFile { path, source })
        }
    }
}

/// Infer the type of a `--set` value
///
/// Numbers with a leading zero stay strings so values like `0755` or `007`
/// are not silently reinterpreted.
pub fn typed_value(value: &str) -> Value {
    if value.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if value.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if value != "0" && value.starts_with('0') {
        return Value::String(value.to_string());
    }
    match value.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::String(value.to_string()),
    }
}

fn set_path(dest: &mut Values, path: &[Segment], value: Value) -> Result<(), StrvalsError> {
    match path {
        [] => Ok(()),
        [Segment::Key(key)] => {
            dest.insert(key.clone(), value);
            Ok(())
        }
        [Segment::Key(key), rest @ ..] => {
            let entry = dest
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            match entry {
                Value::Object(inner) => set_path(inner, rest, value),
                _ => Ok(()),
            }
        }
        [Segment::Index(key, index), rest @ ..] => {
            let entry = dest
                .entry(key.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !entry.is_array() {
                *entry = Value::Array(Vec::new());
            }
            let Value::Array(list) = entry else {
                return Ok(());
            };
            if list.len() <= *index {
                list.resize(*index + 1, Value::Null);
            }
            if rest.is_empty() {
                list[*index] = value;
                return Ok(());
            }
            if !list[*index].is_object() {
                list[*index] = Value::Object(Map::new());
            }
            match &mut list[*index] {
                Value::Object(inner) => set_path(inner, rest, value),
                _ => Ok(()),
            }
        }
    }
}

/// Split on `sep` outside of escapes and `{...}` list literals
fn split_unescaped(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn split_once_unescaped(input: &str, sep: char) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == sep {
            return Some((&input[..i], &input[i + c.len_utf8()..]));
        }
    }
    None
}

fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(input: &str, mode: ValueMode) -> Result<Values, StrvalsError> {
        let mut values = Map::new();
        parse_into(input, &mut values, mode)?;
        Ok(values)
    }

    fn parsed(input: &str, mode: ValueMode) -> Value {
        Value::Object(parse(input, mode).unwrap())
    }

    #[test]
    fn test_nested_keys_and_multiple_assignments() {
        let v = parsed("vx.trafficWeight=80,vy.trafficWeight=20", ValueMode::Typed);
        assert_eq!(
            v,
            json!({"vx": {"trafficWeight": 80}, "vy": {"trafficWeight": 20}})
        );
    }

    #[test]
    fn test_typed_inference() {
        let v = parsed(
            "a=true,b=FALSE,c=null,d=42,e=-3,f=1.5,g=007,h=0,i=",
            ValueMode::Typed,
        );
        assert_eq!(
            v,
            json!({"a": true, "b": false, "c": null, "d": 42, "e": -3,
                   "f": "1.5", "g": "007", "h": 0, "i": ""})
        );
    }

    #[test]
    fn test_string_mode_keeps_strings() {
        let v = parsed("image.tag=1234,enabled=true", ValueMode::String);
        assert_eq!(v, json!({"image": {"tag": "1234"}, "enabled": "true"}));
    }

    #[test]
    fn test_list_values() {
        let v = parsed("hosts={a.example.com,b.example.com},ports={80,443}", ValueMode::Typed);
        assert_eq!(
            v,
            json!({"hosts": ["a.example.com", "b.example.com"], "ports": [80, 443]})
        );
    }

    #[test]
    fn test_index_assignment() {
        let v = parsed("servers[1].port=8080,servers[0].port=80,tags[2]=x", ValueMode::Typed);
        assert_eq!(
            v,
            json!({"servers": [{"port": 80}, {"port": 8080}], "tags": [null, null, "x"]})
        );
    }

    #[test]
    fn test_escapes() {
        let v = parsed(r"annotations.kubernetes\.io/ingress=nginx,msg=a\,b", ValueMode::Typed);
        assert_eq!(
            v,
            json!({"annotations": {"kubernetes.io/ingress": "nginx"}, "msg": "a,b"})
        );
    }

    #[test]
    fn test_later_assignment_wins_and_scalar_becomes_map() {
        let mut dest = Map::new();
        parse_into("image=nginx", &mut dest, ValueMode::Typed).unwrap();
        parse_into("image.tag=2", &mut dest, ValueMode::Typed).unwrap();
        assert_eq!(Value::Object(dest), json!({"image": {"tag": 2}}));
    }

    #[test]
    fn test_missing_value_is_error() {
        let result = parse("replicaCount", ValueMode::Typed);
        assert!(matches!(result, Err(StrvalsError::MissingValue(k)) if k == "replicaCount"));
    }

    #[test]
    fn test_bad_index_is_error() {
        assert!(matches!(
            parse("a[x]=1", ValueMode::Typed),
            Err(StrvalsError::InvalidIndex(_))
        ));
        assert!(matches!(
            parse("a[70000]=1", ValueMode::Typed),
            Err(StrvalsError::IndexTooLarge { index: 70000, .. })
        ));
    }

    #[test]
    fn test_unterminated_list_is_error() {
        assert!(matches!(
            parse("a={x,y", ValueMode::Typed),
            Err(StrvalsError::UnterminatedList(_))
        ));
    }

    #[test]
    fn test_file_mode_reads_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.sh");
        std::fs::write(&path, "#!/bin/sh\necho hi\n").unwrap();

        let v = parsed(&format!("init.script={}", path.display()), ValueMode::File);
        assert_eq!(v, json!({"init": {"script": "#!/bin/sh\necho hi\n"}}));
    }

    #[test]
    fn test_file_mode_missing_file() {
        let result = parse("init.script=/nonexistent/file", ValueMode::File);
        assert!(matches!(result, Err(StrvalsError::ReadFile { .. })));
    }

    #[test]
    fn test_rewrite_keys_only_touches_matching_keys() {
        let rewritten = rewrite_keys("image.tag=v2,replicaCount=3,note=image.tag", |k| {
            (k == "image.tag").then(|| format!("vy.{}", k))
        });
        assert_eq!(rewritten, "vy.image.tag=v2,replicaCount=3,note=image.tag");
    }
}
