pub mod driver;
pub mod error;
pub mod request;
pub mod state;
pub mod traffic;
pub mod validation;

// Re-export everything so callers only need `rollout::`
pub use driver::*;
pub use error::*;
pub use request::*;
pub use state::*;
pub use traffic::*;
pub use validation::*;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap/expect for brevity
#[path = "rollout_test.rs"]
mod tests;
