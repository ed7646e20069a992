pub mod cache;
pub mod config;
pub mod error;
pub mod github;
pub mod logging;
pub mod pagination;
pub mod progress;
pub mod qualify;
pub mod rate_limit;
#[cfg(test)]
mod test_utils;

pub use error::{ForkgateError, Result};
