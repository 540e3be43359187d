pub mod config;
pub mod error;
pub mod remote;
pub mod resolver;
pub mod runtime;
pub mod variables;

pub use error::{ResolveError, Result};
