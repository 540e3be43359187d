pub mod display;
pub mod loader;
pub mod payload;

use serde_json::Value;
use crate::variables::PlainVariable;

pub use display::{resolve_display, significant_deps, DerivedKind, ResolvedDerived, ResolvedValue};
pub use payload::{build_request_payload, cache_key, RequestPayload};

/// Supplies the current value of plain variables (the surrounding reactive store).
pub trait ValueSource: Send + Sync {
    /// Current value with the variable's `nested` path already applied.
    fn current(&self, variable: &PlainVariable) -> Value;
}
