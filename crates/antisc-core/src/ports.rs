use crate::Result;

/// Script-normalization service (e.g. Simplified → Traditional Chinese).
///
/// Implementations must be deterministic and free of side effects visible to
/// the core. The whole input is converted; characters outside the script pass
/// through unchanged.
pub trait ScriptConverter: Send + Sync {
    fn convert(&self, text: &str) -> Result<String>;
}
