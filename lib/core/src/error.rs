//! Shared `Result` alias.
//!
//! Errors in aibot are rootcause reports. Each crate owns its error enums
//! (`AiError`, `ChatError`, ...) and wraps lower-level reports with
//! `.context()` when they cross into its layer, so a failed `process` call
//! still carries the store or backend failure that caused it.

use rootcause::Report;

/// Result whose error is a rootcause report with context `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
