//! Pipeline stages for blood-report analysis.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the orchestrator in [`crate::analyze`] only sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ prompt ──▶ provider ──▶ validate
//! (path/URL)  (pdf | ocr)  (template)  (HTTP)     (schema)
//! ```
//!
//! 1. [`input`]    — load bytes and declare the media kind
//! 2. [`extract`]  — dispatch to [`pdf`] or [`ocr`] by media kind
//! 3. [`crate::prompts`] — render the analysis prompt
//! 4. [`crate::provider`] — the only stage with network I/O
//! 5. [`validate`] — parse and schema-check the provider's answer

pub mod extract;
pub mod input;
pub mod ocr;
pub mod pdf;
pub mod validate;
