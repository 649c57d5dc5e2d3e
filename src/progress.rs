//! Progress-callback trait for analysis stage events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to hear about
//! each stage as the orchestrator runs it. The CLI uses this to drive its
//! spinner.
//!
//! # Example
//!
//! ```rust
//! use bloodreport_analyzer::{AnalysisConfig, AnalysisProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl AnalysisProgressCallback for Printer {
//!     fn on_stage_start(&self, stage: Stage) {
//!         eprintln!("{stage}…");
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn AnalysisProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// One step of an analysis run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reading or downloading the document.
    Load,
    /// PDF text extraction or OCR.
    Extract,
    /// Provider call plus response validation.
    Analyze,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Load => "Loading report",
            Stage::Extract => "Extracting text",
            Stage::Analyze => "Analyzing results",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the orchestrator as it moves through the stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Error text passed here never contains credentials.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage succeeds.
    ///
    /// `output_len` is the byte length of what the stage produced (document
    /// bytes, extracted text, or the serialised result).
    fn on_stage_complete(&self, stage: Stage, output_len: usize) {
        let _ = (stage, output_len);
    }

    /// Called when a stage fails. No later stage runs.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl AnalysisProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("start {stage:?}"));
        }

        fn on_stage_complete(&self, stage: Stage, output_len: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done {stage:?} {output_len}"));
        }

        fn on_stage_error(&self, stage: Stage, error: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("fail {stage:?} {error}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Load);
        cb.on_stage_complete(Stage::Load, 10);
        cb.on_stage_error(Stage::Extract, "boom");
    }

    #[test]
    fn recorder_receives_events_in_order() {
        let rec = Recorder::default();
        rec.on_stage_start(Stage::Extract);
        rec.on_stage_complete(Stage::Extract, 42);
        rec.on_stage_start(Stage::Analyze);
        rec.on_stage_error(Stage::Analyze, "429");
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec![
                "start Extract",
                "done Extract 42",
                "start Analyze",
                "fail Analyze 429",
            ]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::Analyze);
        assert_eq!(Stage::Analyze.to_string(), "Analyzing results");
    }
}
