//! Progress-callback trait for per-stage conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline runs. This is the caller-supplied diagnostic sink:
//! the library never installs global logging state, it only emits `tracing`
//! events and calls this trait.
//!
//! # Example
//!
//! ```rust
//! use md2html_publish::{ConversionConfig, ConversionProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     stages: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
//!         self.stages.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} done in {elapsed_ms}ms");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { stages: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::Stage;
use std::path::Path;
use std::sync::Arc;

/// Called by the conversion pipeline as it moves through its stages.
///
/// Implementations must be `Send + Sync`; a [`crate::Converter`] may run
/// several conversions at once and share one callback. All methods have
/// default no-op implementations.
///
/// # Thread safety
///
/// `on_asset_ready` and `on_asset_failed` are reported while image downloads
/// are in flight and may interleave in any order.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before the first stage runs.
    fn on_conversion_start(&self, source: &Path) {
        let _ = source;
    }

    /// Called before a stage starts.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called after a stage completed successfully.
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called for optional stages turned off by configuration.
    fn on_stage_skipped(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when an asset is available locally.
    ///
    /// # Arguments
    /// * `url`: the remote URL
    /// * `cached`: `true` if no network request was needed
    fn on_asset_ready(&self, url: &str, cached: bool) {
        let _ = (url, cached);
    }

    /// Called when an asset could not be localized.
    fn on_asset_failed(&self, url: &str, error: &str) {
        let _ = (url, error);
    }

    /// Called once when the conversion ends, successfully or not.
    fn on_conversion_complete(&self, success: bool) {
        let _ = success;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        started: Mutex<Vec<Stage>>,
        completed: AtomicUsize,
        skipped: AtomicUsize,
        cached: AtomicUsize,
        failed: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_stage_start(&self, stage: Stage) {
            self.started.lock().unwrap().push(stage);
        }

        fn on_stage_complete(&self, _stage: Stage, _elapsed_ms: u64) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_skipped(&self, _stage: Stage) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }

        fn on_asset_ready(&self, _url: &str, cached: bool) {
            if cached {
                self.cached.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_asset_failed(&self, _url: &str, _error: &str) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start(Path::new("spec.md"));
        cb.on_stage_start(Stage::Metadata);
        cb.on_stage_complete(Stage::Metadata, 3);
        cb.on_stage_skipped(Stage::Format);
        cb.on_asset_ready("https://example.com/a.png", true);
        cb.on_asset_failed("https://example.com/b.png", "HTTP 404");
        cb.on_conversion_complete(true);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_stage_start(Stage::Metadata);
        tracker.on_stage_complete(Stage::Metadata, 1);
        tracker.on_stage_start(Stage::Stylesheet);
        tracker.on_asset_ready("https://example.com/s.css", true);
        tracker.on_stage_complete(Stage::Stylesheet, 1);
        tracker.on_stage_skipped(Stage::Format);
        tracker.on_asset_failed("https://example.com/x.png", "timeout");

        assert_eq!(
            *tracker.started.lock().unwrap(),
            vec![Stage::Metadata, Stage::Stylesheet]
        );
        assert_eq!(tracker.completed.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.skipped.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.cached.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.failed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn ConversionProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::Render);
        cb.on_stage_complete(Stage::Render, 120);
    }
}
