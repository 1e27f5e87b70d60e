//! Integration tests for the conversion pipeline.
//!
//! Remote assets are served by a local `wiremock` server, so these tests run
//! offline. Tests that need a renderer install a small shell script in its
//! place (unix only); the real renderer is exercised in `tests/e2e.rs`.

use md2html_publish::pipeline::assets::{build_client, AssetStore, IMAGE_FALLBACK_NAME};
use md2html_publish::{
    AssetError, ConversionConfig, ConversionConfigBuilder, ConversionProgressCallback, Converter,
    Md2HtmlError, Stage,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const CSS: &str = "body { font-family: serif; }\n";

// ── Test helpers ─────────────────────────────────────────────────────────────

fn write_source(dir: &Path, text: &str) -> PathBuf {
    let p = dir.join("spec.md");
    std::fs::write(&p, text).unwrap();
    p
}

fn base_config(server: &MockServer) -> ConversionConfigBuilder {
    ConversionConfig::builder()
        .stylesheet_url(format!("{}/css/site.css", server.uri()))
        .stylesheet_filename("site.css")
        .fetch_timeout_secs(5)
}

async fn serve_stylesheet(server: &MockServer, times: u64) {
    Mock::given(method("GET"))
        .and(path("/css/site.css"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CSS))
        .expect(times)
        .mount(server)
        .await;
}

#[derive(Default)]
struct Recorder {
    started: Mutex<Vec<Stage>>,
    skipped: Mutex<Vec<Stage>>,
    finished: AtomicUsize,
}

impl ConversionProgressCallback for Recorder {
    fn on_stage_start(&self, stage: Stage) {
        self.started.lock().unwrap().push(stage);
    }

    fn on_stage_skipped(&self, stage: Stage) {
        self.skipped.lock().unwrap().push(stage);
    }

    fn on_conversion_complete(&self, _success: bool) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Stylesheet and caching ───────────────────────────────────────────────────

#[tokio::test]
async fn cached_stylesheet_avoids_network() {
    let server = MockServer::start().await;
    serve_stylesheet(&server, 0).await;

    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), "# Cached\n");
    std::fs::create_dir_all(dir.path().join("styles")).unwrap();
    std::fs::write(dir.path().join("styles/site.css"), CSS).unwrap();

    let config = base_config(&server).render_html(false).build().unwrap();
    let out = Converter::new(config)
        .unwrap()
        .convert(&source, None)
        .await
        .unwrap();

    assert_eq!(out.stats.assets_fetched, 0);
    assert_eq!(out.stats.assets_cached, 1);
    assert!(out.written_assets.is_empty());
}

#[tokio::test]
async fn unavailable_stylesheet_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/css/site.css"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), "# Doomed\n");
    let config = base_config(&server)
        .renderer_program("md2html-renderer-must-not-run")
        .build()
        .unwrap();

    let err = Converter::new(config)
        .unwrap()
        .convert(&source, None)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Stylesheet));
    match err.cause() {
        Md2HtmlError::StylesheetUnavailable(AssetError::Http { status, .. }) => {
            assert_eq!(*status, 404)
        }
        other => panic!("unexpected cause: {other:?}"),
    }
    assert!(!dir.path().join("spec.html").exists());
    assert!(!dir.path().join("styles/site.css").exists());
}

#[tokio::test]
async fn disabled_cache_refetches() {
    let server = MockServer::start().await;
    serve_stylesheet(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), "# Fresh\n");
    std::fs::create_dir_all(dir.path().join("styles")).unwrap();
    std::fs::write(dir.path().join("styles/site.css"), "stale").unwrap();

    let config = base_config(&server)
        .cache_enabled(false)
        .render_html(false)
        .build()
        .unwrap();
    let out = Converter::new(config)
        .unwrap()
        .convert(&source, None)
        .await
        .unwrap();

    assert_eq!(out.stats.assets_fetched, 1);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("styles/site.css")).unwrap(),
        CSS
    );
}

// ── Render disabled ──────────────────────────────────────────────────────────

#[tokio::test]
async fn no_render_yields_metadata_and_normalized_source() {
    let server = MockServer::start().await;
    serve_stylesheet(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let source = write_source(
        dir.path(),
        "<!-- description: Example spec -->\n# Widget Spec\n\n- [Intro](#intro)\n\n## Intro\n",
    );

    let recorder = Arc::new(Recorder::default());
    let config = base_config(&server)
        .render_html(false)
        .progress_callback(recorder.clone() as Arc<dyn ConversionProgressCallback>)
        .build()
        .unwrap();
    let out = Converter::new(config)
        .unwrap()
        .convert(&source, None)
        .await
        .unwrap();

    assert_eq!(out.metadata.title, "Widget Spec");
    assert_eq!(out.metadata.description, "Example spec");
    assert!(out.toc_title_inserted);
    assert!(out.html_path.is_none());
    assert!(out.report.is_none());
    assert!(!dir.path().join("spec.html").exists());

    let text = std::fs::read_to_string(&source).unwrap();
    assert!(text.contains("# Widget Spec\n\n## Table of Contents\n\n- [Intro](#intro)"));

    assert_eq!(
        *recorder.started.lock().unwrap(),
        vec![Stage::Metadata, Stage::Stylesheet, Stage::Toc]
    );
    assert_eq!(
        *recorder.skipped.lock().unwrap(),
        vec![Stage::Format, Stage::Render, Stage::PostProcess, Stage::Pdf]
    );
    assert_eq!(recorder.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn converter_reuses_metadata_cache() {
    let server = MockServer::start().await;
    serve_stylesheet(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), "# Reused\n");
    let config = base_config(&server).render_html(false).build().unwrap();
    let converter = Converter::new(config).unwrap();

    let first = converter.convert(&source, None).await.unwrap();
    let second = converter.convert(&source, None).await.unwrap();

    assert_eq!(first.metadata, second.metadata);
    assert_eq!(converter.metadata_cache().len(), 1);
    // Second run finds the stylesheet on disk.
    assert_eq!(second.stats.assets_fetched, 0);
}

// ── Asset store ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_image_urls_are_fetched_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/fig.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, b'P', b'N', b'G']))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = ConversionConfig::builder().cache_enabled(false).build().unwrap();
    let store = AssetStore::new(build_client(5).unwrap(), dir.path(), &config);

    let fig = format!("{}/img/fig.png", server.uri());
    let gone = format!("{}/gone.png", server.uri());
    let urls = vec![fig.clone(), fig.clone(), gone.clone(), fig.clone()];

    let results = store
        .ensure_all(&urls, "images", IMAGE_FALLBACK_NAME, 4)
        .await;

    assert_eq!(results.len(), 2);
    let asset = results[&fig].as_ref().unwrap();
    assert_eq!(asset.relative_path, "images/fig.png");
    assert!(asset.path.exists());
    assert!(matches!(results[&gone], Err(AssetError::Http { status: 404, .. })));
    assert_eq!(store.network_requests(), 2);

    // Same destination again in this run: memoised, no request.
    let again = store.ensure(&fig, "images", IMAGE_FALLBACK_NAME).await.unwrap();
    assert_eq!(again.path, asset.path);
    assert_eq!(store.network_requests(), 2);
    assert_eq!(store.written_files(), vec![asset.path.clone()]);
}

#[tokio::test]
async fn concurrent_conversions_share_an_output_directory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/css/site.css"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CSS))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = base_config(&server).render_html(false).build().unwrap();
    let converter = Converter::new(config).unwrap();

    for round in 0..5 {
        let _ = std::fs::remove_file(dir.path().join("styles/site.css"));
        let sources: Vec<PathBuf> = (0..4)
            .map(|i| {
                let p = dir.path().join(format!("doc-{round}-{i}.md"));
                std::fs::write(&p, format!("# Doc {i}\n")).unwrap();
                p
            })
            .collect();

        let results =
            futures::future::join_all(sources.iter().map(|s| converter.convert(s, None))).await;
        for result in results {
            result.unwrap();
        }
        assert_eq!(
            std::fs::read_to_string(dir.path().join("styles/site.css")).unwrap(),
            CSS
        );
    }
}

/// Answers after a fixed delay and records when each request arrived.
struct DelayedRecorder {
    delay: Duration,
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Respond for DelayedRecorder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        ResponseTemplate::new(200)
            .set_body_bytes(b"png".to_vec())
            .set_delay(self.delay)
    }
}

/// Largest number of requests that arrived within one response delay.
fn peak_in_flight(arrivals: &[Instant], delay: Duration) -> usize {
    let window = delay.mul_f64(0.9);
    arrivals
        .iter()
        .map(|start| {
            arrivals
                .iter()
                .filter(|t| **t >= *start && t.duration_since(*start) < window)
                .count()
        })
        .max()
        .unwrap_or(0)
}

#[tokio::test]
async fn image_fetches_respect_the_concurrency_limit() {
    let server = MockServer::start().await;
    let delay = Duration::from_millis(300);
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    Mock::given(method("GET"))
        .and(path_regex(r"^/img/fig-\d+\.png$"))
        .respond_with(DelayedRecorder {
            delay,
            arrivals: arrivals.clone(),
        })
        .expect(6)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = ConversionConfig::builder()
        .max_concurrent_downloads(2)
        .build()
        .unwrap();
    let store = AssetStore::new(build_client(5).unwrap(), dir.path(), &config);
    let urls: Vec<String> = (0..6)
        .map(|i| format!("{}/img/fig-{i}.png", server.uri()))
        .collect();

    let started = Instant::now();
    let results = store
        .ensure_all(&urls, "images", IMAGE_FALLBACK_NAME, config.max_concurrent_downloads)
        .await;

    assert!(results.values().all(|r| r.is_ok()));
    assert_eq!(store.network_requests(), 6);
    let arrivals = arrivals.lock().unwrap().clone();
    assert_eq!(arrivals.len(), 6);
    assert_eq!(peak_in_flight(&arrivals, delay), 2);
    // Three waves of two.
    assert!(started.elapsed() >= delay * 3);
}

#[tokio::test]
async fn slow_image_times_out_without_blocking_siblings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/slow.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/img/quick-\d\.png$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = ConversionConfig::builder()
        .fetch_timeout_secs(1)
        .max_concurrent_downloads(2)
        .build()
        .unwrap();
    let store = AssetStore::new(
        build_client(config.fetch_timeout_secs).unwrap(),
        dir.path(),
        &config,
    );
    let slow = format!("{}/img/slow.png", server.uri());
    let mut urls = vec![slow.clone()];
    urls.extend((0..3).map(|i| format!("{}/img/quick-{i}.png", server.uri())));

    let started = Instant::now();
    let results = store
        .ensure_all(&urls, "images", IMAGE_FALLBACK_NAME, config.max_concurrent_downloads)
        .await;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(
        matches!(results[&slow], Err(AssetError::Timeout { secs: 1, .. })),
        "got: {:?}",
        results[&slow]
    );
    for url in &urls[1..] {
        let asset = results[url].as_ref().unwrap();
        assert!(asset.path.exists());
    }
    assert!(!dir.path().join("images/slow.png").exists());
}

// ── Full conversion with a stand-in renderer ─────────────────────────────────

#[cfg(unix)]
mod with_renderer {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Install an executable script that writes `html` to the path after `-o`.
    fn fake_renderer(dir: &Path, html: &str) -> PathBuf {
        let script = format!(
            "#!/bin/sh\nout=\"\"\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"-o\" ]; then out=\"$2\"; shift; fi\n  shift\ndone\ncat > \"$out\" <<'HTML'\n{html}\nHTML\n"
        );
        script_file(dir, "fake-renderer", &script)
    }

    fn script_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, body).unwrap();
        std::fs::set_permissions(&p, std::fs::Permissions::from_mode(0o755)).unwrap();
        p
    }

    fn rendered_page(base: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="">
<head>
  <meta charset="utf-8" />
  <meta name="generator" content="pandoc" />
  <title>Widget Spec</title>
  <style>code {{ white-space: pre-wrap; }}</style>
</head>
<body>
<h1 id="widget-spec">Widget Spec</h1>
<p>Background at https://example.org/background.</p>
<p><img src="{base}/img/ok.png" /></p>
<p><img src="{base}/img/missing.png" alt="Missing" /></p>
<hr style="page-break-after: always" />
</body>
</html>"#
        )
    }

    async fn serve_images(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/img/ok.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-bytes".to_vec()))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/img/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn full_conversion_publishes_html() {
        let server = MockServer::start().await;
        serve_stylesheet(&server, 1).await;
        serve_images(&server).await;

        let tools = TempDir::new().unwrap();
        let renderer = fake_renderer(tools.path(), &rendered_page(&server.uri()));

        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "<!-- description: Widgets -->\n# Widget Spec\n");
        let config = base_config(&server)
            .renderer_program(renderer.to_string_lossy())
            .build()
            .unwrap();
        let converter = Converter::new(config).unwrap();

        let first = converter.convert(&source, None).await.unwrap();
        let html_path = first.html_path.clone().unwrap();
        let html = std::fs::read_to_string(&html_path).unwrap();

        assert!(html.contains(r#"<meta name="description" content="Widgets">"#));
        assert!(html.contains(r#"<html lang="en">"#));
        assert!(html.contains(r#"<img src="images/ok.png" alt="Image">"#), "got: {html}");
        assert!(!html.contains("missing.png"));
        assert!(html.contains(
            r#"<a href="https://example.org/background" target="_blank" rel="noopener noreferrer">https://example.org/background</a>."#
        ));
        assert!(html.contains("OASISLogo"));
        assert!(html.contains(r#"<link rel="stylesheet" href="styles/site.css">"#));
        assert!(!html.contains("<style>"));
        assert!(html.contains("<hr>"));

        let report = first.report.as_ref().unwrap();
        assert_eq!(report.images_localized, 1);
        assert_eq!(report.images_dropped.len(), 1);
        assert!(report.logo_inserted);
        assert_eq!(first.written_assets.len(), 2);
        assert_eq!(first.stats.assets_fetched, 3);

        // Renderer temp output is gone.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".md2html-"))
            .collect();
        assert!(leftovers.is_empty());

        // A second run reuses every asset on disk and writes the same bytes.
        let second = converter.convert(&source, None).await.unwrap();
        assert_eq!(std::fs::read_to_string(&html_path).unwrap(), html);
        assert!(second.written_assets.is_empty());
        assert_eq!(second.stats.assets_cached, 2);
    }

    #[tokio::test]
    async fn renderer_failure_is_attributed_to_render_stage() {
        let server = MockServer::start().await;
        serve_stylesheet(&server, 1).await;

        let tools = TempDir::new().unwrap();
        let renderer = script_file(
            tools.path(),
            "failing-renderer",
            "#!/bin/sh\necho 'pandoc: unknown extension' >&2\nexit 64\n",
        );

        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "# Broken\n");
        let config = base_config(&server)
            .renderer_program(renderer.to_string_lossy())
            .build()
            .unwrap();

        let err = Converter::new(config)
            .unwrap()
            .convert(&source, None)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Render));
        match err.cause() {
            Md2HtmlError::ToolFailed { stderr, .. } => {
                assert!(stderr.contains("unknown extension"))
            }
            other => panic!("unexpected cause: {other:?}"),
        }
        assert!(!dir.path().join("spec.html").exists());
    }

    #[tokio::test]
    async fn conversion_timeout_aborts_everything() {
        let server = MockServer::start().await;
        serve_stylesheet(&server, 1).await;

        let tools = TempDir::new().unwrap();
        let renderer = script_file(tools.path(), "slow-renderer", "#!/bin/sh\nexec sleep 10\n");

        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "# Slow\n");
        let config = base_config(&server)
            .renderer_program(renderer.to_string_lossy())
            .conversion_timeout_secs(1)
            .build()
            .unwrap();

        let err = Converter::new(config)
            .unwrap()
            .convert(&source, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Md2HtmlError::ConversionTimedOut { secs: 1 }));
    }
}
