//! Conversion entry points.
//!
//! [`Converter`] owns everything that can be shared between conversions (the
//! configuration, one HTTP client and the metadata cache) and runs the stages
//! of one conversion in their fixed order:
//!
//! ```text
//! metadata → stylesheet → toc → [format] → [render → post-process] → [pdf]
//! ```
//!
//! The free functions [`convert`], [`convert_to_file`] and [`convert_sync`]
//! build a throwaway `Converter` for one-off use.

use crate::config::ConversionConfig;
use crate::context::ConversionContext;
use crate::error::{Md2HtmlError, Stage};
use crate::output::{ConversionOutput, ConversionStats, DocumentMetadata};
use crate::pipeline::assets::{build_client, AssetStore};
use crate::pipeline::metadata::MetadataCache;
use crate::pipeline::{format, paths, pdf, postprocess, render, toc};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Reusable converter: build once, convert many documents.
///
/// # Example
/// ```rust,no_run
/// use md2html_publish::{ConversionConfig, Converter};
///
/// # async fn run() -> Result<(), md2html_publish::Md2HtmlError> {
/// let converter = Converter::new(ConversionConfig::default())?;
/// for doc in ["a.md", "b.md"] {
///     let out = converter.convert(doc, None).await?;
///     println!("{} → {:?}", out.metadata.title, out.html_path);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Converter {
    config: ConversionConfig,
    client: reqwest::Client,
    metadata_cache: MetadataCache,
}

impl Converter {
    pub fn new(config: ConversionConfig) -> Result<Self, Md2HtmlError> {
        let client = build_client(config.fetch_timeout_secs)?;
        Ok(Self {
            config,
            client,
            metadata_cache: MetadataCache::new(),
        })
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn metadata_cache(&self) -> &MetadataCache {
        &self.metadata_cache
    }

    /// Convert `source`, writing HTML to `output` (default: beside the
    /// source with an `.html` extension).
    ///
    /// # Errors
    /// Input errors (missing source, unusable output path) are returned
    /// before any stage runs. A failing stage aborts the conversion and is
    /// returned as [`Md2HtmlError::Stage`]. Images that cannot be localized
    /// are not errors; see [`crate::PostProcessReport::images_dropped`].
    pub async fn convert(
        &self,
        source: impl AsRef<Path>,
        output: Option<&Path>,
    ) -> Result<ConversionOutput, Md2HtmlError> {
        let source = source.as_ref();
        match self.config.conversion_timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), self.run(source, output))
                .await
                .map_err(|_| Md2HtmlError::ConversionTimedOut { secs })?,
            None => self.run(source, output).await,
        }
    }

    async fn run(
        &self,
        source: &Path,
        output: Option<&Path>,
    ) -> Result<ConversionOutput, Md2HtmlError> {
        let total_start = Instant::now();
        info!("Starting conversion: {}", source.display());

        let resolved = paths::resolve(source, output, &self.config)?;
        let mut ctx = ConversionContext::new(resolved);

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_start(&ctx.source);
        }
        let result = self.run_stages(&mut ctx, total_start).await;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_complete(result.is_ok());
        }
        result
    }

    async fn run_stages(
        &self,
        ctx: &mut ConversionContext,
        total_start: Instant,
    ) -> Result<ConversionOutput, Md2HtmlError> {
        let config = &self.config;
        let store = AssetStore::new(self.client.clone(), ctx.output_dir(), config);

        // ── Step 1: Metadata ─────────────────────────────────────────────
        let metadata = self
            .stage(Stage::Metadata, self.metadata_cache.load(&ctx.source))
            .await?;
        info!("Title: {:?}, description: {:?}", metadata.title, metadata.description);
        ctx.title = metadata.title;
        ctx.description = metadata.description;

        // ── Step 2: Stylesheet ───────────────────────────────────────────
        let fetch_start = Instant::now();
        let href = self
            .stage(Stage::Stylesheet, ensure_stylesheet(&store, config))
            .await?;
        let mut fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;
        debug!("Stylesheet ready in {}", ctx.styles_dir.display());
        ctx.stylesheet_href = Some(href);

        // ── Step 3: TOC title ────────────────────────────────────────────
        let toc_title_inserted = self
            .stage(Stage::Toc, toc::normalize_file(&ctx.source))
            .await?;

        // ── Step 4: Format (optional) ────────────────────────────────────
        let formatted = if config.format_source {
            self.stage(Stage::Format, format::run(ctx, config)).await?;
            true
        } else {
            self.skip(Stage::Format);
            false
        };

        // ── Step 5: Render + post-process (optional) ─────────────────────
        let mut render_duration_ms = 0;
        let mut report = None;
        let mut html_path = None;
        if config.render_html {
            let render_start = Instant::now();
            self.stage(Stage::Render, render::run(ctx, config)).await?;
            render_duration_ms = render_start.elapsed().as_millis() as u64;

            let (processed, image_fetch_ms) = self
                .stage(Stage::PostProcess, postprocess::run(ctx, config, &store))
                .await?;
            fetch_duration_ms += image_fetch_ms;
            report = Some(processed);
            html_path = Some(ctx.output.clone());
        } else {
            self.skip(Stage::Render);
            self.skip(Stage::PostProcess);
        }

        // ── Step 6: PDF (optional) ───────────────────────────────────────
        let pdf_path = match (&html_path, config.render_pdf) {
            (Some(html), true) => Some(self.stage(Stage::Pdf, pdf::run(html, config)).await?),
            _ => {
                self.skip(Stage::Pdf);
                None
            }
        };

        // ── Step 7: Stats ────────────────────────────────────────────────
        let written_assets = store
            .written_files()
            .into_iter()
            .map(|p| relative_to_repo(&p, ctx.repo_root.as_deref()))
            .collect();
        let stats = ConversionStats {
            assets_fetched: store.network_requests(),
            assets_cached: store.cache_hits(),
            render_duration_ms,
            fetch_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Conversion complete: {} fetched, {} cached, {}ms total",
            stats.assets_fetched, stats.assets_cached, stats.total_duration_ms
        );

        Ok(ConversionOutput {
            source: ctx.source.clone(),
            metadata: DocumentMetadata {
                title: ctx.title.clone(),
                description: ctx.description.clone(),
            },
            toc_title_inserted,
            formatted,
            html_path,
            pdf_path,
            report,
            written_assets,
            stats,
        })
    }

    /// Run one stage, reporting progress and attributing any error to it.
    async fn stage<T>(
        &self,
        stage: Stage,
        work: impl Future<Output = Result<T, Md2HtmlError>>,
    ) -> Result<T, Md2HtmlError> {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(stage);
        }
        let start = Instant::now();
        let value = work.await.map_err(|e| e.in_stage(stage))?;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        debug!("Stage {} finished in {}ms", stage, elapsed_ms);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_complete(stage, elapsed_ms);
        }
        Ok(value)
    }

    fn skip(&self, stage: Stage) {
        debug!("Stage {} skipped", stage);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_skipped(stage);
        }
    }
}

/// Make the managed stylesheet available and return its href.
async fn ensure_stylesheet(
    store: &AssetStore,
    config: &ConversionConfig,
) -> Result<String, Md2HtmlError> {
    store
        .ensure(
            &config.stylesheet_url,
            &config.styles_subdir,
            &config.stylesheet_filename,
        )
        .await
        .map(|asset| asset.relative_path)
        .map_err(Md2HtmlError::StylesheetUnavailable)
}

fn relative_to_repo(path: &Path, repo_root: Option<&Path>) -> PathBuf {
    repo_root
        .and_then(|root| path.strip_prefix(root).ok())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.to_path_buf())
}

/// Convert a Markdown file to HTML beside it.
///
/// This is the primary entry point for one-off conversions.
///
/// # Example
/// ```rust,no_run
/// use md2html_publish::{convert, ConversionConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ConversionConfig::default();
///     let output = convert("spec.md", &config).await?;
///     println!("{:?}", output.html_path);
///     Ok(())
/// }
/// ```
pub async fn convert(
    source: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2HtmlError> {
    Converter::new(config.clone())?.convert(source, None).await
}

/// Convert a Markdown file to HTML at `output`.
pub async fn convert_to_file(
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2HtmlError> {
    Converter::new(config.clone())?
        .convert(source, Some(output.as_ref()))
        .await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    source: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2HtmlError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Md2HtmlError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(source, config))
}
