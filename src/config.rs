//! Configuration types for Markdown-to-HTML publication.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Every option has a default so callers
//! set only what they care about. A JSON file of [`ConfigOverrides`] can be
//! layered on top of the defaults (the CLI's `--config` flag does this).

use crate::error::Md2HtmlError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Default managed stylesheet file name.
pub const DEFAULT_STYLESHEET_FILENAME: &str = "markdown-styles-v1.7.3a.css";

/// Default stylesheet source.
pub const DEFAULT_STYLESHEET_URL: &str =
    "https://docs.oasis-open.org/templates/css/markdown-styles-v1.7.3a.css";

/// Default logo markup inserted at the top of `<body>`.
pub const DEFAULT_LOGO_MARKUP: &str =
    r#"<img alt="OASIS Logo" src="https://docs.oasis-open.org/templates/OASISLogo-v3.0.png"/>"#;

/// Substring identifying the logo image.
pub const DEFAULT_LOGO_MARKER: &str = "OASISLogo";

/// Configuration for a Markdown-to-HTML conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use md2html_publish::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .max_concurrent_downloads(4)
///     .fetch_timeout_secs(10)
///     .validate_links(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// File name of the managed stylesheet inside `styles_subdir`.
    /// Used when the stylesheet URL has no usable path segment.
    pub stylesheet_filename: String,

    /// Where the managed stylesheet is fetched from when not cached locally.
    pub stylesheet_url: String,

    /// Markup inserted as the first child of `<body>` when no logo exists.
    pub logo_markup: String,

    /// Substring that identifies the logo image by its `src`. Default: "OASISLogo".
    ///
    /// Images matching it are never localized and count as "logo present".
    pub logo_marker: String,

    /// Directory (relative to the output file) for localized images. Default: "images".
    pub images_subdir: String,

    /// Directory (relative to the output file) for the stylesheet. Default: "styles".
    pub styles_subdir: String,

    /// Per-fetch timeout in seconds. Default: 30.
    pub fetch_timeout_secs: u64,

    /// Maximum number of image downloads in flight. Default: 8.
    pub max_concurrent_downloads: usize,

    /// Reuse assets already present on disk. Default: true.
    pub cache_enabled: bool,

    /// Report intra-document anchors that point nowhere. Default: false.
    pub validate_links: bool,

    /// Run the external formatter on the source. Default: false.
    pub format_source: bool,

    /// Render HTML and post-process it. Default: true.
    ///
    /// With `false` the conversion stops after TOC normalisation and only the
    /// extracted metadata and normalised source are produced.
    pub render_html: bool,

    /// Render a PDF beside the HTML output. Default: false. Requires `render_html`.
    pub render_pdf: bool,

    /// Date printed in the PDF footer (`YYYY-MM-DD`). Default: today.
    pub pdf_date: Option<String>,

    /// Copyright holder printed in the PDF footer. Default: "OASIS Open".
    pub copyright_holder: String,

    /// Markdown renderer executable. Default: "pandoc".
    pub renderer_program: String,

    /// Markdown formatter executable. Default: "prettier".
    pub formatter_program: String,

    /// Arguments passed to the formatter before the source path. Default: ["--write"].
    pub formatter_args: Vec<String>,

    /// HTML-to-PDF renderer executable. Default: "wkhtmltopdf".
    pub pdf_program: String,

    /// Timeout for each external tool invocation, in seconds. Default: 120.
    pub tool_timeout_secs: u64,

    /// Heading depth the renderer includes in its table of contents. Default: 3.
    pub toc_depth: u8,

    /// Value for `<html lang>` when the renderer leaves it empty. Default: "en".
    pub document_language: String,

    /// Content of `<meta name="author">`. Default: "OASIS".
    pub meta_author: String,

    /// Content of `<meta name="generator">`.
    pub meta_generator: String,

    /// Abort the whole conversion after this many seconds. Default: None.
    pub conversion_timeout_secs: Option<u64>,

    /// Receives stage and asset events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            stylesheet_filename: DEFAULT_STYLESHEET_FILENAME.to_string(),
            stylesheet_url: DEFAULT_STYLESHEET_URL.to_string(),
            logo_markup: DEFAULT_LOGO_MARKUP.to_string(),
            logo_marker: DEFAULT_LOGO_MARKER.to_string(),
            images_subdir: "images".to_string(),
            styles_subdir: "styles".to_string(),
            fetch_timeout_secs: 30,
            max_concurrent_downloads: 8,
            cache_enabled: true,
            validate_links: false,
            format_source: false,
            render_html: true,
            render_pdf: false,
            pdf_date: None,
            copyright_holder: "OASIS Open".to_string(),
            renderer_program: "pandoc".to_string(),
            formatter_program: "prettier".to_string(),
            formatter_args: vec!["--write".to_string()],
            pdf_program: "wkhtmltopdf".to_string(),
            tool_timeout_secs: 120,
            toc_depth: 3,
            document_language: "en".to_string(),
            meta_author: "OASIS".to_string(),
            meta_generator: format!("md2html-publish {}", env!("CARGO_PKG_VERSION")),
            conversion_timeout_secs: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("stylesheet_filename", &self.stylesheet_filename)
            .field("stylesheet_url", &self.stylesheet_url)
            .field("logo_marker", &self.logo_marker)
            .field("images_subdir", &self.images_subdir)
            .field("styles_subdir", &self.styles_subdir)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("max_concurrent_downloads", &self.max_concurrent_downloads)
            .field("cache_enabled", &self.cache_enabled)
            .field("validate_links", &self.validate_links)
            .field("format_source", &self.format_source)
            .field("render_html", &self.render_html)
            .field("render_pdf", &self.render_pdf)
            .field("renderer_program", &self.renderer_program)
            .field("tool_timeout_secs", &self.tool_timeout_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn stylesheet_filename(mut self, name: impl Into<String>) -> Self {
        self.config.stylesheet_filename = name.into();
        self
    }

    pub fn stylesheet_url(mut self, url: impl Into<String>) -> Self {
        self.config.stylesheet_url = url.into();
        self
    }

    pub fn logo_markup(mut self, markup: impl Into<String>) -> Self {
        self.config.logo_markup = markup.into();
        self
    }

    pub fn logo_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.logo_marker = marker.into();
        self
    }

    pub fn images_subdir(mut self, dir: impl Into<String>) -> Self {
        self.config.images_subdir = dir.into();
        self
    }

    pub fn styles_subdir(mut self, dir: impl Into<String>) -> Self {
        self.config.styles_subdir = dir.into();
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs.max(1);
        self
    }

    pub fn max_concurrent_downloads(mut self, n: usize) -> Self {
        self.config.max_concurrent_downloads = n.max(1);
        self
    }

    pub fn cache_enabled(mut self, v: bool) -> Self {
        self.config.cache_enabled = v;
        self
    }

    pub fn validate_links(mut self, v: bool) -> Self {
        self.config.validate_links = v;
        self
    }

    pub fn format_source(mut self, v: bool) -> Self {
        self.config.format_source = v;
        self
    }

    pub fn render_html(mut self, v: bool) -> Self {
        self.config.render_html = v;
        self
    }

    pub fn render_pdf(mut self, v: bool) -> Self {
        self.config.render_pdf = v;
        self
    }

    pub fn pdf_date(mut self, date: impl Into<String>) -> Self {
        self.config.pdf_date = Some(date.into());
        self
    }

    pub fn copyright_holder(mut self, holder: impl Into<String>) -> Self {
        self.config.copyright_holder = holder.into();
        self
    }

    pub fn renderer_program(mut self, program: impl Into<String>) -> Self {
        self.config.renderer_program = program.into();
        self
    }

    pub fn formatter_program(mut self, program: impl Into<String>) -> Self {
        self.config.formatter_program = program.into();
        self
    }

    pub fn formatter_args(mut self, args: Vec<String>) -> Self {
        self.config.formatter_args = args;
        self
    }

    pub fn pdf_program(mut self, program: impl Into<String>) -> Self {
        self.config.pdf_program = program.into();
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tool_timeout_secs = secs.max(1);
        self
    }

    pub fn toc_depth(mut self, depth: u8) -> Self {
        self.config.toc_depth = depth.clamp(1, 6);
        self
    }

    pub fn document_language(mut self, lang: impl Into<String>) -> Self {
        self.config.document_language = lang.into();
        self
    }

    pub fn meta_author(mut self, author: impl Into<String>) -> Self {
        self.config.meta_author = author.into();
        self
    }

    pub fn meta_generator(mut self, generator: impl Into<String>) -> Self {
        self.config.meta_generator = generator.into();
        self
    }

    pub fn conversion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.conversion_timeout_secs = Some(secs.max(1));
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Apply every field set in `overrides`, leaving the rest untouched.
    pub fn overrides(mut self, overrides: ConfigOverrides) -> Self {
        overrides.apply_to(&mut self.config);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Md2HtmlError> {
        let c = &self.config;
        if c.max_concurrent_downloads == 0 {
            return Err(Md2HtmlError::InvalidConfig(
                "max_concurrent_downloads must be ≥ 1".into(),
            ));
        }
        for (field, secs) in [
            ("fetch_timeout_secs", c.fetch_timeout_secs),
            ("tool_timeout_secs", c.tool_timeout_secs),
            ("conversion_timeout_secs", c.conversion_timeout_secs.unwrap_or(1)),
        ] {
            if secs == 0 {
                return Err(Md2HtmlError::InvalidConfig(format!("{field} must be ≥ 1")));
            }
        }
        if !(1..=6).contains(&c.toc_depth) {
            return Err(Md2HtmlError::InvalidConfig(format!(
                "toc_depth must be between 1 and 6, got {}",
                c.toc_depth
            )));
        }
        if !crate::pipeline::assets::is_remote_url(&c.stylesheet_url) {
            return Err(Md2HtmlError::InvalidConfig(format!(
                "stylesheet_url must be an http(s) URL, got {:?}",
                c.stylesheet_url
            )));
        }
        for (field, value) in [
            ("images_subdir", &c.images_subdir),
            ("styles_subdir", &c.styles_subdir),
        ] {
            if !is_plain_subdir(value) {
                return Err(Md2HtmlError::InvalidConfig(format!(
                    "{field} must be a relative directory name without '..', got {value:?}"
                )));
            }
        }
        if c.stylesheet_filename.is_empty() || c.stylesheet_filename.contains(['/', '\\']) {
            return Err(Md2HtmlError::InvalidConfig(format!(
                "stylesheet_filename must be a bare file name, got {:?}",
                c.stylesheet_filename
            )));
        }
        if c.logo_marker.is_empty() {
            return Err(Md2HtmlError::InvalidConfig(
                "logo_marker must not be empty".into(),
            ));
        }
        // Without the marker in its own markup the logo would be re-inserted
        // on every run.
        if !c.logo_markup.contains(&c.logo_marker) {
            return Err(Md2HtmlError::InvalidConfig(format!(
                "logo_markup must contain the logo marker {:?}",
                c.logo_marker
            )));
        }
        if let Some(date) = &c.pdf_date {
            crate::pipeline::pdf::parse_date(date)?;
        }
        if c.render_pdf && !c.render_html {
            return Err(Md2HtmlError::InvalidConfig(
                "render_pdf requires render_html".into(),
            ));
        }
        Ok(self.config)
    }
}

fn is_plain_subdir(dir: &str) -> bool {
    let path = Path::new(dir);
    !dir.is_empty()
        && path.is_relative()
        && path
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
}

/// Partial configuration loaded from JSON; unset fields keep their defaults.
///
/// ```rust
/// use md2html_publish::{ConfigOverrides, ConversionConfig};
///
/// let overrides: ConfigOverrides =
///     serde_json::from_str(r#"{ "max_concurrent_downloads": 2, "cache_enabled": false }"#).unwrap();
/// let config = ConversionConfig::builder().overrides(overrides).build().unwrap();
/// assert_eq!(config.max_concurrent_downloads, 2);
/// assert!(!config.cache_enabled);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub stylesheet_filename: Option<String>,
    pub stylesheet_url: Option<String>,
    pub logo_markup: Option<String>,
    pub logo_marker: Option<String>,
    pub images_subdir: Option<String>,
    pub styles_subdir: Option<String>,
    pub fetch_timeout_secs: Option<u64>,
    pub max_concurrent_downloads: Option<usize>,
    pub cache_enabled: Option<bool>,
    pub validate_links: Option<bool>,
    pub renderer_program: Option<String>,
    pub formatter_program: Option<String>,
    pub formatter_args: Option<Vec<String>>,
    pub pdf_program: Option<String>,
    pub copyright_holder: Option<String>,
    pub tool_timeout_secs: Option<u64>,
    pub toc_depth: Option<u8>,
    pub document_language: Option<String>,
    pub meta_author: Option<String>,
}

impl ConfigOverrides {
    /// Parse overrides from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, Md2HtmlError> {
        let text = std::fs::read_to_string(path).map_err(|e| Md2HtmlError::SourceRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&text).map_err(|e| {
            Md2HtmlError::InvalidConfig(format!("{}: {}", path.display(), e))
        })
    }

    fn apply_to(self, c: &mut ConversionConfig) {
        macro_rules! set {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = self.$field { c.$field = v; })*
            };
        }
        set!(
            stylesheet_filename,
            stylesheet_url,
            logo_markup,
            logo_marker,
            images_subdir,
            styles_subdir,
            fetch_timeout_secs,
            max_concurrent_downloads,
            cache_enabled,
            validate_links,
            renderer_program,
            formatter_program,
            formatter_args,
            pdf_program,
            copyright_holder,
            tool_timeout_secs,
            toc_depth,
            document_language,
            meta_author,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = ConversionConfig::builder().build().unwrap();
        assert_eq!(config.images_subdir, "images");
        assert_eq!(config.styles_subdir, "styles");
        assert!(config.cache_enabled);
        assert!(config.render_html);
        assert!(!config.format_source);
        assert!(config.logo_markup.contains(&config.logo_marker));
    }

    #[test]
    fn concurrency_is_clamped_to_one() {
        let config = ConversionConfig::builder()
            .max_concurrent_downloads(0)
            .build()
            .unwrap();
        assert_eq!(config.max_concurrent_downloads, 1);
    }

    #[test]
    fn logo_without_marker_is_rejected() {
        let err = ConversionConfig::builder()
            .logo_markup(r#"<img src="https://example.com/brand.png">"#)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("logo marker"), "got: {err}");
    }

    #[test]
    fn escaping_subdir_is_rejected() {
        assert!(ConversionConfig::builder()
            .images_subdir("../elsewhere")
            .build()
            .is_err());
        assert!(ConversionConfig::builder()
            .styles_subdir("/abs")
            .build()
            .is_err());
        assert!(ConversionConfig::builder()
            .images_subdir("assets/img")
            .build()
            .is_ok());
    }

    #[test]
    fn pdf_requires_html() {
        assert!(ConversionConfig::builder()
            .render_html(false)
            .render_pdf(true)
            .build()
            .is_err());
    }

    #[test]
    fn overrides_only_touch_set_fields() {
        let overrides: ConfigOverrides =
            serde_json::from_str(r#"{"styles_subdir": "css", "validate_links": true}"#).unwrap();
        let config = ConversionConfig::builder()
            .overrides(overrides)
            .build()
            .unwrap();
        assert_eq!(config.styles_subdir, "css");
        assert!(config.validate_links);
        assert_eq!(config.images_subdir, "images");
        assert_eq!(config.stylesheet_url, DEFAULT_STYLESHEET_URL);
    }

    #[test]
    fn zero_concurrency_from_overrides_is_rejected() {
        let overrides: ConfigOverrides =
            serde_json::from_str(r#"{"max_concurrent_downloads": 0}"#).unwrap();
        let err = ConversionConfig::builder()
            .overrides(overrides)
            .build()
            .unwrap_err();
        assert!(matches!(err, Md2HtmlError::InvalidConfig(_)));
    }

    #[test]
    fn zero_timeouts_from_overrides_are_rejected() {
        for json in [r#"{"fetch_timeout_secs": 0}"#, r#"{"tool_timeout_secs": 0}"#] {
            let overrides: ConfigOverrides = serde_json::from_str(json).unwrap();
            let err = ConversionConfig::builder()
                .overrides(overrides)
                .build()
                .unwrap_err();
            assert!(err.to_string().contains("timeout_secs"), "{json}: {err}");
        }
    }

    #[test]
    fn toc_depth_from_overrides_must_be_in_range() {
        for depth in [0, 7, 200] {
            let overrides: ConfigOverrides =
                serde_json::from_str(&format!(r#"{{"toc_depth": {depth}}}"#)).unwrap();
            assert!(ConversionConfig::builder().overrides(overrides).build().is_err());
        }
        assert_eq!(ConversionConfig::builder().toc_depth(200).build().unwrap().toc_depth, 6);
    }

    #[test]
    fn stylesheet_url_must_be_http() {
        let err = ConversionConfig::builder()
            .stylesheet_url("ftp://example.com/site.css")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("stylesheet_url"), "got: {err}");
        assert!(ConversionConfig::builder()
            .stylesheet_url("http://127.0.0.1:8080/site.css")
            .build()
            .is_ok());
    }

    #[test]
    fn formatter_defaults_to_prettier_write() {
        let config = ConversionConfig::default();
        assert_eq!(config.formatter_program, "prettier");
        assert_eq!(config.formatter_args, vec!["--write".to_string()]);
    }

    #[test]
    fn pdf_date_must_be_iso() {
        assert!(ConversionConfig::builder().pdf_date("2024-03-05").build().is_ok());
        assert!(ConversionConfig::builder().pdf_date("March 5").build().is_err());
    }

    #[test]
    fn unknown_override_field_is_an_error() {
        let parsed: Result<ConfigOverrides, _> = serde_json::from_str(r#"{"colour": "red"}"#);
        assert!(parsed.is_err());
    }
}
