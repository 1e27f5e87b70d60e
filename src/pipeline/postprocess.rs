//! Post-processing: turn renderer output into the published document.
//!
//! Rendering gives us a standalone HTML5 page, but it still points at remote
//! images, has the renderer's own `<style>` block, lacks our meta tags and
//! leaves bare URLs as plain text. This module fixes all of that in a single
//! parse/serialise cycle.
//!
//! ## Step Order
//!
//! 1. Meta-tag injection (description, viewport, charset, generator, author)
//! 2. Image localization (remote `src` → `images/<name>`, failures dropped)
//! 3. Bare-URL autolinking
//! 4. Logo insertion
//! 5. Stylesheet linking
//! 6. Structural repair (`<hr style>`, `<html lang>`, `<img alt>`)
//! 7. Anchor validation (optional, report only)
//!
//! Localization needs the network but the DOM is `!Send`, so the work is
//! split: [`image_sources`] lists what to fetch, the caller resolves the
//! URLs concurrently, and [`process_document`] applies every step
//! synchronously with the resolved results in hand.
//!
//! ## Idempotence
//!
//! Feeding the output back through [`process_document`] yields the same
//! bytes. Meta tags and the stylesheet link are removed before they are
//! re-inserted, localized images are no longer remote, linked URLs sit inside
//! `<a>` and the logo is detected by its marker.

use crate::config::ConversionConfig;
use crate::context::{ConversionContext, SENTINEL};
use crate::error::{AssetError, Md2HtmlError};
use crate::output::{DroppedImage, PostProcessReport};
use crate::pipeline::assets::{is_remote_url, AssetStore, LocalAsset, IMAGE_FALLBACK_NAME};
use crate::pipeline::html::{
    append_child, attr, create_element, create_text, descendants, detach, insert_child, is_element,
    parse_fragment, remove_attr, replace_with, set_attr, tag_name, text, HtmlDocument,
};
use crate::pipeline::persist::write_atomic;
use markup5ever_rcdom::{Handle, NodeData};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Alt text given to images that have none.
pub const DEFAULT_ALT_TEXT: &str = "Image";

const VIEWPORT: &str = "width=device-width, initial-scale=1.0";

/// Elements whose text is never autolinked.
const AUTOLINK_SKIP: &[&str] = &["a", "code", "pre", "script", "style", "textarea"];

static RE_BARE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s<>"]+"#).unwrap());

/// Characters stripped from the end of a detected URL.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '"', ')', ']'];

/// Everything the post-processing steps need besides the document itself.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessInputs<'a> {
    /// Description meta content; [`SENTINEL`] means "no description tag".
    pub description: &'a str,
    pub generator: &'a str,
    pub author: &'a str,
    pub language: &'a str,
    pub logo_markup: &'a str,
    pub logo_marker: &'a str,
    /// Href of the managed stylesheet, relative to the output file.
    pub stylesheet_href: &'a str,
    /// Localization outcome per remote image URL.
    pub images: &'a HashMap<String, Result<LocalAsset, AssetError>>,
    pub validate_links: bool,
}

/// Remote image URLs in `html` that localization will try to fetch, in
/// document order and without duplicates. Logo images are excluded.
pub fn image_sources(html: &str, logo_marker: &str) -> Vec<String> {
    let doc = HtmlDocument::parse(html);
    let mut seen = HashSet::new();
    doc.elements("img")
        .iter()
        .filter_map(|img| attr(img, "src"))
        .filter(|src| is_remote_url(src) && !src.contains(logo_marker))
        .filter(|src| seen.insert(src.clone()))
        .collect()
}

/// Apply every post-processing step to `html` and return the serialised
/// result together with a report of what changed.
pub fn process_document(
    html: &str,
    inputs: &PostProcessInputs<'_>,
) -> Result<(String, PostProcessReport), Md2HtmlError> {
    let doc = HtmlDocument::parse(html);
    let head = doc
        .head()
        .ok_or(Md2HtmlError::MalformedDocument { element: "head" })?;
    let body = doc
        .body()
        .ok_or(Md2HtmlError::MalformedDocument { element: "body" })?;

    let mut report = PostProcessReport::default();

    inject_meta_tags(&doc, &head, inputs);
    localize_images(&doc, inputs, &mut report);
    report.links_created = autolink(&body);
    report.logo_inserted = insert_logo(&doc, &body, inputs);
    report.style_blocks_removed = link_stylesheet(&doc, &head, inputs.stylesheet_href);
    report.alt_texts_added = repair_structure(&doc, inputs.language);
    if inputs.validate_links {
        report.broken_anchors = broken_anchors(&doc);
        for anchor in &report.broken_anchors {
            warn!("Link to #{} has no target in the document", anchor);
        }
    }

    let out = doc.to_html()?;
    Ok((out, report))
}

// ── Step 1: Meta tags ────────────────────────────────────────────────────────

fn inject_meta_tags(doc: &HtmlDocument, head: &Handle, inputs: &PostProcessInputs<'_>) {
    let with_description = inputs.description != SENTINEL;
    let managed = |node: &Handle| match attr(node, "name").as_deref() {
        Some("description") => with_description,
        Some("viewport" | "generator" | "author") => true,
        _ => attr(node, "charset").is_some(),
    };
    for meta in doc.elements("meta") {
        if managed(&meta) {
            detach(&meta);
        }
    }

    let mut tags = Vec::with_capacity(5);
    if with_description {
        tags.push(create_element(
            "meta",
            &[("name", "description"), ("content", inputs.description)],
        ));
    }
    tags.push(create_element(
        "meta",
        &[("name", "viewport"), ("content", VIEWPORT)],
    ));
    tags.push(create_element("meta", &[("charset", "utf-8")]));
    tags.push(create_element(
        "meta",
        &[("name", "generator"), ("content", inputs.generator)],
    ));
    tags.push(create_element(
        "meta",
        &[("name", "author"), ("content", inputs.author)],
    ));

    // Each tag goes to the front, so the last one inserted ends up first.
    for tag in tags {
        insert_child(head, 0, tag);
    }
}

// ── Step 2: Image localization ───────────────────────────────────────────────

fn localize_images(doc: &HtmlDocument, inputs: &PostProcessInputs<'_>, report: &mut PostProcessReport) {
    for img in doc.elements("img") {
        let Some(src) = attr(&img, "src") else {
            continue;
        };
        if !is_remote_url(&src) || src.contains(inputs.logo_marker) {
            continue;
        }
        match inputs.images.get(&src) {
            Some(Ok(asset)) => {
                set_attr(&img, "src", &asset.relative_path);
                report.images_localized += 1;
            }
            Some(Err(e)) => {
                warn!("Dropping image {}: {}", src, e);
                detach(&img);
                report.images_dropped.push(DroppedImage {
                    src,
                    error: Some(e.clone()),
                });
            }
            None => {
                warn!("Dropping image {}: not resolved", src);
                detach(&img);
                report.images_dropped.push(DroppedImage { src, error: None });
            }
        }
    }
}

// ── Step 3: Autolinking ──────────────────────────────────────────────────────

fn autolink(body: &Handle) -> usize {
    let mut text_nodes = Vec::new();
    collect_linkable_text(body, &mut text_nodes);

    let mut created = 0;
    for node in text_nodes {
        let Some(content) = text(&node) else {
            continue;
        };
        let segments = split_urls(&content);
        if segments.len() == 1 && !segments[0].is_url {
            continue;
        }
        let replacements = segments
            .into_iter()
            .map(|seg| {
                if seg.is_url {
                    created += 1;
                    let link = create_element(
                        "a",
                        &[
                            ("href", seg.text),
                            ("target", "_blank"),
                            ("rel", "noopener noreferrer"),
                        ],
                    );
                    append_child(&link, create_text(seg.text));
                    link
                } else {
                    create_text(seg.text)
                }
            })
            .collect();
        replace_with(&node, replacements);
    }
    created
}

fn collect_linkable_text(node: &Handle, out: &mut Vec<Handle>) {
    for child in node.children.borrow().iter() {
        match &child.data {
            NodeData::Text { .. } => out.push(child.clone()),
            NodeData::Element { .. } => {
                let skip = tag_name(child).is_some_and(|t| AUTOLINK_SKIP.contains(&t));
                if !skip {
                    collect_linkable_text(child, out);
                }
            }
            _ => {}
        }
    }
}

/// A piece of a text node: plain text or a URL to link.
#[derive(Debug, PartialEq, Eq)]
struct Segment<'a> {
    text: &'a str,
    is_url: bool,
}

/// Split `content` into alternating text and URL segments. Concatenating the
/// segments gives back `content` exactly.
fn split_urls(content: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    for m in RE_BARE_URL.find_iter(content) {
        let url = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        if !url.split_once("://").is_some_and(|(_, rest)| !rest.is_empty()) {
            continue;
        }
        if m.start() > cursor {
            segments.push(Segment {
                text: &content[cursor..m.start()],
                is_url: false,
            });
        }
        segments.push(Segment {
            text: url,
            is_url: true,
        });
        cursor = m.start() + url.len();
    }
    if cursor < content.len() || segments.is_empty() {
        segments.push(Segment {
            text: &content[cursor..],
            is_url: false,
        });
    }
    segments
}

// ── Step 4: Logo ─────────────────────────────────────────────────────────────

fn insert_logo(doc: &HtmlDocument, body: &Handle, inputs: &PostProcessInputs<'_>) -> bool {
    let present = doc
        .elements("img")
        .iter()
        .filter_map(|img| attr(img, "src"))
        .any(|src| src.contains(inputs.logo_marker));
    if present {
        debug!("Logo already present");
        return false;
    }
    for (i, node) in parse_fragment(inputs.logo_markup).into_iter().enumerate() {
        insert_child(body, i, node);
    }
    true
}

// ── Step 5: Stylesheet ───────────────────────────────────────────────────────

fn link_stylesheet(doc: &HtmlDocument, head: &Handle, href: &str) -> usize {
    let styles = doc.elements("style");
    let removed = styles.len();
    for style in styles {
        detach(&style);
    }

    for link in doc.elements("link") {
        let is_stylesheet = attr(&link, "rel")
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("stylesheet")));
        if is_stylesheet && attr(&link, "href").as_deref() == Some(href) {
            detach(&link);
        }
    }

    append_child(
        head,
        create_element("link", &[("rel", "stylesheet"), ("href", href)]),
    );
    removed
}

// ── Step 6: Structural repair ────────────────────────────────────────────────

fn repair_structure(doc: &HtmlDocument, language: &str) -> usize {
    for hr in doc.elements("hr") {
        remove_attr(&hr, "style");
    }

    if let Some(root) = doc.root() {
        if attr(&root, "lang").map_or(true, |l| l.trim().is_empty()) {
            set_attr(&root, "lang", language);
        }
    }

    let mut added = 0;
    for img in doc.elements("img") {
        if attr(&img, "alt").map_or(true, |a| a.trim().is_empty()) {
            set_attr(&img, "alt", DEFAULT_ALT_TEXT);
            added += 1;
        }
    }
    added
}

// ── Step 7: Anchor validation ────────────────────────────────────────────────

fn broken_anchors(doc: &HtmlDocument) -> Vec<String> {
    let mut targets = HashSet::new();
    for node in descendants(doc.document()) {
        if let Some(id) = attr(&node, "id") {
            targets.insert(id);
        }
        if is_element(&node, "a") {
            if let Some(name) = attr(&node, "name") {
                targets.insert(name);
            }
        }
    }

    let mut broken = Vec::new();
    for link in doc.elements("a") {
        let Some(href) = attr(&link, "href") else {
            continue;
        };
        let Some(target) = href.strip_prefix('#') else {
            continue;
        };
        if !target.is_empty() && !targets.contains(target) && !broken.iter().any(|b| b == target) {
            broken.push(target.to_string());
        }
    }
    broken
}

// ── Stage entry point ────────────────────────────────────────────────────────

/// Post-process the rendered document in `ctx` and write the final HTML.
///
/// Consumes `ctx.document`; the renderer's temp file is removed whether or
/// not the write succeeds.
pub async fn run(
    ctx: &mut ConversionContext,
    config: &ConversionConfig,
    store: &AssetStore,
) -> Result<(PostProcessReport, u64), Md2HtmlError> {
    let rendered = ctx
        .document
        .take()
        .ok_or_else(|| Md2HtmlError::Internal("post-processing requires rendered HTML".into()))?;
    let href = ctx
        .stylesheet_href
        .clone()
        .ok_or_else(|| Md2HtmlError::Internal("stylesheet was not ensured".into()))?;

    tokio::fs::create_dir_all(&ctx.images_dir)
        .await
        .map_err(|e| Md2HtmlError::OutputWriteFailed {
            path: ctx.images_dir.clone(),
            source: e,
        })?;

    let sources = image_sources(&rendered.html, &config.logo_marker);
    let fetch_start = Instant::now();
    let images = store
        .ensure_all(
            &sources,
            &config.images_subdir,
            IMAGE_FALLBACK_NAME,
            config.max_concurrent_downloads,
        )
        .await;
    let fetch_ms = fetch_start.elapsed().as_millis() as u64;

    let inputs = PostProcessInputs {
        description: &ctx.description,
        generator: &config.meta_generator,
        author: &config.meta_author,
        language: &config.document_language,
        logo_markup: &config.logo_markup,
        logo_marker: &config.logo_marker,
        stylesheet_href: &href,
        images: &images,
        validate_links: config.validate_links,
    };
    let (html, report) = process_document(&rendered.html, &inputs)?;

    write_atomic(&ctx.output, html)
        .await
        .map_err(|e| Md2HtmlError::OutputWriteFailed {
            path: ctx.output.clone(),
            source: e,
        })?;
    info!(
        "Wrote {} ({} images localized, {} dropped, {} links)",
        ctx.output.display(),
        report.images_localized,
        report.images_dropped.len(),
        report.links_created
    );

    if let Err(e) = rendered.temp.close() {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove renderer output: {}", e);
        }
    }

    Ok((report, fetch_ms))
}
