//! Lint diagnostics for sheets.
//!
//! Reports soft inconsistencies without modifying the document. Results
//! ride along with generation, archive loads and background changes.

use crate::document::DocumentContext;
use crate::images::ImageStore;
use crate::pages::PageCollection;
use std::collections::{HashMap, HashSet};
use std::fmt;

// ─── Diagnostic types ────────────────────────────────────────────────────

/// Severity of a lint finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Should be fixed: output will likely look wrong.
    Warning,
    /// Informational.
    Info,
}

/// A single diagnostic about a page, field or image.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// What the diagnostic is about (`page 2`, a field id, an image key).
    pub subject: String,
    /// Human-readable message.
    pub message: String,
    pub severity: Severity,
    /// Short rule identifier (e.g. "size-mismatch").
    pub rule: &'static str,
}

impl Diagnostic {
    fn warning(subject: impl Into<String>, rule: &'static str, message: String) -> Self {
        Self {
            subject: subject.into(),
            message,
            severity: Severity::Warning,
            rule,
        }
    }

    pub(crate) fn info(subject: impl Into<String>, rule: &'static str, message: String) -> Self {
        Self {
            subject: subject.into(),
            message,
            severity: Severity::Info,
            rule,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        write!(f, "{level}[{}] {}: {}", self.rule, self.subject, self.message)
    }
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Run all lint rules over the document and return diagnostics.
#[must_use]
pub fn lint_document(ctx: &DocumentContext) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    lint_missing_backgrounds(ctx, &mut diags);
    diags.extend(check_backgrounds(ctx.pages(), ctx.images()));
    lint_stale_character_values(ctx, &mut diags);
    diags
}

/// Decoded background sizes in page order, as `(page, size)`.
pub fn background_sizes(pages: &PageCollection, images: &ImageStore) -> Vec<(usize, (u32, u32))> {
    pages
        .iter()
        .enumerate()
        .filter_map(|(i, page)| {
            let entry = images.get(page.background.as_deref()?)?;
            Some((i, entry.size?))
        })
        .collect()
}

/// Most frequent background size. Ties go to the size encountered last.
pub fn dominant_size(sizes: &[(usize, (u32, u32))]) -> Option<(u32, u32)> {
    let mut tally: HashMap<(u32, u32), (usize, usize)> = HashMap::new();
    for (order, (_, size)) in sizes.iter().enumerate() {
        let slot = tally.entry(*size).or_insert((0, order));
        slot.0 += 1;
        slot.1 = order;
    }
    tally
        .into_iter()
        .max_by_key(|(_, (count, last))| (*count, *last))
        .map(|(size, _)| size)
}

/// Check that every page background decodes and that all share one size.
pub fn check_backgrounds(pages: &PageCollection, images: &ImageStore) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        if let Some(entry) = page.background.as_deref().and_then(|k| images.get(k))
            && entry.size.is_none()
        {
            diags.push(Diagnostic::warning(
                format!("page {i}"),
                "undecodable-background",
                format!("background `{}` is not a decodable image", entry.key),
            ));
        }
    }

    let sizes = background_sizes(pages, images);
    if let Some((w, h)) = dominant_size(&sizes) {
        for (page, (pw, ph)) in &sizes {
            if (*pw, *ph) != (w, h) {
                log::warn!("page {page} background is {pw}x{ph}, sheet layout uses {w}x{h}");
                diags.push(Diagnostic::warning(
                    format!("page {page}"),
                    "size-mismatch",
                    format!("background is {pw}x{ph} but the layout uses {w}x{h}"),
                ));
            }
        }
    }
    diags
}

// ─── Rules ────────────────────────────────────────────────────────────────

/// Pages pointing at a key the image store does not hold.
fn lint_missing_backgrounds(ctx: &DocumentContext, diags: &mut Vec<Diagnostic>) {
    for (i, page) in ctx.pages().iter().enumerate() {
        if let Some(key) = page.background.as_deref()
            && !ctx.images().contains(key)
        {
            diags.push(Diagnostic::warning(
                format!("page {i}"),
                "missing-background",
                format!("background `{key}` is not in the image store"),
            ));
        }
    }
}

/// Character values kept for fields that no longer exist.
fn lint_stale_character_values(ctx: &DocumentContext, diags: &mut Vec<Diagnostic>) {
    let known: HashSet<&str> = ctx.tree().walk().into_iter().map(|id| id.as_str()).collect();
    for record in ctx.characters().iter() {
        for key in record.values.keys() {
            if !known.contains(key.as_str()) {
                diags.push(Diagnostic::info(
                    key.clone(),
                    "stale-character-value",
                    format!(
                        "character `{}` holds a value for a field that does not exist",
                        record.name
                    ),
                ));
            }
        }
    }
}
