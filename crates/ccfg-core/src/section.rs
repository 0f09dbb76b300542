//! Versioned, marker-delimited sections inside a Markdown document.
//!
//! A managed section looks like:
//!
//! ```text
//! <!-- ccfg:begin:rust-conventions 1.2.0 -->
//!
//! ...content...
//!
//! <!-- ccfg:end:rust-conventions -->
//! ```
//!
//! Everything outside the markers belongs to the user and is passed through
//! byte-for-byte.

use crate::error::{CcfgError, Result};
use crate::io;
use crate::paths;
use crate::types::UpsertOutcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const BEGIN_PREFIX: &str = "<!-- ccfg:begin:";
pub const END_PREFIX: &str = "<!-- ccfg:end:";
const COMMENT_CLOSE: &str = "-->";

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker<'a> {
    Begin { id: &'a str, version: &'a str },
    End { id: &'a str },
}

/// Parse a single line as a begin or end marker. Identifiers are taken
/// verbatim; nothing in them is interpreted as a pattern.
pub fn parse_marker(line: &str) -> Option<Marker<'_>> {
    let body = line.trim().strip_suffix(COMMENT_CLOSE)?;
    if let Some(rest) = body.strip_prefix(BEGIN_PREFIX) {
        let mut parts = rest.split_whitespace();
        let id = parts.next()?;
        let version = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Marker::Begin { id, version })
    } else if let Some(rest) = body.strip_prefix(END_PREFIX) {
        let mut parts = rest.split_whitespace();
        let id = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Marker::End { id })
    } else {
        None
    }
}

pub fn begin_marker(id: &str, version: &str) -> String {
    format!("{BEGIN_PREFIX}{id} {version} {COMMENT_CLOSE}")
}

pub fn end_marker(id: &str) -> String {
    format!("{END_PREFIX}{id} {COMMENT_CLOSE}")
}

// ---------------------------------------------------------------------------
// SectionSpec
// ---------------------------------------------------------------------------

/// One managed block to write: identifier, version, and body text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub id: String,
    pub version: String,
    pub content: String,
}

impl SectionSpec {
    pub fn new(
        id: impl Into<String>,
        version: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self> {
        let spec = Self {
            id: id.into(),
            version: version.into(),
            content: content.into(),
        };
        paths::validate_section_id(&spec.id)?;
        paths::validate_version(&spec.version)?;
        if spec.content.lines().any(|l| parse_marker(l).is_some()) {
            return Err(CcfgError::MarkerInContent(spec.id));
        }
        Ok(spec)
    }

    /// Render the full block, terminated by a newline.
    pub fn render(&self) -> String {
        let body = self.content.trim_end_matches(['\n', '\r']);
        let begin = begin_marker(&self.id, &self.version);
        let end = end_marker(&self.id);
        if body.is_empty() {
            format!("{begin}\n\n{end}\n")
        } else {
            format!("{begin}\n\n{body}\n\n{end}\n")
        }
    }
}

// ---------------------------------------------------------------------------
// Validation report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingEnd,
    MissingBegin,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerIssue {
    pub id: String,
    pub kind: IssueKind,
}

impl std::fmt::Display for MarkerIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            IssueKind::MissingEnd => write!(f, "section '{}' has no end marker", self.id),
            IssueKind::MissingBegin => write!(f, "section '{}' has no begin marker", self.id),
            IssueKind::Duplicate => write!(f, "section '{}' is declared more than once", self.id),
        }
    }
}

/// A section as found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionInfo {
    pub id: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// Text operations
// ---------------------------------------------------------------------------

/// Version of the first begin marker whose id is exactly `id`.
pub fn version_in(text: &str, id: &str) -> Option<String> {
    text.lines().find_map(|line| match parse_marker(line) {
        Some(Marker::Begin { id: found, version }) if found == id => Some(version.to_string()),
        _ => None,
    })
}

/// All begin markers in document order.
pub fn sections_in(text: &str) -> Vec<SectionInfo> {
    text.lines()
        .filter_map(|line| match parse_marker(line) {
            Some(Marker::Begin { id, version }) => Some(SectionInfo {
                id: id.to_string(),
                version: version.to_string(),
            }),
            _ => None,
        })
        .collect()
}

/// Compare begin and end markers as multisets per id.
pub fn check_markers(text: &str) -> Vec<MarkerIssue> {
    let mut begins: BTreeMap<&str, usize> = BTreeMap::new();
    let mut ends: BTreeMap<&str, usize> = BTreeMap::new();
    for line in text.lines() {
        match parse_marker(line) {
            Some(Marker::Begin { id, .. }) => *begins.entry(id).or_default() += 1,
            Some(Marker::End { id }) => *ends.entry(id).or_default() += 1,
            None => {}
        }
    }

    let mut ids: Vec<&str> = begins.keys().chain(ends.keys()).copied().collect();
    ids.sort_unstable();
    ids.dedup();

    let mut issues = Vec::new();
    for id in ids {
        let b = begins.get(id).copied().unwrap_or(0);
        let e = ends.get(id).copied().unwrap_or(0);
        if b > e {
            issues.push(MarkerIssue {
                id: id.to_string(),
                kind: IssueKind::MissingEnd,
            });
        } else if e > b {
            issues.push(MarkerIssue {
                id: id.to_string(),
                kind: IssueKind::MissingBegin,
            });
        }
        if b > 1 {
            issues.push(MarkerIssue {
                id: id.to_string(),
                kind: IssueKind::Duplicate,
            });
        }
    }
    issues
}

#[derive(Clone, Copy)]
enum ScanState<'a> {
    Outside,
    Inside(&'a str),
}

/// Replace the span from the begin marker of `spec.id` through its end marker
/// (inclusive) with the rendered block. Lines outside the span are copied
/// unchanged.
fn replace_span(text: &str, spec: &SectionSpec, path: &Path) -> Result<String> {
    let block = spec.render();
    let mut out = String::with_capacity(text.len() + block.len());
    let mut state = ScanState::Outside;

    for line in text.split_inclusive('\n') {
        match state {
            ScanState::Outside => match parse_marker(line) {
                Some(Marker::Begin { id, .. }) if id == spec.id => {
                    state = ScanState::Inside(spec.id.as_str());
                }
                _ => out.push_str(line),
            },
            ScanState::Inside(target) => {
                if let Some(Marker::End { id }) = parse_marker(line) {
                    if id == target {
                        out.push_str(&block);
                        if !line.ends_with('\n') {
                            out.pop();
                        }
                        state = ScanState::Outside;
                    }
                }
            }
        }
    }

    if let ScanState::Inside(id) = state {
        return Err(CcfgError::UnterminatedSection {
            id: id.to_string(),
            path: path.to_path_buf(),
        });
    }
    Ok(out)
}

/// Insert a new block above the footer heading, or append it with a blank
/// line separator when there is no footer. A footer line inside another
/// managed section does not count.
fn insert_block(text: &str, spec: &SectionSpec, footer_heading: &str) -> String {
    let block = spec.render();

    let mut offset = 0;
    let mut state = ScanState::Outside;
    for line in text.split_inclusive('\n') {
        match (state, parse_marker(line)) {
            (ScanState::Outside, Some(Marker::Begin { id, .. })) => state = ScanState::Inside(id),
            (ScanState::Inside(open), Some(Marker::End { id })) if open == id => {
                state = ScanState::Outside;
            }
            (ScanState::Outside, _) if line.trim_end() == footer_heading => {
                let mut out = String::with_capacity(text.len() + block.len() + 1);
                out.push_str(&text[..offset]);
                out.push_str(&block);
                out.push('\n');
                out.push_str(&text[offset..]);
                return out;
            }
            _ => {}
        }
        offset += line.len();
    }

    if text.is_empty() {
        return block;
    }
    let mut out = String::with_capacity(text.len() + block.len() + 2);
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&block);
    out
}

/// Pure form of [`upsert`]: returns the new text and what happened.
pub fn upsert_text(
    text: &str,
    spec: &SectionSpec,
    footer_heading: &str,
    path: &Path,
) -> Result<(String, UpsertOutcome)> {
    let begin_count = text
        .lines()
        .filter(|l| matches!(parse_marker(l), Some(Marker::Begin { id, .. }) if id == spec.id))
        .count();

    if begin_count == 0 {
        return Ok((
            insert_block(text, spec, footer_heading),
            UpsertOutcome::Added,
        ));
    }
    if begin_count > 1 {
        return Err(CcfgError::DuplicateSection {
            id: spec.id.clone(),
            count: begin_count,
            path: path.to_path_buf(),
        });
    }

    let current = version_in(text, &spec.id).unwrap_or_default();
    if current == spec.version {
        tracing::debug!(
            section = %spec.id,
            version = %spec.version,
            "section already at this version; content not compared"
        );
        return Ok((text.to_string(), UpsertOutcome::Unchanged));
    }

    let updated = replace_span(text, spec, path)?;
    Ok((updated, UpsertOutcome::Updated))
}

/// Render a fresh document: each block in order, then the footer heading.
pub fn render_document(sections: &[SectionSpec], footer_heading: &str) -> String {
    let mut out = String::new();
    for spec in sections {
        out.push_str(&spec.render());
        out.push('\n');
    }
    out.push_str(footer_heading);
    out.push('\n');
    out
}

// ---------------------------------------------------------------------------
// File operations
// ---------------------------------------------------------------------------

/// True iff a begin marker for `id` exists. A missing document has none.
pub fn has_section(doc: &Path, id: &str) -> Result<bool> {
    Ok(get_version(doc, id)?.is_some())
}

pub fn get_version(doc: &Path, id: &str) -> Result<Option<String>> {
    let Some(text) = io::read_if_exists(doc)? else {
        return Ok(None);
    };
    Ok(version_in(&text, id))
}

pub fn list(doc: &Path) -> Result<Vec<SectionInfo>> {
    let Some(text) = io::read_if_exists(doc)? else {
        return Ok(Vec::new());
    };
    Ok(sections_in(&text))
}

/// Add, refresh, or skip a managed section. A missing document is created.
pub fn upsert(doc: &Path, spec: &SectionSpec, footer_heading: &str) -> Result<UpsertOutcome> {
    let text = io::read_if_exists(doc)?.unwrap_or_default();
    let (updated, outcome) = upsert_text(&text, spec, footer_heading, doc)?;
    if outcome.is_write() {
        io::atomic_write(doc, updated.as_bytes())?;
    }
    Ok(outcome)
}

/// Write a new document holding `sections` followed by the footer heading.
/// Refuses to touch an existing file.
pub fn create(doc: &Path, sections: &[SectionSpec], footer_heading: &str) -> Result<()> {
    if doc.exists() {
        return Err(CcfgError::DocumentExists(doc.to_path_buf()));
    }
    let text = render_document(sections, footer_heading);
    io::atomic_write(doc, text.as_bytes())
}

/// Report unbalanced or duplicated markers. A missing document is clean.
pub fn validate(doc: &Path) -> Result<Vec<MarkerIssue>> {
    let Some(text) = io::read_if_exists(doc)? else {
        return Ok(Vec::new());
    };
    Ok(check_markers(&text))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
