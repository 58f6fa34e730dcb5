//! Immutable value types mirroring the host editor's coordinate and
//! addressing model.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(thiserror::Error, Debug)]
pub enum ValueError {
    #[error("negative position component: line={line} character={character}")]
    NegativePosition { line: i64, character: i64 },
    #[error("unparsable uri: {0}")]
    BadUri(String),
}

// ── Uri ──────────────────────────────────────────────────────────────────────

/// Resource locator with the host editor's component model.
///
/// Two Uris with identical component tuples address the same resource; no
/// canonicalization is performed beyond construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uri {
    pub scheme: String,
    pub authority: String,
    pub path: String,
    pub query: String,
    pub fragment: String,
}

impl Uri {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            scheme: "file".to_string(),
            authority: String::new(),
            path: path.as_ref().to_string_lossy().to_string(),
            query: String::new(),
            fragment: String::new(),
        }
    }

    /// Parse `scheme://authority/path?query#fragment`. A bare path (no
    /// scheme) parses as a file Uri.
    pub fn parse(value: &str) -> Result<Self, ValueError> {
        let Some((scheme, rest)) = value.split_once("://") else {
            if value.is_empty() {
                return Err(ValueError::BadUri(value.to_string()));
            }
            return Ok(Self::file(value));
        };
        if scheme.is_empty() {
            return Err(ValueError::BadUri(value.to_string()));
        }
        let (rest, fragment) = match rest.split_once('#') {
            Some((r, f)) => (r, f.to_string()),
            None => (rest, String::new()),
        };
        let (rest, query) = match rest.split_once('?') {
            Some((r, q)) => (r, q.to_string()),
            None => (rest, String::new()),
        };
        let (authority, path) = match rest.find('/') {
            Some(idx) => (rest[..idx].to_string(), rest[idx..].to_string()),
            None => (rest.to_string(), String::new()),
        };
        Ok(Self {
            scheme: scheme.to_string(),
            authority,
            path,
            query,
            fragment,
        })
    }

    /// Filesystem path for `file`-scheme Uris; the raw path component
    /// otherwise.
    pub fn fs_path(&self) -> &str {
        &self.path
    }

    pub fn is_file(&self) -> bool {
        self.scheme == "file"
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        if !self.fragment.is_empty() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}

// ── Position / Range / Selection ─────────────────────────────────────────────

/// Zero-based document coordinate, totally ordered line-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    /// Fails fast on negative components.
    pub fn new(line: i64, character: i64) -> Result<Self, ValueError> {
        if line < 0 || character < 0 {
            return Err(ValueError::NegativePosition { line, character });
        }
        Ok(Self {
            line: line as u32,
            character: character as u32,
        })
    }

    pub fn is_before(&self, other: &Position) -> bool {
        self < other
    }

    pub fn is_after(&self, other: &Position) -> bool {
        self > other
    }

    pub fn translate(&self, line_delta: i64, character_delta: i64) -> Result<Self, ValueError> {
        Self::new(
            self.line as i64 + line_delta,
            self.character as i64 + character_delta,
        )
    }

    pub fn with_line(&self, line: i64) -> Result<Self, ValueError> {
        Self::new(line, self.character as i64)
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.line
            .cmp(&other.line)
            .then(self.character.cmp(&other.character))
    }
}

/// Ordered pair of positions. `start <= end` is assumed by callers, not
/// enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn is_single_line(&self) -> bool {
        self.start.line == self.end.line
    }

    pub fn contains(&self, position: &Position) -> bool {
        *position >= self.start && *position <= self.end
    }

    pub fn contains_range(&self, other: &Range) -> bool {
        self.contains(&other.start) && self.contains(&other.end)
    }

    /// Overlapping part of the two ranges, if any.
    pub fn intersection(&self, other: &Range) -> Option<Range> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start > end {
            return None;
        }
        Some(Range::new(start, end))
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &Range) -> Range {
        Range::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Range plus cursor orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Position,
    pub active: Position,
}

impl Selection {
    pub fn new(anchor: Position, active: Position) -> Self {
        Self { anchor, active }
    }

    pub fn is_reversed(&self) -> bool {
        self.active < self.anchor
    }

    pub fn range(&self) -> Range {
        Range::new(self.anchor.min(self.active), self.anchor.max(self.active))
    }
}

// ── Edits ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

impl TextEdit {
    pub fn replace(range: Range, new_text: impl Into<String>) -> Self {
        Self {
            range,
            new_text: new_text.into(),
        }
    }

    pub fn insert(position: Position, new_text: impl Into<String>) -> Self {
        Self::replace(Range::new(position, position), new_text)
    }

    pub fn delete(range: Range) -> Self {
        Self::replace(range, "")
    }
}

/// Uri → ordered edit list, insertion-ordered across uris.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceEdit {
    entries: Vec<(Uri, Vec<TextEdit>)>,
}

impl WorkspaceEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, uri: Uri, edit: TextEdit) {
        if let Some((_, edits)) = self.entries.iter_mut().find(|(u, _)| *u == uri) {
            edits.push(edit);
            return;
        }
        self.entries.push((uri, vec![edit]));
    }

    pub fn entries(&self) -> &[(Uri, Vec<TextEdit>)] {
        &self.entries
    }

    pub fn size(&self) -> usize {
        self.entries.iter().map(|(_, e)| e.len()).sum()
    }
}

// ── Diagnostics ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Information,
    Hint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub range: Range,
    pub message: String,
    pub severity: DiagnosticSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

// ── Theme stubs ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeColor {
    pub id: String,
}

impl ThemeColor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeIcon {
    pub id: String,
}

impl ThemeIcon {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

// ── Disposable ───────────────────────────────────────────────────────────────

/// A teardown handle. `dispose` runs the wrapped closure at most once; every
/// later call is a no-op.
#[derive(Clone)]
pub struct Disposable {
    inner: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl Disposable {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(f)))),
        }
    }

    /// A handle whose disposal does nothing.
    pub fn noop() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    pub fn dispose(&self) {
        let f = self.inner.lock().ok().and_then(|mut slot| slot.take());
        if let Some(f) = f {
            f();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().map(|slot| slot.is_none()).unwrap_or(true)
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
