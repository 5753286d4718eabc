//! Heading outline of a card body.
//!
//! A body is split once into a preamble and a flat, ordered list of headed
//! sections. Every edit the engine makes (merge, checklist toggles, linking)
//! is a list operation on this outline, never a whole-string substitution.
//! Serializing an outline reproduces the parsed text byte for byte.

use std::fmt;
use std::ops::Range;

// ---------------------------------------------------------------------------
// SectionKind / SectionId
// ---------------------------------------------------------------------------

/// Sections the engine recognizes and may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Purpose,
    Problem,
    Proposal,
    AcceptanceChecklist,
    SubIssues,
    SubIssuesProgress,
}

impl SectionKind {
    pub fn all() -> &'static [SectionKind] {
        &[
            SectionKind::Purpose,
            SectionKind::Problem,
            SectionKind::Proposal,
            SectionKind::AcceptanceChecklist,
            SectionKind::SubIssues,
            SectionKind::SubIssuesProgress,
        ]
    }

    pub fn heading(self) -> &'static str {
        match self {
            SectionKind::Purpose => "Purpose",
            SectionKind::Problem => "Problem",
            SectionKind::Proposal => "Proposal",
            SectionKind::AcceptanceChecklist => "Acceptance Checklist",
            SectionKind::SubIssues => "Sub-Issues",
            SectionKind::SubIssuesProgress => "Sub-Issues Progress",
        }
    }

    /// Exact, case-sensitive match on heading text.
    pub fn from_heading(text: &str) -> Option<SectionKind> {
        SectionKind::all().iter().copied().find(|k| k.heading() == text)
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.heading())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionId {
    Known(SectionKind),
    /// Any other heading. Preserved as-is, never merged into.
    Unrecognized(String),
}

impl SectionId {
    fn from_heading(text: &str) -> Self {
        match SectionKind::from_heading(text) {
            Some(kind) => SectionId::Known(kind),
            None => SectionId::Unrecognized(text.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Section
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub level: u8,
    pub heading: String,
    pub id: SectionId,
    /// The raw heading line, including its line ending when present.
    pub line: String,
    /// Everything after the heading line up to the next heading.
    pub content: String,
}

impl Section {
    pub fn new(level: u8, heading: &str, content: String) -> Self {
        Self {
            level,
            heading: heading.to_string(),
            id: SectionId::from_heading(heading),
            line: format!("{} {}\n", "#".repeat(level as usize), heading),
            content,
        }
    }

    fn len(&self) -> usize {
        self.line.len() + self.content.len()
    }
}

// ---------------------------------------------------------------------------
// Fence tracking
// ---------------------------------------------------------------------------

/// Tracks fenced code blocks while scanning lines in order.
#[derive(Debug, Default)]
pub(crate) struct Fence {
    open: Option<(char, usize)>,
}

impl Fence {
    /// Returns true if `line` is a fence delimiter or lies inside a fence.
    pub(crate) fn observe(&mut self, line: &str) -> bool {
        let text = strip_indent(line.trim_end_matches(['\n', '\r']));
        match self.open {
            Some((ch, len)) => {
                let run = text.chars().take_while(|&c| c == ch).count();
                if run >= len && text[run * ch.len_utf8()..].trim().is_empty() {
                    self.open = None;
                }
                true
            }
            None => {
                let Some(ch) = text.chars().next().filter(|c| *c == '`' || *c == '~') else {
                    return false;
                };
                let run = text.chars().take_while(|&c| c == ch).count();
                if run >= 3 {
                    self.open = Some((ch, run));
                    true
                } else {
                    false
                }
            }
        }
    }

    /// The delimiter line that closes the fence currently open, if any.
    pub(crate) fn closer(&self) -> Option<String> {
        self.open.map(|(ch, len)| ch.to_string().repeat(len))
    }
}

/// Strip up to three leading spaces.
fn strip_indent(line: &str) -> &str {
    let spaces = line.bytes().take(3).take_while(|b| *b == b' ').count();
    &line[spaces..]
}

/// Parse an ATX heading line into (level, text).
pub(crate) fn parse_heading(line: &str) -> Option<(u8, String)> {
    let text = strip_indent(line.trim_end_matches(['\n', '\r']));
    let level = text.bytes().take_while(|b| *b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &text[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    Some((level as u8, rest.trim().to_string()))
}

// ---------------------------------------------------------------------------
// Outline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outline {
    pub preamble: String,
    pub sections: Vec<Section>,
}

impl Outline {
    pub fn parse(text: &str) -> Self {
        let mut outline = Outline::default();
        let mut fence = Fence::default();

        for line in text.split_inclusive('\n') {
            let heading = if fence.observe(line) {
                None
            } else {
                parse_heading(line)
            };
            match heading {
                Some((level, heading)) => outline.sections.push(Section {
                    level,
                    id: SectionId::from_heading(&heading),
                    heading,
                    line: line.to_string(),
                    content: String::new(),
                }),
                None => match outline.sections.last_mut() {
                    Some(section) => section.content.push_str(line),
                    None => outline.preamble.push_str(line),
                },
            }
        }
        outline
    }

    pub fn serialize(&self) -> String {
        let mut out = self.preamble.clone();
        for section in &self.sections {
            out.push_str(&section.line);
            out.push_str(&section.content);
        }
        out
    }

    /// Index of the canonical (first) section for `kind`.
    pub fn find(&self, kind: SectionKind) -> Option<usize> {
        self.sections
            .iter()
            .position(|s| s.id == SectionId::Known(kind))
    }

    pub fn count(&self, kind: SectionKind) -> usize {
        self.sections
            .iter()
            .filter(|s| s.id == SectionId::Known(kind))
            .count()
    }

    /// End (exclusive) of the span starting at `index`: the next section of
    /// equal or higher rank, or the end of the list.
    pub fn span_end(&self, index: usize) -> usize {
        let level = self.sections[index].level;
        self.sections[index + 1..]
            .iter()
            .position(|s| s.level <= level)
            .map(|offset| index + 1 + offset)
            .unwrap_or(self.sections.len())
    }

    /// Text under the canonical heading for `kind`, nested subsections included.
    pub fn section_text(&self, kind: SectionKind) -> Option<String> {
        let index = self.find(kind)?;
        let end = self.span_end(index);
        let mut text = self.sections[index].content.clone();
        for section in &self.sections[index + 1..end] {
            text.push_str(&section.line);
            text.push_str(&section.content);
        }
        Some(text)
    }

    /// Byte range of the canonical section's text (heading line excluded)
    /// within `self.serialize()`.
    pub fn span_range(&self, kind: SectionKind) -> Option<Range<usize>> {
        let index = self.find(kind)?;
        let end = self.span_end(index);
        let start = self.preamble.len()
            + self.sections[..index].iter().map(Section::len).sum::<usize>()
            + self.sections[index].line.len();
        let len = self.sections[index].content.len()
            + self.sections[index + 1..end]
                .iter()
                .map(Section::len)
                .sum::<usize>();
        Some(start..start + len)
    }

    /// Remove every section after `index` that repeats its heading, at any
    /// level, together with their nested subsections. Returns how many were
    /// removed.
    pub(crate) fn remove_duplicates_of(&mut self, index: usize) -> usize {
        let id = self.sections[index].id.clone();
        let mut removed = 0;
        let mut i = index + 1;
        while i < self.sections.len() {
            if self.sections[i].id == id {
                let end = self.span_end(i);
                self.sections.drain(i..end);
                removed += 1;
            } else {
                i += 1;
            }
        }
        removed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
