//! Idempotent insert-or-replace of a canonical section.

use crate::section::{parse_heading, Fence, Outline, Section, SectionKind};

/// Level of a section appended to a body that lacks it.
const APPENDED_LEVEL: u8 = 2;

/// Merge `content` into `body` under the heading for `kind`.
///
/// Running this twice with the same `content` yields the same bytes as
/// running it once.
pub fn merge_section(body: &str, kind: SectionKind, content: &str) -> String {
    let mut outline = Outline::parse(body);
    outline.merge(kind, content);
    outline.serialize()
}

impl Outline {
    /// Replace the canonical section for `kind` (and its nested subsections)
    /// with `content`, or append it as a level-2 section when missing.
    /// Later duplicates of the same heading are dropped.
    ///
    /// `content` is first contained within the section so that a later parse
    /// finds the same span.
    pub fn merge(&mut self, kind: SectionKind, content: &str) {
        let body = normalize(content);

        let Some(index) = self.find(kind) else {
            self.append(kind, &contain(&body, kind, APPENDED_LEVEL));
            return;
        };
        let body = contain(&body, kind, self.sections[index].level);

        let removed = self.remove_duplicates_of(index);
        if removed > 0 {
            tracing::warn!(section = %kind, removed, "collapsed duplicate sections");
        }

        let end = self.span_end(index);
        let followed = end < self.sections.len();
        let mut section = self.sections[index].clone();
        if !section.line.ends_with('\n') {
            section.line.push('\n');
        }
        section.content = canonical_content(&body, followed);
        self.sections.splice(index..end, [section]);
    }

    fn append(&mut self, kind: SectionKind, body: &str) {
        // A body ending inside a fence would swallow the new heading.
        let closer = open_fence(&self.serialize());
        match self.sections.last_mut() {
            Some(last) => {
                if !last.line.ends_with('\n') {
                    last.line.push('\n');
                }
                if let Some(closer) = &closer {
                    close_fence(&mut last.content, closer);
                }
                if last.content.trim().is_empty() {
                    last.content = "\n".to_string();
                } else {
                    trim_trailing_whitespace(&mut last.content);
                    last.content.push_str("\n\n");
                }
            }
            None => {
                if let Some(closer) = &closer {
                    close_fence(&mut self.preamble, closer);
                }
                trim_trailing_whitespace(&mut self.preamble);
                if !self.preamble.is_empty() {
                    self.preamble.push_str("\n\n");
                }
            }
        }
        self.sections.push(Section::new(
            APPENDED_LEVEL,
            kind.heading(),
            canonical_content(body, false),
        ));
    }
}

/// Trim blank lines at both ends; the result ends with a newline unless empty.
fn normalize(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => {
            let mut out = lines[start..=end].join("\n");
            out.push('\n');
            out
        }
        _ => String::new(),
    }
}

/// Keep normalized `body` inside a section at `level`, so parsing the merged
/// text finds the same span again:
///
/// - headings at `level` or above are shifted below it, keeping their
///   relative depth, or escaped to plain text when no deeper level is left
/// - a heading repeating the section's own name is escaped
/// - a fence left open is closed
fn contain(body: &str, kind: SectionKind, level: u8) -> String {
    let mut fence = Fence::default();
    let lines: Vec<(&str, Option<(u8, String)>)> = body
        .split_inclusive('\n')
        .map(|line| {
            let heading = if fence.observe(line) {
                None
            } else {
                parse_heading(line)
            };
            (line, heading)
        })
        .collect();

    let shift = match lines.iter().filter_map(|(_, h)| h.as_ref().map(|h| h.0)).min() {
        Some(shallowest) if shallowest <= level => level + 1 - shallowest,
        _ => 0,
    };

    let mut out = String::with_capacity(body.len());
    for (line, heading) in &lines {
        match heading {
            Some((_, text)) if text == kind.heading() => escape_heading(&mut out, line),
            Some((own, text)) if shift > 0 => {
                let deeper = (own + shift).min(6);
                if deeper <= level {
                    escape_heading(&mut out, line);
                } else {
                    out.push_str(&"#".repeat(deeper as usize));
                    if !text.is_empty() {
                        out.push(' ');
                        out.push_str(text);
                    }
                    out.push('\n');
                }
            }
            _ => out.push_str(line),
        }
    }
    if let Some(closer) = fence.closer() {
        close_fence(&mut out, &closer);
    }
    out
}

fn escape_heading(out: &mut String, line: &str) {
    out.push('\\');
    out.push_str(line.trim_start());
}

/// The closing delimiter for a fence `text` leaves open.
fn open_fence(text: &str) -> Option<String> {
    let mut fence = Fence::default();
    for line in text.split_inclusive('\n') {
        fence.observe(line);
    }
    fence.closer()
}

fn close_fence(text: &mut String, closer: &str) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(closer);
    text.push('\n');
}

fn canonical_content(body: &str, followed: bool) -> String {
    let mut content = String::new();
    if !body.is_empty() {
        content.push('\n');
        content.push_str(body);
    }
    if followed {
        content.push('\n');
    }
    content
}

fn trim_trailing_whitespace(text: &mut String) {
    let keep = text.trim_end().len();
    text.truncate(keep);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
