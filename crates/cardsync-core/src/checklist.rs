//! Checklist lines and completion propagation.

use crate::section::{Fence, Outline, SectionKind};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistItem {
    pub checked: bool,
    pub text: String,
}

/// A `- [ ] ...` list item located inside a line.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkbox<'a> {
    /// Byte offset of the mark character between the brackets.
    pub mark: usize,
    pub checked: bool,
    pub rest: &'a str,
}

pub(crate) fn checkbox(line: &str) -> Option<Checkbox<'_>> {
    let text = line.trim_end_matches(['\n', '\r']);
    let indent = text.len() - text.trim_start_matches([' ', '\t']).len();
    let after_indent = &text[indent..];
    let bullet = after_indent.chars().next().filter(|c| matches!(c, '-' | '*' | '+'))?;
    let after_bullet = &after_indent[bullet.len_utf8()..];
    let gap = after_bullet.len() - after_bullet.trim_start_matches(' ').len();
    if gap == 0 {
        return None;
    }
    let boxed = &after_bullet[gap..];
    let bytes = boxed.as_bytes();
    if bytes.len() < 3 || bytes[0] != b'[' || bytes[2] != b']' {
        return None;
    }
    let checked = match bytes[1] {
        b' ' => false,
        b'x' | b'X' => true,
        _ => return None,
    };
    let tail = &boxed[3..];
    if !tail.is_empty() && !tail.starts_with([' ', '\t']) {
        return None;
    }
    Some(Checkbox {
        mark: indent + bullet.len_utf8() + gap + 1,
        checked,
        rest: tail.trim(),
    })
}

/// Checklist items in `text`, skipping fenced code.
pub fn parse_checklist(text: &str) -> Vec<ChecklistItem> {
    let mut fence = Fence::default();
    text.split_inclusive('\n')
        .filter(|line| !fence.observe(line))
        .filter_map(checkbox)
        .map(|cb| ChecklistItem {
            checked: cb.checked,
            text: cb.rest.to_string(),
        })
        .collect()
}

/// True if `text` mentions `#<number>` as a whole number.
pub fn references(text: &str, number: u64) -> bool {
    let mut rest = text;
    while let Some(pos) = rest.find('#') {
        rest = &rest[pos + 1..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 && rest[..digits].parse::<u64>().ok() == Some(number) {
            return true;
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Propagation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagateOutcome {
    Toggled,
    /// The line already matched the child's completion state.
    Unchanged,
    /// No checklist line references the child. Not an error.
    ReferenceNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Propagation {
    pub body: String,
    pub outcome: PropagateOutcome,
}

/// Set the checkbox of the first checklist line referencing `#number` to
/// `complete`. Every other byte of `body` is preserved.
pub fn propagate(body: &str, number: u64, complete: bool) -> Propagation {
    let mut fence = Fence::default();
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if !fence.observe(line) {
            if let Some(cb) = checkbox(line).filter(|cb| references(cb.rest, number)) {
                if cb.checked == complete {
                    return Propagation {
                        body: body.to_string(),
                        outcome: PropagateOutcome::Unchanged,
                    };
                }
                let pos = offset + cb.mark;
                let mut out = body.to_string();
                out.replace_range(pos..pos + 1, if complete { "x" } else { " " });
                return Propagation {
                    body: out,
                    outcome: PropagateOutcome::Toggled,
                };
            }
        }
        offset += line.len();
    }
    Propagation {
        body: body.to_string(),
        outcome: PropagateOutcome::ReferenceNotFound,
    }
}

/// Like [`propagate`], restricted to the canonical section for `kind`.
/// A body without that section reports `ReferenceNotFound`.
pub fn propagate_in_section(
    body: &str,
    kind: SectionKind,
    number: u64,
    complete: bool,
) -> Propagation {
    let outline = Outline::parse(body);
    let Some(range) = outline.span_range(kind) else {
        return Propagation {
            body: body.to_string(),
            outcome: PropagateOutcome::ReferenceNotFound,
        };
    };
    let inner = propagate(&body[range.clone()], number, complete);
    if inner.outcome != PropagateOutcome::Toggled {
        return Propagation {
            body: body.to_string(),
            outcome: inner.outcome,
        };
    }
    let mut out = body.to_string();
    out.replace_range(range, &inner.body);
    Propagation {
        body: out,
        outcome: PropagateOutcome::Toggled,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
