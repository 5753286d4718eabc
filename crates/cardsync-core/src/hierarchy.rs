//! Parent → child sub-issue references and the rendered Sub-Issues checklist.

use crate::checklist::checkbox;
use crate::document::WorkItemDocument;
use crate::error::{CardError, Result};
use crate::section::{Fence, SectionKind};
use crate::tracker::IssueState;
use serde::Serialize;
use std::collections::BTreeMap;

/// Marker rendered in place of a tracker number that does not exist yet.
pub const PLACEHOLDER: &str = "#TBD";

// ---------------------------------------------------------------------------
// SubIssueRef
// ---------------------------------------------------------------------------

/// One declared child, as written in the card's Sub-Issues section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubIssueRef {
    pub tag: String,
    pub description: String,
    pub number: Option<u64>,
    pub checked: bool,
}

impl SubIssueRef {
    /// Parse `- [ ] #<n> <tag> - <description>` (or `#TBD` for unresolved).
    /// A reference that is not a number reads as unresolved, so the line is
    /// never dropped from the checklist.
    pub fn parse(line: &str) -> Option<Self> {
        let cb = checkbox(line)?;
        let mut rest = cb.rest;

        let mut number = None;
        if let Some(token) = rest.split_whitespace().next().filter(|t| t.starts_with('#')) {
            number = token[1..].parse::<u64>().ok();
            rest = rest[token.len()..].trim_start();
        }

        let (tag, description) = if let Some(desc) = rest.strip_prefix("- ") {
            ("", desc)
        } else {
            match rest.split_once(" - ") {
                Some((tag, desc)) => (tag, desc),
                None => (rest, ""),
            }
        };
        Some(Self {
            tag: tag.trim().to_string(),
            description: description.trim().to_string(),
            number,
            checked: cb.checked,
        })
    }

    pub fn render(&self, completed: bool) -> String {
        let mark = if completed { 'x' } else { ' ' };
        let reference = match self.number {
            Some(n) => format!("#{n}"),
            None => PLACEHOLDER.to_string(),
        };
        let mut line = format!("- [{mark}] {reference}");
        if !self.tag.is_empty() {
            line.push(' ');
            line.push_str(&self.tag);
        }
        if !self.description.is_empty() {
            line.push_str(" - ");
            line.push_str(&self.description);
        }
        line
    }

    pub fn title(&self) -> String {
        match (self.tag.is_empty(), self.description.is_empty()) {
            (false, false) => format!("{} - {}", self.tag, self.description),
            (false, true) => self.tag.clone(),
            _ => self.description.clone(),
        }
    }
}

/// Declared children of a Sub-Issues section, in order.
pub fn parse_sub_issues(section_text: &str) -> Vec<SubIssueRef> {
    let mut fence = Fence::default();
    section_text
        .split_inclusive('\n')
        .filter(|line| !fence.observe(line))
        .filter_map(SubIssueRef::parse)
        .collect()
}

// ---------------------------------------------------------------------------
// SubIssueRelation
// ---------------------------------------------------------------------------

/// A child's state for one reconciliation pass. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubIssueRelation {
    pub parent_id: String,
    pub child_number: Option<u64>,
    pub child_title: String,
    pub completed: bool,
    #[serde(skip)]
    declared: SubIssueRef,
}

impl SubIssueRelation {
    pub fn render(&self) -> String {
        self.declared.render(self.completed)
    }
}

/// Pair every declared child with its tracker state. Children without a
/// number, or whose state is unknown, are incomplete.
pub fn resolve(
    doc: &WorkItemDocument,
    states: &BTreeMap<u64, IssueState>,
) -> Vec<SubIssueRelation> {
    doc.sub_issues()
        .into_iter()
        .map(|declared| SubIssueRelation {
            parent_id: doc.id.clone(),
            child_number: declared.number,
            child_title: declared.title(),
            completed: declared
                .number
                .and_then(|n| states.get(&n))
                .is_some_and(|s| *s == IssueState::Closed),
            declared,
        })
        .collect()
}

/// One checklist line per child, in declared order.
pub fn render_checklist(relations: &[SubIssueRelation]) -> String {
    let mut out = String::new();
    for relation in relations {
        out.push_str(&relation.render());
        out.push('\n');
    }
    out
}

/// Progress summary plus checklist, for pull request bodies.
pub fn render_progress(relations: &[SubIssueRelation]) -> String {
    let done = relations.iter().filter(|r| r.completed).count();
    format!(
        "Progress: {done}/{} complete\n\n{}",
        relations.len(),
        render_checklist(relations)
    )
}

/// Record the tracker number of the child tagged `tag`, rewriting only its line.
pub fn link(doc: &mut WorkItemDocument, tag: &str, number: u64) -> Result<()> {
    let unknown = || CardError::UnknownSubIssue {
        id: doc.id.clone(),
        tag: tag.to_string(),
    };
    let body = doc.body.serialize();
    let range = doc.body.span_range(SectionKind::SubIssues).ok_or_else(unknown)?;

    let mut fence = Fence::default();
    let mut rewritten = String::with_capacity(range.len());
    let mut found = false;
    for line in body[range.clone()].split_inclusive('\n') {
        let declared = if found || fence.observe(line) {
            None
        } else {
            SubIssueRef::parse(line).filter(|s| s.tag == tag)
        };
        match declared {
            Some(mut sub) => {
                sub.number = Some(number);
                rewritten.push_str(&sub.render(sub.checked));
                if line.ends_with('\n') {
                    rewritten.push('\n');
                }
                found = true;
            }
            None => rewritten.push_str(line),
        }
    }
    if !found {
        return Err(unknown());
    }

    let mut updated = body;
    updated.replace_range(range, &rewritten);
    doc.body = crate::section::Outline::parse(&updated);
    Ok(())
}

/// Lines of an existing Sub-Issues section that the rendered section would
/// not reproduce, ignoring checkbox state.
pub fn manual_edits(existing: &str, rendered: &str) -> Vec<String> {
    let rendered: Vec<String> = rendered.lines().map(comparable).collect();
    existing
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter(|l| !rendered.contains(&comparable(l)))
        .map(|l| l.trim_end().to_string())
        .collect()
}

fn comparable(line: &str) -> String {
    match SubIssueRef::parse(line) {
        Some(sub) => sub.render(false),
        None => line.trim().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;

    fn parent(sub_issues: &str) -> WorkItemDocument {
        let text = format!(
            "---\nID: ARCH-1\nlane: architecture\nstatus: Ticketed\n---\n# ARCH-1\n\n## Sub-Issues\n\n{sub_issues}"
        );
        WorkItemDocument::parse(&text).unwrap()
    }

    #[test]
    fn parse_line_forms() {
        let sub = SubIssueRef::parse("- [x] #123 ARCH-1a - Build lexer").unwrap();
        assert_eq!(sub.number, Some(123));
        assert_eq!(sub.tag, "ARCH-1a");
        assert_eq!(sub.description, "Build lexer");
        assert!(sub.checked);

        let pending = SubIssueRef::parse("- [ ] #TBD ARCH-1b - Parser").unwrap();
        assert_eq!(pending.number, None);
        assert_eq!(pending.tag, "ARCH-1b");

        let bare = SubIssueRef::parse("- [ ] ARCH-1c - No marker").unwrap();
        assert_eq!(bare.number, None);
        assert_eq!(bare.tag, "ARCH-1c");

        let garbled = SubIssueRef::parse("- [ ] #abc tag - desc").unwrap();
        assert_eq!(garbled.number, None);
        assert_eq!(garbled.tag, "tag");
        assert_eq!(garbled.description, "desc");

        assert!(SubIssueRef::parse("just prose").is_none());
    }

    #[test]
    fn unparseable_reference_keeps_its_line() {
        let doc = parent("- [ ] #abc a - one\n- [ ] #10 b - two\n");
        let relations = resolve(&doc, &BTreeMap::from([(10, IssueState::Closed)]));
        assert_eq!(
            render_checklist(&relations),
            "- [ ] #TBD a - one\n- [x] #10 b - two\n"
        );
    }

    #[test]
    fn render_round_trips_through_parse() {
        for line in ["- [x] #123 ARCH-1a - Build lexer", "- [ ] #TBD ARCH-1b", "- [ ] #9 - desc only"] {
            let sub = SubIssueRef::parse(line).unwrap();
            assert_eq!(sub.render(sub.checked), line);
        }
    }

    #[test]
    fn unresolved_children_render_as_placeholders_in_order() {
        let doc = parent("- [ ] ARCH-1b - second declared first\n- [ ] ARCH-1a - then this\n");
        let relations = resolve(&doc, &BTreeMap::new());
        assert_eq!(
            render_checklist(&relations),
            "- [ ] #TBD ARCH-1b - second declared first\n- [ ] #TBD ARCH-1a - then this\n"
        );
        assert!(relations.iter().all(|r| !r.completed));
    }

    #[test]
    fn closed_children_are_checked() {
        let doc = parent("- [ ] #10 a - one\n- [x] #11 b - two\n- [ ] #TBD c - three\n");
        let states = BTreeMap::from([(10, IssueState::Closed), (11, IssueState::Open)]);
        let relations = resolve(&doc, &states);
        assert_eq!(
            render_checklist(&relations),
            "- [x] #10 a - one\n- [ ] #11 b - two\n- [ ] #TBD c - three\n"
        );
        assert_eq!(relations[0].parent_id, "ARCH-1");
        assert_eq!(relations[0].child_title, "a - one");
        assert!(render_progress(&relations).starts_with("Progress: 1/3 complete\n\n"));
    }

    #[test]
    fn link_rewrites_only_the_tagged_line() {
        let mut doc = parent("Children:\n\n- [ ] #TBD a - one\n- [x] #TBD b - two\n");
        link(&mut doc, "b", 42).unwrap();
        let text = doc.body.section_text(SectionKind::SubIssues).unwrap();
        assert_eq!(text, "\nChildren:\n\n- [ ] #TBD a - one\n- [x] #42 b - two\n");
        assert_eq!(doc.status, Status::Ticketed);
        assert!(matches!(
            link(&mut doc, "zzz", 1),
            Err(CardError::UnknownSubIssue { .. })
        ));
    }

    #[test]
    fn manual_edit_detection_ignores_checkbox_state() {
        let rendered = "- [x] #10 a - one\n- [ ] #TBD c - three\n";
        assert!(manual_edits("- [ ] #10 a - one\n\n- [ ] #TBD c - three\n", rendered).is_empty());
        let edits = manual_edits("- [ ] #10 a - one\nNote from a human\n- [ ] #99 x - extra\n", rendered);
        assert_eq!(edits, vec!["Note from a human".to_string(), "- [ ] #99 x - extra".to_string()]);
    }
}
