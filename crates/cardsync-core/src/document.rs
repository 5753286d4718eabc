//! The work-item card: frontmatter fields plus a section outline.
//!
//! ```text
//! ---
//! ID: ARCH-123
//! type: architecture
//! lane: platform
//! status: Ticketed
//! Issue: #41
//! ---
//! # ARCH-123: Replace the config loader
//!
//! ## Problem
//! ...
//! ```

use crate::checklist::{parse_checklist, ChecklistItem};
use crate::error::{CardError, Result};
use crate::hierarchy::{parse_sub_issues, SubIssueRef};
use crate::paths;
use crate::section::{Outline, SectionKind};
use crate::status::Status;
use serde::{Deserialize, Serialize};
use std::fmt;

const DELIMITER: &str = "---";

// ---------------------------------------------------------------------------
// ItemType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Unit,
    Composition,
    Bug,
    Architecture,
    Playbook,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Unit => "unit",
            ItemType::Composition => "composition",
            ItemType::Bug => "bug",
            ItemType::Architecture => "architecture",
            ItemType::Playbook => "playbook",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemType {
    type Err = CardError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unit" => Ok(ItemType::Unit),
            "composition" => Ok(ItemType::Composition),
            "bug" => Ok(ItemType::Bug),
            "architecture" => Ok(ItemType::Architecture),
            "playbook" => Ok(ItemType::Playbook),
            _ => Err(CardError::malformed(format!("invalid type '{s}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkItemDocument
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItemDocument {
    pub id: String,
    pub item_type: Option<ItemType>,
    pub lane: String,
    pub status: Status,
    pub issue: Option<u64>,
    pub pull_request: Option<u64>,
    pub parent: Option<String>,
    /// Bumped by every engine write.
    pub revision: u64,
    /// Unrecognized frontmatter keys, in their original order.
    pub extra: Vec<(String, String)>,
    pub body: Outline,
}

impl WorkItemDocument {
    pub fn new(id: impl Into<String>, lane: impl Into<String>, status: Status) -> Self {
        Self {
            id: id.into(),
            item_type: None,
            lane: lane.into(),
            status,
            issue: None,
            pull_request: None,
            parent: None,
            revision: 0,
            extra: Vec::new(),
            body: Outline::default(),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.split_inclusive('\n');
        let mut consumed = 0;

        match lines.next() {
            Some(first) if first.trim_end() == DELIMITER => consumed += first.len(),
            _ => return Err(CardError::malformed("missing opening '---' frontmatter delimiter")),
        }

        let mut fields: Vec<(String, String)> = Vec::new();
        let mut closed = false;
        for line in lines {
            consumed += line.len();
            let trimmed = line.trim();
            if trimmed == DELIMITER {
                closed = true;
                break;
            }
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some((key, value)) = trimmed.split_once(':') else {
                return Err(CardError::malformed(format!(
                    "frontmatter line is not 'key: value': '{trimmed}'"
                )));
            };
            let key = key.trim();
            if fields.iter().any(|(k, _)| k.eq_ignore_ascii_case(key)) {
                return Err(CardError::malformed(format!("duplicate key '{key}'")));
            }
            fields.push((key.to_string(), value.trim().to_string()));
        }
        if !closed {
            return Err(CardError::malformed("unterminated frontmatter: missing closing '---'"));
        }

        let mut id = None;
        let mut item_type = None;
        let mut lane = None;
        let mut status = None;
        let mut issue = None;
        let mut pull_request = None;
        let mut parent = None;
        let mut revision = 0;
        let mut extra = Vec::new();

        // Extra values are kept raw; only keys the card interprets are unquoted.
        for (key, raw) in fields {
            let value = unquote(&raw).to_string();
            match key.to_ascii_lowercase().as_str() {
                "id" => {
                    paths::validate_id(&value)?;
                    id = Some(value);
                }
                "type" => item_type = Some(value.parse::<ItemType>()?),
                "lane" => lane = Some(value),
                "status" => {
                    status = Some(value.parse::<Status>().map_err(|_| {
                        CardError::malformed(format!("invalid status '{value}'"))
                    })?)
                }
                "issue" => issue = parse_number("Issue", &value)?,
                "pr" => pull_request = parse_number("PR", &value)?,
                "parent" if !value.is_empty() => {
                    paths::validate_id(&value)?;
                    parent = Some(value);
                }
                "parent" => {}
                "revision" => {
                    revision = value.parse::<u64>().map_err(|_| {
                        CardError::malformed(format!("invalid Revision '{value}'"))
                    })?
                }
                _ => extra.push((key, raw)),
            }
        }

        let missing = |key: &str| CardError::malformed(format!("missing required key '{key}'"));
        let id = id.ok_or_else(|| missing("ID"))?;
        if parent.as_deref() == Some(id.as_str()) {
            return Err(CardError::malformed(format!("card {id} names itself as its Parent")));
        }
        Ok(Self {
            id,
            item_type,
            lane: lane.filter(|l| !l.is_empty()).ok_or_else(|| missing("lane"))?,
            status: status.ok_or_else(|| missing("status"))?,
            issue,
            pull_request,
            parent,
            revision,
            extra,
            body: Outline::parse(&text[consumed..]),
        })
    }

    pub fn serialize(&self) -> String {
        let mut out = format!("{DELIMITER}\nID: {}\n", self.id);
        if let Some(t) = self.item_type {
            out.push_str(&format!("type: {t}\n"));
        }
        out.push_str(&format!("lane: {}\nstatus: {}\n", self.lane, self.status));
        if let Some(n) = self.issue {
            out.push_str(&format!("Issue: #{n}\n"));
        }
        if let Some(n) = self.pull_request {
            out.push_str(&format!("PR: #{n}\n"));
        }
        if let Some(p) = &self.parent {
            out.push_str(&format!("Parent: {p}\n"));
        }
        if self.revision > 0 {
            out.push_str(&format!("Revision: {}\n", self.revision));
        }
        for (key, value) in &self.extra {
            out.push_str(&format!("{key}: {value}\n"));
        }
        out.push_str(DELIMITER);
        out.push('\n');
        out.push_str(&self.body.serialize());
        out
    }

    // ---------------------------------------------------------------------------
    // Section accessors
    // ---------------------------------------------------------------------------

    /// Text of the first level-1 heading, if any.
    pub fn title(&self) -> Option<&str> {
        self.body
            .sections
            .iter()
            .find(|s| s.level == 1)
            .map(|s| s.heading.as_str())
    }

    pub fn section_text(&self, kind: SectionKind) -> Option<String> {
        self.body.section_text(kind)
    }

    fn prose(&self, kind: SectionKind) -> Option<String> {
        self.section_text(kind)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    pub fn purpose(&self) -> Option<String> {
        self.prose(SectionKind::Purpose)
    }

    pub fn problem(&self) -> Option<String> {
        self.prose(SectionKind::Problem)
    }

    pub fn proposal(&self) -> Option<String> {
        self.prose(SectionKind::Proposal)
    }

    pub fn acceptance_checklist(&self) -> Vec<ChecklistItem> {
        self.section_text(SectionKind::AcceptanceChecklist)
            .map(|t| parse_checklist(&t))
            .unwrap_or_default()
    }

    pub fn sub_issues(&self) -> Vec<SubIssueRef> {
        self.section_text(SectionKind::SubIssues)
            .map(|t| parse_sub_issues(&t))
            .unwrap_or_default()
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_number(key: &str, value: &str) -> Result<Option<u64>> {
    let digits = value.trim_start_matches('#').trim();
    if digits.is_empty() {
        return Ok(None);
    }
    digits
        .parse::<u64>()
        .map(Some)
        .map_err(|_| CardError::malformed(format!("invalid {key} '{value}': expected '#<number>'")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const CARD: &str = "\
---
ID: ARCH-123
type: architecture
lane: platform
status: PR Open
Issue: #41
owner: \"sam\"
---
# ARCH-123: Replace the config loader

## Purpose

Make config reloadable.

## Problem

Reload needs a restart.

```yaml
## not: a heading
```

## Proposal

Watch the file.

## Acceptance Checklist

- [x] #50 loader - reads yaml
- [ ] docs updated

## Sub-Issues

- [x] #50 ARCH-123a - Loader
- [ ] #TBD ARCH-123b - Watcher
";

    fn reasons(text: &str) -> String {
        match WorkItemDocument::parse(text) {
            Err(CardError::MalformedDocument { reason }) => reason,
            other => panic!("expected MalformedDocument, got {other:?}"),
        }
    }

    #[test]
    fn parses_frontmatter_and_sections() {
        let doc = WorkItemDocument::parse(CARD).unwrap();
        assert_eq!(doc.id, "ARCH-123");
        assert_eq!(doc.item_type, Some(ItemType::Architecture));
        assert_eq!(doc.lane, "platform");
        assert_eq!(doc.status, Status::PrOpen);
        assert_eq!(doc.issue, Some(41));
        assert_eq!(doc.pull_request, None);
        assert_eq!(doc.revision, 0);
        assert_eq!(doc.extra, vec![("owner".to_string(), "\"sam\"".to_string())]);
        assert_eq!(doc.title(), Some("ARCH-123: Replace the config loader"));
        assert_eq!(doc.purpose().as_deref(), Some("Make config reloadable."));
        assert!(doc.problem().unwrap().contains("## not: a heading"));
        assert_eq!(doc.proposal().as_deref(), Some("Watch the file."));
        assert_eq!(doc.acceptance_checklist().len(), 2);

        let subs = doc.sub_issues();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].number, Some(50));
        assert_eq!(subs[1].number, None);
        assert_eq!(subs[1].tag, "ARCH-123b");
    }

    #[test]
    fn round_trip() {
        let parsed = WorkItemDocument::parse(CARD).unwrap();
        let again = WorkItemDocument::parse(&parsed.serialize()).unwrap();
        assert_eq!(again, parsed);
        assert_eq!(again.serialize(), parsed.serialize());
    }

    #[test]
    fn quoted_extra_values_survive_round_trips() {
        let text = "---\nID: ARCH-1\nlane: \"a\"\nstatus: Draft\nowner: \"'sam'\"\nnote: 'x'\n---\n";
        let parsed = WorkItemDocument::parse(text).unwrap();
        assert_eq!(parsed.lane, "a");
        assert_eq!(parsed.extra[0].1, "\"'sam'\"");
        let again = WorkItemDocument::parse(&parsed.serialize()).unwrap();
        assert_eq!(again, parsed);
        let third = WorkItemDocument::parse(&again.serialize()).unwrap();
        assert_eq!(third, parsed);
    }

    #[test]
    fn card_cannot_be_its_own_parent() {
        let reason = reasons("---\nID: ARCH-1\nlane: a\nstatus: Draft\nParent: ARCH-1\n---\n");
        assert!(reason.contains("its Parent"), "{reason}");
    }

    #[test]
    fn round_trip_keeps_optional_fields() {
        let mut doc = WorkItemDocument::parse(CARD).unwrap();
        doc.pull_request = Some(77);
        doc.parent = Some("ARCH-100".to_string());
        doc.revision = 4;
        let again = WorkItemDocument::parse(&doc.serialize()).unwrap();
        assert_eq!(again, doc);
    }

    #[test]
    fn body_is_preserved_byte_for_byte() {
        let doc = WorkItemDocument::parse(CARD).unwrap();
        let body_start = CARD.find("# ARCH-123:").unwrap();
        assert_eq!(doc.body.serialize(), &CARD[body_start..]);
    }

    #[test]
    fn missing_required_keys_are_named() {
        assert_eq!(
            reasons("---\nlane: a\nstatus: Draft\n---\n"),
            "missing required key 'ID'"
        );
        assert_eq!(
            reasons("---\nID: ARCH-1\nstatus: Draft\n---\n"),
            "missing required key 'lane'"
        );
        assert_eq!(
            reasons("---\nID: ARCH-1\nlane: a\n---\n"),
            "missing required key 'status'"
        );
    }

    #[test]
    fn invalid_values_are_malformed() {
        assert!(reasons("---\nID: arch-1\nlane: a\nstatus: Draft\n---\n").contains("arch-1"));
        assert!(reasons("---\nID: ARCH-1\nlane: a\nstatus: Done\n---\n").contains("status"));
        assert!(reasons("---\nID: ARCH-1\nlane: a\nstatus: Draft\ntype: epic\n---\n").contains("type"));
        assert!(reasons("---\nID: ARCH-1\nlane: a\nstatus: Draft\nIssue: #x1\n---\n").contains("Issue"));
        assert!(reasons("---\nID: ARCH-1\nID: ARCH-2\nlane: a\nstatus: Draft\n---\n").contains("duplicate"));
    }

    #[test]
    fn delimiters_are_required() {
        assert!(reasons("ID: ARCH-1\n").contains("opening"));
        assert!(reasons("---\nID: ARCH-1\nlane: a\nstatus: Draft\n").contains("closing"));
        assert!(reasons("---\nnot a pair\n---\n").contains("key: value"));
    }

    #[test]
    fn empty_issue_is_none() {
        let doc = WorkItemDocument::parse("---\nID: ARCH-1\nlane: a\nstatus: Draft\nIssue:\n---\n").unwrap();
        assert_eq!(doc.issue, None);
        assert!(doc.body.sections.is_empty());
    }
}
