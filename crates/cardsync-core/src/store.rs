//! Card persistence under `.cards/`.

use crate::document::WorkItemDocument;
use crate::error::{CardError, Result};
use crate::paths;
use std::path::{Path, PathBuf};

/// A card as read from disk, with the exact text it was parsed from.
/// The raw text is the compare-and-swap snapshot for a later write.
#[derive(Debug, Clone)]
pub struct StoredCard {
    pub doc: WorkItemDocument,
    pub raw: String,
    pub path: PathBuf,
    pub archived: bool,
}

impl WorkItemDocument {
    // ---------------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------------

    /// Write a new card; fails if one with the same ID exists, archived or not.
    pub fn create(root: &Path, doc: &WorkItemDocument) -> Result<()> {
        paths::validate_id(&doc.id)?;
        if paths::card_path(root, &doc.id).exists()
            || paths::archived_card_path(root, &doc.id).exists()
        {
            return Err(CardError::CardExists(doc.id.clone()));
        }
        doc.save(root)
    }

    pub fn load(root: &Path, id: &str) -> Result<Self> {
        Ok(Self::load_stored(root, id)?.doc)
    }

    /// Load from `items/`, falling back to `archive/`.
    pub fn load_stored(root: &Path, id: &str) -> Result<StoredCard> {
        paths::validate_id(id)?;
        let live = paths::card_path(root, id);
        let (path, archived) = if live.exists() {
            (live, false)
        } else {
            let archived = paths::archived_card_path(root, id);
            if !archived.exists() {
                return Err(CardError::CardNotFound(id.to_string()));
            }
            (archived, true)
        };

        let raw = std::fs::read_to_string(&path)?;
        let doc = Self::parse(&raw).map_err(|e| match e {
            CardError::MalformedDocument { reason } => CardError::MalformedDocument {
                reason: format!("{}: {reason}", path.display()),
            },
            other => other,
        })?;
        if doc.id != id {
            return Err(CardError::malformed(format!(
                "{}: ID '{}' does not match file name",
                path.display(),
                doc.id
            )));
        }
        Ok(StoredCard {
            doc,
            raw,
            path,
            archived,
        })
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        if Self::is_archived(root, &self.id) {
            return Err(CardError::Archived(self.id.clone()));
        }
        let path = paths::card_path(root, &self.id);
        crate::io::atomic_write(&path, self.serialize().as_bytes())
    }

    pub fn is_archived(root: &Path, id: &str) -> bool {
        paths::archived_card_path(root, id).exists()
    }

    /// Move the card into `archive/` and make it read-only.
    pub fn archive(root: &Path, id: &str) -> Result<()> {
        let from = paths::card_path(root, id);
        if !from.exists() {
            return Err(if Self::is_archived(root, id) {
                CardError::Archived(id.to_string())
            } else {
                CardError::CardNotFound(id.to_string())
            });
        }
        crate::io::move_read_only(&from, &paths::archived_card_path(root, id))?;
        tracing::info!(id, "card archived");
        Ok(())
    }

    /// Live cards, sorted by ID. Unparseable files are skipped with a warning.
    pub fn list(root: &Path) -> Result<Vec<Self>> {
        Self::list_in(&paths::items_dir(root))
    }

    pub fn list_archived(root: &Path) -> Result<Vec<Self>> {
        Self::list_in(&paths::archive_dir(root))
    }

    fn list_in(dir: &Path) -> Result<Vec<Self>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut cards = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(paths::CARD_EXT) {
                continue;
            }
            let text = std::fs::read_to_string(&path)?;
            match Self::parse(&text) {
                Ok(doc) => cards.push(doc),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping card"),
            }
        }
        cards.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(cards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;
    use tempfile::TempDir;

    fn card(id: &str) -> WorkItemDocument {
        let text = format!("---\nID: {id}\nlane: ops\nstatus: Draft\n---\n# {id}\n");
        WorkItemDocument::parse(&text).unwrap()
    }

    #[test]
    fn create_load_save() {
        let dir = TempDir::new().unwrap();
        let mut doc = card("OPS-1");
        WorkItemDocument::create(dir.path(), &doc).unwrap();
        assert!(matches!(
            WorkItemDocument::create(dir.path(), &doc),
            Err(CardError::CardExists(_))
        ));

        doc.status = Status::Ticketed;
        doc.issue = Some(3);
        doc.save(dir.path()).unwrap();

        let stored = WorkItemDocument::load_stored(dir.path(), "OPS-1").unwrap();
        assert_eq!(stored.doc, doc);
        assert_eq!(stored.raw, doc.serialize());
        assert!(!stored.archived);
    }

    #[test]
    fn missing_card() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            WorkItemDocument::load(dir.path(), "OPS-404"),
            Err(CardError::CardNotFound(_))
        ));
    }

    #[test]
    fn mismatched_file_name_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = paths::card_path(dir.path(), "OPS-1");
        crate::io::atomic_write(&path, card("OPS-2").serialize().as_bytes()).unwrap();
        let err = WorkItemDocument::load(dir.path(), "OPS-1").unwrap_err();
        assert!(err.to_string().contains("does not match file name"));
    }

    #[test]
    fn archive_makes_card_read_only() {
        let dir = TempDir::new().unwrap();
        let doc = card("OPS-1");
        WorkItemDocument::create(dir.path(), &doc).unwrap();
        WorkItemDocument::archive(dir.path(), "OPS-1").unwrap();

        assert!(WorkItemDocument::is_archived(dir.path(), "OPS-1"));
        let stored = WorkItemDocument::load_stored(dir.path(), "OPS-1").unwrap();
        assert!(stored.archived);
        assert!(std::fs::metadata(&stored.path).unwrap().permissions().readonly());
        assert!(matches!(doc.save(dir.path()), Err(CardError::Archived(_))));
        assert!(matches!(
            WorkItemDocument::archive(dir.path(), "OPS-1"),
            Err(CardError::Archived(_))
        ));
    }

    #[test]
    fn list_sorts_and_skips_garbage() {
        let dir = TempDir::new().unwrap();
        WorkItemDocument::create(dir.path(), &card("OPS-2")).unwrap();
        WorkItemDocument::create(dir.path(), &card("OPS-1")).unwrap();
        std::fs::write(paths::items_dir(dir.path()).join("junk.md"), "no frontmatter").unwrap();
        std::fs::write(paths::items_dir(dir.path()).join("notes.txt"), "ignored").unwrap();

        let ids: Vec<String> = WorkItemDocument::list(dir.path())
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["OPS-1", "OPS-2"]);
        assert!(WorkItemDocument::list_archived(dir.path()).unwrap().is_empty());
    }
}
