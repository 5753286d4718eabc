use crate::error::{CardError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CARDS_DIR: &str = ".cards";
pub const ITEMS_DIR: &str = ".cards/items";
pub const ARCHIVE_DIR: &str = ".cards/archive";
pub const LOCKS_DIR: &str = ".cards/locks";

pub const CONFIG_FILE: &str = ".cards/config.yaml";
pub const TRACKER_FILE: &str = ".cards/tracker.yaml";

pub const CARD_EXT: &str = "md";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn items_dir(root: &Path) -> PathBuf {
    root.join(ITEMS_DIR)
}

pub fn archive_dir(root: &Path) -> PathBuf {
    root.join(ARCHIVE_DIR)
}

pub fn locks_dir(root: &Path) -> PathBuf {
    root.join(LOCKS_DIR)
}

pub fn card_path(root: &Path, id: &str) -> PathBuf {
    items_dir(root).join(format!("{id}.{CARD_EXT}"))
}

pub fn archived_card_path(root: &Path, id: &str) -> PathBuf {
    archive_dir(root).join(format!("{id}.{CARD_EXT}"))
}

pub fn lock_path(root: &Path, id: &str) -> PathBuf {
    locks_dir(root).join(format!("{id}.lock"))
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn tracker_path(root: &Path) -> PathBuf {
    root.join(TRACKER_FILE)
}

// ---------------------------------------------------------------------------
// ID validation
// ---------------------------------------------------------------------------

static ID_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| Regex::new(r"^[A-Z]+-[a-z0-9-]+$").unwrap())
}

pub fn validate_id(id: &str) -> Result<()> {
    if id.len() > 64 || !id_re().is_match(id) {
        return Err(CardError::malformed(format!(
            "invalid ID '{id}': expected pattern [A-Z]+-[a-z0-9-]+"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
