use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting cards and tracker snapshots.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Move `from` to `to` and mark the result read-only.
pub fn move_read_only(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(from, to)?;
    let mut perms = std::fs::metadata(to)?.permissions();
    perms.set_readonly(true);
    std::fs::set_permissions(to, perms)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ARCH-1.md");
        atomic_write(&path, b"---\nID: ARCH-1\n---\n").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "---\nID: ARCH-1\n---\n"
        );
    }

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c/card.md");
        atomic_write(&path, b"data").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn move_read_only_moves_and_protects() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("items/ARCH-1.md");
        let to = dir.path().join("archive/ARCH-1.md");
        atomic_write(&from, b"card").unwrap();
        move_read_only(&from, &to).unwrap();
        assert!(!from.exists());
        assert!(std::fs::metadata(&to).unwrap().permissions().readonly());
    }
}
