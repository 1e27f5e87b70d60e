//! Atomic file replacement: write to a sibling temp file, then rename.
//!
//! A reader of `path` sees either the previous content or the complete new
//! content, never a partial write. The rename only happens after the whole
//! payload is on disk, so a failed conversion leaves the destination as it was.
//! Every call gets its own uniquely named temp file, so concurrent writers to
//! the same destination never share one.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Atomically replace `path` with `contents`.
pub async fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
    let path = path.to_path_buf();
    let contents = contents.as_ref().to_vec();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &contents))
        .await
        .map_err(io::Error::other)?
}

fn write_atomic_blocking(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Dropping the temp file on an early return removes it.
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".part")
        .tempfile_in(&dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn part_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(".part"))
            .collect()
    }

    #[tokio::test]
    async fn replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.html");
        std::fs::write(&path, "old").unwrap();

        write_atomic(&path, "new").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert!(part_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn failed_write_leaves_destination_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("out.html");

        assert!(write_atomic(&path, "x").await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_to_one_path_all_succeed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("site.css");

        for _ in 0..10 {
            let writes = (0..4).map(|i| {
                let path = path.clone();
                tokio::spawn(async move { write_atomic(&path, format!("body {{ order: {i} }}")).await })
            });
            for result in futures::future::join_all(writes).await {
                result.unwrap().unwrap();
            }
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("body { order: "), "got: {content}");
        assert!(part_files(dir.path()).is_empty());
    }
}
