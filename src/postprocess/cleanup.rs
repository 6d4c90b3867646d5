//! Removal of unwanted release artifacts.

use std::path::Path;

use crate::transfer::is_unwanted;

/// Directory names removed together with their contents.
pub const UNWANTED_DIRS: [&str; 3] = ["proof", "sample", "subs"];

fn is_unwanted_dir(name: &str) -> bool {
    let lower = name.to_lowercase();
    UNWANTED_DIRS.contains(&lower.as_str())
}

/// Removes unwanted files and folders below `dir`, deepest first.
///
/// Returns the number of removed entries. Failures are logged and skipped.
pub fn cleanup(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        match entry.file_type() {
            Ok(kind) if kind.is_dir() => {
                if is_unwanted_dir(&name) {
                    match std::fs::remove_dir_all(&path) {
                        Ok(()) => {
                            log::debug!("Removed folder {}", path.display());
                            removed += 1;
                        }
                        Err(e) => log::warn!("Could not remove folder {}: {e}", path.display()),
                    }
                } else {
                    removed += cleanup(&path);
                }
            }
            Ok(_) => files.push((path, name)),
            Err(e) => log::warn!("Could not inspect {}: {e}", path.display()),
        }
    }

    for (path, name) in files {
        if !is_unwanted(&name) {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Removed {}", path.display());
                removed += 1;
            }
            Err(e) => log::warn!("Could not remove {}: {e}", path.display()),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn removes_samples_nfo_and_sample_folder() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("movie.mkv"));
        touch(&root.join("movie-sample.mkv"));
        touch(&root.join("info.nfo"));
        touch(&root.join("Sample").join("clip.mkv"));

        let removed = cleanup(root);

        assert_eq!(removed, 3);
        assert!(root.join("movie.mkv").exists());
        assert!(!root.join("movie-sample.mkv").exists());
        assert!(!root.join("info.nfo").exists());
        assert!(!root.join("Sample").exists());
    }

    #[test]
    fn recurses_into_nested_folders() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("CD1").join("cover.JPG"));
        touch(&root.join("CD1").join("Subs").join("movie.idx"));
        touch(&root.join("CD1").join("Proof").join("proof.jpg"));
        touch(&root.join("CD1").join("movie.rar"));
        touch(&root.join("CD1").join("movie.sub"));

        cleanup(root);

        let mut left: Vec<String> = std::fs::read_dir(root.join("CD1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, ["movie.rar"]);
    }

    #[test]
    fn keeps_folders_that_only_contain_the_word() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("samples-extra").join("a.mkv"));
        assert_eq!(cleanup(dir.path()), 0);
        assert!(dir.path().join("samples-extra").join("a.mkv").exists());
    }

    #[test]
    fn missing_directory_is_noop() {
        let dir = TempDir::new().unwrap();
        assert_eq!(cleanup(&dir.path().join("absent")), 0);
    }
}
