use std::fs;
use std::io;
use std::path::Path;

/// Result of a `stat` on a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub is_dir: bool,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
}

/// Read-only filesystem operations used by the tree builder, the
/// classification index and the opaque-directory populator.
pub trait FileSystem: Send + Sync {
    /// Existence and directory-ness of `path`. Symlinks are not followed.
    fn stat(&self, path: &Path) -> io::Result<Stat>;

    /// Entries of the directory at `path`, in no particular order.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>>;
}

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl FileSystem for RealFs {
    fn stat(&self, path: &Path) -> io::Result<Stat> {
        let metadata = fs::symlink_metadata(path)?;
        Ok(Stat {
            is_dir: metadata.is_dir(),
        })
    }

    /// Unreadable entries are silently skipped.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let is_dir = match entry.file_type() {
                Ok(ft) => ft.is_dir(),
                Err(_) => continue,
            };
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }
        Ok(entries)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    #[test]
    fn stat_reports_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("file.txt")).unwrap();

        assert!(RealFs.stat(&dir.path().join("sub")).unwrap().is_dir);
        assert!(!RealFs.stat(&dir.path().join("file.txt")).unwrap().is_dir);
        assert!(RealFs.stat(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn list_dir_returns_names_and_kinds() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("file.txt")).unwrap();

        let mut entries = RealFs.list_dir(dir.path()).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            entries,
            vec![
                DirEntryInfo {
                    name: "file.txt".into(),
                    is_dir: false
                },
                DirEntryInfo {
                    name: "sub".into(),
                    is_dir: true
                },
            ]
        );
    }
}
