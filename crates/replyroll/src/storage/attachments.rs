use std::path::{Path, PathBuf};

use chrono::Utc;
use log::debug;

use crate::error::StorageError;
use crate::sanitize::sanitize_attachment_name;

/// Where an attachment landed and what to record about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    pub path: PathBuf,
    /// File name inside the store directory.
    pub stored_name: String,
    pub size_bytes: u64,
    pub content_type: String,
}

/// Durable storage for reply attachments.
///
/// Files are named `{request}_{unix timestamp}_{sanitized name}` and are never
/// overwritten; a taken name gets a `_N` suffix before its extension.
pub struct AttachmentStore {
    directory: PathBuf,
}

impl AttachmentStore {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn store(
        &self,
        project_id: i64,
        original_name: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<StoredAttachment, StorageError> {
        self.ensure_directory()?;

        let filename = format!(
            "{}_{}_{}",
            project_id,
            Utc::now().timestamp(),
            sanitize_attachment_name(original_name)
        );

        let path = self.store_with_atomic_creation(&filename, content)?;
        let stored_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or(filename);

        debug!(
            "Stored attachment {} ({} bytes)",
            stored_name,
            content.len()
        );

        Ok(StoredAttachment {
            path,
            stored_name,
            size_bytes: content.len() as u64,
            content_type: content_type.to_string(),
        })
    }

    /// Creates `filename` exclusively, falling back to numbered variants.
    fn store_with_atomic_creation(
        &self,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf, StorageError> {
        use std::io::Write;

        let (base, ext) = match filename.rfind('.') {
            Some(dot_pos) if dot_pos > 0 => (&filename[..dot_pos], Some(&filename[dot_pos..])),
            _ => (filename, None),
        };

        for counter in 1..=1000 {
            let try_filename = if counter == 1 {
                filename.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };

            let try_path = self.directory.join(&try_filename);

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&try_path)
            {
                Ok(mut file) => {
                    file.write_all(content)
                        .and_then(|_| file.sync_all())
                        .map_err(|e| StorageError::WriteFile {
                            path: try_path.clone(),
                            source: e,
                        })?;
                    return Ok(try_path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        path: try_path,
                        source: e,
                    });
                }
            }
        }

        Err(StorageError::FileExists(self.directory.join(filename)))
    }

    fn ensure_directory(&self) -> Result<(), StorageError> {
        if !self.directory.exists() {
            std::fs::create_dir_all(&self.directory).map_err(|e| {
                StorageError::CreateDirectory {
                    path: self.directory.clone(),
                    source: e,
                }
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_layout() {
        let dir = TempDir::new().unwrap();
        let store = AttachmentStore::new(dir.path().join("replies"));

        let stored = store
            .store(12, "grades.xlsx", b"data", "application/octet-stream")
            .unwrap();

        assert!(stored.path.starts_with(dir.path().join("replies")));
        assert!(stored.stored_name.starts_with("12_"));
        assert!(stored.stored_name.ends_with("_grades.xlsx"));
        assert_eq!(stored.size_bytes, 4);
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"data");
    }

    #[test]
    fn test_traversal_name_stays_inside_store() {
        let dir = TempDir::new().unwrap();
        let store = AttachmentStore::new(dir.path());

        let stored = store
            .store(1, "../../etc/passwd.xlsx", b"x", "application/octet-stream")
            .unwrap();

        assert_eq!(stored.path.parent().unwrap(), dir.path());
        assert!(!stored.stored_name.contains('/'));
        assert!(!stored.stored_name.contains('\\'));
        assert!(!stored.stored_name.contains(".."));
        assert!(stored.stored_name.ends_with("passwd.xlsx"));
    }

    #[test]
    fn test_collision_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = AttachmentStore::new(dir.path());

        let mut paths = Vec::new();
        for content in [b"one".as_slice(), b"two", b"three"] {
            paths.push(store.store(3, "a.xlsx", content, "x/y").unwrap().path);
        }

        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 3);

        let mut contents: Vec<Vec<u8>> = paths.iter().map(|p| std::fs::read(p).unwrap()).collect();
        contents.sort();
        assert_eq!(contents, vec![b"one".to_vec(), b"three".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn test_collision_suffix_before_extension() {
        let dir = TempDir::new().unwrap();
        let store = AttachmentStore::new(dir.path());

        let first = store.store_with_atomic_creation("5_100_a.xlsx", b"1").unwrap();
        let second = store.store_with_atomic_creation("5_100_a.xlsx", b"2").unwrap();

        assert_eq!(first.file_name().unwrap(), "5_100_a.xlsx");
        assert_eq!(second.file_name().unwrap(), "5_100_a_2.xlsx");
    }

    #[test]
    fn test_create_directory_failure() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let store = AttachmentStore::new(blocker.join("nested"));
        let result = store.store(1, "a.xlsx", b"x", "x/y");
        assert!(matches!(result, Err(StorageError::CreateDirectory { .. })));
    }
}
