use crate::core::Storage;
use crate::utils::error::Result;
use std::fs;
use std::path::PathBuf;

/// Output directory on the local filesystem. Relative names are resolved
/// against `base_path`; missing parent directories are created on write.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl Storage for LocalStorage {
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.base_path.join(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&full_path, data)?;
        tracing::debug!("💾 Wrote {}", full_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("nested/out"));

        storage.write_file("series.csv", b"adm3_id,year\n").await.unwrap();

        let back = fs::read(dir.path().join("nested/out/series.csv")).unwrap();
        assert_eq!(back, b"adm3_id,year\n");
    }

    #[tokio::test]
    async fn test_write_under_a_file_is_io_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("out");
        fs::write(&blocker, b"").unwrap();
        let storage = LocalStorage::new(&blocker);

        let err = storage.write_file("run/summary.json", b"{}").await.unwrap_err();
        assert!(matches!(err, crate::utils::error::EtlError::IoError(_)));
    }
}
