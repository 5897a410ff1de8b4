//! JSON-file threshold store.
//!
//! The file holds one object keyed by node identity:
//!
//! ```json
//! { "10.0.0.7": { "cpu_limit": 85, "disk_limit": 90, "load_limit": 8 } }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::ThresholdStore;
use crate::data::{NodeId, Threshold};
use crate::error::StoreError;

/// A threshold store backed by a JSON file on local disk.
///
/// A missing file reads as an empty store. Saves rewrite the whole file via
/// a temporary sibling and a rename.
#[derive(Debug)]
pub struct FileThresholdStore {
    path: PathBuf,
    description: String,
    /// Serialises read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileThresholdStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let description = format!("file: {}", path.display());
        Self {
            path,
            description,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<HashMap<NodeId, Threshold>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ThresholdStore for FileThresholdStore {
    async fn fetch_all(&self) -> Result<HashMap<NodeId, Threshold>, StoreError> {
        self.read_map().await
    }

    async fn save(&self, id: &NodeId, threshold: &Threshold) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut thresholds: BTreeMap<NodeId, Threshold> =
            self.read_map().await?.into_iter().collect();
        thresholds.insert(id.clone(), *threshold);

        let json = serde_json::to_string_pretty(&thresholds)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileThresholdStore::new(dir.path().join("thresholds.json"));
        assert!(store.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_existing_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"10.0.0.7": {{"cpu_limit": 85, "disk_limit": 95, "load_limit": 8}}, "10.0.0.8": {{"load_limit": 3}}}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let store = FileThresholdStore::new(file.path());
        let thresholds = store.fetch_all().await.unwrap();

        assert_eq!(thresholds.len(), 2);
        assert_eq!(thresholds["10.0.0.7"].cpu_limit, 85.0);
        let partial = thresholds["10.0.0.8"];
        assert_eq!(partial.load_limit, 3.0);
        assert_eq!(partial.cpu_limit, 80.0);
    }

    #[tokio::test]
    async fn test_save_then_fetch() {
        let dir = TempDir::new().unwrap();
        let store = FileThresholdStore::new(dir.path().join("thresholds.json"));

        let t = Threshold {
            cpu_limit: 50.0,
            disk_limit: 60.0,
            load_limit: 1.5,
        };
        store.save(&NodeId::from("10.0.0.1"), &t).await.unwrap();
        store
            .save(&NodeId::from("10.0.0.2"), &Threshold::default())
            .await
            .unwrap();

        let thresholds = store.fetch_all().await.unwrap();
        assert_eq!(thresholds.len(), 2);
        assert_eq!(thresholds["10.0.0.1"], t);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        file.flush().unwrap();

        let store = FileThresholdStore::new(file.path());
        assert!(matches!(store.fetch_all().await, Err(StoreError::Parse(_))));
    }

    #[test]
    fn test_description() {
        let store = FileThresholdStore::new("/tmp/thresholds.json");
        assert_eq!(store.description(), "file: /tmp/thresholds.json");
    }
}
