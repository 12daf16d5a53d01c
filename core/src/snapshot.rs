//! Atomic single-document snapshot store (§4.2). Used by C5 for the active
//! table and by C7 for caller state.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{AlertError, Result};

/// Serialize `value` as JSON and atomically replace the file at `path`:
/// write to a sibling temp file, flush, then rename over the target. A
/// reader therefore ever sees either the previous complete snapshot or the
/// current one, never a partial write (§3 invariant 4).
pub async fn save<T: Serialize + Sync>(value: &T, path: &Path) -> Result<()> {
    let data = serde_json::to_vec(value).map_err(|e| AlertError::Snapshot(e.to_string()))?;

    let tmp_path = tmp_path_for(path);
    if let Some(parent) = tmp_path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| AlertError::Snapshot(e.to_string()))?;
    }

    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(|e| AlertError::Snapshot(e.to_string()))?;
    file.write_all(&data)
        .await
        .map_err(|e| AlertError::Snapshot(e.to_string()))?;
    file.flush().await.map_err(|e| AlertError::Snapshot(e.to_string()))?;
    file.sync_all().await.map_err(|e| AlertError::Snapshot(e.to_string()))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| AlertError::Snapshot(e.to_string()))?;
    Ok(())
}

/// Load and parse the snapshot at `path`. A missing file is a normal cold
/// start: returns `Ok(None)`, not an error.
pub async fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path).await {
        Ok(data) => {
            let value = serde_json::from_slice(&data).map_err(|e| AlertError::Snapshot(e.to_string()))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AlertError::Snapshot(e.to_string())),
    }
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tmp.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");

        let mut table: HashMap<String, u32> = HashMap::new();
        table.insert("a".to_string(), 1);
        table.insert("b".to_string(), 2);

        save(&table, &path).await.unwrap();
        let loaded: Option<HashMap<String, u32>> = load(&path).await.unwrap();
        assert_eq!(loaded, Some(table));
    }

    #[tokio::test]
    async fn missing_file_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let loaded: Option<HashMap<String, u32>> = load(&path).await.unwrap();
        assert_eq!(loaded, None);
    }

    #[tokio::test]
    async fn second_save_fully_replaces_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");

        save(&1u32, &path).await.unwrap();
        save(&2u32, &path).await.unwrap();

        let loaded: Option<u32> = load(&path).await.unwrap();
        assert_eq!(loaded, Some(2));
    }
}
