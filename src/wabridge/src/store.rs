//! Local device identity store.
//!
//! Holds the identifier of the linked device handed back by the gateway after
//! pairing. Its presence at startup decides between pairing and reconnecting.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{BridgeError, BridgeResult};

/// On-disk record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DeviceRecord {
    #[serde(default)]
    device_id: Option<String>,
}

/// JSON file holding the linked device identity.
#[derive(Debug)]
pub struct DeviceStore {
    path: PathBuf,
    record: RwLock<DeviceRecord>,
}

impl DeviceStore {
    /// Open the store, creating an empty one if the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> BridgeResult<Self> {
        let path = path.into();

        let record = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<DeviceRecord>(&bytes).map_err(|e| {
                BridgeError::Store(format!("Corrupt device store {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Creating device store at {}", path.display());
                let record = DeviceRecord::default();
                write_record(&path, &record).await?;
                record
            }
            Err(e) => {
                return Err(BridgeError::Store(format!(
                    "Failed to open device store {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        Ok(Self {
            path,
            record: RwLock::new(record),
        })
    }

    /// Stored device identity, if any.
    pub async fn device_id(&self) -> Option<String> {
        self.record.read().await.device_id.clone()
    }

    /// Persist a new device identity.
    pub async fn set_device_id(&self, device_id: impl Into<String>) -> BridgeResult<()> {
        let mut guard = self.record.write().await;
        guard.device_id = Some(device_id.into());
        write_record(&self.path, &guard).await?;
        info!("Stored device identity in {}", self.path.display());
        Ok(())
    }
}

async fn write_record(path: &Path, record: &DeviceRecord) -> BridgeResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BridgeError::Store(format!("{}: {}", parent.display(), e)))?;
    }

    let json = serde_json::to_vec_pretty(record)?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| BridgeError::Store(format!("{}: {}", path.display(), e)))
}
