//! Credential store: durable table of devices, accounts and sessions
//!
//! Committed state is one JSON document held in memory and mirrored to disk
//! by a background writer task. Device writes are row-scoped: each device
//! has its own lock, so a read-verify-write on one device (claim, heartbeat,
//! rename) never waits for another device. Account and session writes share
//! a single lock of their own.
//!
//! A mutation is applied to a copy of its row, published, and then awaits
//! the writer. The writer coalesces every pending commit into one file write
//! (temp file + rename) on the blocking pool. If that write fails, each
//! waiting mutation restores its row and reports the error.

use crate::account::{Account, AccountId, Session};
use crate::device::{Device, DeviceId, HardwareId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Writing the store file failed
    #[error("failed to persist credential store: {0}")]
    Persist(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Accounts and their sessions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountData {
    /// Accounts indexed by account ID
    #[serde(default)]
    pub accounts: HashMap<String, Account>,
    /// Sessions indexed by token hash
    #[serde(default)]
    pub sessions: HashMap<String, Session>,
}

impl AccountData {
    pub fn account(&self, id: &AccountId) -> Option<&Account> {
        self.accounts.get(&id.to_string())
    }

    pub fn account_by_username(&self, username: &str) -> Option<&Account> {
        self.accounts.values().find(|a| a.username == username)
    }
}

/// Stored data structure, also the on-disk format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredData {
    /// Devices indexed by device ID
    #[serde(default)]
    pub devices: HashMap<String, Device>,
    #[serde(flatten)]
    pub identities: AccountData,
}

impl StoredData {
    pub fn device(&self, device_id: &str) -> Option<&Device> {
        self.devices.get(device_id)
    }

    pub fn device_by_hardware_id(&self, hardware_id: &HardwareId) -> Option<&Device> {
        self.devices
            .values()
            .find(|d| &d.hardware_id == hardware_id)
    }

    pub fn account(&self, id: &AccountId) -> Option<&Account> {
        self.identities.account(id)
    }

    pub fn account_by_username(&self, username: &str) -> Option<&Account> {
        self.identities.account_by_username(username)
    }

    pub fn session(&self, token_hash: &str) -> Option<&Session> {
        self.identities.sessions.get(token_hash)
    }
}

type RowLock = Arc<Mutex<()>>;

/// Per-device locks plus the hardware ID index
#[derive(Default)]
struct DeviceTable {
    rows: HashMap<String, RowLock>,
    by_hardware_id: HashMap<HardwareId, String>,
}

impl DeviceTable {
    fn from_data(data: &StoredData) -> Self {
        let mut table = Self::default();
        for device in data.devices.values() {
            table.insert(device);
        }
        table
    }

    fn insert(&mut self, device: &Device) {
        let id = device.device_id.to_string();
        self.by_hardware_id.insert(device.hardware_id.clone(), id.clone());
        self.rows.insert(id, RowLock::default());
    }

    fn remove(&mut self, device: &Device) {
        self.by_hardware_id.remove(&device.hardware_id);
        self.rows.remove(device.device_id.as_str());
    }

    fn row(&self, device_id: &str) -> Option<(String, RowLock)> {
        self.rows
            .get(device_id)
            .map(|lock| (device_id.to_string(), lock.clone()))
    }

    fn row_by_hardware_id(&self, hardware_id: &HardwareId) -> Option<(String, RowLock)> {
        self.by_hardware_id
            .get(hardware_id)
            .and_then(|id| self.row(id))
    }
}

type FlushAck = oneshot::Sender<Result<(), String>>;

/// Device and account storage with file persistence
pub struct CredentialStore {
    /// Path to the storage file; `None` keeps everything in memory
    path: Option<PathBuf>,
    /// Committed state, shared with the writer task
    committed: Arc<Mutex<StoredData>>,
    devices: RwLock<DeviceTable>,
    /// Serializes account and session writes
    accounts: Mutex<()>,
    /// Flush requests for the writer task
    writer: Option<mpsc::UnboundedSender<FlushAck>>,
}

impl CredentialStore {
    /// Open (or create) a store at a specific path
    ///
    /// A store file that exists but cannot be parsed is an error: starting
    /// fresh would silently drop every ownership binding.
    pub async fn with_path(path: PathBuf) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let data = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<StoredData>(&contents) {
                Ok(data) => {
                    info!(
                        "Loaded credential store from {:?} ({} devices, {} accounts)",
                        path,
                        data.devices.len(),
                        data.identities.accounts.len()
                    );
                    data
                }
                Err(e) => {
                    warn!("Failed to parse credential store {:?}: {}", path, e);
                    return Err(e.into());
                }
            }
        } else {
            debug!("No existing credential store, creating new");
            StoredData::default()
        };

        let devices = RwLock::new(DeviceTable::from_data(&data));
        let committed = Arc::new(Mutex::new(data));
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(path.clone(), committed.clone(), rx));

        Ok(Self {
            path: Some(path),
            committed,
            devices,
            accounts: Mutex::new(()),
            writer: Some(tx),
        })
    }

    /// Create a store that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            committed: Arc::new(Mutex::new(StoredData::default())),
            devices: RwLock::new(DeviceTable::default()),
            accounts: Mutex::new(()),
            writer: None,
        }
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a read-only query against committed state
    pub async fn read<T>(&self, f: impl FnOnce(&StoredData) -> T) -> T {
        let data = self.committed.lock().await;
        f(&data)
    }

    /// Update one device as a single transaction; `Ok(None)` if it does not exist
    ///
    /// The closure sees a private copy of the row. If it returns `Err`, or
    /// the commit cannot be persisted, the row is left as it was.
    pub async fn update_device<T, E, F>(&self, device_id: &str, f: F) -> Result<Option<T>, E>
    where
        F: FnOnce(&mut Device) -> Result<T, E>,
        E: From<StorageError>,
    {
        let row = self.devices.read().await.row(device_id);
        match row {
            Some((id, lock)) => self.apply(&id, &lock, f).await.map(Some),
            None => Ok(None),
        }
    }

    /// Like [`update_device`](Self::update_device), addressed by hardware ID
    pub async fn update_device_by_hardware_id<T, E, F>(
        &self,
        hardware_id: &HardwareId,
        f: F,
    ) -> Result<Option<T>, E>
    where
        F: FnOnce(&mut Device) -> Result<T, E>,
        E: From<StorageError>,
    {
        let row = self.devices.read().await.row_by_hardware_id(hardware_id);
        match row {
            Some((id, lock)) => self.apply(&id, &lock, f).await.map(Some),
            None => Ok(None),
        }
    }

    /// Update the device with `hardware_id`, or create it
    ///
    /// `create` runs under the table lock and receives a predicate telling
    /// whether a device ID is taken, so concurrent first contacts for one
    /// hardware ID produce exactly one device.
    pub async fn upsert_device<T, E, U, C>(
        &self,
        hardware_id: &HardwareId,
        update: U,
        create: C,
    ) -> Result<T, E>
    where
        U: FnOnce(&mut Device) -> Result<T, E>,
        C: FnOnce(&dyn Fn(&str) -> bool) -> Result<(Device, T), E>,
        E: From<StorageError>,
    {
        let existing = self.devices.read().await.row_by_hardware_id(hardware_id);
        let (id, lock) = match existing {
            Some(row) => row,
            None => {
                let mut table = self.devices.write().await;
                match table.row_by_hardware_id(hardware_id) {
                    Some(row) => row,
                    None => {
                        let (device, value) = create(&|id: &str| table.rows.contains_key(id))?;
                        let id = device.device_id.to_string();
                        table.insert(&device);
                        let row = table.rows.get(&id).cloned().unwrap_or_default();
                        // held until the new row is durable
                        let _row = row.lock_owned().await;
                        self.committed
                            .lock()
                            .await
                            .devices
                            .insert(id.clone(), device.clone());
                        drop(table);

                        if let Err(e) = self.flush().await {
                            self.committed.lock().await.devices.remove(&id);
                            self.devices.write().await.remove(&device);
                            return Err(e.into());
                        }
                        return Ok(value);
                    }
                }
            }
        };
        self.apply(&id, &lock, update).await
    }

    /// Apply `f` to every device and persist once; returns how many changed
    ///
    /// Rows are locked one at a time. A failed persist is reported but the
    /// changes stay in memory for the next flush.
    pub async fn sweep_devices<F>(&self, mut f: F) -> StorageResult<usize>
    where
        F: FnMut(&mut Device) -> bool,
    {
        let rows: Vec<(String, RowLock)> = {
            let table = self.devices.read().await;
            table
                .rows
                .iter()
                .map(|(id, lock)| (id.clone(), lock.clone()))
                .collect()
        };

        let mut changed = 0;
        for (id, lock) in rows {
            let _row = lock.lock().await;
            let mut committed = self.committed.lock().await;
            if let Some(device) = committed.devices.get_mut(&id) {
                if f(device) {
                    changed += 1;
                }
            }
        }

        if changed > 0 {
            self.flush().await?;
        }
        Ok(changed)
    }

    /// Run an account/session mutation as a single transaction
    pub async fn transact_accounts<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut AccountData) -> Result<T, E>,
        E: From<StorageError>,
    {
        let _guard = self.accounts.lock().await;
        let previous = self.committed.lock().await.identities.clone();
        let mut working = previous.clone();
        let value = f(&mut working)?;

        self.committed.lock().await.identities = working;
        if let Err(e) = self.flush().await {
            self.committed.lock().await.identities = previous;
            return Err(e.into());
        }
        Ok(value)
    }

    /// Get the number of registered devices
    pub async fn device_count(&self) -> usize {
        self.devices.read().await.rows.len()
    }

    async fn apply<T, E, F>(&self, id: &str, lock: &Mutex<()>, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Device) -> Result<T, E>,
        E: From<StorageError>,
    {
        let _row = lock.lock().await;
        let previous = self.committed.lock().await.devices.get(id).cloned();
        let Some(previous) = previous else {
            let missing = format!("device {} missing from committed state", id);
            return Err(StorageError::Persist(missing).into());
        };

        let mut working = previous.clone();
        let value = f(&mut working)?;

        self.committed
            .lock()
            .await
            .devices
            .insert(id.to_string(), working);
        if let Err(e) = self.flush().await {
            self.committed
                .lock()
                .await
                .devices
                .insert(id.to_string(), previous);
            return Err(e.into());
        }
        Ok(value)
    }

    /// Wait until everything committed so far is on disk
    pub async fn flush(&self) -> StorageResult<()> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };
        let (ack, done) = oneshot::channel();
        writer
            .send(ack)
            .map_err(|_| StorageError::Persist("store writer stopped".to_string()))?;
        done.await
            .map_err(|_| StorageError::Persist("store writer stopped".to_string()))?
            .map_err(StorageError::Persist)
    }
}

/// Writer task: one file write per batch of pending flush requests
async fn run_writer(
    path: PathBuf,
    committed: Arc<Mutex<StoredData>>,
    mut requests: mpsc::UnboundedReceiver<FlushAck>,
) {
    while let Some(first) = requests.recv().await {
        let mut waiters = vec![first];
        while let Ok(next) = requests.try_recv() {
            waiters.push(next);
        }

        let snapshot = committed.lock().await.clone();
        let target = path.clone();
        let result = match tokio::task::spawn_blocking(move || write_snapshot(&target, &snapshot)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match &result {
            Ok(()) => debug!("Saved credential store to {:?} ({} commits)", path, waiters.len()),
            Err(e) => warn!("Failed to save credential store {:?}: {}", path, e),
        }
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

/// Write a snapshot to disk via temp file + rename
fn write_snapshot(path: &Path, data: &StoredData) -> StorageResult<()> {
    let json = serde_json::to_string_pretty(data)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Pick an unused device ID, trying at most `attempts` candidates
pub fn allocate_device_id(
    taken: &dyn Fn(&str) -> bool,
    attempts: usize,
    mut generate: impl FnMut() -> DeviceId,
) -> Option<DeviceId> {
    (0..attempts)
        .map(|_| generate())
        .find(|id| !taken(id.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::hash_token;
    use chrono::Utc;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn test_device(hw: &str) -> Device {
        Device::new(
            DeviceId::generate(),
            HardwareId::parse(hw).unwrap(),
            Some("Lobby".to_string()),
            hash_token("secret"),
            Utc::now(),
        )
    }

    async fn insert(store: &CredentialStore, hw: &str) -> String {
        let device = test_device(hw);
        let id = device.device_id.to_string();
        let hardware_id = device.hardware_id.clone();
        store
            .upsert_device(
                &hardware_id,
                |_| Ok::<_, StorageError>(()),
                |_| Ok((device, ())),
            )
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_update_commits() {
        let store = CredentialStore::in_memory();
        let id = insert(&store, "aa:bb").await;

        let updated = store
            .update_device(&id, |d| {
                d.name = Some("Atrium".to_string());
                Ok::<_, StorageError>(())
            })
            .await
            .unwrap();
        assert!(updated.is_some());

        let name = store
            .read(|data| data.device(&id).and_then(|d| d.name.clone()))
            .await;
        assert_eq!(name.as_deref(), Some("Atrium"));
        assert_eq!(store.device_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_missing_device() {
        let store = CredentialStore::in_memory();
        let result = store
            .update_device("dev-missing", |_| Ok::<_, StorageError>(()))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_failed_update_leaves_row_untouched() {
        let store = CredentialStore::in_memory();
        let id = insert(&store, "aa:bb").await;

        #[derive(Debug)]
        struct Abort;
        impl From<StorageError> for Abort {
            fn from(_: StorageError) -> Self {
                Abort
            }
        }

        let result = store
            .update_device(&id, |d| {
                d.name = None;
                Err::<(), _>(Abort)
            })
            .await;

        assert!(result.is_err());
        let name = store
            .read(|data| data.device(&id).and_then(|d| d.name.clone()))
            .await;
        assert_eq!(name.as_deref(), Some("Lobby"));
    }

    #[tokio::test]
    async fn test_upsert_updates_existing() {
        let store = CredentialStore::in_memory();
        let id = insert(&store, "aa:bb").await;
        let hw = HardwareId::parse("AA:BB").unwrap();

        let seen = store
            .upsert_device(
                &hw,
                |d| Ok::<_, StorageError>(d.device_id.to_string()),
                |_| panic!("device already exists"),
            )
            .await
            .unwrap();
        assert_eq!(seen, id);
        assert_eq!(store.device_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_write_does_not_block_other_devices() {
        let dir = tempdir().unwrap();
        let store = Arc::new(
            CredentialStore::with_path(dir.path().join("store.json"))
                .await
                .unwrap(),
        );
        let slow = insert(&store, "aa:aa").await;
        let fast = insert(&store, "bb:bb").await;
        let other = insert(&store, "cc:cc").await;

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update_device(&slow, |d| {
                        std::thread::sleep(Duration::from_millis(500));
                        d.name = Some("slow".to_string());
                        Ok::<_, StorageError>(())
                    })
                    .await
                    .unwrap();
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        let heartbeats = [fast, other].map(|id| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update_device(&id, |d| {
                        d.touch(Utc::now());
                        Ok::<_, StorageError>(())
                    })
                    .await
                    .unwrap()
            })
        });
        for heartbeat in heartbeats {
            assert!(heartbeat.await.unwrap().is_some());
        }
        assert!(started.elapsed() < Duration::from_millis(200));

        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_devices() {
        let store = CredentialStore::in_memory();
        insert(&store, "aa:aa").await;
        insert(&store, "bb:bb").await;

        let changed = store
            .sweep_devices(|d| {
                if d.hardware_id.as_str() == "aa:aa" {
                    d.name = None;
                    true
                } else {
                    false
                }
            })
            .await
            .unwrap();
        assert_eq!(changed, 1);
    }

    #[tokio::test]
    async fn test_storage_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let device_id = {
            let store = CredentialStore::with_path(path.clone()).await.unwrap();
            let id = insert(&store, "AA:BB:CC").await;
            store
                .transact_accounts(|data| {
                    data.sessions.clear();
                    Ok::<_, StorageError>(())
                })
                .await
                .unwrap();
            id
        };

        // Reload from disk
        let store = CredentialStore::with_path(path.clone()).await.unwrap();
        let hw = HardwareId::parse("aa:bb:cc").unwrap();
        let found = store
            .read(|data| data.device_by_hardware_id(&hw).map(|d| d.device_id.to_string()))
            .await;
        assert_eq!(found, Some(device_id));
        assert_eq!(store.device_count().await, 1);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_store_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = CredentialStore::with_path(path).await;
        assert!(matches!(result, Err(StorageError::Json(_))));
    }

    #[test]
    fn test_allocate_device_id_retries_on_collision() {
        let taken = |id: &str| id == "dev-taken00000";
        let mut candidates = vec![
            DeviceId("dev-fresh00000".to_string()),
            DeviceId("dev-taken00000".to_string()),
        ];
        let id = allocate_device_id(&taken, 4, || candidates.pop().unwrap()).unwrap();
        assert_eq!(id.as_str(), "dev-fresh00000");
    }

    #[test]
    fn test_allocate_device_id_gives_up() {
        let taken = |_: &str| true;
        assert!(allocate_device_id(&taken, 3, DeviceId::generate).is_none());
    }
}
