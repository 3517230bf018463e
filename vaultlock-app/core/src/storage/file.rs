//! JSON-file credential store.
//!
//! The whole `SecurityRecord` lives in `security.json` inside the data
//! directory. Every write goes to a temp file that is then renamed over the
//! record, so a crash mid-write leaves either the old or the new record on
//! disk, never a mix.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::store::{CredentialStore, SecurityRecord};
use crate::error::{Result, SecurityError};
use crate::security::{PinRecord, SecurityConfig};

/// Record file name
pub const RECORD_FILE_NAME: &str = "security.json";

pub struct FileStore {
    data_dir: PathBuf,
    /// Vault databases and other files erased together with the record
    wipe_targets: Vec<PathBuf>,
    lock: Mutex<()>,
}

impl FileStore {
    /// Open (or prepare) a store rooted at `data_dir`, creating the
    /// directory if needed.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;

        Ok(Self {
            data_dir,
            wipe_targets: Vec::new(),
            lock: Mutex::new(()),
        })
    }

    /// Register extra files or directories to delete on wipe.
    pub fn with_wipe_targets<I, P>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.wipe_targets.extend(targets.into_iter().map(Into::into));
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn record_path(&self) -> PathBuf {
        self.data_dir.join(RECORD_FILE_NAME)
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| SecurityError::Persistence("Credential store lock poisoned".into()))
    }

    fn read_record(&self) -> Result<SecurityRecord> {
        let path = self.record_path();

        if !path.exists() {
            return Ok(SecurityRecord::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let record: SecurityRecord = serde_json::from_str(&content).map_err(|e| {
            SecurityError::Persistence(format!("Security record corrupted: {}", e))
        })?;
        Ok(record)
    }

    fn write_record(&self, record: &SecurityRecord) -> Result<()> {
        let path = self.record_path();
        let content = serde_json::to_string_pretty(record)?;

        // Write atomically (write to temp file, then rename)
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, content)?;

        // Set restrictive permissions on Unix (the verifier is sensitive)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&temp_path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&temp_path, perms)?;
        }

        std::fs::rename(&temp_path, &path)?;
        debug!("Security record written to {:?}", path);
        Ok(())
    }

    fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut SecurityRecord),
    {
        let _guard = self.guard()?;
        let mut record = self.read_record()?;
        apply(&mut record);
        self.write_record(&record)
    }
}

impl CredentialStore for FileStore {
    fn load_config(&self) -> Result<SecurityConfig> {
        let _guard = self.guard()?;
        Ok(self.read_record()?.config)
    }

    fn save_config(&self, config: &SecurityConfig) -> Result<()> {
        self.update(|record| record.config = *config)
    }

    fn load_pin_verifier(&self) -> Result<Option<PinRecord>> {
        let _guard = self.guard()?;
        Ok(self.read_record()?.pin)
    }

    fn save_pin_verifier(&self, pin: Option<&PinRecord>) -> Result<()> {
        self.update(|record| record.pin = pin.cloned())
    }

    fn load_failure_counter(&self) -> Result<u32> {
        let _guard = self.guard()?;
        Ok(self.read_record()?.failures)
    }

    fn save_failure_counter(&self, failures: u32) -> Result<()> {
        self.update(|record| record.failures = failures)
    }

    fn wipe_all_secrets(&self) -> Result<()> {
        let _guard = self.guard()?;
        warn!("Wiping all secrets in {:?}", self.data_dir);

        for target in &self.wipe_targets {
            if target.is_dir() {
                std::fs::remove_dir_all(target)?;
                info!("Deleted directory {:?}", target);
            } else if target.exists() {
                std::fs::remove_file(target)?;
                info!("Deleted file {:?}", target);
            }
        }

        let path = self.record_path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        info!("Secrets wiped");
        Ok(())
    }

    fn load_record(&self) -> Result<SecurityRecord> {
        let _guard = self.guard()?;
        self.read_record()
    }

    fn save_record(&self, record: &SecurityRecord) -> Result<()> {
        let _guard = self.guard()?;
        self.write_record(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{KdfParams, LockTimeout};

    #[test]
    fn test_missing_record_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert_eq!(store.load_record().unwrap(), SecurityRecord::default());
        assert!(!store.record_path().exists());
    }

    #[test]
    fn test_single_field_saves_keep_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let pin = PinRecord::create("1357", KdfParams::new(1024, 1, 1)).unwrap();
        store.save_pin_verifier(Some(&pin)).unwrap();
        store.save_failure_counter(2).unwrap();
        let config = SecurityConfig {
            pin_enabled: true,
            lock_timeout: LockTimeout::Seconds60,
            ..Default::default()
        };
        store.save_config(&config).unwrap();

        let reopened = FileStore::open(dir.path()).unwrap();
        let record = reopened.load_record().unwrap();
        assert_eq!(record.config, config);
        assert_eq!(record.failures, 2);
        assert!(record.pin.unwrap().verify("1357").unwrap());
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.save_failure_counter(1).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![RECORD_FILE_NAME.to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_record_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.save_failure_counter(1).unwrap();

        let mode = std::fs::metadata(store.record_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_wipe_removes_record_and_targets() {
        let dir = tempfile::tempdir().unwrap();
        let database = dir.path().join("passwords.kdbx");
        let attachments = dir.path().join("attachments");
        std::fs::write(&database, b"kdbx").unwrap();
        std::fs::create_dir(&attachments).unwrap();
        std::fs::write(attachments.join("a.bin"), b"x").unwrap();

        let store = FileStore::open(dir.path())
            .unwrap()
            .with_wipe_targets([database.clone(), attachments.clone()]);
        store.save_failure_counter(4).unwrap();

        store.wipe_all_secrets().unwrap();

        assert!(!database.exists());
        assert!(!attachments.exists());
        assert!(!store.record_path().exists());
        assert_eq!(store.load_failure_counter().unwrap(), 0);

        // Idempotent
        store.wipe_all_secrets().unwrap();
    }

    #[test]
    fn test_corrupted_record_is_a_persistence_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        std::fs::write(store.record_path(), "{not json").unwrap();

        let err = store.load_record().unwrap_err();
        assert!(err.is_persistence_failure());
    }
}
