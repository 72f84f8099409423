//! Owns the `.gitup/` directory: layout, first-time initialization, and the
//! advisory lock that serializes concurrent mutation of the managed files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use gitup_config::{ProjectConfig, ProjectState, SecurityLevel};

use crate::decision::AuditEntry;

pub struct ProjectStore {
    root: PathBuf,
    store_dir: PathBuf,
}

impl ProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let store_dir = root.join(".gitup");
        Self { root, store_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.store_dir.join("audit.log")
    }

    fn lock(&self) -> Result<std::fs::File> {
        let lock_path = self.store_dir.join(".lock");
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        if !lock_path.exists() {
            std::fs::write(&lock_path, "")?;
        }
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("opening {}", lock_path.display()))?;
        file.lock_exclusive().context("acquiring project store lock")?;
        Ok(file)
    }

    /// Creates `.gitup/` with a recommended config and fresh state. Refuses
    /// to overwrite an existing store unless `force` is set.
    pub fn initialize(&self, recommended_level: SecurityLevel, force: bool) -> Result<()> {
        let lock = self.lock()?;
        if self.store_dir.join("config.yaml").exists() && !force {
            drop(lock);
            anyhow::bail!("{} already initialized (use force to reinitialize)", self.root.display());
        }

        std::fs::create_dir_all(self.store_dir.join("cache"))
            .with_context(|| format!("creating {}", self.store_dir.display()))?;

        // Project-internal ignore entry: the project's own .gitignore is the
        // user's to edit, so GitUp's cache lives outside it, excluded here
        // instead.
        gitup_config::write_atomic_with_backup(&self.store_dir.join(".gitignore"), b"cache/\n")
            .context("writing .gitup/.gitignore")?;

        let config = ProjectConfig::recommended(recommended_level);
        config.save(&self.store_dir)?;

        let state = ProjectState::new(chrono::Utc::now().to_rfc3339());
        state.save(&self.store_dir)?;

        self.append_audit_locked(crate::decision::AuditAction::Created, serde_json::json!({ "event": "store_initialized" }))?;
        drop(lock);
        Ok(())
    }

    pub fn load_config(&self) -> Result<ProjectConfig> {
        ProjectConfig::load(&self.store_dir)
    }

    pub fn load_state(&self) -> Result<ProjectState> {
        ProjectState::load(&self.store_dir, || chrono::Utc::now().to_rfc3339())
    }

    pub fn update_config(&self, mutate: impl FnOnce(&mut ProjectConfig)) -> Result<()> {
        let lock = self.lock()?;
        let mut config = self.load_config()?;
        mutate(&mut config);
        config.save(&self.store_dir)?;
        drop(lock);
        Ok(())
    }

    pub fn update_state(&self, mutate: impl FnOnce(&mut ProjectState)) -> Result<()> {
        let lock = self.lock()?;
        let mut state = self.load_state()?;
        mutate(&mut state);
        state.save(&self.store_dir)?;
        drop(lock);
        Ok(())
    }

    pub fn append_audit(&self, action: crate::decision::AuditAction, details: serde_json::Value) -> Result<()> {
        let lock = self.lock()?;
        self.append_audit_locked(action, details)?;
        drop(lock);
        Ok(())
    }

    fn append_audit_locked(&self, action: crate::decision::AuditAction, details: serde_json::Value) -> Result<()> {
        let entry = AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            action,
            timestamp: chrono::Utc::now().to_rfc3339(),
            user_id: crate::decision::current_user(),
            details,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            project_hash: crate::decision::project_hash(&self.root),
        };
        let path = self.audit_log_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        use std::io::Write;
        writeln!(file, "{}", serde_json::to_string(&entry)?)?;
        Ok(())
    }

    /// Moves any `.gitignore_security.yaml`-style legacy file (the original
    /// Python's config name) to `.gitup/config.yaml` if present and no
    /// current config exists yet. Best-effort; absence of a legacy file is
    /// not an error.
    pub fn migrate_legacy(&self) -> Result<bool> {
        let legacy = self.root.join(".gitup_security.yaml");
        if !legacy.exists() || self.store_dir.join("config.yaml").exists() {
            return Ok(false);
        }
        std::fs::create_dir_all(&self.store_dir)?;
        let raw = std::fs::read_to_string(&legacy).with_context(|| format!("reading {}", legacy.display()))?;
        gitup_config::write_atomic_with_backup(&self.store_dir.join("config.yaml"), raw.as_bytes())?;
        self.append_audit(
            crate::decision::AuditAction::Updated,
            serde_json::json!({ "event": "migrated_legacy_config" }),
        )?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_creates_store_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        store.initialize(SecurityLevel::Moderate, false).unwrap();

        assert!(store.store_dir().join("config.yaml").exists());
        assert!(store.store_dir().join("state.json").exists());
        assert!(store.audit_log_path().exists());
    }

    #[test]
    fn initialize_excludes_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        store.initialize(SecurityLevel::Moderate, false).unwrap();

        let ignore = std::fs::read_to_string(store.store_dir().join(".gitignore")).unwrap();
        assert!(ignore.contains("cache/"));
    }

    #[test]
    fn reinitialize_without_force_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        store.initialize(SecurityLevel::Moderate, false).unwrap();
        assert!(store.initialize(SecurityLevel::Strict, false).is_err());
        assert!(store.initialize(SecurityLevel::Strict, true).is_ok());
    }

    #[test]
    fn update_config_persists_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        store.initialize(SecurityLevel::Moderate, false).unwrap();
        store.update_config(|c| c.security_level = SecurityLevel::Strict).unwrap();
        assert_eq!(store.load_config().unwrap().security_level, SecurityLevel::Strict);
    }

    #[test]
    fn audit_log_accumulates_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        store.initialize(SecurityLevel::Moderate, false).unwrap();
        store
            .append_audit(crate::decision::AuditAction::Reviewed, serde_json::json!({}))
            .unwrap();
        let content = std::fs::read_to_string(store.audit_log_path()).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
