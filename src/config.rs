use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::Builder;
use tracing::warn;

use crate::logging::redact_secret;

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

const LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub const TOKEN_KEY: &str = "console_token";
pub const TENANT_ID_KEY: &str = "console_tenant_id";
pub const BASE_URL_KEY: &str = "console_api_base_url";
pub const MOCK_MODE_KEY: &str = "console_mock_mode";
pub const DEFAULT_BASE_URL: &str = "http://192.168.1.201:5005";

/// Durable string key-value storage for console settings.
///
/// Reads never fail: a value that cannot be read is reported as absent.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Reads several keys at once; missing keys are absent from the map.
    fn snapshot(&self, keys: &[&str]) -> BTreeMap<String, String> {
        keys.iter()
            .filter_map(|key| self.get(key).map(|value| ((*key).to_string(), value)))
            .collect()
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub tenant_id: Option<String>,
    pub mock_mode: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            tenant_id: None,
            mock_mode: false,
        }
    }
}

impl SessionConfig {
    /// Reads all session keys in one store snapshot.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let mut values = store.snapshot(&[BASE_URL_KEY, TOKEN_KEY, TENANT_ID_KEY, MOCK_MODE_KEY]);
        Self {
            base_url: non_empty(values.remove(BASE_URL_KEY))
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            token: non_empty(values.remove(TOKEN_KEY)),
            tenant_id: non_empty(values.remove(TENANT_ID_KEY)),
            mock_mode: values.remove(MOCK_MODE_KEY).as_deref() == Some("true"),
        }
    }

    /// Settings-save action: writes every key in one store update.
    pub fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        store.set_many(&[
            (BASE_URL_KEY, self.base_url.as_str()),
            (TOKEN_KEY, self.token.as_deref().unwrap_or("")),
            (TENANT_ID_KEY, self.tenant_id.as_deref().unwrap_or("")),
            (MOCK_MODE_KEY, if self.mock_mode { "true" } else { "false" }),
        ])
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            base_url: self.base_url.clone(),
            token: self.token.as_deref().map(redact_secret),
            tenant_id: self.tenant_id.clone(),
            mock_mode: self.mock_mode,
        }
    }
}

/// Session settings safe to print or serve: the token is redacted.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionView {
    pub base_url: String,
    pub token: Option<String>,
    pub tenant_id: Option<String>,
    pub mock_mode: bool,
}

/// Partial settings change. An empty token or tenant clears the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub mock_mode: Option<bool>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.base_url.is_none()
            && self.token.is_none()
            && self.tenant_id.is_none()
            && self.mock_mode.is_none()
    }

    pub fn apply(self, session: &mut SessionConfig) {
        if let Some(base_url) = self.base_url {
            let trimmed = base_url.trim();
            session.base_url = if trimmed.is_empty() {
                DEFAULT_BASE_URL.to_string()
            } else {
                trimmed.to_string()
            };
        }
        if let Some(token) = self.token {
            session.token = non_empty(Some(token.trim().to_string()));
        }
        if let Some(tenant_id) = self.tenant_id {
            session.tenant_id = non_empty(Some(tenant_id.trim().to_string()));
        }
        if let Some(mock_mode) = self.mock_mode {
            session.mock_mode = mock_mode;
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

/// File-backed settings store shared by every process using the same
/// config directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    paths: Paths,
}

#[derive(Debug, Clone)]
struct Paths {
    config_dir: PathBuf,
    settings_file: PathBuf,
    lock_file: PathBuf,
}

impl ConfigStore {
    pub fn new_default() -> Result<Self> {
        let config_dir = match std::env::var_os("AGENT_CONSOLE_CONFIG_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let config_root = dirs::config_dir()
                    .ok_or_else(|| anyhow!("unable to resolve config directory"))?;
                config_root.join("agent-console")
            }
        };
        Ok(Self::with_base_dir(config_dir))
    }

    pub fn with_base_dir(config_dir: PathBuf) -> Self {
        let settings_file = config_dir.join("settings.json");
        let lock_file = config_dir.join(".lock");
        Self {
            paths: Paths {
                config_dir,
                settings_file,
                lock_file,
            },
        }
    }

    pub fn settings_file(&self) -> &Path {
        &self.paths.settings_file
    }

    pub fn load(&self) -> Result<BTreeMap<String, String>> {
        let _guard = self.acquire_lock(LOCK_WAIT_TIMEOUT)?;
        self.load_unlocked()
    }

    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> Result<T>,
    {
        let _guard = self.acquire_lock(LOCK_WAIT_TIMEOUT)?;
        let mut values = self.load_unlocked()?;
        let result = f(&mut values)?;
        self.save_unlocked(&values)?;
        Ok(result)
    }

    pub fn weak_permission_paths(&self) -> Result<Vec<PathBuf>> {
        self.ensure_layout()?;
        let mut weak = Vec::new();
        for path in [&self.paths.config_dir, &self.paths.settings_file] {
            if is_weaker_than_owner_only(path)? {
                weak.push(path.clone());
            }
        }
        Ok(weak)
    }

    fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.config_dir)
            .with_context(|| format!("failed to create {}", self.paths.config_dir.display()))?;

        #[cfg(unix)]
        set_mode(&self.paths.config_dir, 0o700)?;

        if !self.paths.settings_file.exists() {
            atomic_write_json(&self.paths.settings_file, &BTreeMap::<String, String>::new())?;
        }
        Ok(())
    }

    fn load_unlocked(&self) -> Result<BTreeMap<String, String>> {
        self.ensure_layout()?;
        let raw = fs::read_to_string(&self.paths.settings_file)
            .with_context(|| format!("failed to read {}", self.paths.settings_file.display()))?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid JSON in {}", self.paths.settings_file.display()))
    }

    fn save_unlocked(&self, values: &BTreeMap<String, String>) -> Result<()> {
        self.ensure_layout()?;
        atomic_write_json(&self.paths.settings_file, values)
    }

    fn acquire_lock(&self, timeout: Duration) -> Result<LockGuard> {
        fs::create_dir_all(&self.paths.config_dir)
            .with_context(|| format!("failed to create {}", self.paths.config_dir.display()))?;

        let file = open_lock_file(&self.paths.lock_file).with_context(|| {
            format!(
                "failed to open lock file {}",
                self.paths.lock_file.display()
            )
        })?;

        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(LockGuard { file }),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() >= timeout {
                        bail!(
                            "timed out acquiring settings lock at {}",
                            self.paths.lock_file.display()
                        );
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!(
                            "failed to lock settings lock file {}",
                            self.paths.lock_file.display()
                        )
                    });
                }
            }
        }
    }
}

impl SettingsStore for ConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.load() {
            Ok(mut values) => values.remove(key),
            Err(err) => {
                warn!(
                    key,
                    error = %format!("{err:#}"),
                    "failed to read settings; treating value as unset"
                );
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_many(&[(key, value)])
    }

    fn snapshot(&self, keys: &[&str]) -> BTreeMap<String, String> {
        match self.load() {
            Ok(mut values) => {
                values.retain(|key, _| keys.contains(&key.as_str()));
                values
            }
            Err(err) => {
                warn!(
                    error = %format!("{err:#}"),
                    "failed to read settings; treating values as unset"
                );
                BTreeMap::new()
            }
        }
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        self.update(|values| {
            for (key, value) in entries {
                values.insert((*key).to_string(), (*value).to_string());
            }
            Ok(())
        })
    }
}

/// In-process settings, used when nothing should touch the filesystem.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self {
            values: Arc::new(Mutex::new(values)),
        }
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn snapshot(&self, keys: &[&str]) -> BTreeMap<String, String> {
        match self.values.lock() {
            Ok(guard) => keys
                .iter()
                .filter_map(|key| guard.get(*key).map(|value| ((*key).to_string(), value.clone())))
                .collect(),
            Err(_) => BTreeMap::new(),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self
            .values
            .lock()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn open_lock_file(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).read(true).write(true);

    #[cfg(unix)]
    {
        options.mode(0o600);
    }

    options.open(path)
}

fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path '{}' has no parent", path.display()))?;

    let mut temp = Builder::new()
        .prefix(".settings-tmp-")
        .tempfile_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;

    #[cfg(unix)]
    temp.as_file_mut()
        .set_permissions(fs::Permissions::from_mode(0o600))?;

    serde_json::to_writer_pretty(temp.as_file_mut(), data)
        .with_context(|| format!("failed to serialize JSON for {}", path.display()))?;
    temp.as_file_mut().write_all(b"\n")?;
    temp.as_file_mut().sync_data()?;

    temp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to persist settings to {}", path.display()))?;

    #[cfg(unix)]
    {
        set_mode(path, 0o600)?;
        let dir = File::open(parent)
            .with_context(|| format!("failed to open parent directory {}", parent.display()))?;
        dir.sync_all()
            .with_context(|| format!("failed to fsync parent directory {}", parent.display()))?;
    }

    Ok(())
}

fn is_weaker_than_owner_only(path: &Path) -> Result<bool> {
    #[cfg(unix)]
    {
        let mode = fs::metadata(path)?.permissions().mode() & 0o777;
        Ok(mode & 0o077 != 0)
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(false)
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("failed to set permissions on {}", path.display()))
}
