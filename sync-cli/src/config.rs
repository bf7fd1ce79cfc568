//! Configuration and local state for envsync.
//!
//! Everything lives under one data directory:
//!
//! ```text
//! <data_dir>/
//!   config.toml          settings (optional, defaults apply)
//!   credentials.json     relay token and member
//!   identity.json        X25519 keypair, hex
//!   keys/<project>.key   project key, hex
//!   workspaces.json      workspace dir -> project link
//! ```
//!
//! Secret files are 0600 and directories 0700 on Unix.

use anyhow::{Context, Result};
use envsync_client::{Identity, ProjectKey};
use envsync_types::{IdentityPublicKey, MemberId, ProjectId, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ===========================================
// Settings (config.toml)
// ===========================================

/// User settings loaded from `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Relay base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Watch mode poll interval in seconds (default: 10).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Watch mode debounce for mirror edits in milliseconds (default: 500).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Per-request relay timeout in seconds (default: 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Entries per page for `history` (default: 20).
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,
}

fn default_api_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_history_page_size() -> u32 {
    20
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            poll_interval_secs: default_poll_interval_secs(),
            debounce_ms: default_debounce_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            history_page_size: default_history_page_size(),
        }
    }
}

impl Settings {
    /// Load `config.toml` from the data directory, or defaults if absent.
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    /// Load settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Watch poll interval (at least one second).
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Debounce delay for mirror edits.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Relay request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Settings error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the settings file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the settings file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse the settings file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the settings file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

// ===========================================
// Credentials
// ===========================================

/// Relay credentials written by `envsync login`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Bearer token.
    pub token: String,
    /// Member the token belongs to.
    pub member_id: MemberId,
    /// Account email.
    pub email: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"[REDACTED]")
            .field("member_id", &self.member_id)
            .field("email", &self.email)
            .finish()
    }
}

impl Credentials {
    /// Load credentials from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("credentials.json");
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Not logged in. Run 'envsync login' first.")?;
        serde_json::from_str(&contents).context("Invalid credentials file")
    }

    /// Save credentials to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        write_private_json(&data_dir.join("credentials.json"), self).await
    }
}

// ===========================================
// Identity
// ===========================================

/// The member's identity keypair on disk.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityFile {
    /// Hex-encoded X25519 secret key.
    pub secret_key_hex: String,
    /// Public key, base64 (for display and sanity checks).
    pub public_key: IdentityPublicKey,
    /// When the identity was generated.
    pub created_at: u64,
}

impl IdentityFile {
    /// Capture an identity for storage.
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            secret_key_hex: hex::encode(identity.secret_bytes().as_slice()),
            public_key: identity.public_key(),
            created_at: now_secs(),
        }
    }

    /// Rebuild the identity, checking the stored public key matches.
    pub fn to_identity(&self) -> Result<Identity> {
        let bytes = zeroize::Zeroizing::new(
            hex::decode(&self.secret_key_hex).context("Invalid identity file: bad hex")?,
        );
        let identity = Identity::from_secret_slice(&bytes).context("Invalid identity key")?;
        if identity.public_key() != self.public_key {
            anyhow::bail!("Identity file is corrupt: public key does not match secret key");
        }
        Ok(identity)
    }

    /// Load the identity from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("identity.json");
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("No identity found. Run 'envsync init' first.")?;
        serde_json::from_str(&contents).context("Invalid identity file")
    }

    /// Save the identity to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        write_private_json(&data_dir.join("identity.json"), self).await
    }

    /// Check if an identity exists.
    pub async fn exists(data_dir: &Path) -> bool {
        data_dir.join("identity.json").exists()
    }
}

impl std::fmt::Debug for IdentityFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityFile")
            .field("secret_key_hex", &"[REDACTED]")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Load and rebuild the local identity.
pub async fn load_identity(data_dir: &Path) -> Result<Identity> {
    IdentityFile::load(data_dir).await?.to_identity()
}

// ===========================================
// Project keys
// ===========================================

fn key_path(data_dir: &Path, project: &ProjectId) -> Result<PathBuf> {
    let id = project.as_str();
    if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
        anyhow::bail!("Invalid project id: {}", id);
    }
    Ok(data_dir.join("keys").join(format!("{}.key", id)))
}

/// Store a project key.
pub async fn save_project_key(data_dir: &Path, project: &ProjectId, key: &ProjectKey) -> Result<()> {
    let path = key_path(data_dir, project)?;
    let dir = data_dir.join("keys");
    tokio::fs::create_dir_all(&dir)
        .await
        .context("Failed to create key directory")?;
    set_dir_permissions_0700(&dir).await?;

    let encoded = zeroize::Zeroizing::new(hex::encode(key.as_bytes()));
    tokio::fs::write(&path, encoded.as_bytes())
        .await
        .context("Failed to save project key")?;
    set_file_permissions_0600(&path).await
}

/// Load a project key, `None` if this workspace never stored one.
pub async fn load_project_key(data_dir: &Path, project: &ProjectId) -> Result<Option<ProjectKey>> {
    let path = key_path(data_dir, project)?;
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(c) => zeroize::Zeroizing::new(c),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).context("Failed to read project key"),
    };
    let bytes = zeroize::Zeroizing::new(
        hex::decode(contents.trim()).context("Invalid project key file: bad hex")?,
    );
    Ok(Some(
        ProjectKey::from_slice(&bytes).context("Invalid project key file")?,
    ))
}

// ===========================================
// Workspaces
// ===========================================

/// Link between a workspace directory and a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceLink {
    /// Linked project.
    pub project_id: ProjectId,
    /// Mirror file, relative to the workspace directory.
    pub env_file: PathBuf,
    /// Last version this workspace pushed or pulled.
    #[serde(default)]
    pub last_pushed_version: Version,
}

impl WorkspaceLink {
    /// Link to a project with nothing synced yet.
    pub fn new(project_id: ProjectId, env_file: &Path) -> Self {
        Self {
            project_id,
            env_file: env_file.to_path_buf(),
            last_pushed_version: Version::zero(),
        }
    }

    /// Absolute mirror path for a workspace.
    pub fn env_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.env_file)
    }
}

/// All workspace links on this machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceState {
    /// Canonical workspace directory -> link.
    #[serde(default)]
    pub workspaces: BTreeMap<PathBuf, WorkspaceLink>,
}

impl WorkspaceState {
    /// Load the workspace map, empty if the file does not exist.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("workspaces.json");
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents).context("Invalid workspaces file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).context("Failed to read workspaces file"),
        }
    }

    /// Save the workspace map.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        write_private_json(&data_dir.join("workspaces.json"), self).await
    }

    /// The link for a workspace directory.
    pub fn get(&self, workspace: &Path) -> Option<&WorkspaceLink> {
        self.workspaces.get(workspace)
    }

    /// Link (or relink) a workspace directory.
    pub fn link(&mut self, workspace: &Path, link: WorkspaceLink) {
        self.workspaces.insert(workspace.to_path_buf(), link);
    }

    /// Record the version a workspace last synced.
    pub fn record_version(&mut self, workspace: &Path, version: Version) {
        if let Some(link) = self.workspaces.get_mut(workspace) {
            link.last_pushed_version = version;
        }
    }
}

/// Load the link for a workspace or explain how to create one.
pub async fn require_link(data_dir: &Path, workspace: &Path) -> Result<WorkspaceLink> {
    WorkspaceState::load(data_dir)
        .await?
        .get(workspace)
        .cloned()
        .with_context(|| {
            format!(
                "{} is not linked to a project. Run 'envsync create' or 'envsync link' first.",
                workspace.display()
            )
        })
}

/// Persist the version a workspace last synced.
pub async fn record_version(data_dir: &Path, workspace: &Path, version: Version) -> Result<()> {
    let mut state = WorkspaceState::load(data_dir).await?;
    state.record_version(workspace, version);
    state.save(data_dir).await
}

// ===========================================
// File helpers
// ===========================================

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

async fn write_private_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    set_file_permissions_0600(path).await
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // ===========================================
    // Settings Tests
    // ===========================================

    #[test]
    fn missing_settings_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.poll_interval(), Duration::from_secs(10));
        assert_eq!(settings.debounce(), Duration::from_millis(500));
        assert_eq!(settings.history_page_size, 20);
    }

    #[test]
    fn settings_from_toml_string() {
        let toml = r#"
api_url = "https://relay.example.com"
poll_interval_secs = 3
"#;
        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.api_url, "https://relay.example.com");
        assert_eq!(settings.poll_interval_secs, 3);
        assert_eq!(settings.request_timeout_secs, 30);
    }

    #[test]
    fn bad_settings_file_is_parse_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "poll_interval_secs = \"often\"").unwrap();
        assert!(matches!(
            Settings::load(dir.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let settings = Settings {
            poll_interval_secs: 0,
            ..Settings::default()
        };
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
    }

    // ===========================================
    // Secret File Tests
    // ===========================================

    #[tokio::test]
    async fn identity_roundtrip() {
        let dir = tempdir().unwrap();
        let identity = Identity::generate().unwrap();
        IdentityFile::from_identity(&identity)
            .save(dir.path())
            .await
            .unwrap();

        let loaded = load_identity(dir.path()).await.unwrap();
        assert_eq!(loaded.public_key(), identity.public_key());
    }

    #[tokio::test]
    async fn tampered_identity_is_rejected() {
        let dir = tempdir().unwrap();
        let mut file = IdentityFile::from_identity(&Identity::generate().unwrap());
        file.public_key = Identity::generate().unwrap().public_key();
        file.save(dir.path()).await.unwrap();

        assert!(load_identity(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn project_key_roundtrip() {
        let dir = tempdir().unwrap();
        let project = ProjectId::new("p-1");
        assert!(load_project_key(dir.path(), &project).await.unwrap().is_none());

        let key = ProjectKey::generate().unwrap();
        save_project_key(dir.path(), &project, &key).await.unwrap();
        let loaded = load_project_key(dir.path(), &project).await.unwrap();
        assert_eq!(loaded, Some(key));
    }

    #[tokio::test]
    async fn project_id_cannot_escape_key_dir() {
        let dir = tempdir().unwrap();
        let key = ProjectKey::generate().unwrap();
        let result = save_project_key(dir.path(), &ProjectId::new("../evil"), &key).await;
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn secret_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        IdentityFile::from_identity(&Identity::generate().unwrap())
            .save(dir.path())
            .await
            .unwrap();
        let project = ProjectId::new("p-1");
        save_project_key(dir.path(), &project, &ProjectKey::generate().unwrap())
            .await
            .unwrap();

        let identity = dir.path().join("identity.json");
        let perms = tokio::fs::metadata(&identity).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600, "identity should be 0600");

        let key = key_path(dir.path(), &project).unwrap();
        let perms = tokio::fs::metadata(&key).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600, "key should be 0600");

        let keys_dir = dir.path().join("keys");
        let perms = tokio::fs::metadata(&keys_dir).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o700, "key dir should be 0700");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn data_dir_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("test-data");
        tokio::fs::create_dir_all(&data_dir).await.unwrap();
        set_dir_permissions_0700(&data_dir).await.unwrap();

        let perms = tokio::fs::metadata(&data_dir).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o700, "dir should be 0700");
    }

    #[tokio::test]
    async fn credentials_debug_hides_token() {
        let creds = Credentials {
            token: "tok-secret".into(),
            member_id: MemberId::new("m-1"),
            email: "a@example.com".into(),
        };
        assert!(!format!("{:?}", creds).contains("tok-secret"));
    }

    // ===========================================
    // Workspace Tests
    // ===========================================

    #[tokio::test]
    async fn workspace_link_and_version_tracking() {
        let dir = tempdir().unwrap();
        let ws = PathBuf::from("/work/api");

        let mut state = WorkspaceState::load(dir.path()).await.unwrap();
        assert!(state.get(&ws).is_none());
        state.link(&ws, WorkspaceLink::new(ProjectId::new("p-1"), Path::new(".env")));
        state.save(dir.path()).await.unwrap();

        record_version(dir.path(), &ws, Version::new(4)).await.unwrap();

        let link = require_link(dir.path(), &ws).await.unwrap();
        assert_eq!(link.project_id, ProjectId::new("p-1"));
        assert_eq!(link.last_pushed_version, Version::new(4));
        assert_eq!(link.env_path(&ws), PathBuf::from("/work/api/.env"));
    }

    #[tokio::test]
    async fn unlinked_workspace_explains_next_step() {
        let dir = tempdir().unwrap();
        let err = require_link(dir.path(), Path::new("/nowhere"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("envsync create"));
    }
}
