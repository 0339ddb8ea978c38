#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use naralink_domain::{Role, SessionIdentity, Slug, StableId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{ClientCoreError, SecretString, UnreadCounter};

/// Everything tied to one logged-in session.
///
/// Created on login/register/restore and dropped on logout, never global.
#[derive(Debug, Clone)]
pub struct SessionContext {
	pub identity: SessionIdentity,
	pub token: SecretString,
	pub unread: UnreadCounter,
}

impl SessionContext {
	pub fn new(identity: SessionIdentity, token: SecretString) -> Self {
		Self {
			identity,
			token,
			unread: UnreadCounter::new(),
		}
	}

	pub fn self_id(&self) -> &StableId {
		&self.identity.id
	}

	pub fn is_own_profile(&self, slug: &Slug) -> bool {
		&self.identity.slug == slug
	}
}

/// Session restored from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
	pub token: SecretString,
	pub identity: SessionIdentity,
}

/// Keyring service the session token is stored under.
pub const KEYRING_SERVICE: &str = "naralink";
const TOKEN_ENTRY: &str = "session_token";
const SECRETS_FILE: &str = "secrets.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
	stable_id: Option<String>,
	slug: Option<String>,
	role: Option<String>,
}

/// Session persistence: identity in TOML, token in the system keyring.
///
/// When the keyring is unavailable the token goes to `secrets.json` next to
/// the session file instead.
#[derive(Debug, Clone)]
pub struct SessionStore {
	path: PathBuf,
	use_keyring: bool,
}

impl SessionStore {
	/// `<config dir>/naralink/session.toml`.
	pub fn default_path() -> Result<PathBuf, ClientCoreError> {
		let dir = dirs::config_dir().ok_or_else(|| ClientCoreError::Config("could not determine config directory".into()))?;
		Ok(dir.join("naralink").join("session.toml"))
	}

	pub fn open_default() -> Result<Self, ClientCoreError> {
		Ok(Self::new(Self::default_path()?))
	}

	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			use_keyring: true,
		}
	}

	/// Store that never touches the system keyring.
	pub fn without_keyring(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			use_keyring: false,
		}
	}

	/// Fallback token file.
	pub fn secrets_path(&self) -> PathBuf {
		self.path.with_file_name(SECRETS_FILE)
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Load the stored session. Any missing or invalid field means no session.
	pub fn load(&self) -> Option<StoredSession> {
		let data = match fs::read_to_string(&self.path) {
			Ok(d) => d,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
			Err(e) => {
				warn!(path = %self.path.display(), error = %e, "failed to read session file");
				return None;
			}
		};

		let file: SessionFile = match toml::from_str(&data) {
			Ok(f) => f,
			Err(e) => {
				warn!(path = %self.path.display(), error = %e, "ignoring unparseable session file");
				return None;
			}
		};

		let token = self.read_token().filter(|t| !t.trim().is_empty())?;
		let id = file.stable_id.and_then(|v| StableId::new(v).ok())?;
		let slug = file.slug.and_then(|v| Slug::new(v).ok())?;
		let role = file.role.and_then(|v| v.parse::<Role>().ok())?;

		debug!(slug = %slug, "session restored from disk");
		Some(StoredSession {
			token: SecretString::new(token),
			identity: SessionIdentity { id, slug, role },
		})
	}

	pub fn save(&self, token: &SecretString, identity: &SessionIdentity) -> Result<(), ClientCoreError> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent)?;
		}

		self.store_token(token.expose())?;

		let file = SessionFile {
			stable_id: Some(identity.id.as_str().to_string()),
			slug: Some(identity.slug.as_str().to_string()),
			role: Some(identity.role.as_str().to_string()),
		};
		let data = toml::to_string_pretty(&file).map_err(|e| ClientCoreError::Other(format!("encode session: {e}")))?;
		fs::write(&self.path, data)?;
		info!(slug = %identity.slug, "session saved");
		Ok(())
	}

	/// Remove the stored session entirely. Missing file is not an error.
	pub fn clear(&self) -> Result<(), ClientCoreError> {
		self.forget_token()?;
		match fs::remove_file(&self.path) {
			Ok(()) => {
				info!("session cleared");
				Ok(())
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	fn keyring_entry(&self) -> Option<keyring::Entry> {
		if !self.use_keyring {
			return None;
		}
		match keyring::Entry::new(KEYRING_SERVICE, TOKEN_ENTRY) {
			Ok(entry) => Some(entry),
			Err(e) => {
				debug!(error = %e, "keyring unavailable; using secrets file");
				None
			}
		}
	}

	fn read_secrets_file(&self) -> HashMap<String, String> {
		fs::read_to_string(self.secrets_path())
			.ok()
			.and_then(|data| serde_json::from_str(&data).ok())
			.unwrap_or_default()
	}

	fn write_secrets_file(&self, map: &HashMap<String, String>) -> Result<(), ClientCoreError> {
		let path = self.secrets_path();
		if map.is_empty() {
			return match fs::remove_file(&path) {
				Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
				_ => Ok(()),
			};
		}
		let data = serde_json::to_string_pretty(map).map_err(|e| ClientCoreError::Other(format!("encode secrets: {e}")))?;
		fs::write(&path, data)?;
		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt as _;
			fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
		}
		Ok(())
	}

	fn store_token(&self, token: &str) -> Result<(), ClientCoreError> {
		if let Some(entry) = self.keyring_entry() {
			match entry.set_password(token) {
				Ok(()) => {
					debug!("session token stored in system keyring");
					let mut map = self.read_secrets_file();
					if map.remove(TOKEN_ENTRY).is_some() {
						self.write_secrets_file(&map)?;
					}
					return Ok(());
				}
				Err(e) => info!(error = %e, "keyring write failed; falling back to secrets file"),
			}
		}

		let mut map = self.read_secrets_file();
		map.insert(TOKEN_ENTRY.to_string(), token.to_string());
		self.write_secrets_file(&map)?;
		debug!(path = %self.secrets_path().display(), "session token stored in secrets file");
		Ok(())
	}

	fn read_token(&self) -> Option<String> {
		if let Some(entry) = self.keyring_entry() {
			match entry.get_password() {
				Ok(token) => return Some(token),
				Err(keyring::Error::NoEntry) => {}
				Err(e) => debug!(error = %e, "keyring read failed"),
			}
		}
		self.read_secrets_file().remove(TOKEN_ENTRY)
	}

	fn forget_token(&self) -> Result<(), ClientCoreError> {
		if let Some(entry) = self.keyring_entry() {
			match entry.delete_credential() {
				Ok(()) | Err(keyring::Error::NoEntry) => {}
				Err(e) => warn!(error = %e, "failed to delete keyring entry"),
			}
		}
		let mut map = self.read_secrets_file();
		if map.remove(TOKEN_ENTRY).is_some() {
			self.write_secrets_file(&map)?;
		}
		Ok(())
	}
}
