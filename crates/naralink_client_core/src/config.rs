#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use naralink_protocol::DEFAULT_MAX_FRAME_BYTES;
use naralink_util::endpoint::{ApiEndpoint, RealtimeEndpoint};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::ClientCoreError;

/// Local dev API base.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

pub const ENV_API_URL: &str = "NARALINK_API_URL";
pub const ENV_REALTIME_URL: &str = "NARALINK_REALTIME_URL";
pub const ENV_AUTO_RECONNECT: &str = "NARALINK_AUTO_RECONNECT";

/// Request header carrying [`ClientConfig::client_instance_id`].
pub const CLIENT_INSTANCE_HEADER: &str = "x-client-instance";

/// Default config path: `~/.naralink/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ClientCoreError> {
	let home = dirs::home_dir().ok_or_else(|| ClientCoreError::Config("could not determine home directory".into()))?;
	Ok(home.join(".naralink").join("config.toml"))
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// REST base URL, e.g. `http://localhost:5000/api`.
	pub api_base_url: String,

	/// Real-time channel URL. Derived from `api_base_url` when not set explicitly.
	pub realtime_url: String,

	pub request_timeout: Duration,

	/// Timeout for the real-time connect + handshake.
	pub connect_timeout: Duration,

	/// Maximum inbound/outbound frame size.
	pub max_frame_bytes: usize,

	/// Reconnect with backoff when the channel drops. Off by default.
	pub auto_reconnect: bool,

	/// Sent as the `User-Agent` on HTTP requests and the channel upgrade.
	pub client_name: String,

	/// Fresh per process; lets the server tell concurrent logins of one account apart.
	pub client_instance_id: String,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			api_base_url: DEFAULT_API_BASE_URL.to_string(),
			realtime_url: derive_realtime_url(DEFAULT_API_BASE_URL).unwrap_or_else(|_| "ws://localhost:5000/".into()),
			request_timeout: Duration::from_secs(15),
			connect_timeout: Duration::from_secs(15),
			max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
			auto_reconnect: false,
			client_name: format!("naralink-client-core/{}", env!("CARGO_PKG_VERSION")),
			client_instance_id: uuid::Uuid::new_v4().to_string(),
		}
	}
}

impl ClientConfig {
	/// Load from `~/.naralink/config.toml` and the environment.
	pub fn load() -> Result<Self, ClientCoreError> {
		let path = default_config_path()?;
		Self::load_from_path(&path)
	}

	/// Same as [`ClientConfig::load`] with an explicit path. A missing file yields defaults.
	pub fn load_from_path(path: &Path) -> Result<Self, ClientCoreError> {
		let file_cfg = read_toml_if_exists(path)?.unwrap_or_default();
		let mut cfg = Self::from_file(file_cfg)?;
		cfg.apply_overrides(|key| std::env::var(key).ok())?;
		cfg.validate()?;
		debug!(api = %cfg.api_base_url, realtime = %cfg.realtime_url, "client config loaded");
		Ok(cfg)
	}

	/// Replace the API base and re-derive the real-time URL from it.
	pub fn with_api_base_url(mut self, url: impl Into<String>) -> Result<Self, ClientCoreError> {
		let url = url.into();
		self.realtime_url = derive_realtime_url(&url)?;
		self.api_base_url = url;
		Ok(self)
	}

	pub fn with_realtime_url(mut self, url: impl Into<String>) -> Self {
		self.realtime_url = url.into();
		self
	}

	pub fn api_endpoint(&self) -> Result<ApiEndpoint, ClientCoreError> {
		ApiEndpoint::parse(&self.api_base_url).map_err(ClientCoreError::Config)
	}

	pub fn realtime_endpoint(&self) -> Result<RealtimeEndpoint, ClientCoreError> {
		RealtimeEndpoint::parse(&self.realtime_url).map_err(ClientCoreError::Config)
	}

	pub fn validate(&self) -> Result<(), ClientCoreError> {
		self.api_endpoint()?;
		self.realtime_endpoint()?;
		if self.max_frame_bytes == 0 {
			return Err(ClientCoreError::Config("max_frame_bytes must be > 0".into()));
		}
		Ok(())
	}

	fn from_file(file: FileConfig) -> Result<Self, ClientCoreError> {
		let mut cfg = Self::default();

		if let Some(api) = file.api_base_url.filter(|s| !s.trim().is_empty()) {
			cfg = cfg.with_api_base_url(api.trim())?;
		}
		if let Some(rt) = file.realtime_url.filter(|s| !s.trim().is_empty()) {
			cfg.realtime_url = rt.trim().to_string();
		}
		if let Some(ms) = file.request_timeout_ms.filter(|v| *v > 0) {
			cfg.request_timeout = Duration::from_millis(ms);
		}
		if let Some(ms) = file.connect_timeout_ms.filter(|v| *v > 0) {
			cfg.connect_timeout = Duration::from_millis(ms);
		}
		if let Some(n) = file.max_frame_bytes {
			cfg.max_frame_bytes = n;
		}
		if let Some(v) = file.auto_reconnect {
			cfg.auto_reconnect = v;
		}
		if let Some(name) = file.client_name.filter(|s| !s.trim().is_empty()) {
			cfg.client_name = name;
		}
		Ok(cfg)
	}

	/// Apply `NARALINK_*` overrides read through `lookup`.
	pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ClientCoreError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

		if let Some(v) = non_empty(ENV_API_URL) {
			let realtime = self.realtime_url.clone();
			let derived_before = derive_realtime_url(&self.api_base_url).ok();
			*self = self.clone().with_api_base_url(v)?;
			// Keep a realtime URL that was configured explicitly.
			if derived_before.as_deref() != Some(realtime.as_str()) {
				self.realtime_url = realtime;
			}
			info!("client config: api_base_url overridden by env");
		}

		if let Some(v) = non_empty(ENV_REALTIME_URL) {
			self.realtime_url = v;
			info!("client config: realtime_url overridden by env");
		}

		if let Some(v) = non_empty(ENV_AUTO_RECONNECT) {
			match parse_env_bool(&v) {
				Some(b) => {
					self.auto_reconnect = b;
					info!(auto_reconnect = b, "client config: auto_reconnect overridden by env");
				}
				None => warn!(value = %v, "ignoring invalid {ENV_AUTO_RECONNECT}"),
			}
		}

		Ok(())
	}
}

/// `http(s)://host:port/api` → `ws(s)://host:port/`.
pub fn derive_realtime_url(api_base_url: &str) -> Result<String, ClientCoreError> {
	let api = ApiEndpoint::parse(api_base_url).map_err(ClientCoreError::Config)?;
	let rt = RealtimeEndpoint::derive_from_api(&api).map_err(ClientCoreError::Config)?;
	Ok(rt.as_str().to_string())
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	api_base_url: Option<String>,
	realtime_url: Option<String>,
	request_timeout_ms: Option<u64>,
	connect_timeout_ms: Option<u64>,
	max_frame_bytes: Option<usize>,
	auto_reconnect: Option<bool>,
	client_name: Option<String>,
}

fn parse_env_bool(v: &str) -> Option<bool> {
	match v.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn read_toml_if_exists(path: &Path) -> Result<Option<FileConfig>, ClientCoreError> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s)
				.map_err(|e| ClientCoreError::Config(format!("parse {}: {e}", path.display())))?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(ClientCoreError::Config(format!("read {}: {e}", path.display()))),
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		move |k| map.get(k).cloned()
	}

	#[test]
	fn defaults_point_at_local_dev_server() {
		let cfg = ClientConfig::default();
		assert_eq!(cfg.api_base_url, "http://localhost:5000/api");
		assert_eq!(cfg.realtime_url, "ws://localhost:5000/");
		assert!(!cfg.auto_reconnect);
		assert_eq!(cfg.request_timeout, Duration::from_secs(15));
		assert!(cfg.validate().is_ok());
	}

	#[test]
	fn missing_file_yields_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let cfg = ClientConfig::load_from_path(&dir.path().join("nope.toml")).unwrap();
		assert_eq!(cfg.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
	}

	#[test]
	fn file_values_are_applied() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		fs::write(
			&path,
			"api_base_url = \"https://naralink.example.com/api\"\nauto_reconnect = true\nrequest_timeout_ms = 2000\n",
		)
		.unwrap();

		let cfg = ClientConfig::from_file(read_toml_if_exists(&path).unwrap().unwrap()).unwrap();
		assert_eq!(cfg.realtime_url, "wss://naralink.example.com/");
		assert!(cfg.auto_reconnect);
		assert_eq!(cfg.request_timeout, Duration::from_millis(2000));
	}

	#[test]
	fn invalid_toml_is_a_config_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		fs::write(&path, "api_base_url = [").unwrap();
		assert!(matches!(read_toml_if_exists(&path), Err(ClientCoreError::Config(_))));
	}

	#[test]
	fn env_overrides_rederive_realtime() {
		let mut cfg = ClientConfig::default();
		cfg.apply_overrides(env(&[
			(ENV_API_URL, "https://api.naralink.example.com/api"),
			(ENV_AUTO_RECONNECT, "yes"),
		]))
		.unwrap();
		assert_eq!(cfg.realtime_url, "wss://api.naralink.example.com/");
		assert!(cfg.auto_reconnect);
	}

	#[test]
	fn explicit_realtime_survives_api_override() {
		let mut cfg = ClientConfig::default().with_realtime_url("ws://chat.local:6000/");
		cfg.apply_overrides(env(&[(ENV_API_URL, "http://api.local:5000/api")])).unwrap();
		assert_eq!(cfg.api_base_url, "http://api.local:5000/api");
		assert_eq!(cfg.realtime_url, "ws://chat.local:6000/");
	}

	#[test]
	fn bad_env_api_url_is_rejected() {
		let mut cfg = ClientConfig::default();
		let err = cfg.apply_overrides(env(&[(ENV_API_URL, "ftp://nope")])).unwrap_err();
		assert!(matches!(err, ClientCoreError::Config(_)));
	}
}
