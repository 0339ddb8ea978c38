#![forbid(unsafe_code)]

use core::fmt;

use naralink_domain::ParseIdError;
use naralink_protocol::CodecError;

/// Errors for client core operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientCoreError {
	/// Invalid or unreadable configuration.
	#[error("config error: {0}")]
	Config(String),

	/// Request could not be sent or the response could not be read.
	#[error("http error: {0}")]
	Http(String),

	/// Session token missing, invalid, or expired (HTTP 401).
	#[error("unauthorized")]
	Unauthorized,

	#[error("not found: {0}")]
	NotFound(String),

	/// Server rejected the request with a user-facing message.
	#[error("{message}")]
	Api {
		status: u16,
		message: String,
	},

	/// Real-time connection establishment failed.
	#[error("failed to connect: {0}")]
	Connect(String),

	#[error("real-time channel is not connected")]
	NotConnected,

	#[error(transparent)]
	Codec(#[from] CodecError),

	/// Server sent something the client does not understand.
	#[error("protocol error: {0}")]
	Protocol(String),

	#[error("io error: {0}")]
	Io(String),

	/// Input rejected before any network call.
	#[error("{0}")]
	Validation(String),

	#[error("error: {0}")]
	Other(String),
}

impl ClientCoreError {
	/// True when the error should end the session.
	pub fn is_unauthorized(&self) -> bool {
		matches!(self, ClientCoreError::Unauthorized)
	}
}

impl From<anyhow::Error> for ClientCoreError {
	fn from(e: anyhow::Error) -> Self {
		ClientCoreError::Other(format!("{e:#}"))
	}
}

impl From<std::io::Error> for ClientCoreError {
	fn from(e: std::io::Error) -> Self {
		ClientCoreError::Io(e.to_string())
	}
}

impl From<reqwest::Error> for ClientCoreError {
	fn from(e: reqwest::Error) -> Self {
		ClientCoreError::Http(e.to_string())
	}
}

impl From<ParseIdError> for ClientCoreError {
	fn from(e: ParseIdError) -> Self {
		ClientCoreError::Protocol(e.to_string())
	}
}

/// Wrapper that redacts in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.trim().is_empty()
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn secret_never_prints() {
		let s = SecretString::new("eyJhbGciOi");
		assert_eq!(format!("{s}"), "<redacted>");
		assert!(!format!("{s:?}").contains("eyJ"));
		assert_eq!(s.expose(), "eyJhbGciOi");
	}

	#[test]
	fn api_error_displays_server_message() {
		let e = ClientCoreError::Api {
			status: 400,
			message: "Image too large".into(),
		};
		assert_eq!(e.to_string(), "Image too large");
		assert!(ClientCoreError::Unauthorized.is_unauthorized());
	}
}
