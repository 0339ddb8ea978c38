#![forbid(unsafe_code)]

pub mod chat;
pub mod post;
pub mod profile;

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use chat::{ChatMessage, ConversationSummary, MessageKey, PartnerInfo};
pub use post::{Post, PostAuthor};
pub use profile::{
	IncubatorDetails, Location, Profile, ProfileDetails, SearchHit, SessionIdentity, Socials, StartupDetails,
};

/// Separator between the two participant ids of a room key.
pub const ROOM_KEY_SEPARATOR: char = '_';

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("unknown role: {0}")]
	UnknownRole(String),
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

/// Account role in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	Startup,
	Incubator,
}

impl Role {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			Role::Startup => "startup",
			Role::Incubator => "incubator",
		}
	}

	/// Only startups publish milestones to the feed.
	pub const fn can_post(self) -> bool {
		matches!(self, Role::Startup)
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Role {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"startup" => Ok(Role::Startup),
			"incubator" => Ok(Role::Incubator),
			other => Err(ParseIdError::UnknownRole(other.to_string())),
		}
	}
}

/// Server-assigned, immutable profile identifier.
///
/// This is the only identifier that may be used as a room key component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StableId(String);

impl StableId {
	/// Create a non-empty id that does not contain the room key separator.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		let trimmed = id.trim();
		if trimmed.is_empty() {
			return Err(ParseIdError::Empty);
		}
		if trimmed.contains(ROOM_KEY_SEPARATOR) {
			return Err(ParseIdError::InvalidFormat(format!(
				"stable id must not contain '{ROOM_KEY_SEPARATOR}': {trimmed}"
			)));
		}
		Ok(Self(trimmed.to_string()))
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl TryFrom<String> for StableId {
	type Error = ParseIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		StableId::new(value)
	}
}

impl From<StableId> for String {
	fn from(id: StableId) -> Self {
		id.0
	}
}

impl fmt::Display for StableId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for StableId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		StableId::new(s.to_string())
	}
}

/// Human-readable profile handle used in navigation. May change over time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
	/// Create a non-empty slug.
	pub fn new(slug: impl Into<String>) -> Result<Self, ParseIdError> {
		let slug = slug.into();
		let trimmed = slug.trim();
		if trimmed.is_empty() || trimmed == "undefined" {
			return Err(ParseIdError::Empty);
		}
		if trimmed.contains('/') {
			return Err(ParseIdError::InvalidFormat(format!("slug must not contain '/': {trimmed}")));
		}
		Ok(Self(trimmed.to_string()))
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl TryFrom<String> for Slug {
	type Error = ParseIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Slug::new(value)
	}
}

impl From<Slug> for String {
	fn from(slug: Slug) -> Self {
		slug.0
	}
}

impl fmt::Display for Slug {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for Slug {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Slug::new(s.to_string())
	}
}

/// Conversation identifier shared by exactly two participants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomKey(String);

impl RoomKey {
	/// Derive the room key for two participants.
	///
	/// The ids are ordered lexicographically and joined with `_`, so
	/// `derive(a, b) == derive(b, a)`.
	pub fn derive(a: &StableId, b: &StableId) -> Self {
		let (lo, hi) = if a.as_str() <= b.as_str() { (a, b) } else { (b, a) };
		Self(format!("{}{}{}", lo.as_str(), ROOM_KEY_SEPARATOR, hi.as_str()))
	}

	/// Wrap a room key received from the server.
	pub fn parse(s: &str) -> Result<Self, ParseIdError> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(s.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Split into the two participant ids, if the key is well formed.
	pub fn participants(&self) -> Option<(&str, &str)> {
		let (a, b) = self.0.split_once(ROOM_KEY_SEPARATOR)?;
		if a.is_empty() || b.is_empty() || b.contains(ROOM_KEY_SEPARATOR) {
			return None;
		}
		Some((a, b))
	}

	/// The other participant of this room, if `me` is one of them.
	pub fn partner_of(&self, me: &StableId) -> Option<StableId> {
		let (a, b) = self.participants()?;
		let other = if a == me.as_str() {
			b
		} else if b == me.as_str() {
			a
		} else {
			return None;
		};
		StableId::new(other).ok()
	}
}

impl TryFrom<String> for RoomKey {
	type Error = ParseIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		RoomKey::parse(&value)
	}
}

impl From<RoomKey> for String {
	fn from(key: RoomKey) -> Self {
		key.0
	}
}

impl fmt::Display for RoomKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for RoomKey {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		RoomKey::parse(s)
	}
}
