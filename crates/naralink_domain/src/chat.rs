use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RoomKey, Slug, StableId};

/// A single direct message inside a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
	/// Server-assigned message id, when the server provides one.
	pub id: Option<String>,
	pub sender: StableId,
	pub text: String,
	pub room: RoomKey,
	/// Server timestamp. Ordering never depends on it; arrival order is message order.
	pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
	pub fn new(sender: StableId, room: RoomKey, text: impl Into<String>) -> Self {
		Self {
			id: None,
			sender,
			text: text.into(),
			room,
			timestamp: None,
		}
	}

	pub fn with_id(mut self, id: impl Into<String>) -> Self {
		self.id = Some(id.into());
		self
	}

	pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
		self.timestamp = Some(timestamp);
		self
	}

	/// Identity used to merge history and live deliveries idempotently.
	pub fn key(&self) -> MessageKey {
		match self.id.as_deref().map(str::trim) {
			Some(id) if !id.is_empty() => MessageKey::Server(id.to_string()),
			_ => MessageKey::Composite {
				sender: self.sender.clone(),
				timestamp_ms: self.timestamp.map(|t| t.timestamp_millis()),
				text: self.text.clone(),
			},
		}
	}

	pub fn is_from(&self, id: &StableId) -> bool {
		&self.sender == id
	}
}

/// De-duplication key for a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
	Server(String),
	Composite {
		sender: StableId,
		timestamp_ms: Option<i64>,
		text: String,
	},
}

/// Display information about the other party of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerInfo {
	pub name: Option<String>,
	pub slug: Option<Slug>,
	pub logo_url: Option<String>,
}

impl PartnerInfo {
	pub fn display_name(&self) -> &str {
		self.name.as_deref().filter(|n| !n.trim().is_empty()).unwrap_or("Unknown")
	}
}

/// One row of the recent-conversations list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
	pub room: RoomKey,
	pub partner_id: StableId,
	pub partner: PartnerInfo,
	pub last_message: String,
	pub last_timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	fn msg(sender: &str, text: &str) -> ChatMessage {
		let sender = StableId::new(sender).unwrap();
		ChatMessage::new(sender, RoomKey::parse("a1_b2").unwrap(), text)
	}

	#[test]
	fn server_id_wins_over_content() {
		let a = msg("a1", "hi").with_id("m1");
		let b = msg("b2", "different").with_id("m1");
		assert_eq!(a.key(), b.key());
	}

	#[test]
	fn composite_key_includes_sender_time_and_text() {
		let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
		let a = msg("a1", "hi").with_timestamp(t);
		assert_eq!(a.key(), msg("a1", "hi").with_timestamp(t).key());
		assert_ne!(a.key(), msg("b2", "hi").with_timestamp(t).key());
		assert_ne!(a.key(), msg("a1", "hi").key());
		assert_ne!(a.key(), msg("a1", "hey").with_timestamp(t).key());
	}

	#[test]
	fn blank_server_id_falls_back_to_composite() {
		let a = msg("a1", "hi").with_id("  ");
		assert!(matches!(a.key(), MessageKey::Composite { .. }));
	}

	#[test]
	fn partner_display_name_defaults() {
		assert_eq!(PartnerInfo::default().display_name(), "Unknown");
		let p = PartnerInfo {
			name: Some("Acme".into()),
			..Default::default()
		};
		assert_eq!(p.display_name(), "Acme");
	}
}
