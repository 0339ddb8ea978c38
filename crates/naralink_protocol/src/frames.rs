#![forbid(unsafe_code)]

use chrono::{DateTime, TimeZone, Utc};
use naralink_domain::{ChatMessage, ParseIdError, RoomKey, StableId};
use serde::{Deserialize, Serialize};

/// Client → server operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
	JoinRoom { room: RoomKey },
	SendMessage { room: RoomKey, text: String },
}

impl ClientFrame {
	pub fn event_name(&self) -> &'static str {
		match self {
			ClientFrame::JoinRoom { .. } => crate::events::JOIN_ROOM,
			ClientFrame::SendMessage { .. } => crate::events::SEND_MESSAGE,
		}
	}
}

/// Server → client events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
	ReceiveMessage(WireMessage),
	ConnectionEstablished,
	ConnectionError { message: String },
	/// Event name this client does not handle. Ignored by consumers.
	Unknown { event: String },
}

/// Payload of `send_message`. Field names follow the server's JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SendMessagePayload {
	#[serde(rename = "roomID")]
	pub room_id: String,
	pub text: String,
}

/// `sender` is either a bare id or a populated profile document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireSender {
	Id(String),
	Populated {
		#[serde(rename = "_id")]
		id: String,
	},
}

impl WireSender {
	pub fn id(&self) -> &str {
		match self {
			WireSender::Id(id) => id,
			WireSender::Populated { id } => id,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
	Millis(i64),
	Text(String),
}

impl WireTimestamp {
	/// Best-effort conversion. Unparseable values yield `None`.
	pub fn to_utc(&self) -> Option<DateTime<Utc>> {
		match self {
			WireTimestamp::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
			WireTimestamp::Text(s) => DateTime::parse_from_rfc3339(s.trim())
				.ok()
				.map(|t| t.with_timezone(&Utc)),
		}
	}
}

/// A chat message as the server sends it, both live and in history responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
	#[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub sender: WireSender,
	#[serde(default)]
	pub text: String,
	#[serde(rename = "conversationId")]
	pub conversation_id: String,
	#[serde(default, alias = "createdAt", skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<WireTimestamp>,
}

impl WireMessage {
	pub fn from_chat_message(msg: &ChatMessage) -> Self {
		Self {
			id: msg.id.clone(),
			sender: WireSender::Id(msg.sender.as_str().to_string()),
			text: msg.text.clone(),
			conversation_id: msg.room.as_str().to_string(),
			timestamp: msg.timestamp.map(|t| WireTimestamp::Text(t.to_rfc3339())),
		}
	}

	/// Validate ids and convert into the domain message.
	pub fn into_chat_message(self) -> Result<ChatMessage, ParseIdError> {
		let sender = StableId::new(self.sender.id())?;
		let room = RoomKey::parse(&self.conversation_id)?;
		let timestamp = self.timestamp.as_ref().and_then(WireTimestamp::to_utc);

		let mut msg = ChatMessage::new(sender, room, self.text);
		if let Some(id) = self.id.filter(|id| !id.trim().is_empty()) {
			msg = msg.with_id(id);
		}
		if let Some(ts) = timestamp {
			msg = msg.with_timestamp(ts);
		}
		Ok(msg)
	}
}
