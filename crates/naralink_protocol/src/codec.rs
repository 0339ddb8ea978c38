#![forbid(unsafe_code)]

use naralink_domain::RoomKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::events;
use crate::frames::{ClientFrame, SendMessagePayload, ServerFrame, WireMessage};

/// Default maximum text frame size.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024; // 256 KiB

#[derive(Debug, Error)]
pub enum CodecError {
	#[error("frame exceeds maximum size: len={len} max={max}")]
	FrameTooLarge {
		len: usize,
		max: usize,
	},

	#[error("missing payload for event {event}")]
	MissingData {
		event: String,
	},

	#[error("unknown client event: {0}")]
	UnknownEvent(String),

	#[error("invalid room key: {0}")]
	InvalidRoom(#[from] naralink_domain::ParseIdError),

	#[error("json error: {0}")]
	Json(#[from] serde_json::Error),
}

/// Envelope of every text frame on the channel.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
	event: String,
	#[serde(default, skip_serializing_if = "Value::is_null")]
	data: Value,
}

fn check_len(len: usize, max: usize) -> Result<(), CodecError> {
	if len > max {
		return Err(CodecError::FrameTooLarge { len, max });
	}
	Ok(())
}

fn finish(envelope: &Envelope, max: usize) -> Result<String, CodecError> {
	let text = serde_json::to_string(envelope)?;
	check_len(text.len(), max)?;
	Ok(text)
}

fn open(text: &str, max: usize) -> Result<Envelope, CodecError> {
	check_len(text.len(), max)?;
	Ok(serde_json::from_str(text)?)
}

fn take_data(envelope: Envelope) -> Result<(String, Value), CodecError> {
	if envelope.data.is_null() {
		return Err(CodecError::MissingData { event: envelope.event });
	}
	Ok((envelope.event, envelope.data))
}

/// Encode an outbound client frame into a JSON text frame.
pub fn encode_client_frame(frame: &ClientFrame, max: usize) -> Result<String, CodecError> {
	let data = match frame {
		ClientFrame::JoinRoom { room } => Value::String(room.as_str().to_string()),
		ClientFrame::SendMessage { room, text } => serde_json::to_value(SendMessagePayload {
			room_id: room.as_str().to_string(),
			text: text.clone(),
		})?,
	};

	finish(
		&Envelope {
			event: frame.event_name().to_string(),
			data,
		},
		max,
	)
}

/// Decode a client frame. Used by in-process fakes of the server side.
pub fn decode_client_frame(text: &str, max: usize) -> Result<ClientFrame, CodecError> {
	let (event, data) = take_data(open(text, max)?)?;
	match event.as_str() {
		events::JOIN_ROOM => {
			let room: String = serde_json::from_value(data)?;
			Ok(ClientFrame::JoinRoom {
				room: RoomKey::parse(&room)?,
			})
		}
		events::SEND_MESSAGE => {
			let payload: SendMessagePayload = serde_json::from_value(data)?;
			Ok(ClientFrame::SendMessage {
				room: RoomKey::parse(&payload.room_id)?,
				text: payload.text,
			})
		}
		_ => Err(CodecError::UnknownEvent(event)),
	}
}

#[derive(Deserialize)]
struct ErrorPayload {
	#[serde(default, alias = "error")]
	message: Option<String>,
}

/// Encode a server frame. Used by in-process fakes of the server side.
pub fn encode_server_frame(frame: &ServerFrame, max: usize) -> Result<String, CodecError> {
	let envelope = match frame {
		ServerFrame::ReceiveMessage(msg) => Envelope {
			event: events::RECEIVE_MESSAGE.to_string(),
			data: serde_json::to_value(msg)?,
		},
		ServerFrame::ConnectionEstablished => Envelope {
			event: events::CONNECTION_ESTABLISHED.to_string(),
			data: Value::Null,
		},
		ServerFrame::ConnectionError { message } => Envelope {
			event: events::CONNECTION_ERROR.to_string(),
			data: serde_json::json!({ "message": message }),
		},
		ServerFrame::Unknown { event } => Envelope {
			event: event.clone(),
			data: Value::Null,
		},
	};
	finish(&envelope, max)
}

/// Decode an inbound server frame.
///
/// Unknown event names decode to [`ServerFrame::Unknown`] rather than an error.
pub fn decode_server_frame(text: &str, max: usize) -> Result<ServerFrame, CodecError> {
	let envelope = open(text, max)?;
	match envelope.event.as_str() {
		events::RECEIVE_MESSAGE => {
			let (_, data) = take_data(envelope)?;
			let msg: WireMessage = serde_json::from_value(data)?;
			Ok(ServerFrame::ReceiveMessage(msg))
		}
		events::CONNECTION_ESTABLISHED => Ok(ServerFrame::ConnectionEstablished),
		events::CONNECTION_ERROR => {
			let message = match envelope.data {
				Value::String(s) => s,
				Value::Null => String::new(),
				other => serde_json::from_value::<ErrorPayload>(other)?.message.unwrap_or_default(),
			};
			Ok(ServerFrame::ConnectionError { message })
		}
		_ => Ok(ServerFrame::Unknown { event: envelope.event }),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn room(s: &str) -> RoomKey {
		RoomKey::parse(s).unwrap()
	}

	#[test]
	fn join_room_carries_bare_key() {
		let text = encode_client_frame(&ClientFrame::JoinRoom { room: room("a1_b2") }, DEFAULT_MAX_FRAME_BYTES).unwrap();
		assert_eq!(text, r#"{"event":"join_room","data":"a1_b2"}"#);
	}

	#[test]
	fn send_message_uses_server_field_names() {
		let frame = ClientFrame::SendMessage {
			room: room("a1_b2"),
			text: "hello".into(),
		};
		let text = encode_client_frame(&frame, DEFAULT_MAX_FRAME_BYTES).unwrap();
		let v: Value = serde_json::from_str(&text).unwrap();
		assert_eq!(v["event"], "send_message");
		assert_eq!(v["data"]["roomID"], "a1_b2");
		assert_eq!(v["data"]["text"], "hello");
	}

	#[test]
	fn connection_error_accepts_string_or_object() {
		let a = decode_server_frame(r#"{"event":"connection_error","data":"bad token"}"#, DEFAULT_MAX_FRAME_BYTES).unwrap();
		let b = decode_server_frame(
			r#"{"event":"connection_error","data":{"error":"bad token"}}"#,
			DEFAULT_MAX_FRAME_BYTES,
		)
		.unwrap();
		let expected = ServerFrame::ConnectionError {
			message: "bad token".into(),
		};
		assert_eq!(a, expected);
		assert_eq!(b, expected);
	}

	#[test]
	fn unknown_server_events_are_not_errors() {
		let f = decode_server_frame(r#"{"event":"typing","data":{"room":"a1_b2"}}"#, DEFAULT_MAX_FRAME_BYTES).unwrap();
		assert_eq!(
			f,
			ServerFrame::Unknown {
				event: "typing".into()
			}
		);
	}

	#[test]
	fn receive_message_without_data_is_an_error() {
		let err = decode_server_frame(r#"{"event":"receive_message"}"#, DEFAULT_MAX_FRAME_BYTES).unwrap_err();
		assert!(matches!(err, CodecError::MissingData { .. }));
	}
}
