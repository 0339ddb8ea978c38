#![forbid(unsafe_code)]

pub mod codec;
pub mod frames;

pub use codec::{
	CodecError, DEFAULT_MAX_FRAME_BYTES, decode_client_frame, decode_server_frame, encode_client_frame,
	encode_server_frame,
};
pub use frames::{ClientFrame, ServerFrame, WireMessage, WireSender, WireTimestamp};

/// Event names on the real-time channel.
pub mod events {
	pub const JOIN_ROOM: &str = "join_room";
	pub const SEND_MESSAGE: &str = "send_message";
	pub const RECEIVE_MESSAGE: &str = "receive_message";
	pub const CONNECTION_ESTABLISHED: &str = "connection_established";
	pub const CONNECTION_ERROR: &str = "connection_error";
}
