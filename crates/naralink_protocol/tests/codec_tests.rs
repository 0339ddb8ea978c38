use naralink_domain::RoomKey;
use naralink_protocol::{
	ClientFrame, CodecError, DEFAULT_MAX_FRAME_BYTES, ServerFrame, WireMessage, WireSender, WireTimestamp,
	decode_client_frame, decode_server_frame, encode_client_frame, encode_server_frame,
};
use proptest::prelude::*;

fn room(s: &str) -> RoomKey {
	RoomKey::parse(s).expect("room")
}

#[test]
fn receive_message_decodes_into_domain_message() {
	let text = r#"{"event":"receive_message","data":{"_id":"m7","sender":"b2","text":"hi","conversationId":"a1_b2","timestamp":"2024-05-01T12:00:00Z"}}"#;
	let frame = decode_server_frame(text, DEFAULT_MAX_FRAME_BYTES).expect("decode");

	let ServerFrame::ReceiveMessage(wire) = frame else {
		panic!("unexpected frame: {frame:?}");
	};
	let msg = wire.into_chat_message().expect("valid ids");
	assert_eq!(msg.sender.as_str(), "b2");
	assert_eq!(msg.text, "hi");
	assert_eq!(msg.room, room("a1_b2"));
	assert_eq!(msg.id.as_deref(), Some("m7"));
}

#[test]
fn server_frames_written_by_fakes_are_readable() {
	let wire = WireMessage {
		id: None,
		sender: WireSender::Id("c3".into()),
		text: "ping".into(),
		conversation_id: "a1_c3".into(),
		timestamp: Some(WireTimestamp::Millis(1_714_564_800_000)),
	};
	let text = encode_server_frame(&ServerFrame::ReceiveMessage(wire.clone()), DEFAULT_MAX_FRAME_BYTES).expect("encode");
	assert_eq!(
		decode_server_frame(&text, DEFAULT_MAX_FRAME_BYTES).expect("decode"),
		ServerFrame::ReceiveMessage(wire)
	);

	let text = encode_server_frame(&ServerFrame::ConnectionEstablished, DEFAULT_MAX_FRAME_BYTES).expect("encode");
	assert_eq!(text, r#"{"event":"connection_established"}"#);
}

#[test]
fn oversize_frames_are_rejected_both_ways() {
	let frame = ClientFrame::SendMessage {
		room: room("a1_b2"),
		text: "x".repeat(64),
	};
	let err = encode_client_frame(&frame, 32).unwrap_err();
	assert!(matches!(err, CodecError::FrameTooLarge { max: 32, .. }));

	let big = format!(r#"{{"event":"connection_error","data":"{}"}}"#, "e".repeat(100));
	let err = decode_server_frame(&big, 64).unwrap_err();
	match err {
		CodecError::FrameTooLarge { len, max } => {
			assert_eq!(len, big.len());
			assert_eq!(max, 64);
		}
		other => panic!("unexpected error: {other:?}"),
	}
}

#[test]
fn malformed_json_is_a_codec_error() {
	assert!(matches!(
		decode_server_frame("{not json", DEFAULT_MAX_FRAME_BYTES),
		Err(CodecError::Json(_))
	));
	assert!(matches!(
		decode_client_frame(r#"{"event":"leave_room","data":"a1_b2"}"#, DEFAULT_MAX_FRAME_BYTES),
		Err(CodecError::UnknownEvent(_))
	));
}

proptest! {
	#[test]
	fn send_message_text_survives_encoding(text in "\\PC{0,200}", a in "[0-9a-f]{1,12}", b in "[0-9a-f]{1,12}") {
		let key = format!("{a}_{b}");
		let frame = ClientFrame::SendMessage { room: room(&key), text };
		let encoded = encode_client_frame(&frame, DEFAULT_MAX_FRAME_BYTES).expect("encode");
		prop_assert_eq!(decode_client_frame(&encoded, DEFAULT_MAX_FRAME_BYTES).expect("decode"), frame);
	}

	#[test]
	fn decode_never_panics_on_arbitrary_input(s in "\\PC{0,256}") {
		let _ = decode_server_frame(&s, DEFAULT_MAX_FRAME_BYTES);
	}
}
