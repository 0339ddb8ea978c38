#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt, future};
use naralink_domain::{ChatMessage, RoomKey};
use naralink_protocol::{ClientFrame, ServerFrame, decode_server_frame, encode_client_frame};
use naralink_util::endpoint::RealtimeEndpoint;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, info, warn};

use crate::config::CLIENT_INSTANCE_HEADER;
use crate::{ClientConfig, ClientCoreError, SecretString};

pub type FrameSink = Pin<Box<dyn Sink<ClientFrame, Error = ClientCoreError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<ServerFrame, ClientCoreError>> + Send>>;

/// Opens an authenticated real-time connection.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
	async fn connect(&self, token: &SecretString) -> Result<(FrameSink, FrameStream), ClientCoreError>;
}

/// WebSocket connector speaking JSON text frames.
#[derive(Debug, Clone)]
pub struct WsConnector {
	endpoint: RealtimeEndpoint,
	connect_timeout: Duration,
	max_frame_bytes: usize,
	client_name: String,
	client_instance_id: String,
}

impl WsConnector {
	pub fn new(cfg: &ClientConfig) -> Result<Self, ClientCoreError> {
		Ok(Self {
			endpoint: cfg.realtime_endpoint()?,
			connect_timeout: cfg.connect_timeout,
			max_frame_bytes: cfg.max_frame_bytes,
			client_name: cfg.client_name.clone(),
			client_instance_id: cfg.client_instance_id.clone(),
		})
	}

	/// Upgrade request with bearer auth and client identification headers.
	pub fn upgrade_request(&self, token: &SecretString) -> Result<Request, ClientCoreError> {
		let mut request = self
			.endpoint
			.as_str()
			.into_client_request()
			.map_err(|e| ClientCoreError::Connect(format!("build request: {e}")))?;
		let header = |value: &str, what: &str| {
			HeaderValue::from_str(value).map_err(|e| ClientCoreError::Connect(format!("invalid {what} header: {e}")))
		};
		let headers = request.headers_mut();
		headers.insert("Authorization", header(&format!("Bearer {}", token.expose().trim()), "token")?);
		headers.insert("User-Agent", header(&self.client_name, "client name")?);
		headers.insert(CLIENT_INSTANCE_HEADER, header(&self.client_instance_id, "client instance")?);
		Ok(request)
	}
}

#[async_trait]
impl RealtimeConnector for WsConnector {
	async fn connect(&self, token: &SecretString) -> Result<(FrameSink, FrameStream), ClientCoreError> {
		let request = self.upgrade_request(token)?;

		info!(url = %self.endpoint.as_str(), instance = %self.client_instance_id, "connecting to real-time channel");
		let (ws, _) = tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
			.await
			.map_err(|_| ClientCoreError::Connect(format!("timed out after {:?}", self.connect_timeout)))?
			.map_err(|e| ClientCoreError::Connect(e.to_string()))?;

		let (write, read) = ws.split();
		let max = self.max_frame_bytes;

		let sink = write
			.sink_map_err(|e| ClientCoreError::Io(e.to_string()))
			.with(move |frame: ClientFrame| {
				future::ready(
					encode_client_frame(&frame, max)
						.map(Message::text)
						.map_err(ClientCoreError::from),
				)
			});

		let stream = read.filter_map(move |msg| {
			future::ready(match msg {
				Ok(Message::Text(text)) => Some(decode_server_frame(text.as_str(), max).map_err(ClientCoreError::from)),
				Ok(Message::Close(frame)) => {
					debug!(?frame, "real-time channel close frame");
					None
				}
				Ok(_) => None,
				Err(e) => Some(Err(ClientCoreError::Io(e.to_string()))),
			})
		});

		Ok((Box::pin(sink), Box::pin(stream)))
	}
}

/// Event delivered to channel subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
	Connected,
	Message(ChatMessage),
	/// Server-reported `connection_error`.
	Error(String),
	/// Connection ended. A fresh `connect` is required.
	Closed { reason: String },
}

static CONNECTION_ID: AtomicU64 = AtomicU64::new(1);
static SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

struct Connection {
	id: u64,
	token: SecretString,
	outbound: mpsc::UnboundedSender<ClientFrame>,
	joined: HashSet<RoomKey>,
	alive: bool,
}

#[derive(Default)]
struct AdapterState {
	conn: Option<Connection>,
	subscribers: HashMap<u64, mpsc::UnboundedSender<ChannelEvent>>,
}

impl AdapterState {
	fn broadcast(&mut self, event: ChannelEvent) {
		self.subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
	}

	fn live_conn(&mut self) -> Option<&mut Connection> {
		self.conn.as_mut().filter(|c| c.alive)
	}
}

/// Handle for one subscriber. Dropping it unsubscribes.
pub struct Subscription {
	id: u64,
	state: Weak<Mutex<AdapterState>>,
}

impl Subscription {
	pub fn id(&self) -> u64 {
		self.id
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(state) = self.state.upgrade() {
			state.lock().subscribers.remove(&self.id);
		}
	}
}

/// One authenticated real-time connection per session.
#[derive(Clone)]
pub struct ChannelAdapter {
	connector: Arc<dyn RealtimeConnector>,
	state: Arc<Mutex<AdapterState>>,
	connect_lock: Arc<tokio::sync::Mutex<()>>,
}

impl ChannelAdapter {
	pub fn new(connector: Arc<dyn RealtimeConnector>) -> Self {
		Self {
			connector,
			state: Arc::new(Mutex::new(AdapterState::default())),
			connect_lock: Arc::new(tokio::sync::Mutex::new(())),
		}
	}

	/// Open the connection. No-op while already connected with the same token.
	pub async fn connect(&self, token: &SecretString) -> Result<(), ClientCoreError> {
		let _guard = self.connect_lock.lock().await;

		{
			let mut st = self.state.lock();
			if let Some(conn) = st.live_conn()
				&& &conn.token == token
			{
				debug!("real-time channel already connected");
				return Ok(());
			}
			// Token changed or connection dead: start over.
			st.conn = None;
		}

		let (sink, stream) = self.connector.connect(token).await?;
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let id = CONNECTION_ID.fetch_add(1, Ordering::Relaxed);

		{
			let mut st = self.state.lock();
			st.conn = Some(Connection {
				id,
				token: token.clone(),
				outbound: outbound_tx,
				joined: HashSet::new(),
				alive: true,
			});
			st.broadcast(ChannelEvent::Connected);
		}

		tokio::spawn(run_connection(id, sink, stream, outbound_rx, Arc::downgrade(&self.state)));
		info!(connection = id, "real-time channel connected");
		Ok(())
	}

	pub fn is_connected(&self) -> bool {
		self.state.lock().live_conn().is_some()
	}

	/// Declare interest in `room`. Repeated joins on one connection are sent once.
	pub fn join_room(&self, room: &RoomKey) -> Result<(), ClientCoreError> {
		let mut st = self.state.lock();
		let conn = st.live_conn().ok_or(ClientCoreError::NotConnected)?;
		if conn.joined.contains(room) {
			return Ok(());
		}
		conn.outbound
			.send(ClientFrame::JoinRoom { room: room.clone() })
			.map_err(|_| ClientCoreError::NotConnected)?;
		conn.joined.insert(room.clone());
		debug!(room = %room, "joined room");
		Ok(())
	}

	/// Fire-and-forget send. No acknowledgement is awaited.
	pub fn send_message(&self, room: &RoomKey, text: &str) -> Result<(), ClientCoreError> {
		let mut st = self.state.lock();
		let conn = st.live_conn().ok_or(ClientCoreError::NotConnected)?;
		conn.outbound
			.send(ClientFrame::SendMessage {
				room: room.clone(),
				text: text.to_string(),
			})
			.map_err(|_| ClientCoreError::NotConnected)
	}

	pub fn subscribe(&self) -> (Subscription, mpsc::UnboundedReceiver<ChannelEvent>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let id = SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed);
		self.state.lock().subscribers.insert(id, tx);
		(
			Subscription {
				id,
				state: Arc::downgrade(&self.state),
			},
			rx,
		)
	}

	pub fn subscriber_count(&self) -> usize {
		self.state.lock().subscribers.len()
	}

	/// Close the connection and release every subscription.
	pub fn disconnect(&self) {
		let mut st = self.state.lock();
		if let Some(conn) = st.conn.take() {
			info!(connection = conn.id, "real-time channel disconnecting");
		}
		st.broadcast(ChannelEvent::Closed {
			reason: "disconnected".into(),
		});
		st.subscribers.clear();
	}
}

async fn run_connection(
	id: u64,
	mut sink: FrameSink,
	mut stream: FrameStream,
	mut outbound_rx: mpsc::UnboundedReceiver<ClientFrame>,
	state: Weak<Mutex<AdapterState>>,
) {
	// Broadcast only while this connection is still the adapter's current one.
	let emit = |event: ChannelEvent| {
		if let Some(state) = state.upgrade() {
			let mut st = state.lock();
			if st.conn.as_ref().is_some_and(|c| c.id == id) {
				st.broadcast(event);
			}
		}
	};

	let reason = loop {
		tokio::select! {
			frame = outbound_rx.recv() => {
				let Some(frame) = frame else {
					let _ = sink.close().await;
					break "closed by client".to_string();
				};
				let event = frame.event_name();
				if let Err(e) = sink.send(frame).await {
					warn!(connection = id, event, error = %e, "real-time send failed");
					break format!("send failed: {e}");
				}
			}

			item = stream.next() => {
				match item {
					Some(Ok(ServerFrame::ReceiveMessage(wire))) => match wire.into_chat_message() {
						Ok(msg) => emit(ChannelEvent::Message(msg)),
						Err(e) => warn!(connection = id, error = %e, "dropping malformed message"),
					},
					Some(Ok(ServerFrame::ConnectionEstablished)) => {
						debug!(connection = id, "server acknowledged connection");
					}
					Some(Ok(ServerFrame::ConnectionError { message })) => {
						warn!(connection = id, error = %message, "server reported connection error");
						emit(ChannelEvent::Error(message));
					}
					Some(Ok(ServerFrame::Unknown { event })) => {
						debug!(connection = id, event = %event, "ignoring unknown event");
					}
					Some(Err(ClientCoreError::Codec(e))) => {
						warn!(connection = id, error = %e, "dropping undecodable frame");
					}
					Some(Err(e)) => {
						warn!(connection = id, error = %e, "real-time channel error");
						break e.to_string();
					}
					None => break "closed by server".to_string(),
				}
			}
		}
	};

	info!(connection = id, reason = %reason, "real-time connection ended");
	if let Some(state) = state.upgrade() {
		let mut st = state.lock();
		if let Some(conn) = st.conn.as_mut().filter(|c| c.id == id) {
			conn.alive = false;
			st.broadcast(ChannelEvent::Closed { reason });
		}
	}
}
