#![forbid(unsafe_code)]

use std::sync::Arc;

use naralink_domain::{ChatMessage, ConversationSummary, RoomKey, Slug, StableId};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::NetworkApi;
use crate::channel::{ChannelAdapter, ChannelEvent, Subscription};
use crate::conversation::{ConversationController, Effect, Generation, InboundRoute, Phase, SendRejected};
use crate::identity::{IdentityResolver, ResolveError};
use crate::recent::{RecentConversations, RefreshTicket};
use crate::reconnect::{ReconnectState, schedule_reconnect};
use crate::session::SessionContext;
use crate::{ClientCoreError, UnreadCounter};

/// Something the UI should re-render for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
	Connected,
	Disconnected {
		reason: String,
		/// Set when a reconnect is scheduled.
		retry_in_ms: Option<u64>,
	},
	Reconnecting {
		attempt: u32,
		next_retry_in_ms: u64,
	},
	PhaseChanged(Phase),
	MessagesChanged,
	Unread(u64),
	RecentChanged,
	ChannelError(String),
}

enum TaskResult {
	Identity {
		generation: Generation,
		result: Result<StableId, ResolveError>,
	},
	History {
		generation: Generation,
		room: RoomKey,
		result: Result<Vec<ChatMessage>, ClientCoreError>,
	},
	Recent {
		ticket: RefreshTicket,
		result: Result<Vec<ConversationSummary>, ClientCoreError>,
	},
	Reconnect {
		result: Result<(), ClientCoreError>,
	},
}

enum Step {
	Channel(Option<ChannelEvent>),
	Task(TaskResult),
	Reconnect,
}

/// Chat for one logged-in session.
///
/// Owns the channel subscription and the conversation state. Async results
/// (identity, history, recent list) come back through [`ChatSession::next_update`],
/// which must be polled for anything to progress.
pub struct ChatSession {
	ctx: SessionContext,
	api: Arc<dyn NetworkApi>,
	resolver: IdentityResolver,
	adapter: ChannelAdapter,
	controller: ConversationController,
	recent: RecentConversations,
	chat_view_open: bool,

	_subscription: Subscription,
	events: mpsc::UnboundedReceiver<ChannelEvent>,
	tasks_tx: mpsc::UnboundedSender<TaskResult>,
	tasks_rx: mpsc::UnboundedReceiver<TaskResult>,

	auto_reconnect: bool,
	reconnect: ReconnectState,
	reconnect_deadline: Option<Instant>,
}

impl ChatSession {
	pub fn new(ctx: SessionContext, api: Arc<dyn NetworkApi>, adapter: ChannelAdapter, auto_reconnect: bool) -> Self {
		let (subscription, events) = adapter.subscribe();
		let (tasks_tx, tasks_rx) = mpsc::unbounded_channel();
		let controller = ConversationController::new(ctx.self_id().clone());
		Self {
			resolver: IdentityResolver::new(api.clone()),
			ctx,
			api,
			adapter,
			controller,
			recent: RecentConversations::new(),
			chat_view_open: false,
			_subscription: subscription,
			events,
			tasks_tx,
			tasks_rx,
			auto_reconnect,
			reconnect: ReconnectState::default(),
			reconnect_deadline: None,
		}
	}

	/// Open the real-time channel with the session token.
	pub async fn connect(&mut self) -> Result<(), ClientCoreError> {
		match self.adapter.connect(&self.ctx.token).await {
			Ok(()) => Ok(()),
			Err(e) => {
				warn!(error = %e, "real-time connect failed");
				if self.auto_reconnect {
					self.schedule_reconnect();
				}
				Err(e)
			}
		}
	}

	pub fn context(&self) -> &SessionContext {
		&self.ctx
	}

	pub fn unread_counter(&self) -> &UnreadCounter {
		&self.ctx.unread
	}

	pub fn unread(&self) -> u64 {
		self.ctx.unread.read()
	}

	pub fn is_connected(&self) -> bool {
		self.adapter.is_connected()
	}

	pub fn conversation(&self) -> &ConversationController {
		&self.controller
	}

	pub fn phase(&self) -> Phase {
		self.controller.phase()
	}

	pub fn messages(&self) -> &[ChatMessage] {
		self.controller.messages()
	}

	pub fn recent(&self) -> &[ConversationSummary] {
		self.recent.items()
	}

	pub fn chat_view_open(&self) -> bool {
		self.chat_view_open
	}

	/// Chat view gained focus: clear the badge and refresh the sidebar.
	pub fn open_chat_view(&mut self) {
		self.chat_view_open = true;
		self.ctx.unread.reset();
		self.refresh_recent();
	}

	/// Chat view left: no conversation is active any more.
	pub fn close_chat_view(&mut self) {
		self.chat_view_open = false;
		self.controller.clear_selection();
	}

	pub fn select_partner(&mut self, slug: Slug) {
		let effects = self.controller.select_partner(slug);
		self.apply(effects);
	}

	pub fn set_draft(&mut self, text: impl Into<String>) {
		self.controller.set_draft(text);
	}

	/// Send the current draft over the channel.
	pub fn submit(&mut self) -> Result<(), SendRejected> {
		let effects = self.controller.submit(self.adapter.is_connected())?;
		self.apply(effects);
		Ok(())
	}

	pub fn send(&mut self, text: impl Into<String>) -> Result<(), SendRejected> {
		self.set_draft(text);
		self.submit()
	}

	pub fn refresh_recent(&mut self) {
		let ticket = self.recent.begin_refresh();
		let api = self.api.clone();
		let tx = self.tasks_tx.clone();
		tokio::spawn(async move {
			let result = api.recent_conversations().await;
			let _ = tx.send(TaskResult::Recent { ticket, result });
		});
	}

	/// Wait for the next UI-relevant change. `None` once the channel is gone for good.
	///
	/// Cancel-safe: dropping the future before it completes loses no event and
	/// no scheduled reconnect, so it can sit in a `tokio::select!` branch.
	pub async fn next_update(&mut self) -> Option<ChatUpdate> {
		loop {
			let deadline = self.reconnect_deadline;
			let step = tokio::select! {
				ev = self.events.recv() => Step::Channel(ev),
				Some(res) = self.tasks_rx.recv() => Step::Task(res),
				_ = async {
					if let Some(deadline) = deadline {
						tokio::time::sleep_until(deadline).await;
					}
				}, if deadline.is_some() => Step::Reconnect,
			};

			let update = match step {
				Step::Channel(None) => return None,
				Step::Channel(Some(ev)) => self.on_channel_event(ev),
				Step::Task(res) => self.on_task_result(res),
				Step::Reconnect => {
					self.start_reconnect();
					None
				}
			};
			if update.is_some() {
				return update;
			}
		}
	}

	/// Close the channel and drop every subscription.
	pub async fn shutdown(self) {
		self.adapter.disconnect();
		info!("chat session closed");
	}

	fn apply(&mut self, effects: Vec<Effect>) {
		for effect in effects {
			match effect {
				Effect::ResolveIdentity { generation, slug } => {
					let resolver = self.resolver.clone();
					let tx = self.tasks_tx.clone();
					tokio::spawn(async move {
						let result = resolver.resolve(&slug).await;
						let _ = tx.send(TaskResult::Identity { generation, result });
					});
				}
				Effect::JoinRoom { room } => {
					if let Err(e) = self.adapter.join_room(&room) {
						warn!(room = %room, error = %e, "join failed");
					}
				}
				Effect::FetchHistory { generation, room } => {
					let api = self.api.clone();
					let tx = self.tasks_tx.clone();
					tokio::spawn(async move {
						let result = api.history(&room).await;
						let _ = tx.send(TaskResult::History {
							generation,
							room,
							result,
						});
					});
				}
				Effect::SendMessage { room, text } => {
					if let Err(e) = self.adapter.send_message(&room, &text) {
						warn!(room = %room, error = %e, "send failed");
					}
				}
				Effect::RefreshRecent => self.refresh_recent(),
			}
		}
	}

	fn on_channel_event(&mut self, ev: ChannelEvent) -> Option<ChatUpdate> {
		match ev {
			ChannelEvent::Connected => {
				self.reconnect.on_connected();
				self.reconnect_deadline = None;
				Some(ChatUpdate::Connected)
			}
			ChannelEvent::Message(msg) => {
				let (route, effects) = self.controller.route_inbound(msg, &self.ctx.unread);
				self.apply(effects);
				match route {
					InboundRoute::Appended => Some(ChatUpdate::MessagesChanged),
					InboundRoute::Unread => Some(ChatUpdate::Unread(self.ctx.unread.read())),
					InboundRoute::Buffered | InboundRoute::Duplicate => None,
				}
			}
			ChannelEvent::Error(message) => Some(ChatUpdate::ChannelError(message)),
			ChannelEvent::Closed { reason } => {
				let retry_in_ms = if self.auto_reconnect {
					Some(self.schedule_reconnect())
				} else {
					None
				};
				Some(ChatUpdate::Disconnected { reason, retry_in_ms })
			}
		}
	}

	fn on_task_result(&mut self, res: TaskResult) -> Option<ChatUpdate> {
		match res {
			TaskResult::Identity { generation, result } => {
				let before = self.controller.phase();
				let effects = self.controller.identity_resolved(generation, result);
				self.apply(effects);
				let after = self.controller.phase();
				(before != after).then_some(ChatUpdate::PhaseChanged(after))
			}
			TaskResult::History {
				generation,
				room,
				result,
			} => {
				let effects = self.controller.history_loaded(generation, &room, result);
				if effects.is_empty() {
					return None;
				}
				self.apply(effects);
				Some(ChatUpdate::MessagesChanged)
			}
			TaskResult::Recent { ticket, result } => self.recent.complete(ticket, result).then_some(ChatUpdate::RecentChanged),
			TaskResult::Reconnect { result } => self.on_reconnect(result),
		}
	}

	fn schedule_reconnect(&mut self) -> u64 {
		let attempt = self.reconnect.bump();
		let (deadline, ms) = schedule_reconnect(attempt);
		self.reconnect_deadline = Some(deadline);
		info!(attempt, next_retry_in_ms = ms, "real-time reconnect scheduled");
		ms
	}

	fn start_reconnect(&mut self) {
		self.reconnect_deadline = None;
		let adapter = self.adapter.clone();
		let token = self.ctx.token.clone();
		let tx = self.tasks_tx.clone();
		debug!(attempt = self.reconnect.attempt(), "reconnecting real-time channel");
		tokio::spawn(async move {
			let result = adapter.connect(&token).await;
			let _ = tx.send(TaskResult::Reconnect { result });
		});
	}

	fn on_reconnect(&mut self, result: Result<(), ClientCoreError>) -> Option<ChatUpdate> {
		match result {
			Ok(()) => {
				let effects = self.controller.resync();
				debug!(effects = effects.len(), "resyncing open conversation after reconnect");
				self.apply(effects);
				None
			}
			Err(e) => {
				warn!(error = %e, "real-time reconnect failed");
				let next_retry_in_ms = self.schedule_reconnect();
				Some(ChatUpdate::Reconnecting {
					attempt: self.reconnect.attempt(),
					next_retry_in_ms,
				})
			}
		}
	}
}
