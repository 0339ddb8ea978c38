#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use naralink_domain::{ChatMessage, MessageKey, RoomKey, Slug, StableId};
use tracing::{debug, info, warn};

use crate::ClientCoreError;
use crate::identity::ResolveError;
use crate::unread::UnreadCounter;

/// Partner-selection generation. Every result is tagged with the generation it belongs to.
pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	/// No partner selected.
	Idle,
	/// Slug → stable id lookup in flight.
	ResolvingIdentity,
	/// Room key known, join sent, history fetch in flight.
	JoiningRoom,
	/// History loaded.
	Active,
}

/// Work the controller asks its driver to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
	ResolveIdentity { generation: Generation, slug: Slug },
	JoinRoom { room: RoomKey },
	FetchHistory { generation: Generation, room: RoomKey },
	SendMessage { room: RoomKey, text: String },
	RefreshRecent,
}

/// Where an inbound message went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundRoute {
	/// Appended to the open conversation.
	Appended,
	/// Held until history arrives for the joining room.
	Buffered,
	/// Already in the open conversation.
	Duplicate,
	/// Not for the open conversation; unread counter incremented.
	Unread,
}

impl InboundRoute {
	fn metric_label(self) -> &'static str {
		match self {
			InboundRoute::Appended => "active",
			InboundRoute::Buffered => "buffered",
			InboundRoute::Duplicate => "duplicate",
			InboundRoute::Unread => "unread",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendRejected {
	#[error("message is empty")]
	EmptyText,
	#[error("not connected")]
	NotConnected,
	#[error("no conversation open")]
	NoRoom,
}

impl SendRejected {
	fn metric_label(self) -> &'static str {
		match self {
			SendRejected::EmptyText => "empty",
			SendRejected::NotConnected => "not_connected",
			SendRejected::NoRoom => "no_room",
		}
	}
}

/// State of the open conversation.
///
/// Pure: performs no I/O. Callers execute the returned [`Effect`]s and feed
/// results back tagged with the generation they were issued under.
#[derive(Debug)]
pub struct ConversationController {
	self_id: StableId,
	phase: Phase,
	generation: Generation,
	partner_slug: Option<Slug>,
	partner_id: Option<StableId>,
	room: Option<RoomKey>,
	messages: Vec<ChatMessage>,
	pending_live: Vec<ChatMessage>,
	seen: HashSet<MessageKey>,
	error: Option<String>,
	draft: String,
}

impl ConversationController {
	pub fn new(self_id: StableId) -> Self {
		Self {
			self_id,
			phase: Phase::Idle,
			generation: 0,
			partner_slug: None,
			partner_id: None,
			room: None,
			messages: Vec::new(),
			pending_live: Vec::new(),
			seen: HashSet::new(),
			error: None,
			draft: String::new(),
		}
	}

	pub fn phase(&self) -> Phase {
		self.phase
	}

	pub fn generation(&self) -> Generation {
		self.generation
	}

	pub fn partner_slug(&self) -> Option<&Slug> {
		self.partner_slug.as_ref()
	}

	pub fn partner_id(&self) -> Option<&StableId> {
		self.partner_id.as_ref()
	}

	/// The active room key, once identity resolution has succeeded.
	pub fn room(&self) -> Option<&RoomKey> {
		self.room.as_ref()
	}

	pub fn messages(&self) -> &[ChatMessage] {
		&self.messages
	}

	/// User-visible error of the last failed partner selection.
	pub fn error(&self) -> Option<&str> {
		self.error.as_deref()
	}

	pub fn draft(&self) -> &str {
		&self.draft
	}

	pub fn set_draft(&mut self, text: impl Into<String>) {
		self.draft = text.into();
	}

	pub fn input_enabled(&self) -> bool {
		self.room.is_some()
	}

	fn reset_conversation(&mut self) {
		self.generation += 1;
		self.partner_slug = None;
		self.partner_id = None;
		self.room = None;
		self.messages.clear();
		self.pending_live.clear();
		self.seen.clear();
		self.error = None;
	}

	/// Select a partner by slug. Any in-flight work for a previous partner becomes stale.
	pub fn select_partner(&mut self, slug: Slug) -> Vec<Effect> {
		self.reset_conversation();
		self.partner_slug = Some(slug.clone());
		self.phase = Phase::ResolvingIdentity;
		info!(slug = %slug, generation = self.generation, "partner selected");
		vec![Effect::ResolveIdentity {
			generation: self.generation,
			slug,
		}]
	}

	/// Back to `Idle` (chat view closed).
	pub fn clear_selection(&mut self) {
		self.reset_conversation();
		self.phase = Phase::Idle;
		self.draft.clear();
	}

	fn is_stale(&self, generation: Generation, expected: &[Phase]) -> bool {
		if generation != self.generation || !expected.contains(&self.phase) {
			metrics::counter!("naralink_stale_results_dropped_total").increment(1);
			debug!(
				generation,
				current = self.generation,
				phase = ?self.phase,
				"dropping stale result"
			);
			return true;
		}
		false
	}

	/// Feed back an identity resolution result.
	pub fn identity_resolved(
		&mut self,
		generation: Generation,
		result: Result<StableId, ResolveError>,
	) -> Vec<Effect> {
		if self.is_stale(generation, &[Phase::ResolvingIdentity]) {
			return Vec::new();
		}

		match result {
			Ok(partner_id) => {
				let room = RoomKey::derive(&self.self_id, &partner_id);
				info!(room = %room, generation, "partner resolved; joining room");
				self.partner_id = Some(partner_id);
				self.room = Some(room.clone());
				self.phase = Phase::JoiningRoom;
				vec![
					Effect::JoinRoom { room: room.clone() },
					Effect::FetchHistory { generation, room },
				]
			}
			Err(e) => {
				warn!(generation, error = %e, "partner resolution failed");
				self.error = Some(e.to_string());
				self.phase = Phase::Idle;
				Vec::new()
			}
		}
	}

	/// Feed back a history fetch. Merges history first, then live messages.
	/// Server ids are never shown twice; an id-less live message is dropped
	/// only when history already holds an equal one. A failed fetch activates with what is already there.
	pub fn history_loaded(
		&mut self,
		generation: Generation,
		room: &RoomKey,
		result: Result<Vec<ChatMessage>, ClientCoreError>,
	) -> Vec<Effect> {
		if self.is_stale(generation, &[Phase::JoiningRoom, Phase::Active]) || self.room.as_ref() != Some(room) {
			return Vec::new();
		}

		let history = match result {
			Ok(h) => h,
			Err(e) => {
				warn!(room = %room, error = %e, "history fetch failed; showing live messages only");
				Vec::new()
			}
		};

		let existing = std::mem::take(&mut self.messages);
		let pending = std::mem::take(&mut self.pending_live);
		self.seen.clear();

		// Id-less messages are matched against history by count, never against each other.
		let mut from_history: HashMap<MessageKey, usize> = HashMap::new();
		for msg in history.into_iter().filter(|m| m.room == *room) {
			let key = msg.key();
			if matches!(key, MessageKey::Server(_)) {
				if !self.seen.insert(key) {
					continue;
				}
			} else {
				*from_history.entry(key).or_default() += 1;
			}
			self.messages.push(msg);
		}

		for msg in existing.into_iter().chain(pending).filter(|m| m.room == *room) {
			let key = msg.key();
			let known = match key {
				MessageKey::Server(_) => !self.seen.insert(key),
				MessageKey::Composite { .. } => match from_history.get_mut(&key) {
					Some(left) if *left > 0 => {
						*left -= 1;
						true
					}
					_ => false,
				},
			};
			if !known {
				self.messages.push(msg);
			}
		}

		debug!(room = %room, count = self.messages.len(), "history merged");
		self.phase = Phase::Active;
		vec![Effect::RefreshRecent]
	}

	/// Records server ids as they are shown. Messages without one are never treated as repeats.
	fn is_known_server_message(&mut self, msg: &ChatMessage) -> bool {
		match msg.key() {
			key @ MessageKey::Server(_) => !self.seen.insert(key),
			MessageKey::Composite { .. } => false,
		}
	}

	/// Route one inbound message. The only place the unread counter is incremented.
	pub fn route_inbound(&mut self, msg: ChatMessage, unread: &UnreadCounter) -> (InboundRoute, Vec<Effect>) {
		let for_open_room = self.room.as_ref() == Some(&msg.room);

		let route = if !for_open_room {
			let n = unread.increment();
			debug!(room = %msg.room, unread = n, "message for another conversation");
			InboundRoute::Unread
		} else if self.phase == Phase::JoiningRoom {
			let key = msg.key();
			let repeat = matches!(key, MessageKey::Server(_)) && self.pending_live.iter().any(|m| m.key() == key);
			if repeat {
				InboundRoute::Duplicate
			} else {
				self.pending_live.push(msg);
				InboundRoute::Buffered
			}
		} else if self.is_known_server_message(&msg) {
			InboundRoute::Duplicate
		} else {
			self.messages.push(msg);
			InboundRoute::Appended
		};

		metrics::counter!("naralink_inbound_messages_total", "route" => route.metric_label()).increment(1);

		let effects = match route {
			InboundRoute::Appended => vec![Effect::RefreshRecent],
			_ => Vec::new(),
		};
		(route, effects)
	}

	/// Submit the draft. The message is not appended locally; it shows up when echoed back.
	pub fn submit(&mut self, connected: bool) -> Result<Vec<Effect>, SendRejected> {
		let text = self.draft.trim();
		let check = if text.is_empty() {
			Err(SendRejected::EmptyText)
		} else if !connected {
			Err(SendRejected::NotConnected)
		} else if self.room.is_none() {
			Err(SendRejected::NoRoom)
		} else {
			Ok(())
		};

		if let Err(reason) = check {
			metrics::counter!("naralink_send_rejected_total", "reason" => reason.metric_label()).increment(1);
			debug!(reason = %reason, "send rejected");
			return Err(reason);
		}

		let Some(room) = self.room.clone() else {
			return Err(SendRejected::NoRoom);
		};
		let text = text.to_string();
		self.draft.clear();
		Ok(vec![Effect::SendMessage { room, text }])
	}

	/// Re-join and re-fetch the open conversation (after a reconnect).
	pub fn resync(&self) -> Vec<Effect> {
		match (&self.room, self.phase) {
			(Some(room), Phase::JoiningRoom | Phase::Active) => vec![
				Effect::JoinRoom { room: room.clone() },
				Effect::FetchHistory {
					generation: self.generation,
					room: room.clone(),
				},
			],
			_ => Vec::new(),
		}
	}
}
