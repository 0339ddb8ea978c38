#![forbid(unsafe_code)]

use naralink_domain::ConversationSummary;
use tracing::{debug, warn};

use crate::ClientCoreError;

/// Ticket for one in-flight refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshTicket(u64);

/// Sidebar of recent conversations.
///
/// Responses are applied only if newer than the last applied one; a failed
/// refresh keeps the current list.
#[derive(Debug, Default)]
pub struct RecentConversations {
	items: Vec<ConversationSummary>,
	issued: u64,
	applied: u64,
}

impl RecentConversations {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn items(&self) -> &[ConversationSummary] {
		&self.items
	}

	/// Start a refresh.
	pub fn begin_refresh(&mut self) -> RefreshTicket {
		self.issued += 1;
		RefreshTicket(self.issued)
	}

	/// Apply a refresh result. Returns true when the list changed.
	pub fn complete(
		&mut self,
		ticket: RefreshTicket,
		result: Result<Vec<ConversationSummary>, ClientCoreError>,
	) -> bool {
		if ticket.0 <= self.applied {
			debug!(ticket = ticket.0, applied = self.applied, "discarding out-of-order recent list");
			return false;
		}
		match result {
			Ok(items) => {
				self.applied = ticket.0;
				self.items = items;
				true
			}
			Err(e) => {
				warn!(error = %e, "recent conversations refresh failed; keeping previous list");
				false
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use naralink_domain::{PartnerInfo, RoomKey, StableId};

	use super::*;

	fn row(partner: &str, last: &str) -> ConversationSummary {
		ConversationSummary {
			room: RoomKey::derive(&StableId::new("a1").unwrap(), &StableId::new(partner).unwrap()),
			partner_id: StableId::new(partner).unwrap(),
			partner: PartnerInfo::default(),
			last_message: last.into(),
			last_timestamp: None,
		}
	}

	#[test]
	fn late_older_response_is_discarded() {
		let mut r = RecentConversations::new();
		let t1 = r.begin_refresh();
		let t2 = r.begin_refresh();
		assert!(r.complete(t2, Ok(vec![row("b2", "newest")])));
		assert!(!r.complete(t1, Ok(vec![row("b2", "stale")])));
		assert_eq!(r.items()[0].last_message, "newest");
	}

	#[test]
	fn failure_keeps_previous_list() {
		let mut r = RecentConversations::new();
		let t = r.begin_refresh();
		r.complete(t, Ok(vec![row("b2", "hi")]));
		let t = r.begin_refresh();
		assert!(!r.complete(t, Err(ClientCoreError::Http("boom".into()))));
		assert_eq!(r.items().len(), 1);
	}
}
