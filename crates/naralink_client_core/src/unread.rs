#![forbid(unsafe_code)]

use std::sync::Arc;

use tokio::sync::watch;

/// Global unread badge for the session.
///
/// There is one counter per session, not per conversation. Only the inbound
/// router increments it; opening the chat view resets it.
#[derive(Debug, Clone)]
pub struct UnreadCounter {
	tx: Arc<watch::Sender<u64>>,
}

impl Default for UnreadCounter {
	fn default() -> Self {
		Self::new()
	}
}

impl UnreadCounter {
	pub fn new() -> Self {
		let (tx, _rx) = watch::channel(0);
		Self { tx: Arc::new(tx) }
	}

	/// Add one and return the new value.
	pub fn increment(&self) -> u64 {
		let mut next = 0;
		self.tx.send_modify(|n| {
			*n = n.saturating_add(1);
			next = *n;
		});
		next
	}

	pub fn reset(&self) {
		self.tx.send_replace(0);
	}

	pub fn read(&self) -> u64 {
		*self.tx.borrow()
	}

	/// Observe changes (badge rendering).
	pub fn subscribe(&self) -> watch::Receiver<u64> {
		self.tx.subscribe()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn increments_and_resets() {
		let c = UnreadCounter::new();
		assert_eq!(c.read(), 0);
		assert_eq!(c.increment(), 1);
		assert_eq!(c.increment(), 2);
		c.reset();
		assert_eq!(c.read(), 0);
	}

	#[test]
	fn clones_share_one_badge() {
		let a = UnreadCounter::new();
		let b = a.clone();
		a.increment();
		b.increment();
		assert_eq!(a.read(), 2);
	}

	#[tokio::test]
	async fn subscribers_see_updates() {
		let c = UnreadCounter::new();
		let mut rx = c.subscribe();
		c.increment();
		rx.changed().await.unwrap();
		assert_eq!(*rx.borrow_and_update(), 1);
	}
}
