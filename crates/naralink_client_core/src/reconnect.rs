#![forbid(unsafe_code)]

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// A connection that stayed up this long resets the attempt counter.
pub const RECONNECT_RESET_AFTER: Duration = Duration::from_secs(60 * 5);

const BASE_MS: u64 = 500;
const MAX_MS: u64 = 30_000;

/// Deadline and delay (ms) for reconnect `attempt` (1-based).
pub fn schedule_reconnect(attempt: u32) -> (Instant, u64) {
	let delay_ms = backoff_ms(attempt);
	let jitter_window = (delay_ms / 10).max(1);
	let mut rng = rand::rng();
	let jitter_offset = rng.random_range(0..=(jitter_window * 2));
	let final_ms = delay_ms.saturating_sub(jitter_window).saturating_add(jitter_offset);
	(Instant::now() + Duration::from_millis(final_ms), final_ms)
}

/// Backoff before jitter.
pub fn backoff_ms(attempt: u32) -> u64 {
	let pow = 2u64.saturating_pow(attempt.saturating_sub(1).min(6));
	BASE_MS.saturating_mul(pow).min(MAX_MS)
}

/// Attempt counter for one channel.
#[derive(Debug, Default)]
pub struct ReconnectState {
	attempt: u32,
	last_connected: Option<Instant>,
}

impl ReconnectState {
	pub fn on_connected(&mut self) {
		self.last_connected = Some(Instant::now());
	}

	/// Next attempt number, reset when the last connection was long-lived.
	pub fn bump(&mut self) -> u32 {
		match self.last_connected.take() {
			Some(last) if Instant::now().duration_since(last) > RECONNECT_RESET_AFTER => self.attempt = 1,
			_ => self.attempt = self.attempt.saturating_add(1).max(1),
		}
		self.attempt
	}

	pub fn attempt(&self) -> u32 {
		self.attempt
	}
}
