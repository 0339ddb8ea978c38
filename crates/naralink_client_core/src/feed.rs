#![forbid(unsafe_code)]

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use naralink_domain::{Post, Role};
use tracing::{debug, warn};

use crate::ClientCoreError;
use crate::api::NetworkApi;
use crate::auth::AccountStatus;

/// Largest image accepted by the composer.
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Minimum days between two posts of the same account.
pub const POST_COOLDOWN_DAYS: i64 = 7;

/// Image to attach to a post, held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
	pub mime: String,
	pub bytes: Vec<u8>,
}

impl ImageAttachment {
	pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ClientCoreError> {
		check_image_size(bytes.len() as u64)?;
		Ok(Self {
			mime: mime.into(),
			bytes,
		})
	}

	/// Read an image file. Oversized files are rejected before reading.
	pub fn from_path(path: &Path) -> Result<Self, ClientCoreError> {
		let meta = std::fs::metadata(path)?;
		check_image_size(meta.len())?;
		let bytes = std::fs::read(path)?;
		Self::new(mime_for_path(path), bytes)
	}

	/// `data:<mime>;base64,<payload>`.
	pub fn to_data_url(&self) -> String {
		format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
	}
}

fn check_image_size(len: u64) -> Result<(), ClientCoreError> {
	if len > MAX_IMAGE_BYTES {
		return Err(ClientCoreError::Validation("Image too large (Max 10MB)".into()));
	}
	Ok(())
}

fn mime_for_path(path: &Path) -> &'static str {
	let ext = path
		.extension()
		.and_then(|e| e.to_str())
		.map(|e| e.to_ascii_lowercase())
		.unwrap_or_default();
	match ext.as_str() {
		"png" => "image/png",
		"jpg" | "jpeg" => "image/jpeg",
		"gif" => "image/gif",
		"webp" => "image/webp",
		"svg" => "image/svg+xml",
		_ => "application/octet-stream",
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
	pub content: String,
	pub image: Option<ImageAttachment>,
}

impl PostDraft {
	pub fn new(content: impl Into<String>) -> Self {
		Self {
			content: content.into(),
			image: None,
		}
	}

	pub fn with_image(mut self, image: ImageAttachment) -> Self {
		self.image = Some(image);
		self
	}

	pub fn validate(&self) -> Result<(), ClientCoreError> {
		if self.content.trim().is_empty() {
			return Err(ClientCoreError::Validation("post content is empty".into()));
		}
		Ok(())
	}
}

/// Weekly posting lock derived from the account's last post date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cooldown {
	Open,
	Locked { remaining: Duration },
}

impl Cooldown {
	pub fn compute(last_post: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
		let Some(last) = last_post else {
			return Cooldown::Open;
		};
		let window = Duration::days(POST_COOLDOWN_DAYS);
		let elapsed = now - last;
		if elapsed < window {
			Cooldown::Locked {
				remaining: window - elapsed,
			}
		} else {
			Cooldown::Open
		}
	}

	pub fn is_locked(&self) -> bool {
		matches!(self, Cooldown::Locked { .. })
	}

	/// `"{d}d {h}h left"`, or `"{h}h left"` under a day. Empty when open.
	pub fn label(&self) -> String {
		match self {
			Cooldown::Open => String::new(),
			Cooldown::Locked { remaining } => {
				let days = remaining.num_days();
				let hours = (*remaining - Duration::days(days)).num_hours();
				if days > 0 {
					format!("{days}d {hours}h left")
				} else {
					format!("{hours}h left")
				}
			}
		}
	}
}

/// Whether the composer accepts a post right now.
pub fn composer_gate(role: Role, status: &AccountStatus, now: DateTime<Utc>) -> Result<(), ClientCoreError> {
	if !role.can_post() {
		return Err(ClientCoreError::Validation("only startups can post milestones".into()));
	}
	let cooldown = Cooldown::compute(status.last_post_date, now);
	if cooldown.is_locked() && !status.is_inactive() {
		return Err(ClientCoreError::Validation(format!("posting locked: {}", cooldown.label())));
	}
	Ok(())
}

/// Feed posts, or an empty list when the fetch fails.
pub async fn load_feed(api: &dyn NetworkApi) -> Vec<Post> {
	match api.feed().await {
		Ok(posts) => {
			debug!(count = posts.len(), "feed loaded");
			posts
		}
		Err(e) => {
			warn!(error = %e, "feed fetch failed; showing empty feed");
			Vec::new()
		}
	}
}

/// Validate and publish a post. Server messages surface as [`ClientCoreError::Api`].
pub async fn publish(
	api: &dyn NetworkApi,
	role: Role,
	status: &AccountStatus,
	draft: &PostDraft,
	now: DateTime<Utc>,
) -> Result<(), ClientCoreError> {
	draft.validate()?;
	composer_gate(role, status, now)?;
	api.create_post(draft).await
}

#[cfg(test)]
mod tests {
	use chrono::TimeZone;

	use super::*;

	fn now() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
	}

	#[test]
	fn cooldown_labels() {
		let c = Cooldown::compute(Some(now() - Duration::days(2)), now());
		assert_eq!(c.label(), "5d 0h left");

		let c = Cooldown::compute(Some(now() - Duration::days(6) - Duration::hours(20)), now());
		assert_eq!(c.label(), "4h left");

		let c = Cooldown::compute(Some(now() - Duration::days(8)), now());
		assert_eq!(c, Cooldown::Open);
		assert_eq!(Cooldown::compute(None, now()), Cooldown::Open);
	}

	#[test]
	fn gate_enforces_role_and_cooldown() {
		let fresh = AccountStatus {
			role: Some(Role::Startup),
			last_post_date: Some(now() - Duration::hours(1)),
			status: Some("active".into()),
		};
		assert!(composer_gate(Role::Incubator, &AccountStatus::default(), now()).is_err());
		assert!(composer_gate(Role::Startup, &fresh, now()).is_err());
		assert!(composer_gate(Role::Startup, &AccountStatus::default(), now()).is_ok());

		let inactive = AccountStatus {
			status: Some("inactive".into()),
			..fresh
		};
		assert!(composer_gate(Role::Startup, &inactive, now()).is_ok());
	}

	#[test]
	fn image_data_url_and_limit() {
		let img = ImageAttachment::new("image/png", vec![1, 2, 3]).unwrap();
		assert_eq!(img.to_data_url(), "data:image/png;base64,AQID");

		let too_big = vec![0u8; (MAX_IMAGE_BYTES + 1) as usize];
		assert!(matches!(
			ImageAttachment::new("image/png", too_big),
			Err(ClientCoreError::Validation(_))
		));
	}

	#[test]
	fn image_from_path_guesses_mime() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("logo.JPG");
		std::fs::write(&path, b"\xff\xd8\xff").unwrap();
		let img = ImageAttachment::from_path(&path).unwrap();
		assert_eq!(img.mime, "image/jpeg");
	}

	#[test]
	fn empty_draft_is_rejected() {
		assert!(PostDraft::new("   ").validate().is_err());
		assert!(PostDraft::new("Closed our seed round").validate().is_ok());
	}
}
