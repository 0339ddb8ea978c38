use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Slug;

/// Feed entry published by a startup. Append-only from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
	pub id: Option<String>,
	pub author: Option<PostAuthor>,
	pub content: String,
	/// Image reference (URL or data URL).
	pub image: Option<String>,
	pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostAuthor {
	pub slug: Option<Slug>,
	pub name: Option<String>,
	pub logo_url: Option<String>,
}
