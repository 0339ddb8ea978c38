#![forbid(unsafe_code)]

use std::sync::Arc;

use naralink_domain::{Slug, StableId};
use thiserror::Error;
use tracing::debug;

use crate::ClientCoreError;
use crate::api::NetworkApi;

#[derive(Debug, Error)]
pub enum ResolveError {
	#[error("no active profile for slug {0}")]
	NotFound(Slug),

	#[error("resolution failed: {0}")]
	Failed(#[from] ClientCoreError),
}

/// Maps a slug from navigation state to the partner's stable id.
///
/// Results are not cached: every partner selection triggers a fresh lookup.
#[derive(Clone)]
pub struct IdentityResolver {
	api: Arc<dyn NetworkApi>,
}

impl IdentityResolver {
	pub fn new(api: Arc<dyn NetworkApi>) -> Self {
		Self { api }
	}

	pub async fn resolve(&self, slug: &Slug) -> Result<StableId, ResolveError> {
		debug!(slug = %slug, "resolving partner identity");
		match self.api.profile(slug).await {
			Ok(page) => Ok(page.profile.id),
			Err(ClientCoreError::NotFound(_)) => Err(ResolveError::NotFound(slug.clone())),
			Err(e) => Err(ResolveError::Failed(e)),
		}
	}
}
