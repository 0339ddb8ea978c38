#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::str::FromStr;

use naralink_domain::{ParseIdError, Role, SearchHit};
use tracing::{debug, warn};

use crate::api::NetworkApi;

/// Quick search only fires for queries longer than this many characters.
pub const QUICK_SEARCH_MIN_CHARS: usize = 1;

/// Navbar search-as-you-type.
pub async fn quick_search(api: &dyn NetworkApi, query: &str) -> Vec<SearchHit> {
	let q = query.trim();
	if q.chars().count() <= QUICK_SEARCH_MIN_CHARS {
		return Vec::new();
	}
	run(api, q).await
}

/// Full results page. Failures degrade to no results.
pub async fn search(api: &dyn NetworkApi, query: &str) -> Vec<SearchHit> {
	let q = query.trim();
	if q.is_empty() {
		return Vec::new();
	}
	run(api, q).await
}

async fn run(api: &dyn NetworkApi, q: &str) -> Vec<SearchHit> {
	match api.search_profiles(q).await {
		Ok(hits) => {
			debug!(query = %q, count = hits.len(), "search completed");
			hits
		}
		Err(e) => {
			warn!(query = %q, error = %e, "search failed");
			Vec::new()
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoleFilter {
	#[default]
	All,
	Only(Role),
}

impl FromStr for RoleFilter {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.trim().eq_ignore_ascii_case("all") {
			return Ok(RoleFilter::All);
		}
		s.parse::<Role>().map(RoleFilter::Only)
	}
}

/// Client-side narrowing of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
	pub role: RoleFilter,
	/// `None` means all cities.
	pub city: Option<String>,
}

impl SearchFilter {
	pub fn matches(&self, hit: &SearchHit) -> bool {
		let role_ok = match self.role {
			RoleFilter::All => true,
			RoleFilter::Only(r) => hit.role == r,
		};
		let city_ok = match &self.city {
			None => true,
			Some(c) => hit.city.as_deref() == Some(c.as_str()),
		};
		role_ok && city_ok
	}

	pub fn apply<'a>(&self, hits: &'a [SearchHit]) -> Vec<&'a SearchHit> {
		hits.iter().filter(|h| self.matches(h)).collect()
	}
}

/// Distinct cities present in `hits`, sorted.
pub fn cities(hits: &[SearchHit]) -> Vec<String> {
	hits.iter()
		.filter_map(|h| h.city.as_deref())
		.filter(|c| !c.trim().is_empty())
		.map(str::to_string)
		.collect::<BTreeSet<_>>()
		.into_iter()
		.collect()
}

#[cfg(test)]
mod tests {
	use naralink_domain::{Slug, StableId};

	use super::*;

	fn hit(id: &str, role: Role, city: Option<&str>) -> SearchHit {
		SearchHit {
			id: StableId::new(id).unwrap(),
			slug: Slug::new(id).unwrap(),
			name: id.to_uppercase(),
			role,
			logo_url: None,
			city: city.map(str::to_string),
			website_url: None,
		}
	}

	#[test]
	fn filter_by_role_and_city() {
		let hits = vec![
			hit("a1", Role::Startup, Some("Lisbon")),
			hit("b2", Role::Incubator, Some("Lisbon")),
			hit("c3", Role::Startup, Some("Porto")),
			hit("d4", Role::Startup, None),
		];

		assert_eq!(SearchFilter::default().apply(&hits).len(), 4);

		let f = SearchFilter {
			role: RoleFilter::Only(Role::Startup),
			city: Some("Lisbon".into()),
		};
		let got: Vec<_> = f.apply(&hits).iter().map(|h| h.id.as_str()).collect();
		assert_eq!(got, vec!["a1"]);

		assert_eq!(cities(&hits), vec!["Lisbon".to_string(), "Porto".to_string()]);
	}

	#[test]
	fn role_filter_parses_all() {
		assert_eq!("all".parse::<RoleFilter>().unwrap(), RoleFilter::All);
		assert_eq!("incubator".parse::<RoleFilter>().unwrap(), RoleFilter::Only(Role::Incubator));
		assert!("vc".parse::<RoleFilter>().is_err());
	}
}
