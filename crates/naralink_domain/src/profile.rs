use serde::{Deserialize, Serialize};

use crate::{Role, Slug, StableId};

/// Authenticated account for the lifetime of a session.
///
/// `id` and `slug` always describe the same account; only `id` is stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
	pub id: StableId,
	pub slug: Slug,
	pub role: Role,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
	pub city: Option<String>,
	pub state: Option<String>,
	pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Socials {
	pub linkedin_url: Option<String>,
}

/// Fields only startups carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartupDetails {
	pub tagline: Option<String>,
	pub primary_industry: Option<String>,
	pub target_market: Option<String>,
	pub product_stage: Option<String>,
	pub funding_stage: Option<String>,
	pub seeking_incubation: bool,
}

/// Fields only incubators carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncubatorDetails {
	pub organization_type: Option<String>,
	pub equity_taken_percentage: Option<f64>,
	pub startups_funded: Option<u32>,
	pub mentorship_offered: bool,
	pub office_space: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ProfileDetails {
	Startup(StartupDetails),
	Incubator(IncubatorDetails),
}

impl ProfileDetails {
	pub fn role(&self) -> Role {
		match self {
			ProfileDetails::Startup(_) => Role::Startup,
			ProfileDetails::Incubator(_) => Role::Incubator,
		}
	}
}

/// A party in the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
	pub id: StableId,
	pub slug: Slug,
	pub name: String,
	pub logo_url: Option<String>,
	pub description: Option<String>,
	pub website_url: Option<String>,
	pub contact_email: Option<String>,
	pub contact_phone: Option<String>,
	pub location: Location,
	pub socials: Socials,
	pub details: ProfileDetails,
}

impl Profile {
	pub fn role(&self) -> Role {
		self.details.role()
	}
}

/// Search result row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
	pub id: StableId,
	pub slug: Slug,
	pub name: String,
	pub role: Role,
	pub logo_url: Option<String>,
	pub city: Option<String>,
	pub website_url: Option<String>,
}
