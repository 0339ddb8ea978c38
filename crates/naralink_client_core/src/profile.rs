#![forbid(unsafe_code)]

use naralink_domain::{Post, Profile, ProfileDetails, Slug};
use tracing::{debug, warn};

use crate::ClientCoreError;
use crate::api::NetworkApi;
use crate::session::SessionContext;

pub const TARGET_MARKETS: [&str; 3] = ["B2B", "B2C", "B2G"];

/// `/profiles/{slug}` response.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilePage {
	pub profile: Profile,
	pub posts: Vec<Post>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProfileView {
	Loaded(Box<ProfilePage>),
	NotFound,
}

/// Load a profile page. Every failure renders as "not found".
pub async fn load_profile(api: &dyn NetworkApi, slug: &Slug) -> ProfileView {
	match api.profile(slug).await {
		Ok(page) => {
			debug!(slug = %slug, posts = page.posts.len(), "profile loaded");
			ProfileView::Loaded(Box::new(page))
		}
		Err(e) => {
			warn!(slug = %slug, error = %e, "profile fetch failed");
			ProfileView::NotFound
		}
	}
}

/// Flat edit form for the own profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
	pub name: String,
	pub tagline: String,
	pub target_market: String,
	pub primary_industry: String,
	pub product_stage: String,
	pub organization_type: String,
	pub equity_taken_percentage: Option<f64>,
	pub city: String,
	pub country: String,
	pub contact_email: String,
	pub contact_phone: String,
	pub website_url: String,
	pub linkedin_url: String,
	pub detailed_description: String,
	/// New logo as a `data:` URL, if changed.
	pub logo: Option<String>,
}

impl ProfileUpdate {
	/// Prefill the form from the current profile.
	pub fn from_profile(p: &Profile) -> Self {
		let mut form = Self {
			name: p.name.clone(),
			target_market: "B2B".into(),
			product_stage: "concept".into(),
			organization_type: "incubator".into(),
			city: p.location.city.clone().unwrap_or_default(),
			country: p.location.country.clone().unwrap_or_default(),
			contact_email: p.contact_email.clone().unwrap_or_default(),
			contact_phone: p.contact_phone.clone().unwrap_or_default(),
			website_url: p.website_url.clone().unwrap_or_default(),
			linkedin_url: p.socials.linkedin_url.clone().unwrap_or_default(),
			detailed_description: p.description.clone().unwrap_or_default(),
			..Self::default()
		};

		match &p.details {
			ProfileDetails::Startup(s) => {
				form.tagline = s.tagline.clone().unwrap_or_default();
				form.primary_industry = s.primary_industry.clone().unwrap_or_default();
				if let Some(m) = s.target_market.clone().filter(|m| !m.is_empty()) {
					form.target_market = m;
				}
				if let Some(st) = s.product_stage.clone().filter(|st| !st.is_empty()) {
					form.product_stage = st;
				}
			}
			ProfileDetails::Incubator(i) => {
				if let Some(t) = i.organization_type.clone().filter(|t| !t.is_empty()) {
					form.organization_type = t;
				}
				form.equity_taken_percentage = i.equity_taken_percentage;
			}
		}
		form
	}

	pub fn validate(&self) -> Result<(), ClientCoreError> {
		if self.name.trim().is_empty() {
			return Err(ClientCoreError::Validation("name is required".into()));
		}
		if !TARGET_MARKETS.contains(&self.target_market.as_str()) {
			return Err(ClientCoreError::Validation(format!(
				"target market must be one of {}",
				TARGET_MARKETS.join("/")
			)));
		}
		if let Some(eq) = self.equity_taken_percentage
			&& !(0.0..=100.0).contains(&eq)
		{
			return Err(ClientCoreError::Validation("equity must be between 0 and 100".into()));
		}
		Ok(())
	}
}

/// Save edits to the session's own profile.
pub async fn save_profile(
	api: &dyn NetworkApi,
	ctx: &SessionContext,
	slug: &Slug,
	update: &ProfileUpdate,
) -> Result<Profile, ClientCoreError> {
	if !ctx.is_own_profile(slug) {
		return Err(ClientCoreError::Validation("only your own profile can be edited".into()));
	}
	update.validate()?;
	api.update_profile(update).await
}

#[cfg(test)]
mod tests {
	use naralink_domain::{IncubatorDetails, Location, Socials, StableId, StartupDetails};

	use super::*;

	fn profile(details: ProfileDetails) -> Profile {
		Profile {
			id: StableId::new("a1").unwrap(),
			slug: Slug::new("acme").unwrap(),
			name: "Acme".into(),
			logo_url: None,
			description: Some("We build rockets".into()),
			website_url: Some("acme.io".into()),
			contact_email: None,
			contact_phone: None,
			location: Location {
				city: Some("Lisbon".into()),
				state: None,
				country: Some("PT".into()),
			},
			socials: Socials::default(),
			details,
		}
	}

	#[test]
	fn prefill_uses_defaults_for_missing_fields() {
		let p = profile(ProfileDetails::Startup(StartupDetails {
			tagline: Some("Rockets".into()),
			..Default::default()
		}));
		let form = ProfileUpdate::from_profile(&p);
		assert_eq!(form.target_market, "B2B");
		assert_eq!(form.product_stage, "concept");
		assert_eq!(form.city, "Lisbon");
		assert_eq!(form.detailed_description, "We build rockets");
		assert!(form.validate().is_ok());
	}

	#[test]
	fn incubator_prefill_carries_equity() {
		let p = profile(ProfileDetails::Incubator(IncubatorDetails {
			equity_taken_percentage: Some(7.5),
			..Default::default()
		}));
		let form = ProfileUpdate::from_profile(&p);
		assert_eq!(form.organization_type, "incubator");
		assert_eq!(form.equity_taken_percentage, Some(7.5));
	}

	#[test]
	fn validation_rejects_bad_market_and_equity() {
		let mut form = ProfileUpdate::from_profile(&profile(ProfileDetails::Startup(StartupDetails::default())));
		form.target_market = "D2C".into();
		assert!(form.validate().is_err());
		form.target_market = "B2C".into();
		form.equity_taken_percentage = Some(120.0);
		assert!(form.validate().is_err());
	}
}
