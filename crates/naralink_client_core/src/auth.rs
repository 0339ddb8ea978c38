#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use naralink_domain::{Role, SessionIdentity};
use tracing::{info, warn};

use crate::api::NetworkApi;
use crate::chat::ChatSession;
use crate::session::{SessionContext, SessionStore};
use crate::{ClientCoreError, SecretString};

/// Successful login/register response.
#[derive(Debug, Clone)]
pub struct AuthResponse {
	pub token: SecretString,
	pub identity: SessionIdentity,
}

/// `/auth/status` for the current account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountStatus {
	pub role: Option<Role>,
	pub last_post_date: Option<DateTime<Utc>>,
	/// Account status, e.g. `active` or `inactive`.
	pub status: Option<String>,
}

impl AccountStatus {
	pub fn is_inactive(&self) -> bool {
		self.status.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("inactive"))
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationDetails {
	Startup {
		tagline: String,
		detailed_description: String,
		/// Product status, `idea` by default.
		status: String,
		primary_industry: String,
		funding_stage: String,
		seeking_incubation: bool,
	},
	Incubator {
		organization_type: String,
		mentorship_offered: bool,
		office_space: bool,
		startups_funded: u32,
	},
}

impl RegistrationDetails {
	pub fn role(&self) -> Role {
		match self {
			RegistrationDetails::Startup { .. } => Role::Startup,
			RegistrationDetails::Incubator { .. } => Role::Incubator,
		}
	}
}

/// Sign-up form.
#[derive(Debug, Clone)]
pub struct RegistrationForm {
	pub email: String,
	pub password: SecretString,
	pub name: String,
	pub website_url: String,
	/// Logo as a `data:` URL.
	pub logo: Option<String>,
	pub city: String,
	pub state: String,
	pub country: String,
	pub details: RegistrationDetails,
}

impl RegistrationForm {
	pub fn startup(email: impl Into<String>, password: impl Into<String>, name: impl Into<String>) -> Self {
		Self::with_details(
			email,
			password,
			name,
			RegistrationDetails::Startup {
				tagline: String::new(),
				detailed_description: String::new(),
				status: "idea".to_string(),
				primary_industry: String::new(),
				funding_stage: "bootstrapped".to_string(),
				seeking_incubation: false,
			},
		)
	}

	pub fn incubator(email: impl Into<String>, password: impl Into<String>, name: impl Into<String>) -> Self {
		Self::with_details(
			email,
			password,
			name,
			RegistrationDetails::Incubator {
				organization_type: "incubator".to_string(),
				mentorship_offered: false,
				office_space: false,
				startups_funded: 0,
			},
		)
	}

	fn with_details(
		email: impl Into<String>,
		password: impl Into<String>,
		name: impl Into<String>,
		details: RegistrationDetails,
	) -> Self {
		Self {
			email: email.into(),
			password: SecretString::new(password),
			name: name.into(),
			website_url: String::new(),
			logo: None,
			city: String::new(),
			state: String::new(),
			country: String::new(),
			details,
		}
	}

	pub fn role(&self) -> Role {
		self.details.role()
	}

	pub fn validate(&self) -> Result<(), ClientCoreError> {
		validate_credentials(&self.email, self.password.expose())?;
		if self.name.trim().is_empty() {
			return Err(ClientCoreError::Validation("name is required".into()));
		}
		Ok(())
	}
}

fn validate_credentials(email: &str, password: &str) -> Result<(), ClientCoreError> {
	if email.trim().is_empty() {
		return Err(ClientCoreError::Validation("email is required".into()));
	}
	if !email.contains('@') {
		return Err(ClientCoreError::Validation("email is invalid".into()));
	}
	if password.is_empty() {
		return Err(ClientCoreError::Validation("password is required".into()));
	}
	Ok(())
}

/// Log in, persist the session, and return the new context.
pub async fn login(
	api: &dyn NetworkApi,
	store: &SessionStore,
	email: &str,
	password: &str,
) -> Result<SessionContext, ClientCoreError> {
	validate_credentials(email, password)?;
	let resp = api.login(email.trim(), password).await?;
	start_session(api, store, resp)
}

/// Register a new account and log it in.
pub async fn register(
	api: &dyn NetworkApi,
	store: &SessionStore,
	form: &RegistrationForm,
) -> Result<SessionContext, ClientCoreError> {
	form.validate()?;
	let resp = api.register(form).await?;
	start_session(api, store, resp)
}

/// Rebuild a session from disk, if one was saved.
pub fn restore(api: &dyn NetworkApi, store: &SessionStore) -> Option<SessionContext> {
	let stored = store.load()?;
	api.set_token(Some(stored.token.clone()));
	Some(SessionContext::new(stored.identity, stored.token))
}

fn start_session(
	api: &dyn NetworkApi,
	store: &SessionStore,
	resp: AuthResponse,
) -> Result<SessionContext, ClientCoreError> {
	api.set_token(Some(resp.token.clone()));
	store.save(&resp.token, &resp.identity)?;
	info!(slug = %resp.identity.slug, role = %resp.identity.role, "session started");
	Ok(SessionContext::new(resp.identity, resp.token))
}

/// End the session: close the channel, forget the token, clear the store.
pub async fn logout(api: &dyn NetworkApi, store: &SessionStore, chat: Option<ChatSession>) -> Result<(), ClientCoreError> {
	if let Some(chat) = chat {
		chat.shutdown().await;
	}
	api.set_token(None);
	store.clear()?;
	info!("logged out");
	Ok(())
}

/// Where the user currently is, for 401 handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
	Landing,
	Login,
	Register,
	Feed,
	Search,
	/// Public profile page.
	Profile,
	Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
	/// Stay put; profile pages remain viewable without a session.
	Ignore,
	/// Drop the token. `redirect_to_login` is false when already on login/register.
	ForceLogout { redirect_to_login: bool },
}

/// Policy for an HTTP 401 received while on `view`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnauthorizedPolicy;

impl UnauthorizedPolicy {
	pub fn decide(&self, view: &View) -> AuthAction {
		match view {
			View::Profile => AuthAction::Ignore,
			View::Login | View::Register => AuthAction::ForceLogout {
				redirect_to_login: false,
			},
			_ => AuthAction::ForceLogout {
				redirect_to_login: true,
			},
		}
	}

	/// Apply the decision for `err`. Returns `None` when `err` is not a 401.
	pub fn handle(
		&self,
		err: &ClientCoreError,
		view: &View,
		api: &dyn NetworkApi,
		store: &SessionStore,
	) -> Option<AuthAction> {
		if !err.is_unauthorized() {
			return None;
		}
		let action = self.decide(view);
		if let AuthAction::ForceLogout { .. } = action {
			api.set_token(None);
			if let Err(e) = store.clear() {
				warn!(error = %e, "failed to clear session after 401");
			}
		}
		Some(action)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn registration_defaults_follow_role() {
		let s = RegistrationForm::startup("a@b.co", "pw", "Acme");
		assert_eq!(s.role(), Role::Startup);
		match &s.details {
			RegistrationDetails::Startup { status, funding_stage, .. } => {
				assert_eq!(status, "idea");
				assert_eq!(funding_stage, "bootstrapped");
			}
			other => panic!("unexpected details: {other:?}"),
		}
		let i = RegistrationForm::incubator("a@b.co", "pw", "Hub");
		assert_eq!(i.role(), Role::Incubator);
	}

	#[test]
	fn registration_requires_core_fields() {
		assert!(RegistrationForm::startup("", "pw", "Acme").validate().is_err());
		assert!(RegistrationForm::startup("a@b.co", "", "Acme").validate().is_err());
		assert!(RegistrationForm::startup("a@b.co", "pw", "  ").validate().is_err());
		assert!(RegistrationForm::startup("a@b.co", "pw", "Acme").validate().is_ok());
	}

	#[test]
	fn unauthorized_policy_spares_profile_pages() {
		let p = UnauthorizedPolicy;
		assert_eq!(p.decide(&View::Profile), AuthAction::Ignore);
		assert_eq!(
			p.decide(&View::Login),
			AuthAction::ForceLogout {
				redirect_to_login: false
			}
		);
		assert_eq!(
			p.decide(&View::Chat),
			AuthAction::ForceLogout {
				redirect_to_login: true
			}
		);
	}

	#[test]
	fn inactive_status_is_case_insensitive() {
		let s = AccountStatus {
			status: Some("Inactive".into()),
			..Default::default()
		};
		assert!(s.is_inactive());
		assert!(!AccountStatus::default().is_inactive());
	}
}
