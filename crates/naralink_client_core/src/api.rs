#![forbid(unsafe_code)]

use async_trait::async_trait;
use naralink_domain::{
	ChatMessage, ConversationSummary, IncubatorDetails, Location, PartnerInfo, Post, PostAuthor, Profile, ProfileDetails,
	Role, RoomKey, SearchHit, SessionIdentity, Slug, Socials, StableId, StartupDetails,
};
use naralink_protocol::{WireMessage, WireTimestamp};
use naralink_util::endpoint::ApiEndpoint;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::auth::{AccountStatus, AuthResponse, RegistrationDetails, RegistrationForm};
use crate::feed::PostDraft;
use crate::profile::{ProfilePage, ProfileUpdate};
use crate::config::CLIENT_INSTANCE_HEADER;
use crate::{ClientConfig, ClientCoreError, SecretString};

/// Request/response API of the Naralink backend.
#[async_trait]
pub trait NetworkApi: Send + Sync {
	/// Replace the bearer token attached to subsequent requests.
	fn set_token(&self, token: Option<SecretString>);

	async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientCoreError>;

	async fn register(&self, form: &RegistrationForm) -> Result<AuthResponse, ClientCoreError>;

	async fn auth_status(&self) -> Result<AccountStatus, ClientCoreError>;

	/// Profile page by slug. The profile carries the stable id.
	async fn profile(&self, slug: &Slug) -> Result<ProfilePage, ClientCoreError>;

	async fn search_profiles(&self, query: &str) -> Result<Vec<SearchHit>, ClientCoreError>;

	async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ClientCoreError>;

	async fn feed(&self) -> Result<Vec<Post>, ClientCoreError>;

	async fn create_post(&self, draft: &PostDraft) -> Result<(), ClientCoreError>;

	/// Conversation history, oldest first.
	async fn history(&self, room: &RoomKey) -> Result<Vec<ChatMessage>, ClientCoreError>;

	/// Recent conversations, most recent first.
	async fn recent_conversations(&self) -> Result<Vec<ConversationSummary>, ClientCoreError>;
}

/// `reqwest`-backed implementation.
#[derive(Debug)]
pub struct HttpApi {
	endpoint: ApiEndpoint,
	client: reqwest::Client,
	token: RwLock<Option<SecretString>>,
}

impl HttpApi {
	pub fn new(cfg: &ClientConfig) -> Result<Self, ClientCoreError> {
		let endpoint = cfg.api_endpoint()?;
		let mut headers = HeaderMap::new();
		let instance = HeaderValue::from_str(&cfg.client_instance_id)
			.map_err(|e| ClientCoreError::Config(format!("invalid client instance id: {e}")))?;
		headers.insert(CLIENT_INSTANCE_HEADER, instance);
		let client = reqwest::Client::builder()
			.timeout(cfg.request_timeout)
			.user_agent(cfg.client_name.clone())
			.default_headers(headers)
			.build()
			.map_err(|e| ClientCoreError::Config(format!("build http client: {e}")))?;
		Ok(Self {
			endpoint,
			client,
			token: RwLock::new(None),
		})
	}

	fn request(&self, method: Method, path: &str) -> RequestBuilder {
		let mut rb = self.client.request(method, self.endpoint.join(path));
		if let Some(token) = self.token.read().as_ref().filter(|t| !t.is_empty()) {
			rb = rb
				.header("Authorization", format!("Bearer {}", token.expose().trim()))
				.header("x-auth-token", token.expose().trim());
		}
		rb
	}

	async fn send_json<T: DeserializeOwned>(&self, rb: RequestBuilder, what: &str) -> Result<T, ClientCoreError> {
		let resp = rb
			.send()
			.await
			.map_err(|e| ClientCoreError::Http(format!("{what}: {e}")))?;

		let status = resp.status();
		if status == StatusCode::UNAUTHORIZED {
			return Err(ClientCoreError::Unauthorized);
		}
		if status == StatusCode::NOT_FOUND {
			return Err(ClientCoreError::NotFound(what.to_string()));
		}
		if !status.is_success() {
			let body = resp.text().await.unwrap_or_default();
			return Err(api_error(status, &body, what));
		}

		resp.json::<T>()
			.await
			.map_err(|e| ClientCoreError::Protocol(format!("parse {what} response: {e}")))
	}
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
	message: Option<String>,
	error: Option<String>,
}

fn api_error(status: StatusCode, body: &str, what: &str) -> ClientCoreError {
	let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
	let message = parsed
		.message
		.or(parsed.error)
		.filter(|m| !m.trim().is_empty())
		.unwrap_or_else(|| format!("{what} failed: status={status}"));
	ClientCoreError::Api {
		status: status.as_u16(),
		message,
	}
}

#[async_trait]
impl NetworkApi for HttpApi {
	fn set_token(&self, token: Option<SecretString>) {
		*self.token.write() = token;
	}

	async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientCoreError> {
		let rb = self
			.request(Method::POST, "auth/login")
			.json(&json!({ "email": email, "password": password }));
		let resp: WireAuthResponse = self.send_json(rb, "login").await?;
		resp.into_auth_response()
	}

	async fn register(&self, form: &RegistrationForm) -> Result<AuthResponse, ClientCoreError> {
		let rb = self.request(Method::POST, "auth/register").json(&registration_body(form));
		let resp: WireAuthResponse = self.send_json(rb, "register").await?;
		resp.into_auth_response()
	}

	async fn auth_status(&self) -> Result<AccountStatus, ClientCoreError> {
		let resp: WireStatus = self.send_json(self.request(Method::GET, "auth/status"), "auth status").await?;
		Ok(AccountStatus {
			role: resp.role.and_then(|r| r.parse().ok()),
			last_post_date: resp.last_post_date.and_then(|t| t.to_utc()),
			status: resp.status,
		})
	}

	async fn profile(&self, slug: &Slug) -> Result<ProfilePage, ClientCoreError> {
		let path = format!("profiles/{}", urlencoding::encode(slug.as_str()));
		let resp: WireProfileResponse = self.send_json(self.request(Method::GET, &path), "profile").await?;
		let role_hint = resp.role.as_deref().and_then(|r| r.parse::<Role>().ok());
		let profile = resp.profile.into_profile(role_hint)?;
		let posts = resp.posts.into_iter().map(WirePost::into_post).collect();
		Ok(ProfilePage { profile, posts })
	}

	async fn search_profiles(&self, query: &str) -> Result<Vec<SearchHit>, ClientCoreError> {
		let path = format!("profiles/search?query={}", urlencoding::encode(query));
		let resp: WireSearchResponse = self.send_json(self.request(Method::GET, &path), "search").await?;
		Ok(resp
			.results
			.into_iter()
			.filter_map(|h| match h.into_hit() {
				Ok(hit) => Some(hit),
				Err(e) => {
					debug!(error = %e, "skipping malformed search hit");
					None
				}
			})
			.collect())
	}

	async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ClientCoreError> {
		let rb = self.request(Method::PUT, "profiles/update").json(&update_body(update));
		let resp: WireUpdateResponse = self.send_json(rb, "profile update").await?;
		match (resp.success, resp.profile) {
			(true, Some(p)) => p.into_profile(None),
			_ => Err(ClientCoreError::Api {
				status: 200,
				message: "Update failed.".into(),
			}),
		}
	}

	async fn feed(&self) -> Result<Vec<Post>, ClientCoreError> {
		let resp: WireFeedResponse = self.send_json(self.request(Method::GET, "myfeed/feed"), "feed").await?;
		Ok(resp.data.into_iter().map(WirePost::into_post).collect())
	}

	async fn create_post(&self, draft: &PostDraft) -> Result<(), ClientCoreError> {
		let body = json!({
			"content": draft.content,
			"image": draft.image.as_ref().map(|i| i.to_data_url()),
		});
		let rb = self.request(Method::POST, "posts").json(&body);
		let _: serde_json::Value = self.send_json(rb, "create post").await?;
		Ok(())
	}

	async fn history(&self, room: &RoomKey) -> Result<Vec<ChatMessage>, ClientCoreError> {
		let path = format!("chat/{}", urlencoding::encode(room.as_str()));
		let wire: Vec<WireMessage> = self.send_json(self.request(Method::GET, &path), "chat history").await?;
		Ok(wire
			.into_iter()
			.filter_map(|m| match m.into_chat_message() {
				Ok(msg) => Some(msg),
				Err(e) => {
					debug!(room = %room, error = %e, "skipping malformed history entry");
					None
				}
			})
			.collect())
	}

	async fn recent_conversations(&self) -> Result<Vec<ConversationSummary>, ClientCoreError> {
		let wire: Vec<WireRecent> = self.send_json(self.request(Method::GET, "chat/recent"), "recent chats").await?;
		Ok(wire
			.into_iter()
			.filter_map(|r| match r.into_summary() {
				Ok(s) => Some(s),
				Err(e) => {
					debug!(error = %e, "skipping malformed recent conversation");
					None
				}
			})
			.collect())
	}
}

fn registration_body(form: &RegistrationForm) -> serde_json::Value {
	let mut body = json!({
		"role": form.role().as_str(),
		"email": form.email.trim(),
		"password": form.password.expose(),
		"name": form.name.trim(),
		"website_url": form.website_url,
		"logo": form.logo,
		"city": form.city,
		"state": form.state,
		"country": form.country,
	});

	let extra = match &form.details {
		RegistrationDetails::Startup {
			tagline,
			detailed_description,
			status,
			primary_industry,
			funding_stage,
			seeking_incubation,
		} => json!({
			"tagline": tagline,
			"detailed_description": detailed_description,
			"status": status,
			"primary_industry": primary_industry,
			"funding_stage": funding_stage,
			"seeking_incubation": seeking_incubation,
		}),
		RegistrationDetails::Incubator {
			organization_type,
			mentorship_offered,
			office_space,
			startups_funded,
		} => json!({
			"organization_type": organization_type,
			"mentorship_offered": mentorship_offered,
			"office_space": office_space,
			"startups_funded": startups_funded,
		}),
	};

	if let (Some(body), serde_json::Value::Object(extra)) = (body.as_object_mut(), extra) {
		body.extend(extra);
	}
	body
}

fn update_body(u: &ProfileUpdate) -> serde_json::Value {
	json!({
		"name": u.name.trim(),
		"tagline": u.tagline,
		"target_market": u.target_market,
		"primary_industry": u.primary_industry,
		"product_stage": u.product_stage,
		"organization_type": u.organization_type,
		"equity_taken_percentage": u.equity_taken_percentage,
		"city": u.city,
		"country": u.country,
		"contact_email": u.contact_email,
		"contact_phone": u.contact_phone,
		"website_url": u.website_url,
		"linkedin_url": u.linkedin_url,
		"detailed_description": u.detailed_description,
		"logo": u.logo,
	})
}

fn non_empty(v: Option<String>) -> Option<String> {
	v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
struct WireAuthResponse {
	token: String,
	user: WireAuthUser,
}

#[derive(Debug, Deserialize)]
struct WireAuthUser {
	#[serde(rename = "profileId")]
	profile_id: String,
	#[serde(rename = "profileSlug", default)]
	profile_slug: Option<String>,
	role: String,
}

impl WireAuthResponse {
	fn into_auth_response(self) -> Result<AuthResponse, ClientCoreError> {
		if self.token.trim().is_empty() {
			return Err(ClientCoreError::Protocol("auth response without token".into()));
		}
		let slug = self
			.user
			.profile_slug
			.ok_or_else(|| ClientCoreError::Protocol("auth response without profile slug".into()))?;
		Ok(AuthResponse {
			token: SecretString::new(self.token.trim()),
			identity: SessionIdentity {
				id: StableId::new(self.user.profile_id)?,
				slug: Slug::new(slug)?,
				role: self.user.role.parse()?,
			},
		})
	}
}

#[derive(Debug, Deserialize)]
struct WireStatus {
	role: Option<String>,
	#[serde(rename = "lastPostDate", default)]
	last_post_date: Option<WireTimestamp>,
	status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireProfileResponse {
	profile: WireProfile,
	role: Option<String>,
	#[serde(default)]
	posts: Vec<WirePost>,
}

#[derive(Debug, Default, Deserialize)]
struct WireLocation {
	city: Option<String>,
	state: Option<String>,
	country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireSocials {
	linkedin_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireIndustry {
	primary: Option<String>,
	target_market: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireStage {
	stage: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireProgram {
	equity_taken_percentage: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct WireTrackRecord {
	number_of_startups_supported: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireProfile {
	#[serde(rename = "_id")]
	id: String,
	slug: Option<String>,
	#[serde(default)]
	name: String,
	role: Option<String>,
	logo_url: Option<String>,
	tagline: Option<String>,
	description: Option<String>,
	detailed_description: Option<String>,
	website_url: Option<String>,
	contact_email: Option<String>,
	contact_phone: Option<String>,
	#[serde(default)]
	location: Option<WireLocation>,
	#[serde(default)]
	socials: Option<WireSocials>,
	#[serde(default)]
	industry: Option<WireIndustry>,
	#[serde(default)]
	product: Option<WireStage>,
	#[serde(default)]
	funding: Option<WireStage>,
	seeking_incubation: Option<bool>,
	organization_type: Option<String>,
	#[serde(rename = "programDetails", default)]
	program_details: Option<WireProgram>,
	#[serde(rename = "trackRecord", default)]
	track_record: Option<WireTrackRecord>,
	mentorship_offered: Option<bool>,
	office_space: Option<bool>,
}

impl WireProfile {
	fn into_profile(self, role_hint: Option<Role>) -> Result<Profile, ClientCoreError> {
		let role = role_hint
			.or_else(|| self.role.as_deref().and_then(|r| r.parse().ok()))
			.unwrap_or(if self.organization_type.is_some() {
				Role::Incubator
			} else {
				Role::Startup
			});

		let id = StableId::new(self.id)?;
		let slug = match non_empty(self.slug) {
			Some(s) => Slug::new(s)?,
			None => Slug::new(id.as_str())?,
		};

		let industry = self.industry.unwrap_or_default();
		let details = match role {
			Role::Startup => ProfileDetails::Startup(StartupDetails {
				tagline: non_empty(self.tagline),
				primary_industry: non_empty(industry.primary),
				target_market: non_empty(industry.target_market),
				product_stage: non_empty(self.product.unwrap_or_default().stage),
				funding_stage: non_empty(self.funding.unwrap_or_default().stage),
				seeking_incubation: self.seeking_incubation.unwrap_or(false),
			}),
			Role::Incubator => ProfileDetails::Incubator(IncubatorDetails {
				organization_type: non_empty(self.organization_type),
				equity_taken_percentage: self.program_details.unwrap_or_default().equity_taken_percentage,
				startups_funded: self.track_record.unwrap_or_default().number_of_startups_supported,
				mentorship_offered: self.mentorship_offered.unwrap_or(false),
				office_space: self.office_space.unwrap_or(false),
			}),
		};

		let location = self.location.unwrap_or_default();
		Ok(Profile {
			id,
			slug,
			name: self.name,
			logo_url: non_empty(self.logo_url),
			description: non_empty(self.detailed_description).or(non_empty(self.description)),
			website_url: non_empty(self.website_url),
			contact_email: non_empty(self.contact_email),
			contact_phone: non_empty(self.contact_phone),
			location: Location {
				city: non_empty(location.city),
				state: non_empty(location.state),
				country: non_empty(location.country),
			},
			socials: Socials {
				linkedin_url: non_empty(self.socials.unwrap_or_default().linkedin_url),
			},
			details,
		})
	}
}

#[derive(Debug, Deserialize)]
struct WireSearchResponse {
	#[serde(default)]
	results: Vec<WireSearchHit>,
}

#[derive(Debug, Deserialize)]
struct WireSearchHit {
	#[serde(rename = "_id")]
	id: String,
	slug: Option<String>,
	#[serde(default)]
	name: String,
	role: String,
	logo_url: Option<String>,
	#[serde(default)]
	location: Option<WireLocation>,
	website_url: Option<String>,
}

impl WireSearchHit {
	fn into_hit(self) -> Result<SearchHit, ClientCoreError> {
		let id = StableId::new(self.id)?;
		let slug = match non_empty(self.slug) {
			Some(s) => Slug::new(s)?,
			None => Slug::new(id.as_str())?,
		};
		Ok(SearchHit {
			id,
			slug,
			name: self.name,
			role: self.role.parse()?,
			logo_url: non_empty(self.logo_url),
			city: non_empty(self.location.unwrap_or_default().city),
			website_url: non_empty(self.website_url),
		})
	}
}

#[derive(Debug, Deserialize)]
struct WireUpdateResponse {
	#[serde(default)]
	success: bool,
	profile: Option<WireProfile>,
}

#[derive(Debug, Deserialize)]
struct WireFeedResponse {
	#[serde(default)]
	data: Vec<WirePost>,
}

#[derive(Debug, Deserialize)]
struct WirePostAuthor {
	slug: Option<String>,
	name: Option<String>,
	logo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePost {
	#[serde(rename = "_id")]
	id: Option<String>,
	startup: Option<WirePostAuthor>,
	#[serde(default)]
	content: String,
	image: Option<String>,
	#[serde(rename = "createdAt", default)]
	created_at: Option<WireTimestamp>,
}

impl WirePost {
	fn into_post(self) -> Post {
		Post {
			id: self.id,
			author: self.startup.map(|a| PostAuthor {
				slug: a.slug.and_then(|s| Slug::new(s).ok()),
				name: non_empty(a.name),
				logo_url: non_empty(a.logo_url),
			}),
			content: self.content,
			image: non_empty(self.image),
			created_at: self.created_at.and_then(|t| t.to_utc()),
		}
	}
}

#[derive(Debug, Deserialize)]
struct WirePartner {
	name: Option<String>,
	slug: Option<String>,
	logo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRecent {
	#[serde(rename = "_id")]
	id: String,
	#[serde(rename = "partnerId")]
	partner_id: String,
	#[serde(rename = "partnerDetails", default)]
	partner_details: Option<WirePartner>,
	#[serde(rename = "lastMessage", default)]
	last_message: Option<String>,
	#[serde(rename = "lastTimestamp", default)]
	last_timestamp: Option<WireTimestamp>,
}

impl WireRecent {
	fn into_summary(self) -> Result<ConversationSummary, ClientCoreError> {
		let partner = self
			.partner_details
			.map(|p| PartnerInfo {
				name: non_empty(p.name),
				slug: p.slug.and_then(|s| Slug::new(s).ok()),
				logo_url: non_empty(p.logo_url),
			})
			.unwrap_or_default();
		Ok(ConversationSummary {
			room: RoomKey::parse(&self.id)?,
			partner_id: StableId::new(self.partner_id)?,
			partner,
			last_message: self.last_message.unwrap_or_default(),
			last_timestamp: self.last_timestamp.and_then(|t| t.to_utc()),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn auth_response_requires_slug() {
		let ok: WireAuthResponse = serde_json::from_str(
			r#"{"token":"t","user":{"profileId":"a1","profileSlug":"acme","role":"startup"}}"#,
		)
		.unwrap();
		let resp = ok.into_auth_response().unwrap();
		assert_eq!(resp.identity.id.as_str(), "a1");
		assert_eq!(resp.identity.slug.as_str(), "acme");

		let missing: WireAuthResponse =
			serde_json::from_str(r#"{"token":"t","user":{"profileId":"a1","role":"startup"}}"#).unwrap();
		assert!(matches!(missing.into_auth_response(), Err(ClientCoreError::Protocol(_))));
	}

	#[test]
	fn error_body_message_or_error() {
		let e = api_error(StatusCode::BAD_REQUEST, r#"{"message":"Weekly limit reached"}"#, "create post");
		assert_eq!(e.to_string(), "Weekly limit reached");
		let e = api_error(StatusCode::BAD_REQUEST, r#"{"error":"Update failed"}"#, "profile update");
		assert_eq!(e.to_string(), "Update failed");
		let e = api_error(StatusCode::INTERNAL_SERVER_ERROR, "<html>", "feed");
		assert!(matches!(e, ClientCoreError::Api { status: 500, .. }));
	}

	#[test]
	fn nested_profile_document_is_flattened() {
		let raw = r#"{
			"_id": "x9", "slug": "acme", "name": "Acme",
			"industry": {"primary": "Fintech", "target_market": "B2B"},
			"product": {"stage": "mvp"},
			"funding": {"stage": "seed"},
			"location": {"city": "Lisbon", "country": "PT"},
			"socials": {"linkedin_url": "https://linkedin.com/company/acme"},
			"detailed_description": "Long bio"
		}"#;
		let wire: WireProfile = serde_json::from_str(raw).unwrap();
		let p = wire.into_profile(Some(Role::Startup)).unwrap();
		assert_eq!(p.id.as_str(), "x9");
		assert_eq!(p.location.city.as_deref(), Some("Lisbon"));
		assert_eq!(p.description.as_deref(), Some("Long bio"));
		match p.details {
			ProfileDetails::Startup(s) => {
				assert_eq!(s.primary_industry.as_deref(), Some("Fintech"));
				assert_eq!(s.product_stage.as_deref(), Some("mvp"));
			}
			other => panic!("unexpected details: {other:?}"),
		}
	}

	#[test]
	fn incubator_inferred_from_organization_type() {
		let raw = r#"{"_id":"i1","name":"Hub","organization_type":"accelerator","programDetails":{"equity_taken_percentage":6}}"#;
		let p = serde_json::from_str::<WireProfile>(raw).unwrap().into_profile(None).unwrap();
		assert_eq!(p.role(), Role::Incubator);
		assert_eq!(p.slug.as_str(), "i1");
	}

	#[test]
	fn recent_rows_convert() {
		let raw = r#"[{"_id":"a1_b2","partnerId":"b2","partnerDetails":{"name":"Beta","logo_url":""},"lastMessage":"hi","lastTimestamp":"2024-05-01T12:00:00Z"}]"#;
		let rows: Vec<WireRecent> = serde_json::from_str(raw).unwrap();
		let s = rows.into_iter().next().unwrap().into_summary().unwrap();
		assert_eq!(s.room.as_str(), "a1_b2");
		assert_eq!(s.partner.display_name(), "Beta");
		assert_eq!(s.partner.logo_url, None);
		assert!(s.last_timestamp.is_some());
	}

	#[test]
	fn registration_body_merges_role_fields() {
		let form = RegistrationForm::incubator("hub@x.io", "pw", "Hub");
		let body = registration_body(&form);
		assert_eq!(body["role"], "incubator");
		assert_eq!(body["organization_type"], "incubator");
		assert!(body.get("funding_stage").is_none());
	}
}
