use std::sync::Arc;

use async_trait::async_trait;
use futures::SinkExt as _;
use futures::channel::mpsc as fmpsc;
use naralink_client_core::auth::{self, AccountStatus, AuthResponse, RegistrationForm, UnauthorizedPolicy, View};
use naralink_client_core::channel::{FrameSink, FrameStream};
use naralink_client_core::feed::PostDraft;
use naralink_client_core::profile::{ProfilePage, ProfileUpdate};
use naralink_client_core::{
	ChannelAdapter, ChatSession, ClientCoreError, NetworkApi, RealtimeConnector, SecretString, SessionStore,
};
use naralink_domain::{
	ChatMessage, ConversationSummary, Post, Profile, Role, RoomKey, SearchHit, SessionIdentity, Slug, StableId,
};
use naralink_protocol::{ClientFrame, ServerFrame};
use parking_lot::Mutex;

/// Accepts one password and tracks the bearer token it was handed.
#[derive(Default)]
struct AuthApi {
	token: Mutex<Option<String>>,
}

fn not_here<T>() -> Result<T, ClientCoreError> {
	Err(ClientCoreError::Other("not used in session tests".into()))
}

#[async_trait]
impl NetworkApi for AuthApi {
	fn set_token(&self, token: Option<SecretString>) {
		*self.token.lock() = token.map(|t| t.expose().to_string());
	}

	async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientCoreError> {
		if password != "correct horse" {
			return Err(ClientCoreError::Api {
				status: 400,
				message: "Invalid credentials".into(),
			});
		}
		Ok(AuthResponse {
			token: SecretString::new(format!("jwt-for-{email}")),
			identity: SessionIdentity {
				id: StableId::new("a1").unwrap(),
				slug: Slug::new("acme-labs").unwrap(),
				role: Role::Startup,
			},
		})
	}

	async fn register(&self, _form: &RegistrationForm) -> Result<AuthResponse, ClientCoreError> {
		not_here()
	}

	async fn auth_status(&self) -> Result<AccountStatus, ClientCoreError> {
		if self.token.lock().is_none() {
			return Err(ClientCoreError::Unauthorized);
		}
		Ok(AccountStatus::default())
	}

	async fn profile(&self, _slug: &Slug) -> Result<ProfilePage, ClientCoreError> {
		not_here()
	}

	async fn search_profiles(&self, _query: &str) -> Result<Vec<SearchHit>, ClientCoreError> {
		not_here()
	}

	async fn update_profile(&self, _update: &ProfileUpdate) -> Result<Profile, ClientCoreError> {
		not_here()
	}

	async fn feed(&self) -> Result<Vec<Post>, ClientCoreError> {
		not_here()
	}

	async fn create_post(&self, _draft: &PostDraft) -> Result<(), ClientCoreError> {
		not_here()
	}

	async fn history(&self, _room: &RoomKey) -> Result<Vec<ChatMessage>, ClientCoreError> {
		Ok(Vec::new())
	}

	async fn recent_conversations(&self) -> Result<Vec<ConversationSummary>, ClientCoreError> {
		Ok(Vec::new())
	}
}

/// Accepts every connection and keeps the server ends open.
#[derive(Default)]
struct QuietServer {
	held: Mutex<Vec<(fmpsc::UnboundedReceiver<ClientFrame>, fmpsc::UnboundedSender<Result<ServerFrame, ClientCoreError>>)>>,
}

#[async_trait]
impl RealtimeConnector for QuietServer {
	async fn connect(&self, _token: &SecretString) -> Result<(FrameSink, FrameStream), ClientCoreError> {
		let (out_tx, out_rx) = fmpsc::unbounded::<ClientFrame>();
		let (in_tx, in_rx) = fmpsc::unbounded();
		self.held.lock().push((out_rx, in_tx));
		Ok((
			Box::pin(out_tx.sink_map_err(|e| ClientCoreError::Io(e.to_string()))),
			Box::pin(in_rx),
		))
	}
}

fn store() -> (tempfile::TempDir, SessionStore) {
	let dir = tempfile::tempdir().unwrap();
	let store = SessionStore::without_keyring(dir.path().join("session.toml"));
	(dir, store)
}

#[tokio::test]
async fn login_persists_and_restores() {
	let api = AuthApi::default();
	let (_dir, store) = store();

	let ctx = auth::login(&api, &store, " founder@acme.io ", "correct horse").await.unwrap();
	assert_eq!(ctx.identity.slug.as_str(), "acme-labs");
	assert_eq!(api.token.lock().as_deref(), Some("jwt-for-founder@acme.io"));

	let api2 = AuthApi::default();
	let restored = auth::restore(&api2, &store).expect("session on disk");
	assert_eq!(restored.identity, ctx.identity);
	assert_eq!(restored.token, ctx.token);
	assert!(api2.auth_status().await.is_ok());

	let on_disk = std::fs::read_to_string(store.path()).unwrap();
	assert!(!on_disk.contains("jwt-for-founder@acme.io"));
}

#[tokio::test]
async fn failed_login_keeps_server_message_and_stores_nothing() {
	let api = AuthApi::default();
	let (_dir, store) = store();

	let err = auth::login(&api, &store, "founder@acme.io", "nope").await.unwrap_err();
	assert_eq!(err.to_string(), "Invalid credentials");
	assert!(store.load().is_none());
	assert!(api.token.lock().is_none());
}

#[tokio::test]
async fn logout_tears_down_chat_and_session() {
	let api = Arc::new(AuthApi::default());
	let (_dir, store) = store();
	let ctx = auth::login(api.as_ref(), &store, "founder@acme.io", "correct horse").await.unwrap();

	let adapter = ChannelAdapter::new(Arc::new(QuietServer::default()));
	let mut chat = ChatSession::new(ctx.clone(), api.clone(), adapter.clone(), false);
	chat.connect().await.unwrap();
	ctx.unread.increment();
	assert!(adapter.is_connected());

	auth::logout(api.as_ref(), &store, Some(chat)).await.unwrap();
	assert!(!adapter.is_connected());
	assert_eq!(adapter.subscriber_count(), 0);
	assert!(store.load().is_none());
	assert!(api.token.lock().is_none());

	// Unread state belongs to the old session only.
	let next = auth::login(api.as_ref(), &store, "founder@acme.io", "correct horse").await.unwrap();
	assert_eq!(next.unread.read(), 0);
}

#[tokio::test]
async fn expired_token_forces_logout_except_on_profiles() {
	let api = AuthApi::default();
	let (_dir, store) = store();
	auth::login(&api, &store, "founder@acme.io", "correct horse").await.unwrap();

	let policy = UnauthorizedPolicy;
	let err = ClientCoreError::Unauthorized;
	assert!(policy.handle(&err, &View::Profile, &api, &store).is_some());
	assert!(store.load().is_some());

	policy.handle(&err, &View::Feed, &api, &store);
	assert!(store.load().is_none());
	assert!(matches!(api.auth_status().await, Err(ClientCoreError::Unauthorized)));

	assert!(policy.handle(&ClientCoreError::NotConnected, &View::Feed, &api, &store).is_none());
}
