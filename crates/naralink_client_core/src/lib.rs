#![forbid(unsafe_code)]

//! Naralink client core: session, HTTP API, real-time chat and the
//! conversation state that sits on top of them.

pub mod api;
pub mod auth;
pub mod channel;
pub mod chat;
pub mod config;
pub mod conversation;
mod error;
pub mod feed;
pub mod identity;
pub mod profile;
pub mod reconnect;
pub mod recent;
pub mod search;
pub mod session;
mod unread;

pub use api::{HttpApi, NetworkApi};
pub use channel::{ChannelAdapter, ChannelEvent, RealtimeConnector, WsConnector};
pub use chat::{ChatSession, ChatUpdate};
pub use config::ClientConfig;
pub use conversation::{ConversationController, Effect, InboundRoute, Phase, SendRejected};
pub use error::{ClientCoreError, SecretString};
pub use identity::{IdentityResolver, ResolveError};
pub use session::{SessionContext, SessionStore};
pub use unread::UnreadCounter;

/// Default `RUST_LOG` filter for binaries built on this crate.
pub const DEFAULT_LOG_FILTER: &str = "info,naralink_client_core=debug";

/// Install the fmt subscriber, honoring `RUST_LOG`.
pub fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}
