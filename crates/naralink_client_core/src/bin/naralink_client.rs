#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;
use naralink_client_core::auth::{self, UnauthorizedPolicy, View};
use naralink_client_core::feed::{self, ImageAttachment, PostDraft};
use naralink_client_core::profile::{self, ProfileView};
use naralink_client_core::search::{self, RoleFilter, SearchFilter};
use naralink_client_core::{
	ChannelAdapter, ChatSession, ChatUpdate, ClientConfig, ClientCoreError, HttpApi, NetworkApi, SessionContext,
	SessionStore, WsConnector, init_tracing,
};
use naralink_domain::{ChatMessage, MessageKey, Slug};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::{info, warn};

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: naralink_client [--api URL] [--realtime URL] <command> [args]\n\
\n\
Commands:\n\
	login --email EMAIL --password PASSWORD\n\
	            Log in and remember the session (password may come from NARALINK_PASSWORD)\n\
	logout      Forget the saved session\n\
	whoami      Show the logged-in account\n\
	search QUERY [--role all|startup|incubator] [--city CITY]\n\
	feed        Show the milestone feed\n\
	post TEXT [--image PATH]\n\
	            Publish a milestone (startups only, once a week)\n\
	profile SLUG\n\
	recent      List recent conversations\n\
	chat SLUG   Open a conversation; type lines to send, /quit to leave\n\
\n\
Options:\n\
	--api       HTTP API base URL (default: config file, NARALINK_API_URL, or http://localhost:5000/api)\n\
	--realtime  Real-time URL (default: derived from the API URL)\n\
	--help      Show this help\n\
\n\
Examples:\n\
	naralink_client login --email founder@acme.io --password hunter2\n\
	naralink_client search fintech --role incubator --city Lisbon\n\
	naralink_client chat acme-labs\n"
	);
	std::process::exit(2)
}

enum Command {
	Login { email: String, password: String },
	Logout,
	Whoami,
	Search { query: String, filter: SearchFilter },
	Feed,
	Post { text: String, image: Option<PathBuf> },
	Profile { slug: Slug },
	Recent,
	Chat { slug: Slug },
}

struct Cli {
	api: Option<String>,
	realtime: Option<String>,
	command: Command,
}

fn non_empty_flag(it: &mut impl Iterator<Item = String>, flag: &str) -> String {
	let v = it.next().unwrap_or_else(|| usage_and_exit());
	if v.trim().is_empty() {
		eprintln!("{flag} must be non-empty");
		usage_and_exit();
	}
	v
}

fn parse_slug(v: Option<&String>) -> Slug {
	let v = v.unwrap_or_else(|| usage_and_exit());
	Slug::new(v.as_str()).unwrap_or_else(|e| {
		eprintln!("Invalid slug {v:?}: {e}");
		usage_and_exit()
	})
}

fn parse_args() -> Cli {
	let mut api = None;
	let mut realtime = None;
	let mut email = None;
	let mut password = None;
	let mut role = RoleFilter::All;
	let mut city = None;
	let mut image = None;
	let mut positional: Vec<String> = Vec::new();

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--api" => api = Some(non_empty_flag(&mut it, "--api")),
			"--realtime" => realtime = Some(non_empty_flag(&mut it, "--realtime")),
			"--email" => email = Some(non_empty_flag(&mut it, "--email")),
			"--password" => password = Some(non_empty_flag(&mut it, "--password")),
			"--role" => {
				let v = non_empty_flag(&mut it, "--role");
				role = v.parse().unwrap_or_else(|_| {
					eprintln!("Invalid --role value: {v}");
					usage_and_exit()
				});
			}
			"--city" => city = Some(non_empty_flag(&mut it, "--city")),
			"--image" => image = Some(PathBuf::from(non_empty_flag(&mut it, "--image"))),
			other if other.starts_with("--") => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
			_ => positional.push(arg),
		}
	}

	let Some((name, rest)) = positional.split_first() else {
		usage_and_exit();
	};

	let command = match name.as_str() {
		"login" => Command::Login {
			email: email.unwrap_or_else(|| usage_and_exit()),
			password: password
				.or_else(|| std::env::var("NARALINK_PASSWORD").ok())
				.unwrap_or_else(|| usage_and_exit()),
		},
		"logout" => Command::Logout,
		"whoami" => Command::Whoami,
		"search" => Command::Search {
			query: rest.join(" "),
			filter: SearchFilter { role, city },
		},
		"feed" => Command::Feed,
		"post" => {
			if rest.is_empty() {
				usage_and_exit();
			}
			Command::Post {
				text: rest.join(" "),
				image,
			}
		}
		"profile" => Command::Profile {
			slug: parse_slug(rest.first()),
		},
		"recent" => Command::Recent,
		"chat" => Command::Chat {
			slug: parse_slug(rest.first()),
		},
		other => {
			eprintln!("Unknown command: {other}");
			usage_and_exit();
		}
	};

	Cli { api, realtime, command }
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
	let mut cfg = ClientConfig::load().context("load client config")?;
	if let Some(api) = &cli.api {
		cfg = cfg.with_api_base_url(api.as_str()).context("invalid --api")?;
	}
	if let Some(realtime) = &cli.realtime {
		cfg = cfg.with_realtime_url(realtime.as_str());
	}
	cfg.validate().context("invalid client config")?;
	Ok(cfg)
}

fn require_session(api: &dyn NetworkApi, store: &SessionStore) -> anyhow::Result<SessionContext> {
	auth::restore(api, store).context("not logged in (run `naralink_client login` first)")
}

/// Map a 401 to a forced logout and a readable error.
fn session_error(err: ClientCoreError, view: View, api: &dyn NetworkApi, store: &SessionStore) -> anyhow::Error {
	match UnauthorizedPolicy.handle(&err, &view, api, store) {
		Some(_) => anyhow::anyhow!("session expired; log in again"),
		None => anyhow::Error::new(err),
	}
}

fn print_message(ctx: &SessionContext, msg: &ChatMessage) {
	let who = if msg.is_from(ctx.self_id()) {
		"you".to_string()
	} else {
		msg.sender.to_string()
	};
	match msg.timestamp {
		Some(t) => println!("[{}] {who}: {}", t.format("%H:%M"), msg.text),
		None => println!("{who}: {}", msg.text),
	}
}

async fn run_chat(cfg: &ClientConfig, api: Arc<dyn NetworkApi>, ctx: SessionContext, slug: Slug) -> anyhow::Result<()> {
	let connector = Arc::new(WsConnector::new(cfg)?);
	let adapter = ChannelAdapter::new(connector);
	let mut chat = ChatSession::new(ctx.clone(), api, adapter, cfg.auto_reconnect);

	if let Err(e) = chat.connect().await {
		warn!(error = %e, "chat starts offline");
		eprintln!("real-time channel unavailable: {e}");
	}
	chat.open_chat_view();
	chat.select_partner(slug.clone());
	info!(partner = %slug, "chat opened");

	let mut printed: HashSet<MessageKey> = HashSet::new();
	let mut lines = BufReader::new(tokio::io::stdin()).lines();

	loop {
		tokio::select! {
			line = lines.next_line() => {
				let Some(line) = line.context("read stdin")? else {
					break;
				};
				if line.trim() == "/quit" {
					break;
				}
				if let Err(reason) = chat.send(line) {
					eprintln!("not sent: {reason}");
				}
			}
			update = chat.next_update() => {
				let Some(update) = update else {
					eprintln!("channel closed");
					break;
				};
				match update {
					ChatUpdate::MessagesChanged => {
						for msg in chat.messages() {
							if printed.insert(msg.key()) {
								print_message(&ctx, msg);
							}
						}
					}
					ChatUpdate::Unread(n) => eprintln!("({n} unread in other conversations)"),
					ChatUpdate::PhaseChanged(phase) => {
						if let Some(err) = chat.conversation().error() {
							eprintln!("{err}");
						}
						info!(?phase, "conversation phase changed");
					}
					ChatUpdate::Connected => eprintln!("connected"),
					ChatUpdate::Disconnected { reason, retry_in_ms } => match retry_in_ms {
						Some(ms) => eprintln!("disconnected ({reason}); retrying in {ms}ms"),
						None => eprintln!("disconnected ({reason})"),
					},
					ChatUpdate::Reconnecting { attempt, next_retry_in_ms } => {
						eprintln!("reconnect attempt {attempt} failed; retrying in {next_retry_in_ms}ms");
					}
					ChatUpdate::ChannelError(message) => eprintln!("server error: {message}"),
					ChatUpdate::RecentChanged => {}
				}
			}
		}
	}

	chat.shutdown().await;
	Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();
	let cli = parse_args();
	let cfg = load_config(&cli)?;

	let api: Arc<dyn NetworkApi> = Arc::new(HttpApi::new(&cfg)?);
	let store = SessionStore::open_default()?;

	match cli.command {
		Command::Login { email, password } => {
			let ctx = auth::login(api.as_ref(), &store, &email, &password).await?;
			println!("logged in as {} ({})", ctx.identity.slug, ctx.identity.role);
		}
		Command::Logout => {
			if auth::restore(api.as_ref(), &store).is_some() {
				auth::logout(api.as_ref(), &store, None).await?;
			}
			println!("logged out");
		}
		Command::Whoami => {
			let ctx = require_session(api.as_ref(), &store)?;
			let status = api
				.auth_status()
				.await
				.map_err(|e| session_error(e, View::Feed, api.as_ref(), &store))?;
			println!("{} ({})", ctx.identity.slug, ctx.identity.role);
			if let Some(s) = status.status {
				println!("status: {s}");
			}
			if let Some(last) = status.last_post_date {
				println!("last post: {}", last.format("%Y-%m-%d"));
			}
		}
		Command::Search { query, filter } => {
			let hits = search::search(api.as_ref(), &query).await;
			for hit in filter.apply(&hits) {
				let city = hit.city.as_deref().unwrap_or("-");
				println!("{:<24} {:<10} {:<16} {}", hit.slug, hit.role, city, hit.name);
			}
		}
		Command::Feed => {
			require_session(api.as_ref(), &store)?;
			for post in feed::load_feed(api.as_ref()).await {
				let author = post
					.author
					.as_ref()
					.and_then(|a| a.name.as_deref())
					.unwrap_or("unknown");
				let when = post.created_at.map(|t| t.format("%Y-%m-%d").to_string()).unwrap_or_default();
				println!("{when} {author}: {}", post.content);
			}
		}
		Command::Post { text, image } => {
			let ctx = require_session(api.as_ref(), &store)?;
			let mut draft = PostDraft::new(text);
			if let Some(path) = image {
				draft = draft.with_image(ImageAttachment::from_path(&path)?);
			}
			let status = api
				.auth_status()
				.await
				.map_err(|e| session_error(e, View::Feed, api.as_ref(), &store))?;
			feed::publish(api.as_ref(), ctx.identity.role, &status, &draft, Utc::now())
				.await
				.map_err(|e| session_error(e, View::Feed, api.as_ref(), &store))?;
			println!("posted");
		}
		Command::Profile { slug } => match profile::load_profile(api.as_ref(), &slug).await {
			ProfileView::Loaded(page) => {
				let p = &page.profile;
				println!("{} ({}) [{}]", p.name, p.slug, p.role());
				if let Some(d) = &p.description {
					println!("{d}");
				}
				for post in &page.posts {
					println!("- {}", post.content);
				}
			}
			ProfileView::NotFound => {
				println!("profile not found");
			}
		},
		Command::Recent => {
			require_session(api.as_ref(), &store)?;
			let rows = api
				.recent_conversations()
				.await
				.map_err(|e| session_error(e, View::Chat, api.as_ref(), &store))?;
			for row in rows {
				println!("{:<24} {}", row.partner.display_name(), row.last_message);
			}
		}
		Command::Chat { slug } => {
			let ctx = require_session(api.as_ref(), &store)?;
			run_chat(&cfg, api, ctx, slug).await?;
		}
	}

	Ok(())
}
