#![forbid(unsafe_code)]

pub mod endpoint {
	use url::Url;

	/// Parsed REST base URL (`http(s)://host[:port][/path]`).
	#[derive(Debug, Clone, PartialEq, Eq, Hash)]
	pub struct ApiEndpoint {
		url: Url,
	}

	impl ApiEndpoint {
		/// Parse an API base URL. Query strings and fragments are rejected.
		pub fn parse(s: &str) -> Result<Self, String> {
			let url = parse_with_schemes(s, &["http", "https"], "http(s)://host[:port][/path]")?;
			Ok(Self { url })
		}

		/// Base URL without a trailing slash.
		pub fn base(&self) -> &str {
			self.url.as_str().trim_end_matches('/')
		}

		/// Join a relative resource path onto the base.
		pub fn join(&self, path: &str) -> String {
			format!("{}/{}", self.base(), path.trim_start_matches('/'))
		}

		pub fn host(&self) -> &str {
			self.url.host_str().unwrap_or_default()
		}

		pub fn is_tls(&self) -> bool {
			self.url.scheme() == "https"
		}
	}

	/// Parsed real-time channel URL (`ws(s)://host[:port][/path]`).
	#[derive(Debug, Clone, PartialEq, Eq, Hash)]
	pub struct RealtimeEndpoint {
		url: Url,
	}

	impl RealtimeEndpoint {
		pub fn parse(s: &str) -> Result<Self, String> {
			let url = parse_with_schemes(s, &["ws", "wss"], "ws(s)://host[:port][/path]")?;
			Ok(Self { url })
		}

		/// Same origin as the API, with `http`→`ws` / `https`→`wss` and no path.
		pub fn derive_from_api(api: &ApiEndpoint) -> Result<Self, String> {
			let mut url = api.url.clone();
			let scheme = if api.is_tls() { "wss" } else { "ws" };
			url.set_scheme(scheme)
				.map_err(|_| format!("cannot derive realtime endpoint from {}", api.base()))?;
			url.set_path("/");
			url.set_query(None);
			url.set_fragment(None);
			Ok(Self { url })
		}

		pub fn as_str(&self) -> &str {
			self.url.as_str()
		}

		pub fn host(&self) -> &str {
			self.url.host_str().unwrap_or_default()
		}
	}

	fn parse_with_schemes(s: &str, schemes: &[&str], expected: &str) -> Result<Url, String> {
		let s = s.trim();
		if s.is_empty() {
			return Err(format!("endpoint must be non-empty (expected {expected})"));
		}

		let url = Url::parse(s).map_err(|e| format!("invalid endpoint (expected {expected}): {s}: {e}"))?;

		if !schemes.contains(&url.scheme()) {
			return Err(format!("invalid endpoint scheme '{}' (expected {expected}): {s}", url.scheme()));
		}

		match url.host_str() {
			Some(h) if !h.is_empty() => {}
			_ => return Err(format!("invalid endpoint host (expected {expected}): {s}")),
		}

		if url.query().is_some() || url.fragment().is_some() {
			return Err(format!(
				"invalid endpoint (expected {expected} without query/fragment): {s}"
			));
		}

		if url.port() == Some(0) {
			return Err(format!("invalid endpoint port (expected 1..=65535): {s}"));
		}

		Ok(url)
	}

	/// Validate an API base URL.
	pub fn validate_api_endpoint(s: &str) -> Result<(), String> {
		let _ = ApiEndpoint::parse(s)?;
		Ok(())
	}

	/// Validate a real-time channel URL.
	pub fn validate_realtime_endpoint(s: &str) -> Result<(), String> {
		let _ = RealtimeEndpoint::parse(s)?;
		Ok(())
	}

	#[cfg(test)]
	mod tests {
		use super::*;

		#[test]
		fn parses_local_dev_api() {
			let e = ApiEndpoint::parse("http://localhost:5000/api").unwrap();
			assert_eq!(e.base(), "http://localhost:5000/api");
			assert_eq!(e.host(), "localhost");
			assert_eq!(e.join("/chat/recent"), "http://localhost:5000/api/chat/recent");
			assert_eq!(e.join("auth/login"), "http://localhost:5000/api/auth/login");
		}

		#[test]
		fn trailing_slash_is_ignored() {
			let e = ApiEndpoint::parse("https://naralink.example.com/api/").unwrap();
			assert_eq!(e.join("posts"), "https://naralink.example.com/api/posts");
			assert!(e.is_tls());
		}

		#[test]
		fn rejects_wrong_scheme_and_query() {
			assert!(ApiEndpoint::parse("ws://localhost:5000").is_err());
			assert!(ApiEndpoint::parse("http://localhost:5000/api?x=y").is_err());
			assert!(ApiEndpoint::parse("http://localhost:5000/api#frag").is_err());
			assert!(ApiEndpoint::parse("").is_err());
			assert!(ApiEndpoint::parse("localhost:5000").is_err());
		}

		#[test]
		fn rejects_port_zero() {
			assert!(ApiEndpoint::parse("http://127.0.0.1:0/api").is_err());
		}

		#[test]
		fn derives_realtime_origin() {
			let api = ApiEndpoint::parse("http://localhost:5000/api").unwrap();
			let rt = RealtimeEndpoint::derive_from_api(&api).unwrap();
			assert_eq!(rt.as_str(), "ws://localhost:5000/");

			let api = ApiEndpoint::parse("https://naralink.example.com/api").unwrap();
			let rt = RealtimeEndpoint::derive_from_api(&api).unwrap();
			assert_eq!(rt.as_str(), "wss://naralink.example.com/");
		}

		#[test]
		fn parses_bracketed_ipv6_realtime() {
			let rt = RealtimeEndpoint::parse("ws://[::1]:5000").unwrap();
			assert_eq!(rt.host(), "[::1]");
			assert!(validate_realtime_endpoint("http://[::1]:5000").is_err());
		}
	}
}
