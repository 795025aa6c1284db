//! Per-partition network privacy enforcement.
//!
//! Three enforcement points run against every request on a configured
//! partition: outgoing cookie-header stripping, tracker-host admission, and
//! incoming set-cookie stripping. Each point is a total function returning a
//! verdict, and the host-facing hooks resolve a consumed-once
//! [`Continuation`] with that verdict; the type system rules out both
//! double resolution (`resolve` takes `self`) and non-resolution (the
//! verdict functions cannot fail to return).

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::debug;
use url::Url;

use crate::state::StateStore;

/// Hosts whose requests are cancelled outright when tracker blocking is on.
/// Matching is exact or strict dot-bounded subdomain, case-insensitive.
pub const TRACKER_HOSTS: [&str; 7] = [
	"doubleclick.net",
	"google-analytics.com",
	"googletagmanager.com",
	"facebook.net",
	"adservice.google.com",
	"taboola.com",
	"outbrain.com",
];

/// Request/response headers as ordered name/value pairs.
pub type HeaderList = Vec<(String, String)>;

/// The slice of an in-flight request the enforcement points look at.
#[derive(Debug, Clone)]
pub struct RequestInfo {
	pub url: String,
	/// The referring header: `Referer`, falling back to `Origin`.
	pub referrer: Option<String>,
}

impl RequestInfo {
	/// Builds request info from a URL and its outgoing headers, pulling the
	/// referring header out of the header list.
	pub fn from_headers(url: impl Into<String>, headers: &HeaderList) -> Self {
		let referrer = header_value(headers, "referer")
			.or_else(|| header_value(headers, "origin"))
			.map(str::to_string);
		Self {
			url: url.into(),
			referrer,
		}
	}
}

/// Admission verdict for a request before it reaches the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitVerdict {
	Allow,
	Cancel,
}

/// Single-resolution continuation for an in-flight network hook.
///
/// `resolve` consumes the token, so a hook can answer at most once; the
/// paired receiver observes exactly one verdict per request.
pub struct Continuation<T>(oneshot::Sender<T>);

impl<T> Continuation<T> {
	pub fn channel() -> (Self, oneshot::Receiver<T>) {
		let (tx, rx) = oneshot::channel();
		(Self(tx), rx)
	}

	/// Delivers the verdict. A vanished receiver is the host's problem,
	/// not ours; the send result is deliberately discarded.
	pub fn resolve(self, value: T) {
		let _ = self.0.send(value);
	}
}

/// The per-partition interceptor. Reads the *current* settings at every
/// enforcement point, so toggling a privacy setting takes effect on the
/// next request without reconfiguration.
#[derive(Clone)]
pub struct PrivacyInterceptor {
	store: Arc<StateStore>,
}

impl PrivacyInterceptor {
	pub fn new(store: Arc<StateStore>) -> Self {
		Self { store }
	}

	/// Outgoing-header enforcement: with third-party cookie blocking on,
	/// a third-party request loses its `Cookie` header.
	pub fn filter_request_headers(&self, request: &RequestInfo, mut headers: HeaderList) -> HeaderList {
		if self.store.settings().block_third_party_cookies
			&& is_third_party(&request.url, request.referrer.as_deref())
		{
			debug!(target = "veil", url = %request.url, "stripping outgoing cookie header (third-party)");
			remove_header(&mut headers, "cookie");
		}
		headers
	}

	/// Admission enforcement: with tracker blocking on, requests to a
	/// blocklisted host (or a subdomain of one) are cancelled outright.
	pub fn admit(&self, request: &RequestInfo) -> AdmitVerdict {
		if self.store.settings().block_trackers && is_tracker_url(&request.url) {
			debug!(target = "veil", url = %request.url, "cancelling tracker request");
			return AdmitVerdict::Cancel;
		}
		AdmitVerdict::Allow
	}

	/// Incoming-header enforcement: with third-party cookie blocking on,
	/// a third-party response loses its `Set-Cookie` headers.
	pub fn filter_response_headers(&self, request: &RequestInfo, mut headers: HeaderList) -> HeaderList {
		if self.store.settings().block_third_party_cookies
			&& is_third_party(&request.url, request.referrer.as_deref())
		{
			debug!(target = "veil", url = %request.url, "stripping set-cookie header (third-party)");
			remove_header(&mut headers, "set-cookie");
		}
		headers
	}

	// Host-facing hooks: same verdicts, delivered through a consumed-once
	// continuation so the in-flight request can never hang or double-fire.

	pub fn on_before_send(&self, request: &RequestInfo, headers: HeaderList, done: Continuation<HeaderList>) {
		done.resolve(self.filter_request_headers(request, headers));
	}

	pub fn on_before_request(&self, request: &RequestInfo, done: Continuation<AdmitVerdict>) {
		done.resolve(self.admit(request));
	}

	pub fn on_headers_received(&self, request: &RequestInfo, headers: HeaderList, done: Continuation<HeaderList>) {
		done.resolve(self.filter_response_headers(request, headers));
	}
}

/// True when the target and referring hostnames differ.
///
/// Comparison is hostname-only: same host on a different scheme or port is
/// still same-party. Requests without a referring header, and unparsable
/// URLs on either side, are never classified as third-party.
pub fn is_third_party(target_url: &str, referrer: Option<&str>) -> bool {
	let Some(referrer) = referrer else {
		return false;
	};
	let (Ok(target), Ok(referrer)) = (Url::parse(target_url), Url::parse(referrer)) else {
		return false;
	};
	match (target.host_str(), referrer.host_str()) {
		(Some(a), Some(b)) => !a.eq_ignore_ascii_case(b),
		_ => false,
	}
}

/// True when the URL's hostname equals, or is a strict dot-bounded
/// subdomain of, any blocklisted tracker host.
pub fn is_tracker_url(url: &str) -> bool {
	let Ok(parsed) = Url::parse(url) else {
		return false;
	};
	let Some(host) = parsed.host_str() else {
		return false;
	};
	let host = host.to_ascii_lowercase();
	TRACKER_HOSTS
		.iter()
		.any(|blocked| host == *blocked || host.ends_with(&format!(".{blocked}")))
}

fn header_value<'a>(headers: &'a HeaderList, name: &str) -> Option<&'a str> {
	headers
		.iter()
		.find(|(k, _)| k.eq_ignore_ascii_case(name))
		.map(|(_, v)| v.as_str())
}

fn remove_header(headers: &mut HeaderList, name: &str) {
	headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::state::StateStore;
	use tempfile::TempDir;

	fn interceptor(block_cookies: bool, block_trackers: bool) -> (TempDir, PrivacyInterceptor) {
		let tmp = TempDir::new().unwrap();
		let store = Arc::new(StateStore::open(tmp.path().join("state.json")));
		store.update(|state| {
			state.settings.block_third_party_cookies = block_cookies;
			state.settings.block_trackers = block_trackers;
		});
		(tmp, PrivacyInterceptor::new(store))
	}

	fn headers(pairs: &[(&str, &str)]) -> HeaderList {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn test_third_party_classification() {
		assert!(is_third_party(
			"https://ads.example/pixel",
			Some("https://news.example/story")
		));
		// Same host, different scheme/port: same-party.
		assert!(!is_third_party(
			"http://news.example:8080/api",
			Some("https://news.example/story")
		));
		// No referring header: never third-party.
		assert!(!is_third_party("https://ads.example/pixel", None));
		// Unparsable referrer: never third-party.
		assert!(!is_third_party("https://ads.example/pixel", Some("::")));
	}

	#[test]
	fn test_tracker_matching_is_dot_bounded() {
		assert!(is_tracker_url("https://doubleclick.net/ads"));
		assert!(is_tracker_url("https://sub.doubleclick.net/ads"));
		assert!(!is_tracker_url("https://doubleclick.net.attacker.example/"));
		assert!(!is_tracker_url("https://notdoubleclick.net/"));
		assert!(is_tracker_url("https://SUB.DoubleClick.NET/x"));
	}

	#[test]
	fn test_outgoing_cookie_strip() {
		let (_tmp, interceptor) = interceptor(true, false);
		let request = RequestInfo {
			url: "https://ads.example/pixel".to_string(),
			referrer: Some("https://news.example/story".to_string()),
		};

		let filtered = interceptor.filter_request_headers(
			&request,
			headers(&[("Cookie", "session=1"), ("Accept", "*/*")]),
		);
		assert_eq!(filtered, headers(&[("Accept", "*/*")]));
	}

	#[test]
	fn test_same_party_headers_pass_through() {
		let (_tmp, interceptor) = interceptor(true, false);
		let request = RequestInfo {
			url: "https://news.example/api".to_string(),
			referrer: Some("https://news.example/story".to_string()),
		};

		let sent = headers(&[("Cookie", "session=1")]);
		assert_eq!(
			interceptor.filter_request_headers(&request, sent.clone()),
			sent
		);

		let received = headers(&[("Set-Cookie", "a=1")]);
		assert_eq!(
			interceptor.filter_response_headers(&request, received.clone()),
			received
		);
	}

	#[test]
	fn test_toggle_off_passes_third_party_cookies() {
		let (_tmp, interceptor) = interceptor(false, false);
		let request = RequestInfo {
			url: "https://ads.example/pixel".to_string(),
			referrer: Some("https://news.example/story".to_string()),
		};

		let sent = headers(&[("Cookie", "session=1")]);
		assert_eq!(
			interceptor.filter_request_headers(&request, sent.clone()),
			sent
		);
	}

	#[test]
	fn test_set_cookie_strip() {
		let (_tmp, interceptor) = interceptor(true, false);
		let request = RequestInfo {
			url: "https://ads.example/pixel".to_string(),
			referrer: Some("https://news.example/story".to_string()),
		};

		let filtered = interceptor.filter_response_headers(
			&request,
			headers(&[("Set-Cookie", "track=1"), ("Content-Type", "image/gif")]),
		);
		assert_eq!(filtered, headers(&[("Content-Type", "image/gif")]));
	}

	#[test]
	fn test_tracker_admission() {
		let (_tmp, interceptor) = interceptor(false, true);
		let blocked = RequestInfo {
			url: "https://sub.doubleclick.net/ads".to_string(),
			referrer: None,
		};
		let lookalike = RequestInfo {
			url: "https://doubleclick.net.attacker.example/".to_string(),
			referrer: None,
		};

		assert_eq!(interceptor.admit(&blocked), AdmitVerdict::Cancel);
		assert_eq!(interceptor.admit(&lookalike), AdmitVerdict::Allow);
	}

	#[test]
	fn test_toggle_takes_effect_on_next_request() {
		let (_tmp, interceptor) = interceptor(false, false);
		let request = RequestInfo {
			url: "https://doubleclick.net/ads".to_string(),
			referrer: None,
		};
		assert_eq!(interceptor.admit(&request), AdmitVerdict::Allow);

		interceptor.store.update(|state| state.settings.block_trackers = true);
		assert_eq!(interceptor.admit(&request), AdmitVerdict::Cancel);
	}

	#[tokio::test]
	async fn test_hooks_resolve_exactly_once() {
		let (_tmp, interceptor) = interceptor(false, true);
		let request = RequestInfo {
			url: "https://doubleclick.net/ads".to_string(),
			referrer: None,
		};

		let (done, verdict) = Continuation::channel();
		interceptor.on_before_request(&request, done);
		assert_eq!(verdict.await.unwrap(), AdmitVerdict::Cancel);
	}

	#[test]
	fn test_request_info_referrer_fallback() {
		let with_referer = RequestInfo::from_headers(
			"https://a.example/",
			&headers(&[("Referer", "https://b.example/"), ("Origin", "https://c.example")]),
		);
		assert_eq!(with_referer.referrer.as_deref(), Some("https://b.example/"));

		let origin_only = RequestInfo::from_headers(
			"https://a.example/",
			&headers(&[("Origin", "https://c.example")]),
		);
		assert_eq!(origin_only.referrer.as_deref(), Some("https://c.example"));

		let bare = RequestInfo::from_headers("https://a.example/", &headers(&[]));
		assert_eq!(bare.referrer, None);
	}
}
