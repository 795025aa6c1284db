//! Search-term suggestions from the configured search host.
//!
//! A fixed ordered list of endpoints is tried in turn; the first response
//! that is HTTP OK, JSON-typed, and parsable wins. Every failure mode
//! (timeout, bad status, wrong content type, malformed body) skips to the
//! next endpoint, and total failure yields an empty list; callers never
//! see an error.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

/// At most this many suggestions are returned.
pub const MAX_SUGGESTIONS: usize = 8;

const FETCH_TIMEOUT: Duration = Duration::from_secs(4);

pub struct Suggester {
	client: reqwest::Client,
}

impl Default for Suggester {
	fn default() -> Self {
		Self::new()
	}
}

impl Suggester {
	pub fn new() -> Self {
		let client = reqwest::Client::builder()
			.timeout(FETCH_TIMEOUT)
			.build()
			.unwrap_or_default();
		Self { client }
	}

	/// Fetches suggestions for `query` against the search host at `base`.
	/// Blank queries return an empty list without touching the network.
	pub async fn fetch(&self, base: &str, query: &str) -> Vec<String> {
		let query = query.trim();
		if query.is_empty() {
			return Vec::new();
		}

		let base = base.trim_end_matches('/');
		let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
		let endpoints = [
			format!("{base}/autocomplete?q={encoded}&format=json"),
			format!("{base}/autocomplete?q={encoded}"),
			format!("{base}/suggestions?q={encoded}&format=json"),
		];

		for endpoint in &endpoints {
			match self.try_endpoint(endpoint).await {
				Some(suggestions) if !suggestions.is_empty() => return suggestions,
				_ => continue,
			}
		}
		Vec::new()
	}

	async fn try_endpoint(&self, endpoint: &str) -> Option<Vec<String>> {
		let response = self
			.client
			.get(endpoint)
			.header("Accept", "application/json, text/plain, */*")
			.send()
			.await
			.inspect_err(|e| debug!(target = "veil", endpoint, error = %e, "suggestion fetch failed"))
			.ok()?;

		if !response.status().is_success() {
			debug!(target = "veil", endpoint, status = %response.status(), "suggestion endpoint not ok");
			return None;
		}
		let content_type = response
			.headers()
			.get(reqwest::header::CONTENT_TYPE)
			.and_then(|v| v.to_str().ok())
			.unwrap_or_default();
		if !content_type.contains("json") {
			return None;
		}

		let payload: Value = response.json().await.ok()?;
		Some(normalize_suggestions(&payload))
	}
}

/// Flattens the known suggestion payload shapes into a capped string list:
/// OpenSearch-style `[query, [suggestions]]`, a bare array, `{suggestions}`,
/// or `{results}` (strings or objects with `title`/`content`).
pub fn normalize_suggestions(payload: &Value) -> Vec<String> {
	let items: Vec<String> = match payload {
		Value::Array(entries) => match entries.get(1) {
			Some(Value::Array(inner)) => inner.iter().filter_map(as_text).collect(),
			_ => entries.iter().filter_map(as_text).collect(),
		},
		Value::Object(map) => {
			if let Some(Value::Array(suggestions)) = map.get("suggestions") {
				suggestions.iter().filter_map(as_text).collect()
			} else if let Some(Value::Array(results)) = map.get("results") {
				results
					.iter()
					.filter_map(|item| {
						as_text(item).or_else(|| {
							item.get("title")
								.or_else(|| item.get("content"))
								.and_then(as_text)
						})
					})
					.collect()
			} else {
				Vec::new()
			}
		}
		_ => Vec::new(),
	};

	items
		.into_iter()
		.filter(|s| !s.is_empty())
		.take(MAX_SUGGESTIONS)
		.collect()
}

fn as_text(value: &Value) -> Option<String> {
	match value {
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		_ => None,
	}
}
