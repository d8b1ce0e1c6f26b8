use ahash::AHashSet;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{ChatService, Error, Result};

const MAX_QUERY_TERMS: usize = 16;
const MARK_OPEN: &str = "<mark>";
const MARK_CLOSE: &str = "</mark>";

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
	pub number: i64,
	pub body: String,
	/// Body with matched words wrapped in `<mark>` tags, absent when no word matched literally.
	pub highlight: Option<String>,
	#[serde(with = "crate::rfc3339")]
	pub created_at: OffsetDateTime,
	pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
	pub query: String,
	pub total: usize,
	pub results: Vec<SearchHit>,
}

impl ChatService {
	pub async fn search(
		&self,
		token: &str,
		chat_number: i64,
		query: &str,
	) -> Result<SearchResponse> {
		validate_query(query)?;

		let app = self.resolve_application(token).await?;
		let chat = self.resolve_chat(&app, chat_number).await?;

		self.search_chat(chat.chat_id, query).await
	}

	/// Ranks messages of `chat_id` against `query`.
	///
	/// The index answers across every chat. The top `search.max_results` hits are fetched and
	/// those belonging to other chats are dropped, so a chat can receive fewer results than
	/// exist for it.
	pub async fn search_chat(&self, chat_id: Uuid, query: &str) -> Result<SearchResponse> {
		let query = validate_query(query)?;
		let hits = self
			.index
			.query(query, u64::from(self.cfg.search.max_results))
			.await
			.map_err(|err| Error::SearchUnavailable { message: err.to_string() })?;
		let terms = tokenize_query(query, MAX_QUERY_TERMS);
		let results = hits
			.into_iter()
			.filter(|hit| hit.document.chat_id == chat_id)
			.map(|hit| SearchHit {
				number: hit.document.number,
				highlight: highlight(&hit.document.body, &terms),
				body: hit.document.body,
				created_at: hit.document.created_at,
				score: hit.score,
			})
			.collect::<Vec<_>>();

		Ok(SearchResponse { query: query.to_string(), total: results.len(), results })
	}
}

fn validate_query(query: &str) -> Result<&str> {
	let query = query.trim();

	if query.is_empty() {
		return Err(Error::InvalidQuery { message: "Query must not be empty.".to_string() });
	}

	Ok(query)
}

fn tokenize_query(query: &str, max_terms: usize) -> Vec<String> {
	let mut out = Vec::new();
	let mut seen = AHashSet::new();

	for token in query.split(|ch: char| !ch.is_alphanumeric()) {
		if token.is_empty() {
			continue;
		}

		let token = token.to_lowercase();

		if seen.insert(token.clone()) {
			out.push(token);
		}
		if out.len() >= max_terms {
			break;
		}
	}

	out
}

/// Wraps every word of `text` that starts with a query term. Returns `None` when nothing matched.
fn highlight(text: &str, terms: &[String]) -> Option<String> {
	if terms.is_empty() {
		return None;
	}

	let mut out = String::with_capacity(text.len() + 16);
	let mut matched = false;
	let mut word_start = None;

	for (idx, ch) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
		if ch.is_alphanumeric() && idx < text.len() {
			if word_start.is_none() {
				word_start = Some(idx);
			}

			continue;
		}
		if let Some(start) = word_start.take() {
			let word = &text[start..idx];
			let lowered = word.to_lowercase();

			if terms.iter().any(|term| lowered.starts_with(term.as_str())) {
				matched = true;

				out.push_str(MARK_OPEN);
				out.push_str(word);
				out.push_str(MARK_CLOSE);
			} else {
				out.push_str(word);
			}
		}
		if idx < text.len() {
			out.push(ch);
		}
	}

	matched.then_some(out)
}
