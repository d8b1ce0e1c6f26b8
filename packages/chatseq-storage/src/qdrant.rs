pub const BM25_VECTOR_NAME: &str = "bm25";
pub const BM25_MODEL: &str = "qdrant/bm25";

use std::collections::HashMap;

use qdrant_client::{
	Payload,
	qdrant::{
		CreateCollectionBuilder, Document, Modifier, PointStruct, QueryPointsBuilder,
		SparseVectorParamsBuilder, SparseVectorsConfigBuilder, UpsertPointsBuilder, Value,
		Vector, point_id::PointIdOptions, value::Kind,
	},
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::{Error, Result, models::Message};

/// The searchable projection of a message. Carries the owning chat so results can be scoped
/// without a trip back to Postgres.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDocument {
	pub message_id: Uuid,
	pub chat_id: Uuid,
	pub number: i64,
	pub body: String,
	pub created_at: OffsetDateTime,
}
impl From<&Message> for MessageDocument {
	fn from(message: &Message) -> Self {
		Self {
			message_id: message.message_id,
			chat_id: message.chat_id,
			number: message.number,
			body: message.body.clone(),
			created_at: message.created_at,
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
	pub document: MessageDocument,
	pub score: f32,
}

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
}
impl QdrantStore {
	pub fn new(cfg: &chatseq_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone() })
	}

	/// Creates the message collection when it is missing. Returns whether it was created.
	pub async fn ensure_collection(&self) -> Result<bool> {
		if self.client.collection_exists(self.collection.clone()).await? {
			return Ok(false);
		}

		let mut sparse_vectors_config = SparseVectorsConfigBuilder::default();

		sparse_vectors_config.add_named_vector_params(
			BM25_VECTOR_NAME,
			SparseVectorParamsBuilder::default().modifier(Modifier::Idf as i32),
		);

		let builder = CreateCollectionBuilder::new(self.collection.clone())
			.sparse_vectors_config(sparse_vectors_config);

		self.client.create_collection(builder).await?;

		Ok(true)
	}

	/// Writes the document under a point id derived from the message id, so repeated delivery
	/// replaces the point instead of adding another.
	pub async fn upsert_message(&self, doc: &MessageDocument) -> Result<()> {
		let created_at = doc.created_at.format(&Rfc3339).map_err(|_| {
			Error::InvalidArgument(format!(
				"Message {} has an unformattable created_at.",
				doc.message_id
			))
		})?;
		let mut payload_map = HashMap::new();

		payload_map.insert("message_id".to_string(), Value::from(doc.message_id.to_string()));
		payload_map.insert("chat_id".to_string(), Value::from(doc.chat_id.to_string()));
		payload_map.insert("number".to_string(), Value::from(doc.number));
		payload_map.insert("body".to_string(), Value::from(doc.body.clone()));
		payload_map.insert("created_at".to_string(), Value::from(created_at));

		let mut vector_map = HashMap::new();

		vector_map.insert(
			BM25_VECTOR_NAME.to_string(),
			Vector::from(Document::new(doc.body.clone(), BM25_MODEL)),
		);

		let point =
			PointStruct::new(doc.message_id.to_string(), vector_map, Payload::from(payload_map));
		let upsert = UpsertPointsBuilder::new(self.collection.clone(), vec![point]).wait(true);

		self.client.upsert_points(upsert).await.map_err(|err| self.classify(err))?;

		Ok(())
	}

	/// Ranks the whole collection against `text`. Scoping to a chat is left to the caller.
	pub async fn query_messages(&self, text: &str, limit: u64) -> Result<Vec<ScoredDocument>> {
		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(qdrant_client::qdrant::Query::new_nearest(Document::new(text, BM25_MODEL)))
			.using(BM25_VECTOR_NAME)
			.with_payload(true)
			.limit(limit);
		let response = self.client.query(search).await.map_err(|err| self.classify(err))?;
		let mut out = Vec::with_capacity(response.result.len());

		for point in response.result {
			let Some(document) = decode_document(point.id.as_ref(), &point.payload) else {
				tracing::warn!(
					collection = %self.collection,
					"Skipping search hit with malformed payload."
				);

				continue;
			};

			out.push(ScoredDocument { document, score: point.score });
		}

		Ok(out)
	}

	fn classify(&self, err: qdrant_client::QdrantError) -> Error {
		if is_missing_collection_error(&err) {
			return Error::IndexNotFound(self.collection.clone());
		}

		Error::from(err)
	}
}

fn is_missing_collection_error(err: &qdrant_client::QdrantError) -> bool {
	let message = err.to_string().to_lowercase();

	(message.contains("not found") || message.contains("doesn't exist"))
		&& message.contains("collection")
}

fn decode_document(
	point_id: Option<&qdrant_client::qdrant::PointId>,
	payload: &HashMap<String, Value>,
) -> Option<MessageDocument> {
	let message_id = match point_id.and_then(|id| id.point_id_options.as_ref()) {
		Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(id).ok()?,
		_ => payload_uuid(payload, "message_id")?,
	};

	Some(MessageDocument {
		message_id,
		chat_id: payload_uuid(payload, "chat_id")?,
		number: payload_i64(payload, "number")?,
		body: payload_string(payload, "body")?,
		created_at: OffsetDateTime::parse(&payload_string(payload, "created_at")?, &Rfc3339).ok()?,
	})
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	match &payload.get(key)?.kind {
		Some(Kind::StringValue(text)) => Some(text.clone()),
		_ => None,
	}
}

fn payload_uuid(payload: &HashMap<String, Value>, key: &str) -> Option<Uuid> {
	Uuid::parse_str(&payload_string(payload, key)?).ok()
}

fn payload_i64(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
	match &payload.get(key)?.kind {
		Some(Kind::IntegerValue(value)) => Some(*value),
		Some(Kind::DoubleValue(value)) if value.fract() == 0.0 => Some(*value as i64),
		_ => None,
	}
}
