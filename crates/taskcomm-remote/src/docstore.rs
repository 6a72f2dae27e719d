//! HTTP client for the document store's REST API.
//!
//! Documents travel in the typed-value encoding, where every field is an
//! object naming its type (`{"stringValue": "x"}`, `{"integerValue": "3"}`,
//! ...).  [`encode_fields`] and [`decode_fields`] convert between that and
//! plain JSON objects.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::document::{Document, DocumentBackend};
use crate::error::{RemoteError, Result};
use crate::query::{Direction, Query};

pub struct DocStoreClient {
    http: HttpClient,
    /// `{base}/projects/{project}/databases/(default)/documents`
    documents_url: String,
    api_key: Option<String>,
}

impl DocStoreClient {
    pub fn new(base_url: &str, project_id: &str, api_key: Option<String>) -> Self {
        Self {
            http: HttpClient::new(),
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                base_url.trim_end_matches('/'),
                project_id
            ),
            api_key,
        }
    }

    fn key_param(&self) -> Vec<(&'static str, String)> {
        self.api_key
            .iter()
            .map(|k| ("key", k.clone()))
            .collect()
    }

    async fn send_json(&self, req: reqwest::RequestBuilder) -> Result<Value> {
        let resp = req.query(&self.key_param()).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(RemoteError::from_response(status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl DocumentBackend for DocStoreClient {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let url = format!("{}/{}/{}", self.documents_url, collection, id);
        let resp = self.http.get(&url).query(&self.key_param()).send().await?;
        let status = resp.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(RemoteError::from_response(status.as_u16(), &body));
        }
        let json: Value = serde_json::from_str(&body)?;
        parse_document(&json).map(Some)
    }

    async fn set(&self, collection: &str, id: &str, fields: Value) -> Result<()> {
        let url = format!("{}/{}/{}", self.documents_url, collection, id);
        let body = json!({ "fields": encode_fields(&fields)? });
        self.send_json(self.http.patch(&url).json(&body)).await?;
        debug!(collection, id, "document written");
        Ok(())
    }

    async fn add(&self, collection: &str, fields: Value) -> Result<String> {
        let url = format!("{}/{}", self.documents_url, collection);
        let body = json!({ "fields": encode_fields(&fields)? });
        let json = self.send_json(self.http.post(&url).json(&body)).await?;
        let doc = parse_document(&json)?;
        debug!(collection, id = %doc.id, "document added");
        Ok(doc.id)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let url = format!("{}:runQuery", self.documents_url);
        let body = json!({ "structuredQuery": structured_query(collection, query) });
        let json = self.send_json(self.http.post(&url).json(&body)).await?;

        let Value::Array(entries) = json else {
            return Err(RemoteError::Malformed("runQuery did not return an array".into()));
        };
        // Entries without a `document` only carry read metadata.
        entries
            .iter()
            .filter_map(|entry| entry.get("document"))
            .map(parse_document)
            .collect()
    }
}

/// Build a `structuredQuery` body from a [`Query`].
fn structured_query(collection: &str, query: &Query) -> Value {
    let mut sq = Map::new();
    sq.insert("from".into(), json!([{ "collectionId": collection }]));

    let filters: Vec<Value> = query
        .filters()
        .iter()
        .map(|(field, value)| {
            json!({
                "fieldFilter": {
                    "field": { "fieldPath": field },
                    "op": "EQUAL",
                    "value": { "stringValue": value },
                }
            })
        })
        .collect();
    match filters.len() {
        0 => {}
        1 => {
            sq.insert("where".into(), filters[0].clone());
        }
        _ => {
            sq.insert(
                "where".into(),
                json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
            );
        }
    }

    if let Some((field, dir)) = query.order_by() {
        let direction = match dir {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        sq.insert(
            "orderBy".into(),
            json!([{ "field": { "fieldPath": field }, "direction": direction }]),
        );
    }
    if let Some(limit) = query.row_limit() {
        sq.insert("limit".into(), json!(limit));
    }
    Value::Object(sq)
}

fn parse_document(json: &Value) -> Result<Document> {
    let name = json
        .get("name")
        .and_then(|n| n.as_str())
        .ok_or_else(|| RemoteError::Malformed("document without name".into()))?;
    let id = name.rsplit('/').next().unwrap_or(name).to_string();

    let fields = match json.get("fields") {
        Some(Value::Object(fields)) => decode_fields(fields)?,
        _ => Value::Object(Map::new()),
    };
    Ok(Document { id, fields })
}

// ---------------------------------------------------------------------------
// Typed-value codec
// ---------------------------------------------------------------------------

/// Encode a plain JSON object as a typed-value field map.
pub fn encode_fields(fields: &Value) -> Result<Value> {
    let Value::Object(map) = fields else {
        return Err(RemoteError::Malformed("document fields must be an object".into()));
    };
    Ok(Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect(),
    ))
}

/// Decode a typed-value field map into a plain JSON object.
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Value> {
    let mut out = Map::new();
    for (k, v) in fields {
        out.insert(k.clone(), decode_value(v)?);
    }
    Ok(Value::Object(out))
}

pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({
            "mapValue": {
                "fields": map
                    .iter()
                    .map(|(k, v)| (k.clone(), encode_value(v)))
                    .collect::<Map<_, _>>()
            }
        }),
    }
}

pub fn decode_value(value: &Value) -> Result<Value> {
    let Some((kind, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return Err(RemoteError::Malformed(format!("untyped value: {value}")));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" | "doubleValue" => Ok(inner.clone()),
        "stringValue" | "timestampValue" | "referenceValue" => Ok(inner.clone()),
        "integerValue" => {
            // Integers arrive as strings to survive 64-bit precision loss.
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed
                .map(Value::from)
                .ok_or_else(|| RemoteError::Malformed(format!("bad integerValue: {inner}")))
        }
        "arrayValue" => {
            let values = match inner.get("values") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(decode_value)
                    .collect::<Result<Vec<_>>>()?,
                _ => Vec::new(),
            };
            Ok(Value::Array(values))
        }
        "mapValue" => match inner.get("fields") {
            Some(Value::Object(fields)) => decode_fields(fields),
            _ => Ok(Value::Object(Map::new())),
        },
        other => Err(RemoteError::Malformed(format!("unsupported value type {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_url() {
        let client = DocStoreClient::new("https://docs.example.com/v1/", "proj", None);
        assert_eq!(
            client.documents_url,
            "https://docs.example.com/v1/projects/proj/databases/(default)/documents"
        );
        assert!(client.key_param().is_empty());
    }

    #[test]
    fn test_encode_profile_fields() {
        let encoded = encode_fields(&json!({
            "name": "Ada",
            "isAdmin": false,
            "createdAt": 1700000000000i64,
            "tags": ["a"],
        }))
        .unwrap();
        assert_eq!(encoded["name"], json!({"stringValue": "Ada"}));
        assert_eq!(encoded["isAdmin"], json!({"booleanValue": false}));
        assert_eq!(encoded["createdAt"], json!({"integerValue": "1700000000000"}));
        assert_eq!(
            encoded["tags"],
            json!({"arrayValue": {"values": [{"stringValue": "a"}]}})
        );
        assert!(encode_fields(&json!("scalar")).is_err());
    }

    #[test]
    fn test_decode_nested_and_timestamp() {
        let raw = json!({
            "name": "projects/p/databases/(default)/documents/users/u1",
            "fields": {
                "address": {"mapValue": {"fields": {"city": {"stringValue": "Oslo"}}}},
                "count": {"integerValue": "7"},
                "seen": {"timestampValue": "2024-01-01T00:00:00Z"},
                "empty": {"arrayValue": {}},
            }
        });
        let doc = parse_document(&raw).unwrap();
        assert_eq!(doc.id, "u1");
        assert_eq!(doc.fields["address"]["city"], "Oslo");
        assert_eq!(doc.fields["count"], 7);
        assert_eq!(doc.fields["seen"], "2024-01-01T00:00:00Z");
        assert_eq!(doc.fields["empty"], json!([]));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(decode_value(&json!({"geoPointValue": {}})).is_err());
        assert!(decode_value(&json!("bare")).is_err());
    }

    #[test]
    fn test_structured_query_shape() {
        let single = structured_query("tasks", &Query::new().eq("instructionId", "i1"));
        assert_eq!(single["from"][0]["collectionId"], "tasks");
        assert_eq!(single["where"]["fieldFilter"]["op"], "EQUAL");

        let multi = structured_query(
            "tasks",
            &Query::new()
                .eq("instructionId", "i1")
                .eq("status", "pending")
                .order("createdAt", Direction::Descending)
                .limit(5),
        );
        assert_eq!(multi["where"]["compositeFilter"]["filters"].as_array().unwrap().len(), 2);
        assert_eq!(multi["orderBy"][0]["direction"], "DESCENDING");
        assert_eq!(multi["limit"], 5);
    }
}
