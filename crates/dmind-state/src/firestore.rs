/// FIRESTORE REST STORE
///
/// Talks to the Firestore v1 REST API. Document bodies are converted between
/// plain JSON and Firestore's typed value encoding by the pure functions at
/// the bottom of this module.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

use crate::document::{set_field, Direction, Document, Fields, Query};
use crate::error::StoreError;
use crate::store::{require_object, DocumentStore};

#[derive(Debug, Clone)]
pub struct FirestoreSettings {
    pub base_url: String,
    pub project_id: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FirestoreStore {
    client: Client,
    settings: FirestoreSettings,
}

impl FirestoreStore {
    pub fn new(settings: FirestoreSettings) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(FirestoreStore { client, settings })
    }

    fn documents_root(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.project_id
        )
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.documents_root(), collection)
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_root(), collection, id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = match &self.settings.api_key {
            Some(key) => request.query(&[("key", key.as_str())]),
            None => request,
        };
        match &self.settings.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, StoreError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend(format!("Firestore returned {}: {}", status, body)));
        }
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    fn backend(&self) -> &'static str {
        "firestore"
    }

    async fn add(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        require_object(&data)?;
        let body = json!({ "fields": encode_fields(&data) });
        let created = self
            .send(self.client.post(self.collection_url(collection)).json(&body))
            .await?;
        let name = created
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::InvalidDocument("created document has no name".to_string()))?;
        let id = document_id(name).to_string();
        debug!(collection, id = %id, "Firestore document created");
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        require_object(&data)?;
        let body = json!({ "fields": encode_fields(&data) });
        self.send(self.client.patch(self.document_url(collection, id)).json(&body))
            .await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let request = self.authorize(self.client.get(self.document_url(collection, id)));
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend(format!("Firestore returned {}: {}", status, body)));
        }
        let raw: Value = response.json().await?;
        Ok(Some(decode_document(&raw)?))
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let mut params: Vec<(&str, String)> = vec![("currentDocument.exists", "true".to_string())];
        let mut nested = Value::Object(Map::new());
        for (path, value) in fields {
            params.push(("updateMask.fieldPaths", path.clone()));
            set_field(&mut nested, &path, value);
        }
        let body = json!({ "fields": encode_fields(&nested) });

        let request = self
            .authorize(self.client.patch(self.document_url(collection, id)))
            .query(&params)
            .json(&body);
        let response = request.send().await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Backend(format!("Firestore returned {}: {}", s, body)))
            }
        }
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let body = structured_query(collection, query);
        let url = format!("{}:runQuery", self.documents_root());
        let rows = self.send(self.client.post(url).json(&body)).await?;
        let rows = rows
            .as_array()
            .ok_or_else(|| StoreError::InvalidDocument("runQuery response is not an array".to_string()))?;
        rows.iter()
            .filter_map(|row| row.get("document"))
            .map(decode_document)
            .collect()
    }
}

/// Last path segment of a Firestore resource name
pub fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Build a `runQuery` request body
pub fn structured_query(collection: &str, query: &Query) -> Value {
    let mut structured = Map::new();
    structured.insert("from".to_string(), json!([{ "collectionId": collection }]));

    let filters: Vec<Value> = query
        .filters
        .iter()
        .map(|f| {
            json!({
                "fieldFilter": {
                    "field": { "fieldPath": f.field },
                    "op": "EQUAL",
                    "value": encode_value(&f.value),
                }
            })
        })
        .collect();
    match filters.len() {
        0 => {}
        1 => {
            structured.insert("where".to_string(), filters[0].clone());
        }
        _ => {
            structured.insert(
                "where".to_string(),
                json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
            );
        }
    }

    if let Some((field, direction)) = &query.order_by {
        let direction = match direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        structured.insert(
            "orderBy".to_string(),
            json!([{ "field": { "fieldPath": field }, "direction": direction }]),
        );
    }
    if let Some(limit) = query.limit {
        structured.insert("limit".to_string(), json!(limit));
    }

    json!({ "structuredQuery": Value::Object(structured) })
}

/// Plain JSON object to a Firestore `fields` map
pub fn encode_fields(data: &Value) -> Value {
    match data {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect(),
        ),
        _ => Value::Object(Map::new()),
    }
}

pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or(0.0) })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(_) => json!({ "mapValue": { "fields": encode_fields(value) } }),
    }
}

pub fn decode_value(value: &Value) -> Result<Value, StoreError> {
    let obj = value
        .as_object()
        .ok_or_else(|| StoreError::InvalidDocument("typed value must be an object".to_string()))?;
    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| StoreError::InvalidDocument("empty typed value".to_string()))?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => Ok(Value::Bool(inner.as_bool().unwrap_or(false))),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                other => other.as_i64(),
            };
            parsed
                .map(Value::from)
                .ok_or_else(|| StoreError::InvalidDocument(format!("bad integerValue: {}", inner)))
        }
        "doubleValue" => Ok(inner
            .as_f64()
            .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
            .unwrap_or(Value::Null)),
        "stringValue" | "timestampValue" | "referenceValue" => Ok(Value::String(inner.as_str().unwrap_or_default().to_string())),
        "arrayValue" => {
            let values = inner.get("values").and_then(Value::as_array);
            let decoded = match values {
                Some(items) => items.iter().map(decode_value).collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            Ok(Value::Array(decoded))
        }
        "mapValue" => decode_fields(inner.get("fields").unwrap_or(&Value::Null)),
        other => Err(StoreError::InvalidDocument(format!("unsupported value type {}", other))),
    }
}

pub fn decode_fields(fields: &Value) -> Result<Value, StoreError> {
    let mut out = Map::new();
    if let Some(map) = fields.as_object() {
        for (k, v) in map {
            out.insert(k.clone(), decode_value(v)?);
        }
    }
    Ok(Value::Object(out))
}

pub fn decode_document(raw: &Value) -> Result<Document, StoreError> {
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidDocument("document has no name".to_string()))?;
    let data = decode_fields(raw.get("fields").unwrap_or(&Value::Null))?;
    Ok(Document::new(document_id(name), data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_typed_values() {
        let encoded = encode_fields(&json!({
            "amount": 5.8,
            "count": 3,
            "active": true,
            "tags": ["a"],
            "metadata": {"paymentMethod": "DMT", "note": null}
        }));
        assert_eq!(encoded["amount"], json!({"doubleValue": 5.8}));
        assert_eq!(encoded["count"], json!({"integerValue": "3"}));
        assert_eq!(encoded["active"], json!({"booleanValue": true}));
        assert_eq!(encoded["tags"], json!({"arrayValue": {"values": [{"stringValue": "a"}]}}));
        assert_eq!(
            encoded["metadata"]["mapValue"]["fields"]["paymentMethod"],
            json!({"stringValue": "DMT"})
        );
        assert_eq!(encoded["metadata"]["mapValue"]["fields"]["note"], json!({"nullValue": null}));
    }

    #[test]
    fn test_decode_document_from_rest_shape() {
        let raw = json!({
            "name": "projects/p/databases/(default)/documents/burnEvents/abc123",
            "fields": {
                "amount": {"doubleValue": 30.0},
                "count": {"integerValue": "7"},
                "timestamp": {"timestampValue": "2024-01-15T10:30:00.000Z"},
                "empty": {"arrayValue": {}}
            }
        });
        let doc = decode_document(&raw).unwrap();
        assert_eq!(doc.id, "abc123");
        assert_eq!(doc.data["amount"], json!(30.0));
        assert_eq!(doc.data["count"], json!(7));
        assert_eq!(doc.data["timestamp"], json!("2024-01-15T10:30:00.000Z"));
        assert_eq!(doc.data["empty"], json!([]));
    }

    #[test]
    fn test_structured_query_shapes() {
        let single = structured_query("subscriptions", &Query::new().where_eq("userId", "w"));
        assert_eq!(
            single["structuredQuery"]["where"]["fieldFilter"]["value"],
            json!({"stringValue": "w"})
        );

        let composite = structured_query(
            "subscriptions",
            &Query::new()
                .where_eq("userId", "w")
                .where_eq("status", "active")
                .order_by("startDate", Direction::Descending)
                .limit(1),
        );
        let sq = &composite["structuredQuery"];
        assert_eq!(sq["from"], json!([{"collectionId": "subscriptions"}]));
        assert_eq!(sq["where"]["compositeFilter"]["op"], json!("AND"));
        assert_eq!(sq["where"]["compositeFilter"]["filters"].as_array().unwrap().len(), 2);
        assert_eq!(sq["orderBy"][0]["direction"], json!("DESCENDING"));
        assert_eq!(sq["limit"], json!(1));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(decode_value(&json!({"geoPointValue": {}})).is_err());
    }
}
