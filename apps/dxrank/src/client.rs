//! # HTTP Service Adapters
//!
//! Blocking JSON clients for the ontology backend and the semantic-search
//! store. Every failure is classified into a [`GatewayError`] here so the
//! core can decide on retries by kind.
//!
//! ## Ontology endpoints (relative to `ontology_url`)
//!
//! - `POST /annotate` `{"text", "exact_match"}` -> `[{"object_id", "object_label"}]`
//! - `GET /ancestors?id=&predicates=a,b` -> `["id", ...]`
//! - `GET /mappings?id=&source=` -> `["id", ...]`
//! - `GET /label?id=` -> `{"label": "..."}` (404 when unknown)
//!
//! ## Search endpoint (relative to `search_url`)
//!
//! - `POST /search` `{"text", "collection"}` -> `[{"original_id", "label", "distance", "metadata"}]`

use dxrank_core::{Annotation, DxError, GatewayError, OntologyGateway, SearchHit, SemanticStore};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

// =============================================================================
// ERROR CLASSIFICATION
// =============================================================================

/// Classify a non-success HTTP status.
#[must_use]
pub fn classify_status(status: StatusCode, body: &str) -> GatewayError {
    let message = if body.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), body)
    };
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        GatewayError::transient(message)
    } else if status == StatusCode::NOT_FOUND {
        GatewayError::not_found(message)
    } else {
        GatewayError::invalid(message)
    }
}

/// Classify a transport-level failure.
#[must_use]
pub fn classify_transport(error: &reqwest::Error) -> GatewayError {
    if error.is_decode() || error.is_builder() {
        GatewayError::invalid(error.to_string())
    } else {
        // Timeouts, refused connections, resets.
        GatewayError::transient(error.to_string())
    }
}

// =============================================================================
// SHARED HTTP PLUMBING
// =============================================================================

/// Base URL plus bearer token over a shared blocking client.
#[derive(Clone)]
struct Endpoint {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl Endpoint {
    fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, DxError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DxError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build a request with optional Bearer auth.
    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    fn send(&self, req: RequestBuilder) -> Result<Response, GatewayError> {
        req.send().map_err(|e| classify_transport(&e))
    }

    /// Check the status and decode the JSON body.
    fn json<T: DeserializeOwned>(&self, resp: Response) -> Result<T, GatewayError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        resp.json::<T>()
            .map_err(|e| GatewayError::invalid(format!("bad response body: {e}")))
    }
}

// =============================================================================
// ONTOLOGY GATEWAY
// =============================================================================

#[derive(Deserialize)]
struct AnnotationJson {
    object_id: String,
    #[serde(default)]
    object_label: String,
}

#[derive(Deserialize)]
struct LabelJson {
    label: Option<String>,
}

/// [`OntologyGateway`] over the ontology backend's REST API.
#[derive(Clone)]
pub struct HttpOntologyGateway {
    endpoint: Endpoint,
}

impl HttpOntologyGateway {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, DxError> {
        Ok(Self {
            endpoint: Endpoint::new(base_url, api_key, timeout)?,
        })
    }
}

impl OntologyGateway for HttpOntologyGateway {
    fn annotate_text(
        &self,
        text: &str,
        exact_match: bool,
    ) -> Result<Vec<Annotation>, GatewayError> {
        let body = serde_json::json!({ "text": text, "exact_match": exact_match });
        let req = self
            .endpoint
            .request(reqwest::Method::POST, "/annotate")
            .json(&body);
        let resp = self.endpoint.send(req)?;
        let found: Vec<AnnotationJson> = self.endpoint.json(resp)?;
        Ok(found
            .into_iter()
            .map(|a| Annotation::new(a.object_id, a.object_label))
            .collect())
    }

    fn ancestors(&self, id: &str, predicates: &[String]) -> Result<Vec<String>, GatewayError> {
        let predicates = predicates.join(",");
        let req = self
            .endpoint
            .request(reqwest::Method::GET, "/ancestors")
            .query(&[("id", id), ("predicates", predicates.as_str())]);
        let resp = self.endpoint.send(req)?;
        self.endpoint.json(resp)
    }

    fn exact_mappings(
        &self,
        id: &str,
        source_namespace: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let req = self
            .endpoint
            .request(reqwest::Method::GET, "/mappings")
            .query(&[("id", id), ("source", source_namespace)]);
        let resp = self.endpoint.send(req)?;
        self.endpoint.json(resp)
    }

    fn label(&self, id: &str) -> Result<Option<String>, GatewayError> {
        let req = self
            .endpoint
            .request(reqwest::Method::GET, "/label")
            .query(&[("id", id)]);
        let resp = self.endpoint.send(req)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let found: LabelJson = self.endpoint.json(resp)?;
        Ok(found.label)
    }
}

// =============================================================================
// SEMANTIC SEARCH STORE
// =============================================================================

#[derive(Deserialize)]
struct SearchHitJson {
    original_id: Option<String>,
    label: Option<String>,
    distance: f64,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

impl From<SearchHitJson> for SearchHit {
    fn from(hit: SearchHitJson) -> Self {
        let metadata = hit
            .metadata
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(s) => (key, s),
                other => (key, other.to_string()),
            })
            .collect();
        Self {
            original_id: hit.original_id,
            label: hit.label,
            distance: hit.distance,
            metadata,
        }
    }
}

/// [`SemanticStore`] over the search service's REST API.
#[derive(Clone)]
pub struct HttpSemanticStore {
    endpoint: Endpoint,
}

impl HttpSemanticStore {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, DxError> {
        Ok(Self {
            endpoint: Endpoint::new(base_url, api_key, timeout)?,
        })
    }
}

impl SemanticStore for HttpSemanticStore {
    fn search(&self, query: &str, collection: &str) -> Result<Vec<SearchHit>, GatewayError> {
        let body = serde_json::json!({ "text": query, "collection": collection });
        let req = self
            .endpoint
            .request(reqwest::Method::POST, "/search")
            .json(&body);
        let resp = self.endpoint.send(req)?;
        let hits: Vec<SearchHitJson> = self.endpoint.json(resp)?;
        Ok(hits.into_iter().map(SearchHit::from).collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dxrank_core::ErrorKind;

    #[test]
    fn status_classification() {
        let cases = [
            (StatusCode::REQUEST_TIMEOUT, ErrorKind::Transient),
            (StatusCode::TOO_MANY_REQUESTS, ErrorKind::Transient),
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Transient),
            (StatusCode::SERVICE_UNAVAILABLE, ErrorKind::Transient),
            (StatusCode::NOT_FOUND, ErrorKind::NotFound),
            (StatusCode::BAD_REQUEST, ErrorKind::Invalid),
            (StatusCode::UNAUTHORIZED, ErrorKind::Invalid),
        ];
        for (status, kind) in cases {
            assert_eq!(classify_status(status, "").kind, kind, "{status}");
        }
    }

    #[test]
    fn status_message_includes_body() {
        let error = classify_status(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(error.message, "HTTP 502: upstream down");
    }

    #[test]
    fn search_hit_metadata_is_stringified() {
        let json = r#"{"original_id":"MONDO:0007947","label":"Marfan syndrome",
                       "distance":0.12,"metadata":{"source":"mondo","depth":3}}"#;
        let hit: SearchHit = serde_json::from_str::<SearchHitJson>(json)
            .expect("parse")
            .into();
        assert_eq!(hit.original_id.as_deref(), Some("MONDO:0007947"));
        assert_eq!(hit.metadata.get("source").map(String::as_str), Some("mondo"));
        assert_eq!(hit.metadata.get("depth").map(String::as_str), Some("3"));
    }

    #[test]
    fn unreachable_backend_is_transient() {
        let gateway =
            HttpOntologyGateway::new("http://127.0.0.1:9", None, Duration::from_millis(200))
                .expect("client");
        let error = gateway.label("MONDO:0007947").expect_err("no server");
        assert_eq!(error.kind, ErrorKind::Transient);
    }
}
