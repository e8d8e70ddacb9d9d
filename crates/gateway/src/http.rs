//! HTTP binding for a Kong-style Admin API.
//!
//! Entities are written with `PUT /{collection}/{id}` so the ID planned by
//! the reconciler is kept; entities without an ID are `POST`ed. Targets live
//! under their upstream (`/upstreams/{id}/targets`).

use crate::error::{ApiError, Result};
use crate::{GatewayApi, entity_id, reference_id};
use entitystore::Kind;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Page size requested from list endpoints.
const PAGE_SIZE: &str = "1000";

/// One page of a list endpoint.
#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    offset: Option<String>,
}

/// Admin API client over blocking HTTP.
pub struct HttpGateway {
    agent: ureq::Agent,
    base_url: String,
    headers: Vec<(String, String)>,
}

impl HttpGateway {
    /// Create a client for the Admin API at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create a client whose requests time out after `timeout`.
    #[must_use]
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers: Vec::new(),
        }
    }

    /// Send `name: value` with every request (e.g. an admin token).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, kind: Kind, entity: &Value) -> Result<String> {
        if kind == Kind::Target {
            let upstream = reference_id(entity, "upstream").ok_or_else(|| {
                ApiError::Other("target has no upstream ID".to_string())
            })?;
            return Ok(format!("{}/upstreams/{upstream}/targets", self.base_url));
        }
        Ok(format!("{}/{}", self.base_url, kind.api_path()))
    }

    fn with_headers<B>(&self, mut request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request.header("Accept", "application/json")
    }

    /// Turn a response into its JSON body or an error.
    fn read(
        kind: Kind,
        id: &str,
        mut response: ureq::http::Response<ureq::Body>,
    ) -> Result<Option<Value>> {
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            return Err(ApiError::from_status(kind, id, status, &body));
        }
        if status == 204 {
            return Ok(None);
        }
        response
            .body_mut()
            .read_json::<Value>()
            .map(Some)
            .map_err(|e| ApiError::Decode {
                kind,
                message: e.to_string(),
            })
    }

    fn write(&self, kind: Kind, id: Option<&str>, entity: &Value) -> Result<Value> {
        let collection = self.collection_url(kind, entity)?;
        let response = match id {
            Some(id) => {
                log::debug!("PUT {collection}/{id}");
                self.with_headers(self.agent.put(&format!("{collection}/{id}")))
                    .send_json(entity)?
            }
            None => {
                log::debug!("POST {collection}");
                self.with_headers(self.agent.post(&collection))
                    .send_json(entity)?
            }
        };
        Self::read(kind, id.unwrap_or_default(), response)?.ok_or_else(|| ApiError::Decode {
            kind,
            message: "empty response body".to_string(),
        })
    }

    fn list_at(&self, kind: Kind, url: &str) -> Result<Vec<Value>> {
        let mut entities = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let mut request = self.with_headers(self.agent.get(url)).query("size", PAGE_SIZE);
            if let Some(offset) = &offset {
                request = request.query("offset", offset);
            }
            log::debug!("GET {url} (offset {offset:?})");
            let body = Self::read(kind, "", request.call()?)?.unwrap_or(Value::Null);
            let page: Page = serde_json::from_value(body).map_err(|e| ApiError::Decode {
                kind,
                message: e.to_string(),
            })?;
            entities.extend(page.data);
            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => break,
            }
        }
        Ok(entities)
    }
}

impl GatewayApi for HttpGateway {
    fn create(&self, kind: Kind, entity: &Value) -> Result<Value> {
        self.write(kind, entity_id(entity), entity)
    }

    fn update(&self, kind: Kind, id: &str, entity: &Value) -> Result<Value> {
        self.write(kind, Some(id), entity)
    }

    fn delete(&self, kind: Kind, id: &str, entity: &Value) -> Result<()> {
        let url = format!("{}/{id}", self.collection_url(kind, entity)?);
        log::debug!("DELETE {url}");
        let response = self.with_headers(self.agent.delete(&url)).call()?;
        Self::read(kind, id, response).map(|_| ())
    }

    fn list(&self, kind: Kind) -> Result<Vec<Value>> {
        if kind != Kind::Target {
            return self.list_at(kind, &format!("{}/{}", self.base_url, kind.api_path()));
        }
        let mut targets = Vec::new();
        for upstream in self.list(Kind::Upstream)? {
            let Some(id) = entity_id(&upstream) else {
                continue;
            };
            let url = format!("{}/upstreams/{id}/targets", self.base_url);
            targets.extend(self.list_at(kind, &url)?);
        }
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url_is_normalised() {
        let gw = HttpGateway::new("http://localhost:8001/");
        assert_eq!(gw.base_url(), "http://localhost:8001");
    }

    #[test]
    fn test_collection_url() {
        let gw = HttpGateway::new("http://admin");
        assert_eq!(
            gw.collection_url(Kind::KeyAuth, &json!({})).unwrap(),
            "http://admin/key-auths"
        );
        assert_eq!(
            gw.collection_url(Kind::Target, &json!({"upstream": {"id": "u1"}}))
                .unwrap(),
            "http://admin/upstreams/u1/targets"
        );
        assert!(gw.collection_url(Kind::Target, &json!({})).is_err());
    }

    #[test]
    fn test_unreachable_gateway_is_network_error() {
        let gw = HttpGateway::with_timeout("http://127.0.0.1:9", Duration::from_secs(2));
        let err = gw.list(Kind::Service).unwrap_err();
        assert!(err.is_retryable());
    }
}
