//! # Forwarding Provider
//!
//! Remote provider that re-asks upstream identity servers. Upstreams are
//! tried in configured order; the first one with an answer wins.
//!
//! Every upstream request carries `X-Forwarded-For`, so the upstream sees a
//! forwarded (non-recursive) request and will not forward it again.
//!
//! Upstream signatures are not checked. The reply is re-signed by this
//! server like any other.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use idsrv_core::{MatrixId, Provenance, SingleLookupReply, SingleLookupRequest, ThreePidMapping};
use serde_json::Value;
use url::Url;

use crate::provenance::FORWARDED_FOR;
use crate::provider::ThreePidProvider;
use crate::reply::BulkLookupAnswer;
use crate::strategy::StrategyError;

const LOOKUP_PATH: &str = "_matrix/identity/api/v1/lookup";
const BULK_LOOKUP_PATH: &str = "_matrix/identity/api/v1/bulk_lookup";

/// Queries upstream identity servers over HTTP.
#[derive(Debug)]
pub struct ForwardingProvider {
    client: reqwest::Client,
    servers: Vec<Url>,
    priority: i32,
}

impl ForwardingProvider {
    pub const NAME: &'static str = "forward";

    pub fn new(servers: Vec<Url>, timeout: Duration, priority: i32) -> Result<Self, StrategyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StrategyError::Provider {
                provider: Self::NAME.into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            servers,
            priority,
        })
    }

    pub fn servers(&self) -> &[Url] {
        &self.servers
    }

    fn endpoint(base: &Url, path: &str) -> Result<Url, StrategyError> {
        let joined = format!("{}/{path}", base.as_str().trim_end_matches('/'));
        Url::parse(&joined).map_err(|e| StrategyError::Provider {
            provider: Self::NAME.into(),
            reason: format!("invalid upstream URL {joined}: {e}"),
        })
    }

    /// Send a request and map transport failures and non-2xx statuses.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &Url,
    ) -> Result<reqwest::Response, StrategyError> {
        let resp = request.send().await.map_err(|source| StrategyError::Http {
            endpoint: endpoint.to_string(),
            source,
        })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(StrategyError::UpstreamStatus {
                endpoint: endpoint.to_string(),
                status,
                body,
            });
        }

        Ok(resp)
    }

    async fn query_single(
        &self,
        server: &Url,
        request: &SingleLookupRequest,
    ) -> Result<Option<SingleLookupReply>, StrategyError> {
        let endpoint = Self::endpoint(server, LOOKUP_PATH)?;
        let query = [("medium", &request.medium), ("address", &request.address)];
        let builder = self
            .client
            .get(endpoint.clone())
            .query(&query)
            .header(FORWARDED_FOR, request.provenance.upstream_forwarded_for());
        let body: Value = self
            .send(builder, &endpoint)
            .await?
            .json()
            .await
            .map_err(|e| invalid(&endpoint, e))?;

        let Some(raw) = body.get("mxid").and_then(Value::as_str) else {
            return Ok(None);
        };
        let mxid = MatrixId::parse(raw).map_err(|e| invalid(&endpoint, e))?;
        let ts = millis_field(&body, "ts").unwrap_or_else(Utc::now);
        let mut reply = SingleLookupReply::new(request, mxid, ts);
        if let (Some(not_before), Some(not_after)) =
            (millis_field(&body, "not_before"), millis_field(&body, "not_after"))
        {
            reply = reply.with_validity(not_before, not_after);
        }
        Ok(Some(reply))
    }

    async fn query_bulk(
        &self,
        server: &Url,
        provenance: &Provenance,
        pending: &[ThreePidMapping],
    ) -> Result<BulkLookupAnswer, StrategyError> {
        let endpoint = Self::endpoint(server, BULK_LOOKUP_PATH)?;
        let pairs: Vec<[&str; 2]> = pending
            .iter()
            .map(|m| [m.medium.as_str(), m.value.as_str()])
            .collect();
        let builder = self
            .client
            .post(endpoint.clone())
            .header(FORWARDED_FOR, provenance.upstream_forwarded_for())
            .json(&serde_json::json!({ "threepids": pairs }));
        self.send(builder, &endpoint)
            .await?
            .json()
            .await
            .map_err(|e| invalid(&endpoint, e))
    }
}

#[async_trait]
impl ThreePidProvider for ForwardingProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_local(&self) -> bool {
        false
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn find_single(
        &self,
        request: &SingleLookupRequest,
    ) -> Result<Option<SingleLookupReply>, StrategyError> {
        for server in &self.servers {
            if let Some(reply) = self.query_single(server, request).await? {
                tracing::debug!(upstream = %server, "upstream returned a mapping");
                return Ok(Some(reply));
            }
        }
        Ok(None)
    }

    async fn populate(
        &self,
        provenance: &Provenance,
        pending: &[ThreePidMapping],
    ) -> Result<Vec<ThreePidMapping>, StrategyError> {
        let mut remaining = pending.to_vec();
        let mut found = Vec::new();
        for server in &self.servers {
            if remaining.is_empty() {
                break;
            }
            let answer = self.query_bulk(server, provenance, &remaining).await?;
            for (medium, address, raw) in answer.into_entries() {
                let Some(pos) = remaining
                    .iter()
                    .position(|m| m.medium == medium && m.value == address)
                else {
                    continue;
                };
                let mxid = MatrixId::parse(&raw).map_err(|e| StrategyError::InvalidResponse {
                    endpoint: server.to_string(),
                    reason: e.to_string(),
                })?;
                found.push(remaining.remove(pos).resolved(mxid));
            }
        }
        Ok(found)
    }
}

fn invalid(endpoint: &Url, err: impl std::fmt::Display) -> StrategyError {
    StrategyError::InvalidResponse {
        endpoint: endpoint.to_string(),
        reason: err.to_string(),
    }
}

fn millis_field(body: &Value, field: &str) -> Option<DateTime<Utc>> {
    body.get(field)
        .and_then(Value::as_i64)
        .and_then(DateTime::from_timestamp_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        for base in ["http://id.example.org", "http://id.example.org/"] {
            let base = Url::parse(base).unwrap();
            let url = ForwardingProvider::endpoint(&base, LOOKUP_PATH).unwrap();
            assert_eq!(
                url.as_str(),
                "http://id.example.org/_matrix/identity/api/v1/lookup"
            );
        }
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let base = Url::parse("https://example.org/identity").unwrap();
        let url = ForwardingProvider::endpoint(&base, BULK_LOOKUP_PATH).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.org/identity/_matrix/identity/api/v1/bulk_lookup"
        );
    }

    #[test]
    fn is_remote() {
        let p = ForwardingProvider::new(vec![], Duration::from_secs(1), 0).unwrap();
        assert!(!p.is_local());
        assert_eq!(p.name(), "forward");
        assert!(p.servers().is_empty());
    }
}
