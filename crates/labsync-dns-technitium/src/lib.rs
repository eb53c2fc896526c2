// # Technitium Name Service
//
// [`NameService`] implementation for a Technitium DNS server.
//
// Single-shot HTTP client, same shape as the other collaborator crates:
// one GET to read the current record set, one `records/add` with overwrite
// when a change is needed. All retries are owned by the reconcilers.
//
// Technitium authenticates with an API token passed as the `token` query
// parameter. The token never appears in logs or Debug output.
//
// ## API Reference
//
// - Read records: GET `/api/zones/records/get?domain=...&zone=...`
// - Upsert record: GET `/api/zones/records/add?domain=...&type=A&ipAddress=...&overwrite=true`

use async_trait::async_trait;
use labsync_core::error::{Error, Result};
use labsync_core::traits::{NameService, RecordKind, UpsertOutcome};
use serde_json::Value;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Technitium-backed name service
pub struct TechnitiumService {
    base_url: String,
    /// API token; never logged
    api_token: String,
    client: reqwest::Client,
}

// Debug must not expose the API token
impl std::fmt::Debug for TechnitiumService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TechnitiumService")
            .field("base_url", &self.base_url)
            .field("api_token", &"<REDACTED>")
            .finish()
    }
}

impl TechnitiumService {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("technitium api token must not be empty"));
        }

        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::config("technitium url must not be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::name_service(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            base_url,
            api_token,
            client,
        })
    }

    /// Call one API endpoint and unwrap Technitium's status envelope
    async fn call(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/api/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(&[("token", self.api_token.as_str())])
            .query(params)
            .send()
            .await
            .map_err(|e| Error::connectivity(format!("technitium request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::name_service(format!(
                "technitium {} failed ({})",
                endpoint,
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::name_service(format!("failed to parse technitium response: {}", e)))?;

        // Every Technitium response carries a status field; HTTP 200 with
        // status "error" is still a failure.
        match body["status"].as_str() {
            Some("ok") => Ok(body),
            Some(other) => {
                let message = body["errorMessage"].as_str().unwrap_or(other);
                Err(Error::name_service(format!(
                    "technitium {} rejected: {}",
                    endpoint, message
                )))
            }
            None => Err(Error::name_service(format!(
                "technitium {} returned no status",
                endpoint
            ))),
        }
    }

    /// Current value of the (name, kind) record, if one exists
    async fn current_value(&self, zone: &str, name: &str, kind: RecordKind) -> Result<Option<IpAddr>> {
        let body = self
            .call(
                "zones/records/get",
                &[("domain", name), ("zone", zone), ("listZone", "false")],
            )
            .await?;

        let records = body["response"]["records"].as_array().cloned().unwrap_or_default();
        for record in records {
            if record["type"].as_str() != Some(kind.as_str()) {
                continue;
            }
            if record["name"].as_str() != Some(name) {
                continue;
            }
            if let Some(value) = record["rData"]["ipAddress"].as_str() {
                if let Ok(address) = value.parse() {
                    return Ok(Some(address));
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl NameService for TechnitiumService {
    async fn upsert_record(
        &self,
        zone: &str,
        name: &str,
        kind: RecordKind,
        address: IpAddr,
        ttl: u32,
    ) -> Result<UpsertOutcome> {
        let existing = self.current_value(zone, name, kind).await?;

        if existing == Some(address) {
            debug!(name, %address, "dns record already current");
            return Ok(UpsertOutcome::Unchanged);
        }

        let address_text = address.to_string();
        let ttl_text = ttl.to_string();
        self.call(
            "zones/records/add",
            &[
                ("domain", name),
                ("zone", zone),
                ("type", kind.as_str()),
                ("ipAddress", address_text.as_str()),
                ("ttl", ttl_text.as_str()),
                ("overwrite", "true"),
            ],
        )
        .await?;

        info!(name, %address, record_type = kind.as_str(), "dns record written");
        Ok(match existing {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        })
    }

    fn service_name(&self) -> &'static str {
        "technitium"
    }
}
