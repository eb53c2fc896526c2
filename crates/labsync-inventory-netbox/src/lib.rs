// # NetBox Inventory Store
//
// [`InventoryStore`] implementation backed by a NetBox IPAM instance.
//
// This store is a thin, single-shot HTTP client:
//
// - One GET per listing, one GET plus one PATCH/POST per upsert
// - Full error propagation to the caller (retries are owned by the
//   reconcilers, never by this crate)
// - HTTP timeout configured (10 seconds)
// - No background tasks, no caching
//
// ## Security
//
// The API token never appears in logs or Debug output.
//
// ## API Reference
//
// - List addresses: GET `/api/ipam/ip-addresses/?status=active&limit=N`
// - Find by address: GET `/api/ipam/ip-addresses/?address=IP`
// - Update: PATCH `/api/ipam/ip-addresses/:id/`
// - Create: POST `/api/ipam/ip-addresses/`

use async_trait::async_trait;
use labsync_core::error::{Error, Result};
use labsync_core::traits::{
    AddressFields, AddressFilter, InventoryEntry, InventoryStore, UpsertOutcome,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info};

/// Default HTTP timeout for NetBox API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// NetBox-backed inventory store
pub struct NetBoxStore {
    base_url: String,
    /// NetBox API token; never logged
    api_token: String,
    client: reqwest::Client,
}

// Debug must not expose the API token
impl std::fmt::Debug for NetBoxStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetBoxStore")
            .field("base_url", &self.base_url)
            .field("api_token", &"<REDACTED>")
            .finish()
    }
}

impl NetBoxStore {
    /// Create a store for a NetBox instance
    ///
    /// `base_url` is the instance root without the `/api` suffix, e.g.
    /// `http://netbox.lab.example:8080`.
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("netbox api token must not be empty"));
        }

        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::config("netbox url must not be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::inventory(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            base_url,
            api_token,
            client,
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Token {}", self.api_token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::connectivity(format!("netbox request failed: {}", e)))?;

        check_status(response.status(), "netbox query")?;

        response
            .json()
            .await
            .map_err(|e| Error::inventory(format!("failed to parse netbox response: {}", e)))
    }

    /// Look up an existing IP address object, returning its id and record
    async fn find_address(&self, address: IpAddr) -> Result<Option<(u64, Value)>> {
        let url = format!(
            "{}/api/ipam/ip-addresses/?address={}",
            self.base_url, address
        );
        let body = self.get_json(&url).await?;

        let results = body["results"]
            .as_array()
            .ok_or_else(|| Error::inventory("netbox response missing results array"))?;

        match results.first() {
            Some(record) => {
                let id = record["id"]
                    .as_u64()
                    .ok_or_else(|| Error::inventory("netbox record id is not a number"))?;
                Ok(Some((id, record.clone())))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl InventoryStore for NetBoxStore {
    async fn list_active_addresses(&self, filter: &AddressFilter) -> Result<Vec<InventoryEntry>> {
        let url = format!(
            "{}/api/ipam/ip-addresses/?status=active&limit={}",
            self.base_url, filter.limit
        );
        let body = self.get_json(&url).await?;

        let results = body["results"]
            .as_array()
            .ok_or_else(|| Error::inventory("netbox response missing results array"))?;

        let mut entries = Vec::with_capacity(results.len());
        for record in results {
            let Some(entry) = parse_entry(record) else {
                debug!("skipping netbox record with unparseable address");
                continue;
            };
            if filter.named_only && entry.hostname.is_none() {
                continue;
            }
            entries.push(entry);
        }

        debug!(count = entries.len(), "listed active addresses from netbox");
        Ok(entries)
    }

    async fn upsert_address(
        &self,
        address: IpAddr,
        fields: &AddressFields,
    ) -> Result<UpsertOutcome> {
        let existing = self.find_address(address).await?;

        let mut payload = json!({});
        if let Some(hostname) = &fields.hostname {
            payload["dns_name"] = json!(hostname);
        }
        if let Some(description) = &fields.description {
            payload["description"] = json!(description);
        }
        let mut custom_fields = serde_json::Map::new();
        if let Some(last_seen) = &fields.last_seen {
            custom_fields.insert("last_seen".to_string(), json!(last_seen.to_rfc3339()));
        }
        if let Some(mac) = &fields.mac_address {
            custom_fields.insert("mac_address".to_string(), json!(mac));
        }
        if let Some(vendor) = &fields.vendor {
            custom_fields.insert("vendor".to_string(), json!(vendor));
        }
        if !custom_fields.is_empty() {
            payload["custom_fields"] = Value::Object(custom_fields);
        }

        match existing {
            Some((id, record)) => {
                if fields_match(&record, fields) {
                    debug!(%address, "netbox record already current");
                    return Ok(UpsertOutcome::Unchanged);
                }

                let url = format!("{}/api/ipam/ip-addresses/{}/", self.base_url, id);
                let response = self
                    .client
                    .patch(&url)
                    .header("Authorization", format!("Token {}", self.api_token))
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|e| Error::connectivity(format!("netbox patch failed: {}", e)))?;
                check_status(response.status(), "netbox update")?;

                info!(%address, "updated netbox ip address");
                Ok(UpsertOutcome::Updated)
            }
            None => {
                // New addresses are registered as /32 (or /128) host routes
                let prefix_len = if address.is_ipv4() { 32 } else { 128 };
                payload["address"] = json!(format!("{}/{}", address, prefix_len));
                payload["status"] = json!("active");

                let url = format!("{}/api/ipam/ip-addresses/", self.base_url);
                let response = self
                    .client
                    .post(&url)
                    .header("Authorization", format!("Token {}", self.api_token))
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|e| Error::connectivity(format!("netbox post failed: {}", e)))?;
                check_status(response.status(), "netbox create")?;

                info!(%address, "created netbox ip address");
                Ok(UpsertOutcome::Created)
            }
        }
    }

    fn store_name(&self) -> &'static str {
        "netbox"
    }
}

fn check_status(status: reqwest::StatusCode, context: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    match status.as_u16() {
        401 | 403 => Err(Error::inventory(format!(
            "{} rejected: invalid token or insufficient permissions ({})",
            context, status
        ))),
        429 => Err(Error::connectivity(format!(
            "{} rate limited ({})",
            context, status
        ))),
        500..=599 => Err(Error::connectivity(format!(
            "{} server error ({})",
            context, status
        ))),
        _ => Err(Error::inventory(format!("{} failed ({})", context, status))),
    }
}

/// Parse one NetBox ip-address record into an inventory entry
///
/// NetBox returns addresses in CIDR notation (`192.168.1.10/24`); only the
/// host part is kept. An empty `dns_name` means unnamed.
fn parse_entry(record: &Value) -> Option<InventoryEntry> {
    let cidr = record["address"].as_str()?;
    let address: IpAddr = strip_prefix_length(cidr).parse().ok()?;

    let hostname = record["dns_name"]
        .as_str()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    let attributes: HashMap<String, Value> = record["custom_fields"]
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();

    Some(InventoryEntry {
        address,
        hostname,
        attributes,
    })
}

fn strip_prefix_length(cidr: &str) -> &str {
    cidr.split('/').next().unwrap_or(cidr)
}

/// Whether the stored record already carries the desired hostname,
/// description, and MAC; `last_seen` is excluded so a pure heartbeat change
/// still counts as unchanged. The MAC is compared only when the probe
/// observed one, so an unprivileged sweep never forces an update.
fn fields_match(record: &Value, fields: &AddressFields) -> bool {
    let stored_name = record["dns_name"]
        .as_str()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    let stored_description = record["description"]
        .as_str()
        .filter(|d| !d.is_empty());

    if stored_name != fields.hostname.as_deref()
        || stored_description != fields.description.as_deref()
    {
        return false;
    }

    match fields.mac_address.as_deref() {
        Some(mac) => record["custom_fields"]["mac_address"].as_str() == Some(mac),
        None => true,
    }
}
