use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{http_client, read_body, truncate};
use crate::error::StoreError;
use crate::record::{full_name, normalize_name, DesiredState, Record};
use crate::store::RecordStore;

pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// TTL value Cloudflare treats as "automatic".
const DEFAULT_TTL: u32 = 1;

pub const LINE_PROXIED: &str = "proxied";
pub const LINE_DNS_ONLY: &str = "dns_only";

pub struct CloudflareStore {
    client: Client,
    base_url: String,
    token: String,
    zone_id: String,
}

impl CloudflareStore {
    pub fn new(base_url: &str, token: String, zone_id: String, timeout: Duration) -> Result<Self, StoreError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            zone_id,
        })
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_id)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<CloudflareResponse<T>, StoreError> {
        let (status, body) = read_body(response).await?;
        let parsed: CloudflareResponse<T> = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(StoreError::Status {
                    status,
                    body: truncate(&body),
                })
            }
            Err(e) => return Err(StoreError::malformed(format!("Cloudflare response: {e}"))),
        };

        if !parsed.success {
            return Err(api_error(&parsed.errors));
        }
        if !status.is_success() {
            return Err(StoreError::Status {
                status,
                body: truncate(&body),
            });
        }
        Ok(parsed)
    }
}

#[async_trait]
impl RecordStore for CloudflareStore {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    async fn list(&self, domain: &str, host: &str, record_type: &str) -> Result<Vec<Record>, StoreError> {
        let name = full_name(host, domain);
        debug!("Listing Cloudflare {} records for {}", record_type, name);

        let response = self
            .client
            .get(self.records_url())
            .bearer_auth(&self.token)
            .query(&[
                ("type", record_type),
                ("name", name.as_str()),
                ("page", "1"),
                ("per_page", "100"),
                ("order", "type"),
            ])
            .send()
            .await?;

        let parsed: CloudflareResponse<Vec<DnsRecord>> = Self::decode(response).await?;
        let records = parsed
            .result
            .ok_or_else(|| StoreError::malformed("Cloudflare list response has no result"))?;

        Ok(records.into_iter().map(DnsRecord::into_record).collect())
    }

    async fn update(&self, record: &Record, desired: &DesiredState) -> Result<(), StoreError> {
        let proxied = match desired.line.as_deref().or(record.line.as_deref()) {
            Some(line) => line.eq_ignore_ascii_case(LINE_PROXIED),
            None => false,
        };
        let body = UpdateRecordRequest {
            record_type: desired.record_type.clone(),
            name: desired.full_name.clone(),
            content: desired.value.clone(),
            ttl: desired.ttl.or(record.ttl).unwrap_or(DEFAULT_TTL),
            proxied,
            // Only records that already carry a priority (MX, SRV, URI) accept one.
            priority: record.priority.map(|p| desired.priority.unwrap_or(p)),
        };
        debug!("Updating Cloudflare record {} ({}) to {}", record.id, record.name, desired.value);

        let response = self
            .client
            .put(format!("{}/{}", self.records_url(), record.id))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let _: CloudflareResponse<serde_json::Value> = Self::decode(response).await?;
        Ok(())
    }
}

fn api_error(errors: &[CloudflareError]) -> StoreError {
    if errors.is_empty() {
        return StoreError::provider("unknown", "Cloudflare reported failure without details");
    }
    let code = errors
        .iter()
        .map(|e| e.code.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let message = errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    StoreError::provider(code, message)
}

// Cloudflare API types

#[derive(Debug, Serialize)]
struct UpdateRecordRequest {
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    ttl: u32,
    proxied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CloudflareResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<CloudflareError>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CloudflareError {
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    ttl: Option<u32>,
    #[serde(default)]
    proxied: Option<bool>,
    #[serde(default)]
    priority: Option<u32>,
}

impl DnsRecord {
    fn into_record(self) -> Record {
        Record {
            id: self.id,
            name: normalize_name(&self.name),
            record_type: self.record_type,
            value: self.content,
            ttl: self.ttl,
            line: self
                .proxied
                .map(|p| if p { LINE_PROXIED } else { LINE_DNS_ONLY }.to_string()),
            priority: self.priority,
        }
    }
}
