use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use super::{http_client, read_body, truncate};
use crate::error::StoreError;
use crate::record::{normalize_name, DesiredState, Record};
use crate::store::RecordStore;

pub const NAMESILO_API_BASE: &str = "https://www.namesilo.com/api";

const API_VERSION: &str = "1";
const RESPONSE_TYPE: &str = "xml";
const SUCCESS_CODE: u32 = 300;
/// NameSilo's minimum, also used when neither request nor record has one.
const DEFAULT_TTL: u32 = 3600;

pub struct NamesiloStore {
    client: Client,
    base_url: String,
    key: String,
}

impl NamesiloStore {
    pub fn new(base_url: &str, key: String, timeout: Duration) -> Result<Self, StoreError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            key,
        })
    }

    async fn call(&self, operation: &str, params: &[(&str, String)]) -> Result<Reply, StoreError> {
        let mut query: Vec<(&str, &str)> = vec![
            ("version", API_VERSION),
            ("type", RESPONSE_TYPE),
            ("key", self.key.as_str()),
        ];
        query.extend(params.iter().map(|(k, v)| (*k, v.as_str())));

        let response = self
            .client
            .get(format!("{}/{}", self.base_url, operation))
            .query(&query)
            .send()
            .await?;

        let (status, body) = read_body(response).await?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status,
                body: truncate(&body),
            });
        }

        let envelope: Envelope = quick_xml::de::from_str(&body)
            .map_err(|e| StoreError::malformed(format!("NameSilo {operation} response: {e}")))?;
        let reply = envelope.reply;
        if reply.code != SUCCESS_CODE {
            return Err(StoreError::provider(
                reply.code.to_string(),
                reply.detail.unwrap_or_default(),
            ));
        }
        Ok(reply)
    }
}

#[async_trait]
impl RecordStore for NamesiloStore {
    fn name(&self) -> &'static str {
        "namesilo"
    }

    // NameSilo has no server-side filter; the whole zone comes back.
    async fn list(&self, domain: &str, _host: &str, _record_type: &str) -> Result<Vec<Record>, StoreError> {
        debug!("Listing NameSilo records for {}", domain);
        let reply = self
            .call("dnsListRecords", &[("domain", domain.to_string())])
            .await?;
        Ok(reply.records.into_iter().map(ResourceRecord::into_record).collect())
    }

    async fn update(&self, record: &Record, desired: &DesiredState) -> Result<(), StoreError> {
        let rrhost = if desired.is_apex() {
            String::new()
        } else {
            desired.host.clone()
        };
        let ttl = desired.ttl.or(record.ttl).unwrap_or(DEFAULT_TTL);

        let mut params = vec![
            ("domain", desired.domain.clone()),
            ("rrid", record.id.clone()),
            ("rrhost", rrhost),
            ("rrvalue", desired.value.clone()),
            ("rrttl", ttl.to_string()),
        ];
        if desired.record_type == "MX" {
            let distance = desired.priority.or(record.priority).unwrap_or(1);
            params.push(("rrdistance", distance.to_string()));
        }

        debug!("Updating NameSilo record {} ({}) to {}", record.id, record.name, desired.value);
        self.call("dnsUpdateRecord", &params).await?;
        Ok(())
    }
}

// NameSilo API types

#[derive(Debug, Deserialize)]
struct Envelope {
    reply: Reply,
}

#[derive(Debug, Deserialize)]
struct Reply {
    code: u32,
    detail: Option<String>,
    #[serde(rename = "resource_record", default)]
    records: Vec<ResourceRecord>,
}

#[derive(Debug, Deserialize)]
struct ResourceRecord {
    record_id: String,
    #[serde(rename = "type")]
    record_type: String,
    host: String,
    value: String,
    ttl: Option<u32>,
    distance: Option<u32>,
}

impl ResourceRecord {
    fn into_record(self) -> Record {
        Record {
            id: self.record_id,
            name: normalize_name(&self.host),
            record_type: self.record_type,
            value: self.value,
            ttl: self.ttl,
            line: None,
            priority: self.distance.filter(|d| *d > 0),
        }
    }
}
