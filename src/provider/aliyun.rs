use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha1::Sha1;
use time::macros::format_description;
use time::OffsetDateTime;
use urlencoding::encode;

use super::{http_client, read_body, truncate};
use crate::error::StoreError;
use crate::record::{full_name, DesiredState, Record, APEX};
use crate::store::RecordStore;

pub const ALIYUN_API_BASE: &str = "https://alidns.aliyuncs.com";

const API_VERSION: &str = "2015-01-09";
const PAGE_SIZE: &str = "500";
const DEFAULT_TTL: u32 = 600;
const DEFAULT_LINE: &str = "default";

type HmacSha1 = Hmac<Sha1>;

pub struct AliyunStore {
    client: Client,
    base_url: String,
    access_key_id: String,
    access_key_secret: String,
}

impl AliyunStore {
    pub fn new(
        base_url: &str,
        access_key_id: String,
        access_key_secret: String,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_key_id,
            access_key_secret,
        })
    }

    /// Signs and sends one RPC action, returning the decoded success payload.
    async fn call<T: DeserializeOwned>(&self, action: &str, args: &[(&str, String)]) -> Result<T, StoreError> {
        let timestamp = OffsetDateTime::now_utc()
            .format(format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z"))
            .map_err(|e| StoreError::Signing(e.to_string()))?;

        let mut params: BTreeMap<String, String> = BTreeMap::new();
        params.insert("Action".into(), action.into());
        params.insert("Format".into(), "JSON".into());
        params.insert("Version".into(), API_VERSION.into());
        params.insert("AccessKeyId".into(), self.access_key_id.clone());
        params.insert("SignatureMethod".into(), "HMAC-SHA1".into());
        params.insert("SignatureVersion".into(), "1.0".into());
        params.insert("SignatureNonce".into(), uuid::Uuid::new_v4().to_string());
        params.insert("Timestamp".into(), timestamp);
        for (k, v) in args {
            params.insert((*k).to_string(), v.clone());
        }

        let canonical = canonical_query(&params);
        let signature = sign(&self.access_key_secret, &string_to_sign(&canonical))?;
        let url = format!("{}/?{}&Signature={}", self.base_url, canonical, encode(&signature));

        let response = self.client.get(url).send().await?;
        let (status, body) = read_body(response).await?;

        // Errors come back as {"RequestId", "Code", "Message"}, usually with a 4xx status.
        if let Ok(err) = serde_json::from_str::<ErrorBody>(&body) {
            if let Some(code) = err.code {
                return Err(StoreError::provider(code, err.message.unwrap_or_default()));
            }
        }
        if !status.is_success() {
            return Err(StoreError::Status {
                status,
                body: truncate(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| StoreError::malformed(format!("Aliyun {action} response: {e}")))
    }
}

fn relative_host(host: &str) -> &str {
    if host.is_empty() {
        APEX
    } else {
        host
    }
}

#[async_trait]
impl RecordStore for AliyunStore {
    fn name(&self) -> &'static str {
        "aliyun"
    }

    async fn list(&self, domain: &str, host: &str, record_type: &str) -> Result<Vec<Record>, StoreError> {
        debug!("Listing Aliyun {} records for {} in {}", record_type, host, domain);

        let response: DescribeDomainRecordsResponse = self
            .call(
                "DescribeDomainRecords",
                &[
                    ("DomainName", domain.to_string()),
                    ("RRKeyWord", relative_host(host).to_string()),
                    ("Type", record_type.to_string()),
                    ("PageSize", PAGE_SIZE.to_string()),
                ],
            )
            .await?;

        if response.request_id.is_none() {
            return Err(StoreError::malformed("Aliyun list response has no RequestId"));
        }
        let records = response
            .domain_records
            .ok_or_else(|| StoreError::malformed("Aliyun list response has no DomainRecords"))?;

        Ok(records.record.into_iter().map(AliyunRecord::into_record).collect())
    }

    async fn update(&self, record: &Record, desired: &DesiredState) -> Result<(), StoreError> {
        let args = update_args(record, desired);
        debug!("Updating Aliyun record {} ({}) to {}", record.id, record.name, desired.value);
        let response: UpdateDomainRecordResponse = self.call("UpdateDomainRecord", &args).await?;

        match (response.request_id, response.record_id) {
            (Some(_), Some(_)) => Ok(()),
            _ => Err(StoreError::malformed(
                "Aliyun update response lacks RequestId or RecordId",
            )),
        }
    }
}

/// `UpdateDomainRecord` arguments, falling back to the existing record's settings.
fn update_args(record: &Record, desired: &DesiredState) -> Vec<(&'static str, String)> {
    let ttl = desired.ttl.or(record.ttl).unwrap_or(DEFAULT_TTL);
    let line = desired
        .line
        .clone()
        .or_else(|| record.line.clone())
        .unwrap_or_else(|| DEFAULT_LINE.to_string());

    let mut args = vec![
        ("RecordId", record.id.clone()),
        ("RR", relative_host(&desired.host).to_string()),
        ("Type", desired.record_type.clone()),
        ("Value", desired.value.clone()),
        ("TTL", ttl.to_string()),
        ("Line", line),
    ];
    // Alidns only reads Priority for MX records.
    if desired.record_type == "MX" {
        if let Some(priority) = desired.priority.or(record.priority) {
            args.push(("Priority", priority.to_string()));
        }
    }
    args
}

/// Sorted `k=v` pairs joined by `&`, both sides RFC 3986 encoded.
fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn string_to_sign(canonical: &str) -> String {
    format!("GET&{}&{}", encode("/"), encode(canonical))
}

fn sign(secret: &str, string_to_sign: &str) -> Result<String, StoreError> {
    let mut mac = HmacSha1::new_from_slice(format!("{secret}&").as_bytes())
        .map_err(|e| StoreError::Signing(e.to_string()))?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

// Aliyun API types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeDomainRecordsResponse {
    request_id: Option<String>,
    domain_records: Option<DomainRecords>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DomainRecords {
    #[serde(default)]
    record: Vec<AliyunRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AliyunRecord {
    record_id: String,
    #[serde(rename = "RR")]
    rr: String,
    domain_name: String,
    #[serde(rename = "Type")]
    record_type: String,
    value: String,
    #[serde(rename = "TTL")]
    ttl: Option<u32>,
    line: Option<String>,
    priority: Option<u32>,
}

impl AliyunRecord {
    fn into_record(self) -> Record {
        Record {
            id: self.record_id,
            name: full_name(&self.rr, &self.domain_name),
            record_type: self.record_type,
            value: self.value,
            ttl: self.ttl,
            line: self.line,
            priority: self.priority,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpdateDomainRecordResponse {
    request_id: Option<String>,
    record_id: Option<String>,
}
