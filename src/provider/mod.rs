pub mod aliyun;
pub mod cloudflare;
pub mod namesilo;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Client;

use crate::config::Endpoints;
use crate::error::{InputError, StoreError};
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Aliyun,
    Cloudflare,
    Namesilo,
}

impl FromStr for ProviderKind {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aliyun" | "alidns" => Ok(Self::Aliyun),
            "cloudflare" => Ok(Self::Cloudflare),
            "namesilo" => Ok(Self::Namesilo),
            _ => Err(InputError::UnknownProvider(s.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Aliyun => "aliyun",
            Self::Cloudflare => "cloudflare",
            Self::Namesilo => "namesilo",
        };
        f.write_str(name)
    }
}

/// Per-request credential fields. Never stored beyond the request.
#[derive(Clone, Default)]
pub struct Credentials {
    pub access_key_id: Option<String>,
    pub access_key_secret: Option<String>,
    pub token: Option<String>,
    pub zone: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &redact(&self.access_key_secret))
            .field("token", &redact(&self.token))
            .field("zone", &self.zone)
            .finish()
    }
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, InputError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(InputError::MissingCredential(field))
}

/// Builds the store for one request. No network traffic happens here.
pub fn build_store(
    kind: ProviderKind,
    credentials: &Credentials,
    endpoints: &Endpoints,
    timeout: Duration,
) -> Result<Box<dyn RecordStore>, BuildError> {
    let store: Box<dyn RecordStore> = match kind {
        ProviderKind::Aliyun => Box::new(aliyun::AliyunStore::new(
            &endpoints.aliyun,
            required(&credentials.access_key_id, "id")?,
            required(&credentials.access_key_secret, "secret")?,
            timeout,
        )?),
        ProviderKind::Cloudflare => Box::new(cloudflare::CloudflareStore::new(
            &endpoints.cloudflare,
            required(&credentials.token, "token")?,
            required(&credentials.zone, "zone")?,
            timeout,
        )?),
        ProviderKind::Namesilo => Box::new(namesilo::NamesiloStore::new(
            &endpoints.namesilo,
            required(&credentials.token, "token")?,
            timeout,
        )?),
    };
    Ok(store)
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Client(#[from] StoreError),
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client, StoreError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!("ddns-reconcile/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Reads a response body, keeping it for error messages even when the status is bad.
pub(crate) async fn read_body(response: reqwest::Response) -> Result<(reqwest::StatusCode, String), StoreError> {
    let status = response.status();
    let body = response.text().await?;
    Ok((status, body))
}

pub(crate) fn truncate(body: &str) -> String {
    const MAX: usize = 256;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
