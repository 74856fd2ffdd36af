use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::InputError;

/// Host label that addresses the zone apex.
pub const APEX: &str = "@";

/// What the caller wants the record to look like. Built once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub domain: String,
    pub host: String,
    pub full_name: String,
    pub record_type: String,
    pub value: String,
    pub ttl: Option<u32>,
    pub priority: Option<u32>,
    pub line: Option<String>,
}

impl DesiredState {
    pub fn new(domain: &str, host: &str, record_type: &str, value: &str) -> Self {
        let domain = normalize_name(domain);
        let host = host.trim().to_string();
        Self {
            full_name: full_name(&host, &domain),
            domain,
            host,
            record_type: record_type.trim().to_ascii_uppercase(),
            value: value.trim().to_string(),
            ttl: None,
            priority: None,
            line: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Option<u32>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_priority(mut self, priority: Option<u32>) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_line(mut self, line: Option<String>) -> Self {
        self.line = line.filter(|l| !l.trim().is_empty());
        self
    }

    pub fn is_apex(&self) -> bool {
        self.host == APEX
    }

    pub fn validate(&self) -> Result<(), InputError> {
        if self.domain.is_empty() {
            return Err(InputError::MissingField("domain"));
        }
        if self.host.is_empty() {
            return Err(InputError::MissingField("record"));
        }
        if self.record_type.is_empty() {
            return Err(InputError::MissingField("type"));
        }
        if self.value.is_empty() {
            return Err(InputError::MissingField("ip"));
        }
        if self.ttl == Some(0) {
            return Err(InputError::InvalidTtl);
        }

        let valid = match self.record_type.as_str() {
            "A" => self.value.parse::<Ipv4Addr>().is_ok(),
            "AAAA" => self.value.parse::<Ipv6Addr>().is_ok(),
            _ => !self.value.contains(char::is_whitespace),
        };
        if !valid {
            return Err(InputError::InvalidValue {
                record_type: self.record_type.clone(),
                value: self.value.clone(),
            });
        }

        Ok(())
    }
}

/// A provider's existing record, normalized from its wire shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    /// Fully-qualified, lower-case, no trailing dot.
    pub name: String,
    pub record_type: String,
    pub value: String,
    pub ttl: Option<u32>,
    pub line: Option<String>,
    pub priority: Option<u32>,
}

impl Record {
    pub fn matches(&self, desired: &DesiredState) -> bool {
        self.name.eq_ignore_ascii_case(&desired.full_name)
            && self.record_type.eq_ignore_ascii_case(&desired.record_type)
    }
}

/// Lower-cases a DNS name and strips surrounding whitespace and the root dot.
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Joins a relative host and its zone, mapping the apex label to the zone itself.
pub fn full_name(host: &str, domain: &str) -> String {
    let host = host.trim();
    if host.is_empty() || host == APEX {
        normalize_name(domain)
    } else {
        normalize_name(&format!("{host}.{domain}"))
    }
}
