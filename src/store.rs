use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::{DesiredState, Record};

/// One DNS provider's view of a zone, reduced to the two calls reconciliation needs.
///
/// Implementations own their credentials and transport. They must report a
/// failure (never an empty success) when the provider's payload does not
/// carry an explicit success indicator, and `update` must address the
/// record by its provider id so siblings with the same name are untouched.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn list(&self, domain: &str, host: &str, record_type: &str) -> Result<Vec<Record>, StoreError>;

    async fn update(&self, record: &Record, desired: &DesiredState) -> Result<(), StoreError>;
}
