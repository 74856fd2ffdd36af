use std::future::Future;
use std::time::Duration;

use crate::error::{InputError, StoreError};
use crate::record::{DesiredState, Record};
use crate::store::RecordStore;

/// Result of one reconciliation attempt.
#[derive(Debug)]
pub enum ReconcileOutcome {
    NoMatchingRecord,
    AlreadyCurrent { record_id: String },
    Updated { record_id: String, previous: String },
    ListFailed(StoreError),
    UpdateFailed(StoreError),
    InvalidInput(InputError),
}

/// Drives at most one list and one update per call. No retries and no
/// logging: the caller decides what to do with the outcome.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    call_timeout: Duration,
}

impl Reconciler {
    pub fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }

    pub async fn reconcile(&self, desired: &DesiredState, store: &dyn RecordStore) -> ReconcileOutcome {
        if let Err(e) = desired.validate() {
            return ReconcileOutcome::InvalidInput(e);
        }

        let candidates = match self
            .bounded(store.list(&desired.domain, &desired.host, &desired.record_type))
            .await
        {
            Ok(records) => records,
            Err(e) => return ReconcileOutcome::ListFailed(e),
        };

        let Some(matched) = select(&candidates, desired) else {
            return ReconcileOutcome::NoMatchingRecord;
        };

        if matched.value == desired.value {
            return ReconcileOutcome::AlreadyCurrent {
                record_id: matched.id.clone(),
            };
        }

        match self.bounded(store.update(matched, desired)).await {
            Ok(()) => ReconcileOutcome::Updated {
                record_id: matched.id.clone(),
                previous: matched.value.clone(),
            },
            Err(e) => ReconcileOutcome::UpdateFailed(e),
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.call_timeout))?
    }
}

/// First candidate in provider order with the desired name and type.
pub fn select<'a>(candidates: &'a [Record], desired: &DesiredState) -> Option<&'a Record> {
    candidates.iter().find(|r| r.matches(desired))
}
