#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use runlog_kernel_contracts::roster::SubmitterProfile;
use runlog_kernel_contracts::run::{
    DailyRunState, EvidenceFingerprint, RunDate, RunEntryId, RunEntryInput,
};
use runlog_kernel_contracts::submitter::SubmitterId;
use runlog_storage::ledger::{DailyCaps, RunLedgerStore, StorageError};
use runlog_storage::repo::{RosterRepo, RunLedgerRepo};

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The collaborator could not be reached; the operation may not have happened.
    Transport(String),
    Storage(StorageError),
}

impl From<StorageError> for GatewayError {
    fn from(e: StorageError) -> Self {
        GatewayError::Storage(e)
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Transport(reason) => write!(f, "transport failure: {reason}"),
            GatewayError::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

/// Identity directory plus run ledger, as seen by the submission flow.
pub trait RunLedgerGateway: Send + Sync {
    /// Active roster identities only.
    fn lookup_submitter(
        &self,
        submitter_id: &SubmitterId,
    ) -> Result<Option<SubmitterProfile>, GatewayError>;
    fn daily_state(
        &self,
        submitter_id: &SubmitterId,
        date: RunDate,
    ) -> Result<DailyRunState, GatewayError>;
    fn fingerprint_exists(&self, fingerprint: &EvidenceFingerprint)
        -> Result<bool, GatewayError>;
    fn append_guarded(
        &self,
        input: RunEntryInput,
        expected: DailyRunState,
        caps: DailyCaps,
    ) -> Result<RunEntryId, GatewayError>;
}

/// Process-local ledger shared between request handlers.
#[derive(Debug, Clone, Default)]
pub struct SharedRunLedger {
    inner: Arc<Mutex<RunLedgerStore>>,
}

impl SharedRunLedger {
    pub fn new(store: RunLedgerStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn with_store<R>(
        &self,
        f: impl FnOnce(&mut RunLedgerStore) -> R,
    ) -> Result<R, GatewayError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| GatewayError::Transport("run ledger lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

impl RunLedgerGateway for SharedRunLedger {
    fn lookup_submitter(
        &self,
        submitter_id: &SubmitterId,
    ) -> Result<Option<SubmitterProfile>, GatewayError> {
        self.with_store(|s| {
            RosterRepo::roster_row(&*s, submitter_id)
                .filter(|r| r.is_active())
                .map(SubmitterProfile::from)
        })
    }

    fn daily_state(
        &self,
        submitter_id: &SubmitterId,
        date: RunDate,
    ) -> Result<DailyRunState, GatewayError> {
        self.with_store(|s| RunLedgerRepo::daily_state(&*s, submitter_id, date))
    }

    fn fingerprint_exists(
        &self,
        fingerprint: &EvidenceFingerprint,
    ) -> Result<bool, GatewayError> {
        self.with_store(|s| s.has_fingerprint(fingerprint))
    }

    fn append_guarded(
        &self,
        input: RunEntryInput,
        expected: DailyRunState,
        caps: DailyCaps,
    ) -> Result<RunEntryId, GatewayError> {
        self.with_store(|s| s.append_run_entry_guarded(input, expected, caps))?
            .map_err(GatewayError::from)
    }
}
