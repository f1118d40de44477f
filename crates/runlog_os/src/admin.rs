#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use tracing::{info, warn};

use runlog_engines::auth::{AdminAuthRuntime, AuthRefusal};
use runlog_kernel_contracts::admin::{CapabilityGrant, CapabilityToken, RunEntryPatch};
use runlog_kernel_contracts::roster::RosterRecord;
use runlog_kernel_contracts::run::{DistanceKm, EvidenceRef, RunDate, RunEntry, RunEntryId};
use runlog_kernel_contracts::submitter::{SubmitterId, SubmitterIdPolicy};
use runlog_kernel_contracts::{ContractViolation, MonotonicTimeNs};
use runlog_storage::ledger::StorageError;
use runlog_storage::repo::{RosterRepo, RunLedgerRepo};

use crate::clock::OrgClock;
use crate::gateway::{GatewayError, SharedRunLedger};

#[derive(Debug, Clone, PartialEq)]
pub enum AdminRefusal {
    Unauthorized,
    NotFound,
    Invalid(ContractViolation),
    Storage(StorageError),
    /// The ledger could not be reached; nothing was changed.
    Unavailable(String),
}

impl From<ContractViolation> for AdminRefusal {
    fn from(v: ContractViolation) -> Self {
        AdminRefusal::Invalid(v)
    }
}

impl From<StorageError> for AdminRefusal {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { .. } => AdminRefusal::NotFound,
            StorageError::ContractViolation(v) => AdminRefusal::Invalid(v),
            other => AdminRefusal::Storage(other),
        }
    }
}

impl From<GatewayError> for AdminRefusal {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Storage(s) => s.into(),
            GatewayError::Transport(reason) => {
                warn!(%reason, "admin operation could not reach the ledger");
                AdminRefusal::Unavailable(reason)
            }
        }
    }
}

impl std::fmt::Display for AdminRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdminRefusal::Unauthorized => write!(f, "admin capability missing or expired"),
            AdminRefusal::NotFound => write!(f, "target not found"),
            AdminRefusal::Invalid(v) => write!(f, "invalid input: {v}"),
            AdminRefusal::Storage(e) => write!(f, "storage refused: {e}"),
            AdminRefusal::Unavailable(reason) => write!(f, "ledger unavailable: {reason}"),
        }
    }
}

/// Pass/fail check on an opaque admin capability.
pub trait AdminGate: Send + Sync {
    fn is_authorized(&self, token: &CapabilityToken, now: MonotonicTimeNs) -> bool;
}

/// Admin authentication shared between request handlers.
#[derive(Debug, Clone)]
pub struct SharedAdminAuth {
    inner: Arc<Mutex<AdminAuthRuntime>>,
}

impl SharedAdminAuth {
    pub fn new(runtime: AdminAuthRuntime) -> Self {
        Self {
            inner: Arc::new(Mutex::new(runtime)),
        }
    }

    pub fn login(&self, password: &str, now: MonotonicTimeNs) -> Result<CapabilityGrant, AuthRefusal> {
        let mut auth = self
            .inner
            .lock()
            .map_err(|_| AuthRefusal::InvalidCredentials)?;
        auth.login(password, now)
    }

    pub fn revoke(&self, token: &CapabilityToken) -> bool {
        match self.inner.lock() {
            Ok(mut auth) => auth.revoke(token),
            Err(_) => false,
        }
    }
}

impl AdminGate for SharedAdminAuth {
    fn is_authorized(&self, token: &CapabilityToken, now: MonotonicTimeNs) -> bool {
        match self.inner.lock() {
            Ok(auth) => auth.is_authorized(token, now),
            Err(_) => false,
        }
    }
}

/// Raw admin correction as it arrives from an outer surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRunEntryPatch {
    pub submitter_id: Option<String>,
    pub date: Option<String>,
    pub distance_km: Option<Decimal>,
    pub clear_evidence: bool,
}

/// Admin-gated corrections to run entries and the roster. Daily caps are not enforced here.
pub struct AdminOverrideRuntime<A: AdminGate> {
    ledger: SharedRunLedger,
    gate: A,
    clock: Arc<dyn OrgClock>,
    id_policy: SubmitterIdPolicy,
}

impl<A: AdminGate> AdminOverrideRuntime<A> {
    pub fn new(
        ledger: SharedRunLedger,
        gate: A,
        clock: Arc<dyn OrgClock>,
        id_policy: SubmitterIdPolicy,
    ) -> Self {
        Self {
            ledger,
            gate,
            clock,
            id_policy,
        }
    }

    fn authorize(&self, token: &CapabilityToken) -> Result<MonotonicTimeNs, AdminRefusal> {
        let now = self.clock.now();
        if !self.gate.is_authorized(token, now) {
            warn!("admin operation refused: unauthorized");
            return Err(AdminRefusal::Unauthorized);
        }
        Ok(now)
    }

    fn normalize(&self, raw: &str) -> Result<SubmitterId, AdminRefusal> {
        Ok(SubmitterId::normalize(raw, &self.id_policy)?)
    }

    /// Normalizes identifiers and validates shapes; an admin patch may still exceed daily caps.
    pub fn patch_from_raw(&self, raw: &RawRunEntryPatch) -> Result<RunEntryPatch, AdminRefusal> {
        let patch = RunEntryPatch {
            submitter_id: raw
                .submitter_id
                .as_deref()
                .map(|s| self.normalize(s))
                .transpose()?,
            date: raw.date.as_deref().map(RunDate::parse).transpose()?,
            distance_km: raw.distance_km.map(DistanceKm::new).transpose()?,
            clear_evidence: raw.clear_evidence,
        };
        if patch.is_empty() {
            return Err(AdminRefusal::Invalid(ContractViolation::InvalidValue {
                field: "run_entry_patch",
                reason: "must change at least one field",
            }));
        }
        Ok(patch)
    }

    pub fn update_run_entry(
        &self,
        token: &CapabilityToken,
        entry_id: RunEntryId,
        patch: &RunEntryPatch,
    ) -> Result<RunEntry, AdminRefusal> {
        let now = self.authorize(token)?;
        let entry = self
            .ledger
            .with_store(|s| RunLedgerRepo::admin_update_run_entry(s, entry_id, patch, now))??;
        info!(entry = %entry_id, submitter = %entry.submitter_id, "admin updated run entry");
        Ok(entry)
    }

    pub fn delete_run_entry(
        &self,
        token: &CapabilityToken,
        entry_id: RunEntryId,
    ) -> Result<RunEntry, AdminRefusal> {
        let now = self.authorize(token)?;
        let removed = self
            .ledger
            .with_store(|s| RunLedgerRepo::admin_delete_run_entry(s, entry_id, now))??;
        info!(entry = %entry_id, submitter = %removed.submitter_id, "admin deleted run entry");
        Ok(removed)
    }

    /// Stored proof image for an entry, for review before a correction.
    pub fn run_entry_evidence(
        &self,
        token: &CapabilityToken,
        entry_id: RunEntryId,
    ) -> Result<(EvidenceRef, Vec<u8>), AdminRefusal> {
        self.authorize(token)?;
        let found = self.ledger.with_store(|s| {
            let evidence = RunLedgerRepo::run_entry(&*s, entry_id)?.evidence.clone()?;
            let bytes = RunLedgerRepo::evidence_blob(&*s, &evidence.fingerprint)?.to_vec();
            Some((evidence, bytes))
        })?;
        found.ok_or(AdminRefusal::NotFound)
    }

    pub fn add_roster_identity(
        &self,
        token: &CapabilityToken,
        raw_submitter_id: &str,
        display_name: &str,
        station: &str,
    ) -> Result<RosterRecord, AdminRefusal> {
        let now = self.authorize(token)?;
        let id = self.normalize(raw_submitter_id)?;
        let record = RosterRecord::v1(id, display_name.to_string(), station.to_string(), now)?;
        self.ledger
            .with_store(|s| RosterRepo::insert_roster_row(s, record.clone()))??;
        info!(submitter = %record.submitter_id, "admin added roster identity");
        Ok(record)
    }

    /// Updates profile fields and reactivates the identity.
    pub fn update_roster_identity(
        &self,
        token: &CapabilityToken,
        raw_submitter_id: &str,
        display_name: &str,
        station: &str,
    ) -> Result<RosterRecord, AdminRefusal> {
        let now = self.authorize(token)?;
        let id = self.normalize(raw_submitter_id)?;
        let record = self.ledger.with_store(|s| {
            RosterRepo::update_roster_row(s, &id, display_name.to_string(), station.to_string(), now)
        })??;
        info!(submitter = %record.submitter_id, "admin updated roster identity");
        Ok(record)
    }

    /// Adds the identity if unknown, otherwise updates it.
    pub fn upsert_roster_identity(
        &self,
        token: &CapabilityToken,
        raw_submitter_id: &str,
        display_name: &str,
        station: &str,
    ) -> Result<RosterRecord, AdminRefusal> {
        match self.update_roster_identity(token, raw_submitter_id, display_name, station) {
            Err(AdminRefusal::NotFound) => {
                self.add_roster_identity(token, raw_submitter_id, display_name, station)
            }
            other => other,
        }
    }

    pub fn deactivate_roster_identity(
        &self,
        token: &CapabilityToken,
        raw_submitter_id: &str,
    ) -> Result<SubmitterId, AdminRefusal> {
        let now = self.authorize(token)?;
        let id = self.normalize(raw_submitter_id)?;
        self.ledger
            .with_store(|s| RosterRepo::deactivate_roster_row(s, &id, now))??;
        info!(submitter = %id, "admin deactivated roster identity");
        Ok(id)
    }

    pub fn list_roster(&self, token: &CapabilityToken) -> Result<Vec<RosterRecord>, AdminRefusal> {
        self.authorize(token)?;
        Ok(self
            .ledger
            .with_store(|s| RosterRepo::roster_rows(&*s).values().cloned().collect())?)
    }
}
