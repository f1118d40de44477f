#![forbid(unsafe_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use runlog_engines::admission::{AdmissionConfig, AdmissionRuntime};
use runlog_engines::evidence::{EvidenceConfig, EvidenceRuntime};
use runlog_kernel_contracts::run::{DailyRunState, RunDate, RunEntryInput};
use runlog_kernel_contracts::submission::{
    AdmissionOutcome, SubmissionOutcome, SubmissionReceipt, SubmissionRefusal, SubmissionRequest,
    TransportPhase,
};
use runlog_kernel_contracts::submitter::{SubmitterId, SubmitterIdPolicy};
use runlog_kernel_contracts::{ContractViolation, Validate};
use runlog_storage::ledger::{DailyCaps, StorageError};

use crate::clock::OrgClock;
use crate::gateway::{GatewayError, RunLedgerGateway};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionConfig {
    pub id_policy: SubmitterIdPolicy,
    pub admission: AdmissionConfig,
    pub evidence: EvidenceConfig,
    /// Extra attempts for read-phase calls that fail in transport.
    pub read_retry_budget: u8,
}

impl SubmissionConfig {
    pub fn mvp_v1() -> Self {
        Self {
            id_policy: SubmitterIdPolicy::mvp_v1(),
            admission: AdmissionConfig::mvp_v1(),
            evidence: EvidenceConfig::mvp_v1(),
            read_retry_budget: 1,
        }
    }
}

impl Validate for SubmissionConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.id_policy.validate()?;
        self.admission.validate()?;
        self.evidence.validate()?;
        if self.read_retry_budget > 1 {
            return Err(ContractViolation::InvalidValue {
                field: "submission_config.read_retry_budget",
                reason: "must be 0 or 1",
            });
        }
        Ok(())
    }
}

/// Read-only view of a submitter's day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyStateView {
    pub submitter_id: SubmitterId,
    pub date: RunDate,
    pub state: DailyRunState,
    pub remaining_km: Decimal,
    pub entries_left: u32,
}

/// Composes identity lookup, admission, evidence dedup and the guarded ledger append.
pub struct SubmissionOrchestrator<G: RunLedgerGateway> {
    gateway: G,
    clock: Arc<dyn OrgClock>,
    config: SubmissionConfig,
    admission: AdmissionRuntime,
    evidence: EvidenceRuntime,
}

impl<G: RunLedgerGateway> SubmissionOrchestrator<G> {
    pub fn new(
        gateway: G,
        clock: Arc<dyn OrgClock>,
        config: SubmissionConfig,
    ) -> Result<Self, ContractViolation> {
        config.validate()?;
        Ok(Self {
            admission: AdmissionRuntime::new(config.admission),
            evidence: EvidenceRuntime::new(config.evidence),
            gateway,
            clock,
            config,
        })
    }

    pub fn config(&self) -> &SubmissionConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn OrgClock> {
        &self.clock
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn submit(&self, req: &SubmissionRequest) -> SubmissionOutcome {
        match self.submit_inner(req) {
            Ok(receipt) => {
                info!(
                    submitter = %receipt.submitter_id,
                    entry = %receipt.entry_id,
                    distance_km = %receipt.distance_km,
                    day_total_km = %receipt.daily.total_km,
                    "run entry admitted"
                );
                SubmissionOutcome::Admitted(receipt)
            }
            Err(refusal) => {
                info!(
                    raw_submitter = %req.raw_submitter_id,
                    kind = refusal.kind().as_str(),
                    "run submission refused"
                );
                SubmissionOutcome::Refused(refusal)
            }
        }
    }

    fn submit_inner(&self, req: &SubmissionRequest) -> Result<SubmissionReceipt, SubmissionRefusal> {
        let submitter_id = SubmitterId::normalize(&req.raw_submitter_id, &self.config.id_policy)
            .map_err(|_| SubmissionRefusal::UnknownSubmitter)?;
        let profile = self
            .read_with_retry("lookup_submitter", || {
                self.gateway.lookup_submitter(&submitter_id)
            })?
            .ok_or(SubmissionRefusal::UnknownSubmitter)?;

        let prior = self.read_with_retry("daily_state", || {
            self.gateway.daily_state(&submitter_id, req.date)
        })?;
        let grant = match self.admission.evaluate(
            &submitter_id,
            req.date,
            self.clock.today(),
            req.distance_km,
            &prior,
        ) {
            AdmissionOutcome::Admitted(grant) => grant,
            AdmissionOutcome::Refused(refusal) => return Err(refusal),
        };

        let evidence = self.evidence.admit(req.evidence.as_ref())?;
        if let Some(e) = &evidence {
            let seen = self.read_with_retry("fingerprint_exists", || {
                self.gateway.fingerprint_exists(&e.fingerprint)
            })?;
            if seen {
                return Err(SubmissionRefusal::DuplicateEvidence {
                    fingerprint: e.fingerprint.clone(),
                });
            }
        }
        let fingerprint = evidence.as_ref().map(|e| e.fingerprint.clone());

        let input = RunEntryInput::v1(
            profile.submitter_id.clone(),
            profile.display_name,
            profile.station,
            req.date,
            grant.distance_km,
            evidence,
            self.clock.now(),
        )
        .map_err(|v| {
            warn!(violation = %v, "run entry input failed contract validation");
            refusal_for_input_violation(&v)
        })?;

        let caps = DailyCaps {
            max_entries_per_day: self.config.admission.max_entries_per_day,
            daily_ceiling_km: self.config.admission.daily_ceiling_km,
        };
        let entry_id = self
            .gateway
            .append_guarded(input, grant.prior, caps)
            .map_err(|e| self.map_append_error(e, fingerprint.as_ref()))?;

        Ok(SubmissionReceipt {
            entry_id,
            submitter_id,
            date: req.date,
            distance_km: grant.distance_km,
            daily: grant.prior.with_entry(grant.distance_km),
            remaining_km: grant.remaining_km,
            fingerprint,
        })
    }

    /// Normalized daily totals for display. Does not check the roster.
    pub fn daily_state(
        &self,
        raw_submitter_id: &str,
        date: RunDate,
    ) -> Result<DailyStateView, SubmissionRefusal> {
        let submitter_id = SubmitterId::normalize(raw_submitter_id, &self.config.id_policy)
            .map_err(|_| SubmissionRefusal::UnknownSubmitter)?;
        let state = self.read_with_retry("daily_state", || {
            self.gateway.daily_state(&submitter_id, date)
        })?;
        let remaining_km =
            (self.config.admission.daily_ceiling_km - state.total_km).max(Decimal::ZERO);
        let entries_left = self
            .config
            .admission
            .max_entries_per_day
            .saturating_sub(state.count);
        Ok(DailyStateView {
            submitter_id,
            date,
            state,
            remaining_km,
            entries_left,
        })
    }

    fn read_with_retry<T>(
        &self,
        op: &'static str,
        f: impl Fn() -> Result<T, GatewayError>,
    ) -> Result<T, SubmissionRefusal> {
        let mut attempt: u8 = 0;
        loop {
            match f() {
                Ok(v) => return Ok(v),
                Err(GatewayError::Transport(reason)) if attempt < self.config.read_retry_budget => {
                    attempt += 1;
                    warn!(op, %reason, attempt, "ledger read failed; retrying");
                }
                Err(e) => {
                    warn!(op, error = %e, "ledger read failed");
                    return Err(SubmissionRefusal::TransportFailure {
                        phase: TransportPhase::Read,
                    });
                }
            }
        }
    }

    fn map_append_error(
        &self,
        e: GatewayError,
        fingerprint: Option<&runlog_kernel_contracts::run::EvidenceFingerprint>,
    ) -> SubmissionRefusal {
        match e {
            GatewayError::Storage(StorageError::StaleDailyState { .. })
            | GatewayError::Storage(StorageError::DailyCapViolation { .. }) => {
                warn!("daily state changed before append; refusing with conflict");
                SubmissionRefusal::ConcurrentConflict
            }
            GatewayError::Storage(StorageError::DuplicateKey { table, .. })
                if table == "run_entries.evidence_fingerprint" =>
            {
                match fingerprint {
                    Some(fp) => SubmissionRefusal::DuplicateEvidence {
                        fingerprint: fp.clone(),
                    },
                    None => SubmissionRefusal::ConcurrentConflict,
                }
            }
            GatewayError::Storage(StorageError::ForeignKeyViolation { .. }) => {
                SubmissionRefusal::UnknownSubmitter
            }
            other => {
                error!(error = %other, "run ledger append failed");
                SubmissionRefusal::TransportFailure {
                    phase: TransportPhase::Append,
                }
            }
        }
    }
}

/// A malformed append request cannot succeed on retry; report it as a final refusal.
fn refusal_for_input_violation(v: &ContractViolation) -> SubmissionRefusal {
    let field = match v {
        ContractViolation::InvalidValue { field, .. }
        | ContractViolation::InvalidRange { field, .. }
        | ContractViolation::NotFinite { field } => *field,
    };
    if field.starts_with("run_entry_input.evidence") || field == "evidence_fingerprint" {
        SubmissionRefusal::EvidenceInvalid {
            reason: "evidence metadata is invalid",
        }
    } else if field == "distance_km" {
        SubmissionRefusal::DistanceInvalid {
            reason: "distance is invalid",
        }
    } else {
        // Roster profile or submitter id is unusable for an entry.
        SubmissionRefusal::UnknownSubmitter
    }
}
