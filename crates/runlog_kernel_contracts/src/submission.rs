#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use crate::run::{DailyRunState, DistanceKm, EvidenceFingerprint, RunDate, RunEntryId};
use crate::submitter::SubmitterId;
use crate::ReasonCodeId;

pub mod reason_codes {
    use crate::ReasonCodeId;

    // Run submission reason-code namespace ("RN").
    pub const RUN_OK_ADMITTED: ReasonCodeId = ReasonCodeId(0x524E_0001);

    pub const RUN_DATE_INVALID: ReasonCodeId = ReasonCodeId(0x524E_0010);
    pub const RUN_DISTANCE_INVALID: ReasonCodeId = ReasonCodeId(0x524E_0011);
    pub const RUN_MAX_ENTRIES_REACHED: ReasonCodeId = ReasonCodeId(0x524E_0012);
    pub const RUN_CEILING_REACHED: ReasonCodeId = ReasonCodeId(0x524E_0013);
    pub const RUN_WOULD_EXCEED_CEILING: ReasonCodeId = ReasonCodeId(0x524E_0014);
    pub const RUN_EVIDENCE_INVALID: ReasonCodeId = ReasonCodeId(0x524E_0015);
    pub const RUN_DUPLICATE_EVIDENCE: ReasonCodeId = ReasonCodeId(0x524E_0016);
    pub const RUN_UNKNOWN_SUBMITTER: ReasonCodeId = ReasonCodeId(0x524E_0017);
    pub const RUN_CONCURRENT_CONFLICT: ReasonCodeId = ReasonCodeId(0x524E_0018);

    pub const RUN_TRANSPORT_FAILURE: ReasonCodeId = ReasonCodeId(0x524E_00F1);
}

/// Raw evidence as uploaded. Only the fingerprint is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceUpload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub raw_submitter_id: String,
    pub date: RunDate,
    pub distance_km: Decimal,
    pub evidence: Option<EvidenceUpload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    RejectedDateInvalid,
    RejectedDistanceInvalid,
    RejectedMaxEntriesReached,
    RejectedCeilingReached,
    RejectedWouldExceedCeiling,
    RejectedEvidenceInvalid,
    RejectedDuplicateEvidence,
    RejectedUnknownSubmitter,
    RejectedConcurrentConflict,
    TransportFailure,
}

impl RejectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionKind::RejectedDateInvalid => "REJECTED_DATE_INVALID",
            RejectionKind::RejectedDistanceInvalid => "REJECTED_DISTANCE_INVALID",
            RejectionKind::RejectedMaxEntriesReached => "REJECTED_MAX_ENTRIES_REACHED",
            RejectionKind::RejectedCeilingReached => "REJECTED_CEILING_REACHED",
            RejectionKind::RejectedWouldExceedCeiling => "REJECTED_WOULD_EXCEED_CEILING",
            RejectionKind::RejectedEvidenceInvalid => "REJECTED_EVIDENCE_INVALID",
            RejectionKind::RejectedDuplicateEvidence => "REJECTED_DUPLICATE_EVIDENCE",
            RejectionKind::RejectedUnknownSubmitter => "REJECTED_UNKNOWN_SUBMITTER",
            RejectionKind::RejectedConcurrentConflict => "REJECTED_CONCURRENT_CONFLICT",
            RejectionKind::TransportFailure => "TRANSPORT_FAILURE",
        }
    }
}

/// What the caller should do after a refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryAdvice {
    DoNotRetry,
    RetryWithSmallerDistance,
    RetryFullSubmissionOnce,
}

impl RetryAdvice {
    pub fn as_str(self) -> &'static str {
        match self {
            RetryAdvice::DoNotRetry => "DO_NOT_RETRY",
            RetryAdvice::RetryWithSmallerDistance => "RETRY_WITH_SMALLER_DISTANCE",
            RetryAdvice::RetryFullSubmissionOnce => "RETRY_FULL_SUBMISSION_ONCE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportPhase {
    Read,
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionRefusal {
    DateInvalid { today: RunDate },
    DistanceInvalid { reason: &'static str },
    MaxEntriesReached { count: u32 },
    CeilingReached,
    WouldExceedCeiling { remaining_km: Decimal },
    EvidenceInvalid { reason: &'static str },
    DuplicateEvidence { fingerprint: EvidenceFingerprint },
    UnknownSubmitter,
    ConcurrentConflict,
    TransportFailure { phase: TransportPhase },
}

impl SubmissionRefusal {
    pub fn kind(&self) -> RejectionKind {
        match self {
            SubmissionRefusal::DateInvalid { .. } => RejectionKind::RejectedDateInvalid,
            SubmissionRefusal::DistanceInvalid { .. } => RejectionKind::RejectedDistanceInvalid,
            SubmissionRefusal::MaxEntriesReached { .. } => {
                RejectionKind::RejectedMaxEntriesReached
            }
            SubmissionRefusal::CeilingReached => RejectionKind::RejectedCeilingReached,
            SubmissionRefusal::WouldExceedCeiling { .. } => {
                RejectionKind::RejectedWouldExceedCeiling
            }
            SubmissionRefusal::EvidenceInvalid { .. } => RejectionKind::RejectedEvidenceInvalid,
            SubmissionRefusal::DuplicateEvidence { .. } => {
                RejectionKind::RejectedDuplicateEvidence
            }
            SubmissionRefusal::UnknownSubmitter => RejectionKind::RejectedUnknownSubmitter,
            SubmissionRefusal::ConcurrentConflict => RejectionKind::RejectedConcurrentConflict,
            SubmissionRefusal::TransportFailure { .. } => RejectionKind::TransportFailure,
        }
    }

    pub fn reason_code(&self) -> ReasonCodeId {
        match self.kind() {
            RejectionKind::RejectedDateInvalid => reason_codes::RUN_DATE_INVALID,
            RejectionKind::RejectedDistanceInvalid => reason_codes::RUN_DISTANCE_INVALID,
            RejectionKind::RejectedMaxEntriesReached => reason_codes::RUN_MAX_ENTRIES_REACHED,
            RejectionKind::RejectedCeilingReached => reason_codes::RUN_CEILING_REACHED,
            RejectionKind::RejectedWouldExceedCeiling => reason_codes::RUN_WOULD_EXCEED_CEILING,
            RejectionKind::RejectedEvidenceInvalid => reason_codes::RUN_EVIDENCE_INVALID,
            RejectionKind::RejectedDuplicateEvidence => reason_codes::RUN_DUPLICATE_EVIDENCE,
            RejectionKind::RejectedUnknownSubmitter => reason_codes::RUN_UNKNOWN_SUBMITTER,
            RejectionKind::RejectedConcurrentConflict => reason_codes::RUN_CONCURRENT_CONFLICT,
            RejectionKind::TransportFailure => reason_codes::RUN_TRANSPORT_FAILURE,
        }
    }

    pub fn retry_advice(&self) -> RetryAdvice {
        match self {
            SubmissionRefusal::WouldExceedCeiling { .. } => RetryAdvice::RetryWithSmallerDistance,
            SubmissionRefusal::ConcurrentConflict | SubmissionRefusal::TransportFailure { .. } => {
                RetryAdvice::RetryFullSubmissionOnce
            }
            _ => RetryAdvice::DoNotRetry,
        }
    }

    /// Remaining headroom for the day, when the refusal is about the ceiling.
    pub fn remaining_km(&self) -> Option<Decimal> {
        match self {
            SubmissionRefusal::CeilingReached => Some(Decimal::ZERO),
            SubmissionRefusal::WouldExceedCeiling { remaining_km } => Some(*remaining_km),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            SubmissionRefusal::DateInvalid { today } => {
                format!("entries can only be logged for today ({today})")
            }
            SubmissionRefusal::DistanceInvalid { reason } => format!("invalid distance: {reason}"),
            SubmissionRefusal::MaxEntriesReached { count } => {
                format!("daily entry limit reached ({count} entries today)")
            }
            SubmissionRefusal::CeilingReached => "daily distance ceiling reached".to_string(),
            SubmissionRefusal::WouldExceedCeiling { remaining_km } => {
                format!("distance exceeds the daily ceiling; at most {remaining_km:.2} km remains")
            }
            SubmissionRefusal::EvidenceInvalid { reason } => format!("invalid evidence: {reason}"),
            SubmissionRefusal::DuplicateEvidence { .. } => {
                "this evidence image was already used for another entry".to_string()
            }
            SubmissionRefusal::UnknownSubmitter => "submitter is not on the roster".to_string(),
            SubmissionRefusal::ConcurrentConflict => {
                "the day's entries changed while submitting; re-submit once".to_string()
            }
            SubmissionRefusal::TransportFailure { phase } => match phase {
                TransportPhase::Read => "run ledger unavailable; try again later".to_string(),
                TransportPhase::Append => {
                    "run ledger write failed; re-submit to re-run all checks".to_string()
                }
            },
        }
    }
}

/// Result of the admission check against the submitter's prior entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionGrant {
    pub prior: DailyRunState,
    pub distance_km: DistanceKm,
    pub remaining_km: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Admitted(AdmissionGrant),
    Refused(SubmissionRefusal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub entry_id: RunEntryId,
    pub submitter_id: SubmitterId,
    pub date: RunDate,
    pub distance_km: DistanceKm,
    pub daily: DailyRunState,
    pub remaining_km: Decimal,
    pub fingerprint: Option<EvidenceFingerprint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Admitted(SubmissionReceipt),
    Refused(SubmissionRefusal),
}

impl SubmissionOutcome {
    pub fn refusal_kind(&self) -> Option<RejectionKind> {
        match self {
            SubmissionOutcome::Admitted(_) => None,
            SubmissionOutcome::Refused(r) => Some(r.kind()),
        }
    }
}
