#![forbid(unsafe_code)]

use crate::run::{DistanceKm, RunDate};
use crate::submitter::SubmitterId;
use crate::{ContractViolation, MonotonicTimeNs, Validate};

/// Opaque capability issued by the admin authentication boundary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CapabilityToken(String);

impl CapabilityToken {
    pub fn new(value: impl Into<String>) -> Result<Self, ContractViolation> {
        let t = Self(value.into());
        t.validate()?;
        Ok(t)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for CapabilityToken {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.len() < 16 || self.0.len() > 128 {
            return Err(ContractViolation::InvalidValue {
                field: "capability_token",
                reason: "must be 16..=128 characters",
            });
        }
        if !self
            .0
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ContractViolation::InvalidValue {
                field: "capability_token",
                reason: "must be base64url",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityGrant {
    pub token: CapabilityToken,
    pub issued_at: MonotonicTimeNs,
    pub expires_at: MonotonicTimeNs,
}

/// Admin correction of a stored run entry. Fields left `None` are unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunEntryPatch {
    pub submitter_id: Option<SubmitterId>,
    pub date: Option<RunDate>,
    pub distance_km: Option<DistanceKm>,
    pub clear_evidence: bool,
}

impl RunEntryPatch {
    pub fn is_empty(&self) -> bool {
        self.submitter_id.is_none()
            && self.date.is_none()
            && self.distance_km.is_none()
            && !self.clear_evidence
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerActor {
    Submitter(SubmitterId),
    Admin,
}
