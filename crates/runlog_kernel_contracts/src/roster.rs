#![forbid(unsafe_code)]

use crate::common::validate_text;
use crate::submitter::SubmitterId;
use crate::{ContractViolation, MonotonicTimeNs, SchemaVersion, Validate};

pub const ROSTER_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RosterStatus {
    Active,
    Inactive,
}

/// One registered identity. Only `Active` rows resolve for submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRecord {
    pub schema_version: SchemaVersion,
    pub submitter_id: SubmitterId,
    pub display_name: String,
    pub station: String,
    pub status: RosterStatus,
    pub created_at: MonotonicTimeNs,
    pub updated_at: MonotonicTimeNs,
}

impl RosterRecord {
    pub fn v1(
        submitter_id: SubmitterId,
        display_name: String,
        station: String,
        created_at: MonotonicTimeNs,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: ROSTER_CONTRACT_VERSION,
            submitter_id,
            display_name: display_name.trim().to_string(),
            station: station.trim().to_string(),
            status: RosterStatus::Active,
            created_at,
            updated_at: created_at,
        };
        r.validate()?;
        Ok(r)
    }

    pub fn is_active(&self) -> bool {
        self.status == RosterStatus::Active
    }
}

impl Validate for RosterRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != ROSTER_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "roster_record.schema_version",
                reason: "must match ROSTER_CONTRACT_VERSION",
            });
        }
        self.submitter_id.validate()?;
        validate_text("roster_record.display_name", &self.display_name, 128)?;
        validate_text("roster_record.station", &self.station, 128)?;
        if self.created_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "roster_record.created_at",
                reason: "must be > 0",
            });
        }
        if self.updated_at < self.created_at {
            return Err(ContractViolation::InvalidValue {
                field: "roster_record.updated_at",
                reason: "must be >= created_at",
            });
        }
        Ok(())
    }
}

/// Denormalized profile fields returned by the identity directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitterProfile {
    pub submitter_id: SubmitterId,
    pub display_name: String,
    pub station: String,
}

impl From<&RosterRecord> for SubmitterProfile {
    fn from(r: &RosterRecord) -> Self {
        Self {
            submitter_id: r.submitter_id.clone(),
            display_name: r.display_name.clone(),
            station: r.station.clone(),
        }
    }
}
