#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::common::validate_text;
use crate::submitter::SubmitterId;
use crate::{ContractViolation, MonotonicTimeNs, SchemaVersion, Validate};

pub const RUN_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Fractional digits allowed on any distance value.
pub const DISTANCE_KM_MAX_SCALE: u32 = 2;
/// Absolute sanity bound; the configured per-entry ceiling is always lower.
pub const DISTANCE_KM_ABSOLUTE_MAX: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunEntryId(pub u64);

impl Validate for RunEntryId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "run_entry_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

impl fmt::Display for RunEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run_{:08}", self.0)
    }
}

/// Calendar date in the organization's fixed timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunDate(NaiveDate);

impl RunDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Strict `YYYY-MM-DD`.
    pub fn parse(value: &str) -> Result<Self, ContractViolation> {
        let value = value.trim();
        if value.len() != 10 {
            return Err(ContractViolation::InvalidValue {
                field: "run_date",
                reason: "must be formatted YYYY-MM-DD",
            });
        }
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| ContractViolation::InvalidValue {
                field: "run_date",
                reason: "must be formatted YYYY-MM-DD",
            })
    }

    pub fn as_naive(self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for RunDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Positive distance with at most two fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DistanceKm(Decimal);

impl DistanceKm {
    pub fn new(value: Decimal) -> Result<Self, ContractViolation> {
        let d = Self(value.normalize());
        d.validate()?;
        Ok(d)
    }

    pub fn parse(value: &str) -> Result<Self, ContractViolation> {
        let parsed =
            Decimal::from_str(value.trim()).map_err(|_| ContractViolation::InvalidValue {
                field: "distance_km",
                reason: "must be a decimal number",
            })?;
        Self::new(parsed)
    }

    pub fn value(self) -> Decimal {
        self.0
    }
}

impl Validate for DistanceKm {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 <= Decimal::ZERO {
            return Err(ContractViolation::InvalidValue {
                field: "distance_km",
                reason: "must be > 0",
            });
        }
        if self.0.normalize().scale() > DISTANCE_KM_MAX_SCALE {
            return Err(ContractViolation::InvalidValue {
                field: "distance_km",
                reason: "must have at most 2 fractional digits",
            });
        }
        if self.0 > DISTANCE_KM_ABSOLUTE_MAX {
            return Err(ContractViolation::InvalidValue {
                field: "distance_km",
                reason: "exceeds absolute maximum",
            });
        }
        Ok(())
    }
}

impl fmt::Display for DistanceKm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Lowercase hex SHA-256 of the raw evidence bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EvidenceFingerprint(String);

impl EvidenceFingerprint {
    pub fn from_hex(value: &str) -> Result<Self, ContractViolation> {
        let f = Self(value.to_ascii_lowercase());
        f.validate()?;
        Ok(f)
    }

    pub fn from_digest(digest: &[u8; 32]) -> Self {
        Self(digest.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for EvidenceFingerprint {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.len() != 64 {
            return Err(ContractViolation::InvalidValue {
                field: "evidence_fingerprint",
                reason: "must be 64 hex characters",
            });
        }
        if !self
            .0
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(ContractViolation::InvalidValue {
                field: "evidence_fingerprint",
                reason: "must be lowercase hex",
            });
        }
        Ok(())
    }
}

impl fmt::Display for EvidenceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Count and cumulative distance for one (submitter, date) key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyRunState {
    pub count: u32,
    pub total_km: Decimal,
}

impl DailyRunState {
    pub fn empty() -> Self {
        Self {
            count: 0,
            total_km: Decimal::ZERO,
        }
    }

    pub fn with_entry(self, distance: DistanceKm) -> Self {
        Self {
            count: self.count.saturating_add(1),
            total_km: self.total_km + distance.value(),
        }
    }
}

/// Ledger append request for a new run entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEntryInput {
    pub schema_version: SchemaVersion,
    pub submitter_id: SubmitterId,
    pub display_name: String,
    pub station: String,
    pub date: RunDate,
    pub distance_km: DistanceKm,
    pub evidence: Option<EvidencePayload>,
    pub created_at: MonotonicTimeNs,
}

/// Evidence metadata kept on a run entry. The image itself lives in the store's blob table,
/// keyed by `fingerprint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceRef {
    pub fingerprint: EvidenceFingerprint,
    pub mime_type: String,
    pub byte_len: u64,
}

/// Accepted evidence as it travels with an append request.
#[derive(Clone, PartialEq, Eq)]
pub struct EvidencePayload {
    pub fingerprint: EvidenceFingerprint,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl EvidencePayload {
    pub fn reference(&self) -> EvidenceRef {
        EvidenceRef {
            fingerprint: self.fingerprint.clone(),
            mime_type: self.mime_type.clone(),
            byte_len: self.bytes.len() as u64,
        }
    }
}

impl fmt::Debug for EvidencePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvidencePayload")
            .field("fingerprint", &self.fingerprint)
            .field("mime_type", &self.mime_type)
            .field("byte_len", &self.bytes.len())
            .finish()
    }
}

impl RunEntryInput {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        submitter_id: SubmitterId,
        display_name: String,
        station: String,
        date: RunDate,
        distance_km: DistanceKm,
        evidence: Option<EvidencePayload>,
        created_at: MonotonicTimeNs,
    ) -> Result<Self, ContractViolation> {
        let input = Self {
            schema_version: RUN_CONTRACT_VERSION,
            submitter_id,
            display_name,
            station,
            date,
            distance_km,
            evidence,
            created_at,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Validate for RunEntryInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != RUN_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "run_entry_input.schema_version",
                reason: "must match RUN_CONTRACT_VERSION",
            });
        }
        self.submitter_id.validate()?;
        validate_text("run_entry_input.display_name", &self.display_name, 128)?;
        validate_text("run_entry_input.station", &self.station, 128)?;
        self.distance_km.validate()?;
        if let Some(evidence) = &self.evidence {
            evidence.fingerprint.validate()?;
            validate_text("run_entry_input.evidence.mime_type", &evidence.mime_type, 128)?;
            if evidence.bytes.is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field: "run_entry_input.evidence.bytes",
                    reason: "must be > 0",
                });
            }
        }
        if self.created_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "run_entry_input.created_at",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEntry {
    pub schema_version: SchemaVersion,
    pub id: RunEntryId,
    pub submitter_id: SubmitterId,
    pub display_name: String,
    pub station: String,
    pub date: RunDate,
    pub distance_km: DistanceKm,
    pub evidence: Option<EvidenceRef>,
    pub created_at: MonotonicTimeNs,
}

impl RunEntry {
    /// Builds the stored row. Evidence bytes are not copied; the caller persists them.
    pub fn from_input_v1(id: RunEntryId, input: &RunEntryInput) -> Result<Self, ContractViolation> {
        id.validate()?;
        input.validate()?;
        Ok(Self {
            schema_version: RUN_CONTRACT_VERSION,
            id,
            submitter_id: input.submitter_id.clone(),
            display_name: input.display_name.clone(),
            station: input.station.clone(),
            date: input.date,
            distance_km: input.distance_km,
            evidence: input.evidence.as_ref().map(EvidencePayload::reference),
            created_at: input.created_at,
        })
    }

    pub fn fingerprint(&self) -> Option<&EvidenceFingerprint> {
        self.evidence.as_ref().map(|e| &e.fingerprint)
    }
}
