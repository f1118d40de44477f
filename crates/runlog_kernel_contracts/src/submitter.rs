#![forbid(unsafe_code)]

use std::fmt;

use crate::{ContractViolation, Validate};

pub const SUBMITTER_ID_DEFAULT_MAX_DIGITS: usize = 4;

/// Rules shared by every entry point that accepts a submitter identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitterIdPolicy {
    pub staff_class_prefixes: Vec<char>,
    pub max_digits: usize,
}

impl SubmitterIdPolicy {
    pub fn mvp_v1() -> Self {
        Self {
            staff_class_prefixes: vec!['S'],
            max_digits: SUBMITTER_ID_DEFAULT_MAX_DIGITS,
        }
    }

    /// Parses a prefix list such as `"S,T"` or `"ST"`.
    pub fn with_staff_prefixes(prefixes: &str) -> Result<Self, ContractViolation> {
        let staff_class_prefixes: Vec<char> = prefixes
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let policy = Self {
            staff_class_prefixes,
            max_digits: SUBMITTER_ID_DEFAULT_MAX_DIGITS,
        };
        policy.validate()?;
        Ok(policy)
    }

    fn is_staff_prefix(&self, c: char) -> bool {
        self.staff_class_prefixes.contains(&c)
    }
}

impl Validate for SubmitterIdPolicy {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.max_digits == 0 || self.max_digits > 16 {
            return Err(ContractViolation::InvalidValue {
                field: "submitter_id_policy.max_digits",
                reason: "must be within 1..=16",
            });
        }
        if self
            .staff_class_prefixes
            .iter()
            .any(|c| !c.is_ascii_uppercase())
        {
            return Err(ContractViolation::InvalidValue {
                field: "submitter_id_policy.staff_class_prefixes",
                reason: "must contain uppercase ASCII letters only",
            });
        }
        Ok(())
    }
}

/// Normalized roster key. Only constructible through [`SubmitterId::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmitterId(String);

impl SubmitterId {
    pub fn normalize(raw: &str, policy: &SubmitterIdPolicy) -> Result<Self, ContractViolation> {
        let upper = raw.trim().to_uppercase();
        let mut chars = upper.chars();
        let mut out = String::with_capacity(policy.max_digits + 1);
        let rest = match chars.next() {
            Some(first) if policy.is_staff_prefix(first) => {
                out.push(first);
                chars.as_str()
            }
            Some(_) => upper.as_str(),
            None => {
                return Err(ContractViolation::InvalidValue {
                    field: "submitter_id",
                    reason: "must not be empty",
                })
            }
        };
        out.extend(
            rest.chars()
                .filter(|c| c.is_ascii_digit())
                .take(policy.max_digits),
        );
        let id = Self(out);
        id.validate()?;
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for SubmitterId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !self.0.chars().any(|c| c.is_ascii_digit()) {
            return Err(ContractViolation::InvalidValue {
                field: "submitter_id",
                reason: "must contain at least one digit",
            });
        }
        if self.0.len() > 17 {
            return Err(ContractViolation::InvalidValue {
                field: "submitter_id",
                reason: "exceeds max length",
            });
        }
        Ok(())
    }
}

impl fmt::Display for SubmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
