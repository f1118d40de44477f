#![forbid(unsafe_code)]

use rust_decimal::Decimal;
use tracing::debug;

use runlog_kernel_contracts::run::{DailyRunState, DistanceKm, RunDate};
use runlog_kernel_contracts::submission::{AdmissionGrant, AdmissionOutcome, SubmissionRefusal};
use runlog_kernel_contracts::submitter::SubmitterId;
use runlog_kernel_contracts::{ContractViolation, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionConfig {
    pub max_entries_per_day: u32,
    pub daily_ceiling_km: Decimal,
    pub per_entry_ceiling_km: Decimal,
}

impl AdmissionConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_entries_per_day: 2,
            daily_ceiling_km: Decimal::TEN,
            per_entry_ceiling_km: Decimal::TEN,
        }
    }
}

impl Validate for AdmissionConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.max_entries_per_day == 0 || self.max_entries_per_day > 64 {
            return Err(ContractViolation::InvalidValue {
                field: "admission_config.max_entries_per_day",
                reason: "must be within 1..=64",
            });
        }
        if self.daily_ceiling_km <= Decimal::ZERO {
            return Err(ContractViolation::InvalidValue {
                field: "admission_config.daily_ceiling_km",
                reason: "must be > 0",
            });
        }
        if self.per_entry_ceiling_km <= Decimal::ZERO
            || self.per_entry_ceiling_km > self.daily_ceiling_km
        {
            return Err(ContractViolation::InvalidValue {
                field: "admission_config.per_entry_ceiling_km",
                reason: "must be within (0, daily_ceiling_km]",
            });
        }
        Ok(())
    }
}

/// Decides whether one more entry fits the submitter's day.
///
/// Pure over its inputs: the caller supplies the prior daily state read from the ledger and
/// must re-check it at append time.
#[derive(Debug, Clone)]
pub struct AdmissionRuntime {
    config: AdmissionConfig,
}

impl AdmissionRuntime {
    pub fn new(config: AdmissionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Validates the proposed distance on its own, before any ledger read.
    pub fn check_distance(&self, proposed_km: Decimal) -> Result<DistanceKm, SubmissionRefusal> {
        let distance = DistanceKm::new(proposed_km).map_err(|v| match v {
            ContractViolation::InvalidValue { reason, .. } => {
                SubmissionRefusal::DistanceInvalid { reason }
            }
            _ => SubmissionRefusal::DistanceInvalid {
                reason: "must be a finite decimal",
            },
        })?;
        if distance.value() > self.config.per_entry_ceiling_km {
            return Err(SubmissionRefusal::DistanceInvalid {
                reason: "exceeds the per-entry ceiling",
            });
        }
        Ok(distance)
    }

    pub fn evaluate(
        &self,
        submitter_id: &SubmitterId,
        date: RunDate,
        today: RunDate,
        proposed_km: Decimal,
        prior: &DailyRunState,
    ) -> AdmissionOutcome {
        if date != today {
            debug!(submitter = %submitter_id, %date, %today, "admission refused: date is not today");
            return AdmissionOutcome::Refused(SubmissionRefusal::DateInvalid { today });
        }
        let distance = match self.check_distance(proposed_km) {
            Ok(d) => d,
            Err(refusal) => {
                debug!(submitter = %submitter_id, %proposed_km, "admission refused: distance invalid");
                return AdmissionOutcome::Refused(refusal);
            }
        };

        if prior.count >= self.config.max_entries_per_day {
            debug!(submitter = %submitter_id, count = prior.count, "admission refused: max entries");
            return AdmissionOutcome::Refused(SubmissionRefusal::MaxEntriesReached {
                count: prior.count,
            });
        }

        let remaining = self.config.daily_ceiling_km - prior.total_km;
        if remaining <= Decimal::ZERO {
            return AdmissionOutcome::Refused(SubmissionRefusal::CeilingReached);
        }
        if distance.value() > remaining {
            debug!(submitter = %submitter_id, %remaining, "admission refused: would exceed ceiling");
            return AdmissionOutcome::Refused(SubmissionRefusal::WouldExceedCeiling {
                remaining_km: remaining,
            });
        }

        AdmissionOutcome::Admitted(AdmissionGrant {
            prior: *prior,
            distance_km: distance,
            remaining_km: remaining - distance.value(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runlog_kernel_contracts::submitter::SubmitterIdPolicy;
    use std::str::FromStr;

    fn runtime() -> AdmissionRuntime {
        AdmissionRuntime::new(AdmissionConfig::mvp_v1())
    }

    fn km(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn sub() -> SubmitterId {
        SubmitterId::normalize("0042", &SubmitterIdPolicy::mvp_v1()).unwrap()
    }

    fn today() -> RunDate {
        RunDate::parse("2026-10-19").unwrap()
    }

    fn state(count: u32, total: &str) -> DailyRunState {
        DailyRunState {
            count,
            total_km: km(total),
        }
    }

    #[test]
    fn at_adm_01_empty_day_admits() {
        let out = runtime().evaluate(&sub(), today(), today(), km("6.00"), &state(0, "0"));
        match out {
            AdmissionOutcome::Admitted(g) => {
                assert_eq!(g.prior.count, 0);
                assert_eq!(g.remaining_km, km("4.00"));
            }
            other => panic!("expected admitted, got {other:?}"),
        }
    }

    #[test]
    fn at_adm_02_would_exceed_reports_remaining() {
        let out = runtime().evaluate(&sub(), today(), today(), km("5.00"), &state(1, "6.00"));
        assert_eq!(
            out,
            AdmissionOutcome::Refused(SubmissionRefusal::WouldExceedCeiling {
                remaining_km: km("4.00")
            })
        );
    }

    #[test]
    fn at_adm_03_max_entries_checked_before_ceiling() {
        let out = runtime().evaluate(&sub(), today(), today(), km("0.50"), &state(2, "10.00"));
        assert_eq!(
            out,
            AdmissionOutcome::Refused(SubmissionRefusal::MaxEntriesReached { count: 2 })
        );
    }

    #[test]
    fn at_adm_04_exhausted_ceiling_is_ceiling_reached() {
        let out = runtime().evaluate(&sub(), today(), today(), km("0.01"), &state(1, "10.00"));
        assert_eq!(out, AdmissionOutcome::Refused(SubmissionRefusal::CeilingReached));
    }

    #[test]
    fn at_adm_05_exact_fill_is_admitted() {
        let out = runtime().evaluate(&sub(), today(), today(), km("4.00"), &state(1, "6.00"));
        assert!(matches!(out, AdmissionOutcome::Admitted(g) if g.remaining_km == Decimal::ZERO));
    }

    #[test]
    fn at_adm_06_other_dates_are_refused() {
        let yesterday = RunDate::parse("2026-10-18").unwrap();
        let out = runtime().evaluate(&sub(), yesterday, today(), km("1.00"), &state(0, "0"));
        assert_eq!(
            out,
            AdmissionOutcome::Refused(SubmissionRefusal::DateInvalid { today: today() })
        );
    }

    #[test]
    fn at_adm_07_distance_rules() {
        let rt = runtime();
        for bad in ["0", "-2", "1.234", "10.01"] {
            let out = rt.evaluate(&sub(), today(), today(), km(bad), &state(0, "0"));
            assert!(
                matches!(
                    out,
                    AdmissionOutcome::Refused(SubmissionRefusal::DistanceInvalid { .. })
                ),
                "{bad} should be refused"
            );
        }
        assert!(rt.check_distance(km("10.00")).is_ok());
    }

    #[test]
    fn at_adm_08_config_rejects_per_entry_above_daily() {
        let mut c = AdmissionConfig::mvp_v1();
        c.per_entry_ceiling_km = km("12");
        assert!(c.validate().is_err());
        assert!(AdmissionConfig::mvp_v1().validate().is_ok());
    }
}
