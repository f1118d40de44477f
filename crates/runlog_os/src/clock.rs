#![forbid(unsafe_code)]

use std::sync::Mutex;

use chrono::{DateTime, FixedOffset, Utc};

use runlog_kernel_contracts::run::RunDate;
use runlog_kernel_contracts::{ContractViolation, MonotonicTimeNs};

/// Source of "now" and "today" in the organization's fixed timezone.
pub trait OrgClock: Send + Sync {
    fn now(&self) -> MonotonicTimeNs;
    fn today(&self) -> RunDate;
}

#[derive(Debug, Clone, Copy)]
pub struct FixedOffsetClock {
    offset: FixedOffset,
}

impl FixedOffsetClock {
    pub fn from_utc_offset_minutes(minutes: i32) -> Result<Self, ContractViolation> {
        let offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ContractViolation::InvalidValue {
                field: "org_clock.utc_offset_minutes",
                reason: "must be within -1439..=1439",
            })?;
        Ok(Self { offset })
    }

    pub fn date_at(&self, instant: DateTime<Utc>) -> RunDate {
        RunDate::new(instant.with_timezone(&self.offset).date_naive())
    }
}

impl OrgClock for FixedOffsetClock {
    fn now(&self) -> MonotonicTimeNs {
        let ns = Utc::now().timestamp_nanos_opt().unwrap_or(0).max(1);
        MonotonicTimeNs(ns as u64)
    }

    fn today(&self) -> RunDate {
        self.date_at(Utc::now())
    }
}

/// Clock with a caller-controlled date. `now` advances by one nanosecond per read.
#[derive(Debug)]
pub struct PinnedClock {
    state: Mutex<(RunDate, u64)>,
}

impl PinnedClock {
    pub fn new(today: RunDate, now: MonotonicTimeNs) -> Self {
        Self {
            state: Mutex::new((today, now.0.max(1))),
        }
    }

    pub fn set_today(&self, today: RunDate) {
        if let Ok(mut s) = self.state.lock() {
            s.0 = today;
        }
    }
}

impl OrgClock for PinnedClock {
    fn now(&self) -> MonotonicTimeNs {
        match self.state.lock() {
            Ok(mut s) => {
                s.1 = s.1.saturating_add(1);
                MonotonicTimeNs(s.1)
            }
            Err(_) => MonotonicTimeNs(1),
        }
    }

    fn today(&self) -> RunDate {
        match self.state.lock() {
            Ok(s) => s.0,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }
}
