#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use runlog_kernel_contracts::admin::{LedgerActor, RunEntryPatch};
use runlog_kernel_contracts::roster::{RosterRecord, RosterStatus};
use runlog_kernel_contracts::run::{
    DailyRunState, EvidenceFingerprint, RunDate, RunEntry, RunEntryId, RunEntryInput,
};
use runlog_kernel_contracts::submitter::SubmitterId;
use runlog_kernel_contracts::{ContractViolation, MonotonicTimeNs, Validate};

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    ForeignKeyViolation {
        table: &'static str,
        key: String,
    },
    DuplicateKey {
        table: &'static str,
        key: String,
    },
    NotFound {
        table: &'static str,
        key: String,
    },
    /// The (submitter, date) state changed since the caller read it.
    StaleDailyState {
        expected: DailyRunState,
        actual: DailyRunState,
    },
    DailyCapViolation {
        key: String,
        reason: &'static str,
    },
    ContractViolation(ContractViolation),
}

impl From<ContractViolation> for StorageError {
    fn from(v: ContractViolation) -> Self {
        StorageError::ContractViolation(v)
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::ForeignKeyViolation { table, key } => {
                write!(f, "foreign key violation on {table}: {key}")
            }
            StorageError::DuplicateKey { table, key } => {
                write!(f, "duplicate key on {table}: {key}")
            }
            StorageError::NotFound { table, key } => write!(f, "{table}: {key} not found"),
            StorageError::StaleDailyState { expected, actual } => write!(
                f,
                "stale daily state: expected {}/{} got {}/{}",
                expected.count, expected.total_km, actual.count, actual.total_km
            ),
            StorageError::DailyCapViolation { key, reason } => {
                write!(f, "daily cap violation for {key}: {reason}")
            }
            StorageError::ContractViolation(v) => write!(f, "contract violation: {v}"),
        }
    }
}

/// Caps re-checked inside the append critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCaps {
    pub max_entries_per_day: u32,
    pub daily_ceiling_km: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunLedgerEventKind {
    Created,
    AdminUpdated,
    AdminDeleted,
}

/// Append-only history row. `entry` is the state after the event (before it, for deletes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLedgerEvent {
    pub event_id: u64,
    pub kind: RunLedgerEventKind,
    pub actor: LedgerActor,
    pub recorded_at: MonotonicTimeNs,
    pub entry: RunEntry,
}

#[derive(Debug, Clone)]
pub struct RunLedgerStore {
    roster: BTreeMap<SubmitterId, RosterRecord>,

    run_entries: BTreeMap<RunEntryId, RunEntry>,
    run_entries_by_day: BTreeMap<(SubmitterId, RunDate), BTreeSet<RunEntryId>>,
    // Unique: one accepted entry per evidence fingerprint, ledger-wide.
    evidence_fingerprint_index: BTreeMap<EvidenceFingerprint, RunEntryId>,
    // Content-addressed and never pruned; history rows may still point at a blob.
    evidence_blobs: BTreeMap<EvidenceFingerprint, Vec<u8>>,
    next_run_entry_id: u64,

    run_ledger: Vec<RunLedgerEvent>,
    next_ledger_event_id: u64,
}

impl Default for RunLedgerStore {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl RunLedgerStore {
    pub fn new_in_memory() -> Self {
        Self {
            roster: BTreeMap::new(),
            run_entries: BTreeMap::new(),
            run_entries_by_day: BTreeMap::new(),
            evidence_fingerprint_index: BTreeMap::new(),
            evidence_blobs: BTreeMap::new(),
            next_run_entry_id: 1,
            run_ledger: Vec::new(),
            next_ledger_event_id: 1,
        }
    }

    // ------------------------
    // Roster table.
    // ------------------------

    pub fn insert_roster_row(&mut self, record: RosterRecord) -> Result<(), StorageError> {
        record.validate()?;
        if self.roster.contains_key(&record.submitter_id) {
            return Err(StorageError::DuplicateKey {
                table: "roster.submitter_id",
                key: record.submitter_id.to_string(),
            });
        }
        self.roster.insert(record.submitter_id.clone(), record);
        Ok(())
    }

    /// Updates profile fields and reactivates the row.
    pub fn update_roster_row(
        &mut self,
        submitter_id: &SubmitterId,
        display_name: String,
        station: String,
        now: MonotonicTimeNs,
    ) -> Result<RosterRecord, StorageError> {
        let current = self
            .roster
            .get(submitter_id)
            .ok_or_else(|| StorageError::NotFound {
                table: "roster",
                key: submitter_id.to_string(),
            })?;
        let mut next = current.clone();
        next.display_name = display_name.trim().to_string();
        next.station = station.trim().to_string();
        next.status = RosterStatus::Active;
        next.updated_at = now.max(current.created_at);
        next.validate()?;
        self.roster.insert(submitter_id.clone(), next.clone());
        Ok(next)
    }

    pub fn deactivate_roster_row(
        &mut self,
        submitter_id: &SubmitterId,
        now: MonotonicTimeNs,
    ) -> Result<(), StorageError> {
        let row = self
            .roster
            .get_mut(submitter_id)
            .ok_or_else(|| StorageError::NotFound {
                table: "roster",
                key: submitter_id.to_string(),
            })?;
        row.status = RosterStatus::Inactive;
        row.updated_at = now.max(row.created_at);
        Ok(())
    }

    pub fn roster_row(&self, submitter_id: &SubmitterId) -> Option<&RosterRecord> {
        self.roster.get(submitter_id)
    }

    pub fn roster_rows(&self) -> &BTreeMap<SubmitterId, RosterRecord> {
        &self.roster
    }

    // ------------------------
    // Run entries.
    // ------------------------

    pub fn daily_state(&self, submitter_id: &SubmitterId, date: RunDate) -> DailyRunState {
        self.run_entries_for_day(submitter_id, date)
            .into_iter()
            .fold(DailyRunState::empty(), |acc, e| acc.with_entry(e.distance_km))
    }

    pub fn run_entries_for_day(&self, submitter_id: &SubmitterId, date: RunDate) -> Vec<&RunEntry> {
        self.run_entries_by_day
            .get(&(submitter_id.clone(), date))
            .map(|ids| ids.iter().filter_map(|id| self.run_entries.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn has_fingerprint(&self, fingerprint: &EvidenceFingerprint) -> bool {
        self.evidence_fingerprint_index.contains_key(fingerprint)
    }

    pub fn evidence_blob(&self, fingerprint: &EvidenceFingerprint) -> Option<&[u8]> {
        self.evidence_blobs.get(fingerprint).map(Vec::as_slice)
    }

    /// Compare-and-append: succeeds only if the day's state still equals `expected` and the
    /// caps and fingerprint uniqueness hold after the write.
    pub fn append_run_entry_guarded(
        &mut self,
        input: RunEntryInput,
        expected: DailyRunState,
        caps: DailyCaps,
    ) -> Result<RunEntryId, StorageError> {
        input.validate()?;

        match self.roster.get(&input.submitter_id) {
            Some(r) if r.is_active() => {}
            _ => {
                return Err(StorageError::ForeignKeyViolation {
                    table: "run_entries.submitter_id",
                    key: input.submitter_id.to_string(),
                })
            }
        }

        let actual = self.daily_state(&input.submitter_id, input.date);
        if actual != expected {
            return Err(StorageError::StaleDailyState { expected, actual });
        }
        let day_key = format!("{}@{}", input.submitter_id, input.date);
        if actual.count.saturating_add(1) > caps.max_entries_per_day {
            return Err(StorageError::DailyCapViolation {
                key: day_key,
                reason: "max entries per day",
            });
        }
        if actual.total_km + input.distance_km.value() > caps.daily_ceiling_km {
            return Err(StorageError::DailyCapViolation {
                key: day_key,
                reason: "daily distance ceiling",
            });
        }

        if let Some(evidence) = &input.evidence {
            if let Some(existing) = self.evidence_fingerprint_index.get(&evidence.fingerprint) {
                return Err(StorageError::DuplicateKey {
                    table: "run_entries.evidence_fingerprint",
                    key: existing.to_string(),
                });
            }
        }

        let id = RunEntryId(self.next_run_entry_id);
        let actor = LedgerActor::Submitter(input.submitter_id.clone());
        let at = input.created_at;
        let entry = RunEntry::from_input_v1(id, &input)?;
        self.next_run_entry_id = self.next_run_entry_id.saturating_add(1);
        if let Some(evidence) = input.evidence {
            self.evidence_blobs
                .entry(evidence.fingerprint)
                .or_insert(evidence.bytes);
        }
        self.index_entry(&entry);
        self.run_entries.insert(id, entry.clone());
        self.push_ledger_event(RunLedgerEventKind::Created, actor, at, entry);
        Ok(id)
    }

    /// Admin correction. Caps are not checked; referential and fingerprint uniqueness are.
    pub fn admin_update_run_entry(
        &mut self,
        id: RunEntryId,
        patch: &RunEntryPatch,
        now: MonotonicTimeNs,
    ) -> Result<RunEntry, StorageError> {
        let current = self
            .run_entries
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                table: "run_entries",
                key: id.to_string(),
            })?;

        let mut next = current.clone();
        if let Some(submitter_id) = &patch.submitter_id {
            let row = self
                .roster
                .get(submitter_id)
                .ok_or_else(|| StorageError::ForeignKeyViolation {
                    table: "run_entries.submitter_id",
                    key: submitter_id.to_string(),
                })?;
            next.submitter_id = row.submitter_id.clone();
            next.display_name = row.display_name.clone();
            next.station = row.station.clone();
        }
        if let Some(date) = patch.date {
            next.date = date;
        }
        if let Some(distance) = patch.distance_km {
            next.distance_km = distance;
        }
        if patch.clear_evidence {
            next.evidence = None;
        }

        self.unindex_entry(&current);
        self.index_entry(&next);
        self.run_entries.insert(id, next.clone());
        self.push_ledger_event(
            RunLedgerEventKind::AdminUpdated,
            LedgerActor::Admin,
            now,
            next.clone(),
        );
        Ok(next)
    }

    pub fn admin_delete_run_entry(
        &mut self,
        id: RunEntryId,
        now: MonotonicTimeNs,
    ) -> Result<RunEntry, StorageError> {
        let removed = self
            .run_entries
            .remove(&id)
            .ok_or_else(|| StorageError::NotFound {
                table: "run_entries",
                key: id.to_string(),
            })?;
        self.unindex_entry(&removed);
        self.push_ledger_event(
            RunLedgerEventKind::AdminDeleted,
            LedgerActor::Admin,
            now,
            removed.clone(),
        );
        Ok(removed)
    }

    pub fn run_entry(&self, id: RunEntryId) -> Option<&RunEntry> {
        self.run_entries.get(&id)
    }

    pub fn run_entry_rows(&self) -> &BTreeMap<RunEntryId, RunEntry> {
        &self.run_entries
    }

    pub fn run_ledger_rows(&self) -> &[RunLedgerEvent] {
        &self.run_ledger
    }

    /// Replays the append-only ledger into the current table and its indexes.
    pub fn rebuild_run_entry_current_rows(&mut self) {
        self.run_entries.clear();
        self.run_entries_by_day.clear();
        self.evidence_fingerprint_index.clear();
        let events = std::mem::take(&mut self.run_ledger);
        for ev in &events {
            match ev.kind {
                RunLedgerEventKind::Created | RunLedgerEventKind::AdminUpdated => {
                    if let Some(prev) = self.run_entries.remove(&ev.entry.id) {
                        self.unindex_entry(&prev);
                    }
                    self.index_entry(&ev.entry);
                    self.run_entries.insert(ev.entry.id, ev.entry.clone());
                }
                RunLedgerEventKind::AdminDeleted => {
                    if let Some(prev) = self.run_entries.remove(&ev.entry.id) {
                        self.unindex_entry(&prev);
                    }
                }
            }
        }
        self.run_ledger = events;
    }

    fn index_entry(&mut self, entry: &RunEntry) {
        self.run_entries_by_day
            .entry((entry.submitter_id.clone(), entry.date))
            .or_default()
            .insert(entry.id);
        if let Some(fp) = entry.fingerprint() {
            self.evidence_fingerprint_index.insert(fp.clone(), entry.id);
        }
    }

    fn unindex_entry(&mut self, entry: &RunEntry) {
        let key = (entry.submitter_id.clone(), entry.date);
        if let Some(ids) = self.run_entries_by_day.get_mut(&key) {
            ids.remove(&entry.id);
            if ids.is_empty() {
                self.run_entries_by_day.remove(&key);
            }
        }
        if let Some(fp) = entry.fingerprint() {
            if self.evidence_fingerprint_index.get(fp) == Some(&entry.id) {
                self.evidence_fingerprint_index.remove(fp);
            }
        }
    }

    fn push_ledger_event(
        &mut self,
        kind: RunLedgerEventKind,
        actor: LedgerActor,
        recorded_at: MonotonicTimeNs,
        entry: RunEntry,
    ) {
        let event_id = self.next_ledger_event_id;
        self.next_ledger_event_id = self.next_ledger_event_id.saturating_add(1);
        self.run_ledger.push(RunLedgerEvent {
            event_id,
            kind,
            actor,
            recorded_at,
            entry,
        });
    }
}
