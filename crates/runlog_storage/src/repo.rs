#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use runlog_kernel_contracts::admin::RunEntryPatch;
use runlog_kernel_contracts::roster::RosterRecord;
use runlog_kernel_contracts::run::{
    DailyRunState, EvidenceFingerprint, RunDate, RunEntry, RunEntryId, RunEntryInput,
};
use runlog_kernel_contracts::submitter::SubmitterId;
use runlog_kernel_contracts::MonotonicTimeNs;

use crate::ledger::{DailyCaps, RunLedgerEvent, RunLedgerStore, StorageError};

/// Typed repository interface for the roster table.
pub trait RosterRepo {
    fn insert_roster_row(&mut self, record: RosterRecord) -> Result<(), StorageError>;
    fn update_roster_row(
        &mut self,
        submitter_id: &SubmitterId,
        display_name: String,
        station: String,
        now: MonotonicTimeNs,
    ) -> Result<RosterRecord, StorageError>;
    fn deactivate_roster_row(
        &mut self,
        submitter_id: &SubmitterId,
        now: MonotonicTimeNs,
    ) -> Result<(), StorageError>;
    fn roster_row(&self, submitter_id: &SubmitterId) -> Option<&RosterRecord>;
    fn roster_rows(&self) -> &BTreeMap<SubmitterId, RosterRecord>;
}

/// Typed repository interface for run entries and their append-only ledger.
pub trait RunLedgerRepo {
    fn append_run_entry_guarded(
        &mut self,
        input: RunEntryInput,
        expected: DailyRunState,
        caps: DailyCaps,
    ) -> Result<RunEntryId, StorageError>;
    fn admin_update_run_entry(
        &mut self,
        id: RunEntryId,
        patch: &RunEntryPatch,
        now: MonotonicTimeNs,
    ) -> Result<RunEntry, StorageError>;
    fn admin_delete_run_entry(
        &mut self,
        id: RunEntryId,
        now: MonotonicTimeNs,
    ) -> Result<RunEntry, StorageError>;

    fn daily_state(&self, submitter_id: &SubmitterId, date: RunDate) -> DailyRunState;
    fn run_entries_for_day(&self, submitter_id: &SubmitterId, date: RunDate) -> Vec<&RunEntry>;
    fn has_fingerprint(&self, fingerprint: &EvidenceFingerprint) -> bool;
    fn evidence_blob(&self, fingerprint: &EvidenceFingerprint) -> Option<&[u8]>;
    fn run_entry(&self, id: RunEntryId) -> Option<&RunEntry>;
    fn run_entry_rows(&self) -> &BTreeMap<RunEntryId, RunEntry>;
    fn run_ledger_rows(&self) -> &[RunLedgerEvent];
    fn rebuild_run_entry_current_rows(&mut self);
}

impl RosterRepo for RunLedgerStore {
    fn insert_roster_row(&mut self, record: RosterRecord) -> Result<(), StorageError> {
        RunLedgerStore::insert_roster_row(self, record)
    }

    fn update_roster_row(
        &mut self,
        submitter_id: &SubmitterId,
        display_name: String,
        station: String,
        now: MonotonicTimeNs,
    ) -> Result<RosterRecord, StorageError> {
        RunLedgerStore::update_roster_row(self, submitter_id, display_name, station, now)
    }

    fn deactivate_roster_row(
        &mut self,
        submitter_id: &SubmitterId,
        now: MonotonicTimeNs,
    ) -> Result<(), StorageError> {
        RunLedgerStore::deactivate_roster_row(self, submitter_id, now)
    }

    fn roster_row(&self, submitter_id: &SubmitterId) -> Option<&RosterRecord> {
        RunLedgerStore::roster_row(self, submitter_id)
    }

    fn roster_rows(&self) -> &BTreeMap<SubmitterId, RosterRecord> {
        RunLedgerStore::roster_rows(self)
    }
}

impl RunLedgerRepo for RunLedgerStore {
    fn append_run_entry_guarded(
        &mut self,
        input: RunEntryInput,
        expected: DailyRunState,
        caps: DailyCaps,
    ) -> Result<RunEntryId, StorageError> {
        RunLedgerStore::append_run_entry_guarded(self, input, expected, caps)
    }

    fn admin_update_run_entry(
        &mut self,
        id: RunEntryId,
        patch: &RunEntryPatch,
        now: MonotonicTimeNs,
    ) -> Result<RunEntry, StorageError> {
        RunLedgerStore::admin_update_run_entry(self, id, patch, now)
    }

    fn admin_delete_run_entry(
        &mut self,
        id: RunEntryId,
        now: MonotonicTimeNs,
    ) -> Result<RunEntry, StorageError> {
        RunLedgerStore::admin_delete_run_entry(self, id, now)
    }

    fn daily_state(&self, submitter_id: &SubmitterId, date: RunDate) -> DailyRunState {
        RunLedgerStore::daily_state(self, submitter_id, date)
    }

    fn run_entries_for_day(&self, submitter_id: &SubmitterId, date: RunDate) -> Vec<&RunEntry> {
        RunLedgerStore::run_entries_for_day(self, submitter_id, date)
    }

    fn has_fingerprint(&self, fingerprint: &EvidenceFingerprint) -> bool {
        RunLedgerStore::has_fingerprint(self, fingerprint)
    }

    fn evidence_blob(&self, fingerprint: &EvidenceFingerprint) -> Option<&[u8]> {
        RunLedgerStore::evidence_blob(self, fingerprint)
    }

    fn run_entry(&self, id: RunEntryId) -> Option<&RunEntry> {
        RunLedgerStore::run_entry(self, id)
    }

    fn run_entry_rows(&self) -> &BTreeMap<RunEntryId, RunEntry> {
        RunLedgerStore::run_entry_rows(self)
    }

    fn run_ledger_rows(&self) -> &[RunLedgerEvent] {
        RunLedgerStore::run_ledger_rows(self)
    }

    fn rebuild_run_entry_current_rows(&mut self) {
        RunLedgerStore::rebuild_run_entry_current_rows(self)
    }
}
