#![forbid(unsafe_code)]

use runlog_kernel_contracts::roster::{RosterRecord, RosterStatus};
use runlog_kernel_contracts::submitter::{SubmitterId, SubmitterIdPolicy};
use runlog_kernel_contracts::MonotonicTimeNs;
use runlog_storage::ledger::{RunLedgerStore, StorageError};
use runlog_storage::repo::RosterRepo;

fn sid(raw: &str) -> SubmitterId {
    SubmitterId::normalize(raw, &SubmitterIdPolicy::mvp_v1()).unwrap()
}

fn record(raw: &str, name: &str) -> RosterRecord {
    RosterRecord::v1(sid(raw), name.to_string(), "South".to_string(), MonotonicTimeNs(5)).unwrap()
}

fn insert_via_repo<R: RosterRepo>(repo: &mut R, rec: RosterRecord) -> Result<(), StorageError> {
    repo.insert_roster_row(rec)
}

#[test]
fn at_roster_db_01_duplicate_identity_rejected() {
    let mut s = RunLedgerStore::new_in_memory();
    s.insert_roster_row(record("0042", "Ada")).unwrap();
    let err = insert_via_repo(&mut s, record("00-42", "Ada again")).unwrap_err();
    assert!(matches!(err, StorageError::DuplicateKey { .. }));
    assert_eq!(s.roster_rows().len(), 1);
}

#[test]
fn at_roster_db_02_deactivate_then_update_reactivates() {
    let mut s = RunLedgerStore::new_in_memory();
    s.insert_roster_row(record("s7", "Grace")).unwrap();
    s.deactivate_roster_row(&sid("S7"), MonotonicTimeNs(9)).unwrap();
    assert_eq!(
        s.roster_row(&sid("S7")).map(|r| r.status),
        Some(RosterStatus::Inactive)
    );
    let updated = s
        .update_roster_row(
            &sid("S7"),
            " Grace H. ".to_string(),
            "East".to_string(),
            MonotonicTimeNs(10),
        )
        .unwrap();
    assert!(updated.is_active());
    assert_eq!(updated.display_name, "Grace H.");
    assert_eq!(updated.updated_at, MonotonicTimeNs(10));
}

#[test]
fn at_roster_db_03_missing_rows_are_not_found() {
    let mut s = RunLedgerStore::new_in_memory();
    assert!(matches!(
        s.deactivate_roster_row(&sid("1"), MonotonicTimeNs(1)),
        Err(StorageError::NotFound { .. })
    ));
    assert!(matches!(
        s.update_roster_row(&sid("1"), "A".to_string(), "B".to_string(), MonotonicTimeNs(1)),
        Err(StorageError::NotFound { .. })
    ));
}

#[test]
fn at_roster_db_04_blank_profile_fields_rejected() {
    let mut s = RunLedgerStore::new_in_memory();
    s.insert_roster_row(record("0042", "Ada")).unwrap();
    let err = s
        .update_roster_row(&sid("0042"), "   ".to_string(), "East".to_string(), MonotonicTimeNs(6))
        .unwrap_err();
    assert!(matches!(err, StorageError::ContractViolation(_)));
}
