#![forbid(unsafe_code)]

use std::str::FromStr;

use rust_decimal::Decimal;
use runlog_kernel_contracts::admin::{LedgerActor, RunEntryPatch};
use runlog_kernel_contracts::roster::RosterRecord;
use runlog_kernel_contracts::run::{
    DailyRunState, DistanceKm, EvidenceFingerprint, EvidencePayload, RunDate, RunEntryId,
    RunEntryInput,
};
use runlog_kernel_contracts::submitter::{SubmitterId, SubmitterIdPolicy};
use runlog_kernel_contracts::MonotonicTimeNs;
use runlog_storage::ledger::{DailyCaps, RunLedgerEventKind, RunLedgerStore, StorageError};
use runlog_storage::repo::RunLedgerRepo;

fn sid(raw: &str) -> SubmitterId {
    SubmitterId::normalize(raw, &SubmitterIdPolicy::mvp_v1()).unwrap()
}

fn day() -> RunDate {
    RunDate::parse("2026-10-19").unwrap()
}

fn km(s: &str) -> DistanceKm {
    DistanceKm::parse(s).unwrap()
}

fn caps() -> DailyCaps {
    DailyCaps {
        max_entries_per_day: 2,
        daily_ceiling_km: Decimal::TEN,
    }
}

fn fp(n: u8) -> EvidenceFingerprint {
    EvidenceFingerprint::from_hex(&format!("{n:02x}").repeat(32)).unwrap()
}

fn input(who: &str, distance: &str, evidence: Option<EvidenceFingerprint>, t: u64) -> RunEntryInput {
    RunEntryInput::v1(
        sid(who),
        "Runner".to_string(),
        "North".to_string(),
        day(),
        km(distance),
        evidence.map(|fingerprint| EvidencePayload {
            fingerprint,
            mime_type: "image/png".to_string(),
            bytes: vec![0x89, b'P', b'N', b'G', 0, 0, 0, 0, 0, t as u8],
        }),
        MonotonicTimeNs(t),
    )
    .unwrap()
}

fn state_via_repo<R: RunLedgerRepo>(repo: &R, who: &str) -> DailyRunState {
    repo.daily_state(&sid(who), day())
}

fn store() -> RunLedgerStore {
    let mut s = RunLedgerStore::new_in_memory();
    for who in ["0001", "0002"] {
        s.insert_roster_row(
            RosterRecord::v1(
                sid(who),
                format!("Runner {who}"),
                "North".to_string(),
                MonotonicTimeNs(1),
            )
            .unwrap(),
        )
        .unwrap();
    }
    s
}

#[test]
fn at_run_db_01_guarded_append_updates_daily_state() {
    let mut s = store();
    let id = s
        .append_run_entry_guarded(input("0001", "6.00", Some(fp(1)), 10), DailyRunState::empty(), caps())
        .unwrap();
    assert_eq!(id, RunEntryId(1));
    let state = s.daily_state(&sid("0001"), day());
    assert_eq!(state.count, 1);
    assert_eq!(state.total_km, Decimal::from_str("6.00").unwrap());
    assert!(s.has_fingerprint(&fp(1)));
    assert_eq!(s.run_entries_for_day(&sid("0001"), day()).len(), 1);
    assert_eq!(state_via_repo(&s, "0002"), DailyRunState::empty());
}

#[test]
fn at_run_db_02_stale_expected_state_is_rejected_without_write() {
    let mut s = store();
    s.append_run_entry_guarded(input("0001", "6.00", Some(fp(1)), 10), DailyRunState::empty(), caps())
        .unwrap();
    let err = s
        .append_run_entry_guarded(input("0001", "3.00", Some(fp(2)), 11), DailyRunState::empty(), caps())
        .unwrap_err();
    assert!(matches!(err, StorageError::StaleDailyState { .. }));
    assert_eq!(s.run_entry_rows().len(), 1);
    assert!(!s.has_fingerprint(&fp(2)));
}

#[test]
fn at_run_db_03_caps_are_rechecked_at_append() {
    let mut s = store();
    let first = s.daily_state(&sid("0001"), day());
    s.append_run_entry_guarded(input("0001", "6.00", None, 10), first, caps())
        .unwrap();
    let second = s.daily_state(&sid("0001"), day());
    let err = s
        .append_run_entry_guarded(input("0001", "4.01", None, 11), second, caps())
        .unwrap_err();
    assert!(matches!(err, StorageError::DailyCapViolation { .. }));

    s.append_run_entry_guarded(input("0001", "1.00", None, 12), second, caps())
        .unwrap();
    let third = s.daily_state(&sid("0001"), day());
    let err = s
        .append_run_entry_guarded(input("0001", "1.00", None, 13), third, caps())
        .unwrap_err();
    assert!(matches!(err, StorageError::DailyCapViolation { .. }));
}

#[test]
fn at_run_db_04_fingerprint_is_unique_across_submitters() {
    let mut s = store();
    s.append_run_entry_guarded(input("0001", "2.00", Some(fp(7)), 10), DailyRunState::empty(), caps())
        .unwrap();
    let err = s
        .append_run_entry_guarded(input("0002", "2.00", Some(fp(7)), 11), DailyRunState::empty(), caps())
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::DuplicateKey {
            table: "run_entries.evidence_fingerprint",
            ..
        }
    ));
}

#[test]
fn at_run_db_05_unknown_or_inactive_submitter_is_foreign_key_violation() {
    let mut s = store();
    let err = s
        .append_run_entry_guarded(input("0099", "2.00", None, 10), DailyRunState::empty(), caps())
        .unwrap_err();
    assert!(matches!(err, StorageError::ForeignKeyViolation { .. }));

    s.deactivate_roster_row(&sid("0002"), MonotonicTimeNs(5)).unwrap();
    let err = s
        .append_run_entry_guarded(input("0002", "2.00", None, 10), DailyRunState::empty(), caps())
        .unwrap_err();
    assert!(matches!(err, StorageError::ForeignKeyViolation { .. }));
}

#[test]
fn at_run_db_06_admin_update_bypasses_caps_and_moves_day_index() {
    let mut s = store();
    let id = s
        .append_run_entry_guarded(input("0001", "6.00", Some(fp(1)), 10), DailyRunState::empty(), caps())
        .unwrap();
    let patch = RunEntryPatch {
        submitter_id: Some(sid("0002")),
        distance_km: Some(km("25.00")),
        ..RunEntryPatch::default()
    };
    let updated = s.admin_update_run_entry(id, &patch, MonotonicTimeNs(20)).unwrap();
    assert_eq!(updated.display_name, "Runner 0002");
    assert_eq!(s.daily_state(&sid("0001"), day()), DailyRunState::empty());
    assert_eq!(
        s.daily_state(&sid("0002"), day()).total_km,
        Decimal::from_str("25").unwrap()
    );
    assert!(s.has_fingerprint(&fp(1)));

    let cleared = RunEntryPatch {
        clear_evidence: true,
        ..RunEntryPatch::default()
    };
    s.admin_update_run_entry(id, &cleared, MonotonicTimeNs(21)).unwrap();
    assert!(!s.has_fingerprint(&fp(1)));
}

#[test]
fn at_run_db_07_admin_delete_frees_fingerprint_and_day_slot() {
    let mut s = store();
    let id = s
        .append_run_entry_guarded(input("0001", "6.00", Some(fp(3)), 10), DailyRunState::empty(), caps())
        .unwrap();
    s.admin_delete_run_entry(id, MonotonicTimeNs(30)).unwrap();
    assert!(s.run_entry(id).is_none());
    assert!(!s.has_fingerprint(&fp(3)));
    assert_eq!(s.daily_state(&sid("0001"), day()), DailyRunState::empty());
    assert!(matches!(
        s.admin_delete_run_entry(id, MonotonicTimeNs(31)),
        Err(StorageError::NotFound { .. })
    ));
}

#[test]
fn at_run_db_08_ledger_is_append_only_and_rebuilds_current_rows() {
    let mut s = store();
    let a = s
        .append_run_entry_guarded(input("0001", "6.00", Some(fp(1)), 10), DailyRunState::empty(), caps())
        .unwrap();
    let b = s
        .append_run_entry_guarded(input("0002", "3.00", Some(fp(2)), 11), DailyRunState::empty(), caps())
        .unwrap();
    s.admin_update_run_entry(
        a,
        &RunEntryPatch {
            distance_km: Some(km("5.50")),
            ..RunEntryPatch::default()
        },
        MonotonicTimeNs(12),
    )
    .unwrap();
    s.admin_delete_run_entry(b, MonotonicTimeNs(13)).unwrap();

    let kinds: Vec<RunLedgerEventKind> = s.run_ledger_rows().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            RunLedgerEventKind::Created,
            RunLedgerEventKind::Created,
            RunLedgerEventKind::AdminUpdated,
            RunLedgerEventKind::AdminDeleted,
        ]
    );
    assert_eq!(s.run_ledger_rows()[0].actor, LedgerActor::Submitter(sid("0001")));
    assert_eq!(s.run_ledger_rows()[2].actor, LedgerActor::Admin);

    let before = s.run_entry_rows().clone();
    s.rebuild_run_entry_current_rows();
    assert_eq!(s.run_entry_rows(), &before);
    assert!(s.has_fingerprint(&fp(1)));
    assert!(!s.has_fingerprint(&fp(2)));
    assert_eq!(s.run_ledger_rows().len(), 4);
}

#[test]
fn at_run_db_09_evidence_blob_is_stored_with_entry_and_survives_history() {
    let mut s = store();
    let id = s
        .append_run_entry_guarded(input("0001", "6.00", Some(fp(4)), 42), DailyRunState::empty(), caps())
        .unwrap();
    let stored = s.run_entry(id).unwrap().evidence.clone().unwrap();
    assert_eq!(stored.fingerprint, fp(4));
    assert_eq!(stored.byte_len, 10);
    assert_eq!(
        s.evidence_blob(&fp(4)),
        Some(&[0x89, b'P', b'N', b'G', 0, 0, 0, 0, 0, 42][..])
    );

    s.append_run_entry_guarded(input("0002", "1.00", Some(fp(5)), 43), DailyRunState::empty(), caps())
        .unwrap();
    let stale = s.append_run_entry_guarded(
        input("0002", "1.00", Some(fp(6)), 44),
        DailyRunState::empty(),
        caps(),
    );
    assert!(matches!(stale, Err(StorageError::StaleDailyState { .. })));
    assert!(s.evidence_blob(&fp(6)).is_none());

    s.admin_delete_run_entry(id, MonotonicTimeNs(50)).unwrap();
    s.rebuild_run_entry_current_rows();
    assert!(!s.has_fingerprint(&fp(4)));
    assert!(s.evidence_blob(&fp(4)).is_some());
}
