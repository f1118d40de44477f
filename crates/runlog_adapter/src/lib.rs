#![forbid(unsafe_code)]

use std::env;
use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use rust_decimal::Decimal;
use tracing::{info, warn};

use runlog_engines::admission::AdmissionConfig;
use runlog_engines::auth::{AdminAuthConfig, AdminAuthRuntime, AuthRefusal, CredentialChain};
use runlog_engines::evidence::EvidenceConfig;
use runlog_kernel_contracts::admin::CapabilityToken;
use runlog_kernel_contracts::roster::RosterRecord;
use runlog_kernel_contracts::run::{RunDate, RunEntry, RunEntryId};
use runlog_kernel_contracts::submission::{
    EvidenceUpload, SubmissionOutcome, SubmissionRequest,
};
use runlog_kernel_contracts::submitter::SubmitterIdPolicy;
use runlog_kernel_contracts::Validate;
use runlog_os::admin::{AdminOverrideRuntime, AdminRefusal, RawRunEntryPatch, SharedAdminAuth};
use runlog_os::clock::{FixedOffsetClock, OrgClock};
use runlog_os::gateway::SharedRunLedger;
use runlog_os::submission::{SubmissionConfig, SubmissionOrchestrator};
use runlog_storage::ledger::{RunLedgerStore, StorageError};

pub mod http;

pub const ADMIN_TOKEN_HEADER: &str = "x-runlog-admin-token";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SubmitRunAdapterRequest {
    pub submitter_id: String,
    pub date: String,
    /// Decimal string such as `"6.25"`.
    pub distance_km: String,
    pub evidence_base64: Option<String>,
    pub evidence_mime: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SubmitRunAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub reason_code: Option<u32>,
    pub retry_advice: Option<String>,
    pub entry_id: Option<String>,
    pub submitter_id: Option<String>,
    pub daily_count: Option<u32>,
    pub daily_total_km: Option<String>,
    pub remaining_km: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DailyStateAdapterRequest {
    pub submitter_id: String,
    /// Defaults to today in the organization timezone.
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DailyStateAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub submitter_id: Option<String>,
    pub date: Option<String>,
    pub count: Option<u32>,
    pub total_km: Option<String>,
    pub remaining_km: Option<String>,
    pub entries_left: Option<u32>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AdminLoginAdapterRequest {
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdminLoginAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub token: Option<String>,
    pub expires_at_ns: Option<u64>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AdminRunUpdateAdapterRequest {
    pub entry_id: u64,
    pub submitter_id: Option<String>,
    pub date: Option<String>,
    pub distance_km: Option<String>,
    pub clear_evidence: Option<bool>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AdminRunDeleteAdapterRequest {
    pub entry_id: u64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AdminRunEvidenceAdapterRequest {
    pub entry_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdminRunEvidenceAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub entry_id: Option<String>,
    pub fingerprint: Option<String>,
    pub mime_type: Option<String>,
    pub evidence_base64: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AdminRosterUpsertAdapterRequest {
    pub submitter_id: String,
    pub display_name: String,
    pub station: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AdminRosterDeactivateAdapterRequest {
    pub submitter_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RunEntryView {
    pub entry_id: String,
    pub submitter_id: String,
    pub display_name: String,
    pub station: String,
    pub date: String,
    pub distance_km: String,
    pub evidence_fingerprint: Option<String>,
}

impl From<&RunEntry> for RunEntryView {
    fn from(e: &RunEntry) -> Self {
        Self {
            entry_id: e.id.to_string(),
            submitter_id: e.submitter_id.to_string(),
            display_name: e.display_name.clone(),
            station: e.station.clone(),
            date: e.date.to_string(),
            distance_km: e.distance_km.to_string(),
            evidence_fingerprint: e.fingerprint().map(|f| f.as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RosterView {
    pub submitter_id: String,
    pub display_name: String,
    pub station: String,
    pub active: bool,
}

impl From<&RosterRecord> for RosterView {
    fn from(r: &RosterRecord) -> Self {
        Self {
            submitter_id: r.submitter_id.to_string(),
            display_name: r.display_name.clone(),
            station: r.station.clone(),
            active: r.is_active(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdminAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub entry: Option<RunEntryView>,
    pub roster: Option<RosterView>,
}

impl AdminAdapterResponse {
    fn ok(outcome: &str) -> Self {
        Self {
            status: "ok".to_string(),
            outcome: outcome.to_string(),
            reason: None,
            entry: None,
            roster: None,
        }
    }

    fn refused(refusal: &AdminRefusal) -> Self {
        let outcome = match refusal {
            AdminRefusal::Unauthorized => "UNAUTHORIZED",
            AdminRefusal::NotFound
            | AdminRefusal::Storage(StorageError::ForeignKeyViolation { .. }) => "NOT_FOUND",
            AdminRefusal::Invalid(_) => "INVALID",
            AdminRefusal::Storage(_) => "CONFLICT",
            AdminRefusal::Unavailable(_) => "UNAVAILABLE",
        };
        Self {
            status: "error".to_string(),
            outcome: outcome.to_string(),
            reason: Some(refusal.to_string()),
            entry: None,
            roster: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdminRosterListAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub roster: Vec<RosterView>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub today: Option<String>,
    pub roster_count: Option<usize>,
    pub run_entry_count: Option<usize>,
}

/// HTTP status for an adapter `outcome` string.
pub fn http_status_for_outcome(outcome: &str) -> u16 {
    match outcome {
        "ADMITTED" | "OK" | "UPDATED" | "DELETED" | "UPSERTED" | "DEACTIVATED" | "LOGGED_OUT"
        | "HEALTHY" => 200,
        "BAD_REQUEST" | "INVALID" => 400,
        "UNAUTHORIZED" => 401,
        "NOT_FOUND" => 404,
        "CONFLICT" | "REJECTED_CONCURRENT_CONFLICT" | "REJECTED_DUPLICATE_EVIDENCE" => 409,
        "TRANSPORT_FAILURE" | "UNAVAILABLE" | "UNHEALTHY" => 503,
        o if o.starts_with("REJECTED_") => 422,
        _ => 500,
    }
}

/// Process configuration assembled from `RUNLOG_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub org_utc_offset_minutes: i32,
    pub submission: SubmissionConfig,
    pub auth: AdminAuthConfig,
    pub admin_password_sha256: Option<String>,
    pub admin_legacy_password: Option<String>,
}

impl AdapterConfig {
    pub fn mvp_v1() -> Self {
        Self {
            org_utc_offset_minutes: 0,
            submission: SubmissionConfig::mvp_v1(),
            auth: AdminAuthConfig::mvp_v1(),
            admin_password_sha256: None,
            admin_legacy_password: None,
        }
    }

    pub fn from_env() -> Result<Self, String> {
        Self::from_env_var_map(|key| env::var(key).ok())
    }

    /// Unparsable values fall back to defaults with a warning; an invalid combination fails.
    pub fn from_env_var_map<F>(mut env_getter: F) -> Result<Self, String>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut cfg = Self::mvp_v1();
        let defaults = AdmissionConfig::mvp_v1();
        let evidence_defaults = EvidenceConfig::mvp_v1();

        cfg.org_utc_offset_minutes = parse_env_or_default(
            &mut env_getter,
            "RUNLOG_ORG_UTC_OFFSET_MINUTES",
            0,
            |v| v.parse::<i32>().ok().filter(|m| (-1439..=1439).contains(m)),
        );
        cfg.submission.admission.max_entries_per_day = parse_env_or_default(
            &mut env_getter,
            "RUNLOG_MAX_ENTRIES_PER_DAY",
            defaults.max_entries_per_day,
            |v| v.parse::<u32>().ok().filter(|n| (1..=64).contains(n)),
        );
        let ceiling = parse_env_or_default(
            &mut env_getter,
            "RUNLOG_DAILY_CEILING_KM",
            defaults.daily_ceiling_km,
            |v| Decimal::from_str(v).ok().filter(|d| *d > Decimal::ZERO),
        );
        cfg.submission.admission.daily_ceiling_km = ceiling;
        cfg.submission.admission.per_entry_ceiling_km = ceiling;
        cfg.submission.evidence.max_bytes = parse_env_or_default(
            &mut env_getter,
            "RUNLOG_EVIDENCE_MAX_BYTES",
            evidence_defaults.max_bytes,
            |v| v.parse::<u64>().ok().filter(|n| *n > 0),
        );
        cfg.submission.evidence.evidence_required = parse_env_or_default(
            &mut env_getter,
            "RUNLOG_EVIDENCE_REQUIRED",
            evidence_defaults.evidence_required,
            parse_bool,
        );
        if let Some(prefixes) = env_getter("RUNLOG_STAFF_PREFIXES") {
            match SubmitterIdPolicy::with_staff_prefixes(&prefixes) {
                Ok(policy) => cfg.submission.id_policy = policy,
                Err(v) => warn!(key = "RUNLOG_STAFF_PREFIXES", violation = %v, "using default staff prefixes"),
            }
        }
        let ttl_secs = parse_env_or_default(
            &mut env_getter,
            "RUNLOG_ADMIN_TOKEN_TTL_SECS",
            cfg.auth.token_ttl_ns / 1_000_000_000,
            |v| v.parse::<u64>().ok().filter(|s| (60..=7 * 86_400).contains(s)),
        );
        cfg.auth.token_ttl_ns = ttl_secs * 1_000_000_000;
        cfg.admin_password_sha256 = non_empty(env_getter("RUNLOG_ADMIN_PASSWORD_SHA256"));
        cfg.admin_legacy_password = non_empty(env_getter("RUNLOG_ADMIN_LEGACY_PASSWORD"));

        cfg.submission
            .validate()
            .map_err(|v| format!("invalid submission config: {v}"))?;
        Ok(cfg)
    }
}

fn parse_env_or_default<F, T, P>(env_getter: &mut F, key: &'static str, default: T, parse: P) -> T
where
    F: FnMut(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    match env_getter(key) {
        Some(raw) => match parse(raw.trim()) {
            Some(v) => v,
            None => {
                warn!(key, value = %raw, "unparsable config value; using default");
                default
            }
        },
        None => default,
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Request-facing facade. Internally synchronized; share it behind an `Arc`.
pub struct AdapterRuntime {
    ledger: SharedRunLedger,
    auth: SharedAdminAuth,
    clock: Arc<dyn OrgClock>,
    submissions: SubmissionOrchestrator<SharedRunLedger>,
    admin: AdminOverrideRuntime<SharedAdminAuth>,
}

impl AdapterRuntime {
    pub fn new(
        config: AdapterConfig,
        store: RunLedgerStore,
        clock: Arc<dyn OrgClock>,
    ) -> Result<Self, String> {
        if config.admin_password_sha256.is_none() && config.admin_legacy_password.is_none() {
            warn!("no admin credential configured; admin login is disabled");
        }
        let ledger = SharedRunLedger::new(store);
        let auth = SharedAdminAuth::new(AdminAuthRuntime::new(
            config.auth,
            CredentialChain::primary_then_legacy(
                config.admin_password_sha256.clone(),
                config.admin_legacy_password.clone(),
            ),
        ));
        let id_policy = config.submission.id_policy.clone();
        let submissions =
            SubmissionOrchestrator::new(ledger.clone(), clock.clone(), config.submission)
                .map_err(|v| format!("invalid submission config: {v}"))?;
        let admin = AdminOverrideRuntime::new(ledger.clone(), auth.clone(), clock.clone(), id_policy);
        Ok(Self {
            ledger,
            auth,
            clock,
            submissions,
            admin,
        })
    }

    pub fn default_from_env() -> Result<Self, String> {
        let config = AdapterConfig::from_env()?;
        let clock = FixedOffsetClock::from_utc_offset_minutes(config.org_utc_offset_minutes)
            .map_err(|v| format!("invalid org timezone: {v}"))?;
        Self::new(config, RunLedgerStore::new_in_memory(), Arc::new(clock))
    }

    /// Largest evidence image the submission policy admits.
    pub fn evidence_max_bytes(&self) -> u64 {
        self.submissions.config().evidence.max_bytes
    }

    pub fn health_report(&self) -> AdapterHealthResponse {
        match self
            .ledger
            .with_store(|s| (s.roster_rows().len(), s.run_entry_rows().len()))
        {
            Ok((roster_count, run_entry_count)) => AdapterHealthResponse {
                status: "ok".to_string(),
                outcome: "HEALTHY".to_string(),
                reason: None,
                today: Some(self.clock.today().to_string()),
                roster_count: Some(roster_count),
                run_entry_count: Some(run_entry_count),
            },
            Err(e) => AdapterHealthResponse {
                status: "error".to_string(),
                outcome: "UNHEALTHY".to_string(),
                reason: Some(e.to_string()),
                today: None,
                roster_count: None,
                run_entry_count: None,
            },
        }
    }

    pub fn submit_run(&self, request: SubmitRunAdapterRequest) -> SubmitRunAdapterResponse {
        let parsed = match parse_submission(request) {
            Ok(r) => r,
            Err(reason) => return submit_bad_request(reason),
        };
        match self.submissions.submit(&parsed) {
            SubmissionOutcome::Admitted(receipt) => SubmitRunAdapterResponse {
                status: "ok".to_string(),
                outcome: "ADMITTED".to_string(),
                reason: None,
                reason_code: None,
                retry_advice: None,
                entry_id: Some(receipt.entry_id.to_string()),
                submitter_id: Some(receipt.submitter_id.to_string()),
                daily_count: Some(receipt.daily.count),
                daily_total_km: Some(format!("{:.2}", receipt.daily.total_km)),
                remaining_km: Some(format!("{:.2}", receipt.remaining_km)),
            },
            SubmissionOutcome::Refused(refusal) => SubmitRunAdapterResponse {
                status: "error".to_string(),
                outcome: refusal.kind().as_str().to_string(),
                reason: Some(refusal.message()),
                reason_code: Some(refusal.reason_code().0),
                retry_advice: Some(refusal.retry_advice().as_str().to_string()),
                entry_id: None,
                submitter_id: None,
                daily_count: None,
                daily_total_km: None,
                remaining_km: refusal.remaining_km().map(|r| format!("{r:.2}")),
            },
        }
    }

    pub fn daily_state(&self, request: DailyStateAdapterRequest) -> DailyStateAdapterResponse {
        let date = match request.date.as_deref() {
            Some(raw) => match RunDate::parse(raw.trim()) {
                Ok(d) => d,
                Err(v) => return daily_state_error("BAD_REQUEST", format!("invalid date: {v}")),
            },
            None => self.clock.today(),
        };
        match self.submissions.daily_state(&request.submitter_id, date) {
            Ok(view) => DailyStateAdapterResponse {
                status: "ok".to_string(),
                outcome: "OK".to_string(),
                reason: None,
                submitter_id: Some(view.submitter_id.to_string()),
                date: Some(view.date.to_string()),
                count: Some(view.state.count),
                total_km: Some(format!("{:.2}", view.state.total_km)),
                remaining_km: Some(format!("{:.2}", view.remaining_km)),
                entries_left: Some(view.entries_left),
            },
            Err(refusal) => daily_state_error(refusal.kind().as_str(), refusal.message()),
        }
    }

    pub fn admin_login(&self, request: AdminLoginAdapterRequest) -> AdminLoginAdapterResponse {
        match self.auth.login(&request.password, self.clock.now()) {
            Ok(grant) => AdminLoginAdapterResponse {
                status: "ok".to_string(),
                outcome: "OK".to_string(),
                reason: None,
                token: Some(grant.token.as_str().to_string()),
                expires_at_ns: Some(grant.expires_at.0),
            },
            Err(refusal) => AdminLoginAdapterResponse {
                status: "error".to_string(),
                outcome: "UNAUTHORIZED".to_string(),
                reason: Some(
                    match refusal {
                        AuthRefusal::InvalidCredentials => "invalid admin credentials",
                        AuthRefusal::TokenIssueFailed => "could not issue admin token",
                    }
                    .to_string(),
                ),
                token: None,
                expires_at_ns: None,
            },
        }
    }

    pub fn admin_logout(&self, token: Option<&str>) -> AdminAdapterResponse {
        match parse_token(token) {
            Ok(token) if self.auth.revoke(&token) => {
                info!("admin capability revoked");
                AdminAdapterResponse::ok("LOGGED_OUT")
            }
            _ => AdminAdapterResponse::refused(&AdminRefusal::Unauthorized),
        }
    }

    pub fn admin_list_roster(&self, token: Option<&str>) -> AdminRosterListAdapterResponse {
        match parse_token(token).and_then(|token| self.admin.list_roster(&token)) {
            Ok(records) => AdminRosterListAdapterResponse {
                status: "ok".to_string(),
                outcome: "OK".to_string(),
                reason: None,
                roster: records.iter().map(RosterView::from).collect(),
            },
            Err(refusal) => {
                let refused = AdminAdapterResponse::refused(&refusal);
                AdminRosterListAdapterResponse {
                    status: refused.status,
                    outcome: refused.outcome,
                    reason: refused.reason,
                    roster: Vec::new(),
                }
            }
        }
    }

    pub fn admin_run_evidence(
        &self,
        token: Option<&str>,
        request: AdminRunEvidenceAdapterRequest,
    ) -> AdminRunEvidenceAdapterResponse {
        let entry_id = RunEntryId(request.entry_id);
        match parse_token(token).and_then(|token| self.admin.run_entry_evidence(&token, entry_id)) {
            Ok((evidence, bytes)) => AdminRunEvidenceAdapterResponse {
                status: "ok".to_string(),
                outcome: "OK".to_string(),
                reason: None,
                entry_id: Some(entry_id.to_string()),
                fingerprint: Some(evidence.fingerprint.as_str().to_string()),
                mime_type: Some(evidence.mime_type),
                evidence_base64: Some(BASE64_STANDARD.encode(bytes)),
            },
            Err(refusal) => {
                let refused = AdminAdapterResponse::refused(&refusal);
                AdminRunEvidenceAdapterResponse {
                    status: refused.status,
                    outcome: refused.outcome,
                    reason: refused.reason,
                    entry_id: None,
                    fingerprint: None,
                    mime_type: None,
                    evidence_base64: None,
                }
            }
        }
    }

    pub fn admin_update_run(
        &self,
        token: Option<&str>,
        request: AdminRunUpdateAdapterRequest,
    ) -> AdminAdapterResponse {
        let result = parse_token(token).and_then(|token| {
            let distance_km = request
                .distance_km
                .as_deref()
                .map(|d| Decimal::from_str(d.trim()))
                .transpose()
                .map_err(|_| {
                    AdminRefusal::Invalid(runlog_kernel_contracts::ContractViolation::InvalidValue {
                        field: "run_entry_patch.distance_km",
                        reason: "must be a decimal",
                    })
                })?;
            let patch = self.admin.patch_from_raw(&RawRunEntryPatch {
                submitter_id: request.submitter_id.clone(),
                date: request.date.clone(),
                distance_km,
                clear_evidence: request.clear_evidence.unwrap_or(false),
            })?;
            self.admin
                .update_run_entry(&token, RunEntryId(request.entry_id), &patch)
        });
        match result {
            Ok(entry) => AdminAdapterResponse {
                entry: Some(RunEntryView::from(&entry)),
                ..AdminAdapterResponse::ok("UPDATED")
            },
            Err(refusal) => AdminAdapterResponse::refused(&refusal),
        }
    }

    pub fn admin_delete_run(
        &self,
        token: Option<&str>,
        request: AdminRunDeleteAdapterRequest,
    ) -> AdminAdapterResponse {
        match parse_token(token)
            .and_then(|token| self.admin.delete_run_entry(&token, RunEntryId(request.entry_id)))
        {
            Ok(removed) => AdminAdapterResponse {
                entry: Some(RunEntryView::from(&removed)),
                ..AdminAdapterResponse::ok("DELETED")
            },
            Err(refusal) => AdminAdapterResponse::refused(&refusal),
        }
    }

    pub fn admin_upsert_roster(
        &self,
        token: Option<&str>,
        request: AdminRosterUpsertAdapterRequest,
    ) -> AdminAdapterResponse {
        match parse_token(token).and_then(|token| {
            self.admin.upsert_roster_identity(
                &token,
                &request.submitter_id,
                &request.display_name,
                &request.station,
            )
        }) {
            Ok(record) => AdminAdapterResponse {
                roster: Some(RosterView::from(&record)),
                ..AdminAdapterResponse::ok("UPSERTED")
            },
            Err(refusal) => AdminAdapterResponse::refused(&refusal),
        }
    }

    pub fn admin_deactivate_roster(
        &self,
        token: Option<&str>,
        request: AdminRosterDeactivateAdapterRequest,
    ) -> AdminAdapterResponse {
        match parse_token(token)
            .and_then(|token| self.admin.deactivate_roster_identity(&token, &request.submitter_id))
        {
            Ok(id) => {
                info!(submitter = %id, "roster identity deactivated via adapter");
                AdminAdapterResponse::ok("DEACTIVATED")
            }
            Err(refusal) => AdminAdapterResponse::refused(&refusal),
        }
    }
}

fn parse_token(raw: Option<&str>) -> Result<CapabilityToken, AdminRefusal> {
    raw.map(str::trim)
        .filter(|t| !t.is_empty())
        .and_then(|t| CapabilityToken::new(t).ok())
        .ok_or(AdminRefusal::Unauthorized)
}

fn parse_submission(request: SubmitRunAdapterRequest) -> Result<SubmissionRequest, String> {
    let date = RunDate::parse(request.date.trim()).map_err(|v| format!("invalid date: {v}"))?;
    let distance_km = Decimal::from_str(request.distance_km.trim())
        .map_err(|_| "invalid distance_km: must be a decimal".to_string())?;
    let evidence = match request.evidence_base64.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(encoded) => {
            let bytes = BASE64_STANDARD
                .decode(encoded)
                .map_err(|err| format!("invalid evidence_base64: {err}"))?;
            Some(EvidenceUpload {
                bytes,
                mime_type: request.evidence_mime.unwrap_or_default(),
            })
        }
    };
    Ok(SubmissionRequest {
        raw_submitter_id: request.submitter_id,
        date,
        distance_km,
        evidence,
    })
}

fn submit_bad_request(reason: String) -> SubmitRunAdapterResponse {
    SubmitRunAdapterResponse {
        status: "error".to_string(),
        outcome: "BAD_REQUEST".to_string(),
        reason: Some(reason),
        reason_code: None,
        retry_advice: None,
        entry_id: None,
        submitter_id: None,
        daily_count: None,
        daily_total_km: None,
        remaining_km: None,
    }
}

fn daily_state_error(outcome: &str, reason: String) -> DailyStateAdapterResponse {
    DailyStateAdapterResponse {
        status: "error".to_string(),
        outcome: outcome.to_string(),
        reason: Some(reason),
        submitter_id: None,
        date: None,
        count: None,
        total_km: None,
        remaining_km: None,
        entries_left: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use runlog_engines::auth::password_digest_hex;
    use runlog_kernel_contracts::MonotonicTimeNs;
    use runlog_os::clock::PinnedClock;

    const PASSWORD: &str = "marathon-admin";

    fn runtime() -> AdapterRuntime {
        let mut config = AdapterConfig::mvp_v1();
        config.admin_password_sha256 = Some(password_digest_hex(PASSWORD));
        let clock = Arc::new(PinnedClock::new(
            RunDate::parse("2026-10-19").unwrap(),
            MonotonicTimeNs(1_000),
        ));
        AdapterRuntime::new(config, RunLedgerStore::new_in_memory(), clock).unwrap()
    }

    fn login(rt: &AdapterRuntime) -> String {
        rt.admin_login(AdminLoginAdapterRequest {
            password: PASSWORD.to_string(),
        })
        .token
        .unwrap()
    }

    fn enroll(rt: &AdapterRuntime, token: &str, id: &str) {
        let out = rt.admin_upsert_roster(
            Some(token),
            AdminRosterUpsertAdapterRequest {
                submitter_id: id.to_string(),
                display_name: "Runner".to_string(),
                station: "North".to_string(),
            },
        );
        assert_eq!(out.outcome, "UPSERTED");
    }

    fn submit(distance: &str, evidence: &[u8]) -> SubmitRunAdapterRequest {
        SubmitRunAdapterRequest {
            submitter_id: "0001".to_string(),
            date: "2026-10-19".to_string(),
            distance_km: distance.to_string(),
            evidence_base64: Some(BASE64_STANDARD.encode(evidence)),
            evidence_mime: Some("image/png".to_string()),
        }
    }

    #[test]
    fn at_adapter_01_submit_then_daily_state() {
        let rt = runtime();
        let token = login(&rt);
        enroll(&rt, &token, "0001");

        let out = rt.submit_run(submit("6", b"png-1"));
        assert_eq!(out.outcome, "ADMITTED");
        assert_eq!(out.daily_total_km.as_deref(), Some("6.00"));
        assert_eq!(out.remaining_km.as_deref(), Some("4.00"));
        assert_eq!(http_status_for_outcome(&out.outcome), 200);

        let state = rt.daily_state(DailyStateAdapterRequest {
            submitter_id: "1".to_string(),
            date: None,
        });
        assert_eq!(state.outcome, "OK");
        assert_eq!(state.submitter_id.as_deref(), Some("1"));
        assert_eq!(state.count, Some(0));

        let state = rt.daily_state(DailyStateAdapterRequest {
            submitter_id: "ID 0001".to_string(),
            date: Some("2026-10-19".to_string()),
        });
        assert_eq!(state.count, Some(1));
        assert_eq!(state.entries_left, Some(1));
    }

    #[test]
    fn at_adapter_02_refusals_carry_reason_code_and_advice() {
        let rt = runtime();
        let token = login(&rt);
        enroll(&rt, &token, "0001");
        rt.submit_run(submit("6.00", b"png-1"));

        let out = rt.submit_run(submit("5.00", b"png-2"));
        assert_eq!(out.outcome, "REJECTED_WOULD_EXCEED_CEILING");
        assert_eq!(out.remaining_km.as_deref(), Some("4.00"));
        assert_eq!(out.retry_advice.as_deref(), Some("RETRY_WITH_SMALLER_DISTANCE"));
        assert_eq!(out.reason_code, Some(0x524E_0014));
        assert_eq!(http_status_for_outcome(&out.outcome), 422);

        let dup = rt.submit_run(submit("1.00", b"png-1"));
        assert_eq!(dup.outcome, "REJECTED_DUPLICATE_EVIDENCE");
        assert_eq!(http_status_for_outcome(&dup.outcome), 409);
    }

    #[test]
    fn at_adapter_03_malformed_payload_is_bad_request() {
        let rt = runtime();
        let mut req = submit("6.00", b"png");
        req.evidence_base64 = Some("***".to_string());
        assert_eq!(rt.submit_run(req).outcome, "BAD_REQUEST");
        assert_eq!(rt.submit_run(submit("six", b"png")).outcome, "BAD_REQUEST");
        let mut req = submit("6.00", b"png");
        req.date = "19/10/2026".to_string();
        assert_eq!(rt.submit_run(req).outcome, "BAD_REQUEST");
    }

    #[test]
    fn at_adapter_04_admin_routes_require_token() {
        let rt = runtime();
        let out = rt.admin_delete_run(None, AdminRunDeleteAdapterRequest { entry_id: 1 });
        assert_eq!(out.outcome, "UNAUTHORIZED");
        assert_eq!(http_status_for_outcome(&out.outcome), 401);
        let bad = rt.admin_login(AdminLoginAdapterRequest {
            password: "wrong".to_string(),
        });
        assert_eq!(bad.outcome, "UNAUTHORIZED");
        assert!(bad.token.is_none());
    }

    #[test]
    fn at_adapter_05_admin_update_and_delete() {
        let rt = runtime();
        let token = login(&rt);
        enroll(&rt, &token, "0001");
        rt.submit_run(submit("6.00", b"png-1"));

        let updated = rt.admin_update_run(
            Some(&token),
            AdminRunUpdateAdapterRequest {
                entry_id: 1,
                submitter_id: None,
                date: None,
                distance_km: Some("9.75".to_string()),
                clear_evidence: Some(true),
            },
        );
        assert_eq!(updated.outcome, "UPDATED");
        let entry = updated.entry.unwrap();
        assert_eq!(entry.distance_km, "9.75");
        assert_eq!(entry.evidence_fingerprint, None);

        let deleted = rt.admin_delete_run(Some(&token), AdminRunDeleteAdapterRequest { entry_id: 1 });
        assert_eq!(deleted.outcome, "DELETED");
        let again = rt.admin_delete_run(Some(&token), AdminRunDeleteAdapterRequest { entry_id: 1 });
        assert_eq!(again.outcome, "NOT_FOUND");
    }

    #[test]
    fn at_adapter_06_deactivated_submitter_is_unknown() {
        let rt = runtime();
        let token = login(&rt);
        enroll(&rt, &token, "0001");
        let out = rt.admin_deactivate_roster(
            Some(&token),
            AdminRosterDeactivateAdapterRequest {
                submitter_id: "0001".to_string(),
            },
        );
        assert_eq!(out.outcome, "DEACTIVATED");
        assert_eq!(
            rt.submit_run(submit("3.00", b"png")).outcome,
            "REJECTED_UNKNOWN_SUBMITTER"
        );
    }

    #[test]
    fn at_adapter_07_config_from_env_map_with_fallbacks() {
        let vars: BTreeMap<&str, &str> = BTreeMap::from([
            ("RUNLOG_ORG_UTC_OFFSET_MINUTES", "480"),
            ("RUNLOG_MAX_ENTRIES_PER_DAY", "lots"),
            ("RUNLOG_DAILY_CEILING_KM", "21.1"),
            ("RUNLOG_EVIDENCE_REQUIRED", "off"),
            ("RUNLOG_STAFF_PREFIXES", "S,T"),
            ("RUNLOG_ADMIN_LEGACY_PASSWORD", "  "),
        ]);
        let cfg =
            AdapterConfig::from_env_var_map(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.org_utc_offset_minutes, 480);
        assert_eq!(cfg.submission.admission.max_entries_per_day, 2);
        assert_eq!(
            cfg.submission.admission.daily_ceiling_km,
            Decimal::from_str("21.1").unwrap()
        );
        assert!(!cfg.submission.evidence.evidence_required);
        assert_eq!(cfg.submission.id_policy.staff_class_prefixes, vec!['S', 'T']);
        assert_eq!(cfg.admin_legacy_password, None);
    }

    #[tokio::test]
    async fn at_adapter_08_concurrent_requests_never_exceed_ceiling() {
        let rt = Arc::new(runtime());
        let token = login(&rt);
        enroll(&rt, &token, "0001");

        let mut tasks = Vec::new();
        for i in 0..6u8 {
            let rt = Arc::clone(&rt);
            tasks.push(tokio::task::spawn_blocking(move || {
                rt.submit_run(submit("6.00", &[b'p', i]))
            }));
        }
        let mut admitted = 0;
        for t in tasks {
            let out = t.await.unwrap();
            if out.outcome == "ADMITTED" {
                admitted += 1;
            } else {
                assert!(matches!(
                    out.outcome.as_str(),
                    "REJECTED_CONCURRENT_CONFLICT" | "REJECTED_WOULD_EXCEED_CEILING"
                ));
            }
        }
        assert_eq!(admitted, 1);
        let health = rt.health_report();
        assert_eq!(health.run_entry_count, Some(1));
        assert_eq!(health.roster_count, Some(1));
    }

    #[test]
    fn at_adapter_09_patch_naming_unknown_submitter_is_not_found() {
        let rt = runtime();
        let token = login(&rt);
        enroll(&rt, &token, "0001");
        rt.submit_run(submit("6.00", b"png-1"));

        let out = rt.admin_update_run(
            Some(&token),
            AdminRunUpdateAdapterRequest {
                entry_id: 1,
                submitter_id: Some("0077".to_string()),
                date: None,
                distance_km: None,
                clear_evidence: None,
            },
        );
        assert_eq!(out.outcome, "NOT_FOUND");
        assert_eq!(http_status_for_outcome(&out.outcome), 404);
        assert!(out.reason.unwrap().contains("foreign key"));
    }

    #[test]
    fn at_adapter_10_logout_revokes_and_roster_listing_needs_token() {
        let rt = runtime();
        let token = login(&rt);
        enroll(&rt, &token, "0001");
        let listed = rt.admin_list_roster(Some(&token));
        assert_eq!(listed.outcome, "OK");
        assert_eq!(listed.roster.len(), 1);

        assert_eq!(rt.admin_logout(Some(&token)).outcome, "LOGGED_OUT");
        assert_eq!(rt.admin_logout(Some(&token)).outcome, "UNAUTHORIZED");
        let refused = rt.admin_list_roster(Some(&token));
        assert_eq!(refused.outcome, "UNAUTHORIZED");
        assert!(refused.roster.is_empty());
    }
}
