#![forbid(unsafe_code)]

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};

use crate::{
    http_status_for_outcome, AdapterHealthResponse, AdapterRuntime, AdminAdapterResponse,
    AdminLoginAdapterRequest, AdminLoginAdapterResponse, AdminRosterDeactivateAdapterRequest,
    AdminRosterListAdapterResponse, AdminRosterUpsertAdapterRequest, AdminRunDeleteAdapterRequest,
    AdminRunEvidenceAdapterRequest, AdminRunEvidenceAdapterResponse, AdminRunUpdateAdapterRequest,
    DailyStateAdapterRequest, DailyStateAdapterResponse, SubmitRunAdapterRequest,
    SubmitRunAdapterResponse, ADMIN_TOKEN_HEADER,
};

pub type SharedRuntime = Arc<AdapterRuntime>;

/// Headroom for the JSON envelope around the base64 evidence field.
pub const JSON_ENVELOPE_SLACK_BYTES: usize = 64 * 1024;

/// Request body cap for a given evidence limit. Base64 grows the image by 4/3, so any image the
/// evidence policy would admit fits, and oversized images still reach the typed size check.
pub fn body_limit_bytes(evidence_max_bytes: u64) -> usize {
    let encoded = evidence_max_bytes.div_ceil(3).saturating_mul(4);
    usize::try_from(encoded)
        .unwrap_or(usize::MAX)
        .saturating_add(JSON_ENVELOPE_SLACK_BYTES)
}

pub fn router(runtime: SharedRuntime) -> Router {
    let body_limit = body_limit_bytes(runtime.evidence_max_bytes());
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/runs/submit", post(submit_run))
        .route("/v1/runs/daily-state", post(daily_state))
        .route("/v1/admin/login", post(admin_login))
        .route("/v1/admin/logout", post(admin_logout))
        .route("/v1/admin/runs/update", post(admin_update_run))
        .route("/v1/admin/runs/delete", post(admin_delete_run))
        .route("/v1/admin/runs/evidence", post(admin_run_evidence))
        .route("/v1/admin/roster", get(admin_list_roster))
        .route("/v1/admin/roster/upsert", post(admin_upsert_roster))
        .route("/v1/admin/roster/deactivate", post(admin_deactivate_roster))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(runtime)
}

fn status(outcome: &str) -> StatusCode {
    StatusCode::from_u16(http_status_for_outcome(outcome))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn admin_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Runs a blocking runtime call off the async executor.
async fn blocking<T, F>(runtime: SharedRuntime, f: F) -> Result<T, StatusCode>
where
    T: Send + 'static,
    F: FnOnce(&AdapterRuntime) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&*runtime))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn healthz(State(runtime): State<SharedRuntime>) -> (StatusCode, Json<AdapterHealthResponse>) {
    let response = runtime.health_report();
    (status(&response.outcome), Json(response))
}

async fn submit_run(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<SubmitRunAdapterRequest>,
) -> Result<(StatusCode, Json<SubmitRunAdapterResponse>), StatusCode> {
    let response = blocking(runtime, move |rt| rt.submit_run(request)).await?;
    Ok((status(&response.outcome), Json(response)))
}

async fn daily_state(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<DailyStateAdapterRequest>,
) -> Result<(StatusCode, Json<DailyStateAdapterResponse>), StatusCode> {
    let response = blocking(runtime, move |rt| rt.daily_state(request)).await?;
    Ok((status(&response.outcome), Json(response)))
}

async fn admin_login(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<AdminLoginAdapterRequest>,
) -> Result<(StatusCode, Json<AdminLoginAdapterResponse>), StatusCode> {
    let response = blocking(runtime, move |rt| rt.admin_login(request)).await?;
    Ok((status(&response.outcome), Json(response)))
}

async fn admin_logout(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<AdminAdapterResponse>), StatusCode> {
    let token = admin_token(&headers);
    let response = blocking(runtime, move |rt| rt.admin_logout(token.as_deref())).await?;
    Ok((status(&response.outcome), Json(response)))
}

async fn admin_update_run(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Json(request): Json<AdminRunUpdateAdapterRequest>,
) -> Result<(StatusCode, Json<AdminAdapterResponse>), StatusCode> {
    let token = admin_token(&headers);
    let response =
        blocking(runtime, move |rt| rt.admin_update_run(token.as_deref(), request)).await?;
    Ok((status(&response.outcome), Json(response)))
}

async fn admin_delete_run(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Json(request): Json<AdminRunDeleteAdapterRequest>,
) -> Result<(StatusCode, Json<AdminAdapterResponse>), StatusCode> {
    let token = admin_token(&headers);
    let response =
        blocking(runtime, move |rt| rt.admin_delete_run(token.as_deref(), request)).await?;
    Ok((status(&response.outcome), Json(response)))
}

async fn admin_run_evidence(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Json(request): Json<AdminRunEvidenceAdapterRequest>,
) -> Result<(StatusCode, Json<AdminRunEvidenceAdapterResponse>), StatusCode> {
    let token = admin_token(&headers);
    let response =
        blocking(runtime, move |rt| rt.admin_run_evidence(token.as_deref(), request)).await?;
    Ok((status(&response.outcome), Json(response)))
}

async fn admin_list_roster(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<AdminRosterListAdapterResponse>), StatusCode> {
    let token = admin_token(&headers);
    let response = blocking(runtime, move |rt| rt.admin_list_roster(token.as_deref())).await?;
    Ok((status(&response.outcome), Json(response)))
}

async fn admin_upsert_roster(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Json(request): Json<AdminRosterUpsertAdapterRequest>,
) -> Result<(StatusCode, Json<AdminAdapterResponse>), StatusCode> {
    let token = admin_token(&headers);
    let response =
        blocking(runtime, move |rt| rt.admin_upsert_roster(token.as_deref(), request)).await?;
    Ok((status(&response.outcome), Json(response)))
}

async fn admin_deactivate_roster(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    Json(request): Json<AdminRosterDeactivateAdapterRequest>,
) -> Result<(StatusCode, Json<AdminAdapterResponse>), StatusCode> {
    let token = admin_token(&headers);
    let response = blocking(runtime, move |rt| {
        rt.admin_deactivate_roster(token.as_deref(), request)
    })
    .await?;
    Ok((status(&response.outcome), Json(response)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;

    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use base64::Engine;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use runlog_engines::auth::password_digest_hex;
    use runlog_engines::evidence::EVIDENCE_DEFAULT_MAX_BYTES;
    use runlog_kernel_contracts::run::RunDate;
    use runlog_kernel_contracts::MonotonicTimeNs;
    use runlog_os::clock::PinnedClock;
    use runlog_storage::ledger::RunLedgerStore;

    use crate::AdapterConfig;

    const PASSWORD: &str = "marathon-admin";

    fn runtime_with_runner() -> (SharedRuntime, String) {
        let mut config = AdapterConfig::mvp_v1();
        config.admin_password_sha256 = Some(password_digest_hex(PASSWORD));
        let clock = Arc::new(PinnedClock::new(
            RunDate::parse("2026-10-19").unwrap(),
            MonotonicTimeNs(1_000),
        ));
        let rt = AdapterRuntime::new(config, RunLedgerStore::new_in_memory(), clock).unwrap();
        let token = rt
            .admin_login(AdminLoginAdapterRequest {
                password: PASSWORD.to_string(),
            })
            .token
            .unwrap();
        let enrolled = rt.admin_upsert_roster(
            Some(&token),
            AdminRosterUpsertAdapterRequest {
                submitter_id: "0001".to_string(),
                display_name: "Runner".to_string(),
                station: "North".to_string(),
            },
        );
        assert_eq!(enrolled.outcome, "UPSERTED");
        (Arc::new(rt), token)
    }

    async fn serve(runtime: SharedRuntime) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(runtime)).await.unwrap();
        });
        addr
    }

    /// Minimal HTTP/1.1 exchange; returns the status code and the JSON body.
    async fn exchange(
        addr: SocketAddr,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: &str,
    ) -> (u16, serde_json::Value) {
        let mut head = format!(
            "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\
             Content-Type: application/json\r\nContent-Length: {}\r\n",
            body.len()
        );
        if let Some(token) = token {
            head.push_str(&format!("{ADMIN_TOKEN_HEADER}: {token}\r\n"));
        }
        head.push_str("\r\n");

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(body.as_bytes()).await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();

        let text = String::from_utf8_lossy(&raw);
        let status: u16 = text
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap();
        let json = text
            .split_once("\r\n\r\n")
            .and_then(|(_, b)| serde_json::from_str(b).ok())
            .unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn submission(image: &[u8]) -> String {
        serde_json::to_string(&SubmitRunAdapterRequest {
            submitter_id: "0001".to_string(),
            date: "2026-10-19".to_string(),
            distance_km: "5.00".to_string(),
            evidence_base64: Some(BASE64_STANDARD.encode(image)),
            evidence_mime: Some("image/png".to_string()),
        })
        .unwrap()
    }

    #[test]
    fn at_http_01_body_limit_covers_encoded_evidence() {
        let limit = body_limit_bytes(EVIDENCE_DEFAULT_MAX_BYTES);
        let encoded = BASE64_STANDARD.encode(vec![0u8; EVIDENCE_DEFAULT_MAX_BYTES as usize]);
        assert!(limit >= encoded.len() + 1024);
        assert!(limit > 2 * 1024 * 1024);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn at_http_02_three_mib_image_is_admitted_through_router() {
        let (rt, _) = runtime_with_runner();
        let addr = serve(rt).await;
        let image = vec![0x42u8; 3 * 1024 * 1024];
        let (status, body) = exchange(addr, "POST", "/v1/runs/submit", None, &submission(&image)).await;
        assert_eq!(status, 200);
        assert_eq!(body["outcome"], "ADMITTED");
        assert_eq!(body["daily_total_km"], "5.00");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn at_http_03_image_over_policy_limit_gets_typed_refusal() {
        let (rt, _) = runtime_with_runner();
        let addr = serve(rt).await;
        let image = vec![0x42u8; EVIDENCE_DEFAULT_MAX_BYTES as usize + 1];
        let (status, body) = exchange(addr, "POST", "/v1/runs/submit", None, &submission(&image)).await;
        assert_eq!(status, 422);
        assert_eq!(body["outcome"], "REJECTED_EVIDENCE_INVALID");
        assert_eq!(body["retry_advice"], "DO_NOT_RETRY");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn at_http_04_roster_listing_and_logout_routes() {
        let (rt, token) = runtime_with_runner();
        let addr = serve(rt).await;

        let (status, body) = exchange(addr, "GET", "/v1/admin/roster", Some(&token), "").await;
        assert_eq!(status, 200);
        assert_eq!(body["roster"][0]["submitter_id"], "0001");
        assert_eq!(body["roster"][0]["active"], true);

        let (status, body) = exchange(addr, "POST", "/v1/admin/logout", Some(&token), "").await;
        assert_eq!(status, 200);
        assert_eq!(body["outcome"], "LOGGED_OUT");

        let (status, body) = exchange(addr, "GET", "/v1/admin/roster", Some(&token), "").await;
        assert_eq!(status, 401);
        assert_eq!(body["outcome"], "UNAUTHORIZED");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn at_http_05_admin_can_fetch_stored_evidence() {
        let (rt, token) = runtime_with_runner();
        let addr = serve(rt).await;
        let (status, _) = exchange(addr, "POST", "/v1/runs/submit", None, &submission(b"png-proof")).await;
        assert_eq!(status, 200);

        let (status, body) = exchange(
            addr,
            "POST",
            "/v1/admin/runs/evidence",
            Some(&token),
            r#"{"entry_id":1}"#,
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["mime_type"], "image/png");
        assert_eq!(body["evidence_base64"], BASE64_STANDARD.encode(b"png-proof"));
        assert_eq!(
            body["fingerprint"],
            runlog_engines::evidence::fingerprint(b"png-proof").as_str()
        );
    }
}
