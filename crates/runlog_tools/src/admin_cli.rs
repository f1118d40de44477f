#![forbid(unsafe_code)]

use runlog_engines::auth::{password_digest_hex, ChainVerdict, CredentialChain};
use runlog_kernel_contracts::submitter::{SubmitterId, SubmitterIdPolicy};

pub const USAGE: &str = "usage: runlog <admin-digest|normalize <raw_id> [staff_prefixes]>";

const MIN_ADMIN_PASSWORD_CHARS: usize = 8;

/// `secret` is only consulted by `admin-digest`.
pub fn execute_command(
    subcommand: &str,
    arg: Option<&str>,
    extra: Option<&str>,
    secret: Option<&str>,
) -> Result<String, String> {
    match subcommand {
        "admin-digest" => {
            let password = secret.ok_or_else(|| "missing admin password input".to_string())?;
            admin_digest(password)
        }
        "normalize" => {
            let raw = arg.ok_or_else(|| USAGE.to_string())?;
            normalize(raw, extra)
        }
        _ => Err(format!(
            "unknown subcommand: {subcommand}. expected one of: admin-digest, normalize"
        )),
    }
}

/// Value for `RUNLOG_ADMIN_PASSWORD_SHA256`. Re-verified through the primary credential scheme.
pub fn admin_digest(password: &str) -> Result<String, String> {
    if password.chars().count() < MIN_ADMIN_PASSWORD_CHARS {
        return Err(format!(
            "admin password must be at least {MIN_ADMIN_PASSWORD_CHARS} characters"
        ));
    }
    let digest = password_digest_hex(password);
    match CredentialChain::primary_then_legacy(Some(digest.clone()), None).verify(password) {
        ChainVerdict::Accepted { .. } => Ok(digest),
        ChainVerdict::Denied => Err("digest did not verify against the password".to_string()),
    }
}

pub fn normalize(raw: &str, staff_prefixes: Option<&str>) -> Result<String, String> {
    let policy = match staff_prefixes {
        Some(p) => SubmitterIdPolicy::with_staff_prefixes(p)
            .map_err(|v| format!("invalid staff prefixes: {v}"))?,
        None => SubmitterIdPolicy::mvp_v1(),
    };
    SubmitterId::normalize(raw, &policy)
        .map(|id| id.to_string())
        .map_err(|v| format!("cannot normalize '{raw}': {v}"))
}
