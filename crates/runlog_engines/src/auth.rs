#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use runlog_kernel_contracts::admin::{CapabilityGrant, CapabilityToken};
use runlog_kernel_contracts::{ContractViolation, MonotonicTimeNs};

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOutcome {
    Accepted,
    Rejected,
    /// The validator has no credential configured and cannot judge.
    NotApplicable,
}

/// One admin credential scheme. Chains try validators in order.
pub trait CredentialValidator: Send + Sync {
    fn scheme(&self) -> &'static str;
    fn check(&self, password: &str) -> CredentialOutcome;
}

pub fn password_digest_hex(password: &str) -> String {
    Sha256::digest(password.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Current scheme: compares the SHA-256 digest of the password.
#[derive(Debug, Clone)]
pub struct PrimaryDigestValidator {
    expected_sha256_hex: Option<String>,
}

impl PrimaryDigestValidator {
    pub fn new(expected_sha256_hex: Option<String>) -> Self {
        Self {
            expected_sha256_hex: expected_sha256_hex.map(|h| h.trim().to_ascii_lowercase()),
        }
    }
}

impl CredentialValidator for PrimaryDigestValidator {
    fn scheme(&self) -> &'static str {
        "primary_sha256"
    }

    fn check(&self, password: &str) -> CredentialOutcome {
        let Some(expected) = &self.expected_sha256_hex else {
            return CredentialOutcome::NotApplicable;
        };
        if constant_time_eq(password_digest_hex(password).as_bytes(), expected.as_bytes()) {
            CredentialOutcome::Accepted
        } else {
            CredentialOutcome::Rejected
        }
    }
}

/// Older deployments configured a plaintext admin password.
#[derive(Debug, Clone)]
pub struct LegacyPlaintextValidator {
    expected: Option<String>,
}

impl LegacyPlaintextValidator {
    pub fn new(expected: Option<String>) -> Self {
        Self {
            expected: expected.filter(|p| !p.is_empty()),
        }
    }
}

impl CredentialValidator for LegacyPlaintextValidator {
    fn scheme(&self) -> &'static str {
        "legacy_plaintext"
    }

    fn check(&self, password: &str) -> CredentialOutcome {
        let Some(expected) = &self.expected else {
            return CredentialOutcome::NotApplicable;
        };
        if constant_time_eq(password.as_bytes(), expected.as_bytes()) {
            CredentialOutcome::Accepted
        } else {
            CredentialOutcome::Rejected
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainVerdict {
    Accepted { scheme: &'static str },
    Denied,
}

/// Ordered fallback: the first validator that accepts wins; a rejection falls through to the
/// next scheme.
#[derive(Default)]
pub struct CredentialChain {
    validators: Vec<Box<dyn CredentialValidator>>,
}

impl CredentialChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, validator: impl CredentialValidator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn primary_then_legacy(
        primary_sha256_hex: Option<String>,
        legacy_plaintext: Option<String>,
    ) -> Self {
        Self::new()
            .with(PrimaryDigestValidator::new(primary_sha256_hex))
            .with(LegacyPlaintextValidator::new(legacy_plaintext))
    }

    pub fn verify(&self, password: &str) -> ChainVerdict {
        if password.is_empty() {
            return ChainVerdict::Denied;
        }
        for v in &self.validators {
            if v.check(password) == CredentialOutcome::Accepted {
                return ChainVerdict::Accepted { scheme: v.scheme() };
            }
        }
        ChainVerdict::Denied
    }
}

impl std::fmt::Debug for CredentialChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schemes: Vec<&'static str> = self.validators.iter().map(|v| v.scheme()).collect();
        f.debug_struct("CredentialChain")
            .field("schemes", &schemes)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminAuthConfig {
    pub token_ttl_ns: u64,
    pub max_live_tokens: usize,
}

impl AdminAuthConfig {
    pub fn mvp_v1() -> Self {
        Self {
            token_ttl_ns: 12 * 3_600 * 1_000_000_000,
            max_live_tokens: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRefusal {
    InvalidCredentials,
    TokenIssueFailed,
}

/// Issues and checks admin capability tokens.
#[derive(Debug)]
pub struct AdminAuthRuntime {
    config: AdminAuthConfig,
    chain: CredentialChain,
    live_tokens: BTreeMap<CapabilityToken, MonotonicTimeNs>,
}

impl AdminAuthRuntime {
    pub fn new(config: AdminAuthConfig, chain: CredentialChain) -> Self {
        Self {
            config,
            chain,
            live_tokens: BTreeMap::new(),
        }
    }

    pub fn login(
        &mut self,
        password: &str,
        now: MonotonicTimeNs,
    ) -> Result<CapabilityGrant, AuthRefusal> {
        let scheme = match self.chain.verify(password) {
            ChainVerdict::Accepted { scheme } => scheme,
            ChainVerdict::Denied => {
                warn!("admin login denied");
                return Err(AuthRefusal::InvalidCredentials);
            }
        };
        self.prune_expired(now);
        while self.live_tokens.len() >= self.config.max_live_tokens {
            let oldest = self
                .live_tokens
                .iter()
                .min_by_key(|(_, exp)| **exp)
                .map(|(t, _)| t.clone());
            match oldest {
                Some(t) => {
                    self.live_tokens.remove(&t);
                }
                None => break,
            }
        }

        let token = issue_token().map_err(|_| AuthRefusal::TokenIssueFailed)?;
        let expires_at = MonotonicTimeNs(now.0.saturating_add(self.config.token_ttl_ns));
        self.live_tokens.insert(token.clone(), expires_at);
        info!(scheme, "admin capability token issued");
        Ok(CapabilityGrant {
            token,
            issued_at: now,
            expires_at,
        })
    }

    pub fn is_authorized(&self, token: &CapabilityToken, now: MonotonicTimeNs) -> bool {
        self.live_tokens
            .get(token)
            .map(|exp| now < *exp)
            .unwrap_or(false)
    }

    pub fn revoke(&mut self, token: &CapabilityToken) -> bool {
        self.live_tokens.remove(token).is_some()
    }

    pub fn prune_expired(&mut self, now: MonotonicTimeNs) {
        self.live_tokens.retain(|_, exp| now < *exp);
    }
}

fn issue_token() -> Result<CapabilityToken, ContractViolation> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    CapabilityToken::new(BASE64_URL.encode(bytes))
}
