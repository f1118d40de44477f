#![forbid(unsafe_code)]

use sha2::{Digest, Sha256};
use tracing::debug;

use runlog_kernel_contracts::run::{EvidenceFingerprint, EvidencePayload};
use runlog_kernel_contracts::submission::{EvidenceUpload, SubmissionRefusal};
use runlog_kernel_contracts::{ContractViolation, Validate};

pub const EVIDENCE_DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidenceConfig {
    pub max_bytes: u64,
    pub evidence_required: bool,
}

impl EvidenceConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_bytes: EVIDENCE_DEFAULT_MAX_BYTES,
            evidence_required: true,
        }
    }
}

impl Validate for EvidenceConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.max_bytes == 0 || self.max_bytes > 64 * 1024 * 1024 {
            return Err(ContractViolation::InvalidValue {
                field: "evidence_config.max_bytes",
                reason: "must be within 1..=64 MiB",
            });
        }
        Ok(())
    }
}

/// SHA-256 over the raw bytes, lowercase hex.
pub fn fingerprint(bytes: &[u8]) -> EvidenceFingerprint {
    let digest: [u8; 32] = Sha256::digest(bytes).into();
    EvidenceFingerprint::from_digest(&digest)
}

#[derive(Debug, Clone)]
pub struct EvidenceRuntime {
    config: EvidenceConfig,
}

impl EvidenceRuntime {
    pub fn new(config: EvidenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvidenceConfig {
        &self.config
    }

    /// Checks presence, type and size, then fingerprints. Returns `Ok(None)` only when the
    /// policy waives proof and none was uploaded.
    pub fn admit(
        &self,
        upload: Option<&EvidenceUpload>,
    ) -> Result<Option<EvidencePayload>, SubmissionRefusal> {
        let Some(upload) = upload else {
            if self.config.evidence_required {
                return Err(SubmissionRefusal::EvidenceInvalid {
                    reason: "evidence image is required",
                });
            }
            return Ok(None);
        };
        self.check_policy(upload)?;
        let fp = fingerprint(&upload.bytes);
        debug!(fingerprint = %fp, byte_len = upload.bytes.len(), "evidence fingerprinted");
        Ok(Some(EvidencePayload {
            fingerprint: fp,
            mime_type: normalized_mime(&upload.mime_type),
            bytes: upload.bytes.clone(),
        }))
    }

    fn check_policy(&self, upload: &EvidenceUpload) -> Result<(), SubmissionRefusal> {
        if !is_image_mime(&upload.mime_type) {
            return Err(SubmissionRefusal::EvidenceInvalid {
                reason: "evidence must be an image",
            });
        }
        if upload.bytes.is_empty() {
            return Err(SubmissionRefusal::EvidenceInvalid {
                reason: "evidence file is empty",
            });
        }
        if upload.bytes.len() as u64 > self.config.max_bytes {
            return Err(SubmissionRefusal::EvidenceInvalid {
                reason: "evidence file exceeds the size limit",
            });
        }
        Ok(())
    }
}

fn normalized_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_image_mime(mime: &str) -> bool {
    let m = normalized_mime(mime);
    match m.strip_prefix("image/") {
        Some(subtype) => {
            !subtype.is_empty()
                && subtype
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-'))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(bytes: &[u8], mime: &str) -> EvidenceUpload {
        EvidenceUpload {
            bytes: bytes.to_vec(),
            mime_type: mime.to_string(),
        }
    }

    #[test]
    fn at_evd_01_fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(b"abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn at_evd_02_same_bytes_same_fingerprint() {
        let rt = EvidenceRuntime::new(EvidenceConfig::mvp_v1());
        let a = rt.admit(Some(&upload(b"png-bytes", "image/png"))).unwrap();
        let b = rt.admit(Some(&upload(b"png-bytes", "IMAGE/PNG; q=1"))).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_ref().unwrap().bytes, b"png-bytes".to_vec());
        let c = rt.admit(Some(&upload(b"png-bytez", "image/png"))).unwrap();
        assert_ne!(a.unwrap().fingerprint, c.unwrap().fingerprint);
    }

    #[test]
    fn at_evd_03_non_image_rejected() {
        let rt = EvidenceRuntime::new(EvidenceConfig::mvp_v1());
        for mime in ["application/pdf", "text/plain", "image/", "imagepng"] {
            assert!(matches!(
                rt.admit(Some(&upload(b"x", mime))),
                Err(SubmissionRefusal::EvidenceInvalid { .. })
            ));
        }
    }

    #[test]
    fn at_evd_04_size_limit_enforced() {
        let rt = EvidenceRuntime::new(EvidenceConfig {
            max_bytes: 4,
            evidence_required: true,
        });
        assert!(rt.admit(Some(&upload(b"1234", "image/jpeg"))).is_ok());
        assert!(rt.admit(Some(&upload(b"12345", "image/jpeg"))).is_err());
        assert!(rt.admit(Some(&upload(b"", "image/jpeg"))).is_err());
    }

    #[test]
    fn at_evd_05_missing_evidence_depends_on_policy() {
        let strict = EvidenceRuntime::new(EvidenceConfig::mvp_v1());
        assert!(strict.admit(None).is_err());
        let waived = EvidenceRuntime::new(EvidenceConfig {
            evidence_required: false,
            ..EvidenceConfig::mvp_v1()
        });
        assert_eq!(waived.admit(None), Ok(None));
    }
}
