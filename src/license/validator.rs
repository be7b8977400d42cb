//! License token validation.

use super::claims::LicenseClaims;
use super::token::LicenseToken;
use super::LicenseRejection;
use crate::clock::Clock;
use crate::crypto::verify::SignatureVerifier;
use crate::DepotGuardError;
use std::sync::Arc;

/// How far in the future an `issued` timestamp may be before the token is
/// treated as not yet valid.
const ISSUED_SKEW_TOLERANCE_SECS: i64 = 5 * 60;

/// Validates license tokens against the license signing key.
#[derive(Clone)]
pub struct LicenseValidator {
    verifier: SignatureVerifier,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LicenseValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseValidator")
            .field("fingerprint", &self.verifier.fingerprint())
            .finish()
    }
}

impl LicenseValidator {
    /// Create a validator bound to one verifier and clock.
    pub fn new(verifier: SignatureVerifier, clock: Arc<dyn Clock>) -> Self {
        Self { verifier, clock }
    }

    /// Validate a token.
    ///
    /// Every failure collapses to [`DepotGuardError::InvalidLicense`]; the
    /// specific reason is logged.
    pub fn validate(&self, token: &str) -> Result<LicenseClaims, DepotGuardError> {
        self.check(token)
            .map_err(|_| DepotGuardError::InvalidLicense)
    }

    /// Validate a token, exposing the internal rejection reason.
    pub fn check(&self, token: &str) -> Result<LicenseClaims, LicenseRejection> {
        let result = self.run_checks(token);
        match &result {
            Ok(claims) => {
                tracing::info!(subject = %claims.subject(), "License validated");
            }
            Err(LicenseRejection::Signature) => {
                tracing::error!(reason = %LicenseRejection::Signature, "License rejected");
            }
            Err(reason) => {
                tracing::warn!(reason = %reason, "License rejected");
            }
        }
        result
    }

    fn run_checks(&self, token: &str) -> Result<LicenseClaims, LicenseRejection> {
        // 1-2. Split and decode
        let token = LicenseToken::parse(token)?;

        // 3. Signature over the exact payload bytes
        if !self.verifier.verify(&token.payload, &token.signature) {
            return Err(LicenseRejection::Signature);
        }

        // 4. Claims
        let claims = LicenseClaims::from_payload(&token.payload)?;

        // 5. Validity window
        let now = self.clock.now_utc();
        if claims.expiry() <= now {
            return Err(LicenseRejection::Expired);
        }
        if let Some(issued) = claims.issued_at() {
            if issued > now + chrono::Duration::seconds(ISSUED_SKEW_TOLERANCE_SECS) {
                return Err(LicenseRejection::NotYetValid);
            }
        }

        // 6. Accept
        Ok(claims)
    }

    /// Whether the token is valid and grants `feature`.
    pub fn check_feature(&self, token: &str, feature: &str) -> bool {
        self.validate(token)
            .map(|claims| claims.has_entitlement(feature))
            .unwrap_or(false)
    }

    /// Whole days until the token expires, or `None` if it is invalid.
    pub fn days_until_expiry(&self, token: &str) -> Option<i64> {
        self.validate(token)
            .ok()
            .map(|claims| claims.days_until_expiry(self.clock.now_utc()))
    }

    /// Current time according to the injected clock.
    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::{Pss, RsaPrivateKey};
    use sha2::{Digest, Sha256};

    const LICENSE_PUB: &str = include_str!("../../tests/fixtures/license_public_key.pem");
    const LICENSE_PRIV: &str = include_str!("../../tests/fixtures/license_signing_key.pem");
    const UPDATE_PRIV: &str = include_str!("../../tests/fixtures/update_signing_key.pem");
    const VALID_TOKEN: &str = include_str!("../../tests/fixtures/valid_license.token");

    fn sign(private_pem: &str, payload: &[u8]) -> Vec<u8> {
        let key = RsaPrivateKey::from_pkcs8_pem(private_pem).unwrap();
        key.sign_with_rng(
            &mut rand::thread_rng(),
            Pss::new_with_salt::<Sha256>(222),
            &Sha256::digest(payload),
        )
        .unwrap()
    }

    fn token_for(payload: &str) -> String {
        let sig = sign(LICENSE_PRIV, payload.as_bytes());
        format!("{}.{}", STANDARD.encode(payload), STANDARD.encode(sig))
    }

    fn validator_at(now: &str) -> LicenseValidator {
        LicenseValidator::new(
            SignatureVerifier::from_pem(LICENSE_PUB).unwrap(),
            Arc::new(MockClock::from_rfc3339(now)),
        )
    }

    #[test]
    fn test_fixture_token_validates() {
        let validator = validator_at("2026-03-01T00:00:00Z");
        let claims = validator.validate(VALID_TOKEN).unwrap();
        assert_eq!(claims.subject(), "Kho Hang Minh Anh");
        assert!(claims.has_entitlement("bank_notifications"));
        assert!(claims.has_entitlement("reports"));
    }

    #[test]
    fn test_expired_token() {
        let validator = validator_at("2026-03-01T00:00:00Z");
        let token = token_for(r#"{"issuedTo":"X","expiry":"2026-02-28T23:59:59Z","entitlements":[]}"#);
        assert_eq!(validator.check(&token).unwrap_err(), LicenseRejection::Expired);
        assert!(matches!(
            validator.validate(&token),
            Err(DepotGuardError::InvalidLicense)
        ));
    }

    #[test]
    fn test_expiry_equal_to_now_is_expired() {
        let validator = validator_at("2026-03-01T00:00:00Z");
        let token = token_for(r#"{"issuedTo":"X","expiry":"2026-03-01T00:00:00Z"}"#);
        assert_eq!(validator.check(&token).unwrap_err(), LicenseRejection::Expired);
    }

    #[test]
    fn test_issued_in_future() {
        let validator = validator_at("2026-03-01T00:00:00Z");
        let token = token_for(
            r#"{"issuedTo":"X","issued":"2026-03-01T01:00:00Z","expiry":"2099-01-01T00:00:00Z"}"#,
        );
        assert_eq!(
            validator.check(&token).unwrap_err(),
            LicenseRejection::NotYetValid
        );

        let skewed = token_for(
            r#"{"issuedTo":"X","issued":"2026-03-01T00:04:00Z","expiry":"2099-01-01T00:00:00Z"}"#,
        );
        assert!(validator.check(&skewed).is_ok());
    }

    #[test]
    fn test_signature_from_other_key() {
        let validator = validator_at("2026-03-01T00:00:00Z");
        let payload = r#"{"issuedTo":"X","expiry":"2099-01-01T00:00:00Z"}"#;
        let sig = sign(UPDATE_PRIV, payload.as_bytes());
        let token = format!("{}.{}", STANDARD.encode(payload), STANDARD.encode(sig));
        assert_eq!(validator.check(&token).unwrap_err(), LicenseRejection::Signature);
    }

    #[test]
    fn test_signature_over_different_payload() {
        let validator = validator_at("2026-03-01T00:00:00Z");
        let signed = r#"{"issuedTo":"X","expiry":"2099-01-01T00:00:00Z","entitlements":[]}"#;
        let presented = r#"{"issuedTo":"X","expiry":"2099-01-01T00:00:00Z","entitlements":["reports"]}"#;
        let sig = sign(LICENSE_PRIV, signed.as_bytes());
        let token = format!("{}.{}", STANDARD.encode(presented), STANDARD.encode(sig));
        assert_eq!(validator.check(&token).unwrap_err(), LicenseRejection::Signature);
    }

    #[test]
    fn test_reserialized_payload_fails() {
        // Same claims, different bytes: the signature covers bytes, not meaning.
        let validator = validator_at("2026-03-01T00:00:00Z");
        let signed = r#"{"issuedTo":"X","expiry":"2099-01-01T00:00:00Z"}"#;
        let presented = r#"{"issuedTo": "X", "expiry": "2099-01-01T00:00:00Z"}"#;
        let sig = sign(LICENSE_PRIV, signed.as_bytes());
        let token = format!("{}.{}", STANDARD.encode(presented), STANDARD.encode(sig));
        assert_eq!(validator.check(&token).unwrap_err(), LicenseRejection::Signature);
    }

    #[test]
    fn test_signed_garbage_claims() {
        let validator = validator_at("2026-03-01T00:00:00Z");
        let token = token_for(r#"{"entitlements":["reports"]}"#);
        assert_eq!(validator.check(&token).unwrap_err(), LicenseRejection::Claims);
    }

    #[test]
    fn test_malformed_tokens_never_panic() {
        let validator = validator_at("2026-03-01T00:00:00Z");
        for token in ["", ".", "a.b", "a.b.c", "....", "\u{1F600}.\u{1F600}", "AAAA.AAAA"] {
            assert!(validator.validate(token).is_err());
        }
    }

    #[test]
    fn test_check_feature_and_days() {
        let validator = validator_at("2098-12-02T00:00:00Z");
        assert!(validator.check_feature(VALID_TOKEN, "reports"));
        assert!(!validator.check_feature(VALID_TOKEN, "payroll"));
        assert!(!validator.check_feature("garbage", "reports"));
        assert_eq!(validator.days_until_expiry(VALID_TOKEN), Some(30));
        assert_eq!(validator.days_until_expiry("garbage"), None);
    }
}
