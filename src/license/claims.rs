//! License claims.
//!
//! [`LicenseClaims`] has private fields and no `Deserialize` impl: the only
//! way to obtain one is through [`crate::license::LicenseValidator`], after
//! the signature has been checked.

use super::LicenseRejection;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Wire shape of the signed payload.
#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(rename = "issuedTo", alias = "customer", default)]
    subject: Option<String>,
    #[serde(default)]
    expiry: Option<Value>,
    #[serde(alias = "features", default)]
    entitlements: Vec<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    issued: Option<Value>,
    #[serde(alias = "maxUsers", default)]
    max_users: Option<u32>,
}

/// Verified license claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseClaims {
    subject: String,
    expiry: DateTime<Utc>,
    entitlements: BTreeSet<String>,
    email: Option<String>,
    issued_at: Option<DateTime<Utc>>,
    max_users: Option<u32>,
}

impl LicenseClaims {
    /// Parse verified payload bytes.
    pub(crate) fn from_payload(payload: &[u8]) -> Result<Self, LicenseRejection> {
        let raw: RawClaims =
            serde_json::from_slice(payload).map_err(|_| LicenseRejection::Claims)?;

        let subject = raw
            .subject
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(LicenseRejection::Claims)?;
        let expiry = raw
            .expiry
            .as_ref()
            .and_then(parse_timestamp)
            .ok_or(LicenseRejection::Claims)?;
        let issued_at = match raw.issued.as_ref() {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_timestamp(value).ok_or(LicenseRejection::Claims)?),
        };

        Ok(Self {
            subject,
            expiry,
            entitlements: raw.entitlements.into_iter().collect(),
            email: raw.email,
            issued_at,
            max_users: raw.max_users,
        })
    }

    /// Who the license was issued to.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Expiry instant (UTC).
    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    /// Granted entitlement codes.
    pub fn entitlements(&self) -> &BTreeSet<String> {
        &self.entitlements
    }

    /// Whether `code` is among the granted entitlements.
    pub fn has_entitlement(&self, code: &str) -> bool {
        self.entitlements.contains(code)
    }

    /// Contact email, if present.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Issue instant, if present.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    /// Seat limit, if present.
    pub fn max_users(&self) -> Option<u32> {
        self.max_users
    }

    /// Whole days left before expiry, floored at zero.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expiry - now).num_days().max(0)
    }
}

/// Accept RFC 3339, naive ISO date-time (UTC), plain date or epoch seconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => Utc.timestamp_opt(n.as_i64()?, 0).single(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(naive.and_utc());
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(naive.and_utc());
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}
