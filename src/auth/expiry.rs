//! Token expiry policy.
//!
//! Pure functions over a [`CredentialRecord`] and an injected `now`. A record
//! without `expires_at` never expires and has no countdown. Clock skew
//! between this machine and the provider is not compensated for.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use strum::Display;

use super::record::CredentialRecord;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Sentinel returned by [`days_until_expiry`] when the expiry is unknown.
pub const NO_EXPIRY_DAYS: f64 = -1.0;

/// `true` once `now` is strictly past `expires_at`.
pub fn is_expired(record: &CredentialRecord, now: DateTime<Utc>) -> bool {
    match record.expires_at {
        Some(expires_at) => now > expires_at,
        None => false,
    }
}

/// `true` when less than `within` remains before `expires_at`.
///
/// Already-expired tokens also count as expiring soon.
pub fn is_expiring_soon(record: &CredentialRecord, now: DateTime<Utc>, within: Duration) -> bool {
    match record.expires_at {
        Some(expires_at) => expires_at - now < within,
        None => false,
    }
}

/// Fractional days until expiry, negative once expired, or
/// [`NO_EXPIRY_DAYS`] when the expiry is unknown.
pub fn days_until_expiry(record: &CredentialRecord, now: DateTime<Utc>) -> f64 {
    match record.expires_at {
        Some(expires_at) => {
            let remaining = expires_at - now;
            remaining.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY
        }
        None => NO_EXPIRY_DAYS,
    }
}

/// Coarse expiry state, convenient for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ExpiryStatus {
    Valid,
    ExpiringSoon,
    Expired,
    NoExpiry,
}

pub fn classify(record: &CredentialRecord, now: DateTime<Utc>, within: Duration) -> ExpiryStatus {
    if record.expires_at.is_none() {
        ExpiryStatus::NoExpiry
    } else if is_expired(record, now) {
        ExpiryStatus::Expired
    } else if is_expiring_soon(record, now, within) {
        ExpiryStatus::ExpiringSoon
    } else {
        ExpiryStatus::Valid
    }
}
