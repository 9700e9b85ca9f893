use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

const TOKEN_VERSION: &str = "v1";
const SECRET_LEN: usize = 32;

#[derive(thiserror::Error, Debug)]
pub enum TokenError {
    #[error("Failed to generate random bytes")]
    RandomFailure,

    #[error("Failed to encode token metadata: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Metadata embedded in a check-in token so the check-in page can
/// preselect the service without a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    #[serde(rename = "sid")]
    pub service_id: String,
    pub date: String,
    #[serde(rename = "svc")]
    pub service_name: String,
    #[serde(rename = "ts")]
    pub issued_at_ms: i64,
}

/// Issues a token of the form `v1.<base64 metadata>.<64 hex chars>`.
pub fn issue(
    service_id: &str,
    date: NaiveDate,
    service_name: &str,
    now: DateTime<Utc>,
) -> Result<String, TokenError> {
    let mut secret = [0u8; SECRET_LEN];
    SystemRandom::new()
        .fill(&mut secret)
        .map_err(|_| TokenError::RandomFailure)?;

    let metadata = TokenMetadata {
        service_id: service_id.to_string(),
        date: date.format("%Y-%m-%d").to_string(),
        service_name: service_name.to_string(),
        issued_at_ms: now.timestamp_millis(),
    };
    let encoded = STANDARD.encode(serde_json::to_vec(&metadata)?);

    Ok(format!("{}.{}.{}", TOKEN_VERSION, encoded, hex::encode(secret)))
}

/// Decodes the embedded metadata. Returns `None` for malformed tokens.
pub fn decode_metadata(token: &str) -> Option<TokenMetadata> {
    let encoded = token.split('.').nth(1)?;
    let bytes = STANDARD.decode(encoded).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Whether a token created at `created_at` has outlived `ttl_hours`.
pub fn is_expired(created_at: DateTime<Utc>, now: DateTime<Utc>, ttl_hours: i64) -> bool {
    now - created_at > Duration::hours(ttl_hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sunday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 9).unwrap()
    }

    #[test]
    fn test_token_format() {
        let token = issue("sunday-1st-service", sunday(), "Sunday 1st Service", Utc::now()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "v1");
        assert_eq!(parts[2].len(), 64);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tokens_are_unique() {
        let now = Utc::now();
        let a = issue("others", sunday(), "Others", now).unwrap();
        let b = issue("others", sunday(), "Others", now).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_metadata_roundtrip() {
        let now = Utc::now();
        let token = issue("midweek-service", sunday(), "Midweek Service", now).unwrap();
        let metadata = decode_metadata(&token).unwrap();

        assert_eq!(metadata.service_id, "midweek-service");
        assert_eq!(metadata.date, "2025-03-09");
        assert_eq!(metadata.service_name, "Midweek Service");
        assert_eq!(metadata.issued_at_ms, now.timestamp_millis());
    }

    #[test]
    fn test_metadata_uses_short_keys() {
        let token = issue("others", sunday(), "Others", Utc::now()).unwrap();
        let encoded = token.split('.').nth(1).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap();

        assert_eq!(json["sid"], "others");
        assert_eq!(json["svc"], "Others");
        assert!(json["ts"].is_i64());
    }

    #[test]
    fn test_malformed_tokens_have_no_metadata() {
        assert_eq!(decode_metadata("garbage"), None);
        assert_eq!(decode_metadata("v1.!!!.abc"), None);
        assert_eq!(decode_metadata("v1.bm90IGpzb24=.abc"), None);
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();

        assert!(!is_expired(now - Duration::hours(23), now, 24));
        assert!(!is_expired(now - Duration::hours(24), now, 24));
        assert!(is_expired(now - Duration::hours(25), now, 24));
    }
}
