//! Webhook payload verification.
//!
//! Stripe signs the raw request body with the endpoint secret:
//! `Stripe-Signature: t=<unix>,v1=<hex hmac>` where the MAC is HMAC-SHA256
//! over `"{t}.{body}"`. Verification must run against the exact bytes
//! received — any re-serialization breaks the MAC.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::StripeError;
use crate::types::Event;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted skew between the signature timestamp and now.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Verify `signature_header` against `payload` and parse the event envelope.
///
/// Uses the system clock for the tolerance check; tests use
/// [`construct_event_at`] with a pinned clock.
pub fn construct_event(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
) -> Result<Event, StripeError> {
    construct_event_at(
        payload,
        signature_header,
        secret,
        DEFAULT_TOLERANCE,
        chrono::Utc::now().timestamp(),
    )
}

pub fn construct_event_at(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance: Duration,
    now: i64,
) -> Result<Event, StripeError> {
    let parsed = parse_signature_header(signature_header)?;

    let skew = (now - parsed.timestamp).unsigned_abs();
    if skew > tolerance.as_secs() {
        return Err(StripeError::Signature(format!(
            "timestamp outside tolerance ({skew}s > {}s)",
            tolerance.as_secs()
        )));
    }

    let mut signed_payload = parsed.timestamp.to_string().into_bytes();
    signed_payload.push(b'.');
    signed_payload.extend_from_slice(payload);

    let verified = parsed.v1_signatures.iter().any(|sig_hex| {
        let Ok(sig) = hex::decode(sig_hex) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(&signed_payload);
        // verify_slice is constant-time.
        mac.verify_slice(&sig).is_ok()
    });
    if !verified {
        return Err(StripeError::Signature(
            "no v1 signature matched".to_string(),
        ));
    }

    serde_json::from_slice(payload).map_err(|e| StripeError::Decode(e.to_string()))
}

/// Produce a valid `Stripe-Signature` header for `payload`. Test/mock helper;
/// the engine never signs.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut signed_payload = timestamp.to_string().into_bytes();
    signed_payload.push(b'.');
    signed_payload.extend_from_slice(payload);

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(&signed_payload);
    let sig = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={sig}")
}

struct ParsedHeader {
    timestamp: i64,
    v1_signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> Result<ParsedHeader, StripeError> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = value.parse::<i64>().ok();
            }
            "v1" => v1_signatures.push(value.to_string()),
            // v0 and unknown schemes are ignored.
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| StripeError::Signature("missing or invalid t= element".to_string()))?;
    if v1_signatures.is_empty() {
        return Err(StripeError::Signature("missing v1 signature".to_string()));
    }

    Ok(ParsedHeader {
        timestamp,
        v1_signatures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    fn event_body() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "evt_1",
            "type": "customer.created",
            "created": NOW,
            "data": {"object": {"id": "cus_1", "object": "customer"}}
        }))
        .unwrap()
    }

    #[test]
    fn valid_signature_round_trips() {
        let body = event_body();
        let header = sign_payload(&body, SECRET, NOW);
        let event =
            construct_event_at(&body, &header, SECRET, DEFAULT_TOLERANCE, NOW).unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.event_type, "customer.created");
    }

    #[test]
    fn wrong_secret_rejected() {
        let body = event_body();
        let header = sign_payload(&body, "whsec_other", NOW);
        let err =
            construct_event_at(&body, &header, SECRET, DEFAULT_TOLERANCE, NOW).unwrap_err();
        assert!(matches!(err, StripeError::Signature(_)));
    }

    #[test]
    fn tampered_body_rejected() {
        let body = event_body();
        let header = sign_payload(&body, SECRET, NOW);
        let mut tampered = body.clone();
        tampered[10] ^= 1;
        let err = construct_event_at(&tampered, &header, SECRET, DEFAULT_TOLERANCE, NOW)
            .unwrap_err();
        assert!(matches!(err, StripeError::Signature(_)));
    }

    #[test]
    fn garbage_header_rejected() {
        let body = event_body();
        for header in ["bad-sig", "t=notanumber,v1=aa", "v1=deadbeef", "t=123"] {
            let err = construct_event_at(&body, header, SECRET, DEFAULT_TOLERANCE, NOW)
                .unwrap_err();
            assert!(matches!(err, StripeError::Signature(_)), "header: {header}");
        }
    }

    #[test]
    fn stale_timestamp_rejected() {
        let body = event_body();
        let header = sign_payload(&body, SECRET, NOW - 301);
        let err =
            construct_event_at(&body, &header, SECRET, DEFAULT_TOLERANCE, NOW).unwrap_err();
        assert!(matches!(err, StripeError::Signature(_)));
    }

    #[test]
    fn second_v1_signature_is_accepted() {
        // Secret rotation sends two v1 elements; either may match.
        let body = event_body();
        let good = sign_payload(&body, SECRET, NOW);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1={},v1={good_sig}", "00".repeat(32));
        let event =
            construct_event_at(&body, &header, SECRET, DEFAULT_TOLERANCE, NOW).unwrap();
        assert_eq!(event.id, "evt_1");
    }
}
