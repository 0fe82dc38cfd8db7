//! Edge confirmation tokens for transfers
//!
//! Proves user intent before a caller reaches the gateway: the client
//! signs the transfer fields with a shared secret, and large amounts
//! must additionally echo a literal confirmation phrase. Independent
//! of, and in addition to, the gateway's idempotency guarantee.

use crate::error::AgentOpsError;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Tokens expire ten minutes after the embedded timestamp.
pub const CONFIRMATION_TOKEN_TTL: Duration = Duration::minutes(10);

/// Tolerance for client clock skew on future timestamps.
const MAX_CLOCK_SKEW: Duration = Duration::seconds(30);

/// Phrase a caller must echo for amounts at or above the threshold.
pub const CONFIRMATION_PHRASE: &str = "CONFIRM TRANSFER";

/// Signed confirmation of a pending transfer, produced client-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationToken {
    pub from_wallet: String,
    pub to_wallet: String,
    pub amount: String,
    pub memo: String,
    pub timestamp: DateTime<Utc>,
    /// Hex HMAC-SHA256 over the five fields above.
    pub signature: String,
    /// Required verbatim for amounts at or above the threshold.
    pub confirmation_phrase: Option<String>,
}

/// Verifies confirmation tokens against a shared secret.
pub struct ConfirmationVerifier {
    secret: Vec<u8>,
    large_amount_threshold: Decimal,
}

impl ConfirmationVerifier {
    pub fn new(secret: impl Into<Vec<u8>>, large_amount_threshold: Decimal) -> Self {
        Self {
            secret: secret.into(),
            large_amount_threshold,
        }
    }

    fn message(
        from_wallet: &str,
        to_wallet: &str,
        amount: &str,
        memo: &str,
        timestamp: DateTime<Utc>,
    ) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            from_wallet,
            to_wallet,
            amount,
            memo,
            timestamp.timestamp()
        )
    }

    /// Compute the signature a client would send. Used by tests and by
    /// first-party callers that hold the secret.
    pub fn sign(
        &self,
        from_wallet: &str,
        to_wallet: &str,
        amount: &str,
        memo: &str,
        timestamp: DateTime<Utc>,
    ) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(Self::message(from_wallet, to_wallet, amount, memo, timestamp).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify a token against the current time. Expiry is enforced
    /// here, server-side, regardless of signature validity.
    pub fn verify(&self, token: &ConfirmationToken, now: DateTime<Utc>) -> Result<()> {
        if now - token.timestamp > CONFIRMATION_TOKEN_TTL {
            return Err(AgentOpsError::ConfirmationToken(
                "confirmation token expired".into(),
            ));
        }
        if token.timestamp - now > MAX_CLOCK_SKEW {
            return Err(AgentOpsError::ConfirmationToken(
                "confirmation token timestamp is in the future".into(),
            ));
        }

        let expected = self.sign(
            &token.from_wallet,
            &token.to_wallet,
            &token.amount,
            &token.memo,
            token.timestamp,
        );

        // Constant-time comparison; the signature is hex so compare bytes.
        let matches: bool = expected
            .as_bytes()
            .ct_eq(token.signature.as_bytes())
            .into();
        if !matches {
            return Err(AgentOpsError::ConfirmationToken("invalid signature".into()));
        }

        let amount: Decimal = token.amount.parse().map_err(|_| {
            AgentOpsError::ConfirmationToken("token amount is not a valid decimal".into())
        })?;

        if amount >= self.large_amount_threshold {
            match token.confirmation_phrase.as_deref() {
                Some(phrase) if phrase == CONFIRMATION_PHRASE => {}
                _ => {
                    return Err(AgentOpsError::ConfirmationToken(format!(
                        "amounts of {} or more require the confirmation phrase",
                        self.large_amount_threshold
                    )))
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn verifier() -> ConfirmationVerifier {
        ConfirmationVerifier::new(b"test-secret".to_vec(), Decimal::from_str("100").unwrap())
    }

    fn token(verifier: &ConfirmationVerifier, amount: &str, timestamp: DateTime<Utc>) -> ConfirmationToken {
        ConfirmationToken {
            from_wallet: "0xfrom".into(),
            to_wallet: "0xto".into(),
            amount: amount.into(),
            memo: "rent".into(),
            timestamp,
            signature: verifier.sign("0xfrom", "0xto", amount, "rent", timestamp),
            confirmation_phrase: None,
        }
    }

    #[test]
    fn test_valid_token_verifies() {
        let v = verifier();
        let now = Utc::now();
        assert!(v.verify(&token(&v, "10", now), now).is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let v = verifier();
        let now = Utc::now();
        let stale = token(&v, "10", now - Duration::minutes(11));

        let err = v.verify(&stale, now).unwrap_err();
        assert!(matches!(err, AgentOpsError::ConfirmationToken(_)));
    }

    #[test]
    fn test_tampered_amount_rejected() {
        let v = verifier();
        let now = Utc::now();
        let mut tampered = token(&v, "10", now);
        tampered.amount = "10000".into();

        assert!(v.verify(&tampered, now).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = ConfirmationVerifier::new(b"other-secret".to_vec(), Decimal::from_str("100").unwrap());
        let now = Utc::now();
        let forged = token(&signer, "10", now);

        assert!(verifier().verify(&forged, now).is_err());
    }

    #[test]
    fn test_large_amount_requires_phrase() {
        let v = verifier();
        let now = Utc::now();

        let mut large = token(&v, "250", now);
        assert!(v.verify(&large, now).is_err());

        large.confirmation_phrase = Some(CONFIRMATION_PHRASE.to_string());
        assert!(v.verify(&large, now).is_ok());

        large.confirmation_phrase = Some("yes please".to_string());
        assert!(v.verify(&large, now).is_err());
    }

    #[test]
    fn test_future_timestamp_beyond_skew_rejected() {
        let v = verifier();
        let now = Utc::now();
        let future = token(&v, "10", now + Duration::minutes(5));

        assert!(v.verify(&future, now).is_err());
    }
}
