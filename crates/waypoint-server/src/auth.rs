//! Signed bearer tokens and the identity verifier backed by them.
//!
//! Tokens are HMAC-SHA256 based, scoped to a (user_id, email) pair.
//! Format: `wp_v1_<user_hex>_<email_hex>_<hmac_hex>` -- the id and email
//! segments are hex-encoded so arbitrary identifiers survive the underscore
//! framing.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use waypoint_core::identity::{Identity, IdentityVerifier};

type HmacSha256 = Hmac<Sha256>;

/// Token prefix identifying waypoint bearer tokens.
const TOKEN_PREFIX: &str = "wp_v1_";

/// Errors that can occur during token operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token format: {0}")]
    InvalidFormat(String),

    #[error("invalid hex in token segment: {0}")]
    InvalidEncoding(String),

    #[error("token HMAC verification failed")]
    HmacMismatch,

    #[error("missing token secret")]
    MissingSecret,
}

/// Configuration for token generation and validation.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// The HMAC secret key bytes.
    pub secret: Vec<u8>,
}

impl TokenConfig {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Create a TokenConfig from the `WAYPOINT_TOKEN_SECRET` environment
    /// variable (hex-encoded, as written by `waypoint init`).
    pub fn from_env() -> Result<Self, TokenError> {
        let secret_hex =
            std::env::var("WAYPOINT_TOKEN_SECRET").map_err(|_| TokenError::MissingSecret)?;
        let secret = hex::decode(&secret_hex).map_err(|e| {
            TokenError::InvalidFormat(format!("WAYPOINT_TOKEN_SECRET is not valid hex: {e}"))
        })?;
        Ok(Self::new(secret))
    }
}

/// Claims extracted from a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: String,
    pub email_hint: Option<String>,
}

/// Generate a signed bearer token for a user.
///
/// The HMAC-SHA256 is computed over `<user_id>:<email>` (empty email when
/// absent).
pub fn generate_token(config: &TokenConfig, user_id: &str, email: Option<&str>) -> String {
    let email = email.unwrap_or("");
    let message = format!("{user_id}:{email}");
    let mac = compute_hmac(&config.secret, message.as_bytes());
    format!(
        "{TOKEN_PREFIX}{}_{}_{}",
        hex::encode(user_id),
        hex::encode(email),
        hex::encode(mac)
    )
}

/// Validate a bearer token and extract its claims.
pub fn validate_token(config: &TokenConfig, token: &str) -> Result<TokenClaims, TokenError> {
    let rest = token
        .strip_prefix(TOKEN_PREFIX)
        .ok_or_else(|| TokenError::InvalidFormat("token must start with 'wp_v1_'".to_string()))?;

    let mut segments = rest.split('_');
    let (Some(user_hex), Some(email_hex), Some(hmac_hex), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TokenError::InvalidFormat(
            "expected three underscore-separated segments".to_string(),
        ));
    };

    let user_id = decode_segment(user_hex)?;
    let email = decode_segment(email_hex)?;
    let provided_mac =
        hex::decode(hmac_hex).map_err(|e| TokenError::InvalidEncoding(e.to_string()))?;

    let message = format!("{user_id}:{email}");
    verify_hmac_constant_time(&config.secret, message.as_bytes(), &provided_mac)?;

    Ok(TokenClaims {
        user_id,
        email_hint: (!email.is_empty()).then_some(email),
    })
}

fn decode_segment(segment: &str) -> Result<String, TokenError> {
    let bytes = hex::decode(segment).map_err(|e| TokenError::InvalidEncoding(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| TokenError::InvalidEncoding(e.to_string()))
}

fn compute_hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Verify HMAC using the `hmac` crate's constant-time `verify_slice`.
fn verify_hmac_constant_time(
    key: &[u8],
    message: &[u8],
    expected_mac: &[u8],
) -> Result<(), TokenError> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.verify_slice(expected_mac)
        .map_err(|_| TokenError::HmacMismatch)
}

/// The identity collaborator: resolves signed bearer tokens.
#[derive(Debug, Clone)]
pub struct SignedTokenVerifier {
    config: TokenConfig,
}

impl SignedTokenVerifier {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl IdentityVerifier for SignedTokenVerifier {
    async fn verify(&self, bearer_token: &str) -> Option<Identity> {
        match validate_token(&self.config, bearer_token) {
            Ok(claims) => Some(Identity {
                user_id: claims.user_id,
                email_hint: claims.email_hint,
            }),
            Err(e) => {
                tracing::debug!(error = %e, "bearer token rejected");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TokenConfig {
        TokenConfig::new(b"test-secret-key-for-waypoint".to_vec())
    }

    #[test]
    fn generate_token_has_correct_format() {
        let config = test_config();
        let token = generate_token(&config, "user-42", Some("user@example.com"));

        assert!(token.starts_with("wp_v1_"));
        let rest = token.strip_prefix("wp_v1_").unwrap();
        let segments: Vec<&str> = rest.split('_').collect();
        assert_eq!(segments.len(), 3);
        // SHA-256 = 32 bytes = 64 hex chars.
        assert_eq!(segments[2].len(), 64);
    }

    #[test]
    fn generate_and_validate_roundtrip() {
        let config = test_config();
        let token = generate_token(&config, "user-42", Some("user@example.com"));
        let claims = validate_token(&config, &token).unwrap();

        assert_eq!(claims.user_id, "user-42");
        assert_eq!(claims.email_hint.as_deref(), Some("user@example.com"));
    }

    #[test]
    fn user_ids_with_separators_survive_framing() {
        let config = test_config();
        let token = generate_token(&config, "org_7:user_42", None);
        let claims = validate_token(&config, &token).unwrap();
        assert_eq!(claims.user_id, "org_7:user_42");
        assert!(claims.email_hint.is_none());
    }

    #[test]
    fn reject_tampered_hmac() {
        let config = test_config();
        let mut token = generate_token(&config, "user-42", None);
        let last = token.pop().unwrap();
        token.push(if last == 'a' { 'b' } else { 'a' });

        let result = validate_token(&config, &token);
        assert!(matches!(result.unwrap_err(), TokenError::HmacMismatch));
    }

    #[test]
    fn reject_tampered_user_segment() {
        let config = test_config();
        let token = generate_token(&config, "user-42", None);
        let tampered = token.replacen(&hex::encode("user-42"), &hex::encode("user-43"), 1);

        let result = validate_token(&config, &tampered);
        assert!(matches!(result.unwrap_err(), TokenError::HmacMismatch));
    }

    #[test]
    fn reject_wrong_secret() {
        let config = test_config();
        let token = generate_token(&config, "user-42", None);

        let wrong = TokenConfig::new(b"completely-different-secret".to_vec());
        let result = validate_token(&wrong, &token);
        assert!(matches!(result.unwrap_err(), TokenError::HmacMismatch));
    }

    #[test]
    fn reject_wrong_prefix_and_shape() {
        let config = test_config();
        assert!(matches!(
            validate_token(&config, "").unwrap_err(),
            TokenError::InvalidFormat(_)
        ));
        assert!(matches!(
            validate_token(&config, "other_prefix_abc").unwrap_err(),
            TokenError::InvalidFormat(_)
        ));
        assert!(matches!(
            validate_token(&config, "wp_v1_onlyonesegment").unwrap_err(),
            TokenError::InvalidFormat(_)
        ));
    }

    #[test]
    fn reject_invalid_hex_segments() {
        let config = test_config();
        let result = validate_token(&config, "wp_v1_zz_aa_bb");
        assert!(matches!(result.unwrap_err(), TokenError::InvalidEncoding(_)));
    }

    #[test]
    fn same_inputs_produce_same_token() {
        let config = test_config();
        let a = generate_token(&config, "user-42", Some("u@example.com"));
        let b = generate_token(&config, "user-42", Some("u@example.com"));
        assert_eq!(a, b);
    }

    #[test]
    fn different_users_produce_different_tokens() {
        let config = test_config();
        let a = generate_token(&config, "user-1", None);
        let b = generate_token(&config, "user-2", None);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn verifier_resolves_valid_tokens() {
        let config = test_config();
        let token = generate_token(&config, "user-42", Some("user@example.com"));
        let verifier = SignedTokenVerifier::new(config);

        let identity = verifier.verify(&token).await.expect("token should verify");
        assert_eq!(identity.user_id, "user-42");
        assert_eq!(identity.email_hint.as_deref(), Some("user@example.com"));

        assert!(verifier.verify("wp_v1_bogus").await.is_none());
    }
}
