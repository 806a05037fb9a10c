//! Coinbase Authentication — Request Signing
//!
//! Two key formats are accepted, picked from the secret:
//! - CDP keys (`organizations/.../apiKeys/...` plus an EC private key PEM):
//!   every request carries a short-lived ES256 JWT as a bearer token
//! - Legacy keys: HMAC-SHA256 over `timestamp + METHOD + path + body`
//!   in the `CB-ACCESS-*` headers
//!
//! Credentials come from environment variables
//! (COINBASE_API_KEY, COINBASE_API_SECRET).

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::SecretKey;
use serde_json::json;
use uuid::Uuid;

/// Lifetime of a CDP JWT. Coinbase rejects tokens older than two minutes.
const JWT_TTL_SECS: i64 = 120;

enum KeyMaterial {
    Hmac { secret: String },
    Cdp { key: SigningKey },
}

/// Brokerage API credentials and request signer.
pub struct CoinbaseAuth {
    /// API key name from COINBASE_API_KEY.
    api_key: String,
    /// Never sent; only used to sign.
    material: KeyMaterial,
}

impl std::fmt::Debug for CoinbaseAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinbaseAuth")
            .field("api_key", &self.api_key)
            .field("scheme", &self.scheme())
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl CoinbaseAuth {
    /// Legacy key with an HMAC secret.
    pub fn hmac(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            material: KeyMaterial::Hmac {
                secret: api_secret.into(),
            },
        }
    }

    /// CDP key with an EC P-256 private key in SEC1 or PKCS#8 PEM.
    pub fn cdp(api_key: impl Into<String>, private_key_pem: &str) -> Result<Self> {
        // Env vars often carry the PEM with literal "\n" sequences.
        let pem = private_key_pem.replace("\\n", "\n");
        let pem = pem.trim();
        let secret = if pem.contains("BEGIN EC PRIVATE KEY") {
            SecretKey::from_sec1_pem(pem)
                .map_err(|e| anyhow::anyhow!("Invalid SEC1 EC private key: {e}"))?
        } else {
            use p256::pkcs8::DecodePrivateKey;
            SecretKey::from_pkcs8_pem(pem)
                .map_err(|e| anyhow::anyhow!("Invalid PKCS#8 EC private key: {e}"))?
        };
        Ok(Self {
            api_key: api_key.into(),
            material: KeyMaterial::Cdp {
                key: SigningKey::from(secret),
            },
        })
    }

    /// Pick the scheme from the secret: a PEM block means a CDP key.
    pub fn from_credentials(api_key: impl Into<String>, api_secret: &str) -> Result<Self> {
        if api_secret.contains("-----BEGIN") {
            Self::cdp(api_key, api_secret)
        } else {
            Ok(Self::hmac(api_key, api_secret))
        }
    }

    /// Load credentials from COINBASE_API_KEY and COINBASE_API_SECRET.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("COINBASE_API_KEY").context("COINBASE_API_KEY not set")?;
        let api_secret =
            std::env::var("COINBASE_API_SECRET").context("COINBASE_API_SECRET not set")?;
        Self::from_credentials(api_key, &api_secret)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// `"cdp_jwt"` or `"hmac"`, for logs.
    pub fn scheme(&self) -> &'static str {
        match self.material {
            KeyMaterial::Hmac { .. } => "hmac",
            KeyMaterial::Cdp { .. } => "cdp_jwt",
        }
    }

    /// Authentication headers for one request to `host` (no scheme).
    ///
    /// The query string is never part of what gets signed.
    pub fn auth_headers(
        &self,
        method: &str,
        host: &str,
        path: &str,
        body: &str,
    ) -> Vec<(&'static str, String)> {
        let path = path.split('?').next().unwrap_or(path);
        let now = Utc::now().timestamp();

        match &self.material {
            KeyMaterial::Hmac { secret } => {
                let timestamp = now.to_string();
                let signature = hmac_signature(secret, &timestamp, method, path, body);
                vec![
                    ("CB-ACCESS-KEY", self.api_key.clone()),
                    ("CB-ACCESS-SIGN", signature),
                    ("CB-ACCESS-TIMESTAMP", timestamp),
                ]
            }
            KeyMaterial::Cdp { key } => {
                let uri = format!("{method} {host}{path}");
                let token = self.jwt(key, &uri, now);
                vec![("Authorization", format!("Bearer {token}"))]
            }
        }
    }

    /// ES256 JWT scoped to one `METHOD host/path`.
    fn jwt(&self, key: &SigningKey, uri: &str, now: i64) -> String {
        let header = json!({
            "alg": "ES256",
            "typ": "JWT",
            "kid": self.api_key,
            "nonce": Uuid::new_v4().simple().to_string(),
        });
        let claims = json!({
            "sub": self.api_key,
            "iss": "cdp",
            "nbf": now,
            "exp": now + JWT_TTL_SECS,
            "uri": uri,
        });

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        );
        let signature: Signature = key.sign(signing_input.as_bytes());
        format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature.to_bytes()))
    }
}

/// Hex HMAC-SHA256 over `timestamp + METHOD + path + body`.
fn hmac_signature(secret: &str, timestamp: &str, method: &str, path: &str, body: &str) -> String {
    let message = format!("{timestamp}{method}{path}{body}");
    let mac = hmac_sha256::HMAC::mac(message.as_bytes(), secret.as_bytes());
    hex::encode(mac)
}
