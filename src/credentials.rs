use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::{error, warn};

use crate::config::HashConfig;

#[derive(Debug, Error)]
#[error("credential hashing failed: {reason}")]
pub struct CredentialError {
    reason: String,
}

/// One-way hashing of passwords and tokens.
pub trait CredentialCodec: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String, CredentialError>;

    /// `false` for a wrong secret and for a digest that cannot be parsed.
    fn verify(&self, digest: &str, secret: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct Argon2Codec {
    params: Params,
}

impl Argon2Codec {
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    pub fn from_config(cfg: &HashConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.m_cost, cfg.t_cost, cfg.p_cost, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 parameters: {e}"))?;
        Ok(Self::new(params))
    }

    /// Smallest parameters argon2 accepts; only for tests.
    #[cfg(test)]
    pub fn fast() -> Self {
        Self::new(Params::new(Params::MIN_M_COST, 1, 1, None).expect("minimum argon2 params"))
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl CredentialCodec for Argon2Codec {
    fn hash(&self, secret: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                CredentialError {
                    reason: e.to_string(),
                }
            })?
            .to_string();
        Ok(hash)
    }

    fn verify(&self, digest: &str, secret: &str) -> bool {
        let parsed = match PasswordHash::new(digest) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "argon2 parse hash error");
                return false;
            }
        };
        // Parameters come from the digest itself, so digests written with an
        // older cost setting still verify.
        Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Random URL-safe token (32 bytes of entropy).
pub fn new_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}
