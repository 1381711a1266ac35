use anyhow::Result;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use roomchat_types::api::Claims;
use roomchat_types::models::Identity;

/// Signs and checks the bearer tokens that carry an [`Identity`] between
/// requests and onto WebSocket connections.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl: chrono::Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, identity: &Identity) -> Result<String> {
        let claims = Claims {
            sub: identity.account_id,
            username: identity.username.clone(),
            exp: (chrono::Utc::now() + self.ttl).timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// `None` for a malformed, forged or expired token.
    pub fn verify(&self, token: &str) -> Option<Identity> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default()).ok()?;
        Some(Identity {
            account_id: data.claims.sub,
            username: data.claims.username,
        })
    }
}
