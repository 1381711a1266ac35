use std::sync::OnceLock;

use anyhow::{Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{SaltString, rand_core::OsRng},
};

/// Argon2id hashing for account passwords. Only PHC strings are ever stored.
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    decoy: OnceLock<String>,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
            decoy: OnceLock::new(),
        }
    }
}

impl CredentialHasher {
    /// Argon2id with explicit memory (KiB), iteration and lane counts.
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| anyhow!("Invalid Argon2 params: {}", e))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            decoy: OnceLock::new(),
        })
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Password hashing failed: {}", e))?;
        Ok(hash.to_string())
    }

    /// False for a wrong password and for an unparsable stored hash alike.
    pub fn verify(&self, password: &str, phc: &str) -> bool {
        match PasswordHash::new(phc) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Run a verification against a throwaway hash so an unknown username
    /// costs about as much as a wrong password.
    pub fn verify_decoy(&self, password: &str) {
        let decoy = self
            .decoy
            .get_or_init(|| self.hash("decoy-password").unwrap_or_default());
        let _ = self.verify(password, decoy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_original_password() {
        let hasher = CredentialHasher::with_params(8, 1, 1).unwrap();
        let phc = hasher.hash("hunter22").unwrap();

        assert!(phc.starts_with("$argon2id$"));
        assert!(!phc.contains("hunter22"));
        assert!(hasher.verify("hunter22", &phc));
        assert!(!hasher.verify("hunter23", &phc));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let hasher = CredentialHasher::with_params(8, 1, 1).unwrap();
        assert_ne!(hasher.hash("pw12345678").unwrap(), hasher.hash("pw12345678").unwrap());
    }

    #[test]
    fn garbage_hash_never_verifies() {
        let hasher = CredentialHasher::with_params(8, 1, 1).unwrap();
        assert!(!hasher.verify("anything", "not-a-phc-string"));
    }
}
