use tracing::info;
use uuid::Uuid;

use roomchat_types::models::Account;

use crate::{Chat, ChatError, ChatResult, convert};

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;
pub const PASSWORD_MIN_LEN: usize = 8;

impl Chat {
    /// Create an account. The storage unique constraint on username decides
    /// races between concurrent signups.
    pub fn register(&self, username: &str, password: &str) -> ChatResult<Account> {
        let len = username.chars().count();
        if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
            return Err(ChatError::invalid(format!(
                "username must be {USERNAME_MIN_LEN}-{USERNAME_MAX_LEN} characters"
            )));
        }
        if username.trim() != username {
            return Err(ChatError::invalid(
                "username must not start or end with whitespace",
            ));
        }
        if password.chars().count() < PASSWORD_MIN_LEN {
            return Err(ChatError::invalid(format!(
                "password must be at least {PASSWORD_MIN_LEN} characters"
            )));
        }

        let password_hash = self.hasher.hash(password)?;
        let id = Uuid::new_v4();

        let row = self
            .db
            .create_account(&id.to_string(), username, &password_hash)?
            .ok_or(ChatError::DuplicateUsername)?;

        info!("Registered {} ({})", username, id);
        Ok(convert::account(&row)?)
    }

    pub fn authenticate(&self, username: &str, password: &str) -> ChatResult<Account> {
        let Some(row) = self.db.get_account_by_username(username)? else {
            self.hasher.verify_decoy(password);
            return Err(ChatError::InvalidCredentials);
        };

        if !self.hasher.verify(password, &row.password) {
            return Err(ChatError::InvalidCredentials);
        }

        Ok(convert::account(&row)?)
    }
}
