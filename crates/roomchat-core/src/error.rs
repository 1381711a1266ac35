use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("username already taken")]
    DuplicateUsername,

    /// Same variant whether the username is unknown or the password is wrong.
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("invalid room code")]
    RoomNotFound,

    #[error("not a member of this room")]
    NotAMember,

    #[error("no free room code after {0} attempts")]
    CodeSpaceExhausted(usize),

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ChatError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
