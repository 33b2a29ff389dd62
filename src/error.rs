//! Error types for conversation turns and authentication.

use crate::events::Provider;

/// Errors from the conversation controller.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyInput,
    #[error("model {model} is not offered by {provider}")]
    UnknownModel { provider: Provider, model: String },
    #[error("provider error: {0}")]
    Provider(String),
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("speech synthesis failed: {0}")]
    Speech(String),
    #[error("export failed: {0}")]
    Export(String),
}

/// Errors from the credential store.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("current password is incorrect")]
    WrongPassword,
    #[error("new password cannot be empty")]
    EmptyPassword,
    #[error("credential file error: {0}")]
    Store(String),
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}
