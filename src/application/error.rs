use thiserror::Error;

use crate::{
    application::forms::FormErrors, cache::CacheError, config::LoadError,
    infra::error::InfraError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error("invalid form: {0}")]
    Form(FormErrors),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to read {path}: {source}")]
    InputFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Short, user-facing description of the failure.
    pub fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Cache(CacheError::Validation { .. })
            | AppError::Form(_)
            | AppError::InvalidInput(_)
            | AppError::InputFile { .. } => "Request could not be processed",
            AppError::Cache(CacheError::NotFound { .. }) => "Post not found",
            AppError::Cache(CacheError::Remote(_)) => "The post service is unavailable",
            AppError::Cache(CacheError::Aborted(_)) | AppError::Unexpected(_) => {
                "Unexpected error occurred"
            }
            AppError::Infra(_) | AppError::Config(_) => "Client misconfigured",
        }
    }
}

impl From<FormErrors> for AppError {
    fn from(errors: FormErrors) -> Self {
        Self::Form(errors)
    }
}
