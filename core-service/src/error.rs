use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Organize error: {0}")]
    Organize(#[from] core_organize::OrganizeError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
