use thiserror::Error;

/// Errors raised while interpreting message metadata
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("Unknown message kind '{0}', expected one of: request, direct_request, directed, reply, broadcast")]
    UnknownKind(String),
}

pub type Result<T> = std::result::Result<T, TypesError>;
