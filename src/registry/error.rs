//! Registry error types
//!
//! Error types for channel and name registry operations.

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Channel name is empty, too long, or has characters outside `[A-Za-z0-9_]`
    InvalidChannelName(String),
    /// Name is held by another connection and the supplied token does not match
    NameCollision(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::InvalidChannelName(name) => {
                write!(f, "Invalid channel name: {:?}", name)
            }
            RegistryError::NameCollision(name) => write!(f, "Name already in use: {}", name),
        }
    }
}

impl std::error::Error for RegistryError {}
