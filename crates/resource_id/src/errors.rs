//! Error types for resource identifiers

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceIdError {
    #[error("attribute id needs to be a string, got {found}")]
    InvalidIdType { found: String },

    #[error(
        "The id '{id}' is not a valid QuakeML resource identifier. Tried modifying it to \
         '{candidate}' but it is still not valid. Resource ids must either be valid or be \
         made valid by prefixing them with 'smi:<authority_id>/'; colons are not allowed in \
         the final part."
    )]
    InvalidUri { id: String, candidate: String },

    #[error("The {attribute} cannot be {action}")]
    ImmutableAttributeViolation {
        attribute: &'static str,
        action: &'static str,
    },

    #[error("Invalid registry configuration: {0}")]
    Config(String),

    #[error("Configuration I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, ResourceIdError>;
