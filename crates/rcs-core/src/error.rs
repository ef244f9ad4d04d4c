//! Error types for sheet model operations.
//!
//! Structural precondition violations are reported before any mutation
//! happens, so a returned error always means the document is unchanged.

use crate::id::FieldId;
use crate::model::FieldKind;
use thiserror::Error;

pub type Result<T, E = SheetError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("unknown field `{0}`")]
    UnknownField(FieldId),

    #[error("page {0} does not exist")]
    UnknownPage(usize),

    #[error("property `{key}` is not valid for {kind} fields")]
    InvalidPropertyForKind { kind: FieldKind, key: String },

    #[error("property `{key}` expects {expected}")]
    InvalidPropertyValue { key: String, expected: &'static str },

    #[error("invalid geometry for `{0}`: width and height must be non-negative")]
    InvalidGeometry(FieldId),

    /// The requested parent does not exist, is not a table, or would
    /// create a cycle.
    #[error("`{parent}` cannot contain `{child}`")]
    InvalidParent { parent: FieldId, child: FieldId },

    #[error("a field named `{0}` already exists")]
    DuplicateField(FieldId),

    #[error("an image with key `{0}` already exists")]
    DuplicateImageKey(String),

    #[error("no image with key `{0}`")]
    UnknownImageKey(String),

    #[error("no image at position {0}")]
    UnknownImageIndex(usize),

    #[error("no character at position {0}")]
    UnknownCharacter(usize),

    #[error("the last page of a sheet cannot be removed")]
    CannotRemoveLastPage,

    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for SheetError {
    fn from(err: serde_json::Error) -> Self {
        SheetError::MalformedArchive(err.to_string())
    }
}

impl From<base64::DecodeError> for SheetError {
    fn from(err: base64::DecodeError) -> Self {
        SheetError::MalformedArchive(format!("invalid base64 payload: {err}"))
    }
}
