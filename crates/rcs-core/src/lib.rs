pub mod archive;
pub mod characters;
pub mod document;
pub mod emitter;
pub mod error;
pub mod id;
pub mod images;
pub mod keys;
pub mod lint;
pub mod model;
pub mod pages;
pub mod tree;

pub use archive::{FontRecord, SheetArchive};
pub use characters::{CharacterRecord, CharacterSheet};
pub use document::{DocumentContext, RemovedPage};
pub use emitter::{Generation, GenerationOptions, generate};
pub use error::{Result, SheetError};
pub use id::FieldId;
pub use images::{ImageEntry, ImageRecord, ImageStore};
pub use lint::{Diagnostic, Severity, lint_document};
pub use model::*;
pub use pages::{Page, PageCollection};
pub use tree::{FieldTree, Subtree};

// Re-export serde_json types so downstream crates don't need a direct dependency
pub use serde_json::{Map, Value};
