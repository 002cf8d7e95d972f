//! Core value model: scalars, source metadata and the mapping-node tree.

pub mod mapping_node;
pub mod scalar;
pub mod source;

pub use mapping_node::{MAPPING_NODE_MAX_TRAVERSE_DEPTH, MappingNode};
pub use scalar::{ScalarKind, ScalarValue};
pub use source::{SourcePos, SourceSpan};
