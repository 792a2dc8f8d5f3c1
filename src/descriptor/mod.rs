//! Descriptor tree model and the parser that builds it.

pub mod parser;
pub mod tree;

pub use parser::{
    parse_descriptor, parse_descriptor_file, Location, ParseError, ParsedDescriptor,
    DESCRIPTOR_NAMESPACE,
};
pub use tree::{ElementNode, Module, ModuleKind, PlaceholderRef, MODULE_XML};
