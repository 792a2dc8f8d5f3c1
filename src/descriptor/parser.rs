//! Streaming parser for module definition descriptors.
//!
//! The descriptor vocabulary is closed at the top level: the root must be a
//! `modules` element in the descriptor namespace carrying exactly one
//! `targetNs` attribute, and its children must be `module`,
//! `test-module-dependencies` or `test-module-resources` elements. Below
//! those, everything is parsed generically with unrestricted nesting and
//! handed through to the module runtime untouched.
//!
//! Any structural violation aborts the whole parse; no partial result is
//! ever returned.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::descriptor::tree::{ElementNode, Module, ModuleKind};

/// The fixed namespace the descriptor vocabulary lives in.
pub const DESCRIPTOR_NAMESPACE: &str = "urn:jboss:surefire-module:1.0";

const TARGET_NS_ATTRIBUTE: &str = "targetNs";

/// A line/column position within the descriptor source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: u64,
    pub column: u64,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A structural parse fault. Always fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("{}", render_unexpected(.kind, .name, .text, .location))]
    UnexpectedContent {
        kind: &'static str,
        name: Option<String>,
        text: Option<String>,
        location: Location,
    },

    #[error("missing required attribute '{TARGET_NS_ATTRIBUTE}' on the modules element at {location}")]
    MissingTargetNamespace { location: Location },

    #[error("there already was a '{section}' entry, second occurrence at {location}")]
    DuplicateSection {
        section: &'static str,
        location: Location,
    },

    #[error("unexpected end of document at {location}")]
    UnexpectedEndOfDocument { location: Location },

    #[error("malformed XML at {location}: {source}")]
    Xml {
        location: Location,
        #[source]
        source: quick_xml::Error,
    },

    #[error("malformed attribute at {location}: {source}")]
    Attribute {
        location: Location,
        #[source]
        source: quick_xml::events::attributes::AttrError,
    },

    #[error("could not read module definition file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn render_unexpected(
    kind: &str,
    name: &Option<String>,
    text: &Option<String>,
    location: &Location,
) -> String {
    let mut message = format!("unexpected content of type '{kind}'");
    if let Some(name) = name {
        message.push_str(&format!(" named '{name}'"));
    }
    if let Some(text) = text {
        message.push_str(&format!(", text is: '{text}'"));
    }
    message.push_str(&format!(" at {location}"));
    message
}

/// Everything a descriptor file declares: the target namespace for the
/// generated module descriptors, the declared modules in document order,
/// and the two optional auxiliary pass-through sections.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDescriptor {
    pub target_namespace: String,
    pub modules: Vec<Module>,
    pub test_module_dependencies: Option<ElementNode>,
    pub test_module_resources: Option<ElementNode>,
}

/// Parse a descriptor from a file on disk.
pub fn parse_descriptor_file(path: &Path) -> Result<ParsedDescriptor, ParseError> {
    let source = fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_descriptor(&source)
}

/// Parse a descriptor from in-memory XML text.
pub fn parse_descriptor(source: &str) -> Result<ParsedDescriptor, ParseError> {
    Parser::new(source).parse_document()
}

/// The elements the parser recognizes, by qualified name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DescriptorElement {
    Modules,
    Module,
    TestModuleDependencies,
    TestModuleResources,
    Unknown,
}

struct Parser<'a> {
    source: &'a str,
    reader: NsReader<&'a [u8]>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Parser {
            source,
            reader: NsReader::from_str(source),
        }
    }

    fn parse_document(mut self) -> Result<ParsedDescriptor, ParseError> {
        loop {
            let event = self.next_event()?;
            match event {
                Event::Decl(_) | Event::Comment(_) => {}
                Event::Text(ref text) => self.require_whitespace("characters", text)?,
                Event::Start(ref start) | Event::Empty(ref start) => {
                    if self.classify(start) != DescriptorElement::Modules {
                        return Err(self.unexpected(&event));
                    }
                    let empty = matches!(event, Event::Empty(_));
                    let descriptor = self.parse_modules(start, empty)?;
                    self.parse_end_document()?;
                    return Ok(descriptor);
                }
                Event::Eof => {
                    return Err(ParseError::UnexpectedEndOfDocument {
                        location: self.location(),
                    })
                }
                other => return Err(self.unexpected(&other)),
            }
        }
    }

    /// Parse the body of the root `modules` element. The root must carry
    /// exactly the `targetNs` attribute; its children are classified by
    /// qualified name and anything unrecognized is fatal.
    fn parse_modules(
        &mut self,
        root: &BytesStart<'a>,
        empty: bool,
    ) -> Result<ParsedDescriptor, ParseError> {
        let mut target_namespace = None;
        for attribute in root.attributes() {
            let attribute = attribute.map_err(|source| ParseError::Attribute {
                location: self.location(),
                source,
            })?;
            if attribute.key.as_namespace_binding().is_some() {
                continue;
            }
            if attribute.key.local_name().into_inner() == TARGET_NS_ATTRIBUTE.as_bytes() {
                target_namespace = Some(self.attribute_value(&attribute)?);
            } else {
                return Err(ParseError::UnexpectedContent {
                    kind: "attribute",
                    name: Some(String::from_utf8_lossy(attribute.key.into_inner()).into_owned()),
                    text: Some(String::from_utf8_lossy(&attribute.value).into_owned()),
                    location: self.location(),
                });
            }
        }
        let target_namespace =
            target_namespace.ok_or_else(|| ParseError::MissingTargetNamespace {
                location: self.location(),
            })?;

        let mut descriptor = ParsedDescriptor {
            target_namespace,
            modules: Vec::new(),
            test_module_dependencies: None,
            test_module_resources: None,
        };
        if empty {
            return Ok(descriptor);
        }

        loop {
            let event = self.next_event()?;
            match event {
                Event::Comment(_) => {}
                Event::Text(ref text) => self.require_whitespace("characters", text)?,
                Event::End(_) => return Ok(descriptor),
                Event::Start(ref start) | Event::Empty(ref start) => {
                    let has_children = matches!(event, Event::Start(_));
                    match self.classify(start) {
                        DescriptorElement::Module => {
                            let mut module = Module::new(
                                ModuleKind::Declared,
                                descriptor.target_namespace.clone(),
                            );
                            self.add_attributes(&mut module.node, start)?;
                            if has_children {
                                self.parse_children(&mut module.node)?;
                            }
                            descriptor.modules.push(module);
                        }
                        DescriptorElement::TestModuleDependencies => {
                            if descriptor.test_module_dependencies.is_some() {
                                return Err(ParseError::DuplicateSection {
                                    section: "test-module-dependencies",
                                    location: self.location(),
                                });
                            }
                            let mut section = ElementNode::new("test-module-dependencies");
                            if has_children {
                                self.parse_children(&mut section)?;
                            }
                            descriptor.test_module_dependencies = Some(section);
                        }
                        DescriptorElement::TestModuleResources => {
                            if descriptor.test_module_resources.is_some() {
                                return Err(ParseError::DuplicateSection {
                                    section: "test-module-resources",
                                    location: self.location(),
                                });
                            }
                            let mut section = ElementNode::new("test-module-resources");
                            if has_children {
                                self.parse_children(&mut section)?;
                            }
                            descriptor.test_module_resources = Some(section);
                        }
                        _ => return Err(self.unexpected(&event)),
                    }
                }
                Event::Eof => {
                    return Err(ParseError::UnexpectedEndOfDocument {
                        location: self.location(),
                    })
                }
                other => return Err(self.unexpected(&other)),
            }
        }
    }

    /// Generic pass-through parsing below a recognized element. Tag balance
    /// is enforced by the reader, so an `End` event here always closes
    /// `parent`.
    fn parse_children(&mut self, parent: &mut ElementNode) -> Result<(), ParseError> {
        loop {
            let event = self.next_event()?;
            match event {
                Event::Comment(_) => {}
                Event::Text(ref text) => self.require_whitespace("characters", text)?,
                Event::CData(ref data) => self.require_whitespace("cdata", data)?,
                Event::End(_) => return Ok(()),
                Event::Start(ref start) => {
                    let mut child = self.generic_element(start)?;
                    self.parse_children(&mut child)?;
                    parent.add_child(child);
                }
                Event::Empty(ref start) => {
                    let child = self.generic_element(start)?;
                    parent.add_child(child);
                }
                Event::Eof => {
                    return Err(ParseError::UnexpectedEndOfDocument {
                        location: self.location(),
                    })
                }
                other => return Err(self.unexpected(&other)),
            }
        }
    }

    /// After the root element closes, only whitespace and comments may follow.
    fn parse_end_document(&mut self) -> Result<(), ParseError> {
        loop {
            let event = self.next_event()?;
            match event {
                Event::Eof => return Ok(()),
                Event::Comment(_) => {}
                Event::Text(ref text) => self.require_whitespace("characters", text)?,
                other => return Err(self.unexpected(&other)),
            }
        }
    }

    fn generic_element(&self, start: &BytesStart<'a>) -> Result<ElementNode, ParseError> {
        let name = String::from_utf8_lossy(start.local_name().into_inner()).into_owned();
        let mut node = ElementNode::new(name);
        self.add_attributes(&mut node, start)?;
        Ok(node)
    }

    /// Copy all attributes onto `node` by local name, skipping namespace
    /// declarations. Placeholder detection happens in `add_attribute`.
    fn add_attributes(&self, node: &mut ElementNode, start: &BytesStart<'a>) -> Result<(), ParseError> {
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|source| ParseError::Attribute {
                location: self.location(),
                source,
            })?;
            if attribute.key.as_namespace_binding().is_some() {
                continue;
            }
            let name = String::from_utf8_lossy(attribute.key.local_name().into_inner()).into_owned();
            let value = self.attribute_value(&attribute)?;
            node.add_attribute(name, value);
        }
        Ok(())
    }

    fn attribute_value(
        &self,
        attribute: &quick_xml::events::attributes::Attribute<'_>,
    ) -> Result<String, ParseError> {
        attribute
            .unescape_value()
            .map(|value| value.into_owned())
            .map_err(|source| ParseError::Xml {
                location: self.location(),
                source,
            })
    }

    fn classify(&self, start: &BytesStart<'a>) -> DescriptorElement {
        let (resolution, local) = self.reader.resolve_element(start.name());
        let in_namespace = match resolution {
            ResolveResult::Bound(ns) => ns.into_inner() == DESCRIPTOR_NAMESPACE.as_bytes(),
            _ => false,
        };
        if !in_namespace {
            return DescriptorElement::Unknown;
        }
        match local.into_inner() {
            b"modules" => DescriptorElement::Modules,
            b"module" => DescriptorElement::Module,
            b"test-module-dependencies" => DescriptorElement::TestModuleDependencies,
            b"test-module-resources" => DescriptorElement::TestModuleResources,
            _ => DescriptorElement::Unknown,
        }
    }

    fn next_event(&mut self) -> Result<Event<'a>, ParseError> {
        let location = self.location();
        self.reader
            .read_event()
            .map_err(|source| ParseError::Xml { location, source })
    }

    fn require_whitespace(&self, kind: &'static str, data: &[u8]) -> Result<(), ParseError> {
        let text = String::from_utf8_lossy(data);
        if text.trim().is_empty() {
            Ok(())
        } else {
            Err(ParseError::UnexpectedContent {
                kind,
                name: None,
                text: Some(text.trim().to_string()),
                location: self.location(),
            })
        }
    }

    fn unexpected(&self, event: &Event<'_>) -> ParseError {
        let (kind, name, text) = match event {
            Event::Start(e) | Event::Empty(e) => (
                "element start",
                Some(String::from_utf8_lossy(e.name().into_inner()).into_owned()),
                None,
            ),
            Event::End(e) => (
                "element end",
                Some(String::from_utf8_lossy(e.name().into_inner()).into_owned()),
                None,
            ),
            Event::Text(t) => (
                "characters",
                None,
                Some(String::from_utf8_lossy(t).into_owned()),
            ),
            Event::CData(t) => ("cdata", None, Some(String::from_utf8_lossy(t).into_owned())),
            Event::Comment(t) => (
                "comment",
                None,
                Some(String::from_utf8_lossy(t).into_owned()),
            ),
            Event::PI(_) => ("processing instruction", None, None),
            Event::DocType(_) => ("dtd", None, None),
            Event::Decl(_) => ("document start", None, None),
            Event::Eof => ("document end", None, None),
            _ => ("unknown", None, None),
        };
        ParseError::UnexpectedContent {
            kind,
            name,
            text,
            location: self.location(),
        }
    }

    fn location(&self) -> Location {
        location_at(self.source, self.reader.buffer_position() as usize)
    }
}

fn location_at(source: &str, offset: usize) -> Location {
    let clamped = offset.min(source.len());
    let mut line = 1;
    let mut column = 1;
    for byte in source.as_bytes()[..clamped].iter() {
        if *byte == b'\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    Location { line, column }
}
