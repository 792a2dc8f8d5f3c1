//! Generic element tree for module descriptors.
//!
//! The descriptor vocabulary is deliberately schema-light: apart from the
//! structurally significant elements the parser recognizes, everything is
//! kept as a generic node (name + attributes + children) and passed through
//! to the consuming module runtime, which does its own validation.
//!
//! Attribute values wrapped in `$` sentinels (e.g. `$org.foo:bar$`) are
//! placeholders for deferred artifact resolution. The sentinels are stripped
//! on insertion and the attribute name is remembered, so the materializer
//! can later rewrite the value in place once the artifact has been copied.

use anyhow::{bail, Context, Result};
use indexmap::{IndexMap, IndexSet};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// File name of the per-module descriptor written into each module directory.
pub const MODULE_XML: &str = "module.xml";

/// A reference to one placeholder attribute somewhere in a tree.
///
/// `path` is the chain of child indexes from the root node down to the
/// owning node; it is only valid against the tree that produced it and as
/// long as no children are added or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderRef {
    pub path: Vec<usize>,
    pub attribute: String,
}

/// A generic XML element: name, insertion-ordered attributes, ordered
/// children, and the set of attribute names whose values are placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementNode {
    name: String,
    attributes: IndexMap<String, String>,
    children: Vec<ElementNode>,
    placeholder_attributes: IndexSet<String>,
}

impl ElementNode {
    pub fn new(name: impl Into<String>) -> Self {
        ElementNode {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add an attribute, detecting the `$...$` placeholder syntax.
    ///
    /// A placeholder value is stored with its sentinels stripped and the
    /// attribute name is recorded for later resolution. Returns `true` when
    /// an existing attribute of the same name was overwritten.
    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        let mut value = value.into();

        if value.starts_with('$') && value.ends_with('$') && value.len() > 1 {
            value = value[1..value.len() - 1].to_string();
            self.placeholder_attributes.insert(name.clone());
        }

        self.attributes.insert(name, value).is_some()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn add_child(&mut self, child: ElementNode) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[ElementNode] {
        &self.children
    }

    /// Collect every placeholder attribute of this node and its descendants,
    /// depth-first pre-order.
    pub fn find_placeholders(&self) -> Vec<PlaceholderRef> {
        let mut refs = Vec::new();
        let mut path = Vec::new();
        self.collect_placeholders(&mut path, &mut refs);
        refs
    }

    fn collect_placeholders(&self, path: &mut Vec<usize>, refs: &mut Vec<PlaceholderRef>) {
        for attribute in &self.placeholder_attributes {
            refs.push(PlaceholderRef {
                path: path.clone(),
                attribute: attribute.clone(),
            });
        }
        for (index, child) in self.children.iter().enumerate() {
            path.push(index);
            child.collect_placeholders(path, refs);
            path.pop();
        }
    }

    /// The current (sentinel-stripped) value of a placeholder attribute.
    pub fn placeholder_value(&self, reference: &PlaceholderRef) -> Option<&str> {
        self.node_at(&reference.path).attribute(&reference.attribute)
    }

    /// Rewrite a placeholder attribute with its resolved value.
    pub fn resolve_placeholder(&mut self, reference: &PlaceholderRef, value: impl Into<String>) {
        let node = self.node_at_mut(&reference.path);
        node.attributes.insert(reference.attribute.clone(), value.into());
        node.placeholder_attributes.shift_remove(&reference.attribute);
    }

    fn node_at(&self, path: &[usize]) -> &ElementNode {
        let mut node = self;
        for &index in path {
            node = &node.children[index];
        }
        node
    }

    fn node_at_mut(&mut self, path: &[usize]) -> &mut ElementNode {
        let mut node = self;
        for &index in path {
            node = &mut node.children[index];
        }
        node
    }

    /// Serialize this node and its children.
    ///
    /// A node without children is written as an empty element. Attributes
    /// are emitted in insertion order. When `namespace` is given it is
    /// declared once, as the default namespace of this node only; children
    /// never re-declare it.
    pub fn write_xml<W: Write>(&self, writer: &mut Writer<W>, namespace: Option<&str>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        if let Some(ns) = namespace {
            start.push_attribute(("xmlns", ns));
        }
        for (name, value) in &self.attributes {
            start.push_attribute((name.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
            for child in &self.children {
                child.write_xml(writer, None)?;
            }
            writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        }
        Ok(())
    }

    /// Serialize to a string, two-space indented. Mostly useful in tests.
    pub fn to_xml_string(&self, namespace: Option<&str>) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        self.write_xml(&mut writer, namespace)?;
        String::from_utf8(writer.into_inner()).context("serialized element is not valid UTF-8")
    }
}

/// Distinguishes the one synthesized bootstrap module from modules declared
/// in the descriptor file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Bootstrap,
    Declared,
}

/// A `module` element plus the target namespace its descriptor is written in.
///
/// One module maps to exactly one output directory and one `module.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub node: ElementNode,
    namespace_uri: String,
    kind: ModuleKind,
}

impl Module {
    pub fn new(kind: ModuleKind, namespace_uri: impl Into<String>) -> Self {
        Module {
            node: ElementNode::new("module"),
            namespace_uri: namespace_uri.into(),
            kind,
        }
    }

    /// The required `name` attribute. Its absence is an error at the point
    /// the name is first needed, never a silent default.
    pub fn name(&self) -> Result<&str> {
        self.node
            .attribute("name")
            .context("module does not have a 'name' attribute")
    }

    pub fn namespace_uri(&self) -> &str {
        &self.namespace_uri
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Write this module's descriptor as `module.xml` inside `dir`,
    /// overwriting any existing file of that name.
    pub fn write_descriptor(&self, dir: &Path) -> Result<()> {
        if !dir.is_dir() {
            bail!("no directory called {}", dir.display());
        }
        let path = dir.join(MODULE_XML);
        let file = File::create(&path)
            .with_context(|| format!("could not create {}", path.display()))?;

        let mut writer = Writer::new_with_indent(BufWriter::new(file), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;
        self.node.write_xml(&mut writer, Some(&self.namespace_uri))?;

        let mut out = writer.into_inner();
        out.flush()
            .with_context(|| format!("could not write {}", path.display()))?;
        Ok(())
    }

    /// The descriptor XML as a string, exactly as `write_descriptor` emits it.
    pub fn descriptor_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;
        self.node.write_xml(&mut writer, Some(&self.namespace_uri))?;
        String::from_utf8(writer.into_inner()).context("serialized module is not valid UTF-8")
    }
}
