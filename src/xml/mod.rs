//! Minimal XML element tree
//!
//! Just enough DOM for the WS-Trust exchange: parse text into a tree, walk a
//! path of qualified child names, read or replace an element's text, and
//! serialize back. Built on quick-xml's pull reader and writer.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Errors from parsing or writing XML.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Parse(String),

    #[error("document has no root element")]
    NoRoot,

    #[error("failed to write XML: {0}")]
    Write(String),
}

/// A node inside an element.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with its qualified name (`prefix:Local`), attributes and children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn new(name: String, attributes: Vec<(String, String)>) -> Self {
        Self {
            name,
            attributes,
            children: Vec::new(),
        }
    }

    /// First direct child element with the given qualified name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find_map(|node| match node {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// Walk a chain of child names below this element.
    pub fn find(&self, path: &[&str]) -> Option<&Element> {
        path.iter().try_fold(self, |el, name| el.child(name))
    }

    pub fn find_mut(&mut self, path: &[&str]) -> Option<&mut Element> {
        let mut el = self;
        for name in path {
            el = el.child_mut(name)?;
        }
        Some(el)
    }

    /// Concatenated direct text content, `None` if the element has no text.
    pub fn text(&self) -> Option<String> {
        let mut out = String::new();
        let mut found = false;
        for node in &self.children {
            if let Node::Text(t) = node {
                out.push_str(t);
                found = true;
            }
        }
        found.then_some(out)
    }

    /// Replace all direct text content with `text`, keeping child elements.
    pub fn set_text(&mut self, text: &str) {
        self.children.retain(|node| !matches!(node, Node::Text(_)));
        self.children.insert(0, Node::Text(text.to_string()));
    }

    fn write<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<(), XmlError> {
        let start = BytesStart::new(self.name.as_str()).with_attributes(
            self.attributes
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );

        if self.children.is_empty() {
            return write_event(writer, Event::Empty(start));
        }

        write_event(writer, Event::Start(start))?;
        for node in &self.children {
            match node {
                Node::Element(e) => e.write(writer)?,
                Node::Text(t) => write_event(writer, Event::Text(BytesText::new(t)))?,
            }
        }
        write_event(writer, Event::End(BytesEnd::new(self.name.as_str())))
    }
}

fn write_event<W: std::io::Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<(), XmlError> {
    writer
        .write_event(event)
        .map_err(|e| XmlError::Write(e.to_string()))
}

/// A parsed document: an optional XML declaration plus one root element.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    declaration: bool,
    pub root: Element,
}

impl Document {
    /// Parse XML text into a tree. Whitespace-only text between elements is dropped.
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut declaration = false;
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| XmlError::Parse(format!("at byte {}: {}", reader.buffer_position(), e)))?;

            match event {
                Event::Decl(_) => declaration = true,
                Event::Start(e) => stack.push(start_element(&e)?),
                Event::Empty(e) => {
                    let el = start_element(&e)?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| XmlError::Parse("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::Text(t) => {
                    let text = t.unescape().map_err(|e| XmlError::Parse(e.to_string()))?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(text.into_owned()));
                    }
                }
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(text));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::Parse("unexpected end of document".to_string()));
        }

        let root = root.ok_or(XmlError::NoRoot)?;
        Ok(Self { declaration, root })
    }

    /// Walk from the root: the first path segment must name the root itself.
    pub fn find_path(&self, path: &[&str]) -> Option<&Element> {
        let (first, rest) = path.split_first()?;
        if self.root.name != *first {
            return None;
        }
        self.root.find(rest)
    }

    pub fn find_path_mut(&mut self, path: &[&str]) -> Option<&mut Element> {
        let (first, rest) = path.split_first()?;
        if self.root.name != *first {
            return None;
        }
        self.root.find_mut(rest)
    }

    /// Serialize the tree back to text.
    pub fn serialize(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::new());
        if self.declaration {
            write_event(
                &mut writer,
                Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
            )?;
        }
        self.root.write(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))
    }
}

fn start_element(e: &BytesStart<'_>) -> Result<Element, XmlError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Parse(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element::new(name, attributes))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    el: Element,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None if root.is_none() => *root = Some(el),
        None => return Err(XmlError::Parse("multiple root elements".to_string())),
    }
    Ok(())
}
