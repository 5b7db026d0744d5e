//! A minimal in-memory XML element tree, and a `Builder` that descends a
//! slash-separated path the way spec.md §4.2 describes: `el(path)` walks
//! or creates each segment, `attr`/`text` act on the node the descent left
//! the cursor on. Keeping our own tree (rather than a single streaming
//! write pass) is what lets the enveloped-signature step splice signed
//! `ds:Signature` children back into an already-built document.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// One element in the tree, with ordered attributes and ordered children.
#[derive(Debug, Clone, Default)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

#[derive(Debug, Clone)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        XmlElement { name: name.into(), attrs: Vec::new(), children: Vec::new() }
    }

    /// Finds the first direct child element with the given tag name.
    pub fn find_child(&self, tag: &str) -> Option<&XmlElement> {
        self.children.iter().find_map(|n| match n {
            XmlNode::Element(e) if e.name == tag => Some(e),
            _ => None,
        })
    }

    fn find_child_mut(&mut self, tag: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|n| match n {
            XmlNode::Element(e) if e.name == tag => Some(e),
            _ => None,
        })
    }

    /// Serializes this element (and its descendants) as a UTF-8 XML document,
    /// with an XML declaration.
    pub fn to_xml_document(&self) -> Vec<u8> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(quick_xml::events::BytesDecl::new("1.0", Some("UTF-8"), None)))
            .expect("writing to an in-memory buffer cannot fail");
        write_element(&mut writer, self);
        writer.into_inner()
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &XmlElement) {
    let mut start = BytesStart::new(el.name.clone());
    for (k, v) in &el.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if el.children.is_empty() {
        writer.write_event(Event::Empty(start)).expect("in-memory write");
        return;
    }
    writer.write_event(Event::Start(start)).expect("in-memory write");
    for child in &el.children {
        match child {
            XmlNode::Element(e) => write_element(writer, e),
            XmlNode::Text(t) => {
                writer
                    .write_event(Event::Text(BytesText::new(t)))
                    .expect("in-memory write");
            }
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(el.name.clone())))
        .expect("in-memory write");
}

/// Builds a document by descending slash-separated paths, creating
/// elements as needed. `el("a/b/c")` moves the cursor to (creating, if
/// absent) `a`, then `b`, then a *new* `c` child every time it is called —
/// callers that need to add siblings under the same parent call `el`
/// again with the shared prefix.
pub struct Builder {
    root: XmlElement,
}

impl Builder {
    pub fn new(root_name: impl Into<String>) -> Self {
        Builder { root: XmlElement::new(root_name) }
    }

    pub fn root_attr(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.root.attrs.push((name.to_string(), value.into()));
        self
    }

    /// Descends the given path from the root, creating elements that don't
    /// already exist, and returns a cursor positioned on the final segment.
    pub fn el<'a>(&'a mut self, path: &str) -> Cursor<'a> {
        let mut current = &mut self.root;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let exists = current.children.iter().any(|c| matches!(c, XmlNode::Element(e) if e.name == segment));
            if !exists {
                current.children.push(XmlNode::Element(XmlElement::new(segment)));
            }
            current = current.find_child_mut(segment).expect("just inserted or already present");
        }
        Cursor { element: current }
    }

    /// Always appends a brand-new child named `tag` under the path and
    /// returns a cursor on it — used for repeated siblings such as
    /// multiple `CdtTrfTxInf` blocks (Nexus only ever emits one, but the
    /// ISO 20022 codec layer uses this for `Ntry`/`TxDtls` style repetition
    /// when parsing is mirrored back into test fixtures).
    pub fn el_new<'a>(&'a mut self, path: &str) -> Cursor<'a> {
        let (parent_path, leaf) = match path.rsplit_once('/') {
            Some((p, l)) => (p, l),
            None => ("", path),
        };
        let parent = if parent_path.is_empty() {
            &mut self.root
        } else {
            self.el(parent_path).element
        };
        parent.children.push(XmlNode::Element(XmlElement::new(leaf)));
        let element = parent.find_child_mut(leaf).expect("just inserted");
        Cursor { element }
    }

    pub fn build(self) -> XmlElement {
        self.root
    }
}

pub struct Cursor<'a> {
    element: &'a mut XmlElement,
}

impl<'a> Cursor<'a> {
    pub fn attr(self, name: &str, value: impl Into<String>) -> Self {
        self.element.attrs.push((name.to_string(), value.into()));
        self
    }

    pub fn text(self, content: impl Into<String>) -> Self {
        self.element.children.push(XmlNode::Text(content.into()));
        self
    }

    pub fn el<'b>(&'b mut self, path: &str) -> Cursor<'b> {
        let mut current: &mut XmlElement = self.element;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let exists = current.children.iter().any(|c| matches!(c, XmlNode::Element(e) if e.name == segment));
            if !exists {
                current.children.push(XmlNode::Element(XmlElement::new(segment)));
            }
            current = current.find_child_mut(segment).expect("just inserted or already present");
        }
        Cursor { element: current }
    }
}
