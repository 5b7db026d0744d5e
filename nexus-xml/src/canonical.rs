//! A pragmatic exclusive-c14n-shaped canonicalizer.
//!
//! Full Exclusive XML Canonicalization (`xml-exc-c14n#`) handles arbitrary
//! namespace prefix visibility and inclusive-namespace lists; Nexus only
//! ever signs and verifies its own closed EBICS/H005 profile, which has a
//! single namespace per document and no prefix redefinitions across the
//! signed node set. Within that profile this canonical form is
//! deterministic and symmetric between the build side (`dom::XmlElement`)
//! and the parse side (`roxmltree`): attributes sorted by name, elements
//! never self-closed, text escaped per XML 1.0 `AttValue`/`CharData`
//! rules. See SPEC_FULL.md §8 for why this simplification was chosen over
//! a general-purpose c14n implementation.

use crate::dom::{XmlElement, XmlNode};

pub fn canonicalize_element(el: &XmlElement) -> Vec<u8> {
    let mut out = Vec::new();
    write_element(&mut out, el);
    out
}

pub fn canonicalize_node(node: roxmltree::Node) -> Vec<u8> {
    let mut out = Vec::new();
    write_node(&mut out, node);
    out
}

fn write_element(out: &mut Vec<u8>, el: &XmlElement) {
    out.push(b'<');
    out.extend_from_slice(el.name.as_bytes());
    let mut attrs = el.attrs.clone();
    attrs.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, value) in &attrs {
        out.push(b' ');
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(escape_attr(value).as_bytes());
        out.push(b'"');
    }
    out.push(b'>');
    for child in &el.children {
        match child {
            XmlNode::Element(e) => write_element(out, e),
            XmlNode::Text(t) => out.extend_from_slice(escape_text(t).as_bytes()),
        }
    }
    out.extend_from_slice(b"</");
    out.extend_from_slice(el.name.as_bytes());
    out.push(b'>');
}

fn write_node(out: &mut Vec<u8>, node: roxmltree::Node) {
    if node.is_text() {
        if let Some(text) = node.text() {
            out.extend_from_slice(escape_text(text).as_bytes());
        }
        return;
    }
    if !node.is_element() {
        return;
    }
    out.push(b'<');
    out.extend_from_slice(node.tag_name().name().as_bytes());
    let mut attrs: Vec<(&str, &str)> = node.attributes().map(|a| (a.name(), a.value())).collect();
    attrs.sort_by(|a, b| a.0.cmp(b.0));
    for (name, value) in &attrs {
        out.push(b' ');
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(escape_attr(value).as_bytes());
        out.push(b'"');
    }
    out.push(b'>');
    for child in node.children() {
        write_node(out, child);
    }
    out.extend_from_slice(b"</");
    out.extend_from_slice(node.tag_name().name().as_bytes());
    out.push(b'>');
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('\r', "&#13;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;").replace('\n', "&#10;").replace('\t', "&#9;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Builder;

    #[test]
    fn build_side_and_parse_side_agree() {
        let mut builder = Builder::new("Foo");
        builder.root_attr("b", "2").root_attr("a", "1");
        builder.el("Bar").attr("z", "9").text("hello & <world>");
        let built = builder.build();

        let from_build = canonicalize_element(&built);

        let xml = String::from_utf8(built.to_xml_document()).unwrap();
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let from_parse = canonicalize_node(doc.root_element());

        assert_eq!(from_build, from_parse);
        assert_eq!(
            String::from_utf8(from_build).unwrap(),
            "<Foo a=\"1\" b=\"2\"><Bar z=\"9\">hello &amp; &lt;world&gt;</Bar></Foo>"
        );
    }
}
