//! Enveloped XML-DSIG signing and verification over the subset of a
//! document carrying `authenticate='true'` (spec.md §4.2).
//!
//! Namespaces are kept minimal by design (per C2's "no namespace juggling
//! beyond attributes"): the `ds:` prefix is declared locally on the
//! `ds:Signature` element itself via `xmlns:ds`, so the signature block is
//! self-contained regardless of what the surrounding document declares.

use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::canonical::{canonicalize_element, canonicalize_node};
use crate::dom::{Builder, XmlElement, XmlNode};
use crate::error::XmlError;

const C14N_ALGORITHM: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
const SIGNATURE_METHOD: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
const ENVELOPED_TRANSFORM: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
const DIGEST_METHOD: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Collects every element carrying `authenticate='true'`, in document
/// order, via the `XmlElement` DOM built on the signing side.
fn authenticated_subset(el: &XmlElement, out: &mut Vec<XmlElement>) {
    if el.attrs.iter().any(|(k, v)| k == "authenticate" && v == "true") {
        out.push(el.clone());
    }
    for child in &el.children {
        if let XmlNode::Element(e) = child {
            authenticated_subset(e, out);
        }
    }
}

fn authenticated_subset_parsed<'a>(node: roxmltree::Node<'a, 'a>, out: &mut Vec<roxmltree::Node<'a, 'a>>) {
    if node.is_element() && node.attribute("authenticate") == Some("true") {
        out.push(node);
    }
    for child in node.children() {
        authenticated_subset_parsed(child, out);
    }
}

fn digest_of_authenticated(elements: &[XmlElement]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for el in elements {
        hasher.update(canonicalize_element(el));
    }
    hasher.finalize().into()
}

fn digest_of_authenticated_parsed(nodes: &[roxmltree::Node]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for node in nodes {
        hasher.update(canonicalize_node(*node));
    }
    hasher.finalize().into()
}

fn build_signed_info(digest: &[u8; 32]) -> XmlElement {
    let mut builder = Builder::new("ds:SignedInfo");
    builder.el("ds:CanonicalizationMethod").attr("Algorithm", C14N_ALGORITHM);
    builder.el("ds:SignatureMethod").attr("Algorithm", SIGNATURE_METHOD);
    {
        let mut reference = builder.el("ds:Reference");
        reference.attr("URI", "");
        reference.el("ds:Transforms/ds:Transform").attr("Algorithm", ENVELOPED_TRANSFORM);
        reference.el("ds:DigestMethod").attr("Algorithm", DIGEST_METHOD);
        reference.el("ds:DigestValue").text(b64.encode(digest));
    }
    builder.build()
}

/// Finds the first descendant element named `AuthSignature`, searching
/// depth-first.
fn find_auth_signature_mut<'a>(el: &'a mut XmlElement) -> Option<&'a mut XmlElement> {
    if el.name == "AuthSignature" {
        return Some(el);
    }
    for child in &mut el.children {
        if let XmlNode::Element(e) = child {
            if let Some(found) = find_auth_signature_mut(e) {
                return Some(found);
            }
        }
    }
    None
}

/// Signs the `authenticate='true'` node set of `document` with the
/// subscriber's authentication key, splicing the resulting `ds:Signature`
/// into the document's `AuthSignature` element.
pub fn sign_enveloped(document: &mut XmlElement, auth_key: &RsaPrivateKey) -> Result<(), XmlError> {
    let mut authenticated = Vec::new();
    authenticated_subset(document, &mut authenticated);
    if authenticated.is_empty() {
        return Err(XmlError::Signature("no authenticate='true' elements found".into()));
    }
    let digest = digest_of_authenticated(&authenticated);
    let signed_info = build_signed_info(&digest);
    let canonical_signed_info = canonicalize_element(&signed_info);

    let signature_value = nexus_crypto::sign::sign_xmldsig_rsa_sha256(&canonical_signed_info, auth_key)?;

    let mut root = XmlElement::new("ds:Signature");
    root.attrs.push(("xmlns:ds".to_string(), DS_NS.to_string()));
    root.children.push(XmlNode::Element(signed_info));

    let mut signature_value_element = XmlElement::new("ds:SignatureValue");
    signature_value_element.children.push(XmlNode::Text(b64.encode(&signature_value)));
    root.children.push(XmlNode::Element(signature_value_element));

    let auth_signature = find_auth_signature_mut(document)
        .ok_or_else(|| XmlError::Signature("document has no AuthSignature element".into()))?;
    auth_signature.children.push(XmlNode::Element(root));
    Ok(())
}

/// Verifies the enveloped signature inside a parsed document's
/// `AuthSignature` element against the bank's authentication public key.
pub fn verify_enveloped(document: &roxmltree::Document, bank_auth_key: &RsaPublicKey) -> Result<(), XmlError> {
    let auth_signature = document
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "AuthSignature")
        .ok_or_else(|| XmlError::Signature("document has no AuthSignature element".into()))?;
    let signature_node = auth_signature
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "Signature")
        .ok_or_else(|| XmlError::Signature("AuthSignature has no ds:Signature child".into()))?;
    let signed_info_node = signature_node
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "SignedInfo")
        .ok_or_else(|| XmlError::Signature("ds:Signature has no SignedInfo".into()))?;
    let signature_value_node = signature_node
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "SignatureValue")
        .ok_or_else(|| XmlError::Signature("ds:Signature has no SignatureValue".into()))?;

    let digest_value_node = signed_info_node
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "DigestValue")
        .ok_or_else(|| XmlError::Signature("SignedInfo has no DigestValue".into()))?;
    let claimed_digest = b64
        .decode(digest_value_node.text().unwrap_or_default().trim())
        .map_err(|e| XmlError::Signature(format!("bad DigestValue base64: {e}")))?;

    let mut authenticated = Vec::new();
    authenticated_subset_parsed(document.root_element(), &mut authenticated);
    let actual_digest = digest_of_authenticated_parsed(&authenticated);
    if actual_digest.as_slice() != claimed_digest.as_slice() {
        return Err(XmlError::Signature("digest mismatch over authenticated node set".into()));
    }

    let canonical_signed_info = canonicalize_node(signed_info_node);
    let signature_value = b64
        .decode(signature_value_node.text().unwrap_or_default().trim())
        .map_err(|e| XmlError::Signature(format!("bad SignatureValue base64: {e}")))?;

    nexus_crypto::sign::verify_xmldsig_rsa_sha256(&canonical_signed_info, &signature_value, bank_auth_key)
        .map_err(|_| XmlError::Signature("enveloped signature did not verify".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_crypto::keys::rsa_generate;

    fn sample_document(auth_key_present: bool) -> XmlElement {
        let mut builder = Builder::new("ebicsRequest");
        {
            let mut header = builder.el("header");
            header.el("static").attr("authenticate", "true").el("HostID").text("HOST01");
        }
        if auth_key_present {
            builder.el("AuthSignature");
        }
        builder.build()
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let key = rsa_generate(2048).unwrap();
        let public = key.to_public_key();

        let mut document = sample_document(true);
        sign_enveloped(&mut document, &key).unwrap();

        let xml = String::from_utf8(document.to_xml_document()).unwrap();
        let parsed = roxmltree::Document::parse(&xml).unwrap();
        verify_enveloped(&parsed, &public).unwrap();
    }

    #[test]
    fn verify_fails_with_wrong_key() {
        let key = rsa_generate(2048).unwrap();
        let other_key = rsa_generate(2048).unwrap();

        let mut document = sample_document(true);
        sign_enveloped(&mut document, &key).unwrap();

        let xml = String::from_utf8(document.to_xml_document()).unwrap();
        let parsed = roxmltree::Document::parse(&xml).unwrap();
        assert!(verify_enveloped(&parsed, &other_key.to_public_key()).is_err());
    }

    #[test]
    fn verify_fails_if_authenticated_content_is_tampered() {
        let key = rsa_generate(2048).unwrap();
        let public = key.to_public_key();

        let mut document = sample_document(true);
        sign_enveloped(&mut document, &key).unwrap();
        let mut xml = String::from_utf8(document.to_xml_document()).unwrap();
        xml = xml.replace("HOST01", "HOST99");

        let parsed = roxmltree::Document::parse(&xml).unwrap();
        assert!(verify_enveloped(&parsed, &public).is_err());
    }

    #[test]
    fn sign_without_auth_signature_element_errors() {
        let key = rsa_generate(2048).unwrap();
        let mut document = sample_document(false);
        assert!(sign_enveloped(&mut document, &key).is_err());
    }
}
