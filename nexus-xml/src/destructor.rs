//! The XML "destructor": a read-only descent API over a parsed document
//! with explicit cardinality contracts (spec.md §4.2). `one`/`opt` fail
//! loudly on the wrong number of matches instead of silently picking the
//! first match, so a malformed bank response surfaces as a typed
//! `xml-parse` error rather than a confusing downstream `None`.
//!
//! Callers parse with [`parse`] and keep the returned `roxmltree::Document`
//! alive for as long as they hold any [`Destructor`] borrowed from it —
//! the usual short parse-then-consume shape, no different from handing a
//! `&str` around.

use chrono::{DateTime, FixedOffset, NaiveDate};
use std::str::FromStr;

use crate::error::XmlError;

/// Parses `xml` into a borrowable tree. Returns the `roxmltree::Document`
/// so the caller controls its lifetime; call `.root()` to get the first
/// [`Destructor`].
pub fn parse(xml: &str) -> Result<roxmltree::Document<'_>, XmlError> {
    roxmltree::Document::parse(xml).map_err(|e| XmlError::Malformed(e.to_string()))
}

/// A cursor over one element, scoped to build up a dotted path for error
/// messages as it descends.
#[derive(Clone, Copy)]
pub struct Destructor<'a> {
    node: roxmltree::Node<'a, 'a>,
}

/// Extension trait so `doc.root_element()` can directly yield a `Destructor`.
pub trait AsRoot<'a> {
    fn root(&self) -> Destructor<'a>;
}

impl<'a> AsRoot<'a> for roxmltree::Document<'a> {
    fn root(&self) -> Destructor<'a> {
        Destructor { node: self.root_element() }
    }
}

impl<'a> Destructor<'a> {
    pub fn new(node: roxmltree::Node<'a, 'a>) -> Self {
        Destructor { node }
    }

    fn tag(&self) -> &'a str {
        self.node.tag_name().name()
    }

    fn matching_children(&self, tag: &str) -> Vec<roxmltree::Node<'a, 'a>> {
        self.node
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == tag)
            .collect()
    }

    /// Requires exactly one child named `tag`.
    pub fn one(&self, tag: &str) -> Result<Destructor<'a>, XmlError> {
        let matches = self.matching_children(tag);
        if matches.len() == 1 {
            Ok(Destructor::new(matches[0]))
        } else {
            Err(XmlError::NotExactlyOne { tag: tag.to_string(), found: matches.len() })
        }
    }

    /// Allows zero or one child named `tag`.
    pub fn opt(&self, tag: &str) -> Result<Option<Destructor<'a>>, XmlError> {
        let matches = self.matching_children(tag);
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(Destructor::new(matches[0]))),
            found => Err(XmlError::MoreThanOne { tag: tag.to_string(), found }),
        }
    }

    /// Visits every child named `tag`, in document order.
    pub fn each<E>(&self, tag: &str, mut f: impl FnMut(Destructor<'a>) -> Result<(), E>) -> Result<(), E> {
        for node in self.matching_children(tag) {
            f(Destructor::new(node))?;
        }
        Ok(())
    }

    /// Maps every child named `tag` into a `Vec`, in document order.
    pub fn map<T, E>(&self, tag: &str, mut f: impl FnMut(Destructor<'a>) -> Result<T, E>) -> Result<Vec<T>, E> {
        self.matching_children(tag).into_iter().map(|n| f(Destructor::new(n))).collect()
    }

    /// The element's own attribute value.
    pub fn attr(&self, name: &str) -> Result<String, XmlError> {
        self.node
            .attribute(name)
            .map(str::to_string)
            .ok_or_else(|| XmlError::BadContent {
                path: format!("{}@{}", self.tag(), name),
                expected: "attribute to be present",
                content: String::new(),
            })
    }

    pub fn attr_opt(&self, name: &str) -> Option<String> {
        self.node.attribute(name).map(str::to_string)
    }

    /// Concatenated text content of the element (all direct text children).
    pub fn text(&self) -> Result<String, XmlError> {
        let text: String = self.node.children().filter_map(|n| n.text()).collect();
        Ok(text.trim().to_string())
    }

    pub fn date(&self) -> Result<NaiveDate, XmlError> {
        let content = self.text()?;
        NaiveDate::parse_from_str(&content, "%Y-%m-%d").map_err(|_| XmlError::BadContent {
            path: self.tag().to_string(),
            expected: "an ISO-8601 date (YYYY-MM-DD)",
            content,
        })
    }

    pub fn date_time(&self) -> Result<DateTime<FixedOffset>, XmlError> {
        let content = self.text()?;
        DateTime::parse_from_rfc3339(&content).map_err(|_| XmlError::BadContent {
            path: self.tag().to_string(),
            expected: "an ISO-8601 date-time",
            content,
        })
    }

    pub fn bool(&self) -> Result<bool, XmlError> {
        let content = self.text()?;
        match content.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(XmlError::BadContent {
                path: self.tag().to_string(),
                expected: "true/false/1/0",
                content,
            }),
        }
    }

    /// Parses the element's text content as `T` via `FromStr`, used for
    /// closed enumerations (e.g. EBICS return codes, camt status codes).
    pub fn parse_enum<T: FromStr>(&self) -> Result<T, XmlError>
    where
        T::Err: std::fmt::Display,
    {
        let content = self.text()?;
        content.parse::<T>().map_err(|e| XmlError::BadContent {
            path: self.tag().to_string(),
            expected: "a recognized enumeration value",
            content: format!("{content} ({e})"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_requires_exactly_one_match() {
        let doc = parse("<Root><A>1</A><A>2</A></Root>").unwrap();
        let root = doc.root();
        assert!(root.one("A").is_err());
    }

    #[test]
    fn one_succeeds_and_opt_allows_absence() {
        let doc = parse("<Root><A>1</A></Root>").unwrap();
        let root = doc.root();
        assert_eq!(root.one("A").unwrap().text().unwrap(), "1");
        assert!(root.opt("B").unwrap().is_none());
    }

    #[test]
    fn each_visits_in_document_order() {
        let doc = parse("<Root><Item>1</Item><Item>2</Item><Item>3</Item></Root>").unwrap();
        let root = doc.root();
        let mut seen = Vec::new();
        root.each::<XmlError>("Item", |item| {
            seen.push(item.text()?);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["1", "2", "3"]);
    }

    #[test]
    fn date_time_parses_offset_timestamps() {
        let doc = parse("<Root><Ts>2024-03-01T10:15:00+01:00</Ts></Root>").unwrap();
        let ts = doc.root().one("Ts").unwrap().date_time().unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T10:15:00+01:00");
    }
}
