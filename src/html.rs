//! Loads HTML into an [`ArenaDocument`] and writes arena subtrees back out.
//!
//! `<template shadowrootmode>` children become a shadow root on their parent,
//! and shadow roots are written back the same way.

use std::path::Path;

use page_annotations::{ArenaDocument, Document, NodeId, NodeKind};
use scraper::{ElementRef, Html, Node};
use tokio::fs;

use crate::errors::{AnnotatorError, AnnotatorResult};

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Parses `source` and copies its `<body>` (attributes and subtree) into a
/// fresh arena document. Comments and doctypes are dropped.
pub fn load_document(source: &str) -> AnnotatorResult<ArenaDocument> {
    let html = Html::parse_document(source);
    let mut doc = ArenaDocument::new();
    let body = doc.body();

    let root = html.root_element();
    let source_body = root
        .children()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == "body")
        .unwrap_or(root);
    if source_body.value().name() == "body" {
        for (name, value) in source_body.value().attrs() {
            doc.set_attribute(body, name, value)?;
        }
    }

    let mut stack = Vec::new();
    for child in source_body.children().rev() {
        stack.push((child, body));
    }
    while let Some((node, parent)) = stack.pop() {
        match node.value() {
            Node::Text(text) => {
                doc.append_text(parent, &text.text)?;
            }
            Node::Element(element) if element.name() == "template" => {
                // Template contents hang off a fragment child. Only shadow
                // templates are rendered.
                if element.attr("shadowrootmode").is_some() {
                    let shadow = doc.attach_shadow(parent)?;
                    for child in node.children().rev() {
                        stack.push((child, shadow));
                    }
                } else {
                    let attrs: Vec<(&str, &str)> = element.attrs().collect();
                    doc.append_element(parent, element.name(), &attrs)?;
                }
            }
            Node::Element(element) => {
                let attrs: Vec<(&str, &str)> = element.attrs().collect();
                let target = doc.append_element(parent, element.name(), &attrs)?;
                for child in node.children().rev() {
                    stack.push((child, target));
                }
            }
            Node::Fragment => {
                for child in node.children().rev() {
                    stack.push((child, parent));
                }
            }
            _ => {}
        }
    }
    Ok(doc)
}

pub async fn load_file(path: &Path) -> AnnotatorResult<ArenaDocument> {
    let source = fs::read_to_string(path)
        .await
        .map_err(|err| AnnotatorError::read(path, err))?;
    load_document(&source)
}

enum Step {
    Enter(NodeId),
    Close(String),
    CloseShadow,
}

/// Serializes `node` and its subtree, shadow roots included.
pub fn serialize(doc: &ArenaDocument, node: NodeId) -> String {
    let mut out = String::new();
    let mut stack = vec![Step::Enter(node)];
    while let Some(step) = stack.pop() {
        let current = match step {
            Step::Enter(current) => current,
            Step::Close(tag) => {
                out.push_str("</");
                out.push_str(&tag);
                out.push('>');
                continue;
            }
            Step::CloseShadow => {
                out.push_str("</template>");
                continue;
            }
        };
        match doc.kind(current) {
            Some(NodeKind::Text) => {
                if let Some(text) = doc.text(current) {
                    escape_into(&mut out, &text, false);
                }
            }
            Some(NodeKind::Element) => {
                let tag = doc.tag_name(current).unwrap_or_default().to_string();
                out.push('<');
                out.push_str(&tag);
                for (name, value) in doc.attributes(current) {
                    out.push(' ');
                    out.push_str(&name);
                    out.push_str("=\"");
                    escape_into(&mut out, &value, true);
                    out.push('"');
                }
                out.push('>');
                if VOID_TAGS.contains(&tag.as_str()) {
                    continue;
                }
                stack.push(Step::Close(tag));
                stack.extend(doc.children(current).into_iter().rev().map(Step::Enter));
                if let Some(shadow) = doc.shadow_root(current) {
                    stack.push(Step::CloseShadow);
                    stack.extend(doc.children(shadow).into_iter().rev().map(Step::Enter));
                    out.push_str("<template shadowrootmode=\"open\">");
                }
            }
            Some(NodeKind::Fragment) => {
                stack.extend(doc.children(current).into_iter().rev().map(Step::Enter));
            }
            None => {}
        }
    }
    out
}

fn escape_into(out: &mut String, value: &str, attribute: bool) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
}
