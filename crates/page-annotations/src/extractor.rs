//! Flattens the visible text of a document and records where each piece
//! came from.

use crate::dom::{Document, NodeId, NodeKind};
use crate::policy::AnnotationPolicy;
use crate::text::{char_len, truncate_chars};

/// A node that contributed text, and the offset its text starts at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Section {
    pub node: NodeId,
    pub index: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub sections: Vec<Section>,
    /// Set when the last unit had to be shortened to fit.
    pub truncated: bool,
}

/// Walks the subtree under `root` in pre-order with an explicit stack and
/// calls `visit(node, index, text)` for every text unit. Elements contribute
/// `"\n"` (line breaks and non-inline blocks); text nodes contribute their
/// data. Traversal stops when `visit` returns `false`.
pub fn enumerate_text_units<D, F>(doc: &D, root: NodeId, policy: &AnnotationPolicy, mut visit: F)
where
    D: Document + ?Sized,
    F: FnMut(NodeId, usize, &str) -> bool,
{
    let mut stack = vec![root];
    let mut index = 0usize;

    while let Some(node) = stack.pop() {
        match doc.kind(node) {
            Some(NodeKind::Element) => {
                let tag = doc.tag_name(node).unwrap_or_default();
                if policy.is_non_text_tag(tag) {
                    continue;
                }
                if tag == "br" {
                    if !visit(node, index, "\n") {
                        break;
                    }
                    index += 1;
                    continue;
                }
                let Some(style) = doc.computed_style(node) else {
                    continue;
                };
                if style.is_invisible() {
                    continue;
                }
                if node != root && !style.display.is_inline() {
                    if !visit(node, index, "\n") {
                        break;
                    }
                    index += 1;
                }
                if policy.include_shadow_dom {
                    if let Some(shadow) = doc.shadow_root(node).filter(|shadow| *shadow != node) {
                        stack.push(shadow);
                        continue;
                    }
                }
                stack.extend(doc.children(node).into_iter().rev());
            }
            Some(NodeKind::Fragment) => {
                stack.extend(doc.children(node).into_iter().rev());
            }
            Some(NodeKind::Text) => {
                let Some(text) = doc.text(node).filter(|text| !text.is_empty()) else {
                    continue;
                };
                if !visit(node, index, &text) {
                    break;
                }
                index += char_len(&text);
            }
            None => {}
        }
    }
}

/// Extracts at most `max_chars` characters of page text together with the
/// section table used later to find the text again.
pub fn extract<D>(doc: &D, max_chars: usize, policy: &AnnotationPolicy) -> Extraction
where
    D: Document + ?Sized,
{
    let mut extraction = Extraction::default();
    if max_chars == 0 {
        return extraction;
    }

    enumerate_text_units(doc, doc.content_root(), policy, |node, index, text| {
        extraction.sections.push(Section { node, index });
        let length = char_len(text);
        if index + length > max_chars {
            extraction
                .text
                .push_str(truncate_chars(text, max_chars - index));
            extraction.truncated = true;
        } else {
            extraction.text.push_str(text);
        }
        index + length < max_chars
    });

    extraction
}
