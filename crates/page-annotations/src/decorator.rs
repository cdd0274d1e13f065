//! Locates annotations in the live document through the section table and
//! wraps each matching window in an annotation element.
//!
//! The walk revisits exactly the nodes recorded at extraction time, so pages
//! that changed in between degrade into per-annotation failures rather than
//! misplaced decorations. Every substitution is recorded as a [`Decoration`]
//! and can be reversed with [`remove_decorations`].

use annotator_core_types::{Annotation, LogReason};
use tracing::{debug, warn};

use crate::dom::{Document, ListenerPhase, NodeId, NodeKind};
use crate::errors::AnnotationError;
use crate::extractor::Section;
use crate::normalizer::normalize;
use crate::policy::AnnotationPolicy;
use crate::text::{char_len, char_slice};

pub const ATTR_INDEX: &str = "data-index";
pub const ATTR_DATA: &str = "data-data";
pub const ATTR_ANNOTATION: &str = "data-annotation";
pub const ATTR_TYPE: &str = "data-type";

const LINK_TAG: &str = "a";

/// One annotation's window inside one node, in node-local characters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replacement {
    pub annotation_index: usize,
    pub left: usize,
    pub right: usize,
    pub text: String,
    pub kind: String,
    pub annotation_text: String,
    pub data: String,
}

/// `original` was taken out of its parent and replaced, in place, by
/// `replacements`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decoration {
    pub original: NodeId,
    pub replacements: Vec<NodeId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub reason: LogReason,
    pub annotation_text: String,
    pub node_text: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecorateReport {
    pub successes: usize,
    /// Number of annotations received, invalid and overlapping ones included.
    pub total: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl DecorateReport {
    pub fn failures(&self) -> usize {
        self.total - self.successes
    }
}

#[derive(Clone, Debug, Default)]
pub struct DecorateOutcome {
    pub decorations: Vec<Decoration>,
    pub report: DecorateReport,
}

#[derive(Clone, Copy, Debug, Default)]
struct Progress {
    consumed: bool,
    failed: bool,
}

/// Decorates `annotations` over the nodes listed in `sections`.
///
/// An annotation counts as a success when the walk consumed it completely,
/// none of its windows mismatched and every window it had in a text node was
/// applied. Each annotation is counted once, whichever way it failed.
pub fn decorate<D>(
    doc: &mut D,
    sections: &[Section],
    annotations: Vec<Annotation>,
    policy: &AnnotationPolicy,
) -> DecorateOutcome
where
    D: Document + ?Sized,
{
    let total = annotations.len();
    let mut annotations: Vec<Annotation> = annotations
        .into_iter()
        .filter(|annotation| match annotation.validate() {
            Ok(()) => true,
            Err(err) => {
                debug!(target: "annotations.decorator", error = %err, "dropping annotation");
                false
            }
        })
        .collect();
    let overlapping = normalize(&mut annotations);
    if overlapping > 0 {
        debug!(target: "annotations.decorator", overlapping, "dropped overlapping annotations");
    }

    let count = annotations.len();
    let mut progress = vec![Progress::default(); count];
    let mut diagnostics = Vec::new();
    let mut decorations = Vec::new();
    let mut cursor = 0usize;

    for section in sections {
        if cursor >= count {
            break;
        }
        let node = section.node;
        let Some(text) = section_text(&*doc, node) else {
            continue;
        };
        if doc.parent(node).is_none() {
            continue;
        }

        // Annotations ending before this section were never found, typically
        // because their nodes were removed after extraction.
        while cursor < count && annotations[cursor].end <= section.index {
            progress[cursor].failed = true;
            diagnostics.push(Diagnostic {
                reason: LogReason::Skipping,
                annotation_text: annotations[cursor].text.clone(),
                node_text: None,
            });
            cursor += 1;
        }

        let length = char_len(&text);
        let mut replacements = Vec::new();
        while cursor < count {
            let annotation = &annotations[cursor];
            if !(section.index < annotation.end && section.index + length > annotation.start) {
                break;
            }
            let left = annotation.start.saturating_sub(section.index);
            let right = length.min(annotation.end - section.index);
            let node_text = char_slice(&text, left, right);
            let annotation_left = section.index.saturating_sub(annotation.start);
            let annotation_right =
                (annotation.end - annotation.start).min(section.index + length - annotation.start);
            let expected = char_slice(&annotation.text, annotation_left, annotation_right);

            if node_text != expected {
                progress[cursor].failed = true;
                diagnostics.push(Diagnostic {
                    reason: LogReason::Mismatch,
                    annotation_text: expected.to_string(),
                    node_text: Some(node_text.to_string()),
                });
                cursor += 1;
                continue;
            }

            replacements.push(Replacement {
                annotation_index: cursor,
                left,
                right,
                text: node_text.to_string(),
                kind: annotation.kind.clone(),
                annotation_text: annotation.text.clone(),
                data: annotation.data.clone(),
            });
            if annotation.end <= section.index + length {
                progress[cursor].consumed = true;
                cursor += 1;
                continue;
            }
            break;
        }

        // Separators only take part in matching.
        if replacements.is_empty() || doc.kind(node) != Some(NodeKind::Text) {
            continue;
        }

        // Checked after matching so the cursor stays in step with the text.
        if doc.has_ancestor_tag(node, LINK_TAG) {
            for replacement in &replacements {
                let state = &mut progress[replacement.annotation_index];
                if !state.failed {
                    state.failed = true;
                    diagnostics.push(Diagnostic {
                        reason: LogReason::Link,
                        annotation_text: replacement.annotation_text.clone(),
                        node_text: Some(replacement.text.clone()),
                    });
                }
            }
            continue;
        }

        match split_node(doc, node, &text, &replacements, policy) {
            Ok(fragments) => decorations.push(Decoration {
                original: node,
                replacements: fragments,
            }),
            Err(err) => {
                warn!(target: "annotations.decorator", %node, error = %err, "failed to split node");
                for replacement in &replacements {
                    progress[replacement.annotation_index].failed = true;
                }
            }
        }
    }

    let successes = progress
        .iter()
        .filter(|state| state.consumed && !state.failed)
        .count();

    DecorateOutcome {
        decorations,
        report: DecorateReport {
            successes,
            total,
            diagnostics,
        },
    }
}

/// Text a section stands for right now: `"\n"` for elements, current data for
/// text nodes. `None` when the node is gone or empty.
fn section_text<D>(doc: &D, node: NodeId) -> Option<String>
where
    D: Document + ?Sized,
{
    match doc.kind(node)? {
        NodeKind::Element => Some("\n".to_string()),
        NodeKind::Text => doc.text(node).filter(|text| !text.is_empty()),
        NodeKind::Fragment => None,
    }
}

/// Replaces `node` by plain text and annotation elements. On failure every
/// inserted part is taken out again and the original stays in place.
fn split_node<D>(
    doc: &mut D,
    node: NodeId,
    text: &str,
    replacements: &[Replacement],
    policy: &AnnotationPolicy,
) -> Result<Vec<NodeId>, AnnotationError>
where
    D: Document + ?Sized,
{
    let parent = doc.parent(node).ok_or(AnnotationError::Detached(node))?;
    let border_color = doc
        .computed_style(parent)
        .and_then(|style| style.color)
        .unwrap_or_else(|| policy.fallback_border_color.clone());

    let mut parts = Vec::with_capacity(replacements.len() * 2 + 1);
    let mut offset = 0;
    for replacement in replacements {
        if replacement.left > offset {
            parts.push(doc.create_text(char_slice(text, offset, replacement.left)));
        }
        parts.push(annotation_element(doc, replacement, &border_color, policy)?);
        offset = replacement.right;
    }
    let length = char_len(text);
    if offset < length {
        parts.push(doc.create_text(char_slice(text, offset, length)));
    }

    let mut inserted = Vec::with_capacity(parts.len());
    for part in &parts {
        if let Err(err) = doc.insert_before(parent, *part, node) {
            rollback(doc, parent, &inserted);
            return Err(err.into());
        }
        inserted.push(*part);
    }
    if let Err(err) = doc.remove_child(parent, node) {
        rollback(doc, parent, &inserted);
        return Err(err.into());
    }
    Ok(parts)
}

fn annotation_element<D>(
    doc: &mut D,
    replacement: &Replacement,
    border_color: &str,
    policy: &AnnotationPolicy,
) -> Result<NodeId, AnnotationError>
where
    D: Document + ?Sized,
{
    let element = doc.create_element(&policy.element_tag);
    doc.set_attribute(element, ATTR_INDEX, &replacement.annotation_index.to_string())?;
    doc.set_attribute(element, ATTR_DATA, &replacement.data)?;
    doc.set_attribute(element, ATTR_ANNOTATION, &replacement.annotation_text)?;
    doc.set_attribute(element, ATTR_TYPE, &replacement.kind)?;
    doc.set_attribute(element, "style", &policy.decoration_style)?;
    doc.set_style_property(element, "border-bottom-color", border_color)?;
    doc.set_text_content(element, &replacement.text)?;
    doc.add_listener(element, ListenerPhase::Capture)?;
    Ok(element)
}

fn rollback<D>(doc: &mut D, parent: NodeId, inserted: &[NodeId])
where
    D: Document + ?Sized,
{
    for part in inserted {
        let _ = doc.remove_child(parent, *part);
    }
}

/// Puts every original node back where its fragments are and removes the
/// fragments. Decorations whose fragments the page already detached are
/// skipped. The list is always left empty. Returns how many nodes were
/// restored.
pub fn remove_decorations<D>(doc: &mut D, decorations: &mut Vec<Decoration>) -> usize
where
    D: Document + ?Sized,
{
    let mut restored = 0;
    for decoration in decorations.drain(..) {
        let Some(&first) = decoration.replacements.first() else {
            continue;
        };
        let Some(parent) = doc.parent(first) else {
            debug!(target: "annotations.decorator", original = %decoration.original, "fragments detached, skipping restore");
            continue;
        };
        if let Err(err) = doc.insert_before(parent, decoration.original, first) {
            warn!(target: "annotations.decorator", original = %decoration.original, error = %err, "failed to restore node");
            continue;
        }
        for replacement in &decoration.replacements {
            if doc.parent(*replacement) == Some(parent) {
                let _ = doc.remove_child(parent, *replacement);
            }
        }
        restored += 1;
    }
    restored
}

/// Applies highlight colors to every fragment of annotation `index`. Returns
/// the number of fragments highlighted.
pub fn highlight<D>(
    doc: &mut D,
    decorations: &[Decoration],
    index: usize,
    policy: &AnnotationPolicy,
) -> usize
where
    D: Document + ?Sized,
{
    let wanted = index.to_string();
    let mut count = 0;
    for element in annotation_elements(&*doc, decorations, policy) {
        if doc.attribute(element, ATTR_INDEX).as_deref() != Some(wanted.as_str()) {
            continue;
        }
        let applied = doc
            .set_style_property(element, "color", &policy.highlight_text_color)
            .and_then(|_| {
                doc.set_style_property(
                    element,
                    "background-color",
                    &policy.highlight_background_color,
                )
            });
        if applied.is_ok() {
            count += 1;
        }
    }
    count
}

/// Clears highlight colors on every fragment; the fragments stay.
pub fn remove_highlight<D>(doc: &mut D, decorations: &[Decoration], policy: &AnnotationPolicy)
where
    D: Document + ?Sized,
{
    for element in annotation_elements(&*doc, decorations, policy) {
        let _ = doc.set_style_property(element, "color", "");
        let _ = doc.set_style_property(element, "background-color", "transparent");
    }
}

fn annotation_elements<D>(
    doc: &D,
    decorations: &[Decoration],
    policy: &AnnotationPolicy,
) -> Vec<NodeId>
where
    D: Document + ?Sized,
{
    decorations
        .iter()
        .flat_map(|decoration| decoration.replacements.iter().copied())
        .filter(|node| doc.tag_name(*node) == Some(policy.element_tag.as_str()))
        .collect()
}

/// Parses the annotation index stored on a fragment.
pub fn annotation_index<D>(doc: &D, element: NodeId) -> Option<usize>
where
    D: Document + ?Sized,
{
    doc.attribute(element, ATTR_INDEX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaDocument;
    use crate::extractor::extract;

    fn policy() -> AnnotationPolicy {
        AnnotationPolicy::default()
    }

    fn annotation(start: usize, end: usize, text: &str, data: &str) -> Annotation {
        Annotation::new(start, end, text, "t", data)
    }

    #[test]
    fn wraps_annotated_window() {
        let mut doc = ArenaDocument::new();
        let body = doc.body();
        let text = doc.append_text(body, "Hello world").unwrap();
        let sections = extract(&doc, 100, &policy()).sections;

        let outcome = decorate(
            &mut doc,
            &sections,
            vec![annotation(0, 5, "Hello", "d1")],
            &policy(),
        );
        assert_eq!(outcome.report.successes, 1);
        assert_eq!(outcome.report.total, 1);
        assert_eq!(outcome.decorations.len(), 1);
        assert_eq!(outcome.decorations[0].original, text);

        let children = doc.children(body);
        assert_eq!(children.len(), 2);
        assert_eq!(doc.tag_name(children[0]), Some("page-annotation"));
        assert_eq!(doc.text_content(children[0]), "Hello");
        assert_eq!(doc.attribute(children[0], ATTR_INDEX).as_deref(), Some("0"));
        assert_eq!(doc.attribute(children[0], ATTR_DATA).as_deref(), Some("d1"));
        assert_eq!(
            doc.attribute(children[0], ATTR_ANNOTATION).as_deref(),
            Some("Hello")
        );
        assert_eq!(
            doc.style_property(children[0], "border-bottom-color").as_deref(),
            Some("blue")
        );
        assert_eq!(doc.text(children[1]).as_deref(), Some(" world"));
        assert!(doc.parent(text).is_none());
    }

    #[test]
    fn border_follows_parent_color() {
        let mut doc = ArenaDocument::new();
        let body = doc.body();
        let p = doc.append_element(body, "p", &[("style", "color: red")]).unwrap();
        doc.append_text(p, "abc").unwrap();
        let sections = extract(&doc, 100, &policy()).sections;

        // "\nabc": the text starts at offset 1.
        let outcome = decorate(&mut doc, &sections, vec![annotation(2, 3, "b", "")], &policy());
        assert_eq!(outcome.report.successes, 1);
        let element = doc.elements_by_tag("page-annotation")[0];
        assert_eq!(
            doc.style_property(element, "border-bottom-color").as_deref(),
            Some("red")
        );
        assert_eq!(
            doc.style_property(element, "border-bottom-style").as_deref(),
            Some("dotted")
        );
    }

    #[test]
    fn several_annotations_in_one_node() {
        let mut doc = ArenaDocument::new();
        let body = doc.body();
        doc.append_text(body, "one two three").unwrap();
        let sections = extract(&doc, 100, &policy()).sections;

        let outcome = decorate(
            &mut doc,
            &sections,
            vec![annotation(8, 13, "three", "c"), annotation(0, 3, "one", "a")],
            &policy(),
        );
        assert_eq!(outcome.report.successes, 2);
        let texts: Vec<String> = doc
            .children(body)
            .into_iter()
            .map(|node| doc.text_content(node))
            .collect();
        assert_eq!(texts, vec!["one", " two ", "three"]);
    }

    #[test]
    fn annotation_spanning_nodes_is_split() {
        let mut doc = ArenaDocument::new();
        let body = doc.body();
        doc.append_text(body, "Hello ").unwrap();
        let b = doc.append_element(body, "b", &[]).unwrap();
        doc.append_text(b, "world").unwrap();
        let sections = extract(&doc, 100, &policy()).sections;

        let outcome = decorate(
            &mut doc,
            &sections,
            vec![annotation(3, 9, "lo wor", "x")],
            &policy(),
        );
        assert_eq!(outcome.report.successes, 1);
        assert_eq!(outcome.decorations.len(), 2);
        let fragments = doc.elements_by_tag("page-annotation");
        assert_eq!(fragments.len(), 2);
        assert_eq!(doc.text_content(fragments[0]), "lo ");
        assert_eq!(doc.text_content(fragments[1]), "wor");
        assert_eq!(doc.text_content(body), "Hello world");
    }

    #[test]
    fn mismatch_fails_only_the_drifted_annotation() {
        let mut doc = ArenaDocument::new();
        let body = doc.body();
        let text = doc.append_text(body, "Hello world").unwrap();
        let sections = extract(&doc, 100, &policy()).sections;
        doc.set_text_data(text, "Jello world").unwrap();

        let outcome = decorate(
            &mut doc,
            &sections,
            vec![annotation(0, 5, "Hello", "a"), annotation(6, 11, "world", "b")],
            &policy(),
        );
        assert_eq!(outcome.report.successes, 1);
        assert_eq!(outcome.report.failures(), 1);
        assert_eq!(
            outcome.report.diagnostics,
            vec![Diagnostic {
                reason: LogReason::Mismatch,
                annotation_text: "Hello".into(),
                node_text: Some("Jello".into()),
            }]
        );
        let fragments = doc.elements_by_tag("page-annotation");
        assert_eq!(fragments.len(), 1);
        assert_eq!(doc.text_content(fragments[0]), "world");
    }

    #[test]
    fn links_are_left_alone() {
        let mut doc = ArenaDocument::new();
        let body = doc.body();
        let link = doc.append_element(body, "a", &[("href", "/x")]).unwrap();
        let text = doc.append_text(link, "click here").unwrap();
        let sections = extract(&doc, 100, &policy()).sections;

        let outcome = decorate(&mut doc, &sections, vec![annotation(0, 5, "click", "")], &policy());
        assert_eq!(outcome.report.successes, 0);
        assert_eq!(outcome.report.total, 1);
        assert!(outcome.decorations.is_empty());
        assert_eq!(outcome.report.diagnostics[0].reason, LogReason::Link);
        assert_eq!(doc.children(link), vec![text]);
    }

    #[test]
    fn removed_node_skips_its_annotations_once() {
        let mut doc = ArenaDocument::new();
        let body = doc.body();
        let first = doc.append_element(body, "span", &[]).unwrap();
        doc.append_text(first, "gone").unwrap();
        doc.append_text(body, " kept").unwrap();
        let sections = extract(&doc, 100, &policy()).sections;
        doc.destroy(first);

        let outcome = decorate(
            &mut doc,
            &sections,
            vec![annotation(0, 4, "gone", "a"), annotation(5, 9, "kept", "b")],
            &policy(),
        );
        assert_eq!(outcome.report.total, 2);
        assert_eq!(outcome.report.successes, 1);
        assert_eq!(outcome.report.failures(), 1);
        assert_eq!(outcome.report.diagnostics.len(), 1);
        assert_eq!(outcome.report.diagnostics[0].reason, LogReason::Skipping);
    }

    #[test]
    fn unreached_and_invalid_annotations_fail() {
        let mut doc = ArenaDocument::new();
        let body = doc.body();
        doc.append_text(body, "short").unwrap();
        let sections = extract(&doc, 100, &policy()).sections;

        let outcome = decorate(
            &mut doc,
            &sections,
            vec![
                annotation(0, 5, "short", "a"),
                annotation(20, 25, "later", "b"),
                annotation(3, 3, "", "empty"),
                annotation(2, 4, "or", "overlap"),
            ],
            &policy(),
        );
        assert_eq!(outcome.report.total, 4);
        assert_eq!(outcome.report.successes, 1);
    }

    #[test]
    fn remove_restores_original_nodes() {
        let mut doc = ArenaDocument::new();
        let body = doc.body();
        let before = doc.append_text(body, "Hello world").unwrap();
        let after = doc.append_element(body, "span", &[]).unwrap();
        let sections = extract(&doc, 100, &policy()).sections;

        let mut outcome = decorate(
            &mut doc,
            &sections,
            vec![annotation(2, 4, "ll", "a"), annotation(6, 11, "world", "b")],
            &policy(),
        );
        assert_eq!(doc.children(body).len(), 5);

        let restored = remove_decorations(&mut doc, &mut outcome.decorations);
        assert_eq!(restored, 1);
        assert!(outcome.decorations.is_empty());
        assert_eq!(doc.children(body), vec![before, after]);
        assert_eq!(doc.text(before).as_deref(), Some("Hello world"));

        assert_eq!(remove_decorations(&mut doc, &mut outcome.decorations), 0);
    }

    #[test]
    fn remove_skips_fragments_detached_by_the_page() {
        let mut doc = ArenaDocument::new();
        let body = doc.body();
        let first = doc.append_element(body, "span", &[]).unwrap();
        doc.append_text(first, "abc").unwrap();
        let second = doc.append_element(body, "span", &[]).unwrap();
        let kept = doc.append_text(second, "def").unwrap();
        let sections = extract(&doc, 100, &policy()).sections;

        let mut outcome = decorate(
            &mut doc,
            &sections,
            vec![annotation(0, 1, "a", ""), annotation(3, 4, "d", "")],
            &policy(),
        );
        assert_eq!(outcome.decorations.len(), 2);
        doc.set_text_content(first, "replaced").unwrap();

        let restored = remove_decorations(&mut doc, &mut outcome.decorations);
        assert_eq!(restored, 1);
        assert!(outcome.decorations.is_empty());
        assert_eq!(doc.children(second), vec![kept]);
    }

    #[test]
    fn highlight_groups_by_index() {
        let mut doc = ArenaDocument::new();
        let body = doc.body();
        doc.append_text(body, "ab ").unwrap();
        let i = doc.append_element(body, "i", &[]).unwrap();
        doc.append_text(i, "cd").unwrap();
        doc.append_text(body, " ef").unwrap();
        let sections = extract(&doc, 100, &policy()).sections;

        let outcome = decorate(
            &mut doc,
            &sections,
            vec![annotation(1, 4, "b c", "x"), annotation(6, 8, "ef", "y")],
            &policy(),
        );
        assert_eq!(outcome.report.successes, 2);

        let lit = highlight(&mut doc, &outcome.decorations, 0, &policy());
        assert_eq!(lit, 2);
        let fragments = doc.elements_by_tag("page-annotation");
        assert_eq!(fragments.len(), 3);
        assert_eq!(doc.style_property(fragments[0], "color").as_deref(), Some("#000"));
        assert_eq!(
            doc.style_property(fragments[1], "background-color").as_deref(),
            Some("rgba(20,111,225,0.25)")
        );
        assert_eq!(doc.style_property(fragments[2], "color"), None);

        remove_highlight(&mut doc, &outcome.decorations, &policy());
        assert_eq!(doc.style_property(fragments[0], "color"), None);
        assert_eq!(
            doc.style_property(fragments[0], "background-color").as_deref(),
            Some("transparent")
        );
        assert_eq!(doc.children(body).len(), 5);
    }
}
