//! Capability surface the annotator needs from a live document.
//!
//! Node handles are generation-checked: once a backend frees a node, every
//! handle to it stops resolving instead of dangling. "Not found" is a normal
//! outcome for every lookup here, never an error.

use std::fmt;

use annotator_core_types::Rect;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    /// Document, document fragment or shadow root: children but no tag.
    Fragment,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Display {
    None,
    Inline,
    Block,
    InlineBlock,
    ListItem,
    Flex,
    Grid,
    Table,
    Contents,
    Other(String),
}

impl Display {
    pub fn from_keyword(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Display::None,
            "inline" => Display::Inline,
            "block" => Display::Block,
            "inline-block" => Display::InlineBlock,
            "list-item" => Display::ListItem,
            "flex" => Display::Flex,
            "grid" => Display::Grid,
            "table" => Display::Table,
            "contents" => Display::Contents,
            other => Display::Other(other.to_string()),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Display::Inline)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
    Collapse,
}

impl Visibility {
    pub fn from_keyword(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "visible" => Some(Visibility::Visible),
            "hidden" => Some(Visibility::Hidden),
            "collapse" => Some(Visibility::Collapse),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputedStyle {
    pub display: Display,
    pub visibility: Visibility,
    pub color: Option<String>,
}

impl ComputedStyle {
    pub fn is_invisible(&self) -> bool {
        self.display == Display::None || self.visibility == Visibility::Hidden
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListenerPhase {
    Capture,
    Bubble,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u32);

/// A click/tap travelling through the document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointerEvent {
    pub id: u64,
    pub target: NodeId,
    pub default_prevented: bool,
}

impl PointerEvent {
    pub fn new(id: u64, target: NodeId) -> Self {
        Self {
            id,
            target,
            default_prevented: false,
        }
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("node {0} no longer exists")]
    StaleNode(NodeId),
    #[error("node {child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },
    #[error("node {0} is not an element")]
    NotAnElement(NodeId),
    #[error("node {0} cannot have children")]
    CannotHaveChildren(NodeId),
    #[error("inserting {child} under {parent} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },
}

/// Receives the two phases of a dispatched tap. One object is registered for
/// both phases so it can pair the capture-phase arming with the bubble-phase
/// decision.
pub trait TapListener<D: ?Sized> {
    fn on_capture(&mut self, doc: &mut D, event: &PointerEvent);
    fn on_bubble(&mut self, doc: &mut D, event: &PointerEvent);
}

pub trait Document {
    /// The document node itself; document-level listeners hang here.
    fn document_node(&self) -> NodeId;
    /// Root of the content subtree (the body).
    fn content_root(&self) -> NodeId;

    fn is_alive(&self, node: NodeId) -> bool;
    fn kind(&self, node: NodeId) -> Option<NodeKind>;
    /// Lower-case tag name for elements.
    fn tag_name(&self, node: NodeId) -> Option<&str>;
    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn children(&self, node: NodeId) -> Vec<NodeId>;
    fn shadow_root(&self, node: NodeId) -> Option<NodeId>;
    /// Character data of a text node.
    fn text(&self, node: NodeId) -> Option<String>;
    fn computed_style(&self, node: NodeId) -> Option<ComputedStyle>;
    fn client_rect(&self, node: NodeId) -> Option<Rect>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;
    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError>;
    fn style_property(&self, node: NodeId, property: &str) -> Option<String>;
    /// Sets one inline style property; an empty value removes it.
    fn set_style_property(
        &mut self,
        node: NodeId,
        property: &str,
        value: &str,
    ) -> Result<(), DomError>;

    fn create_element(&mut self, tag: &str) -> NodeId;
    fn create_text(&mut self, text: &str) -> NodeId;
    /// Replaces all children of `node` with a single text node.
    fn set_text_content(&mut self, node: NodeId, text: &str) -> Result<(), DomError>;
    fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> Result<(), DomError>;
    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError>;
    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError>;

    fn add_listener(&mut self, node: NodeId, phase: ListenerPhase) -> Result<(), DomError>;
    fn remove_listener(&mut self, node: NodeId, phase: ListenerPhase);
    /// Dispatches a tap on `target`: capture listeners top-down, then bubble
    /// listeners bottom-up, both on the path computed at dispatch time.
    fn dispatch_click(
        &mut self,
        target: NodeId,
        listener: &mut dyn TapListener<Self>,
    ) -> Option<PointerEvent>;

    /// Starts counting subtree-wide child-list mutations. Attribute and style
    /// changes are not counted.
    fn observe_mutations(&mut self) -> ObserverId;
    fn mutation_count(&self, observer: ObserverId) -> usize;
    fn disconnect(&mut self, observer: ObserverId);

    fn has_ancestor_tag(&self, node: NodeId, tag: &str) -> bool {
        let mut current = self.parent(node);
        while let Some(ancestor) = current {
            if self.tag_name(ancestor) == Some(tag) {
                return true;
            }
            current = self.parent(ancestor);
        }
        false
    }

    fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            match self.kind(current) {
                Some(NodeKind::Text) => {
                    if let Some(text) = self.text(current) {
                        out.push_str(&text);
                    }
                }
                Some(_) => {
                    for child in self.children(current).into_iter().rev() {
                        stack.push(child);
                    }
                }
                None => {}
            }
        }
        out
    }
}
