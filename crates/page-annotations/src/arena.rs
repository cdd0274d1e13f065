//! In-memory document used by tests and by hosts without a rendering engine.
//!
//! Nodes live in generation-checked slots. Detaching a node keeps it alive
//! (it can be re-inserted); [`ArenaDocument::destroy`] frees the slot so every
//! outstanding handle stops resolving.

use std::cell::RefCell;
use std::collections::HashMap;

use annotator_core_types::Rect;

use crate::dom::{
    ComputedStyle, Display, Document, DomError, ListenerPhase, NodeId, NodeKind, ObserverId,
    PointerEvent, TapListener, Visibility,
};

const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "body",
    "dd",
    "details",
    "dialog",
    "div",
    "dl",
    "dt",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "html",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "summary",
    "ul",
];

const HIDDEN_TAGS: &[&str] = &[
    "head", "link", "meta", "script", "style", "template", "title",
];

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attrs: Vec<(String, String)>,
    style: Vec<(String, String)>,
}

impl ElementData {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn style_value(&self, property: &str) -> Option<&str> {
        self.style
            .iter()
            .find(|(key, _)| key == property)
            .map(|(_, value)| value.as_str())
    }

    fn set_style(&mut self, property: &str, value: &str) {
        let property = property.trim().to_ascii_lowercase();
        let value = value.trim();
        if value.is_empty() {
            self.style.retain(|(key, _)| *key != property);
            return;
        }
        match self.style.iter_mut().find(|(key, _)| *key == property) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.style.push((property, value.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
enum NodeData {
    Document,
    Fragment,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct ArenaNode {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
    shadow_root: Option<NodeId>,
    /// Set on shadow roots only.
    host: Option<NodeId>,
    capture: bool,
    bubble: bool,
    rect: Option<Rect>,
}

impl ArenaNode {
    fn new(data: NodeData) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            data,
            shadow_root: None,
            host: None,
            capture: false,
            bubble: false,
            rect: None,
        }
    }

    fn element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    fn can_have_children(&self) -> bool {
        !matches!(self.data, NodeData::Text(_))
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<ArenaNode>,
}

#[derive(Debug, Clone)]
pub struct ArenaDocument {
    slots: Vec<Slot>,
    free: Vec<u32>,
    document: NodeId,
    body: NodeId,
    observers: Vec<Option<usize>>,
    next_event_id: u64,
    /// Resolved inherited properties, dropped on any write.
    inherited: RefCell<HashMap<NodeId, Inherited>>,
}

#[derive(Debug, Clone)]
struct Inherited {
    visibility: Visibility,
    color: Option<String>,
}

impl Default for ArenaDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ArenaDocument {
    /// Creates a document holding an empty `<body>` content root.
    pub fn new() -> Self {
        let mut doc = Self {
            slots: Vec::new(),
            free: Vec::new(),
            document: NodeId::new(0, 0),
            body: NodeId::new(0, 0),
            observers: Vec::new(),
            next_event_id: 1,
            inherited: RefCell::new(HashMap::new()),
        };
        doc.document = doc.alloc(NodeData::Document);
        doc.body = doc.alloc(NodeData::Element(ElementData {
            tag: "body".into(),
            attrs: Vec::new(),
            style: Vec::new(),
        }));
        let (document, body) = (doc.document, doc.body);
        if let Some(node) = doc.node_mut(body) {
            node.parent = Some(document);
        }
        if let Some(root) = doc.node_mut(document) {
            root.children.push(body);
        }
        doc
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Creates an element with the given attributes and appends it to `parent`.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        attrs: &[(&str, &str)],
    ) -> Result<NodeId, DomError> {
        let node = self.create_element(tag);
        for (name, value) in attrs {
            self.set_attribute(node, name, value)?;
        }
        self.append_child(parent, node)?;
        Ok(node)
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Result<NodeId, DomError> {
        let node = self.create_text(text);
        self.append_child(parent, node)?;
        Ok(node)
    }

    /// Attaches an empty shadow root to `host` and returns it.
    pub fn attach_shadow(&mut self, host: NodeId) -> Result<NodeId, DomError> {
        if self.element(host).is_none() {
            return Err(DomError::NotAnElement(host));
        }
        let root = self.alloc(NodeData::Fragment);
        if let Some(node) = self.node_mut(root) {
            node.host = Some(host);
        }
        if let Some(node) = self.node_mut(host) {
            node.shadow_root = Some(root);
        }
        Ok(root)
    }

    /// Overwrites the character data of a text node.
    pub fn set_text_data(&mut self, node: NodeId, text: &str) -> Result<(), DomError> {
        match self.node_mut(node).map(|n| &mut n.data) {
            Some(NodeData::Text(data)) => {
                *data = text.to_string();
                Ok(())
            }
            Some(_) => Err(DomError::NotAnElement(node)),
            None => Err(DomError::StaleNode(node)),
        }
    }

    pub fn set_client_rect(&mut self, node: NodeId, rect: Rect) -> Result<(), DomError> {
        let entry = self.node_mut(node).ok_or(DomError::StaleNode(node))?;
        entry.rect = Some(rect);
        Ok(())
    }

    /// Detaches `node` and frees its whole subtree, shadow roots included.
    pub fn destroy(&mut self, node: NodeId) {
        if !self.is_alive(node) || node == self.document {
            return;
        }
        if let Some(parent) = self.parent(node) {
            let _ = self.remove_child(parent, node);
        }
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Some(slot) = self.slots.get_mut(current.index() as usize) else {
                continue;
            };
            if slot.generation != current.generation() {
                continue;
            }
            if let Some(freed) = slot.node.take() {
                stack.extend(freed.children);
                stack.extend(freed.shadow_root);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(current.index());
            }
        }
    }

    /// Connected elements with the given tag, in document order.
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        let tag = tag.to_ascii_lowercase();
        let mut found = Vec::new();
        let mut stack = vec![self.document];
        while let Some(current) = stack.pop() {
            if self.tag_name(current) == Some(tag.as_str()) {
                found.push(current);
            }
            if let Some(node) = self.node(current) {
                if let Some(shadow) = node.shadow_root {
                    stack.push(shadow);
                }
                stack.extend(node.children.iter().rev().copied());
            }
        }
        found
    }

    /// Attributes of an element in insertion order, inline style included.
    pub fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        let Some(el) = self.element(node) else {
            return Vec::new();
        };
        let mut attrs = el.attrs.clone();
        if !el.style.is_empty() {
            attrs.push(("style".to_string(), serialize_style(&el.style)));
        }
        attrs
    }

    /// Dispatches a tap and lets the page react between the two phases, the
    /// way a page's own click handler runs after capture and before the
    /// event reaches the document.
    pub fn dispatch_click_with<F>(
        &mut self,
        target: NodeId,
        listener: &mut dyn TapListener<Self>,
        page_reaction: F,
    ) -> Option<PointerEvent>
    where
        F: FnOnce(&mut Self, &mut PointerEvent),
    {
        if !self.is_alive(target) {
            return None;
        }
        // Text nodes are never event targets; their element is.
        let target = match self.kind(target) {
            Some(NodeKind::Text) => self.parent(target)?,
            _ => target,
        };

        let mut path = Vec::new();
        let mut current = Some(target);
        while let Some(node) = current {
            path.push(node);
            current = self.parent(node).or_else(|| self.host(node));
        }

        let mut event = PointerEvent::new(self.next_event_id, target);
        self.next_event_id += 1;

        for node in path.iter().rev() {
            if self.node(*node).map_or(false, |n| n.capture) {
                listener.on_capture(self, &event);
            }
        }
        page_reaction(self, &mut event);
        for node in &path {
            if self.node(*node).map_or(false, |n| n.bubble) {
                listener.on_bubble(self, &event);
            }
        }
        Some(event)
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let node = ArenaNode::new(data);
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId::new(index, 0)
    }

    fn node(&self, id: NodeId) -> Option<&ArenaNode> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut ArenaNode> {
        let inherited = self.inherited.get_mut();
        if !inherited.is_empty() {
            *inherited = HashMap::new();
        }
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
    }

    fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.node(id).and_then(ArenaNode::element)
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match self.node_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Element(el)) => Some(el),
            _ => None,
        }
    }

    fn host(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.host)
    }

    /// Element whose computed values `node` inherits.
    fn inheritance_parent(&self, node: NodeId) -> Option<NodeId> {
        let mut current = self.parent(node).or_else(|| self.host(node));
        while let Some(candidate) = current {
            if self.element(candidate).is_some() {
                return Some(candidate);
            }
            current = self.parent(candidate).or_else(|| self.host(candidate));
        }
        None
    }

    /// Resolves `visibility` and `color` for `node`. Walks up to the nearest
    /// resolved ancestor, then fills the cache top-down.
    fn inherited_values(&self, node: NodeId) -> Inherited {
        let mut resolved = Inherited {
            visibility: Visibility::Visible,
            color: None,
        };
        let mut path = Vec::new();
        {
            let cache = self.inherited.borrow();
            let mut current = Some(node);
            while let Some(id) = current {
                if let Some(hit) = cache.get(&id) {
                    resolved = hit.clone();
                    break;
                }
                path.push(id);
                current = self.inheritance_parent(id);
            }
        }

        let mut cache = self.inherited.borrow_mut();
        for id in path.into_iter().rev() {
            if let Some(element) = self.element(id) {
                if let Some(visibility) = element
                    .style_value("visibility")
                    .and_then(Visibility::from_keyword)
                {
                    resolved.visibility = visibility;
                }
                if let Some(color) = element.style_value("color") {
                    resolved.color = Some(color.to_string());
                }
            }
            cache.insert(id, resolved.clone());
        }
        resolved
    }

    /// Whether `node` is reachable from the document, through shadow hosts
    /// included.
    fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(candidate) = current {
            if candidate == self.document {
                return true;
            }
            current = self.parent(candidate).or_else(|| self.host(candidate));
        }
        false
    }

    /// Counts a child-list change of `parent`. Observers watch the document
    /// subtree only, so changes to detached nodes are not seen.
    fn record_mutation(&mut self, parent: NodeId) {
        if !self.is_connected(parent) {
            return;
        }
        for count in self.observers.iter_mut().flatten() {
            *count += 1;
        }
    }

    fn check_insertion(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        let parent_node = self.node(parent).ok_or(DomError::StaleNode(parent))?;
        if !parent_node.can_have_children() {
            return Err(DomError::CannotHaveChildren(parent));
        }
        if !self.is_alive(child) {
            return Err(DomError::StaleNode(child));
        }
        if child == self.document {
            return Err(DomError::Cycle { parent, child });
        }
        let mut cursor = Some(parent);
        while let Some(node) = cursor {
            if node == child {
                return Err(DomError::Cycle { parent, child });
            }
            cursor = self.parent(node).or_else(|| self.host(node));
        }
        Ok(())
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(old_parent) = self.parent(child) {
            if let Some(node) = self.node_mut(old_parent) {
                node.children.retain(|id| *id != child);
            }
            if let Some(node) = self.node_mut(child) {
                node.parent = None;
            }
            self.record_mutation(old_parent);
        }
    }
}

impl Document for ArenaDocument {
    fn document_node(&self) -> NodeId {
        self.document
    }

    fn content_root(&self) -> NodeId {
        self.body
    }

    fn is_alive(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.node(node).map(|n| match n.data {
            NodeData::Element(_) => NodeKind::Element,
            NodeData::Text(_) => NodeKind::Text,
            NodeData::Document | NodeData::Fragment => NodeKind::Fragment,
        })
    }

    fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|el| el.tag.as_str())
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|n| n.parent)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn shadow_root(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|n| n.shadow_root)
    }

    fn text(&self, node: NodeId) -> Option<String> {
        match self.node(node).map(|n| &n.data) {
            Some(NodeData::Text(text)) => Some(text.clone()),
            _ => None,
        }
    }

    fn computed_style(&self, node: NodeId) -> Option<ComputedStyle> {
        let el = self.element(node)?;
        let display = match el.style_value("display") {
            Some(value) => Display::from_keyword(value),
            None if el.attr("hidden").is_some() => Display::None,
            None => default_display(&el.tag),
        };

        let Inherited { visibility, color } = self.inherited_values(node);
        Some(ComputedStyle {
            display,
            visibility,
            color,
        })
    }

    fn client_rect(&self, node: NodeId) -> Option<Rect> {
        self.node(node).and_then(|n| n.rect)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let el = self.element(node)?;
        if name.eq_ignore_ascii_case("style") {
            return (!el.style.is_empty()).then(|| serialize_style(&el.style));
        }
        el.attr(&name.to_ascii_lowercase()).map(str::to_string)
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let el = self.element_mut(node).ok_or(DomError::NotAnElement(node))?;
        let name = name.to_ascii_lowercase();
        if name == "style" {
            el.style = parse_style(value);
            return Ok(());
        }
        match el.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => el.attrs.push((name, value.to_string())),
        }
        Ok(())
    }

    fn style_property(&self, node: NodeId, property: &str) -> Option<String> {
        self.element(node)
            .and_then(|el| el.style_value(&property.to_ascii_lowercase()))
            .map(str::to_string)
    }

    fn set_style_property(
        &mut self,
        node: NodeId,
        property: &str,
        value: &str,
    ) -> Result<(), DomError> {
        let el = self.element_mut(node).ok_or(DomError::NotAnElement(node))?;
        el.set_style(property, value);
        Ok(())
    }

    fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            style: Vec::new(),
        }))
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    fn set_text_content(&mut self, node: NodeId, text: &str) -> Result<(), DomError> {
        let entry = self.node_mut(node).ok_or(DomError::StaleNode(node))?;
        if let NodeData::Text(data) = &mut entry.data {
            *data = text.to_string();
            return Ok(());
        }
        let old_children = std::mem::take(&mut entry.children);
        let had_children = !old_children.is_empty();
        for child in old_children {
            if let Some(child_node) = self.node_mut(child) {
                child_node.parent = None;
            }
        }
        if !text.is_empty() {
            let text_node = self.create_text(text);
            if let Some(child_node) = self.node_mut(text_node) {
                child_node.parent = Some(node);
            }
            if let Some(parent_node) = self.node_mut(node) {
                parent_node.children.push(text_node);
            }
        }
        if had_children || !text.is_empty() {
            self.record_mutation(node);
        }
        Ok(())
    }

    fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> Result<(), DomError> {
        self.check_insertion(parent, child)?;
        if self.parent(reference) != Some(parent) {
            return Err(DomError::NotAChild {
                parent,
                child: reference,
            });
        }
        if child == reference {
            return Ok(());
        }
        self.detach(child);
        let siblings = &mut self
            .node_mut(parent)
            .ok_or(DomError::StaleNode(parent))?
            .children;
        let position = siblings
            .iter()
            .position(|id| *id == reference)
            .ok_or(DomError::NotAChild {
                parent,
                child: reference,
            })?;
        siblings.insert(position, child);
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        self.record_mutation(parent);
        Ok(())
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.check_insertion(parent, child)?;
        self.detach(child);
        self.node_mut(parent)
            .ok_or(DomError::StaleNode(parent))?
            .children
            .push(child);
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        self.record_mutation(parent);
        Ok(())
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if !self.is_alive(child) {
            return Err(DomError::StaleNode(child));
        }
        if self.parent(child) != Some(parent) {
            return Err(DomError::NotAChild { parent, child });
        }
        self.detach(child);
        Ok(())
    }

    fn add_listener(&mut self, node: NodeId, phase: ListenerPhase) -> Result<(), DomError> {
        let entry = self.node_mut(node).ok_or(DomError::StaleNode(node))?;
        match phase {
            ListenerPhase::Capture => entry.capture = true,
            ListenerPhase::Bubble => entry.bubble = true,
        }
        Ok(())
    }

    fn remove_listener(&mut self, node: NodeId, phase: ListenerPhase) {
        if let Some(entry) = self.node_mut(node) {
            match phase {
                ListenerPhase::Capture => entry.capture = false,
                ListenerPhase::Bubble => entry.bubble = false,
            }
        }
    }

    fn dispatch_click(
        &mut self,
        target: NodeId,
        listener: &mut dyn TapListener<Self>,
    ) -> Option<PointerEvent> {
        self.dispatch_click_with(target, listener, |_, _| {})
    }

    fn observe_mutations(&mut self) -> ObserverId {
        if let Some(index) = self.observers.iter().position(Option::is_none) {
            self.observers[index] = Some(0);
            return ObserverId(index as u32);
        }
        self.observers.push(Some(0));
        ObserverId((self.observers.len() - 1) as u32)
    }

    fn mutation_count(&self, observer: ObserverId) -> usize {
        self.observers
            .get(observer.0 as usize)
            .copied()
            .flatten()
            .unwrap_or(0)
    }

    fn disconnect(&mut self, observer: ObserverId) {
        if let Some(slot) = self.observers.get_mut(observer.0 as usize) {
            *slot = None;
        }
    }
}

fn default_display(tag: &str) -> Display {
    if HIDDEN_TAGS.contains(&tag) {
        Display::None
    } else if tag == "li" {
        Display::ListItem
    } else if tag == "table" {
        Display::Table
    } else if BLOCK_TAGS.contains(&tag) {
        Display::Block
    } else {
        Display::Inline
    }
}

fn parse_style(raw: &str) -> Vec<(String, String)> {
    let mut declarations: Vec<(String, String)> = Vec::new();
    for declaration in raw.split(';') {
        let Some((property, value)) = declaration.split_once(':') else {
            continue;
        };
        let property = property.trim().to_ascii_lowercase();
        let value = value.trim();
        if property.is_empty() || value.is_empty() {
            continue;
        }
        match declarations.iter_mut().find(|(key, _)| *key == property) {
            Some(entry) => entry.1 = value.to_string(),
            None => declarations.push((property, value.to_string())),
        }
    }
    declarations
}

fn serialize_style(style: &[(String, String)]) -> String {
    style
        .iter()
        .map(|(property, value)| format!("{property}: {value}"))
        .collect::<Vec<_>>()
        .join("; ")
}
