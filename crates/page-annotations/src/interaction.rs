//! Tap handling on annotation fragments.
//!
//! A tap is armed in the capture phase, when it first reaches an annotation
//! element, and decided when the same event bubbles up to the document. The
//! page gets to react in between; if it prevented the default action,
//! re-dispatched, or changed the DOM, the tap is vetoed so the annotation does
//! not race the page's own navigation or script.

use annotator_core_types::Rect;
use tracing::trace;

use crate::decorator::{annotation_index, ATTR_ANNOTATION, ATTR_DATA};
use crate::dom::{Document, NodeId, ObserverId, PointerEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TapState {
    Idle,
    Armed,
}

/// Pairs the arming event with a mutation observer started at arming time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MutationGuard {
    event_id: u64,
    observer: ObserverId,
}

impl MutationGuard {
    fn arm<D>(doc: &mut D, event: &PointerEvent) -> Self
    where
        D: Document + ?Sized,
    {
        Self {
            event_id: event.id,
            observer: doc.observe_mutations(),
        }
    }

    fn veto<D>(&self, doc: &D, event: &PointerEvent) -> Option<VetoReason>
    where
        D: Document + ?Sized,
    {
        if event.id != self.event_id {
            return Some(VetoReason::EventMismatch);
        }
        if event.default_prevented {
            return Some(VetoReason::DefaultPrevented);
        }
        match doc.mutation_count(self.observer) {
            0 => None,
            count => Some(VetoReason::Mutations(count)),
        }
    }

    fn disconnect<D>(self, doc: &mut D)
    where
        D: Document + ?Sized,
    {
        doc.disconnect(self.observer);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VetoReason {
    /// The bubbling event is not the one that armed the guard.
    EventMismatch,
    DefaultPrevented,
    /// Child-list mutations seen while the event was in flight.
    Mutations(usize),
}

/// What the host is told about a resolved tap.
#[derive(Clone, Debug, PartialEq)]
pub struct TapReport {
    pub element: NodeId,
    pub index: usize,
    pub data: String,
    pub text: String,
    pub rect: Option<Rect>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TapOutcome {
    Resolved(TapReport),
    Vetoed(VetoReason),
    /// Nothing was armed, or the event did not target an annotation.
    Ignored,
}

#[derive(Debug)]
pub struct InteractionHandler {
    guard: Option<MutationGuard>,
    element_tag: String,
}

impl InteractionHandler {
    pub fn new(element_tag: impl Into<String>) -> Self {
        Self {
            guard: None,
            element_tag: element_tag.into(),
        }
    }

    pub fn state(&self) -> TapState {
        if self.guard.is_some() {
            TapState::Armed
        } else {
            TapState::Idle
        }
    }

    fn is_annotation<D>(&self, doc: &D, node: NodeId) -> bool
    where
        D: Document + ?Sized,
    {
        doc.tag_name(node) == Some(self.element_tag.as_str())
    }

    /// Capture phase: arms a fresh guard. A guard left over from an earlier
    /// tap is dropped.
    pub fn on_capture<D>(&mut self, doc: &mut D, event: &PointerEvent)
    where
        D: Document + ?Sized,
    {
        if !self.is_annotation(&*doc, event.target) {
            return;
        }
        if let Some(stale) = self.guard.take() {
            stale.disconnect(doc);
        }
        self.guard = Some(MutationGuard::arm(doc, event));
        trace!(target: "annotations.interaction", event = event.id, "armed");
    }

    /// Bubble phase at the document: decides the tap and always returns to
    /// idle.
    pub fn on_bubble<D>(&mut self, doc: &mut D, event: &PointerEvent) -> TapOutcome
    where
        D: Document + ?Sized,
    {
        let Some(guard) = self.guard.take() else {
            return TapOutcome::Ignored;
        };
        let outcome = if !self.is_annotation(&*doc, event.target) {
            TapOutcome::Ignored
        } else if let Some(reason) = guard.veto(&*doc, event) {
            TapOutcome::Vetoed(reason)
        } else {
            match annotation_index(&*doc, event.target) {
                Some(index) => TapOutcome::Resolved(TapReport {
                    element: event.target,
                    index,
                    data: doc.attribute(event.target, ATTR_DATA).unwrap_or_default(),
                    text: doc
                        .attribute(event.target, ATTR_ANNOTATION)
                        .unwrap_or_default(),
                    rect: doc.client_rect(event.target),
                }),
                None => TapOutcome::Ignored,
            }
        };
        guard.disconnect(doc);
        outcome
    }

    /// Drops any armed guard, e.g. when the session detaches.
    pub fn reset<D>(&mut self, doc: &mut D)
    where
        D: Document + ?Sized,
    {
        if let Some(guard) = self.guard.take() {
            guard.disconnect(doc);
        }
    }
}
