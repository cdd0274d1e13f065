use std::time::Instant;

use annotator_core_types::{
    Annotation, HostCommand, HostMessage, RectPayload, SessionId, ANNOTATIONS_CHANNEL,
};
use annotator_event_bus::MessageSink;
use tracing::{debug, debug_span, info, warn};

use crate::decorator::{self, annotation_index, DecorateReport, Decoration};
use crate::dom::{Document, ListenerPhase, NodeId, PointerEvent, TapListener};
use crate::errors::AnnotationError;
use crate::events;
use crate::extractor::{self, Section};
use crate::interaction::{InteractionHandler, TapOutcome, TapState};
use crate::policy::AnnotationPolicy;

/// Owns all per-document annotation state: the section table from the last
/// extraction, the active decoration batch and the pending tap guard.
///
/// Host operations never fail; anomalies end up in logs and in the counts
/// reported to the host.
pub struct AnnotationSession<S: MessageSink> {
    id: SessionId,
    policy: AnnotationPolicy,
    sink: S,
    sections: Vec<Section>,
    decorations: Vec<Decoration>,
    interaction: InteractionHandler,
    attached: bool,
}

impl<S: MessageSink> AnnotationSession<S> {
    pub fn new(sink: S, policy: AnnotationPolicy) -> Self {
        let interaction = InteractionHandler::new(policy.element_tag.clone());
        Self {
            id: SessionId::new(),
            policy,
            sink,
            sections: Vec::new(),
            decorations: Vec::new(),
            interaction,
            attached: false,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn policy(&self) -> &AnnotationPolicy {
        &self.policy
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn decorations(&self) -> &[Decoration] {
        &self.decorations
    }

    pub fn tap_state(&self) -> TapState {
        self.interaction.state()
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// A batch stays active until `remove_decorations` clears it.
    pub fn has_active_batch(&self) -> bool {
        !self.decorations.is_empty()
    }

    /// Registers the document-level bubble listener. Calling it again is a
    /// no-op.
    pub fn attach<D>(&mut self, doc: &mut D) -> Result<(), AnnotationError>
    where
        D: Document + ?Sized,
    {
        if self.attached {
            return Ok(());
        }
        doc.add_listener(doc.document_node(), ListenerPhase::Bubble)?;
        self.attached = true;
        info!(target: "annotations.session", session = %self.id, "attached");
        Ok(())
    }

    /// Undoes every decoration, drops a pending tap and unregisters.
    pub fn detach<D>(&mut self, doc: &mut D)
    where
        D: Document + ?Sized,
    {
        self.remove_decorations(doc);
        self.interaction.reset(doc);
        self.sections.clear();
        if self.attached {
            doc.remove_listener(doc.document_node(), ListenerPhase::Bubble);
            self.attached = false;
        }
        info!(target: "annotations.session", session = %self.id, "detached");
    }

    /// Forgets all state after the document went away (navigation). The old
    /// DOM is not touched.
    pub fn invalidate(&mut self) {
        self.sections.clear();
        self.decorations.clear();
        self.interaction = InteractionHandler::new(self.policy.element_tag.clone());
        self.attached = false;
        debug!(target: "annotations.session", session = %self.id, "invalidated");
    }

    /// Extracts up to `max_chars` characters, replaces the section table and
    /// sends `annotations.extractedText`.
    pub fn extract_text<D>(&mut self, doc: &D, max_chars: usize) -> String
    where
        D: Document + ?Sized,
    {
        let _span = debug_span!("annotations.extract", session = %self.id, max_chars).entered();
        let started = Instant::now();
        let extraction = extractor::extract(doc, max_chars, &self.policy);
        events::emit_extracted(
            &self.id,
            crate::text::char_len(&extraction.text),
            extraction.sections.len(),
            extraction.truncated,
            started.elapsed(),
        );
        self.sections = extraction.sections;
        self.send(HostMessage::ExtractedText {
            text: extraction.text.clone(),
        });
        extraction.text
    }

    /// Decorates the page with `annotations` using the section table of the
    /// last extraction, which is consumed. Refused while a batch is active or
    /// when `annotations` is empty.
    pub fn decorate_annotations<D>(
        &mut self,
        doc: &mut D,
        annotations: Vec<Annotation>,
    ) -> Option<DecorateReport>
    where
        D: Document + ?Sized,
    {
        if self.has_active_batch() {
            debug!(target: "annotations.session", session = %self.id, "decoration batch still active, ignoring");
            return None;
        }
        if annotations.is_empty() {
            return None;
        }
        if let Err(err) = self.attach(doc) {
            warn!(target: "annotations.session", session = %self.id, error = %err, "failed to attach tap listener");
        }

        let _span = debug_span!("annotations.decorate", session = %self.id).entered();
        let started = Instant::now();
        let sections = std::mem::take(&mut self.sections);
        let outcome = decorator::decorate(doc, &sections, annotations, &self.policy);

        for diagnostic in &outcome.report.diagnostics {
            events::emit_diagnostic(&self.id, diagnostic.reason, &diagnostic.annotation_text);
            self.send(HostMessage::Log {
                reason: diagnostic.reason,
                annotation_text: diagnostic.annotation_text.clone(),
                node_text: diagnostic.node_text.clone(),
            });
        }
        self.decorations = outcome.decorations;
        events::emit_decorated(
            &self.id,
            outcome.report.successes,
            outcome.report.total,
            self.decorations.len(),
            started.elapsed(),
        );
        self.send(HostMessage::DecoratingComplete {
            successes: outcome.report.successes,
            annotations: outcome.report.total,
        });
        Some(outcome.report)
    }

    pub fn remove_decorations<D>(&mut self, doc: &mut D)
    where
        D: Document + ?Sized,
    {
        if self.decorations.is_empty() {
            return;
        }
        let total = self.decorations.len();
        let restored = decorator::remove_decorations(doc, &mut self.decorations);
        debug!(target: "annotations.session", session = %self.id, restored, total, "decorations removed");
    }

    pub fn remove_highlight<D>(&mut self, doc: &mut D)
    where
        D: Document + ?Sized,
    {
        decorator::remove_highlight(doc, &self.decorations, &self.policy);
    }

    pub fn highlight<D>(&mut self, doc: &mut D, index: usize) -> usize
    where
        D: Document + ?Sized,
    {
        decorator::highlight(doc, &self.decorations, index, &self.policy)
    }

    /// First fragment of annotation `index`, in document order.
    pub fn first_fragment<D>(&self, doc: &D, index: usize) -> Option<NodeId>
    where
        D: Document + ?Sized,
    {
        self.decorations
            .iter()
            .flat_map(|decoration| decoration.replacements.iter().copied())
            .find(|node| {
                doc.tag_name(*node) == Some(self.policy.element_tag.as_str())
                    && annotation_index(doc, *node) == Some(index)
            })
    }

    /// Runs one inbound host command.
    pub fn handle_command<D>(&mut self, doc: &mut D, command: HostCommand)
    where
        D: Document + ?Sized,
    {
        match command {
            HostCommand::ExtractText { max_chars } => {
                self.extract_text(&*doc, max_chars);
            }
            HostCommand::DecorateAnnotations { annotations } => {
                self.decorate_annotations(doc, annotations);
            }
            HostCommand::RemoveDecorations => self.remove_decorations(doc),
            HostCommand::RemoveHighlight => self.remove_highlight(doc),
            HostCommand::Highlight { index } => {
                self.highlight(doc, index);
            }
            HostCommand::Tap { index } => match self.first_fragment(doc, index) {
                Some(target) => {
                    if doc.dispatch_click(target, self).is_none() {
                        debug!(target: "annotations.session", session = %self.id, index, "tap target is gone");
                    }
                }
                None => {
                    debug!(target: "annotations.session", session = %self.id, index, "no fragment to tap");
                }
            },
        }
    }

    fn send(&self, message: HostMessage) {
        let command = message.command();
        if let Err(err) = self.sink.send(ANNOTATIONS_CHANNEL, message) {
            warn!(target: "annotations.session", session = %self.id, command, error = %err, "failed to deliver message");
        }
    }
}

impl<S, D> TapListener<D> for AnnotationSession<S>
where
    S: MessageSink,
    D: Document + ?Sized,
{
    fn on_capture(&mut self, doc: &mut D, event: &PointerEvent) {
        self.interaction.on_capture(doc, event);
    }

    fn on_bubble(&mut self, doc: &mut D, event: &PointerEvent) {
        let outcome = self.interaction.on_bubble(doc, event);
        events::emit_tap(&self.id, &outcome);
        if let TapOutcome::Resolved(report) = outcome {
            self.highlight(doc, report.index);
            self.send(HostMessage::OnClick {
                data: report.data,
                rect: RectPayload::from(report.rect),
                text: report.text,
            });
        }
    }
}
