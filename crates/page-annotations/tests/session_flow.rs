//! End-to-end flows through `AnnotationSession` over the in-memory document.

use std::sync::Arc;

use annotator_core_types::{
    Annotation, HostCommand, HostMessage, LogReason, Rect, RectPayload, ANNOTATIONS_CHANNEL,
};
use annotator_event_bus::InMemoryBus;
use page_annotations::{
    AnnotationPolicy, AnnotationSession, ArenaDocument, Document, NodeId, TapState,
};

type Session = AnnotationSession<Arc<InMemoryBus>>;

fn session() -> (Session, Arc<InMemoryBus>) {
    let bus = InMemoryBus::new(64);
    (
        AnnotationSession::new(bus.clone(), AnnotationPolicy::default()),
        bus,
    )
}

fn annotation(start: usize, end: usize, text: &str, data: &str) -> Annotation {
    Annotation::new(start, end, text, "t", data)
}

fn messages(bus: &InMemoryBus) -> Vec<HostMessage> {
    bus.drain()
        .into_iter()
        .inspect(|envelope| assert_eq!(envelope.channel, ANNOTATIONS_CHANNEL))
        .map(|envelope| envelope.message)
        .collect()
}

/// Snapshot of a subtree: (node, parent, children) in document order.
fn structure(doc: &ArenaDocument, root: NodeId) -> Vec<(NodeId, Option<NodeId>, Vec<NodeId>)> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let children = doc.children(node);
        out.push((node, doc.parent(node), children.clone()));
        stack.extend(children.into_iter().rev());
    }
    out
}

fn article() -> ArenaDocument {
    let mut doc = ArenaDocument::new();
    let body = doc.body();
    let h1 = doc.append_element(body, "h1", &[]).unwrap();
    doc.append_text(h1, "Opening hours").unwrap();
    let p = doc.append_element(body, "p", &[]).unwrap();
    doc.append_text(p, "Call ").unwrap();
    let b = doc.append_element(p, "b", &[]).unwrap();
    doc.append_text(b, "555-0100").unwrap();
    doc.append_text(p, " before 5pm or visit ").unwrap();
    let a = doc.append_element(p, "a", &[("href", "/map")]).unwrap();
    doc.append_text(a, "12 Main St").unwrap();
    doc.append_text(p, ".").unwrap();
    doc
}

#[test]
fn hello_world_end_to_end() {
    let mut doc = ArenaDocument::new();
    let body = doc.body();
    let text = doc.append_text(body, "Hello world").unwrap();
    let (mut session, bus) = session();

    assert_eq!(session.extract_text(&doc, 100), "Hello world");
    session.decorate_annotations(&mut doc, vec![annotation(0, 5, "Hello", "d1")]);

    let children = doc.children(body);
    assert_eq!(children.len(), 2);
    assert_eq!(doc.tag_name(children[0]), Some("page-annotation"));
    assert_eq!(doc.text_content(children[0]), "Hello");
    assert_eq!(doc.text(children[1]).as_deref(), Some(" world"));
    assert!(!doc.children(body).contains(&text));

    assert_eq!(
        messages(&bus),
        vec![
            HostMessage::ExtractedText {
                text: "Hello world".into()
            },
            HostMessage::DecoratingComplete {
                successes: 1,
                annotations: 1
            },
        ]
    );
}

#[test]
fn article_flow_honours_link_guard() {
    let mut doc = article();
    let (mut session, bus) = session();

    let text = session.extract_text(&doc, 1_000);
    assert_eq!(text, "\nOpening hours\nCall 555-0100 before 5pm or visit 12 Main St.");

    let phone = text.find("555-0100").unwrap();
    let address = text.find("12 Main St").unwrap();
    let time = text.find("5pm").unwrap();
    let report = session
        .decorate_annotations(
            &mut doc,
            vec![
                annotation(address, address + 10, "12 Main St", "addr"),
                annotation(phone, phone + 8, "555-0100", "tel"),
                annotation(time, time + 3, "5pm", "time"),
            ],
        )
        .unwrap();
    assert_eq!(report.total, 3);
    assert_eq!(report.successes, 2);

    let out = messages(&bus);
    assert!(out.contains(&HostMessage::Log {
        reason: LogReason::Link,
        annotation_text: "12 Main St".into(),
        node_text: Some("12 Main St".into()),
    }));
    assert_eq!(
        out.last(),
        Some(&HostMessage::DecoratingComplete {
            successes: 2,
            annotations: 3
        })
    );

    let fragments = doc.elements_by_tag("page-annotation");
    let texts: Vec<String> = fragments.iter().map(|f| doc.text_content(*f)).collect();
    assert_eq!(texts, vec!["555-0100", "5pm"]);
    let body = doc.body();
    assert_eq!(
        doc.text_content(body),
        "Opening hoursCall 555-0100 before 5pm or visit 12 Main St."
    );
}

#[test]
fn overlapping_pair_yields_at_most_one_success() {
    let mut doc = ArenaDocument::new();
    let body = doc.body();
    doc.append_text(body, "Hello world").unwrap();
    let (mut session, _bus) = session();

    session.extract_text(&doc, 100);
    let report = session
        .decorate_annotations(
            &mut doc,
            vec![annotation(0, 5, "Hello", "a"), annotation(3, 8, "lo wo", "b")],
        )
        .unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.successes, 1);
    assert_eq!(doc.elements_by_tag("page-annotation").len(), 1);
}

#[test]
fn round_trip_restores_structure() {
    let mut doc = article();
    let body = doc.body();
    let before = structure(&doc, body);
    let (mut session, _bus) = session();

    let text = session.extract_text(&doc, 1_000);
    let hours = text.find("hours").unwrap();
    let phone = text.find("555").unwrap();
    let report = session
        .decorate_annotations(
            &mut doc,
            vec![
                annotation(1, 8, "Opening", "o"),
                // Crosses the paragraph separator into the next text node.
                annotation(hours, hours + 10, "hours\nCall", "x"),
                annotation(phone, phone + 8, "555-0100", "p"),
            ],
        )
        .unwrap();
    assert_eq!(report.successes, 3);
    assert_eq!(doc.elements_by_tag("page-annotation").len(), 4);
    assert!(session.has_active_batch());
    assert_ne!(structure(&doc, body), before);

    session.remove_decorations(&mut doc);
    assert_eq!(structure(&doc, body), before);
    assert!(doc.elements_by_tag("page-annotation").is_empty());

    // Idempotent when nothing is decorated.
    session.remove_decorations(&mut doc);
    session.remove_highlight(&mut doc);
    assert_eq!(structure(&doc, body), before);
}

#[test]
fn drifted_text_fails_without_blocking_neighbours() {
    let mut doc = ArenaDocument::new();
    let body = doc.body();
    let first = doc.append_text(body, "alpha beta ").unwrap();
    doc.append_text(body, "gamma").unwrap();
    let (mut session, bus) = session();

    session.extract_text(&doc, 100);
    doc.set_text_data(first, "alpha BETA ").unwrap();
    let report = session
        .decorate_annotations(
            &mut doc,
            vec![
                annotation(0, 5, "alpha", "a"),
                annotation(6, 10, "beta", "b"),
                annotation(11, 16, "gamma", "c"),
            ],
        )
        .unwrap();
    assert_eq!((report.successes, report.total), (2, 3));

    let logs: Vec<HostMessage> = messages(&bus)
        .into_iter()
        .filter(|m| m.command() == "annotations.log")
        .collect();
    assert_eq!(
        logs,
        vec![HostMessage::Log {
            reason: LogReason::Mismatch,
            annotation_text: "beta".into(),
            node_text: Some("BETA".into()),
        }]
    );
}

#[test]
fn removed_nodes_are_counted_once() {
    let mut doc = ArenaDocument::new();
    let body = doc.body();
    let doomed = doc.append_element(body, "div", &[]).unwrap();
    doc.append_text(doomed, "first part").unwrap();
    let kept = doc.append_element(body, "div", &[]).unwrap();
    doc.append_text(kept, "second part").unwrap();
    let (mut session, bus) = session();

    let text = session.extract_text(&doc, 100);
    assert_eq!(text, "\nfirst part\nsecond part");
    doc.destroy(doomed);

    let report = session
        .decorate_annotations(
            &mut doc,
            vec![
                annotation(1, 6, "first", "a"),
                annotation(7, 11, "part", "b"),
                annotation(12, 18, "second", "c"),
                annotation(30, 35, "never", "d"),
            ],
        )
        .unwrap();
    assert_eq!(report.total, 4);
    assert_eq!(report.successes, 1);
    assert_eq!(report.failures(), 3);

    let skipped = messages(&bus)
        .into_iter()
        .filter(|m| {
            matches!(
                m,
                HostMessage::Log {
                    reason: LogReason::Skipping,
                    ..
                }
            )
        })
        .count();
    assert_eq!(skipped, 2);
}

#[test]
fn shadow_text_is_annotated_in_place() {
    let mut doc = ArenaDocument::new();
    let body = doc.body();
    let host = doc.append_element(body, "span", &[]).unwrap();
    let shadow = doc.attach_shadow(host).unwrap();
    doc.append_text(shadow, "inside shadow").unwrap();
    let (mut session, _bus) = session();

    assert_eq!(session.extract_text(&doc, 100), "inside shadow");
    let report = session
        .decorate_annotations(&mut doc, vec![annotation(7, 13, "shadow", "s")])
        .unwrap();
    assert_eq!(report.successes, 1);
    let fragment = doc.elements_by_tag("page-annotation")[0];
    assert_eq!(doc.parent(fragment), Some(shadow));
}

#[test]
fn taps_resolve_or_veto() {
    let mut doc = ArenaDocument::new();
    let body = doc.body();
    doc.append_text(body, "Tap here or there").unwrap();
    let (mut session, bus) = session();

    session.extract_text(&doc, 100);
    session.decorate_annotations(
        &mut doc,
        vec![annotation(4, 8, "here", "h"), annotation(12, 17, "there", "t")],
    );
    bus.drain();

    let here = session.first_fragment(&doc, 0).unwrap();
    let there = session.first_fragment(&doc, 1).unwrap();
    doc.set_client_rect(
        here,
        Rect {
            x: 4.0,
            y: 8.0,
            width: 24.0,
            height: 12.0,
        },
    )
    .unwrap();

    // The page rewrites itself in response to the tap.
    doc.dispatch_click_with(there, &mut session, |doc, _| {
        let body = doc.body();
        doc.append_text(body, " (loading)").unwrap();
    });
    assert!(messages(&bus).is_empty());
    assert_eq!(session.tap_state(), TapState::Idle);

    // The page handles the tap itself.
    doc.dispatch_click_with(there, &mut session, |_, event| event.prevent_default());
    assert!(messages(&bus).is_empty());

    doc.dispatch_click(here, &mut session);
    assert_eq!(
        messages(&bus),
        vec![HostMessage::OnClick {
            data: "h".into(),
            rect: RectPayload::Rect(Rect {
                x: 4.0,
                y: 8.0,
                width: 24.0,
                height: 12.0,
            }),
            text: "here".into(),
        }]
    );
    assert_eq!(doc.style_property(here, "color").as_deref(), Some("#000"));
    assert_eq!(doc.style_property(there, "color"), None);

    session.handle_command(&mut doc, HostCommand::RemoveHighlight);
    assert_eq!(doc.style_property(here, "color"), None);
}

#[test]
fn taps_outside_annotations_are_ignored() {
    let mut doc = ArenaDocument::new();
    let body = doc.body();
    let plain = doc.append_element(body, "span", &[]).unwrap();
    doc.append_text(plain, "plain").unwrap();
    doc.append_text(body, " note").unwrap();
    let (mut session, bus) = session();

    session.extract_text(&doc, 100);
    session.decorate_annotations(&mut doc, vec![annotation(6, 10, "note", "n")]);
    bus.drain();

    doc.dispatch_click(plain, &mut session);
    assert!(messages(&bus).is_empty());
    assert_eq!(session.tap_state(), TapState::Idle);
}

#[test]
fn command_stream_drives_session() {
    let mut doc = ArenaDocument::new();
    let body = doc.body();
    let original = doc.append_text(body, "Meet at noon").unwrap();
    let (mut session, bus) = session();

    let commands = vec![
        HostCommand::ExtractText { max_chars: 7 },
        HostCommand::ExtractText { max_chars: 100 },
        HostCommand::DecorateAnnotations {
            annotations: vec![annotation(8, 12, "noon", "time")],
        },
        HostCommand::Highlight { index: 0 },
        HostCommand::Tap { index: 0 },
        HostCommand::RemoveDecorations,
    ];
    for command in commands {
        session.handle_command(&mut doc, command);
    }

    let out = messages(&bus);
    assert_eq!(
        out[..3],
        [
            HostMessage::ExtractedText {
                text: "Meet at".into()
            },
            HostMessage::ExtractedText {
                text: "Meet at noon".into()
            },
            HostMessage::DecoratingComplete {
                successes: 1,
                annotations: 1
            },
        ]
    );
    assert!(matches!(out[3], HostMessage::OnClick { ref data, .. } if data == "time"));
    assert_eq!(doc.children(body), vec![original]);
}
