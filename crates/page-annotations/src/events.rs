use std::time::Duration;

use annotator_core_types::{LogReason, SessionId};
use tracing::debug;

use crate::interaction::TapOutcome;
use crate::metrics;

pub fn emit_extracted(
    session: &SessionId,
    chars: usize,
    sections: usize,
    truncated: bool,
    duration: Duration,
) {
    metrics::record_extract(chars, duration);
    debug!(
        target: "annotations.events",
        %session,
        chars,
        sections,
        truncated,
        "annotations.extract.completed"
    );
}

pub fn emit_decorated(
    session: &SessionId,
    successes: usize,
    total: usize,
    decorations: usize,
    duration: Duration,
) {
    metrics::record_decorate(successes, total.saturating_sub(successes), duration);
    debug!(
        target: "annotations.events",
        %session,
        successes,
        total,
        decorations,
        "annotations.decorate.completed"
    );
}

pub fn emit_diagnostic(session: &SessionId, reason: LogReason, annotation_text: &str) {
    debug!(
        target: "annotations.events",
        %session,
        reason = reason.as_str(),
        annotation_text,
        "annotations.decorate.diagnostic"
    );
}

pub fn emit_tap(session: &SessionId, outcome: &TapOutcome) {
    match outcome {
        TapOutcome::Resolved(report) => {
            metrics::record_tap(true);
            debug!(
                target: "annotations.events",
                %session,
                index = report.index,
                "annotations.tap.resolved"
            );
        }
        TapOutcome::Vetoed(reason) => {
            metrics::record_tap(false);
            debug!(
                target: "annotations.events",
                %session,
                ?reason,
                "annotations.tap.vetoed"
            );
        }
        TapOutcome::Ignored => {}
    }
}
