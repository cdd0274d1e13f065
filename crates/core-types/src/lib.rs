use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Channel every outbound annotation message is sent on.
pub const ANNOTATIONS_CHANNEL: &str = "annotations";

/// Shared error type for protocol-level validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("{message}")]
    Message { message: String },
    #[error("invalid annotation span [{start}, {end})")]
    InvalidSpan { start: usize, end: usize },
}

impl CoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A span over the flat extracted text, supplied by the host.
///
/// `start` and `end` are character offsets (`end` is the first character after
/// the span). `text` is the substring the host saw, used to detect pages that
/// changed after extraction. `data` is echoed back untouched on a tap.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Annotation {
    pub start: usize,
    pub end: usize,
    pub text: String,
    #[cfg_attr(feature = "serde-full", serde(rename = "type"))]
    pub kind: String,
    pub data: String,
}

impl Annotation {
    pub fn new(
        start: usize,
        end: usize,
        text: impl Into<String>,
        kind: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            kind: kind.into(),
            data: data.into(),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.start < self.end {
            Ok(())
        } else {
            Err(CoreError::InvalidSpan {
                start: self.start,
                end: self.end,
            })
        }
    }

    /// Half-open interval intersection.
    pub fn overlaps(&self, other: &Annotation) -> bool {
        self.start < other.end && self.end > other.start
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Rectangle as reported to the host: either a full rect or `{}` when the
/// element has no client rects.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(untagged))]
#[derive(Clone, Debug, PartialEq)]
pub enum RectPayload {
    Rect(Rect),
    Empty {},
}

impl From<Option<Rect>> for RectPayload {
    fn from(value: Option<Rect>) -> Self {
        match value {
            Some(rect) => RectPayload::Rect(rect),
            None => RectPayload::Empty {},
        }
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "lowercase"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LogReason {
    /// The annotation ends before the first reachable text position.
    Skipping,
    /// The live node text no longer matches the annotation text.
    Mismatch,
    /// The text sits inside a hyperlink and was left untouched.
    Link,
}

impl LogReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogReason::Skipping => "skipping",
            LogReason::Mismatch => "mismatch",
            LogReason::Link => "link",
        }
    }
}

/// Outbound events sent to the host.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(tag = "command"))]
#[derive(Clone, Debug, PartialEq)]
pub enum HostMessage {
    #[cfg_attr(feature = "serde-full", serde(rename = "annotations.extractedText"))]
    ExtractedText { text: String },
    #[cfg_attr(
        feature = "serde-full",
        serde(rename = "annotations.decoratingComplete")
    )]
    DecoratingComplete { successes: usize, annotations: usize },
    #[cfg_attr(feature = "serde-full", serde(rename = "annotations.log"))]
    Log {
        reason: LogReason,
        #[cfg_attr(feature = "serde-full", serde(rename = "annotationText"))]
        annotation_text: String,
        #[cfg_attr(
            feature = "serde-full",
            serde(
                rename = "nodeText",
                default,
                skip_serializing_if = "Option::is_none"
            )
        )]
        node_text: Option<String>,
    },
    #[cfg_attr(feature = "serde-full", serde(rename = "annotations.onClick"))]
    OnClick {
        data: String,
        rect: RectPayload,
        text: String,
    },
}

impl HostMessage {
    pub fn command(&self) -> &'static str {
        match self {
            HostMessage::ExtractedText { .. } => "annotations.extractedText",
            HostMessage::DecoratingComplete { .. } => "annotations.decoratingComplete",
            HostMessage::Log { .. } => "annotations.log",
            HostMessage::OnClick { .. } => "annotations.onClick",
        }
    }
}

/// Inbound commands invoked by host-native code.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde-full",
    serde(tag = "command", rename_all = "camelCase")
)]
#[derive(Clone, Debug, PartialEq)]
pub enum HostCommand {
    ExtractText {
        #[cfg_attr(feature = "serde-full", serde(rename = "maxChars"))]
        max_chars: usize,
    },
    DecorateAnnotations {
        annotations: Vec<Annotation>,
    },
    RemoveDecorations,
    RemoveHighlight,
    Highlight {
        index: usize,
    },
    /// Simulated, undisturbed tap on the first fragment of an annotation group.
    Tap {
        index: usize,
    },
}


#[cfg(test)]
mod span_tests {
    use super::*;

    #[test]
    fn empty_span_is_invalid() {
        let a = Annotation::new(3, 3, "", "t", "d");
        assert_eq!(a.validate(), Err(CoreError::InvalidSpan { start: 3, end: 3 }));
    }

    #[test]
    fn touching_spans_do_not_overlap() {
        let a = Annotation::new(0, 5, "Hello", "t", "a");
        let b = Annotation::new(5, 8, " wo", "t", "b");
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&Annotation::new(4, 6, "o ", "t", "c")));
    }
}
