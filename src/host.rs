//! Line-oriented JSON host: outbound messages go out as JSON lines and
//! inbound commands are read one JSON object per line.

use std::io::{self, Write};

use annotator_core_types::{CoreError, HostCommand, HostMessage};
use annotator_event_bus::MessageSink;
use page_annotations::{AnnotationSession, Document};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::errors::{AnnotatorError, AnnotatorResult};

/// Writes every message as `{"channel": ..., "command": ..., ...}` on its own
/// line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

pub fn encode_message(channel: &str, message: &HostMessage) -> Result<String, CoreError> {
    let mut value =
        serde_json::to_value(message).map_err(|err| CoreError::new(err.to_string()))?;
    match value.as_object_mut() {
        Some(object) => {
            object.insert("channel".into(), Value::String(channel.to_string()));
        }
        None => return Err(CoreError::new("message did not serialize to an object")),
    }
    serde_json::to_string(&value).map_err(|err| CoreError::new(err.to_string()))
}

impl<W: Write + Send> MessageSink for JsonLinesSink<W> {
    fn send(&self, channel: &str, message: HostMessage) -> Result<(), CoreError> {
        let line = encode_message(channel, &message)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{line}")
            .and_then(|_| writer.flush())
            .map_err(|err| CoreError::new(err.to_string()))
    }
}

/// Parses one inbound line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> AnnotatorResult<Option<HostCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|err| AnnotatorError::json("host command", err))
}

/// Feeds every command line from `reader` to `session` until end of input.
/// Malformed lines are logged and skipped. Returns the number of commands
/// handled.
pub async fn serve_lines<R, D, S>(
    reader: R,
    doc: &mut D,
    session: &mut AnnotationSession<S>,
) -> AnnotatorResult<usize>
where
    R: AsyncBufRead + Unpin,
    D: Document,
    S: MessageSink,
{
    let mut lines = reader.lines();
    let mut handled = 0;
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(Some(command)) => {
                debug!(target: "annotations.host", ?command, "command received");
                session.handle_command(doc, command);
                handled += 1;
            }
            Ok(None) => {}
            Err(err) => warn!(target: "annotations.host", error = %err, "skipping command line"),
        }
    }
    Ok(handled)
}
