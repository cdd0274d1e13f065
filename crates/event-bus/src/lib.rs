use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

use annotator_core_types::{CoreError, HostMessage};

/// One outbound message together with the channel it was sent on.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub channel: String,
    pub message: HostMessage,
}

/// Named-channel message send abstraction towards the host.
pub trait MessageSink: Send + Sync {
    fn send(&self, channel: &str, message: HostMessage) -> Result<(), CoreError>;
}

impl<T> MessageSink for Arc<T>
where
    T: MessageSink + ?Sized,
{
    fn send(&self, channel: &str, message: HostMessage) -> Result<(), CoreError> {
        (**self).send(channel, message)
    }
}

/// In-memory bus suitable for unit tests and embedding hosts.
///
/// Every envelope is retained until [`InMemoryBus::drain`] is called and is
/// also fanned out to live subscribers.
pub struct InMemoryBus {
    sender: broadcast::Sender<Envelope>,
    retained: Mutex<Vec<Envelope>>,
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self {
            sender,
            retained: Mutex::new(Vec::new()),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    /// Takes every envelope published since the last drain, oldest first.
    pub fn drain(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.retained.lock())
    }

    /// Messages published on `channel` since the last drain, without consuming them.
    pub fn messages_on(&self, channel: &str) -> Vec<HostMessage> {
        self.retained
            .lock()
            .iter()
            .filter(|env| env.channel == channel)
            .map(|env| env.message.clone())
            .collect()
    }
}

impl MessageSink for InMemoryBus {
    fn send(&self, channel: &str, message: HostMessage) -> Result<(), CoreError> {
        let envelope = Envelope {
            channel: channel.to_string(),
            message,
        };
        self.retained.lock().push(envelope.clone());
        // No live subscriber is not an error: the envelope stays retained.
        if self.sender.send(envelope).is_err() {
            trace!(channel, "bus message retained without live subscribers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotator_core_types::ANNOTATIONS_CHANNEL;

    #[test]
    fn drain_returns_messages_in_order() {
        let bus = InMemoryBus::new(4);
        bus.send(
            ANNOTATIONS_CHANNEL,
            HostMessage::ExtractedText { text: "a".into() },
        )
        .unwrap();
        bus.send(
            ANNOTATIONS_CHANNEL,
            HostMessage::DecoratingComplete {
                successes: 0,
                annotations: 1,
            },
        )
        .unwrap();

        let drained = bus.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message.command(), "annotations.extractedText");
        assert!(bus.drain().is_empty());
    }

    #[tokio::test]
    async fn subscribers_receive_live_messages() {
        let bus = InMemoryBus::new(4);
        let mut rx = bus.subscribe();
        let sink: Arc<dyn MessageSink> = bus.clone();
        sink.send("other", HostMessage::ExtractedText { text: "x".into() })
            .unwrap();

        let env = rx.recv().await.unwrap();
        assert_eq!(env.channel, "other");
        assert!(bus.messages_on(ANNOTATIONS_CHANNEL).is_empty());
        assert_eq!(bus.messages_on("other").len(), 1);
    }
}
