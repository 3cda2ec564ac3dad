//! Inbound message plumbing.
//!
//! Every code source (push handler, deep link, manual entry, a platform
//! auto-read listener) ends up as an [`InboundMessage`] on one channel that
//! the intake listener drains in arrival order.

use async_trait::async_trait;
use avk_types::CodeInputType;
use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub message: String,
    pub input_type: CodeInputType,
}

/// Sending half of the inbound message channel.
#[derive(Clone, Debug)]
pub struct CodeSink {
    tx: mpsc::UnboundedSender<InboundMessage>,
}

impl CodeSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<InboundMessage>) -> Self {
        Self { tx }
    }

    /// Queue a message for intake. Returns `false` once the orchestrator is gone.
    pub fn deliver(&self, message: impl Into<String>, input_type: CodeInputType) -> bool {
        self.tx
            .send(InboundMessage {
                message: message.into(),
                input_type,
            })
            .is_ok()
    }
}

/// A platform background task that reads codes without user involvement,
/// such as an SMS auto-read listener.
///
/// `run` is spawned when code listening starts and aborted on teardown, so it
/// may loop forever.
#[async_trait]
pub trait CodeRetriever: Send + Sync {
    async fn run(&self, sink: CodeSink);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliver_fails_after_receiver_drops() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = CodeSink::new(tx);
        assert!(sink.deliver("hello", CodeInputType::Manual));
        drop(rx);
        assert!(!sink.deliver("again", CodeInputType::Manual));
    }
}
