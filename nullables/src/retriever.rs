//! Nullable platform code retriever.

use async_trait::async_trait;
use avk_types::CodeInputType;
use avk_verification::{CodeRetriever, CodeSink};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::{mpsc, Mutex};

/// Forwards messages from a channel (typically [`NullIssuer::subscribe`])
/// as automatic input, like an SMS auto-read listener.
///
/// [`NullIssuer::subscribe`]: crate::NullIssuer::subscribe
pub struct NullCodeRetriever {
    source: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    running: AtomicBool,
    runs: AtomicU32,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl NullCodeRetriever {
    /// A retriever that never receives anything.
    pub fn idle() -> Self {
        Self {
            source: Mutex::new(None),
            running: AtomicBool::new(false),
            runs: AtomicU32::new(0),
        }
    }

    pub fn from_channel(source: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            source: Mutex::new(Some(source)),
            ..Self::idle()
        }
    }

    /// Whether a `run` is in progress and has not been torn down.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeRetriever for NullCodeRetriever {
    async fn run(&self, sink: CodeSink) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        let _guard = RunningGuard(&self.running);

        let mut source = self.source.lock().await;
        if let Some(rx) = source.as_mut() {
            while let Some(message) = rx.recv().await {
                if !sink.deliver(message, CodeInputType::Automatic) {
                    break;
                }
            }
        }
        std::future::pending::<()>().await;
    }
}
