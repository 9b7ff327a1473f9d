// Shutdown signalling for background refresh tasks
//
// A single ShutdownHandle is held by the process; every scheduler loop,
// refresh cycle and retry wait holds a cloned Shutdown receiver.

use std::sync::Arc;
use tokio::sync::watch;

/// Sending side of the shutdown signal
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Receiving side of the shutdown signal, cheap to clone
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
    // Only set by `never`, so the channel stays open without a handle.
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (
            Self { tx },
            Shutdown {
                rx,
                _keepalive: None,
            },
        )
    }

    /// Signal every subscriber. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
            _keepalive: None,
        }
    }
}

impl Shutdown {
    /// A receiver that never fires, for one-shot callers such as the CLI query
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been signalled (or the handle is dropped)
    pub async fn wait(&mut self) {
        if self.is_triggered() {
            return;
        }
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}
