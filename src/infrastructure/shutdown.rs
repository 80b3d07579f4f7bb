use tokio::sync::broadcast;

pub trait Shutdown {
    fn subscribe(&self) -> broadcast::Receiver<()>;
}

/// Process-wide shutdown signal, fanned out to every long-running task.
#[derive(Clone)]
pub struct ShutdownChannel {
    shutdown: broadcast::Sender<()>,
}

impl Default for ShutdownChannel {
    fn default() -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self { shutdown }
    }
}

impl ShutdownChannel {
    /// Signals every subscriber. Having no subscribers left is not an error.
    pub fn trigger(&self) {
        if self.shutdown.send(()).is_err() {
            tracing::debug!("Shutdown triggered with no listeners");
        }
    }
}

impl Shutdown for ShutdownChannel {
    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }
}
