use tokio::sync::broadcast;

/// Stops the tasks started by a [`Tcp`](crate::Tcp) registry. Clones share
/// the same signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// This channel tells every subscribed task to stop.
    notify: broadcast::Sender<()>,
}

impl Shutdown {
    /// Creates a new active shutdown.
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self { notify }
    }

    /// Tells every subscribed task to stop.
    pub fn shut_down(&self) {
        if self.notify.send(()).is_err() {
            tracing::debug!("Shutdown sent with no running tasks");
        }
    }

    /// Subscribes to the signal. Signals sent after this call are never
    /// missed, however late the returned handle is awaited.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal(self.notify.subscribe())
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscription to a [`Shutdown`].
#[derive(Debug)]
pub struct ShutdownSignal(broadcast::Receiver<()>);

impl ShutdownSignal {
    /// Waits for the shutdown signal. Also returns once every [`Shutdown`] has
    /// been dropped.
    pub async fn wait(&mut self) {
        use broadcast::error::RecvError;
        loop {
            match self.0.recv().await {
                Ok(()) | Err(RecvError::Closed) => return,
                Err(RecvError::Lagged(_)) => {}
            }
        }
    }
}
