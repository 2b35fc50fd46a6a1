use futures::stream::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::{Handle, Signals};
use std::io;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Forwards SIGINT/SIGTERM into a watch channel
pub struct SignalHandler {
    handle: Handle,
    task: JoinHandle<()>,
    received: watch::Receiver<Option<i32>>,
}

impl SignalHandler {
    pub fn start() -> io::Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let handle = signals.handle();
        let (tx, received) = watch::channel(None);

        let task = tokio::spawn(async move {
            if let Some(signal) = signals.next().await {
                let name = if signal == SIGINT { "SIGINT" } else { "SIGTERM" };
                tracing::info!(signal = name, "Shutdown requested");
                let _ = tx.send(Some(signal));
            }
        });

        Ok(Self {
            handle,
            task,
            received,
        })
    }

    /// Resolves with the first signal received
    pub async fn wait(&self) -> i32 {
        let mut received = self.received.clone();
        loop {
            if let Some(signal) = *received.borrow_and_update() {
                return signal;
            }
            if received.changed().await.is_err() {
                // Listener gone without a signal; never resolve
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        self.handle.close();
        self.task.abort();
    }
}
