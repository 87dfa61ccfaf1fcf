use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

use crate::scan::pipeline::ScanPipeline;
use crate::scan::session::ScanSession;

/// Decode payload as sent by the camera; `None` when the decoder gave no data.
pub type Payload = Option<String>;

/// Per-session trailing debounce in front of the scan pipeline.
///
/// Every payload restarts the quiet window. When the window passes with no new
/// payload, the latest one is dispatched with the attendance type selected at
/// that moment. Scans of one session run one after another on a single task.
pub struct ScanDispatcher {
    tx: mpsc::UnboundedSender<Payload>,
    task: JoinHandle<()>,
}

impl ScanDispatcher {
    pub fn spawn(session: Arc<ScanSession>, pipeline: Arc<ScanPipeline>, window: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(rx, session, pipeline, window));
        Self { tx, task }
    }

    /// Returns false once the dispatcher has stopped.
    pub fn submit(&self, payload: Payload) -> bool {
        self.tx.send(payload).is_ok()
    }

    /// Stops the task, cancelling a lookup or insert that is still running.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for ScanDispatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Payload>,
    session: Arc<ScanSession>,
    pipeline: Arc<ScanPipeline>,
    window: Duration,
) {
    while let Some(first) = rx.recv().await {
        let Some(payload) = settle(&mut rx, first, window).await else {
            break;
        };
        if session.is_closed() {
            break;
        }

        session.record_decoded(payload.clone());
        let attendance_type = session.selection().get();

        if let Err(err) = pipeline
            .handle_scan(&session, payload.as_deref(), attendance_type)
            .await
        {
            debug!(session_id = %session.id(), error = %err, "Scan produced no attendance");
        }
    }
    debug!(session_id = %session.id(), "Scan dispatcher stopped");
}

/// Waits out the quiet window; `None` when the sender went away meanwhile.
async fn settle(
    rx: &mut mpsc::UnboundedReceiver<Payload>,
    mut latest: Payload,
    window: Duration,
) -> Option<Payload> {
    loop {
        match timeout(window, rx.recv()).await {
            Ok(Some(next)) => latest = next,
            Ok(None) => return None,
            Err(_) => return Some(latest),
        }
    }
}
