use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use moka::notification::RemovalCause;
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::attendance::AttendanceType;
use crate::scan::dispatcher::{Payload, ScanDispatcher};
use crate::scan::pipeline::ScanPipeline;
use crate::scan::session::{ScanSession, SessionView};

struct SessionHandle {
    session: Arc<ScanSession>,
    dispatcher: ScanDispatcher,
}

impl SessionHandle {
    fn teardown(&self) {
        self.session.close();
        self.dispatcher.shutdown();
    }
}

/// Open scan sessions, each with its own dispatcher.
///
/// Sessions idle for longer than `idle` are evicted and torn down, like an
/// explicitly closed one.
pub struct ScanService {
    sessions: Cache<Uuid, Arc<SessionHandle>>,
    pipeline: Arc<ScanPipeline>,
    debounce: Duration,
    cue_url: String,
}

impl ScanService {
    pub fn new(
        pipeline: Arc<ScanPipeline>,
        debounce: Duration,
        idle: Duration,
        cue_url: impl Into<String>,
    ) -> Self {
        let sessions = Cache::builder()
            .time_to_idle(idle)
            .eviction_listener(|id: Arc<Uuid>, handle: Arc<SessionHandle>, cause: RemovalCause| {
                handle.teardown();
                debug!(session_id = %id, ?cause, "Scan session removed");
            })
            .build();

        Self {
            sessions,
            pipeline,
            debounce,
            cue_url: cue_url.into(),
        }
    }

    pub fn pipeline(&self) -> &Arc<ScanPipeline> {
        &self.pipeline
    }

    pub async fn open(&self, attendance_type: AttendanceType, owner: u64) -> Arc<ScanSession> {
        let session = Arc::new(ScanSession::new(attendance_type, owner));
        let dispatcher = ScanDispatcher::spawn(session.clone(), self.pipeline.clone(), self.debounce);

        self.sessions
            .insert(
                session.id(),
                Arc::new(SessionHandle {
                    session: session.clone(),
                    dispatcher,
                }),
            )
            .await;

        info!(session_id = %session.id(), owner, %attendance_type, "Scan session opened");
        session
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<ScanSession>> {
        self.sessions.get(id).await.map(|h| h.session.clone())
    }

    /// Queues a decode payload; false when the session is unknown or closed.
    pub async fn submit(&self, id: &Uuid, payload: Payload) -> bool {
        match self.sessions.get(id).await {
            Some(handle) if !handle.session.is_closed() => handle.dispatcher.submit(payload),
            _ => false,
        }
    }

    pub async fn close(&self, id: &Uuid) -> bool {
        match self.sessions.remove(id).await {
            Some(handle) => {
                handle.teardown();
                info!(session_id = %id, "Scan session closed");
                true
            }
            None => false,
        }
    }

    pub fn view(&self, session: &ScanSession) -> SessionView {
        session.view(&self.cue_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::memory::{MemoryStore, student};

    fn service(store: Arc<MemoryStore>) -> ScanService {
        ScanService::new(
            Arc::new(ScanPipeline::new(store, false)),
            Duration::from_millis(500),
            Duration::from_secs(3600),
            "/beep.mp3",
        )
    }

    #[tokio::test(start_paused = true)]
    async fn open_submit_and_view() {
        let store = Arc::new(MemoryStore::with_students(vec![student(1, "Ana", "A")]));
        let service = service(store.clone());

        let session = service.open(AttendanceType::TimeOut, 1).await;
        assert!(service.submit(&session.id(), Some("A".into())).await);
        tokio::time::sleep(Duration::from_millis(600)).await;

        let view = service.view(&session);
        assert_eq!(view.cue_url, "/beep.mp3");
        assert_eq!(view.cue_seq, 1);
        assert_eq!(view.processed_count, 1);
        assert_eq!(store.records()[0].attendance_type, AttendanceType::TimeOut);
    }

    #[tokio::test]
    async fn closed_session_is_gone() {
        let service = service(Arc::new(MemoryStore::default()));
        let session = service.open(AttendanceType::TimeIn, 1).await;
        let id = session.id();

        assert!(service.get(&id).await.is_some());
        assert!(service.close(&id).await);
        assert!(session.is_closed());
        assert!(service.get(&id).await.is_none());
        assert!(!service.submit(&id, Some("A".into())).await);
        assert!(!service.close(&id).await);
    }

    #[tokio::test]
    async fn unknown_session() {
        let service = service(Arc::new(MemoryStore::default()));
        assert!(service.get(&Uuid::new_v4()).await.is_none());
        assert!(!service.submit(&Uuid::new_v4(), None).await);
    }
}
