pub mod gateway;
pub mod session_machine;

use std::{
    future::Future,
    sync::{Arc, Weak},
};

use dashmap::DashMap;
use tokio::{sync::Mutex, time::timeout};
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::Authenticator,
    config::AppConfig,
    dao::{quiz_catalog::QuizCatalog, session_store::SessionStore},
    error::ServiceError,
};

pub use self::gateway::{BroadcastGateway, ConnectionHandle, ConnectionId};

pub type SharedState = Arc<AppState>;

/// Central application state: collaborators, realtime groups and per-session command locks.
pub struct AppState {
    store: Arc<dyn SessionStore>,
    quizzes: Arc<dyn QuizCatalog>,
    auth: Arc<dyn Authenticator>,
    gateway: BroadcastGateway,
    /// Only sessions with a command queued or running hold a live lock.
    session_locks: DashMap<Uuid, Weak<Mutex<()>>>,
    config: Arc<AppConfig>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(
        store: Arc<dyn SessionStore>,
        quizzes: Arc<dyn QuizCatalog>,
        auth: Arc<dyn Authenticator>,
        config: AppConfig,
    ) -> SharedState {
        Arc::new(Self {
            store,
            quizzes,
            auth,
            gateway: BroadcastGateway::new(),
            session_locks: DashMap::new(),
            config: Arc::new(config),
        })
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn quizzes(&self) -> &Arc<dyn QuizCatalog> {
        &self.quizzes
    }

    pub fn auth(&self) -> &Arc<dyn Authenticator> {
        &self.auth
    }

    /// Realtime subscriber groups keyed by session.
    pub fn gateway(&self) -> &BroadcastGateway {
        &self.gateway
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Run `work` while holding the command lock of `session_id`.
    ///
    /// Only the wait for the lock is bounded by the configured command timeout. Once the lock is
    /// acquired, `work` runs on its own task: dropping the caller does not cancel it.
    pub async fn run_serialized<F, Fut, T>(
        self: &Arc<Self>,
        session_id: Uuid,
        work: F,
    ) -> Result<T, ServiceError>
    where
        F: FnOnce(SharedState) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>> + Send + 'static,
        T: Send + 'static,
    {
        let lock = self.session_lock(session_id);
        let limit = self.config.command_timeout();
        let guard = match timeout(limit, lock.lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    session_id = %session_id,
                    timeout_ms = limit.as_millis() as u64,
                    "timed out waiting for session command lock"
                );
                self.release_lock(session_id);
                return Err(ServiceError::Timeout);
            }
        };

        let state = Arc::clone(self);
        let command = work(Arc::clone(self));
        let handle = tokio::spawn(async move {
            let outcome = command.await;
            drop(guard);
            state.release_lock(session_id);
            outcome
        });

        handle.await.map_err(|err| {
            ServiceError::Internal(format!("command on session `{session_id}` aborted: {err}"))
        })?
    }

    fn session_lock(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        let mut slot = self.session_locks.entry(session_id).or_default();
        match slot.upgrade() {
            Some(lock) => lock,
            None => {
                let lock = Arc::new(Mutex::new(()));
                *slot = Arc::downgrade(&lock);
                lock
            }
        }
    }

    fn release_lock(&self, session_id: Uuid) {
        self.session_locks
            .remove_if(&session_id, |_, lock| lock.strong_count() == 0);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        auth::StaticAuthenticator,
        dao::{quiz_catalog::MemoryQuizCatalog, session_store::MemorySessionStore},
    };

    fn state(timeout: Duration) -> SharedState {
        AppState::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryQuizCatalog::new()),
            Arc::new(StaticAuthenticator::default()),
            AppConfig::default().with_command_timeout(timeout),
        )
    }

    #[tokio::test]
    async fn commands_on_one_session_do_not_interleave() {
        let state = state(Duration::from_secs(5));
        let session = Uuid::new_v4();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for worker in 0..4 {
            let state = state.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                state
                    .run_serialized(session, move |_| async move {
                        log.lock().unwrap().push((worker, "enter"));
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        log.lock().unwrap().push((worker, "exit"));
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let log = log.lock().unwrap();
        for pair in log.chunks(2) {
            assert_eq!(pair[0].0, pair[1].0);
            assert_eq!(pair[0].1, "enter");
            assert_eq!(pair[1].1, "exit");
        }
    }

    #[tokio::test]
    async fn lock_wait_times_out_without_running_work() {
        let state = state(Duration::from_millis(20));
        let session = Uuid::new_v4();
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let holder = {
            let state = state.clone();
            tokio::spawn(async move {
                state
                    .run_serialized(session, move |_| async move {
                        let _ = entered_tx.send(());
                        let _ = release_rx.await;
                        Ok(())
                    })
                    .await
            })
        };
        entered_rx.await.unwrap();

        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        let result = state
            .run_serialized(session, move |_| async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ServiceError::Timeout)));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));

        release_tx.send(()).unwrap();
        holder.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn dropped_caller_does_not_cancel_running_work() {
        let state = state(Duration::from_secs(5));
        let session = Uuid::new_v4();
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let flag = finished.clone();
        let dropped = tokio::time::timeout(
            Duration::from_millis(10),
            state.run_serialized(session, move |_| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }),
        )
        .await;
        assert!(dropped.is_err());

        // Queues behind the detached command, so it observes its effect.
        state
            .run_serialized(session, |_| async { Ok(()) })
            .await
            .unwrap();
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn idle_sessions_release_their_lock_entry() {
        let state = state(Duration::from_secs(5));
        for _ in 0..3 {
            state
                .run_serialized(Uuid::new_v4(), |_| async { Ok(()) })
                .await
                .unwrap();
        }
        assert!(state.session_locks.is_empty());
    }
}
