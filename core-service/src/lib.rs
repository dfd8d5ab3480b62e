//! Core service façade and bootstrap.
//!
//! Wires the host-provided bridges in a [`CoreConfig`] (HTTP, secure storage,
//! background work, clock) into the library sync core and exposes the
//! operations a host application calls: toggles and queries through
//! [`LibraryService`], plus login, logout and manual sync.
//!
//! Desktop apps typically enable the `desktop-shims` feature so that missing
//! bridges fall back to the `bridge-desktop` implementations.
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/library.db")
//!     .api_access_token(token)
//!     .enable_background_sync(true)
//!     .build()?;
//! let core = CoreService::bootstrap(config).await?;
//!
//! core.login(session).await?;
//! core.library().toggle(LibraryList::Favorites, item).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use core_auth::{AuthState, Session, SessionManager};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{LibraryList, SqliteLibraryRepository};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use core_sync::{
    LibraryService, LibrarySyncScheduler, PushOperation, ReconciliationEngine, SessionTransitionHandler,
    SyncResult, SyncTrigger, TmdbRemoteLibrary,
};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Events buffered per subscriber.
const EVENT_BUS_CAPACITY: usize = 256;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    pool: SqlitePool,
    event_bus: EventBus,
    session: Arc<SessionManager>,
    reconciler: Arc<ReconciliationEngine>,
    pusher: Arc<PushOperation>,
    scheduler: Arc<LibrarySyncScheduler>,
    library: Arc<LibraryService>,
    transitions: Arc<SessionTransitionHandler>,
}

fn database_config(path: &Path) -> DatabaseConfig {
    if path.as_os_str() == ":memory:" {
        DatabaseConfig::in_memory()
    } else {
        DatabaseConfig::new(path)
    }
}

impl CoreService {
    /// Open the library database, restore any persisted session and register
    /// the background work handlers.
    ///
    /// With background sync enabled, a restored session also schedules a
    /// catch-up reconciliation.
    #[instrument(skip(config), fields(database = %config.database_path.display()))]
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

        let pool = create_pool(database_config(&config.database_path))
            .await
            .map_err(|e| CoreError::InitializationFailed(format!("opening library database: {}", e)))?;
        let repository = Arc::new(SqliteLibraryRepository::new(pool.clone()));

        let session = Arc::new(SessionManager::new(
            Arc::clone(&config.secure_store),
            event_bus.clone(),
        ));
        let restored = session.restore().await?;

        let remote = Arc::new(
            TmdbRemoteLibrary::new(
                Arc::clone(&config.http_client),
                session.clone(),
                config.api_base_url.clone(),
            )
            .with_access_token(config.api_access_token.clone())
            .with_request_timeout(config.request_timeout),
        );

        let reconciler = Arc::new(ReconciliationEngine::new(
            repository.clone(),
            remote.clone(),
            session.clone(),
            event_bus.clone(),
            Arc::clone(&config.clock),
        ));
        let pusher = Arc::new(PushOperation::new(repository.clone(), remote));
        let scheduler = Arc::new(LibrarySyncScheduler::new(
            Arc::clone(&config.work_scheduler),
            event_bus.clone(),
            config.sync_backoff,
        ));
        scheduler
            .register_handlers(session.clone(), pusher.clone(), reconciler.clone())
            .await?;

        let library = Arc::new(LibraryService::new(
            repository.clone(),
            session.clone(),
            scheduler.clone(),
            pusher.clone(),
            Arc::clone(&config.clock),
            event_bus.clone(),
        ));
        let transitions = Arc::new(SessionTransitionHandler::new(
            session.clone(),
            repository,
            reconciler.clone(),
            pusher.clone(),
            scheduler.clone(),
            event_bus.clone(),
        ));

        if config.features.enable_background_sync && restored.is_some() {
            if let Err(e) = scheduler.schedule_library_sync().await {
                warn!(error = %e, "Could not schedule catch-up library sync");
            }
        }

        info!(restored_session = restored.is_some(), "Core service ready");

        Ok(Self {
            pool,
            event_bus,
            session,
            reconciler,
            pusher,
            scheduler,
            library,
            transitions,
        })
    }

    /// Favorites and watchlist operations.
    pub fn library(&self) -> &LibraryService {
        &self.library
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn sync_scheduler(&self) -> &LibrarySyncScheduler {
        &self.scheduler
    }

    pub async fn auth_state(&self) -> AuthState {
        self.session.auth_state().await
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.session.current_session().await
    }

    /// Sign in and pull the account's lists.
    pub async fn login(&self, session: Session) -> Result<SyncResult> {
        Ok(self.transitions.on_login(session).await?)
    }

    /// Sign out and purge the account's entries. Returns the number removed.
    pub async fn logout(&self) -> Result<u64> {
        Ok(self.transitions.on_logout().await?)
    }

    /// Reconcile both lists and push pending changes now.
    ///
    /// Unlike [`LibraryService::request_sync`] this runs in the caller's task
    /// and reports the first reconciliation error.
    #[instrument(skip(self))]
    pub async fn sync_now(&self) -> Result<SyncResult> {
        self.session.require_session().await?;

        let (favorites, watchlist) = futures::join!(
            self.reconciler
                .reconcile_for(LibraryList::Favorites, SyncTrigger::Manual),
            self.reconciler
                .reconcile_for(LibraryList::Watchlist, SyncTrigger::Manual),
        );
        let mut result = favorites? + watchlist?;

        for list in LibraryList::ALL {
            result.merge(self.pusher.push_pending(list).await?);
        }
        Ok(result)
    }

    /// Close the database pool. Clones of this service become unusable.
    pub async fn shutdown(&self) {
        self.pool.close().await;
        info!("Core service shut down");
    }
}
