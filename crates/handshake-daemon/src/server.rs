//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::callback::CallbackReceiver;
use crate::config::{DaemonConfig, StorageConfig, WalletConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::gateway::{Gateway, PlainCode, SubscriptionRegistry};
use crate::storage::{InMemoryStore, KvStore, PostgresStore, SessionStore};
use crate::wallet::{CredentialExchange, HttpWalletClient, LocalWallet};
use crate::watcher::ChangeWatcher;
use handshake_types::TerminalEvent;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

const SWEEP_PERIOD: Duration = Duration::from_secs(30);
const CLOSE_GRACE: Duration = Duration::from_millis(500);

enum Backend {
    Memory(Arc<InMemoryStore>),
    Postgres(PostgresStore),
}

impl Backend {
    async fn connect(config: &StorageConfig) -> DaemonResult<Self> {
        match config {
            StorageConfig::Memory => Ok(Backend::Memory(Arc::new(InMemoryStore::new()))),
            StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            } => Ok(Backend::Postgres(
                PostgresStore::new(url, *max_connections, *connect_timeout_secs).await?,
            )),
        }
    }

    fn kv(&self) -> Arc<dyn KvStore> {
        match self {
            Backend::Memory(store) => store.clone() as Arc<dyn KvStore>,
            Backend::Postgres(store) => Arc::new(store.clone()) as Arc<dyn KvStore>,
        }
    }

    fn spawn_sweeper(self, shutdown: watch::Receiver<bool>) {
        match self {
            Backend::Memory(store) => {
                tokio::spawn(store.run_sweeper(SWEEP_PERIOD, shutdown));
            }
            Backend::Postgres(store) => {
                tokio::spawn(store.run_sweeper(SWEEP_PERIOD, shutdown));
            }
        }
    }
}

fn build_wallet(config: &WalletConfig) -> DaemonResult<Arc<dyn CredentialExchange>> {
    match config {
        WalletConfig::Local { seed, did } => {
            let wallet: Arc<dyn CredentialExchange> = Arc::new(LocalWallet::new(seed, did.clone()));
            Ok(wallet)
        }
        WalletConfig::Http {
            base_url,
            timeout_secs,
            max_retries,
        } => {
            let client =
                HttpWalletClient::new(base_url.clone(), Duration::from_secs(*timeout_secs), *max_retries)
                    .map_err(|e| DaemonError::Config(e.to_string()))?;
            let wallet: Arc<dyn CredentialExchange> = Arc::new(client);
            Ok(wallet)
        }
    }
}

/// Handshake daemon server
pub struct Server {
    config: Arc<DaemonConfig>,
    backend: Backend,
    watcher: Arc<ChangeWatcher>,
    registry: Arc<SubscriptionRegistry>,
    events: mpsc::UnboundedReceiver<TerminalEvent>,
    state: AppState,
}

impl Server {
    /// Create a new server with the given configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let config = Arc::new(config);

        let backend = Backend::connect(&config.storage).await?;
        let store = SessionStore::new(backend.kv(), config.session.store_retries);
        let wallet = build_wallet(&config.wallet)?;

        let (watcher, events) = ChangeWatcher::new(config.watcher.clone(), store.clone());
        let registry = SubscriptionRegistry::new(watcher.clone());

        let gateway = Arc::new(Gateway::new(
            store.clone(),
            wallet.clone(),
            registry.clone(),
            Arc::new(PlainCode),
            config.server.clone(),
            config.session.clone(),
            config.requirements.clone(),
        ));
        let receiver = Arc::new(CallbackReceiver::new(
            store,
            wallet.clone(),
            config.session.clone(),
        ));

        let state = AppState::new(gateway, receiver, wallet, watcher.clone(), config.clone());

        Ok(Self {
            config,
            backend,
            watcher,
            registry,
            events,
            state,
        })
    }

    /// Handle to the state the router is built from
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the server until Ctrl+C or SIGTERM
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Handshake daemon listening on {}", addr);

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `signal` resolves
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> DaemonResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Start background tasks
        let watcher = tokio::spawn(self.watcher.clone().run(shutdown_rx.clone()));
        let dispatcher = tokio::spawn(
            self.registry
                .clone()
                .dispatch(self.events, shutdown_rx.clone()),
        );
        self.backend.spawn_sweeper(shutdown_rx);

        let app = create_router(self.state);

        // Upgraded sockets outlive the HTTP server, so waiting channels are
        // cancelled as soon as the signal fires
        let registry = self.registry.clone();
        let cancelled = Arc::new(AtomicUsize::new(0));
        let cancelled_on_signal = cancelled.clone();
        let signal = async move {
            signal.await;
            cancelled_on_signal.store(registry.close_all(), Ordering::Release);
        };

        // Run server with graceful shutdown
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| DaemonError::Server(e.to_string()));

        tracing::info!("Handshake daemon shutting down");

        // Let cancelled channels flush their error and close frame
        let cancelled = cancelled.load(Ordering::Acquire) + self.registry.close_all();
        if cancelled > 0 {
            tracing::info!(cancelled, "Waiting channels told to go away");
            tokio::time::sleep(CLOSE_GRACE).await;
        }

        // Stop background tasks
        let _ = shutdown_tx.send(true);
        let _ = watcher.await;
        let _ = dispatcher.await;

        result
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
