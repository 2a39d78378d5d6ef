//! HTTP service: routing, request handling and the accept loop.

mod response;
mod router;
mod routes;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use roundup_shared::RoundupResult;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::jobs::JobManager;
use crate::metrics::ProcessMetrics;
use crate::runtime::ServerOptions;

pub use response::ApiError;
pub use router::Router;
pub use routes::Route;

/// How long in-flight connections may finish after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// State shared by all requests.
pub struct AppState {
    pub options: ServerOptions,
    pub jobs: JobManager,
    pub metrics: ProcessMetrics,
}

impl AppState {
    pub fn new(options: ServerOptions) -> Self {
        let jobs = JobManager::new(options.job_retention);
        Self {
            options,
            jobs,
            metrics: ProcessMetrics::new(),
        }
    }
}

/// A bound listener ready to serve the API.
pub struct Server {
    listener: TcpListener,
    router: Router,
}

impl Server {
    /// Bind to `options.bind_addr()`. Port 0 picks a free port.
    pub async fn bind(options: ServerOptions) -> RoundupResult<Self> {
        let listener = TcpListener::bind(options.bind_addr()).await?;
        Ok(Self::from_listener(listener, options))
    }

    pub fn from_listener(listener: TcpListener, options: ServerOptions) -> Self {
        Self {
            listener,
            router: Router::new(AppState::new(options)),
        }
    }

    pub fn local_addr(&self) -> RoundupResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves, then let open
    /// connections drain for up to [`SHUTDOWN_GRACE`].
    pub async fn serve<F>(self, shutdown: F) -> RoundupResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, router } = self;
        let addr = listener.local_addr()?;
        tracing::info!(
            %addr,
            api_prefix = %router.state().options.api_prefix,
            "Roundup service listening"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let service = TowerToHyperService::new(router.clone());
                    let mut stop_rx = stop_rx.clone();

                    connections.spawn(async move {
                        let conn = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service);
                        tokio::pin!(conn);

                        let result = tokio::select! {
                            res = conn.as_mut() => res,
                            _ = stop_rx.changed() => {
                                conn.as_mut().graceful_shutdown();
                                conn.await
                            }
                        };
                        if let Err(e) = result {
                            tracing::debug!(%peer, error = %e, "connection closed with error");
                        }
                    });
                }
            }
        }

        tracing::info!(open = connections.len(), "Shutting down, draining connections");
        let _ = stop_tx.send(true);
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(open = connections.len(), "Grace period elapsed, aborting connections");
            connections.abort_all();
        }

        tracing::info!("Roundup service stopped");
        Ok(())
    }
}
