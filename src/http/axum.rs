use crate::error::{Result, TrellisError};
use crate::http::{HttpMethod, HttpServer, MiddlewareHandler, RouteHandler};
use async_trait::async_trait;
use axum::Router;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::routing::{MethodFilter, on};
use std::collections::HashSet;
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// [`HttpServer`] adapter over an axum [`Router`].
///
/// Routes and middleware are folded into the router as they are bound;
/// `start` hands the router to `axum::serve` on a spawned task with
/// graceful shutdown wired to `stop`.
#[derive(Default)]
pub struct AxumServer {
    router: Router,
    bound: HashSet<(HttpMethod, String)>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl AxumServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying router. Useful for tests driving the router directly
    /// and for composing with an outer axum application.
    pub fn instance(&self) -> Router {
        self.router.clone()
    }
}

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Head => MethodFilter::HEAD,
        HttpMethod::Delete => MethodFilter::DELETE,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Patch => MethodFilter::PATCH,
        HttpMethod::Options => MethodFilter::OPTIONS,
    }
}

#[async_trait]
impl HttpServer for AxumServer {
    fn route(&mut self, method: HttpMethod, path: &str, handler: RouteHandler) -> Result<()> {
        // First registration wins; axum's Router panics on overlap.
        if !self.bound.insert((method, path.to_string())) {
            tracing::warn!(%method, %path, "route already bound, keeping the first handler");
            return Ok(());
        }
        let bound = move |request: Request| {
            let handler = handler.clone();
            async move { handler(request).await }
        };
        let router = std::mem::take(&mut self.router);
        self.router = router.route(path, on(method_filter(method), bound));
        Ok(())
    }

    fn middleware(&mut self, handler: MiddlewareHandler) -> Result<()> {
        let bound = move |request: Request, next: Next| {
            let handler = handler.clone();
            async move { handler(request, next).await }
        };
        let router = std::mem::take(&mut self.router);
        self.router = router.layer(middleware::from_fn(bound));
        Ok(())
    }

    async fn start(&mut self, addr: SocketAddr) -> Result<()> {
        if self.is_running() {
            return Err(TrellisError::ServerAlreadyRunning);
        }

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let (tx, rx) = oneshot::channel::<()>();
        let router = self.router.clone();
        let handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(error) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(%error, "http server terminated");
            }
        });

        self.shutdown = Some(tx);
        self.handle = Some(handle);
        tracing::info!(%addr, "http server listening");
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let shutdown = self.shutdown.take().ok_or(TrellisError::ServerNotRunning)?;
        let _ = shutdown.send(());
        if let Some(handle) = self.handle.take() {
            if let Err(error) = handle.await {
                tracing::warn!(%error, "http server task did not stop cleanly");
            }
        }
        tracing::info!("http server stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }
}
