use crate::container::{AnyInstance, Container, Deps};
use crate::error::{Result, TrellisError};
use crate::http::{BoxFuture, MiddlewareAction, MiddlewareFn, MiddlewareTable};
use crate::metadata::ProviderDetails;
use crate::token::{DynToken, Token};
use ::axum::extract::Request;
use ::axum::middleware::Next;
use ::axum::response::{IntoResponse, Response};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// A component installed into the application at start time.
///
/// Providers may additionally expose a middleware method through their
/// [`ProviderRegistration`]; the install hook runs once, in registration
/// order, before the HTTP server starts.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    async fn install(&self, _container: &Container) -> Result<()> {
        Ok(())
    }
}

/// Resolves the concrete provider through the container, handing back both
/// the trait object (for install hooks) and the erased instance (for
/// middleware binding).
pub(crate) type ProviderResolver =
    Arc<dyn Fn(&Container) -> Result<(Arc<dyn Provider>, AnyInstance)> + Send + Sync>;

/// Everything needed to register a provider: the metadata plus the
/// type-erased middleware handlers.
pub struct ProviderRegistration {
    pub(crate) token: DynToken,
    pub(crate) details: ProviderDetails,
    pub(crate) handlers: MiddlewareTable,
    pub(crate) resolver: ProviderResolver,
}

impl ProviderRegistration {
    pub fn token(&self) -> DynToken {
        self.token
    }
}

/// Builder declaring a provider and, optionally, its middleware method.
pub struct ProviderBuilder<P> {
    token: Token<P>,
    middleware_method: Option<String>,
    handlers: MiddlewareTable,
}

impl<P: Provider> ProviderBuilder<P> {
    pub fn new(token: Token<P>) -> Self {
        Self {
            token,
            middleware_method: None,
            handlers: MiddlewareTable::new(),
        }
    }

    /// Designate `name` as the provider's middleware method. The handler is
    /// invoked for every request; `deps` are resolved once at registration
    /// time, exactly like controller action dependencies.
    pub fn middleware<F, Fut>(mut self, name: &str, deps: &[DynToken], handler: F) -> Self
    where
        F: Fn(Arc<P>, Request, Next, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        let token_id = self.token.id();
        let invoke: MiddlewareFn = Arc::new(move |instance, request, next, deps| {
            let bound: BoxFuture<Response> = match instance.downcast::<P>() {
                Ok(provider) => {
                    let fut = handler(provider, request, next, deps);
                    Box::pin(async move { fut.await.into_response() })
                }
                Err(_) => {
                    let error = TrellisError::DowncastFailed {
                        token: token_id.to_string(),
                    };
                    Box::pin(async move { error.into_response() })
                }
            };
            bound
        });

        self.middleware_method = Some(name.to_string());
        self.handlers.insert(
            name.to_string(),
            MiddlewareAction {
                deps: deps.to_vec(),
                invoke,
            },
        );
        self
    }

    pub fn build(self) -> ProviderRegistration {
        let token = self.token;
        let resolver: ProviderResolver = Arc::new(move |container| {
            let instance = container.resolve(&token)?;
            Ok((
                instance.clone() as Arc<dyn Provider>,
                instance as AnyInstance,
            ))
        });
        ProviderRegistration {
            token: self.token.erased(),
            details: ProviderDetails {
                name: self.token.id().to_string(),
                middleware_method: self.middleware_method,
            },
            handlers: self.handlers,
            resolver,
        }
    }
}
