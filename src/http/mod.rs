pub mod axum;

use crate::container::{AnyInstance, Container, Deps};
use crate::error::{Result, TrellisError};
use crate::metadata::{
    ActionDetails, ClassType, ControllerDetails, MetadataRegistry, RouteEntry,
};
use crate::token::{DynToken, Token};
use ::axum::extract::Request;
use ::axum::middleware::Next;
use ::axum::response::{IntoResponse, Response};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

/// HTTP verbs supported by route declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Head,
    Delete,
    Put,
    Patch,
    Options,
}

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A fully bound request handler, ready to hand to the transport.
pub type RouteHandler = Arc<dyn Fn(Request) -> BoxFuture<Response> + Send + Sync>;

/// A fully bound middleware handler.
pub type MiddlewareHandler = Arc<dyn Fn(Request, Next) -> BoxFuture<Response> + Send + Sync>;

/// A type-erased controller action: invoked with the resolved controller
/// instance, the live request and the mount-time dependency set.
pub type ActionFn = Arc<dyn Fn(AnyInstance, Request, Deps) -> BoxFuture<Response> + Send + Sync>;

/// A type-erased provider middleware method.
pub type MiddlewareFn =
    Arc<dyn Fn(AnyInstance, Request, Next, Deps) -> BoxFuture<Response> + Send + Sync>;

/// An action handler together with its declared dependency tokens.
#[derive(Clone)]
pub struct ActionHandler {
    pub(crate) deps: Vec<DynToken>,
    pub(crate) invoke: ActionFn,
}

pub type ActionTable = HashMap<String, ActionHandler>;

#[derive(Clone)]
pub struct MiddlewareAction {
    pub(crate) deps: Vec<DynToken>,
    pub(crate) invoke: MiddlewareFn,
}

pub type MiddlewareTable = HashMap<String, MiddlewareAction>;

/// Abstraction over the HTTP transport.
///
/// The framework only wires handlers in; dispatch, routing and connection
/// handling are fully delegated to the implementation (see [`axum::AxumServer`]).
#[async_trait]
pub trait HttpServer: Send + Sync {
    /// Bind a handler at `path` for `method`.
    fn route(&mut self, method: HttpMethod, path: &str, handler: RouteHandler) -> Result<()>;

    /// Install a handler in the request pipeline, ahead of the routes.
    fn middleware(&mut self, handler: MiddlewareHandler) -> Result<()>;

    async fn start(&mut self, addr: SocketAddr) -> Result<()>;

    async fn stop(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// Bind every declared route of a controller.
    ///
    /// The controller singleton and all non-request action dependencies are
    /// resolved here, once, and reused across every future request. Routes
    /// are bound in declaration order at `prefix + path`.
    fn mount_controller(
        &mut self,
        container: &Container,
        registry: &MetadataRegistry,
        token: &DynToken,
        handlers: &ActionTable,
    ) -> Result<()> {
        let details = registry.controller_details(token.id()).ok_or_else(|| {
            TrellisError::ControllerMetadataMissing {
                token: token.id().to_string(),
            }
        })?;

        let instance = container.resolve_raw(token)?;
        tracing::info!(
            controller = %details.name,
            prefix = %details.prefix,
            routes = details.routes.len(),
            "mounting controller"
        );

        for route in &details.routes {
            let handler = handlers.get(&route.action).ok_or_else(|| {
                TrellisError::MissingAction {
                    controller: details.name.clone(),
                    action: route.action.clone(),
                }
            })?;
            let method = details
                .actions
                .get(&route.action)
                .map(|action| action.method)
                .ok_or_else(|| TrellisError::MissingAction {
                    controller: details.name.clone(),
                    action: route.action.clone(),
                })?;

            let deps = resolve_handler_deps(container, registry, &handler.deps)?;
            let path = join_paths(&details.prefix, &route.path);
            tracing::debug!(%method, %path, action = %route.action, "binding route");

            let invoke = handler.invoke.clone();
            let instance = instance.clone();
            let bound: RouteHandler =
                Arc::new(move |request| invoke(instance.clone(), request, deps.clone()));
            self.route(method, &path, bound)?;
        }

        Ok(())
    }

    /// Install a provider's middleware method in the request pipeline.
    ///
    /// Dependency handling is identical to [`HttpServer::mount_controller`]:
    /// the non-request parameters are resolved once, at registration time.
    fn mount_middleware(
        &mut self,
        container: &Container,
        registry: &MetadataRegistry,
        token_id: &'static str,
        instance: AnyInstance,
        handlers: &MiddlewareTable,
    ) -> Result<()> {
        let details = registry.provider_details(token_id).ok_or_else(|| {
            TrellisError::ProviderMetadataMissing {
                token: token_id.to_string(),
            }
        })?;

        let method_name =
            details
                .middleware_method
                .as_deref()
                .ok_or_else(|| TrellisError::InvalidMiddleware {
                    token: token_id.to_string(),
                })?;
        let handler = handlers
            .get(method_name)
            .ok_or_else(|| TrellisError::InvalidMiddleware {
                token: token_id.to_string(),
            })?;

        let deps = resolve_handler_deps(container, registry, &handler.deps)?;
        tracing::info!(provider = %details.name, method = %method_name, "installing middleware");

        let invoke = handler.invoke.clone();
        let bound: MiddlewareHandler =
            Arc::new(move |request, next| invoke(instance.clone(), request, next, deps.clone()));
        self.middleware(bound)
    }
}

/// Resolve the declared dependency tokens of a handler into a [`Deps`] set.
///
/// Controllers and providers are not usable as handler dependencies.
fn resolve_handler_deps(
    container: &Container,
    registry: &MetadataRegistry,
    tokens: &[DynToken],
) -> Result<Deps> {
    let mut deps = Deps::default();
    for token in tokens {
        if matches!(
            registry.class_type(token.id()),
            Some(ClassType::Controller | ClassType::Provider)
        ) {
            return Err(TrellisError::InvalidDependency {
                token: token.id().to_string(),
            });
        }
        deps.insert(token.id(), container.resolve_raw(token)?);
    }
    Ok(deps)
}

pub(crate) fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

pub(crate) fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if path == "/" {
        if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }
    } else {
        format!("{prefix}{path}")
    }
}

/// Everything needed to register a controller with an application: the
/// token, the route metadata and the type-erased action handlers.
pub struct ControllerRegistration {
    pub(crate) token: DynToken,
    pub(crate) details: ControllerDetails,
    pub(crate) handlers: ActionTable,
}

impl ControllerRegistration {
    pub fn token(&self) -> DynToken {
        self.token
    }
}

impl std::fmt::Debug for ControllerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerRegistration")
            .field("token", &self.token)
            .field("details", &self.details)
            .finish_non_exhaustive()
    }
}

/// Builder collecting the routes of one controller at composition time.
///
/// # Example
/// ```ignore
/// let registration = ControllerBuilder::new(HOME_CONTROLLER, "/")
///     .get("/", "index", &[], |controller: Arc<HomeController>, _req, _deps| async move {
///         controller.index()
///     })
///     .build()?;
/// app.use_controller(registration)?;
/// ```
pub struct ControllerBuilder<C> {
    token: Token<C>,
    prefix: String,
    routes: Vec<RouteEntry>,
    actions: HashMap<String, ActionDetails>,
    handlers: ActionTable,
    error: Option<TrellisError>,
}

impl<C: Send + Sync + 'static> ControllerBuilder<C> {
    pub fn new(token: Token<C>, prefix: &str) -> Self {
        Self {
            token,
            prefix: normalize_path(prefix),
            routes: Vec::new(),
            actions: HashMap::new(),
            handlers: ActionTable::new(),
            error: None,
        }
    }

    /// Declare a route bound to `action`. At most one HTTP method can be
    /// declared per action; `deps` lists the tokens resolved into the
    /// handler's [`Deps`] set when the controller is mounted.
    pub fn route<F, Fut>(
        mut self,
        method: HttpMethod,
        path: &str,
        action: &str,
        deps: &[DynToken],
        handler: F,
    ) -> Self
    where
        F: Fn(Arc<C>, Request, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        if self.error.is_some() {
            return self;
        }
        if self.actions.contains_key(action) {
            self.error = Some(TrellisError::DuplicateAction {
                controller: self.token.id().to_string(),
                action: action.to_string(),
            });
            return self;
        }

        self.actions
            .insert(action.to_string(), ActionDetails { method });
        self.routes.push(RouteEntry {
            path: normalize_path(path),
            action: action.to_string(),
        });

        let token_id = self.token.id();
        let invoke: ActionFn = Arc::new(move |instance, request, deps| {
            let bound: BoxFuture<Response> = match instance.downcast::<C>() {
                Ok(controller) => {
                    let fut = handler(controller, request, deps);
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
        self.handlers.insert(
            action.to_string(),
            ActionHandler {
                deps: deps.to_vec(),
                invoke,
            },
        );
        self
    }

    pub fn get<F, Fut>(self, path: &str, action: &str, deps: &[DynToken], handler: F) -> Self
    where
        F: Fn(Arc<C>, Request, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        self.route(HttpMethod::Get, path, action, deps, handler)
    }

    pub fn post<F, Fut>(self, path: &str, action: &str, deps: &[DynToken], handler: F) -> Self
    where
        F: Fn(Arc<C>, Request, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        self.route(HttpMethod::Post, path, action, deps, handler)
    }

    pub fn head<F, Fut>(self, path: &str, action: &str, deps: &[DynToken], handler: F) -> Self
    where
        F: Fn(Arc<C>, Request, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        self.route(HttpMethod::Head, path, action, deps, handler)
    }

    pub fn delete<F, Fut>(self, path: &str, action: &str, deps: &[DynToken], handler: F) -> Self
    where
        F: Fn(Arc<C>, Request, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        self.route(HttpMethod::Delete, path, action, deps, handler)
    }

    pub fn put<F, Fut>(self, path: &str, action: &str, deps: &[DynToken], handler: F) -> Self
    where
        F: Fn(Arc<C>, Request, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        self.route(HttpMethod::Put, path, action, deps, handler)
    }

    pub fn patch<F, Fut>(self, path: &str, action: &str, deps: &[DynToken], handler: F) -> Self
    where
        F: Fn(Arc<C>, Request, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        self.route(HttpMethod::Patch, path, action, deps, handler)
    }

    pub fn options<F, Fut>(self, path: &str, action: &str, deps: &[DynToken], handler: F) -> Self
    where
        F: Fn(Arc<C>, Request, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoResponse,
    {
        self.route(HttpMethod::Options, path, action, deps, handler)
    }

    pub fn build(self) -> Result<ControllerRegistration> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(ControllerRegistration {
            token: self.token.erased(),
            details: ControllerDetails {
                name: self.token.id().to_string(),
                prefix: self.prefix,
                routes: self.routes,
                actions: self.actions,
            },
            handlers: self.handlers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HomeController;
    const HOME: Token<HomeController> = Token::new("HomeController");

    fn noop() -> impl Fn(Arc<HomeController>, Request, Deps) -> BoxFuture<Response>
    + Send
    + Sync
    + 'static {
        |_, _, _| Box::pin(async { ().into_response() })
    }

    #[test]
    fn test_builder_collects_routes_in_declaration_order() {
        let registration = ControllerBuilder::new(HOME, "/home")
            .get("/", "index", &[], noop())
            .post("create", "create", &[], noop())
            .delete("/{id}", "remove", &[], noop())
            .build()
            .unwrap();

        let actions: Vec<&str> = registration
            .details
            .routes
            .iter()
            .map(|route| route.action.as_str())
            .collect();
        assert_eq!(actions, ["index", "create", "remove"]);
        // Paths are normalized to start with a slash.
        assert_eq!(registration.details.routes[1].path, "/create");
        assert_eq!(
            registration.details.actions["remove"].method,
            HttpMethod::Delete
        );
        assert_eq!(registration.details.prefix, "/home");
    }

    #[test]
    fn test_builder_rejects_two_methods_on_one_action() {
        let err = ControllerBuilder::new(HOME, "/")
            .get("/", "index", &[], noop())
            .post("/", "index", &[], noop())
            .build()
            .unwrap_err();
        assert!(matches!(err, TrellisError::DuplicateAction { .. }));
    }

    #[test]
    fn test_empty_prefix_becomes_root() {
        let registration = ControllerBuilder::new(HOME, "")
            .get("", "index", &[], noop())
            .build()
            .unwrap();
        assert_eq!(registration.details.prefix, "/");
        assert_eq!(registration.details.routes[0].path, "/");
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("/", "/"), "/");
        assert_eq!(join_paths("/", "/users"), "/users");
        assert_eq!(join_paths("/users", "/"), "/users");
        assert_eq!(join_paths("/users", "/{id}"), "/users/{id}");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("users"), "/users");
        assert_eq!(normalize_path("/users"), "/users");
    }

    #[test]
    fn test_http_method_display_is_uppercase() {
        assert_eq!(HttpMethod::Get.to_string(), "GET");
        assert_eq!(HttpMethod::Options.to_string(), "OPTIONS");
    }
}
