use crate::config::{CONFIG, Config, ConfigData};
use crate::container::{AnyInstance, Container, Deps};
use crate::error::{Result, TrellisError};
use crate::http::{ActionTable, ControllerRegistration, HttpServer, MiddlewareTable};
use crate::metadata::{ClassType, Metadata, MetadataRegistry};
use crate::provider::{Provider, ProviderRegistration, ProviderResolver};
use crate::token::{DynToken, Token};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// The HTTP-facing application: a [`Container`], a [`MetadataRegistry`] and
/// an [`HttpServer`], wired together by explicit registration calls.
///
/// Components are registered first (`register_*`), then mounted with
/// [`WebApplication::use_token`] — or both at once through
/// [`WebApplication::use_controller`] / [`WebApplication::use_provider`].
/// [`WebApplication::start`] runs provider install hooks and starts the
/// server on the configured address.
pub struct WebApplication {
    container: Container,
    registry: MetadataRegistry,
    config: Arc<Config>,
    http_server: Option<Box<dyn HttpServer>>,
    controller_handlers: HashMap<&'static str, ActionTable>,
    middleware_handlers: HashMap<&'static str, MiddlewareTable>,
    provider_resolvers: HashMap<&'static str, ProviderResolver>,
    providers: Vec<Arc<dyn Provider>>,
    running: bool,
}

impl WebApplication {
    pub fn new(config: ConfigData) -> Self {
        let container = Container::new();
        let config = Arc::new(Config::new(config));
        container.set(&CONFIG, config.clone());
        Self {
            container,
            registry: MetadataRegistry::new(),
            config,
            http_server: None,
            controller_handlers: HashMap::new(),
            middleware_handlers: HashMap::new(),
            provider_resolvers: HashMap::new(),
            providers: Vec::new(),
            running: false,
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn running(&self) -> bool {
        self.running
    }

    /// Resolve a component through the application's container.
    pub fn make<T: Send + Sync + 'static>(&self, token: &Token<T>) -> Result<Arc<T>> {
        self.container.resolve(token)
    }

    pub fn set_http_server(&mut self, server: Box<dyn HttpServer>) -> Result<()> {
        if self.running {
            return Err(TrellisError::AlreadyRunning);
        }
        self.http_server = Some(server);
        Ok(())
    }

    /// Register a plain service: a classType entry plus a container
    /// definition.
    pub fn register_service<T, F>(
        &mut self,
        token: &Token<T>,
        deps: &[DynToken],
        ctor: F,
    ) -> Result<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&Deps) -> Result<T> + Send + Sync + 'static,
    {
        self.registry
            .set_class_metadata(token.id(), Metadata::ClassType(ClassType::Service))?;
        self.container.define(token, deps, ctor);
        Ok(())
    }

    /// Record a controller's metadata and handlers without mounting it.
    pub fn register_controller(&mut self, registration: ControllerRegistration) -> Result<()> {
        let id = registration.token.id();
        self.registry
            .set_class_metadata(id, Metadata::ClassType(ClassType::Controller))?;
        self.registry
            .set_class_metadata(id, Metadata::Controller(registration.details))?;
        self.controller_handlers.insert(id, registration.handlers);
        Ok(())
    }

    /// Record a provider's metadata and middleware handlers without
    /// installing it.
    pub fn register_provider(&mut self, registration: ProviderRegistration) -> Result<()> {
        let id = registration.token.id();
        self.registry
            .set_class_metadata(id, Metadata::ClassType(ClassType::Provider))?;
        self.registry
            .set_class_metadata(id, Metadata::Provider(registration.details))?;
        self.middleware_handlers.insert(id, registration.handlers);
        self.provider_resolvers.insert(id, registration.resolver);
        Ok(())
    }

    /// Mount a previously registered component, dispatching on its
    /// classType: controllers get their routes bound, providers are
    /// resolved and queued for install (and their middleware mounted).
    pub fn use_token(&mut self, token: &DynToken) -> Result<()> {
        if self.running {
            return Err(TrellisError::AlreadyRunning);
        }
        if self.http_server.is_none() {
            return Err(TrellisError::HttpServerNotSet);
        }

        match self.registry.class_type(token.id()) {
            Some(ClassType::Controller) => {
                let handlers = self
                    .controller_handlers
                    .get(token.id())
                    .cloned()
                    .unwrap_or_default();
                let server = self
                    .http_server
                    .as_mut()
                    .ok_or(TrellisError::HttpServerNotSet)?;
                server.mount_controller(&self.container, &self.registry, token, &handlers)
            }
            Some(ClassType::Provider) => {
                let resolver = self
                    .provider_resolvers
                    .get(token.id())
                    .cloned()
                    .ok_or_else(|| TrellisError::ProviderMetadataMissing {
                        token: token.id().to_string(),
                    })?;
                let (provider, instance) = resolver(&self.container)?;
                self.attach_provider(token.id(), provider, instance)
            }
            _ => Err(TrellisError::InvalidClassType {
                token: token.id().to_string(),
                expected: "a controller or provider",
            }),
        }
    }

    /// Register and mount a controller in one call.
    pub fn use_controller(&mut self, registration: ControllerRegistration) -> Result<()> {
        let token = registration.token;
        self.register_controller(registration)?;
        self.use_token(&token)
    }

    /// Register and mount a provider in one call.
    pub fn use_provider(&mut self, registration: ProviderRegistration) -> Result<()> {
        let token = registration.token;
        self.register_provider(registration)?;
        self.use_token(&token)
    }

    /// Install a prebuilt provider instance instead of resolving one
    /// through the container. The provider must be registered first.
    pub fn use_provider_instance<P: Provider>(
        &mut self,
        token: &Token<P>,
        instance: Arc<P>,
    ) -> Result<()> {
        if self.running {
            return Err(TrellisError::AlreadyRunning);
        }
        if self.http_server.is_none() {
            return Err(TrellisError::HttpServerNotSet);
        }
        if self.registry.class_type(token.id()) != Some(ClassType::Provider) {
            return Err(TrellisError::InvalidClassType {
                token: token.id().to_string(),
                expected: "a provider",
            });
        }
        self.attach_provider(
            token.id(),
            instance.clone() as Arc<dyn Provider>,
            instance as AnyInstance,
        )
    }

    fn attach_provider(
        &mut self,
        id: &'static str,
        provider: Arc<dyn Provider>,
        instance: AnyInstance,
    ) -> Result<()> {
        let details =
            self.registry
                .provider_details(id)
                .ok_or_else(|| TrellisError::ProviderMetadataMissing {
                    token: id.to_string(),
                })?;

        if details.middleware_method.is_some() {
            let handlers = self
                .middleware_handlers
                .get(id)
                .cloned()
                .unwrap_or_default();
            let server = self
                .http_server
                .as_mut()
                .ok_or(TrellisError::HttpServerNotSet)?;
            server.mount_middleware(&self.container, &self.registry, id, instance, &handlers)?;
        }

        self.providers.push(provider);
        Ok(())
    }

    /// Run provider install hooks, then start the HTTP server on the
    /// configured address.
    pub async fn start(&mut self) -> Result<()> {
        if self.running {
            return Err(TrellisError::AlreadyRunning);
        }

        let providers = self.providers.clone();
        for provider in providers {
            provider.install(&self.container).await?;
        }

        let addr: SocketAddr =
            format!("{}:{}", self.config.http().hostname, self.config.http().port).parse()?;
        let server = self
            .http_server
            .as_mut()
            .ok_or(TrellisError::HttpServerNotSet)?;
        server.start(addr).await?;
        self.running = true;
        tracing::info!(environment = %self.config.environment(), %addr, "application started");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Err(TrellisError::NotRunning);
        }
        let server = self
            .http_server
            .as_mut()
            .ok_or(TrellisError::HttpServerNotSet)?;
        server.stop().await?;
        self.running = false;
        tracing::info!("application stopped");
        Ok(())
    }
}

/// Build a [`WebApplication`] with its HTTP server already attached.
pub fn create_web_application(
    server: impl HttpServer + 'static,
    config: ConfigData,
) -> WebApplication {
    let mut application = WebApplication::new(config);
    // A fresh application is never running, so this cannot fail.
    let _ = application.set_http_server(Box::new(server));
    application
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{
        ControllerBuilder, HttpMethod, MiddlewareHandler, RouteHandler,
    };
    use crate::provider::ProviderBuilder;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Transport stub recording what gets bound to it.
    #[derive(Default)]
    struct StubServer {
        routes: Arc<Mutex<Vec<(HttpMethod, String)>>>,
        middleware_count: Arc<Mutex<usize>>,
        running: bool,
    }

    #[async_trait]
    impl HttpServer for StubServer {
        fn route(&mut self, method: HttpMethod, path: &str, _handler: RouteHandler) -> Result<()> {
            self.routes.lock().unwrap().push((method, path.to_string()));
            Ok(())
        }

        fn middleware(&mut self, _handler: MiddlewareHandler) -> Result<()> {
            *self.middleware_count.lock().unwrap() += 1;
            Ok(())
        }

        async fn start(&mut self, _addr: SocketAddr) -> Result<()> {
            if self.running {
                return Err(TrellisError::ServerAlreadyRunning);
            }
            self.running = true;
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            if !self.running {
                return Err(TrellisError::ServerNotRunning);
            }
            self.running = false;
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running
        }
    }

    struct UserController;
    const USERS: Token<UserController> = Token::new("UserController");

    fn user_controller() -> ControllerRegistration {
        ControllerBuilder::new(USERS, "/users")
            .get("/", "index", &[], |_, _, _| async { "users" })
            .post("/", "create", &[], |_, _, _| async { "created" })
            .get("/{id}", "show", &[], |_, _, _| async { "user" })
            .build()
            .unwrap()
    }

    fn app_with_stub() -> (WebApplication, Arc<Mutex<Vec<(HttpMethod, String)>>>) {
        let stub = StubServer::default();
        let routes = stub.routes.clone();
        let app = create_web_application(stub, ConfigData::default());
        app.container().define(&USERS, &[], |_| Ok(UserController));
        (app, routes)
    }

    #[test]
    fn test_use_controller_binds_routes_in_declaration_order() {
        let (mut app, routes) = app_with_stub();
        app.use_controller(user_controller()).unwrap();

        let bound = routes.lock().unwrap();
        assert_eq!(
            *bound,
            vec![
                (HttpMethod::Get, "/users".to_string()),
                (HttpMethod::Post, "/users".to_string()),
                (HttpMethod::Get, "/users/{id}".to_string()),
            ]
        );
    }

    #[test]
    fn test_use_token_requires_registration() {
        let (mut app, _) = app_with_stub();
        let err = app.use_token(&USERS.erased()).unwrap_err();
        assert!(matches!(err, TrellisError::InvalidClassType { .. }));
    }

    #[test]
    fn test_use_token_requires_http_server() {
        let mut app = WebApplication::new(ConfigData::default());
        app.container().define(&USERS, &[], |_| Ok(UserController));
        let registration = user_controller();
        app.register_controller(registration).unwrap();

        let err = app.use_token(&USERS.erased()).unwrap_err();
        assert!(matches!(err, TrellisError::HttpServerNotSet));
    }

    #[test]
    fn test_controller_metadata_missing() {
        let (mut app, _) = app_with_stub();
        // Class type says controller, but no controller details recorded.
        app.registry
            .set_class_metadata(USERS.id(), Metadata::ClassType(ClassType::Controller))
            .unwrap();

        let err = app.use_token(&USERS.erased()).unwrap_err();
        assert!(matches!(err, TrellisError::ControllerMetadataMissing { .. }));
    }

    #[test]
    fn test_registering_a_token_twice_fails() {
        let (mut app, _) = app_with_stub();
        app.register_controller(user_controller()).unwrap();
        let err = app.register_controller(user_controller()).unwrap_err();
        assert!(matches!(err, TrellisError::DuplicateClassType { .. }));
    }

    #[test]
    fn test_config_is_available_from_the_container() {
        let (app, _) = app_with_stub();
        let config = app.make(&CONFIG).unwrap();
        assert_eq!(config.http().port, 3000);
    }

    struct AuditProvider {
        installed: AtomicBool,
    }

    #[async_trait]
    impl Provider for AuditProvider {
        async fn install(&self, _container: &Container) -> Result<()> {
            self.installed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    const AUDIT: Token<AuditProvider> = Token::new("AuditProvider");

    #[tokio::test]
    async fn test_provider_install_runs_on_start() {
        let (mut app, _) = app_with_stub();
        app.container().define(&AUDIT, &[], |_| {
            Ok(AuditProvider {
                installed: AtomicBool::new(false),
            })
        });
        app.use_provider(ProviderBuilder::new(AUDIT).build()).unwrap();

        let provider = app.make(&AUDIT).unwrap();
        assert!(!provider.installed.load(Ordering::SeqCst));

        app.start().await.unwrap();
        assert!(provider.installed.load(Ordering::SeqCst));
        app.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_provider_middleware_is_mounted_at_use_time() {
        let (mut app, _) = app_with_stub();
        let middleware_count = {
            // Reach into the stub before it is boxed is not possible here,
            // so count through a second registration path instead.
            let stub = StubServer::default();
            let count = stub.middleware_count.clone();
            app.set_http_server(Box::new(stub)).unwrap();
            count
        };
        app.container().define(&AUDIT, &[], |_| {
            Ok(AuditProvider {
                installed: AtomicBool::new(false),
            })
        });

        let registration = ProviderBuilder::new(AUDIT)
            .middleware("handle", &[], |_, request, next, _| async move {
                next.run(request).await
            })
            .build();
        app.use_provider(registration).unwrap();
        assert_eq!(*middleware_count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let (mut app, _) = app_with_stub();
        app.start().await.unwrap();
        assert!(app.running());

        let err = app.start().await.unwrap_err();
        assert!(matches!(err, TrellisError::AlreadyRunning));
        app.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_start_fails() {
        let (mut app, _) = app_with_stub();
        let err = app.stop().await.unwrap_err();
        assert!(matches!(err, TrellisError::NotRunning));
    }

    #[tokio::test]
    async fn test_http_server_cannot_change_while_running() {
        let (mut app, _) = app_with_stub();
        app.start().await.unwrap();

        let err = app.set_http_server(Box::new(StubServer::default())).unwrap_err();
        assert!(matches!(err, TrellisError::AlreadyRunning));
        app.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_use_while_running_fails() {
        let (mut app, _) = app_with_stub();
        app.register_controller(user_controller()).unwrap();
        app.start().await.unwrap();

        let err = app.use_token(&USERS.erased()).unwrap_err();
        assert!(matches!(err, TrellisError::AlreadyRunning));
        app.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_use_provider_instance() {
        let (mut app, _) = app_with_stub();
        app.register_provider(ProviderBuilder::new(AUDIT).build()).unwrap();

        let instance = Arc::new(AuditProvider {
            installed: AtomicBool::new(false),
        });
        app.use_provider_instance(&AUDIT, instance.clone()).unwrap();

        app.start().await.unwrap();
        assert!(instance.installed.load(Ordering::SeqCst));
        app.stop().await.unwrap();
    }
}
