use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrellisError>;

#[derive(Debug, Error)]
pub enum TrellisError {
    #[error("Dependency not found: {token}")]
    DependencyNotFound { token: String },

    #[error("\"{token}\" does not have a registered instance or is not expected by the container")]
    InstanceNotFound { token: String },

    #[error("Failed to downcast instance of: {token}")]
    DowncastFailed { token: String },

    #[error("Circular dependency detected: {chain}")]
    CircularDependency { chain: String },

    #[error("{token} can only have one classType")]
    DuplicateClassType { token: String },

    #[error("{token} does not have controller metadata")]
    ControllerMetadataMissing { token: String },

    #[error("{token} does not have provider metadata")]
    ProviderMetadataMissing { token: String },

    #[error("{token} does not have command metadata")]
    CommandMetadataMissing { token: String },

    #[error("Only one http method can be bound to \"{action}\" of {controller}")]
    DuplicateAction { controller: String, action: String },

    #[error("{controller} does not have a \"{action}\" handler")]
    MissingAction { controller: String, action: String },

    #[error("{token} does not have a valid middleware")]
    InvalidMiddleware { token: String },

    #[error("{token} is not registered as {expected}")]
    InvalidClassType {
        token: String,
        expected: &'static str,
    },

    #[error("Cannot use {token} as a dependency")]
    InvalidDependency { token: String },

    #[error("Application is already running")]
    AlreadyRunning,

    #[error("Application is not yet running")]
    NotRunning,

    #[error("HttpServer is not set")]
    HttpServerNotSet,

    #[error("Cannot call .start() twice. Http server is already running")]
    ServerAlreadyRunning,

    #[error("Http server is not yet running")]
    ServerNotRunning,

    #[error("Invalid server address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cli(#[from] clap::Error),

    #[error(transparent)]
    Command(#[from] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "sea-orm-db")]
impl From<sea_orm::DbErr> for TrellisError {
    fn from(err: sea_orm::DbErr) -> Self {
        TrellisError::Internal(format!("Database error: {}", err))
    }
}

impl axum::response::IntoResponse for TrellisError {
    fn into_response(self) -> axum::response::Response {
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            self.to_string(),
        )
            .into_response()
    }
}
