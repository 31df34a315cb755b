//! # Trellis
//!
//! A registration-driven application framework for Rust: a dependency
//! injection container with explicit token-based wiring, metadata-backed
//! controllers and middleware over an HTTP transport, and a CLI command
//! registrar.
//!
//! Components are identified by [`Token`]s, declared with explicit
//! dependency lists, and constructed lazily by the [`Container`] on first
//! resolution. Controllers and providers are described by builders and
//! mounted onto an [`http::HttpServer`] through a [`WebApplication`];
//! commands attach to a [`CliApplication`] the same way.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trellis::application::web::create_web_application;
//! use trellis::config::ConfigData;
//! use trellis::http::ControllerBuilder;
//! use trellis::http::axum::AxumServer;
//! use trellis::token::Token;
//!
//! struct HomeController;
//! const HOME: Token<HomeController> = Token::new("HomeController");
//!
//! #[tokio::main]
//! async fn main() -> trellis::Result<()> {
//!     let mut app = create_web_application(AxumServer::new(), ConfigData::default());
//!     app.container().define(&HOME, &[], |_| Ok(HomeController));
//!
//!     let home = ControllerBuilder::new(HOME, "/")
//!         .get("/", "index", &[], |_, _, _| async { "Hello, world!" })
//!         .build()?;
//!     app.use_controller(home)?;
//!
//!     app.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     app.stop().await
//! }
//! ```

pub mod application;
pub mod commands;
pub mod config;
pub mod container;
pub mod error;
pub mod http;
pub mod metadata;
pub mod provider;
pub mod providers;
pub mod token;

// Re-export core types
pub use application::{CliApplication, Command, CommandRegistration, WebApplication};
pub use application::cli::create_cli_application;
pub use application::web::create_web_application;
pub use container::{Container, Deps};
pub use error::{Result, TrellisError};
pub use provider::{Provider, ProviderBuilder, ProviderRegistration};
pub use token::{DynToken, Token};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use trellis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::application::cli::{
        CliApplication, Command, CommandRegistration, create_cli_application,
    };
    pub use crate::application::web::{WebApplication, create_web_application};
    pub use crate::config::{CONFIG, Config, ConfigData, HttpConfig};
    pub use crate::container::{Container, Deps};
    pub use crate::error::{Result, TrellisError};
    pub use crate::http::{ControllerBuilder, ControllerRegistration, HttpMethod, HttpServer};
    pub use crate::http::axum::AxumServer;
    pub use crate::metadata::{ClassType, Metadata, MetadataRegistry};
    pub use crate::provider::{Provider, ProviderBuilder, ProviderRegistration};
    pub use crate::token::{DynToken, Token};
    pub use async_trait::async_trait;
    pub use axum::{
        Json,
        extract::Request,
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    pub use std::sync::Arc;
}
