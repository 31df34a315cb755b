use crate::container::Container;
use crate::error::Result;
use crate::provider::Provider;
use crate::token::Token;
use async_trait::async_trait;
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;

pub const DATABASE: Token<DatabaseConnection> = Token::new("DatabaseConnection");

/// Provider installing a SeaORM connection under [`DATABASE`].
///
/// The connection is opened once, during [`Provider::install`], and shared
/// through the container afterwards.
pub struct DatabaseProvider {
    url: String,
}

impl DatabaseProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Provider for DatabaseProvider {
    async fn install(&self, container: &Container) -> Result<()> {
        let connection = Database::connect(self.url.as_str()).await?;
        container.set(&DATABASE, Arc::new(connection));
        tracing::info!("database connection established");
        Ok(())
    }
}
