#[cfg(feature = "sea-orm-db")]
pub mod database;
