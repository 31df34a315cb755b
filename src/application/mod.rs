pub mod cli;
pub mod web;

pub use cli::{CliApplication, Command, CommandRegistration, create_cli_application};
pub use web::{WebApplication, create_web_application};
