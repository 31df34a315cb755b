use crate::application::cli::Command;
use crate::token::Token;
use async_trait::async_trait;
use clap::{Arg, ArgMatches};
use std::path::PathBuf;

pub const CREATE_PROJECT: Token<CreateProjectCommand> = Token::new("CreateProjectCommand");

/// `create:project <name>` — scaffold a new application skeleton.
///
/// Skips silently when the target directory already exists; otherwise lays
/// down the conventional layout (`src/controllers`, `src/middleware`,
/// `src/services`) with a manifest, an entrypoint and a home controller.
pub struct CreateProjectCommand {
    base_dir: PathBuf,
}

impl CreateProjectCommand {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl Default for CreateProjectCommand {
    fn default() -> Self {
        Self::new(".")
    }
}

#[async_trait]
impl Command for CreateProjectCommand {
    fn build(&self, command: clap::Command) -> clap::Command {
        command
            .about("Scaffold a new project")
            .arg(Arg::new("name").required(true).help("Project name"))
    }

    async fn execute(&self, matches: &ArgMatches) -> anyhow::Result<()> {
        let name = matches
            .get_one::<String>("name")
            .ok_or_else(|| anyhow::anyhow!("project name is required"))?;
        let root = self.base_dir.join(name);

        if tokio::fs::try_exists(&root).await? {
            tracing::warn!(project = %name, "directory already exists, skipping");
            return Ok(());
        }

        for dir in ["src/controllers", "src/middleware", "src/services"] {
            tokio::fs::create_dir_all(root.join(dir)).await?;
        }

        tokio::fs::write(root.join("Cargo.toml"), manifest(name)).await?;
        tokio::fs::write(root.join("src/main.rs"), MAIN_RS).await?;
        tokio::fs::write(root.join("src/controllers/home.rs"), HOME_CONTROLLER_RS).await?;

        tracing::info!(project = %name, path = %root.display(), "project created");
        Ok(())
    }
}

fn manifest(name: &str) -> String {
    format!(
        r#"[package]
name = "{name}"
version = "0.1.0"
edition = "2024"

[dependencies]
trellis = "0.1"
tokio = {{ version = "1", features = ["full"] }}
"#
    )
}

const MAIN_RS: &str = r#"mod controllers;

use trellis::application::web::create_web_application;
use trellis::config::ConfigData;
use trellis::http::axum::AxumServer;

#[tokio::main]
async fn main() -> trellis::Result<()> {
    let mut app = create_web_application(AxumServer::new(), ConfigData::default());
    controllers::home::register(&mut app)?;
    app.start().await?;
    tokio::signal::ctrl_c().await?;
    app.stop().await
}
"#;

const HOME_CONTROLLER_RS: &str = r#"use trellis::application::web::WebApplication;
use trellis::http::ControllerBuilder;
use trellis::token::Token;

pub struct HomeController;

pub const HOME: Token<HomeController> = Token::new("HomeController");

pub fn register(app: &mut WebApplication) -> trellis::Result<()> {
    app.container().define(&HOME, &[], |_| Ok(HomeController));
    let registration = ControllerBuilder::new(HOME, "/")
        .get("/", "index", &[], |_, _, _| async { "Hello, world!" })
        .build()?;
    app.use_controller(registration)
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Command as ClapCommand;

    fn matches_for(name: &str, command: &CreateProjectCommand) -> ArgMatches {
        command
            .build(ClapCommand::new("create:project"))
            .try_get_matches_from(["create:project", name])
            .unwrap()
    }

    #[tokio::test]
    async fn test_scaffolds_the_expected_layout() {
        let dir = tempfile::tempdir().unwrap();
        let command = CreateProjectCommand::new(dir.path());

        let matches = matches_for("blog", &command);
        command.execute(&matches).await.unwrap();

        let root = dir.path().join("blog");
        assert!(root.join("Cargo.toml").exists());
        assert!(root.join("src/main.rs").exists());
        assert!(root.join("src/controllers/home.rs").exists());
        assert!(root.join("src/middleware").is_dir());
        assert!(root.join("src/services").is_dir());

        let manifest = std::fs::read_to_string(root.join("Cargo.toml")).unwrap();
        assert!(manifest.contains("name = \"blog\""));
    }

    #[tokio::test]
    async fn test_existing_directory_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("blog");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("keep.txt"), "keep").unwrap();

        let command = CreateProjectCommand::new(dir.path());
        let matches = matches_for("blog", &command);
        command.execute(&matches).await.unwrap();

        assert!(root.join("keep.txt").exists());
        assert!(!root.join("Cargo.toml").exists());
    }

    #[tokio::test]
    async fn test_missing_name_is_a_parse_error() {
        let command = CreateProjectCommand::default();
        let result = command
            .build(ClapCommand::new("create:project"))
            .try_get_matches_from(["create:project"]);
        assert!(result.is_err());
    }
}
