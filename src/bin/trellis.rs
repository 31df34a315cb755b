use trellis::application::cli::{CommandRegistration, create_cli_application};
use trellis::commands::{CREATE_PROJECT, CreateProjectCommand};

async fn run() -> trellis::Result<()> {
    let mut app = create_cli_application(
        "trellis",
        vec![CommandRegistration::with_constructor(
            CREATE_PROJECT,
            "create:project",
            CreateProjectCommand::default,
        )],
    )?;
    app.start(std::env::args()).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    if let Err(error) = run().await {
        eprintln!("{error}");
        std::process::exit(1);
    }
}
