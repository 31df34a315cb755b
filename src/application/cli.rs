use crate::container::Container;
use crate::error::{Result, TrellisError};
use crate::metadata::{ClassType, CommandDetails, Metadata, MetadataRegistry};
use crate::token::{DynToken, Token};
use async_trait::async_trait;
use clap::ArgMatches;
use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::Arc;

/// A CLI subcommand resolved through the container.
///
/// `build` decorates the generated clap subcommand with arguments and help
/// text; `execute` runs when the subcommand is selected.
#[async_trait]
pub trait Command: Send + Sync + 'static {
    fn build(&self, command: clap::Command) -> clap::Command {
        command
    }

    async fn execute(&self, matches: &ArgMatches) -> anyhow::Result<()>;
}

pub(crate) type CommandResolver =
    Arc<dyn Fn(&Container) -> Result<Arc<dyn Command>> + Send + Sync>;

/// Everything needed to register a command: the token, its subcommand name
/// and a resolver producing the trait object from the container.
pub struct CommandRegistration {
    pub(crate) token: DynToken,
    pub(crate) details: CommandDetails,
    pub(crate) resolver: CommandResolver,
    pub(crate) definer: Option<Arc<dyn Fn(&Container) + Send + Sync>>,
}

impl CommandRegistration {
    pub fn new<C: Command>(token: Token<C>, name: &str) -> Self {
        let resolver: CommandResolver =
            Arc::new(move |container| Ok(container.resolve(&token)? as Arc<dyn Command>));
        Self {
            token: token.erased(),
            details: CommandDetails {
                name: name.to_string(),
            },
            resolver,
            definer: None,
        }
    }

    /// Registration that also carries the command's constructor, so the
    /// container definition happens at registration time.
    pub fn with_constructor<C, F>(token: Token<C>, name: &str, ctor: F) -> Self
    where
        C: Command,
        F: Fn() -> C + Send + Sync + 'static,
    {
        let mut registration = Self::new(token, name);
        let ctor = Arc::new(ctor);
        registration.definer = Some(Arc::new(move |container| {
            let ctor = ctor.clone();
            container.define(&token, &[], move |_| Ok(ctor()));
        }));
        registration
    }

    pub fn token(&self) -> DynToken {
        self.token
    }
}

/// The command-line application: a [`Container`], a [`MetadataRegistry`] and
/// a clap command tree, wired together by explicit registration calls.
pub struct CliApplication {
    container: Container,
    registry: MetadataRegistry,
    program: clap::Command,
    commands: HashMap<String, Arc<dyn Command>>,
    resolvers: HashMap<&'static str, CommandResolver>,
}

impl CliApplication {
    pub fn new(name: &str) -> Self {
        Self {
            container: Container::new(),
            registry: MetadataRegistry::new(),
            program: clap::Command::new(name.to_string()).subcommand_required(true),
            commands: HashMap::new(),
            resolvers: HashMap::new(),
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    /// Record a command's metadata without attaching it to the program.
    pub fn register_command(&mut self, registration: CommandRegistration) -> Result<()> {
        let id = registration.token.id();
        self.registry
            .set_class_metadata(id, Metadata::ClassType(ClassType::Command))?;
        self.registry
            .set_class_metadata(id, Metadata::Command(registration.details))?;
        if let Some(definer) = &registration.definer {
            definer(&self.container);
        }
        self.resolvers.insert(id, registration.resolver);
        Ok(())
    }

    /// Resolve a previously registered command and attach it as a
    /// subcommand. The instance decides its own arguments through
    /// [`Command::build`].
    pub fn use_token(&mut self, token: &DynToken) -> Result<()> {
        if self.registry.class_type(token.id()) != Some(ClassType::Command) {
            return Err(TrellisError::InvalidClassType {
                token: token.id().to_string(),
                expected: "a command",
            });
        }
        let details = self.registry.command_details(token.id()).ok_or_else(|| {
            TrellisError::CommandMetadataMissing {
                token: token.id().to_string(),
            }
        })?;
        let resolver = self.resolvers.get(token.id()).cloned().ok_or_else(|| {
            TrellisError::CommandMetadataMissing {
                token: token.id().to_string(),
            }
        })?;

        let instance = resolver(&self.container)?;
        let subcommand = instance.build(clap::Command::new(details.name.clone()));
        self.program = self.program.clone().subcommand(subcommand);
        self.commands.insert(details.name, instance);
        tracing::debug!(command = %token.id(), "command attached");
        Ok(())
    }

    /// Register and attach a command in one call.
    pub fn use_command(&mut self, registration: CommandRegistration) -> Result<()> {
        let token = registration.token;
        self.register_command(registration)?;
        self.use_token(&token)
    }

    /// The attached subcommand names, in attachment order.
    pub fn commands(&self) -> Vec<String> {
        self.program
            .get_subcommands()
            .map(|command| command.get_name().to_string())
            .collect()
    }

    /// Parse `argv` and dispatch to the selected subcommand.
    pub async fn start<I, T>(&mut self, argv: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self.program.clone().try_get_matches_from(argv)?;
        if let Some((name, sub_matches)) = matches.subcommand() {
            if let Some(command) = self.commands.get(name) {
                tracing::info!(command = %name, "running command");
                command.execute(sub_matches).await?;
            }
        }
        Ok(())
    }
}

/// Build a [`CliApplication`] with the given commands registered and
/// attached.
pub fn create_cli_application(
    name: &str,
    registrations: Vec<CommandRegistration>,
) -> Result<CliApplication> {
    let mut application = CliApplication::new(name);
    for registration in registrations {
        application.use_command(registration)?;
    }
    Ok(application)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Arg;
    use std::sync::Mutex;

    struct GreetCommand {
        seen: Arc<Mutex<Option<String>>>,
    }

    #[async_trait]
    impl Command for GreetCommand {
        fn build(&self, command: clap::Command) -> clap::Command {
            command.arg(Arg::new("name").required(true))
        }

        async fn execute(&self, matches: &ArgMatches) -> anyhow::Result<()> {
            let name = matches.get_one::<String>("name").cloned();
            *self.seen.lock().unwrap() = name;
            Ok(())
        }
    }

    struct NoopCommand;

    #[async_trait]
    impl Command for NoopCommand {
        async fn execute(&self, _matches: &ArgMatches) -> anyhow::Result<()> {
            Ok(())
        }
    }

    const GREET: Token<GreetCommand> = Token::new("GreetCommand");
    const NOOP: Token<NoopCommand> = Token::new("NoopCommand");

    #[tokio::test]
    async fn test_dispatches_to_the_selected_command() {
        let seen = Arc::new(Mutex::new(None));
        let captured = seen.clone();

        let mut app = CliApplication::new("trellis");
        app.container()
            .define(&GREET, &[], move |_| Ok(GreetCommand { seen: captured.clone() }));
        app.use_command(CommandRegistration::new(GREET, "greet")).unwrap();

        app.start(["trellis", "greet", "world"]).await.unwrap();
        assert_eq!(seen.lock().unwrap().as_deref(), Some("world"));
    }

    #[tokio::test]
    async fn test_commands_are_listed_in_attachment_order() {
        let seen = Arc::new(Mutex::new(None));
        let captured = seen.clone();

        let mut app = CliApplication::new("trellis");
        app.container()
            .define(&GREET, &[], move |_| Ok(GreetCommand { seen: captured.clone() }));
        app.container().define(&NOOP, &[], |_| Ok(NoopCommand));

        app.use_command(CommandRegistration::new(NOOP, "noop")).unwrap();
        app.use_command(CommandRegistration::new(GREET, "greet")).unwrap();
        assert_eq!(app.commands(), ["noop", "greet"]);
    }

    #[tokio::test]
    async fn test_unregistered_token_is_rejected() {
        let mut app = CliApplication::new("trellis");
        let err = app.use_token(&NOOP.erased()).unwrap_err();
        assert!(matches!(err, TrellisError::InvalidClassType { .. }));
    }

    #[tokio::test]
    async fn test_command_metadata_missing() {
        let mut app = CliApplication::new("trellis");
        app.registry
            .set_class_metadata(NOOP.id(), Metadata::ClassType(ClassType::Command))
            .unwrap();

        let err = app.use_token(&NOOP.erased()).unwrap_err();
        assert!(matches!(err, TrellisError::CommandMetadataMissing { .. }));
    }

    #[tokio::test]
    async fn test_unknown_subcommand_is_a_cli_error() {
        let mut app = CliApplication::new("trellis");
        app.container().define(&NOOP, &[], |_| Ok(NoopCommand));
        app.use_command(CommandRegistration::new(NOOP, "noop")).unwrap();

        let err = app.start(["trellis", "missing"]).await.unwrap_err();
        assert!(matches!(err, TrellisError::Cli(_)));
    }

    #[tokio::test]
    async fn test_create_cli_application_with_constructors() {
        let mut app = create_cli_application(
            "trellis",
            vec![CommandRegistration::with_constructor(NOOP, "noop", || NoopCommand)],
        )
        .unwrap();

        assert_eq!(app.commands(), ["noop"]);
        app.start(["trellis", "noop"]).await.unwrap();
    }

    #[tokio::test]
    async fn test_command_must_be_defined_in_the_container() {
        let mut app = CliApplication::new("trellis");
        let err = app
            .use_command(CommandRegistration::new(NOOP, "noop"))
            .unwrap_err();
        assert!(matches!(err, TrellisError::DependencyNotFound { .. }));
    }
}
