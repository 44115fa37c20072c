//! Keyhold CLI - manage the access keys of automation projects

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use keyhold_core::config::Config;
use keyhold_core::domain::events::EventRecorder;
use keyhold_core::domain::keys::{
    AccessKey, DeleteMode, KeyContext, KeyId, KeyLifecycleManager, KeyPayload,
    KeyQueryService, KeyRepository, ProjectId,
};
use keyhold_core::domain::projects::ProjectRepository;
use keyhold_core::infrastructure::events::SqliteEventRepository;
use keyhold_core::infrastructure::keys::SqliteKeyRepository;
use keyhold_core::infrastructure::projects::SqliteProjectRepository;
use keyhold_core::storage::{Database, DatabaseConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "keyhold")]
#[command(author, version, about = "Access key management for automation projects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Database file, overriding the configured one
    #[arg(long, global = true, value_name = "PATH")]
    database: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects
    Projects {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Manage a project's access keys
    Keys {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Show a project's audit trail
    Events {
        #[command(subcommand)]
        action: EventAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a project
    Add {
        /// Project name
        name: String,
    },
    /// List all projects
    List,
}

#[derive(Subcommand)]
enum KeyAction {
    /// List keys, or show a single key with --key
    List {
        #[arg(long)]
        project: i64,
        /// Show only this key
        #[arg(long)]
        key: Option<i64>,
        /// Sort field (name or type)
        #[arg(long)]
        sort: Option<String>,
        /// Sort order (asc or desc)
        #[arg(long)]
        order: Option<String>,
    },
    /// Create a key
    Add {
        #[arg(long)]
        project: i64,
        #[command(flatten)]
        input: KeyInput,
    },
    /// Replace a key's name, type and secret
    Update {
        #[arg(long)]
        project: i64,
        #[arg(long)]
        key: i64,
        #[command(flatten)]
        input: KeyInput,
    },
    /// Remove a key
    Remove {
        #[arg(long)]
        project: i64,
        #[arg(long)]
        key: i64,
        /// Delete the record instead of marking it removed
        #[arg(long)]
        hard: bool,
    },
    /// Show which entities reference a key
    Usage {
        #[arg(long)]
        project: i64,
        #[arg(long)]
        key: i64,
    },
}

#[derive(Args)]
struct KeyInput {
    /// Key name
    #[arg(long, required_unless_present = "payload")]
    name: Option<String>,
    /// Key type (ssh, aws, gcloud, do)
    #[arg(long = "type", value_name = "TYPE", required_unless_present = "payload")]
    key_type: Option<String>,
    /// Secret material
    #[arg(long, conflicts_with = "secret_file")]
    secret: Option<String>,
    /// Read the secret from a file (`-` for stdin)
    #[arg(long, value_name = "PATH")]
    secret_file: Option<PathBuf>,
    /// JSON key body with project_id, name, type and secret (`-` for stdin)
    #[arg(long, value_name = "PATH", conflicts_with_all = ["name", "key_type", "secret", "secret_file"])]
    payload: Option<PathBuf>,
}

#[derive(Subcommand)]
enum EventAction {
    /// List recent events, newest first
    List {
        #[arg(long)]
        project: i64,
        /// Maximum number of events
        #[arg(long)]
        limit: Option<u32>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Show config file path
    Path,
}

/// Repositories and services over one database
struct App {
    projects: SqliteProjectRepository,
    keys: Arc<SqliteKeyRepository>,
    lifecycle: KeyLifecycleManager,
    query: KeyQueryService,
    events: Arc<SqliteEventRepository>,
}

impl App {
    async fn open(config: &Config, database: Option<PathBuf>) -> anyhow::Result<Self> {
        let db_config = match database {
            Some(path) => {
                DatabaseConfig::with_path(path).max_connections(config.database.max_connections)
            }
            None => config.database_config(),
        };
        let db = Database::new(db_config).await?;

        let keys = Arc::new(SqliteKeyRepository::new(db.pool().clone()));
        let events = Arc::new(SqliteEventRepository::new(db.pool().clone()));

        Ok(Self {
            projects: SqliteProjectRepository::new(db.pool().clone()),
            lifecycle: KeyLifecycleManager::new(keys.clone(), events.clone()),
            query: KeyQueryService::new(keys.clone()),
            keys,
            events,
        })
    }

    /// Resolve a key within an existing project
    async fn context(&self, project: i64, key: i64) -> keyhold_core::Result<KeyContext> {
        let project_id = self.projects.require(ProjectId(project)).await?.id;
        KeyContext::resolve(self.keys.as_ref(), project_id, KeyId(key)).await
    }
}

impl KeyInput {
    fn into_payload(self, project_id: ProjectId) -> anyhow::Result<KeyPayload> {
        if let Some(path) = self.payload {
            let body = read_input(&path)?;
            return serde_json::from_str(&body).context("Failed to parse key payload");
        }

        let name = self.name.context("--name is required")?;
        let key_type = self.key_type.context("--type is required")?;
        let mut payload = KeyPayload::new(name, key_type).with_project(project_id);

        if let Some(secret) = self.secret {
            payload = payload.with_secret(secret);
        } else if let Some(path) = self.secret_file {
            payload = payload.with_secret(read_input(&path)?);
        }
        Ok(payload)
    }
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout stays parseable
    let filter = match "keyhold=info".parse::<tracing_subscriber::filter::Directive>() {
        Ok(directive) => tracing_subscriber::EnvFilter::from_default_env().add_directive(directive),
        Err(_) => tracing_subscriber::EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, format);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let output = Output {
        format: cli.format,
        quiet: cli.quiet,
    };

    // Config commands must work without a database
    let command = match cli.command {
        Commands::Config { action } => return cmd_config(action, output),
        command => command,
    };

    let config = Config::load()?;
    let app = App::open(&config, cli.database).await?;

    match command {
        Commands::Projects { action } => cmd_projects(&app, action, output).await,
        Commands::Keys { action } => cmd_keys(&app, &config, action, output).await,
        Commands::Events { action } => cmd_events(&app, action, output).await,
        Commands::Config { action } => cmd_config(action, output),
    }
}

fn report_error(err: &anyhow::Error, format: OutputFormat) {
    let Some(core) = err.downcast_ref::<keyhold_core::Error>() else {
        eprintln!("Error: {:#}", err);
        return;
    };

    match format {
        OutputFormat::Json => match serde_json::to_string(&core.to_response()) {
            Ok(body) => eprintln!("{}", body),
            Err(_) => eprintln!("Error [{}]: {}", core.code(), core),
        },
        OutputFormat::Text => {
            eprintln!("Error [{}]: {}", core.code(), core.to_response().error);
            if let Some(hint) = core.suggestion() {
                eprintln!("Hint: {}", hint);
            }
        }
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    fn json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    fn print_json(&self, value: &impl serde::Serialize) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn note(&self, message: impl std::fmt::Display) {
        if !self.quiet {
            println!("{}", message);
        }
    }
}

fn key_line(key: &AccessKey) -> String {
    let removed = if key.removed { "  (removed)" } else { "" };
    format!("{:>4}  {:<6}  {}{}", key.id.0, key.key_type.as_str(), key.name, removed)
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_projects(app: &App, action: ProjectAction, output: Output) -> anyhow::Result<()> {
    match action {
        ProjectAction::Add { name } => {
            let project = app.projects.create(&name).await?;
            if output.json() {
                output.print_json(&project)?;
            } else {
                output.note(format!("Created project {} ({})", project.name, project.id));
            }
        }
        ProjectAction::List => {
            let projects = app.projects.list().await?;
            if output.json() {
                output.print_json(&projects)?;
            } else if projects.is_empty() {
                output.note("No projects found.");
            } else {
                for project in projects {
                    println!("{:>4}  {}", project.id.0, project.name);
                }
            }
        }
    }
    Ok(())
}

async fn cmd_keys(app: &App, config: &Config, action: KeyAction, output: Output) -> anyhow::Result<()> {
    match action {
        KeyAction::List {
            project,
            key,
            sort,
            order,
        } => {
            let project_id = app.projects.require(ProjectId(project)).await?.id;
            let context = match key {
                Some(key) => Some(app.context(project, key).await?),
                None => None,
            };
            let params = config.query_params(sort.as_deref(), order.as_deref());
            let listing = app.query.list(project_id, &params, context.as_ref()).await?;

            if output.json() {
                output.print_json(&listing)?;
            } else if listing.is_empty() {
                output.note("No access keys found.");
            } else {
                for key in listing.into_vec() {
                    println!("{}", key_line(&key));
                }
            }
        }

        KeyAction::Add { project, input } => {
            let project_id = app.projects.require(ProjectId(project)).await?.id;
            let payload = input.into_payload(project_id)?;
            let key = app.lifecycle.create(project_id, payload).await?;
            info!(project_id = %project_id, key_id = %key.id, "Access key added");

            if output.json() {
                output.print_json(&key.redacted())?;
            } else {
                output.note(format!("Created access key {} ({})", key.name, key.id));
            }
        }

        KeyAction::Update {
            project,
            key,
            input,
        } => {
            let context = app.context(project, key).await?;
            let payload = input.into_payload(context.project_id())?;
            let updated = app.lifecycle.update(context.key(), payload).await?;

            if output.json() {
                output.print_json(&updated.redacted())?;
            } else {
                output.note(format!("Updated access key {} ({})", updated.name, updated.id));
            }
        }

        KeyAction::Remove { project, key, hard } => {
            let context = app.context(project, key).await?;
            let mode = if hard { DeleteMode::Hard } else { DeleteMode::Soft };
            app.lifecycle.delete(context.key(), mode).await?;

            if output.json() {
                output.print_json(&serde_json::json!({
                    "id": context.key().id,
                    "removed": true,
                    "hard": hard,
                }))?;
            } else {
                output.note(format!("Removed access key {} ({})", context.key().name, context.key().id));
            }
        }

        KeyAction::Usage { project, key } => {
            let context = app.context(project, key).await?;
            let usage = app.keys.usage(context.project_id(), context.key().id).await?;

            if output.json() {
                output.print_json(&usage)?;
            } else {
                println!("{}", usage);
            }
        }
    }
    Ok(())
}

async fn cmd_events(app: &App, action: EventAction, output: Output) -> anyhow::Result<()> {
    match action {
        EventAction::List { project, limit } => {
            let project_id = app.projects.require(ProjectId(project)).await?.id;
            let events = app.events.list(project_id, limit).await?;

            if output.json() {
                output.print_json(&events)?;
            } else if events.is_empty() {
                output.note("No events recorded.");
            } else {
                for event in events {
                    println!("{}  {}", event.created.format("%Y-%m-%d %H:%M:%S"), event.description);
                }
            }
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, output: Output) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            output.note(format!("Set {} = {}", key, value));
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list() {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path()?.display());
        }
    }
    Ok(())
}
