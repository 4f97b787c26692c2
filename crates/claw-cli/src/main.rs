//! Claw CLI: drive Workflow Claw from the terminal.
//!
//! Register project folders and agent CLI providers, import step graphs
//! from YAML and execute them against a goal.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use claw_cli::commands;
use claw_core::config::ClawConfig;

/// Workflow Claw: run LLM agent CLIs as steps of a workflow graph
#[derive(Parser)]
#[command(name = "claw", version, about = "Workflow Claw: run LLM agent CLIs as steps of a workflow graph")]
pub struct Cli {
    /// Path to the SQLite database file (default: ~/.workflow-claw/data.db)
    #[arg(long, env = "CLAW_DB_PATH", global = true)]
    db: Option<PathBuf>,

    /// Use canned agent and skill results instead of spawning processes
    #[arg(long, env = "CLAW_FAKE_CLI", global = true)]
    fake_cli: bool,

    /// Vault passphrase for provider credentials
    #[arg(long, env = "CLAW_VAULT_PASSPHRASE", global = true, hide_env_values = true)]
    passphrase: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage project folders
    Folder {
        #[command(subcommand)]
        action: FolderAction,
    },

    /// Manage agent CLI providers
    Provider {
        #[command(subcommand)]
        action: ProviderAction,
    },

    /// Import and inspect workflows
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },

    /// Manage the credential vault
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },

    /// Execute a workflow against a goal
    Run {
        /// Workflow ID
        workflow_id: String,
        /// What the run should achieve
        #[arg(long)]
        goal: String,
    },

    /// Inspect runs
    Runs {
        #[command(subcommand)]
        action: RunsAction,
    },
}

#[derive(Subcommand)]
enum FolderAction {
    /// Register a project folder
    Add {
        path: String,
        #[arg(long)]
        label: Option<String>,
    },
    /// List registered folders
    List,
}

#[derive(Subcommand)]
enum ProviderAction {
    /// Register a provider
    Add {
        /// Unique provider name
        #[arg(long)]
        name: String,
        /// Executable plus base arguments (e.g. "npx codex")
        #[arg(long)]
        cli: String,
        /// Invocation template (e.g. "--model {{model}} -p {{prompt}}")
        #[arg(long)]
        template: String,
        /// Default model
        #[arg(long)]
        model: Option<String>,
        /// Environment variable as KEY=VALUE, stored encrypted (repeatable)
        #[arg(long = "env")]
        env: Vec<String>,
    },
    /// Replace a provider's encrypted environment (no --env clears it)
    SetEnv {
        name: String,
        #[arg(long = "env")]
        env: Vec<String>,
    },
    /// Remove a provider
    Remove { name: String },
    /// List providers
    List,
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// Import a workflow from a YAML file
    Import { file: String },
    /// List workflows
    List,
    /// Show a workflow with its steps and edges
    Show { id: String },
    /// Delete a workflow with its steps and edges
    Delete { id: String },
}

#[derive(Subcommand)]
enum VaultAction {
    /// Set (first use) or verify the passphrase
    Unlock,
    /// Show whether a passphrase has been set
    Status,
}

#[derive(Subcommand)]
enum RunsAction {
    /// Show a run with its step runs
    Show { run_id: String },
    /// List the runs of a workflow
    List { workflow_id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "claw_core=info,claw_cli=info".into()),
        )
        .init();

    let mut config = ClawConfig::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    config.fake_cli |= cli.fake_cli;

    let state = commands::init_state(&config);
    let passphrase = cli.passphrase.as_deref();

    let result = match cli.command {
        Commands::Folder { action } => match action {
            FolderAction::Add { path, label } => {
                commands::folder::add(&state, &path, label.as_deref()).await.map(|_| ())
            }
            FolderAction::List => commands::folder::list(&state).await,
        },

        Commands::Provider { action } => match action {
            ProviderAction::Add {
                name,
                cli,
                template,
                model,
                env,
            } => commands::provider::add(
                &state,
                &name,
                &cli,
                &template,
                model.as_deref(),
                &env,
                passphrase,
            )
            .await
            .map(|_| ()),
            ProviderAction::SetEnv { name, env } => {
                commands::provider::set_env(&state, &name, &env, passphrase).await
            }
            ProviderAction::Remove { name } => commands::provider::remove(&state, &name).await,
            ProviderAction::List => commands::provider::list(&state).await,
        },

        Commands::Workflow { action } => match action {
            WorkflowAction::Import { file } => {
                commands::workflow::import(&state, &file).await.map(|_| ())
            }
            WorkflowAction::List => commands::workflow::list(&state).await,
            WorkflowAction::Show { id } => commands::workflow::show(&state, &id).await,
            WorkflowAction::Delete { id } => commands::workflow::delete(&state, &id).await,
        },

        Commands::Vault { action } => match action {
            VaultAction::Unlock => commands::vault::unlock(&state, passphrase).await,
            VaultAction::Status => commands::vault::status(&state).await,
        },

        Commands::Run { workflow_id, goal } => {
            commands::run::run(&state, &workflow_id, &goal, passphrase)
                .await
                .map(|_| ())
        }

        Commands::Runs { action } => match action {
            RunsAction::Show { run_id } => commands::runs::show(&state, &run_id).await,
            RunsAction::List { workflow_id } => commands::runs::list(&state, &workflow_id).await,
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
