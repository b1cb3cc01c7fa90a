//! Weft CLI: inspect, deploy and run compiled flow specs.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use weft::{
    deploy, CompiledSpec, EngineConfig, FixSuggestion, HttpEngineClient, InvokeOptions,
    RemoteInvocationError,
};

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Compile, deploy and run flow specs", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a summary of a compiled spec file
    Inspect {
        /// Spec file (.json or .yaml)
        file: PathBuf,
    },
    /// Deploy a compiled spec to the engine
    Deploy {
        /// Spec file (.json or .yaml)
        file: PathBuf,
    },
    /// Deploy a spec and run it to completion
    Run {
        /// Spec file (.json or .yaml)
        file: PathBuf,

        /// Input payload as inline JSON
        #[arg(long, default_value = "{}")]
        input: String,

        /// Ask the engine to record per-node traces
        #[arg(long)]
        debug: bool,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Inspect { file } => inspect(&file),
        Commands::Deploy { file } => deploy_spec(&file).await,
        Commands::Run {
            file,
            input,
            debug,
            timeout,
        } => run_spec(&file, &input, debug, timeout).await,
    };

    if let Err(error) = result {
        eprintln!("{} {error:#}", "error:".red().bold());
        for cause in error.chain().skip(1) {
            if let Some(remote) = cause.downcast_ref::<RemoteInvocationError>() {
                if let Some(hint) = remote.fix_suggestion() {
                    eprintln!("  {} {hint}", "hint:".yellow().bold());
                }
            }
        }
        process::exit(1);
    }
}

fn load_spec(path: &Path) -> Result<CompiledSpec> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read spec file '{}'", path.display()))?;
    let spec = if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
        CompiledSpec::from_yaml(&text)
            .with_context(|| format!("'{}' is not a valid flow spec", path.display()))?
    } else {
        CompiledSpec::from_json(&text)
            .with_context(|| format!("'{}' is not a valid flow spec", path.display()))?
    };
    Ok(spec)
}

fn inspect(file: &Path) -> Result<()> {
    let spec = load_spec(file)?;

    println!("{} {}", "flow:".bold(), spec.spec.name.cyan());
    if let Some(description) = &spec.spec.description {
        println!("  {description}");
    }
    if spec.spec.schedulable {
        println!("  {}", "schedulable".yellow());
    }

    println!("{}", "nodes:".bold());
    for node in &spec.nodes {
        println!("  {} ({})", node.name.green(), node.detail.kind());
    }

    println!("{}", "edges:".bold());
    for edge in &spec.edges {
        match &edge.guard {
            Some(guard) => println!("  {} -> {} [{guard}]", edge.from, edge.to),
            None => println!("  {} -> {}", edge.from, edge.to),
        }
    }

    println!("{}", "schemas:".bold());
    for title in spec.schemas.keys() {
        println!("  {title}");
    }
    Ok(())
}

async fn deploy_spec(file: &Path) -> Result<()> {
    let spec = load_spec(file)?;
    let config = EngineConfig::from_env()?;
    let client = Arc::new(HttpEngineClient::new(config));

    let deployed = deploy(client, &spec)
        .await
        .context("deployment failed")?;
    println!(
        "{} flow '{}' deployed as {}",
        "ok:".green().bold(),
        spec.spec.name,
        deployed.deployment_id().cyan()
    );
    Ok(())
}

async fn run_spec(file: &Path, input: &str, debug: bool, timeout: Option<u64>) -> Result<()> {
    let spec = load_spec(file)?;
    let payload: serde_json::Value =
        serde_json::from_str(input).context("--input is not valid JSON")?;

    let config = EngineConfig::from_env()?;
    let client = Arc::new(HttpEngineClient::new(config));
    let deployed = deploy(client, &spec)
        .await
        .context("deployment failed")?;

    let options = InvokeOptions {
        debug,
        timeout: timeout.map(Duration::from_secs),
        ..InvokeOptions::default()
    };

    let run = deployed
        .invoke(
            payload,
            options,
            |result| {
                println!("{}", "flow completed".green().bold());
                match serde_json::to_string_pretty(result) {
                    Ok(text) => println!("{text}"),
                    Err(_) => println!("{result}"),
                }
            },
            |error| {
                eprintln!("{} {error}", "flow failed:".red().bold());
                if let Some(hint) = error.fix_suggestion() {
                    eprintln!("  {} {hint}", "hint:".yellow().bold());
                }
            },
        )
        .await
        .context("run could not be started")?;

    if !run.succeeded() {
        process::exit(2);
    }
    Ok(())
}
