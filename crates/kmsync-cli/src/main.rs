use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use serde::Deserialize;

use kmsync_core::{
    content_id, normalize_url, ordered_install_list, Component, ContentIdValue, Engine,
    KmsyncError, Result,
};

mod args;
use args::{Cli, CheckpointAction, Commands, ConfigAction, ContentIdAction, SessionAction, Shell};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "kmsync=debug"
    } else if cli.quiet {
        "kmsync=error"
    } else {
        "kmsync=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .without_time()
        .init();

    let root = cli
        .root
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    match run(cli, &root) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::from(e.exit_code().clamp(1, 255) as u8)
        }
    }
}

fn run(cli: Cli, root: &PathBuf) -> Result<()> {
    match cli.command {
        Commands::Session { action } => handle_session(action, root),
        Commands::Checkpoint { action } => handle_checkpoint(action, root),
        Commands::Gc => handle_gc(root),
        Commands::Config { action } => handle_config(action, root),
        Commands::ContentId { action } => handle_content_id(action),
        Commands::Plan { components } => handle_plan(&components),
        Commands::Completions { shell } => {
            handle_completions(shell);
            Ok(())
        }
    }
}

fn handle_session(action: SessionAction, root: &PathBuf) -> Result<()> {
    let engine = Engine::open(root)?;
    match action {
        SessionAction::Start => {
            let id = engine.start_session()?;
            println!("{} {}", "Started session:".green(), id.cyan());
        }
        SessionAction::List => {
            let sessions = engine.list_sessions()?;
            if sessions.is_empty() {
                println!("{}", "No sessions.".yellow());
                return Ok(());
            }
            println!("{}", "Sessions:".cyan().bold());
            for s in sessions {
                println!(
                    "  {} {:?} ({} checkpoints, started {})",
                    s.id.bold(),
                    s.state,
                    s.checkpoint_count,
                    s.started_utc.to_rfc3339()
                );
            }
        }
        SessionAction::Complete {
            session_id,
            discard,
        } => {
            engine.complete_session(&session_id, !discard)?;
            if discard {
                println!("{} {}", "Discarded session:".yellow(), session_id);
            } else {
                println!("{} {}", "Completed session:".green(), session_id);
            }
        }
        SessionAction::Delete { session_id } => {
            engine.delete_session(&session_id)?;
            println!("{} {}", "Deleted session:".red(), session_id);
        }
        SessionAction::Validate { session_id } => {
            let reports = engine.validate_session(&session_id)?;
            print_validation_reports(reports.into_iter().collect());
        }
    }
    Ok(())
}

fn handle_checkpoint(action: CheckpointAction, root: &PathBuf) -> Result<()> {
    let engine = Engine::open(root)?;
    match action {
        CheckpointAction::Create {
            component_name,
            component_id,
        } => {
            let component_id = component_id.unwrap_or_else(|| component_name.clone());
            let checkpoint_id = engine.create_checkpoint(&component_name, &component_id)?;
            println!("{} {}", "Sealed checkpoint:".green(), checkpoint_id.cyan());
        }
        CheckpointAction::List { session_id } => {
            let checkpoints = engine.list_checkpoints(&session_id)?;
            println!("{}", "Checkpoints:".cyan().bold());
            for c in checkpoints {
                let anchor = if c.is_anchor {
                    "[anchor]".yellow().to_string()
                } else {
                    String::new()
                };
                println!(
                    "  {:>4} {} {} +{} ~{} -{} {}",
                    c.sequence,
                    c.id.bold(),
                    c.component_name,
                    c.added_count.to_string().green(),
                    c.modified_count.to_string().yellow(),
                    c.deleted_count.to_string().red(),
                    anchor
                );
            }
        }
        CheckpointAction::Restore { checkpoint_id } => {
            engine.restore_checkpoint(&checkpoint_id)?;
            println!("{} {}", "Restored checkpoint:".green(), checkpoint_id);
        }
        CheckpointAction::Validate { checkpoint_id } => {
            let report = engine.validate_checkpoint(&checkpoint_id)?;
            print_validation_reports(vec![(checkpoint_id, report)]);
        }
    }
    Ok(())
}

fn handle_gc(root: &PathBuf) -> Result<()> {
    let engine = Engine::open(root)?;
    let removed = engine.garbage_collect()?;
    println!("{} {}", "Removed objects:".green(), removed);
    Ok(())
}

fn handle_config(action: ConfigAction, root: &PathBuf) -> Result<()> {
    let kmsync_dir = root.join(".kmsync");
    match action {
        ConfigAction::List => {
            let config = kmsync_core::Config::load(&kmsync_dir)?;
            for (key, value) in config.list() {
                println!("{} = {}", key.cyan(), value);
            }
        }
        ConfigAction::Get { key } => {
            let config = kmsync_core::Config::load(&kmsync_dir)?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(KmsyncError::ConfigKeyNotFound { key }),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = kmsync_core::Config::load(&kmsync_dir)?;
            config.set(&key, &value)?;
            config.save(&kmsync_dir)?;
            println!("{} {key} = {value}", "Set".green());
        }
        ConfigAction::Init => {
            let path = kmsync_core::Config::init(&kmsync_dir)?;
            println!("{} {}", "Wrote config:".green(), path.display());
        }
    }
    Ok(())
}

fn handle_content_id(action: ContentIdAction) -> Result<()> {
    match action {
        ContentIdAction::Compute { metadata_json, url } => {
            let json: serde_json::Value = serde_json::from_str(&metadata_json)?;
            let metadata = json_to_metadata(&json)?;
            let id = content_id(&metadata, &url)?;
            println!("{id}");
        }
        ContentIdAction::NormalizeUrl { url } => {
            println!("{}", normalize_url(&url));
        }
    }
    Ok(())
}

/// Converts a JSON object into the tagged `ContentIdValue` metadata bag the
/// content-id computation expects. Nulls are rejected: the canonical
/// bencoding-style encoding has no representation for them.
fn json_to_metadata(json: &serde_json::Value) -> Result<BTreeMap<String, ContentIdValue>> {
    let obj = json
        .as_object()
        .ok_or_else(|| KmsyncError::InvalidArgument {
            message: "metadata must be a JSON object".to_string(),
        })?;
    obj.iter()
        .map(|(k, v)| Ok((k.clone(), json_to_value(v)?)))
        .collect()
}

fn json_to_value(json: &serde_json::Value) -> Result<ContentIdValue> {
    match json {
        serde_json::Value::Null => Err(KmsyncError::InvalidArgument {
            message: "null values cannot be encoded".to_string(),
        }),
        serde_json::Value::Bool(b) => Ok(ContentIdValue::Bool(*b)),
        serde_json::Value::Number(n) => n.as_i64().map(ContentIdValue::Int).ok_or_else(|| {
            KmsyncError::InvalidArgument {
                message: format!("non-integer number {n} is not supported"),
            }
        }),
        serde_json::Value::String(s) => Ok(ContentIdValue::Str(s.clone())),
        serde_json::Value::Array(items) => items
            .iter()
            .map(json_to_value)
            .collect::<Result<Vec<_>>>()
            .map(ContentIdValue::List),
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), json_to_value(v)?)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(ContentIdValue::Dict),
    }
}

#[derive(Debug, Deserialize)]
struct ComponentJson {
    id: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    install_after: Vec<String>,
    #[serde(default)]
    install_before: Vec<String>,
    #[serde(default)]
    restrictions: Vec<String>,
}

fn handle_plan(components_path: &PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(components_path)
        .map_err(|e| KmsyncError::io(components_path, e))?;
    let parsed: Vec<ComponentJson> = serde_json::from_str(&content)?;
    let components: Vec<Component> = parsed
        .into_iter()
        .map(|c| Component {
            id: c.id,
            dependencies: c.dependencies,
            install_after: c.install_after,
            install_before: c.install_before,
            restrictions: c.restrictions,
        })
        .collect();

    let order = ordered_install_list(&components);
    println!("{}", "Install order:".cyan().bold());
    for (i, id) in order.iter().enumerate() {
        println!("  {}. {}", i + 1, id);
    }
    Ok(())
}

fn print_validation_reports(reports: Vec<(String, kmsync_core::ValidationReport)>) {
    for (id, report) in reports {
        if report.ok {
            println!("{} {}", "OK".green(), id);
        } else {
            println!("{} {}", "FAILED".red(), id);
            for error in &report.errors {
                println!("  {} {}", "-".red(), error);
            }
        }
    }
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let mut stdout = io::stdout();
    match shell {
        Shell::Bash => generate(clap_complete::shells::Bash, &mut cmd, name, &mut stdout),
        Shell::Zsh => generate(clap_complete::shells::Zsh, &mut cmd, name, &mut stdout),
        Shell::Fish => generate(clap_complete::shells::Fish, &mut cmd, name, &mut stdout),
        Shell::PowerShell => {
            generate(clap_complete::shells::PowerShell, &mut cmd, name, &mut stdout)
        }
        Shell::Elvish => generate(clap_complete::shells::Elvish, &mut cmd, name, &mut stdout),
    }
}
