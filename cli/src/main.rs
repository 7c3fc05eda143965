//! proposald CLI - operator entry point for the proposal store.
//!
//! # Commands
//!
//! ```text
//! proposald new <name> <file>...        submit a proposal (unvetted, version 1)
//! proposald get <token>                 show an unvetted or vetted proposal
//! proposald update <token> <file>...    amend an unvetted proposal
//! proposald vet <token>                 unvetted -> vetted
//! proposald censor <token>              unvetted -> censored
//! proposald status <token> <status>     generic status change
//! ```
//!
//! Output is JSON on stdout; logs go to stderr (`RUST_LOG`, default `info`).
//! The exit code distinguishes failure kinds so scripts can branch on them.

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use proposald_config::{ProposaldConfig, StoreConfig};
use proposald_core::{Backend, BackendError, ErrorKind, MemoryBackend};
use proposald_store::SqliteBackend;
use proposald_types::{File, MIME_PNG, MIME_TEXT_UTF8, PsrStatus, Token};

const USAGE: &str = "usage: proposald <new|get|update|vet|censor|status> ...

  new <name> <file>...        submit a proposal
  get <token>                 show an unvetted or vetted proposal
  update <token> <file>...    amend an unvetted proposal
  vet <token>                 publish an unvetted proposal
  censor <token>              reject an unvetted proposal
  status <token> <status>     set status (vetted | censored)";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    New { name: String, paths: Vec<PathBuf> },
    Get { token: Token },
    Update { token: Token, paths: Vec<PathBuf> },
    SetStatus { token: Token, status: PsrStatus },
    Help,
}

fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn run(args: &[String]) -> Result<()> {
    let command = parse_args(args)?;
    if command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    let config = ProposaldConfig::load();
    let backend = open_backend(&config)?;
    let result = execute(backend.as_ref(), command);
    backend.close();
    result
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some((verb, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    let command = match (verb.as_str(), rest) {
        ("help" | "-h" | "--help", _) => Command::Help,
        ("new", [name, paths @ ..]) if !paths.is_empty() => Command::New {
            name: name.clone(),
            paths: paths.iter().map(PathBuf::from).collect(),
        },
        ("get", [token]) => Command::Get {
            token: parse_token(token)?,
        },
        ("update", [token, paths @ ..]) if !paths.is_empty() => Command::Update {
            token: parse_token(token)?,
            paths: paths.iter().map(PathBuf::from).collect(),
        },
        ("vet", [token]) => Command::SetStatus {
            token: parse_token(token)?,
            status: PsrStatus::Vetted,
        },
        ("censor", [token]) => Command::SetStatus {
            token: parse_token(token)?,
            status: PsrStatus::Censored,
        },
        ("status", [token, status]) => Command::SetStatus {
            token: parse_token(token)?,
            status: status
                .parse::<PsrStatus>()
                .with_context(|| format!("invalid status {status:?}"))?,
        },
        _ => bail!("unrecognized arguments\n\n{USAGE}"),
    };
    Ok(command)
}

fn parse_token(raw: &str) -> Result<Token> {
    raw.parse()
        .with_context(|| format!("invalid token {raw:?}"))
}

fn open_backend(config: &ProposaldConfig) -> Result<Box<dyn Backend>> {
    match &config.store {
        StoreConfig::Sqlite { path } => {
            let backend = SqliteBackend::open(path, config.content.clone())?;
            Ok(Box::new(backend))
        }
        StoreConfig::Memory => {
            tracing::warn!("memory backend configured; proposals will not outlive this process");
            Ok(Box::new(MemoryBackend::new(config.content.clone())))
        }
    }
}

fn execute(backend: &dyn Backend, command: Command) -> Result<()> {
    match command {
        Command::Help => println!("{USAGE}"),
        Command::New { name, paths } => {
            let record = backend.new_proposal(&name, read_files(&paths)?)?;
            print_json(&record)?;
        }
        Command::Get { token } => {
            let proposal = match backend.get_unvetted(&token) {
                Err(BackendError::NotFound { .. }) => backend.get_vetted(&token)?,
                other => other?,
            };
            print_json(&proposal)?;
        }
        Command::Update { token, paths } => {
            let record = backend.update_unvetted(&token, read_files(&paths)?)?;
            print_json(&record)?;
        }
        Command::SetStatus { token, status } => {
            let status = backend.set_unvetted_status(&token, status)?;
            print_json(&serde_json::json!({
                "token": token.to_hex(),
                "status": status,
                "code": status.code(),
            }))?;
        }
    }
    Ok(())
}

fn read_files(paths: &[PathBuf]) -> Result<Vec<File>> {
    paths
        .iter()
        .map(|path| {
            let bytes =
                std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .with_context(|| format!("{} has no file name", path.display()))?
                .to_string_lossy()
                .into_owned();
            Ok(File::from_bytes(name, mime_for_path(path), &bytes))
        })
        .collect()
}

fn mime_for_path(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => MIME_PNG,
        _ => MIME_TEXT_UTF8,
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{rendered}");
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<BackendError>().map(BackendError::kind) {
        Some(ErrorKind::NotFound) => 2,
        Some(ErrorKind::InvalidTransition) => 3,
        Some(ErrorKind::ContentVerification) => 4,
        Some(ErrorKind::Shutdown) => 5,
        Some(ErrorKind::Storage) | None => 1,
    }
}
