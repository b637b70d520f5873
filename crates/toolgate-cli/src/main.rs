// crates/toolgate-cli/src/main.rs
// ============================================================================
// Module: Toolgate CLI Entry Point
// Description: Command dispatcher for serving and key administration.
// Purpose: Provide the `toolgate` binary.
// Dependencies: clap, tokio, toolgate-cli, toolgate-config, toolgate-core, toolgate-dispatch
// ============================================================================

//! ## Overview
//! `toolgate serve` reads `<identity> <command> [payload]` lines from stdin and
//! answers with JSON lines on stdout. The `key`, `usage`, and `config`
//! subcommands administer the same store offline. All output goes through the
//! message catalog.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;
use tokio::io::BufReader;
use toolgate_cli::ToolgateRuntime;
use toolgate_cli::render::format_valid_until;
use toolgate_cli::render::key_line;
use toolgate_cli::serve_lines;
use toolgate_cli::t;
use toolgate_config::ToolgateConfig;
use toolgate_core::Identity;
use toolgate_core::KeyId;
use toolgate_core::KeyValidity;
use toolgate_core::RemainingValidity;
use toolgate_core::UsageMeter;
use toolgate_dispatch::format_remaining;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "toolgate", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Config file path (defaults to toolgate.toml or `TOOLGATE_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve commands from stdin, answering with JSON lines on stdout.
    Serve,
    /// Access-key administration.
    Key {
        /// Selected key subcommand.
        #[command(subcommand)]
        command: KeyCommand,
    },
    /// Usage counter inspection.
    Usage {
        /// Selected usage subcommand.
        #[command(subcommand)]
        command: UsageCommand,
    },
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Key subcommands.
#[derive(Subcommand, Debug)]
enum KeyCommand {
    /// Issue a new key.
    Generate(KeyGenerateCommand),
    /// Bind a key to an identity.
    Register(KeyRegisterCommand),
    /// Revoke a key.
    Revoke(KeyIdArgs),
    /// Show one key.
    Show(KeyIdArgs),
    /// List every key.
    List,
    /// Show an identity's remaining validity.
    TimeLeft(IdentityArgs),
}

/// Usage subcommands.
#[derive(Subcommand, Debug)]
enum UsageCommand {
    /// Print the total number of handled commands.
    Show,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate the config file.
    Validate,
}

/// Arguments for key generation.
#[derive(Args, Debug)]
struct KeyGenerateCommand {
    /// Validity window in seconds (defaults to `[keys].default_validity_secs`).
    #[arg(long, value_name = "SECONDS", conflicts_with = "unbounded")]
    validity_secs: Option<u64>,
    /// Issue a key that never expires.
    #[arg(long, action = ArgAction::SetTrue)]
    unbounded: bool,
}

/// Arguments for key registration.
#[derive(Args, Debug)]
struct KeyRegisterCommand {
    /// Key id to bind.
    key_id: String,
    /// Identity to bind the key to.
    identity: String,
}

/// Arguments naming one key.
#[derive(Args, Debug)]
struct KeyIdArgs {
    /// Key id.
    key_id: String,
}

/// Arguments naming one identity.
#[derive(Args, Debug)]
struct IdentityArgs {
    /// Identity.
    identity: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for catalog messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the selected subcommand.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        write_stdout_line(&t!("main.version", version = env!("CARGO_PKG_VERSION")))?;
        return Ok(ExitCode::SUCCESS);
    }
    let Some(command) = cli.command else {
        Cli::command()
            .print_help()
            .map_err(|err| CliError::new(t!("output.write_failed", stream = "stdout", error = err)))?;
        return Ok(ExitCode::SUCCESS);
    };
    let config_path = cli.config.as_deref();
    match command {
        Commands::Serve => command_serve(config_path).await,
        Commands::Key {
            command,
        } => command_key(config_path, command),
        Commands::Usage {
            command: UsageCommand::Show,
        } => command_usage_show(config_path),
        Commands::Config {
            command: ConfigCommand::Validate,
        } => command_config_validate(config_path),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(config_path: Option<&Path>) -> CliResult<ExitCode> {
    let (config, runtime) = load_runtime(config_path)?;
    let dispatcher = runtime
        .dispatcher(&config)
        .map_err(|err| CliError::new(t!("runtime.init_failed", error = err)))?;
    let reader = BufReader::new(tokio::io::stdin());
    let mut writer = tokio::io::stdout();
    let summary = serve_lines(Arc::new(dispatcher), reader, &mut writer)
        .await
        .map_err(|err| CliError::new(t!("serve.failed", error = err)))?;
    write_stderr_line(&t!("serve.summary", count = summary.dispatched))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Key Commands
// ============================================================================

/// Executes a `key` subcommand.
fn command_key(config_path: Option<&Path>, command: KeyCommand) -> CliResult<ExitCode> {
    let (_config, runtime) = load_runtime(config_path)?;
    match command {
        KeyCommand::Generate(args) => key_generate(&runtime, &args),
        KeyCommand::Register(args) => key_register(&runtime, &args),
        KeyCommand::Revoke(args) => key_revoke(&runtime, &args),
        KeyCommand::Show(args) => key_show(&runtime, &args),
        KeyCommand::List => key_list(&runtime),
        KeyCommand::TimeLeft(args) => key_time_left(&runtime, &args),
    }
}

/// Issues a key.
fn key_generate(runtime: &ToolgateRuntime, args: &KeyGenerateCommand) -> CliResult<ExitCode> {
    let validity = match (args.unbounded, args.validity_secs) {
        (true, _) => KeyValidity::Unbounded,
        (false, Some(0)) => return Err(CliError::new(t!("key.validity_invalid"))),
        (false, Some(secs)) => KeyValidity::For(Duration::from_secs(secs)),
        (false, None) => KeyValidity::Default,
    };
    let key = runtime
        .generate_key(validity)
        .map_err(|err| CliError::new(t!("key.generate.failed", error = err)))?;
    write_stdout_line(&t!(
        "key.generate.ok",
        key_id = key.id,
        valid_until = format_valid_until(key.valid_until)
    ))?;
    Ok(ExitCode::SUCCESS)
}

/// Binds a key to an identity.
fn key_register(runtime: &ToolgateRuntime, args: &KeyRegisterCommand) -> CliResult<ExitCode> {
    let identity = Identity::new(args.identity.as_str());
    let key = runtime
        .register_key(&KeyId::new(args.key_id.as_str()), &identity)
        .map_err(|err| CliError::new(t!("key.register.failed", error = err)))?;
    write_stdout_line(&t!(
        "key.register.ok",
        key_id = key.id,
        identity = identity,
        valid_until = format_valid_until(key.valid_until)
    ))?;
    Ok(ExitCode::SUCCESS)
}

/// Revokes a key.
fn key_revoke(runtime: &ToolgateRuntime, args: &KeyIdArgs) -> CliResult<ExitCode> {
    let key = runtime
        .revoke_key(&KeyId::new(args.key_id.as_str()))
        .map_err(|err| CliError::new(t!("key.revoke.failed", error = err)))?;
    write_stdout_line(&t!("key.revoke.ok", key_id = key.id))?;
    Ok(ExitCode::SUCCESS)
}

/// Shows one key.
fn key_show(runtime: &ToolgateRuntime, args: &KeyIdArgs) -> CliResult<ExitCode> {
    let lifecycle = runtime.lifecycle();
    let key = lifecycle
        .find_key(&KeyId::new(args.key_id.as_str()))
        .map_err(|err| CliError::new(t!("key.lookup.failed", error = err)))?
        .ok_or_else(|| CliError::new(t!("key.show.not_found", key_id = args.key_id)))?;
    write_stdout_line(&key_line(&key, lifecycle.now()))?;
    Ok(ExitCode::SUCCESS)
}

/// Lists every key.
fn key_list(runtime: &ToolgateRuntime) -> CliResult<ExitCode> {
    let lifecycle = runtime.lifecycle();
    let keys =
        lifecycle.list_keys().map_err(|err| CliError::new(t!("key.lookup.failed", error = err)))?;
    if keys.is_empty() {
        write_stdout_line(&t!("key.list.none"))?;
        return Ok(ExitCode::SUCCESS);
    }
    let now = lifecycle.now();
    for key in &keys {
        write_stdout_line(&key_line(key, now))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Shows an identity's remaining validity.
fn key_time_left(runtime: &ToolgateRuntime, args: &IdentityArgs) -> CliResult<ExitCode> {
    let identity = Identity::new(args.identity.as_str());
    let message = match runtime.lifecycle().remaining_validity(&identity) {
        Ok(RemainingValidity::Bounded(remaining)) => t!(
            "key.time_left.bounded",
            identity = identity,
            remaining = format_remaining(remaining)
        ),
        Ok(RemainingValidity::Unbounded) => t!("key.time_left.unbounded", identity = identity),
        Err(err) => {
            return Err(CliError::new(t!(
                "key.time_left.failed",
                identity = identity,
                error = err
            )));
        }
    };
    write_stdout_line(&message)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Usage and Config Commands
// ============================================================================

/// Prints the usage total.
fn command_usage_show(config_path: Option<&Path>) -> CliResult<ExitCode> {
    let (_config, runtime) = load_runtime(config_path)?;
    let total =
        runtime.usage().total().map_err(|err| CliError::new(t!("usage.failed", error = err)))?;
    write_stdout_line(&t!("usage.show", total = total))?;
    Ok(ExitCode::SUCCESS)
}

/// Validates the config file.
fn command_config_validate(config_path: Option<&Path>) -> CliResult<ExitCode> {
    ToolgateConfig::load(config_path)
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    write_stdout_line(&t!("config.validate.ok"))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads config and assembles the runtime.
fn load_runtime(config_path: Option<&Path>) -> CliResult<(ToolgateConfig, ToolgateRuntime)> {
    let config = ToolgateConfig::load_or_default(config_path)
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    let runtime = ToolgateRuntime::from_config(&config)
        .map_err(|err| CliError::new(t!("runtime.init_failed", error = err)))?;
    Ok((config, runtime))
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
        .map_err(|err| CliError::new(t!("output.write_failed", stream = "stdout", error = err)))
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> CliResult<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
        .map_err(|err| CliError::new(t!("output.write_failed", stream = "stderr", error = err)))
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
