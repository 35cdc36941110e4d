// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Command-line entry point for mcp-dock
use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use mcp_dock::config::{Config, LogFormat};
use mcp_dock::core::errors::ClientError;
use mcp_dock::mcp::discovery::{self, DiscoveryOptions};
use mcp_dock::servers::Server;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Forward server stderr to the log
    #[arg(long, global = true)]
    debug: bool,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormatArg>,

    /// Container runtime binary (e.g. "podman")
    #[arg(long, global = true)]
    runtime: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the normalized tools of a server
    Tools(ListArgs),
    /// List the normalized prompts of a server
    Prompts(ListArgs),
    /// Start a server and call one tool (smoke test)
    Call {
        /// Path to the server YAML
        server: PathBuf,
        /// Tool name
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
        /// Pull the image before starting
        #[arg(long)]
        pull: bool,
    },
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Path to the server YAML
    server: PathBuf,
    /// Pull the image before starting
    #[arg(long)]
    pull: bool,
    /// Remove the image afterwards
    #[arg(long)]
    cleanup: bool,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

/// Exit status for a run that failed on an out-of-sequence or unsupported request
const EXIT_USAGE: u8 = 2;
/// Exit status for a failure worth retrying (sysexits EX_TEMPFAIL)
const EXIT_TEMPFAIL: u8 = 75;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    install_panic_hook();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            exit_code(&err)
        }
    }
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<ClientError>() {
        Some(err) if err.is_usage_error() => ExitCode::from(EXIT_USAGE),
        Some(err) if err.is_retryable() => ExitCode::from(EXIT_TEMPFAIL),
        _ => ExitCode::FAILURE,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config from env, using defaults: {}", e);
        Config::default()
    });

    // CLI flags override the environment
    if cli.debug {
        config.debug = true;
    }
    if let Some(format) = cli.log_format {
        config.log_format = match format {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        };
    }
    if let Some(runtime) = cli.runtime {
        config.container_runtime = runtime;
    }

    init_tracing(&config);

    match cli.command {
        Command::Tools(args) => {
            let server = load_server(&args.server)?;
            let options = config.discovery_options(args.pull, args.cleanup);
            let tools = discovery::discover_tools(&server, &options)
                .await
                .with_context(|| format!("listing tools of {}", server.name))?;
            info!("{} tool(s) found on {}", tools.len(), server.name);
            print_output(&tools, args.format)?;
        }
        Command::Prompts(args) => {
            let server = load_server(&args.server)?;
            let options = config.discovery_options(args.pull, args.cleanup);
            let prompts = discovery::discover_prompts(&server, &options)
                .await
                .with_context(|| format!("listing prompts of {}", server.name))?;
            info!("{} prompt(s) found on {}", prompts.len(), server.name);
            print_output(&prompts, args.format)?;
        }
        Command::Call {
            server,
            tool,
            args,
            pull,
        } => {
            let server = load_server(&server)?;
            let arguments = parse_arguments(args.as_deref())?;
            let options: DiscoveryOptions = config.discovery_options(pull, false);
            let result = discovery::smoke_call(&server, &options, &tool, arguments)
                .await
                .with_context(|| format!("calling {} on {}", tool, server.name))?;
            print_output(&result, OutputFormat::Json)?;
            if result.is_error {
                bail!("tool {} reported an error", tool);
            }
        }
    }

    Ok(())
}

fn load_server(path: &Path) -> anyhow::Result<Server> {
    Server::from_yaml_file(path).with_context(|| format!("reading server {}", path.display()))
}

fn parse_arguments(raw: Option<&str>) -> anyhow::Result<Option<Map<String, Value>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw).context("parsing --args")? {
        Value::Object(map) => Ok(Some(map)),
        other => bail!("--args must be a JSON object, got {}", other),
    }
}

fn print_output<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Yaml => print!("{}", serde_yaml_ng::to_string(value)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC: {} at {}", message, location);
    }));
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("mcp_dock=debug,info"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}
