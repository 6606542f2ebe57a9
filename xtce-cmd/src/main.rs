mod decode;
mod encode;
mod info;
mod render;
mod stream;

use std::io::stderr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use xtce::Database;

use render::Format;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the space systems, containers, meta commands, and streams of a model.
    Info {
        /// Model document (JSON)
        #[arg(short, long, value_name = "path")]
        model: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: Format,
    },
    /// Decode a container from hex or a binary file.
    ///
    /// Without data the container layout is described using container restrictions,
    /// initial values, and any values given with --set.
    Decode {
        /// Model document (JSON)
        #[arg(short, long, value_name = "path")]
        model: PathBuf,

        /// Container name or path. A meta command name when used with --command.
        #[arg(short, long)]
        container: String,

        /// Treat --container as a meta command.
        #[arg(long, action)]
        command: bool,

        /// Hex encoded data.
        #[arg(long, conflicts_with = "input")]
        hex: Option<String>,

        /// File containing the raw data.
        #[arg(short, long, value_name = "path")]
        input: Option<PathBuf>,

        /// Assume a value for an item, e.g., --set CCSDS_APID=100. May be repeated.
        #[arg(short, long, value_name = "NAME=VALUE")]
        set: Vec<String>,

        /// List entries whose include condition does not hold.
        #[arg(long, action)]
        show_all: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: Format,
    },
    /// Encode a container or meta command from item values.
    Encode {
        /// Model document (JSON)
        #[arg(short, long, value_name = "path")]
        model: PathBuf,

        /// Container name or path. A meta command name when used with --command.
        #[arg(short, long)]
        container: String,

        /// Treat --container as a meta command.
        #[arg(long, action)]
        command: bool,

        /// Value for an item, e.g., --set SETPOINT=25. May be repeated. A value may be
        /// prefixed with `raw:` to give the uncalibrated value.
        #[arg(short, long, value_name = "NAME=VALUE")]
        set: Vec<String>,

        /// Write the encoded bytes to this file instead of printing hex.
        #[arg(short, long, value_name = "path")]
        output: Option<PathBuf>,

        /// Delete output file if it already exists
        #[arg(long, action)]
        clobber: bool,
    },
    /// Identify and decode each space packet of a file using a stream definition.
    Stream {
        /// Model document (JSON)
        #[arg(short, long, value_name = "path")]
        model: PathBuf,

        /// Stream name or path.
        #[arg(short, long)]
        stream: String,

        /// Only decode packets of these containers, or containers derived from them.
        #[arg(short = 'I', long, value_name = "csv", value_delimiter = ',')]
        include: Vec<String>,

        /// Do not decode packets of these containers, or containers derived from them.
        #[arg(short = 'E', long, value_name = "csv", value_delimiter = ',')]
        exclude: Vec<String>,

        /// Print every decoded packet rather than a summary.
        #[arg(short, long, action)]
        verbose: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: Format,

        /// Input spacepacket file
        #[arg(short, long, value_name = "path")]
        input: PathBuf,
    },
}

fn load(model: &PathBuf) -> Result<Database> {
    Database::from_path(model).with_context(|| format!("loading model {model:?}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("XTCE_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Info { model, format } => info::info(&load(model)?, format),
        Commands::Decode {
            model,
            container,
            command,
            hex,
            input,
            set,
            show_all,
            format,
        } => {
            let db = load(model)?;
            let data = match (hex, input) {
                (Some(hex), _) => Some(
                    xtce::RawBits::from_hex(hex)
                        .with_context(|| format!("invalid hex data '{hex}'"))?,
                ),
                (None, Some(path)) => {
                    let bytes =
                        std::fs::read(path).with_context(|| format!("reading {path:?}"))?;
                    Some(xtce::RawBits::from_bytes(&bytes))
                }
                (None, None) => None,
            };
            let target = encode::Target::lookup(&db, container, *command)?;
            decode::decode(&db, target, data, set, *show_all, format)
        }
        Commands::Encode {
            model,
            container,
            command,
            set,
            output,
            clobber,
        } => {
            if let Some(output) = output {
                if !clobber && output.exists() {
                    bail!("{output:?} exists; use --clobber");
                }
            }
            let db = load(model)?;
            let target = encode::Target::lookup(&db, container, *command)?;
            encode::encode(&db, target, set, output.as_deref())
        }
        Commands::Stream {
            model,
            stream,
            include,
            exclude,
            verbose,
            format,
            input,
        } => {
            let db = load(model)?;
            let opts = stream::Opts {
                stream: stream.clone(),
                include: include.clone(),
                exclude: exclude.clone(),
                verbose: *verbose,
            };
            stream::stream(&db, &opts, input, format)
        }
    }
}
