//! simftp command line tool
//!
//! Lists serial ports, or logs in to an FTP server through a SIMCom modem and
//! downloads one file.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use simftp::{transport, Config, Credentials, FileSink, SessionBuilder};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports
    Ports,
    /// Download a file through the modem
    Get(GetArgs),
}

#[derive(Args, Debug)]
struct GetArgs {
    /// Serial port of the modem's AT interface
    port: String,
    /// FTP server host
    host: String,
    /// FTP server port
    ftp_port: u16,
    /// FTP user name
    user: String,
    /// FTP password
    password: String,
    /// Remote file to download
    filename: String,

    /// Local output path (default: the remote file name)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Baud rate, overriding the configuration file
    #[arg(short, long)]
    baud: Option<u32>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("simftp={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn default_output(filename: &str) -> PathBuf {
    Path::new(filename)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download.bin"))
}

async fn transfer(args: GetArgs, config: Config) -> simftp::Result<()> {
    let baud = args.baud.unwrap_or(config.baud_rate);
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.filename));

    let port = transport::open_serial(&args.port, baud)?;
    let mut session = SessionBuilder::from_config(&config).start(port);

    let credentials = Credentials::new(args.host, args.ftp_port, args.user, args.password);
    let mut sink = FileSink::create(&output)?;

    let client = session.client();
    client.handshake(&credentials).await?;
    let report = client
        .download(&args.filename, &mut sink, &config.download)
        .await?;

    let stats = session.shutdown().await?;
    info!(
        output = %output.display(),
        bytes = report.bytes_received,
        requests = report.requests,
        retries = report.retries,
        serial_bytes = stats.bytes_received,
        "saved"
    );
    Ok(())
}

fn list_ports() -> simftp::Result<()> {
    let ports = transport::available_ports()?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    let result = match cli.command {
        Commands::Ports => list_ports(),
        Commands::Get(args) => transfer(args, config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
