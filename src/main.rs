//! CLI entry point for the MDS Provider data tool.
//!
//! Provides subcommands for loading provider payloads from files or URLs,
//! dumping them back to disk, and checking versions against the supported
//! range.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use mds_provider::config::{DumpOptions, LoadOptions, RequestHeaders, Settings};
use mds_provider::fetch::{ApiKey, BasicClient, HttpClient};
use mds_provider::files::{FileName, ProviderDataFiles};
use mds_provider::{
    DateFormat, EncodingContext, RawValue, RecordType, ValueEncoder, Version, VersionRange,
    VersionStatus,
};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "mds_provider")]
#[command(about = "A tool to load and store MDS Provider data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load records of one type and print them as JSON lines or write CSV
    Load {
        /// status_changes or trips
        record_type: RecordType,

        /// Files, directories or URLs to read
        #[arg(value_name = "FILE_DIR_OR_URL", required = true)]
        sources: Vec<String>,

        /// Keep one batch per page instead of merging
        #[arg(long, default_value_t = false)]
        pages: bool,

        /// Extra request header for URL sources, as "Name: value"
        #[arg(long = "header", value_name = "HEADER")]
        headers: Vec<String>,

        /// CSV file to append records to
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Output timestamp format: unix, iso8601 or a strftime pattern
        #[arg(long, default_value = "unix")]
        date_format: DateFormat,

        /// Encode output for this MDS version instead of each batch's own
        #[arg(long)]
        version: Option<Version>,
    },
    /// Write payloads from the given sources to JSON files
    Dump {
        /// Files, directories or URLs to read
        #[arg(value_name = "FILE_DIR_OR_URL", required = true)]
        sources: Vec<String>,

        /// Only keep pages carrying this record type
        #[arg(short, long)]
        record_type: Option<RecordType>,

        /// Directory to write into
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Write one file per page instead of a single file
        #[arg(long, default_value_t = false)]
        multi_file: bool,

        /// Fixed output file name instead of a generated one
        #[arg(long)]
        file_name: Option<String>,

        /// Pretty-print the JSON output
        #[arg(long, default_value_t = false)]
        pretty: bool,

        /// Extra request header for URL sources, as "Name: value"
        #[arg(long = "header", value_name = "HEADER")]
        headers: Vec<String>,
    },
    /// Check a version against the supported range
    Version {
        /// Version as major.minor.patch
        version: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let settings = Settings::from_env()?;

    // Logging setup: colored stderr + JSON rolling log file
    let log_dir = settings
        .log_file_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = settings
        .log_file_path
        .file_name()
        .unwrap_or(OsStr::new("mds_provider.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    VersionRange::install(settings.version_range);

    let cli = Cli::parse();

    match cli.command {
        Commands::Load {
            record_type,
            sources,
            pages,
            headers,
            csv,
            date_format,
            version,
        } => {
            let files = ProviderDataFiles::new(Some(record_type), sources.iter().map(String::as_str))?;
            let options = LoadOptions {
                flatten: !pages,
                headers: request_headers(&headers)?,
            };
            let output = LoadOutput {
                csv,
                date_format,
                version,
            };
            match &settings.provider_token {
                Some(token) => {
                    let client = ApiKey::bearer(BasicClient::new()?, token)?;
                    load(files.with_client(client), &options, &output).await?;
                }
                None => load(files, &options, &output).await?,
            }
        }
        Commands::Dump {
            sources,
            record_type,
            output_dir,
            multi_file,
            file_name,
            pretty,
            headers,
        } => {
            let files = ProviderDataFiles::new(record_type, sources.iter().map(String::as_str))?;
            let load_options = LoadOptions {
                flatten: true,
                headers: request_headers(&headers)?,
            };
            let dump_options = DumpOptions {
                output_dir,
                single_file: !multi_file,
                file_name: file_name.map(FileName::Fixed),
                pretty,
            };
            let written = match &settings.provider_token {
                Some(token) => {
                    let client = ApiKey::bearer(BasicClient::new()?, token)?;
                    dump(files.with_client(client), &load_options, &dump_options).await?
                }
                None => dump(files, &load_options, &dump_options).await?,
            };
            match written {
                Some(path) => println!("{}", path.display()),
                None => warn!("Nothing matched, no files written"),
            }
        }
        Commands::Version { version } => {
            let version = Version::parse(&version)?;
            let range = VersionRange::current();
            let status = match range.classify(&version) {
                VersionStatus::Unsupported => "unsupported",
                VersionStatus::Supported => "supported",
                VersionStatus::Deprecated => "deprecated",
            };
            println!(
                "{version}: {status} (supported range {} to {})",
                range.lower, range.upper
            );
        }
    }

    Ok(())
}

struct LoadOutput {
    csv: Option<PathBuf>,
    date_format: DateFormat,
    version: Option<Version>,
}

fn request_headers(args: &[String]) -> Result<RequestHeaders> {
    args.iter().try_fold(RequestHeaders::default(), |headers, arg| {
        let (name, value) = RequestHeaders::parse_arg(arg)?;
        Ok(headers.with_header(name, value))
    })
}

/// Loads frames and writes them to CSV, or to stdout as one JSON object per
/// record.
#[tracing::instrument(skip_all, fields(csv = ?output.csv))]
async fn load<C: HttpClient>(
    files: ProviderDataFiles<C>,
    options: &LoadOptions,
    output: &LoadOutput,
) -> Result<()> {
    let frames = files.load_frames(None, &[], options).await?;
    info!(batches = frames.len(), "Records loaded");

    for frame in &frames {
        let version = output.version.unwrap_or(frame.version);
        let encoder = ValueEncoder::new(EncodingContext::new(
            version,
            output.date_format.clone(),
        )?);

        match &output.csv {
            Some(path) => {
                frame.append_csv(path, &encoder)?;
                info!(path = %path.display(), rows = frame.len(), "Wrote CSV rows");
            }
            None => {
                for row in &frame.rows {
                    let record = RawValue::object(
                        frame.columns.iter().cloned().zip(row.iter().cloned()),
                    );
                    println!("{}", encoder.to_string(&record)?);
                }
            }
        }
    }

    Ok(())
}

async fn dump<C: HttpClient>(
    files: ProviderDataFiles<C>,
    load_options: &LoadOptions,
    dump_options: &DumpOptions,
) -> Result<Option<PathBuf>> {
    let payloads = files.load_payloads(None, &[], load_options).await?;
    files.dump_payloads(None, &payloads, dump_options)
}
