mod report;

use std::fs::{self, File};
use std::io::{stderr, BufWriter};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use kplr::dmc::DmcRepackager;
use kplr::pipeline::{InputFormat, Pipeline, ReaderConfig};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Reconstruct packets and data sets from a Kepler downlink file, writing a storage
/// correlation table and, optionally, DMC files.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input downlink file.
    input: PathBuf,

    /// Stop after this many packets.
    #[arg(short = 'n', long, value_name = "count")]
    max_packets: Option<u64>,

    /// Exit with an error at the first packet header that fails validation rather than
    /// logging it and continuing.
    #[arg(short = 'e', long, action)]
    stop_on_error: bool,

    /// Log frame and data set level detail.
    #[arg(short, long, action)]
    verbose: bool,

    /// Log every packet header.
    #[arg(short, long, action)]
    all_packets: bool,

    /// Only log errors.
    #[arg(short, long, action, conflicts_with_all = ["verbose", "all_packets"])]
    silent: bool,

    /// Write the storage correlation table to this file.
    #[arg(long, value_name = "path")]
    sct: Option<PathBuf>,

    /// Repackage long and short cadence data sets into DMC files in this directory.
    #[arg(long, value_name = "dir")]
    dmc: Option<PathBuf>,

    /// Delete the SCT output file if it already exists
    #[arg(long, action)]
    clobber: bool,

    /// Input file layout.
    #[arg(short, long)]
    input_format: Option<InputArg>,

    /// Length of each VCDU in bytes, header included.
    #[arg(long, value_name = "bytes")]
    frame_length: Option<usize>,

    /// Length of the VCDU header in bytes, including any insert zone and the M_PDU
    /// header.
    #[arg(long, value_name = "bytes")]
    frame_header_length: Option<usize>,

    /// JSON reader configuration. Flags override values in the file.
    #[arg(short, long, value_name = "path")]
    config: Option<PathBuf>,

    /// Report output format
    #[arg(short, long, default_value = "text")]
    format: report::Format,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InputArg {
    Vcdu,
    Packets,
}

impl From<InputArg> for InputFormat {
    fn from(value: InputArg) -> Self {
        match value {
            InputArg::Vcdu => InputFormat::Vcdu,
            InputArg::Packets => InputFormat::Packets,
        }
    }
}

impl Cli {
    fn log_level(&self) -> &'static str {
        if self.silent {
            "error"
        } else if self.all_packets {
            "trace"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    fn reader_config(&self) -> Result<ReaderConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let file =
                    File::open(path).with_context(|| format!("opening config {path:?}"))?;
                ReaderConfig::from_json(file).with_context(|| format!("reading config {path:?}"))?
            }
            None => ReaderConfig::default(),
        };
        if self.stop_on_error {
            config.stop_on_error = true;
        }
        if self.max_packets.is_some() {
            config.max_packets = self.max_packets;
        }
        if let Some(format) = self.input_format {
            config.format = format.into();
        }
        if let Some(len) = self.frame_length {
            config.geometry.frame_length = len;
        }
        if let Some(len) = self.frame_header_length {
            config.geometry.header_length = len;
        }
        config.geometry.validate().context("invalid frame geometry")?;
        Ok(config)
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.reader_config()?;
    debug!("{config:?}");

    let mut pipeline = Pipeline::new(config);
    if let Some(dir) = &cli.dmc {
        fs::create_dir_all(dir).with_context(|| format!("creating DMC directory {dir:?}"))?;
        pipeline = pipeline.with_dmc(DmcRepackager::new(dir));
    }

    info!("reading {:?}", cli.input);
    let report = match &cli.sct {
        Some(path) => {
            if !cli.clobber && path.exists() {
                bail!("{path:?} exists; use --clobber");
            }
            let dest = File::create(path)
                .with_context(|| format!("failed to create output {path:?}"))?;
            pipeline
                .with_sct(BufWriter::new(dest))
                .run_file(&cli.input)
        }
        None => pipeline.run_file(&cli.input),
    }
    .with_context(|| format!("processing {:?}", cli.input))?;

    report::print(&cli.input, &report, &cli.format)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("KPLR_LOG").unwrap_or_else(|_| EnvFilter::new(cli.log_level())),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match run(&cli) {
        Err(err)
            if matches!(
                err.downcast_ref::<kplr::Error>(),
                Some(kplr::Error::InvalidHeader { .. })
            ) =>
        {
            error!("{err:#}");
            std::process::exit(-1);
        }
        zult => zult,
    }
}
