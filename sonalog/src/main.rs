use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sonalog::index::{IndexStore, LogSummary};
use sonalog::scanner::StreamScanner;
use sonalog::session::MultiFileSession;
use sonalog::synth;
use sonalog_core::line::{DisplayParams, Normalization};
use sonalog_core::{LogFormat, HEADER_SIZE};

#[derive(Parser, Debug)]
#[command(name = "sonalog", version, about = "Indexed sidescan sonar log decoder")]
struct Cli {
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a JSON summary of each log file
    Info {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Build or refresh the sidecar index of each log file
    Index {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Rebuild even when a valid sidecar already exists
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Reconstruct and print the line nearest a timestamp
    Line {
        /// Absolute timestamp, Unix epoch milliseconds
        #[arg(long)]
        at: u64,

        #[arg(long)]
        subsystem: u16,

        /// Skip time-varying gain correction
        #[arg(long, default_value_t = false)]
        raw: bool,

        /// Time-varying gain coefficient
        #[arg(long, default_value_t = 40.0)]
        tvg_gain: f32,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Stream all lines in a time window, one JSON object per line
    Lines {
        /// Window start, Unix epoch milliseconds (inclusive)
        #[arg(long)]
        from: u64,

        /// Window end, Unix epoch milliseconds (exclusive)
        #[arg(long)]
        to: u64,

        #[arg(long)]
        subsystem: u16,

        /// Skip time-varying gain correction
        #[arg(long, default_value_t = false)]
        raw: bool,

        /// Time-varying gain coefficient
        #[arg(long, default_value_t = 40.0)]
        tvg_gain: f32,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Generate a synthetic log file for demos and testing
    Synth {
        out: PathBuf,

        #[arg(long, value_enum, default_value_t = SynthFormat::Tagged)]
        format: SynthFormat,

        #[arg(long, default_value_t = 32)]
        pings: u32,

        /// Milliseconds between pings
        #[arg(long, default_value_t = 250)]
        period_ms: u32,

        /// Samples per channel per ping
        #[arg(long, default_value_t = 512)]
        samples: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SynthFormat {
    Tagged,
    Framed,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    match cli.command {
        Command::Info { files } => info_command(&files),
        Command::Index { files, force } => index_command(&files, force),
        Command::Line {
            at,
            subsystem,
            raw,
            tvg_gain,
            files,
        } => line_command(at, subsystem, params(raw, tvg_gain), &files),
        Command::Lines {
            from,
            to,
            subsystem,
            raw,
            tvg_gain,
            files,
        } => lines_command(from, to, subsystem, params(raw, tvg_gain), &files),
        Command::Synth {
            out,
            format,
            pings,
            period_ms,
            samples,
        } => synth_command(&out, format, pings, period_ms, samples),
    }
}

fn params(raw: bool, tvg_gain: f32) -> DisplayParams {
    DisplayParams {
        normalization: if raw {
            Normalization::Raw
        } else {
            Normalization::Tvg
        },
        tvg_gain,
    }
}

/// Index for one file: the sidecar when valid, a fresh scan otherwise.
fn load_or_scan(path: &Path) -> anyhow::Result<sonalog::TimeIndex> {
    let store = IndexStore::new();
    match store.load(path) {
        Ok(index) => Ok(index),
        Err(_) => {
            let format = probe_format(path)?;
            let (index, _) = StreamScanner::new(format)
                .scan_file(path)
                .with_context(|| format!("Scanning {}", path.display()))?;
            Ok(index)
        }
    }
}

fn probe_format(path: &Path) -> anyhow::Result<LogFormat> {
    use std::io::Read;
    let mut window = Vec::with_capacity(HEADER_SIZE);
    fs::File::open(path)
        .with_context(|| format!("Reading {}", path.display()))?
        .take(HEADER_SIZE as u64)
        .read_to_end(&mut window)?;
    Ok(LogFormat::detect(&window))
}

fn info_command(files: &[PathBuf]) -> anyhow::Result<()> {
    for path in files {
        let index = load_or_scan(path)?;
        let summary = LogSummary::new(path, &index);
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

fn index_command(files: &[PathBuf], force: bool) -> anyhow::Result<()> {
    let store = IndexStore::new();
    for path in files {
        if !force && store.load(path).is_ok() {
            info!("Sidecar up to date: {}", path.display());
            continue;
        }
        let format = probe_format(path)?;
        let (index, stats) = StreamScanner::new(format)
            .scan_file(path)
            .with_context(|| format!("Scanning {}", path.display()))?;
        store
            .save(&index, path)
            .with_context(|| format!("Saving sidecar for {}", path.display()))?;
        info!(
            "Indexed {} ({}): {} records, {} channel, {} broken, {} resyncs",
            path.display(),
            format,
            stats.records,
            stats.channel_records,
            stats.broken_records,
            stats.resyncs
        );
    }
    Ok(())
}

fn line_command(
    at: u64,
    subsystem: u16,
    params: DisplayParams,
    files: &[PathBuf],
) -> anyhow::Result<()> {
    let session = MultiFileSession::open(files)?;
    match session.line_at(at, subsystem, &params)? {
        Some(line) => println!("{}", serde_json::to_string_pretty(&*line)?),
        None => bail!("No line at or after {} for subsystem {}", at, subsystem),
    }
    session.close();
    Ok(())
}

fn lines_command(
    from: u64,
    to: u64,
    subsystem: u16,
    params: DisplayParams,
    files: &[PathBuf],
) -> anyhow::Result<()> {
    let session = MultiFileSession::open(files)?;
    let mut count = 0u64;
    for line in session.lines_between(from, to, subsystem, params) {
        println!("{}", serde_json::to_string(&*line)?);
        count += 1;
    }
    info!("{} lines in [{}, {})", count, from, to);
    session.close();
    Ok(())
}

fn synth_command(
    out: &Path,
    format: SynthFormat,
    pings: u32,
    period_ms: u32,
    samples: usize,
) -> anyhow::Result<()> {
    let epoch_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let bytes = match format {
        SynthFormat::Tagged => synth::tagged_log(
            epoch_ms,
            1,
            &synth::demo_pings_u64(pings, period_ms as u64, samples),
        ),
        SynthFormat::Framed => synth::framed_log(
            epoch_ms,
            20,
            &synth::demo_pings_u32(pings, period_ms, samples),
        ),
    };
    fs::write(out, &bytes).with_context(|| format!("Writing {}", out.display()))?;
    info!(
        "Wrote {} ({:?}, {} pings, {} bytes)",
        out.display(),
        format,
        pings,
        bytes.len()
    );
    Ok(())
}
