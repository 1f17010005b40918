//! Command-line interface for listing and extracting archives.
//!
//! This CLI tool provides a simple interface for reading TAR, ZIP, 7z and
//! bare compressed files from the command line.

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use unarc::{ArchiveReader, Entry, ExtractOptions, Limits};

#[derive(Parser)]
#[command(name = "unarc")]
#[command(version, about = "List and extract archives from the command line", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the entries of an archive
    List {
        /// Archive file to list
        archive: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        limits: LimitArgs,
    },

    /// Extract one or more archives
    Extract {
        /// Archive files to extract
        #[arg(required = true)]
        archives: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,

        /// Strip leading path components
        #[arg(long, default_value = "0")]
        strip_components: u32,

        /// Do not restore permission bits
        #[arg(long)]
        no_preserve_perms: bool,

        /// Do not restore modification times
        #[arg(long)]
        no_preserve_times: bool,

        #[command(flatten)]
        limits: LimitArgs,
    },
}

/// Limit flags; 0 keeps the built-in default.
#[derive(Args)]
struct LimitArgs {
    /// Maximum number of entries
    #[arg(long, default_value = "0")]
    max_entries: u64,

    /// Maximum decompressed bytes per stream
    #[arg(long, default_value = "0")]
    max_bytes: u64,

    /// Maximum entry name length
    #[arg(long, default_value = "0")]
    max_name: u64,

    /// Maximum path depth
    #[arg(long, default_value = "0")]
    max_depth: u64,
}

impl LimitArgs {
    fn to_limits(&self) -> Limits {
        Limits {
            max_entries: self.max_entries,
            max_name: self.max_name,
            max_uncompressed_bytes: self.max_bytes,
            max_nested_depth: self.max_depth,
            ..Limits::unset()
        }
        .resolved()
    }
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::List {
            archive,
            json,
            limits,
        } => handle_list(&archive, json, limits.to_limits()),
        Commands::Extract {
            archives,
            out,
            strip_components,
            no_preserve_perms,
            no_preserve_times,
            limits,
        } => {
            let options = ExtractOptions {
                preserve_permissions: !no_preserve_perms,
                preserve_timestamps: !no_preserve_times,
                strip_components,
            };
            handle_extract(&archives, &out, &options, limits.to_limits())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn handle_list(archive: &Path, json: bool, limits: Limits) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        let info = unarc::probe::probe_archive(archive, limits)?;
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let mut reader = ArchiveReader::open_path(archive, limits)?;
    while let Some(entry) = reader.next_entry()? {
        println!("{}", format_entry(&entry));
    }
    reader.close();
    Ok(())
}

fn format_entry(entry: &Entry) -> String {
    let mut line = format!(
        "{}{:04o} {:>12} {:>12} {}",
        entry.entry_type.tag(),
        entry.mode & 0o7777,
        entry.size,
        entry.mtime,
        entry.path
    );
    if let Some(target) = &entry.link_target {
        line.push_str(" -> ");
        line.push_str(target);
    }
    line
}

fn handle_extract(
    archives: &[PathBuf],
    out: &Path,
    options: &ExtractOptions,
    limits: Limits,
) -> Result<(), Box<dyn std::error::Error>> {
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel_flag.clone();
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed))?;

    let style = ProgressStyle::with_template("{spinner} {prefix} {wide_msg}")?;

    for archive in archives {
        let spinner = ProgressBar::new_spinner()
            .with_style(style.clone())
            .with_prefix(archive.display().to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        let mut reader = ArchiveReader::open_path(archive, limits)?;
        debug!(archive = %archive.display(), format = %reader.format(), "extracting");
        let progress = {
            let spinner = spinner.clone();
            move |file: &str, bytes: u64, _total: Option<u64>| {
                spinner.set_message(format!("{} ({} bytes)", file, bytes));
                true
            }
        };

        let result =
            unarc::extract_with_progress(&mut reader, out, options, &progress, cancel_flag.clone());
        reader.close();

        match result {
            Ok(stats) => spinner.finish_with_message(format!(
                "{} files, {} dirs, {} bytes in {:.2}s",
                stats.files_extracted,
                stats.dirs_created,
                stats.bytes_written,
                stats.duration.as_secs_f64()
            )),
            Err(e) => {
                spinner.abandon_with_message("failed");
                return Err(e.into());
            }
        }
    }

    Ok(())
}
