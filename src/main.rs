use arhpak::archive::{Archive, ArchiveOptions};
use arhpak::header;
use arhpak::FileEntry;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "arhpak", about = "Inspect, extract and patch .arh/.ard archive pairs")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the decrypted header fields
    Info {
        arh: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List archive contents
    List {
        arh: PathBuf,
        ard: PathBuf,
        /// Only list names matching this glob
        #[arg(short, long)]
        filter: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Extract entries into a directory tree
    Extract {
        arh: PathBuf,
        ard: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        /// Only extract names matching this glob
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Write one entry to stdout
    Cat {
        arh: PathBuf,
        ard: PathBuf,
        name: String,
    },
    /// Recompress a file into an existing entry's slot
    Replace {
        arh: PathBuf,
        ard: PathBuf,
        name: String,
        input: PathBuf,
        /// Zstd level (defaults to the maximum)
        #[arg(short, long)]
        level: Option<i32>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { arh, json } => {
            let raw = std::fs::read(&arh)?;
            let info = header::decode(&raw)?.info;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
                return Ok(());
            }
            println!("── Archive header ───────────────────────────────────────");
            println!("  Path           {}", arh.display());
            println!("  Magic          {}", hex::encode(info.magic.to_le_bytes()));
            println!("  Field4         {}", info.field4);
            println!("  Nodes          {}", info.node_count);
            println!("  String table   {} B @ {:#x}", info.string_table_length, info.string_table_offset);
            println!("  Node table     {} B @ {:#x}", info.node_table_length, info.node_table_offset);
            println!("  File table     {} records @ {:#x}", info.file_count, info.file_table_offset);
            println!("  Key            {:08x}", info.key);
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { arh, ard, filter, json } => {
            let ar = Archive::open(&arh, &ard)?;
            let entries: Vec<&FileEntry> = match &filter {
                Some(glob) => ar.find_by_pattern(glob)?,
                None       => ar.entries().iter().collect(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            println!("{:>6} {:>12} {:>12} {:>12} {:>4}  Name",
                     "Id", "Offset", "Size", "Compressed", "Type");
            for e in entries {
                println!("{:>6} {:>12} {:>12} {:>12} {:>4}  {}",
                    e.id, e.offset, e.decoded_size(), e.compressed_size, e.type_tag,
                    e.filename.as_deref().unwrap_or("-"));
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { arh, ard, output_dir, filter } => {
            let ar = Archive::open(&arh, &ard)?;
            let report = match &filter {
                Some(glob) => ar.extract_matching(&output_dir, glob)?,
                None       => ar.extract_all(&output_dir)?,
            };
            println!("Extracted {}/{} files to {}", report.succeeded, report.attempted, output_dir.display());
            if !report.is_complete() {
                for (name, reason) in &report.failed {
                    eprintln!("  failed  {name}: {reason}");
                }
                return Err(format!("{} file(s) could not be extracted", report.failed.len()).into());
            }
        }

        // ── Cat ──────────────────────────────────────────────────────────────
        Commands::Cat { arh, ard, name } => {
            let ar = Archive::open(&arh, &ard)?;
            let entry = ar.lookup(&name)?
                .ok_or_else(|| arhpak::ArchiveError::EntryNotFound(name.clone()))?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            ar.write_entry_to(entry, &mut out)?;
            out.flush()?;
        }

        // ── Replace ──────────────────────────────────────────────────────────
        Commands::Replace { arh, ard, name, input, level } => {
            let mut options = ArchiveOptions::default();
            if let Some(level) = level {
                options.compression_level = level;
            }
            let mut ar = Archive::open_with(&arh, &ard, options)?;
            let data = std::fs::read(&input)?;
            ar.replace_by_name(&name, &data)?;
            println!("Replaced {name} with {} ({} B)", input.display(), data.len());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
