use cfbstream::check::{check, ChainHealth, Verdict};
use cfbstream::container::{Container, ContainerOptions};
use clap::{ArgAction, Parser, Subcommand};
use std::io::{self, Read, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cfbstream", about = "Read streams from Compound File Binary containers")]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Reject headers that do not strictly conform
    #[arg(long, global = true)]
    strict: bool,
    /// Scan every stream while opening and refuse damaged containers
    #[arg(long, global = true)]
    verify: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show header fields
    Info {
        input: PathBuf,
    },
    /// List storages and streams
    List {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Write a stream's content to stdout
    Cat {
        input: PathBuf,
        /// Entry path, `/`-separated
        entry: String,
    },
    /// Hex dump part of a stream
    Dump {
        input: PathBuf,
        entry: String,
        #[arg(long, default_value = "0")]
        offset: u64,
        /// Bytes to dump (default: to the end of the stream)
        #[arg(long)]
        length: Option<u64>,
    },
    /// Extract every storage and stream into a directory tree
    Extract {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Verify every stream chain and report damage
    Check {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let options = ContainerOptions { strict: cli.strict, verify_on_open: cli.verify };

    match cli.command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let container = Container::open_with(&input, options)?;
            let h = container.header();
            let root = container.directory().root();
            println!("── Compound File ───────────────────────────────────────");
            println!("  Path             {}", input.display());
            println!("  Size             {} B", container.image_len());
            println!("  Version          {}.{}", h.major_version, h.minor_version);
            println!("  Sector size      {} B", h.sector_size());
            println!("  Mini sector size {} B", h.mini_sector_size());
            println!("  Mini cutoff      {} B", h.mini_stream_cutoff);
            println!("  FAT sectors      {}", h.num_fat_sectors);
            println!("  DIFAT sectors    {}", h.num_difat_sectors);
            println!("  MiniFAT sectors  {}", h.num_minifat_sectors);
            println!("  Dir entries      {}", container.directory().entries().len());
            println!("  Root CLSID       {}", root.clsid);
            println!("  Mini stream      {} B", root.size);
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let container = Container::open_with(&input, options)?;
            let entries = container.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("{:<40} {:>8} {:>12} {:>5}  Modified", "Path", "Kind", "Size", "Mini");
                for e in entries {
                    let modified = e.modified
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "—".into());
                    println!("{:<40} {:>8} {:>12} {:>5}  {}",
                        e.path.escape_default().to_string(), format!("{:?}", e.kind).to_lowercase(),
                        e.size, if e.in_mini_stream { "yes" } else { "" }, modified);
                }
            }
        }

        // ── Cat ──────────────────────────────────────────────────────────────
        Commands::Cat { input, entry } => {
            let container = Container::open_with(&input, options)?;
            let mut stream = container.open_stream(&entry)?;
            let stdout = io::stdout();
            io::copy(&mut stream, &mut stdout.lock())?;
        }

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { input, entry, offset, length } => {
            let container = Container::open_with(&input, options)?;
            let mut stream = container.open_stream(&entry)?;
            let start = stream.skip(i64::try_from(offset).unwrap_or(i64::MAX))?;
            let limit = length.unwrap_or(u64::MAX);
            let mut data = Vec::new();
            (&mut stream).take(limit).read_to_end(&mut data)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for (i, line) in data.chunks(16).enumerate() {
                let ascii: String = line.iter()
                    .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
                    .collect();
                writeln!(out, "{:08x}  {:<32}  {}", start + (i * 16) as u64, hex::encode(line), ascii)?;
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output_dir } => {
            let container = Container::open_with(&input, options)?;
            let n = container.extract_all(&output_dir)?;
            println!("Extracted {} stream(s) to: {}", n, output_dir.display());
        }

        // ── Check ────────────────────────────────────────────────────────────
        Commands::Check { input, json } => {
            let container = Container::open_with(&input, options)?;
            let report = check(&container)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for e in &report.entries {
                    let status = match &e.health {
                        ChainHealth::Healthy => format!("ok  crc32={:08x}", e.crc32.unwrap_or(0)),
                        ChainHealth::Broken { error } => format!("BROKEN  {error}"),
                        ChainHealth::TooShort { declared, capacity } =>
                            format!("SHORT  declared {declared} B, chain holds {capacity} B"),
                        ChainHealth::Unreadable { error } => format!("UNREADABLE  {error}"),
                    };
                    println!("  {:<40} {:>10} B  {}", e.path.escape_default().to_string(), e.size, status);
                }
            }
            if let Verdict::Damaged { bad } = report.verdict {
                return Err(format!("{bad} damaged stream(s)").into());
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}
