//! mailvault CLI — entry point.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use parking_lot::Mutex;

use mailvault::checkpoint::CheckpointStore;
use mailvault::config::TagConfig;
use mailvault::db::MailDb;
use mailvault::pipeline::{self, IngestOptions};
use mailvault::{export, report, search};

#[derive(Parser)]
#[command(
    name = "mailvault",
    version,
    about = "Local email/calendar archive ingestion into a tagged, queryable SQLite store"
)]
struct Cli {
    /// Verbose logging to stderr (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest archives (PST, zip export, mbox, eml/emlx tree, ICS)
    Ingest {
        /// Archive paths; each is detected by content, not extension
        #[arg(required = true)]
        archives: Vec<PathBuf>,

        /// SQLite store path (created if absent)
        #[arg(long)]
        db: PathBuf,

        /// Directory for per-archive checkpoint files
        #[arg(long)]
        checkpoints: PathBuf,

        /// Accounts/tagging config
        #[arg(long, default_value = "config/accounts.yml")]
        config: PathBuf,

        /// Records per storage transaction
        #[arg(long, default_value_t = pipeline::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Create or migrate the store schema without ingesting
    InitDb {
        #[arg(long)]
        db: PathBuf,
    },

    /// Full-text search over subject+body
    Search {
        #[arg(long)]
        db: PathBuf,
        query: String,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Cosine-similarity search over stored embeddings
    SemanticSearch {
        #[arg(long)]
        db: PathBuf,
        #[arg(long, default_value = "config/accounts.yml")]
        config: PathBuf,
        query: String,
        #[arg(long, default_value_t = 10)]
        k: usize,
    },

    /// Render an HTML dossier for one account
    MakeDossier {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        account: String,
        #[arg(long)]
        out: PathBuf,
    },

    /// Render a chronological HTML compliance timeline for one account
    ComplianceTimeline {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        account: String,
        #[arg(long)]
        out: PathBuf,
    },

    /// Export all store tables as CSV
    Export {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_level),
    )
    .init();

    process::exit(execute(cli.command));
}

fn execute(command: Commands) -> i32 {
    match command {
        Commands::Ingest {
            archives,
            db,
            checkpoints,
            config,
            batch_size,
        } => ingest(archives, db, checkpoints, config, batch_size),

        Commands::InitDb { db } => match MailDb::open(&db) {
            Ok(_) => {
                println!("Store initialized at {}", db.display());
                0
            }
            Err(e) => {
                eprintln!("Error: {e}");
                1
            }
        },

        Commands::Search { db, query, limit } => {
            read_side(&db, |store| search::search(store, &query, limit).map(print_out))
        }

        Commands::SemanticSearch {
            db,
            config,
            query,
            k,
        } => {
            let config = match TagConfig::load(&config) {
                Ok(c) => c,
                Err(e) => return config_fatal(e),
            };
            read_side(&db, |store| {
                search::semantic_search(store, &config, &query, k).map(print_out)
            })
        }

        Commands::MakeDossier { db, account, out } => read_side(&db, |store| {
            report::make_dossier(store, &account, &out)
                .map(|path| println!("Wrote dossier to {}", path.display()))
        }),

        Commands::ComplianceTimeline { db, account, out } => read_side(&db, |store| {
            report::compliance_timeline(store, &account, &out)
                .map(|path| println!("Wrote compliance timeline to {}", path.display()))
        }),

        Commands::Export { db, out } => read_side(&db, |store| {
            export::export_tables(store, &out).map(|files| {
                println!("Exported {} table(s) to {}", files.len(), out.display())
            })
        }),
    }
}

fn ingest(
    archives: Vec<PathBuf>,
    db: PathBuf,
    checkpoints: PathBuf,
    config: PathBuf,
    batch_size: usize,
) -> i32 {
    // Config problems abort before any writes.
    let config = match TagConfig::load(&config) {
        Ok(c) => c,
        Err(e) => return config_fatal(e),
    };

    let store = match MailDb::open(&db) {
        Ok(store) => Mutex::new(store),
        Err(e) => {
            eprintln!("Error: cannot open store: {e}");
            return 1;
        }
    };
    let checkpoints = match CheckpointStore::new(&checkpoints) {
        Ok(cp) => cp,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };

    let options = IngestOptions { batch_size };
    let results = pipeline::ingest_many(&store, &checkpoints, &config, &archives, &options);

    let mut failed = 0usize;
    for (archive, result) in &results {
        match result {
            Ok(s) => println!(
                "{}: ok kind={} processed={} messages={} events={} duplicate={} corrupt={} tagged={} untagged={}{}",
                archive.display(),
                s.kind,
                s.processed,
                s.stored_messages,
                s.stored_events,
                s.skipped_duplicate,
                s.skipped_corrupt,
                s.tagged,
                s.untagged,
                if s.resumed_from > 0 {
                    format!(" (resumed after {})", s.resumed_from)
                } else {
                    String::new()
                },
            ),
            Err(e) => {
                failed += 1;
                eprintln!("{}: failed [{}]: {e}", archive.display(), e.reason_code());
            }
        }
    }

    if failed > 0 {
        eprintln!("{failed} of {} archive(s) failed", results.len());
        1
    } else {
        0
    }
}

/// Open the store read-only and run one query-side action against it.
fn read_side<F>(db: &PathBuf, f: F) -> i32
where
    F: FnOnce(&MailDb) -> Result<(), String>,
{
    let store = match MailDb::open_readonly(db) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: cannot open store {}: {e}", db.display());
            return 1;
        }
    };
    match f(&store) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}

fn config_fatal(e: mailvault::error::IngestError) -> i32 {
    eprintln!("Error [{}]: {e}", e.reason_code());
    2
}

fn print_out(out: String) {
    println!("{out}");
}
