// PhotoCanvas - local storage core for a photo canvas
// Command-line entry point

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use photocanvas::app::AppState;
use photocanvas::services::UploadedFile;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding settings, the database and the key-value store
    #[arg(
        short,
        long,
        env = "PHOTOCANVAS_DATA_DIR",
        default_value = "photocanvas-data",
        global = true
    )]
    data_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty gallery
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List galleries, most recently updated first
    List,
    /// Print a gallery document as JSON
    Show { id: String },
    /// Process images into the cache, optionally adding them to a gallery library
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Gallery whose library receives the images
        #[arg(short, long)]
        gallery: Option<String>,
    },
    /// Place a library image on a gallery canvas
    Place {
        gallery: String,
        library_id: String,
        #[arg(long, default_value_t = 0.0)]
        x: f64,
        #[arg(long, default_value_t = 0.0)]
        y: f64,
    },
    /// Delete a gallery
    Delete { id: String },
    /// Show storage usage
    Usage,
    /// Empty the image cache
    ClearCache {
        /// Only remove entries past the expiry window
        #[arg(long)]
        expired: bool,
    },
    /// Move legacy key-value data into the indexed store
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photocanvas=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let state = AppState::initialize(&cli.data_dir)
        .await
        .with_context(|| format!("failed to open data directory {:?}", cli.data_dir))?;

    let result = run(&state, cli.command).await;
    state.close().await;
    result
}

async fn run(state: &AppState, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Create { name, description } => {
            let doc = state.galleries.create(&name, description).await?;
            println!("{}", doc.id);
        }
        Commands::List => {
            for entry in state.galleries.list().await? {
                println!(
                    "{}  {}  {} photos  {} images  updated {}",
                    entry.id,
                    entry.name,
                    entry.metadata.photo_count,
                    entry.metadata.library_count,
                    entry.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Commands::Show { id } => match state.galleries.get(&id).await? {
            Some(doc) => println!("{}", serde_json::to_string_pretty(&doc)?),
            None => bail!("no gallery with id {}", id),
        },
        Commands::Import { files, gallery } => {
            let mut doc = match &gallery {
                Some(id) => match state.galleries.get(id).await? {
                    Some(doc) => Some(doc),
                    None => bail!("no gallery with id {}", id),
                },
                None => None,
            };

            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                uploads.push(
                    UploadedFile::from_path(path)
                        .await
                        .with_context(|| format!("failed to read {:?}", path))?,
                );
            }

            for result in state.images.import_batch(uploads).await {
                let imported = result?;
                let record = &imported.record;
                let status = match (imported.from_cache, imported.fallback) {
                    (true, _) => "cached",
                    (false, true) => "unprocessed",
                    (false, false) => "processed",
                };

                match doc.as_mut() {
                    Some(doc) => {
                        let library_id = doc.add_to_library(record);
                        println!("{}  {}  {}  library {}", record.id, record.original_name, status, library_id);
                    }
                    None => println!("{}  {}  {}", record.id, record.original_name, status),
                }
            }

            if let Some(doc) = doc {
                let outcome = state.galleries.save(&doc).await?;
                if outcome.was_stripped() {
                    eprintln!("warning: gallery was stripped to fit storage");
                }
            }
        }
        Commands::Place {
            gallery,
            library_id,
            x,
            y,
        } => {
            let Some(mut doc) = state.galleries.get(&gallery).await? else {
                bail!("no gallery with id {}", gallery);
            };
            let Some(photo_id) = doc.place_photo(&library_id, x, y) else {
                bail!("no library image {} in gallery {}", library_id, gallery);
            };
            state.galleries.save(&doc).await?;
            println!("{}", photo_id);
        }
        Commands::Delete { id } => {
            if !state.galleries.delete(&id).await? {
                eprintln!("no gallery with id {}", id);
            }
        }
        Commands::Usage => {
            let usage = state.accounting.usage().await;
            println!("{}", serde_json::to_string_pretty(&usage)?);
        }
        Commands::ClearCache { expired } => {
            let removed = if expired {
                state
                    .cache_store
                    .clear_expired(state.settings.cache.expiry_ms())
                    .await?
            } else {
                state.cache_store.clear_all().await?
            };
            println!("removed {} cache entries", removed);
        }
        Commands::Migrate => {
            let report = state.migrate().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
