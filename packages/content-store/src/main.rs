use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use content_store::db::{Record, RecordDb};
use content_store::storage::LocalResolver;
use content_store::{ContentStore, Fields, StoreConfig, StoreRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

#[derive(Parser)]
#[command(name = "cstore")]
#[command(about = "Attach binary content to named records", long_about = None)]
#[command(version)]
struct Cli {
    /// Store root, overriding the config file
    #[arg(long, global = true, env = "CONTENT_STORE_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the content of a record from a file
    Put {
        /// Record name
        name: String,

        /// Path to the file to store
        file: PathBuf,
    },

    /// Write the content of a record to a file or stdout
    Get {
        /// Record name
        name: String,

        /// Output file (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Remove the content of a record
    Rm {
        /// Record name
        name: String,
    },

    /// List records and their content
    Ls,

    /// Print a record as JSON
    Show {
        /// Record name
        name: String,
    },

    /// List configured content stores
    Stores,
}

type RecordStore = ContentStore<Record, LocalResolver>;

async fn open_store(config: &StoreConfig) -> Result<(Arc<RecordStore>, RecordDb)> {
    let resolver = LocalResolver::from_config(config);
    resolver.initialize().await?;

    let store: RecordStore =
        ContentStore::new(resolver, config.placement_service(), Arc::new(Fields));
    let db = RecordDb::open(&config.db_path()).await?;
    Ok((Arc::new(store), db))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = StoreConfig::load().await?;
    if let Some(root) = cli.root {
        config.root = root;
    }
    tracing::debug!("Using store root: {}", config.root.display());

    let (store, db) = open_store(&config).await?;

    match cli.command {
        Commands::Put { name, file } => {
            tracing::info!("Storing {} for record {}", file.display(), name);
            let input = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Failed to open file: {}", file.display()))?;

            let mut record = db.find_or_new(&name).await?;
            store.set_content(&mut record, input).await?;
            db.save(&record).await?;

            println!(
                "{} {} ({} bytes)",
                record.name,
                record.content_id.as_deref().unwrap_or_default(),
                record.content_length
            );
            Ok(())
        }
        Commands::Get { name, output } => {
            let record = db
                .find(&name)
                .await?
                .with_context(|| format!("No such record: {}", name))?;

            let mut content = store
                .get_content(&record)
                .await?
                .with_context(|| format!("Record {} has no content", name))?;

            match output {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("Failed to create file: {}", path.display()))?;
                    let written = tokio::io::copy(&mut content, &mut file).await?;
                    file.flush().await?;
                    tracing::info!("Wrote {} bytes to {}", written, path.display());
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    tokio::io::copy(&mut content, &mut stdout).await?;
                    stdout.flush().await?;
                }
            }
            Ok(())
        }
        Commands::Rm { name } => {
            match db.find(&name).await? {
                Some(mut record) => {
                    store.unset_content(&mut record).await?;
                    db.save(&record).await?;
                    println!("Removed content of {}", name);
                }
                None => {
                    tracing::info!("No record named {}, nothing to remove", name);
                }
            }
            Ok(())
        }
        Commands::Ls => {
            for record in db.list().await? {
                println!(
                    "{}\t{}\t{}",
                    record.name,
                    record.content_id.as_deref().unwrap_or("-"),
                    record.content_length
                );
            }
            Ok(())
        }
        Commands::Show { name } => {
            let record = db
                .find(&name)
                .await?
                .with_context(|| format!("No such record: {}", name))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Commands::Stores => {
            let mut registry = StoreRegistry::new();
            registry.register(Arc::clone(&store));
            println!("{}", serde_json::to_string_pretty(&registry.content_stores())?);
            Ok(())
        }
    }
}
