//! memovault CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use memovault::{
    commands::{
        cmd_add_document, cmd_init, cmd_list_documents, cmd_reap, cmd_reap_watch,
        cmd_reindex_document, cmd_remove_document, cmd_remove_knowledge_base, cmd_search,
        cmd_status, cmd_update_document, print_documents, print_init, print_reap_result,
        print_search_results, print_status, print_submission, AddOptions, InitOptions,
        SearchOptions,
    },
    config::Config,
    docs::{DocType, SqliteDocuments},
    embed::create_embedder,
    error::{Error, Result},
    store::QdrantStore,
    sync::SyncHook,
    tasks::TaskDb,
};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "memovault")]
#[command(version, about = "Personal knowledge base with background vector indexing", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Owner the operation runs as
    #[arg(long, global = true, default_value = "local")]
    owner: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize memovault configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Add a document and index it in the background
    Add {
        /// File to read content from (stdin if omitted)
        path: Option<PathBuf>,

        /// Document name (defaults to file name)
        #[arg(short, long)]
        name: Option<String>,

        /// Knowledge base to add the document to
        #[arg(long, default_value = "default")]
        kb: String,
    },

    /// Replace a document's content and reindex it
    Update {
        /// Document ID
        document_id: String,

        /// File to read content from (stdin if omitted)
        path: Option<PathBuf>,
    },

    /// Reindex a document without changing it
    Reindex {
        /// Document ID
        document_id: String,
    },

    /// List documents and their indexing status
    List {
        /// Restrict to one knowledge base
        #[arg(long)]
        kb: Option<String>,
    },

    /// Remove a document and all its vectors
    Remove {
        /// Document ID
        document_id: String,
    },

    /// Remove a knowledge base with all its documents and vectors
    RemoveKb {
        /// Knowledge base ID
        knowledge_base_id: String,
    },

    /// Search the index
    Search {
        /// The search query
        query: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Restrict to one knowledge base
        #[arg(long)]
        kb: Option<String>,
    },

    /// Show system status
    Status,

    /// Mark stuck indexing tasks as timed out
    Reap {
        /// Keep sweeping on the configured interval
        #[arg(long)]
        watch: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // init needs no existing config
    if let Commands::Init { force } = cli.command {
        let base_dir = cli
            .config
            .as_deref()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Config::default_base_dir);
        let config = cmd_init(InitOptions { base_dir, force }).await?;
        print_init(&config);
        return Ok(());
    }

    // completions need no config, database, or store
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "memovault", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let db = TaskDb::new(&config.paths.db_file).await?;
    let documents = SqliteDocuments::new(db.pool().clone());
    let store = QdrantStore::connect(&config).await?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Add { path, name, kb } => {
            let content = read_content(path.as_deref())?;
            let name = name
                .or_else(|| {
                    path.as_deref()
                        .and_then(|p| p.file_name())
                        .map(|n| n.to_string_lossy().into_owned())
                })
                .unwrap_or_else(|| "untitled".to_string());
            let doc_type = if path.is_some() {
                DocType::File
            } else {
                DocType::Note
            };

            let hook = build_hook(&config, &db, &documents, store).await?;
            let (doc, task) = cmd_add_document(
                &documents,
                &hook,
                &cli.owner,
                content,
                AddOptions {
                    name,
                    knowledge_base_id: kb,
                    doc_type,
                },
            )
            .await?;
            hook.wait_idle().await;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                print_submission(&doc, &task);
            }
        }

        Commands::Update { document_id, path } => {
            let content = read_content(path.as_deref())?;
            let hook = build_hook(&config, &db, &documents, store).await?;
            let (doc, task) =
                cmd_update_document(&documents, &hook, &cli.owner, &document_id, content).await?;
            hook.wait_idle().await;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                print_submission(&doc, &task);
            }
        }

        Commands::Reindex { document_id } => {
            let hook = build_hook(&config, &db, &documents, store).await?;
            let (doc, task) =
                cmd_reindex_document(&documents, &hook, &cli.owner, &document_id).await?;
            hook.wait_idle().await;
            print_submission(&doc, &task);
        }

        Commands::List { kb } => {
            let listed = cmd_list_documents(&documents, &db, &cli.owner, kb.as_deref()).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&listed)?);
            } else {
                print_documents(&listed);
            }
        }

        Commands::Remove { document_id } => {
            let hook = hook_without_embedder(&config, &db, &documents, store);
            let removed = cmd_remove_document(&documents, &hook, &cli.owner, &document_id).await?;
            println!("Removed document {} ({} vectors)", document_id, removed);
        }

        Commands::RemoveKb { knowledge_base_id } => {
            let hook = hook_without_embedder(&config, &db, &documents, store);
            let (docs_removed, vectors_removed) =
                cmd_remove_knowledge_base(&documents, &hook, &cli.owner, &knowledge_base_id)
                    .await?;
            println!(
                "Removed knowledge base {} ({} documents, {} vectors)",
                knowledge_base_id, docs_removed, vectors_removed
            );
        }

        Commands::Search { query, limit, kb } => {
            let embedder = create_embedder(&config.embedding)?;
            let hits = cmd_search(
                &config,
                embedder.as_ref(),
                &store,
                &cli.owner,
                &query,
                SearchOptions {
                    k: limit,
                    knowledge_base_id: kb,
                },
            )
            .await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                print_search_results(&hits);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &db, &store).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Reap { watch } => {
            if watch {
                cmd_reap_watch(&config, &db).await?;
            } else {
                let reaped = cmd_reap(&config, &db).await?;
                print_reap_result(reaped);
            }
        }
    }

    Ok(())
}

fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    let config = match config_path {
        Some(path) => Config::load(path)?,
        None => {
            let config = Config::load_from(None)?;
            if !config.is_initialized() {
                return Err(Error::NotInitialized);
            }
            config
        }
    };
    config.validate()?;
    Ok(config)
}

/// Hook with the full pipeline, for commands that index
async fn build_hook(
    config: &Config,
    db: &TaskDb,
    documents: &SqliteDocuments,
    store: QdrantStore,
) -> Result<SyncHook> {
    store.ensure_collection().await?;
    let embedder = create_embedder(&config.embedding)?;
    Ok(SyncHook::new(
        db.clone(),
        Arc::new(documents.clone()),
        Arc::from(embedder),
        Arc::new(store),
        config,
    ))
}

/// Hook for delete paths, which never embed. Avoids loading the model.
fn hook_without_embedder(
    config: &Config,
    db: &TaskDb,
    documents: &SqliteDocuments,
    store: QdrantStore,
) -> SyncHook {
    SyncHook::new(
        db.clone(),
        Arc::new(documents.clone()),
        Arc::new(NoEmbedder),
        Arc::new(store),
        config,
    )
}

/// Placeholder embedder for paths that only delete
struct NoEmbedder;

#[async_trait::async_trait]
impl memovault::embed::Embedder for NoEmbedder {
    async fn embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Err(Error::Embedding(
            "No embedder configured for this operation".to_string(),
        ))
    }

    fn dimension(&self) -> usize {
        0
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

fn read_content(path: Option<&std::path::Path>) -> Result<String> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut content = String::new();
            std::io::stdin().read_to_string(&mut content)?;
            Ok(content)
        }
    }
}
