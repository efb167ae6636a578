use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_rag_core::{
    reset_workspace, CharacterNgramEmbedder, ChatSession, DedupMode, Embedder, EmbedderBackend,
    HttpOcrEngineFactory, IngestionPipeline, LocalVectorStore, LopdfExtractor, OcrEndpointConfig,
    OcrEngineFactory, OllamaChatModel, OllamaEmbedder, PdftoppmRasterizer, QdrantStore, RagConfig,
    ReplCommand, RetrievalAnswerer, ScannedExtractor, StoreBackend, UnconfiguredOcr, VectorStore,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file layered over the built-in defaults
    #[arg(long, env = "PDF_RAG_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Vector store backend (qdrant by default, local for offline runs)
    #[arg(long, env = "PDF_RAG_STORE", global = true)]
    store: Option<StoreArg>,

    /// Embedding backend
    #[arg(long, env = "PDF_RAG_EMBEDDER", global = true)]
    embedder: Option<EmbedderArg>,

    /// Directory holding the persisted vector store
    #[arg(long, env = "PDF_RAG_STORE_DIR", global = true)]
    store_dir: Option<PathBuf>,

    /// Directory receiving the extracted text of every ingested PDF
    #[arg(long, env = "PDF_RAG_TEXTS_DIR", global = true)]
    texts_dir: Option<PathBuf>,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_URL", global = true)]
    ollama_url: Option<String>,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", global = true)]
    qdrant_url: Option<String>,

    /// OCR service endpoint used for scanned PDFs
    #[arg(long, env = "OCR_ENDPOINT", global = true)]
    ocr_endpoint: Option<String>,

    /// Bearer token for the OCR service
    #[arg(long, env = "OCR_API_KEY", global = true, hide_env_values = true)]
    ocr_api_key: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreArg {
    Local,
    Qdrant,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderArg {
    Ollama,
    Ngram,
}

#[derive(Clone, Copy, ValueEnum)]
enum DedupArg {
    Snapshot,
    Live,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest every PDF directly inside a folder.
    Ingest {
        /// Folder that contains PDFs (not searched recursively).
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Whether duplicates are checked against a start-of-run snapshot or live.
        #[arg(long)]
        dedup: Option<DedupArg>,
        /// Resolution used when rendering scanned pages for OCR.
        #[arg(long)]
        dpi: Option<u32>,
        /// Number of OCR worker threads.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Answer a single question from the stored documents.
    Ask {
        #[arg(long)]
        query: String,
        /// Print the retrieved chunks after the answer.
        #[arg(long, default_value_t = false)]
        show_context: bool,
    },
    /// Interactive question loop.
    Chat,
    /// Delete the vector store and all extracted text.
    Reset,
}

impl Cli {
    fn resolve_config(&self) -> anyhow::Result<RagConfig> {
        let mut config = RagConfig::load(self.config.as_deref())?;

        if let Some(store) = self.store {
            config.store.backend = match store {
                StoreArg::Local => StoreBackend::Local,
                StoreArg::Qdrant => StoreBackend::Qdrant,
            };
        }
        if let Some(embedder) = self.embedder {
            config.store.embedder = match embedder {
                EmbedderArg::Ollama => EmbedderBackend::Ollama,
                EmbedderArg::Ngram => EmbedderBackend::Ngram,
            };
        }
        if let Some(dir) = &self.store_dir {
            config.paths.store_dir = dir.clone();
        }
        if let Some(dir) = &self.texts_dir {
            config.paths.texts_dir = dir.clone();
        }
        if let Some(url) = &self.ollama_url {
            config.models.ollama_url = url.clone();
        }
        if let Some(url) = &self.qdrant_url {
            config.store.qdrant_url = url.clone();
        }
        if let Some(endpoint) = &self.ocr_endpoint {
            config.ocr.endpoint = Some(endpoint.clone());
        }
        if let Some(key) = &self.ocr_api_key {
            config.ocr.api_key = Some(key.clone());
        }

        if let Command::Ingest {
            dedup,
            dpi,
            workers,
            ..
        } = &self.command
        {
            if let Some(dedup) = dedup {
                config.ingestion.dedup_mode = match dedup {
                    DedupArg::Snapshot => DedupMode::Snapshot,
                    DedupArg::Live => DedupMode::Live,
                };
            }
            if let Some(dpi) = dpi {
                config.ingestion.ocr_dpi = *dpi;
            }
            if let Some(workers) = workers {
                config.ingestion.ocr_workers = Some(*workers);
            }
        }

        config.validate()?;
        Ok(config)
    }
}

fn build_embedder(config: &RagConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.store.embedder {
        EmbedderBackend::Ollama => Arc::new(OllamaEmbedder::new(
            &config.models.ollama_url,
            &config.models.embedding_model,
            Duration::from_secs(config.models.timeout_secs),
        )?),
        EmbedderBackend::Ngram => Arc::new(CharacterNgramEmbedder::default()),
    };
    Ok(embedder)
}

fn build_store(config: &RagConfig) -> anyhow::Result<Arc<dyn VectorStore>> {
    let embedder = build_embedder(config)?;
    let store: Arc<dyn VectorStore> = match config.store.backend {
        StoreBackend::Local => Arc::new(
            LocalVectorStore::open(&config.paths.store_dir, &config.paths.collection, embedder)
                .with_context(|| {
                    format!("opening store at {}", config.paths.store_dir.display())
                })?,
        ),
        StoreBackend::Qdrant => Arc::new(QdrantStore::new(
            &config.store.qdrant_url,
            &config.paths.collection,
            embedder,
        )),
    };
    Ok(store)
}

fn build_scanned_extractor(config: &RagConfig) -> ScannedExtractor {
    let ocr: Arc<dyn OcrEngineFactory> = match &config.ocr.endpoint {
        Some(endpoint) => Arc::new(HttpOcrEngineFactory::new(OcrEndpointConfig {
            endpoint: endpoint.clone(),
            api_key: config.ocr.api_key.clone(),
            timeout: Duration::from_secs(config.ocr.timeout_secs),
        })),
        None => Arc::new(UnconfiguredOcr),
    };

    ScannedExtractor::new(
        Arc::new(PdftoppmRasterizer::new(&config.ocr.pdftoppm)),
        ocr,
        config.ingestion.ocr_dpi,
        config.ingestion.ocr_workers,
    )
}

fn build_answerer(
    config: &RagConfig,
    store: Arc<dyn VectorStore>,
) -> anyhow::Result<RetrievalAnswerer<Arc<dyn VectorStore>, OllamaChatModel>> {
    let model = OllamaChatModel::new(
        &config.models.ollama_url,
        &config.models.chat_model,
        config.models.temperature,
        Duration::from_secs(config.models.timeout_secs),
    )?;
    Ok(RetrievalAnswerer::new(store, model).with_top_k(config.retrieval.top_k))
}

async fn run_chat(
    answerer: &RetrievalAnswerer<Arc<dyn VectorStore>, OllamaChatModel>,
) -> anyhow::Result<()> {
    println!("Welcome to CHAT! Ask your question or type 'q', 'quit', or 'exit' to end the session.");
    println!("Type 'clear' or 'reset' to start a new session.");

    let mut editor = DefaultEditor::new().context("failed to initialize line editor")?;
    let mut session = ChatSession::new();

    loop {
        let line = match editor.readline("User: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => return Err(error.into()),
        };

        match ReplCommand::parse(&line) {
            ReplCommand::Quit => break,
            ReplCommand::Empty => continue,
            ReplCommand::Clear => {
                session.clear();
                println!("Chat history cleared. You can start a new conversation.");
            }
            ReplCommand::Query(question) => {
                editor.add_history_entry(question.as_str()).ok();
                let answer = answerer.respond(&question).await;
                println!("CHAT: {answer}\n");
                session.record(question, answer);
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    let store = build_store(&config)?;

    match cli.command {
        Command::Ingest { folder, .. } => {
            let folder = folder.unwrap_or_else(|| config.paths.input_dir.clone());
            let pipeline = IngestionPipeline::new(
                store,
                Box::new(LopdfExtractor),
                build_scanned_extractor(&config),
                &config.ingestion,
                &config.paths.texts_dir,
            )?;

            let report = pipeline.run(&folder).await?;

            if !report.skipped_files.is_empty() {
                warn!(
                    "skipped_files={} for folder={}",
                    report.skipped_files.len(),
                    folder.display()
                );
            }

            for document in &report.committed {
                println!(
                    "committed {} [{}] chunks={} digest={} text={}",
                    document.source,
                    document.kind,
                    document.chunk_count,
                    document.digest,
                    document.text_path.display()
                );
            }
            for path in &report.deduplicated {
                println!("already stored {}", path.display());
            }
            for document in &report.empty {
                println!(
                    "no text in {} [{}], nothing stored (text={})",
                    document.path.display(),
                    document.kind,
                    document.text_path.display()
                );
            }
            for skipped in &report.skipped_files {
                println!("skipped {}: {}", skipped.path.display(), skipped.reason);
            }

            println!(
                "{} chunks ingested from {} documents at {}",
                report.chunk_count(),
                report.committed.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Ask {
            query,
            show_context,
        } => {
            let answerer = build_answerer(&config, store)?;
            if show_context {
                match answerer.answer(&query).await {
                    Ok(answer) => {
                        println!("CHAT: {}", answer.text);
                        for hit in answer.context {
                            println!(
                                "[{}] score={:.4} source={}",
                                hit.id, hit.score, hit.metadata.source
                            );
                            println!("  chunk_text:\n{}", hit.text);
                        }
                    }
                    Err(error) => {
                        warn!(%error, "answering failed");
                        println!("CHAT: {}", pdf_rag_core::ERROR_RESPONSE);
                    }
                }
            } else {
                println!("CHAT: {}", answerer.respond(&query).await);
            }
        }
        Command::Chat => {
            let answerer = build_answerer(&config, store)?;
            run_chat(&answerer).await?;
        }
        Command::Reset => {
            reset_workspace(store.as_ref(), &config.paths).await?;
            println!("Cleared!");
        }
    }

    Ok(())
}
