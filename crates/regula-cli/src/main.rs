mod display;
mod providers;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use regula_ai::{EmbeddingProvider, GeminiClient, GeminiConfig, GenerationProvider};
use regula_core::{EngineConfig, Framework, NewRequirement, RequirementPatch};
use regula_engine::{ConsultOptions, Engine, ImportItem, ProcessStep, SearchOptions};
use regula_store::{DuckStore, VectorIndex};
use serde::Serialize;
use tracing::info;

use crate::providers::MissingProvider;

#[derive(Parser)]
#[command(name = "regula", version)]
#[command(about = "Regulatory knowledge retrieval and augmented generation")]
struct Cli {
    /// DuckDB database file.
    #[arg(long, env = "REGULA_DB", default_value = "data/regula.duckdb", global = true)]
    db: PathBuf,

    /// Gemini API key used for embeddings and generation.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Gemini model used for generation.
    #[arg(long, env = "GEMINI_MODEL", global = true)]
    gemini_model: Option<String>,

    /// Directory with `model.onnx` and `tokenizer.json` for local embeddings.
    #[cfg(feature = "onnx")]
    #[arg(long, env = "REGULA_ONNX_MODEL", global = true)]
    onnx_model: Option<PathBuf>,

    /// Secondary vector index kept in sync with the database.
    #[arg(long, env = "REGULA_INDEX", value_enum, default_value_t = IndexBackend::None, global = true)]
    index: IndexBackend,

    #[cfg(feature = "lancedb")]
    #[arg(long, env = "REGULA_LANCE_PATH", default_value = "data/regula.lance", global = true)]
    lance_path: PathBuf,

    #[cfg(feature = "vertex")]
    #[command(flatten)]
    vertex: VertexArgs,

    /// Pause between import batches, in milliseconds.
    #[arg(long, env = "REGULA_BATCH_DELAY_MS", global = true)]
    batch_delay_ms: Option<u64>,

    /// Upper bound on a single provider call, in seconds.
    #[arg(long, env = "REGULA_PROVIDER_TIMEOUT_SECS", global = true)]
    provider_timeout_secs: Option<u64>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum IndexBackend {
    None,
    #[cfg(feature = "lancedb")]
    Lance,
    #[cfg(feature = "vertex")]
    Vertex,
}

#[cfg(feature = "vertex")]
#[derive(Args)]
struct VertexArgs {
    #[arg(long, env = "VERTEX_PROJECT_ID", global = true)]
    vertex_project: Option<String>,
    #[arg(long, env = "VERTEX_LOCATION", default_value = "us-central1", global = true)]
    vertex_location: String,
    #[arg(long, env = "VERTEX_INDEX_ID", global = true)]
    vertex_index: Option<String>,
    #[arg(long, env = "VERTEX_INDEX_ENDPOINT_ID", global = true)]
    vertex_endpoint: Option<String>,
    #[arg(long, env = "VERTEX_DEPLOYED_INDEX_ID", global = true)]
    vertex_deployed_index: Option<String>,
    #[arg(long, env = "VERTEX_PUBLIC_ENDPOINT_DOMAIN", global = true)]
    vertex_endpoint_domain: Option<String>,
    #[arg(long, env = "VERTEX_ACCESS_TOKEN", hide_env_values = true, global = true)]
    vertex_token: Option<String>,
}

#[cfg(feature = "vertex")]
impl VertexArgs {
    fn config(&self) -> anyhow::Result<regula_store::VertexConfig> {
        fn required(value: &Option<String>, env: &str) -> anyhow::Result<String> {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .with_context(|| format!("{env} is required for the vertex index"))
        }
        Ok(regula_store::VertexConfig {
            project_id: required(&self.vertex_project, "VERTEX_PROJECT_ID")?,
            location: self.vertex_location.clone(),
            index_id: required(&self.vertex_index, "VERTEX_INDEX_ID")?,
            index_endpoint_id: required(&self.vertex_endpoint, "VERTEX_INDEX_ENDPOINT_ID")?,
            deployed_index_id: required(&self.vertex_deployed_index, "VERTEX_DEPLOYED_INDEX_ID")?,
            public_endpoint_domain: required(
                &self.vertex_endpoint_domain,
                "VERTEX_PUBLIC_ENDPOINT_DOMAIN",
            )?,
            access_token: required(&self.vertex_token, "VERTEX_ACCESS_TOKEN")?,
            distance_measure: Default::default(),
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Add a requirement and vectorize it
    Add {
        #[arg(long)]
        framework: Framework,
        #[arg(long)]
        code: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        version: Option<String>,
        /// Keep the requirement private to this tenant.
        #[arg(long)]
        tenant: Option<String>,
    },
    /// List requirements, newest first
    List {
        #[arg(long)]
        framework: Option<Framework>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Import requirements from a JSON array file
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Recompute a requirement's embedding from its stored text
    Revectorize { id: String },
    /// Edit a requirement; title or description changes re-vectorize it
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        version: Option<String>,
    },
    /// Semantic search over the corpus
    Search {
        query: String,
        #[arg(long)]
        framework: Option<Framework>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Ask a question answered from the retrieved rules
    Consult {
        question: String,
        #[arg(long)]
        framework: Option<Framework>,
        #[arg(long)]
        max_rules: Option<usize>,
        /// Print the context block the answer was generated from.
        #[arg(long)]
        context: bool,
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Score an entity's text against the corpus and record findings
    Score {
        #[arg(long)]
        entity_type: String,
        #[arg(long)]
        entity_id: String,
        text: String,
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Show the recorded findings of an entity
    Findings { entity_type: String, entity_id: String },
    /// Rebuild the vector index from the database
    Reindex,
    /// Remove a requirement from the vector index
    RemoveIndex { id: String },
    /// Gap analysis of process steps (JSON array file) against frameworks
    CrossCheck {
        #[arg(value_name = "STEPS_FILE")]
        steps: PathBuf,
        #[arg(long = "framework", required = true, num_args = 1..)]
        frameworks: Vec<Framework>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();
    info!("regula v{}", env!("CARGO_PKG_VERSION"));

    let engine = build_engine(&cli).await?;
    let json = cli.json;

    match cli.command {
        Commands::Add {
            framework,
            code,
            title,
            description,
            category,
            version,
            tenant,
        } => {
            let mut req = engine
                .add_requirement(NewRequirement {
                    framework,
                    code,
                    title,
                    description,
                    category,
                    version,
                    tenant_id: tenant,
                })
                .await?;
            req.embedding = None;
            emit(json, &req, display::print_requirement)?;
        }
        Commands::List {
            framework,
            limit,
            offset,
        } => {
            let page = engine.list_requirements(framework, limit, offset).await?;
            emit(json, &page, display::print_page)?;
        }
        Commands::Import { file, batch_size } => {
            let items: Vec<ImportItem> = read_json(&file)?;
            let batch_size = batch_size.unwrap_or(engine.config().batch_size);
            info!(items = items.len(), batch_size, "importing {}", file.display());
            let summary = engine.import_batch(items, batch_size).await?;
            emit(json, &summary, display::print_batch_summary)?;
        }
        Commands::Revectorize { id } => {
            let mut req = engine.re_vectorize(&id).await?;
            req.embedding = None;
            emit(json, &req, display::print_requirement)?;
        }
        Commands::Update {
            id,
            title,
            description,
            category,
            version,
        } => {
            let patch = RequirementPatch {
                title,
                description,
                category,
                version,
            };
            let mut req = engine.update_requirement(&id, patch).await?;
            req.embedding = None;
            emit(json, &req, display::print_requirement)?;
        }
        Commands::Search {
            query,
            framework,
            limit,
            threshold,
            tenant,
        } => {
            let opts = SearchOptions {
                framework,
                limit,
                threshold,
                tenant_id: tenant,
            };
            let results = engine.search(&query, &opts).await?;
            emit(json, &results, |r| display::print_results(r))?;
        }
        Commands::Consult {
            question,
            framework,
            max_rules,
            context,
            tenant,
        } => {
            let opts = ConsultOptions {
                framework,
                max_rules,
                include_context: context,
                tenant_id: tenant,
            };
            let answer = engine.consult(&question, &opts).await?;
            emit(json, &answer, display::print_answer)?;
        }
        Commands::Score {
            entity_type,
            entity_id,
            text,
            tenant,
        } => {
            let findings = engine
                .score_entity(&entity_type, &entity_id, &text, tenant.as_deref())
                .await?;
            emit(json, &findings, |f| display::print_findings(f))?;
        }
        Commands::Findings {
            entity_type,
            entity_id,
        } => {
            let findings = engine.findings_for(&entity_type, &entity_id).await?;
            emit(json, &findings, |f| display::print_findings(f))?;
        }
        Commands::Reindex => {
            anyhow::ensure!(engine.has_index(), "no vector index configured (see --index)");
            let summary = engine.rebuild_index().await?;
            emit(json, &summary, display::print_reindex_summary)?;
        }
        Commands::RemoveIndex { id } => {
            anyhow::ensure!(engine.has_index(), "no vector index configured (see --index)");
            let removed = engine.remove_from_index(&id).await;
            anyhow::ensure!(removed, "could not remove {id} from the index");
            if !json {
                println!("Removed {id} from the index.");
            }
        }
        Commands::CrossCheck { steps, frameworks } => {
            let steps: Vec<ProcessStep> = read_json(&steps)?;
            let analyses = engine.cross_check(&steps, &frameworks).await?;
            emit(json, &analyses, |a| display::print_analyses(a))?;
        }
    }

    Ok(())
}

/// Print `value` as JSON or through its human-readable renderer.
fn emit<T: Serialize + ?Sized>(json: bool, value: &T, render: impl FnOnce(&T)) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        render(value);
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn engine_config(cli: &Cli) -> EngineConfig {
    let mut config = EngineConfig::default();
    if let Some(ms) = cli.batch_delay_ms {
        config.batch_delay = Duration::from_millis(ms);
    }
    if let Some(secs) = cli.provider_timeout_secs {
        config.provider_timeout = Duration::from_secs(secs);
    }
    config
}

async fn build_engine(cli: &Cli) -> anyhow::Result<Engine> {
    let (embedder, generator): (Arc<dyn EmbeddingProvider>, Arc<dyn GenerationProvider>) =
        match cli.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => {
                let mut config = GeminiConfig::new(key);
                if let Some(model) = &cli.gemini_model {
                    config.generation_model = model.clone();
                }
                let client = Arc::new(GeminiClient::new(config)?);
                (
                    client.clone() as Arc<dyn EmbeddingProvider>,
                    client as Arc<dyn GenerationProvider>,
                )
            }
            None => {
                let missing = Arc::new(MissingProvider::new(GeminiConfig::new("").embedding_dim));
                (
                    missing.clone() as Arc<dyn EmbeddingProvider>,
                    missing as Arc<dyn GenerationProvider>,
                )
            }
        };

    #[cfg(feature = "onnx")]
    let embedder: Arc<dyn EmbeddingProvider> = match &cli.onnx_model {
        Some(dir) => Arc::new(regula_ai::OnnxEmbedder::load(dir).context("loading ONNX model")?),
        None => embedder,
    };
    let dim = embedder.dim();

    if let Some(parent) = cli.db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = Arc::new(
        DuckStore::open_persistent(&cli.db, dim)
            .with_context(|| format!("opening {}", cli.db.display()))?,
    );

    let index: Option<Arc<dyn VectorIndex>> = match cli.index {
        IndexBackend::None => None,
        #[cfg(feature = "lancedb")]
        IndexBackend::Lance => Some(Arc::new(
            regula_store::LanceIndex::open(&cli.lance_path, dim)
                .await
                .context("opening LanceDB index")?,
        )),
        #[cfg(feature = "vertex")]
        IndexBackend::Vertex => Some(Arc::new(regula_store::VertexIndex::new(cli.vertex.config()?))),
    };

    let mut engine = Engine::new(store.clone(), store, embedder, generator).with_config(engine_config(cli));
    if let Some(index) = index {
        engine = engine.with_index(index);
    }
    Ok(engine)
}
