use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use birdlens_config::{load_config_or_default, BirdlensConfig};
use birdlens_core::{
    ApiTransport, ExecutorConfig, PlanRunner, RapidApiClient, RapidApiConfig, Sleeper,
    StepExecutor,
};
use birdlens_graph::EntityGraph;
use birdlens_planners::{
    GeminiClient, GeminiClientConfig, LlmClient, LlmPlanner, LlmPlannerConfig, LlmSummarizer,
    PromptCatalog, SummarizerConfig,
};

use crate::session::ExplorerSession;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

#[derive(Debug, Parser)]
#[command(
    name = "birdlens",
    about = "Natural-language explorer for the Twitter API",
    version
)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(long, default_value = "config/birdlens.yaml")]
    config: PathBuf,

    /// Write the accumulated entity graph as JSON on exit
    #[arg(long, value_name = "FILE")]
    graph_out: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG overrides it
    #[arg(long)]
    verbose: bool,

    /// One-shot question; starts an interactive session when omitted
    #[arg(value_name = "QUERY")]
    query: Vec<String>,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        dotenvy::dotenv().ok();
        let config = load_config_or_default(&self.config)?;
        init_tracing(&config, self.verbose);

        let mut session = build_session(&config)?;

        if self.query.is_empty() {
            run_repl(&mut session).await?;
        } else {
            let query = self.query.join(" ");
            let answer = session.handle_query(&query).await;
            println!("\n{answer}");
        }

        if let Some(path) = &self.graph_out {
            write_graph_snapshot(session.graph(), path)?;
        }
        Ok(())
    }
}

fn init_tracing(config: &BirdlensConfig, verbose: bool) {
    TRACING_INIT.get_or_init(|| {
        let fallback = if verbose {
            "debug"
        } else {
            config.log.level.as_str()
        };
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        // Logs go to stderr so they never interleave with chat output.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

fn build_session(config: &BirdlensConfig) -> anyhow::Result<ExplorerSession<RapidApiClient>> {
    let api_key = config.api.resolve_api_key()?;
    let transport = RapidApiClient::new(RapidApiConfig {
        api_key,
        host: config.api.host.clone(),
        base_url: config.api.resolve_base_url(),
        timeout_secs: config.api.timeout_secs,
    })?;
    let executor = StepExecutor::new(transport).with_config(ExecutorConfig {
        default_max_pages: config.api.max_pages_fallback,
        page_throttle: Duration::from_millis(config.api.page_delay_ms),
        ..ExecutorConfig::default()
    });
    let runner = PlanRunner::new(executor);

    let gemini_key = config.planner.resolve_api_key()?;
    let llm: Arc<dyn LlmClient> = Arc::new(GeminiClient::new(GeminiClientConfig {
        api_key: gemini_key,
        model: config.planner.model.clone(),
        temperature: config.planner.temperature,
        ..GeminiClientConfig::default()
    })?);

    let catalog = PromptCatalog::load_or_empty(
        Path::new(&config.planner.endpoints_file),
        Path::new(&config.planner.ontology_file),
    );
    let planner = LlmPlanner::new(
        Arc::clone(&llm),
        catalog,
        LlmPlannerConfig {
            model: config.planner.model.clone(),
            temperature: config.planner.temperature,
        },
    );
    let summarizer = LlmSummarizer::new(
        llm,
        SummarizerConfig {
            model: config.planner.model.clone(),
            temperature: config.planner.temperature,
        },
    );

    Ok(ExplorerSession::new(
        Box::new(planner),
        Box::new(summarizer),
        runner,
        config.planner.history_char_budget,
    ))
}

async fn run_repl<T: ApiTransport, S: Sleeper>(
    session: &mut ExplorerSession<T, S>,
) -> anyhow::Result<()> {
    println!("birdlens: ask about Twitter users, tweets, followers, lists, and more.");
    println!("Type 'exit' or 'quit' to end the session.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") || query.eq_ignore_ascii_case("quit") {
            break;
        }
        let answer = session.handle_query(query).await;
        println!("\n{answer}\n");
    }
    Ok(())
}

fn write_graph_snapshot(graph: &EntityGraph, path: &Path) -> anyhow::Result<()> {
    let snapshot = graph.snapshot();
    let body = serde_json::to_string_pretty(&snapshot)?;
    std::fs::write(path, body)?;
    println!(
        "Wrote entity graph ({} nodes, {} edges) to {}",
        snapshot.nodes.len(),
        snapshot.edges.len(),
        path.display()
    );
    Ok(())
}
