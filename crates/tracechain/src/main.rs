//! Run the traced debate chain, then attach feedback to or share its runs.
//!
//! Reads `OPENAI_API_KEY` for the chat API and the `LANGCHAIN_*` variables
//! for the tracing backend.
//!
//! # Examples
//!
//! ```sh
//! # Run the chain; prints the refined argument and the root run id
//! LANGCHAIN_TRACING_V2=true tracechain run "Shape of the earth" \
//!   --description "Assume the world is flat." --tag demo --meta user=alice
//!
//! # Inspect the run tree locally without uploading
//! tracechain run "Shape of the earth" --dry-run
//!
//! # Score the run afterward and share it
//! tracechain feedback <RUN_ID> user_feedback --score 0.5 \
//!   --correction '{"generation": "The earth is round."}'
//! tracechain share <RUN_ID>
//! ```

use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracechain::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Run the traced debate chain and manage feedback and share links for its runs.
#[derive(Parser)]
#[command(name = "tracechain")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate, critique, and refine an argument on a topic.
    Run {
        /// Discussion topic
        query: String,

        /// Extra instructions for the debater
        #[arg(long, default_value = "")]
        description: String,

        /// Tag for the root run (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Metadata `key=value` for the root run (repeatable; JSON values allowed)
        #[arg(long = "meta")]
        metadata: Vec<String>,

        /// Use this id for the root run instead of a random one
        #[arg(long)]
        run_id: Option<RunId>,

        /// Project to file the runs under (overrides LANGCHAIN_PROJECT)
        #[arg(long)]
        project: Option<String>,

        /// Chat model
        #[arg(long, default_value = tracechain::DEFAULT_MODEL)]
        model: String,

        /// Sampling temperature
        #[arg(long, default_value_t = tracechain::DEFAULT_TEMPERATURE)]
        temperature: f32,

        /// Retries for transient chat API failures
        #[arg(long, default_value_t = 0)]
        retries: u32,

        /// Keep runs in memory and print the run tree instead of uploading
        #[arg(long)]
        dry_run: bool,
    },

    /// Attach feedback to a run.
    Feedback {
        run_id: RunId,
        /// Feedback key, e.g. `user_feedback`
        key: String,
        #[arg(long)]
        score: Option<f64>,
        /// Non-numeric value (JSON or plain text)
        #[arg(long)]
        value: Option<String>,
        #[arg(long)]
        comment: Option<String>,
        /// Corrected output as JSON
        #[arg(long)]
        correction: Option<String>,
        /// Source metadata as a JSON object
        #[arg(long)]
        source: Option<String>,
    },

    /// Make a run public and print its share URL.
    Share { run_id: RunId },

    /// Print a run's share URL, if it is shared.
    SharedLink { run_id: RunId },

    /// Revoke a run's public link.
    Unshare { run_id: RunId },
}

// ── Helpers ────────────────────────────────────────────────────────

/// Parse a JSON value, falling back to a plain string.
fn json_or_string(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_metadata(pairs: &[String]) -> Result<Map<String, Value>, String> {
    let mut map = Map::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("metadata '{pair}' is not in key=value form"))?;
        if key.trim().is_empty() {
            return Err(format!("metadata '{pair}' has an empty key"));
        }
        map.insert(key.trim().to_string(), json_or_string(value));
    }
    Ok(map)
}

fn parse_json(flag: &str, raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("--{flag} is not valid JSON: {e}"))
}

fn langsmith_client(config: &TraceConfig) -> Result<LangSmithClient, String> {
    if config.api_key.is_none() {
        return Err("LANGCHAIN_API_KEY environment variable is not set".to_string());
    }
    LangSmithClient::new(config)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── Commands ───────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
async fn run_chain(
    trace_config: &TraceConfig,
    query: String,
    description: String,
    tags: Vec<String>,
    metadata: Vec<String>,
    run_id: Option<RunId>,
    project: Option<String>,
    chain_config: ChainConfig,
    dry_run: bool,
) -> Result<(), String> {
    let chat_api = ChatApiConfig::from_env();
    let api_key = chat_api
        .api_key
        .ok_or_else(|| "OPENAI_API_KEY environment variable is not set".to_string())?;
    // Retries happen per chain step, inside each llm run.
    let model = OpenAiClient::with_base_url(api_key, chat_api.base_url)?;

    let options = TraceOptions {
        run_id,
        tags,
        metadata: parse_metadata(&metadata)?,
        project_name: project,
    };

    let memory = MemorySink::new();
    let tracer = if dry_run {
        Tracer::new(Arc::new(memory.clone()), trace_config.project.clone())
    } else if trace_config.enabled {
        trace_config.tracer(Arc::new(langsmith_client(trace_config)?))
    } else {
        info!("Tracing disabled (set LANGCHAIN_TRACING_V2=true to upload runs)");
        trace_config.tracer(Arc::new(NoopSink))
    };

    let ctx = ChainContext::new(&model, &tracer, chain_config);
    let out = argument_chain(&ctx, &query, &description, options).await?;

    println!("{}", out.argument);
    println!();
    println!("run_id: {}", out.run_id);
    if dry_run {
        println!();
        print!("{}", memory.render_tree(out.run_id));
    }
    Ok(())
}

async fn dispatch(cli: Cli) -> Result<(), String> {
    let trace_config = TraceConfig::from_env();

    match cli.command {
        Command::Run {
            query,
            description,
            tags,
            metadata,
            run_id,
            project,
            model,
            temperature,
            retries,
            dry_run,
        } => {
            let chain_config = ChainConfig::default()
                .with_model(model)
                .with_temperature(temperature)
                .with_retry(RetryConfig::with_retries(retries));
            run_chain(
                &trace_config,
                query,
                description,
                tags,
                metadata,
                run_id,
                project,
                chain_config,
                dry_run,
            )
            .await
        }
        Command::Feedback {
            run_id,
            key,
            score,
            value,
            comment,
            correction,
            source,
        } => {
            let mut feedback = Feedback::new(run_id, key);
            feedback.score = score;
            feedback.value = value.as_deref().map(json_or_string);
            feedback.comment = comment;
            feedback.correction = correction
                .as_deref()
                .map(|raw| parse_json("correction", raw))
                .transpose()?;
            if let Some(raw) = source {
                match parse_json("source", &raw)? {
                    Value::Object(map) => feedback.source_info = map,
                    _ => return Err("--source must be a JSON object".to_string()),
                }
            }
            let record = langsmith_client(&trace_config)?
                .create_feedback(&feedback)
                .await?;
            println!("feedback {} recorded for run {run_id}", record.id);
            Ok(())
        }
        Command::Share { run_id } => {
            let url = langsmith_client(&trace_config)?.share_run(run_id).await?;
            println!("{url}");
            Ok(())
        }
        Command::SharedLink { run_id } => {
            match langsmith_client(&trace_config)?
                .read_run_shared_link(run_id)
                .await?
            {
                Some(url) => println!("{url}"),
                None => println!("not shared"),
            }
            Ok(())
        }
        Command::Unshare { run_id } => {
            langsmith_client(&trace_config)?.unshare_run(run_id).await?;
            println!("run {run_id} is no longer shared");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
