//! The debate chain: generate an argument, critique it, refine it.
//!
//! Each step is a traced run. The prompt builders are `chain` runs and each
//! owns one `llm` run for the model call, so one [`argument_chain`] call
//! produces a seven-run trace:
//!
//! ```text
//! argument_chain [chain]
//!   argument_generator [chain]
//!     call_chat_model [llm]
//!   critic [chain]
//!     call_chat_model [llm]
//!   refiner [chain]
//!     call_chat_model [llm]
//! ```
//!
//! Model errors are recorded on the failing runs and returned unchanged.

use chrono::Local;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::api::retry::retry_api_call;
use crate::config::ChainConfig;
use crate::trace::{RunId, RunSpec, RunType, TraceOptions, Tracer, traceable};
use crate::{ChatModel, ChatRequest, Message};

/// What every chain step needs: the model, the tracer, and chat settings.
pub struct ChainContext<'a> {
    pub model: &'a dyn ChatModel,
    pub tracer: &'a Tracer,
    pub config: ChainConfig,
}

impl<'a> ChainContext<'a> {
    pub fn new(model: &'a dyn ChatModel, tracer: &'a Tracer, config: ChainConfig) -> Self {
        Self {
            model,
            tracer,
            config,
        }
    }
}

/// Result of [`argument_chain`]: the refined argument and the root run id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainOutput {
    pub run_id: RunId,
    pub argument: String,
}

fn now_string() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

// ── Prompts ────────────────────────────────────────────────────────

pub fn argument_messages(query: &str, additional_description: &str, now: &str) -> Vec<Message> {
    vec![
        Message::system(format!(
            "You are a debater making an argument on a topic. \
             {additional_description}. The current time is {now}"
        )),
        Message::user(format!("The discussion topic is {query}")),
    ]
}

pub fn critic_messages(argument: &str) -> Vec<Message> {
    vec![
        Message::system(
            "You are a critic.\n\
             What unresolved questions or criticism do you have after reading the following argument?\n\
             Provide a concise summary of your feedback.",
        ),
        Message::user(argument),
    ]
}

pub fn refiner_messages(
    query: &str,
    additional_description: &str,
    current_arg: &str,
    criticism: &str,
    now: &str,
) -> Vec<Message> {
    vec![
        Message::system(format!(
            "You are a debater making an argument on a topic. {additional_description}.\n\
             You realize your argument had some blind spots; use the criticism to improve your argument.\n\
             The current time is {now}"
        )),
        Message::user(format!(
            "The discussion topic is {query}\n\
             Your previous argument:\n{current_arg}\n\
             Criticism:\n{criticism}"
        )),
    ]
}

// ── Traced steps ───────────────────────────────────────────────────

/// Send `messages` to the model as an `llm` run and return the completion text.
pub async fn call_chat_model(
    ctx: &ChainContext<'_>,
    messages: Vec<Message>,
) -> Result<String, String> {
    let spec = RunSpec::new("call_chat_model", RunType::Llm).with_inputs(json!({
        "messages": messages,
        "model": ctx.config.model,
        "temperature": ctx.config.temperature,
    }));
    traceable(ctx.tracer, spec, async {
        let body = ChatRequest {
            model: ctx.config.model.clone(),
            messages,
            temperature: ctx.config.temperature,
            max_tokens: ctx.config.max_tokens,
            ..Default::default()
        };
        let completion = retry_api_call(&ctx.config.retry, || ctx.model.chat(&body)).await?;
        Ok(completion.content)
    })
    .await
}

pub async fn argument_generator(
    ctx: &ChainContext<'_>,
    query: &str,
    additional_description: &str,
) -> Result<String, String> {
    let spec = RunSpec::new("argument_generator", RunType::Chain).with_inputs(json!({
        "query": query,
        "additional_description": additional_description,
    }));
    traceable(ctx.tracer, spec, async {
        let messages = argument_messages(query, additional_description, &now_string());
        call_chat_model(ctx, messages).await
    })
    .await
}

pub async fn critic(ctx: &ChainContext<'_>, argument: &str) -> Result<String, String> {
    let spec = RunSpec::new("critic", RunType::Chain).with_inputs(json!({ "argument": argument }));
    traceable(ctx.tracer, spec, async {
        call_chat_model(ctx, critic_messages(argument)).await
    })
    .await
}

pub async fn refiner(
    ctx: &ChainContext<'_>,
    query: &str,
    additional_description: &str,
    current_arg: &str,
    criticism: &str,
) -> Result<String, String> {
    let spec = RunSpec::new("refiner", RunType::Chain).with_inputs(json!({
        "query": query,
        "additional_description": additional_description,
        "current_arg": current_arg,
        "criticism": criticism,
    }));
    traceable(ctx.tracer, spec, async {
        let messages = refiner_messages(
            query,
            additional_description,
            current_arg,
            criticism,
            &now_string(),
        );
        call_chat_model(ctx, messages).await
    })
    .await
}

/// Generate, critique, and refine an argument on `query`.
///
/// `options` applies to the root run only: tags, metadata, project, and an
/// explicit run id. When no id is given one is issued here, so the returned
/// [`ChainOutput::run_id`] always names the root run.
pub async fn argument_chain(
    ctx: &ChainContext<'_>,
    query: &str,
    additional_description: &str,
    mut options: TraceOptions,
) -> Result<ChainOutput, String> {
    let run_id = *options.run_id.get_or_insert_with(RunId::new);
    let spec = RunSpec::new("argument_chain", RunType::Chain)
        .with_inputs(json!({
            "query": query,
            "additional_description": additional_description,
        }))
        .with_options(options);

    let argument = traceable(ctx.tracer, spec, async {
        let argument = argument_generator(ctx, query, additional_description).await?;
        let criticism = critic(ctx, &argument).await?;
        refiner(ctx, query, additional_description, &argument, &criticism).await
    })
    .await?;

    info!("Argument chain finished: run_id={run_id}");
    Ok(ChainOutput { run_id, argument })
}
