use crate::ai::{ChatMessage, ChatRequest, ModelEndpoint};
use crate::catalog::Catalog;
use crate::error::StoreError;
use crate::sheet::sheet_for;
use crate::step::GenerationStep;
use crate::store::CharacterStore;
use serde_json::Value;

/// System framing sent on every attempt, ahead of the sheet and the step
/// prompt.
pub const SYSTEM_FRAMING: &str = "You are a highly intelligent AI assistant. \
    You are also a character generation agent for Chronicles of Darkness. \
    The character sheet's current state is provided as a JSON string in the first \
    `user` message as context. Use the information therein to help make the most \
    logical choices.";

/// What one step run produced. `transcript` is the full conversation
/// context accumulated across attempts, kept for diagnostics only.
#[derive(Debug)]
pub struct StepOutcome {
    pub success: bool,
    pub attempts: u32,
    pub final_data: Option<Value>,
    pub transcript: Vec<ChatMessage>,
}

/// Drive one step through its bounded retry loop.
///
/// Every attempt sends the same framing, sheet, prompt, and tool schema
/// (all computed once from the pre-step snapshot), plus the transcript so
/// far: the model sees its own prior failures and the exact corrections, so
/// each retry is an in-context fix rather than a blind resample. Transport
/// errors, missing or malformed arguments, and validation failures all
/// consume one attempt; only exhaustion is terminal. `apply` runs once,
/// after a valid payload, and its failure fails the step.
pub async fn run_step(
    step: &dyn GenerationStep,
    store: &dyn CharacterStore,
    catalog: &Catalog,
    endpoint: &dyn ModelEndpoint,
    seed: Vec<ChatMessage>,
) -> Result<StepOutcome, StoreError> {
    let snapshot = store.snapshot().await?;

    let max_attempts = match step.maximum_attempts(&snapshot) {
        0 => 3,
        limit => limit,
    };
    let sheet = serde_json::to_string(&sheet_for(&snapshot))?;
    let prompt = step.prompt(&snapshot, catalog);
    let tool = step.tool(&snapshot, catalog);
    let reasoning_effort = step.reasoning_effort(&snapshot);

    let mut context = seed;
    let mut attempts = 0u32;

    while attempts < max_attempts {
        attempts += 1;

        let mut messages = vec![
            ChatMessage::system(SYSTEM_FRAMING),
            ChatMessage::user(sheet.clone()),
            ChatMessage::user(prompt.clone()),
        ];
        messages.extend(context.iter().cloned());

        let request = ChatRequest {
            messages,
            tool: tool.clone(),
            reasoning_effort,
        };

        let response = match endpoint.complete(&request).await {
            Ok(response) => response,
            Err(error) => {
                log::warn!(
                    "{} attempt {attempts} transport failure: {error}",
                    step.key()
                );
                context.push(ChatMessage::assistant(format!("Error: {error}")));
                continue;
            }
        };

        let arguments = response.arguments;
        context.push(ChatMessage::assistant(format!(
            "Attempt {attempts} of {max_attempts}: {}",
            arguments.as_deref().unwrap_or("No content returned.")
        )));

        let Some(arguments) = arguments else {
            context.push(ChatMessage::user(
                "No arguments returned from the LLM. Please try again.",
            ));
            continue;
        };

        let data: Value = match serde_json::from_str(&arguments) {
            Ok(data) => data,
            Err(_) => {
                context.push(ChatMessage::user("Invalid JSON returned. Please try again."));
                continue;
            }
        };

        let errors = step.validate(&snapshot, catalog, &data);
        if !errors.is_empty() {
            log::debug!(
                "{} attempt {attempts} rejected: {}",
                step.key(),
                errors.join(", ")
            );
            context.push(ChatMessage::user(format!(
                "Validation errors (try again): {}",
                errors.join(", ")
            )));
            continue;
        }

        if let Err(error) = step.apply(store, catalog, &data).await {
            log::error!("{} apply failed: {error}", step.key());
            return Ok(StepOutcome {
                success: false,
                attempts,
                final_data: Some(data),
                transcript: context,
            });
        }

        return Ok(StepOutcome {
            success: true,
            attempts,
            final_data: Some(data),
            transcript: context,
        });
    }

    Ok(StepOutcome {
        success: false,
        attempts,
        final_data: None,
        transcript: context,
    })
}
