//! Turns a free-text prompt into a stored, structured context document by
//! asking the model for strict JSON and validating the result.

use db::models::context::{Context, CreateContext};
use llm::{ChatModel, CompletionProvider, CompletionRequest, ProviderMessage};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use ts_rs::TS;
use utils::text::truncate_chars;
use uuid::Uuid;

pub const MIN_PROMPT_CHARS: usize = 4;
pub const NAME_MAX_CHARS: usize = 80;
pub const DESCRIPTION_MAX_CHARS: usize = 240;

/// Low temperature for near-deterministic structured output.
const GENERATION_TEMPERATURE: f32 = 0.3;

const GOALS_RANGE: (usize, usize) = (1, 20);
const TONE_RANGE: (usize, usize) = (1, 10);
const CONSTRAINTS_RANGE: (usize, usize) = (1, 15);
const EXAMPLES_RANGE: (usize, usize) = (1, 10);

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Provider call failed for model {model}: {message}")]
    Provider { model: String, message: String },
    #[error("Model returned invalid JSON, retry")]
    InvalidModelOutput,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// The six-field document the model must emit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct ContextPayload {
    pub title: String,
    pub description: String,
    pub background_goals: Vec<String>,
    pub tone_style: Vec<String>,
    pub constraints_scope: Vec<String>,
    pub example_prompts: Vec<String>,
}

impl ContextPayload {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        if self.description.trim().is_empty() {
            return Err("description must not be empty".to_string());
        }
        check_cardinality("background_goals", &self.background_goals, GOALS_RANGE)?;
        check_cardinality("tone_style", &self.tone_style, TONE_RANGE)?;
        check_cardinality("constraints_scope", &self.constraints_scope, CONSTRAINTS_RANGE)?;
        check_cardinality("example_prompts", &self.example_prompts, EXAMPLES_RANGE)?;
        Ok(())
    }
}

fn check_cardinality(field: &str, items: &[String], (min, max): (usize, usize)) -> Result<(), String> {
    if items.len() < min || items.len() > max {
        return Err(format!(
            "{field} must have between {min} and {max} items, got {}",
            items.len()
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct GenerateContextInput {
    pub user_prompt: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub model: ChatModel,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct GeneratedContext {
    pub context: Context,
    pub payload: ContextPayload,
}

pub async fn generate_context(
    pool: &SqlitePool,
    provider: &dyn CompletionProvider,
    user_id: Uuid,
    input: GenerateContextInput,
) -> Result<GeneratedContext, GeneratorError> {
    if input.user_prompt.trim().chars().count() < MIN_PROMPT_CHARS {
        return Err(GeneratorError::Validation(format!(
            "user_prompt must be at least {MIN_PROMPT_CHARS} characters"
        )));
    }

    let request = CompletionRequest::new(
        input.model,
        vec![ProviderMessage::user(&input.user_prompt)],
    )
    .with_system(Some(generation_system_prompt()))
    .with_temperature(GENERATION_TEMPERATURE);

    let raw = provider
        .complete(request)
        .await
        .map_err(|err| GeneratorError::Provider {
            model: input.model.as_str().to_string(),
            message: err.to_string(),
        })?;

    let stripped = strip_code_fences(&raw);
    let payload: ContextPayload = match serde_json::from_str(stripped) {
        Ok(payload) => payload,
        Err(err) => {
            // Raw model output stays server-side; it may carry prompt-injection
            // content and is never relayed to the client.
            tracing::warn!(error = %err, raw = %raw, "context generation returned unparseable JSON");
            return Err(GeneratorError::InvalidModelOutput);
        }
    };

    if let Err(reason) = payload.validate() {
        tracing::warn!(%reason, raw = %raw, "context generation failed schema validation");
        return Err(GeneratorError::InvalidModelOutput);
    }

    let tags = if input.tags.is_empty() {
        derive_tags(provider, input.model, &payload).await
    } else {
        normalize_tags(input.tags)
    };

    let context = Context::create(
        pool,
        &CreateContext {
            name: truncate_chars(payload.title.trim(), NAME_MAX_CHARS),
            content: serde_json::to_string(&payload)
                .map_err(|_| GeneratorError::InvalidModelOutput)?,
            tags,
            description: Some(truncate_chars(
                payload.description.trim(),
                DESCRIPTION_MAX_CHARS,
            )),
            created_by: user_id,
        },
        Uuid::new_v4(),
    )
    .await?;

    Ok(GeneratedContext { context, payload })
}

fn generation_system_prompt() -> String {
    format!(
        "You produce reusable context documents for an LLM chat product.\n\
         Respond with a single JSON object and nothing else. The object must \
         have exactly these six fields:\n\
         - \"title\": short name for the context\n\
         - \"description\": one-sentence summary\n\
         - \"background_goals\": array of {}-{} strings\n\
         - \"tone_style\": array of {}-{} strings\n\
         - \"constraints_scope\": array of {}-{} strings\n\
         - \"example_prompts\": array of {}-{} strings\n\
         Do not wrap the JSON in markdown fences. Do not add commentary.",
        GOALS_RANGE.0,
        GOALS_RANGE.1,
        TONE_RANGE.0,
        TONE_RANGE.1,
        CONSTRAINTS_RANGE.0,
        CONSTRAINTS_RANGE.1,
        EXAMPLES_RANGE.0,
        EXAMPLES_RANGE.1,
    )
}

/// Models often fence JSON despite instructions; tolerate one wrapping fence.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Second, separate model call deriving 3-6 lowercase tags. Any failure
/// degrades to an empty tag set.
async fn derive_tags(
    provider: &dyn CompletionProvider,
    model: ChatModel,
    payload: &ContextPayload,
) -> Vec<String> {
    let request = CompletionRequest::new(
        model,
        vec![ProviderMessage::user(format!(
            "Context title: {}\nDescription: {}",
            payload.title, payload.description
        ))],
    )
    .with_system(Some(
        "Reply with 3-6 lowercase topic tags for this context, comma-separated, \
         no other text."
            .to_string(),
    ))
    .with_temperature(GENERATION_TEMPERATURE);

    match provider.complete(request).await {
        Ok(raw) => parse_tags(&raw),
        Err(err) => {
            tracing::warn!(error = %err, "tag derivation failed, storing no tags");
            Vec::new()
        }
    }
}

fn parse_tags(raw: &str) -> Vec<String> {
    normalize_tags(raw.split(',').map(str::to_string).collect())
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llm::{CompletionStream, ProviderError};

    struct FixedProvider {
        replies: std::sync::Mutex<Vec<Result<String, String>>>,
    }

    impl FixedProvider {
        fn new(replies: Vec<Result<String, String>>) -> Self {
            Self {
                replies: std::sync::Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for FixedProvider {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, ProviderError> {
            let next = self.replies.lock().unwrap().remove(0);
            next.map_err(|message| ProviderError::Api {
                status: 500,
                message,
                model: "test".to_string(),
            })
        }

        async fn stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionStream, ProviderError> {
            unimplemented!("generator never streams")
        }
    }

    fn valid_payload_json() -> String {
        serde_json::json!({
            "title": "Rust Tutor",
            "description": "Guides a learner through Rust fundamentals.",
            "background_goals": ["teach ownership"],
            "tone_style": ["patient"],
            "constraints_scope": ["no unsafe code"],
            "example_prompts": ["explain borrowing"],
        })
        .to_string()
    }

    async fn test_pool() -> (sqlx::SqlitePool, Uuid) {
        let db = db::DBService::new_in_memory().await.unwrap();
        let user_id = Uuid::new_v4();
        db::models::user::User::ensure(
            &db.pool,
            user_id,
            "tester@example.com",
            db::models::user::UserType::Regular,
        )
        .await
        .unwrap();
        (db.pool, user_id)
    }

    #[test]
    fn payload_validation_enforces_cardinalities() {
        let mut payload: ContextPayload =
            serde_json::from_str(&valid_payload_json()).unwrap();
        assert!(payload.validate().is_ok());

        payload.background_goals.clear();
        assert!(payload.validate().is_err());

        payload.background_goals = vec!["g".to_string(); 21];
        assert!(payload.validate().is_err());
    }

    #[test]
    fn strips_fenced_json() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn parses_comma_separated_tags() {
        assert_eq!(
            parse_tags("Rust, learning , rust,  "),
            vec!["rust".to_string(), "learning".to_string()]
        );
    }

    #[tokio::test]
    async fn generated_content_round_trips_through_schema() {
        let (pool, user_id) = test_pool().await;
        let provider = FixedProvider::new(vec![
            Ok(valid_payload_json()),
            Ok("rust, tutoring, programming".to_string()),
        ]);

        let generated = generate_context(
            &pool,
            &provider,
            user_id,
            GenerateContextInput {
                user_prompt: "A patient Rust tutor".to_string(),
                tags: Vec::new(),
                model: ChatModel::Chat,
            },
        )
        .await
        .unwrap();

        assert_eq!(generated.context.name, "Rust Tutor");
        assert_eq!(
            generated.context.tags.0,
            vec!["rust", "tutoring", "programming"]
        );

        // Stored content parses and validates against the six-field schema.
        let stored: ContextPayload =
            serde_json::from_str(&generated.context.content).unwrap();
        assert!(stored.validate().is_ok());
        assert_eq!(stored, generated.payload);
    }

    #[tokio::test]
    async fn caller_tags_skip_the_second_model_call() {
        let (pool, user_id) = test_pool().await;
        // Only one reply queued; a second call would panic.
        let provider = FixedProvider::new(vec![Ok(valid_payload_json())]);

        let generated = generate_context(
            &pool,
            &provider,
            user_id,
            GenerateContextInput {
                user_prompt: "A patient Rust tutor".to_string(),
                tags: vec!["Rust".to_string(), "TUTOR".to_string()],
                model: ChatModel::Chat,
            },
        )
        .await
        .unwrap();

        assert_eq!(generated.context.tags.0, vec!["rust", "tutor"]);
    }

    #[tokio::test]
    async fn failed_tag_call_defaults_to_empty() {
        let (pool, user_id) = test_pool().await;
        let provider = FixedProvider::new(vec![
            Ok(valid_payload_json()),
            Err("boom".to_string()),
        ]);

        let generated = generate_context(
            &pool,
            &provider,
            user_id,
            GenerateContextInput {
                user_prompt: "A patient Rust tutor".to_string(),
                tags: Vec::new(),
                model: ChatModel::Chat,
            },
        )
        .await
        .unwrap();

        assert!(generated.context.tags.0.is_empty());
    }

    #[tokio::test]
    async fn invalid_model_json_is_a_distinct_error() {
        let (pool, user_id) = test_pool().await;
        let provider = FixedProvider::new(vec![Ok("not json at all".to_string())]);

        let err = generate_context(
            &pool,
            &provider,
            user_id,
            GenerateContextInput {
                user_prompt: "A patient Rust tutor".to_string(),
                tags: Vec::new(),
                model: ChatModel::Chat,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GeneratorError::InvalidModelOutput));
    }

    #[tokio::test]
    async fn short_prompt_is_rejected_before_any_call() {
        let (pool, user_id) = test_pool().await;
        let provider = FixedProvider::new(vec![]);

        let err = generate_context(
            &pool,
            &provider,
            user_id,
            GenerateContextInput {
                user_prompt: "hi".to_string(),
                tags: Vec::new(),
                model: ChatModel::Chat,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GeneratorError::Validation(_)));
    }

    #[tokio::test]
    async fn long_title_and_description_are_truncated_for_storage() {
        let (pool, user_id) = test_pool().await;
        let payload = serde_json::json!({
            "title": "t".repeat(200),
            "description": "d".repeat(400),
            "background_goals": ["g"],
            "tone_style": ["t"],
            "constraints_scope": ["c"],
            "example_prompts": ["e"],
        })
        .to_string();
        let provider = FixedProvider::new(vec![Ok(payload), Ok("a, b, c".to_string())]);

        let generated = generate_context(
            &pool,
            &provider,
            user_id,
            GenerateContextInput {
                user_prompt: "long everything".to_string(),
                tags: Vec::new(),
                model: ChatModel::Chat,
            },
        )
        .await
        .unwrap();

        assert_eq!(generated.context.name.chars().count(), NAME_MAX_CHARS);
        assert_eq!(
            generated
                .context
                .description
                .as_deref()
                .unwrap()
                .chars()
                .count(),
            DESCRIPTION_MAX_CHARS
        );
    }
}
