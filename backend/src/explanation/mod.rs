pub mod conditions;
pub mod llm;
pub mod prompt;

use futures::FutureExt;
use futures::future::BoxFuture;
use shared::OrganType;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::LlmConfig;
pub use conditions::{ConditionInfo, ConditionTable};
pub use llm::{LanguageModel, OpenAiChatClient, SamplingParams};
pub use prompt::ChatMessage;
use prompt::{INITIAL_USER_MESSAGE, PromptKind, build_messages, build_system_prompt};

#[derive(Debug, thiserror::Error)]
pub enum ExplanationError {
    #[error("Language model configuration error: {0}")]
    Config(String),
    #[error("Language model request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Language model error: {0}")]
    Upstream(String),
    #[error("Condition table error: {0}")]
    Conditions(String),
}

type ModelInit =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn LanguageModel>, ExplanationError>> + Send + Sync>;

/// Produces patient-facing text for a classification result.
///
/// The language model is created on first use. Concurrent first callers wait
/// on the same initialization; if it fails, the cell stays empty and the next
/// caller tries again.
pub struct ExplanationService {
    conditions: ConditionTable,
    params: SamplingParams,
    model: OnceCell<Arc<dyn LanguageModel>>,
    init: ModelInit,
}

impl ExplanationService {
    pub fn from_config(config: &LlmConfig, conditions: ConditionTable) -> Self {
        let params = SamplingParams::from(config);
        let config = config.clone();
        Self::with_initializer(
            move || {
                let config = config.clone();
                async move {
                    log::info!("Initializing language model client for {}", config.model);
                    let client = OpenAiChatClient::new(&config)?;
                    if config.verify_on_init {
                        client.verify().await?;
                    }
                    Ok::<_, ExplanationError>(Arc::new(client) as Arc<dyn LanguageModel>)
                }
            },
            params,
            conditions,
        )
    }

    pub fn with_initializer<F, Fut>(init: F, params: SamplingParams, conditions: ConditionTable) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn LanguageModel>, ExplanationError>> + Send + 'static,
    {
        Self {
            conditions,
            params,
            model: OnceCell::new(),
            init: Box::new(move || init().boxed()),
        }
    }

    /// Service around an already constructed model.
    pub fn with_model(model: Arc<dyn LanguageModel>, conditions: ConditionTable) -> Self {
        Self::with_initializer(
            move || {
                let model = model.clone();
                async move { Ok::<_, ExplanationError>(model) }
            },
            SamplingParams::default(),
            conditions,
        )
    }

    pub fn is_initialized(&self) -> bool {
        self.model.initialized()
    }

    async fn model(&self) -> Result<&Arc<dyn LanguageModel>, ExplanationError> {
        self.model
            .get_or_try_init(|| (self.init)())
            .await
            .inspect_err(|e| log::error!("Language model initialization failed: {}", e))
    }

    pub async fn initial_explanation(&self, label: &str, organ: OrganType) -> Result<String, ExplanationError> {
        self.generate(label, organ, INITIAL_USER_MESSAGE, PromptKind::InitialExplanation)
            .await
    }

    /// Single stateless follow-up turn grounded in a previous result.
    pub async fn chat(&self, message: &str, label: &str, organ: OrganType) -> Result<String, ExplanationError> {
        self.generate(label, organ, message, PromptKind::FollowUp).await
    }

    async fn generate(
        &self,
        label: &str,
        organ: OrganType,
        user_message: &str,
        kind: PromptKind,
    ) -> Result<String, ExplanationError> {
        let system_prompt = build_system_prompt(organ.as_ref(), label, self.conditions.get(label), kind);
        let messages = build_messages(system_prompt, user_message);
        let model = self.model().await?;
        let reply = model.complete(&messages, &self.params).await?;
        log::debug!("Generated {} characters for {} ({})", reply.len(), label, organ);
        Ok(reply)
    }
}
