//! Governed AI calls: decide → execute → provider call.
//!
//! Every call is decided against `ai.model` resources with the request
//! itself as the subject, so the receipt is bound to the exact prompt. The
//! provider is only reached after the runtime has accepted the execution.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use keon_client::{DecideParams, KeonClient};
use keon_types::DecisionReceipt;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::error::{AdapterError, AdapterResult};

mod types;

pub use types::*;

pub const ACTION_CHAT: &str = "ai.chat";
pub const ACTION_COMPLETE: &str = "ai.complete";
pub const ACTION_EMBED: &str = "ai.embed";
pub const RESOURCE_TYPE: &str = "ai.model";

/// An AI service behind the adapter.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Short provider name, e.g. `openai`.
    fn name(&self) -> &str;

    async fn chat(&self, request: &ChatRequest) -> AdapterResult<ChatResponse>;

    async fn complete(&self, _request: &CompletionRequest) -> AdapterResult<CompletionResponse> {
        Err(AdapterError::Unsupported {
            provider: self.name().to_string(),
            operation: "completions",
        })
    }

    async fn embed(&self, _request: &EmbeddingRequest) -> AdapterResult<EmbeddingResponse> {
        Err(AdapterError::Unsupported {
            provider: self.name().to_string(),
            operation: "embeddings",
        })
    }
}

/// Called with the receipt of every denied call.
pub type DenialHook = Arc<dyn Fn(&DecisionReceipt) + Send + Sync>;

/// Adapter configuration.
#[derive(Clone)]
pub struct AiAdapterConfig {
    pub tenant_id: String,
    pub actor_id: String,
    pub provider: Arc<dyn AiProvider>,
    /// Merged into every decision context, below request metadata.
    pub default_context: Map<String, Value>,
    /// Fail denied calls with [`AdapterError::Denied`] instead of returning
    /// an empty [`Governed`].
    pub throw_on_denial: bool,
    pub on_denied: Option<DenialHook>,
}

impl AiAdapterConfig {
    pub fn new(
        tenant_id: impl Into<String>,
        actor_id: impl Into<String>,
        provider: Arc<dyn AiProvider>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor_id: actor_id.into(),
            provider,
            default_context: Map::new(),
            throw_on_denial: true,
            on_denied: None,
        }
    }

    pub fn with_default_context(mut self, context: Map<String, Value>) -> Self {
        self.default_context = context;
        self
    }

    pub fn throw_on_denial(mut self, throw: bool) -> Self {
        self.throw_on_denial = throw;
        self
    }

    pub fn on_denied(mut self, hook: impl Fn(&DecisionReceipt) + Send + Sync + 'static) -> Self {
        self.on_denied = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for AiAdapterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiAdapterConfig")
            .field("tenant_id", &self.tenant_id)
            .field("actor_id", &self.actor_id)
            .field("provider", &self.provider.name())
            .field("throw_on_denial", &self.throw_on_denial)
            .field("on_denied", &self.on_denied.is_some())
            .finish()
    }
}

/// Shape facts about one call, recorded in the decision context and the
/// execution parameters.
struct CallShape<'a> {
    action: &'static str,
    model: &'a str,
    metadata: Option<&'a Map<String, Value>>,
    /// Context-only facts.
    context: Vec<(&'static str, Value)>,
    /// Facts recorded in both the context and the execution parameters.
    parameters: Vec<(&'static str, Value)>,
}

/// Runs AI provider calls under Keon governance.
#[derive(Clone, Debug)]
pub struct AiAdapter {
    client: KeonClient,
    config: AiAdapterConfig,
}

impl AiAdapter {
    pub fn new(client: KeonClient, config: AiAdapterConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &AiAdapterConfig {
        &self.config
    }

    pub async fn chat(&self, request: &ChatRequest) -> AdapterResult<GovernedChatResponse> {
        let shape = CallShape {
            action: ACTION_CHAT,
            model: &request.model,
            metadata: request.metadata.as_ref(),
            context: vec![
                ("temperature", json!(request.temperature)),
                ("max_tokens", json!(request.max_tokens)),
            ],
            parameters: vec![("message_count", json!(request.messages.len()))],
        };
        let provider = self.config.provider.clone();
        self.governed(shape, request, || async move { provider.chat(request).await })
            .await
    }

    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> AdapterResult<GovernedCompletionResponse> {
        let shape = CallShape {
            action: ACTION_COMPLETE,
            model: &request.model,
            metadata: request.metadata.as_ref(),
            context: vec![("max_tokens", json!(request.max_tokens))],
            parameters: vec![("prompt_length", json!(request.prompt.chars().count()))],
        };
        let provider = self.config.provider.clone();
        self.governed(shape, request, || async move { provider.complete(request).await })
            .await
    }

    pub async fn embed(
        &self,
        request: &EmbeddingRequest,
    ) -> AdapterResult<GovernedEmbeddingResponse> {
        let shape = CallShape {
            action: ACTION_EMBED,
            model: &request.model,
            metadata: request.metadata.as_ref(),
            context: Vec::new(),
            parameters: vec![("input_count", json!(request.input.len()))],
        };
        let provider = self.config.provider.clone();
        self.governed(shape, request, || async move { provider.embed(request).await })
            .await
    }

    async fn governed<S, R, F, Fut>(
        &self,
        shape: CallShape<'_>,
        subject: &S,
        call: F,
    ) -> AdapterResult<Governed<R>>
    where
        S: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AdapterResult<R>>,
    {
        let subject = serde_json::to_value(subject)
            .map_err(|e| AdapterError::InvalidRequest(e.to_string()))?;

        let mut parameters = Map::new();
        parameters.insert("model".into(), json!(shape.model));
        for (key, value) in &shape.parameters {
            parameters.insert((*key).into(), value.clone());
        }

        let mut context = self.config.default_context.clone();
        if let Some(metadata) = shape.metadata {
            context.extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        context.insert("provider".into(), json!(self.config.provider.name()));
        context.extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (key, value) in shape.context {
            context.insert(key.into(), value);
        }

        let params = DecideParams::new(
            &self.config.tenant_id,
            &self.config.actor_id,
            shape.action,
            RESOURCE_TYPE,
            shape.model,
        )
        .with_subject(subject)
        .with_context(context);

        let receipt = self.client.decide(params).await?;

        if !receipt.is_allow() {
            warn!(
                action = shape.action,
                model = shape.model,
                receipt_id = %receipt.receipt_id(),
                "ai call denied"
            );
            if let Some(hook) = &self.config.on_denied {
                hook(&receipt);
            }
            if self.config.throw_on_denial {
                return Err(AdapterError::Denied {
                    action: shape.action,
                    receipt: Box::new(receipt),
                });
            }
            return Ok(Governed {
                receipt,
                execution: None,
                response: None,
            });
        }

        let execution = self
            .client
            .execute(Some(&receipt), shape.action, Some(parameters))
            .await?;

        info!(
            action = shape.action,
            model = shape.model,
            execution_id = execution.execution_id(),
            provider = self.config.provider.name(),
            "calling provider"
        );
        let response = call().await?;

        Ok(Governed {
            receipt,
            execution: Some(execution),
            response: Some(response),
        })
    }
}
