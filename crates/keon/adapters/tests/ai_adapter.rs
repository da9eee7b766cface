//! Governed AI adapter against in-process gateways.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use keon_adapters::ai::{ACTION_CHAT, ACTION_EMBED, RESOURCE_TYPE};
use keon_adapters::{
    AdapterError, AdapterResult, AiAdapter, AiAdapterConfig, AiProvider, ChatChoice, ChatMessage,
    ChatRequest, ChatResponse, CompletionRequest, EmbeddingInput, EmbeddingRequest,
    EmbeddingResponse,
};
use keon_client::gateway::testing::{AllowAllGateway, DenyAllGateway, ScriptedGateway};
use keon_client::{Gateway, KeonClient, RetryPolicy};
use keon_types::{subject_hash_of, KeonError};
use serde_json::{json, Map};

// ---- Helpers ----

#[derive(Default)]
struct MockProvider {
    chats: AtomicU32,
    embeds: AtomicU32,
}

impl MockProvider {
    fn chats(&self) -> u32 {
        self.chats.load(Ordering::SeqCst)
    }

    fn embeds(&self) -> u32 {
        self.embeds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, request: &ChatRequest) -> AdapterResult<ChatResponse> {
        self.chats.fetch_add(1, Ordering::SeqCst);
        Ok(ChatResponse {
            id: "chatcmpl-1".into(),
            model: request.model.clone(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage::new(keon_adapters::ChatRole::Assistant, "Hi there"),
                finish_reason: "stop".into(),
            }],
            usage: None,
        })
    }

    async fn embed(&self, request: &EmbeddingRequest) -> AdapterResult<EmbeddingResponse> {
        self.embeds.fetch_add(1, Ordering::SeqCst);
        Ok(EmbeddingResponse {
            id: "emb-1".into(),
            model: request.model.clone(),
            embeddings: vec![vec![0.0; 4]; request.input.len()],
            usage: None,
        })
    }
}

fn adapter(gateway: Arc<dyn Gateway>, provider: Arc<MockProvider>) -> AiAdapter {
    let client = KeonClient::with_gateway(gateway, RetryPolicy::no_retry());
    AiAdapter::new(
        client,
        AiAdapterConfig::new("tenant-123", "user-456", provider),
    )
}

fn chat_request() -> ChatRequest {
    let mut request = ChatRequest::new(
        "gpt-4",
        vec![
            ChatMessage::system("You are terse."),
            ChatMessage::user("Hello!"),
        ],
    );
    request.temperature = Some(0.5);
    request
}

// ---- Allow path ----

#[tokio::test]
async fn allowed_chat_reaches_provider_after_execute() {
    let gateway = Arc::new(ScriptedGateway::new());
    let provider = Arc::new(MockProvider::default());
    let adapter = adapter(gateway.clone(), provider.clone());
    let request = chat_request();

    let governed = adapter.chat(&request).await.unwrap();

    assert!(!governed.is_denied());
    assert_eq!(provider.chats(), 1);
    assert_eq!(governed.response.unwrap().choices[0].message.content, "Hi there");

    let decided = gateway.decide_requests();
    assert_eq!(decided.len(), 1);
    let sent = &decided[0];
    assert_eq!(sent.action(), ACTION_CHAT);
    assert_eq!(sent.resource_type(), RESOURCE_TYPE);
    assert_eq!(sent.resource_id(), "gpt-4");
    assert_eq!(sent.subject_hash(), subject_hash_of(&request).unwrap());

    let context = sent.context().unwrap();
    assert_eq!(context["provider"], "mock");
    assert_eq!(context["message_count"], 2);
    assert_eq!(context["temperature"], 0.5);

    let executed = gateway.execute_requests();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].action(), ACTION_CHAT);
    assert_eq!(
        executed[0].decision_receipt_id(),
        governed.receipt.receipt_id()
    );
    assert_eq!(executed[0].parameters().unwrap()["model"], "gpt-4");
}

#[tokio::test]
async fn metadata_and_defaults_reach_decision_context() {
    let gateway = Arc::new(ScriptedGateway::new());
    let provider = Arc::new(MockProvider::default());
    let mut defaults = Map::new();
    defaults.insert("environment".into(), json!("staging"));
    defaults.insert("team".into(), json!("default-team"));
    let client = KeonClient::with_gateway(gateway.clone(), RetryPolicy::no_retry());
    let adapter = AiAdapter::new(
        client,
        AiAdapterConfig::new("tenant-123", "user-456", provider).with_default_context(defaults),
    );

    let mut request = chat_request();
    let mut metadata = Map::new();
    metadata.insert("team".into(), json!("research"));
    request.metadata = Some(metadata);

    adapter.chat(&request).await.unwrap();

    let sent = gateway.decide_requests();
    let context = sent[0].context().unwrap();
    assert_eq!(context["environment"], "staging");
    assert_eq!(context["team"], "research");
}

#[tokio::test]
async fn embed_records_batch_size() {
    let gateway = Arc::new(ScriptedGateway::new());
    let provider = Arc::new(MockProvider::default());
    let adapter = adapter(gateway.clone(), provider.clone());
    let request = EmbeddingRequest::new(
        "text-embedding-3-small",
        EmbeddingInput::Batch(vec!["a".into(), "b".into(), "c".into()]),
    );

    let governed = adapter.embed(&request).await.unwrap();

    assert_eq!(governed.response.unwrap().embeddings.len(), 3);
    assert_eq!(provider.embeds(), 1);
    let sent = gateway.decide_requests();
    assert_eq!(sent[0].action(), ACTION_EMBED);
    assert_eq!(sent[0].context().unwrap()["input_count"], 3);
}

// ---- Denial ----

#[tokio::test]
async fn denial_fails_without_touching_provider() {
    let gateway = Arc::new(DenyAllGateway::new("Model not approved"));
    let provider = Arc::new(MockProvider::default());
    let adapter = adapter(gateway.clone(), provider.clone());

    let err = adapter.chat(&chat_request()).await.unwrap_err();

    match &err {
        AdapterError::Denied { action, receipt } => {
            assert_eq!(*action, ACTION_CHAT);
            assert_eq!(receipt.reason(), Some("Model not approved"));
        }
        other => panic!("expected denial, got {other:?}"),
    }
    assert!(err.receipt().is_some());
    assert_eq!(provider.chats(), 0);
    assert_eq!(gateway.decide_calls(), 1);
    assert_eq!(gateway.execute_calls(), 0);
}

#[tokio::test]
async fn soft_denial_returns_receipt_and_calls_hook() {
    let gateway = Arc::new(DenyAllGateway::default());
    let provider = Arc::new(MockProvider::default());
    let denials = Arc::new(AtomicU32::new(0));
    let seen = denials.clone();
    let client = KeonClient::with_gateway(gateway.clone(), RetryPolicy::no_retry());
    let adapter = AiAdapter::new(
        client,
        AiAdapterConfig::new("tenant-123", "user-456", provider.clone())
            .throw_on_denial(false)
            .on_denied(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
    );

    let governed = adapter.chat(&chat_request()).await.unwrap();

    assert!(governed.is_denied());
    assert!(governed.response.is_none());
    assert!(governed.execution.is_none());
    assert_eq!(denials.load(Ordering::SeqCst), 1);
    assert_eq!(provider.chats(), 0);
    assert_eq!(gateway.execute_calls(), 0);
}

// ---- Failures ----

#[tokio::test]
async fn completions_are_unsupported_by_default() {
    let gateway = Arc::new(AllowAllGateway::new());
    let provider = Arc::new(MockProvider::default());
    let adapter = adapter(gateway.clone(), provider);

    let err = adapter
        .complete(&CompletionRequest::new("gpt-3.5-turbo-instruct", "Say hi"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AdapterError::Unsupported {
            operation: "completions",
            ..
        }
    ));
    // Execution is accepted before the provider is asked.
    assert_eq!(gateway.execute_calls(), 1);
}

#[tokio::test]
async fn execute_failure_blocks_provider() {
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.always_fail_execute(KeonError::Rejected {
        code: "INVALID_DECISION_RECEIPT".into(),
        message: "receipt revoked".into(),
        status: Some(400),
        details: Map::new(),
    });
    let provider = Arc::new(MockProvider::default());
    let adapter = adapter(gateway.clone(), provider.clone());

    let err = adapter.chat(&chat_request()).await.unwrap_err();

    assert!(matches!(err, AdapterError::Keon(KeonError::Rejected { .. })));
    assert_eq!(provider.chats(), 0);
}
