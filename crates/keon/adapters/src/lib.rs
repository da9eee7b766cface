//! Keon Adapters: governed wrappers around third-party services.
//!
//! An adapter turns every outbound call into decide → execute → call. The
//! wrapped service is never reached unless the runtime allowed the call and
//! accepted its execution under the issued receipt.
//!
//! ## Modules
//!
//! - [`ai`]: chat, completion and embedding calls to AI providers.

pub mod ai;
pub mod error;

pub use ai::{
    AiAdapter, AiAdapterConfig, AiProvider, ChatChoice, ChatMessage, ChatRequest, ChatResponse, ChatRole,
    CompletionRequest, CompletionResponse, DenialHook, EmbeddingInput, EmbeddingRequest,
    EmbeddingResponse, Governed, GovernedChatResponse, GovernedCompletionResponse,
    GovernedEmbeddingResponse, TokenUsage,
};
pub use error::{AdapterError, AdapterResult};
