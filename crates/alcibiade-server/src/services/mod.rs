pub mod ask_service;
pub mod backend;
pub mod cloudflare;
pub mod conversation;
pub mod dispatcher;
pub mod fallback;
pub mod gemini;
pub mod status;

pub use ask_service::{AskAnswer, AskError, AskRequest, AskService, ResponseSource};
pub use backend::{BackendChoice, BackendError, GenerationBackend};
pub use cloudflare::CloudflareService;
pub use dispatcher::{DispatchError, Generation, RequestDispatcher, RetryPolicy};
pub use fallback::{FallbackEngine, PromptCategory};
pub use gemini::GeminiService;
pub use status::{LogStatusSink, StatusSink};
