pub mod gemini_client;
pub mod provider;

pub use gemini_client::GeminiClient;
pub use provider::{ContentGenerator, ModelLister};
