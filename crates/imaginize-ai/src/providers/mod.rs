pub mod claude;
pub mod gemini;
pub mod ollama;
pub mod openai;

pub use claude::ClaudeProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
