pub mod pipeline;
pub mod provider;

pub use pipeline::{ChatEvent, ChatPipeline, ChatRequest, StreamState};
pub use provider::{ChatProvider, ChunkStream, OpenAiProvider};
