//! Remote language model access
//!
//! - [`gateway`]: the trait boundary to the hosted API
//! - [`gemini`]: HTTP implementation with SSE streaming
//! - [`live`]: duplex voice session over WebSocket
//! - [`pipeline`]: turns submissions into assistant messages

pub mod config;
pub mod gateway;
pub mod gemini;
pub mod live;
pub mod mock;
pub mod pipeline;
pub mod prompts;

pub use config::{ChatOptions, GatewayConfig};
pub use gateway::{clean_transcription, ChatHandle, Gateway, ImageAttachment, RefineAction, TextStream};
pub use gemini::GeminiGateway;
pub use live::{LiveCallbacks, LiveHandle, LiveMessage};
pub use mock::{MockCall, MockGateway, StreamStep};
pub use pipeline::{ChatPipeline, RejectReason, SendOutcome, SendRequest, TurnEvent};
