pub mod client;
pub mod envelope;
pub mod retry;

pub use client::{ChannelClient, ChannelHandle};
pub use envelope::{decode_frame, PushMessage};
pub use retry::RetryBudget;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("channel closed")]
    Closed,
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("decompress failed: {0}")]
    Decompress(String),
    #[error("request timed out")]
    Timeout,
}
