//! The send half of an upstream session, as seen by request handlers.

use async_trait::async_trait;

use crate::errors::SendError;

/// Something that can write one text frame to the upstream.
///
/// Implementations serialize writes internally; callers may invoke
/// [`Outbound::send_text`] concurrently.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Write `text` as a single frame, resolving once it has been written.
    async fn send_text(&self, text: String) -> Result<(), SendError>;

    /// Whether the session is still able to accept frames.
    fn is_open(&self) -> bool {
        true
    }
}
