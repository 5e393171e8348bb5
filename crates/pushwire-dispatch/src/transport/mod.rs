pub mod ece;
pub mod vapid;
pub mod webpush;

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use pushwire_storage::{ClientKeys, VapidCredentials};

use crate::error::TransportError;

/// Capability to deliver one encrypted message to one subscription endpoint.
///
/// Sender credentials travel with every call so concurrent dispatches for
/// different applications never share mutable transport state.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Sends `payload` to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Rejected` with the HTTP status when the push
    /// service refuses the message; every other failure carries no status.
    async fn send(
        &self,
        endpoint: &str,
        keys: &ClientKeys,
        credentials: &VapidCredentials,
        payload: &str,
    ) -> Result<(), TransportError>;
}

/// Shared handle to a push transport.
pub type DynPushTransport = Arc<dyn PushTransport>;

pub use webpush::WebPushTransport;

/// Decodes base64url, tolerating padding and the standard alphabet that
/// some clients still emit.
pub(crate) fn decode_base64url(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let normalized: String = input
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    URL_SAFE_NO_PAD.decode(normalized)
}

pub(crate) fn encode_base64url(input: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(input)
}
