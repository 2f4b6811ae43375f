//! The plaintext framed channel used only during the handshake.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::framing::{read_frame, write_frame};

/// A length-prefixed, unencrypted envelope channel over any byte transport.
pub struct InsecureChannel<T> {
    transport: T,
    max_frame_size: u64,
}

impl<T> InsecureChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: T, max_frame_size: u64) -> Self {
        Self {
            transport,
            max_frame_size,
        }
    }

    pub async fn write(&mut self, envelope: &Envelope) -> Result<()> {
        let payload = serde_json::to_vec(envelope)
            .map_err(|e| Error::framing_owned(format!("envelope marshal failed: {e}")))?;
        write_frame(&mut self.transport, &payload).await
    }

    pub async fn read(&mut self) -> Result<Envelope> {
        let payload = read_frame(&mut self.transport, self.max_frame_size).await?;
        serde_json::from_slice(&payload)
            .map_err(|e| Error::framing_owned(format!("envelope unmarshal failed: {e}")))
    }

    /// Hand back the underlying transport, e.g. to continue with a secure
    /// channel once the handshake has established session keys.
    pub fn into_inner(self) -> T {
        self.transport
    }
}
