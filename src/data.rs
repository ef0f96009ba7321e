//! Manages the passive/active duality of the data channel and the
//! synchronous pairing of a control command with a data transfer.

use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::response;

#[derive(Debug, thiserror::Error)]
pub enum DataChannelError {
    #[error("no data channel configured")]
    NotConfigured,
    #[error("data channel io error: {0}")]
    Io(#[from] std::io::Error),
}

enum Mode {
    Passive(TcpListener),
    Active(SocketAddr),
}

/// Owns at most one data-channel endpoint for a session: either a bound
/// passive listener (from PASV) or a remembered active address (from
/// PORT). Creating one replaces the other.
pub struct DataChannel {
    mode: Option<Mode>,
}

impl DataChannel {
    pub fn new() -> Self {
        Self { mode: None }
    }

    pub fn set_active(&mut self, addr: SocketAddr) {
        self.mode = Some(Mode::Active(addr));
    }

    pub fn set_passive(&mut self, listener: TcpListener) {
        self.mode = Some(Mode::Passive(listener));
    }

    /// True once a PASV listener exists (it is reused across commands
    /// across commands once bound.
    pub fn has_passive_listener(&self) -> bool {
        matches!(self.mode, Some(Mode::Passive(_)))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.mode {
            Some(Mode::Passive(listener)) => listener.local_addr().ok(),
            _ => None,
        }
    }

    /// Opens the one-shot data connection for the current command: accepts
    /// in passive mode, dials out in active mode.
    pub async fn dial(&mut self) -> Result<TcpStream, DataChannelError> {
        match &self.mode {
            Some(Mode::Passive(listener)) => {
                let (stream, _) = listener.accept().await?;
                Ok(stream)
            }
            Some(Mode::Active(addr)) => {
                let stream = TcpStream::connect(addr).await?;
                Ok(stream)
            }
            None => Err(DataChannelError::NotConfigured),
        }
    }

    /// Dials, writes the whole buffer, closes, and maps the outcome to the
    /// final reply string for LIST/NLST.
    pub async fn write_bytes(&mut self, buf: &[u8]) -> &'static str {
        let mut stream = match self.dial().await {
            Ok(stream) => stream,
            Err(_) => return response::CANT_OPEN_DATA,
        };
        if stream.write_all(buf).await.is_err() {
            return response::TRANSFER_ABORTED;
        }
        let _ = stream.shutdown().await;
        response::CLOSING_DATA
    }
}

impl Default for DataChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn write_bytes_without_channel_reports_cant_open() {
        let mut dc = DataChannel::new();
        assert_eq!(dc.write_bytes(b"hi").await, response::CANT_OPEN_DATA);
    }

    #[tokio::test]
    async fn passive_dial_delivers_bytes_to_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut dc = DataChannel::new();
        dc.set_passive(listener);

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let code = dc.write_bytes(b"payload").await;
        assert_eq!(code, response::CLOSING_DATA);
        assert_eq!(client.await.unwrap(), b"payload");
    }
}
