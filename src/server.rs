//! Accept loops for the plaintext and dedicated-TLS listening ports.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::config::Config;
use crate::control::BoxedControl;
use crate::session::Session;

/// Owns the listening sockets derived from a [`Config`] and spawns one
/// [`Session`] task per accepted connection, mirroring the teacher's
/// `listen`/`handle` split.
pub struct Server {
    config: Arc<Config>,
    tls_acceptor: Option<Arc<TlsAcceptor>>,
}

impl Server {
    pub fn new(config: Config, tls_acceptor: Option<TlsAcceptor>) -> Self {
        Self {
            config: Arc::new(config),
            tls_acceptor: tls_acceptor.map(Arc::new),
        }
    }

    /// Binds whichever of `port_plain`/`port_tls` are non-zero and runs
    /// both accept loops until one of them hits a fatal bind error.
    pub async fn listen(&self) -> std::io::Result<()> {
        let plain = if self.config.port_plain != 0 {
            Some(self.bind(self.config.port_plain).await?)
        } else {
            None
        };
        let tls = if self.config.port_tls != 0 {
            if self.tls_acceptor.is_none() {
                tracing::warn!("port_tls is set but no TLS certificate was configured; TLS port will not be opened");
                None
            } else {
                Some(self.bind(self.config.port_tls).await?)
            }
        } else {
            None
        };

        match (plain, tls) {
            (Some(plain), Some(tls)) => {
                let plain_loop = self.accept_loop(plain, false);
                let tls_loop = self.accept_loop(tls, true);
                tokio::try_join!(plain_loop, tls_loop)?;
            }
            (Some(plain), None) => self.accept_loop(plain, false).await?,
            (None, Some(tls)) => self.accept_loop(tls, true).await?,
            (None, None) => {
                tracing::error!("neither port_plain nor port_tls is configured; nothing to serve");
            }
        }
        Ok(())
    }

    async fn bind(&self, port: u16) -> std::io::Result<TcpListener> {
        let addr = format!("{}:{}", self.config.addr, port);
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "listening");
        Ok(listener)
    }

    async fn accept_loop(&self, listener: TcpListener, already_tls: bool) -> std::io::Result<()> {
        loop {
            let (socket, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    continue;
                }
            };
            let config = self.config.clone();
            let tls_acceptor = self.tls_acceptor.clone();
            tokio::spawn(async move {
                let boxed: BoxedControl = if already_tls {
                    let acceptor = tls_acceptor
                        .as_ref()
                        .expect("TLS port accepted a connection without a configured acceptor");
                    match crate::control::upgrade(acceptor, Box::new(socket)).await {
                        Ok(stream) => stream,
                        Err(err) => {
                            tracing::warn!(%peer_addr, error = %err, "TLS handshake on dedicated port failed");
                            return;
                        }
                    }
                } else {
                    Box::new(socket)
                };

                let session = match Session::new(boxed, config, peer_addr, tls_acceptor, already_tls) {
                    Ok(session) => session,
                    Err(err) => {
                        tracing::warn!(%peer_addr, error = %err, "failed to start session");
                        return;
                    }
                };

                tracing::info!(%peer_addr, tls = already_tls, "session accepted");
                if let Err(err) = session.run().await {
                    tracing::warn!(%peer_addr, error = %err, "session ended with error");
                }
            });
        }
    }
}
