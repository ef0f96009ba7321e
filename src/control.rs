//! An abstraction over the control channel's byte stream so the session
//! core never names `TcpStream` or `TlsStream` directly, and so an
//! in-flight `AUTH TLS` upgrade can swap the stream out from under a
//! running session.

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsAcceptor;

/// Any bidirectional byte stream usable as the control channel, whether
/// plaintext TCP or TLS-wrapped.
pub trait ControlIo: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> ControlIo for T {}

pub type BoxedControl = Box<dyn ControlIo>;

/// Wraps an already-open control stream in a TLS server session, for the
/// dedicated TLS port and for the in-band `AUTH TLS` upgrade alike. A
/// handshake failure is fatal to the session.
pub async fn upgrade(acceptor: &TlsAcceptor, stream: BoxedControl) -> std::io::Result<BoxedControl> {
    let tls = acceptor.accept(stream).await?;
    Ok(Box::new(tls))
}

/// Builds a `rustls::ServerConfig`-backed acceptor from a PEM certificate
/// chain and private key. Certificate/key *loading* is the out-of-scope
/// collaborator's job; this only assembles the acceptor the core's
/// `upgrade` function needs.
pub fn build_acceptor(
    cert_chain: Vec<rustls::pki_types::CertificateDer<'static>>,
    key: rustls::pki_types::PrivateKeyDer<'static>,
) -> Result<TlsAcceptor, rustls::Error> {
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}
