//! TCP, then TLS, then identity resolution: the three steps every cluster
//! connection goes through before it is handed to the connection actor.

use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{server::TlsStream as ServerTlsStream, TlsAcceptor};

use crate::connection::PeerIdentity;
use crate::error::{ClusterError, ClusterResult};

/// Resolve a presented client certificate chain to an identity: `Authenticated`
/// when its CN matches a name the caller recognizes as a configured `Endpoint`,
/// `Anonymous` otherwise (including when no certificate was presented, which
/// `WebPkiClientVerifier` only allows when client auth is optional).
pub fn resolve_identity(
    certs: &[CertificateDer<'static>],
    is_known_endpoint: impl Fn(&str) -> bool,
) -> PeerIdentity {
    certs
        .first()
        .and_then(castellan_io::peer_common_name)
        .filter(|cn| is_known_endpoint(cn))
        .map(PeerIdentity::Authenticated)
        .unwrap_or(PeerIdentity::Anonymous)
}

pub async fn accept<IO>(
    acceptor: &TlsAcceptor,
    io: IO,
    is_known_endpoint: impl Fn(&str) -> bool,
) -> ClusterResult<(ServerTlsStream<IO>, PeerIdentity)>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let stream = acceptor
        .accept(io)
        .await
        .map_err(|e| ClusterError::Tls(e.to_string()))?;
    let certs = stream
        .get_ref()
        .1
        .peer_certificates()
        .map(|c| c.to_vec())
        .unwrap_or_default();
    let identity = resolve_identity(&certs, is_known_endpoint);
    Ok((stream, identity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_identity_falls_back_to_anonymous_with_no_certs() {
        let identity = resolve_identity(&[], |_| true);
        assert!(matches!(identity, PeerIdentity::Anonymous));
    }
}
