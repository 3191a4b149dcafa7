//! TLS support for `mqtts://` brokers.

use std::{fs::File, io::BufReader, sync::Arc};

use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, ServerName, UnixTime},
    ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
};
use tokio_rustls::TlsConnector;

use crate::error::SetupError;

#[derive(Debug, Clone)]
pub(crate) struct TlsSettings {
    /// PEM bundle replacing the webpki roots.
    pub ca_path: Option<String>,
    /// When false, any server certificate is accepted.
    pub reject_unauthorized: bool,
}

/// Builds the connector and server name used for every handshake of a
/// connection. Runs during `open`, so bad TLS material is a setup error.
pub(crate) fn build_connector(
    settings: &TlsSettings,
    host: &str,
) -> Result<(TlsConnector, ServerName<'static>), SetupError> {
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| SetupError::Tls(format!("invalid server name `{}`", host)))?;

    let config = if !settings.reject_unauthorized {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth()
    } else {
        let roots = match &settings.ca_path {
            Some(path) => load_roots(path)?,
            None => RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
        };

        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    };

    Ok((TlsConnector::from(Arc::new(config)), server_name))
}

fn load_roots(path: &str) -> Result<RootCertStore, SetupError> {
    let file = File::open(path)
        .map_err(|e| SetupError::Tls(format!("cannot open CA file `{}`: {}", path, e)))?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<CertificateDer<'static>>, _>>()
        .map_err(|e| SetupError::Tls(format!("cannot parse CA file `{}`: {}", path, e)))?;

    if certs.is_empty() {
        return Err(SetupError::Tls(format!("no certificates in `{}`", path)));
    }

    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots
            .add(cert)
            .map_err(|e| SetupError::Tls(format!("rejected CA certificate: {}", e)))?;
    }

    Ok(roots)
}

/// Verifier installed by `rejectUnauthorized = false`.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        use SignatureScheme::*;

        vec![
            RSA_PKCS1_SHA256,
            RSA_PKCS1_SHA384,
            RSA_PKCS1_SHA512,
            ECDSA_NISTP256_SHA256,
            ECDSA_NISTP384_SHA384,
            ECDSA_NISTP521_SHA512,
            RSA_PSS_SHA256,
            RSA_PSS_SHA384,
            RSA_PSS_SHA512,
            ED25519,
        ]
    }
}
