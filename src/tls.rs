// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Transport security.
//!
//! Credential issuance and PEM material are external collaborators:
//! this module treats certificate and key bytes as opaque until the
//! moment a `rustls` config is actually built.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Opaque certificate/key material, held as raw PEM bytes until used.
#[derive(Clone)]
pub struct TlsMaterial {
    pub cert_chain_pem: Vec<u8>,
    pub private_key_pem: Option<Vec<u8>>,
    pub trusted_root_pem: Option<Vec<u8>>,
}

impl TlsMaterial {
    fn parse_cert_chain(&self) -> Result<Vec<CertificateDer<'static>>> {
        let mut reader = Cursor::new(&self.cert_chain_pem);
        rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .context("failed to parse certificate chain PEM")
    }

    fn parse_private_key(&self) -> Result<PrivateKeyDer<'static>> {
        let pem = self
            .private_key_pem
            .as_ref()
            .context("private key PEM is required to build a server TLS config")?;
        let mut reader = Cursor::new(pem);
        rustls_pemfile::private_key(&mut reader)
            .context("failed to parse private key PEM")?
            .context("no private key found in PEM")
    }

    fn parse_trusted_roots(&self) -> Result<RootCertStore> {
        let mut store = RootCertStore::empty();
        if let Some(pem) = &self.trusted_root_pem {
            let mut reader = Cursor::new(pem);
            for cert in rustls_pemfile::certs(&mut reader) {
                store
                    .add(cert.context("failed to parse trusted root PEM")?)
                    .context("failed to add trusted root to store")?;
            }
        }
        Ok(store)
    }
}

/// Builds a server-side TLS acceptor from `material`.
pub fn build_acceptor(material: &TlsMaterial) -> Result<TlsAcceptor> {
    let chain = material.parse_cert_chain()?;
    if chain.is_empty() {
        bail!("certificate chain PEM contained no certificates");
    }
    let key = material.parse_private_key()?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .context("failed to build server TLS config")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Builds a client-side TLS connector trusting `material`'s root store.
pub fn build_connector(material: &TlsMaterial) -> Result<TlsConnector> {
    let roots = material.parse_trusted_roots()?;

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}
