// Copyright 2025 The clustermanager Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use rustls::pki_types::CertificateDer;
use sha2::{Digest, Sha256};
use snafu::{ResultExt, Snafu};
use std::fmt::Write as _;
use std::io::{self, Cursor};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("parse certificate error"))]
    InvalidCertificate { source: io::Error },

    #[snafu(display("no certificate"))]
    NonCertificate,
}

// load certificates from a PEM bundle
pub fn load_certs(cert: &[u8]) -> Result<Vec<CertificateDer<'static>>, Error> {
    let certs = rustls_pemfile::certs(&mut Cursor::new(cert))
        .collect::<Result<Vec<CertificateDer<'static>>, _>>()
        .context(InvalidCertificateSnafu)?;

    if certs.is_empty() {
        return NonCertificateSnafu.fail();
    }

    Ok(certs)
}

/// DER encodings of every certificate in a PEM bundle, the form `kube::Config::root_cert` takes.
pub fn der_certs(ca_bundle: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    Ok(load_certs(ca_bundle)?
        .iter()
        .map(|cert| cert.as_ref().to_vec())
        .collect())
}

/// Pin of the first certificate in the bundle, formatted as `sha256:<hex>`.
pub fn ca_cert_hash(ca_bundle: &[u8]) -> Result<String, Error> {
    let certs = load_certs(ca_bundle)?;
    let Some(first) = certs.first() else {
        return NonCertificateSnafu.fail();
    };

    let digest = Sha256::digest(first.as_ref());
    let mut out = String::with_capacity(7 + digest.len() * 2);
    out.push_str("sha256:");
    for byte in digest.iter() {
        let _ = write!(out, "{byte:02x}");
    }
    Ok(out)
}
