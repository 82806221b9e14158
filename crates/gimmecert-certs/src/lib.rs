//! This crate provides the issuance and renewal engine of `gimmecert`, a
//! tool managing a local X.509 CA hierarchy for test and development
//! environments. It can be used to create CA hierarchies of arbitrary depth
//! whose last CA signs server and client certificates. Leaf certificates are
//! issued either for freshly generated key pairs or for the public key of an
//! externally supplied certificate signing request (CSR).
//!
//! This crate doesn't touch the filesystem. Persisting keys, CSRs and
//! certificates is the job of the caller.
//!
//! ## References
//!
//! - <https://datatracker.ietf.org/doc/html/rfc5280>
//! - <https://datatracker.ietf.org/doc/html/rfc2986>
use snafu::{ResultExt, Snafu};
use x509_cert::{
    Certificate,
    der::{DecodePem, EncodePem},
};

use crate::{ca::PEM_LINE_ENDING, keys::KeyPair};

pub mod ca;
mod cert_builder;
pub mod ext;
pub mod keys;
pub mod leaf;
pub mod name;
pub mod reconcile;
pub mod renew;
pub mod request;
pub mod validity;

pub use cert_builder::*;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The kinds of failures callers distinguish, for example to pick an exit
/// code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    InvalidKeySpecification,
    AlreadyInitialized,
    NotInitialized,
    AlreadyIssued,
    UnknownEntity,
    ConflictingRenewalOptions,
    MalformedCsr,
    MalformedCertificate,
    MalformedKey,
    Other,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to generate {key_specification} key pair"))]
    GenerateKeyPair {
        source: keys::Error,
        key_specification: keys::KeySpecification,
    },

    #[snafu(display("failed to read the public key"))]
    ReadPublicKey { source: keys::Error },

    #[snafu(display("conflicting renewal options: {conflict}"))]
    ConflictingRenewalOptions { conflict: reconcile::RenewalConflict },

    #[snafu(display("failed to issue {entity_kind} certificate"))]
    IssueLeafCertificate {
        source: leaf::Error,
        entity_kind: leaf::EntityKind,
    },

    #[snafu(display("failed to build certificate extensions"))]
    BuildExtensions { source: ext::Error },

    #[snafu(display("failed to renew certificate"))]
    RenewCertificate { source: renew::Error },

    #[snafu(display("malformed certificate"))]
    MalformedCertificate { source: x509_cert::der::Error },

    #[snafu(display("the certificate subject has no common name"))]
    MissingCommonName,

    #[snafu(display("failed to encode certificate as PEM"))]
    EncodeCertificate { source: x509_cert::der::Error },

    #[snafu(display("malformed certificate signing request"))]
    MalformedCsr { source: request::Error },

    #[snafu(display("malformed private key"))]
    MalformedKey { source: keys::Error },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::GenerateKeyPair { source, .. } if source.is_invalid_specification() => {
                ErrorKind::InvalidKeySpecification
            }
            Self::ConflictingRenewalOptions { .. } => ErrorKind::ConflictingRenewalOptions,
            Self::MalformedCertificate { .. } | Self::MissingCommonName => {
                ErrorKind::MalformedCertificate
            }
            Self::MalformedCsr { .. } => ErrorKind::MalformedCsr,
            Self::MalformedKey { .. } => ErrorKind::MalformedKey,
            _ => ErrorKind::Other,
        }
    }
}

/// Contains the certificate and the signing / embedded key pair.
///
/// A [`CertificateAuthority`](crate::ca::CertificateAuthority) uses this struct
/// internally to store the signing key pair which is used to sign the CA
/// itself (self-signed) or its child CAs and leaf certificates.
#[derive(Debug)]
pub struct CertificatePair {
    certificate: Certificate,
    key_pair: KeyPair,
}

impl CertificatePair {
    pub fn new(certificate: Certificate, key_pair: KeyPair) -> Self {
        Self {
            certificate,
            key_pair,
        }
    }

    /// Decodes a certificate and its private key from PEM.
    pub fn from_pem(certificate_pem: &str, key_pem: &str) -> Result<Self> {
        Ok(Self {
            certificate: certificate_from_pem(certificate_pem)?,
            key_pair: KeyPair::from_pem(key_pem).context(MalformedKeySnafu)?,
        })
    }

    /// Returns a reference to the [`Certificate`].
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Returns a reference to the (signing) key pair.
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }
}

pub fn certificate_from_pem(pem: &str) -> Result<Certificate> {
    Certificate::from_pem(pem.as_bytes()).context(MalformedCertificateSnafu)
}

pub fn certificate_to_pem(certificate: &Certificate) -> Result<String> {
    certificate
        .to_pem(PEM_LINE_ENDING)
        .context(EncodeCertificateSnafu)
}

/// Decodes concatenated PEM certificates, keeping their order.
pub fn chain_from_pem(pem: &str) -> Result<Vec<Certificate>> {
    Certificate::load_pem_chain(pem.as_bytes()).context(MalformedCertificateSnafu)
}

/// Encodes certificates as concatenated PEM blocks separated by newlines.
pub fn chain_to_pem<'a>(certificates: impl IntoIterator<Item = &'a Certificate>) -> Result<String> {
    let blocks = certificates
        .into_iter()
        .map(certificate_to_pem)
        .collect::<Result<Vec<_>>>()?;

    Ok(blocks.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ca::CertificateAuthorityHierarchy,
        keys::{Curve, KeySpecification},
    };

    #[test]
    fn certificate_pair_from_pem() {
        let hierarchy = CertificateAuthorityHierarchy::builder()
            .base_name("Pair")
            .key_specification(KeySpecification::Ecdsa {
                curve: Curve::Secp384r1,
            })
            .build()
            .expect("failed to build CA hierarchy");
        let ca = hierarchy.issuing_ca();

        let certificate_pem = certificate_to_pem(ca.ca_cert()).expect("encodable certificate");
        let key_pem = ca.signing_key().to_pem().expect("encodable key");
        let pair = CertificatePair::from_pem(&certificate_pem, &key_pem).expect("decodable pair");

        assert_eq!(pair.certificate(), ca.ca_cert());
        assert_eq!(pair.key_pair().specification(), ca.signing_key().specification());
    }

    #[test]
    fn garbage_is_a_malformed_certificate() {
        let error = certificate_from_pem("not a certificate").expect_err("must fail");
        assert_eq!(error.kind(), ErrorKind::MalformedCertificate);
    }

    #[test]
    fn garbage_key_is_a_malformed_key() {
        let hierarchy = CertificateAuthorityHierarchy::builder()
            .base_name("Pair")
            .key_specification(KeySpecification::Ecdsa {
                curve: Curve::Secp256r1,
            })
            .build()
            .expect("failed to build CA hierarchy");
        let certificate_pem =
            certificate_to_pem(hierarchy.issuing_ca().ca_cert()).expect("encodable certificate");

        let error = CertificatePair::from_pem(&certificate_pem, "nope").expect_err("must fail");
        assert_eq!(error.kind(), ErrorKind::MalformedKey);
    }
}
