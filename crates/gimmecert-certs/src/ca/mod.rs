//! Contains types and functions to generate hierarchies of certificate
//! authorities (CAs). The last CA of a hierarchy signs all leaf certificates.
use snafu::{OptionExt, ResultExt, Snafu};
use x509_cert::{Certificate, name::Name};

use crate::{CertificatePair, keys::KeyPair, validity::ValidityWindow};

mod ca_builder;
mod consts;
pub use ca_builder::*;
pub use consts::*;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read the validity of the CA certificate"))]
    ReadValidity { source: crate::validity::Error },

    #[snafu(display("a CA hierarchy needs at least one level"))]
    EmptyHierarchy,

    #[snafu(display(
        "the CA at level {level} was not issued by the CA at level {parent_level}"
    ))]
    BrokenChain { level: usize, parent_level: usize },

    #[snafu(display("failed to encode CA certificate as PEM"))]
    EncodeCertificate { source: crate::Error },
}

/// A certificate authority (CA) which is used to sign intermediate CAs or
/// leaf certificates.
#[derive(Debug)]
pub struct CertificateAuthority {
    certificate_pair: CertificatePair,
    validity: ValidityWindow,
}

impl CertificateAuthority {
    /// Wraps an existing CA certificate and its signing key, for example
    /// after loading both from storage.
    pub fn new(certificate_pair: CertificatePair) -> Result<Self, Error> {
        let validity = ValidityWindow::of_certificate(certificate_pair.certificate())
            .context(ReadValiditySnafu)?;

        Ok(Self {
            certificate_pair,
            validity,
        })
    }

    pub fn signing_key(&self) -> &KeyPair {
        self.certificate_pair.key_pair()
    }

    pub fn ca_cert(&self) -> &Certificate {
        self.certificate_pair.certificate()
    }

    pub fn certificate_pair(&self) -> &CertificatePair {
        &self.certificate_pair
    }

    /// The subject of this CA, which is the issuer of every certificate it
    /// signs.
    pub fn subject_name(&self) -> &Name {
        &self.ca_cert().tbs_certificate.subject
    }

    pub fn issuer_name(&self) -> &Name {
        &self.ca_cert().tbs_certificate.issuer
    }

    pub fn validity(&self) -> &ValidityWindow {
        &self.validity
    }
}

/// Ordered levels of CAs, root first. Level 1 is self-signed, every other
/// level is signed by its predecessor. The last level is the issuing CA.
#[derive(Debug)]
pub struct CertificateAuthorityHierarchy {
    parents: Vec<CertificateAuthority>,
    issuing_ca: CertificateAuthority,
}

impl CertificateAuthorityHierarchy {
    /// Use this function in combination with [`CertificateAuthorityHierarchyBuilder`]
    /// to create new CA hierarchies.
    pub fn builder<'a>() -> CertificateAuthorityHierarchyBuilderBuilder<'a> {
        CertificateAuthorityHierarchyBuilder::start_builder()
    }

    /// Assembles a hierarchy from CAs in ascending level order and checks
    /// that each level names its predecessor as issuer.
    pub fn from_levels(levels: Vec<CertificateAuthority>) -> Result<Self, Error> {
        for (index, pair) in levels.windows(2).enumerate() {
            if pair[1].issuer_name() != pair[0].subject_name() {
                return BrokenChainSnafu {
                    level: index + 2,
                    parent_level: index + 1,
                }
                .fail();
            }
        }

        let mut parents = levels;
        let issuing_ca = parents.pop().context(EmptyHierarchySnafu)?;

        Ok(Self {
            parents,
            issuing_ca,
        })
    }

    /// The CA signing all leaf certificates.
    pub fn issuing_ca(&self) -> &CertificateAuthority {
        &self.issuing_ca
    }

    pub fn root_ca(&self) -> &CertificateAuthority {
        self.parents.first().unwrap_or(&self.issuing_ca)
    }

    /// All levels in ascending order, root first.
    pub fn levels(&self) -> impl Iterator<Item = &CertificateAuthority> {
        self.parents.iter().chain(std::iter::once(&self.issuing_ca))
    }

    pub fn depth(&self) -> usize {
        self.parents.len() + 1
    }

    /// The PEM encoded certificates of all levels, root first, separated by
    /// newlines.
    pub fn chain_pem(&self) -> Result<String, Error> {
        crate::chain_to_pem(self.levels().map(CertificateAuthority::ca_cert))
            .context(EncodeCertificateSnafu)
    }
}
