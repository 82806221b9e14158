//! PKCS#10 certificate signing requests (CSRs).
//!
//! Only the public key of a CSR is ever used when issuing certificates. The
//! subject, the attributes and the self-signature are ignored.
use snafu::{ResultExt, Snafu};
use x509_cert::{
    der::{DecodePem, Encode, EncodePem, asn1::BitString},
    name::Name,
    request::{CertReq, CertReqInfo, Version},
    spki::SubjectPublicKeyInfoOwned,
};

use crate::{ca::PEM_LINE_ENDING, keys::KeyPair};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to decode CSR from PEM"))]
    DecodePem { source: x509_cert::der::Error },

    #[snafu(display("failed to encode CSR as PEM"))]
    EncodePem { source: x509_cert::der::Error },

    #[snafu(display("failed to read the public key of the signing key pair"))]
    ReadPublicKey { source: crate::keys::Error },

    #[snafu(display("failed to encode the CSR info"))]
    EncodeInfo { source: x509_cert::der::Error },

    #[snafu(display("failed to sign CSR"))]
    Sign { source: crate::keys::Error },

    #[snafu(display("failed to encode CSR signature"))]
    EncodeSignature { source: x509_cert::der::Error },
}

pub fn from_pem(pem: &str) -> Result<CertReq, Error> {
    CertReq::from_pem(pem.as_bytes()).context(DecodePemSnafu)
}

pub fn to_pem(csr: &CertReq) -> Result<String, Error> {
    csr.to_pem(PEM_LINE_ENDING).context(EncodePemSnafu)
}

/// The public key requested by `csr`.
pub fn public_key(csr: &CertReq) -> &SubjectPublicKeyInfoOwned {
    &csr.info.public_key
}

/// Builds a CSR for `subject` without attributes, self-signed by `key_pair`.
pub fn build(subject: &Name, key_pair: &KeyPair) -> Result<CertReq, Error> {
    let info = CertReqInfo {
        version: Version::V1,
        subject: subject.clone(),
        public_key: key_pair.public_key_info().context(ReadPublicKeySnafu)?,
        attributes: Default::default(),
    };

    let info_der = info.to_der().context(EncodeInfoSnafu)?;
    let signature = key_pair.sign(&info_der).context(SignSnafu)?;

    Ok(CertReq {
        info,
        algorithm: key_pair.signature_algorithm(),
        signature: BitString::from_bytes(&signature).context(EncodeSignatureSnafu)?,
    })
}
