//! Abstraction layer around the [`rsa`] crate. This module provides types
//! which abstract away the generation of RSA keys used for signing of CAs
//! and other certificates.
use rand_core::{CryptoRngCore, OsRng};
use rsa::{
    RsaPrivateKey,
    pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey},
    pkcs8::{DecodePrivateKey, EncodePublicKey},
    traits::PublicKeyParts,
};
use signature::{SignatureEncoding, Signer};
use snafu::{ResultExt, Snafu, ensure};
use tracing::instrument;
use x509_cert::{
    der::{Decode, asn1::Any},
    spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned},
};
use zeroize::Zeroizing;

use crate::{ca::PEM_LINE_ENDING, keys::CertificateKeypair};

pub const DEFAULT_BIT_SIZE: usize = 2048;

/// Smallest modulus [`SigningKey::new`] generates. Prime generation for tiny
/// moduli is not reliable in the `rsa` crate.
pub const MIN_BIT_SIZE: usize = 512;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid RSA bit size {bit_size}, expected at least {MIN_BIT_SIZE}"))]
    InvalidBitSize { bit_size: usize },

    #[snafu(display("failed to create {bit_size}-bit RSA key"))]
    CreateKey { source: rsa::Error, bit_size: usize },

    #[snafu(display("failed to deserialize the signing (private) key from PKCS1 DER"))]
    DeserializePkcs1SigningKey { source: rsa::pkcs1::Error },

    #[snafu(display("failed to deserialize the signing (private) key from PKCS8 DER"))]
    DeserializePkcs8SigningKey { source: rsa::pkcs8::Error },

    #[snafu(display("failed to serialize the signing (private) key as PEM-encoded PKCS1"))]
    SerializeSigningKey { source: rsa::pkcs1::Error },

    #[snafu(display("failed to serialize the verifying (public) key as SPKI"))]
    SerializeVerifyingKey { source: x509_cert::spki::Error },

    #[snafu(display("failed to decode the verifying (public) key SPKI"))]
    DecodeVerifyingKey { source: x509_cert::der::Error },

    #[snafu(display("failed to sign message"))]
    Sign { source: signature::Error },
}

#[derive(Debug)]
pub struct SigningKey(rsa::pkcs1v15::SigningKey<sha2::Sha256>);

impl SigningKey {
    /// Generates a new RSA key with the default random-number generator
    /// [`OsRng`] and the public exponent 65537.
    ///
    /// Common values for `bit_size` are `2048` or `4096`. It should be noted
    /// that the generation of the key takes longer for larger bit sizes. The
    /// generation of an RSA key with a bit size of `4096` can take up to
    /// multiple seconds.
    #[instrument(name = "create_rsa_signing_key")]
    pub fn new(bit_size: usize) -> Result<Self> {
        let mut csprng = OsRng;
        Self::new_with_rng(&mut csprng, bit_size)
    }

    #[instrument(name = "create_rsa_signing_key_custom_rng", skip(csprng))]
    pub fn new_with_rng<R>(csprng: &mut R, bit_size: usize) -> Result<Self>
    where
        R: CryptoRngCore + ?Sized,
    {
        ensure!(bit_size >= MIN_BIT_SIZE, InvalidBitSizeSnafu { bit_size });

        // RsaPrivateKey::new always uses the public exponent 65537.
        let private_key =
            RsaPrivateKey::new(csprng, bit_size).context(CreateKeySnafu { bit_size })?;

        Ok(Self::from(private_key))
    }

    #[instrument(name = "create_rsa_signing_key_from_pkcs1_der", skip_all)]
    pub fn from_pkcs1_der(input: &[u8]) -> Result<Self> {
        let private_key =
            RsaPrivateKey::from_pkcs1_der(input).context(DeserializePkcs1SigningKeySnafu)?;

        Ok(Self::from(private_key))
    }

    #[instrument(name = "create_rsa_signing_key_from_pkcs8_der", skip_all)]
    pub fn from_pkcs8_der(input: &[u8]) -> Result<Self> {
        let private_key =
            RsaPrivateKey::from_pkcs8_der(input).context(DeserializePkcs8SigningKeySnafu)?;

        Ok(Self::from(private_key))
    }

    /// The length of the modulus in bits.
    pub fn bit_size(&self) -> usize {
        self.private_key().n().bits()
    }

    fn private_key(&self) -> &RsaPrivateKey {
        self.0.as_ref()
    }
}

impl From<RsaPrivateKey> for SigningKey {
    fn from(private_key: RsaPrivateKey) -> Self {
        Self(rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(private_key))
    }
}

impl CertificateKeypair for SigningKey {
    type Error = Error;

    fn public_key_info(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let document = self
            .private_key()
            .to_public_key()
            .to_public_key_der()
            .context(SerializeVerifyingKeySnafu)?;

        SubjectPublicKeyInfoOwned::from_der(document.as_bytes()).context(DecodeVerifyingKeySnafu)
    }

    fn signature_algorithm(&self) -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            parameters: Some(Any::null()),
        }
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature = self.0.try_sign(message).context(SignSnafu)?;
        Ok(signature.to_vec())
    }

    fn to_pem(&self) -> Result<Zeroizing<String>> {
        self.private_key()
            .to_pkcs1_pem(PEM_LINE_ENDING)
            .context(SerializeSigningKeySnafu)
    }

    fn algorithm_name() -> &'static str {
        "rsa"
    }
}
