//! Contains primitives to create signing keys, which are used to sign CAs
//! and other certificates.
//!
//! This module currently provides the following algorithms:
//!
//! ## ECDSA
//!
//! ECDSA keys are backed by the RustCrypto curve crates (`p192`, `p224`,
//! `k256`, `p256`, `p384` and `p521`). See [`ecdsa::Curve`] for the list of
//! supported named curves.
//!
//! ```
//! use gimmecert_certs::keys::{KeyPair, KeySpecification};
//!
//! let spec: KeySpecification = "ecdsa:secp256r1".parse().unwrap();
//! let key_pair = KeyPair::generate(&spec).unwrap();
//! assert_eq!(key_pair.specification(), spec);
//! ```
//!
//! ## RSA
//!
//! In order to work with RSA keys, this crate requires the [`rsa`] dependency.
//! It should be noted, that the crate is currently vulnerable to the recently
//! discovered Marvin attack. The `openssl` crate is also impacted by this. See:
//!
//! - <https://people.redhat.com/~hkario/marvin/>
//! - <https://rustsec.org/advisories/RUSTSEC-2023-0071.html>
//! - <https://github.com/RustCrypto/RSA/issues/19>
use std::{fmt::Debug, str::FromStr};

use const_oid::db::rfc5912::{ID_EC_PUBLIC_KEY, RSA_ENCRYPTION};
use ::rsa::{pkcs1::RsaPublicKey, pkcs8::PrivateKeyInfo};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{debug, instrument};
use x509_cert::{
    der::{Decode, pem, referenced::OwnedToRef},
    spki::{AlgorithmIdentifierOwned, ObjectIdentifier, SubjectPublicKeyInfoOwned},
};
use zeroize::Zeroizing;

pub mod ecdsa;
pub mod rsa;

pub use self::ecdsa::Curve;

const RSA_PRIVATE_KEY_LABEL: &str = "RSA PRIVATE KEY";
const EC_PRIVATE_KEY_LABEL: &str = "EC PRIVATE KEY";
const PKCS8_PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("RSA key operation failed"))]
    Rsa { source: rsa::Error },

    #[snafu(display("ECDSA key operation failed"))]
    Ecdsa { source: ecdsa::Error },

    #[snafu(display("failed to decode private key PEM"))]
    DecodePem { source: x509_cert::der::Error },

    #[snafu(display("unsupported private key PEM label {label:?}"))]
    UnsupportedPemLabel { label: String },

    #[snafu(display("failed to decode SEC1 private key structure"))]
    DecodeSec1 { source: x509_cert::der::Error },

    #[snafu(display("the SEC1 private key doesn't name its curve"))]
    MissingCurveParameters,

    #[snafu(display("failed to decode PKCS8 private key structure"))]
    DecodePkcs8 { source: ::rsa::pkcs8::Error },

    #[snafu(display("failed to read the named curve of the key"))]
    ReadCurveParameters { source: x509_cert::spki::Error },

    #[snafu(display("unsupported public key algorithm {oid}"))]
    UnsupportedAlgorithm { oid: ObjectIdentifier },

    #[snafu(display("failed to decode RSA public key"))]
    DecodeRsaPublicKey { source: x509_cert::der::Error },
}

impl Error {
    /// Whether the failure stems from a key specification the underlying
    /// primitive can't generate keys for, such as a too small RSA modulus.
    pub fn is_invalid_specification(&self) -> bool {
        matches!(
            self,
            Self::Rsa {
                source: rsa::Error::InvalidBitSize { .. } | rsa::Error::CreateKey { .. }
            }
        )
    }
}

/// Error returned when a key specification string can't be parsed.
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ParseKeySpecificationError {
    #[snafu(display(
        "invalid key specification {input:?}, expected \"rsa:BIT_LENGTH\" or \"ecdsa:CURVE_NAME\""
    ))]
    MissingParameter { input: String },

    #[snafu(display("unsupported key algorithm {algorithm:?}, expected \"rsa\" or \"ecdsa\""))]
    UnknownAlgorithm { algorithm: String },

    #[snafu(display("invalid RSA bit length {bit_size:?}, expected a positive integer"))]
    InvalidBitSize { bit_size: String },

    #[snafu(display("unsupported curve {curve:?}, expected one of: {supported}"))]
    UnknownCurve { curve: String, supported: String },
}

/// Describes the algorithm and its parameters used to generate a key pair.
///
/// The canonical string syntax is `rsa:<bit_length>` or `ecdsa:<curve_name>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeySpecification {
    Rsa { bit_size: usize },
    Ecdsa { curve: Curve },
}

impl Default for KeySpecification {
    fn default() -> Self {
        Self::Rsa {
            bit_size: rsa::DEFAULT_BIT_SIZE,
        }
    }
}

impl KeySpecification {
    /// Returns the canonical argument form, e.g. `rsa:2048`.
    pub fn canonical(&self) -> String {
        match self {
            Self::Rsa { bit_size } => format!("rsa:{bit_size}"),
            Self::Ecdsa { curve } => format!("ecdsa:{curve}"),
        }
    }
}

impl std::fmt::Display for KeySpecification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsa { bit_size } => write!(f, "{bit_size}-bit RSA"),
            Self::Ecdsa { curve } => write!(f, "{curve} ECDSA"),
        }
    }
}

impl FromStr for KeySpecification {
    type Err = ParseKeySpecificationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (algorithm, parameter) = input
            .split_once(':')
            .context(MissingParameterSnafu { input })?;

        match algorithm {
            "rsa" => {
                let bit_size = parameter
                    .parse::<usize>()
                    .ok()
                    .filter(|bit_size| *bit_size > 0)
                    .context(InvalidBitSizeSnafu {
                        bit_size: parameter,
                    })?;

                Ok(Self::Rsa { bit_size })
            }
            "ecdsa" => {
                let curve = parameter.parse::<Curve>().ok().context(UnknownCurveSnafu {
                    curve: parameter,
                    supported: Curve::supported_names(),
                })?;

                Ok(Self::Ecdsa { curve })
            }
            _ => UnknownAlgorithmSnafu { algorithm }.fail(),
        }
    }
}

/// Common operations of all signing key pairs, independent of the
/// underlying algorithm.
pub trait CertificateKeypair
where
    Self: Debug + Sized,
{
    type Error: std::error::Error + 'static;

    /// Returns the subject public key info of the public half.
    fn public_key_info(&self) -> Result<SubjectPublicKeyInfoOwned, Self::Error>;

    /// The algorithm identifier of the signatures produced by [`Self::sign`].
    fn signature_algorithm(&self) -> AlgorithmIdentifierOwned;

    /// Signs the SHA-256 digest of `message` and returns the encoded
    /// signature bytes.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, Self::Error>;

    /// Serializes the private key as unencrypted PEM in the traditional
    /// (PKCS1 or SEC1) format.
    fn to_pem(&self) -> Result<Zeroizing<String>, Self::Error>;

    /// The name of the algorithm such as `rsa` or `ecdsa`.
    fn algorithm_name() -> &'static str;
}

/// An asymmetric private key plus its derivable public key.
#[derive(Debug)]
pub enum KeyPair {
    Rsa(rsa::SigningKey),
    Ecdsa(ecdsa::SigningKey),
}

impl KeyPair {
    /// Generates a fresh key pair according to `spec`.
    #[instrument(name = "generate_key_pair", skip_all, fields(key.specification = %spec))]
    pub fn generate(spec: &KeySpecification) -> Result<Self> {
        let key_pair = match spec {
            KeySpecification::Rsa { bit_size } => {
                Self::Rsa(rsa::SigningKey::new(*bit_size).context(RsaSnafu)?)
            }
            KeySpecification::Ecdsa { curve } => Self::Ecdsa(ecdsa::SigningKey::new(*curve)),
        };

        debug!(key.specification = %spec, "generated key pair");
        Ok(key_pair)
    }

    /// The specification this key pair could be regenerated with.
    pub fn specification(&self) -> KeySpecification {
        match self {
            Self::Rsa(key) => KeySpecification::Rsa {
                bit_size: key.bit_size(),
            },
            Self::Ecdsa(key) => KeySpecification::Ecdsa { curve: key.curve() },
        }
    }

    pub fn algorithm_name(&self) -> &'static str {
        match self {
            Self::Rsa(_) => <rsa::SigningKey as CertificateKeypair>::algorithm_name(),
            Self::Ecdsa(_) => <ecdsa::SigningKey as CertificateKeypair>::algorithm_name(),
        }
    }

    pub fn public_key_info(&self) -> Result<SubjectPublicKeyInfoOwned> {
        match self {
            Self::Rsa(key) => key.public_key_info().context(RsaSnafu),
            Self::Ecdsa(key) => key.public_key_info().context(EcdsaSnafu),
        }
    }

    pub fn signature_algorithm(&self) -> AlgorithmIdentifierOwned {
        match self {
            Self::Rsa(key) => key.signature_algorithm(),
            Self::Ecdsa(key) => key.signature_algorithm(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Rsa(key) => key.sign(message).context(RsaSnafu),
            Self::Ecdsa(key) => key.sign(message).context(EcdsaSnafu),
        }
    }

    /// Serializes the private key as unencrypted, traditional format PEM.
    pub fn to_pem(&self) -> Result<Zeroizing<String>> {
        match self {
            Self::Rsa(key) => key.to_pem().context(RsaSnafu),
            Self::Ecdsa(key) => key.to_pem().context(EcdsaSnafu),
        }
    }

    /// Decodes a PEM-encoded, unencrypted private key. Traditional
    /// (`RSA PRIVATE KEY`, `EC PRIVATE KEY`) and PKCS8 (`PRIVATE KEY`)
    /// encodings are supported.
    #[instrument(name = "decode_key_pair_from_pem", skip_all)]
    pub fn from_pem(input: &str) -> Result<Self> {
        let (label, der) = pem::decode_vec(input.as_bytes())
            .map_err(x509_cert::der::Error::from)
            .context(DecodePemSnafu)?;

        match label {
            RSA_PRIVATE_KEY_LABEL => Ok(Self::Rsa(
                rsa::SigningKey::from_pkcs1_der(&der).context(RsaSnafu)?,
            )),
            EC_PRIVATE_KEY_LABEL => {
                let ec_private_key =
                    sec1::EcPrivateKey::from_der(&der).context(DecodeSec1Snafu)?;
                let curve = match ec_private_key
                    .parameters
                    .and_then(|parameters| parameters.named_curve())
                {
                    Some(curve_oid) => Curve::from_oid(curve_oid).context(EcdsaSnafu)?,
                    None => {
                        ecdsa::SigningKey::infer_sec1_curve(&der, ec_private_key.public_key)
                            .context(MissingCurveParametersSnafu)?
                    }
                };

                Ok(Self::Ecdsa(
                    ecdsa::SigningKey::from_sec1_der(curve, &der).context(EcdsaSnafu)?,
                ))
            }
            PKCS8_PRIVATE_KEY_LABEL => {
                let private_key_info =
                    PrivateKeyInfo::try_from(der.as_slice()).context(DecodePkcs8Snafu)?;

                match private_key_info.algorithm.oid {
                    RSA_ENCRYPTION => Ok(Self::Rsa(
                        rsa::SigningKey::from_pkcs8_der(&der).context(RsaSnafu)?,
                    )),
                    ID_EC_PUBLIC_KEY => {
                        let curve_oid = private_key_info
                            .algorithm
                            .parameters_oid()
                            .context(ReadCurveParametersSnafu)?;
                        let curve = Curve::from_oid(curve_oid).context(EcdsaSnafu)?;

                        Ok(Self::Ecdsa(
                            ecdsa::SigningKey::from_pkcs8_der(curve, &der).context(EcdsaSnafu)?,
                        ))
                    }
                    oid => UnsupportedAlgorithmSnafu { oid }.fail(),
                }
            }
            label => UnsupportedPemLabelSnafu { label }.fail(),
        }
    }
}

/// Derives the [`KeySpecification`] implied by a subject public key, the
/// RSA modulus length or the named EC curve.
pub fn specification_of(public_key: &SubjectPublicKeyInfoOwned) -> Result<KeySpecification> {
    match public_key.algorithm.oid {
        RSA_ENCRYPTION => {
            // Read the modulus straight from the PKCS#1 structure, the `rsa`
            // crate refuses to load public keys above 4096 bits.
            let rsa_public_key = RsaPublicKey::from_der(public_key.subject_public_key.raw_bytes())
                .context(DecodeRsaPublicKeySnafu)?;
            let modulus = rsa_public_key.modulus.as_bytes();
            let bit_size = modulus.first().map_or(0, |leading| {
                modulus.len() * 8 - leading.leading_zeros() as usize
            });

            Ok(KeySpecification::Rsa { bit_size })
        }
        ID_EC_PUBLIC_KEY => {
            let curve_oid = public_key
                .algorithm
                .owned_to_ref()
                .parameters_oid()
                .context(ReadCurveParametersSnafu)?;
            let curve = Curve::from_oid(curve_oid).context(EcdsaSnafu)?;

            Ok(KeySpecification::Ecdsa { curve })
        }
        oid => UnsupportedAlgorithmSnafu { oid }.fail(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("rsa:2048", KeySpecification::Rsa { bit_size: 2048 })]
    #[case("rsa:3072", KeySpecification::Rsa { bit_size: 3072 })]
    #[case("ecdsa:secp256r1", KeySpecification::Ecdsa { curve: Curve::Secp256r1 })]
    #[case("ecdsa:secp192r1", KeySpecification::Ecdsa { curve: Curve::Secp192r1 })]
    fn parse_key_specification(#[case] input: &str, #[case] expected: KeySpecification) {
        let spec: KeySpecification = input.parse().expect("valid key specification");
        assert_eq!(spec, expected);
        assert_eq!(spec.canonical(), input);
    }

    #[rstest]
    #[case("rsa")]
    #[case("rsa:")]
    #[case("rsa:abc")]
    #[case("rsa:0")]
    #[case("rsa:-1024")]
    #[case("dsa:1024")]
    #[case("ecdsa:prime256v1")]
    #[case("ecdsa")]
    fn reject_invalid_key_specification(#[case] input: &str) {
        assert!(input.parse::<KeySpecification>().is_err());
    }

    #[test]
    fn display_key_specification() {
        assert_eq!(
            KeySpecification::Rsa { bit_size: 2048 }.to_string(),
            "2048-bit RSA"
        );
        assert_eq!(
            KeySpecification::Ecdsa {
                curve: Curve::Secp384r1
            }
            .to_string(),
            "secp384r1 ECDSA"
        );
    }

    #[rstest]
    #[case(KeySpecification::Rsa { bit_size: 1024 })]
    #[case(KeySpecification::Ecdsa { curve: Curve::Secp192r1 })]
    #[case(KeySpecification::Ecdsa { curve: Curve::Secp256k1 })]
    #[case(KeySpecification::Ecdsa { curve: Curve::Secp521r1 })]
    fn specification_derived_from_public_key(#[case] spec: KeySpecification) {
        let key_pair = KeyPair::generate(&spec).expect("failed to generate key");
        let public_key = key_pair.public_key_info().expect("failed to encode key");

        assert_eq!(key_pair.specification(), spec);
        assert_eq!(specification_of(&public_key).expect("supported key"), spec);
    }

    #[rstest]
    #[case(KeySpecification::Rsa { bit_size: 1024 })]
    #[case(KeySpecification::Ecdsa { curve: Curve::Secp192r1 })]
    #[case(KeySpecification::Ecdsa { curve: Curve::Secp224r1 })]
    #[case(KeySpecification::Ecdsa { curve: Curve::Secp256k1 })]
    #[case(KeySpecification::Ecdsa { curve: Curve::Secp256r1 })]
    #[case(KeySpecification::Ecdsa { curve: Curve::Secp384r1 })]
    #[case(KeySpecification::Ecdsa { curve: Curve::Secp521r1 })]
    fn pem_round_trip_preserves_public_key(#[case] spec: KeySpecification) {
        let key_pair = KeyPair::generate(&spec).expect("failed to generate key");
        let pem = key_pair.to_pem().expect("failed to encode key");
        let decoded = KeyPair::from_pem(&pem).expect("failed to decode key");

        assert_eq!(decoded.specification(), spec);
        assert_eq!(
            decoded.public_key_info().expect("public key"),
            key_pair.public_key_info().expect("public key")
        );
    }

    #[test]
    fn decode_sec1_private_key_without_curve_parameters() {
        let secret_key = p384::SecretKey::random(&mut rand_core::OsRng);
        let pem = secret_key
            .to_sec1_pem(x509_cert::der::pem::LineEnding::LF)
            .expect("failed to encode key");

        let decoded = KeyPair::from_pem(&pem).expect("failed to decode key");
        assert_eq!(decoded.specification(), KeySpecification::Ecdsa {
            curve: Curve::Secp384r1
        });
    }

    #[rstest]
    #[case(4097)]
    #[case(4608)]
    #[case(8192)]
    fn specification_of_large_rsa_modulus(#[case] bit_size: usize) {
        use x509_cert::der::{
            Encode,
            asn1::{Any, BitString, UintRef},
        };

        let mut modulus = vec![0xff_u8; bit_size.div_ceil(8)];
        modulus[0] >>= modulus.len() * 8 - bit_size;
        let rsa_public_key = RsaPublicKey {
            modulus: UintRef::new(&modulus).expect("valid modulus"),
            public_exponent: UintRef::new(&[0x01, 0x00, 0x01]).expect("valid exponent"),
        };
        let public_key = SubjectPublicKeyInfoOwned {
            algorithm: AlgorithmIdentifierOwned {
                oid: RSA_ENCRYPTION,
                parameters: Some(Any::null()),
            },
            subject_public_key: BitString::from_bytes(
                &rsa_public_key.to_der().expect("encodable public key"),
            )
            .expect("valid bit string"),
        };

        assert_eq!(
            specification_of(&public_key).expect("supported key"),
            KeySpecification::Rsa { bit_size }
        );
    }

    #[test]
    fn decode_pkcs8_private_key() {
        use p256::pkcs8::EncodePrivateKey;

        let secret_key = p256::SecretKey::random(&mut rand_core::OsRng);
        let pem = secret_key
            .to_pkcs8_pem(x509_cert::der::pem::LineEnding::LF)
            .expect("failed to encode key");

        let decoded = KeyPair::from_pem(&pem).expect("failed to decode key");
        assert_eq!(decoded.specification(), KeySpecification::Ecdsa {
            curve: Curve::Secp256r1
        });
    }

    #[test]
    fn tiny_rsa_modulus_is_an_invalid_specification() {
        let error = KeyPair::generate(&KeySpecification::Rsa { bit_size: 64 })
            .expect_err("64-bit RSA keys must be rejected");
        assert!(error.is_invalid_specification());
    }

    #[test]
    fn reject_non_key_pem() {
        let pem = "-----BEGIN CERTIFICATE REQUEST-----\nAAAA\n-----END CERTIFICATE REQUEST-----\n";
        assert!(matches!(
            KeyPair::from_pem(pem),
            Err(Error::UnsupportedPemLabel { .. })
        ));
    }
}
