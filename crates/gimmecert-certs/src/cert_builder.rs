use bon::Builder;
use snafu::{ResultExt, Snafu};
use tracing::{debug, instrument};
use x509_cert::{
    Certificate, TbsCertificate,
    certificate::Version,
    der::{Encode, asn1::BitString},
    name::Name,
    serial_number::SerialNumber,
    spki::SubjectPublicKeyInfoOwned,
};

use crate::{ext::ExtensionSet, keys::KeyPair, validity::ValidityWindow};

/// Defines all error variants which can occur when creating a certificate
#[derive(Debug, Snafu)]
pub enum CreateCertificateError {
    #[snafu(display("failed to encode validity"))]
    EncodeValidity { source: crate::validity::Error },

    #[snafu(display("failed to encode the to-be-signed certificate"))]
    EncodeTbsCertificate { source: x509_cert::der::Error },

    #[snafu(display("failed to sign certificate"))]
    SignCertificate { source: crate::keys::Error },

    #[snafu(display("failed to encode certificate signature"))]
    EncodeSignature { source: x509_cert::der::Error },
}

/// This builder issues a single X.509 v3 certificate.
///
/// The builder doesn't apply any policy on its own: the validity is used
/// exactly as passed and every extension is attached in order. Callers
/// issuing certificates below a CA are responsible for clamping the
/// validity, see [`ValidityWindow::clamp_to`].
///
/// Each certificate gets a random serial number and is signed with SHA-256
/// by `signing_key`.
///
/// ```no_run
/// use gimmecert_certs::{
///     CertificateBuilder,
///     keys::{KeyPair, KeySpecification},
///     name::common_name,
///     validity::ValidityWindow,
/// };
///
/// let key_pair = KeyPair::generate(&KeySpecification::default()).unwrap();
/// let name = common_name("example").unwrap();
///
/// let certificate = CertificateBuilder::builder()
///     .issuer(&name)
///     .subject(&name)
///     .signing_key(&key_pair)
///     .subject_public_key(&key_pair.public_key_info().unwrap())
///     .validity(ValidityWindow::from_now().unwrap())
///     .build()
///     .unwrap();
/// ```
#[derive(Builder)]
#[builder(start_fn = start_builder, finish_fn = finish_builder)]
pub struct CertificateBuilder<'a> {
    /// Distinguished name of the issuer, the subject of the signing CA.
    issuer: &'a Name,

    /// Distinguished name of the subject.
    subject: &'a Name,

    /// Private key of the issuer.
    signing_key: &'a KeyPair,

    /// Public key embedded into the certificate.
    subject_public_key: &'a SubjectPublicKeyInfoOwned,

    validity: ValidityWindow,

    /// Extensions attached to the certificate. No extensions is legal.
    #[builder(default)]
    extensions: ExtensionSet,
}

impl<'a> CertificateBuilder<'a> {
    /// Use this function in combination with [`CertificateBuilder`] to issue
    /// new certificates.
    pub fn builder() -> CertificateBuilderBuilder<'a> {
        Self::start_builder()
    }
}

impl<S> CertificateBuilderBuilder<'_, S>
where
    S: certificate_builder_builder::IsComplete,
{
    /// Convenience function to avoid calling `builder().finish_builder().build()`
    pub fn build(self) -> Result<Certificate, CreateCertificateError> {
        self.finish_builder().build()
    }
}

impl CertificateBuilder<'_> {
    #[instrument(
        name = "build_certificate",
        skip(self),
        fields(subject = %self.subject, issuer = %self.issuer),
    )]
    pub fn build(self) -> Result<Certificate, CreateCertificateError> {
        // By choosing a random serial number we can make the reasonable assumption that we generate
        // a unique serial for each certificate.
        let serial_number = SerialNumber::from(rand::random::<u64>());
        let signature_algorithm = self.signing_key.signature_algorithm();

        debug!(
            certificate.subject = %self.subject,
            certificate.issuer = %self.issuer,
            certificate.not_before = %self.validity.not_before(),
            certificate.not_after = %self.validity.not_after(),
            certificate.serial = %serial_number,
            certificate.extensions = self.extensions.len(),
            certificate.signing_key.algorithm = self.signing_key.algorithm_name(),
            "creating and signing certificate"
        );

        let tbs_certificate = TbsCertificate {
            version: Version::V3,
            serial_number,
            signature: signature_algorithm.clone(),
            issuer: self.issuer.clone(),
            validity: self.validity.to_validity().context(EncodeValiditySnafu)?,
            subject: self.subject.clone(),
            subject_public_key_info: self.subject_public_key.clone(),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: self.extensions.into_extensions(),
        };

        let tbs_der = tbs_certificate
            .to_der()
            .context(EncodeTbsCertificateSnafu)?;
        let signature = self
            .signing_key
            .sign(&tbs_der)
            .context(SignCertificateSnafu)?;

        Ok(Certificate {
            tbs_certificate,
            signature_algorithm,
            signature: BitString::from_bytes(&signature).context(EncodeSignatureSnafu)?,
        })
    }
}
