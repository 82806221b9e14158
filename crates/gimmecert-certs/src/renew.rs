//! Reissuing existing certificates with a fresh validity window.
use snafu::{ResultExt, Snafu};
use tracing::{debug, instrument};
use x509_cert::{Certificate, spki::SubjectPublicKeyInfoOwned};

use crate::{
    CertificateBuilder,
    ca::CertificateAuthority,
    cert_builder::CreateCertificateError,
    ext::ExtensionSet,
    leaf::leaf_validity,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to compute validity"))]
    ComputeValidity { source: crate::leaf::Error },

    #[snafu(display("failed to build certificate"))]
    BuildCertificate { source: CreateCertificateError },
}

/// Issues a new certificate for `new_public_key` which keeps the subject and
/// issuer of `old_certificate`.
///
/// Without `updated_extensions` the extensions of `old_certificate` are
/// copied verbatim, otherwise they are replaced entirely. The validity window
/// is computed afresh and clamped into the window of `issuing_ca`, so a
/// renewal late in the life of a CA yields a shorter-lived certificate.
#[instrument(
    skip_all,
    fields(subject = %old_certificate.tbs_certificate.subject),
)]
pub fn renew_certificate(
    old_certificate: &Certificate,
    new_public_key: &SubjectPublicKeyInfoOwned,
    issuing_ca: &CertificateAuthority,
    updated_extensions: Option<ExtensionSet>,
) -> Result<Certificate, Error> {
    let tbs_certificate = &old_certificate.tbs_certificate;
    let inherit_extensions = updated_extensions.is_none();
    let extensions =
        updated_extensions.unwrap_or_else(|| ExtensionSet::from_certificate(old_certificate));

    debug!(
        certificate.public_key_changed = *new_public_key != tbs_certificate.subject_public_key_info,
        certificate.inherit_extensions = inherit_extensions,
        "renewing certificate"
    );

    CertificateBuilder::builder()
        .issuer(&tbs_certificate.issuer)
        .subject(&tbs_certificate.subject)
        .signing_key(issuing_ca.signing_key())
        .subject_public_key(new_public_key)
        .validity(leaf_validity(issuing_ca).context(ComputeValiditySnafu)?)
        .extensions(extensions)
        .build()
        .context(BuildCertificateSnafu)
}
