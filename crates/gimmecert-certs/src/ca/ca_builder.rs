use bon::Builder;
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, instrument};
use x509_cert::name::Name;

use super::{CertificateAuthority, CertificateAuthorityHierarchy};
use crate::{
    CertificateBuilder, CertificatePair,
    ca::DEFAULT_CA_HIERARCHY_DEPTH,
    cert_builder::CreateCertificateError,
    ext::ExtensionSet,
    keys::{KeyPair, KeySpecification},
    name::common_name,
    validity::ValidityWindow,
};

/// Defines all error variants which can occur when creating a CA hierarchy
#[derive(Debug, Snafu)]
pub enum CreateCertificateAuthorityError {
    #[snafu(display("the CA hierarchy depth must be at least 1"))]
    InvalidDepth,

    #[snafu(display("failed to compute validity"))]
    ComputeValidity { source: crate::validity::Error },

    #[snafu(display("failed to parse {subject:?} as subject"))]
    ParseSubject {
        source: x509_cert::der::Error,
        subject: String,
    },

    #[snafu(display("failed to create signing key pair for level {level}"))]
    CreateSigningKeyPair {
        source: crate::keys::Error,
        level: usize,
    },

    #[snafu(display("failed to encode public key of level {level}"))]
    EncodePublicKey {
        source: crate::keys::Error,
        level: usize,
    },

    #[snafu(display("failed to build CA extensions"))]
    BuildExtensions { source: crate::ext::Error },

    #[snafu(display("failed to build certificate for level {level}"))]
    BuildCertificate {
        source: CreateCertificateError,
        level: usize,
    },

    #[snafu(display("failed to assemble CA hierarchy"))]
    AssembleHierarchy { source: super::Error },
}

/// This builder builds hierarchies of type [`CertificateAuthorityHierarchy`].
///
/// - The subject of level `i` is `"{base_name} Level {i} CA"`
/// - Level 1 is self-signed, each further level is signed by its predecessor
/// - Every level gets its own freshly generated key pair, all following the
///   same `key_specification`
/// - All levels share one validity window, computed once, so they expire
///   simultaneously
///
/// Example code to construct a hierarchy:
///
/// ```no_run
/// use gimmecert_certs::ca::CertificateAuthorityHierarchy;
///
/// let hierarchy = CertificateAuthorityHierarchy::builder()
///     .base_name("My Project")
///     .depth(2)
///     .build()
///     .expect("failed to build CA hierarchy");
///
/// assert_eq!(hierarchy.depth(), 2);
/// ```
#[derive(Builder)]
#[builder(start_fn = start_builder, finish_fn = finish_builder)]
pub struct CertificateAuthorityHierarchyBuilder<'a> {
    /// Prefix of every CA subject.
    base_name: &'a str,

    /// Number of CA levels.
    #[builder(default = DEFAULT_CA_HIERARCHY_DEPTH)]
    depth: usize,

    /// Specification of the key pair generated for each level.
    #[builder(default)]
    key_specification: KeySpecification,

    /// Validity window shared by all levels.
    ///
    /// If not specified the standard window relative to the current time
    /// will be used.
    validity: Option<ValidityWindow>,
}

impl<S> CertificateAuthorityHierarchyBuilderBuilder<'_, S>
where
    S: certificate_authority_hierarchy_builder_builder::IsComplete,
{
    /// Convenience function to avoid calling `builder().finish_builder().build()`
    pub fn build(self) -> Result<CertificateAuthorityHierarchy, CreateCertificateAuthorityError> {
        self.finish_builder().build()
    }
}

impl CertificateAuthorityHierarchyBuilder<'_> {
    #[instrument(
        name = "build_certificate_authority_hierarchy",
        skip(self),
        fields(
            base_name = self.base_name,
            depth = self.depth,
            key.specification = %self.key_specification,
        ),
    )]
    pub fn build(self) -> Result<CertificateAuthorityHierarchy, CreateCertificateAuthorityError> {
        ensure!(self.depth >= 1, InvalidDepthSnafu);

        let validity = match self.validity {
            Some(validity) => validity,
            None => ValidityWindow::from_now().context(ComputeValiditySnafu)?,
        };
        let extensions = ExtensionSet::certificate_authority().context(BuildExtensionsSnafu)?;

        let mut levels: Vec<CertificateAuthority> = Vec::with_capacity(self.depth);

        for level in 1..=self.depth {
            let subject_string = format!("{base_name} Level {level} CA", base_name = self.base_name);
            let subject = common_name(&subject_string).context(ParseSubjectSnafu {
                subject: subject_string.clone(),
            })?;

            let key_pair = KeyPair::generate(&self.key_specification)
                .context(CreateSigningKeyPairSnafu { level })?;
            let public_key = key_pair
                .public_key_info()
                .context(EncodePublicKeySnafu { level })?;

            debug!(
                ca.level = level,
                ca.subject = %subject,
                ca.not_before = %validity.not_before(),
                ca.not_after = %validity.not_after(),
                ca.public_key.algorithm = key_pair.algorithm_name(),
                "creating certificate authority"
            );

            // Level 1 signs itself, every other level is signed by its parent.
            let (issuer, signing_key): (&Name, &KeyPair) = match levels.last() {
                Some(parent) => (parent.subject_name(), parent.signing_key()),
                None => (&subject, &key_pair),
            };

            let certificate = CertificateBuilder::builder()
                .issuer(issuer)
                .subject(&subject)
                .signing_key(signing_key)
                .subject_public_key(&public_key)
                .validity(validity)
                .extensions(extensions.clone())
                .build()
                .context(BuildCertificateSnafu { level })?;

            levels.push(CertificateAuthority {
                certificate_pair: CertificatePair::new(certificate, key_pair),
                validity,
            });
        }

        CertificateAuthorityHierarchy::from_levels(levels).context(AssembleHierarchySnafu)
    }
}
