//! Decides which key material backs a leaf certificate.
//!
//! An entity is either backed by a private key generated here or by an
//! externally supplied CSR, never by both. Issuance picks one of the two,
//! renewal either keeps the current key material, generates a new private
//! key (dropping a CSR) or switches to a CSR (dropping the private key). The
//! caller persists the outcome and removes the artifact that no longer
//! applies.
use snafu::{OptionExt, ResultExt};
use strum::Display;
use tracing::{debug, instrument};
use x509_cert::{Certificate, request::CertReq, spki::SubjectPublicKeyInfoOwned};

use crate::{
    BuildExtensionsSnafu, ConflictingRenewalOptionsSnafu, GenerateKeyPairSnafu,
    IssueLeafCertificateSnafu, MissingCommonNameSnafu, ReadPublicKeySnafu, RenewCertificateSnafu,
    Result,
    ca::CertificateAuthority,
    ext::ExtensionSet,
    keys::{KeyPair, KeySpecification, specification_of},
    leaf::{EntityKind, issue_client_certificate, issue_server_certificate},
    name::common_name_of,
    renew::renew_certificate,
    request,
};

/// Contract violations of [`RenewalOptions`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum RenewalConflict {
    #[strum(to_string = "a new private key and a CSR can't be requested at the same time")]
    NewPrivateKeyAndCsr,

    #[strum(to_string = "a key specification can only be given together with a new private key")]
    KeySpecificationWithoutNewPrivateKey,

    #[strum(to_string = "DNS names can only be updated for server certificates")]
    DnsNamesForClient,
}

/// Which kind of key material backs a certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum KeyMaterialState {
    #[strum(to_string = "private key")]
    PrivateKey,

    #[strum(to_string = "CSR")]
    Csr,
}

/// The key material backing an issued certificate.
#[derive(Debug)]
pub enum KeyMaterial {
    PrivateKey(KeyPair),
    Csr(CertReq),
}

impl KeyMaterial {
    pub fn state(&self) -> KeyMaterialState {
        match self {
            Self::PrivateKey(_) => KeyMaterialState::PrivateKey,
            Self::Csr(_) => KeyMaterialState::Csr,
        }
    }

    pub fn public_key_info(&self) -> Result<SubjectPublicKeyInfoOwned> {
        match self {
            Self::PrivateKey(key_pair) => key_pair.public_key_info().context(ReadPublicKeySnafu),
            Self::Csr(csr) => Ok(request::public_key(csr).clone()),
        }
    }
}

/// How the key material of a new certificate is obtained.
#[derive(Debug)]
pub enum IssuanceIntent {
    /// Use the public key of an externally supplied CSR. No private key is
    /// produced.
    UseCsr(CertReq),

    /// Generate a fresh key pair. Without a specification, the specification
    /// of the issuing CA key is used.
    GenerateKey(Option<KeySpecification>),
}

impl IssuanceIntent {
    fn into_key_material(self, issuing_ca: &CertificateAuthority) -> Result<KeyMaterial> {
        match self {
            Self::UseCsr(csr) => Ok(KeyMaterial::Csr(csr)),
            Self::GenerateKey(key_specification) => {
                let key_specification =
                    key_specification.unwrap_or_else(|| issuing_ca.signing_key().specification());
                let key_pair = KeyPair::generate(&key_specification)
                    .context(GenerateKeyPairSnafu { key_specification })?;

                Ok(KeyMaterial::PrivateKey(key_pair))
            }
        }
    }
}

/// A freshly issued certificate and the key material backing it.
#[derive(Debug)]
pub struct Issuance {
    pub certificate: Certificate,
    pub key_material: KeyMaterial,
}

/// Issues a server certificate for `entity_name`, see
/// [`issue_server_certificate`].
#[instrument(skip(extra_dns_names, intent, issuing_ca))]
pub fn issue_server<S>(
    entity_name: &str,
    extra_dns_names: &[S],
    intent: IssuanceIntent,
    issuing_ca: &CertificateAuthority,
) -> Result<Issuance>
where
    S: AsRef<str>,
{
    let key_material = intent.into_key_material(issuing_ca)?;
    let public_key = key_material.public_key_info()?;
    let certificate =
        issue_server_certificate(entity_name, &public_key, issuing_ca, extra_dns_names).context(
            IssueLeafCertificateSnafu {
                entity_kind: EntityKind::Server,
            },
        )?;

    debug!(key_material = %key_material.state(), "issued server certificate");
    Ok(Issuance {
        certificate,
        key_material,
    })
}

/// Issues a client certificate for `entity_name`, see
/// [`issue_client_certificate`].
#[instrument(skip(intent, issuing_ca))]
pub fn issue_client(
    entity_name: &str,
    intent: IssuanceIntent,
    issuing_ca: &CertificateAuthority,
) -> Result<Issuance> {
    let key_material = intent.into_key_material(issuing_ca)?;
    let public_key = key_material.public_key_info()?;
    let certificate = issue_client_certificate(entity_name, &public_key, issuing_ca).context(
        IssueLeafCertificateSnafu {
            entity_kind: EntityKind::Client,
        },
    )?;

    debug!(key_material = %key_material.state(), "issued client certificate");
    Ok(Issuance {
        certificate,
        key_material,
    })
}

/// What a renewal should change besides the validity window.
///
/// The CSR is generic so that callers can validate the options before
/// reading the CSR, see [`RenewalOptions::try_map_csr`].
#[derive(Debug)]
pub struct RenewalOptions<C = CertReq> {
    /// Replace the key material with a freshly generated private key.
    pub new_private_key: bool,

    /// Specification of the new private key. Defaults to the specification
    /// of the public key of the renewed certificate.
    pub key_specification: Option<KeySpecification>,

    /// Replace the key material with the public key of this CSR.
    pub csr: Option<C>,

    /// Replace the extra DNS names of a server certificate. An empty list
    /// leaves only the entity name.
    pub dns_names: Option<Vec<String>>,
}

impl<C> Default for RenewalOptions<C> {
    fn default() -> Self {
        Self {
            new_private_key: false,
            key_specification: None,
            csr: None,
            dns_names: None,
        }
    }
}

impl<C> RenewalOptions<C> {
    pub fn validate(&self, entity_kind: EntityKind) -> Result<(), RenewalConflict> {
        if self.new_private_key && self.csr.is_some() {
            return Err(RenewalConflict::NewPrivateKeyAndCsr);
        }

        if self.key_specification.is_some() && !self.new_private_key {
            return Err(RenewalConflict::KeySpecificationWithoutNewPrivateKey);
        }

        if self.dns_names.is_some() && entity_kind != EntityKind::Server {
            return Err(RenewalConflict::DnsNamesForClient);
        }

        Ok(())
    }

    /// Converts the CSR, for example from a path into the decoded request.
    pub fn try_map_csr<D, E, F>(self, f: F) -> Result<RenewalOptions<D>, E>
    where
        F: FnOnce(C) -> Result<D, E>,
    {
        Ok(RenewalOptions {
            new_private_key: self.new_private_key,
            key_specification: self.key_specification,
            csr: self.csr.map(f).transpose()?,
            dns_names: self.dns_names,
        })
    }
}

/// How the key material of a renewed certificate changed.
#[derive(Debug)]
pub enum KeyTransition {
    /// The public key of the old certificate is reused.
    Unchanged,

    /// A new private key was generated, any CSR no longer applies.
    GeneratedKey(KeyPair),

    /// The CSR replaces the key material, any private key no longer applies.
    ReplacedByCsr(CertReq),
}

/// A renewed certificate and the change of its key material.
#[derive(Debug)]
pub struct Renewal {
    pub certificate: Certificate,
    pub transition: KeyTransition,
}

/// Renews `old_certificate` of an entity of `entity_kind` according to
/// `options`.
///
/// Conflicting options are rejected before any key is generated. Updated DNS
/// names rebuild the canonical server extensions from the common name of the
/// old subject, otherwise the old extensions are inherited.
#[instrument(skip_all, fields(%entity_kind))]
pub fn renew(
    entity_kind: EntityKind,
    old_certificate: &Certificate,
    options: RenewalOptions,
    issuing_ca: &CertificateAuthority,
) -> Result<Renewal> {
    if let Err(conflict) = options.validate(entity_kind) {
        return ConflictingRenewalOptionsSnafu { conflict }.fail();
    }

    let RenewalOptions {
        new_private_key,
        key_specification,
        csr,
        dns_names,
    } = options;
    let old_public_key = &old_certificate.tbs_certificate.subject_public_key_info;

    let transition = if new_private_key {
        let key_specification = match key_specification {
            Some(key_specification) => key_specification,
            None => specification_of(old_public_key).context(ReadPublicKeySnafu)?,
        };
        let key_pair = KeyPair::generate(&key_specification)
            .context(GenerateKeyPairSnafu { key_specification })?;

        KeyTransition::GeneratedKey(key_pair)
    } else if let Some(csr) = csr {
        KeyTransition::ReplacedByCsr(csr)
    } else {
        KeyTransition::Unchanged
    };

    let public_key = match &transition {
        KeyTransition::Unchanged => old_public_key.clone(),
        KeyTransition::GeneratedKey(key_pair) => {
            key_pair.public_key_info().context(ReadPublicKeySnafu)?
        }
        KeyTransition::ReplacedByCsr(csr) => request::public_key(csr).clone(),
    };

    let extensions = match dns_names {
        Some(dns_names) => {
            let entity_name = common_name_of(&old_certificate.tbs_certificate.subject)
                .context(MissingCommonNameSnafu)?;
            Some(ExtensionSet::server(&entity_name, &dns_names).context(BuildExtensionsSnafu)?)
        }
        None => None,
    };

    let certificate = renew_certificate(old_certificate, &public_key, issuing_ca, extensions)
        .context(RenewCertificateSnafu)?;

    Ok(Renewal {
        certificate,
        transition,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        ErrorKind,
        ca::CertificateAuthorityHierarchy,
        ext::subject_alternative_dns_names,
        keys::Curve,
        name::common_name,
    };

    const CA_KEY_SPECIFICATION: KeySpecification = KeySpecification::Ecdsa {
        curve: Curve::Secp256r1,
    };

    fn hierarchy() -> CertificateAuthorityHierarchy {
        CertificateAuthorityHierarchy::builder()
            .base_name("Reconcile")
            .key_specification(CA_KEY_SPECIFICATION)
            .build()
            .expect("failed to build CA hierarchy")
    }

    fn csr(key_specification: &KeySpecification) -> CertReq {
        let key_pair = KeyPair::generate(key_specification).expect("failed to generate key");
        request::build(
            &common_name("ignored").expect("valid name"),
            &key_pair,
        )
        .expect("failed to build CSR")
    }

    #[test]
    fn generated_key_defaults_to_issuing_ca_specification() {
        let hierarchy = hierarchy();
        let issuance = issue_server::<&str>(
            "svc1",
            &[],
            IssuanceIntent::GenerateKey(None),
            hierarchy.issuing_ca(),
        )
        .expect("failed to issue certificate");

        let KeyMaterial::PrivateKey(key_pair) = &issuance.key_material else {
            panic!("expected a private key");
        };
        assert_eq!(key_pair.specification(), CA_KEY_SPECIFICATION);
        assert_eq!(
            issuance.certificate.tbs_certificate.subject_public_key_info,
            key_pair.public_key_info().expect("public key")
        );
    }

    #[test]
    fn generated_key_follows_explicit_specification() {
        let hierarchy = hierarchy();
        let key_specification = KeySpecification::Ecdsa {
            curve: Curve::Secp384r1,
        };
        let issuance = issue_client(
            "alice",
            IssuanceIntent::GenerateKey(Some(key_specification)),
            hierarchy.issuing_ca(),
        )
        .expect("failed to issue certificate");

        let KeyMaterial::PrivateKey(key_pair) = &issuance.key_material else {
            panic!("expected a private key");
        };
        assert_eq!(key_pair.specification(), key_specification);
    }

    #[test]
    fn client_issued_from_csr_has_no_private_key() {
        let hierarchy = hierarchy();
        let csr = csr(&CA_KEY_SPECIFICATION);
        let csr_public_key = request::public_key(&csr).clone();

        let issuance = issue_client("bob", IssuanceIntent::UseCsr(csr), hierarchy.issuing_ca())
            .expect("failed to issue certificate");

        assert_eq!(issuance.key_material.state(), KeyMaterialState::Csr);
        assert_eq!(
            issuance.certificate.tbs_certificate.subject_public_key_info,
            csr_public_key
        );
        assert_eq!(
            common_name_of(&issuance.certificate.tbs_certificate.subject).as_deref(),
            Some("bob")
        );
    }

    #[rstest]
    #[case::new_key_and_csr(
        EntityKind::Server,
        RenewalOptions { new_private_key: true, csr: Some(()), ..Default::default() },
        RenewalConflict::NewPrivateKeyAndCsr
    )]
    #[case::key_specification_without_new_key(
        EntityKind::Client,
        RenewalOptions { key_specification: Some(CA_KEY_SPECIFICATION), ..Default::default() },
        RenewalConflict::KeySpecificationWithoutNewPrivateKey
    )]
    #[case::dns_names_for_client(
        EntityKind::Client,
        RenewalOptions { dns_names: Some(vec![]), ..Default::default() },
        RenewalConflict::DnsNamesForClient
    )]
    fn conflicting_renewal_options(
        #[case] entity_kind: EntityKind,
        #[case] options: RenewalOptions<()>,
        #[case] expected: RenewalConflict,
    ) {
        assert_eq!(options.validate(entity_kind), Err(expected));
    }

    #[test]
    fn renewal_with_new_key_and_csr_is_rejected() {
        let hierarchy = hierarchy();
        let issuance = issue_client(
            "carol",
            IssuanceIntent::GenerateKey(None),
            hierarchy.issuing_ca(),
        )
        .expect("failed to issue certificate");

        let error = renew(
            EntityKind::Client,
            &issuance.certificate,
            RenewalOptions {
                new_private_key: true,
                csr: Some(csr(&CA_KEY_SPECIFICATION)),
                ..Default::default()
            },
            hierarchy.issuing_ca(),
        )
        .expect_err("conflicting options must be rejected");

        assert_eq!(error.kind(), ErrorKind::ConflictingRenewalOptions);
    }

    #[test]
    fn renewal_without_changes_keeps_the_public_key() {
        let hierarchy = hierarchy();
        let issuance = issue_server(
            "svc1",
            &["a.local"],
            IssuanceIntent::GenerateKey(None),
            hierarchy.issuing_ca(),
        )
        .expect("failed to issue certificate");

        let renewal = renew(
            EntityKind::Server,
            &issuance.certificate,
            RenewalOptions::default(),
            hierarchy.issuing_ca(),
        )
        .expect("failed to renew certificate");

        assert!(matches!(renewal.transition, KeyTransition::Unchanged));
        assert_eq!(
            renewal.certificate.tbs_certificate.subject_public_key_info,
            issuance.certificate.tbs_certificate.subject_public_key_info
        );
        assert_eq!(subject_alternative_dns_names(&renewal.certificate), vec![
            "svc1", "a.local"
        ]);
    }

    #[test]
    fn new_key_follows_the_old_certificate_specification() {
        let hierarchy = hierarchy();
        let csr_key_specification = KeySpecification::Rsa { bit_size: 1024 };
        let issuance = issue_server::<&str>(
            "svc1",
            &[],
            IssuanceIntent::UseCsr(csr(&csr_key_specification)),
            hierarchy.issuing_ca(),
        )
        .expect("failed to issue certificate");

        let renewal = renew(
            EntityKind::Server,
            &issuance.certificate,
            RenewalOptions {
                new_private_key: true,
                ..Default::default()
            },
            hierarchy.issuing_ca(),
        )
        .expect("failed to renew certificate");

        let KeyTransition::GeneratedKey(key_pair) = &renewal.transition else {
            panic!("expected a generated key");
        };
        assert_eq!(key_pair.specification(), csr_key_specification);
        assert_eq!(
            renewal.certificate.tbs_certificate.subject_public_key_info,
            key_pair.public_key_info().expect("public key")
        );
    }

    #[test]
    fn csr_replaces_the_private_key() {
        let hierarchy = hierarchy();
        let issuance = issue_client(
            "dave",
            IssuanceIntent::GenerateKey(None),
            hierarchy.issuing_ca(),
        )
        .expect("failed to issue certificate");
        let csr = csr(&CA_KEY_SPECIFICATION);
        let csr_public_key = request::public_key(&csr).clone();

        let renewal = renew(
            EntityKind::Client,
            &issuance.certificate,
            RenewalOptions {
                csr: Some(csr),
                ..Default::default()
            },
            hierarchy.issuing_ca(),
        )
        .expect("failed to renew certificate");

        assert!(matches!(renewal.transition, KeyTransition::ReplacedByCsr(_)));
        assert_eq!(
            renewal.certificate.tbs_certificate.subject_public_key_info,
            csr_public_key
        );
    }

    #[rstest]
    #[case(vec![], vec!["svc1"])]
    #[case(vec!["b.local".to_owned(), "c.local".to_owned()], vec!["svc1", "b.local", "c.local"])]
    fn updated_dns_names_rebuild_server_extensions(
        #[case] dns_names: Vec<String>,
        #[case] expected: Vec<&str>,
    ) {
        let hierarchy = hierarchy();
        let issuance = issue_server(
            "svc1",
            &["a.local"],
            IssuanceIntent::GenerateKey(None),
            hierarchy.issuing_ca(),
        )
        .expect("failed to issue certificate");

        let renewal = renew(
            EntityKind::Server,
            &issuance.certificate,
            RenewalOptions {
                dns_names: Some(dns_names),
                ..Default::default()
            },
            hierarchy.issuing_ca(),
        )
        .expect("failed to renew certificate");

        assert_eq!(subject_alternative_dns_names(&renewal.certificate), expected);
    }

    #[test]
    fn csr_conversion_happens_after_validation() {
        let options = RenewalOptions {
            csr: Some("path/to/request.csr.pem"),
            ..Default::default()
        };
        assert_eq!(options.validate(EntityKind::Server), Ok(()));

        let mapped = options
            .try_map_csr(|path| Ok::<_, ()>(path.len()))
            .expect("infallible conversion");
        assert_eq!(mapped.csr, Some(23));
    }
}
