//! Server and client certificate profiles, issued by the issuing CA of a
//! hierarchy.
use snafu::{ResultExt, Snafu};
use strum::{Display, EnumIter, EnumString};
use tracing::instrument;
use x509_cert::{Certificate, spki::SubjectPublicKeyInfoOwned};

use crate::{
    CertificateBuilder,
    ca::CertificateAuthority,
    cert_builder::CreateCertificateError,
    ext::ExtensionSet,
    name::common_name,
    validity::ValidityWindow,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse {entity_name:?} as subject"))]
    ParseSubject {
        source: x509_cert::der::Error,
        entity_name: String,
    },

    #[snafu(display("failed to compute validity"))]
    ComputeValidity { source: crate::validity::Error },

    #[snafu(display("failed to build certificate extensions"))]
    BuildExtensions { source: crate::ext::Error },

    #[snafu(display("failed to build certificate"))]
    BuildCertificate { source: CreateCertificateError },
}

/// The two classes of end-entity certificates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
    Server,
    Client,
}

/// The standard validity window relative to now, clamped into the window
/// of `issuing_ca`.
pub fn leaf_validity(issuing_ca: &CertificateAuthority) -> Result<ValidityWindow, Error> {
    Ok(ValidityWindow::from_now()
        .context(ComputeValiditySnafu)?
        .clamp_to(issuing_ca.validity()))
}

/// Issues a server certificate for `entity_name`. The subject alternative
/// names are `entity_name` followed by `extra_dns_names`.
#[instrument(skip(public_key, issuing_ca, extra_dns_names))]
pub fn issue_server_certificate<S>(
    entity_name: &str,
    public_key: &SubjectPublicKeyInfoOwned,
    issuing_ca: &CertificateAuthority,
    extra_dns_names: &[S],
) -> Result<Certificate, Error>
where
    S: AsRef<str>,
{
    let extensions =
        ExtensionSet::server(entity_name, extra_dns_names).context(BuildExtensionsSnafu)?;
    issue(entity_name, public_key, issuing_ca, extensions)
}

/// Issues a client certificate for `entity_name`.
#[instrument(skip(public_key, issuing_ca))]
pub fn issue_client_certificate(
    entity_name: &str,
    public_key: &SubjectPublicKeyInfoOwned,
    issuing_ca: &CertificateAuthority,
) -> Result<Certificate, Error> {
    let extensions = ExtensionSet::client().context(BuildExtensionsSnafu)?;
    issue(entity_name, public_key, issuing_ca, extensions)
}

fn issue(
    entity_name: &str,
    public_key: &SubjectPublicKeyInfoOwned,
    issuing_ca: &CertificateAuthority,
    extensions: ExtensionSet,
) -> Result<Certificate, Error> {
    let subject = common_name(entity_name).context(ParseSubjectSnafu { entity_name })?;

    CertificateBuilder::builder()
        .issuer(issuing_ca.subject_name())
        .subject(&subject)
        .signing_key(issuing_ca.signing_key())
        .subject_public_key(public_key)
        .validity(leaf_validity(issuing_ca)?)
        .extensions(extensions)
        .build()
        .context(BuildCertificateSnafu)
}

#[cfg(test)]
mod tests {
    use const_oid::{
        AssociatedOid,
        db::rfc5280::{ID_KP_CLIENT_AUTH, ID_KP_SERVER_AUTH},
    };
    use time::OffsetDateTime;
    use x509_cert::{
        der::Decode,
        ext::pkix::{ExtendedKeyUsage, SubjectAltName},
    };

    use super::*;
    use crate::{
        ca::CertificateAuthorityHierarchy,
        ext::subject_alternative_dns_names,
        keys::{Curve, KeyPair, KeySpecification},
        name::common_name_of,
    };

    const KEY_SPECIFICATION: KeySpecification = KeySpecification::Ecdsa {
        curve: Curve::Secp256r1,
    };

    fn hierarchy(validity: Option<ValidityWindow>) -> CertificateAuthorityHierarchy {
        CertificateAuthorityHierarchy::builder()
            .base_name("Leaf")
            .depth(2)
            .key_specification(KEY_SPECIFICATION)
            .maybe_validity(validity)
            .build()
            .expect("failed to build CA hierarchy")
    }

    fn extended_key_usage(certificate: &Certificate) -> ExtendedKeyUsage {
        certificate
            .tbs_certificate
            .extensions
            .iter()
            .flatten()
            .find(|extension| extension.extn_id == ExtendedKeyUsage::OID)
            .map(|extension| ExtendedKeyUsage::from_der(extension.extn_value.as_bytes()))
            .expect("EKU present")
            .expect("valid EKU")
    }

    #[test]
    fn server_certificate() {
        let hierarchy = hierarchy(None);
        let key_pair = KeyPair::generate(&KEY_SPECIFICATION).expect("failed to generate key");
        let public_key = key_pair.public_key_info().expect("public key");

        let certificate =
            issue_server_certificate("svc1", &public_key, hierarchy.issuing_ca(), &["a.local"])
                .expect("failed to issue certificate");

        let tbs = &certificate.tbs_certificate;
        assert_eq!(common_name_of(&tbs.subject).as_deref(), Some("svc1"));
        assert_eq!(&tbs.issuer, hierarchy.issuing_ca().subject_name());
        assert_eq!(tbs.subject_public_key_info, public_key);
        assert_eq!(subject_alternative_dns_names(&certificate), vec![
            "svc1", "a.local"
        ]);
        assert_eq!(extended_key_usage(&certificate).0, vec![ID_KP_SERVER_AUTH]);
    }

    #[test]
    fn client_certificate_has_no_subject_alternative_names() {
        let hierarchy = hierarchy(None);
        let key_pair = KeyPair::generate(&KEY_SPECIFICATION).expect("failed to generate key");
        let public_key = key_pair.public_key_info().expect("public key");

        let certificate = issue_client_certificate("alice", &public_key, hierarchy.issuing_ca())
            .expect("failed to issue certificate");

        assert!(subject_alternative_dns_names(&certificate).is_empty());
        assert!(
            certificate
                .tbs_certificate
                .extensions
                .iter()
                .flatten()
                .all(|extension| extension.extn_id != SubjectAltName::OID)
        );
        assert_eq!(extended_key_usage(&certificate).0, vec![ID_KP_CLIENT_AUTH]);
    }

    #[test]
    fn validity_is_clamped_into_the_issuing_ca() {
        let now = OffsetDateTime::now_utc();
        let ca_validity = ValidityWindow::new(
            now - time::Duration::minutes(5),
            now + time::Duration::days(30),
        );
        let hierarchy = hierarchy(Some(ca_validity));
        let key_pair = KeyPair::generate(&KEY_SPECIFICATION).expect("failed to generate key");
        let public_key = key_pair.public_key_info().expect("public key");

        let certificate =
            issue_client_certificate("bob", &public_key, hierarchy.issuing_ca())
                .expect("failed to issue certificate");
        let ca_validity = hierarchy.issuing_ca().validity();
        let validity = ValidityWindow::of_certificate(&certificate).expect("valid validity");

        assert_eq!(validity.not_before(), ca_validity.not_before());
        assert_eq!(validity.not_after(), ca_validity.not_after());
    }

    #[test]
    fn validity_within_a_long_lived_issuing_ca_is_the_standard_window() {
        let hierarchy = hierarchy(None);
        let key_pair = KeyPair::generate(&KEY_SPECIFICATION).expect("failed to generate key");
        let public_key = key_pair.public_key_info().expect("public key");

        let certificate =
            issue_server_certificate::<&str>("svc2", &public_key, hierarchy.issuing_ca(), &[])
                .expect("failed to issue certificate");
        let ca_validity = hierarchy.issuing_ca().validity();
        let validity = ValidityWindow::of_certificate(&certificate).expect("valid validity");

        assert!(validity.not_before() >= ca_validity.not_before());
        assert!(validity.not_after() <= ca_validity.not_after());
        assert_eq!(subject_alternative_dns_names(&certificate), vec!["svc2"]);
    }

    #[test]
    fn entity_kind_names() {
        assert_eq!(EntityKind::Server.to_string(), "server");
        assert_eq!("client".parse::<EntityKind>(), Ok(EntityKind::Client));
    }
}
