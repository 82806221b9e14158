//! Certificate extension sets for the three certificate classes issued by
//! this crate: CAs, servers and clients.
use const_oid::{
    AssociatedOid,
    db::rfc5280::{ID_KP_CLIENT_AUTH, ID_KP_SERVER_AUTH},
};
use snafu::{ResultExt, Snafu};
use x509_cert::{
    Certificate,
    der::{
        Encode,
        asn1::{Ia5String, OctetString},
    },
    ext::{
        Extension,
        pkix::{
            BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages, SubjectAltName,
            name::GeneralName,
        },
    },
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to encode certificate extension"))]
    EncodeExtension { source: x509_cert::der::Error },

    #[snafu(display(
        "failed to parse subject alternative DNS name \"{subject_alternative_dns_name}\" as a Ia5 string"
    ))]
    ParseSubjectAlternativeDnsName {
        subject_alternative_dns_name: String,
        source: x509_cert::der::Error,
    },
}

/// Ordered sequence of `(extension value, critical)` pairs attached to a
/// certificate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtensionSet(Vec<Extension>);

impl ExtensionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` with the given criticality.
    pub fn push<E>(&mut self, value: &E, critical: bool) -> Result<(), Error>
    where
        E: AssociatedOid + Encode,
    {
        let extn_value = value.to_der().context(EncodeExtensionSnafu)?;
        self.0.push(Extension {
            extn_id: E::OID,
            critical,
            extn_value: OctetString::new(extn_value).context(EncodeExtensionSnafu)?,
        });

        Ok(())
    }

    /// `BasicConstraints(ca = true)` without path length, marked critical.
    pub fn certificate_authority() -> Result<Self, Error> {
        let mut extensions = Self::new();
        extensions.push(
            &BasicConstraints {
                ca: true,
                path_len_constraint: None,
            },
            true,
        )?;

        Ok(extensions)
    }

    /// The server profile. The subject alternative names list `entity_name`
    /// first, followed by `extra_dns_names` in the given order.
    pub fn server<S>(entity_name: &str, extra_dns_names: &[S]) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let mut extensions = Self::end_entity(ID_KP_SERVER_AUTH)?;

        let sans = std::iter::once(entity_name)
            .chain(extra_dns_names.iter().map(AsRef::as_ref))
            .map(|dns_name| {
                Ok(GeneralName::DnsName(Ia5String::new(dns_name).with_context(
                    |_| ParseSubjectAlternativeDnsNameSnafu {
                        subject_alternative_dns_name: dns_name.to_string(),
                    },
                )?))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        extensions.push(&SubjectAltName(sans), false)?;

        Ok(extensions)
    }

    /// The client profile, the server profile without subject alternative
    /// names and with client authentication as extended key usage.
    pub fn client() -> Result<Self, Error> {
        Self::end_entity(ID_KP_CLIENT_AUTH)
    }

    /// Copies the extensions of an existing certificate verbatim.
    pub fn from_certificate(certificate: &Certificate) -> Self {
        Self(
            certificate
                .tbs_certificate
                .extensions
                .clone()
                .unwrap_or_default(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts into the optional extensions field of a TBS certificate. An
    /// empty set omits the field.
    pub fn into_extensions(self) -> Option<Vec<Extension>> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0)
        }
    }

    // BasicConstraints, KeyUsage and ExtendedKeyUsage shared by servers and
    // clients, all critical.
    fn end_entity(extended_key_usage: const_oid::ObjectIdentifier) -> Result<Self, Error> {
        let mut extensions = Self::new();
        extensions.push(
            &BasicConstraints {
                ca: false,
                path_len_constraint: None,
            },
            true,
        )?;
        extensions.push(
            &KeyUsage(KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment),
            true,
        )?;
        extensions.push(&ExtendedKeyUsage(vec![extended_key_usage]), true)?;

        Ok(extensions)
    }
}

/// Returns the DNS names of the subject alternative name extension of
/// `certificate`, in order.
pub fn subject_alternative_dns_names(certificate: &Certificate) -> Vec<String> {
    use x509_cert::der::Decode;

    ExtensionSet::from_certificate(certificate)
        .iter()
        .filter(|extension| extension.extn_id == SubjectAltName::OID)
        .filter_map(|extension| SubjectAltName::from_der(extension.extn_value.as_bytes()).ok())
        .flat_map(|san| san.0)
        .filter_map(|name| match name {
            GeneralName::DnsName(dns_name) => Some(dns_name.to_string()),
            _ => None,
        })
        .collect()
}
