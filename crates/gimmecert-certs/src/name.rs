//! Helpers for the distinguished names used by this crate. Every subject
//! and issuer consists of a single common name (CN) attribute.
use const_oid::db::rfc4519::CN;
use x509_cert::{
    attr::AttributeTypeAndValue,
    der::{
        self,
        asn1::{Any, SetOfVec, Utf8StringRef},
    },
    name::{Name, RdnSequence, RelativeDistinguishedName},
};

/// Builds a distinguished name holding the single attribute `CN=<common_name>`.
pub fn common_name(common_name: &str) -> der::Result<Name> {
    let attribute = AttributeTypeAndValue {
        oid: CN,
        value: Any::encode_from(&Utf8StringRef::new(common_name)?)?,
    };
    let rdn = RelativeDistinguishedName(SetOfVec::try_from(vec![attribute])?);

    Ok(RdnSequence(vec![rdn]))
}

/// Returns the first common name attribute of `name`, if any.
pub fn common_name_of(name: &Name) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|attribute| attribute.oid == CN)
        .and_then(|attribute| attribute.value.decode_as::<String>().ok())
}
