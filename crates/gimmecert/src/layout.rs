//! Names of the blobs below the `.gimmecert` state directory.
use gimmecert_certs::leaf::EntityKind;
use snafu::{Snafu, ensure};

use crate::storage::BlobKey;

/// The state directory inside a project directory.
pub const STATE_DIRECTORY: &str = ".gimmecert";

pub const CA_DIRECTORY: &str = "ca";

const CERTIFICATE_SUFFIX: &str = ".cert.pem";
const CSR_SUFFIX: &str = ".csr.pem";
const KEY_SUFFIX: &str = ".key.pem";

pub fn ca_key(level: usize) -> BlobKey {
    BlobKey::secret(format!("{CA_DIRECTORY}/level{level}{KEY_SUFFIX}"))
}

pub fn ca_certificate(level: usize) -> BlobKey {
    BlobKey::public(format!("{CA_DIRECTORY}/level{level}{CERTIFICATE_SUFFIX}"))
}

/// All CA certificates, root first.
pub fn ca_chain() -> BlobKey {
    BlobKey::public(format!("{CA_DIRECTORY}/chain-full{CERTIFICATE_SUFFIX}"))
}

/// The directory holding all artifacts of one entity kind.
pub fn entity_directory(entity_kind: EntityKind) -> &'static str {
    match entity_kind {
        EntityKind::Server => "server",
        EntityKind::Client => "client",
    }
}

#[derive(Debug, Snafu)]
#[snafu(display(
    "invalid entity name {name:?}, expected a single file name without path separators"
))]
pub struct InvalidEntityNameError {
    name: String,
}

/// Parses an entity name given on the command line. Entity names become file
/// names inside the entity directory, so they must not leave it.
pub fn parse_entity_name(input: &str) -> Result<String, InvalidEntityNameError> {
    ensure!(
        !input.is_empty()
            && input != "."
            && input != ".."
            && !input.contains(['/', '\\', '\0']),
        InvalidEntityNameSnafu { name: input }
    );

    Ok(input.to_owned())
}

pub fn entity_key(entity_kind: EntityKind, entity_name: &str) -> BlobKey {
    BlobKey::secret(format!(
        "{directory}/{entity_name}{KEY_SUFFIX}",
        directory = entity_directory(entity_kind)
    ))
}

pub fn entity_csr(entity_kind: EntityKind, entity_name: &str) -> BlobKey {
    BlobKey::public(format!(
        "{directory}/{entity_name}{CSR_SUFFIX}",
        directory = entity_directory(entity_kind)
    ))
}

pub fn entity_certificate(entity_kind: EntityKind, entity_name: &str) -> BlobKey {
    BlobKey::public(format!(
        "{directory}/{entity_name}{CERTIFICATE_SUFFIX}",
        directory = entity_directory(entity_kind)
    ))
}

/// The entity name of a certificate file name, `None` for other files.
pub fn entity_name_of_certificate(file_name: &str) -> Option<&str> {
    file_name.strip_suffix(CERTIFICATE_SUFFIX)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn ca_blobs() {
        assert_eq!(ca_key(2).path(), "ca/level2.key.pem");
        assert!(ca_key(2).is_secret());
        assert_eq!(ca_certificate(1).path(), "ca/level1.cert.pem");
        assert_eq!(ca_chain().path(), "ca/chain-full.cert.pem");
    }

    #[rstest]
    #[case(EntityKind::Server, "server/svc1.key.pem", "server/svc1.csr.pem", "server/svc1.cert.pem")]
    #[case(EntityKind::Client, "client/svc1.key.pem", "client/svc1.csr.pem", "client/svc1.cert.pem")]
    fn entity_blobs(
        #[case] entity_kind: EntityKind,
        #[case] key: &str,
        #[case] csr: &str,
        #[case] certificate: &str,
    ) {
        assert_eq!(entity_key(entity_kind, "svc1").path(), key);
        assert_eq!(entity_csr(entity_kind, "svc1").path(), csr);
        assert_eq!(entity_certificate(entity_kind, "svc1").path(), certificate);
    }

    #[rstest]
    #[case("svc1")]
    #[case("alice.example.com")]
    #[case("..svc")]
    fn accept_entity_names(#[case] input: &str) {
        assert_eq!(parse_entity_name(input).expect("valid entity name"), input);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case("../../escaped")]
    #[case("nested/svc1")]
    #[case("/etc/passwd")]
    #[case("..\\escaped")]
    fn reject_entity_names_leaving_the_entity_directory(#[case] input: &str) {
        assert!(parse_entity_name(input).is_err());
    }

    #[test]
    fn entity_names_of_certificates() {
        assert_eq!(entity_name_of_certificate("svc1.cert.pem"), Some("svc1"));
        assert_eq!(entity_name_of_certificate("svc1.key.pem"), None);
    }
}
