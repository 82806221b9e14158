use std::path::PathBuf;

use gimmecert_certs::{
    ErrorKind, ca::CreateCertificateAuthorityError, keys::ParseKeySpecificationError,
    leaf::EntityKind, reconcile::RenewalConflict,
};
use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to parse arguments"))]
    ParseArguments { source: clap::Error },

    #[snafu(display("failed to resolve project directory {}", path.display()))]
    ResolveProjectDirectory {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("CA hierarchy has already been initialised in {}", location.display()))]
    AlreadyInitialized { location: PathBuf },

    #[snafu(display(
        "CA hierarchy must be initialised prior to issuing certificates, run the init command first"
    ))]
    NotInitialized,

    #[snafu(display("refusing to overwrite existing artifacts of {entity_kind} {entity_name:?}"))]
    AlreadyIssued {
        entity_kind: EntityKind,
        entity_name: String,
    },

    #[snafu(display("no {entity_kind} certificate has been issued for {entity_name:?}"))]
    UnknownEntity {
        entity_kind: EntityKind,
        entity_name: String,
    },

    #[snafu(display("conflicting renewal options: {conflict}"))]
    ConflictingRenewalOptions { conflict: RenewalConflict },

    #[snafu(display("failed to access project storage"))]
    Storage { source: crate::storage::Error },

    #[snafu(display("failed to decode stored artifact {}", location.display()))]
    DecodeArtifact {
        source: gimmecert_certs::Error,
        location: PathBuf,
    },

    #[snafu(display("failed to load CA at level {level}"))]
    LoadCertificateAuthority {
        source: gimmecert_certs::ca::Error,
        level: usize,
    },

    #[snafu(display("failed to assemble the stored CA hierarchy"))]
    AssembleHierarchy { source: gimmecert_certs::ca::Error },

    #[snafu(display("failed to create CA hierarchy"))]
    CreateHierarchy {
        source: gimmecert_certs::ca::CreateCertificateAuthorityError,
    },

    #[snafu(display("failed to encode CA chain"))]
    EncodeChain { source: gimmecert_certs::ca::Error },

    #[snafu(display("failed to encode private key"))]
    EncodeKey { source: gimmecert_certs::keys::Error },

    #[snafu(display("failed to encode CSR"))]
    EncodeCsr {
        source: gimmecert_certs::request::Error,
    },

    #[snafu(display("failed to encode certificate"))]
    EncodeCertificate { source: gimmecert_certs::Error },

    #[snafu(display("failed to read CSR"))]
    ReadCsr { source: crate::csr_input::Error },

    #[snafu(display("failed to issue {entity_kind} certificate"))]
    Issue {
        source: gimmecert_certs::Error,
        entity_kind: EntityKind,
    },

    #[snafu(display("failed to renew {entity_kind} certificate"))]
    Renew {
        source: gimmecert_certs::Error,
        entity_kind: EntityKind,
    },

    #[snafu(display("failed to read certificate validity"))]
    ReadValidity {
        source: gimmecert_certs::validity::Error,
    },

    #[snafu(display("failed to format timestamp"))]
    FormatTime { source: time::error::Format },

    #[snafu(display("failed to write output"))]
    WriteOutput { source: std::io::Error },

    #[snafu(display("no command given"))]
    MissingCommand,

    #[snafu(display("unknown command {name:?}"))]
    UnknownCommand { name: String },
}

impl Error {
    /// Which kind of failure occurred, see [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyInitialized { .. } => ErrorKind::AlreadyInitialized,
            Self::NotInitialized => ErrorKind::NotInitialized,
            Self::AlreadyIssued { .. } => ErrorKind::AlreadyIssued,
            Self::UnknownEntity { .. } => ErrorKind::UnknownEntity,
            Self::ConflictingRenewalOptions { .. } => ErrorKind::ConflictingRenewalOptions,
            Self::ParseArguments { source } if is_key_specification_rejection(source) => {
                ErrorKind::InvalidKeySpecification
            }
            Self::CreateHierarchy {
                source: CreateCertificateAuthorityError::CreateSigningKeyPair { source, .. },
            } if source.is_invalid_specification() => ErrorKind::InvalidKeySpecification,
            Self::ReadCsr { source } => source.kind(),
            Self::DecodeArtifact { source, .. }
            | Self::Issue { source, .. }
            | Self::Renew { source, .. } => source.kind(),
            _ => ErrorKind::Other,
        }
    }

    /// The process exit code reporting this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::ParseArguments { source } => u8::try_from(source.exit_code()).unwrap_or(2),
            Self::MissingCommand | Self::UnknownCommand { .. } => 2,
            error => exit_code_of(error.kind()),
        }
    }
}

/// Whether clap refused an argument value because it isn't a valid key
/// specification.
fn is_key_specification_rejection(error: &clap::Error) -> bool {
    error.kind() == clap::error::ErrorKind::ValueValidation
        && std::error::Error::source(error)
            .is_some_and(|source| source.is::<ParseKeySpecificationError>())
}

pub fn exit_code_of(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::InvalidKeySpecification | ErrorKind::ConflictingRenewalOptions => 2,
        ErrorKind::AlreadyIssued => 3,
        ErrorKind::UnknownEntity => 4,
        ErrorKind::NotInitialized => 5,
        ErrorKind::AlreadyInitialized => 6,
        ErrorKind::MalformedCsr
        | ErrorKind::MalformedCertificate
        | ErrorKind::MalformedKey
        | ErrorKind::Other => 10,
    }
}
