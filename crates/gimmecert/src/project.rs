//! Typed access to the artifacts of a project.
use std::{fs, path::Path};

use gimmecert_certs::{
    CertificatePair,
    ca::{CertificateAuthority, CertificateAuthorityHierarchy},
    certificate_from_pem, certificate_to_pem,
    leaf::EntityKind,
    reconcile::{Issuance, KeyMaterial, KeyMaterialState, KeyTransition, Renewal},
    request,
};
use snafu::{ResultExt, ensure};
use tracing::{debug, instrument};
use x509_cert::Certificate;

use crate::{
    error::{
        AlreadyInitializedSnafu, AlreadyIssuedSnafu, AssembleHierarchySnafu, DecodeArtifactSnafu,
        EncodeCertificateSnafu, EncodeChainSnafu, EncodeCsrSnafu, EncodeKeySnafu,
        LoadCertificateAuthoritySnafu, NotInitializedSnafu, ResolveProjectDirectorySnafu, Result,
        StorageSnafu, UnknownEntitySnafu,
    },
    layout,
    storage::{BlobKey, DirectoryStorage, Storage},
};

/// Which artifacts a command wrote and removed, in order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub written: Vec<(String, BlobKey)>,
    pub removed: Vec<BlobKey>,
}

impl Artifacts {
    fn written(&mut self, description: impl Into<String>, key: BlobKey) {
        self.written.push((description.into(), key));
    }
}

/// An issued server or client certificate as found in storage.
#[derive(Debug)]
pub struct StoredEntity {
    pub name: String,
    pub certificate: Certificate,
    pub key_material: Option<KeyMaterialState>,
}

/// A project directory and the artifacts stored below its state directory.
#[derive(Debug)]
pub struct Project {
    name: String,
    storage: Box<dyn Storage>,
}

impl Project {
    /// Opens the project in `directory`. Its artifacts live below
    /// `directory/.gimmecert`.
    pub fn open(directory: &Path) -> Result<Self> {
        let directory = fs::canonicalize(directory).context(ResolveProjectDirectorySnafu {
            path: directory,
        })?;
        let name = directory
            .file_name()
            .map_or_else(|| directory.display().to_string(), |name| {
                name.to_string_lossy().into_owned()
            });

        Ok(Self::with_storage(
            name,
            Box::new(DirectoryStorage::new(directory.join(layout::STATE_DIRECTORY))),
        ))
    }

    pub fn with_storage(name: impl Into<String>, storage: Box<dyn Storage>) -> Self {
        Self {
            name: name.into(),
            storage,
        }
    }

    /// The name of the project directory, the default CA base name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self, key: &BlobKey) -> std::path::PathBuf {
        self.storage.location(key)
    }

    pub fn is_initialized(&self) -> Result<bool> {
        self.exists(&layout::ca_chain())
    }

    /// Fails with `AlreadyInitialized` if a hierarchy exists.
    pub fn ensure_uninitialized(&self) -> Result<()> {
        let chain = layout::ca_chain();
        ensure!(
            !self.exists(&chain)?,
            AlreadyInitializedSnafu {
                location: self.location(&chain),
            }
        );
        Ok(())
    }

    /// Persists all levels and the chain. The chain is written last and
    /// marks the project as initialized.
    #[instrument(skip_all, fields(depth = hierarchy.depth()))]
    pub fn save_hierarchy(&self, hierarchy: &CertificateAuthorityHierarchy) -> Result<Artifacts> {
        let mut artifacts = Artifacts::default();

        for (index, ca) in hierarchy.levels().enumerate() {
            let level = index + 1;

            let key = layout::ca_key(level);
            let key_pem = ca.signing_key().to_pem().context(EncodeKeySnafu)?;
            self.write(&key, &key_pem)?;
            artifacts.written(format!("CA Level {level} private key"), key);

            let certificate = layout::ca_certificate(level);
            let certificate_pem =
                certificate_to_pem(ca.ca_cert()).context(EncodeCertificateSnafu)?;
            self.write(&certificate, &certificate_pem)?;
            artifacts.written(format!("CA Level {level} certificate"), certificate);
        }

        let chain = layout::ca_chain();
        self.write(&chain, &hierarchy.chain_pem().context(EncodeChainSnafu)?)?;
        artifacts.written("Full certificate chain", chain);

        Ok(artifacts)
    }

    /// Loads all CA levels, fails with `NotInitialized` without a hierarchy.
    #[instrument(skip_all)]
    pub fn load_hierarchy(&self) -> Result<CertificateAuthorityHierarchy> {
        ensure!(self.is_initialized()?, NotInitializedSnafu);

        let mut levels = Vec::new();
        for level in 1.. {
            let certificate = layout::ca_certificate(level);
            if !self.exists(&certificate)? {
                break;
            }

            let key = layout::ca_key(level);
            let certificate_pair =
                CertificatePair::from_pem(&self.read(&certificate)?, &self.read(&key)?)
                    .context(DecodeArtifactSnafu {
                        location: self.location(&certificate),
                    })?;
            levels.push(
                CertificateAuthority::new(certificate_pair)
                    .context(LoadCertificateAuthoritySnafu { level })?,
            );
        }

        debug!(depth = levels.len(), "loaded CA hierarchy");
        CertificateAuthorityHierarchy::from_levels(levels).context(AssembleHierarchySnafu)
    }

    /// Whether any artifact of the entity exists.
    pub fn entity_exists(&self, entity_kind: EntityKind, entity_name: &str) -> Result<bool> {
        for key in [
            layout::entity_key(entity_kind, entity_name),
            layout::entity_csr(entity_kind, entity_name),
            layout::entity_certificate(entity_kind, entity_name),
        ] {
            if self.exists(&key)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Fails with `AlreadyIssued` if any artifact of the entity exists.
    pub fn ensure_not_issued(&self, entity_kind: EntityKind, entity_name: &str) -> Result<()> {
        ensure!(
            !self.entity_exists(entity_kind, entity_name)?,
            AlreadyIssuedSnafu {
                entity_kind,
                entity_name,
            }
        );
        Ok(())
    }

    /// Loads the certificate of an entity, fails with `UnknownEntity` if it
    /// was never issued.
    pub fn load_certificate(
        &self,
        entity_kind: EntityKind,
        entity_name: &str,
    ) -> Result<Certificate> {
        let key = layout::entity_certificate(entity_kind, entity_name);
        ensure!(
            self.exists(&key)?,
            UnknownEntitySnafu {
                entity_kind,
                entity_name,
            }
        );

        certificate_from_pem(&self.read(&key)?).context(DecodeArtifactSnafu {
            location: self.location(&key),
        })
    }

    /// Which key material backs the entity, if any.
    pub fn key_material_state(
        &self,
        entity_kind: EntityKind,
        entity_name: &str,
    ) -> Result<Option<KeyMaterialState>> {
        if self.exists(&layout::entity_key(entity_kind, entity_name))? {
            Ok(Some(KeyMaterialState::PrivateKey))
        } else if self.exists(&layout::entity_csr(entity_kind, entity_name))? {
            Ok(Some(KeyMaterialState::Csr))
        } else {
            Ok(None)
        }
    }

    #[instrument(skip(self, issuance))]
    pub fn save_issuance(
        &self,
        entity_kind: EntityKind,
        entity_name: &str,
        issuance: &Issuance,
    ) -> Result<Artifacts> {
        let mut artifacts = Artifacts::default();

        match &issuance.key_material {
            KeyMaterial::PrivateKey(key_pair) => {
                let key = layout::entity_key(entity_kind, entity_name);
                self.write(&key, &key_pair.to_pem().context(EncodeKeySnafu)?)?;
                artifacts.written(format!("{entity_kind} private key"), key);
            }
            KeyMaterial::Csr(csr) => {
                let key = layout::entity_csr(entity_kind, entity_name);
                self.write(&key, &request::to_pem(csr).context(EncodeCsrSnafu)?)?;
                artifacts.written(format!("{entity_kind} CSR"), key);
            }
        }

        self.save_certificate(entity_kind, entity_name, &issuance.certificate, &mut artifacts)?;
        Ok(artifacts)
    }

    /// Persists a renewal. A generated private key replaces any CSR, a CSR
    /// replaces any private key.
    #[instrument(skip(self, renewal))]
    pub fn save_renewal(
        &self,
        entity_kind: EntityKind,
        entity_name: &str,
        renewal: &Renewal,
    ) -> Result<Artifacts> {
        let mut artifacts = Artifacts::default();

        let stale = match &renewal.transition {
            KeyTransition::Unchanged => None,
            KeyTransition::GeneratedKey(key_pair) => {
                let key = layout::entity_key(entity_kind, entity_name);
                self.write(&key, &key_pair.to_pem().context(EncodeKeySnafu)?)?;
                artifacts.written(format!("{entity_kind} private key"), key);
                Some(layout::entity_csr(entity_kind, entity_name))
            }
            KeyTransition::ReplacedByCsr(csr) => {
                let key = layout::entity_csr(entity_kind, entity_name);
                self.write(&key, &request::to_pem(csr).context(EncodeCsrSnafu)?)?;
                artifacts.written(format!("{entity_kind} CSR"), key);
                Some(layout::entity_key(entity_kind, entity_name))
            }
        };

        self.save_certificate(entity_kind, entity_name, &renewal.certificate, &mut artifacts)?;

        if let Some(stale) = stale {
            if self.exists(&stale)? {
                self.storage.remove(&stale).context(StorageSnafu)?;
                artifacts.removed.push(stale);
            }
        }

        Ok(artifacts)
    }

    /// All issued certificates of `entity_kind`, sorted by name.
    pub fn entities(&self, entity_kind: EntityKind) -> Result<Vec<StoredEntity>> {
        let file_names = self
            .storage
            .list(layout::entity_directory(entity_kind))
            .context(StorageSnafu)?;

        file_names
            .iter()
            .filter_map(|file_name| layout::entity_name_of_certificate(file_name))
            .map(|entity_name| {
                Ok(StoredEntity {
                    name: entity_name.to_owned(),
                    certificate: self.load_certificate(entity_kind, entity_name)?,
                    key_material: self.key_material_state(entity_kind, entity_name)?,
                })
            })
            .collect()
    }

    fn save_certificate(
        &self,
        entity_kind: EntityKind,
        entity_name: &str,
        certificate: &Certificate,
        artifacts: &mut Artifacts,
    ) -> Result<()> {
        let key = layout::entity_certificate(entity_kind, entity_name);
        let certificate_pem = certificate_to_pem(certificate).context(EncodeCertificateSnafu)?;
        self.write(&key, &certificate_pem)?;
        artifacts.written(format!("{entity_kind} certificate"), key);
        Ok(())
    }

    fn exists(&self, key: &BlobKey) -> Result<bool> {
        self.storage.exists(key).context(StorageSnafu)
    }

    fn read(&self, key: &BlobKey) -> Result<String> {
        self.storage.read(key).context(StorageSnafu)
    }

    fn write(&self, key: &BlobKey, contents: &str) -> Result<()> {
        self.storage.write(key, contents).context(StorageSnafu)
    }
}

#[cfg(test)]
mod tests {
    use gimmecert_certs::{
        ErrorKind,
        keys::{Curve, KeyPair, KeySpecification},
        name::common_name,
        reconcile::{self, IssuanceIntent, RenewalOptions},
    };

    use super::*;

    const KEY_SPECIFICATION: KeySpecification = KeySpecification::Ecdsa {
        curve: Curve::Secp256r1,
    };

    fn initialized_project(directory: &Path) -> Project {
        let project = Project::open(directory).expect("failed to open project");
        let hierarchy = CertificateAuthorityHierarchy::builder()
            .base_name("Project")
            .depth(2)
            .key_specification(KEY_SPECIFICATION)
            .build()
            .expect("failed to build CA hierarchy");
        project
            .save_hierarchy(&hierarchy)
            .expect("failed to save hierarchy");
        project
    }

    #[test]
    fn project_name_is_the_directory_name() {
        let directory = tempfile::tempdir().expect("failed to create temporary directory");
        let project_directory = directory.path().join("my-project");
        fs::create_dir(&project_directory).expect("failed to create directory");

        let project = Project::open(&project_directory).expect("failed to open project");
        assert_eq!(project.name(), "my-project");
    }

    #[test]
    fn hierarchy_round_trip() {
        let directory = tempfile::tempdir().expect("failed to create temporary directory");
        let project = Project::open(directory.path()).expect("failed to open project");

        assert!(!project.is_initialized().expect("initialized check"));
        assert_eq!(
            project.load_hierarchy().expect_err("must fail").kind(),
            ErrorKind::NotInitialized
        );

        let project = initialized_project(directory.path());
        assert_eq!(
            project.ensure_uninitialized().expect_err("must fail").kind(),
            ErrorKind::AlreadyInitialized
        );

        let hierarchy = project.load_hierarchy().expect("failed to load hierarchy");
        assert_eq!(hierarchy.depth(), 2);
    }

    #[test]
    fn renewal_with_csr_removes_private_key() {
        let directory = tempfile::tempdir().expect("failed to create temporary directory");
        let project = initialized_project(directory.path());
        let hierarchy = project.load_hierarchy().expect("failed to load hierarchy");

        let issuance = reconcile::issue_client(
            "alice",
            IssuanceIntent::GenerateKey(None),
            hierarchy.issuing_ca(),
        )
        .expect("failed to issue certificate");
        project
            .save_issuance(EntityKind::Client, "alice", &issuance)
            .expect("failed to save issuance");
        assert_eq!(
            project
                .key_material_state(EntityKind::Client, "alice")
                .expect("state"),
            Some(KeyMaterialState::PrivateKey)
        );

        let key_pair = KeyPair::generate(&KEY_SPECIFICATION).expect("failed to generate key");
        let csr = request::build(&common_name("alice").expect("valid name"), &key_pair)
            .expect("failed to build CSR");
        let renewal = reconcile::renew(
            EntityKind::Client,
            &issuance.certificate,
            RenewalOptions {
                csr: Some(csr),
                ..Default::default()
            },
            hierarchy.issuing_ca(),
        )
        .expect("failed to renew certificate");

        let artifacts = project
            .save_renewal(EntityKind::Client, "alice", &renewal)
            .expect("failed to save renewal");
        assert_eq!(artifacts.removed, vec![layout::entity_key(
            EntityKind::Client,
            "alice"
        )]);
        assert_eq!(
            project
                .key_material_state(EntityKind::Client, "alice")
                .expect("state"),
            Some(KeyMaterialState::Csr)
        );

        let entities = project.entities(EntityKind::Client).expect("entities");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "alice");
        assert_eq!(entities[0].certificate, renewal.certificate);
    }

    #[test]
    fn unknown_entity() {
        let directory = tempfile::tempdir().expect("failed to create temporary directory");
        let project = initialized_project(directory.path());

        assert_eq!(
            project
                .load_certificate(EntityKind::Server, "nope")
                .expect_err("must fail")
                .kind(),
            ErrorKind::UnknownEntity
        );
        project
            .ensure_not_issued(EntityKind::Server, "nope")
            .expect("nothing issued yet");
    }
}
