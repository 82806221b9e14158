//! Blob storage for keys, CSRs and certificates.
use std::{
    fmt::{Debug, Display},
    fs, io,
    path::{Path, PathBuf},
};

use snafu::{ResultExt, Snafu};
use tracing::{debug, instrument};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read {}", path.display()))]
    ReadBlob { source: io::Error, path: PathBuf },

    #[snafu(display("failed to write {}", path.display()))]
    WriteBlob { source: io::Error, path: PathBuf },

    #[snafu(display("failed to remove {}", path.display()))]
    RemoveBlob { source: io::Error, path: PathBuf },

    #[snafu(display("failed to check whether {} exists", path.display()))]
    CheckBlob { source: io::Error, path: PathBuf },

    #[snafu(display("failed to create directory {}", path.display()))]
    CreateDirectory { source: io::Error, path: PathBuf },

    #[snafu(display("failed to list directory {}", path.display()))]
    ListDirectory { source: io::Error, path: PathBuf },

    #[snafu(display("{} is not valid UTF-8", path.display()))]
    InvalidUtf8 {
        source: std::string::FromUtf8Error,
        path: PathBuf,
    },
}

/// The relative location of a blob, such as `ca/level1.cert.pem`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlobKey {
    path: String,
    secret: bool,
}

impl BlobKey {
    pub fn public(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            secret: false,
        }
    }

    /// A blob only the owner may read, such as a private key.
    pub fn secret(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            secret: true,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_secret(&self) -> bool {
        self.secret
    }
}

impl Display for BlobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}

/// Key-blob capability backing a project.
pub trait Storage: Debug {
    fn exists(&self, key: &BlobKey) -> Result<bool, Error>;

    fn read(&self, key: &BlobKey) -> Result<String, Error>;

    /// Writes `contents`, replacing any previous blob.
    fn write(&self, key: &BlobKey, contents: &str) -> Result<(), Error>;

    /// Removes the blob. Removing a missing blob is not an error.
    fn remove(&self, key: &BlobKey) -> Result<(), Error>;

    /// File names of all blobs directly below `directory`, sorted.
    fn list(&self, directory: &str) -> Result<Vec<String>, Error>;

    /// A human-readable location of the blob, used when reporting artifacts.
    fn location(&self, key: &BlobKey) -> PathBuf;
}

/// Stores blobs as files below a root directory.
#[derive(Debug)]
pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &BlobKey) -> PathBuf {
        self.root.join(&key.path)
    }
}

impl Storage for DirectoryStorage {
    fn exists(&self, key: &BlobKey) -> Result<bool, Error> {
        let path = self.path_of(key);
        path.try_exists().context(CheckBlobSnafu { path })
    }

    fn read(&self, key: &BlobKey) -> Result<String, Error> {
        let path = self.path_of(key);
        let contents = fs::read(&path).context(ReadBlobSnafu { path: &path })?;
        String::from_utf8(contents).context(InvalidUtf8Snafu { path })
    }

    #[instrument(skip(self, contents), fields(key = %key))]
    fn write(&self, key: &BlobKey, contents: &str) -> Result<(), Error> {
        let path = self.path_of(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context(CreateDirectorySnafu { path: parent })?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);

        #[cfg(unix)]
        if key.secret {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&path).context(WriteBlobSnafu { path: &path })?;
        io::Write::write_all(&mut file, contents.as_bytes()).context(WriteBlobSnafu { path })?;

        debug!(secret = key.secret, "wrote blob");
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    fn remove(&self, key: &BlobKey) -> Result<(), Error> {
        let path = self.path_of(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("removed blob");
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error).context(RemoveBlobSnafu { path }),
        }
    }

    fn list(&self, directory: &str) -> Result<Vec<String>, Error> {
        let path = self.root.join(directory);
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error).context(ListDirectorySnafu { path }),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.context(ListDirectorySnafu { path: &path })?;
            if entry
                .file_type()
                .context(ListDirectorySnafu { path: &path })?
                .is_file()
            {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        names.sort();
        Ok(names)
    }

    fn location(&self, key: &BlobKey) -> PathBuf {
        self.path_of(key)
    }
}
