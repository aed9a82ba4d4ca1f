//! Writing issued certificates to disk

use crate::{
    certificate::CertificateResource,
    error::{Error, Result},
};
use chrono::Datelike;
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::{debug, info};
use uuid::Uuid;

/// File name of the certificate's private key
pub const FILE_PRIVATE_KEY: &str = "private-key";
/// File name of the certificate, bundled with its issuer chain
pub const FILE_CERTIFICATE: &str = "certificate";
/// File name of the issuer chain
pub const FILE_ISSUER_CERTIFICATE: &str = "issuer-certificate";
/// File name of the certificate signing request
pub const FILE_CSR: &str = "csr";

#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Where the artifacts of an issued certificate are written
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StorageLayout {
    /// Directly into an existing directory
    Flat(PathBuf),
    /// Into `{base}/{domain}/{year}/{month}/{day}`, keyed by the certificate's
    /// domain and not-before date
    Dated(PathBuf),
}

impl StorageLayout {
    /// Resolve the directory the artifacts of the certificate belong in
    pub fn directory(&self, resource: &CertificateResource) -> Result<PathBuf> {
        match self {
            Self::Flat(dir) => Ok(dir.clone()),
            Self::Dated(base) => {
                let metadata = resource.metadata()?;
                Ok(base
                    .join(&metadata.domain)
                    .join(metadata.not_before.year().to_string())
                    .join(metadata.not_before.month().to_string())
                    .join(metadata.not_before.day().to_string()))
            }
        }
    }

    /// Write the four artifacts of the certificate, returning the directory they were written
    /// to.
    ///
    /// A flat directory must already exist, dated directories are created as needed.
    pub async fn write(&self, resource: &CertificateResource) -> Result<PathBuf> {
        let dir = self.directory(resource)?;
        if let Self::Dated(_) = self {
            fs::create_dir_all(&dir).await?;
        }

        write_artifacts(&dir, resource).await?;
        info!(dir = %dir.display(), domains = ?resource.domains, "stored certificate");

        Ok(dir)
    }
}

/// Write all four artifacts into the directory.
///
/// Every artifact is staged next to its destination first. If any of them cannot be staged,
/// the staged files are removed and nothing in the directory changes.
pub async fn write_artifacts(dir: &Path, resource: &CertificateResource) -> Result<()> {
    let artifacts = [
        (FILE_PRIVATE_KEY, &resource.private_key),
        (FILE_CERTIFICATE, &resource.certificate),
        (FILE_ISSUER_CERTIFICATE, &resource.issuer_certificate),
        (FILE_CSR, &resource.csr),
    ];

    let mut staged = Vec::with_capacity(artifacts.len());
    for (name, contents) in artifacts {
        match stage(dir, name, contents).await {
            Ok(path) => staged.push((path, dir.join(name))),
            Err(e) => {
                discard(staged.iter().map(|(path, _)| path.as_path())).await;
                return Err(Error::Io(e));
            }
        }
    }

    for (i, (from, to)) in staged.iter().enumerate() {
        if let Err(e) = fs::rename(from, to).await {
            discard(staged[i..].iter().map(|(path, _)| path.as_path())).await;
            return Err(Error::Io(e));
        }
        debug!(path = %to.display(), "wrote artifact");
    }

    Ok(())
}

/// Write the contents to a uniquely named hidden file in the directory, returning its path
pub(crate) async fn stage(dir: &Path, name: &str, contents: &[u8]) -> io::Result<PathBuf> {
    let path = dir.join(format!(".{name}.{}.tmp", Uuid::new_v4().simple()));

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(FILE_MODE);

    let mut file = options.open(&path).await?;
    let written = async {
        file.write_all(contents).await?;
        file.sync_all().await
    }
    .await;

    if let Err(e) = written {
        drop(file);
        let _ = fs::remove_file(&path).await;
        return Err(e);
    }

    Ok(path)
}

async fn discard<'p>(paths: impl Iterator<Item = &'p Path>) {
    for path in paths {
        let _ = fs::remove_file(path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        StorageLayout, FILE_CERTIFICATE, FILE_CSR, FILE_ISSUER_CERTIFICATE, FILE_PRIVATE_KEY,
    };
    use crate::{
        test::{resource, CertificateFixture},
        Error,
    };
    use std::{fs, path::Path};

    fn assert_artifacts(dir: &Path, resource: &crate::CertificateResource) {
        assert_eq!(fs::read(dir.join(FILE_PRIVATE_KEY)).unwrap(), resource.private_key);
        assert_eq!(fs::read(dir.join(FILE_CERTIFICATE)).unwrap(), resource.certificate);
        assert_eq!(
            fs::read(dir.join(FILE_ISSUER_CERTIFICATE)).unwrap(),
            resource.issuer_certificate
        );
        assert_eq!(fs::read(dir.join(FILE_CSR)).unwrap(), resource.csr);
    }

    #[tokio::test]
    async fn flat() {
        let dir = tempfile::tempdir().unwrap();
        let resource = resource(CertificateFixture {
            common_name: None,
            sans: &["flat.example.com"],
            not_before: (2024, 3, 5),
        });

        let written = StorageLayout::Flat(dir.path().to_owned())
            .write(&resource)
            .await
            .unwrap();

        assert_eq!(written, dir.path());
        assert_artifacts(dir.path(), &resource);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 4);
    }

    #[tokio::test]
    async fn flat_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(FILE_CERTIFICATE), b"old").unwrap();
        let resource = resource(CertificateFixture {
            common_name: None,
            sans: &["flat.example.com"],
            not_before: (2024, 3, 5),
        });

        StorageLayout::Flat(dir.path().to_owned())
            .write(&resource)
            .await
            .unwrap();
        assert_artifacts(dir.path(), &resource);
    }

    #[tokio::test]
    async fn flat_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let resource = resource(CertificateFixture {
            common_name: None,
            sans: &["flat.example.com"],
            not_before: (2024, 3, 5),
        });

        let error = StorageLayout::Flat(missing.clone())
            .write(&resource)
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Io(_)));
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn dated() {
        let dir = tempfile::tempdir().unwrap();
        let resource = resource(CertificateFixture {
            common_name: None,
            sans: &["x.example.com"],
            not_before: (2024, 3, 5),
        });

        let written = StorageLayout::Dated(dir.path().to_owned())
            .write(&resource)
            .await
            .unwrap();

        let expected = dir.path().join("x.example.com").join("2024").join("3").join("5");
        assert_eq!(written, expected);
        assert_artifacts(&expected, &resource);
    }

    #[tokio::test]
    async fn dated_without_domains() {
        let dir = tempfile::tempdir().unwrap();
        let resource = resource(CertificateFixture {
            common_name: None,
            sans: &[],
            not_before: (2024, 3, 5),
        });

        let error = StorageLayout::Dated(dir.path().to_owned())
            .write(&resource)
            .await
            .unwrap_err();

        assert!(matches!(error, Error::MissingDomain));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn dated_directory_uses_unpadded_dates() {
        let resource = resource(CertificateFixture {
            common_name: Some("cn.example.com"),
            sans: &["san.example.com"],
            not_before: (2025, 11, 9),
        });

        let dir = StorageLayout::Dated("/base".into())
            .directory(&resource)
            .unwrap();
        assert_eq!(dir, Path::new("/base/cn.example.com/2025/11/9"));
    }
}
