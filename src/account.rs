use crate::{
    error::{Error, Result},
    storage,
};
use bincode::{config, Decode, Encode};
use openssl::pkey::{PKey, Private};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::debug;

const EXTENSION: &str = "account";

/// A registered ACME account.
///
/// Holds everything needed to re-authenticate against the server on a later run. The server
/// identifies an account by its key, so the private key the account was registered with is
/// what makes the record reusable.
#[derive(Clone, Debug, Decode, Encode, Eq, PartialEq)]
pub struct Account {
    /// The email the account was registered for
    pub email: String,
    /// The URL of the ACME directory the account was registered with
    pub directory: String,
    /// Contact URLs sent with the registration
    pub contacts: Vec<String>,
    /// Whether the terms of service were agreed to
    pub terms_of_service_agreed: bool,
    /// The account key in PEM PKCS#8 format
    pub private_key_pem: Vec<u8>,
}

impl Account {
    /// Decode the account's private key
    pub fn private_key(&self) -> Result<PKey<Private>> {
        Ok(PKey::private_key_from_pem(&self.private_key_pem)?)
    }
}

/// Persists one [`Account`] per email as `{dir}/{email}.account`.
///
/// There is no locking: two processes registering the same email at the same time can both
/// persist an account, and the last rename wins.
#[derive(Clone, Debug)]
pub struct AccountStore {
    dir: PathBuf,
}

impl AccountStore {
    /// Create a store rooted at the given directory
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        AccountStore { dir: dir.into() }
    }

    /// The directory accounts are stored in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the account for an email is stored
    pub fn path_for(&self, email: &str) -> Result<PathBuf> {
        Ok(self.dir.join(file_name(email)?))
    }

    /// Encode and write the account, replacing any existing one for the email.
    pub async fn save(&self, email: &str, account: &Account) -> Result<()> {
        let name = file_name(email)?;
        let encoded = bincode::encode_to_vec(account, config::standard())?;

        fs::create_dir_all(&self.dir).await?;
        let staged = storage::stage(&self.dir, &name, &encoded).await?;
        let path = self.dir.join(&name);
        if let Err(e) = fs::rename(&staged, &path).await {
            let _ = fs::remove_file(&staged).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), "saved account");
        Ok(())
    }

    /// Read and decode the account for an email.
    ///
    /// A missing file yields [`Error::AccountNotFound`], undecodable contents yield
    /// [`Error::AccountCorrupt`]; callers can tell the two apart.
    pub async fn load(&self, email: &str) -> Result<Account> {
        let path = self.path_for(email)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::AccountNotFound(path)),
            Err(e) => return Err(e.into()),
        };

        match bincode::decode_from_slice::<Account, _>(&bytes, config::standard()) {
            Ok((account, _)) => {
                debug!(path = %path.display(), "loaded account");
                Ok(account)
            }
            Err(source) => Err(Error::AccountCorrupt { path, source }),
        }
    }
}

/// The account file name for an email, refusing anything that would escape the directory
fn file_name(email: &str) -> Result<String> {
    if email.is_empty()
        || email.contains(['/', '\\', '\0'])
        || email.starts_with('.')
    {
        return Err(Error::InvalidEmail(email.to_owned()));
    }

    Ok(format!("{email}.{EXTENSION}"))
}
