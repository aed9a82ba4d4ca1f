use crate::{
    account::{Account, AccountStore},
    certificate::{self, CertificateKeyType, CertificateResource},
    client::{AcmeClient, ObtainRequest, RegisterOptions},
    error::{Error, Result},
};
use openssl::{
    nid::Nid,
    pkey::{PKey, Private},
};
use std::{path::Path, time::Duration};
use tracing::{debug, info, instrument, warn};

/// The directory under the storage root that accounts are kept in
pub const ACCOUNT_DIR: &str = "account";

/// How long a certificate may take to be issued
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// What to do when an account is stored but cannot be read
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AccountRecovery {
    /// Log the failure and register a new account in its place
    #[default]
    Register,
    /// Return the error
    Abort,
}

/// Tunables for certificate acquisition
#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// The curve of the account key
    pub account_curve: Nid,
    /// The key type of the issued certificate
    pub key_type: CertificateKeyType,
    /// How long issuance may take
    pub timeout: Duration,
    /// Handling of stored accounts that cannot be read
    pub recovery: AccountRecovery,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        WorkflowConfig {
            account_curve: Nid::SECP384R1,
            key_type: CertificateKeyType::Rsa4096,
            timeout: DEFAULT_TIMEOUT,
            recovery: AccountRecovery::Register,
        }
    }
}

/// Obtains a certificate for a single domain over HTTP-01, reusing the account stored for the
/// email when there is one.
///
/// Accounts live in `{storage}/account`. Only one workflow may run against a storage
/// directory at a time, concurrent runs for the same email can each register and persist
/// their own account.
pub struct CertificateWorkflow<C> {
    client: C,
    config: WorkflowConfig,
}

impl<C: AcmeClient> CertificateWorkflow<C> {
    /// Create a workflow driving the given client
    pub fn new(client: C) -> Self {
        CertificateWorkflow {
            client,
            config: WorkflowConfig::default(),
        }
    }

    /// Replace all tunables at once
    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the key type of the issued certificate, defaults to RSA 4096
    pub fn key_type(mut self, key_type: CertificateKeyType) -> Self {
        self.config.key_type = key_type;
        self
    }

    /// Set how long issuance may take, defaults to 30 days
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set what happens when the stored account cannot be read
    pub fn recovery(mut self, recovery: AccountRecovery) -> Self {
        self.config.recovery = recovery;
        self
    }

    /// Access the underlying client
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Obtain a certificate for `domain`, or for the host of `https_address` when `domain` is
    /// empty.
    ///
    /// Returns the account key generated for this run along with the issued certificate. The
    /// challenge responder is shut down before returning, whatever the outcome.
    #[instrument(skip(self, storage), fields(storage = %storage.as_ref().display()))]
    pub async fn acquire<P: AsRef<Path>>(
        &mut self,
        storage: P,
        email: &str,
        https_address: &str,
        domain: &str,
    ) -> Result<(PKey<Private>, CertificateResource)> {
        let private_key = certificate::ec_key(self.config.account_curve)?;
        debug!(curve = ?self.config.account_curve, "generated account key");

        let (host, port) = split_host_port(https_address)?;

        self.client.set_http01_provider(domain, port).await?;

        let result = self
            .acquire_with_provider(storage.as_ref(), email, &host, domain, private_key)
            .await;

        if let Err(e) = self.client.shutdown().await {
            warn!(error = %e, "failed to shut down acme client");
        }

        result
    }

    async fn acquire_with_provider(
        &mut self,
        storage: &Path,
        email: &str,
        host: &str,
        domain: &str,
        private_key: PKey<Private>,
    ) -> Result<(PKey<Private>, CertificateResource)> {
        let store = AccountStore::new(storage.join(ACCOUNT_DIR));
        self.resolve_account(&store, email, &private_key).await?;

        let domain = if domain.is_empty() { host } else { domain };

        let request = ObtainRequest {
            domains: vec![domain.to_owned()],
            bundle: true,
            private_key: self.config.key_type.generate()?,
            timeout: self.config.timeout,
        };
        let resource = self.client.obtain(request).await?;
        info!(%domain, "obtained certificate");

        Ok((private_key, resource))
    }

    /// Bind the account stored for the email to the client, registering a new one when there
    /// is none. A fresh registration is already bound by the client.
    async fn resolve_account(
        &mut self,
        store: &AccountStore,
        email: &str,
        private_key: &PKey<Private>,
    ) -> Result<Account> {
        match store.load(email).await {
            Ok(account) => {
                self.client.bind(&account).await?;
                info!(directory = %account.directory, "reusing stored account");
                return Ok(account);
            }
            Err(Error::AccountNotFound(_)) => debug!("no stored account"),
            Err(e @ Error::InvalidEmail(_)) => return Err(e),
            Err(e) => match self.config.recovery {
                AccountRecovery::Register => {
                    warn!(error = %e, "stored account is unreadable, registering a new one")
                }
                AccountRecovery::Abort => return Err(e),
            },
        }

        let account = self
            .client
            .register(RegisterOptions {
                email: email.to_owned(),
                terms_of_service_agreed: true,
                private_key: private_key.clone(),
            })
            .await?;
        info!(directory = %account.directory, "registered account");

        store.save(email, &account).await?;
        Ok(account)
    }
}

/// Split a `host:port` address into its host and numeric port.
///
/// IPv6 hosts must be enclosed in brackets, which are removed. The host may be empty.
pub fn split_host_port(address: &str) -> Result<(String, u16)> {
    let invalid = || Error::InvalidAddress(address.to_owned());

    let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
    let host = match host.strip_prefix('[') {
        Some(rest) => rest.strip_suffix(']').ok_or_else(invalid)?,
        None if host.contains([':', '[', ']']) => return Err(invalid()),
        None => host,
    };

    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host.to_owned(), port))
}
