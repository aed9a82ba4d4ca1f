use super::{AcmeClient, ObtainRequest, RegisterOptions};
use crate::{
    account::Account,
    certificate::CertificateResource,
    error::{Error, Result},
};
use ::lers::{
    solver::{Http01Solver, SolverHandle},
    Directory,
};
use openssl::{
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private},
    stack::Stack,
    x509::{extension::SubjectAlternativeName, X509NameBuilder, X509ReqBuilder, X509},
};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::{net, time};
use tracing::{debug, info};

/// An [`AcmeClient`] backed by the `lers` ACME library.
///
/// The directory is only fetched once it is first needed, so that the HTTP-01 solver set
/// beforehand is registered with it. The `lers` types are not `Send`, so neither is this
/// client; drive it from a single task.
pub struct LersClient {
    url: String,
    solver: Option<Http01Solver>,
    handle: Option<SolverHandle<hyper::Error>>,
    directory: Option<Directory>,
    account: Option<::lers::Account>,
}

impl LersClient {
    /// Create a client for the ACME directory at the given URL
    pub fn new<S: Into<String>>(url: S) -> Self {
        LersClient {
            url: url.into(),
            solver: None,
            handle: None,
            directory: None,
            account: None,
        }
    }

    async fn directory(&mut self) -> Result<&Directory> {
        let directory = match self.directory.take() {
            Some(directory) => directory,
            None => {
                let mut builder = Directory::builder(self.url.clone());
                if let Some(solver) = &self.solver {
                    builder = builder.http01_solver(Box::new(solver.clone()));
                }

                let directory = builder.build().await.map_err(acme_error)?;
                debug!(url = %self.url, "fetched acme directory");
                directory
            }
        };

        Ok(self.directory.insert(directory))
    }
}

#[async_trait::async_trait(?Send)]
impl AcmeClient for LersClient {
    async fn set_http01_provider(&mut self, domain: &str, port: u16) -> Result<()> {
        let address = bind_address(domain, port).await?;

        let solver = Http01Solver::new();
        let handle = solver
            .start(&address)
            .map_err(|e| Error::ChallengeBind(Box::new(e)))?;
        info!(%address, "started http-01 challenge responder");

        if let Some(previous) = self.handle.replace(handle) {
            tokio::spawn(previous.stop());
        }
        self.solver = Some(solver);
        // a directory built earlier would not know about the new solver
        self.directory = None;
        self.account = None;

        Ok(())
    }

    async fn register(&mut self, options: RegisterOptions) -> Result<Account> {
        let contacts = vec![format!("mailto:{}", options.email)];
        let private_key_pem = options.private_key.private_key_to_pem_pkcs8()?;

        let account = self
            .directory()
            .await?
            .account()
            .terms_of_service_agreed(options.terms_of_service_agreed)
            .contacts(contacts.clone())
            .private_key(options.private_key)
            .create_if_not_exists()
            .await
            .map_err(acme_error)?;
        self.account = Some(account);

        Ok(Account {
            email: options.email,
            directory: self.url.clone(),
            contacts,
            terms_of_service_agreed: options.terms_of_service_agreed,
            private_key_pem,
        })
    }

    async fn bind(&mut self, account: &Account) -> Result<()> {
        let private_key = account.private_key()?;

        let bound = self
            .directory()
            .await?
            .account()
            .terms_of_service_agreed(account.terms_of_service_agreed)
            .contacts(account.contacts.clone())
            .private_key(private_key)
            .lookup()
            .await
            .map_err(acme_error)?;
        self.account = Some(bound);

        Ok(())
    }

    async fn obtain(&mut self, request: ObtainRequest) -> Result<CertificateResource> {
        let account = self.account.as_ref().ok_or(Error::NoAccount)?;

        let mut builder = account.certificate();
        for domain in &request.domains {
            builder = builder.add_domain(domain.as_str());
        }
        let builder = builder.private_key(request.private_key.clone());

        let issued = time::timeout(request.timeout, builder.obtain())
            .await
            .map_err(|_| Error::Timeout(request.timeout))?
            .map_err(acme_error)?;

        let (certificate, issuer_certificate) = split_chain(issued.x509_chain(), request.bundle)?;

        Ok(CertificateResource {
            private_key: request.private_key.private_key_to_pem_pkcs8()?,
            certificate,
            issuer_certificate,
            csr: csr_to_pem(&request.domains, &request.private_key)?,
            domains: request.domains,
        })
    }

    async fn shutdown(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle
                .stop()
                .await
                .map_err(|e| Error::ChallengeBind(Box::new(e)))?;
            debug!("stopped http-01 challenge responder");
        }

        Ok(())
    }
}

fn acme_error<E>(e: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    Error::Acme(Box::new(e))
}

/// The address the HTTP-01 responder listens on
async fn bind_address(domain: &str, port: u16) -> Result<SocketAddr> {
    if domain.is_empty() {
        return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
    }

    net::lookup_host((domain, port))
        .await
        .map_err(|e| Error::ChallengeBind(Box::new(e)))?
        .next()
        .ok_or_else(|| Error::InvalidAddress(format!("{domain}:{port}")))
}

/// Split an issued chain into the certificate and issuer artifacts.
///
/// The certificate is the leaf, followed by the rest of the chain when bundled. The issuer
/// artifact is always the chain without the leaf.
fn split_chain(chain: &[X509], bundle: bool) -> Result<(Vec<u8>, Vec<u8>)> {
    let (leaf, issuers) = chain
        .split_first()
        .ok_or_else(|| Error::Acme("the server returned an empty certificate chain".into()))?;

    let issuer_certificate = chain_to_pem(issuers)?;
    let mut certificate = leaf.to_pem()?;
    if bundle {
        certificate.extend_from_slice(&issuer_certificate);
    }

    Ok((certificate, issuer_certificate))
}

fn chain_to_pem(chain: &[X509]) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    for certificate in chain {
        result.extend(certificate.to_pem()?);
    }
    Ok(result)
}

/// Build a PEM certificate signing request for the domains, signed with the key
fn csr_to_pem(domains: &[String], private_key: &PKey<Private>) -> Result<Vec<u8>> {
    let mut builder = X509ReqBuilder::new()?;

    if let Some(first) = domains.first() {
        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_nid(Nid::COMMONNAME, first)?;
        builder.set_subject_name(&name.build())?;

        let mut san = SubjectAlternativeName::new();
        for domain in domains {
            san.dns(domain);
        }
        let san = san.build(&builder.x509v3_context(None))?;

        let mut extensions = Stack::new()?;
        extensions.push(san)?;
        builder.add_extensions(&extensions)?;
    }

    builder.set_pubkey(private_key)?;
    builder.sign(private_key, MessageDigest::sha256())?;

    Ok(builder.build().to_pem()?)
}

#[cfg(test)]
mod tests {
    use super::{bind_address, csr_to_pem, split_chain, AcmeClient, LersClient};
    use crate::{
        certificate::CertificateKeyType,
        test::{certificate_pem, CertificateFixture},
        Error,
    };
    use openssl::x509::{X509Req, X509};
    use std::net::{SocketAddr, TcpListener};

    fn x509(common_name: &str, sans: &[&str]) -> X509 {
        X509::from_pem(&certificate_pem(CertificateFixture {
            common_name: Some(common_name),
            sans,
            not_before: (2024, 3, 5),
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn bind_address_all_interfaces() {
        let address = bind_address("", 443).await.unwrap();
        assert_eq!(address, "0.0.0.0:443".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn bind_address_literal() {
        let address = bind_address("127.0.0.1", 8080).await.unwrap();
        assert_eq!(address, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn csr_contains_domains() {
        let key = CertificateKeyType::EcP256.generate().unwrap();
        let domains = vec!["one.example.com".to_owned(), "two.example.com".to_owned()];

        let pem = csr_to_pem(&domains, &key).unwrap();
        let csr = X509Req::from_pem(&pem).unwrap();

        assert!(csr.verify(&key).unwrap());
        let cn = csr
            .subject_name()
            .entries()
            .next()
            .unwrap()
            .data()
            .as_utf8()
            .unwrap()
            .to_string();
        assert_eq!(cn, "one.example.com");
    }

    #[test]
    fn split_bundled_chain() {
        let leaf = x509("leaf.example.com", &["leaf.example.com"]);
        let issuer = x509("Test Issuer", &[]);
        let root = x509("Test Root", &[]);

        let (certificate, issuer_certificate) =
            split_chain(&[leaf.clone(), issuer.clone(), root.clone()], true).unwrap();

        let mut expected_issuers = issuer.to_pem().unwrap();
        expected_issuers.extend(root.to_pem().unwrap());
        let mut expected_certificate = leaf.to_pem().unwrap();
        expected_certificate.extend_from_slice(&expected_issuers);

        assert_eq!(issuer_certificate, expected_issuers);
        assert_eq!(certificate, expected_certificate);
        assert_eq!(X509::stack_from_pem(&certificate).unwrap().len(), 3);
    }

    #[test]
    fn split_unbundled_chain() {
        let leaf = x509("leaf.example.com", &["leaf.example.com"]);
        let issuer = x509("Test Issuer", &[]);

        let (certificate, issuer_certificate) =
            split_chain(&[leaf.clone(), issuer.clone()], false).unwrap();

        assert_eq!(certificate, leaf.to_pem().unwrap());
        assert_eq!(issuer_certificate, issuer.to_pem().unwrap());
    }

    #[test]
    fn split_leaf_only() {
        let leaf = x509("leaf.example.com", &["leaf.example.com"]);

        let (certificate, issuer_certificate) = split_chain(&[leaf.clone()], true).unwrap();

        assert_eq!(certificate, leaf.to_pem().unwrap());
        assert!(issuer_certificate.is_empty());
    }

    #[test]
    fn split_empty_chain() {
        let error = split_chain(&[], true).unwrap_err();
        assert!(matches!(error, Error::Acme(_)));
    }

    #[tokio::test]
    async fn responder_bind_failure() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let mut client = LersClient::new("https://acme.invalid/directory");
        let error = client
            .set_http01_provider("127.0.0.1", port)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::ChallengeBind(_)));
    }

    #[tokio::test]
    async fn responder_start_and_stop() {
        let mut client = LersClient::new("https://acme.invalid/directory");
        client.set_http01_provider("127.0.0.1", 0).await.unwrap();
        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn obtain_without_account() {
        let mut client = LersClient::new("https://acme.invalid/directory");
        let request = super::ObtainRequest {
            domains: vec!["example.com".into()],
            bundle: true,
            private_key: CertificateKeyType::EcP256.generate().unwrap(),
            timeout: std::time::Duration::from_secs(1),
        };

        let error = client.obtain(request).await.unwrap_err();
        assert!(matches!(error, Error::NoAccount));
    }
}
