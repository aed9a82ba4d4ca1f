//! The boundary to the ACME protocol engine
//!
//! Everything that speaks the ACME protocol (registration, challenge negotiation, polling,
//! finalization and download) lives behind [`AcmeClient`]. The workflow only ever talks to
//! this trait, so the engine can be swapped without touching it.
//!
//! The production implementation is [`LersClient`], which delegates to the
//! [`lers`](https://docs.rs/lers) library and its HTTP-01 solver.

use crate::{account::Account, certificate::CertificateResource, error::Result};
use openssl::pkey::{PKey, Private};
use std::time::Duration;

mod lers;

pub use self::lers::LersClient;

/// Options used when registering a new account
pub struct RegisterOptions {
    /// The email to associate with the account
    pub email: String,
    /// Whether the CA's terms of service are agreed to
    pub terms_of_service_agreed: bool,
    /// The key the account is registered with
    pub private_key: PKey<Private>,
}

/// A request for a single certificate
pub struct ObtainRequest {
    /// The domains to include in the certificate
    pub domains: Vec<String>,
    /// Whether to append the issuer chain to the certificate
    pub bundle: bool,
    /// The certificate's private key
    pub private_key: PKey<Private>,
    /// How long issuance may take
    pub timeout: Duration,
}

/// An ACME protocol engine able to register accounts and obtain certificates.
///
/// Engines are not required to be `Send`; the workflow drives a client from a single task.
#[async_trait::async_trait(?Send)]
pub trait AcmeClient {
    /// Serve HTTP-01 challenges for the domain on the given port.
    ///
    /// The domain is resolved to the address to listen on, an empty domain listens on all
    /// interfaces.
    async fn set_http01_provider(&mut self, domain: &str, port: u16) -> Result<()>;

    /// Register a new account with the server. The registered account is bound to the client.
    async fn register(&mut self, options: RegisterOptions) -> Result<Account>;

    /// Use a previously registered account for subsequent requests.
    async fn bind(&mut self, account: &Account) -> Result<()>;

    /// Obtain a certificate using the bound account.
    async fn obtain(&mut self, request: ObtainRequest) -> Result<CertificateResource>;

    /// Release anything started by the client, such as the challenge responder.
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}
