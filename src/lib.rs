//! Obtain TLS certificates over ACME HTTP-01 and keep them on disk.
//!
//! [`CertificateWorkflow`] drives an [`AcmeClient`] through account lookup or registration and
//! certificate issuance, persisting accounts with an [`AccountStore`]. The issued
//! [`CertificateResource`] is written out through a [`StorageLayout`].

#![warn(missing_docs)]

mod account;
mod certificate;
pub mod client;
pub mod config;
mod error;
pub mod storage;
mod workflow;

pub use account::{Account, AccountStore};
pub use certificate::{
    extract_metadata, CertificateKeyType, CertificateMetadata, CertificateResource,
};
pub use client::{AcmeClient, LersClient, ObtainRequest, RegisterOptions};
pub use error::{BoxError, Error};
pub use storage::StorageLayout;
pub use workflow::{
    split_host_port, AccountRecovery, CertificateWorkflow, WorkflowConfig, ACCOUNT_DIR,
    DEFAULT_TIMEOUT,
};
