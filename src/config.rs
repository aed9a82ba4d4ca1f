//! Command-line configuration

use clap::Parser;
use std::{
    fmt::{Debug, Formatter},
    path::PathBuf,
};

/// Command-line options.
///
/// Every option can also be supplied through the environment.
#[derive(Clone, Parser)]
#[command(name = "certfetch", about, disable_version_flag = true)]
pub struct Flags {
    /// HTTP server listen address
    #[arg(
        long = "http-address",
        visible_alias = "address",
        env = "CERTFETCH_HTTP_ADDRESS",
        default_value = ":80"
    )]
    pub http_address: String,

    /// HTTPS server listen address
    #[arg(long, env = "CERTFETCH_HTTPS_ADDRESS", default_value = ":443")]
    pub https_address: String,

    /// HTTPS server domain, defaults to the host of the HTTPS listen address
    #[arg(long, env = "CERTFETCH_HTTPS_DOMAIN", default_value = "")]
    pub https_domain: String,

    /// Email of the ACME account the certificate is issued to
    #[arg(long, env = "CERTFETCH_HTTPS_EMAIL", default_value = "")]
    pub https_email: String,

    /// Directory certificates and accounts are saved in
    #[arg(long, env = "CERTFETCH_HTTPS_CERT_DIR", default_value = "cert")]
    pub https_cert_dir: PathBuf,

    /// Save certificates under {cert-dir}/{domain}/{year}/{month}/{day}
    #[arg(long, env = "CERTFETCH_HTTPS_CERT_BY_DATE")]
    pub https_cert_by_date: bool,

    /// Aliyun DNS access key
    #[arg(long, env = "CERTFETCH_HTTPS_ALIYUN_DNS_ACCESS_KEY", default_value = "")]
    pub https_aliyun_dns_access_key: String,

    /// Aliyun DNS access secret
    #[arg(long, env = "CERTFETCH_HTTPS_ALIYUN_DNS_ACCESS_SECRET", default_value = "")]
    pub https_aliyun_dns_access_secret: String,

    /// ACME directory URL
    #[arg(
        long,
        env = "CERTFETCH_ACME_DIRECTORY",
        default_value = lers::LETS_ENCRYPT_PRODUCTION_URL
    )]
    pub acme_directory: String,

    /// Only parse the options
    #[arg(long)]
    pub dry_run: bool,

    /// Show the version
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// Enable debug logging
    #[arg(long)]
    pub verbose: bool,
}

impl Flags {
    /// The line printed for `--version`
    pub fn version_line() -> String {
        format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

impl Debug for Flags {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fn redacted(value: &str) -> &'static str {
            if value.is_empty() {
                ""
            } else {
                "<redacted>"
            }
        }

        f.debug_struct("Flags")
            .field("http_address", &self.http_address)
            .field("https_address", &self.https_address)
            .field("https_domain", &self.https_domain)
            .field("https_email", &self.https_email)
            .field("https_cert_dir", &self.https_cert_dir)
            .field("https_cert_by_date", &self.https_cert_by_date)
            .field(
                "https_aliyun_dns_access_key",
                &redacted(&self.https_aliyun_dns_access_key),
            )
            .field(
                "https_aliyun_dns_access_secret",
                &redacted(&self.https_aliyun_dns_access_secret),
            )
            .field("acme_directory", &self.acme_directory)
            .field("dry_run", &self.dry_run)
            .field("version", &self.version)
            .field("verbose", &self.verbose)
            .finish()
    }
}
