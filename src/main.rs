use anyhow::{bail, Context, Result};
use certfetch::{config::Flags, CertificateWorkflow, LersClient, StorageLayout};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let flags = Flags::parse();

    if flags.version {
        println!("{}", Flags::version_line());
        return Ok(());
    }

    let level = if flags.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    if flags.dry_run {
        info!(?flags, "dry run, not requesting a certificate");
        return Ok(());
    }

    if flags.https_email.is_empty() {
        bail!("an account email is required, set --https-email");
    }

    let mut workflow = CertificateWorkflow::new(LersClient::new(&flags.acme_directory));
    let (_, resource) = workflow
        .acquire(
            &flags.https_cert_dir,
            &flags.https_email,
            &flags.https_address,
            &flags.https_domain,
        )
        .await
        .context("failed to obtain certificate")?;

    let layout = if flags.https_cert_by_date {
        StorageLayout::Dated(flags.https_cert_dir.clone())
    } else {
        StorageLayout::Flat(flags.https_cert_dir.clone())
    };
    let dir = layout
        .write(&resource)
        .await
        .context("failed to save certificate")?;

    info!(dir = %dir.display(), "certificate ready");
    Ok(())
}
