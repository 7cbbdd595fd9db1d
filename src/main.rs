use std::sync::Arc;

use anyhow::Context;

use xpor_relay::config::RelayConfig;
use xpor_relay::logging;
use xpor_relay::mail::Mailbox;
use xpor_relay::scanner::InboxScanner;
use xpor_relay::scheduler::Scheduler;
use xpor_relay::sheet::XlsxReader;
use xpor_relay::storage::AttachmentStore;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env().context("Failed to load configuration")?;

    logging::init(&config.log_file)?;

    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing::info!("XPOR relay v{} started", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        imap = %config.email.imap_host,
        mailbox = %config.email.mailbox,
        prefix = %config.subject_prefix,
        recipient = %config.recipient,
        "Watching inbox"
    );

    let store = AttachmentStore::new(&config.attachment_dir);
    store.ensure_directory().await.with_context(|| {
        format!(
            "Failed to create attachment directory {}",
            config.attachment_dir.display()
        )
    })?;

    let scanner = InboxScanner::new(
        Arc::new(Mailbox::new(config.email.clone())),
        store,
        Arc::new(XlsxReader),
        config.recipient.clone(),
        config.subject_prefix.clone(),
    );

    Scheduler::new(scanner, config.poll_interval).run().await;
    Ok(())
}
