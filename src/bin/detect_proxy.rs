//! detect_proxy - detection relay service
//!
//! This daemon:
//! 1. Loads relay configuration (JSON file + environment)
//! 2. Binds the preferred port, moving up while ports are taken
//! 3. Forwards `POST /detect` uploads to the inference provider
//! 4. Never logs or returns the provider API key

use anyhow::Result;
use std::sync::mpsc;

use detection_relay::proxy::ProxyServer;
use detection_relay::ProxyConfig;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ProxyConfig::load()?;
    log::info!(
        "upstream {} model={} default_version={}",
        config.upstream.base_url,
        config.upstream.model,
        config.upstream.default_version
    );

    let handle = ProxyServer::new(config).spawn()?;
    log::info!("detection relay running on {}", handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    log::info!("detect_proxy waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping relay...");
    handle.stop()?;

    Ok(())
}
