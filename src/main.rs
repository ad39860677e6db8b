//! consul-herald - advertise a service in Consul until interrupted

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use consul_herald::{
    backend::MemoryBackend, config::Args, logging, ConsulHerald, Declare, Herald, Pool,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    logging::init(&args.log_level);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let herald_config = args.herald_config();
    let consul_config = args.consul_config();
    let service = args.descriptor();

    info!("======================================");
    info!("  consul-herald");
    info!("======================================");
    info!("Service: {}/{}/{}", service.domain, service.title, service.version);
    info!("Instance: {}:{}", service.host, service.port);
    info!("TTL: {}s (heartbeat every {:?})", herald_config.ttl_secs, herald_config.heartbeat_interval());
    info!("KV path: {}", herald_config.kv_base_path);
    if args.dry_run {
        info!("Registry: in-memory (dry run)");
    } else {
        info!("Registry: {}", consul_config.base_url());
    }
    info!("======================================");

    let herald = if args.dry_run {
        ConsulHerald::with_backend(herald_config, Arc::new(MemoryBackend::new()))
    } else {
        ConsulHerald::new(herald_config, consul_config)
    };
    herald.init().await?;

    if args.declare {
        herald.declare(&service).await?;
    }
    herald.start(&service).await?;

    info!("Registered, press Ctrl-C to deregister and exit");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    herald.stop(&service).await?;
    Ok(())
}
