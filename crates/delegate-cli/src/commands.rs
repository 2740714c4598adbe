use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use delegate_core::{PeerIdentity, PeerRecord, RoutingMessage};
use delegate_logging::{SubscriberBuilder, WorkerGuard};
use delegate_proxy::{CallContext, RoutingProxy, StandardProxy};
use delegate_transport::{IrohHost, IrohIdentity};
use tracing::{info, warn};

use crate::cli::{Cli, Command, MessageArgs};
use crate::config::NodeConfig;

pub type NodeProxy = StandardProxy<IrohIdentity, IrohHost, RoutingMessage>;

/// Run one invocation of the `delegate` binary
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = NodeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _guard = init_logging(&cli, &config);

    if let Command::Id = cli.command {
        if config.secret_key.is_none() {
            warn!("No secret_key configured; this identity is ephemeral");
        }
        let secret = config.load_secret_key()?;
        println!("{}", IrohIdentity::new(secret.public()).to_key_string());
        return Ok(());
    }

    let host = Arc::new(
        IrohHost::bind(config.load_secret_key()?, config.host_config())
            .await
            .context("Failed to bind iroh endpoint")?,
    );
    let proxy = NodeProxy::with_config(host.clone(), config.remote_ids()?, config.proxy.clone());
    info!(
        node = %host.local_identity(),
        remotes = proxy.remotes().len(),
        protocol = %config.proxy.protocol,
        "Delegate node ready"
    );

    let result = match cli.command {
        Command::Id => Ok(()),
        Command::Send(args) => send(&proxy, &args).await,
        Command::Request {
            message,
            timeout_ms,
        } => request(&proxy, &message, timeout_ms).await,
        Command::Serve => serve(&proxy, &config.proxy.protocol).await,
    };

    host.close().await;
    result
}

fn init_logging(cli: &Cli, config: &NodeConfig) -> Option<WorkerGuard> {
    let mut builder = SubscriberBuilder::new().with_config(config.log.clone());
    if let Some(level) = &cli.log_level {
        builder = builder.with_level(level.clone());
    }
    if cli.pretty {
        builder = builder.with_pretty(true);
    }
    builder.init()
}

/// Call context that Ctrl-C cancels
fn call_context(timeout_ms: Option<u64>) -> CallContext {
    let ctx = match timeout_ms {
        Some(ms) => CallContext::with_timeout(Duration::from_millis(ms)),
        None => CallContext::new(),
    };

    let token = ctx.token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    ctx
}

async fn send(proxy: &NodeProxy, args: &MessageArgs) -> anyhow::Result<()> {
    let message = args.to_message(&proxy.host().local_identity().as_bytes());
    proxy
        .send_message(&call_context(None), &message)
        .await
        .with_context(|| format!("Failed to deliver {message}"))?;
    println!("delivered {message}");
    Ok(())
}

async fn request(proxy: &NodeProxy, args: &MessageArgs, timeout_ms: Option<u64>) -> anyhow::Result<()> {
    let message = args.to_message(&proxy.host().local_identity().as_bytes());
    let reply = proxy
        .send_request(&call_context(timeout_ms), &message)
        .await
        .with_context(|| format!("No delegate answered {message}"))?;

    println!("{reply}");
    if let Some(record) = &reply.record {
        println!("  value: {}", String::from_utf8_lossy(&record.value));
    }
    print_peers("provider", &reply.provider_peers);
    print_peers("closer", &reply.closer_peers);
    Ok(())
}

fn print_peers(label: &str, peers: &[PeerRecord]) {
    for peer in peers {
        let id = IrohIdentity::from_bytes(&peer.id)
            .map(|id| id.to_key_string())
            .unwrap_or_else(|_| hex::encode(&peer.id));
        println!("  {label}: {id} ({} addrs)", peer.addrs.len());
    }
}

async fn serve(proxy: &NodeProxy, protocol: &str) -> anyhow::Result<()> {
    let host = proxy.host();
    host.spawn_router(protocol, Arc::new(proxy.clone())).await;
    println!("{}", host.local_identity().to_key_string());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!(stats = ?host.stats(), "Shutting down");
    Ok(())
}
