use std::net::SocketAddr;
use std::sync::Arc;

use framelink_conn::{
    dispatcher, handler_fn, ConnConfig, ConnectionRegistry, RegistryConfig, Request, WsListener,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cmd::{runtime, ServeArgs};
use crate::config::ServerConfig;
use crate::exit::{conn_error, CliResult, SUCCESS};
use crate::output::{print_listening, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut settings = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    settings.apply_overrides(&args);
    let conn_config = settings.conn_config()?;
    let registry_config = settings.registry_config();

    runtime()?.block_on(serve(args.addr, conn_config, registry_config, format))
}

async fn serve(
    addr: SocketAddr,
    conn_config: ConnConfig,
    registry_config: RegistryConfig,
    format: OutputFormat,
) -> CliResult<i32> {
    let registry = ConnectionRegistry::new(registry_config);
    let echo = dispatcher(&conn_config, handler_fn(echo));
    info!(
        heartbeat_ms = conn_config.heartbeat_interval.as_millis() as u64,
        queue_capacity = conn_config.outbound_queue_capacity,
        workers = conn_config.worker_pool_size,
        max_connections = registry_config.max_connections,
        "starting echo server"
    );

    let listener = WsListener::bind(addr, conn_config, Arc::clone(&registry), echo)
        .await
        .map_err(|err| conn_error("bind failed", err))?;
    let local_addr = listener
        .local_addr()
        .map_err(|err| conn_error("bind failed", err))?;
    print_listening(local_addr, format);

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_ctrl_c(shutdown.clone()));

    listener
        .run(shutdown)
        .await
        .map_err(|err| conn_error("listener failed", err))?;

    info!(
        accepted = registry.total_added(),
        closed = registry.total_removed(),
        "echo server stopped"
    );
    Ok(SUCCESS)
}

async fn echo(request: Request) {
    if let Err(err) = request.reply(request.payload().clone()) {
        debug!(
            conn_id = %request.connection().id(),
            protocol_id = request.protocol_id(),
            error = %err,
            "echo dropped"
        );
    }
}

async fn shutdown_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("interrupt received; shutting down");
            shutdown.cancel();
        }
        Err(err) => warn!(error = %err, "cannot listen for ctrl-c; stop the process to exit"),
    }
}
