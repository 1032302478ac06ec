//! Echo server that counts messages per connection.
//!
//! Run with:
//!   cargo run -p framelink --example echo-server
//!
//! In another terminal:
//!   cargo run -p framelink --features cli -- send ws://127.0.0.1:9000 \
//!     --protocol-id 1 --json '{"hello":"world"}' --wait --wait-timeout 3

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use framelink::conn::{
    dispatcher, handler_fn, ConnConfig, ConnectionRegistry, RegistryConfig, Request, WsListener,
};
use tokio_util::sync::CancellationToken;

const COUNTER: &str = "example.messages";

async fn echo(request: Request) {
    let conn = request.connection();
    let counter = match conn.get_property_as::<AtomicU64>(COUNTER) {
        Ok(counter) => counter,
        Err(_) => {
            conn.set_property(COUNTER, AtomicU64::new(0));
            match conn.get_property_as::<AtomicU64>(COUNTER) {
                Ok(counter) => counter,
                Err(_) => return,
            }
        }
    };
    let seen = counter.fetch_add(1, Ordering::Relaxed) + 1;
    tracing::info!(
        conn_id = %conn.id(),
        protocol_id = request.protocol_id(),
        len = request.payload().len(),
        seen,
        "echoing"
    );

    if let Err(err) = request.reply(request.payload().clone()) {
        tracing::warn!(conn_id = %conn.id(), error = %err, "echo dropped");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9000".to_string())
        .parse()?;

    let config = ConnConfig::default().with_heartbeat_interval(Duration::from_secs(30));
    let registry = ConnectionRegistry::new(RegistryConfig::default());
    let handler = dispatcher(&config, handler_fn(echo));
    let listener = WsListener::bind(addr, config, Arc::clone(&registry), handler).await?;
    eprintln!("Listening on ws://{}", listener.local_addr()?);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        signal.cancel();
    });

    listener.run(shutdown).await?;
    eprintln!(
        "Stopped after {} connection(s)",
        registry.total_added()
    );
    Ok(())
}
