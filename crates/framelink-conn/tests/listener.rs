use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use framelink_conn::{
    dispatcher, handler_fn, ConnConfig, ConnectionRegistry, RegistryConfig, Request, WsListener,
};
use framelink_frame::{decode, encode};
use framelink_transport::{
    MessageSink, MessageSocket, MessageSource, MessageType, RawMessage, WsSocket,
};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::client_async;
use tokio_util::sync::CancellationToken;

struct Server {
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

async fn echo_listener(max_connections: usize) -> Server {
    let config = ConnConfig::default();
    let registry = ConnectionRegistry::new(RegistryConfig { max_connections });
    let echo = dispatcher(
        &config,
        handler_fn(|req: Request| async move {
            let _ = req.reply(req.payload().clone());
        }),
    );

    let listener = WsListener::bind(
        "127.0.0.1:0".parse().unwrap(),
        config,
        Arc::clone(&registry),
        echo,
    )
    .await
    .expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let shutdown = CancellationToken::new();
    let task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            listener.run(shutdown).await.expect("listener run");
        }
    });

    Server {
        addr,
        registry,
        shutdown,
        task,
    }
}

async fn wait_for_live(registry: &ConnectionRegistry, live: usize) {
    timeout(Duration::from_secs(5), async {
        while registry.len() != live {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry never reached expected size");
}

#[tokio::test]
async fn websocket_echo_roundtrip_and_shutdown() {
    let Server {
        addr,
        registry,
        shutdown,
        task,
    } = echo_listener(0).await;

    let client = WsSocket::connect(&format!("ws://{addr}"))
        .await
        .expect("connect");
    let (mut sink, mut source) = client.split();
    wait_for_live(&registry, 1).await;

    sink.send(RawMessage::binary(encode(7, b"hi").expect("encode")))
        .await
        .expect("client send");
    let reply = timeout(Duration::from_secs(5), source.recv())
        .await
        .expect("timed out")
        .expect("recv")
        .expect("unexpected EOF");
    assert_eq!(reply.kind, MessageType::Binary);
    let (protocol_id, payload) = decode(&reply.data).expect("decode");
    assert_eq!(protocol_id, 7);
    assert_eq!(&payload[..], b"hi");

    shutdown.cancel();
    timeout(Duration::from_secs(5), task)
        .await
        .expect("listener did not stop")
        .expect("listener task");
    assert!(registry.is_empty());

    let after = timeout(Duration::from_secs(5), source.recv())
        .await
        .expect("client never saw the close");
    assert!(!matches!(after, Ok(Some(_))), "unexpected frame after shutdown");
}

#[tokio::test]
async fn client_disconnect_deregisters() {
    let Server {
        addr,
        registry,
        shutdown,
        ..
    } = echo_listener(0).await;

    let client = WsSocket::connect(&format!("ws://{addr}"))
        .await
        .expect("connect");
    wait_for_live(&registry, 1).await;

    let (mut sink, _source) = client.split();
    sink.close().await.expect("client close");
    wait_for_live(&registry, 0).await;
    assert_eq!(registry.total_removed(), 1);

    shutdown.cancel();
}

#[tokio::test]
async fn connection_limit_rejects_extra_clients() {
    let Server {
        addr,
        registry,
        shutdown,
        ..
    } = echo_listener(1).await;
    let url = format!("ws://{addr}");

    let _first = WsSocket::connect(&url).await.expect("first connect");
    wait_for_live(&registry, 1).await;

    let second = timeout(Duration::from_secs(5), WsSocket::connect(&url))
        .await
        .expect("second connect hung");
    assert!(second.is_err(), "second client should be rejected");
    assert_eq!(registry.len(), 1);

    shutdown.cancel();
}

#[tokio::test]
async fn pending_handshakes_share_the_connection_limit() {
    let Server {
        addr,
        registry,
        shutdown,
        ..
    } = echo_listener(1).await;
    let url = format!("ws://{addr}");

    // Both sockets are accepted before either finishes its upgrade.
    let first = TcpStream::connect(addr).await.expect("first tcp");
    let second = TcpStream::connect(addr).await.expect("second tcp");
    sleep(Duration::from_millis(100)).await;

    let (first, second) = tokio::join!(
        timeout(Duration::from_secs(5), client_async(url.as_str(), first)),
        timeout(Duration::from_secs(5), client_async(url.as_str(), second)),
    );
    let first = first.expect("first handshake hung");
    let second = second.expect("second handshake hung");
    assert_eq!(
        usize::from(first.is_ok()) + usize::from(second.is_ok()),
        1,
        "exactly one pending client should be upgraded"
    );

    wait_for_live(&registry, 1).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.total_added(), 1);

    shutdown.cancel();
}

#[tokio::test]
async fn shutdown_abandons_pending_handshakes() {
    let Server {
        addr,
        registry,
        shutdown,
        task,
    } = echo_listener(0).await;

    let tcp = TcpStream::connect(addr).await.expect("tcp connect");
    sleep(Duration::from_millis(100)).await;

    shutdown.cancel();
    timeout(Duration::from_secs(5), task)
        .await
        .expect("listener did not stop")
        .expect("listener task");

    let upgrade = timeout(
        Duration::from_secs(5),
        client_async(format!("ws://{addr}"), tcp),
    )
    .await
    .expect("handshake hung after shutdown");
    assert!(upgrade.is_err(), "upgrade completed after shutdown");

    sleep(Duration::from_millis(50)).await;
    assert!(registry.is_empty());
    assert_eq!(registry.total_added(), 0);
}
