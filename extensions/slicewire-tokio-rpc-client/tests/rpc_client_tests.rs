use example_slicewire_service_definition::{EchoImpl, EchoPrx, EchoServant, register_types};
use futures_util::{SinkExt, StreamExt};
use slicewire::message::{Message, MessageCodec};
use slicewire::slicing::TypeRegistry;
use slicewire::stream::Identity;
use slicewire_rpc_caller::InvocationError;
use slicewire_tokio_rpc_client::{RpcClient, RpcTransportState};
use slicewire_tokio_rpc_server::RpcServer;
use slicewire_tokio_rpc_server::utils::bind_tcp_listener_on_random_port;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

async fn start_echo_server() -> (u16, Arc<EchoImpl>) {
    let (listener, port) = bind_tcp_listener_on_random_port().await.unwrap();
    let server = Arc::new(RpcServer::new());
    let echo = Arc::new(EchoImpl::new());
    server
        .adapter()
        .add(Identity::new("echo"), Arc::new(EchoServant::new(echo.clone())))
        .await
        .unwrap();
    tokio::spawn(async move {
        let _ = server.serve_with_listener(listener).await;
    });
    (port, echo)
}

fn registry() -> Arc<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    register_types(&mut registry);
    Arc::new(registry)
}

#[tokio::test]
async fn calls_round_trip_over_websocket() {
    let (port, echo) = start_echo_server().await;
    let client = RpcClient::new("127.0.0.1", port).await.unwrap();
    assert!(client.is_connected());

    let echo_prx = EchoPrx::from(client.proxy(Identity::new("echo")).with_registry(registry()));
    assert_eq!(echo_prx.add(19, 23).await.unwrap(), 42);

    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    assert_eq!(echo_prx.echo_bytes(&payload).await.unwrap(), payload);

    // Concurrent calls share the connection.
    let handles: Vec<_> = (0..8).map(|i| echo_prx.add(i, i)).collect();
    let sums = futures_util::future::join_all(handles).await;
    for (i, sum) in sums.into_iter().enumerate() {
        assert_eq!(sum.unwrap(), 2 * i as i32);
    }
    assert_eq!(echo.calls(), 10);
    assert_eq!(client.connection().pending_len(), 0);
}

#[tokio::test]
async fn unknown_objects_are_reported() {
    let (port, _echo) = start_echo_server().await;
    let client = RpcClient::new("127.0.0.1", port).await.unwrap();

    let missing = client.proxy(Identity::new("missing"));
    assert!(matches!(
        missing.ice_ping().await,
        Err(InvocationError::ObjectNotExist(_))
    ));
}

#[tokio::test]
async fn connecting_to_a_closed_port_fails() {
    let (listener, port) = bind_tcp_listener_on_random_port().await.unwrap();
    drop(listener);

    let error = RpcClient::new("127.0.0.1", port).await.err().unwrap();
    assert_eq!(error.kind(), std::io::ErrorKind::ConnectionRefused);
}

#[tokio::test]
async fn state_changes_are_reported_once() {
    let (port, _echo) = start_echo_server().await;
    let client = RpcClient::new("127.0.0.1", port).await.unwrap();

    let states = Arc::new(Mutex::new(Vec::new()));
    client.set_state_change_handler({
        let states = states.clone();
        move |state| states.lock().unwrap().push(state)
    });
    assert_eq!(*states.lock().unwrap(), vec![RpcTransportState::Connected]);

    drop(client);
    assert_eq!(
        *states.lock().unwrap(),
        vec![
            RpcTransportState::Connected,
            RpcTransportState::Disconnected
        ]
    );
}

#[tokio::test]
async fn outstanding_calls_fail_when_the_server_goes_away() {
    let (listener, port) = bind_tcp_listener_on_random_port().await.unwrap();

    // A server that validates, reads one request, then hangs up.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        let validate = MessageCodec::encode(&Message::ValidateConnection).unwrap();
        socket.send(WsMessage::Binary(validate.into())).await.unwrap();
        while let Some(Ok(frame)) = socket.next().await {
            if let WsMessage::Binary(bytes) = frame {
                assert!(matches!(
                    MessageCodec::decode(&bytes).unwrap(),
                    Message::Request { .. }
                ));
                break;
            }
        }
    });

    let client = RpcClient::new("127.0.0.1", port).await.unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client.set_state_change_handler(move |state| {
        let _ = tx.send(state);
    });
    assert_eq!(rx.recv().await, Some(RpcTransportState::Connected));

    let echo_prx = EchoPrx::from(client.proxy(Identity::new("echo")));
    let result = timeout(Duration::from_secs(5), echo_prx.echo_bytes(b"lost"))
        .await
        .expect("call should settle");
    assert!(matches!(result, Err(InvocationError::ConnectionLost)));

    server.await.unwrap();
    assert_eq!(
        timeout(Duration::from_secs(5), rx.recv()).await.unwrap(),
        Some(RpcTransportState::Disconnected)
    );
    assert!(!client.is_connected());
    assert!(client.connection().is_closed());
}
