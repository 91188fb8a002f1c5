use futures_util::{SinkExt, Stream, StreamExt};
use slicewire::message::{Message, MessageCodec};
use slicewire::protocol::{
    Encapsulation, ICE_ID, ICE_IDS, ICE_IS_A, ICE_PING, OperationInfo, OperationMode, ReplyFrame,
    RequestFrame,
};
use slicewire::stream::{Identity, StreamConfig};
use slicewire_rpc_endpoint::{DispatchError, DispatchOutput, IncomingRequest};
use slicewire_tokio_rpc_server::utils::bind_tcp_listener_on_random_port;
use slicewire_tokio_rpc_server::{RpcServer, Servant, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};

const UPPER: OperationInfo = OperationInfo::new("upper", OperationMode::Idempotent);
const WAIT: OperationInfo = OperationInfo::new("wait", OperationMode::Idempotent);
const OPERATIONS: [OperationInfo; 6] = [ICE_ID, ICE_IDS, ICE_IS_A, ICE_PING, UPPER, WAIT];

struct Shouter;

#[async_trait::async_trait]
impl Servant for Shouter {
    fn type_ids(&self) -> &[&'static str] {
        &["::Test::Shouter", "::Slicewire::Object"]
    }

    fn operations(&self) -> &[OperationInfo] {
        &OPERATIONS
    }

    async fn dispatch(&self, request: IncomingRequest) -> Result<DispatchOutput, DispatchError> {
        if request.current.operation == WAIT.name {
            let millis = request.read_params(|is| is.read_int())?;
            sleep(Duration::from_millis(millis as u64)).await;
            return Ok(DispatchOutput::empty());
        }
        let text = request.read_params(|is| is.read_string())?;
        Ok(DispatchOutput::buffered(|os| os.write_string(&text.to_uppercase()))?)
    }
}

async fn start_server(config: ServerConfig) -> u16 {
    let (listener, port) = bind_tcp_listener_on_random_port().await.unwrap();
    let server = Arc::new(RpcServer::with_config(config));
    server
        .adapter()
        .add(Identity::new("shouter"), Arc::new(Shouter))
        .await
        .unwrap();
    tokio::spawn(async move {
        let _ = server.serve_with_listener(listener).await;
    });
    port
}

async fn next_message<S>(socket: &mut S) -> Message
where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for the server")
            .expect("socket ended")
            .unwrap();
        if let WsMessage::Binary(bytes) = frame {
            return MessageCodec::decode(&bytes).unwrap();
        }
    }
}

#[tokio::test]
async fn validates_then_answers_requests() {
    let port = start_server(ServerConfig::default()).await;
    let (mut socket, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
        .await
        .unwrap();

    assert_eq!(next_message(&mut socket).await, Message::ValidateConnection);

    let params = Encapsulation::build(|os| os.write_string("quiet please")).unwrap();
    let request = Message::Request {
        request_id: 3,
        frame: RequestFrame::new(
            Identity::new("shouter"),
            "upper",
            OperationMode::Idempotent,
            params,
        ),
    };
    socket
        .send(WsMessage::Binary(MessageCodec::encode(&request).unwrap().into()))
        .await
        .unwrap();

    match next_message(&mut socket).await {
        Message::Reply {
            request_id: 3,
            reply: ReplyFrame::Ok(results),
        } => {
            let text = results
                .decode(None, StreamConfig::default(), |is| is.read_string())
                .unwrap();
            assert_eq!(text, "QUIET PLEASE");
        }
        other => panic!("unexpected message {other:?}"),
    }

    let request = Message::Request {
        request_id: 4,
        frame: RequestFrame::new(
            Identity::new("nobody"),
            "upper",
            OperationMode::Idempotent,
            Encapsulation::empty(),
        ),
    };
    socket
        .send(WsMessage::Binary(MessageCodec::encode(&request).unwrap().into()))
        .await
        .unwrap();
    match next_message(&mut socket).await {
        Message::Reply {
            request_id: 4,
            reply: ReplyFrame::ObjectNotExist(failed),
        } => assert_eq!(failed.identity, Identity::new("nobody")),
        other => panic!("unexpected message {other:?}"),
    }
}

fn request(request_id: i32, operation: &str, params: Encapsulation) -> WsMessage {
    let message = Message::Request {
        request_id,
        frame: RequestFrame::new(
            Identity::new("shouter"),
            operation,
            OperationMode::Idempotent,
            params,
        ),
    };
    WsMessage::Binary(MessageCodec::encode(&message).unwrap().into())
}

#[tokio::test]
async fn slow_requests_do_not_hold_up_later_ones() {
    let port = start_server(ServerConfig::default()).await;
    let (mut socket, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
        .await
        .unwrap();
    assert_eq!(next_message(&mut socket).await, Message::ValidateConnection);

    let slow = Encapsulation::build(|os| {
        os.write_int(1_000);
        Ok(())
    })
    .unwrap();
    socket.send(request(1, "wait", slow)).await.unwrap();
    let text = Encapsulation::build(|os| os.write_string("hi")).unwrap();
    socket.send(request(2, "upper", text)).await.unwrap();

    // The second reply arrives while the first call is still sleeping.
    let started = tokio::time::Instant::now();
    match next_message(&mut socket).await {
        Message::Reply { request_id, .. } => assert_eq!(request_id, 2),
        other => panic!("unexpected message {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_millis(900));
    match next_message(&mut socket).await {
        Message::Reply {
            request_id: 1,
            reply: ReplyFrame::Ok(_),
        } => {}
        other => panic!("unexpected message {other:?}"),
    }
}

#[tokio::test]
async fn deactivated_adapters_drop_their_clients() {
    let (listener, port) = bind_tcp_listener_on_random_port().await.unwrap();
    let server = Arc::new(RpcServer::new());
    let adapter = server.adapter();
    adapter
        .add(Identity::new("shouter"), Arc::new(Shouter))
        .await
        .unwrap();
    tokio::spawn(async move {
        let _ = server.serve_with_listener(listener).await;
    });

    let (mut socket, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
        .await
        .unwrap();
    assert_eq!(next_message(&mut socket).await, Message::ValidateConnection);

    adapter.deactivate().await;
    let text = Encapsulation::build(|os| os.write_string("hi")).unwrap();
    socket.send(request(5, "upper", text)).await.unwrap();

    let mut saw_close = false;
    while let Ok(Some(frame)) = timeout(Duration::from_secs(1), socket.next()).await {
        match frame {
            Ok(WsMessage::Binary(_)) => panic!("deactivated adapter answered a request"),
            Ok(WsMessage::Close(_)) => saw_close = true,
            Ok(_) => {}
            Err(_) => break,
        }
    }
    assert!(saw_close);
}

#[tokio::test]
async fn silent_clients_are_dropped() {
    let config = ServerConfig::default()
        .with_heartbeat_interval(Duration::from_millis(20))
        .with_client_timeout(Duration::from_millis(100));
    let port = start_server(config).await;
    let (mut socket, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
        .await
        .unwrap();

    // Not polling the socket means no pongs go back.
    sleep(Duration::from_millis(300)).await;

    let mut saw_close = false;
    while let Ok(Some(frame)) = timeout(Duration::from_secs(1), socket.next()).await {
        match frame {
            Ok(WsMessage::Close(_)) => saw_close = true,
            Ok(_) => {}
            Err(_) => break,
        }
    }
    assert!(saw_close, "server should close an idle connection");
}

#[tokio::test]
async fn garbage_input_drops_the_connection() {
    let port = start_server(ServerConfig::default()).await;
    let (mut socket, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
        .await
        .unwrap();
    assert_eq!(next_message(&mut socket).await, Message::ValidateConnection);

    socket
        .send(WsMessage::Binary(vec![b'?'; 32].into()))
        .await
        .unwrap();

    let mut saw_close = false;
    while let Ok(Some(frame)) = timeout(Duration::from_secs(1), socket.next()).await {
        match frame {
            Ok(WsMessage::Close(_)) => saw_close = true,
            Ok(_) => {}
            Err(_) => break,
        }
    }
    assert!(saw_close);
}
