//! Channel behaviour over in-memory websocket pairs.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use nexus_protocol::{ErrorCode, ErrorObject, Outcome, Params, decode};
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tokio::io::DuplexStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::Role;

use super::*;
use crate::dispatch::{Dispatcher, ExecutorError, Registry};

type RawPeer = WebSocketStream<DuplexStream>;

#[fixture]
fn registry() -> Registry {
    Registry::builder()
        .query("list_scene_objects", |_| Ok(json!(["Cube", "Light"])))
        .query("echo", |params| Ok(Value::Object(params.clone())))
        .action("move_object", |params| {
            let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
            Err(ExecutorError::not_found(format!("Object not found: {name}")))
        })
        .build()
}

async fn socket_pair() -> (RawPeer, RawPeer) {
    let (server, client) = tokio::io::duplex(64 * 1024);
    let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
    let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
    (server, client)
}

/// An answering channel on the server side and a calling channel on the
/// client side.
async fn channel_pair(registry: Registry, client_options: ChannelOptions) -> (Channel, Channel) {
    let (server, client) = socket_pair().await;
    let dispatcher = Arc::new(Dispatcher::inline(registry));
    let server = Channel::from_stream(
        server,
        "client",
        ChannelOptions::default().with_dispatcher(dispatcher),
    );
    let client = Channel::from_stream(client, "server", client_options);
    (server, client)
}

/// A calling channel whose peer is driven by hand.
async fn channel_with_raw_peer(options: ChannelOptions) -> (Channel, RawPeer) {
    let (server, client) = socket_pair().await;
    (Channel::from_stream(client, "raw-server", options), server)
}

/// An answering channel whose caller is driven by hand.
async fn answering_channel_with_raw_peer(registry: Registry) -> (Channel, RawPeer) {
    let (server, client) = socket_pair().await;
    let dispatcher = Arc::new(Dispatcher::inline(registry));
    let channel = Channel::from_stream(
        server,
        "raw-client",
        ChannelOptions::default().with_dispatcher(dispatcher),
    );
    (channel, client)
}

async fn next_text(peer: &mut RawPeer) -> String {
    loop {
        match peer.next().await {
            Some(Ok(WsMessage::Text(text))) => return text,
            Some(Ok(_)) => {}
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

async fn next_json(peer: &mut RawPeer) -> Value {
    let text = next_text(peer).await;
    serde_json::from_str(&text).expect("peer sent JSON")
}

fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

#[rstest]
#[tokio::test]
async fn call_receives_its_response(registry: Registry) {
    let (server, client) = channel_pair(registry, ChannelOptions::default()).await;
    assert_eq!(client.state(), ChannelState::Open);

    let outcome = client
        .call("list_scene_objects", Params::new())
        .await
        .expect("call");
    assert_eq!(
        outcome,
        Outcome::Result(json!({"status": "success", "data": ["Cube", "Light"]}))
    );
    assert_eq!(client.pending_requests(), 0);

    client.close().await;
    server.closed().await;
}

#[rstest]
#[tokio::test]
async fn executor_failure_arrives_as_failure_outcome(registry: Registry) {
    let (_server, client) = channel_pair(registry, ChannelOptions::default()).await;
    let outcome = client
        .call(
            "move_object",
            params(json!({"name": "Ghost", "location": [1, 2, 3]})),
        )
        .await
        .expect("call");
    assert_eq!(
        outcome,
        Outcome::failure(ErrorCode::EntityNotFound, "Object not found: Ghost")
    );
    assert_eq!(client.state(), ChannelState::Open);
}

#[rstest]
#[tokio::test]
async fn concurrent_calls_are_matched_to_their_callers(registry: Registry) {
    let (_server, client) = channel_pair(registry, ChannelOptions::default()).await;

    let calls = (0..24).map(|index| {
        let client = client.clone();
        tokio::spawn(async move {
            let outcome = client
                .call("echo", params(json!({"index": index})))
                .await
                .expect("call");
            (index, outcome)
        })
    });
    let results = futures::future::join_all(calls).await;

    assert_eq!(results.len(), 24);
    for joined in results {
        let (index, outcome) = joined.expect("task");
        assert_eq!(
            outcome,
            Outcome::Result(json!({"status": "success", "data": {"index": index}}))
        );
    }
    assert_eq!(client.pending_requests(), 0);
}

#[rstest]
#[tokio::test]
async fn reply_with_other_identifier_does_not_wake_caller() {
    let (client, mut peer) = channel_with_raw_peer(ChannelOptions::default()).await;

    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.call("list_scene_objects", Params::new()).await })
    };
    let request = next_json(&mut peer).await;
    let id = request["id"].as_i64().expect("integer id");

    let stray = json!({"jsonrpc": "2.0", "result": "wrong", "id": id + 1000});
    peer.send(WsMessage::Text(stray.to_string())).await.expect("send");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!call.is_finished(), "caller woke on another id's reply");
    assert_eq!(client.pending_requests(), 1);

    let reply = json!({"jsonrpc": "2.0", "result": "right", "id": id});
    peer.send(WsMessage::Text(reply.to_string())).await.expect("send");
    let outcome = call.await.expect("task").expect("call");
    assert_eq!(outcome, Outcome::Result(json!("right")));
}

#[rstest]
#[tokio::test]
async fn malformed_reply_fails_its_caller_locally() {
    let (client, mut peer) = channel_with_raw_peer(ChannelOptions::default()).await;

    let call = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .call_without_timeout("list_scene_objects", Params::new())
                .await
        })
    };
    let request = next_json(&mut peer).await;
    let id = request["id"].as_i64().expect("integer id");

    let reply = json!({"jsonrpc": "2.0", "error": {"code": "bad"}, "id": id});
    peer.send(WsMessage::Text(reply.to_string())).await.expect("send");
    let outcome = tokio::time::timeout(Duration::from_secs(2), call)
        .await
        .expect("caller released without a timeout")
        .expect("task")
        .expect("call");

    assert!(matches!(
        outcome,
        Outcome::Failure(ErrorObject { code: ErrorCode::InvalidRequest, .. })
    ));
    assert_eq!(client.pending_requests(), 0);
    assert_eq!(client.state(), ChannelState::Open);
}

#[rstest]
#[tokio::test]
async fn malformed_reply_is_not_answered(registry: Registry) {
    let (channel, mut peer) = answering_channel_with_raw_peer(registry).await;

    peer.send(WsMessage::Text(r#"{"jsonrpc":"2.0","error":{"code":"bad"},"id":3}"#.to_owned()))
        .await
        .expect("send");
    let request = json!({"jsonrpc": "2.0", "method": "list_scene_objects", "id": 4});
    peer.send(WsMessage::Text(request.to_string())).await.expect("send");

    let reply = next_json(&mut peer).await;
    assert_eq!(reply["id"], json!(4));
    assert_eq!(channel.state(), ChannelState::Open);
}

#[rstest]
#[tokio::test]
async fn malformed_payload_yields_one_parse_error_and_stays_open(registry: Registry) {
    let (channel, mut peer) = answering_channel_with_raw_peer(registry).await;

    peer.send(WsMessage::Text("this is not json".to_owned()))
        .await
        .expect("send");
    let reply = next_json(&mut peer).await;
    assert_eq!(reply["error"]["code"], json!(-32700));
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(channel.state(), ChannelState::Open);

    let request = json!({"jsonrpc": "2.0", "method": "list_scene_objects", "params": {}, "id": 1});
    peer.send(WsMessage::Text(request.to_string())).await.expect("send");
    let reply = next_json(&mut peer).await;
    assert_eq!(
        reply,
        json!({
            "jsonrpc": "2.0",
            "result": {"status": "success", "data": ["Cube", "Light"]},
            "id": 1
        })
    );
}

#[rstest]
#[tokio::test]
async fn request_without_method_is_answered_as_invalid(registry: Registry) {
    let (_channel, mut peer) = answering_channel_with_raw_peer(registry).await;

    peer.send(WsMessage::Text(r#"{"jsonrpc":"2.0","params":{},"id":5}"#.to_owned()))
        .await
        .expect("send");
    let reply = next_json(&mut peer).await;
    assert_eq!(reply["error"]["code"], json!(-32600));
    assert_eq!(reply["id"], json!(5));
}

#[rstest]
#[tokio::test]
async fn unknown_operation_is_answered_with_method_not_found(registry: Registry) {
    let (_server, client) = channel_pair(registry, ChannelOptions::default()).await;
    let outcome = client.call("teleport", Params::new()).await.expect("call");
    assert!(matches!(
        outcome,
        Outcome::Failure(ErrorObject { code: ErrorCode::MethodNotFound, .. })
    ));
}

#[rstest]
#[tokio::test]
async fn channel_without_dispatcher_declines_requests() {
    let (_client, mut peer) = channel_with_raw_peer(ChannelOptions::default()).await;

    let request = json!({"jsonrpc": "2.0", "method": "list_scene_objects", "params": {}, "id": 3});
    peer.send(WsMessage::Text(request.to_string())).await.expect("send");
    let reply = decode(&next_text(&mut peer).await).expect("decode");
    assert!(matches!(
        reply,
        nexus_protocol::Message::Response(Response {
            id: Some(3),
            outcome: Outcome::Failure(ErrorObject { code: ErrorCode::MethodNotFound, .. }),
        })
    ));
}

#[rstest]
#[tokio::test]
async fn binary_utf8_frames_are_accepted(registry: Registry) {
    let (_channel, mut peer) = answering_channel_with_raw_peer(registry).await;

    let request = json!({"jsonrpc": "2.0", "method": "list_scene_objects", "params": {}, "id": 8});
    peer.send(WsMessage::Binary(request.to_string().into_bytes()))
        .await
        .expect("send");
    let reply = next_json(&mut peer).await;
    assert_eq!(reply["id"], json!(8));
    assert_eq!(reply["result"]["status"], json!("success"));
}

#[rstest]
#[tokio::test]
async fn timed_out_call_fails_and_leaves_no_waiter() {
    let options = ChannelOptions::default().with_request_timeout(Duration::from_millis(50));
    let (client, mut peer) = channel_with_raw_peer(options).await;

    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.call("list_scene_objects", Params::new()).await })
    };
    let request = next_json(&mut peer).await;
    let error = call.await.expect("task").expect_err("call should time out");

    assert!(matches!(
        error,
        ChannelError::Timeout { ref method, id, .. }
            if method == "list_scene_objects" && Some(id) == request["id"].as_i64()
    ));
    assert_eq!(client.pending_requests(), 0);
    assert_eq!(client.state(), ChannelState::Open);
}

#[rstest]
#[tokio::test]
async fn peer_disconnect_fails_pending_and_later_calls() {
    let (client, mut peer) = channel_with_raw_peer(ChannelOptions::default()).await;

    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.call_without_timeout("list_scene_objects", Params::new()).await })
    };
    let _request = next_text(&mut peer).await;
    peer.close(None).await.expect("close");
    drop(peer);

    let error = call.await.expect("task").expect_err("pending call must fail");
    assert!(error.is_fatal(), "unexpected error: {error}");

    client.closed().await;
    assert_eq!(client.state(), ChannelState::Closed);
    let error = client
        .call("list_scene_objects", Params::new())
        .await
        .expect_err("closed channel");
    assert!(error.is_fatal());
    assert_eq!(client.pending_requests(), 0);
}

#[rstest]
#[tokio::test]
async fn close_ends_both_sides(registry: Registry) {
    let (server, client) = channel_pair(registry, ChannelOptions::default()).await;
    client.close().await;
    assert_eq!(client.state(), ChannelState::Closed);
    server.closed().await;
    assert_eq!(server.state(), ChannelState::Closed);

    let error = client
        .call("list_scene_objects", Params::new())
        .await
        .expect_err("closed");
    assert!(matches!(error, ChannelError::Closed));
}

#[rstest]
#[tokio::test]
async fn close_is_forced_when_peer_never_answers() {
    let options = ChannelOptions::default().with_close_grace(Duration::from_millis(50));
    let (client, _peer) = channel_with_raw_peer(options).await;

    // The raw peer is never polled, so the close frame is never acknowledged.
    client.close().await;
    assert_eq!(client.state(), ChannelState::Closed);
}

#[rstest]
#[tokio::test]
async fn refused_connection_is_reported() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let address = listener.local_addr().expect("address");
    drop(listener);

    let error = Channel::connect(&format!("ws://{address}"), ChannelOptions::default())
        .await
        .expect_err("nothing listens there");
    assert!(error.is_refused(), "unexpected error: {error}");
}
