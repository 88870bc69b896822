//! End-to-end tests: a controller client against a running daemon server
//! whose commands execute on a dedicated host thread.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use nexus_config::Endpoint;
use nexus_protocol::{ErrorCode, Message, Outcome, Params, decode};
use nexus_rpc::{ChannelOptions, Dispatcher, NexusClient, Plan, StepOutcome, host_queue};
use nexusd::scene::{self, Scene};
use nexusd::{Server, StructuredHealthReporter};
use rstest::rstest;
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as Frame;

struct Daemon {
    server: Server,
    endpoint: Endpoint,
    host: Option<JoinHandle<usize>>,
}

impl Daemon {
    async fn start() -> Self {
        let (handle, host_loop) = host_queue();
        let host = host_loop.spawn("host").expect("host thread");
        let registry = scene::registry(&Scene::with_defaults().shared());
        let dispatcher = Dispatcher::new(registry, Arc::new(handle));
        let options = ChannelOptions::default()
            .with_request_timeout(Duration::from_secs(5))
            .with_dispatcher(Arc::new(dispatcher));
        let mut server = Server::new(
            Endpoint::new("127.0.0.1", 0),
            options,
            Arc::new(StructuredHealthReporter::new()),
        );
        let endpoint = server.start().await.expect("server should start");
        Self {
            server,
            endpoint,
            host: Some(host),
        }
    }

    async fn client(&self) -> NexusClient {
        NexusClient::connect(&self.endpoint.url(), Duration::from_secs(5), Duration::ZERO)
            .await
            .expect("client should connect")
    }

    /// Stops the server and returns how many commands the host thread ran.
    async fn shutdown(mut self) -> usize {
        self.server.stop().await;
        let host = self.host.take().expect("host thread");
        drop(self);
        tokio::task::spawn_blocking(move || host.join().expect("host thread panicked"))
            .await
            .expect("join task")
    }
}

fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        other => panic!("params must be an object, got {other}"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lists_the_default_scene() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;

    let outcome = client
        .channel()
        .call("list_scene_objects", Params::new())
        .await
        .expect("call");
    assert_eq!(
        outcome,
        Outcome::Result(json!({"status": "success", "data": ["Cube", "Light", "Camera"]}))
    );
    assert_eq!(
        client.list_entities().await.expect("list"),
        vec!["Cube", "Light", "Camera"]
    );

    client.close().await;
    assert_eq!(daemon.shutdown().await, 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn moving_a_missing_object_is_a_failure_not_a_crash() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;

    let outcome = client
        .channel()
        .call(
            "move_object",
            params(json!({"name": "Ghost", "location": [1, 2, 3]})),
        )
        .await
        .expect("call");
    let error = outcome.error().expect("failure outcome");
    assert_eq!(error.code, ErrorCode::EntityNotFound);
    assert_eq!(client.entity_detail("Ghost").await.expect("detail"), None);
    assert!(client.entity_detail("Cube").await.expect("detail").is_some());

    daemon.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn a_plan_runs_step_by_step_against_the_scene() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;

    let plan = Plan::from_json(
        r#"[
            {"function": "create_primitive", "params": {"shape": "sphere", "location": [0, 0, 2]}},
            {"function": "move_object", "params": {"name": "Ghost", "location": [1, 1, 1]}},
            {"params": {"name": "Cube"}},
            {"function": "set_object_color", "params": {"name": "Sphere", "color": "blue"}}
        ]"#,
    )
    .expect("plan");
    let report = client.run_plan(&plan).await;

    let outcomes: Vec<_> = report.steps.iter().map(|step| &step.outcome).collect();
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes[0].is_completed());
    assert!(matches!(outcomes[1], StepOutcome::Failed(error) if error.code == ErrorCode::EntityNotFound));
    assert_eq!(outcomes[2], &StepOutcome::Invalid);
    assert!(outcomes[3].is_completed());
    assert!(!report.aborted);

    let detail = client
        .entity_detail("Sphere")
        .await
        .expect("detail")
        .expect("sphere exists");
    assert_eq!(detail["location"], json!([0.0, 0.0, 2.0]));
    assert_eq!(detail["color"], json!([0.0, 0.0, 1.0, 1.0]));

    daemon.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scene_context_describes_the_mentioned_object() {
    let daemon = Daemon::start().await;
    let client = daemon.client().await;

    let context = client
        .scene_context("make the camera look at the cube")
        .await
        .expect("context");
    let mut lines = context.lines();
    assert_eq!(
        lines.next(),
        Some(r#"The scene contains: ["Cube","Light","Camera"]."#)
    );
    let detail = lines.next().expect("detail line");
    assert!(detail.starts_with("Current details for 'Cube': "), "{detail}");

    daemon.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_frames_are_answered_and_the_connection_survives() {
    let daemon = Daemon::start().await;
    let (mut socket, _) = connect_async(daemon.endpoint.url().as_str())
        .await
        .expect("raw connect");

    socket
        .send(Frame::Text("{not json".into()))
        .await
        .expect("send");
    let reply = next_message(&mut socket).await;
    let Message::Response(response) = reply else {
        panic!("expected a response, got {reply:?}");
    };
    assert_eq!(response.id, None);
    assert_eq!(response.outcome.error().map(|error| error.code), Some(ErrorCode::ParseError));

    socket
        .send(Frame::Text(
            r#"{"jsonrpc":"2.0","method":"list_scene_objects","id":41}"#.into(),
        ))
        .await
        .expect("send");
    let Message::Response(response) = next_message(&mut socket).await else {
        panic!("expected a response");
    };
    assert_eq!(response.id, Some(41));
    assert!(response.outcome.is_success());

    socket.close(None).await.expect("close");
    daemon.shutdown().await;
}

async fn next_message<S>(socket: &mut S) -> Message
where
    S: Stream<Item = Result<Frame, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("reply in time")
            .expect("stream open")
            .expect("frame");
        if let Frame::Text(text) = frame {
            return decode(&text).expect("decodable reply");
        }
    }
}
