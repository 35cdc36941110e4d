mod common;

use std::time::Duration;

use common::{echo_handler, fake_server, methods, wait_for_received, FakeServer};
use futures::future::join_all;
use mcp_dock::core::errors::ClientError;
use mcp_dock::core::models::InitializeParams;
use mcp_dock::mcp::launcher::{ContainerRuntime, LaunchSpec};
use mcp_dock::mcp::session::Session;
use mcp_dock::schema::normalizer::{normalize_prompts, normalize_tools};
use serde_json::{json, Map, Value};

fn session_over(server: FakeServer) -> (Session, common::Received) {
    let FakeServer {
        transport,
        received,
        task: _,
    } = server;
    (Session::from_transport("mcp/echo", transport), received)
}

async fn ready_session() -> (Session, common::Received) {
    let (session, received) = session_over(fake_server(echo_handler));
    session
        .initialize(InitializeParams::new("2024-11-05"))
        .await
        .unwrap();
    (session, received)
}

#[tokio::test]
async fn handshake_sends_initialize_then_initialized() {
    let (session, received) = session_over(fake_server(echo_handler));
    let result = session
        .initialize(InitializeParams::new("2024-11-05"))
        .await
        .unwrap();
    assert_eq!(result.server_info.name, "echo");
    assert!(session.is_initialized());

    wait_for_received(&received, 2).await;
    assert_eq!(methods(&received), ["initialize", "notifications/initialized"]);

    let init = received.lock().unwrap()[0].clone();
    assert_eq!(init["params"]["protocolVersion"], "2024-11-05");
    assert_eq!(init["params"]["clientInfo"], json!({"name": "docker", "version": "1.0.0"}));
    assert_eq!(init["params"]["capabilities"], json!({}));
}

#[tokio::test]
async fn second_initialize_fails_without_wire_traffic() {
    let (session, received) = ready_session().await;
    wait_for_received(&received, 2).await;

    let err = session
        .initialize(InitializeParams::new("2024-11-05"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::AlreadyInitialized(_)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(received.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn calls_before_initialize_are_rejected() {
    let (session, received) = session_over(fake_server(echo_handler));
    assert!(matches!(session.list_tools().await, Err(ClientError::NotStarted(_))));
    assert!(matches!(session.list_prompts().await, Err(ClientError::NotStarted(_))));
    assert!(matches!(
        session.call_tool("echo", None).await,
        Err(ClientError::NotStarted(_))
    ));
    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_arguments_get_a_placeholder() {
    let (session, received) = ready_session().await;

    let result = session.call_tool("echo", None).await.unwrap();
    assert_eq!(result.text(), r#"{"args":"..."}"#);

    let result = session.call_tool("echo", Some(Map::new())).await.unwrap();
    assert_eq!(result.text(), r#"{"args":"..."}"#);

    let mut arguments = Map::new();
    arguments.insert("path".to_string(), json!("/tmp/a"));
    let result = session.call_tool("echo", Some(arguments)).await.unwrap();
    assert_eq!(result.text(), r#"{"path":"/tmp/a"}"#);

    let calls: Vec<Value> = received
        .lock()
        .unwrap()
        .iter()
        .filter(|m| m["method"] == "tools/call")
        .cloned()
        .collect();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0]["params"]["name"], "echo");
}

#[tokio::test]
async fn concurrent_tool_calls_are_not_mixed_up() {
    let (session, _) = ready_session().await;
    let calls = (0..12).map(|tag| {
        let session = &session;
        async move {
            let mut arguments = Map::new();
            arguments.insert("tag".to_string(), json!(tag));
            (tag, session.call_tool("echo", Some(arguments)).await.unwrap())
        }
    });
    for (tag, result) in join_all(calls).await {
        assert_eq!(result.text(), format!(r#"{{"tag":{}}}"#, tag));
    }
}

#[tokio::test]
async fn discovery_results_normalize() {
    let (session, _) = ready_session().await;

    let tools = normalize_tools(&session.list_tools().await.unwrap());
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["echo", "write_file"]);

    let echo = &tools[0];
    assert_eq!(echo.arguments[0].arg_type, "array");
    assert_eq!(echo.arguments[0].items.as_ref().unwrap().item_type, "string");

    let write = &tools[1];
    assert_eq!(write.description, "Write a file.");
    let args: Vec<_> = write
        .arguments
        .iter()
        .map(|a| (a.name.as_str(), a.description.as_str(), a.optional))
        .collect();
    assert_eq!(
        args,
        [
            ("content", "what to write", false),
            ("path", "where to write", false),
            ("mode", "unix mode", true),
        ]
    );
    assert_eq!(write.annotations.as_ref().unwrap().destructive_hint, Some(true));

    let prompts = normalize_prompts(&session.list_prompts().await.unwrap());
    let prompt_args: Vec<_> = prompts[0].arguments.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(prompt_args, ["text", "style"]);
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let (mut session, _) = session_over(fake_server(echo_handler));
    assert!(matches!(session.start().await, Err(ClientError::AlreadyStarted(_))));
}

#[tokio::test]
async fn close_before_start_is_rejected() {
    let mut session = Session::new(LaunchSpec::new("mcp/none"), ContainerRuntime::default());
    assert!(!session.is_started());
    assert!(matches!(session.close(false).await, Err(ClientError::NotStarted(_))));
}

#[tokio::test]
async fn failed_spawn_leaves_session_unstarted() {
    let mut session = Session::new(
        LaunchSpec::new("mcp/none"),
        ContainerRuntime::new("/nonexistent/mcp-dock-runtime"),
    );
    assert!(session.start().await.is_err());
    assert!(!session.is_started());
    assert!(matches!(
        session.initialize(InitializeParams::new("2024-11-05")).await,
        Err(ClientError::NotStarted(_))
    ));
}

#[tokio::test]
async fn silent_server_fails_the_handshake() {
    let (session, _) = session_over(fake_server(|_| Vec::new()));
    let session = session.with_handshake_timeout(Duration::from_millis(100));

    let err = session
        .initialize(InitializeParams::new("2024-11-05"))
        .await
        .unwrap_err();
    match err {
        ClientError::Handshake { ref image, ref stderr } => {
            assert_eq!(image, "mcp/echo");
            assert!(stderr.contains("timed out"), "stderr was {stderr:?}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!session.is_initialized());
    assert!(session.transport().unwrap().is_closed());
}

#[tokio::test]
async fn close_stops_the_session() {
    let (mut session, _) = ready_session().await;
    session.close(false).await.unwrap();
    assert!(!session.is_started());
    assert!(matches!(session.list_tools().await, Err(ClientError::NotStarted(_))));
    assert!(matches!(session.close(false).await, Err(ClientError::NotStarted(_))));
}
