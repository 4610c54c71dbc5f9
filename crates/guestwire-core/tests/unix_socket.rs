//! Host session against the agent's real socket server.

mod common;

use common::{temp_file, temp_path};
use guestwire_agent::config::AgentConfig;
use guestwire_agent::server;
use guestwire_core::{
    CoreError, RemoteAttributes, RemoteObject, RemoteSession, RemoteValue, SessionConfig,
    StaleReason,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn start_agent() -> PathBuf {
    let socket = temp_path("agent").with_extension("sock");
    let listener = server::bind(&socket).unwrap();
    tokio::spawn(server::serve(listener, AgentConfig::with_socket(&socket)));
    socket
}

async fn connect(socket: &Path) -> RemoteSession {
    let config = SessionConfig::builder()
        .socket(socket)
        .connect_timeout(Duration::from_secs(2))
        .call_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    RemoteSession::connect(&config).await.unwrap()
}

#[tokio::test]
async fn test_round_trips_over_socket() {
    let socket = start_agent();
    let session = connect(&socket).await;

    session.ping().await.unwrap();
    assert_eq!(session.evaluate("1+1").await.unwrap(), RemoteValue::Int(2));

    session.execute("greeting = 'hi ' * 2").await.unwrap();
    assert_eq!(
        session.evaluate("greeting.strip()").await.unwrap(),
        RemoteValue::from("hi hi")
    );

    let err = session.evaluate("1/0").await.unwrap_err();
    assert!(matches!(err, CoreError::Remote(_)));

    let _ = std::fs::remove_file(socket);
}

#[tokio::test]
async fn test_stream_state_lives_in_guest() {
    let socket = start_agent();
    let session = connect(&socket).await;
    let path = temp_file("socket-read", "line one\nline two\n");

    let file: RemoteObject = session
        .builtin("open")
        .call(&[path.as_str().into()], &[])
        .await
        .unwrap()
        .try_into()
        .unwrap();
    let first = file.invoke("readline", &[], &[]).await.unwrap();
    let second = file.invoke("readline", &[], &[]).await.unwrap();
    assert_eq!(first, RemoteValue::from("line one\n"));
    assert_eq!(second, RemoteValue::from("line two\n"));

    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(socket);
}

#[tokio::test]
async fn test_connections_do_not_share_objects() {
    let socket = start_agent();
    let first = connect(&socket).await;
    let second = connect(&socket).await;
    let path = temp_file("socket-isolation", "");

    first
        .execute(&format!("f = open('{path}')"))
        .await
        .unwrap();
    let file = first.evaluate("f").await.unwrap();

    let err = second
        .invoke_builtin("str", &[file], &[])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::StaleReference {
            reason: StaleReason::ForeignRegistry,
            ..
        }
    ));

    // Globals are per connection too.
    let err = second.evaluate("f").await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(guestwire_core::ExceptionKind::NameError));

    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(socket);
}

#[tokio::test]
async fn test_connect_retries_until_agent_appears() {
    let socket = temp_path("late-agent").with_extension("sock");
    let late = socket.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let listener = server::bind(&late).unwrap();
        server::serve(listener, AgentConfig::with_socket(&late)).await;
    });

    let session = connect(&socket).await;
    session.ping().await.unwrap();
    let _ = std::fs::remove_file(socket);
}
