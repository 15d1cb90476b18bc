//! Tests for the daemon control API
//!
//! Each test starts a daemon on an ephemeral port with stubbed collaborators
//! and talks to it through the same client the CLI uses.

use appmanager::protocol::{Request, Response};
use release_registry::{InstallRequest, ReleaseStatus};

mod common;
use common::TestDaemon;

fn install(name: &str, chart: &str, host: Option<&str>) -> Request {
    let mut request = InstallRequest::new(name, chart);
    if let Some(host) = host {
        request = request.host(host);
    }
    Request::install(&request)
}

#[smol_potat::test]
async fn test_install_list_uninstall() {
    let daemon = TestDaemon::start().await.unwrap();
    let mut client = daemon.client().await.unwrap();

    let response = client
        .send_request(install("app1", "chart1", Some("ec1-node-70")))
        .await
        .unwrap();
    match response {
        Response::Installed {
            release,
            topic,
            snapshot,
        } => {
            assert_eq!(release.name, "app1");
            assert_eq!(topic, "EC1.NetworkServiceIP");
            assert_eq!(snapshot.len(), 1);
            assert_eq!(snapshot.apps[0].ip, "10.0.0.1");
        }
        other => panic!("unexpected response {:?}", other),
    }

    match client.send_request(Request::ListReleases).await.unwrap() {
        Response::Releases { releases } => {
            assert_eq!(releases.len(), 1);
            assert_eq!(releases[0].status, ReleaseStatus::Deployed);
        }
        other => panic!("unexpected response {:?}", other),
    }

    match client
        .send_request(Request::Uninstall {
            name: "app1".to_string(),
        })
        .await
        .unwrap()
    {
        Response::Uninstalled { release } => {
            assert_eq!(release.status, ReleaseStatus::Deleted);
        }
        other => panic!("unexpected response {:?}", other),
    }

    match client
        .send_request(Request::Status {
            name: "app1".to_string(),
        })
        .await
        .unwrap()
    {
        Response::Error { kind, release, .. } => {
            assert_eq!(kind, "NotFoundError");
            assert_eq!(release.as_deref(), Some("app1"));
        }
        other => panic!("unexpected response {:?}", other),
    }
}

#[smol_potat::test]
async fn test_errors_carry_kind() {
    let daemon = TestDaemon::start().await.unwrap();
    daemon.controller.reject("app2", 500);
    let mut client = daemon.client().await.unwrap();

    let render = client
        .send_request(install("app1", "missing", None))
        .await
        .unwrap();
    assert!(matches!(render, Response::Error { ref kind, .. } if kind == "RenderError"));

    let controller = client
        .send_request(install("app2", "chart", None))
        .await
        .unwrap();
    match controller {
        Response::Error { kind, message, .. } => {
            assert_eq!(kind, "ControllerError");
            assert!(message.contains("500"));
        }
        other => panic!("unexpected response {:?}", other),
    }

    let ghost = client
        .send_request(Request::Uninstall {
            name: "ghost".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(ghost, Response::Error { ref kind, .. } if kind == "NotFoundError"));
}

#[smol_potat::test]
async fn test_get_and_values() {
    let daemon = TestDaemon::start().await.unwrap();
    let mut client = daemon.client().await.unwrap();
    client
        .send_request(install("app1", "chart1", None))
        .await
        .unwrap();

    match client
        .send_request(Request::Get {
            name: "app1".to_string(),
        })
        .await
        .unwrap()
    {
        Response::Release { release } => {
            assert!(release.manifest.contains("Deployment"));
            assert_eq!(release.controller_host, "http://edge-default:8000");
            assert_eq!(release.topic, "EC2.NetworkServiceIP");
        }
        other => panic!("unexpected response {:?}", other),
    }

    match client
        .send_request(Request::GetValues {
            name: "app1".to_string(),
        })
        .await
        .unwrap()
    {
        Response::Values { values } => assert_eq!(values["replicaCount"], 1),
        other => panic!("unexpected response {:?}", other),
    }
}

#[smol_potat::test]
async fn test_invalid_request_keeps_connection() {
    use async_tungstenite::tungstenite::Message;
    use futures::{SinkExt, StreamExt};

    let daemon = TestDaemon::start().await.unwrap();
    let stream = async_net::TcpStream::connect(daemon.addr.as_str())
        .await
        .unwrap();
    let url = format!("ws://{}/", daemon.addr);
    let (mut ws, _) = async_tungstenite::client_async(&url, stream).await.unwrap();

    ws.send(Message::Text(r#"{"type":"Bogus"}"#.into()))
        .await
        .unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    let response: Response = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert!(matches!(response, Response::Error { ref kind, .. } if kind == "InvalidRequest"));

    ws.send(Message::Text(r#"{"type":"ListReleases"}"#.into()))
        .await
        .unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    let response: Response = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert!(matches!(response, Response::Releases { .. }));
}

#[smol_potat::test]
async fn test_shutdown_drains_publishes() {
    let daemon = TestDaemon::start().await.unwrap();
    let mut client = daemon.client().await.unwrap();
    for name in ["app1", "app2", "app3"] {
        client
            .send_request(install(name, "chart", Some("ec2-node-12")))
            .await
            .unwrap();
    }

    let response = client.send_request(Request::Shutdown).await.unwrap();
    assert!(matches!(response, Response::Success));
    daemon.server.await.unwrap();

    let snapshots = daemon.transport.snapshots("EC2.NetworkServiceIP");
    assert_eq!(snapshots.len(), 3);
    assert_eq!(snapshots[2].len(), 3);
}
