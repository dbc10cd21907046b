mod common;

use std::time::Duration;

use scanplane_core::model::{Artifact, Endpoint, ScanStatus};
use scanplane_server::serve;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use common::{StubAdapter, build_state_with};

fn artifact() -> Artifact {
    Artifact {
        namespace_id: 1,
        namespace: "library".into(),
        repository: "library/alpine".into(),
        tag: "3.20".into(),
        digest: "sha256:abc".into(),
        kind: "application/vnd.oci.image.manifest.v1+json".into(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_delivers_stopped_over_the_http_hook() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let callback = format!("http://{}", listener.local_addr().unwrap());
    let state = build_state_with(
        StubAdapter::never_ready(),
        &[("HOOK_TRANSPORT", "http"), ("CORE_INTERNAL_URL", callback.as_str())],
    );

    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, state.clone(), async move {
        let _ = stopped.await;
    }));

    state
        .registry
        .create(Endpoint::new("", "http://trivy:8080", "trivy").as_default())
        .await
        .unwrap();
    let id = state.controller.scan(&artifact()).await.unwrap();

    // `Running` arrives through the server's own hook route.
    let mut running = false;
    for _ in 0..250 {
        let row = state.results.get(id).await.unwrap().unwrap();
        if row.status == ScanStatus::Running {
            running = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(running, "scan never reported Running");

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();

    assert!(!state.runtime.is_running());
    let row = state.results.get(id).await.unwrap().unwrap();
    assert_eq!(row.status, ScanStatus::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_hook_endpoint_still_ends_scans() {
    // Nothing listens on the callback address.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let callback = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let state = build_state_with(
        StubAdapter::never_ready(),
        &[
            ("HOOK_TRANSPORT", "http"),
            ("CORE_INTERNAL_URL", callback.as_str()),
            ("HOOK_DELIVERY_ATTEMPTS", "2"),
        ],
    );
    state
        .registry
        .create(Endpoint::new("", "http://trivy:8080", "trivy").as_default())
        .await
        .unwrap();
    let id = state.controller.scan(&artifact()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    state.shutdown().await;
    let row = state.results.get(id).await.unwrap().unwrap();
    assert_eq!(row.status, ScanStatus::Stopped);
}
