use fleetctl::core::router;
use serde_json::Value;
use tokio::sync::oneshot;

#[tokio::test]
async fn test_route_hands_out_ports_round_robin() {
    let listener = router::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(router::serve(listener, vec![20001, 20002], async move {
        let _ = stop_rx.await;
    }));

    let client = reqwest::Client::new();
    let mut ports = Vec::new();
    for _ in 0..3 {
        let body: Value = client
            .get(format!("http://{}/route", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        ports.push(body["port"].as_u64().unwrap());
    }
    assert_eq!(ports, vec![20001, 20002, 20001]);

    let health: Value = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["workers"], 2);

    let listed: Value = client
        .get(format!("http://{}/ports", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["ports"], serde_json::json!([20001, 20002]));

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_bind_conflict_is_server_error() {
    let first = router::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let taken = first.local_addr().unwrap();

    let err = router::bind(taken).await.unwrap_err();
    assert!(matches!(err, fleetctl::FleetError::ServerError { .. }));
}
