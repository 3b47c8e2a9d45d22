// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use retryrpc_rs::registry::Registry;
use serde::Deserialize;

use crate::integration_tests::common::start_server;

#[derive(Deserialize)]
struct PingRequest {
    message: String,
}

/// S3: calling an unregistered method name yields the stable
/// not-found sentinel, and the miss itself is still cached like any
/// other completed request.
#[tokio::test]
async fn unknown_method_yields_not_found_sentinel() {
    let registry = Registry::new();
    registry.register("Ping", |req: PingRequest| async move {
        Ok::<_, String>(serde_json::json!({ "message": format!("pong {} bytes", req.message.len()) }))
    });
    registry.register("PingErr", |_req: PingRequest| async move {
        Err::<serde_json::Value, _>("bad ping".to_string())
    });

    let harness = start_server(47103, registry, Duration::from_secs(30), Duration::from_secs(600))
        .await
        .expect("start server");
    let client = harness.connect("client-s3").await.expect("connect client");

    client.send("Ping", serde_json::json!({"message": "hi"})).await.expect("ping call");
    let _ = client.send("PingErr", serde_json::json!({"message": "hi"})).await;

    let err = client
        .send("NoSuch", serde_json::json!({}))
        .await
        .expect_err("expected not-found error");
    assert!(err.is_not_found());

    assert_eq!(harness.server.completed_count().await, 3);
}
