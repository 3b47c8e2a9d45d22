// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use retryrpc_rs::registry::Registry;
use serde::{Deserialize, Serialize};

use crate::integration_tests::common::start_server;

#[derive(Deserialize)]
struct PingRequest {
    message: String,
}

#[derive(Serialize)]
struct PingReply {
    message: String,
}

/// S1: a registered `Ping` method replies `"pong <len> bytes"` and the
/// server's completed-reply cache holds exactly one entry afterwards.
#[tokio::test]
async fn ping_replies_and_caches_one_completion() {
    let registry = Registry::new();
    registry.register("Ping", |req: PingRequest| async move {
        Ok::<_, String>(PingReply { message: format!("pong {} bytes", req.message.len()) })
    });

    let harness = start_server(47101, registry, Duration::from_secs(30), Duration::from_secs(600))
        .await
        .expect("start server");
    let client = harness.connect("client-s1").await.expect("connect client");

    let reply = client
        .send("Ping", serde_json::json!({"message": "Ping Me!"}))
        .await
        .expect("ping call");
    assert_eq!(reply["message"], "pong 8 bytes");
    assert_eq!(harness.server.completed_count().await, 1);
}
