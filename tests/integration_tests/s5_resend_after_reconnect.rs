// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use retryrpc_rs::registry::Registry;
use retryrpc_rs::wire::{MessageType, ReplyEnvelope, RequestEnvelope, read_frame, write_frame};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::integration_tests::common::start_server;

#[derive(Deserialize)]
struct CountRequest {}

/// S5: a client that disconnects after the handler ran but before it
/// read the reply gets the cached reply on reconnect, without the
/// handler running a second time for the same request ID.
#[tokio::test]
async fn dropped_connection_resend_hits_the_completed_cache() {
    let registry = Registry::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_for_handler = Arc::clone(&calls);
    registry.register("Count", move |_req: CountRequest| {
        let calls = Arc::clone(&calls_for_handler);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(serde_json::json!({ "seen": true }))
        }
    });

    let harness = start_server(47105, registry, Duration::from_secs(30), Duration::from_secs(600))
        .await
        .expect("start server");

    let envelope = RequestEnvelope {
        method: "Count".to_string(),
        params: serde_json::json!({}),
        my_unique_id: "client-s5".to_string(),
        request_id: 1,
        highest_reply_seen: 0,
    };
    let payload = serde_json::to_vec(&envelope).expect("encode request");

    // First connection: send the request, give the server time to run
    // the handler and attempt the reply write, then drop the socket
    // without ever reading it.
    {
        let (_reader, mut writer) = harness.raw_connect("client-s5").await.expect("raw connect 1");
        write_frame(&mut writer, MessageType::Rpc, &payload, Duration::from_secs(5))
            .await
            .expect("write request 1");
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = writer.shutdown().await;
    }

    // Give the server's service loop time to observe the close and
    // release the session before the reconnect arrives.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Second connection, same identifier, same request ID: must be
    // served from the completed-reply cache.
    let (mut reader, mut writer) = harness.raw_connect("client-s5").await.expect("raw connect 2");
    write_frame(&mut writer, MessageType::Rpc, &payload, Duration::from_secs(5))
        .await
        .expect("write request 2");

    let frame = read_frame(&mut reader, Duration::from_secs(5)).await.expect("read reply");
    assert_eq!(frame.message_type, MessageType::Rpc);
    let reply: ReplyEnvelope = serde_json::from_slice(&frame.payload).expect("parse reply");
    assert!(reply.is_success());
    assert_eq!(reply.request_id, 1);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
