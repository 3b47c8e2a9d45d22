// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::io::Write;

use retryrpc_rs::cfg::config::{ClientConfig, PemSource};

/// `PemSource` resolves either inline text or a file path to the same
/// bytes; `ClientConfig::tls_material` is the only public path that
/// exercises resolution, so the path-based branch is covered through it
/// since `PemSource::resolve` itself is private to the config module.
#[test]
fn trusted_root_reads_pem_bytes_from_a_file_path() {
    let mut path = std::env::temp_dir();
    path.push(format!("retryrpc-test-root-{}.pem", std::process::id()));
    let pem = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";
    std::fs::File::create(&path).expect("create temp pem").write_all(pem.as_bytes()).expect("write temp pem");

    let cfg = ClientConfig {
        my_unique_id: "client-1".to_string(),
        server_addr: "127.0.0.1:0".parse().expect("addr"),
        server_name: "localhost".to_string(),
        trusted_root: PemSource { inline: None, path: Some(path.to_string_lossy().into_owned()) },
        deadline_io: std::time::Duration::from_secs(5),
    };

    let material = cfg.tls_material().expect("resolve trusted root from path");
    assert_eq!(material.trusted_root_pem.expect("root present"), pem.as_bytes());

    std::fs::remove_file(&path).expect("cleanup temp pem");
}
