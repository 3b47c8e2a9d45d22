// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use retryrpc_rs::client::pending::AckWatermark;

/// S4: out-of-order acks at the client fold into the highest-consecutive
/// watermark exactly as described in the gap-tolerance property — no
/// server or connection involved, so this scenario runs fully in
/// process.
#[test]
fn out_of_order_acks_fold_into_a_monotone_watermark() {
    let mut w = AckWatermark::new();

    w.update_highest_consecutive_num(10);
    w.update_highest_consecutive_num(5);
    w.update_highest_consecutive_num(11);
    assert_eq!(w.highest_consecutive(), 0);
    assert_eq!(w.pending_count(), 3);

    w.update_highest_consecutive_num(4);
    w.update_highest_consecutive_num(3);
    w.update_highest_consecutive_num(2);
    w.update_highest_consecutive_num(1);
    assert_eq!(w.highest_consecutive(), 5);
    assert_eq!(w.pending_count(), 2);

    w.update_highest_consecutive_num(6);
    w.update_highest_consecutive_num(7);
    w.update_highest_consecutive_num(8);
    w.update_highest_consecutive_num(9);
    assert_eq!(w.highest_consecutive(), 11);
    assert_eq!(w.pending_count(), 0);
}
