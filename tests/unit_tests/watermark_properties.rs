// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use retryrpc_rs::client::pending::AckWatermark;

/// Property 3: the watermark is non-decreasing and lands on `N` once
/// every ID in `1..=N` has arrived, regardless of arrival order.
#[test]
fn reaches_n_after_every_permutation_of_one_to_n() {
    let orders: &[&[u64]] = &[
        &[1, 2, 3, 4, 5],
        &[5, 4, 3, 2, 1],
        &[3, 1, 4, 5, 2],
        &[2, 4, 1, 5, 3],
    ];

    for order in orders {
        let mut w = AckWatermark::new();
        let mut previous = 0;
        for &id in *order {
            w.update_highest_consecutive_num(id);
            assert!(w.highest_consecutive() >= previous, "watermark regressed");
            previous = w.highest_consecutive();
        }
        assert_eq!(w.highest_consecutive(), 5);
        assert_eq!(w.pending_count(), 0);
    }
}
