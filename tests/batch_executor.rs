//! Batch executor properties: cardinality, group isolation, degradation and
//! the concurrency cap, all against the scripted gateway.

mod common;

use std::time::Duration;

use screenflow::batch::{score_batch, BatchOptions, Profile, WorkItem};
use screenflow::gateway::ProviderError;
use screenflow::repair::PLACEHOLDER_GAP;

use common::{ids_in_request, scores_response, FakeGateway};

fn items(n: usize) -> Vec<WorkItem> {
    (0..n)
        .map(|i| WorkItem {
            id: format!("item-{i}"),
            fields: serde_json::Map::new(),
        })
        .collect()
}

fn options(group_size: usize, max_concurrency: usize) -> BatchOptions {
    BatchOptions {
        group_size,
        max_concurrency,
        ..BatchOptions::default()
    }
}

#[tokio::test]
async fn output_matches_input_ids_in_order() {
    let gateway = FakeGateway::new(|req| Ok(scores_response(&ids_in_request(req), 70)));
    let outcome = score_batch(gateway.clone(), &Profile::default(), items(7), options(3, 2)).await;

    assert_eq!(outcome.total, 7);
    assert_eq!(outcome.results.len(), 7);
    let got: Vec<&str> = outcome.results.iter().map(|r| r.id.as_str()).collect();
    let want: Vec<String> = (0..7).map(|i| format!("item-{i}")).collect();
    assert_eq!(got, want.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(outcome.degraded_groups, 0);
    // 7 items in groups of 3 is 3 calls.
    assert_eq!(gateway.calls(), 3);
}

#[tokio::test]
async fn total_failure_degrades_every_item_to_placeholders() {
    let gateway = FakeGateway::new(|_| Err(ProviderError::unavailable("oracle down")));
    let outcome = score_batch(gateway, &Profile::default(), items(5), options(2, 3)).await;

    assert_eq!(outcome.results.len(), 5);
    assert_eq!(outcome.degraded_groups, 3);
    for result in &outcome.results {
        assert_eq!(result.score, 0);
        assert!(result.is_placeholder());
        assert_eq!(result.gaps, vec![PLACEHOLDER_GAP.to_string()]);
        assert!(result.breakdown.values().all(|&v| v == 0));
    }
}

#[tokio::test]
async fn failing_group_does_not_touch_its_neighbours() {
    // Three groups of two; the group containing item-2 times out.
    let gateway = FakeGateway::new(|req| {
        let ids = ids_in_request(req);
        if ids.iter().any(|id| id == "item-2") {
            Err(ProviderError::timeout(Duration::from_secs(120)))
        } else {
            Ok(scores_response(&ids, 82))
        }
    });
    let outcome = score_batch(gateway, &Profile::default(), items(6), options(2, 3)).await;

    assert_eq!(outcome.results.len(), 6);
    assert_eq!(outcome.degraded_groups, 1);
    for result in &outcome.results {
        if result.id == "item-2" || result.id == "item-3" {
            assert!(result.is_placeholder(), "{} should be degraded", result.id);
        } else {
            assert_eq!(result.score, 82, "{} should be scored", result.id);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_calls_never_exceed_the_cap() {
    let gateway = FakeGateway::with_delay(
        |req| Ok(scores_response(&ids_in_request(req), 60)),
        Duration::from_millis(40),
    );
    let outcome = score_batch(
        gateway.clone(),
        &Profile::default(),
        items(12),
        options(1, 3),
    )
    .await;

    assert_eq!(outcome.results.len(), 12);
    assert_eq!(gateway.calls(), 12);
    assert!(
        gateway.max_in_flight() <= 3,
        "saw {} concurrent calls",
        gateway.max_in_flight()
    );
}

#[tokio::test]
async fn forty_five_items_make_three_groups() {
    let gateway = FakeGateway::new(|req| Ok(scores_response(&ids_in_request(req), 55)));
    let outcome = score_batch(
        gateway.clone(),
        &Profile::default(),
        items(45),
        options(20, 3),
    )
    .await;

    // 20 + 20 + 5.
    assert_eq!(gateway.calls(), 3);
    assert_eq!(outcome.results.len(), 45);
    assert!(outcome.results.iter().all(|r| r.score == 55));
}

#[tokio::test]
async fn oracle_noise_is_repaired_per_group() {
    // The oracle covers only the first id of each group and invents one.
    let gateway = FakeGateway::new(|req| {
        let ids = ids_in_request(req);
        let mut covered = vec![ids[0].clone(), "phantom-item".to_string()];
        covered.truncate(2);
        Ok(scores_response(&covered, 77))
    });
    let outcome = score_batch(gateway, &Profile::default(), items(4), options(2, 2)).await;

    assert_eq!(outcome.results.len(), 4);
    assert!(outcome.results.iter().all(|r| r.id != "phantom-item"));
    assert_eq!(outcome.results[0].score, 77);
    assert!(outcome.results[1].is_placeholder());
    assert_eq!(outcome.results[2].score, 77);
    assert!(outcome.results[3].is_placeholder());
}
