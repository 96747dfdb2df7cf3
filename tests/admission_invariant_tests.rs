mod common;

use common::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use snare::download::task::{DownloadSnapshot, DownloadState};
use std::collections::HashMap;
use std::collections::HashSet;

const DOMAINS: [&str; 3] = ["a.com", "b.com", "c.com"];

fn running_per_domain(downloads: &[DownloadSnapshot]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for d in downloads.iter().filter(|d| d.state == DownloadState::Running) {
        *counts.entry(d.domain.clone()).or_insert(0) += 1;
    }
    counts
}

/// Random interleavings of scheduling, stops and process exits never let a
/// domain exceed its limit, and every slot is returned in the end.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_random_workload_respects_domain_limit() {
    for seed in 0..5u64 {
        run_workload(seed).await;
    }
}

async fn run_workload(seed: u64) {
    let temp_dir = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new();
    let max_per_domain = 2;
    let manager = create_test_manager(
        create_test_config(temp_dir.path(), max_per_domain),
        runner.clone(),
    );
    let mut rng = StdRng::seed_from_u64(seed);

    // Producers add concurrently with the scheduler
    let mut producers = Vec::new();
    for p in 0..4 {
        let manager = manager.clone();
        let domains: Vec<&'static str> = (0..10)
            .map(|_| DOMAINS[rng.gen_range(0..DOMAINS.len())])
            .collect();
        producers.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for (i, domain) in domains.into_iter().enumerate() {
                let url = format!("https://{}/p{}/{}", domain, p, i);
                ids.push(add_queued(&manager, &url).await);
                tokio::task::yield_now().await;
            }
            ids
        }));
    }
    let scheduler = manager.spawn_queue_loop();

    let mut all_ids = Vec::new();
    for producer in producers {
        all_ids.extend(producer.await.unwrap());
    }
    assert_eq!(all_ids.iter().collect::<HashSet<_>>().len(), 40);

    let mut finished = HashSet::new();
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(30);

    while finished.len() < all_ids.len() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "seed {}: workload did not drain",
            seed
        );

        let snapshot = manager.snapshot().await;
        for (domain, running) in running_per_domain(&snapshot) {
            assert!(
                running <= max_per_domain,
                "seed {}: {} has {} running",
                seed,
                domain,
                running
            );
        }

        for download in &snapshot {
            if download.state.is_terminal() {
                finished.insert(download.id);
                continue;
            }
            if finished.contains(&download.id) {
                // Result already sent, waiting for the watcher
                continue;
            }
            match (download.state, rng.gen_range(0..10)) {
                (DownloadState::Queued, 0) => {
                    // May race with the scheduler starting it; both outcomes are fine
                    let _ = manager.stop(download.id).await;
                }
                (DownloadState::Running, 0..=2) => {
                    runner.succeed(download.id, vec![]);
                    finished.insert(download.id);
                }
                (DownloadState::Running, 3) => {
                    runner.fail(download.id, "boom");
                    finished.insert(download.id);
                }
                (DownloadState::Running, 4) => {
                    let _ = manager.stop(download.id).await;
                }
                _ => {}
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    scheduler.abort();

    // Let the watchers deliver the last results
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            let snapshot = manager.snapshot().await;
            if snapshot.iter().all(|d| d.state.is_terminal()) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("seed {}: downloads left running", seed));

    for domain in DOMAINS {
        assert_eq!(
            manager.active_for_domain(domain).await,
            0,
            "seed {}: slots leaked for {}",
            seed,
            domain
        );
    }
    // Every start went through the runner at most once
    let started = runner.started_ids();
    assert_eq!(started.iter().collect::<HashSet<_>>().len(), started.len());
}
