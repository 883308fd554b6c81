use std::collections::HashMap;
use std::path::Path;

use harvest_core::ShardWriter;
use harvest_core::models::JobOutcome;
use harvest_core::testutil::make_test_product;
use serde_json::json;

use crate::integration::common::{
    assert_success, harvest, product_page, read_json, serve, stdout_json, write_json,
};

fn write_shard(staging: &Path, index: usize, name: &str) {
    let mut shard = ShardWriter::new(staging, index);
    shard.record(JobOutcome::Extracted(make_test_product(
        name,
        &format!("https://example.com/{index}?productDetail=1"),
    )));
    shard.finish().unwrap();
}

#[tokio::test]
async fn shard_run_merges_worker_shards_in_job_order() {
    let mut routes = HashMap::new();
    for (id, name) in [(1, "Muzzarella"), (2, "Calabresa"), (4, "Fainá"), (5, "Provoleta")] {
        routes.insert(
            format!("/restaurantes/7-guerrin?productDetail={id}"),
            (200, product_page(name, "$ 9.000")),
        );
    }
    let base = serve(routes).await;
    let dir = tempfile::tempdir().unwrap();
    let store = format!("{base}/restaurantes/7-guerrin");
    write_json(
        &dir.path().join("jobs.json"),
        &json!([
            {"store_url": store, "product_id": 1},
            {"store_url": store, "product_id": 2},
            {"store_url": store, "product_id": 3},
            {"store_url": store, "product_id": 4},
            {"store_url": store, "product_id": 5},
        ]),
    );

    let output = harvest(
        dir.path(),
        &["shard-run", "--jobs", "jobs.json", "--workers", "2", "-c", "2"],
    )
    .await;
    assert_success(&output);

    let summary = stdout_json(&output);
    assert_eq!(summary["results"], 4);
    assert_eq!(summary["errors"], 1);

    let results = read_json(&dir.path().join("scraped_jobs.json"));
    let names: Vec<_> = results.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Muzzarella", "Calabresa", "Fainá", "Provoleta"]);

    let errors = read_json(&dir.path().join("errors_jobs.json"));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["url"], format!("{store}?productDetail=3"));

    // Chunks and shards are gone along with the staging directory.
    assert!(!dir.path().join("scraped_jobs.json.shards").exists());
}

#[tokio::test]
async fn shard_run_with_more_workers_than_jobs() {
    let base = serve(HashMap::from([(
        "/restaurantes/7-guerrin?productDetail=1".to_string(),
        (200, product_page("Muzzarella", "$ 9.000")),
    )]))
    .await;
    let dir = tempfile::tempdir().unwrap();
    write_json(
        &dir.path().join("jobs.json"),
        &json!([{"url": format!("{base}/restaurantes/7-guerrin?productDetail=1")}]),
    );

    let output = harvest(
        dir.path(),
        &["shard-run", "--jobs", "jobs.json", "--workers", "4", "--staging-dir", "stage"],
    )
    .await;
    assert_success(&output);

    assert_eq!(read_json(&dir.path().join("scraped_jobs.json")).len(), 1);
    assert!(!dir.path().join("stage").exists());
}

#[tokio::test]
async fn shard_run_refuses_unmerged_shards_until_merged() {
    let dir = tempfile::tempdir().unwrap();
    write_json(&dir.path().join("jobs.json"), &json!([]));
    let staging = dir.path().join("scraped_jobs.json.shards");
    write_shard(&staging, 0, "Leftover");

    let output = harvest(dir.path(), &["shard-run", "--jobs", "jobs.json"]).await;
    assert!(!output.status.success());
    assert!(!dir.path().join("scraped_jobs.json").exists());

    let output = harvest(
        dir.path(),
        &[
            "merge",
            "--staging-dir",
            "scraped_jobs.json.shards",
            "--output",
            "merged.json",
            "--errors",
            "merged_errors.json",
        ],
    )
    .await;
    assert_success(&output);

    let merged = read_json(&dir.path().join("merged.json"));
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0]["name"], "Leftover");
    assert!(read_json(&dir.path().join("merged_errors.json")).is_empty());
    assert!(!staging.exists());
}

#[tokio::test]
async fn merge_fails_when_an_expected_worker_is_absent() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("stage");
    write_shard(&staging, 0, "First");
    write_shard(&staging, 2, "Third");

    let output = harvest(
        dir.path(),
        &[
            "merge",
            "--staging-dir",
            "stage",
            "-o",
            "out.json",
            "-e",
            "errors.json",
            "--expected-workers",
            "3",
        ],
    )
    .await;

    assert!(!output.status.success());
    assert!(!dir.path().join("out.json").exists());
    assert!(!dir.path().join("errors.json").exists());
    // Nothing was consumed.
    assert!(staging.join("shard-0000-results.json").exists());
    assert!(staging.join("shard-0002-errors.json").exists());
}
