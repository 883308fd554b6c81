use std::collections::HashMap;

use serde_json::json;

use crate::integration::common::{
    assert_success, harvest, product_page, read_json, serve, stdout_json, write_json,
};

async fn store_site() -> String {
    let routes = HashMap::from([
        (
            "/restaurantes/1-arredondo?productDetail=11".to_string(),
            (200, product_page("Fugazzeta", "$ 12.500")),
        ),
        (
            "/restaurantes/1-arredondo?productDetail=12".to_string(),
            (200, product_page("Napolitana", "$ 11.000,50")),
        ),
    ]);
    serve(routes).await
}

#[tokio::test]
async fn extract_writes_results_and_error_log() {
    let base = store_site().await;
    let dir = tempfile::tempdir().unwrap();
    write_json(
        &dir.path().join("pizza.json"),
        &json!([
            {
                "store_url": format!("{base}/restaurantes/1-arredondo"),
                "product_id": 11,
                "name": "Fugazzeta"
            },
            {"store_url": format!("{base}/restaurantes/1-arredondo"), "product_id": "12"},
            {"url": format!("{base}/restaurantes/1-arredondo?productDetail=404"), "name": "Gone"},
        ]),
    );

    let output = harvest(dir.path(), &["extract", "--jobs", "pizza.json", "-c", "2"]).await;
    assert_success(&output);

    let summary = stdout_json(&output);
    assert_eq!(summary["results"], 2);
    assert_eq!(summary["errors"], 1);
    assert_eq!(summary["errors_by_kind"]["http_status_error"], 1);

    let results = read_json(&dir.path().join("scraped_pizza.json"));
    let names: Vec<_> = results.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Fugazzeta", "Napolitana"]);
    assert_eq!(results[0]["kind"], "product");
    assert_eq!(results[0]["price"], 12500.0);
    assert_eq!(results[1]["price"], 11000.5);
    assert_eq!(
        results[0]["store_url"],
        format!("{base}/restaurantes/1-arredondo")
    );
    assert_eq!(results[0]["options"][0]["name"], "Extra queso");

    let errors = read_json(&dir.path().join("errors_pizza.json"));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["error_type"], "http_status_error");
    assert_eq!(errors[0]["status_code"], 404);
    assert_eq!(errors[0]["entity_name"], "Gone");
}

#[tokio::test]
async fn extract_window_policy_with_minimal_fields() {
    let base = store_site().await;
    let dir = tempfile::tempdir().unwrap();
    write_json(
        &dir.path().join("jobs.json"),
        &json!([
            {"url": format!("{base}/restaurantes/1-arredondo?productDetail=11")},
            {"url": format!("{base}/restaurantes/1-arredondo?productDetail=12")},
        ]),
    );

    let output = harvest(
        dir.path(),
        &[
            "extract",
            "--jobs",
            "jobs.json",
            "--output",
            "out/products.json",
            "--errors",
            "out/failures.json",
            "--policy",
            "window",
            "-c",
            "1",
            "--no-descriptions",
            "--no-images",
            "--no-options",
        ],
    )
    .await;
    assert_success(&output);

    let results = read_json(&dir.path().join("out/products.json"));
    assert_eq!(results.len(), 2);
    for record in &results {
        assert!(record.get("description").is_none());
        assert!(record.get("image_url").is_none());
        assert!(record.get("options").is_none());
    }
    assert!(read_json(&dir.path().join("out/failures.json")).is_empty());
}

#[tokio::test]
async fn extract_reports_unreachable_targets_without_failing() {
    let dir = tempfile::tempdir().unwrap();
    write_json(
        &dir.path().join("jobs.json"),
        &json!([{"url": "http://127.0.0.1:1/closed"}, {"url": "ftp://example.com/x"}]),
    );

    let output = harvest(dir.path(), &["extract", "--jobs", "jobs.json"]).await;
    assert_success(&output);

    assert!(read_json(&dir.path().join("scraped_jobs.json")).is_empty());
    let errors = read_json(&dir.path().join("errors_jobs.json"));
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e["error_type"] == "transport_error"));
}

#[tokio::test]
async fn extract_fails_on_missing_jobs_file() {
    let dir = tempfile::tempdir().unwrap();

    let output = harvest(dir.path(), &["extract", "--jobs", "nope.json"]).await;

    assert!(!output.status.success());
    assert!(!dir.path().join("scraped_nope.json").exists());
}

#[tokio::test]
async fn extract_rejects_zero_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    write_json(&dir.path().join("jobs.json"), &json!([]));

    let output = harvest(dir.path(), &["extract", "--jobs", "jobs.json", "-c", "0"]).await;

    assert!(!output.status.success());
    assert!(!dir.path().join("scraped_jobs.json").exists());
}
