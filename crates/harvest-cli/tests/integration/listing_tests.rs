use std::collections::HashMap;

use serde_json::json;

use crate::integration::common::{
    assert_success, harvest, listing_page, read_json, serve, stdout_json, write_json,
};

#[tokio::test]
async fn listing_collects_each_category_into_one_store() {
    let routes = HashMap::from([
        (
            "/restaurantes?category=pizza".to_string(),
            (
                200,
                listing_page(&[
                    ("/restaurantes/1-guerrin", "Güerrín"),
                    ("/restaurantes/2-el-cuartito", "El Cuartito"),
                    ("/restaurantes/1-guerrin", "Güerrín"),
                ]),
            ),
        ),
        (
            "/restaurantes?category=empanadas".to_string(),
            (
                200,
                listing_page(&[
                    ("/restaurantes/1-guerrin", "Güerrín"),
                    ("/restaurantes/3-la-morada", "La Morada"),
                ]),
            ),
        ),
    ]);
    let base = serve(routes).await;
    let dir = tempfile::tempdir().unwrap();
    write_json(
        &dir.path().join("categories.json"),
        &json!([
            {
                "url": format!("{base}/restaurantes?category=pizza"),
                "category": "Pizza",
                "category_index": 0
            },
            {
                "url": format!("{base}/restaurantes?category=empanadas"),
                "category": "Empanadas",
                "category_index": 1
            },
            {
                "url": format!("{base}/restaurantes?category=sushi"),
                "category": "Sushi",
                "category_index": 2
            },
        ]),
    );

    let output = harvest(
        dir.path(),
        &[
            "listing",
            "--jobs",
            "categories.json",
            "--output",
            "restaurants.json",
            "-c",
            "3",
        ],
    )
    .await;
    assert_success(&output);

    let report = stdout_json(&output);
    assert_eq!(report["passes"], 3);
    assert_eq!(report["stats"]["seen"], 5);
    assert_eq!(report["stats"]["duplicates"], 1);
    assert_eq!(report["stats"]["appended"], 4);
    assert_eq!(report["stored_before"], 0);
    assert_eq!(report["stored_after"], 4);

    let stored = read_json(&dir.path().join("restaurants.json"));
    assert_eq!(stored.len(), 4);
    // The same store under two categories is kept once per category.
    let guerrin: Vec<_> = stored
        .iter()
        .filter(|s| s["href"] == "/restaurantes/1-guerrin")
        .map(|s| s["category"].as_str().unwrap())
        .collect();
    assert_eq!(guerrin.len(), 2);
    assert!(guerrin.contains(&"Pizza") && guerrin.contains(&"Empanadas"));
    let morada = stored
        .iter()
        .find(|s| s["href"] == "/restaurantes/3-la-morada")
        .unwrap();
    assert_eq!(morada["category_index"], 1);
    assert_eq!(morada["url"], format!("{base}/restaurantes/3-la-morada"));
    assert_eq!(morada["rating"], 4.5);

    let errors = read_json(&dir.path().join("errors_categories.json"));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["error_type"], "http_status_error");
}

#[tokio::test]
async fn listing_appends_to_an_existing_store() {
    let base = serve(HashMap::from([(
        "/restaurantes?category=helado".to_string(),
        (200, listing_page(&[("/restaurantes/9-cadore", "Cadore")])),
    )]))
    .await;
    let dir = tempfile::tempdir().unwrap();
    write_json(
        &dir.path().join("categories.json"),
        &json!([{"url": format!("{base}/restaurantes?category=helado"), "category": "Helado"}]),
    );
    write_json(
        &dir.path().join("restaurants.json"),
        &json!([{
            "href": "/restaurantes/5-pertutti",
            "name": "Pertutti",
            "url": "https://example.com/restaurantes/5-pertutti"
        }]),
    );

    let output = harvest(
        dir.path(),
        &["listing", "-j", "categories.json", "-o", "restaurants.json", "--no-ratings"],
    )
    .await;
    assert_success(&output);

    let report = stdout_json(&output);
    assert_eq!(report["stored_before"], 1);
    assert_eq!(report["stored_after"], 2);

    let stored = read_json(&dir.path().join("restaurants.json"));
    assert_eq!(stored[0]["name"], "Pertutti");
    assert_eq!(stored[1]["name"], "Cadore");
    assert!(stored[1].get("rating").is_none());
}
