//! Enrichment pass contract tests: unset fields get filled, set fields are
//! never re-queried against the generative API.

use std::path::Path;

use kantine::job::enrich::{CONTENT_TAGS, EnrichmentConfig};
use kantine::job::menu::MenuFetcher;
use kantine::job::reconcile::MenuEntry;
use kantine::job::{Config, Runnable};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(menu_base_url: String, openai_base_url: String, data_dir: &Path) -> Config {
    Config {
        site_data_dir: data_dir.to_path_buf(),
        secret_dir: data_dir.to_path_buf(),
        restaurant_id: "1089".to_string(),
        language_code: "da-DK".to_string(),
        menu_base_url,
        netatmo_base_url: "http://netatmo.invalid".to_string(),
        netatmo_client_id: "id".to_string(),
        netatmo_client_secret: "secret".to_string(),
        netatmo_device_id: "70:ee:50:00:00:01".to_string(),
        netatmo_module_id: "05:00:00:00:00:01".to_string(),
        enrichment: Some(EnrichmentConfig {
            base_url: openai_base_url,
            api_key: "test-key".to_string(),
        }),
    }
}

fn one_day_week(first_date: &str, dish: &str) -> serde_json::Value {
    json!({
        "firstDateOfWeek": first_date,
        "days": [{ "date": first_date, "menus": [{ "menu": dish, "image": null }] }]
    })
}

#[tokio::test]
async fn enrichment_fills_unset_fields_and_never_requeries() {
    let vendor = MockServer::start().await;
    let openai = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    // The first day is already fully enriched; only the second day should
    // cost any generative calls.
    let seeded = json!([{
        "day": "Mandag",
        "date": "2024-03-04",
        "foodName": "Frikadeller",
        "foodContents": ["pork", "meat"],
        "image": "https://example.com/frikadeller.png"
    }]);
    tokio::fs::write(
        dir.path().join("menu.json"),
        serde_json::to_vec(&seeded).unwrap(),
    )
    .await
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/api/WeeklyMenu"))
        .and(query_param_is_missing("date"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(one_day_week("2024-03-04", "Frikadeller")),
        )
        .mount(&vendor)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/WeeklyMenu"))
        .and(query_param("date", "2024-03-11"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(one_day_week("2024-03-11", "Stegt flæsk")),
        )
        .mount(&vendor)
        .await;

    // One yes/no question per content tag, for the one unclassified entry,
    // across both runs.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Yes" } }]
        })))
        .expect(CONTENT_TAGS.len() as u64)
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "url": "https://example.com/generated.png" }]
        })))
        .expect(1)
        .mount(&openai)
        .await;

    let fetcher = MenuFetcher {
        config: config(vendor.uri(), openai.uri(), dir.path()),
    };
    fetcher.run().await.unwrap();
    // Second cycle: everything is enriched now, so the expect() counts above
    // must not grow.
    fetcher.run().await.unwrap();

    let raw = tokio::fs::read(dir.path().join("menu.json")).await.unwrap();
    let entries: Vec<MenuEntry> = serde_json::from_slice(&raw).unwrap();
    assert_eq!(entries.len(), 2);

    assert_eq!(
        entries[0].food_contents,
        Some(vec!["pork".to_string(), "meat".to_string()])
    );
    assert_eq!(
        entries[0].image.as_deref(),
        Some("https://example.com/frikadeller.png")
    );

    let expected_tags: Vec<String> = CONTENT_TAGS.iter().map(|t| t.to_string()).collect();
    assert_eq!(entries[1].food_contents, Some(expected_tags));
    assert_eq!(
        entries[1].image.as_deref(),
        Some("https://example.com/generated.png")
    );
}

#[tokio::test]
async fn classification_failure_leaves_the_entry_for_the_next_cycle() {
    let vendor = MockServer::start().await;
    let openai = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/WeeklyMenu"))
        .and(query_param_is_missing("date"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(one_day_week("2024-03-04", "Suppe")),
        )
        .mount(&vendor)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/WeeklyMenu"))
        .and(query_param("date", "2024-03-11"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(one_day_week("2024-03-11", "Suppe")),
        )
        .mount(&vendor)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "url": "https://example.com/generated.png" }]
        })))
        .mount(&openai)
        .await;

    let fetcher = MenuFetcher {
        config: config(vendor.uri(), openai.uri(), dir.path()),
    };
    // The cycle itself still succeeds; enrichment failures are per entry.
    fetcher.run().await.unwrap();

    let raw = tokio::fs::read(dir.path().join("menu.json")).await.unwrap();
    let entries: Vec<MenuEntry> = serde_json::from_slice(&raw).unwrap();
    assert!(entries.iter().all(|e| e.food_contents.is_none()));
    assert!(entries.iter().all(|e| e.image.is_some()));
}
