use basket_compare::utils::validation::Validate;
use basket_compare::{BasketConfig, BasketPipeline, EtlEngine, LocalStorage};
use httpmock::prelude::*;
use serde_json::json;
use std::io::Read;
use tempfile::TempDir;

fn config_toml(post_endpoint: &str, get_endpoint: &str, output_path: &str) -> String {
    format!(
        r#"
[run]
name = "e2e-basket"

[[items]]
term = "milk"

[[items]]
term = "bread"

[[items]]
term = "cocoa"
mandatory = false

[[backends]]
name = "minor-units"
endpoint = "{post_endpoint}"
method = "POST"
results_path = "results"
price_in_minor_units = true

[backends.fields]
vendor_id = "vendor"
name = "name"
price = "price"

[[backends]]
name = "decimal-text"
endpoint = "{get_endpoint}"
results_path = "data.items"

[backends.fields]
vendor_id = "store.id"
vendor_name = "store.name"
name = "title"
price = "cost"
url = "link"
vendor_available = "store.open"

[extract]
concurrent_requests = 2

[load]
output_path = "{output_path}"
output_formats = ["csv", "json"]
"#
    )
}

fn mock_minor_units(server: &MockServer) {
    let responses = [
        (
            "milk",
            json!({"results": [
                {"vendor": "v1", "name": "milk", "price": 700},
                {"vendor": "v1", "name": "milk chocolate drink", "price": 1500},
                {"vendor": "v2", "name": "milk 3%", "price": 650}
            ]}),
        ),
        (
            "bread",
            json!({"results": [{"vendor": "v1", "name": "bread", "price": 1000}]}),
        ),
        ("cocoa", json!({"results": []})),
    ];
    for (term, body) in responses {
        server.mock(|when, then| {
            when.method(POST).path("/search").json_body(json!({ "q": term }));
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(body);
        });
    }
}

fn mock_decimal_text(server: &MockServer) {
    let store = |id: &str, name: &str| json!({"id": id, "name": name, "open": true});
    let responses = [
        (
            "milk",
            json!({"data": {"items": [
                {"store": store("v3", "Store Three"), "title": "milk", "cost": "7.50",
                 "link": "https://three.example/milk"}
            ]}}),
        ),
        (
            "bread",
            json!({"data": {"items": [
                {"store": store("v3", "Store Three"), "title": "bread", "cost": "9.90"},
                {"store": store("v2", "Store Two"), "title": "bread", "cost": "11.00"}
            ]}}),
        ),
        (
            "cocoa",
            json!({"data": {"items": [
                {"store": store("v2", "Store Two"), "title": "cocoa 500g", "cost": "14.00"}
            ]}}),
        ),
    ];
    for (term, body) in responses {
        server.mock(|when, then| {
            when.method(GET).path("/items").query_param("q", term);
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(body);
        });
    }
}

fn read_entry(archive: &mut zip::ZipArchive<std::io::Cursor<Vec<u8>>>, name: &str) -> String {
    let mut file = archive.by_name(name).unwrap();
    let mut content = String::new();
    file.read_to_string(&mut content).unwrap();
    content
}

#[tokio::test]
async fn test_end_to_end_basket_comparison_with_real_http() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let post_server = MockServer::start();
    let get_server = MockServer::start();
    mock_minor_units(&post_server);
    mock_decimal_text(&get_server);

    let config = BasketConfig::from_toml_str(&config_toml(
        &post_server.url("/search"),
        &get_server.url("/items"),
        &output_path,
    ))?;
    config.validate()?;

    let storage = LocalStorage::new(output_path.clone());
    let pipeline = BasketPipeline::from_config(storage, config)?;
    let engine = EtlEngine::new_with_monitoring(pipeline, false);

    let run = engine.run().await?;
    assert!(run.output_path.ends_with("basket_report.zip"));

    // milk 均價只取單一候選：(6.50 + 7.50) / 2
    let outcome = &run.result.outcome;
    assert_eq!(outcome.averages.get("milk").to_string(), "7.00");
    assert_eq!(outcome.averages.get("bread").to_string(), "10.30");
    assert_eq!(outcome.averages.get("cocoa").to_string(), "14.00");

    let ids: Vec<_> = outcome
        .ranking
        .baskets()
        .iter()
        .map(|b| b.vendor_id.as_str())
        .collect();
    assert_eq!(ids, vec!["v1", "v3", "v2"]);
    assert_eq!(outcome.ranking.most_expensive().unwrap().vendor_id, "v2");

    let zip_data = std::fs::read(temp_dir.path().join("basket_report.zip"))?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data))?;
    assert_eq!(archive.len(), 3);

    let ranking = read_entry(&mut archive, "basket_ranking.csv");
    let lines: Vec<&str> = ranking.lines().collect();
    assert_eq!(lines[1], "1,complete,v1,v1,17.00,14.00,31.00,cocoa,,,,,");
    assert_eq!(lines[2], "2,complete,v3,Store Three,17.40,14.00,31.40,cocoa,,true,,,");
    // v2 的店名與營業狀態來自第二個後端
    assert_eq!(lines[3], "3,complete,v2,Store Two,31.50,0.00,31.50,,,true,,,");

    let items = read_entry(&mut archive, "basket_items.csv");
    assert!(items.contains("v1,milk,resolved,milk,7.00,,price_band"));
    assert!(items.contains("v3,milk,resolved,milk,7.50,https://three.example/milk,sole_candidate"));

    let report: serde_json::Value =
        serde_json::from_str(&read_entry(&mut archive, "basket_report.json"))?;
    assert_eq!(report["run"], "e2e-basket");
    assert_eq!(report["ranking"]["status"], "complete");
    assert_eq!(report["ranking"]["most_expensive"]["vendor_id"], "v2");
    assert_eq!(report["statistics"]["complete_vendors"], 3);
    assert_eq!(report["statistics"]["min_total"], "31.00");
    assert_eq!(report["statistics"]["max_total"], "31.50");

    Ok(())
}

#[tokio::test]
async fn test_failing_backend_does_not_abort_the_run() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let post_server = MockServer::start();
    let get_server = MockServer::start();
    mock_minor_units(&post_server);
    let down = get_server.mock(|when, then| {
        when.method(GET).path("/items");
        then.status(503);
    });

    let config = BasketConfig::from_toml_str(&config_toml(
        &post_server.url("/search"),
        &get_server.url("/items"),
        &output_path,
    ))?;
    let pipeline = BasketPipeline::from_config(LocalStorage::new(output_path.clone()), config)?;

    let run = EtlEngine::new(pipeline).run().await?;

    down.assert_hits(3);
    // 只剩 v1 同時有 milk 與 bread
    let cheapest = run.result.outcome.ranking.cheapest().unwrap();
    assert_eq!(cheapest.vendor_id, "v1");
    assert_eq!(cheapest.estimated_terms, vec!["cocoa"]);
    assert!(temp_dir.path().join("basket_report.zip").exists());

    Ok(())
}

#[tokio::test]
async fn test_no_complete_basket_falls_back_to_near_complete() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let post_server = MockServer::start();
    let get_server = MockServer::start();
    // 每家店各只有一個必要品項
    post_server.mock(|when, then| {
        when.method(POST).path("/search").json_body(json!({"q": "milk"}));
        then.status(200)
            .json_body(json!({"results": [{"vendor": "v1", "name": "milk", "price": 700}]}));
    });
    post_server.mock(|when, then| {
        when.method(POST).path("/search").json_body(json!({"q": "bread"}));
        then.status(200)
            .json_body(json!({"results": [{"vendor": "v2", "name": "bread", "price": 1000}]}));
    });
    post_server.mock(|when, then| {
        when.method(POST).path("/search").json_body(json!({"q": "cocoa"}));
        then.status(200).json_body(json!({"results": []}));
    });
    get_server.mock(|when, then| {
        when.method(GET).path("/items");
        then.status(200).json_body(json!({"data": {"items": []}}));
    });

    let config = BasketConfig::from_toml_str(&config_toml(
        &post_server.url("/search"),
        &get_server.url("/items"),
        &output_path,
    ))?;
    let pipeline = BasketPipeline::from_config(LocalStorage::new(output_path), config)?;

    let run = EtlEngine::new(pipeline).run().await?;

    let ranking = &run.result.outcome.ranking;
    assert_eq!(ranking.status(), "near_complete");
    let ids: Vec<_> = ranking.baskets().iter().map(|b| b.vendor_id.as_str()).collect();
    // v1: 7.00 + 10.00 (bread 均價), v2: 10.00 + 7.00
    assert_eq!(ids, vec!["v1", "v2"]);
    assert!(ranking.cheapest().is_none());

    Ok(())
}
