use crate::domain::model::{BasketStatistics, ComparisonOutcome, Ranking, VendorBasket};
use crate::utils::error::{EtlError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const RANKING_CSV: &str = "basket_ranking.csv";
pub const ITEMS_CSV: &str = "basket_items.csv";
pub const REPORT_JSON: &str = "basket_report.json";

#[derive(Serialize)]
struct RankingRow<'a> {
    rank: usize,
    status: &'static str,
    vendor_id: &'a str,
    vendor_name: &'a str,
    items_total: String,
    imputed_total: String,
    normalized_total: String,
    missing_terms: String,
    estimated_terms: String,
    is_available: Option<bool>,
    delivery_time: &'a str,
    subscription: Option<bool>,
    vendor_url: &'a str,
}

#[derive(Serialize)]
struct ItemRow<'a> {
    vendor_id: &'a str,
    term: &'a str,
    status: &'static str,
    offer_name: &'a str,
    price: String,
    url: &'a str,
    rule: String,
    vendor_url: &'a str,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    run: &'a str,
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    outcome: &'a ComparisonOutcome,
}

pub fn render_ranking_csv(outcome: &ComparisonOutcome) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let status = outcome.ranking.status();

    for (index, basket) in outcome.ranking.baskets().iter().enumerate() {
        writer.serialize(RankingRow {
            rank: index + 1,
            status,
            vendor_id: &basket.vendor_id,
            vendor_name: &basket.vendor_name,
            items_total: basket.items_total.to_string(),
            imputed_total: basket.imputed_total.to_string(),
            normalized_total: basket.normalized_total.to_string(),
            missing_terms: basket.missing_terms.join("; "),
            estimated_terms: basket.estimated_terms.join("; "),
            is_available: basket.metadata.is_available,
            delivery_time: basket.metadata.delivery_time.as_deref().unwrap_or(""),
            subscription: basket.metadata.subscription,
            vendor_url: basket.metadata.url.as_deref().unwrap_or(""),
        })?;
    }

    finish_csv(writer)
}

/// 每家店每個品項一列，缺少的品項也列出
pub fn render_items_csv(outcome: &ComparisonOutcome) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    for vendor in &outcome.vendors {
        let vendor_url = vendor.metadata.url.as_deref().unwrap_or("");
        for item in &outcome.items {
            let row = match vendor.resolved(&item.term) {
                Some(resolved) => ItemRow {
                    vendor_id: &vendor.id,
                    term: &item.term,
                    status: "resolved",
                    offer_name: &resolved.chosen_offer.raw_name,
                    price: resolved.chosen_offer.price.to_string(),
                    url: resolved.chosen_offer.url.as_deref().unwrap_or(""),
                    rule: resolved.rule.to_string(),
                    vendor_url,
                },
                None => ItemRow {
                    vendor_id: &vendor.id,
                    term: &item.term,
                    status: "missing",
                    offer_name: "",
                    price: outcome.averages.get(&item.term).to_string(),
                    url: "",
                    rule: String::new(),
                    vendor_url,
                },
            };
            writer.serialize(row)?;
        }
    }

    finish_csv(writer)
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer.into_inner().map_err(|e| EtlError::ProcessingError {
        message: format!("CSV flush failed: {}", e),
    })?;
    String::from_utf8(bytes).map_err(|e| EtlError::ProcessingError {
        message: format!("CSV output is not UTF-8: {}", e),
    })
}

pub fn render_json(run: &str, outcome: &ComparisonOutcome) -> Result<String> {
    let report = JsonReport {
        run,
        generated_at: Utc::now(),
        outcome,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

fn write_basket(out: &mut String, basket: &VendorBasket) {
    out.push_str(&format!("Vendor: {} ({})\n", basket.vendor_name, basket.vendor_id));
    out.push_str(&format!("Total Normalized Price: {}", basket.normalized_total));
    if basket.is_estimate() {
        out.push_str(&format!(
            " (estimate, unknown price for: {})",
            basket.estimated_terms.join(", ")
        ));
    }
    out.push('\n');
    if !basket.missing_terms.is_empty() {
        out.push_str(&format!("Missing: {}\n", basket.missing_terms.join(", ")));
    }
    if let Some(delivery_time) = &basket.metadata.delivery_time {
        out.push_str(&format!("Delivery time: {}\n", delivery_time));
    }
    if basket.metadata.is_available == Some(false) {
        out.push_str("Currently unavailable\n");
    }
    if let Some(url) = &basket.metadata.url {
        out.push_str(&format!("Link: {}\n", url));
    }
}

fn write_statistics(out: &mut String, statistics: &BasketStatistics) {
    out.push_str(&format!(
        "{} vendors sell all mandatory items\n",
        statistics.complete_vendors
    ));
    if let (Some(min), Some(max)) = (statistics.min_total, statistics.max_total) {
        out.push_str(&format!("Minimum total: {}\nMaximum total: {}\n", min, max));
    }
    out.push('\n');
}

/// CLI 顯示用的文字摘要
pub fn render_console_summary(outcome: &ComparisonOutcome) -> String {
    let mut out = String::new();

    match &outcome.ranking {
        Ranking::Complete {
            ranked,
            most_expensive,
        } => {
            write_statistics(&mut out, &outcome.statistics);
            out.push_str("Cheapest total:\n");
            write_basket(&mut out, &ranked[0]);
            if ranked.len() > 1 {
                out.push_str("\nOther options:\n");
                for (rank, basket) in ranked.iter().enumerate().skip(1).take(2) {
                    out.push_str(&format!("Option {}:\n", rank + 1));
                    write_basket(&mut out, basket);
                }
            }
            out.push_str("\nMost expensive venue:\n");
            write_basket(&mut out, most_expensive);
        }
        Ranking::NearComplete { alternatives } => {
            out.push_str("No vendor sells all mandatory items.\n");
            out.push_str("Vendors missing exactly one mandatory item:\n");
            for basket in alternatives {
                write_basket(&mut out, basket);
            }
        }
        Ranking::NoEligibleVendor => {
            out.push_str("No eligible vendor: nobody carries the mandatory items.\n");
        }
    }

    out.push_str("\nAverage prices:\n");
    for (term, average) in outcome.averages.iter() {
        out.push_str(&format!("  - {}: {}\n", term, average));
    }
    out
}
