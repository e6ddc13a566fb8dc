use crate::core::grouper::GroupedOffers;
use crate::domain::model::{AveragePrice, AveragePriceTable, CanonicalItem, Price};
use std::collections::BTreeMap;

/// 參考均價只採用「該店只回傳一個候選」的分組，多候選分組一律不看
pub struct AveragePriceEstimator;

impl AveragePriceEstimator {
    pub fn estimate(items: &[CanonicalItem], grouped: &GroupedOffers) -> AveragePriceTable {
        let mut entries = BTreeMap::new();

        for item in items {
            let singleton_prices: Vec<Price> = grouped
                .groups_for_term(&item.term)
                .filter(|offers| offers.len() == 1)
                .map(|offers| offers[0].price)
                .collect();

            let average = mean_rounded(&singleton_prices)
                .map(AveragePrice::Known)
                .unwrap_or(AveragePrice::Unknown);

            tracing::debug!(
                "💰 Average for '{}': {} from {} singleton offers",
                item.term,
                average,
                singleton_prices.len()
            );
            entries.insert(item.term.clone(), average);
        }

        let known = entries
            .values()
            .filter(|average| matches!(average, AveragePrice::Known(_)))
            .count();
        tracing::info!(
            "💰 Estimated average prices: {} known, {} unknown",
            known,
            entries.len() - known
        );

        AveragePriceTable::new(entries)
    }
}

/// 算術平均，四捨五入到分
fn mean_rounded(prices: &[Price]) -> Option<Price> {
    if prices.is_empty() {
        return None;
    }
    let count = prices.len() as u128;
    let sum: u128 = prices.iter().map(|price| u128::from(price.minor())).sum();
    // 平均值不會超過最大的單價，必定能放回 u64
    let mean = (sum * 2 + count) / (count * 2);
    Some(Price::from_minor(u64::try_from(mean).unwrap_or(u64::MAX)))
}
