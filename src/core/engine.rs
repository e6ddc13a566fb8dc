use crate::core::average::AveragePriceEstimator;
use crate::core::grouper::ResultGrouper;
use crate::core::ranker::{BasketNormalizer, BasketRanker};
use crate::core::resolver::DuplicateResolver;
use crate::domain::model::{BasketStatistics, CanonicalItem, ComparisonOutcome, TermResults};
use crate::utils::error::Result;

/// 同步執行四個階段：分組 → 均價 → 去重 → 正規化與排名
///
/// 每個階段只讀前一階段的輸出並產生新的值，不修改共享狀態。
pub struct BasketEngine {
    items: Vec<CanonicalItem>,
}

impl BasketEngine {
    pub fn new(items: Vec<CanonicalItem>) -> Result<Self> {
        CanonicalItem::validate_list(&items)?;
        Ok(Self { items })
    }

    pub fn items(&self) -> &[CanonicalItem] {
        &self.items
    }

    pub fn compare(&self, results: &[TermResults]) -> Result<ComparisonOutcome> {
        let grouped = ResultGrouper::new(&self.items)?.group(results)?;

        // 均價必須在去重之前完成
        let averages = AveragePriceEstimator::estimate(&self.items, &grouped);

        let resolved = DuplicateResolver::resolve_all(&self.items, &grouped, &averages)?;

        let normalizer = BasketNormalizer::new(&self.items, &averages);
        let baskets = resolved
            .vendors
            .iter()
            .map(|vendor| normalizer.normalize(vendor))
            .collect();
        let ranking = BasketRanker::rank(baskets);
        let statistics = BasketStatistics::from_ranking(&ranking);

        Ok(ComparisonOutcome {
            items: self.items.clone(),
            averages,
            vendors: resolved.vendors,
            ranking,
            statistics,
            rejected_hits: grouped.rejected().len(),
            unresolved_groups: resolved.unresolved_groups,
        })
    }
}
