use crate::domain::model::{
    AveragePrice, AveragePriceTable, CanonicalItem, Price, Ranking, Vendor, VendorBasket,
};

/// 沒有完整籃子時最多列出幾家替代店
pub const NEAR_COMPLETE_LIMIT: usize = 3;

pub struct BasketNormalizer<'a> {
    items: &'a [CanonicalItem],
    averages: &'a AveragePriceTable,
}

impl<'a> BasketNormalizer<'a> {
    pub fn new(items: &'a [CanonicalItem], averages: &'a AveragePriceTable) -> Self {
        Self { items, averages }
    }

    /// 總價 = 已解析品項價格 + 缺少品項的均價（均價未知時以 0 計，並標記為估計）
    pub fn normalize(&self, vendor: &Vendor) -> VendorBasket {
        let mut imputed = Vec::new();
        let mut estimated_terms = Vec::new();

        for term in vendor.missing_terms() {
            match self.averages.get(term) {
                AveragePrice::Known(price) => imputed.push(price),
                AveragePrice::Unknown => estimated_terms.push(term.clone()),
            }
        }

        let items_total = vendor.items_total();
        let imputed_total = Price::total(imputed);

        VendorBasket {
            vendor_id: vendor.id.clone(),
            vendor_name: vendor.name.clone(),
            items_total,
            imputed_total,
            normalized_total: items_total + imputed_total,
            missing_terms: self.ordered_missing(vendor),
            missing_mandatory: vendor
                .missing_mandatory(self.items)
                .into_iter()
                .map(str::to_string)
                .collect(),
            estimated_terms,
            metadata: vendor.metadata.clone(),
        }
    }

    fn ordered_missing(&self, vendor: &Vendor) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| vendor.missing_terms().contains(&item.term))
            .map(|item| item.term.clone())
            .collect()
    }
}

pub struct BasketRanker;

impl BasketRanker {
    pub fn rank(baskets: Vec<VendorBasket>) -> Ranking {
        let (mut complete, partial): (Vec<_>, Vec<_>) = baskets
            .into_iter()
            .partition(|basket| basket.missing_mandatory.is_empty());
        complete.sort_by(by_total);

        if !complete.is_empty() {
            let most_expensive = most_expensive(&complete);
            tracing::info!(
                "🏆 {} complete baskets, cheapest: {} ({})",
                complete.len(),
                complete[0].vendor_name,
                complete[0].normalized_total
            );
            return Ranking::Complete {
                ranked: complete,
                most_expensive,
            };
        }

        let mut alternatives: Vec<VendorBasket> = partial
            .into_iter()
            .filter(|basket| basket.missing_mandatory.len() == 1)
            .collect();
        alternatives.sort_by(by_total);
        alternatives.truncate(NEAR_COMPLETE_LIMIT);

        if alternatives.is_empty() {
            tracing::warn!("⚠️ No vendor carries the mandatory items");
            return Ranking::NoEligibleVendor;
        }

        tracing::info!(
            "🥈 No complete basket; {} vendors miss exactly one mandatory item",
            alternatives.len()
        );
        Ranking::NearComplete { alternatives }
    }
}

fn by_total(a: &VendorBasket, b: &VendorBasket) -> std::cmp::Ordering {
    a.normalized_total
        .cmp(&b.normalized_total)
        .then_with(|| a.vendor_id.cmp(&b.vendor_id))
}

/// 同價時取 vendor_id 最小者；complete 已依 by_total 排序
fn most_expensive(complete: &[VendorBasket]) -> VendorBasket {
    let top = complete
        .iter()
        .map(|basket| basket.normalized_total)
        .max()
        .unwrap_or(Price::ZERO);
    complete
        .iter()
        .find(|basket| basket.normalized_total == top)
        .cloned()
        .unwrap_or_else(|| complete[complete.len() - 1].clone())
}
