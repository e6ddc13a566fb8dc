//! 將每個 term 的原始搜尋結果依店家分組

use crate::domain::model::{CanonicalItem, Offer, TermResults, VendorMetadata};
use crate::utils::error::{EtlError, Result};
use std::collections::BTreeMap;

/// (vendor_id, term)
pub type GroupKey = (String, String);

/// 丟棄的原始結果與原因
#[derive(Debug)]
pub struct RejectedHit {
    pub term: String,
    pub vendor_id: String,
    pub raw_name: String,
    pub error: EtlError,
}

#[derive(Debug, Default)]
pub struct GroupedOffers {
    groups: BTreeMap<GroupKey, Vec<Offer>>,
    vendors: BTreeMap<String, VendorEntry>,
    rejected: Vec<RejectedHit>,
}

#[derive(Debug, Default)]
struct VendorEntry {
    /// 第一個非空白的店名
    name: Option<String>,
    metadata: VendorMetadata,
}

impl GroupedOffers {
    pub fn group(&self, vendor_id: &str, term: &str) -> Option<&[Offer]> {
        self.groups
            .get(&(vendor_id.to_string(), term.to_string()))
            .map(Vec::as_slice)
    }

    /// 某個 term 在各店的候選報價
    pub fn groups_for_term<'a>(&'a self, term: &'a str) -> impl Iterator<Item = &'a [Offer]> + 'a {
        self.groups
            .iter()
            .filter(move |((_, group_term), _)| group_term == term)
            .map(|(_, offers)| offers.as_slice())
    }

    /// 某家店的所有 (term, 候選) 分組
    pub fn groups_for_vendor<'a>(
        &'a self,
        vendor_id: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a [Offer])> + 'a {
        self.groups
            .iter()
            .filter(move |((group_vendor, _), _)| group_vendor == vendor_id)
            .map(|((_, term), offers)| (term.as_str(), offers.as_slice()))
    }

    /// (vendor_id, 顯示名稱)；沒有店名時以 ID 代替
    pub fn vendors(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vendors.iter().map(|(id, entry)| {
            (
                id.as_str(),
                entry.name.as_deref().unwrap_or(id.as_str()),
            )
        })
    }

    pub fn vendor_metadata(&self, vendor_id: &str) -> Option<&VendorMetadata> {
        self.vendors.get(vendor_id).map(|entry| &entry.metadata)
    }

    pub fn vendor_count(&self) -> usize {
        self.vendors.len()
    }

    pub fn offer_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn rejected(&self) -> &[RejectedHit] {
        &self.rejected
    }
}

pub struct ResultGrouper<'a> {
    items: &'a [CanonicalItem],
}

impl<'a> ResultGrouper<'a> {
    pub fn new(items: &'a [CanonicalItem]) -> Result<Self> {
        CanonicalItem::validate_list(items)?;
        Ok(Self { items })
    }

    /// 分組時保留到達順序；價格無法解析的結果記為 rejected，不中斷流程
    pub fn group(&self, results: &[TermResults]) -> Result<GroupedOffers> {
        let mut grouped = GroupedOffers::default();

        for term_results in results {
            let term = term_results.term.as_str();
            if !self.items.iter().any(|item| item.term == term) {
                return Err(EtlError::invalid_input(format!(
                    "search results reference unknown term '{}'",
                    term
                )));
            }

            for hit in &term_results.hits {
                let offer = match Offer::from_hit(hit, term) {
                    Ok(offer) => offer,
                    Err(error) => {
                        tracing::warn!(
                            "⚠️ Rejected hit '{}' from vendor '{}' for '{}': {}",
                            hit.raw_name,
                            hit.vendor_id,
                            term,
                            error
                        );
                        grouped.rejected.push(RejectedHit {
                            term: term.to_string(),
                            vendor_id: hit.vendor_id.clone(),
                            raw_name: hit.raw_name.clone(),
                            error,
                        });
                        continue;
                    }
                };

                let entry = grouped.vendors.entry(offer.vendor_id.clone()).or_default();
                if entry.name.is_none() {
                    entry.name = hit
                        .vendor_name
                        .clone()
                        .filter(|name| !name.trim().is_empty());
                }
                entry.metadata.fill_from(&hit.vendor_meta);
                grouped
                    .groups
                    .entry((offer.vendor_id.clone(), term.to_string()))
                    .or_default()
                    .push(offer);
            }
        }

        tracing::info!(
            "🗂️ Grouped {} offers from {} vendors ({} rejected)",
            grouped.offer_count(),
            grouped.vendor_count(),
            grouped.rejected.len()
        );
        Ok(grouped)
    }
}
