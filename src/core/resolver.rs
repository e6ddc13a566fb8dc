//! 同一家店對同一個 term 回傳多個候選時，挑出唯一代表

use crate::core::grouper::GroupedOffers;
use crate::domain::model::{
    AveragePrice, AveragePriceTable, CanonicalItem, Offer, ResolutionRule, ResolvedItem, Vendor,
};
use crate::utils::error::{EtlError, Result};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Chosen { offer: Offer, rule: ResolutionRule },
    /// 沒有可信的候選，該品項記為缺貨
    NoConfidentMatch,
}

/// 第三階段輸出：每家店的籃子
#[derive(Debug, Clone)]
pub struct ResolvedBaskets {
    pub vendors: Vec<Vendor>,
    pub unresolved_groups: usize,
}

pub struct DuplicateResolver;

impl DuplicateResolver {
    /// 規則依序：唯一候選 → 價格區間 → 名稱完全相同 → 字詞重疊數 → 字數最少 → 到達順序
    pub fn resolve(term: &str, average: AveragePrice, candidates: &[Offer]) -> Result<Resolution> {
        if candidates.is_empty() {
            return Err(EtlError::invalid_input(format!(
                "empty candidate group for '{}'",
                term
            )));
        }
        if candidates.len() == 1 {
            return Ok(Resolution::Chosen {
                offer: candidates[0].clone(),
                rule: ResolutionRule::SoleCandidate,
            });
        }

        // 均價未知時不套用價格區間
        let survivors: Vec<&Offer> = match average {
            AveragePrice::Known(avg) => candidates
                .iter()
                .filter(|offer| offer.price.within_band(avg))
                .collect(),
            AveragePrice::Unknown => candidates.iter().collect(),
        };

        match survivors.as_slice() {
            [] => return Ok(Resolution::NoConfidentMatch),
            [only] => return Ok(chosen(only, ResolutionRule::PriceBand)),
            _ => {}
        }

        if let Some(exact) = survivors.iter().find(|offer| offer.raw_name == term) {
            return Ok(chosen(exact, ResolutionRule::ExactName));
        }

        let term_tokens: HashSet<&str> = term.split_whitespace().collect();
        let overlap = |offer: &Offer| {
            offer
                .raw_name
                .split_whitespace()
                .collect::<HashSet<_>>()
                .intersection(&term_tokens)
                .count()
        };
        let best_overlap = survivors.iter().map(|offer| overlap(*offer)).max().unwrap_or(0);
        let tied: Vec<&Offer> = survivors
            .into_iter()
            .filter(|offer| overlap(*offer) == best_overlap)
            .collect();

        if let [only] = tied.as_slice() {
            return Ok(chosen(only, ResolutionRule::WordOverlap));
        }

        let fewest = tied.iter().map(|offer| offer.token_count()).min().unwrap_or(0);
        let shortest: Vec<&Offer> = tied
            .into_iter()
            .filter(|offer| offer.token_count() == fewest)
            .collect();
        let rule = if shortest.len() == 1 {
            ResolutionRule::FewestTokens
        } else {
            ResolutionRule::ArrivalOrder
        };
        Ok(chosen(shortest[0], rule))
    }

    /// 對每家店的每個分組執行 resolve，產生不可變的店家籃子
    pub fn resolve_all(
        items: &[CanonicalItem],
        grouped: &GroupedOffers,
        averages: &AveragePriceTable,
    ) -> Result<ResolvedBaskets> {
        let mut vendors = Vec::with_capacity(grouped.vendor_count());
        let mut unresolved_groups = 0;

        for (vendor_id, vendor_name) in grouped.vendors() {
            let mut resolved = Vec::new();

            for (term, candidates) in grouped.groups_for_vendor(vendor_id) {
                match Self::resolve(term, averages.get(term), candidates)? {
                    Resolution::Chosen { offer, rule } => {
                        if candidates.len() > 1 {
                            tracing::debug!(
                                "🔎 {}: '{}' resolved to '{}' ({}) by {} out of {} candidates",
                                vendor_id,
                                term,
                                offer.raw_name,
                                offer.price,
                                rule,
                                candidates.len()
                            );
                        }
                        resolved.push(ResolvedItem {
                            term: term.to_string(),
                            vendor_id: vendor_id.to_string(),
                            chosen_offer: offer,
                            rule,
                            candidate_count: candidates.len(),
                        });
                    }
                    Resolution::NoConfidentMatch => {
                        tracing::debug!(
                            "🔎 {}: no confident match for '{}' among {} candidates",
                            vendor_id,
                            term,
                            candidates.len()
                        );
                        unresolved_groups += 1;
                    }
                }
            }

            let metadata = grouped.vendor_metadata(vendor_id).cloned().unwrap_or_default();
            vendors.push(Vendor::new(vendor_id, vendor_name, resolved, items)?.with_metadata(metadata));
        }

        tracing::info!(
            "🔎 Resolved baskets for {} vendors ({} groups without a confident match)",
            vendors.len(),
            unresolved_groups
        );
        Ok(ResolvedBaskets {
            vendors,
            unresolved_groups,
        })
    }
}

fn chosen(offer: &Offer, rule: ResolutionRule) -> Resolution {
    Resolution::Chosen {
        offer: offer.clone(),
        rule,
    }
}
