use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::utils::error::{EtlError, Result};

/// 要比價的標準品項
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalItem {
    pub term: String,
    #[serde(default = "default_mandatory")]
    pub mandatory: bool,
}

fn default_mandatory() -> bool {
    true
}

impl CanonicalItem {
    pub fn new(term: impl Into<String>, mandatory: bool) -> Self {
        Self {
            term: term.into(),
            mandatory,
        }
    }

    /// 品項清單必須非空且 term 唯一
    pub fn validate_list(items: &[CanonicalItem]) -> Result<()> {
        if items.is_empty() {
            return Err(EtlError::invalid_input("canonical item list is empty"));
        }
        let mut seen = BTreeSet::new();
        for item in items {
            if item.term.trim().is_empty() {
                return Err(EtlError::invalid_input("canonical item term is blank"));
            }
            if !seen.insert(item.term.as_str()) {
                return Err(EtlError::invalid_input(format!(
                    "duplicate canonical item term '{}'",
                    item.term
                )));
            }
        }
        Ok(())
    }
}

/// 金額，以最小貨幣單位（分）儲存，固定兩位小數
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(u64);

impl Price {
    pub const ZERO: Price = Price(0);
    /// 單筆價格上限 1,000,000,000.00；超過視為無法解析
    pub const MAX: Price = Price(100_000_000_000);

    pub fn from_minor(minor: u64) -> Self {
        Price(minor)
    }

    pub fn minor(self) -> u64 {
        self.0
    }

    /// 解析 "12", "12.5", "₪12.90" 之類的文字；超過兩位小數時四捨五入到分
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input
            .trim()
            .trim_matches(|c: char| c.is_whitespace() || matches!(c, '₪' | '$' | '€' | '£'));

        if trimmed.is_empty() {
            return Err(EtlError::parse("price", input, "empty price"));
        }
        if trimmed.starts_with('-') {
            return Err(EtlError::parse("price", input, "price cannot be negative"));
        }

        let (whole, frac) = match trimmed.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (trimmed, ""),
        };
        let whole = if whole.is_empty() { "0" } else { whole };

        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(EtlError::parse("price", input, "not a decimal number"));
        }

        let units: u64 = whole
            .parse()
            .map_err(|e| EtlError::parse("price", input, format!("bad amount: {}", e)))?;

        let digits: Vec<u64> = frac.bytes().map(|b| u64::from(b - b'0')).collect();
        let mut cents = digits.first().copied().unwrap_or(0) * 10 + digits.get(1).copied().unwrap_or(0);
        if digits.get(2).copied().unwrap_or(0) >= 5 {
            cents += 1;
        }

        units
            .checked_mul(100)
            .and_then(|minor| minor.checked_add(cents))
            .ok_or_else(|| EtlError::parse("price", input, "amount out of range"))
            .and_then(|minor| Price::bounded(minor, input))
    }

    fn bounded(minor: u64, input: &str) -> Result<Self> {
        if minor > Price::MAX.0 {
            return Err(EtlError::parse(
                "price",
                input,
                format!("amount exceeds {}", Price::MAX),
            ));
        }
        Ok(Price(minor))
    }

    /// 後端以最小單位回報價格時（例如 1290 代表 12.90）
    pub fn from_json_number(number: &serde_json::Number, minor_units: bool) -> Result<Self> {
        if minor_units {
            if let Some(minor) = number.as_u64() {
                return Price::bounded(minor, &number.to_string());
            }
            return match number.as_f64() {
                Some(value) if (0.0..=Price::MAX.0 as f64).contains(&value) => {
                    Ok(Price(value.round() as u64))
                }
                _ => Err(EtlError::parse(
                    "price",
                    number.to_string(),
                    "minor-unit price must be a non-negative number",
                )),
            };
        }
        Price::parse(&number.to_string())
    }

    pub fn total<I: IntoIterator<Item = Price>>(prices: I) -> Price {
        prices.into_iter().fold(Price::ZERO, |sum, price| sum + price)
    }

    /// 是否落在 [avg*0.5, avg*1.5] 之間（含邊界）
    pub fn within_band(self, average: Price) -> bool {
        let doubled = u128::from(self.0) * 2;
        let average = u128::from(average.0);
        doubled >= average && doubled <= average * 3
    }
}

impl std::ops::Add for Price {
    type Output = Price;

    fn add(self, rhs: Price) -> Price {
        Price(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 後端回傳的原始價格，可能是數字或文字
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPrice {
    Number(serde_json::Number),
    Text(String),
}

impl RawPrice {
    pub fn to_price(&self) -> Result<Price> {
        match self {
            RawPrice::Number(number) => Price::from_json_number(number, false),
            RawPrice::Text(text) => Price::parse(text),
        }
    }
}

impl fmt::Display for RawPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawPrice::Number(number) => write!(f, "{}", number),
            RawPrice::Text(text) => write!(f, "{}", text),
        }
    }
}

/// 搜尋後端回傳、尚未驗證的單筆結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    pub vendor_id: String,
    #[serde(default)]
    pub vendor_name: Option<String>,
    pub raw_name: String,
    pub price: RawPrice,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub vendor_meta: VendorMetadata,
}

impl RawHit {
    pub fn new(vendor_id: &str, raw_name: &str, price: RawPrice) -> Self {
        Self {
            vendor_id: vendor_id.to_string(),
            vendor_name: None,
            raw_name: raw_name.to_string(),
            price,
            url: None,
            vendor_meta: VendorMetadata::default(),
        }
    }
}

/// 後端附帶的店家資訊，皆為選填
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorMetadata {
    pub is_available: Option<bool>,
    /// 例如 "30-40 min"
    pub delivery_time: Option<String>,
    /// 是否屬於後端的訂閱免運方案
    pub subscription: Option<bool>,
    pub url: Option<String>,
}

impl VendorMetadata {
    /// 只補上尚未知道的欄位，先到者優先
    pub fn fill_from(&mut self, other: &VendorMetadata) {
        if self.is_available.is_none() {
            self.is_available = other.is_available;
        }
        if self.delivery_time.is_none() {
            self.delivery_time = other.delivery_time.clone();
        }
        if self.subscription.is_none() {
            self.subscription = other.subscription;
        }
        if self.url.is_none() {
            self.url = other.url.clone();
        }
    }
}

/// 某個 term 的所有搜尋結果（可能來自多個後端）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermResults {
    pub term: String,
    pub hits: Vec<RawHit>,
}

impl TermResults {
    pub fn new(term: impl Into<String>, hits: Vec<RawHit>) -> Self {
        Self {
            term: term.into(),
            hits,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Offer {
    pub vendor_id: String,
    pub raw_name: String,
    pub price: Price,
    pub url: Option<String>,
    pub matched_term: String,
}

impl Offer {
    pub fn from_hit(hit: &RawHit, term: &str) -> Result<Self> {
        if hit.vendor_id.trim().is_empty() {
            return Err(EtlError::parse("vendor_id", &hit.vendor_id, "vendor id is empty"));
        }
        let price = hit.price.to_price()?;
        Ok(Self {
            vendor_id: hit.vendor_id.clone(),
            raw_name: hit.raw_name.clone(),
            price,
            url: hit.url.clone(),
            matched_term: term.to_string(),
        })
    }

    pub fn token_count(&self) -> usize {
        self.raw_name.split_whitespace().count()
    }
}

/// 決定勝出報價的規則
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionRule {
    SoleCandidate,
    PriceBand,
    ExactName,
    WordOverlap,
    FewestTokens,
    ArrivalOrder,
}

impl fmt::Display for ResolutionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResolutionRule::SoleCandidate => "sole_candidate",
            ResolutionRule::PriceBand => "price_band",
            ResolutionRule::ExactName => "exact_name",
            ResolutionRule::WordOverlap => "word_overlap",
            ResolutionRule::FewestTokens => "fewest_tokens",
            ResolutionRule::ArrivalOrder => "arrival_order",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedItem {
    pub term: String,
    pub vendor_id: String,
    pub chosen_offer: Offer,
    pub rule: ResolutionRule,
    pub candidate_count: usize,
}

/// 一家店的最終籃子：每個 term 最多一個 ResolvedItem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vendor {
    pub id: String,
    pub name: String,
    pub metadata: VendorMetadata,
    resolved_items: BTreeMap<String, ResolvedItem>,
    missing_terms: BTreeSet<String>,
}

impl Vendor {
    /// missing_terms 由所有 canonical term 減去已解析的 term 推導而來
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        resolved: Vec<ResolvedItem>,
        items: &[CanonicalItem],
    ) -> Result<Self> {
        let id = id.into();
        let mut resolved_items = BTreeMap::new();
        for item in resolved {
            if item.vendor_id != id {
                return Err(EtlError::invalid_input(format!(
                    "resolved item for vendor '{}' attached to vendor '{}'",
                    item.vendor_id, id
                )));
            }
            if !items.iter().any(|canonical| canonical.term == item.term) {
                return Err(EtlError::invalid_input(format!(
                    "resolved item term '{}' is not a canonical item",
                    item.term
                )));
            }
            if resolved_items.contains_key(&item.term) {
                return Err(EtlError::invalid_input(format!(
                    "vendor '{}' has more than one resolved item for '{}'",
                    id, item.term
                )));
            }
            resolved_items.insert(item.term.clone(), item);
        }

        let missing_terms = items
            .iter()
            .filter(|canonical| !resolved_items.contains_key(&canonical.term))
            .map(|canonical| canonical.term.clone())
            .collect();

        Ok(Self {
            id,
            name: name.into(),
            metadata: VendorMetadata::default(),
            resolved_items,
            missing_terms,
        })
    }

    pub fn with_metadata(mut self, metadata: VendorMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn resolved_items(&self) -> impl Iterator<Item = &ResolvedItem> {
        self.resolved_items.values()
    }

    pub fn resolved(&self, term: &str) -> Option<&ResolvedItem> {
        self.resolved_items.get(term)
    }

    pub fn missing_terms(&self) -> &BTreeSet<String> {
        &self.missing_terms
    }

    pub fn carries(&self, term: &str) -> bool {
        self.resolved_items.contains_key(term)
    }

    pub fn items_total(&self) -> Price {
        Price::total(self.resolved_items.values().map(|item| item.chosen_offer.price))
    }

    pub fn missing_mandatory<'a>(&'a self, items: &'a [CanonicalItem]) -> Vec<&'a str> {
        items
            .iter()
            .filter(|item| item.mandatory && self.missing_terms.contains(&item.term))
            .map(|item| item.term.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AveragePrice {
    Known(Price),
    Unknown,
}

impl Serialize for AveragePrice {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            AveragePrice::Known(price) => price.serialize(serializer),
            AveragePrice::Unknown => serializer.serialize_none(),
        }
    }
}

impl fmt::Display for AveragePrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AveragePrice::Known(price) => write!(f, "{}", price),
            AveragePrice::Unknown => f.write_str("unknown"),
        }
    }
}

/// term → 參考均價，僅在建立時寫入
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AveragePriceTable {
    entries: BTreeMap<String, AveragePrice>,
}

impl AveragePriceTable {
    pub fn new(entries: BTreeMap<String, AveragePrice>) -> Self {
        Self { entries }
    }

    /// 不在表內的 term 視為 Unknown
    pub fn get(&self, term: &str) -> AveragePrice {
        self.entries
            .get(term)
            .copied()
            .unwrap_or(AveragePrice::Unknown)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AveragePrice)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 一家店的正規化總價
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VendorBasket {
    pub vendor_id: String,
    pub vendor_name: String,
    pub items_total: Price,
    pub imputed_total: Price,
    pub normalized_total: Price,
    pub missing_terms: Vec<String>,
    pub missing_mandatory: Vec<String>,
    /// 缺少且均價未知的 term，以 0 計入總價，只是估計值
    pub estimated_terms: Vec<String>,
    pub metadata: VendorMetadata,
}

impl VendorBasket {
    pub fn is_estimate(&self) -> bool {
        !self.estimated_terms.is_empty()
    }
}

/// 排名結果；三種狀態互斥
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Ranking {
    /// 具備所有必要品項的店，依總價由低到高
    Complete {
        ranked: Vec<VendorBasket>,
        most_expensive: VendorBasket,
    },
    /// 沒有完整的店時，只缺一個必要品項的前三名
    NearComplete { alternatives: Vec<VendorBasket> },
    NoEligibleVendor,
}

impl Ranking {
    pub fn status(&self) -> &'static str {
        match self {
            Ranking::Complete { .. } => "complete",
            Ranking::NearComplete { .. } => "near_complete",
            Ranking::NoEligibleVendor => "no_eligible_vendor",
        }
    }

    pub fn cheapest(&self) -> Option<&VendorBasket> {
        match self {
            Ranking::Complete { ranked, .. } => ranked.first(),
            _ => None,
        }
    }

    pub fn most_expensive(&self) -> Option<&VendorBasket> {
        match self {
            Ranking::Complete { most_expensive, .. } => Some(most_expensive),
            _ => None,
        }
    }

    pub fn baskets(&self) -> &[VendorBasket] {
        match self {
            Ranking::Complete { ranked, .. } => ranked,
            Ranking::NearComplete { alternatives } => alternatives,
            Ranking::NoEligibleVendor => &[],
        }
    }
}

/// 完整籃子的統計：店數與總價範圍
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BasketStatistics {
    pub complete_vendors: usize,
    pub min_total: Option<Price>,
    pub max_total: Option<Price>,
}

impl BasketStatistics {
    pub fn from_ranking(ranking: &Ranking) -> Self {
        match ranking {
            Ranking::Complete { ranked, .. } => Self {
                complete_vendors: ranked.len(),
                min_total: ranked.iter().map(|basket| basket.normalized_total).min(),
                max_total: ranked.iter().map(|basket| basket.normalized_total).max(),
            },
            _ => Self::default(),
        }
    }
}

/// 一次比價的完整結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonOutcome {
    pub items: Vec<CanonicalItem>,
    pub averages: AveragePriceTable,
    pub vendors: Vec<Vendor>,
    pub ranking: Ranking,
    pub statistics: BasketStatistics,
    pub rejected_hits: usize,
    pub unresolved_groups: usize,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub outcome: ComparisonOutcome,
    pub ranking_csv: String,
    pub items_csv: String,
    pub json_output: String,
}
