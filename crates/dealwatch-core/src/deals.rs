//! Deal types and the normalizer that turns raw scraper records into
//! canonical [`Deal`]s with a stable identity hash.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const DEFAULT_MIN_DISCOUNT_PERCENT: i64 = 15;
const DEFAULT_PREMIUM_DISCOUNT_PERCENT: i64 = 25;
/// Exclusive upper bound for stored amounts: `NUMERIC(10,2)` holds eight
/// integer digits.
const MAX_AMOUNT_EXCLUSIVE: i64 = 100_000_000;

/// Resale site a listing was scraped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// GCX (formerly Raise). The old scraper tagged these listings `raise`.
    #[serde(alias = "raise")]
    Gcx,
    CardCash,
}

impl Source {
    /// Stable tag stored in the database and fed into identity hashes.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Gcx => "gcx",
            Source::CardCash => "cardcash",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gcx" | "raise" => Ok(Source::Gcx),
            "cardcash" => Ok(Source::CardCash),
            other => Err(ValidationError::UnknownSource(other.to_string())),
        }
    }
}

/// A listing exactly as a scraper reported it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDeal {
    pub merchant: String,
    pub face_value: Decimal,
    pub price: Decimal,
    pub source: Source,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealTier {
    Regular,
    Premium,
}

/// A normalized listing. Built fresh on every scrape and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    /// Display name with surrounding and repeated whitespace removed.
    pub merchant: String,
    pub face_value: Decimal,
    pub price: Decimal,
    pub discount_percent: Decimal,
    pub source: Source,
    pub url: Option<String>,
    pub tier: DealTier,
    /// Lower-case hex SHA-256 of the identity fields.
    pub identity_hash: String,
}

impl Deal {
    #[must_use]
    pub fn is_premium(&self) -> bool {
        self.tier == DealTier::Premium
    }

    /// Case-folded merchant name used for hashing and merchant statistics.
    #[must_use]
    pub fn merchant_key(&self) -> String {
        merchant_key(&self.merchant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscountThresholds {
    /// Deals below this discount are dropped. Inclusive.
    pub min_discount_percent: Decimal,
    /// Deals at or above this discount are tagged premium.
    pub premium_discount_percent: Decimal,
}

impl Default for DiscountThresholds {
    fn default() -> Self {
        Self {
            min_discount_percent: Decimal::from(DEFAULT_MIN_DISCOUNT_PERCENT),
            premium_discount_percent: Decimal::from(DEFAULT_PREMIUM_DISCOUNT_PERCENT),
        }
    }
}

impl DiscountThresholds {
    /// Thresholds for monitoring snapshots: every valid live listing counts.
    #[must_use]
    pub fn monitoring() -> Self {
        Self {
            min_discount_percent: Decimal::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("merchant name is empty")]
    EmptyMerchant,
    #[error("face value must be positive, got {0}")]
    NonPositiveFaceValue(Decimal),
    #[error("price must not be negative, got {0}")]
    NegativePrice(Decimal),
    #[error("face value {0} exceeds the largest storable amount")]
    FaceValueOutOfRange(Decimal),
    #[error("price {price} exceeds face value {face_value}")]
    PriceExceedsFaceValue { price: Decimal, face_value: Decimal },
    #[error("discount {discount_percent}% is below the {minimum}% minimum")]
    BelowMinimumDiscount {
        discount_percent: Decimal,
        minimum: Decimal,
    },
    #[error("unknown source '{0}'")]
    UnknownSource(String),
    #[error("malformed record: {0}")]
    Malformed(String),
}

impl ValidationError {
    /// `true` when the record was well-formed but not discounted enough.
    #[must_use]
    pub fn is_below_threshold(&self) -> bool {
        matches!(self, ValidationError::BelowMinimumDiscount { .. })
    }
}

/// Normalizes a raw scraper record into a [`Deal`].
///
/// # Errors
///
/// Returns a [`ValidationError`] if the record is malformed (blank merchant,
/// non-positive or unstorably large face value, negative price, price above
/// face value) or its discount falls below `thresholds.min_discount_percent`.
pub fn normalize_deal(
    raw: &RawDeal,
    thresholds: &DiscountThresholds,
) -> Result<Deal, ValidationError> {
    let merchant = collapse_whitespace(&raw.merchant);
    if merchant.is_empty() {
        return Err(ValidationError::EmptyMerchant);
    }
    if raw.face_value <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveFaceValue(raw.face_value));
    }
    if round_money(raw.face_value) >= Decimal::from(MAX_AMOUNT_EXCLUSIVE) {
        return Err(ValidationError::FaceValueOutOfRange(raw.face_value));
    }
    if raw.price < Decimal::ZERO {
        return Err(ValidationError::NegativePrice(raw.price));
    }
    if raw.price > raw.face_value {
        return Err(ValidationError::PriceExceedsFaceValue {
            price: raw.price,
            face_value: raw.face_value,
        });
    }

    let discount_percent = discount_percent(raw.face_value, raw.price);
    if discount_percent < thresholds.min_discount_percent {
        return Err(ValidationError::BelowMinimumDiscount {
            discount_percent,
            minimum: thresholds.min_discount_percent,
        });
    }

    let tier = if discount_percent >= thresholds.premium_discount_percent {
        DealTier::Premium
    } else {
        DealTier::Regular
    };

    let url = raw
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string);

    let face_value = round_money(raw.face_value);
    let price = round_money(raw.price);
    let identity_hash = identity_hash(&merchant, face_value, price, raw.source, url.as_deref());

    Ok(Deal {
        merchant,
        face_value,
        price,
        discount_percent,
        source: raw.source,
        url,
        tier,
        identity_hash,
    })
}

/// `(face_value - price) / face_value * 100`, rounded to two places
/// (midpoint away from zero). `face_value` must be positive.
#[must_use]
pub fn discount_percent(face_value: Decimal, price: Decimal) -> Decimal {
    ((face_value - price) / face_value * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Computes the identity hash over a keyed serialization of the identity
/// fields. Keys are emitted in sorted order, so the digest does not depend on
/// the order fields are supplied in.
#[must_use]
pub fn identity_hash(
    merchant: &str,
    face_value: Decimal,
    price: Decimal,
    source: Source,
    url: Option<&str>,
) -> String {
    let mut fields: BTreeMap<&str, String> = BTreeMap::new();
    fields.insert("merchant", merchant_key(merchant));
    fields.insert("face_value", format_money(face_value));
    fields.insert("price", format_money(price));
    fields.insert("source", source.as_str().to_string());
    if let Some(key) = url.map(url_key).filter(|k| !k.is_empty()) {
        fields.insert("url", key);
    }

    let mut hasher = Sha256::new();
    for (key, value) in &fields {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn merchant_key(merchant: &str) -> String {
    collapse_whitespace(merchant).to_lowercase()
}

fn url_key(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn format_money(value: Decimal) -> String {
    format!("{:.2}", round_money(value))
}

#[cfg(test)]
#[path = "deals_test.rs"]
mod tests;
