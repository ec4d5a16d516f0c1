//! Product records and boundary validation.
//!
//! [`ProductDraft`] and [`ProductPatch`] carry caller input; validating them
//! yields [`NewProduct`] and [`ValidPatch`], the only shapes backends accept.
//! Prices are `rust_decimal::Decimal` end to end and never pass through `f64`.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;

use crate::error::CatalogError;

/// Width of the `hsn_code` column.
pub const MAX_CLASSIFICATION_CODE_LEN: usize = 10;

/// `NUMERIC(12,2)` leaves ten integer digits.
const MAX_PRICE_EXCLUSIVE: i64 = 10_000_000_000;

/// A stored product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: i64,
    #[serde(rename = "productname")]
    pub name: String,
    pub brand: Option<String>,
    #[serde(rename = "hsn_code")]
    pub classification_code: Option<String>,
    #[serde(rename = "price")]
    pub unit_price: Decimal,
    #[serde(rename = "per_case")]
    pub units_per_case: i32,
}

/// A product tagged with the category it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedProduct {
    #[serde(rename = "product_type")]
    pub category: String,
    #[serde(flatten)]
    pub product: Product,
}

/// Unvalidated product fields as received from a caller.
#[derive(Debug, Clone, Default)]
pub struct ProductDraft {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub classification_code: Option<String>,
    pub unit_price: Option<Decimal>,
    pub units_per_case: Option<i64>,
}

/// Validated fields for an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub brand: Option<String>,
    pub classification_code: Option<String>,
    pub unit_price: Decimal,
    pub units_per_case: i32,
}

/// Unvalidated partial update. `Some("")` for brand or code clears the column.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub classification_code: Option<String>,
    pub unit_price: Option<Decimal>,
    pub units_per_case: Option<i64>,
}

/// Validated partial update. Outer `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidPatch {
    pub name: Option<String>,
    pub brand: Option<Option<String>>,
    pub classification_code: Option<Option<String>>,
    pub unit_price: Option<Decimal>,
    pub units_per_case: Option<i32>,
}

impl ValidPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.brand.is_none()
            && self.classification_code.is_none()
            && self.unit_price.is_none()
            && self.units_per_case.is_none()
    }

    /// Apply to a stored row (used by backends that update in place).
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(brand) = &self.brand {
            product.brand = brand.clone();
        }
        if let Some(code) = &self.classification_code {
            product.classification_code = code.clone();
        }
        if let Some(price) = self.unit_price {
            product.unit_price = price;
        }
        if let Some(units) = self.units_per_case {
            product.units_per_case = units;
        }
    }
}

impl ProductDraft {
    pub fn validate(self) -> Result<NewProduct, CatalogError> {
        let name = validate_name(self.name.as_deref())?;
        let unit_price = match self.unit_price {
            Some(price) => validate_price(price)?,
            None => return Err(CatalogError::invalid("price is required")),
        };
        let units_per_case = match self.units_per_case {
            Some(units) => validate_units(units)?,
            None => return Err(CatalogError::invalid("per_case is required")),
        };
        Ok(NewProduct {
            name,
            brand: optional_text(self.brand.as_deref()),
            classification_code: validate_code(self.classification_code.as_deref())?,
            unit_price,
            units_per_case,
        })
    }
}

impl ProductPatch {
    pub fn validate(self) -> Result<ValidPatch, CatalogError> {
        let patch = ValidPatch {
            name: self
                .name
                .as_deref()
                .map(|n| validate_name(Some(n)))
                .transpose()?,
            brand: self.brand.as_deref().map(|b| optional_text(Some(b))),
            classification_code: self
                .classification_code
                .as_deref()
                .map(|c| validate_code(Some(c)))
                .transpose()?,
            unit_price: self.unit_price.map(validate_price).transpose()?,
            units_per_case: self.units_per_case.map(validate_units).transpose()?,
        };
        if patch.is_empty() {
            return Err(CatalogError::invalid("no fields to update"));
        }
        Ok(patch)
    }
}

/// Case-insensitive duplicate key: (name, brand) with a missing brand equal to "".
pub fn duplicate_key(name: &str, brand: Option<&str>) -> (String, String) {
    (name.to_lowercase(), brand.unwrap_or("").to_lowercase())
}

fn validate_name(name: Option<&str>) -> Result<String, CatalogError> {
    match name.map(str::trim) {
        Some(n) if !n.is_empty() => Ok(n.to_string()),
        _ => Err(CatalogError::invalid("productname is required")),
    }
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn validate_code(code: Option<&str>) -> Result<Option<String>, CatalogError> {
    let Some(code) = optional_text(code) else {
        return Ok(None);
    };
    if code.chars().count() > MAX_CLASSIFICATION_CODE_LEN {
        return Err(CatalogError::invalid(format!(
            "hsn_code must be at most {MAX_CLASSIFICATION_CODE_LEN} characters"
        )));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CatalogError::invalid("hsn_code may only contain letters and digits"));
    }
    Ok(Some(code))
}

fn validate_price(price: Decimal) -> Result<Decimal, CatalogError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(CatalogError::invalid("price must not be negative"));
    }
    let rounded = price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded >= Decimal::from(MAX_PRICE_EXCLUSIVE) {
        return Err(CatalogError::invalid("price is too large"));
    }
    // Normalizes `-0` and pins the scale so "5" and "5.00" compare and render alike.
    let mut rounded = rounded.abs();
    rounded.rescale(2);
    Ok(rounded)
}

fn validate_units(units: i64) -> Result<i32, CatalogError> {
    if units <= 0 {
        return Err(CatalogError::invalid("per_case must be a positive integer"));
    }
    i32::try_from(units).map_err(|_| CatalogError::invalid("per_case is too large"))
}

/// Parse a price from a JSON number or numeric string without going through `f64`.
pub fn parse_price(value: &Value) -> Result<Decimal, CatalogError> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err(CatalogError::invalid("price must be a number")),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| CatalogError::invalid(format!("price '{text}' is not a number")))
}

/// Parse units-per-case from a JSON integer or digit-only string.
pub fn parse_units(value: &Value) -> Result<i64, CatalogError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| CatalogError::invalid("per_case must be a whole number")),
        Value::String(s) => {
            let s = s.trim();
            let digits = s.strip_prefix('-').unwrap_or(s);
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(CatalogError::invalid(format!(
                    "per_case '{s}' is not a whole number"
                )));
            }
            s.parse::<i64>()
                .map_err(|_| CatalogError::invalid("per_case is too large"))
        }
        _ => Err(CatalogError::invalid("per_case must be a whole number")),
    }
}
