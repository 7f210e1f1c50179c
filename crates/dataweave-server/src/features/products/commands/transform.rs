//! Mapping of a queued message onto a product and its metadata
//!
//! A message looks like:
//!
//! ```json
//! {
//!   "available_price": "12.50",
//!   "stock": "In Stock",
//!   "source": "X",
//!   "meta_info": "{'reference_product_id': 'P1', 'fulfilment_modes': ['delivery']}"
//! }
//! ```
//!
//! `meta_info` may be JSON text, a Python literal, or an embedded object.

use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::features::products::literal::{parse_literal, LiteralError};

/// Exact `stock` value that marks a product as available
pub const IN_STOCK: &str = "In Stock";

/// Prices are stored as DECIMAL(10, 2): at most 8 integer digits
const PRICE_SCALE: i64 = 2;
const PRICE_INTEGER_DIGITS: i64 = 8;
const PRICE_LIMIT: i64 = 100_000_000;
/// Longest accepted price text
const PRICE_MAX_TEXT: usize = 64;

/// Why a message could not be turned into a stored product
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("message body is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("invalid price '{0}'")]
    InvalidPrice(String),

    #[error("meta_info could not be parsed: {0}")]
    MetaInfo(#[from] LiteralError),

    #[error("product '{0}' already exists")]
    DuplicateProduct(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl TransformError {
    /// Whether the same message may succeed if processed again later
    ///
    /// Only database availability problems qualify: a busy or locked database, an exhausted or
    /// closed pool, and I/O failures. Everything about the message itself is permanent.
    pub fn is_transient(&self) -> bool {
        let TransformError::Database(err) = self else {
            return false;
        };

        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_) => true,
            sqlx::Error::Database(db_err) => db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                // Primary result code: SQLITE_BUSY (5) or SQLITE_LOCKED (6)
                .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
            _ => false,
        }
    }
}

/// Product columns ready to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub reference_product_id: String,
    pub available_price: BigDecimal,
    pub in_stock: bool,
    pub source: String,
}

/// Metadata columns ready to insert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewMetaInfo {
    pub account_code: Option<String>,
    pub crawl_page_counter: Option<i64>,
    pub postal_zip_code: Option<String>,
    pub postal_zip_name: Option<String>,
    pub store_code: Option<String>,
    pub place_name: Option<String>,
    pub admin_name1: Option<String>,
    pub bundle_versions_row_pk_hash: Option<String>,
    pub bundle_variant_field_mapping: Option<String>,
    pub bundle_definition: Option<String>,
    pub fulfilment_modes: Option<String>,
    pub seller_name: Option<String>,
    pub bundle_match_type: Option<String>,
    pub reference_product_id: Option<String>,
    pub bundle_definition_hash: Option<String>,
    pub major_version_end_time: Option<String>,
}

/// Store one product and its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct StoreProductCommand {
    pub product: NewProduct,
    pub meta_info: NewMetaInfo,
}

impl StoreProductCommand {
    /// Build the command from a decoded queue message
    pub fn from_message(message: &Value) -> Result<Self, TransformError> {
        let message = message.as_object().ok_or(TransformError::NotAnObject)?;

        let meta = meta_info(message)?;
        let reference_product_id = text(&meta, "reference_product_id")?
            .ok_or(TransformError::MissingField("reference_product_id"))?;

        let available_price = price(required(message, "available_price")?)?;
        let in_stock = required(message, "stock")?.as_str() == Some(IN_STOCK);
        let source = text(message, "source")?.ok_or(TransformError::MissingField("source"))?;

        let meta_info = NewMetaInfo {
            account_code: text(&meta, "account_code")?,
            crawl_page_counter: integer(&meta, "crawl_page_counter")?,
            postal_zip_code: text(&meta, "postal_zip_code")?,
            postal_zip_name: text(&meta, "postal_zip_name")?,
            store_code: text(&meta, "store_code")?,
            place_name: text(&meta, "place_name")?,
            admin_name1: text(&meta, "admin_name1")?,
            bundle_versions_row_pk_hash: text(&meta, "bundle_versions_row_pk_hash")?,
            bundle_variant_field_mapping: structured(&meta, "bundle_variant_field_mapping"),
            bundle_definition: structured(&meta, "bundle_definition"),
            fulfilment_modes: structured(&meta, "fulfilment_modes"),
            seller_name: text(&meta, "seller_name")?,
            bundle_match_type: text(&meta, "bundle_match_type")?,
            reference_product_id: Some(reference_product_id.clone()),
            bundle_definition_hash: text(&meta, "bundle_definition_hash")?,
            major_version_end_time: text(&meta, "major_version_end_time")?,
        };

        Ok(Self {
            product: NewProduct {
                reference_product_id,
                available_price,
                in_stock,
                source,
            },
            meta_info,
        })
    }
}

fn required<'a>(object: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, TransformError> {
    object.get(field).ok_or(TransformError::MissingField(field))
}

fn meta_info(message: &Map<String, Value>) -> Result<Map<String, Value>, TransformError> {
    let parsed = match required(message, "meta_info")? {
        Value::String(text) => parse_literal(text)?,
        Value::Object(object) => return Ok(object.clone()),
        Value::Null => return Err(TransformError::MissingField("meta_info")),
        other => other.clone(),
    };

    match parsed {
        Value::Object(object) => Ok(object),
        other => Err(TransformError::InvalidField {
            field: "meta_info",
            reason: format!("expected a dictionary, found {}", kind(&other)),
        }),
    }
}

/// Round to two places (half-even) and check the column range
///
/// The magnitude is checked before rounding, so an extreme exponent such as `1e30000000` is
/// rejected without materialising its digits.
pub fn price(value: &Value) -> Result<BigDecimal, TransformError> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => return Err(TransformError::InvalidPrice(other.to_string())),
    };

    if raw.len() > PRICE_MAX_TEXT {
        return Err(TransformError::InvalidPrice(raw));
    }

    let decimal =
        BigDecimal::from_str(&raw).map_err(|_| TransformError::InvalidPrice(raw.clone()))?;
    if decimal.is_zero() {
        return Ok(BigDecimal::zero().with_scale(PRICE_SCALE));
    }

    // Digits left of the decimal point; zero or negative for |value| < 1
    let (_, scale) = decimal.as_bigint_and_exponent();
    let integer_digits = i64::try_from(decimal.digits())
        .unwrap_or(i64::MAX)
        .saturating_sub(scale);
    if integer_digits > PRICE_INTEGER_DIGITS {
        return Err(TransformError::InvalidPrice(raw));
    }
    if integer_digits < -PRICE_SCALE {
        // Below 0.001, which rounds to zero
        return Ok(BigDecimal::zero().with_scale(PRICE_SCALE));
    }

    let rounded = decimal.with_scale_round(PRICE_SCALE, RoundingMode::HalfEven);

    if rounded.abs() >= BigDecimal::from(PRICE_LIMIT) {
        return Err(TransformError::InvalidPrice(raw));
    }

    Ok(rounded)
}

/// Canonical column text of a price: optional sign, integer part, two fractional digits
pub fn price_text(price: &BigDecimal) -> String {
    let (mantissa, _) = price
        .with_scale_round(PRICE_SCALE, RoundingMode::HalfEven)
        .as_bigint_and_exponent();
    let text = mantissa.to_string();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", text.as_str()),
    };

    let digits = format!("{:0>3}", digits);
    let (whole, cents) = digits.split_at(digits.len() - PRICE_SCALE as usize);
    format!("{}{}.{}", sign, whole, cents)
}

/// Scalar as text; null and absent are `None`
fn text(object: &Map<String, Value>, field: &'static str) -> Result<Option<String>, TransformError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(TransformError::InvalidField {
            field,
            reason: format!("expected a scalar, found {}", kind(other)),
        }),
    }
}

fn integer(object: &Map<String, Value>, field: &'static str) -> Result<Option<i64>, TransformError> {
    let invalid = |value: &Value| TransformError::InvalidField {
        field,
        reason: format!("expected an integer, found {}", value),
    };

    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value @ Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15).map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| invalid(value)),
        Some(value @ Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid(value)),
        Some(other) => Err(invalid(other)),
    }
}

/// Compact JSON text of a structured field, only when the field is present
fn structured(object: &Map<String, Value>, field: &str) -> Option<String> {
    object.get(field).map(Value::to_string)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a dictionary",
    }
}
