#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One raw input row, addressed by column position.
pub type Row = Vec<Value>;

/// Scalar domain shared by raw input and canonical (cast) output.
///
/// `Float` is accepted as raw input only: no built-in [`DataType`] produces
/// it, so a float inside materialized data is a validation failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Exact decimal view of an integral or decimal value.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Int(v) => Some(Decimal::from(*v)),
            Self::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
        }
    }
}

// Variant-strict equality; floats compare by bit pattern so `Value` can key
// hash maps (value counts, mode, boolean cast memo).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Decimal(a), Self::Decimal(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Decimal(v) => v.normalize().hash(state),
            Self::Text(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Boolean,
    Int,
    Decimal,
    Text,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Boolean => "Boolean",
            Self::Int => "Int",
            Self::Decimal => "Decimal",
            Self::Text => "Text",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CastError {
    #[error("can not convert value {value:?} to {target}")]
    Unconvertible { value: Value, target: TypeKind },
    #[error("value {value:?} is out of range for {target}")]
    OutOfRange { value: Value, target: TypeKind },
    #[error("non-finite float {value} can not be cast to {target}")]
    NonFinite { value: f64, target: TypeKind },
}

// ── Token vocabularies ────────────────────────────────────────────────

pub const DEFAULT_NULL_VALUES: [&str; 6] = ["", "na", "n/a", "none", "null", "."];
pub const DEFAULT_TRUE_VALUES: [&str; 5] = ["yes", "y", "true", "t", "1"];
pub const DEFAULT_FALSE_VALUES: [&str; 5] = ["no", "n", "false", "f", "0"];

/// Case-insensitive set of string tokens. Tokens are lower-cased once, on
/// construction or deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TokenSet(BTreeSet<String>);

impl TokenSet {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            tokens
                .into_iter()
                .map(|token| token.as_ref().to_lowercase())
                .collect(),
        )
    }

    #[must_use]
    pub fn default_null() -> Self {
        Self::new(DEFAULT_NULL_VALUES)
    }

    #[must_use]
    pub fn default_true() -> Self {
        Self::new(DEFAULT_TRUE_VALUES)
    }

    #[must_use]
    pub fn default_false() -> Self {
        Self::new(DEFAULT_FALSE_VALUES)
    }

    /// `token` must already be lower-cased.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for TokenSet {
    fn from(tokens: Vec<String>) -> Self {
        Self::new(tokens)
    }
}

impl From<TokenSet> for Vec<String> {
    fn from(tokens: TokenSet) -> Self {
        tokens.0.into_iter().collect()
    }
}

/// Strip thousands separators and surrounding whitespace, then lower-case.
fn normalize_token(raw: &str) -> String {
    raw.replace(',', "").trim().to_lowercase()
}

fn parse_decimal(token: &str) -> Option<Decimal> {
    let token = token.strip_prefix('+').unwrap_or(token);
    Decimal::from_str(token)
        .or_else(|_| Decimal::from_scientific(token))
        .ok()
}

fn unconvertible(value: &Value, target: TypeKind) -> CastError {
    CastError::Unconvertible {
        value: value.clone(),
        target,
    }
}

// ── Per-type configuration ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BooleanType {
    true_values: TokenSet,
    false_values: TokenSet,
    null_values: TokenSet,
}

impl Default for BooleanType {
    fn default() -> Self {
        Self {
            true_values: TokenSet::default_true(),
            false_values: TokenSet::default_false(),
            null_values: TokenSet::default_null(),
        }
    }
}

impl BooleanType {
    #[must_use]
    pub fn with_true_values(mut self, tokens: TokenSet) -> Self {
        self.true_values = tokens;
        self
    }

    #[must_use]
    pub fn with_false_values(mut self, tokens: TokenSet) -> Self {
        self.false_values = tokens;
        self
    }

    #[must_use]
    pub fn with_null_values(mut self, tokens: TokenSet) -> Self {
        self.null_values = tokens;
        self
    }

    #[must_use]
    pub fn true_values(&self) -> &TokenSet {
        &self.true_values
    }

    #[must_use]
    pub fn false_values(&self) -> &TokenSet {
        &self.false_values
    }

    #[must_use]
    pub fn null_values(&self) -> &TokenSet {
        &self.null_values
    }

    fn cast(&self, value: &Value) -> Result<Value, CastError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Bool(v) => Ok(Value::Bool(*v)),
            Value::Int(1) => Ok(Value::Bool(true)),
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Decimal(d) if *d == Decimal::ONE => Ok(Value::Bool(true)),
            Value::Decimal(d) if d.is_zero() => Ok(Value::Bool(false)),
            Value::Text(raw) => {
                let token = normalize_token(raw);
                if self.null_values.contains(&token) {
                    Ok(Value::Null)
                } else if self.true_values.contains(&token) {
                    Ok(Value::Bool(true))
                } else if self.false_values.contains(&token) {
                    Ok(Value::Bool(false))
                } else {
                    Err(unconvertible(value, TypeKind::Boolean))
                }
            }
            _ => Err(unconvertible(value, TypeKind::Boolean)),
        }
    }
}

/// Configuration shared by the `Int` and `Decimal` types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberType {
    null_values: TokenSet,
}

impl Default for NumberType {
    fn default() -> Self {
        Self {
            null_values: TokenSet::default_null(),
        }
    }
}

impl NumberType {
    #[must_use]
    pub fn with_null_values(mut self, tokens: TokenSet) -> Self {
        self.null_values = tokens;
        self
    }

    #[must_use]
    pub fn null_values(&self) -> &TokenSet {
        &self.null_values
    }

    fn cast_int(&self, value: &Value) -> Result<Value, CastError> {
        let decimal_to_int = |d: Decimal| {
            d.trunc()
                .to_i64()
                .map(Value::Int)
                .ok_or_else(|| CastError::OutOfRange {
                    value: value.clone(),
                    target: TypeKind::Int,
                })
        };

        match value {
            Value::Null => Ok(Value::Null),
            Value::Int(v) => Ok(Value::Int(*v)),
            Value::Decimal(d) => decimal_to_int(*d),
            Value::Float(f) => {
                if !f.is_finite() {
                    return Err(CastError::NonFinite {
                        value: *f,
                        target: TypeKind::Int,
                    });
                }
                let truncated = f.trunc();
                // i64::MAX as f64 rounds up to 2^63, which is already out of range.
                if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
                    return Err(CastError::OutOfRange {
                        value: value.clone(),
                        target: TypeKind::Int,
                    });
                }
                Ok(Value::Int(truncated as i64))
            }
            Value::Text(raw) => {
                let token = normalize_token(raw);
                if self.null_values.contains(&token) {
                    return Ok(Value::Null);
                }
                if let Ok(v) = token.parse::<i64>() {
                    return Ok(Value::Int(v));
                }
                match parse_decimal(&token) {
                    Some(d) if d.fract().is_zero() => decimal_to_int(d),
                    _ => Err(unconvertible(value, TypeKind::Int)),
                }
            }
            Value::Bool(_) => Err(unconvertible(value, TypeKind::Int)),
        }
    }

    fn cast_decimal(&self, value: &Value) -> Result<Cast, CastError> {
        match value {
            Value::Null => Ok(Cast::exact(Value::Null)),
            Value::Decimal(d) => Ok(Cast::exact(Value::Decimal(*d))),
            Value::Int(v) => Ok(Cast::exact(Value::Decimal(Decimal::from(*v)))),
            Value::Float(f) => {
                if !f.is_finite() {
                    return Err(CastError::NonFinite {
                        value: *f,
                        target: TypeKind::Decimal,
                    });
                }
                Decimal::from_f64_retain(*f)
                    .map(|d| Cast::lossy(Value::Decimal(d)))
                    .ok_or_else(|| CastError::OutOfRange {
                        value: value.clone(),
                        target: TypeKind::Decimal,
                    })
            }
            Value::Text(raw) => {
                let token = normalize_token(raw);
                if self.null_values.contains(&token) {
                    return Ok(Cast::exact(Value::Null));
                }
                parse_decimal(&token)
                    .map(|d| Cast::exact(Value::Decimal(d)))
                    .ok_or_else(|| unconvertible(value, TypeKind::Decimal))
            }
            Value::Bool(_) => Err(unconvertible(value, TypeKind::Decimal)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextType {
    null_values: TokenSet,
    cast_nulls: bool,
}

impl Default for TextType {
    fn default() -> Self {
        Self {
            null_values: TokenSet::default_null(),
            cast_nulls: true,
        }
    }
}

impl TextType {
    #[must_use]
    pub fn with_null_values(mut self, tokens: TokenSet) -> Self {
        self.null_values = tokens;
        self
    }

    /// When disabled, strings matching a null token are kept verbatim.
    #[must_use]
    pub fn with_cast_nulls(mut self, cast_nulls: bool) -> Self {
        self.cast_nulls = cast_nulls;
        self
    }

    #[must_use]
    pub fn null_values(&self) -> &TokenSet {
        &self.null_values
    }

    #[must_use]
    pub fn cast_nulls(&self) -> bool {
        self.cast_nulls
    }

    fn cast(&self, value: &Value) -> Value {
        match value {
            Value::Null => Value::Null,
            Value::Text(raw) => {
                if self.cast_nulls && self.null_values.contains(&raw.trim().to_lowercase()) {
                    Value::Null
                } else {
                    Value::Text(raw.clone())
                }
            }
            other => Value::Text(other.to_string()),
        }
    }
}

// ── Data types ────────────────────────────────────────────────────────

/// Outcome of a single cast. `lossy` flags a well-defined conversion that may
/// have dropped precision (float into decimal).
#[derive(Debug, Clone, PartialEq)]
pub struct Cast {
    pub value: Value,
    pub lossy: bool,
}

impl Cast {
    fn exact(value: Value) -> Self {
        Self {
            value,
            lossy: false,
        }
    }

    fn lossy(value: Value) -> Self {
        Self { value, lossy: true }
    }
}

/// Declared column type: the rule that turns raw input into one canonical
/// representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataType {
    Boolean(BooleanType),
    Int(NumberType),
    Decimal(NumberType),
    Text(TextType),
}

impl DataType {
    #[must_use]
    pub fn boolean() -> Self {
        Self::Boolean(BooleanType::default())
    }

    #[must_use]
    pub fn int() -> Self {
        Self::Int(NumberType::default())
    }

    #[must_use]
    pub fn decimal() -> Self {
        Self::Decimal(NumberType::default())
    }

    #[must_use]
    pub fn text() -> Self {
        Self::Text(TextType::default())
    }

    #[must_use]
    pub fn boolean_with(config: BooleanType) -> Self {
        Self::Boolean(config)
    }

    #[must_use]
    pub fn int_with(config: NumberType) -> Self {
        Self::Int(config)
    }

    #[must_use]
    pub fn decimal_with(config: NumberType) -> Self {
        Self::Decimal(config)
    }

    #[must_use]
    pub fn text_with(config: TextType) -> Self {
        Self::Text(config)
    }

    #[must_use]
    pub fn kind(&self) -> TypeKind {
        match self {
            Self::Boolean(_) => TypeKind::Boolean,
            Self::Int(_) => TypeKind::Int,
            Self::Decimal(_) => TypeKind::Decimal,
            Self::Text(_) => TypeKind::Text,
        }
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Decimal(_))
    }

    /// Cast a raw value to this type's canonical representation.
    ///
    /// Already-canonical values pass through unchanged, so
    /// `cast(cast(x)) == cast(x)`.
    pub fn cast(&self, value: &Value) -> Result<Value, CastError> {
        self.cast_flagged(value).map(|cast| cast.value)
    }

    /// Like [`DataType::cast`], also reporting whether precision may have
    /// been lost.
    pub fn cast_flagged(&self, value: &Value) -> Result<Cast, CastError> {
        match self {
            Self::Boolean(config) => config.cast(value).map(Cast::exact),
            Self::Int(config) => config.cast_int(value).map(Cast::exact),
            Self::Decimal(config) => config.cast_decimal(value),
            Self::Text(config) => Ok(Cast::exact(config.cast(value))),
        }
    }

    /// Whether `value` is in this type's canonical form. Null always is.
    #[must_use]
    pub fn is_canonical(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (Self::Boolean(_), Value::Bool(_))
                | (Self::Int(_), Value::Int(_))
                | (Self::Decimal(_), Value::Decimal(_))
                | (Self::Text(_), Value::Text(_))
        )
    }

    /// Cast helper for one materialization pass.
    #[must_use]
    pub fn caster(&self) -> Caster<'_> {
        Caster {
            data_type: self,
            memo: HashMap::new(),
        }
    }
}

/// Per-pass caster. Boolean casts of text input are memoized by raw token,
/// since the same handful of tokens repeat across every row.
#[derive(Debug)]
pub struct Caster<'a> {
    data_type: &'a DataType,
    memo: HashMap<String, Value>,
}

impl Caster<'_> {
    pub fn cast(&mut self, value: &Value) -> Result<Cast, CastError> {
        if let (DataType::Boolean(_), Value::Text(raw)) = (self.data_type, value) {
            if let Some(hit) = self.memo.get(raw) {
                return Ok(Cast::exact(hit.clone()));
            }
            let cast = self.data_type.cast_flagged(value)?;
            self.memo.insert(raw.clone(), cast.value.clone());
            return Ok(cast);
        }
        self.data_type.cast_flagged(value)
    }

    #[must_use]
    pub fn memoized(&self) -> usize {
        self.memo.len()
    }
}
