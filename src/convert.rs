//! Value converters
//!
//! Converters turn node text into typed [`Value`]s and back. The
//! [`ConverterRegistry`] dispatches on [`ValueType::key`]: registered
//! converters win, built-in scalar types fall back to [`DefaultConverter`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

use crate::contract::ValueType;
use crate::error::{ProjectionError, Result};
use crate::value::{CustomValue, Value};

/// Locale and time zone in effect for conversions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionContext {
    /// Decimal separator accepted and produced for floats
    pub decimal_separator: char,
    /// Offset for date-times without one
    pub time_zone: FixedOffset,
}

impl Default for ConversionContext {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            time_zone: Utc.fix(),
        }
    }
}

/// Text to value and value to text for one or more types
pub trait ValueConverter: Send + Sync {
    /// Parse node text as `ty`
    fn to_value(&self, text: &str, ty: &ValueType, ctx: &ConversionContext) -> Result<Value>;

    /// Render `value` as text for a node of type `ty`
    fn to_text(&self, value: &Value, ty: &ValueType, ctx: &ConversionContext) -> Result<String>;
}

fn mismatch(value: &Value, ty: &ValueType) -> ProjectionError {
    ProjectionError::conversion(format!("cannot render a {} as {}", value.kind_name(), ty))
}

fn malformed(text: &str, ty: &ValueType) -> ProjectionError {
    ProjectionError::conversion(format!("'{}' is not a valid {}", text, ty))
}

/// Built-in scalar conversions
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConverter;

impl DefaultConverter {
    fn parse_float(text: &str, ty: &ValueType, ctx: &ConversionContext) -> Result<f64> {
        let trimmed = text.trim();
        let normalized = if ctx.decimal_separator == '.' {
            trimmed.to_string()
        } else {
            trimmed.replace(ctx.decimal_separator, ".")
        };
        normalized.parse::<f64>().map_err(|_| malformed(text, ty))
    }

    fn format_float(value: f64, ty: &ValueType, ctx: &ConversionContext) -> String {
        let text = match ty {
            ValueType::F32 => (value as f32).to_string(),
            _ => value.to_string(),
        };
        if ctx.decimal_separator == '.' {
            text
        } else {
            text.replace('.', &ctx.decimal_separator.to_string())
        }
    }

    fn parse_date_time(text: &str, format: Option<&str>, ctx: &ConversionContext) -> Option<DateTime<FixedOffset>> {
        let text = text.trim();
        match format {
            None => DateTime::parse_from_rfc3339(text).ok().or_else(|| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .and_then(|naive| ctx.time_zone.from_local_datetime(&naive).single())
            }),
            Some(format) => DateTime::parse_from_str(text, format).ok().or_else(|| {
                NaiveDateTime::parse_from_str(text, format)
                    .ok()
                    .and_then(|naive| ctx.time_zone.from_local_datetime(&naive).single())
            }),
        }
    }
}

impl ValueConverter for DefaultConverter {
    fn to_value(&self, text: &str, ty: &ValueType, ctx: &ConversionContext) -> Result<Value> {
        match ty {
            ValueType::Bool => {
                let trimmed = text.trim();
                if trimmed.eq_ignore_ascii_case("true") || trimmed == "1" {
                    Ok(Value::Bool(true))
                } else if trimmed.eq_ignore_ascii_case("false") || trimmed == "0" {
                    Ok(Value::Bool(false))
                } else {
                    Err(malformed(text, ty))
                }
            }
            ValueType::Int(width) => {
                let n: i64 = text.trim().parse().map_err(|_| malformed(text, ty))?;
                let (min, max) = width.range();
                if n < min || n > max {
                    return Err(ProjectionError::conversion(format!(
                        "{} is out of range for {}",
                        n, ty
                    )));
                }
                Ok(Value::Int(n))
            }
            ValueType::F32 => Ok(Value::Float(Self::parse_float(text, ty, ctx)? as f32 as f64)),
            ValueType::F64 => Ok(Value::Float(Self::parse_float(text, ty, ctx)?)),
            ValueType::Char => {
                // A lone whitespace char is kept as is
                let candidate = if text.chars().count() == 1 { text } else { text.trim() };
                let mut chars = candidate.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Char(c)),
                    _ => Err(malformed(text, ty)),
                }
            }
            ValueType::String => Ok(Value::String(text.to_string())),
            ValueType::Date { format } => {
                let format = format.as_deref().unwrap_or("%Y-%m-%d");
                NaiveDate::parse_from_str(text.trim(), format)
                    .map(Value::Date)
                    .map_err(|_| malformed(text, ty))
            }
            ValueType::DateTime { format } => Self::parse_date_time(text, format.as_deref(), ctx)
                .map(Value::DateTime)
                .ok_or_else(|| malformed(text, ty)),
            ValueType::Enum(e) => {
                let variant = text.trim();
                if e.contains(variant) {
                    Ok(Value::Enum {
                        ty: e.name.clone(),
                        variant: variant.to_string(),
                    })
                } else {
                    Err(malformed(text, ty))
                }
            }
            ValueType::Custom(name) => Err(ProjectionError::conversion(format!(
                "no converter registered for type '{}'",
                name
            ))),
        }
    }

    fn to_text(&self, value: &Value, ty: &ValueType, ctx: &ConversionContext) -> Result<String> {
        if value.is_null() {
            return Ok(String::new());
        }
        match (ty, value) {
            (ValueType::String, v) => v.plain_text().ok_or_else(|| mismatch(v, ty)),
            (ValueType::Bool, Value::Bool(b)) => Ok(b.to_string()),
            (ValueType::Int(width), Value::Int(n)) => {
                let (min, max) = width.range();
                if *n < min || *n > max {
                    return Err(ProjectionError::conversion(format!(
                        "{} is out of range for {}",
                        n, ty
                    )));
                }
                Ok(n.to_string())
            }
            (ValueType::F32 | ValueType::F64, Value::Float(f)) => Ok(Self::format_float(*f, ty, ctx)),
            (ValueType::F32 | ValueType::F64, Value::Int(n)) => Ok(n.to_string()),
            (ValueType::Char, Value::Char(c)) => Ok(c.to_string()),
            (ValueType::Date { format }, Value::Date(d)) => {
                Ok(d.format(format.as_deref().unwrap_or("%Y-%m-%d")).to_string())
            }
            (ValueType::DateTime { format }, Value::DateTime(dt)) => Ok(match format {
                Some(format) => dt.format(format).to_string(),
                None => dt.to_rfc3339(),
            }),
            (ValueType::Enum(e), Value::Enum { variant, .. }) if e.contains(variant) => {
                Ok(variant.clone())
            }
            // Text is accepted for any scalar type once it parses as that type
            (_, Value::String(s)) => self.to_value(s, ty, ctx).map(|_| s.clone()),
            _ => Err(mismatch(value, ty)),
        }
    }
}

/// Converter for any user type with `FromStr` and `Display`
pub struct FromStrConverter<T> {
    type_name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FromStrConverter<T> {
    /// Converter producing `Value::Custom` tagged `type_name`
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> ValueConverter for FromStrConverter<T>
where
    T: FromStr + Display + Any + Send + Sync,
    T::Err: Display,
{
    fn to_value(&self, text: &str, _ty: &ValueType, _ctx: &ConversionContext) -> Result<Value> {
        T::from_str(text.trim())
            .map(|v| Value::Custom(CustomValue::new(self.type_name.clone(), v)))
            .map_err(|e| {
                ProjectionError::conversion(format!(
                    "'{}' is not a valid {}: {}",
                    text, self.type_name, e
                ))
            })
    }

    fn to_text(&self, value: &Value, ty: &ValueType, ctx: &ConversionContext) -> Result<String> {
        match value {
            Value::Null => Ok(String::new()),
            Value::Custom(custom) => custom
                .downcast_ref::<T>()
                .map(ToString::to_string)
                .ok_or_else(|| mismatch(value, ty)),
            Value::String(s) => self.to_value(s, ty, ctx).map(|_| s.clone()),
            _ => Err(mismatch(value, ty)),
        }
    }
}

/// Type key to converter table
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    context: ConversionContext,
    converters: HashMap<String, Arc<dyn ValueConverter>>,
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.converters.keys().collect();
        keys.sort();
        f.debug_struct("ConverterRegistry")
            .field("context", &self.context)
            .field("registered", &keys)
            .finish()
    }
}

impl ConverterRegistry {
    /// Registry with only the default converter
    pub fn new(context: ConversionContext) -> Self {
        Self {
            context,
            converters: HashMap::new(),
        }
    }

    /// Conversion context in effect
    pub fn context(&self) -> &ConversionContext {
        &self.context
    }

    /// Register `converter` for the type key `key`, replacing any earlier one
    pub fn register(&mut self, key: impl Into<String>, converter: Arc<dyn ValueConverter>) {
        self.converters.insert(key.into(), converter);
    }

    /// Whether a converter is registered for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.converters.contains_key(key)
    }

    fn converter_for(&self, ty: &ValueType) -> Option<&dyn ValueConverter> {
        self.converters.get(&ty.key()).map(|c| c.as_ref())
    }

    /// Parse `text` as `ty`
    pub fn to_value(&self, text: &str, ty: &ValueType) -> Result<Value> {
        match self.converter_for(ty) {
            Some(converter) => converter.to_value(text, ty, &self.context),
            None => DefaultConverter.to_value(text, ty, &self.context),
        }
    }

    /// Render `value` as `ty`
    pub fn to_text(&self, value: &Value, ty: &ValueType) -> Result<String> {
        match self.converter_for(ty) {
            Some(converter) => converter.to_text(value, ty, &self.context),
            None => DefaultConverter.to_text(value, ty, &self.context),
        }
    }
}
