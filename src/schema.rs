//! Model schemas and per-field coercion.
//!
//! A [`Schema`] plays the part of the model type: it names the record shape,
//! marks identity fields and declares how raw values are converted. Custom
//! conversions are plain function pointers attached to a field, so every
//! transform a model relies on is visible in its declaration.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};

use crate::{error::SchemaError, record::Record};

/// Static per-field conversion applied before type coercion.
pub type FieldTransform = fn(Value) -> Result<Value, String>;

/// Declared type of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    /// UTF-8 text. Numbers and booleans are stringified.
    String,
    /// JSON number. Numeric strings are parsed.
    Number,
    /// Boolean. Accepts `"true"`, `"false"`, `1` and `0`.
    Boolean,
    /// Timestamp stored as an RFC 3339 UTC string.
    Date,
    /// No coercion.
    Any,
}

/// A single field declaration.
#[derive(Clone, Debug)]
pub struct Field {
    name: String,
    kind: FieldType,
    identity: bool,
    transform: Option<FieldTransform>,
    allowed: Option<Vec<Value>>,
}

impl Field {
    /// Declare a field of the given type.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            kind,
            identity: false,
            transform: None,
            allowed: None,
        }
    }

    /// Declare a text field.
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self { Self::new(name, FieldType::String) }

    /// Declare a numeric field.
    #[must_use]
    pub fn number(name: impl Into<String>) -> Self { Self::new(name, FieldType::Number) }

    /// Declare a boolean field.
    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self { Self::new(name, FieldType::Boolean) }

    /// Declare a date field.
    #[must_use]
    pub fn date(name: impl Into<String>) -> Self { Self::new(name, FieldType::Date) }

    /// Declare an untyped field.
    #[must_use]
    pub fn any(name: impl Into<String>) -> Self { Self::new(name, FieldType::Any) }

    /// Mark the field as part of the record identity.
    #[must_use]
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Run `transform` on every raw value before type coercion.
    #[must_use]
    pub fn transform(mut self, transform: FieldTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Restrict coerced values to `values`.
    #[must_use]
    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Declared type.
    #[must_use]
    pub fn kind(&self) -> FieldType { self.kind }

    /// Whether the field is an identity field.
    #[must_use]
    pub fn is_identity(&self) -> bool { self.identity }

    /// Convert a raw value according to this declaration.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the transform rejects the value, the value
    /// cannot be represented as the declared type, or it falls outside the
    /// allowed set.
    pub fn coerce(&self, value: Value) -> Result<Value, SchemaError> {
        if value.is_null() {
            return Ok(value);
        }
        let value = match self.transform {
            Some(transform) => transform(value).map_err(|reason| SchemaError::new(&self.name, reason))?,
            None => value,
        };
        let value = coerce_kind(self.kind, value).map_err(|reason| SchemaError::new(&self.name, reason))?;
        if let Some(allowed) = &self.allowed {
            if !value.is_null() && !allowed.contains(&value) {
                return Err(SchemaError::new(
                    &self.name,
                    format!("{value} is not one of {}", Value::Array(allowed.clone())),
                ));
            }
        }
        Ok(value)
    }
}

/// The declared shape of a model's records.
#[derive(Clone, Debug)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
}

impl Schema {
    /// Start declaring a schema called `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Schema name.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// All declared fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[Field] { &self.fields }

    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> { self.fields.iter().find(|f| f.name == name) }

    /// Names of the identity fields in declaration order.
    #[must_use]
    pub fn identity_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.identity)
            .map(|f| f.name.clone())
            .collect()
    }

    /// Coerce a single value destined for `field`.
    ///
    /// Undeclared fields pass through unchanged.
    ///
    /// # Errors
    ///
    /// Propagates the field's coercion failure.
    pub fn coerce_value(&self, field: &str, value: Value) -> Result<Value, SchemaError> {
        match self.field(field) {
            Some(declared) => declared.coerce(value),
            None => Ok(value),
        }
    }

    /// Coerce every declared field of `record`.
    ///
    /// # Errors
    ///
    /// Returns the first field that fails coercion.
    pub fn coerce(&self, record: Record) -> Result<Record, SchemaError> {
        record
            .into_iter()
            .map(|(key, value)| {
                let value = self.coerce_value(&key, value)?;
                Ok((key, value))
            })
            .collect()
    }
}

/// Builder returned by [`Schema::builder`].
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    /// Add a field declaration. A later declaration with the same name wins.
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.retain(|f| f.name != field.name);
        self.fields.push(field);
        self
    }

    /// Finish the schema.
    #[must_use]
    pub fn build(self) -> Arc<Schema> {
        Arc::new(Schema {
            name: self.name,
            fields: self.fields,
        })
    }
}

/// The list type bound to a model: a named collection of model records.
#[derive(Clone, Debug)]
pub struct ListSchema {
    name: String,
    item: Arc<Schema>,
}

impl ListSchema {
    /// Declare a list type named `name` holding `item` records.
    #[must_use]
    pub fn of(name: impl Into<String>, item: Arc<Schema>) -> Self {
        Self {
            name: name.into(),
            item,
        }
    }

    /// List type name.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Schema of the list's items.
    #[must_use]
    pub fn item(&self) -> &Arc<Schema> { &self.item }
}

fn coerce_kind(kind: FieldType, value: Value) -> Result<Value, String> {
    match (kind, value) {
        (_, Value::Null) => Ok(Value::Null),
        (FieldType::Any, value) => Ok(value),
        (FieldType::String, Value::String(text)) => Ok(Value::String(text)),
        (FieldType::String, value @ (Value::Number(_) | Value::Bool(_))) => {
            Ok(Value::String(value.to_string()))
        }
        (FieldType::Number, Value::Number(number)) => Ok(Value::Number(number)),
        (FieldType::Number, Value::String(text)) => parse_number(&text)
            .map(Value::Number)
            .ok_or_else(|| format!("`{text}` is not a number")),
        (FieldType::Boolean, Value::Bool(flag)) => Ok(Value::Bool(flag)),
        (FieldType::Boolean, Value::String(text)) => match text.as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("`{text}` is not a boolean")),
        },
        (FieldType::Boolean, Value::Number(number)) => match number.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(format!("{number} is not a boolean")),
        },
        (FieldType::Date, Value::String(text)) => parse_date(&text)
            .map(|date| Value::String(format_date(date)))
            .ok_or_else(|| format!("`{text}` is not a date")),
        (FieldType::Date, Value::Number(number)) => number
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|date| Value::String(format_date(date)))
            .ok_or_else(|| format!("{number} is not a timestamp")),
        (kind, other) => Err(format!("cannot convert {other} to {kind:?}")),
    }
}

fn parse_number(text: &str) -> Option<Number> {
    let text = text.trim();
    text.parse::<i64>()
        .ok()
        .map(Number::from)
        .or_else(|| text.parse::<f64>().ok().and_then(Number::from_f64))
}

/// Parse the date formats accepted by [`FieldType::Date`].
pub(crate) fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|date| date.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|day| day.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

fn format_date(date: DateTime<Utc>) -> String { date.to_rfc3339_opts(SecondsFormat::Secs, true) }
