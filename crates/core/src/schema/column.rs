//! Column definition.

use super::property::PropertyBag;
use crate::error::{Error, Result};
use crate::types::DataType;
use crate::value::Value;

/// Auto-increment settings and the next value to hand out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutoIncrement {
    /// First value generated.
    pub seed: i64,
    /// Increment between generated values; never zero.
    pub step: i64,
    next: i64,
}

impl AutoIncrement {
    /// Creates a generator starting at `seed`.
    pub fn new(seed: i64, step: i64) -> Self {
        Self {
            seed,
            step,
            next: seed,
        }
    }

    /// Returns the value the next new row will receive.
    pub fn peek(&self) -> i64 {
        self.next
    }

    fn advance(&mut self) -> i64 {
        let value = self.next;
        self.next = self.next.saturating_add(self.step);
        value
    }

    /// Moves the generator past `value` if a row was loaded with an explicit key.
    pub fn observe(&mut self, value: i64) {
        if (self.step > 0 && value >= self.next) || (self.step < 0 && value <= self.next) {
            self.next = value.saturating_add(self.step);
        }
    }
}

/// A column definition in a table schema.
#[derive(Clone, Debug)]
pub struct Column {
    name: String,
    data_type: DataType,
    allow_null: bool,
    unique: bool,
    read_only: bool,
    default_value: Option<Value>,
    max_length: Option<usize>,
    auto_increment: Option<AutoIncrement>,
    expression: Option<String>,
    caption: Option<String>,
    ordinal: usize,
    properties: PropertyBag,
}

impl Column {
    /// Creates a nullable column with no default.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            allow_null: true,
            unique: false,
            read_only: false,
            default_value: None,
            max_length: None,
            auto_increment: None,
            expression: None,
            caption: None,
            ordinal: 0,
            properties: PropertyBag::new(),
        }
    }

    /// Sets whether this column allows nulls.
    pub fn allow_null(mut self, allow_null: bool) -> Self {
        self.allow_null = allow_null;
        self
    }

    /// Requests a single-column unique constraint when the column is added.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Sets whether this column is read only.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Sets the default value for new rows.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Sets the maximum string length.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Makes the column auto-increment.
    pub fn auto_increment(mut self, seed: i64, step: i64) -> Self {
        self.auto_increment = Some(AutoIncrement::new(seed, step));
        self
    }

    /// Makes the column computed from an expression over the same row.
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// Sets the display caption.
    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Checks the column's own settings for contradictions.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_schema("column name cannot be empty"));
        }
        if let Some(auto) = &self.auto_increment {
            if !self.data_type.is_integer() {
                return Err(Error::invalid_schema(format!(
                    "auto-increment column '{}' must be an integer type",
                    self.name
                )));
            }
            if auto.step == 0 {
                return Err(Error::invalid_schema("auto-increment step cannot be zero"));
            }
            if self.expression.is_some() {
                return Err(Error::invalid_schema(format!(
                    "column '{}' cannot be both computed and auto-increment",
                    self.name
                )));
            }
            if self.default_value.as_ref().is_some_and(|v| !v.is_null()) {
                return Err(Error::invalid_schema(format!(
                    "auto-increment column '{}' cannot have a default value",
                    self.name
                )));
            }
        }
        if self.expression.is_some() && self.unique {
            return Err(Error::invalid_schema(format!(
                "computed column '{}' cannot be unique",
                self.name
            )));
        }
        if self.max_length.is_some() && self.data_type != DataType::String {
            return Err(Error::invalid_schema(format!(
                "max length only applies to string columns, '{}' is {}",
                self.name, self.data_type
            )));
        }
        if let Some(default) = &self.default_value {
            default.coerce_to(self.data_type).ok_or_else(|| Error::TypeMismatch {
                column: self.name.clone(),
                expected: self.data_type,
                value: default.to_string(),
            })?;
        }
        Ok(())
    }

    /// Converts and validates a value assigned to this column.
    ///
    /// Applies type coercion, the null rule and the max length rule.
    pub fn check_value(&self, table: &str, value: Value) -> Result<Value> {
        let converted = self.coerce(value)?;
        self.check_rules(table, &converted)?;
        Ok(converted)
    }

    /// Converts a value to the column type.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        value.coerce_to(self.data_type).ok_or_else(|| Error::TypeMismatch {
            column: self.name.clone(),
            expected: self.data_type,
            value: value.to_string(),
        })
    }

    /// Checks the null and max length rules for an already converted value.
    pub fn check_rules(&self, table: &str, value: &Value) -> Result<()> {
        if value.is_null() && !self.allow_null {
            return Err(Error::NoNullAllowed {
                table: table.to_string(),
                column: self.name.clone(),
            });
        }
        if let (Some(max), Value::String(s)) = (self.max_length, value) {
            let length = s.chars().count();
            if length > max {
                return Err(Error::MaxLengthExceeded {
                    column: self.name.clone(),
                    max_length: max,
                    length,
                });
            }
        }
        Ok(())
    }

    /// Value a new row receives for this column.
    pub fn new_row_value(&mut self) -> Value {
        if let Some(auto) = self.auto_increment.as_mut() {
            let next = auto.advance();
            return match self.data_type {
                DataType::Int32 => i32::try_from(next).map(Value::Int32).unwrap_or(Value::Null),
                _ => Value::Int64(next),
            };
        }
        self.default_value
            .as_ref()
            .and_then(|v| v.coerce_to(self.data_type))
            .unwrap_or(Value::Null)
    }

    /// Returns the column name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the data type.
    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns whether nulls are allowed.
    #[inline]
    pub fn allows_null(&self) -> bool {
        self.allow_null
    }

    /// Returns whether a single-column unique constraint was requested.
    #[inline]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns whether the column rejects writes.
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only || self.expression.is_some()
    }

    /// Returns the declared default value.
    pub fn get_default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// Returns the max string length.
    #[inline]
    pub fn get_max_length(&self) -> Option<usize> {
        self.max_length
    }

    /// Returns the auto-increment settings.
    pub fn get_auto_increment(&self) -> Option<&AutoIncrement> {
        self.auto_increment.as_ref()
    }

    /// Mutable auto-increment settings.
    pub fn auto_increment_mut(&mut self) -> Option<&mut AutoIncrement> {
        self.auto_increment.as_mut()
    }

    /// Returns the computed-column expression text.
    pub fn get_expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    /// Returns true for a computed column.
    #[inline]
    pub fn is_computed(&self) -> bool {
        self.expression.is_some()
    }

    /// Returns the caption, falling back to the name.
    pub fn get_caption(&self) -> &str {
        self.caption.as_deref().unwrap_or(&self.name)
    }

    /// Returns the position of the column in its table.
    #[inline]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Returns the property bag.
    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    /// Mutable property bag.
    pub fn properties_mut(&mut self) -> &mut PropertyBag {
        &mut self.properties
    }

    pub fn set_ordinal(&mut self, ordinal: usize) {
        self.ordinal = ordinal;
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn set_allow_null(&mut self, allow_null: bool) {
        self.allow_null = allow_null;
    }

    pub fn set_unique_flag(&mut self, unique: bool) {
        self.unique = unique;
    }

    pub fn set_max_length(&mut self, max_length: Option<usize>) {
        self.max_length = max_length;
    }

    pub fn set_default_value(&mut self, value: Option<Value>) {
        self.default_value = value;
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn set_auto_increment(&mut self, auto: Option<AutoIncrement>) {
        self.auto_increment = auto;
    }

    pub fn set_caption(&mut self, caption: Option<String>) {
        self.caption = caption;
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.data_type == other.data_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_new() {
        let col = Column::new("id", DataType::Int64);
        assert_eq!(col.name(), "id");
        assert_eq!(col.data_type(), DataType::Int64);
        assert!(col.allows_null());
        assert!(!col.is_unique());
        assert_eq!(col.get_caption(), "id");
    }

    #[test]
    fn test_check_value_coerces() {
        let col = Column::new("n", DataType::Int64);
        assert_eq!(col.check_value("t", Value::Int32(3)).unwrap(), Value::Int64(3));
        assert!(matches!(
            col.check_value("t", Value::from("x")),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_check_value_null_rule() {
        let col = Column::new("n", DataType::String).allow_null(false);
        assert_eq!(
            col.check_value("t", Value::Null),
            Err(Error::NoNullAllowed {
                table: "t".into(),
                column: "n".into()
            })
        );
    }

    #[test]
    fn test_check_value_max_length() {
        let col = Column::new("code", DataType::String).max_length(3);
        assert!(col.check_value("t", Value::from("abc")).is_ok());
        assert!(matches!(
            col.check_value("t", Value::from("abcd")),
            Err(Error::MaxLengthExceeded { max_length: 3, length: 4, .. })
        ));
    }

    #[test]
    fn test_auto_increment_values() {
        let mut col = Column::new("id", DataType::Int32).auto_increment(10, 5);
        col.validate().unwrap();
        assert_eq!(col.new_row_value(), Value::Int32(10));
        assert_eq!(col.new_row_value(), Value::Int32(15));
        col.auto_increment_mut().unwrap().observe(40);
        assert_eq!(col.new_row_value(), Value::Int32(45));
    }

    #[test]
    fn test_validate_rejects_contradictions() {
        assert!(Column::new("x", DataType::String).auto_increment(1, 1).validate().is_err());
        assert!(Column::new("x", DataType::Int32)
            .auto_increment(1, 1)
            .expression("1 + 1")
            .validate()
            .is_err());
        assert!(Column::new("x", DataType::Int32)
            .auto_increment(1, 1)
            .default_value(4)
            .validate()
            .is_err());
        assert!(Column::new("x", DataType::Int32).max_length(4).validate().is_err());
        assert!(Column::new("x", DataType::Int32).default_value("abc").validate().is_err());
    }

    #[test]
    fn test_default_value_used_for_new_rows() {
        let mut col = Column::new("status", DataType::String).default_value("new");
        assert_eq!(col.new_row_value(), Value::from("new"));
    }

    #[test]
    fn test_computed_column_is_read_only() {
        let col = Column::new("total", DataType::Float64).expression("price * qty");
        assert!(col.is_read_only());
    }
}
