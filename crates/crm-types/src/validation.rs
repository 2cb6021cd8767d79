//! Configuration validation framework.
//!
//! Pluggable implementations (storage backends, tracking providers,
//! mailers) each receive a raw TOML table at construction time. This module
//! provides the schema types they use to validate that table before
//! touching it, with detailed error reporting.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	/// A required field is missing.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// A field has an invalid value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// A field has the wrong type.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

/// Expected type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// Array of homogeneous elements.
	Array(Box<FieldType>),
	/// Nested table validated against its own schema.
	Table(Schema),
}

/// Custom validator hook run after type checking.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field in a configuration schema.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Attaches a custom validator run after the type check passes.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}
}

/// A validation schema: required fields plus optional fields.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema: presence of required
	/// fields, type of every present field, then custom validators.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			check_field(&field.name, value, field)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				check_field(&field.name, value, field)?;
			}
		}

		Ok(())
	}
}

fn check_field(name: &str, value: &toml::Value, field: &Field) -> Result<(), ValidationError> {
	check_type(name, value, &field.field_type)?;
	if let Some(validator) = &field.validator {
		validator(value).map_err(|message| ValidationError::InvalidValue {
			field: name.to_string(),
			message,
		})?;
	}
	Ok(())
}

fn check_type(name: &str, value: &toml::Value, expected: &FieldType) -> Result<(), ValidationError> {
	let mismatch = |expected: &str| ValidationError::TypeMismatch {
		field: name.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	};

	match expected {
		FieldType::String => {
			if !value.is_str() {
				return Err(mismatch("string"));
			}
		},
		FieldType::Integer { min, max } => {
			let int_val = value.as_integer().ok_or_else(|| mismatch("integer"))?;
			if let Some(min) = min {
				if int_val < *min {
					return Err(ValidationError::InvalidValue {
						field: name.to_string(),
						message: format!("Value {} is less than minimum {}", int_val, min),
					});
				}
			}
			if let Some(max) = max {
				if int_val > *max {
					return Err(ValidationError::InvalidValue {
						field: name.to_string(),
						message: format!("Value {} is greater than maximum {}", int_val, max),
					});
				}
			}
		},
		FieldType::Boolean => {
			if !value.is_bool() {
				return Err(mismatch("boolean"));
			}
		},
		FieldType::Array(inner) => {
			let array = value.as_array().ok_or_else(|| mismatch("array"))?;
			for (i, item) in array.iter().enumerate() {
				check_type(&format!("{}[{}]", name, i), item, inner)?;
			}
		},
		FieldType::Table(schema) => {
			schema.validate(value).map_err(|e| prefix_field(name, e))?;
		},
	}

	Ok(())
}

/// Prefixes nested-table errors with the parent field name.
fn prefix_field(parent: &str, err: ValidationError) -> ValidationError {
	match err {
		ValidationError::MissingField(f) => {
			ValidationError::MissingField(format!("{}.{}", parent, f))
		},
		ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
			field: format!("{}.{}", parent, field),
			message,
		},
		ValidationError::TypeMismatch {
			field,
			expected,
			actual,
		} => ValidationError::TypeMismatch {
			field: format!("{}.{}", parent, field),
			expected,
			actual,
		},
	}
}

/// Trait implemented by each pluggable implementation's schema, allowing
/// the builder to validate an implementation's TOML table before
/// constructing it.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn table(s: &str) -> toml::Value {
		s.parse::<toml::Value>().unwrap()
	}

	#[test]
	fn missing_required_field() {
		let schema = Schema::new(vec![Field::new("base_url", FieldType::String)], vec![]);
		let err = schema.validate(&table("other = 1")).unwrap_err();
		assert!(matches!(err, ValidationError::MissingField(f) if f == "base_url"));
	}

	#[test]
	fn integer_bounds_enforced() {
		let schema = Schema::new(
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(5),
					max: Some(30),
				},
			)],
			vec![],
		);

		assert!(schema.validate(&table("timeout_seconds = 15")).is_ok());
		assert!(schema.validate(&table("timeout_seconds = 2")).is_err());
		assert!(schema.validate(&table("timeout_seconds = 60")).is_err());
	}

	#[test]
	fn custom_validator_runs() {
		let schema = Schema::new(
			vec![
				Field::new("policy", FieldType::String).with_validator(|v| {
					match v.as_str() {
						Some("strict") | Some("lenient") => Ok(()),
						_ => Err("must be 'strict' or 'lenient'".into()),
					}
				}),
			],
			vec![],
		);

		assert!(schema.validate(&table("policy = \"strict\"")).is_ok());
		let err = schema.validate(&table("policy = \"other\"")).unwrap_err();
		assert!(matches!(err, ValidationError::InvalidValue { .. }));
	}

	#[test]
	fn nested_table_errors_are_prefixed() {
		let inner = Schema::new(vec![Field::new("endpoint", FieldType::String)], vec![]);
		let schema = Schema::new(vec![Field::new("mailer", FieldType::Table(inner))], vec![]);

		let err = schema.validate(&table("[mailer]\nother = 1")).unwrap_err();
		assert!(err.to_string().contains("mailer.endpoint"));
	}
}
