//! Structural schemas for JSON messages crossing an agent boundary.
//!
//! Validation never fails fast: every mismatch is reported as a
//! [`FieldError`] carrying a JSON-path-like location.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Location of the offending value, rooted at `$`.
    pub path: String,
    /// Description of the mismatch.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// One named property of an object schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Property name.
    pub name: String,
    /// Schema the property value must satisfy.
    pub schema: Schema,
    /// Whether the property must be present.
    pub required: bool,
}

impl Property {
    /// Creates a required property.
    #[must_use]
    pub fn required(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: true,
        }
    }

    /// Creates an optional property. `null` is accepted for optional values.
    #[must_use]
    pub fn optional(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: false,
        }
    }
}

/// Structural description of a JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schema {
    /// Any value, including `null`.
    Any,
    /// A JSON boolean.
    Boolean,
    /// A JSON integer within optional bounds.
    Integer {
        /// Inclusive lower bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<i64>,
        /// Inclusive upper bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<i64>,
    },
    /// Any JSON number.
    Number,
    /// A JSON string.
    String {
        /// Minimum character count.
        #[serde(default)]
        min_length: usize,
        /// Permitted values; empty means unrestricted.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        allowed: Vec<String>,
    },
    /// A JSON array whose items share one schema.
    Array {
        /// Item schema.
        items: Box<Schema>,
        /// Minimum item count.
        #[serde(default)]
        min_items: usize,
    },
    /// A JSON object with named properties.
    Object {
        /// Declared properties.
        properties: Vec<Property>,
        /// Whether undeclared properties are tolerated.
        #[serde(default = "default_true")]
        additional_properties: bool,
    },
    /// A discriminated union: the `tag` field selects the variant schema.
    ///
    /// When `content` is set, the variant schema applies to that field;
    /// otherwise it applies to the whole object.
    Tagged {
        /// Discriminator field name.
        tag: String,
        /// Field holding the variant body, if separate from the tag.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        /// Variant schemas keyed by discriminator value.
        variants: BTreeMap<String, Schema>,
    },
}

const fn default_true() -> bool {
    true
}

impl Schema {
    /// Any string.
    #[must_use]
    pub const fn string() -> Self {
        Self::String {
            min_length: 0,
            allowed: Vec::new(),
        }
    }

    /// A string with at least one non-whitespace character.
    #[must_use]
    pub const fn non_empty_string() -> Self {
        Self::String {
            min_length: 1,
            allowed: Vec::new(),
        }
    }

    /// A string restricted to the given values.
    #[must_use]
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::String {
            min_length: 0,
            allowed: values.into_iter().map(Into::into).collect(),
        }
    }

    /// An unbounded integer.
    #[must_use]
    pub const fn integer() -> Self {
        Self::Integer {
            minimum: None,
            maximum: None,
        }
    }

    /// An integer within `minimum..=maximum`.
    #[must_use]
    pub const fn integer_range(minimum: i64, maximum: i64) -> Self {
        Self::Integer {
            minimum: Some(minimum),
            maximum: Some(maximum),
        }
    }

    /// An array of `items`.
    #[must_use]
    pub fn array_of(items: Self) -> Self {
        Self::Array {
            items: Box::new(items),
            min_items: 0,
        }
    }

    /// An object that tolerates undeclared properties.
    #[must_use]
    pub const fn object(properties: Vec<Property>) -> Self {
        Self::Object {
            properties,
            additional_properties: true,
        }
    }

    /// An object that rejects undeclared properties.
    #[must_use]
    pub const fn strict_object(properties: Vec<Property>) -> Self {
        Self::Object {
            properties,
            additional_properties: false,
        }
    }

    /// A tagged union whose variant body lives in `content`.
    #[must_use]
    pub fn tagged<I, S>(tag: impl Into<String>, content: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = (S, Self)>,
        S: Into<String>,
    {
        Self::Tagged {
            tag: tag.into(),
            content: Some(content.into()),
            variants: variants
                .into_iter()
                .map(|(name, schema)| (name.into(), schema))
                .collect(),
        }
    }

    /// Validates `value`, returning every mismatch found.
    #[must_use]
    pub fn validate(&self, value: &Value) -> Vec<FieldError> {
        let mut errors = Vec::new();
        self.validate_at(value, "$", &mut errors);
        errors
    }

    fn validate_at(&self, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
        match self {
            Self::Any => {}
            Self::Boolean => {
                if !value.is_boolean() {
                    errors.push(type_mismatch(path, "boolean", value));
                }
            }
            Self::Number => {
                if !value.is_number() {
                    errors.push(type_mismatch(path, "number", value));
                }
            }
            Self::Integer { minimum, maximum } => {
                validate_integer(value, *minimum, *maximum, path, errors);
            }
            Self::String {
                min_length,
                allowed,
            } => validate_string(value, *min_length, allowed, path, errors),
            Self::Array { items, min_items } => {
                let Some(elements) = value.as_array() else {
                    errors.push(type_mismatch(path, "array", value));
                    return;
                };
                if elements.len() < *min_items {
                    errors.push(FieldError::new(
                        path,
                        format!("expected at least {min_items} item(s), found {}", elements.len()),
                    ));
                }
                for (index, element) in elements.iter().enumerate() {
                    items.validate_at(element, &format!("{path}[{index}]"), errors);
                }
            }
            Self::Object {
                properties,
                additional_properties,
            } => validate_object(value, properties, *additional_properties, path, errors),
            Self::Tagged {
                tag,
                content,
                variants,
            } => validate_tagged(value, tag, content.as_deref(), variants, path, errors),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_mismatch(path: &str, expected: &str, value: &Value) -> FieldError {
    FieldError::new(
        path,
        format!("expected {expected}, found {}", json_type_name(value)),
    )
}

fn validate_integer(
    value: &Value,
    minimum: Option<i64>,
    maximum: Option<i64>,
    path: &str,
    errors: &mut Vec<FieldError>,
) {
    let Some(number) = value.as_i64() else {
        errors.push(type_mismatch(path, "integer", value));
        return;
    };
    if let Some(min) = minimum
        && number < min
    {
        errors.push(FieldError::new(path, format!("{number} is below minimum {min}")));
    }
    if let Some(max) = maximum
        && number > max
    {
        errors.push(FieldError::new(path, format!("{number} exceeds maximum {max}")));
    }
}

fn validate_string(
    value: &Value,
    min_length: usize,
    allowed: &[String],
    path: &str,
    errors: &mut Vec<FieldError>,
) {
    let Some(text) = value.as_str() else {
        errors.push(type_mismatch(path, "string", value));
        return;
    };
    if text.trim().chars().count() < min_length {
        errors.push(FieldError::new(
            path,
            format!("expected at least {min_length} non-blank character(s)"),
        ));
    }
    if !allowed.is_empty() && !allowed.iter().any(|candidate| candidate == text) {
        errors.push(FieldError::new(
            path,
            format!("'{text}' is not one of [{}]", allowed.join(", ")),
        ));
    }
}

fn validate_object(
    value: &Value,
    properties: &[Property],
    additional_properties: bool,
    path: &str,
    errors: &mut Vec<FieldError>,
) {
    let Some(fields) = value.as_object() else {
        errors.push(type_mismatch(path, "object", value));
        return;
    };
    for property in properties {
        let field_path = format!("{path}.{}", property.name);
        match fields.get(&property.name) {
            None => {
                if property.required {
                    errors.push(FieldError::new(field_path, "required field is missing"));
                }
            }
            Some(Value::Null) if !property.required => {}
            Some(field) => property.schema.validate_at(field, &field_path, errors),
        }
    }
    if !additional_properties {
        for name in fields.keys() {
            if !properties.iter().any(|property| &property.name == name) {
                errors.push(FieldError::new(
                    format!("{path}.{name}"),
                    "undeclared field is not allowed",
                ));
            }
        }
    }
}

fn validate_tagged(
    value: &Value,
    tag: &str,
    content: Option<&str>,
    variants: &BTreeMap<String, Schema>,
    path: &str,
    errors: &mut Vec<FieldError>,
) {
    let Some(fields) = value.as_object() else {
        errors.push(type_mismatch(path, "object", value));
        return;
    };
    let tag_path = format!("{path}.{tag}");
    let Some(discriminator) = fields.get(tag).and_then(Value::as_str) else {
        errors.push(FieldError::new(tag_path, "discriminator is missing or not a string"));
        return;
    };
    let Some(variant) = variants.get(discriminator) else {
        errors.push(FieldError::new(
            tag_path,
            format!("unknown variant '{discriminator}'"),
        ));
        return;
    };
    match content {
        Some(body_field) => {
            let body_path = format!("{path}.{body_field}");
            match fields.get(body_field) {
                Some(body) => variant.validate_at(body, &body_path, errors),
                None => errors.push(FieldError::new(body_path, "required field is missing")),
            }
        }
        None => variant.validate_at(value, path, errors),
    }
}
