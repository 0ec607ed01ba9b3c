//! Structured filter types and their JSON form.
//!
//! A `Filter<T>` is a conjunction of clauses, each pairing a field of
//! `T` with a `Constraint`. Filters are validated when they are built:
//! unknown fields, unknown operator keys, mistyped operands and
//! malformed `between` bounds are all rejected before any backend sees
//! the filter.
//!
//! The JSON form mirrors the loosely shaped lookup objects callers
//! already write:
//!
//! ```text
//! { "price": { "between": [500, 550] }, "name": "widget" }
//! ```
//!
//! A literal value means equality; an object holds one or more
//! operator keys (`eq`, `ne`, `gt`, `gte`, `lt`, `lte`, `between`, `in`,
//! `contains`).

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Value type of a filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Text,
}

/// Static description of one filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name as used in filters. Also the storage column name.
    pub name: &'static str,
    pub ty: FieldType,
}

/// Records that can be matched against a `Filter`.
pub trait Filterable {
    /// Entity name used in error messages (e.g. "item").
    const ENTITY: &'static str;

    /// Field used by bare DSL words, if the entity has one.
    const DEFAULT_TEXT_FIELD: Option<&'static str> = None;

    /// Fields that filters may reference.
    fn fields() -> &'static [FieldSpec];

    /// Current value of `field`, or `None` when the field is null.
    fn field_value(&self, field: &str) -> Option<Scalar>;

    /// Look up a field definition by name.
    fn field_spec(name: &str) -> Option<FieldSpec> {
        Self::fields().iter().copied().find(|spec| spec.name == name)
    }
}

/// A typed literal used as a filter operand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Integer(i64),
    Text(String),
}

impl Scalar {
    pub fn field_type(&self) -> FieldType {
        match self {
            Scalar::Integer(_) => FieldType::Integer,
            Scalar::Text(_) => FieldType::Text,
        }
    }

    /// Compare two scalars of the same type. Mixed types are unordered.
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Integer(a), Scalar::Integer(b)) => Some(a.cmp(b)),
            (Scalar::Text(a), Scalar::Text(b)) => Some(a.as_str().cmp(b.as_str())),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Integer(v) => write!(f, "{v}"),
            Scalar::Text(v) => write!(f, "{v:?}"),
        }
    }
}

/// The closed set of supported constraint operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Eq(Scalar),
    Ne(Scalar),
    Gt(Scalar),
    Gte(Scalar),
    Lt(Scalar),
    Lte(Scalar),
    /// Closed interval, inclusive on both ends. `low <= high` holds.
    Between { low: Scalar, high: Scalar },
    /// Membership in a non-empty set of values.
    In(Vec<Scalar>),
    /// Substring match on a text field.
    Contains(String),
}

impl Constraint {
    /// Operator key used in the JSON form.
    pub fn operator(&self) -> &'static str {
        match self {
            Constraint::Eq(_) => "eq",
            Constraint::Ne(_) => "ne",
            Constraint::Gt(_) => "gt",
            Constraint::Gte(_) => "gte",
            Constraint::Lt(_) => "lt",
            Constraint::Lte(_) => "lte",
            Constraint::Between { .. } => "between",
            Constraint::In(_) => "in",
            Constraint::Contains(_) => "contains",
        }
    }

    /// Whether a (non-null) field value satisfies this constraint.
    pub fn matches(&self, value: &Scalar) -> bool {
        match self {
            Constraint::Eq(v) => value == v,
            Constraint::Ne(v) => value.field_type() == v.field_type() && value != v,
            Constraint::Gt(v) => value.compare(v) == Some(Ordering::Greater),
            Constraint::Gte(v) => matches!(
                value.compare(v),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            ),
            Constraint::Lt(v) => value.compare(v) == Some(Ordering::Less),
            Constraint::Lte(v) => matches!(
                value.compare(v),
                Some(Ordering::Less) | Some(Ordering::Equal)
            ),
            Constraint::Between { low, high } => {
                matches!(
                    value.compare(low),
                    Some(Ordering::Greater) | Some(Ordering::Equal)
                ) && matches!(
                    value.compare(high),
                    Some(Ordering::Less) | Some(Ordering::Equal)
                )
            }
            Constraint::In(values) => values.iter().any(|v| v == value),
            Constraint::Contains(needle) => match value {
                Scalar::Text(text) => text.contains(needle.as_str()),
                Scalar::Integer(_) => false,
            },
        }
    }
}

/// A single `field <op> operand` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub field: &'static str,
    pub constraint: Constraint,
}

/// Errors raised while building a filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("filter must be a JSON object mapping field names to constraints")]
    NotAnObject,
    #[error("unknown {entity} field `{field}`")]
    UnknownField { entity: &'static str, field: String },
    #[error("unknown operator `{operator}` for field `{field}`")]
    UnknownOperator { field: String, operator: String },
    #[error("empty constraint for field `{field}`")]
    EmptyConstraint { field: String },
    #[error("invalid operand for field `{field}`: {reason}")]
    InvalidOperand { field: String, reason: String },
    #[error("operator `{operator}` is not supported for field `{field}`: {reason}")]
    UnsupportedOperator {
        field: String,
        operator: String,
        reason: String,
    },
    #[error("malformed bounds for field `{field}`: {reason}")]
    MalformedBounds { field: String, reason: String },
    #[error("inverted bounds for field `{field}`: {low} is greater than {high}")]
    InvertedBounds {
        field: String,
        low: String,
        high: String,
    },
}

/// Validated conjunction of clauses over records of type `T`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter<T> {
    clauses: Vec<Clause>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Filterable> Default for Filter<T> {
    fn default() -> Self {
        Self::all()
    }
}

impl<T: Filterable> Filter<T> {
    /// A filter with no clauses; matches every record.
    pub fn all() -> Self {
        Self {
            clauses: Vec::new(),
            _entity: PhantomData,
        }
    }

    /// Add a clause after validating it against `T`'s fields.
    pub fn with(mut self, field: &str, constraint: Constraint) -> Result<Self, FilterError> {
        self.push(field, constraint)?;
        Ok(self)
    }

    /// Validate and append a clause.
    pub fn push(&mut self, field: &str, constraint: Constraint) -> Result<(), FilterError> {
        let spec = T::field_spec(field).ok_or_else(|| FilterError::UnknownField {
            entity: T::ENTITY,
            field: field.to_string(),
        })?;
        validate_constraint(spec, &constraint)?;
        self.clauses.push(Clause {
            field: spec.name,
            constraint,
        });
        Ok(())
    }

    /// Append all clauses of another filter over the same entity.
    pub fn extend(&mut self, other: Filter<T>) {
        self.clauses.extend(other.clauses);
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluate the filter against a record.
    ///
    /// A null field value never satisfies a clause.
    pub fn matches(&self, record: &T) -> bool {
        self.clauses.iter().all(|clause| {
            record
                .field_value(clause.field)
                .map(|value| clause.constraint.matches(&value))
                .unwrap_or(false)
        })
    }

    /// Build a filter from its JSON form.
    ///
    /// `null` is accepted and treated as the empty filter.
    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        let mut filter = Self::all();

        let map = match value {
            Value::Null => return Ok(filter),
            Value::Object(map) => map,
            _ => return Err(FilterError::NotAnObject),
        };

        for (field, raw) in map {
            let spec = T::field_spec(field).ok_or_else(|| FilterError::UnknownField {
                entity: T::ENTITY,
                field: field.clone(),
            })?;

            match raw {
                Value::Object(ops) => {
                    if ops.is_empty() {
                        return Err(FilterError::EmptyConstraint {
                            field: field.clone(),
                        });
                    }
                    for (operator, operand) in ops {
                        let constraint = parse_operator(spec, operator, operand)?;
                        filter.push(spec.name, constraint)?;
                    }
                }
                literal => {
                    let scalar = scalar_from_json(spec, literal)?;
                    filter.push(spec.name, Constraint::Eq(scalar))?;
                }
            }
        }

        Ok(filter)
    }
}

fn parse_operator(
    spec: FieldSpec,
    operator: &str,
    operand: &Value,
) -> Result<Constraint, FilterError> {
    let constraint = match operator {
        "eq" => Constraint::Eq(scalar_from_json(spec, operand)?),
        "ne" => Constraint::Ne(scalar_from_json(spec, operand)?),
        "gt" => Constraint::Gt(scalar_from_json(spec, operand)?),
        "gte" => Constraint::Gte(scalar_from_json(spec, operand)?),
        "lt" => Constraint::Lt(scalar_from_json(spec, operand)?),
        "lte" => Constraint::Lte(scalar_from_json(spec, operand)?),
        "between" => {
            let bounds = operand
                .as_array()
                .ok_or_else(|| FilterError::MalformedBounds {
                    field: spec.name.to_string(),
                    reason: "expected a [low, high] array".to_string(),
                })?;
            if bounds.len() != 2 {
                return Err(FilterError::MalformedBounds {
                    field: spec.name.to_string(),
                    reason: format!("expected 2 bounds, got {}", bounds.len()),
                });
            }
            Constraint::Between {
                low: scalar_from_json(spec, &bounds[0])?,
                high: scalar_from_json(spec, &bounds[1])?,
            }
        }
        "in" => {
            let values = operand
                .as_array()
                .ok_or_else(|| FilterError::InvalidOperand {
                    field: spec.name.to_string(),
                    reason: "`in` expects an array of values".to_string(),
                })?;
            let scalars = values
                .iter()
                .map(|v| scalar_from_json(spec, v))
                .collect::<Result<Vec<_>, _>>()?;
            Constraint::In(scalars)
        }
        "contains" => match operand {
            Value::String(s) => Constraint::Contains(s.clone()),
            _ => {
                return Err(FilterError::InvalidOperand {
                    field: spec.name.to_string(),
                    reason: "`contains` expects a string".to_string(),
                })
            }
        },
        other => {
            return Err(FilterError::UnknownOperator {
                field: spec.name.to_string(),
                operator: other.to_string(),
            })
        }
    };

    Ok(constraint)
}

fn scalar_from_json(spec: FieldSpec, value: &Value) -> Result<Scalar, FilterError> {
    match (spec.ty, value) {
        (FieldType::Integer, Value::Number(n)) => {
            n.as_i64()
                .map(Scalar::Integer)
                .ok_or_else(|| FilterError::InvalidOperand {
                    field: spec.name.to_string(),
                    reason: format!("{n} is not a 64-bit integer"),
                })
        }
        (FieldType::Text, Value::String(s)) => Ok(Scalar::Text(s.clone())),
        (ty, other) => Err(FilterError::InvalidOperand {
            field: spec.name.to_string(),
            reason: format!("expected {} value, got {}", type_name(ty), json_kind(other)),
        }),
    }
}

/// Parse a raw DSL operand into a scalar of the field's type.
pub(crate) fn scalar_from_str(spec: FieldSpec, raw: &str) -> Result<Scalar, FilterError> {
    match spec.ty {
        FieldType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Scalar::Integer)
            .map_err(|_| FilterError::InvalidOperand {
                field: spec.name.to_string(),
                reason: format!("`{raw}` is not an integer"),
            }),
        FieldType::Text => Ok(Scalar::Text(raw.to_string())),
    }
}

fn validate_constraint(spec: FieldSpec, constraint: &Constraint) -> Result<(), FilterError> {
    let check = |scalar: &Scalar| -> Result<(), FilterError> {
        if scalar.field_type() != spec.ty {
            return Err(FilterError::InvalidOperand {
                field: spec.name.to_string(),
                reason: format!(
                    "expected {} value, got {}",
                    type_name(spec.ty),
                    type_name(scalar.field_type())
                ),
            });
        }
        Ok(())
    };

    match constraint {
        Constraint::Eq(v)
        | Constraint::Ne(v)
        | Constraint::Gt(v)
        | Constraint::Gte(v)
        | Constraint::Lt(v)
        | Constraint::Lte(v) => check(v),
        Constraint::Between { low, high } => {
            check(low)?;
            check(high)?;
            if low.compare(high) == Some(Ordering::Greater) {
                return Err(FilterError::InvertedBounds {
                    field: spec.name.to_string(),
                    low: low.to_string(),
                    high: high.to_string(),
                });
            }
            Ok(())
        }
        Constraint::In(values) => {
            if values.is_empty() {
                return Err(FilterError::EmptyConstraint {
                    field: spec.name.to_string(),
                });
            }
            values.iter().try_for_each(check)
        }
        Constraint::Contains(_) => {
            if spec.ty != FieldType::Text {
                return Err(FilterError::UnsupportedOperator {
                    field: spec.name.to_string(),
                    operator: "contains".to_string(),
                    reason: "only text fields support substring matching".to_string(),
                });
            }
            Ok(())
        }
    }
}

fn type_name(ty: FieldType) -> &'static str {
    match ty {
        FieldType::Integer => "an integer",
        FieldType::Text => "a text",
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
