//! Compact filter DSL used by the CLI.
//!
//! The DSL is a shorthand for the JSON filter form:
//! - Whitespace-separated terms are combined with AND.
//! - Double quotes group text containing spaces.
//! - `field:value` is equality, `field:lo..hi` is an inclusive range,
//!   `field:a|b|c` is membership.
//! - `field:>=v`, `field:>v`, `field:<=v`, `field:<v` and `field:!=v`
//!   are comparisons; `field:~text` is a substring match.
//! - A bare word (no `:`) is a substring match on the entity's default
//!   text field (e.g. `name` for items).
//!
//! Terms go through the same validation as the JSON form, so unknown
//! fields and inverted ranges are rejected here too.

use crate::query::filter::{scalar_from_str, Constraint, FieldSpec, Filter, FilterError, Filterable};

/// Parse a DSL string into a validated filter.
///
/// An empty or whitespace-only input yields the empty filter.
pub fn parse_filter_expr<T: Filterable>(input: &str) -> Result<Filter<T>, FilterError> {
    let mut filter = Filter::all();

    for token in tokenize(input.trim()) {
        let (field, constraint) = parse_term::<T>(&token)?;
        filter.push(field, constraint)?;
    }

    Ok(filter)
}

/// Tokenize a query string, treating whitespace as separators and
/// allowing double-quoted segments to contain spaces.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(current);
                    current = String::new();
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

fn parse_term<T: Filterable>(atom: &str) -> Result<(&'static str, Constraint), FilterError> {
    let Some((head, rest)) = atom.split_once(':') else {
        // Bare words search the default text field.
        let field = T::DEFAULT_TEXT_FIELD.ok_or_else(|| FilterError::UnknownField {
            entity: T::ENTITY,
            field: atom.to_string(),
        })?;
        return Ok((field, Constraint::Contains(atom.to_string())));
    };

    let spec = T::field_spec(&head.to_ascii_lowercase()).ok_or_else(|| {
        FilterError::UnknownField {
            entity: T::ENTITY,
            field: head.to_string(),
        }
    })?;

    Ok((spec.name, parse_operand(spec, rest)?))
}

fn parse_operand(spec: FieldSpec, raw: &str) -> Result<Constraint, FilterError> {
    if raw.is_empty() {
        return Err(FilterError::EmptyConstraint {
            field: spec.name.to_string(),
        });
    }

    // Two-character operators must be checked before their one-character prefixes.
    if let Some(v) = raw.strip_prefix(">=") {
        return Ok(Constraint::Gte(scalar_from_str(spec, v)?));
    }
    if let Some(v) = raw.strip_prefix("<=") {
        return Ok(Constraint::Lte(scalar_from_str(spec, v)?));
    }
    if let Some(v) = raw.strip_prefix("!=") {
        return Ok(Constraint::Ne(scalar_from_str(spec, v)?));
    }
    if let Some(v) = raw.strip_prefix('>') {
        return Ok(Constraint::Gt(scalar_from_str(spec, v)?));
    }
    if let Some(v) = raw.strip_prefix('<') {
        return Ok(Constraint::Lt(scalar_from_str(spec, v)?));
    }
    if let Some(v) = raw.strip_prefix('~') {
        return Ok(Constraint::Contains(v.to_string()));
    }

    if let Some((low, high)) = raw.split_once("..") {
        if low.is_empty() || high.is_empty() || high.contains("..") {
            return Err(FilterError::MalformedBounds {
                field: spec.name.to_string(),
                reason: format!("expected `low..high`, got `{raw}`"),
            });
        }
        return Ok(Constraint::Between {
            low: scalar_from_str(spec, low)?,
            high: scalar_from_str(spec, high)?,
        });
    }

    if raw.contains('|') {
        let values = raw
            .split('|')
            .map(str::trim)
            .filter(|alt| !alt.is_empty())
            .map(|alt| scalar_from_str(spec, alt))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Constraint::In(values));
    }

    Ok(Constraint::Eq(scalar_from_str(spec, raw)?))
}
