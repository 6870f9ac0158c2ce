//! Update expressions and upserts.
//!
//! Only five update operators are understood: `$set`, `$unset`, `$inc`, `$push` and
//! `$setOnInsert`. An update without any `$` key is a replacement document, which is only
//! meaningful for an upsert that inserts it as-is.

use bson::{Bson, Document};

use docmock_core::{
    error::{CollectionError, CollectionResult},
    filter::{Filter, FilterValue},
};

use crate::path;

/// A supported update operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Set,
    Unset,
    Inc,
    Push,
    SetOnInsert,
}

impl UpdateOperator {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "$set" => Some(UpdateOperator::Set),
            "$unset" => Some(UpdateOperator::Unset),
            "$inc" => Some(UpdateOperator::Inc),
            "$push" => Some(UpdateOperator::Push),
            "$setOnInsert" => Some(UpdateOperator::SetOnInsert),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            UpdateOperator::Set => "$set",
            UpdateOperator::Unset => "$unset",
            UpdateOperator::Inc => "$inc",
            UpdateOperator::Push => "$push",
            UpdateOperator::SetOnInsert => "$setOnInsert",
        }
    }
}

/// A parsed update expression.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateExpression {
    /// A plain document with no `$` keys.
    Replacement(Document),
    /// Operators with their `field -> operand` documents, in the order they were written.
    Operators(Vec<(UpdateOperator, Document)>),
}

impl UpdateExpression {
    /// Parses and validates `update`.
    ///
    /// # Errors
    ///
    /// - [`CollectionError::UnsupportedUpdateOperators`] naming every top-level key that is
    ///   not a supported operator, when at least one key starts with `$`.
    /// - [`CollectionError::InvalidOperand`] when an operator's operand is not a document.
    pub fn parse(update: &Document) -> CollectionResult<Self> {
        if !update.keys().any(|key| key.starts_with('$')) {
            return Ok(UpdateExpression::Replacement(update.clone()));
        }

        let unsupported = update
            .keys()
            .filter(|key| UpdateOperator::from_key(key).is_none())
            .cloned()
            .collect::<Vec<_>>();

        if !unsupported.is_empty() {
            return Err(CollectionError::UnsupportedUpdateOperators(unsupported));
        }

        update
            .iter()
            .filter_map(|(key, operand)| UpdateOperator::from_key(key).map(|op| (op, operand)))
            .map(|(operator, operand)| match operand {
                Bson::Document(fields) => Ok((operator, fields.clone())),
                _ => Err(CollectionError::invalid_operand(
                    operator.key(),
                    "expected a document of field paths",
                )),
            })
            .collect::<CollectionResult<Vec<_>>>()
            .map(UpdateExpression::Operators)
    }

    /// Applies the expression to `document` in place and reports whether it changed.
    ///
    /// The document is left untouched when an error is returned.
    ///
    /// # Errors
    ///
    /// - [`CollectionError::UnsupportedUpdateOperators`] for a replacement document, whose
    ///   plain keys are not operators.
    /// - [`CollectionError::InvalidUpdate`] when a path descends through a scalar or an
    ///   increment overflows.
    pub fn apply(&self, document: &mut Document) -> CollectionResult<bool> {
        let operators = match self {
            UpdateExpression::Operators(operators) => operators,
            UpdateExpression::Replacement(replacement) => {
                return Err(CollectionError::UnsupportedUpdateOperators(
                    replacement.keys().cloned().collect(),
                ));
            }
        };

        let mut updated = document.clone();
        for (operator, fields) in operators {
            apply_operator(&mut updated, *operator, fields)?;
        }

        let changed = updated != *document;
        if changed {
            *document = updated;
        }

        Ok(changed)
    }

    /// Builds the document an upsert inserts when nothing matched `filter`.
    ///
    /// A replacement is inserted as-is. Otherwise the document is built from the literal
    /// fields of `filter`, then `$set`, then `$setOnInsert`, then the remaining operators.
    ///
    /// # Errors
    ///
    /// - [`CollectionError::ConflictingUpsertFields`] listing every field named by both
    ///   `$set` and `$setOnInsert`.
    /// - Any error [`UpdateExpression::apply`] can raise.
    pub fn upsert_document(&self, filter: &Filter) -> CollectionResult<Document> {
        let operators = match self {
            UpdateExpression::Replacement(replacement) => return Ok(replacement.clone()),
            UpdateExpression::Operators(operators) => operators,
        };

        let fields_of = |wanted: UpdateOperator| {
            operators
                .iter()
                .filter(move |(operator, _)| *operator == wanted)
                .flat_map(|(_, fields)| fields.iter())
        };

        let conflicts = fields_of(UpdateOperator::Set)
            .filter(|(field, _)| fields_of(UpdateOperator::SetOnInsert).any(|(other, _)| other == *field))
            .map(|(field, _)| field.clone())
            .collect::<Vec<_>>();

        if !conflicts.is_empty() {
            return Err(CollectionError::ConflictingUpsertFields(conflicts));
        }

        let mut document = Document::new();

        for (key, value) in filter.iter() {
            if let Some(literal) = literal_field(key, value) {
                path::set(&mut document, key, literal.clone())?;
            }
        }

        for wanted in [UpdateOperator::Set, UpdateOperator::SetOnInsert] {
            for (field, value) in fields_of(wanted) {
                path::set(&mut document, field, value.clone())?;
            }
        }

        for (operator, fields) in operators {
            if !matches!(operator, UpdateOperator::Set | UpdateOperator::SetOnInsert) {
                apply_operator(&mut document, *operator, fields)?;
            }
        }

        Ok(document)
    }
}

/// The value a filter entry pins its field to, if it is a plain equality.
fn literal_field<'a>(key: &str, value: &'a FilterValue) -> Option<&'a Bson> {
    let FilterValue::Value(value) = value else {
        return None;
    };

    if key.starts_with('$') || (key.bytes().all(|b| b.is_ascii_digit()) && matches!(value, Bson::Document(_))) {
        return None;
    }

    match value {
        Bson::Document(document) if document.keys().any(|key| key.starts_with('$')) => {
            match document.len() {
                1 => document.get("$eq"),
                _ => None,
            }
        }
        Bson::String(s) if s == "$exists" => None,
        Bson::RegularExpression(_) => None,
        literal => Some(literal),
    }
}

fn apply_operator(document: &mut Document, operator: UpdateOperator, fields: &Document) -> CollectionResult<()> {
    for (field, operand) in fields {
        match operator {
            UpdateOperator::Set | UpdateOperator::SetOnInsert => {
                path::set(document, field, operand.clone())?;
            }
            UpdateOperator::Unset => {
                path::remove(document, field);
            }
            UpdateOperator::Inc => increment(document, field, operand)?,
            UpdateOperator::Push => {
                if let Some(Bson::Array(items)) = path::resolve_mut(document, field) {
                    items.push(operand.clone());
                }
            }
        }
    }

    Ok(())
}

fn increment(document: &mut Document, field: &str, operand: &Bson) -> CollectionResult<()> {
    if path::resolve(document, field).is_none() {
        path::set(document, field, Bson::Int32(0))?;
    }

    let Some(current) = path::resolve_mut(document, field) else {
        return Ok(());
    };

    let overflow = || CollectionError::InvalidUpdate(format!("increment of '{field}' overflows"));

    let next = match (&*current, operand) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(*a as i64 + *b as i64),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64((*a as i64).checked_add(*b).ok_or_else(overflow)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.checked_add(*b as i64).ok_or_else(overflow)?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b).ok_or_else(overflow)?),
        _ => return Ok(()),
    };

    *current = next;
    Ok(())
}
