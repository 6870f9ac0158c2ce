//! Per-field constraint compilation.
//!
//! A filter entry's right-hand side is compiled once into a [`Constraint`], a closed set of
//! matcher kinds, and then evaluated against every candidate document's resolved field
//! value. Compilation is where malformed operands are rejected, so a query that compiles
//! never fails while scanning.

use std::{cmp::Ordering, collections::HashMap, fmt, sync::Arc};
use bson::{Bson, Document, spec::BinarySubtype};
use regex::{Regex, RegexBuilder};

use docmock_core::{
    error::{CollectionError, CollectionResult},
    filter::{Filter, FilterValue, Predicate, ValueMatcher},
};

use crate::{
    compare::{compare, is_truthy, loose_eq, strict_eq},
    evaluator::{CompiledQuery, QueryCompiler},
};

static NULL: Bson = Bson::Null;

/// A custom constraint operator: receives the resolved field value (`None` when missing)
/// and the operand written in the filter.
pub type CustomOperator = Arc<dyn Fn(Option<&Bson>, &Bson) -> bool + Send + Sync>;

/// Custom operators by name, including the leading `$`.
#[derive(Clone, Default)]
pub struct OperatorRegistry(HashMap<String, CustomOperator>);

impl OperatorRegistry {
    pub fn insert(&mut self, name: impl Into<String>, operator: CustomOperator) {
        self.0.insert(name.into(), operator);
    }

    pub fn get(&self, name: &str) -> Option<&CustomOperator> {
        self.0.get(name)
    }

    /// Adds every operator of `other`, replacing operators with the same name.
    pub fn extend_from(&mut self, other: &OperatorRegistry) {
        self.0
            .extend(other.0.iter().map(|(name, operator)| (name.clone(), operator.clone())));
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.0.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_list().entries(names).finish()
    }
}

/// Settings that change how filters compile.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Treat `$in` string operands written as `/pattern/flags` as regular expressions.
    /// Operands that fail to compile fall back to literal equality.
    pub in_operand_patterns: bool,
    pub operators: OperatorRegistry,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            in_operand_patterns: true,
            operators: OperatorRegistry::default(),
        }
    }
}

/// A compiled per-field constraint.
#[derive(Clone)]
pub enum Constraint {
    /// Caller closure, used verbatim.
    Predicate(Predicate),
    /// Caller [`ValueMatcher`].
    Matcher(Arc<dyn ValueMatcher>),
    /// `ObjectId` literal, compared through its hex form.
    Identifier(String),
    /// Regular expression literal.
    Pattern(Regex),
    /// Operator document, evaluated as a conjunction in key order.
    Operators(Vec<Operator>),
    /// Anything else: loose equality, with array containment.
    Literal(Bson),
}

/// A single compiled operator of an operator document.
#[derive(Clone)]
pub enum Operator {
    Compare(Ordering, bool, Bson),
    Eq(Bson),
    Ne(Bson),
    In(Vec<InOperand>),
    Nin(Vec<InOperand>),
    ElemMatch(Box<ElementMatcher>),
    Exists(bool),
    Size(usize),
    Type(Vec<BsonKind>),
    Not(Box<Constraint>),
    Constant(bool),
    Regex(Regex),
    All(Vec<Bson>),
    InstanceOf(String),
    Custom(CustomOperator, Bson),
}

/// An element of an `$in`/`$nin` operand.
#[derive(Clone)]
pub enum InOperand {
    Pattern(Regex),
    Value(Bson),
}

/// What `$elemMatch` applies to each array element.
#[derive(Clone)]
pub enum ElementMatcher {
    /// An operator document, applied to the element itself.
    Constraint(Constraint),
    /// A field filter, applied to elements that are documents.
    Query(CompiledQuery),
}

impl Constraint {
    /// Compiles a filter entry's value.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown operators, operator documents mixing `$` keys with
    /// plain keys, malformed operands and invalid `$regex` patterns.
    pub fn compile(value: &FilterValue, options: &CompilerOptions) -> CollectionResult<Self> {
        match value {
            FilterValue::Predicate(predicate) => Ok(Constraint::Predicate(predicate.clone())),
            FilterValue::Matcher(matcher) => Ok(Constraint::Matcher(matcher.clone())),
            FilterValue::Value(value) => Constraint::compile_bson(value, options),
            FilterValue::Filters(_) => Err(CollectionError::UnsupportedFilter(
                "filter groups are only allowed under $and, $or and $nor".into(),
            )),
        }
    }

    /// Compiles a BSON constraint.
    ///
    /// # Errors
    ///
    /// See [`Constraint::compile`].
    pub fn compile_bson(value: &Bson, options: &CompilerOptions) -> CollectionResult<Self> {
        match value {
            Bson::ObjectId(oid) => Ok(Constraint::Identifier(oid.to_hex())),
            Bson::RegularExpression(regex) => Ok(Constraint::Pattern(compile_pattern(
                regex.pattern.as_str(),
                regex.options.as_str(),
            )?)),
            Bson::String(s) if s == "$exists" => Ok(Constraint::Operators(vec![Operator::Exists(true)])),
            Bson::Document(document) => match is_operator_document(document)? {
                true => Ok(Constraint::Operators(compile_operators(document, options)?)),
                false => Ok(Constraint::Literal(value.clone())),
            },
            literal => Ok(Constraint::Literal(literal.clone())),
        }
    }

    /// Evaluates the constraint. `None` means the field is missing.
    pub fn matches(&self, value: Option<&Bson>) -> bool {
        match self {
            Constraint::Predicate(predicate) => predicate(value),
            Constraint::Matcher(matcher) => matcher.evaluate(value),
            Constraint::Identifier(hex) => match value {
                Some(Bson::ObjectId(oid)) => oid.to_hex() == *hex,
                Some(Bson::String(s)) => s == hex,
                _ => false,
            },
            Constraint::Pattern(regex) => pattern_matches(regex, value.unwrap_or(&NULL)),
            Constraint::Operators(operators) => evaluate_operators(operators, value),
            Constraint::Literal(literal) => literal_matches(literal, value.unwrap_or(&NULL)),
        }
    }
}

/// A document is an operator document when every key starts with `$`, and a literal when
/// none does. Mixing both is an error naming the first plain key.
fn is_operator_document(document: &Document) -> CollectionResult<bool> {
    if !document.keys().any(|key| key.starts_with('$')) {
        return Ok(false);
    }

    match document.keys().find(|key| !key.starts_with('$')) {
        Some(plain) => Err(CollectionError::UnsupportedOperator(plain.clone())),
        None => Ok(true),
    }
}

fn compile_operators(document: &Document, options: &CompilerOptions) -> CollectionResult<Vec<Operator>> {
    let mut operators = Vec::with_capacity(document.len());

    for (key, operand) in document {
        let operator = match key.as_str() {
            "$gt" => Operator::Compare(Ordering::Greater, false, operand.clone()),
            "$gte" => Operator::Compare(Ordering::Greater, true, operand.clone()),
            "$lt" => Operator::Compare(Ordering::Less, false, operand.clone()),
            "$lte" => Operator::Compare(Ordering::Less, true, operand.clone()),
            "$eq" => Operator::Eq(operand.clone()),
            "$ne" => Operator::Ne(operand.clone()),
            "$in" => Operator::In(compile_in_operands(key, operand, options)?),
            "$nin" => Operator::Nin(compile_in_operands(key, operand, options)?),
            "$elemMatch" => Operator::ElemMatch(Box::new(compile_elem_match(operand, options)?)),
            "$exists" => Operator::Exists(is_truthy(operand)),
            "$size" => Operator::Size(compile_size(operand)?),
            "$type" => Operator::Type(compile_type(operand)?),
            "$not" => match operand {
                Bson::Boolean(value) => Operator::Constant(!value),
                Bson::Document(_) | Bson::RegularExpression(_) => {
                    Operator::Not(Box::new(Constraint::compile_bson(operand, options)?))
                }
                _ => {
                    return Err(CollectionError::invalid_operand(
                        key,
                        "expected an operator document, a regular expression or a boolean",
                    ));
                }
            },
            "$regex" => Operator::Regex(compile_regex_operand(operand, document.get("$options"))?),
            "$options" => {
                if !document.contains_key("$regex") {
                    return Err(CollectionError::invalid_operand(key, "$options needs a $regex"));
                }
                continue;
            }
            "$all" => match operand {
                Bson::Array(items) => Operator::All(items.clone()),
                _ => return Err(CollectionError::invalid_operand(key, "expected an array")),
            },
            "$instanceOf" => match operand {
                Bson::String(kind) => Operator::InstanceOf(kind.clone()),
                _ => return Err(CollectionError::invalid_operand(key, "expected a type name")),
            },
            other => match options.operators.get(other) {
                Some(custom) => Operator::Custom(custom.clone(), operand.clone()),
                None => return Err(CollectionError::UnsupportedOperator(other.to_string())),
            },
        };

        operators.push(operator);
    }

    Ok(operators)
}

fn compile_in_operands(
    key: &str,
    operand: &Bson,
    options: &CompilerOptions,
) -> CollectionResult<Vec<InOperand>> {
    let Bson::Array(items) = operand else {
        return Err(CollectionError::invalid_operand(key, "expected an array"));
    };

    items
        .iter()
        .map(|item| match item {
            Bson::RegularExpression(regex) => Ok(InOperand::Pattern(compile_pattern(
                regex.pattern.as_str(),
                regex.options.as_str(),
            )?)),
            Bson::String(s) if options.in_operand_patterns => Ok(delimited_pattern(s)
                .and_then(|(pattern, flags)| compile_pattern(pattern, flags).ok())
                .map(InOperand::Pattern)
                .unwrap_or_else(|| InOperand::Value(item.clone()))),
            other => Ok(InOperand::Value(other.clone())),
        })
        .collect()
}

/// Keys that make an `$elemMatch` operand a sub-filter even though they start with `$`.
const QUERY_OPERATORS: [&str; 4] = ["$and", "$or", "$nor", "$isolated"];

fn compile_elem_match(operand: &Bson, options: &CompilerOptions) -> CollectionResult<ElementMatcher> {
    match operand {
        Bson::Document(document)
            if document.keys().any(|key| QUERY_OPERATORS.contains(&key.as_str()))
                || !is_operator_document(document)? =>
        {
            Ok(ElementMatcher::Query(
                QueryCompiler::new(options).compile(&Filter::from(document.clone()))?,
            ))
        }
        Bson::Document(document) => Ok(ElementMatcher::Constraint(
            Constraint::Operators(compile_operators(document, options)?),
        )),
        _ => Err(CollectionError::invalid_operand("$elemMatch", "expected a document")),
    }
}

fn compile_size(operand: &Bson) -> CollectionResult<usize> {
    let size = match operand {
        Bson::Int32(n) => Some(*n as i64),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) if n.fract() == 0.0 => Some(*n as i64),
        _ => None,
    };

    size.and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| CollectionError::invalid_operand("$size", "expected a non-negative integer"))
}

fn compile_type(operand: &Bson) -> CollectionResult<Vec<BsonKind>> {
    let single = |operand: &Bson| -> CollectionResult<BsonKind> {
        let kind = match operand {
            Bson::Int32(code) => BsonKind::from_code(*code as i64),
            Bson::Int64(code) => BsonKind::from_code(*code),
            Bson::Double(code) if code.fract() == 0.0 => BsonKind::from_code(*code as i64),
            Bson::String(alias) => BsonKind::from_alias(alias),
            _ => None,
        };
        kind.ok_or_else(|| CollectionError::invalid_operand("$type", format!("unknown type {operand}")))
    };

    match operand {
        Bson::Array(items) => items.iter().map(single).collect(),
        other => Ok(vec![single(other)?]),
    }
}

fn compile_regex_operand(operand: &Bson, options: Option<&Bson>) -> CollectionResult<Regex> {
    let extra = match options {
        Some(Bson::String(flags)) => flags.as_str(),
        Some(_) => return Err(CollectionError::invalid_operand("$options", "expected a string")),
        None => "",
    };

    match operand {
        Bson::String(pattern) => compile_pattern(pattern, extra),
        Bson::RegularExpression(regex) => {
            let flags = format!("{}{extra}", regex.options.as_str());
            compile_pattern(regex.pattern.as_str(), &flags)
        }
        _ => Err(CollectionError::invalid_operand("$regex", "expected a string or a regular expression")),
    }
}

/// Compiles `pattern` with `i`, `m`, `s`, `x` options mapped onto the regex builder.
///
/// # Errors
///
/// Returns [`CollectionError::InvalidPattern`] for an invalid pattern or option.
pub fn compile_pattern(pattern: &str, options: &str) -> CollectionResult<Regex> {
    let invalid = |reason: String| CollectionError::InvalidPattern {
        pattern: pattern.to_string(),
        reason,
    };

    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            'u' => builder.unicode(true),
            other => return Err(invalid(format!("unsupported option '{other}'"))),
        };
    }

    builder.build().map_err(|err| invalid(err.to_string()))
}

/// Splits a `/pattern/flags` string. Returns `None` when the string is not delimited.
fn delimited_pattern(value: &str) -> Option<(&str, &str)> {
    let rest = value.strip_prefix('/')?;
    let (pattern, flags) = rest.rsplit_once('/')?;

    flags
        .chars()
        .all(|c| c.is_ascii_alphabetic())
        .then_some((pattern, flags))
}

fn evaluate_operators(operators: &[Operator], value: Option<&Bson>) -> bool {
    for operator in operators {
        if let Operator::Exists(expected) = operator {
            return value.is_some() == *expected;
        }

        if !evaluate_operator(operator, value) {
            return false;
        }
    }

    true
}

fn evaluate_operator(operator: &Operator, value: Option<&Bson>) -> bool {
    let resolved = value.unwrap_or(&NULL);

    match operator {
        Operator::Compare(direction, inclusive, operand) => {
            let check = |value: &Bson| match compare(value, operand) {
                Some(Ordering::Equal) => *inclusive,
                Some(ordering) => ordering == *direction,
                None => false,
            };

            match resolved {
                Bson::Array(items) if !matches!(operand, Bson::Array(_)) => items.iter().any(check),
                other => check(other),
            }
        }
        Operator::Eq(operand) => strict_eq(resolved, operand),
        Operator::Ne(operand) => !loose_eq(resolved, operand),
        Operator::In(operands) => in_matches(operands, resolved),
        Operator::Nin(operands) => !in_matches(operands, resolved),
        Operator::ElemMatch(matcher) => match (resolved, matcher.as_ref()) {
            (Bson::Array(items), ElementMatcher::Constraint(constraint)) => {
                items.iter().any(|item| constraint.matches(Some(item)))
            }
            (Bson::Array(items), ElementMatcher::Query(query)) => items
                .iter()
                .any(|item| matches!(item, Bson::Document(document) if query.matches(document))),
            (_, ElementMatcher::Constraint(constraint)) => constraint.matches(value),
            (Bson::Document(document), ElementMatcher::Query(query)) => query.matches(document),
            _ => false,
        },
        Operator::Exists(expected) => value.is_some() == *expected,
        Operator::Size(size) => matches!(resolved, Bson::Array(items) if items.len() == *size),
        Operator::Type(kinds) => value.is_some_and(|value| kinds.iter().any(|kind| kind.matches(value))),
        Operator::Not(constraint) => !constraint.matches(value),
        Operator::Constant(result) => *result,
        Operator::Regex(regex) => pattern_matches(regex, resolved),
        Operator::All(operands) => all_matches(operands, resolved),
        Operator::InstanceOf(kind) => value.is_some_and(|value| kind_name(value) == kind),
        Operator::Custom(custom, operand) => custom(value, operand),
    }
}

fn in_matches(operands: &[InOperand], value: &Bson) -> bool {
    let single = |value: &Bson| {
        operands.iter().any(|operand| match operand {
            InOperand::Pattern(regex) => pattern_matches(regex, value),
            InOperand::Value(expected) => loose_eq(value, expected),
        })
    };

    match value {
        Bson::Array(items) => single(value) || items.iter().any(single),
        other => single(other),
    }
}

fn all_matches(operands: &[Bson], value: &Bson) -> bool {
    let Bson::Array(items) = value else {
        return false;
    };

    if operands.is_empty() {
        return false;
    }

    let contains_all = |expected: &[Bson]| {
        expected
            .iter()
            .all(|operand| items.iter().any(|item| strict_eq(item, operand)))
    };

    match operands {
        [Bson::Array(set)] => {
            contains_all(operands) || (set.len() == items.len() && contains_all(set.as_slice()))
        }
        _ => contains_all(operands),
    }
}

fn pattern_matches(regex: &Regex, value: &Bson) -> bool {
    match value {
        Bson::String(s) | Bson::Symbol(s) => regex.is_match(s),
        Bson::Array(items) => items.iter().any(|item| match item {
            Bson::String(s) => regex.is_match(s),
            _ => false,
        }),
        _ => false,
    }
}

fn literal_matches(literal: &Bson, value: &Bson) -> bool {
    if loose_eq(value, literal) {
        return true;
    }

    match (value, literal) {
        (Bson::Binary(binary), Bson::String(s)) => {
            matches!(binary.subtype, BinarySubtype::Generic) && binary.bytes == s.as_bytes()
        }
        (Bson::Array(items), scalar) if !matches!(scalar, Bson::Array(_) | Bson::Document(_)) => {
            items.iter().any(|item| loose_eq(item, scalar))
        }
        _ => false,
    }
}

/// Runtime kinds addressable by `$type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BsonKind {
    Double,
    String,
    Document,
    Array,
    Binary,
    Undefined,
    ObjectId,
    Boolean,
    DateTime,
    Null,
    Regex,
    DbPointer,
    JavaScript,
    Symbol,
    JavaScriptWithScope,
    Integer,
    Timestamp,
    Decimal128,
    MinKey,
    MaxKey,
    Number,
}

impl BsonKind {
    /// Maps a BSON type code. Codes 16 and 18 both mean "integer", 19 and 128 both mean
    /// "decimal".
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            1 => BsonKind::Double,
            2 => BsonKind::String,
            3 => BsonKind::Document,
            4 => BsonKind::Array,
            5 => BsonKind::Binary,
            6 => BsonKind::Undefined,
            7 => BsonKind::ObjectId,
            8 => BsonKind::Boolean,
            9 => BsonKind::DateTime,
            10 => BsonKind::Null,
            11 => BsonKind::Regex,
            12 => BsonKind::DbPointer,
            13 => BsonKind::JavaScript,
            14 => BsonKind::Symbol,
            15 => BsonKind::JavaScriptWithScope,
            16 | 18 => BsonKind::Integer,
            17 => BsonKind::Timestamp,
            19 | 128 => BsonKind::Decimal128,
            -1 => BsonKind::MinKey,
            127 => BsonKind::MaxKey,
            _ => return None,
        })
    }

    pub fn from_alias(alias: &str) -> Option<Self> {
        Some(match alias {
            "double" => BsonKind::Double,
            "string" => BsonKind::String,
            "object" => BsonKind::Document,
            "array" => BsonKind::Array,
            "binData" => BsonKind::Binary,
            "undefined" => BsonKind::Undefined,
            "objectId" => BsonKind::ObjectId,
            "bool" => BsonKind::Boolean,
            "date" => BsonKind::DateTime,
            "null" => BsonKind::Null,
            "regex" => BsonKind::Regex,
            "dbPointer" => BsonKind::DbPointer,
            "javascript" => BsonKind::JavaScript,
            "symbol" => BsonKind::Symbol,
            "javascriptWithScope" => BsonKind::JavaScriptWithScope,
            "int" | "long" => BsonKind::Integer,
            "timestamp" => BsonKind::Timestamp,
            "decimal" => BsonKind::Decimal128,
            "minKey" => BsonKind::MinKey,
            "maxKey" => BsonKind::MaxKey,
            "number" => BsonKind::Number,
            _ => return None,
        })
    }

    pub fn matches(&self, value: &Bson) -> bool {
        match (self, value) {
            (BsonKind::Double, Bson::Double(_)) => true,
            (BsonKind::String, Bson::String(_)) => true,
            (BsonKind::Document, Bson::Document(_)) => true,
            (BsonKind::Array, Bson::Array(_)) => true,
            (BsonKind::Binary, Bson::Binary(_)) => true,
            (BsonKind::Undefined, Bson::Undefined) => true,
            (BsonKind::ObjectId, Bson::ObjectId(_)) => true,
            (BsonKind::Boolean, Bson::Boolean(_)) => true,
            (BsonKind::DateTime, Bson::DateTime(_)) => true,
            (BsonKind::Null, Bson::Null) => true,
            (BsonKind::Regex, Bson::RegularExpression(_)) => true,
            (BsonKind::DbPointer, Bson::DbPointer(_)) => true,
            (BsonKind::JavaScript, Bson::JavaScriptCode(_)) => true,
            (BsonKind::Symbol, Bson::Symbol(_)) => true,
            (BsonKind::JavaScriptWithScope, Bson::JavaScriptCodeWithScope(_)) => true,
            (BsonKind::Integer, Bson::Int32(_) | Bson::Int64(_)) => true,
            (BsonKind::Timestamp, Bson::Timestamp(_)) => true,
            (BsonKind::Decimal128, Bson::Decimal128(_)) => true,
            (BsonKind::MinKey, Bson::MinKey) => true,
            (BsonKind::MaxKey, Bson::MaxKey) => true,
            (BsonKind::Number, Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Decimal128(_)) => true,
            _ => false,
        }
    }
}

/// Name of the value's BSON variant, as used by `$instanceOf`.
pub fn kind_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "Double",
        Bson::String(_) => "String",
        Bson::Array(_) => "Array",
        Bson::Document(_) => "Document",
        Bson::Boolean(_) => "Boolean",
        Bson::Null => "Null",
        Bson::RegularExpression(_) => "RegularExpression",
        Bson::JavaScriptCode(_) => "JavaScriptCode",
        Bson::JavaScriptCodeWithScope(_) => "JavaScriptCodeWithScope",
        Bson::Int32(_) => "Int32",
        Bson::Int64(_) => "Int64",
        Bson::Timestamp(_) => "Timestamp",
        Bson::Binary(_) => "Binary",
        Bson::ObjectId(_) => "ObjectId",
        Bson::DateTime(_) => "DateTime",
        Bson::Symbol(_) => "Symbol",
        Bson::Decimal128(_) => "Decimal128",
        Bson::Undefined => "Undefined",
        Bson::MaxKey => "MaxKey",
        Bson::MinKey => "MinKey",
        Bson::DbPointer(_) => "DbPointer",
    }
}
