//! Query compilation and evaluation for in-memory document filtering.
//!
//! [`QueryCompiler`] turns a [`Filter`] into a [`CompiledQuery`], a tree of clauses whose
//! leaves are compiled per-field [`Constraint`]s. Evaluation walks that tree with a
//! [`QueryVisitor`]; [`DocumentEvaluator`] is the visitor that answers "does this document
//! match".
//!
//! Sibling clauses are conjunctive and evaluation stops at the first clause that fails.

use bson::{Bson, Document};
use tracing::trace;

use docmock_core::{
    error::{CollectionError, CollectionResult},
    filter::{Filter, FilterValue},
};

use crate::{
    constraint::{CompilerOptions, Constraint},
    path,
};

/// A node of a compiled query.
#[derive(Clone)]
pub enum Clause {
    /// Resolve `path` and evaluate the constraint against it.
    Field { path: String, constraint: Constraint },
    /// Every sub-query must match.
    And(Vec<CompiledQuery>),
    /// At least one sub-query must match.
    Or(Vec<CompiledQuery>),
    /// No sub-query may match.
    Nor(Vec<CompiledQuery>),
    /// A nested conjunctive group, written under a numeric key.
    Group(CompiledQuery),
    /// Write-isolation hint; always matches.
    Isolated,
}

/// A compiled filter: a conjunction of clauses.
#[derive(Clone, Default)]
pub struct CompiledQuery {
    clauses: Vec<Clause>,
}

impl CompiledQuery {
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Returns `true` if `document` satisfies every clause.
    pub fn matches(&self, document: &Document) -> bool {
        DocumentEvaluator::new(document).visit_query(self)
    }

    /// Returns clones of the matching documents, in order.
    pub fn filter_documents<'a>(&self, documents: impl IntoIterator<Item = &'a Document>) -> Vec<Document> {
        documents
            .into_iter()
            .filter(|document| self.matches(document))
            .cloned()
            .collect()
    }
}

/// Compiles filters with a fixed set of [`CompilerOptions`].
#[derive(Debug, Clone, Copy)]
pub struct QueryCompiler<'a> {
    options: &'a CompilerOptions,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(options: &'a CompilerOptions) -> Self {
        QueryCompiler { options }
    }

    /// Compiles `filter`.
    ///
    /// # Errors
    ///
    /// - [`CollectionError::MalformedLogicalFilter`] when `$and`, `$or` or `$nor` is not a
    ///   non-empty array of sub-filters.
    /// - [`CollectionError::UnsupportedOperator`] for unknown top-level `$` keys and unknown
    ///   constraint operators.
    /// - Any error raised while compiling a field constraint.
    pub fn compile(&self, filter: &Filter) -> CollectionResult<CompiledQuery> {
        let mut clauses = Vec::with_capacity(filter.len());

        for (key, value) in filter.iter() {
            let clause = match key {
                "$and" => Clause::And(self.compile_group(key, value)?),
                "$or" => Clause::Or(self.compile_group(key, value)?),
                "$nor" => Clause::Nor(self.compile_group(key, value)?),
                "$isolated" => Clause::Isolated,
                key if key.starts_with('$') => {
                    return Err(CollectionError::UnsupportedOperator(key.to_string()));
                }
                key if is_numeric(key) && is_group(value) => Clause::Group(match value {
                    FilterValue::Value(Bson::Document(document)) => {
                        self.compile(&Filter::from(document.clone()))?
                    }
                    _ => CompiledQuery {
                        clauses: self
                            .compile_group(key, value)?
                            .into_iter()
                            .map(Clause::Group)
                            .collect(),
                    },
                }),
                path => Clause::Field {
                    path: path.to_string(),
                    constraint: Constraint::compile(value, self.options)?,
                },
            };

            clauses.push(clause);
        }

        Ok(CompiledQuery { clauses })
    }

    fn compile_group(&self, key: &str, value: &FilterValue) -> CollectionResult<Vec<CompiledQuery>> {
        let malformed = || CollectionError::MalformedLogicalFilter(key.to_string());

        match value {
            FilterValue::Filters(filters) if !filters.is_empty() => filters
                .iter()
                .map(|filter| self.compile(filter))
                .collect(),
            FilterValue::Value(Bson::Array(items)) if !items.is_empty() => items
                .iter()
                .map(|item| match item {
                    Bson::Document(document) => self.compile(&Filter::from(document.clone())),
                    _ => Err(malformed()),
                })
                .collect(),
            _ => Err(malformed()),
        }
    }
}

fn is_numeric(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

fn is_group(value: &FilterValue) -> bool {
    matches!(
        value,
        FilterValue::Value(Bson::Document(_)) | FilterValue::Filters(_)
    )
}

/// A visitor over compiled query clauses.
pub trait QueryVisitor {
    type Output;

    fn visit_field(&mut self, path: &str, constraint: &Constraint) -> Self::Output;
    fn visit_and(&mut self, queries: &[CompiledQuery]) -> Self::Output;
    fn visit_or(&mut self, queries: &[CompiledQuery]) -> Self::Output;
    fn visit_nor(&mut self, queries: &[CompiledQuery]) -> Self::Output;
    fn visit_query(&mut self, query: &CompiledQuery) -> Self::Output;
    fn visit_isolated(&mut self) -> Self::Output;

    fn visit_clause(&mut self, clause: &Clause) -> Self::Output {
        match clause {
            Clause::Field { path, constraint } => self.visit_field(path, constraint),
            Clause::And(queries) => self.visit_and(queries),
            Clause::Or(queries) => self.visit_or(queries),
            Clause::Nor(queries) => self.visit_nor(queries),
            Clause::Group(query) => self.visit_query(query),
            Clause::Isolated => self.visit_isolated(),
        }
    }
}

/// Evaluates compiled queries against one document.
pub struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;

    fn visit_field(&mut self, path: &str, constraint: &Constraint) -> bool {
        let value = path::resolve(self.document, path);
        let matched = constraint.matches(value);

        trace!(path, ?value, matched, "evaluated field constraint");
        matched
    }

    fn visit_and(&mut self, queries: &[CompiledQuery]) -> bool {
        queries.iter().all(|query| self.visit_query(query))
    }

    fn visit_or(&mut self, queries: &[CompiledQuery]) -> bool {
        queries.iter().any(|query| self.visit_query(query))
    }

    fn visit_nor(&mut self, queries: &[CompiledQuery]) -> bool {
        !self.visit_or(queries)
    }

    fn visit_query(&mut self, query: &CompiledQuery) -> bool {
        query.clauses.iter().all(|clause| self.visit_clause(clause))
    }

    fn visit_isolated(&mut self) -> bool {
        true
    }
}
