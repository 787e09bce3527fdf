//! Translates a folded operator tree into the pipeline syntax tree in
//! `mql`. Sequence operators over the collection become stages; lambda
//! bodies and operators over array-valued fields become aggregation
//! expressions or native match queries.

use crate::{
    assembler::TempNames,
    ir::Expression,
    options::CompilerOptions,
    representation::{self, CultureId, FieldRepresentationResolver, ResolutionCache},
    usererror::UserError,
};

mod coercion;
mod dictionary;
mod expressions;
mod filters;
mod grouping;
mod ordering;
mod pagination;
mod sequences;
mod shape;
mod stages;
mod strings;

pub(crate) use shape::{DocumentShape, MapValue, ProjectedMember, Translated, ValueShape};
pub use stages::{Cardinality, OutputShape, ResultValue};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, PartialEq, Clone)]
pub enum Error {
    UnresolvedField {
        operator: &'static str,
        reason: representation::Error,
    },
    UnsupportedComparison {
        operator: &'static str,
        reason: String,
    },
    UnsupportedOperatorCombination {
        operator: &'static str,
        reason: String,
    },
    DuplicateField(String),
    InvalidFieldName(String),
}

impl Error {
    /// Whether the query can still be answered by evaluating it locally.
    pub fn allows_local_evaluation(&self) -> bool {
        matches!(self, Error::UnsupportedComparison { .. })
    }
}

impl UserError for Error {
    fn code(&self) -> u32 {
        match self {
            Error::UnresolvedField { .. } => 1001,
            Error::UnsupportedComparison { .. } => 1002,
            Error::UnsupportedOperatorCombination { .. } => 1003,
            Error::DuplicateField(_) | Error::InvalidFieldName(_) => 1005,
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            Error::UnresolvedField { operator, reason } => Some(format!(
                "{operator} reads a field whose storage representation is unknown: {reason}"
            )),
            Error::UnsupportedComparison { operator, reason } => Some(format!(
                "{operator} cannot be translated because {reason}"
            )),
            Error::UnsupportedOperatorCombination { operator, reason } => Some(format!(
                "{operator} is not supported here: {reason}"
            )),
            Error::DuplicateField(_) | Error::InvalidFieldName(_) => None,
        }
    }

    fn technical_message(&self) -> String {
        match self {
            Error::UnresolvedField { operator, reason } => {
                format!("unresolved field in {operator}: {reason}")
            }
            Error::UnsupportedComparison { operator, reason } => {
                format!("unsupported comparison in {operator}: {reason}")
            }
            Error::UnsupportedOperatorCombination { operator, reason } => {
                format!("unsupported operator combination in {operator}: {reason}")
            }
            Error::DuplicateField(name) => format!("field '{name}' is assigned more than once"),
            Error::InvalidFieldName(name) => format!(
                "invalid field name '{name}': field names may not be empty, contain dots, or start with dollars"
            ),
        }
    }
}

crate::user_error_display!(Error);

pub(crate) fn unsupported(expr: &Expression, reason: impl Into<String>) -> Error {
    Error::UnsupportedOperatorCombination {
        operator: expr.operator_name(),
        reason: reason.into(),
    }
}

pub(crate) fn unsupported_comparison(expr: &Expression, reason: impl Into<String>) -> Error {
    Error::UnsupportedComparison {
        operator: expr.operator_name(),
        reason: reason.into(),
    }
}

pub struct MqlTranslator<'a> {
    options: CompilerOptions,
    representations: ResolutionCache<'a>,
    culture: CultureId,
    scope: Vec<(String, Translated)>,
    group: Option<grouping::GroupCollector>,
    names: TempNames,
    var_counter: u32,
}

impl<'a> MqlTranslator<'a> {
    pub fn new(
        resolver: &'a dyn FieldRepresentationResolver,
        culture: CultureId,
        options: CompilerOptions,
    ) -> Self {
        Self {
            options,
            representations: ResolutionCache::new(resolver),
            culture,
            scope: Vec::new(),
            group: None,
            names: TempNames::default(),
            var_counter: 0,
        }
    }
}
