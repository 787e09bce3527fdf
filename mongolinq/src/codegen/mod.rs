use crate::mql::{AccumulatorFunction, MqlOperator, Stage};
use bson::{doc, Bson};
use thiserror::Error;

mod expressions;
mod match_query;
mod stages;
#[cfg(test)]
mod test;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("the element itself can only be referenced inside $elemMatch")]
    EmptyFieldPath,
    #[error("query on the element itself must be nested under $elemMatch or $not")]
    UnnamedMatchInput,
}

#[derive(Clone, Debug, Default)]
pub struct MqlCodeGenerator {}

impl MqlCodeGenerator {
    /// Generates the BSON stage documents of a pipeline, in order.
    pub fn codegen_pipeline(&self, stages: Vec<Stage>) -> Result<Vec<bson::Document>> {
        stages
            .into_iter()
            .map(|stage| self.codegen_stage(stage))
            .collect()
    }

    fn to_mql_op(op: MqlOperator) -> &'static str {
        use MqlOperator::*;
        match op {
            // Arithmetic operators
            Add => "$add",
            Subtract => "$subtract",
            Multiply => "$multiply",
            Divide => "$divide",
            Trunc => "$trunc",
            Max => "$max",
            Min => "$min",

            // Comparison operators
            Eq => "$eq",
            Ne => "$ne",
            Lt => "$lt",
            Lte => "$lte",
            Gt => "$gt",
            Gte => "$gte",

            // Boolean operators
            Not => "$not",
            And => "$and",
            Or => "$or",

            // String operators
            Concat => "$concat",
            IndexOfCP => "$indexOfCP",
            StrLenCP => "$strLenCP",
            ToLower => "$toLower",
            ToUpper => "$toUpper",

            // Array operators
            ArrayElemAt => "$arrayElemAt",
            ConcatArrays => "$concatArrays",
            In => "$in",
            ObjectToArray => "$objectToArray",
            ReverseArray => "$reverseArray",
            SetDifference => "$setDifference",
            SetIntersection => "$setIntersection",
            SetUnion => "$setUnion",
            Size => "$size",
            Slice => "$slice",
            AllElementsTrue => "$allElementsTrue",
            AnyElementTrue => "$anyElementTrue",
            Sum => "$sum",
            Avg => "$avg",
            StdDevPop => "$stdDevPop",
            StdDevSamp => "$stdDevSamp",

            // Type operators
            Type => "$type",
            ToInt => "$toInt",
            ToLong => "$toLong",
            ToDouble => "$toDouble",
            ToDecimal => "$toDecimal",
            ToString => "$toString",
        }
    }

    fn accumulator_op(function: AccumulatorFunction) -> &'static str {
        use AccumulatorFunction::*;
        match function {
            Sum => "$sum",
            Avg => "$avg",
            Min => "$min",
            Max => "$max",
            First => "$first",
            Last => "$last",
            Push => "$push",
            AddToSet => "$addToSet",
            StdDevPop => "$stdDevPop",
            StdDevSamp => "$stdDevSamp",
        }
    }

    /// Strings that start with `$` would be read as field paths, so such
    /// literals and any literal containing one are wrapped in `$literal`.
    fn wrap_in_literal_if<F>(b: Bson, f: F) -> Bson
    where
        F: Fn(&Bson) -> bool,
    {
        if f(&b) {
            Bson::Document(doc! { "$literal": b })
        } else {
            b
        }
    }

    fn needs_literal(b: &Bson) -> bool {
        match b {
            Bson::String(s) => s.starts_with('$'),
            Bson::Array(a) => a.iter().any(Self::needs_literal),
            Bson::Document(d) => d
                .iter()
                .any(|(k, v)| k.starts_with('$') || Self::needs_literal(v)),
            _ => false,
        }
    }

    fn int_bson(n: i64) -> Bson {
        match i32::try_from(n) {
            Ok(i) => Bson::Int32(i),
            Err(_) => Bson::Int64(n),
        }
    }
}
