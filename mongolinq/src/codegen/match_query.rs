use super::{Error, MqlCodeGenerator, Result};
use crate::mql::{self, MatchComparisonOp, MatchQuery};
use bson::{bson, doc, Bson};
use std::collections::HashSet;

/// When a match operator is nested in a $elemMatch or $not, it does not
/// contain a field "input". This macro is utilized for codegenning match
/// ops that may have no input.
macro_rules! possibly_nest_under_field {
    ($input:expr, $op:expr) => {
        match $input {
            None => Ok($op),
            Some(field) => Ok(bson!({ field: $op })),
        }
    };
}

impl MqlCodeGenerator {
    pub fn codegen_match_query(&self, q: MatchQuery) -> Result<Bson> {
        use MatchQuery::*;
        match q {
            And(v) => self.codegen_match_and(v),
            Or(v) => self.codegen_match_logical_operator("$or", v),
            Nor(v) => self.codegen_match_logical_operator("$nor", v),
            Comparison(c) => self.codegen_match_comparison(c),
            Exists(e) => {
                let (field, exists) = (e.input, e.exists);
                Ok(bson!({ field: { "$exists": exists } }))
            }
            In(i) => possibly_nest_under_field!(i.input, bson!({ "$in": i.args })),
            Regex(r) => {
                let regex = Bson::RegularExpression(bson::Regex {
                    pattern: r.regex,
                    options: Self::sorted_options(&r.options),
                });
                match r.input {
                    None => Ok(bson!({ "$regex": regex })),
                    Some(field) => Ok(bson!({ field: regex })),
                }
            }
            ElemMatch(em) => {
                let condition = self.codegen_match_query(*em.condition)?;
                possibly_nest_under_field!(em.input, bson!({ "$elemMatch": condition }))
            }
            Not(n) => {
                let condition = self.codegen_match_query(*n.condition)?;
                possibly_nest_under_field!(n.input, bson!({ "$not": condition }))
            }
            Type(t) => {
                let (field, type_code) = (t.input, t.type_code);
                Ok(bson!({ field: { "$type": type_code } }))
            }
            Expr(e) => Ok(bson!({ "$expr": self.codegen_expression(e)? })),
        }
    }

    /// Checks that a top-level query names its field.
    pub(crate) fn codegen_match_document(&self, q: MatchQuery) -> Result<bson::Document> {
        if matches!(
            &q,
            MatchQuery::Comparison(_)
                | MatchQuery::In(_)
                | MatchQuery::Regex(_)
                | MatchQuery::ElemMatch(_)
                | MatchQuery::Not(_)
        ) && q.input().is_none()
        {
            return Err(Error::UnnamedMatchInput);
        }
        match self.codegen_match_query(q)? {
            Bson::Document(d) => Ok(d),
            other => Ok(doc! { "$expr": other }),
        }
    }

    /// Conjunctions over distinct fields are written as one document, the
    /// way a query is usually written by hand; anything else uses `$and`.
    fn codegen_match_and(&self, args: Vec<MatchQuery>) -> Result<Bson> {
        let args = args
            .into_iter()
            .map(|arg| self.codegen_match_query(arg))
            .collect::<Result<Vec<_>>>()?;
        if args.len() == 1 {
            return Ok(args.into_iter().next().unwrap_or(Bson::Null));
        }
        let mut seen = HashSet::new();
        let mergeable = args.iter().all(|arg| match arg {
            Bson::Document(d) => d.len() == 1 && d.keys().all(|k| seen.insert(k.clone())),
            _ => false,
        });
        if mergeable {
            let mut merged = bson::Document::new();
            for arg in args {
                if let Bson::Document(d) = arg {
                    merged.extend(d);
                }
            }
            return Ok(Bson::Document(merged));
        }
        Ok(bson!({ "$and": Bson::Array(args) }))
    }

    fn codegen_match_logical_operator(&self, op_name: &str, args: Vec<MatchQuery>) -> Result<Bson> {
        let args = args
            .into_iter()
            .map(|arg| self.codegen_match_query(arg))
            .collect::<Result<Vec<_>>>()?;
        Ok(bson!({ op_name: Bson::Array(args) }))
    }

    fn codegen_match_comparison(&self, c: mql::MatchComparison) -> Result<Bson> {
        use MatchComparisonOp::*;
        let comp_op = match c.op {
            Lt => "$lt",
            Lte => "$lte",
            Ne => "$ne",
            Eq => "$eq",
            Gt => "$gt",
            Gte => "$gte",
        };
        let short_form =
            c.op == Eq && !matches!(c.arg, Bson::Document(_) | Bson::RegularExpression(_));
        match c.input {
            Some(field) if short_form => Ok(bson!({ field: c.arg })),
            input => possibly_nest_under_field!(input, bson!({ comp_op: c.arg })),
        }
    }

    fn sorted_options(options: &str) -> String {
        let mut chars: Vec<char> = options.chars().collect();
        chars.sort_unstable();
        chars.dedup();
        chars.into_iter().collect()
    }
}
