//! The aggregation pipeline syntax tree the translator targets. Codegen
//! turns it into BSON.

mod definitions;

pub use definitions::*;

use bson::Bson;

pub const ROOT_NAME: &str = "ROOT";

impl Expression {
    pub fn op(op: MqlOperator, args: Vec<Expression>) -> Expression {
        Expression::Operator(Operator { op, args })
    }

    pub fn field(path: &str) -> Expression {
        Expression::FieldRef(path.to_string())
    }

    pub fn var(name: &str) -> Expression {
        Expression::Variable(name.to_string())
    }

    pub fn root() -> Expression {
        Expression::var(ROOT_NAME)
    }

    pub fn int(i: i32) -> Expression {
        Expression::Literal(Bson::Int32(i))
    }

    pub fn cond(test: Expression, then: Expression, otherwise: Expression) -> Expression {
        Expression::Cond(Cond {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    pub fn let_in(vars: Vec<(&str, Expression)>, inside: Expression) -> Expression {
        Expression::Let(Let {
            vars: vars
                .into_iter()
                .map(|(name, e)| (name.to_string(), e))
                .collect(),
            inside: Box::new(inside),
        })
    }

    pub fn array_elem_at(self, index: i32) -> Expression {
        Expression::op(MqlOperator::ArrayElemAt, vec![self, Expression::int(index)])
    }

    pub fn size(self) -> Expression {
        Expression::op(MqlOperator::Size, vec![self])
    }

    /// Reads `path` below this value. Paths below a field or a variable are
    /// appended; below a computed value the value is bound to `$$this`
    /// first. `$$ROOT.a` is written `$a`.
    pub fn append_path(self, path: &str) -> Expression {
        match self {
            Expression::FieldRef(p) if p.is_empty() => Expression::FieldRef(path.to_string()),
            Expression::FieldRef(p) => Expression::FieldRef(format!("{p}.{path}")),
            Expression::Variable(v) if v == ROOT_NAME => Expression::FieldRef(path.to_string()),
            Expression::Variable(v) => Expression::Variable(format!("{v}.{path}")),
            Expression::Document(fields) if !path.contains('.') && fields.iter().any(|(k, _)| k == path) => fields
                .into_iter()
                .find(|(k, _)| k == path)
                .map(|(_, e)| e)
                .unwrap_or(Expression::Literal(Bson::Null)),
            e => Expression::let_in(vec![("this", e)], Expression::var(&format!("this.{path}"))),
        }
    }

    pub fn as_field_path(&self) -> Option<&str> {
        match self {
            Expression::FieldRef(p) => Some(p),
            _ => None,
        }
    }
}

impl MatchQuery {
    pub fn comparison(input: Option<String>, op: MatchComparisonOp, arg: Bson) -> MatchQuery {
        MatchQuery::Comparison(MatchComparison { input, op, arg })
    }

    pub fn exists(input: String, exists: bool) -> MatchQuery {
        MatchQuery::Exists(MatchExists { input, exists })
    }

    pub fn elem_match(input: Option<String>, condition: MatchQuery) -> MatchQuery {
        MatchQuery::ElemMatch(ElemMatch {
            input,
            condition: Box::new(condition),
        })
    }

    /// Matches no document: `_id` is never of type MinKey.
    pub fn never() -> MatchQuery {
        MatchQuery::Type(MatchType {
            input: "_id".to_string(),
            type_code: -1,
        })
    }

    /// The field this query constrains, if it is a single-field query.
    pub fn input(&self) -> Option<&str> {
        match self {
            MatchQuery::Comparison(c) => c.input.as_deref(),
            MatchQuery::Exists(e) => Some(&e.input),
            MatchQuery::In(i) => i.input.as_deref(),
            MatchQuery::Regex(r) => r.input.as_deref(),
            MatchQuery::ElemMatch(e) => e.input.as_deref(),
            MatchQuery::Not(n) => n.input.as_deref(),
            MatchQuery::Type(t) => Some(&t.input),
            MatchQuery::And(_)
            | MatchQuery::Or(_)
            | MatchQuery::Nor(_)
            | MatchQuery::Expr(_) => None,
        }
    }

    /// Detaches the query from its field so that it can be nested under
    /// that field, e.g. inside `$not`. Returns `None` for queries that are
    /// not single-field.
    pub fn split_input(self) -> Option<(String, MatchQuery)> {
        match self {
            MatchQuery::Comparison(MatchComparison {
                input: Some(input),
                op,
                arg,
            }) => Some((input, MatchQuery::comparison(None, op, arg))),
            MatchQuery::In(MatchIn {
                input: Some(input),
                args,
            }) => Some((input, MatchQuery::In(MatchIn { input: None, args }))),
            MatchQuery::Regex(MatchRegex {
                input: Some(input),
                regex,
                options,
            }) => Some((
                input,
                MatchQuery::Regex(MatchRegex {
                    input: None,
                    regex,
                    options,
                }),
            )),
            MatchQuery::ElemMatch(ElemMatch {
                input: Some(input),
                condition,
            }) => Some((
                input,
                MatchQuery::ElemMatch(ElemMatch {
                    input: None,
                    condition,
                }),
            )),
            _ => None,
        }
    }

    /// The negation of this query.
    pub fn negate(self) -> MatchQuery {
        let fallback = self.clone();
        match self {
            MatchQuery::Nor(mut v) if v.len() == 1 => v.remove(0),
            MatchQuery::Not(MatchNot {
                input: Some(input),
                condition,
            }) => attach_input(input, *condition).unwrap_or_else(|q| MatchQuery::Nor(vec![q])),
            q => match q.split_input() {
                Some((input, condition)) => MatchQuery::Not(MatchNot {
                    input: Some(input),
                    condition: Box::new(condition),
                }),
                None => MatchQuery::Nor(vec![fallback]),
            },
        }
    }
}

/// Re-attaches a detached query to `input`.
fn attach_input(input: String, q: MatchQuery) -> std::result::Result<MatchQuery, MatchQuery> {
    Ok(match q {
        MatchQuery::Comparison(MatchComparison { input: None, op, arg }) => {
            MatchQuery::comparison(Some(input), op, arg)
        }
        MatchQuery::In(MatchIn { input: None, args }) => MatchQuery::In(MatchIn {
            input: Some(input),
            args,
        }),
        MatchQuery::Regex(MatchRegex {
            input: None,
            regex,
            options,
        }) => MatchQuery::Regex(MatchRegex {
            input: Some(input),
            regex,
            options,
        }),
        MatchQuery::ElemMatch(ElemMatch {
            input: None,
            condition,
        }) => MatchQuery::ElemMatch(ElemMatch {
            input: Some(input),
            condition,
        }),
        q => {
            return Err(MatchQuery::Not(MatchNot {
                input: Some(input),
                condition: Box::new(q),
            }))
        }
    })
}
