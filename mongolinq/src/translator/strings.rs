//! `Contains`, `StartsWith` and `EndsWith` over strings. Case-insensitive
//! comparisons lower-case both operands; constants are folded at compile
//! time and computed operands are bound once.

use super::{expressions::boolean, unsupported, unsupported_comparison, MqlTranslator, Result, Translated};
use crate::{
    ir::{self, Expression, StringComparison, StringMatchMode, StringPredicateKind, Type, Value},
    mql::{self, MatchQuery, MatchRegex, MqlOperator},
};
use bson::Bson;

/// A string predicate operand, known at compile time or computed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StringOperand {
    Constant(String),
    Computed(mql::Expression),
}

impl StringOperand {
    fn into_ast(self) -> mql::Expression {
        match self {
            StringOperand::Constant(s) => mql::Expression::Literal(Bson::String(s)),
            StringOperand::Computed(e) => e,
        }
    }
}

impl<'a> MqlTranslator<'a> {
    /// Whether `mode` compares without regard to case. Modes the engine
    /// cannot reproduce are rejected.
    pub(crate) fn ignores_case(&self, expr: &Expression, mode: &StringMatchMode) -> Result<bool> {
        match mode {
            StringMatchMode::Default => Ok(false),
            StringMatchMode::Comparison(StringComparison::Ordinal)
            | StringMatchMode::Comparison(StringComparison::CurrentCulture) => Ok(false),
            StringMatchMode::Comparison(StringComparison::CurrentCultureIgnoreCase) => Ok(true),
            StringMatchMode::Comparison(c) => Err(unsupported_comparison(
                expr,
                format!("{} is not supported", c.name()),
            )),
            StringMatchMode::Culture {
                ignore_case,
                culture,
            } if *culture == self.culture => Ok(*ignore_case),
            StringMatchMode::Culture { culture, .. } => Err(unsupported_comparison(
                expr,
                format!("the supplied culture {culture} is not the current culture"),
            )),
        }
    }

    fn string_operand(&mut self, expr: &Expression, operand: &Expression) -> Result<StringOperand> {
        if let Expression::Literal(l) = operand {
            return match &l.value {
                Value::String(s) => Ok(StringOperand::Constant(s.clone())),
                Value::Char(c) => Ok(StringOperand::Constant(c.to_string())),
                v => Err(unsupported(expr, format!("{v} is not a string"))),
            };
        }
        let translated = self.translate_expr(operand)?;
        match operand.ty() {
            Type::String => Ok(StringOperand::Computed(translated.ast)),
            Type::Char if translated.tag().map_or(false, |t| t.is_string_encoded()) => {
                Ok(StringOperand::Computed(translated.ast))
            }
            Type::Char => Err(unsupported_comparison(
                expr,
                "the character operand is not serialized as a string",
            )),
            ty => Err(unsupported(expr, format!("an operand of type {ty} is not a string"))),
        }
    }

    /// The string an operand evaluates to, as an aggregation expression.
    pub(crate) fn string_operand_ast(&mut self, expr: &Expression, operand: &Expression) -> Result<mql::Expression> {
        Ok(self.string_operand(expr, operand)?.into_ast())
    }

    pub(crate) fn translate_string_predicate(
        &mut self,
        expr: &Expression,
        p: &ir::StringPredicate,
    ) -> Result<Translated> {
        let ignore_case = self.ignores_case(expr, &p.mode)?;
        let target = self.string_operand(expr, &p.target)?;
        let needle = self.string_operand(expr, &p.value)?;
        let mut bindings = Vec::new();
        let haystack = fold_case(target, ignore_case, "string", &mut bindings);
        let needle = fold_case(needle, ignore_case, "substring", &mut bindings);

        let index_of = |args: Vec<mql::Expression>| mql::Expression::op(MqlOperator::IndexOfCP, args);
        let test = match p.kind {
            StringPredicateKind::Contains => mql::Expression::op(
                MqlOperator::Gte,
                vec![index_of(vec![haystack.into_ast(), needle.into_ast()]), mql::Expression::int(0)],
            ),
            StringPredicateKind::StartsWith => mql::Expression::op(
                MqlOperator::Eq,
                vec![index_of(vec![haystack.into_ast(), needle.into_ast()]), mql::Expression::int(0)],
            ),
            StringPredicateKind::EndsWith => {
                let needle_length = match &needle {
                    StringOperand::Constant(s) => mql::Expression::int(s.chars().count() as i32),
                    StringOperand::Computed(e) => {
                        mql::Expression::op(MqlOperator::StrLenCP, vec![e.clone()])
                    }
                };
                let haystack_length = match &haystack {
                    StringOperand::Constant(s) => mql::Expression::int(s.chars().count() as i32),
                    StringOperand::Computed(e) => {
                        mql::Expression::op(MqlOperator::StrLenCP, vec![e.clone()])
                    }
                };
                let haystack = haystack.into_ast();
                let start = mql::Expression::op(MqlOperator::Subtract, vec![haystack_length, needle_length]);
                mql::Expression::let_in(
                    vec![("start", start)],
                    mql::Expression::op(
                        MqlOperator::And,
                        vec![
                            mql::Expression::op(
                                MqlOperator::Gte,
                                vec![mql::Expression::var("start"), mql::Expression::int(0)],
                            ),
                            mql::Expression::op(
                                MqlOperator::Eq,
                                vec![
                                    index_of(vec![
                                        haystack,
                                        needle.into_ast(),
                                        mql::Expression::var("start"),
                                    ]),
                                    mql::Expression::var("start"),
                                ],
                            ),
                        ],
                    ),
                )
            }
        };
        if bindings.is_empty() {
            return Ok(boolean(test));
        }
        Ok(boolean(mql::Expression::let_in(bindings, test)))
    }

    /// The predicate as a native regular expression match, possible when a
    /// field is searched for a constant.
    pub(crate) fn string_predicate_filter(
        &mut self,
        expr: &Expression,
        p: &ir::StringPredicate,
    ) -> Result<Option<MatchQuery>> {
        let needle = match p.value.as_ref() {
            Expression::Literal(l) => match l.value.as_text() {
                Some(s) => s,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        let ignore_case = self.ignores_case(expr, &p.mode)?;
        let path = match self.string_operand(expr, &p.target)? {
            StringOperand::Computed(mql::Expression::FieldRef(path)) => path,
            _ => return Ok(None),
        };
        let escaped = regex::escape(&needle);
        let regex = match p.kind {
            StringPredicateKind::Contains => escaped,
            StringPredicateKind::StartsWith => format!("^{escaped}"),
            StringPredicateKind::EndsWith => format!("{escaped}$"),
        };
        let options = if ignore_case { "is" } else { "s" };
        Ok(Some(MatchQuery::Regex(MatchRegex {
            input: (!path.is_empty()).then_some(path),
            regex,
            options: options.to_string(),
        })))
    }
}

/// Lower-cases an operand for a case-insensitive comparison. Computed
/// operands are bound to `name` so they are evaluated once.
fn fold_case(
    operand: StringOperand,
    ignore_case: bool,
    name: &'static str,
    bindings: &mut Vec<(&'static str, mql::Expression)>,
) -> StringOperand {
    match operand {
        StringOperand::Constant(s) if ignore_case => StringOperand::Constant(s.to_lowercase()),
        StringOperand::Computed(e) if ignore_case => {
            bindings.push((name, mql::Expression::op(MqlOperator::ToLower, vec![e])));
            StringOperand::Computed(mql::Expression::var(name))
        }
        operand => operand,
    }
}
