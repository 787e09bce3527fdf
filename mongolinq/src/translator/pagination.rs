//! Fuses chains of `Skip` and `Take` over an array into as few `$slice`
//! operations as the operands allow. Constant operands fold into each
//! other. A computed operand always starts a new slice, so a computed
//! length is only ever rendered in the two-argument form.

use super::{MqlTranslator, Result, Translated, ValueShape};
use crate::{
    ir::Expression,
    mql::{self, MqlOperator},
};
use bson::Bson;

/// The length of a slice that runs to the end of its input.
pub(crate) const UNBOUNDED: i64 = 2147483647;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Constant(i64),
    /// Negative values are clamped to 0 when rendered.
    Dynamic(mql::Expression),
}

impl Operand {
    fn render(self) -> mql::Expression {
        match self {
            Operand::Constant(n) => int_literal(n),
            Operand::Dynamic(e) => mql::Expression::op(MqlOperator::Max, vec![e, mql::Expression::int(0)]),
        }
    }
}

fn int_literal(n: i64) -> mql::Expression {
    match i32::try_from(n) {
        Ok(i) => mql::Expression::int(i),
        Err(_) => mql::Expression::Literal(Bson::Int64(n)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageOp {
    Skip,
    Take,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SliceSpec {
    pub position: Option<Operand>,
    pub length: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Paged {
    Array(mql::Expression),
    Slice { input: Box<Paged>, spec: SliceSpec },
    /// Provably empty.
    Empty,
}

impl Paged {
    /// Applies one `Skip` or `Take`, fusing it into the outermost slice when
    /// the result is the same.
    pub fn apply(self, op: PageOp, operand: Operand) -> Paged {
        match (op, &operand) {
            (_, _) if self == Paged::Empty => Paged::Empty,
            (PageOp::Take, Operand::Constant(n)) if *n <= 0 => Paged::Empty,
            (PageOp::Skip, Operand::Constant(n)) if *n <= 0 => self,
            _ => match self {
                Paged::Slice { input, spec } => match fuse(spec, op, operand) {
                    Ok(spec) => match spec.length {
                        Operand::Constant(n) if n <= 0 => Paged::Empty,
                        _ => Paged::Slice { input, spec },
                    },
                    Err((spec, operand)) => Paged::Slice {
                        input: Box::new(Paged::Slice { input, spec }),
                        spec: fresh(op, operand),
                    },
                },
                base => Paged::Slice {
                    input: Box::new(base),
                    spec: fresh(op, operand),
                },
            },
        }
    }

    pub fn render(self) -> mql::Expression {
        match self {
            Paged::Array(e) => e,
            Paged::Empty => mql::Expression::Array(vec![]),
            Paged::Slice { input, spec } => {
                let mut args = vec![input.render()];
                if let Some(position) = spec.position {
                    args.push(position.render());
                }
                args.push(spec.length.render());
                mql::Expression::op(MqlOperator::Slice, args)
            }
        }
    }
}

fn fresh(op: PageOp, operand: Operand) -> SliceSpec {
    match op {
        PageOp::Skip => SliceSpec {
            position: Some(operand),
            length: Operand::Constant(UNBOUNDED),
        },
        PageOp::Take => SliceSpec {
            position: None,
            length: operand,
        },
    }
}

/// Folds `op` into `spec`, or hands both back when they cannot be combined.
fn fuse(spec: SliceSpec, op: PageOp, operand: Operand) -> std::result::Result<SliceSpec, (SliceSpec, Operand)> {
    match (op, operand, spec) {
        (
            PageOp::Skip,
            Operand::Constant(b),
            SliceSpec {
                position: Some(Operand::Constant(a)),
                length: Operand::Constant(len),
            },
        ) => Ok(skip_constant(a, len, b)),
        (
            PageOp::Skip,
            Operand::Constant(b),
            SliceSpec {
                position: None,
                length: Operand::Constant(len),
            },
        ) => Ok(skip_constant(0, len, b)),
        (
            PageOp::Take,
            Operand::Constant(b),
            SliceSpec {
                position: position @ (None | Some(Operand::Constant(_))),
                length: Operand::Constant(len),
            },
        ) => Ok(SliceSpec {
            position,
            length: Operand::Constant(len.min(b)),
        }),
        (_, operand, spec) => Err((spec, operand)),
    }
}

fn skip_constant(position: i64, length: i64, skipped: i64) -> SliceSpec {
    let length = if length == UNBOUNDED {
        UNBOUNDED
    } else {
        length - skipped
    };
    SliceSpec {
        position: Some(Operand::Constant(position.saturating_add(skipped))),
        length: Operand::Constant(length),
    }
}

impl<'a> MqlTranslator<'a> {
    /// Translates a chain of `Skip`/`Take` operators over an array.
    pub(crate) fn translate_pagination(&mut self, expr: &Expression) -> Result<Translated> {
        let mut chain = Vec::new();
        let mut base = expr;
        loop {
            match base {
                Expression::Skip(s) => {
                    chain.push((PageOp::Skip, s.count.as_ref()));
                    base = &s.source;
                }
                Expression::Take(t) => {
                    chain.push((PageOp::Take, t.count.as_ref()));
                    base = &t.source;
                }
                _ => break,
            }
        }
        let (input, element) = self.sequence_source(base)?;
        let mut paged = Paged::Array(input);
        for (op, count) in chain.into_iter().rev() {
            let operand = self.page_operand(count)?;
            paged = paged.apply(op, operand);
        }
        Ok(Translated::new(paged.render(), ValueShape::Array(Box::new(element))))
    }

    fn page_operand(&mut self, count: &Expression) -> Result<Operand> {
        if let Expression::Literal(l) = count {
            if let Some(n) = l.value.as_i64() {
                return Ok(Operand::Constant(n));
            }
        }
        let translated = self.translate_expr(count)?;
        let ast = self.numeric(count, translated)?;
        Ok(Operand::Dynamic(ast))
    }
}
