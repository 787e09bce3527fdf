//! A consuming visitor over the operator tree. Every `visit_*` method
//! defaults to walking the node's children, so an implementor overrides only
//! the nodes it rewrites and calls `walk` to continue the traversal.

use crate::ir::*;

pub trait Visitor: Sized {
    fn visit_expression(&mut self, node: Expression) -> Expression {
        node.walk(self)
    }

    fn visit_lambda(&mut self, node: Lambda) -> Lambda {
        node.walk(self)
    }
}

pub trait Walk {
    fn walk<V: Visitor>(self, visitor: &mut V) -> Self;
}

fn visit_box<V: Visitor>(visitor: &mut V, node: Box<Expression>) -> Box<Expression> {
    Box::new(visitor.visit_expression(*node))
}

impl Walk for Lambda {
    fn walk<V: Visitor>(self, visitor: &mut V) -> Self {
        Lambda {
            parameters: self.parameters,
            body: visit_box(visitor, self.body),
        }
    }
}

impl Walk for Expression {
    fn walk<V: Visitor>(self, v: &mut V) -> Self {
        use Expression::*;
        match self {
            Literal(_) | Parameter(_) | Source(_) => self,
            Field(f) => Field(crate::ir::Field {
                source: visit_box(v, f.source),
                name: f.name,
                ty: f.ty,
            }),
            Binary(b) => Binary(crate::ir::Binary {
                op: b.op,
                left: visit_box(v, b.left),
                right: visit_box(v, b.right),
            }),
            Not(e) => Not(visit_box(v, e)),
            Conditional(c) => Conditional(crate::ir::Conditional {
                test: visit_box(v, c.test),
                if_true: visit_box(v, c.if_true),
                if_false: visit_box(v, c.if_false),
            }),
            Convert(c) => Convert(crate::ir::Convert {
                expr: visit_box(v, c.expr),
                to: c.to,
            }),
            New(n) => New(crate::ir::New {
                fields: n
                    .fields
                    .into_iter()
                    .map(|(name, e)| (name, v.visit_expression(e)))
                    .collect(),
            }),
            NewArray(a) => NewArray(crate::ir::NewArray {
                elements: a
                    .elements
                    .into_iter()
                    .map(|e| v.visit_expression(e))
                    .collect(),
                element_ty: a.element_ty,
            }),
            StringPredicate(s) => StringPredicate(crate::ir::StringPredicate {
                kind: s.kind,
                target: visit_box(v, s.target),
                value: visit_box(v, s.value),
                mode: s.mode,
            }),
            StringCase(s) => StringCase(crate::ir::StringCase {
                target: visit_box(v, s.target),
                conversion: s.conversion,
            }),
            Where(w) => Where(crate::ir::Where {
                source: visit_box(v, w.source),
                predicate: v.visit_lambda(w.predicate),
            }),
            Select(s) => Select(crate::ir::Select {
                source: visit_box(v, s.source),
                selector: v.visit_lambda(s.selector),
            }),
            GroupBy(g) => GroupBy(crate::ir::GroupBy {
                source: visit_box(v, g.source),
                key: v.visit_lambda(g.key),
                element: g.element.map(|e| v.visit_lambda(e)),
            }),
            OrderBy(o) => OrderBy(crate::ir::OrderBy {
                source: visit_box(v, o.source),
                key: v.visit_lambda(o.key),
                direction: o.direction,
                then_by: o.then_by,
            }),
            Skip(s) => Skip(crate::ir::Skip {
                source: visit_box(v, s.source),
                count: visit_box(v, s.count),
            }),
            Take(t) => Take(crate::ir::Take {
                source: visit_box(v, t.source),
                count: visit_box(v, t.count),
            }),
            SetOp(s) => SetOp(crate::ir::SetOp {
                op: s.op,
                source: visit_box(v, s.source),
                other: s.other.map(|o| visit_box(v, o)),
            }),
            Quantifier(q) => Quantifier(crate::ir::Quantifier {
                kind: q.kind,
                source: visit_box(v, q.source),
                predicate: q.predicate.map(|p| v.visit_lambda(p)),
            }),
            Contains(c) => Contains(crate::ir::Contains {
                source: visit_box(v, c.source),
                value: visit_box(v, c.value),
            }),
            ElementAccess(e) => {
                let source = visit_box(v, e.source);
                let kind = match e.kind {
                    ElementKind::ElementAt(i) => ElementKind::ElementAt(visit_box(v, i)),
                    k => k,
                };
                ElementAccess(crate::ir::ElementAccess {
                    kind,
                    source,
                    predicate: e.predicate.map(|p| v.visit_lambda(p)),
                    or_default: e.or_default,
                })
            }
            Reduce(r) => Reduce(crate::ir::Reduce {
                source: visit_box(v, r.source),
                seed: r.seed.map(|s| visit_box(v, s)),
                func: v.visit_lambda(r.func),
                result_selector: r.result_selector.map(|s| v.visit_lambda(s)),
            }),
            Aggregate(a) => Aggregate(crate::ir::Aggregate {
                function: a.function,
                source: visit_box(v, a.source),
                selector: a.selector.map(|s| v.visit_lambda(s)),
            }),
            Reverse(e) => Reverse(visit_box(v, e)),
            DefaultIfEmpty(e) => DefaultIfEmpty(visit_box(v, e)),
            ToArray(e) => ToArray(visit_box(v, e)),
            Zip(z) => Zip(crate::ir::Zip {
                source: visit_box(v, z.source),
                other: visit_box(v, z.other),
                selector: v.visit_lambda(z.selector),
            }),
            Dictionary(d) => {
                let source = visit_box(v, d.source);
                let op = match d.op {
                    DictionaryOp::ContainsKey(k) => DictionaryOp::ContainsKey(visit_box(v, k)),
                    DictionaryOp::ContainsValue(e) => DictionaryOp::ContainsValue(visit_box(v, e)),
                    DictionaryOp::Indexer(k) => DictionaryOp::Indexer(visit_box(v, k)),
                    DictionaryOp::CountWithPredicate(l) => {
                        DictionaryOp::CountWithPredicate(v.visit_lambda(l))
                    }
                    DictionaryOp::First(l) => DictionaryOp::First(v.visit_lambda(l)),
                    DictionaryOp::FirstOrDefault(l) => {
                        DictionaryOp::FirstOrDefault(v.visit_lambda(l))
                    }
                    op @ (DictionaryOp::Keys | DictionaryOp::Values | DictionaryOp::Count) => op,
                };
                Dictionary(DictionaryAccess { source, op })
            }
        }
    }
}
