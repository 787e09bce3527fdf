//! Final clean-up of a translated stage sequence, and the names of the
//! temporary fields translation introduces.

use crate::mql::{self, MatchQuery, MqlOperator, Stage};
use tracing::{event, Level};


/// Hands out names for temporary fields. Accumulators are `__agg0`,
/// `__agg1`, ...; synthesized sort keys are `_key1`, `_key2`, ...
#[derive(Debug, Default)]
pub struct TempNames {
    aggregates: u32,
    keys: u32,
}

impl TempNames {
    pub fn agg(&mut self) -> String {
        let name = format!("__agg{}", self.aggregates);
        self.aggregates += 1;
        name
    }

    pub fn key(&mut self) -> String {
        self.keys += 1;
        format!("_key{}", self.keys)
    }
}

/// A rewrite of a whole stage sequence.
pub trait Pass {
    fn apply(&self, stages: Vec<Stage>) -> Vec<Stage>;
}

/// Combines neighboring `$match` stages into one.
pub struct MergeNeighboringMatches;

/// Sums neighboring `$skip` stages and keeps the smallest of neighboring
/// `$limit` stages.
pub struct FoldSkipsAndLimits;

/// Applies every pass, in order.
pub fn assemble(stages: Vec<Stage>) -> Vec<Stage> {
    let passes: Vec<&dyn Pass> = vec![&MergeNeighboringMatches, &FoldSkipsAndLimits];
    let before = stages.len();
    let assembled = passes
        .into_iter()
        .fold(stages, |stages, pass| pass.apply(stages));
    event!(
        Level::DEBUG,
        before,
        after = assembled.len(),
        "assembled pipeline"
    );
    assembled
}

fn conjuncts(q: MatchQuery) -> Vec<MatchQuery> {
    match q {
        MatchQuery::And(v) => v,
        q => vec![q],
    }
}

fn merge_matches(first: Stage, second: Stage) -> std::result::Result<Stage, (Stage, Stage)> {
    Ok(match (first, second) {
        (Stage::MatchFilter(a), Stage::MatchFilter(b)) => {
            let mut all = conjuncts(a);
            all.extend(conjuncts(b));
            Stage::MatchFilter(MatchQuery::And(all))
        }
        (Stage::MatchFilter(a), Stage::MatchExpr(e)) => {
            let mut all = conjuncts(a);
            all.push(MatchQuery::Expr(e));
            Stage::MatchFilter(MatchQuery::And(all))
        }
        (Stage::MatchExpr(e), Stage::MatchFilter(b)) => {
            let mut all = vec![MatchQuery::Expr(e)];
            all.extend(conjuncts(b));
            Stage::MatchFilter(MatchQuery::And(all))
        }
        (Stage::MatchExpr(a), Stage::MatchExpr(b)) => {
            let args = [a, b]
                .into_iter()
                .flat_map(|e| match e {
                    mql::Expression::Operator(mql::Operator {
                        op: MqlOperator::And,
                        args,
                    }) => args,
                    e => vec![e],
                })
                .collect();
            Stage::MatchExpr(mql::Expression::op(MqlOperator::And, args))
        }
        pair => return Err(pair),
    })
}

fn merge_paging(first: Stage, second: Stage) -> std::result::Result<Stage, (Stage, Stage)> {
    match (first, second) {
        (Stage::Skip(a), Stage::Skip(b)) => Ok(Stage::Skip(a.saturating_add(b))),
        (Stage::Limit(a), Stage::Limit(b)) => Ok(Stage::Limit(a.min(b))),
        pair => Err(pair),
    }
}

/// Folds each stage into the one before it while `merge` accepts the pair.
fn merge_neighbors<F>(stages: Vec<Stage>, merge: F) -> Vec<Stage>
where
    F: Fn(Stage, Stage) -> std::result::Result<Stage, (Stage, Stage)>,
{
    let mut merged: Vec<Stage> = Vec::with_capacity(stages.len());
    for stage in stages {
        match merged.pop() {
            Some(previous) => match merge(previous, stage) {
                Ok(combined) => merged.push(combined),
                Err((previous, stage)) => {
                    merged.push(previous);
                    merged.push(stage);
                }
            },
            None => merged.push(stage),
        }
    }
    merged
}

impl Pass for MergeNeighboringMatches {
    fn apply(&self, stages: Vec<Stage>) -> Vec<Stage> {
        merge_neighbors(stages, merge_matches)
    }
}

impl Pass for FoldSkipsAndLimits {
    fn apply(&self, stages: Vec<Stage>) -> Vec<Stage> {
        merge_neighbors(stages, merge_paging)
    }
}
