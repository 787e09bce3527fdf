mod assembler;
mod codegen;
pub mod describe;
pub mod ir;
pub mod local_eval;
mod mql;
pub mod options;
pub mod partial_eval;
pub mod representation;
pub mod result;
#[cfg(test)]
mod test_engine;
mod translator;
pub mod usererror;

pub use translator::{Cardinality, OutputShape, ResultValue};

use crate::{
    codegen::MqlCodeGenerator,
    ir::{Expression, Value},
    local_eval::LocalEvaluator,
    options::CompilerOptions,
    representation::{CultureProvider, FieldRepresentationResolver},
    result::Result,
    translator::MqlTranslator,
};
use std::collections::HashMap;
use tracing::{event, instrument, Level};

/// Everything needed to run a compiled query.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub collection: String,
    pub pipeline: Vec<bson::Document>,
    pub output: OutputShape,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Compilation {
    Pipeline(Translation),
    /// The query has to be answered by `evaluate_locally`.
    LocalEvaluation { reason: String },
}

/// Compiles an operator tree into the aggregation pipeline that answers it.
#[instrument(skip_all)]
pub fn compile(
    tree: &Expression,
    resolver: &dyn FieldRepresentationResolver,
    culture: &dyn CultureProvider,
    options: CompilerOptions,
) -> Result<Compilation> {
    let folded = partial_eval::fold(tree.clone());

    let mut translator = MqlTranslator::new(resolver, culture.current_culture(), options);
    let query = match translator.translate_query(&folded) {
        Ok(query) => query,
        Err(e) if options.allow_client_side_fallback && e.allows_local_evaluation() => {
            event!(Level::DEBUG, reason = %e, "falling back to local evaluation");
            return Ok(Compilation::LocalEvaluation {
                reason: e.to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let stages = assembler::assemble(query.stages);
    let pipeline = MqlCodeGenerator {}.codegen_pipeline(stages)?;
    for stage in &pipeline {
        event!(Level::DEBUG, %stage, "emitted stage");
    }

    Ok(Compilation::Pipeline(Translation {
        collection: query.collection,
        pipeline,
        output: query.output,
    }))
}

/// Evaluates an operator tree in process over the given collections.
pub fn evaluate_locally(tree: &Expression, collections: &HashMap<String, Vec<Value>>) -> Result<Value> {
    Ok(LocalEvaluator::new(collections).evaluate(tree)?)
}
