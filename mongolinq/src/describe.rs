//! A canonical text form of a compilation: the collection, one stage per
//! line in relaxed extended JSON, and how to read the results.

use crate::{Compilation, Translation};
use bson::Bson;
use itertools::Itertools;

pub fn describe_pipeline(pipeline: &[bson::Document]) -> String {
    pipeline
        .iter()
        .map(|stage| {
            let json: serde_json::Value = Bson::Document(stage.clone()).into_relaxed_extjson();
            json.to_string()
        })
        .join("\n")
}

impl Translation {
    pub fn describe(&self) -> String {
        let output = serde_json::to_value(&self.output).unwrap_or(serde_json::Value::Null);
        let mut lines = vec![format!("collection {}", self.collection)];
        if !self.pipeline.is_empty() {
            lines.push(describe_pipeline(&self.pipeline));
        }
        lines.push(format!("output {output}"));
        lines.join("\n")
    }
}

impl Compilation {
    pub fn describe(&self) -> String {
        match self {
            Compilation::Pipeline(t) => t.describe(),
            Compilation::LocalEvaluation { reason } => format!("local evaluation: {reason}"),
        }
    }
}
