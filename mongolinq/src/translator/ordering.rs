use super::{stages::PipelineState, unsupported, MqlTranslator, Result};
use crate::{
    ir::{self, Expression, SortDirection},
    mql::{self, ProjectItem, SortSpecification, Stage},
};
use linked_hash_map::LinkedHashMap;
use tracing::{event, Level};

const DOCUMENT: &str = "_document";

fn sort_spec(path: String, direction: SortDirection) -> SortSpecification {
    match direction {
        SortDirection::Ascending => SortSpecification::Asc(path),
        SortDirection::Descending => SortSpecification::Desc(path),
    }
}

impl<'a> MqlTranslator<'a> {
    /// Translates an `OrderBy` and the `ThenBy`s on top of it into one
    /// `$sort`. When a key is not a stored field the keys are computed into
    /// temporary fields next to the document, sorted on, and the document
    /// restored.
    pub(crate) fn translate_ordering(&mut self, expr: &Expression) -> Result<PipelineState> {
        let mut chain: Vec<&ir::OrderBy> = Vec::new();
        let mut node = expr;
        loop {
            match node {
                Expression::OrderBy(o) => {
                    chain.push(o);
                    node = &o.source;
                    if !o.then_by {
                        break;
                    }
                }
                _ => return Err(unsupported(expr, "ThenBy must follow OrderBy")),
            }
        }
        chain.reverse();

        let mut state = self.translate_pipeline(node)?;
        let keys = chain
            .into_iter()
            .map(|o| {
                let key = self.apply_lambda(&o.key, vec![state.current.clone()])?;
                Ok((key.ast, o.direction))
            })
            .collect::<Result<Vec<_>>>()?;

        let stored = keys
            .iter()
            .all(|(key, _)| matches!(key.as_field_path(), Some(path) if !path.is_empty()));
        if stored {
            let specs = keys
                .into_iter()
                .filter_map(|(key, direction)| match key {
                    mql::Expression::FieldRef(path) => Some(sort_spec(path, direction)),
                    _ => None,
                })
                .collect();
            state.stages.push(Stage::Sort(specs));
            return Ok(state);
        }

        let mut items = LinkedHashMap::new();
        items.insert("_id".to_string(), ProjectItem::Exclusion);
        items.insert(
            DOCUMENT.to_string(),
            ProjectItem::Assignment(mql::Expression::root()),
        );
        let mut specs = Vec::with_capacity(keys.len());
        for (key, direction) in keys {
            let name = self.names.key();
            items.insert(name.clone(), ProjectItem::Assignment(key));
            specs.push(sort_spec(name, direction));
        }
        event!(Level::DEBUG, keys = specs.len(), "synthesized sort keys");
        state.stages.push(Stage::Project(items));
        state.stages.push(Stage::Sort(specs));
        state
            .stages
            .push(Stage::ReplaceRoot(mql::Expression::field(DOCUMENT)));
        Ok(state)
    }
}
