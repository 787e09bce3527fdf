use super::{MqlCodeGenerator, Result};
use crate::mql::{self, Expression, ProjectItem, SortSpecification, Stage};
use bson::{doc, Bson};

impl MqlCodeGenerator {
    pub fn codegen_stage(&self, stage: Stage) -> Result<bson::Document> {
        match stage {
            Stage::MatchFilter(q) => Ok(doc! { "$match": self.codegen_match_document(q)? }),
            Stage::MatchExpr(e) => {
                Ok(doc! { "$match": { "$expr": self.codegen_expression(e)? } })
            }
            Stage::Project(items) => self.codegen_project(items),
            Stage::Group(g) => self.codegen_group(g),
            Stage::Sort(specs) => Ok(doc! { "$sort": Self::codegen_sort_specs(specs) }),
            Stage::ReplaceRoot(e) => {
                Ok(doc! { "$replaceRoot": { "newRoot": self.codegen_expression(e)? } })
            }
            Stage::Skip(n) => Ok(doc! { "$skip": Self::int_bson(n) }),
            Stage::Limit(n) => Ok(doc! { "$limit": Self::int_bson(n) }),
        }
    }

    /// Inside `$project` numbers and booleans read as inclusion flags and
    /// documents as nested projections, so literals are wrapped in
    /// `$literal` and computed documents are projected member by member.
    fn codegen_project(
        &self,
        items: linked_hash_map::LinkedHashMap<String, ProjectItem>,
    ) -> Result<bson::Document> {
        let project_body = items
            .into_iter()
            .map(|(k, v)| {
                let value = match v {
                    ProjectItem::Exclusion => Bson::Int32(0),
                    ProjectItem::Assignment(e) => self.codegen_project_value(e)?,
                };
                Ok((k, value))
            })
            .collect::<Result<bson::Document>>()?;
        Ok(doc! { "$project": project_body })
    }

    fn codegen_project_value(&self, e: Expression) -> Result<Bson> {
        match e {
            Expression::Literal(Bson::String(s)) if !s.starts_with('$') => Ok(Bson::String(s)),
            Expression::Literal(b) => Ok(Bson::Document(doc! { "$literal": b })),
            Expression::Document(fields) if fields.is_empty() => {
                Ok(Bson::Document(doc! { "$literal": {} }))
            }
            Expression::Document(fields) => Ok(Bson::Document(
                fields
                    .into_iter()
                    .map(|(k, v)| Ok((k, self.codegen_project_value(v)?)))
                    .collect::<Result<bson::Document>>()?,
            )),
            e => self.codegen_expression(e),
        }
    }

    fn codegen_group(&self, group: mql::Group) -> Result<bson::Document> {
        let mut group_body = doc! { "_id": self.codegen_expression(group.keys)? };
        for acc in group.aggregations {
            let op = Self::accumulator_op(acc.function);
            group_body.insert(acc.alias, doc! { op: self.codegen_expression(acc.expr)? });
        }
        Ok(doc! { "$group": group_body })
    }

    fn codegen_sort_specs(specs: Vec<SortSpecification>) -> bson::Document {
        specs
            .into_iter()
            .map(|spec| match spec {
                SortSpecification::Asc(key) => (key, Bson::Int32(1)),
                SortSpecification::Desc(key) => (key, Bson::Int32(-1)),
            })
            .collect()
    }
}
