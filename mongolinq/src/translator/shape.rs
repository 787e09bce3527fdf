use super::{unsupported, Error, MqlTranslator, Result};
use crate::{
    ir::{self, Expression, Lambda, Type},
    mql::{self, MqlOperator},
    representation::{self, MapShape, RepresentationTag},
};

/// A translated value together with what is known about how it is stored.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Translated {
    pub ast: mql::Expression,
    pub shape: ValueShape,
}

impl Translated {
    pub fn new(ast: mql::Expression, shape: ValueShape) -> Self {
        Translated { ast, shape }
    }

    pub fn tag(&self) -> Option<RepresentationTag> {
        match self.shape {
            ValueShape::Scalar(tag) => Some(tag),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ValueShape {
    Scalar(RepresentationTag),
    Document(DocumentShape),
    Array(Box<ValueShape>),
    Map(MapValue),
    /// One key/value pair of a map, in the shape of that map's entries.
    Entry(MapValue),
    /// A group produced by `$group`: the key lives at `_id` and, when they
    /// are materialized, the elements at `_elements`. `collecting` is set
    /// while the operators of the grouping's projection can still be fused
    /// into the `$group` stage.
    Grouping {
        key: Box<ValueShape>,
        element: Box<ValueShape>,
        collecting: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DocumentShape {
    /// A document read from storage; fields resolve below this registry path.
    Stored(String),
    /// A document computed by the engine.
    Computed,
    /// A document built by a projection, whose members keep the shape of
    /// the values assigned to them.
    Projected(Vec<ProjectedMember>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProjectedMember {
    pub member: String,
    pub element: String,
    pub shape: ValueShape,
}

/// A map-typed value: its wire shape, the registry path of the field
/// holding it, and its key and value types.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MapValue {
    pub shape: MapShape,
    pub path: Option<String>,
    pub key_ty: Type,
    pub value_ty: Type,
}

impl ValueShape {
    /// The shape of a value computed by the engine.
    pub fn computed(ty: &Type) -> ValueShape {
        match ty {
            Type::Document => ValueShape::Document(DocumentShape::Computed),
            Type::Array(e) => ValueShape::Array(Box::new(ValueShape::computed(e))),
            Type::Dictionary(k, v) => ValueShape::Map(MapValue {
                shape: MapShape::Document,
                path: None,
                key_ty: k.as_ref().clone(),
                value_ty: v.as_ref().clone(),
            }),
            Type::KeyValuePair(k, v) => ValueShape::Entry(MapValue {
                shape: MapShape::Document,
                path: None,
                key_ty: k.as_ref().clone(),
                value_ty: v.as_ref().clone(),
            }),
            Type::Grouping(k, e) => ValueShape::Grouping {
                key: Box::new(ValueShape::computed(k)),
                element: Box::new(ValueShape::computed(e)),
                collecting: false,
            },
            t => ValueShape::Scalar(RepresentationTag::computed(t)),
        }
    }
}

/// Maps a member name to the name of the element storing it.
pub(crate) fn element_name(member: &str) -> &str {
    if member == "Id" {
        "_id"
    } else {
        member
    }
}

fn join_path(prefix: &str, member: &str) -> String {
    if prefix.is_empty() {
        member.to_string()
    } else {
        format!("{prefix}.{member}")
    }
}

const RESERVED_VARIABLES: [&str; 10] = [
    "this", "value", "values", "string", "substring", "start", "entry", "seed", "rest", "pair",
];

impl<'a> MqlTranslator<'a> {
    /// The shape of the stored value at `path`, consulting the resolver for
    /// every scalar and map.
    pub(crate) fn shape_for(&self, path: &str, ty: &Type) -> representation::Result<ValueShape> {
        Ok(match ty {
            Type::Document => ValueShape::Document(DocumentShape::Stored(path.to_string())),
            Type::Array(e) => ValueShape::Array(Box::new(self.shape_for(path, e)?)),
            Type::Dictionary(k, v) => {
                let tag = self.representations.resolve(path, ty)?;
                let shape = tag.map_shape().ok_or_else(|| {
                    representation::Error::IncompatibleRepresentation {
                        path: path.to_string(),
                        ty: ty.clone(),
                        tag,
                    }
                })?;
                ValueShape::Map(MapValue {
                    shape,
                    path: Some(path.to_string()),
                    key_ty: k.as_ref().clone(),
                    value_ty: v.as_ref().clone(),
                })
            }
            Type::KeyValuePair(_, _) | Type::Grouping(_, _) => ValueShape::computed(ty),
            _ => ValueShape::Scalar(self.representations.resolve(path, ty)?),
        })
    }

    pub(crate) fn resolve_shape(
        &self,
        operator: &'static str,
        path: &str,
        ty: &Type,
    ) -> Result<ValueShape> {
        self.shape_for(path, ty)
            .map_err(|reason| Error::UnresolvedField { operator, reason })
    }

    pub(crate) fn translate_field(&mut self, expr: &Expression, f: &ir::Field) -> Result<Translated> {
        let source = self.translate_expr(&f.source)?;
        self.member_of(expr, source, &f.name, &f.ty)
    }

    fn member_of(
        &mut self,
        expr: &Expression,
        source: Translated,
        name: &str,
        ty: &Type,
    ) -> Result<Translated> {
        let Translated { ast, shape } = source;
        match shape {
            ValueShape::Document(DocumentShape::Stored(prefix)) => {
                let shape = self.resolve_shape("MemberAccess", &join_path(&prefix, name), ty)?;
                Ok(Translated::new(ast.append_path(element_name(name)), shape))
            }
            ValueShape::Document(DocumentShape::Computed) => Ok(Translated::new(
                ast.append_path(element_name(name)),
                ValueShape::computed(ty),
            )),
            ValueShape::Document(DocumentShape::Projected(members)) => members
                .into_iter()
                .find(|m| m.member == name)
                .map(|m| Translated::new(ast.append_path(&m.element), m.shape))
                .ok_or_else(|| {
                    unsupported(expr, format!("'{name}' is not a member of the projected document"))
                }),
            ValueShape::Grouping { key, .. } if name == "Key" => {
                Ok(Translated::new(ast.append_path("_id"), *key))
            }
            ValueShape::Entry(map) => self.entry_member(expr, ast, map, name),
            ValueShape::Array(_) if name == "Length" || name == "Count" => Ok(Translated::new(
                ast.size(),
                ValueShape::Scalar(RepresentationTag::NumericScalar),
            )),
            ValueShape::Map(map) if name == "Count" => Ok(Translated::new(
                Self::map_entries(ast, &map).size(),
                ValueShape::Scalar(RepresentationTag::NumericScalar),
            )),
            ValueShape::Scalar(tag) if name == "Length" && !tag.is_string_encoded() => {
                Ok(Translated::new(
                    mql::Expression::op(MqlOperator::StrLenCP, vec![ast]),
                    ValueShape::Scalar(RepresentationTag::NumericScalar),
                ))
            }
            _ => Err(unsupported(expr, format!("member '{name}' cannot be read here"))),
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Translated> {
        self.scope
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    /// Runs `f` with additional lambda parameter bindings in scope.
    pub(crate) fn with_bindings<T, F>(&mut self, bindings: Vec<(String, Translated)>, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let depth = self.scope.len();
        self.scope.extend(bindings);
        let result = f(self);
        self.scope.truncate(depth);
        result
    }

    /// Translates the body of `lambda` with its parameters bound to `args`.
    pub(crate) fn apply_lambda(&mut self, lambda: &Lambda, args: Vec<Translated>) -> Result<Translated> {
        let bindings = lambda
            .parameters
            .iter()
            .map(|p| p.name.clone())
            .zip(args)
            .collect();
        self.with_bindings(bindings, |t| t.translate_expr(&lambda.body))
    }

    /// Translates a one-parameter lambda applied to each element of an
    /// array, returning the variable the element is bound to.
    pub(crate) fn apply_element_lambda(
        &mut self,
        lambda: &Lambda,
        element: &ValueShape,
    ) -> Result<(String, Translated)> {
        let name = lambda
            .parameter(0)
            .map(|p| p.name.as_str())
            .unwrap_or_default();
        let var = self.var_name(name);
        let body = self.apply_lambda(
            lambda,
            vec![Translated::new(mql::Expression::var(&var), element.clone())],
        )?;
        Ok((var, body))
    }

    /// The aggregation variable a lambda parameter is bound to. Names that
    /// are not valid variable names, or that the translator uses for its own
    /// bindings, are replaced by generated ones.
    pub(crate) fn var_name(&mut self, name: &str) -> String {
        let mut chars = name.chars();
        let valid = chars.next().map_or(false, |c| c.is_ascii_lowercase())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !RESERVED_VARIABLES.contains(&name);
        if valid {
            name.to_string()
        } else {
            self.fresh_var()
        }
    }

    pub(crate) fn fresh_var(&mut self) -> String {
        self.var_counter += 1;
        format!("v{}", self.var_counter)
    }
}
