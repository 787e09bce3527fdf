use crate::{
    ir::{Type, Value},
    representation::CultureId,
};

/// A node of the operator tree. The tree is built once by the composition
/// API, is never mutated, and owns every child. Sequence operators and the
/// scalar expressions used in lambda bodies share this one closed type so
/// that every translator matches exhaustively.
#[derive(PartialEq, Debug, Clone)]
pub enum Expression {
    Literal(Literal),
    Parameter(Parameter),
    Source(Source),
    Field(Field),
    Binary(Binary),
    Not(Box<Expression>),
    Conditional(Conditional),
    Convert(Convert),
    New(New),
    NewArray(NewArray),
    StringPredicate(StringPredicate),
    StringCase(StringCase),
    Where(Where),
    Select(Select),
    GroupBy(GroupBy),
    OrderBy(OrderBy),
    Skip(Skip),
    Take(Take),
    SetOp(SetOp),
    Quantifier(Quantifier),
    Contains(Contains),
    ElementAccess(ElementAccess),
    Reduce(Reduce),
    Aggregate(Aggregate),
    Reverse(Box<Expression>),
    DefaultIfEmpty(Box<Expression>),
    ToArray(Box<Expression>),
    Zip(Zip),
    Dictionary(DictionaryAccess),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Literal {
    pub value: Value,
    pub ty: Type,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
}

/// The documents of a collection. `ty` is the document type, the node
/// itself is a sequence of it.
#[derive(PartialEq, Debug, Clone)]
pub struct Source {
    pub collection: String,
    pub ty: Type,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Field {
    pub source: Box<Expression>,
    pub name: String,
    pub ty: Type,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BinaryOperator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Subtract,
    Multiply,
    Divide,
    And,
    Or,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        use BinaryOperator::*;
        matches!(self, Eq | Ne | Lt | Lte | Gt | Gte)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    /// The operator that gives the same result with the operands swapped.
    pub fn flip(self) -> Self {
        use BinaryOperator::*;
        match self {
            Lt => Gt,
            Lte => Gte,
            Gt => Lt,
            Gte => Lte,
            op => op,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Binary {
    pub op: BinaryOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Conditional {
    pub test: Box<Expression>,
    pub if_true: Box<Expression>,
    pub if_false: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Convert {
    pub expr: Box<Expression>,
    pub to: Type,
}

/// Construction of a new document, e.g. an anonymous projection.
#[derive(PartialEq, Debug, Clone)]
pub struct New {
    pub fields: Vec<(String, Expression)>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct NewArray {
    pub elements: Vec<Expression>,
    pub element_ty: Type,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum StringPredicateKind {
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum StringComparison {
    Ordinal,
    OrdinalIgnoreCase,
    CurrentCulture,
    CurrentCultureIgnoreCase,
    InvariantCulture,
    InvariantCultureIgnoreCase,
}

impl StringComparison {
    pub fn ignores_case(self) -> bool {
        matches!(
            self,
            StringComparison::OrdinalIgnoreCase
                | StringComparison::CurrentCultureIgnoreCase
                | StringComparison::InvariantCultureIgnoreCase
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            StringComparison::Ordinal => "Ordinal",
            StringComparison::OrdinalIgnoreCase => "OrdinalIgnoreCase",
            StringComparison::CurrentCulture => "CurrentCulture",
            StringComparison::CurrentCultureIgnoreCase => "CurrentCultureIgnoreCase",
            StringComparison::InvariantCulture => "InvariantCulture",
            StringComparison::InvariantCultureIgnoreCase => "InvariantCultureIgnoreCase",
        }
    }
}

/// How a string predicate compares its operands: the overload without
/// options, the one taking a comparison mode, or the one taking an
/// ignore-case flag and a culture.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum StringMatchMode {
    Default,
    Comparison(StringComparison),
    Culture { ignore_case: bool, culture: CultureId },
}

impl StringMatchMode {
    pub fn ignores_case(&self) -> bool {
        match self {
            StringMatchMode::Default => false,
            StringMatchMode::Comparison(c) => c.ignores_case(),
            StringMatchMode::Culture { ignore_case, .. } => *ignore_case,
        }
    }
}

/// `target.Contains(value)`, `target.StartsWith(value)` or
/// `target.EndsWith(value)`.
#[derive(PartialEq, Debug, Clone)]
pub struct StringPredicate {
    pub kind: StringPredicateKind,
    pub target: Box<Expression>,
    pub value: Box<Expression>,
    pub mode: StringMatchMode,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum CaseConversion {
    ToLower,
    ToUpper,
}

#[derive(PartialEq, Debug, Clone)]
pub struct StringCase {
    pub target: Box<Expression>,
    pub conversion: CaseConversion,
}

/// A lambda whose body is a sub-tree over its parameters.
#[derive(PartialEq, Debug, Clone)]
pub struct Lambda {
    pub parameters: Vec<Parameter>,
    pub body: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Where {
    pub source: Box<Expression>,
    pub predicate: Lambda,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Select {
    pub source: Box<Expression>,
    pub selector: Lambda,
}

#[derive(PartialEq, Debug, Clone)]
pub struct GroupBy {
    pub source: Box<Expression>,
    pub key: Lambda,
    pub element: Option<Lambda>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// OrderBy/OrderByDescending, or ThenBy/ThenByDescending when `then_by`
/// is set.
#[derive(PartialEq, Debug, Clone)]
pub struct OrderBy {
    pub source: Box<Expression>,
    pub key: Lambda,
    pub direction: SortDirection,
    pub then_by: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Skip {
    pub source: Box<Expression>,
    pub count: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Take {
    pub source: Box<Expression>,
    pub count: Box<Expression>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SetOperator {
    Concat,
    Except,
    Intersect,
    Union,
    Distinct,
}

/// A set operation. `other` is present for every operator but Distinct.
#[derive(PartialEq, Debug, Clone)]
pub struct SetOp {
    pub op: SetOperator,
    pub source: Box<Expression>,
    pub other: Option<Box<Expression>>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum QuantifierKind {
    All,
    Any,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Quantifier {
    pub kind: QuantifierKind,
    pub source: Box<Expression>,
    pub predicate: Option<Lambda>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Contains {
    pub source: Box<Expression>,
    pub value: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum ElementKind {
    First,
    Last,
    ElementAt(Box<Expression>),
}

#[derive(PartialEq, Debug, Clone)]
pub struct ElementAccess {
    pub kind: ElementKind,
    pub source: Box<Expression>,
    pub predicate: Option<Lambda>,
    pub or_default: bool,
}

/// `Aggregate`: a left fold with `func(accumulator, element)`. Without a
/// seed the first element seeds the fold.
#[derive(PartialEq, Debug, Clone)]
pub struct Reduce {
    pub source: Box<Expression>,
    pub seed: Option<Box<Expression>>,
    pub func: Lambda,
    pub result_selector: Option<Lambda>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum AggregateFunction {
    Count,
    LongCount,
    Sum,
    Average,
    Min,
    Max,
    StdDevPop,
    StdDevSamp,
}

/// A numeric summary of a sequence. For Count and LongCount the optional
/// lambda is a predicate, for the others it is a selector.
#[derive(PartialEq, Debug, Clone)]
pub struct Aggregate {
    pub function: AggregateFunction,
    pub source: Box<Expression>,
    pub selector: Option<Lambda>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Zip {
    pub source: Box<Expression>,
    pub other: Box<Expression>,
    pub selector: Lambda,
}

#[derive(PartialEq, Debug, Clone)]
pub enum DictionaryOp {
    ContainsKey(Box<Expression>),
    ContainsValue(Box<Expression>),
    Keys,
    Values,
    Indexer(Box<Expression>),
    Count,
    CountWithPredicate(Lambda),
    First(Lambda),
    FirstOrDefault(Lambda),
}

#[derive(PartialEq, Debug, Clone)]
pub struct DictionaryAccess {
    pub source: Box<Expression>,
    pub op: DictionaryOp,
}
