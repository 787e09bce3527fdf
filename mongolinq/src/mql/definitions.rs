use bson::Bson;
use linked_hash_map::LinkedHashMap;

/// One stage of the emitted aggregation pipeline. This covers only the
/// stages the translator produces.
#[derive(PartialEq, Debug, Clone)]
pub enum Stage {
    /// `$match` with a native query document.
    MatchFilter(MatchQuery),
    /// `$match` with `$expr`.
    MatchExpr(Expression),
    Project(LinkedHashMap<String, ProjectItem>),
    Group(Group),
    Sort(Vec<SortSpecification>),
    ReplaceRoot(Expression),
    Skip(i64),
    Limit(i64),
}

#[derive(PartialEq, Debug, Clone)]
pub enum ProjectItem {
    Exclusion,
    Assignment(Expression),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Group {
    pub keys: Expression,
    pub aggregations: Vec<GroupAccumulator>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct GroupAccumulator {
    pub alias: String,
    pub function: AccumulatorFunction,
    pub expr: Expression,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum AccumulatorFunction {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
    AddToSet,
    StdDevPop,
    StdDevSamp,
}

#[derive(PartialEq, Debug, Clone)]
pub enum SortSpecification {
    Asc(String),
    Desc(String),
}

/// An aggregation expression.
#[derive(PartialEq, Debug, Clone)]
pub enum Expression {
    Literal(Bson),
    /// A path relative to the current document, without the leading `$`.
    /// Inside `$elemMatch` the empty path denotes the element itself.
    FieldRef(String),
    /// A variable, optionally followed by a dotted path, without the
    /// leading `$$`.
    Variable(String),
    Operator(Operator),
    Let(Let),
    Cond(Cond),
    Filter(Filter),
    Map(Map),
    Reduce(Reduce),
    Zip(Zip),
    Array(Vec<Expression>),
    Document(Vec<(String, Expression)>),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum MqlOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Trunc,
    Max,
    Min,

    // Comparison
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,

    // Boolean
    Not,
    And,
    Or,

    // String
    Concat,
    IndexOfCP,
    StrLenCP,
    ToLower,
    ToUpper,

    // Array
    ArrayElemAt,
    ConcatArrays,
    In,
    ObjectToArray,
    ReverseArray,
    SetDifference,
    SetIntersection,
    SetUnion,
    Size,
    Slice,
    AllElementsTrue,
    AnyElementTrue,

    // Array summaries
    Sum,
    Avg,
    StdDevPop,
    StdDevSamp,

    // Type
    Type,
    ToInt,
    ToLong,
    ToDouble,
    ToDecimal,
    ToString,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Operator {
    pub op: MqlOperator,
    pub args: Vec<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Let {
    pub vars: Vec<(String, Expression)>,
    pub inside: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Cond {
    pub test: Box<Expression>,
    pub then: Box<Expression>,
    pub otherwise: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Filter {
    pub input: Box<Expression>,
    pub _as: String,
    pub cond: Box<Expression>,
    pub limit: Option<Box<Expression>>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Map {
    pub input: Box<Expression>,
    pub _as: String,
    pub inside: Box<Expression>,
}

/// `$reduce`; `inside` refers to `$$value` and `$$this`.
#[derive(PartialEq, Debug, Clone)]
pub struct Reduce {
    pub input: Box<Expression>,
    pub initial_value: Box<Expression>,
    pub inside: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Zip {
    pub inputs: Vec<Expression>,
}

/// A native query document. An absent `input` means the query applies to
/// the value it is nested under, as inside `$elemMatch` or `$not`.
#[derive(PartialEq, Debug, Clone)]
pub enum MatchQuery {
    And(Vec<MatchQuery>),
    Or(Vec<MatchQuery>),
    Nor(Vec<MatchQuery>),
    Comparison(MatchComparison),
    Exists(MatchExists),
    In(MatchIn),
    Regex(MatchRegex),
    ElemMatch(ElemMatch),
    Not(MatchNot),
    Type(MatchType),
    Expr(Expression),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum MatchComparisonOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(PartialEq, Debug, Clone)]
pub struct MatchComparison {
    pub input: Option<String>,
    pub op: MatchComparisonOp,
    pub arg: Bson,
}

#[derive(PartialEq, Debug, Clone)]
pub struct MatchExists {
    pub input: String,
    pub exists: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub struct MatchIn {
    pub input: Option<String>,
    pub args: Vec<Bson>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct MatchRegex {
    pub input: Option<String>,
    pub regex: String,
    pub options: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ElemMatch {
    pub input: Option<String>,
    pub condition: Box<MatchQuery>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct MatchNot {
    pub input: Option<String>,
    pub condition: Box<MatchQuery>,
}

/// `$type`; `-1` matches no BSON type.
#[derive(PartialEq, Debug, Clone)]
pub struct MatchType {
    pub input: String,
    pub type_code: i32,
}
