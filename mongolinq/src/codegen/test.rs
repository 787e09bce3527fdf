macro_rules! test_codegen_expr {
    ($func_name:ident, expected = $expected:expr, input = $input:expr) => {
        #[test]
        fn $func_name() {
            use crate::codegen::MqlCodeGenerator;
            let expected = $expected;
            let input = $input;

            let gen = MqlCodeGenerator {};
            assert_eq!(expected, gen.codegen_expression(input));
        }
    };
}

macro_rules! test_codegen_match {
    ($func_name:ident, expected = $expected:expr, input = $input:expr) => {
        #[test]
        fn $func_name() {
            use crate::codegen::MqlCodeGenerator;
            let expected = $expected;
            let input = $input;

            let gen = MqlCodeGenerator {};
            assert_eq!(expected, gen.codegen_match_document(input));
        }
    };
}

macro_rules! test_codegen_stage {
    ($func_name:ident, expected = $expected:expr, input = $input:expr) => {
        #[test]
        fn $func_name() {
            use crate::codegen::MqlCodeGenerator;
            let expected = $expected;
            let input = $input;

            let gen = MqlCodeGenerator {};
            assert_eq!(expected, gen.codegen_stage(input));
        }
    };
}

mod literal {
    use crate::mql::Expression::*;
    use bson::{bson, Bson};

    test_codegen_expr!(
        int,
        expected = Ok(Bson::Int32(3)),
        input = Literal(Bson::Int32(3))
    );

    test_codegen_expr!(
        plain_string,
        expected = Ok(Bson::String("abc".to_string())),
        input = Literal(Bson::String("abc".to_string()))
    );

    test_codegen_expr!(
        dollar_string_is_wrapped,
        expected = Ok(bson!({ "$literal": "$abc" })),
        input = Literal(Bson::String("$abc".to_string()))
    );

    test_codegen_expr!(
        array_containing_dollar_string_is_wrapped,
        expected = Ok(bson!({ "$literal": ["a", "$b"] })),
        input = Literal(bson!(["a", "$b"]))
    );
}

mod reference {
    use crate::{codegen::Error, mql::Expression};
    use bson::Bson;

    test_codegen_expr!(
        field,
        expected = Ok(Bson::String("$a.b".to_string())),
        input = Expression::field("a.b")
    );

    test_codegen_expr!(
        variable,
        expected = Ok(Bson::String("$$this".to_string())),
        input = Expression::var("this")
    );

    test_codegen_expr!(
        root_path,
        expected = Ok(Bson::String("$x".to_string())),
        input = Expression::root().append_path("x")
    );

    test_codegen_expr!(
        empty_path_is_an_error,
        expected = Err(Error::EmptyFieldPath),
        input = Expression::field("")
    );
}

mod operator {
    use crate::mql::{Expression, MqlOperator};
    use bson::bson;

    test_codegen_expr!(
        binary,
        expected = Ok(bson!({ "$eq": ["$a", 1] })),
        input = Expression::op(
            MqlOperator::Eq,
            vec![Expression::field("a"), Expression::int(1)]
        )
    );

    test_codegen_expr!(
        unary_without_argument_array,
        expected = Ok(bson!({ "$size": "$tags" })),
        input = Expression::field("tags").size()
    );

    test_codegen_expr!(
        unary_array_operand_keeps_array,
        expected = Ok(bson!({ "$reverseArray": [[1, 2]] })),
        input = Expression::op(
            MqlOperator::ReverseArray,
            vec![Expression::Array(vec![Expression::int(1), Expression::int(2)])]
        )
    );

    test_codegen_expr!(
        trunc,
        expected = Ok(bson!({ "$trunc": { "$divide": ["$a", 2] } })),
        input = Expression::op(
            MqlOperator::Trunc,
            vec![Expression::op(
                MqlOperator::Divide,
                vec![Expression::field("a"), Expression::int(2)]
            )]
        )
    );

    test_codegen_expr!(
        member_of_computed_value_is_bound_to_this,
        expected = Ok(bson!({ "$let": {
            "vars": { "this": { "$arrayElemAt": ["$a", 0] } },
            "in": "$$this.k",
        }})),
        input = Expression::field("a").array_elem_at(0).append_path("k")
    );
}

mod array_expressions {
    use crate::mql::{Expression, Filter, Map, MqlOperator, Reduce, Zip};
    use bson::bson;

    test_codegen_expr!(
        filter_with_limit,
        expected = Ok(bson!({ "$filter": {
            "input": "$a",
            "as": "x",
            "cond": { "$gt": ["$$x", 1] },
            "limit": 1,
        }})),
        input = Expression::Filter(Filter {
            input: Box::new(Expression::field("a")),
            _as: "x".to_string(),
            cond: Box::new(Expression::op(
                MqlOperator::Gt,
                vec![Expression::var("x"), Expression::int(1)]
            )),
            limit: Some(Box::new(Expression::int(1))),
        })
    );

    test_codegen_expr!(
        map,
        expected = Ok(bson!({ "$map": { "input": "$a", "as": "x", "in": "$$x.k" } })),
        input = Expression::Map(Map {
            input: Box::new(Expression::field("a")),
            _as: "x".to_string(),
            inside: Box::new(Expression::var("x.k")),
        })
    );

    test_codegen_expr!(
        reduce,
        expected = Ok(bson!({ "$reduce": {
            "input": "$a",
            "initialValue": 0,
            "in": { "$add": ["$$value", "$$this"] },
        }})),
        input = Expression::Reduce(Reduce {
            input: Box::new(Expression::field("a")),
            initial_value: Box::new(Expression::int(0)),
            inside: Box::new(Expression::op(
                MqlOperator::Add,
                vec![Expression::var("value"), Expression::var("this")]
            )),
        })
    );

    test_codegen_expr!(
        zip,
        expected = Ok(bson!({ "$zip": { "inputs": ["$a", "$b"] } })),
        input = Expression::Zip(Zip {
            inputs: vec![Expression::field("a"), Expression::field("b")],
        })
    );

    test_codegen_expr!(
        cond,
        expected = Ok(bson!({ "$cond": { "if": "$f", "then": 1, "else": 0 } })),
        input = Expression::cond(Expression::field("f"), Expression::int(1), Expression::int(0))
    );
}

mod match_query {
    use crate::{
        codegen::Error,
        mql::{Expression, MatchComparisonOp, MatchQuery, MatchRegex, MqlOperator},
    };
    use bson::{doc, Bson};

    test_codegen_match!(
        equality_short_form,
        expected = Ok(doc! { "a": 1 }),
        input = MatchQuery::comparison(Some("a".to_string()), MatchComparisonOp::Eq, Bson::Int32(1))
    );

    test_codegen_match!(
        equality_on_document_keeps_operator,
        expected = Ok(doc! { "a": { "$eq": { "k": 1 } } }),
        input = MatchQuery::comparison(
            Some("a".to_string()),
            MatchComparisonOp::Eq,
            Bson::Document(doc! { "k": 1 })
        )
    );

    test_codegen_match!(
        conjunction_over_distinct_fields_is_one_document,
        expected = Ok(doc! { "a": { "$gt": 1 }, "b": "x" }),
        input = MatchQuery::And(vec![
            MatchQuery::comparison(Some("a".to_string()), MatchComparisonOp::Gt, Bson::Int32(1)),
            MatchQuery::comparison(
                Some("b".to_string()),
                MatchComparisonOp::Eq,
                Bson::String("x".to_string())
            ),
        ])
    );

    test_codegen_match!(
        conjunction_over_same_field_uses_and,
        expected = Ok(doc! { "$and": [{ "a": { "$gt": 1 } }, { "a": { "$lt": 5 } }] }),
        input = MatchQuery::And(vec![
            MatchQuery::comparison(Some("a".to_string()), MatchComparisonOp::Gt, Bson::Int32(1)),
            MatchQuery::comparison(Some("a".to_string()), MatchComparisonOp::Lt, Bson::Int32(5)),
        ])
    );

    test_codegen_match!(
        regex_options_are_sorted,
        expected = Ok(doc! { "name": Bson::RegularExpression(bson::Regex {
            pattern: "^A".to_string(),
            options: "is".to_string(),
        }) }),
        input = MatchQuery::Regex(MatchRegex {
            input: Some("name".to_string()),
            regex: "^A".to_string(),
            options: "si".to_string(),
        })
    );

    test_codegen_match!(
        elem_match_on_element_comparison,
        expected = Ok(doc! { "a": { "$elemMatch": { "$gt": 2 } } }),
        input = MatchQuery::elem_match(
            Some("a".to_string()),
            MatchQuery::comparison(None, MatchComparisonOp::Gt, Bson::Int32(2))
        )
    );

    test_codegen_match!(
        negated_single_field_query,
        expected = Ok(doc! { "a": { "$not": { "$gt": 2 } } }),
        input = MatchQuery::comparison(Some("a".to_string()), MatchComparisonOp::Gt, Bson::Int32(2))
            .negate()
    );

    test_codegen_match!(
        never_matches,
        expected = Ok(doc! { "_id": { "$type": -1 } }),
        input = MatchQuery::never()
    );

    test_codegen_match!(
        expression,
        expected = Ok(doc! { "$expr": { "$eq": ["$a", "$b"] } }),
        input = MatchQuery::Expr(Expression::op(
            MqlOperator::Eq,
            vec![Expression::field("a"), Expression::field("b")]
        ))
    );

    test_codegen_match!(
        top_level_query_needs_a_field,
        expected = Err(Error::UnnamedMatchInput),
        input = MatchQuery::comparison(None, MatchComparisonOp::Gt, Bson::Int32(2))
    );
}

mod stage {
    use crate::mql::{
        AccumulatorFunction, Expression, Group, GroupAccumulator, ProjectItem, SortSpecification,
        Stage,
    };
    use bson::{doc, Bson};
    use linked_hash_map::LinkedHashMap;

    test_codegen_stage!(
        project_wraps_literals,
        expected = Ok(doc! { "$project": {
            "n": { "$literal": 1 },
            "s": "text",
            "e": { "$literal": {} },
            "a": "$a",
            "_id": 0,
        }}),
        input = Stage::Project(LinkedHashMap::from_iter([
            ("n".to_string(), ProjectItem::Assignment(Expression::int(1))),
            (
                "s".to_string(),
                ProjectItem::Assignment(Expression::Literal(Bson::String("text".to_string())))
            ),
            ("e".to_string(), ProjectItem::Assignment(Expression::Document(vec![]))),
            ("a".to_string(), ProjectItem::Assignment(Expression::field("a"))),
            ("_id".to_string(), ProjectItem::Exclusion),
        ]))
    );

    test_codegen_stage!(
        project_nested_document,
        expected = Ok(doc! { "$project": { "d": { "x": "$a", "y": { "$literal": true } } } }),
        input = Stage::Project(LinkedHashMap::from_iter([(
            "d".to_string(),
            ProjectItem::Assignment(Expression::Document(vec![
                ("x".to_string(), Expression::field("a")),
                ("y".to_string(), Expression::Literal(Bson::Boolean(true))),
            ]))
        )]))
    );

    test_codegen_stage!(
        group,
        expected = Ok(doc! { "$group": {
            "_id": "$k",
            "__agg0": { "$sum": 1 },
            "_elements": { "$push": "$$ROOT" },
        }}),
        input = Stage::Group(Group {
            keys: Expression::field("k"),
            aggregations: vec![
                GroupAccumulator {
                    alias: "__agg0".to_string(),
                    function: AccumulatorFunction::Sum,
                    expr: Expression::int(1),
                },
                GroupAccumulator {
                    alias: "_elements".to_string(),
                    function: AccumulatorFunction::Push,
                    expr: Expression::root(),
                },
            ],
        })
    );

    test_codegen_stage!(
        sort,
        expected = Ok(doc! { "$sort": { "a": 1, "_key1": -1 } }),
        input = Stage::Sort(vec![
            SortSpecification::Asc("a".to_string()),
            SortSpecification::Desc("_key1".to_string()),
        ])
    );

    test_codegen_stage!(
        replace_root,
        expected = Ok(doc! { "$replaceRoot": { "newRoot": "$_document" } }),
        input = Stage::ReplaceRoot(Expression::field("_document"))
    );

    test_codegen_stage!(
        skip_and_limit,
        expected = Ok(doc! { "$skip": 3 }),
        input = Stage::Skip(3)
    );

    test_codegen_stage!(
        large_limit_is_int64,
        expected = Ok(doc! { "$limit": Bson::Int64(5_000_000_000) }),
        input = Stage::Limit(5_000_000_000)
    );
}
