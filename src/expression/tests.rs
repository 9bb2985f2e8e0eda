use super::*;

fn table_expression(required: Vec<MetaType>) -> MetadataExpression {
    MetadataExpression {
        name: "tables".to_string(),
        meta_type_required: required,
        meta_type_connect_symbol: ".".to_string(),
        meta_obj_connect_symbol: ",".to_string(),
        select_mode: SelectMode::Exactly,
        prefix: "a_".to_string(),
        suffix: "_b".to_string(),
    }
}

fn db(name: &str) -> MetadataObject {
    MetadataObject::new(MetaType::Database, name)
}

fn schema(name: &str) -> MetadataObject {
    MetadataObject::new(MetaType::Schema, name)
}

fn table(name: &str) -> MetadataObject {
    MetadataObject::new(MetaType::Table, name)
}

#[test]
fn test_database_table_path() {
    let expr = table_expression(vec![MetaType::Database, MetaType::Table]);
    let objects = vec![
        db("db1").with_children(vec![table("table1").all()]),
        db("db2").with_children(vec![table("table2").all(), table("table3").all()]),
    ];

    assert_eq!(
        compile_objects(&expr, &objects, true),
        "a_db1.table1_b,a_db2.table2_b,a_db2.table3_b"
    );
}

#[test]
fn test_exactly_mode_skips_partial_selection() {
    let expr = table_expression(vec![MetaType::Database]);
    let objects = vec![db("db1"), db("db4").all()];

    assert_eq!(compile_objects(&expr, &objects, true), "a_db4_b");
}

#[test]
fn test_exactly_mode_skips_partial_leaf_under_match() {
    let expr = table_expression(vec![MetaType::Database, MetaType::Table]);
    let objects = vec![db("db1").with_children(vec![table("t1"), table("t2").all()])];

    assert_eq!(compile_objects(&expr, &objects, true), "a_db1.t2_b");
}

#[test]
fn test_involved_mode_emits_every_match() {
    let mut expr = table_expression(vec![MetaType::Database]);
    expr.select_mode = SelectMode::Involved;
    let objects = vec![
        db("db1").with_children(vec![table("t1")]),
        db("db4").all(),
    ];

    assert_eq!(compile_objects(&expr, &objects, true), "a_db1_b,a_db4_b");
}

#[test]
fn test_mapping_name_used_on_sink_side() {
    let expr = table_expression(vec![MetaType::Database, MetaType::Table]);
    let objects = vec![db("db1")
        .mapped_to("db1_copy")
        .with_children(vec![table("orders").mapped_to("orders_copy").all()])];

    assert_eq!(compile_objects(&expr, &objects, true), "a_db1.orders_b");
    assert_eq!(
        compile_objects(&expr, &objects, false),
        "a_db1_copy.orders_copy_b"
    );
}

#[test]
fn test_unrequired_levels_are_skipped() {
    let expr = table_expression(vec![MetaType::Database, MetaType::Table]);
    let objects = vec![db("db1").with_children(vec![schema("public")
        .with_children(vec![table("t1").all(), table("t2").all()])])];

    assert_eq!(compile_objects(&expr, &objects, true), "a_db1.t1_b,a_db1.t2_b");
}

#[test]
fn test_schema_level_included_when_required() {
    let expr = table_expression(vec![MetaType::Database, MetaType::Schema, MetaType::Table]);
    let objects = vec![db("db1").with_children(vec![schema("public")
        .with_children(vec![table("t1").all()])])];

    assert_eq!(compile_objects(&expr, &objects, true), "a_db1.public.t1_b");
}

#[test]
fn test_dead_end_branch_contributes_nothing() {
    let expr = table_expression(vec![MetaType::Database, MetaType::Table]);
    let objects = vec![db("db1").all(), db("db2").with_children(vec![table("t").all()])];

    assert_eq!(compile_objects(&expr, &objects, true), "a_db2.t_b");
}

#[test]
fn test_empty_expression_or_objects_yield_empty() {
    let expr = table_expression(vec![MetaType::Database]);
    assert_eq!(compile_objects(&expr, &[], true), "");

    let unnamed = MetadataExpression {
        name: String::new(),
        ..table_expression(vec![MetaType::Database])
    };
    assert_eq!(compile_objects(&unnamed, &[db("db1").all()], true), "");

    let no_path = table_expression(Vec::new());
    assert_eq!(compile_objects(&no_path, &[db("db1").all()], true), "");
}

#[test]
fn test_unnamed_object_is_ignored() {
    let expr = table_expression(vec![MetaType::Database]);
    let objects = vec![db("").all(), db("db2").all()];

    assert_eq!(compile_objects(&expr, &objects, true), "a_db2_b");
}

#[test]
fn test_compile_is_deterministic() {
    let expr = table_expression(vec![MetaType::Database, MetaType::Table]);
    let objects = vec![db("db1").with_children(vec![table("t1").all(), table("t2").all()])];

    let first = compile_objects(&expr, &objects, true);
    let second = compile_objects(&expr, &objects, true);
    assert_eq!(first, second);
}

#[test]
fn test_compile_returns_path_when_node_is_unnamed() {
    let expr = table_expression(vec![MetaType::Table]);
    let path = vec!["db1".to_string()];

    assert_eq!(compile(&expr, &[MetaType::Table], &table(""), path, true), "db1");
}

#[test]
fn test_substitute_known_and_unknown_vars() {
    let vars = BTreeMap::from([
        ("CHANNEL_NAME".to_string(), "orders".to_string()),
        ("CHANNEL_TOPOLOGY_NAME".to_string(), "prod".to_string()),
    ]);

    assert_eq!(
        substitute("${CHANNEL_TOPOLOGY_NAME}_${ CHANNEL_NAME }_slot", &vars).unwrap(),
        "prod_orders_slot"
    );
    assert_eq!(substitute("${OTHER}-x", &vars).unwrap(), "${OTHER}-x");
    assert_eq!(substitute("plain", &vars).unwrap(), "plain");
    assert_eq!(substitute("cost: $5", &vars).unwrap(), "cost: $5");
}

#[test]
fn test_substitute_unterminated() {
    let vars = BTreeMap::new();
    assert_eq!(
        substitute("prefix_${CHANNEL_NAME", &vars),
        Err(ExpressionError::UnterminatedVariable(
            "prefix_${CHANNEL_NAME".to_string()
        ))
    );
}
