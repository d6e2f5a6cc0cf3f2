mod support;

use support::{dry_session, open};

use loam::{vars, Record, Value};

#[derive(Record, Default, Debug)]
struct User {
    id: u64,
    name: String,
    age: i64,
}

#[test]
fn find_renders_select_star() {
    let (db, _state) = open();

    let mut users: Vec<User> = Vec::new();
    let execution = dry_session(&db)
        .where_("age > ?", vars![18])
        .find(&mut users)
        .unwrap();

    assert_eq!(
        execution.sql,
        "SELECT * FROM \"users\" WHERE age > $1"
    );
    assert_eq!(execution.vars, vec![Value::Int(18)]);
}

#[test]
fn where_or_not_group_and_negate() {
    let (db, _state) = open();

    let mut users: Vec<User> = Vec::new();
    let execution = dry_session(&db)
        .model::<User>()
        .where_("age > ?", vars![18])
        .or_("role = ?", vars!["admin"])
        .not("deleted = ?", vars![true])
        .find(&mut users)
        .unwrap();

    assert_eq!(
        execution.sql,
        "SELECT * FROM \"users\" WHERE ((age > $1) OR role = $2) AND NOT (deleted = $3)"
    );
    assert_eq!(
        execution.vars,
        vec![Value::Int(18), Value::from("admin"), Value::Bool(true)]
    );
}

#[test]
fn placeholder_count_matches_bound_variables() {
    let (db, _state) = open();

    let mut users: Vec<User> = Vec::new();
    let execution = dry_session(&db)
        .where_("age > ?", vars![18])
        .or_("role = ?", vars!["admin"])
        .not("deleted = ?", vars![true])
        .limit(10)
        .find(&mut users)
        .unwrap();

    let placeholders = execution.sql.matches('$').count();
    assert_eq!(placeholders, execution.vars.len());
}

#[test]
fn empty_list_binds_a_single_null() {
    let (db, _state) = open();

    let mut users: Vec<User> = Vec::new();
    let execution = dry_session(&db)
        .where_("id IN ?", vars![Vec::<i64>::new()])
        .find(&mut users)
        .unwrap();

    assert_eq!(
        execution.sql,
        "SELECT * FROM \"users\" WHERE id IN ($1)"
    );
    assert_eq!(execution.vars, vec![Value::Null]);
}

#[test]
fn non_empty_list_expands_per_element() {
    let (db, _state) = open();

    let mut users: Vec<User> = Vec::new();
    let execution = dry_session(&db)
        .where_("id IN ?", vars![vec![1i64, 2, 3]])
        .find(&mut users)
        .unwrap();

    assert_eq!(
        execution.sql,
        "SELECT * FROM \"users\" WHERE id IN ($1,$2,$3)"
    );
    assert_eq!(execution.vars.len(), 3);
}

#[test]
fn bare_column_with_argument_becomes_equality() {
    let (db, _state) = open();

    let mut users: Vec<User> = Vec::new();
    let execution = dry_session(&db)
        .where_("name", vars!["a"])
        .find(&mut users)
        .unwrap();

    assert_eq!(
        execution.sql,
        "SELECT * FROM \"users\" WHERE \"name\" = $1"
    );
}

#[test]
fn numeric_string_means_primary_key() {
    let (db, _state) = open();

    let mut users: Vec<User> = Vec::new();
    let execution = dry_session(&db)
        .model::<User>()
        .where_("42", vars![])
        .find(&mut users)
        .unwrap();

    assert_eq!(
        execution.sql,
        "SELECT * FROM \"users\" WHERE \"users\".\"id\" = $1"
    );
    assert_eq!(execution.vars, vec![Value::from("42")]);
}

#[test]
fn where_map_turns_lists_into_in_groups() {
    let (db, _state) = open();

    let mut conds = loam::Map::new();
    conds.insert("name".to_owned(), Value::from("a"));
    conds.insert("id".to_owned(), Value::from(vec![1i64, 2]));

    let mut users: Vec<User> = Vec::new();
    let execution = dry_session(&db).where_map(conds).find(&mut users).unwrap();

    assert_eq!(
        execution.sql,
        "SELECT * FROM \"users\" WHERE \"id\" IN ($1,$2) AND \"name\" = $3"
    );
}

#[test]
fn where_record_uses_non_zero_fields() {
    let (db, _state) = open();

    let probe = User {
        name: "a".to_owned(),
        ..Default::default()
    };
    let mut users: Vec<User> = Vec::new();
    let execution = dry_session(&db)
        .where_record(&probe)
        .find(&mut users)
        .unwrap();

    assert_eq!(
        execution.sql,
        "SELECT * FROM \"users\" WHERE \"users\".\"name\" = $1"
    );
}

#[test]
fn select_group_order_limit_compose() {
    let (db, _state) = open();

    let mut users: Vec<User> = Vec::new();
    let execution = dry_session(&db)
        .model::<User>()
        .select(["name"])
        .group("name")
        .having("count(id) > ?", vars![1])
        .order("age DESC")
        .limit(5)
        .offset(10)
        .find(&mut users)
        .unwrap();

    assert_eq!(
        execution.sql,
        "SELECT \"name\" FROM \"users\" GROUP BY \"name\" HAVING count(id) > $1 ORDER BY age DESC LIMIT $2 OFFSET $3"
    );
    assert_eq!(
        execution.vars,
        vec![Value::Int(1), Value::Int(5), Value::Int(10)]
    );
}

#[test]
fn joins_append_raw_fragments_to_from() {
    let (db, _state) = open();

    let mut users: Vec<User> = Vec::new();
    let execution = dry_session(&db)
        .joins("LEFT JOIN pets ON pets.user_id = users.id AND pets.kind = ?", vars!["dog"])
        .where_("age > ?", vars![18])
        .find(&mut users)
        .unwrap();

    assert_eq!(
        execution.sql,
        "SELECT * FROM \"users\" LEFT JOIN pets ON pets.user_id = users.id AND pets.kind = $1 WHERE age > $2"
    );
}

#[test]
fn explain_substitutes_bound_variables() {
    let (db, _state) = open();

    let mut users: Vec<User> = Vec::new();
    let execution = dry_session(&db)
        .where_("age > ?", vars![18])
        .find(&mut users)
        .unwrap();

    assert_eq!(
        db.explain(&execution),
        "SELECT * FROM \"users\" WHERE age > 18"
    );
}

#[test]
fn clause_builder_overrides_take_over_emission() {
    let (db, _state) = open();

    fn shouty_select(_clause: &loam::clause::Clause, stmt: &mut loam::Statement) {
        stmt.sql.push_str("SELECT /* traced */ *");
    }
    db.register_clause_builder("SELECT", shouty_select);

    let mut users: Vec<User> = Vec::new();
    let execution = dry_session(&db).find(&mut users).unwrap();

    assert_eq!(
        execution.sql,
        "SELECT /* traced */ * FROM \"users\""
    );
}

#[test]
fn distinct_prefixes_the_selection() {
    let (db, _state) = open();

    let mut users: Vec<User> = Vec::new();
    let execution = dry_session(&db)
        .distinct()
        .select(["name"])
        .find(&mut users)
        .unwrap();

    assert_eq!(execution.sql, "SELECT DISTINCT \"name\" FROM \"users\"");
}
