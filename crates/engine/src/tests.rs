use super::*;
use catalog::Column;
use executor::ast::{InsertStmt, WhereCondition};
use tempfile::tempdir;
use types::{SqlType, Value};

fn config_for(dir: &std::path::Path) -> Config {
    Config::builder()
        .data_dir(dir.to_path_buf())
        .page_size(storage::DEFAULT_PAGE_SIZE)
        .buffer_pool_pages(64)
        .build()
}

#[test]
fn open_creates_an_empty_database() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(config_for(dir.path())).unwrap();
    assert!(engine.executor.catalog().tables().next().is_none());
}

#[test]
fn create_table_and_insert_survive_a_reopen() {
    let dir = tempdir().unwrap();
    {
        let mut engine = Engine::open(config_for(dir.path())).unwrap();
        engine
            .create_table(
                "app",
                "users",
                vec![
                    Column::not_null("id", SqlType::Int),
                    Column::not_null("name", SqlType::Text),
                ],
                vec![0],
            )
            .unwrap();
        engine
            .insert(&InsertStmt {
                schema: "app".into(),
                table: "users".into(),
                values: vec![Value::Int(1), Value::String("alice".into())],
            })
            .unwrap();
        engine.shutdown().unwrap();
    }

    let mut engine = Engine::open(config_for(dir.path())).unwrap();
    let rows = engine
        .select("app", "users", &WhereCondition::PkEquals(vec![Value::Int(1)]))
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1[1], Value::String("alice".into()));
}

#[test]
fn checkpoint_then_recover_keeps_data_queryable() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(config_for(dir.path())).unwrap();
    engine
        .create_table(
            "app",
            "events",
            vec![Column::not_null("name", SqlType::Text)],
            vec![],
        )
        .unwrap();
    engine
        .insert(&InsertStmt {
            schema: "app".into(),
            table: "events".into(),
            values: vec![Value::String("login".into())],
        })
        .unwrap();
    engine.checkpoint().unwrap();
    engine.shutdown().unwrap();

    let mut engine = Engine::open(config_for(dir.path())).unwrap();
    let rows = engine.select("app", "events", &WhereCondition::None).unwrap();
    assert_eq!(rows.len(), 1);
}
