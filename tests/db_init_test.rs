use mnemo::db;

#[test]
fn open_database_creates_schema_and_loads_vec() {
    let dir = tempfile::tempdir().unwrap();
    let conn = db::open_database(dir.path().join("memory.db")).unwrap();

    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table'")
        .unwrap();
    let tables: Vec<String> = stmt
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(tables.contains(&"collections".to_string()));
    assert!(tables.contains(&"sync_pending".to_string()));
    assert!(tables.contains(&"surface_state".to_string()));
    assert!(tables.contains(&"schema_meta".to_string()));

    let version: String = conn
        .query_row("SELECT vec_version()", [], |r| r.get(0))
        .unwrap();
    assert!(!version.is_empty());
}

#[test]
fn migrations_record_schema_version_and_model() {
    let dir = tempfile::tempdir().unwrap();
    let conn = db::open_database(dir.path().join("memory.db")).unwrap();

    let version = db::migrations::get_schema_version(&conn).unwrap();
    assert_eq!(version, db::migrations::CURRENT_SCHEMA_VERSION);
    assert_eq!(
        db::migrations::get_embedding_model(&conn).unwrap().as_deref(),
        Some("all-MiniLM-L6-v2")
    );
}

#[test]
fn reopening_an_existing_database_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.db");
    drop(db::open_database(&path).unwrap());
    // Second open must not fail or re-run migrations destructively.
    let conn = db::open_database(&path).unwrap();
    assert_eq!(
        db::migrations::get_schema_version(&conn).unwrap(),
        db::migrations::CURRENT_SCHEMA_VERSION
    );
}
