mod common;

use common::{run_context, temp_store};
use runlog::{LatestQuery, Payload, Record, Table, content_hash};
use serde_json::json;
use std::fs;

#[test]
fn test_same_bytes_different_paths_store_one_copy() {
    let (dir, store) = temp_store();
    let a = dir.path().join("first.bin");
    let b = dir.path().join("second_dir");
    fs::create_dir(&b).unwrap();
    let b = b.join("first.bin");
    fs::write(&a, b"identical payload").unwrap();
    fs::write(&b, b"identical payload").unwrap();

    let run = store.init(run_context("files")).unwrap();
    let row_a = run
        .log(Record::new().field("model", Payload::file(&a)))
        .unwrap();
    let row_b = run
        .log(Record::new().field("model", Payload::file(&b)))
        .unwrap();

    let hash_a = row_a["model"]["hash"].as_str().unwrap();
    let hash_b = row_b["model"]["hash"].as_str().unwrap();
    assert_eq!(hash_a, hash_b);

    // exactly one copy under that hash's directory
    let hash_dir = dir.path().join("artifacts").join(hash_a);
    let entries: Vec<_> = fs::read_dir(&hash_dir).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_file_read_back_through_latest() {
    let (dir, store) = temp_store();
    let src = dir.path().join("image.png");
    fs::write(&src, b"not really a png").unwrap();

    let run = store.init(run_context("files")).unwrap();
    run.log(Record::new().field("image", Payload::file(&src)))
        .unwrap();

    let resolved = run.latest_value("image");
    let handle = resolved.as_file().expect("marker should rehydrate");
    assert!(handle.path().exists());
    assert_eq!(content_hash(&handle.read().unwrap()), handle.hash());
    assert_eq!(handle.filename(), "image.png");
}

#[test]
fn test_table_roundtrip_through_latest() {
    let (_dir, store) = temp_store();
    let mut table = Table::new(["col1", "col2"]);
    table.add_row([json!(1), json!(3)]);
    table.add_row([json!(2), json!(4)]);

    let run = store.init(run_context("tables")).unwrap();
    run.log(Record::new().field("df", table.clone())).unwrap();

    let resolved = run.latest_value("df");
    let handle = resolved.as_table().expect("marker should rehydrate");
    assert_eq!(handle.as_table().unwrap(), table);
}

#[test]
fn test_table_stored_once_per_content() {
    let (dir, store) = temp_store();
    let mut table = Table::new(["x"]);
    table.add_row([json!(1)]);

    let run = store.init(run_context("tables")).unwrap();
    let first = run.log(Record::new().field("t", table.clone())).unwrap();
    let second = run.log(Record::new().field("t", table)).unwrap();
    assert_eq!(first["t"]["hash"], second["t"]["hash"]);

    let hash = first["t"]["hash"].as_str().unwrap();
    let path = dir.path().join("artifacts").join(hash).join("table.csv");
    assert!(path.exists());
}

#[test]
fn test_tables_grouped_by_step() {
    let (_dir, store) = temp_store();
    let run = store.init(run_context("tables")).unwrap();

    let mut t1 = Table::new(["text"]);
    t1.add_row([json!("dummy text")]);
    let mut t2 = Table::new(["text"]);
    t2.add_row([json!("updated text")]);

    run.log(json!({"step": 1})).unwrap();
    run.log(Record::new().field("dummy_table", t1)).unwrap();
    run.log(json!({"step": 2})).unwrap();
    run.log(Record::new().field("dummy_table", t2)).unwrap();

    let result = run
        .latest(&LatestQuery::field("dummy_table").index("step"))
        .into_table()
        .unwrap();
    assert_eq!(result.len(), 2);
    // cells hold the raw markers; both steps carry a distinct table artifact
    let h1 = result.cell(0, "dummy_table").unwrap()["hash"].clone();
    let h2 = result.cell(1, "dummy_table").unwrap()["hash"].clone();
    assert_ne!(h1, h2);
}

#[test]
fn test_nested_file_values_become_markers_and_rehydrate() {
    let (dir, store) = temp_store();
    let src = dir.path().join("sample.txt");
    fs::write(&src, b"nested").unwrap();

    let run = store.init(run_context("nested")).unwrap();
    run.log(Record::new().field(
        "outputs",
        Payload::List(vec![Payload::file(&src), Payload::Json(json!("plain"))]),
    ))
    .unwrap();

    let resolved = run.latest_value("outputs");
    match resolved {
        runlog::Resolved::List(items) => {
            assert!(items[0].as_file().unwrap().path().exists());
            assert_eq!(*items[1].as_value().unwrap(), json!("plain"));
        }
        other => panic!("expected list, got {other:?}"),
    }
}

#[test]
fn test_marker_shape_on_disk() {
    let (dir, store) = temp_store();
    let src = dir.path().join("w.bin");
    fs::write(&src, b"bytes").unwrap();

    let run = store.init(run_context("shape")).unwrap();
    let row = run
        .log(Record::new().field("w", Payload::file(&src)))
        .unwrap();

    let marker = &row["w"];
    for key in ["src", "path", "hash", "filename", runlog::ARTIFACT_KIND_KEY] {
        assert!(marker.get(key).is_some(), "marker missing {key}");
    }
    let hash = marker["hash"].as_str().unwrap();
    assert_eq!(
        marker["path"].as_str().unwrap(),
        format!("artifacts/{hash}/w.bin")
    );
}

#[test]
fn test_user_map_that_looks_like_a_marker_stays_plain() {
    let (_dir, store) = temp_store();
    let run = store.init(run_context("shape")).unwrap();
    let decoy = json!({"path": "/etc/passwd", "hash": "abc", "filename": "x"});
    run.log(json!({ "decoy": decoy })).unwrap();

    let resolved = run.latest_value("decoy");
    assert!(resolved.as_file().is_none());
    assert_eq!(resolved, decoy);
}
