mod common;

use common::{column, run_context, temp_store};
use runlog::{Context, Predicate, PredicateMap};
use serde_json::json;

#[test]
fn test_get_chaining_equals_combined_get() {
    let (_dir, store) = temp_store();
    for (a, b) in [("x", "p"), ("x", "q"), ("y", "p")] {
        let run = store
            .init(Context::new().with("a", a).with("b", b).with("run_id", format!("{a}-{b}")))
            .unwrap();
        run.log(json!({"v": format!("{a}{b}")})).unwrap();
    }

    let root = store.view().unwrap();
    let chained = root
        .get(Context::new().with("a", "x"))
        .unwrap()
        .get(Context::new().with("b", "p"))
        .unwrap();
    let combined = root
        .get(Context::new().with("a", "x").with("b", "p"))
        .unwrap();

    let mut chained_rows = column(&chained.rows(), "v");
    let mut combined_rows = column(&combined.rows(), "v");
    chained_rows.sort_by_key(|v| v.to_string());
    combined_rows.sort_by_key(|v| v.to_string());
    assert_eq!(chained_rows, combined_rows);
    assert_eq!(chained_rows, vec![json!("xp")]);
}

#[test]
fn test_filter_never_mutates_parent() {
    let (_dir, store) = temp_store();
    let run = store.init(run_context("a")).unwrap();
    run.log(json!({"v": 1})).unwrap();
    let other = store.init(run_context("b")).unwrap();
    other.log(json!({"v": 2})).unwrap();

    let parent = store.view().unwrap();
    let before = parent.rows();

    let child = parent.get(run_context("a")).unwrap();
    assert_eq!(child.rows().len(), 1);

    assert_eq!(parent.rows(), before);
    assert_eq!(parent.rows().len(), 2);
    assert!(parent.context().is_empty());
}

#[test]
fn test_row_level_predicate_applies_per_row() {
    let (_dir, store) = temp_store();
    let run = store.init(run_context("r")).unwrap();
    run.log(json!({"step": 1, "loss": 10})).unwrap();
    run.log(json!({"step": 2, "loss": 20})).unwrap();

    // `step` is not a context field, so the predicate defers to rows
    let filtered = store
        .view()
        .unwrap()
        .filter(PredicateMap::new().with("step", Predicate::equals(2)))
        .unwrap();
    assert_eq!(column(&filtered.rows(), "loss"), vec![json!(20)]);
}

#[test]
fn test_fn_predicate_and_failure_rejection() {
    let (_dir, store) = temp_store();
    let run = store.init(run_context("r")).unwrap();
    run.log(json!({"loss": 10})).unwrap();
    run.log(json!({"loss": 20})).unwrap();

    let low = store
        .view()
        .unwrap()
        .filter(PredicateMap::new().with(
            "loss",
            Predicate::test(|v| Ok(v.as_i64().is_some_and(|n| n < 15))),
        ))
        .unwrap();
    assert_eq!(column(&low.rows(), "loss"), vec![json!(10)]);

    // a predicate that errors rejects the row instead of propagating
    let broken = store
        .view()
        .unwrap()
        .filter(PredicateMap::new().with(
            "loss",
            Predicate::test(|_| {
                Err(runlog::Error::ArtifactNotStored { hash: "x".into() })
            }),
        ))
        .unwrap();
    assert!(broken.rows().is_empty());
}

#[test]
fn test_live_fanout_reaches_preexisting_views() {
    let (_dir, store) = temp_store();
    let watcher = store.get(Context::new().with("phase", "train")).unwrap();
    assert!(watcher.rows().is_empty());

    // a run created after the watcher
    let run = store
        .init(Context::new().with("run_id", "r1").with("phase", "train"))
        .unwrap();
    run.log(json!({"loss": 1.0})).unwrap();

    let rows = watcher.rows();
    assert_eq!(column(&rows, "loss"), vec![json!(1.0)]);
}

#[test]
fn test_fanout_respects_predicates() {
    let (_dir, store) = temp_store();
    let watcher = store.get(Context::new().with("phase", "eval")).unwrap();

    let run = store
        .init(Context::new().with("run_id", "r1").with("phase", "train"))
        .unwrap();
    run.log(json!({"loss": 1.0})).unwrap();

    assert!(watcher.rows().is_empty());
}

#[test]
fn test_closed_view_stops_observing() {
    let (_dir, store) = temp_store();
    let watcher = store.view().unwrap();
    watcher.close();

    let run = store.init(run_context("r")).unwrap();
    run.log(json!({"loss": 1.0})).unwrap();

    assert!(watcher.rows().is_empty());
}

#[test]
fn test_filter_with_context_overrides_changes_write_target() {
    let (_dir, store) = temp_store();
    let run = store.init(run_context("base")).unwrap();
    run.log(json!({"v": 1})).unwrap();

    let forked = run
        .filter_with(
            PredicateMap::new(),
            Context::new().with("run_id", "forked"),
        )
        .unwrap();
    forked.log(json!({"v": 2})).unwrap();

    // the fork logs under its own context; the base run is untouched
    let base_rows = store.get(run_context("base")).unwrap().rows();
    assert_eq!(column(&base_rows, "v"), vec![json!(1)]);
    let fork_rows = store.get(run_context("forked")).unwrap().rows();
    assert_eq!(column(&fork_rows, "v"), vec![json!(2)]);
}

#[test]
fn test_init_is_scoped_to_its_own_run() {
    let (_dir, store) = temp_store();
    let first = store.init(Context::new().with("lr", 0.1)).unwrap();
    first.log(json!({"loss": 1.0})).unwrap();

    // same fields, fresh run id: a fresh run starts empty
    let second = store.init(Context::new().with("lr", 0.1)).unwrap();
    assert!(second.rows().is_empty());

    // but a get over the shared field sees both runs
    let both = store.get(Context::new().with("lr", 0.1)).unwrap();
    second.log(json!({"loss": 2.0})).unwrap();
    assert_eq!(both.rows().len(), 2);
}
