use std::collections::BTreeMap;

use uq_collate::{
    load_csv, read_csv, save_csv, table_digest, to_csv_bytes, CollationBuilder, ColumnKey,
    DecodedOutput, RunOutcome,
};
use uq_core::{Lineage, RunDescriptor, RunId, RunStatus, Value};

fn descriptor(id: u64, lineage: Lineage) -> RunDescriptor {
    RunDescriptor {
        run_id: RunId::from_raw(id),
        app: "cooling".to_string(),
        sampler: "mcmc".to_string(),
        params: BTreeMap::from([
            ("kappa".to_string(), Value::Float(0.025 * id as f64)),
            ("label".to_string(), Value::Text(format!("point, \"{id}\"\n"))),
        ]),
        lineage,
    }
}

fn sample_builder() -> CollationBuilder {
    let builder = CollationBuilder::new("cooling");
    builder
        .add_run(
            &descriptor(0, Lineage::chain("A", 0)),
            RunOutcome::Completed(
                DecodedOutput::new()
                    .with_scalar("te", 21.5)
                    .with_scalar("converged", true)
                    .with_scalar("steps", 120i64)
                    .with_values("profile", vec![Value::Float(1.0), Value::Float(1e-12)]),
            ),
        )
        .unwrap();
    builder
        .add_run(
            &descriptor(1, Lineage::chain("A", 4)),
            RunOutcome::failed("solver diverged"),
        )
        .unwrap();
    builder
        .add_run(
            &descriptor(2, Lineage::level(2).with_replica(1)),
            RunOutcome::Completed(
                DecodedOutput::new()
                    .with_scalar("te", 5.0)
                    .with_scalar("note", "42"),
            ),
        )
        .unwrap();
    builder.mark_ignored(RunId::from_raw(2)).unwrap();
    builder
}

#[test]
fn csv_roundtrip_reproduces_every_cell() {
    let table = sample_builder().snapshot();
    let temp = tempfile::tempdir().expect("tmp dir");
    let path = temp.path().join("tables").join("cooling.csv");
    save_csv(&table, &path).expect("save");
    let loaded = load_csv(&path).expect("load");

    assert_eq!(loaded, table);
    for column in table.columns() {
        for row in table.rows() {
            assert_eq!(
                loaded.cell(row.run_id, &column),
                row.cell(&column),
                "{} {}",
                row.run_id,
                column.key
            );
        }
    }

    let failed = loaded.row(RunId::from_raw(1)).unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert_eq!(failed.qoi(&ColumnKey::scalar("te")), None);
    assert_eq!(failed.failure.as_deref(), Some("solver diverged"));
    assert_eq!(
        loaded.row(RunId::from_raw(2)).unwrap().qoi(&ColumnKey::scalar("note")),
        Some(&Value::Text("42".into()))
    );
    assert_eq!(table_digest(&loaded).unwrap(), table_digest(&table).unwrap());
}

#[test]
fn reloaded_tables_resume_collation() {
    let table = sample_builder().snapshot();
    let bytes = to_csv_bytes(&table).unwrap();
    let builder = CollationBuilder::from_table(read_csv(bytes.as_slice()).unwrap());
    builder
        .add_run(
            &descriptor(3, Lineage::chain("B", 0)),
            RunOutcome::Completed(DecodedOutput::new().with_scalar("te", 7.25)),
        )
        .unwrap();
    let err = builder
        .add_run(
            &descriptor(4, Lineage::chain("B", 2)),
            RunOutcome::Completed(DecodedOutput::new().with_scalar("te", false)),
        )
        .unwrap_err();
    assert_eq!(err.code(), "schema-mismatch");
    assert_eq!(builder.len(), 5);
}

#[test]
fn headers_carry_both_column_levels() {
    let table = sample_builder().snapshot();
    let text = String::from_utf8(to_csv_bytes(&table).unwrap()).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("# app=cooling"));
    let names = lines.next().unwrap();
    assert!(names.starts_with("run_id,app,sampler,status,chain_id,iteration"));
    assert!(names.contains("profile,profile"));
    let indices = lines.next().unwrap();
    assert!(indices.contains(",0,1,"));
    let partitions = lines.next().unwrap();
    assert!(partitions.starts_with("meta,"));
    assert!(partitions.ends_with("qoi"));
}

#[test]
fn malformed_tables_are_rejected() {
    let err = read_csv("run_id\n0\nmeta\n".as_bytes()).unwrap_err();
    assert_eq!(err.code(), "csv-format");

    let err = read_csv("# app=x\nrun_id\n0\nmeta\n".as_bytes()).unwrap_err();
    assert_eq!(err.code(), "csv-format");
}
