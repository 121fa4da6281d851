use uq_core::errors::{ErrorInfo, UqError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("run", "run_7")
        .with_context("column", "f")
}

#[test]
fn schema_mismatch_surface() {
    let err = UqError::SchemaMismatch(sample_info("schema-mismatch", "text vs numeric"));
    assert_eq!(err.code(), "schema-mismatch");
    assert!(err.info().context.contains_key("column"));
    assert!(err.is_row_level());
}

#[test]
fn decode_surface() {
    let err = UqError::Decode(sample_info("decode-missing-file", "output.csv not found"));
    assert_eq!(err.info().code, "decode-missing-file");
    assert!(err.is_row_level());
}

#[test]
fn analysis_errors_are_not_row_level() {
    let empty = UqError::EmptyChain(sample_info("empty-chain", "no iterations"));
    let missing = UqError::MissingParameter(sample_info("missing-parameter", "x1 absent"));
    assert!(!empty.is_row_level());
    assert!(!missing.is_row_level());
}

#[test]
fn display_includes_context_and_hint() {
    let err = UqError::Conflict(
        ErrorInfo::new("conflicting-run", "run reported twice with different output")
            .with_context("run", "run_3")
            .with_hint("re-decode the run directory"),
    );
    let rendered = err.to_string();
    assert!(rendered.starts_with("conflict: "));
    assert!(rendered.contains("run=run_3"));
    assert!(rendered.contains("hint: re-decode"));
}

#[test]
fn errors_serialize_with_family_tag() {
    let err = UqError::Sampling(ErrorInfo::new("grid-exhausted", "no refinement left"));
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["family"], "Sampling");
    assert_eq!(json["detail"]["code"], "grid-exhausted");
    let back: UqError = serde_json::from_value(json).unwrap();
    assert_eq!(back, err);
}
