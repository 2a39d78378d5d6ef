//! Layer layout of the root Dockerfile.

const DOCKERFILE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../Dockerfile"));

fn position(needle: &str) -> usize {
    DOCKERFILE
        .find(needle)
        .unwrap_or_else(|| panic!("Dockerfile is missing `{needle}`"))
}

#[test]
fn test_dependencies_build_before_sources_are_copied() {
    let dependency_build = position("cargo build --release --locked");
    let first_source_copy = position("COPY roundup-shared/src");

    assert!(dependency_build < first_source_copy);
    assert!(!DOCKERFILE[..dependency_build].contains("COPY roundup/src"));
    assert!(!DOCKERFILE[..dependency_build].contains("COPY roundup-shared roundup-shared"));
}

#[test]
fn test_lock_is_optional_but_builds_are_frozen() {
    assert!(DOCKERFILE.contains("COPY Cargo.toml Cargo.loc[k] ./"));
    for line in DOCKERFILE.lines().filter(|l| l.contains("cargo build")) {
        assert!(line.contains("--locked"), "unfrozen build: {line}");
    }
}

#[test]
fn test_final_stage_launch_contract() {
    let final_stage = &DOCKERFILE[DOCKERFILE.rfind("FROM ").unwrap()..];

    assert!(final_stage.contains("EXPOSE 5477"));
    assert!(final_stage.contains(r#"CMD ["roundup", "--host", "0.0.0.0", "--port", "5477"]"#));
    assert!(final_stage.contains("COPY --from=builder /opt/roundup/env /opt/roundup/env"));
    assert!(!final_stage.contains("cargo"));
}
