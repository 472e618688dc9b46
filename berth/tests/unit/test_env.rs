//! Environment blob parsing

use berth::deploy::env::prepare_environment_variables;

#[test]
fn test_absent_and_empty_blob() {
    assert!(prepare_environment_variables(None).is_empty());
    assert!(prepare_environment_variables(Some("")).is_empty());
}

#[test]
fn test_pairs_keep_order() {
    assert_eq!(
        prepare_environment_variables(Some("A=1\nB=2")),
        vec!["A=1".to_string(), "B=2".to_string()]
    );
}

#[test]
fn test_duplicate_key_resolves_to_last_value() {
    let env = prepare_environment_variables(Some("A=1\nB=2\nA=9"));
    assert_eq!(env, vec!["A=9".to_string(), "B=2".to_string()]);
}

#[test]
fn test_windows_line_endings() {
    assert_eq!(
        prepare_environment_variables(Some("A=1\r\nB=two words\r\n")),
        vec!["A=1".to_string(), "B=two words".to_string()]
    );
}
