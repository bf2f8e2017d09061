//! `ScriptResult` construction and accessor tests.

use codecrucible::container::ScriptResult;

#[test]
fn script_result_preserves_exit_code_and_streams() {
    let result = ScriptResult {
        exit_code: 0,
        stdout: b"hello".to_vec(),
        stderr: Vec::new(),
    };
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, b"hello");
    assert!(result.stderr.is_empty());
}

#[test]
fn nonzero_exit_code_is_distinguishable() {
    let result = ScriptResult {
        exit_code: 127,
        stdout: Vec::new(),
        stderr: b"command not found".to_vec(),
    };
    assert_ne!(result.exit_code, 0);
}
