//! Normalizer tests over definition folders

use std::fs;
use std::path::Path;

use pbip_tmdl::TmdlError;
use pbip_tmdl::normalize::Normalizer;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, text: &str) -> std::path::PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_converts_nested_folders_and_ignores_other_files() {
    let temp = TempDir::new().unwrap();
    let orders = write(
        temp.path(),
        "definition/tables/Orders.tmdl",
        "table Orders\n\n  column Region = { dataType: string }\n",
    );
    let people = write(
        temp.path(),
        "definition/tables/People.tmdl",
        "table People\n\n  column Person\n    dataType: string\n",
    );
    let layout = write(temp.path(), "diagramLayout.json", "{ \"version\": \"1.1.0\" }");

    let report = Normalizer::new(temp.path()).run().unwrap();
    assert_eq!(report.files_scanned, 2);
    assert_eq!(report.files_changed, vec![orders.clone()]);
    assert_eq!(report.changes, 1);

    assert_eq!(
        fs::read_to_string(&orders).unwrap(),
        "table Orders\n\n  column Region:\n    dataType: string\n"
    );
    assert_eq!(
        fs::read_to_string(&people).unwrap(),
        "table People\n\n  column Person\n    dataType: string\n"
    );
    assert_eq!(
        fs::read_to_string(&layout).unwrap(),
        "{ \"version\": \"1.1.0\" }"
    );
}

#[test]
fn test_second_run_changes_nothing() {
    let temp = TempDir::new().unwrap();
    let path = write(
        temp.path(),
        "tables/Returned.tmdl",
        "table Returned {\n    column Returned = {\n        dataType: string\n    }\n}\n",
    );

    let first = Normalizer::new(temp.path()).run().unwrap();
    assert!(!first.is_noop());
    let once = fs::read_to_string(&path).unwrap();
    assert!(!once.contains('{'));

    let second = Normalizer::new(temp.path()).run().unwrap();
    assert!(second.is_noop());
    assert_eq!(fs::read_to_string(&path).unwrap(), once);
}

#[test]
fn test_error_stops_before_later_files() {
    let temp = TempDir::new().unwrap();
    let broken = "table A\n\n  column X = {\n    dataType: string\n";
    let a = write(temp.path(), "tables/A.tmdl", broken);
    let b = write(temp.path(), "tables/B.tmdl", "column Y = { type: string }\n");

    let err = Normalizer::new(temp.path()).run().unwrap_err();
    assert!(matches!(err, TmdlError::MalformedBlock { ref path, .. } if path == &a));
    assert_eq!(fs::read_to_string(&a).unwrap(), broken);
    assert_eq!(
        fs::read_to_string(&b).unwrap(),
        "column Y = { type: string }\n"
    );
}

#[test]
fn test_missing_root_is_not_found() {
    let temp = TempDir::new().unwrap();
    let err = Normalizer::new(temp.path().join("missing")).run().unwrap_err();
    assert!(matches!(err, TmdlError::FileNotFound(_)));
}

#[test]
fn test_surplus_close_brace_leaves_file_untouched() {
    let temp = TempDir::new().unwrap();
    let text = "table T\n  column A = {\n    x = {1, 2}}\n    dataType: string\n  }\n";
    let path = write(temp.path(), "tables/T.tmdl", text);

    let err = Normalizer::new(temp.path()).run().unwrap_err();
    assert!(matches!(err, TmdlError::MalformedBlock { line: 3, .. }));
    assert_eq!(fs::read_to_string(&path).unwrap(), text);
}

#[test]
fn test_unbalanced_brace_mid_block_leaves_file_untouched() {
    let temp = TempDir::new().unwrap();
    let text = "table T {\n  column A = {\n    x = {1, 2\n    dataType: string\n  }\n}\n";
    let path = write(temp.path(), "tables/T.tmdl", text);

    let err = Normalizer::new(temp.path()).run().unwrap_err();
    assert!(matches!(err, TmdlError::MalformedBlock { .. }));
    assert_eq!(fs::read_to_string(&path).unwrap(), text);
}

#[cfg(unix)]
#[test]
fn test_rewrite_keeps_file_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let path = write(temp.path(), "tables/P.tmdl", "column P = { type: string }\n");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

    let report = Normalizer::new(temp.path()).run().unwrap();
    assert!(!report.is_noop());
    let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o644);
}
