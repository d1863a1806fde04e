use std::fs;

use camino::Utf8PathBuf;

use unicef_indicators::catalog::CatalogKind;
use unicef_indicators::store::Store;

#[test]
fn default_root_is_under_cache_dir() {
    let store = Store::new().unwrap();
    assert!(store.root().ends_with("unicef-indicators/metadata"));
    assert!(store.history_path().starts_with(store.root()));
}

#[test]
fn vintage_copy_is_complete_and_replaces_target() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let store = Store::new_with_root(root);

    let current = store.current_dir();
    Store::write_json(
        &Store::catalog_path(&current, CatalogKind::Dataflows),
        &["CME", "PT"],
    )
    .unwrap();
    Store::write_bytes_atomic(&current.join("nested/notes.txt"), b"hello").unwrap();

    let target = store.vintage_dir("2026-01-02");
    fs::create_dir_all(target.join("stale").as_std_path()).unwrap();
    Store::copy_dir_atomic(&current, &target).unwrap();

    let copied: Option<Vec<String>> =
        Store::read_json(&Store::catalog_path(&target, CatalogKind::Dataflows)).unwrap();
    assert_eq!(copied.unwrap(), ["CME", "PT"]);
    assert_eq!(
        fs::read_to_string(target.join("nested/notes.txt").as_std_path()).unwrap(),
        "hello"
    );
    assert!(!target.join("stale").as_std_path().exists());
    assert_eq!(store.list_vintages().unwrap(), ["2026-01-02"]);
}

#[test]
fn atomic_write_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let path = root.join("current/sync_summary.json");

    Store::write_bytes_atomic(&path, b"{}").unwrap();
    assert!(path.as_std_path().exists());
    assert!(!path.with_extension("tmp").as_std_path().exists());
}
