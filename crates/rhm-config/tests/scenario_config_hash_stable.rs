//! The config hash identifies the effective configuration, not its spelling.

use rhm_config::load_layered_yaml_from_strings;

const BASE: &str = r#"
server:
  addr: "127.0.0.1:8899"
database:
  url_env: "RHM_DATABASE_URL"
  max_connections: 5
lease:
  deposit_months: 1
  default_penalty:
    kind: deposit
"#;

const BASE_REORDERED: &str = r#"
lease:
  default_penalty:
    kind: deposit
  deposit_months: 1
database:
  max_connections: 5
  url_env: "RHM_DATABASE_URL"
server:
  addr: "127.0.0.1:8899"
"#;

const PROD_OVERLAY: &str = r#"
server:
  addr: "0.0.0.0:8899"
database:
  max_connections: 20
"#;

#[test]
fn same_input_same_hash() {
    let a = load_layered_yaml_from_strings(&[BASE]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.config_hash.len(), 64);
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_REORDERED]).unwrap();
    assert_eq!(a.canonical_json, b.canonical_json);
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_changes_hash_and_takes_effect() {
    let base = load_layered_yaml_from_strings(&[BASE]).unwrap();
    let prod = load_layered_yaml_from_strings(&[BASE, PROD_OVERLAY]).unwrap();
    assert_ne!(base.config_hash, prod.config_hash);

    let s = prod.settings().unwrap();
    assert_eq!(s.server.addr, "0.0.0.0:8899");
    assert_eq!(s.database.max_connections, 20);
    assert_eq!(s.database.url_env, "RHM_DATABASE_URL");
}

#[test]
fn layers_load_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let prod = dir.path().join("prod.yaml");
    std::fs::write(&base, BASE).unwrap();
    std::fs::write(&prod, PROD_OVERLAY).unwrap();

    let from_files = rhm_config::load_layered_yaml(&[
        base.to_str().unwrap(),
        prod.to_str().unwrap(),
    ])
    .unwrap();
    let from_strings = load_layered_yaml_from_strings(&[BASE, PROD_OVERLAY]).unwrap();
    assert_eq!(from_files.config_hash, from_strings.config_hash);
}

#[test]
fn missing_layer_names_the_path() {
    let err = rhm_config::load_layered_yaml(&["/nonexistent/rhm.yaml"]).unwrap_err();
    assert!(format!("{err:#}").contains("/nonexistent/rhm.yaml"));
}
