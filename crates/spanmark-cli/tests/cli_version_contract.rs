#[test]
fn spanmark_version_contract() {
    let bin = assert_cmd::cargo::cargo_bin!("spanmark");
    let out = std::process::Command::new(bin)
        .args(["version"])
        .env_remove("SPANMARK_ENV_FILE")
        .output()
        .expect("run spanmark version");

    assert!(out.status.success(), "spanmark version failed");
    let s = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse version json");

    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["name"].as_str(), Some("spanmark"));
    assert!(!v["version"].as_str().unwrap_or("").is_empty());
}

#[test]
fn spanmark_version_text() {
    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("spanmark"))
        .args(["version", "--output", "text"])
        .assert()
        .success()
        .stdout(predicates::str::starts_with("spanmark "));
}
