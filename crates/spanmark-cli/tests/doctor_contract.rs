#[test]
fn spanmark_doctor_reports_missing_tools_without_failing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let table = tmp.path().join("emoji-table.def");
    std::fs::write(&table, "\\__emoji_def:nnnnn {^^^^^^01f600} {grinning} {} {} {}\n")
        .expect("write table");

    let bin = assert_cmd::cargo::cargo_bin!("spanmark");
    let out = std::process::Command::new(bin)
        .args(["doctor"])
        // No pandoc/lualatex/kpsewhich reachable: the contract must hold on bare machines.
        .env("PATH", tmp.path())
        .env("SPANMARK_EMOJI_TABLE", &table)
        .env("SPANMARK_PANDOC", "off")
        .env_remove("SPANMARK_ENV_FILE")
        .output()
        .expect("run spanmark doctor");

    assert!(out.status.success(), "spanmark doctor failed");
    let v: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("parse doctor json");

    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["name"].as_str(), Some("spanmark"));
    assert!(v.get("elapsed_ms").is_some());
    assert!(v["converter"].is_null());
    assert_eq!(v["config"]["pandoc_mode"].as_str(), Some("off"));
    assert_eq!(v["config"]["numbering"].as_str(), Some("detect"));
    assert!(v["config"]["pandoc_timeout"].is_u64());

    let tools = v["tools"].as_array().expect("tools array");
    for name in ["pandoc", "lualatex", "kpsewhich"] {
        let t = tools
            .iter()
            .find(|t| t["name"].as_str() == Some(name))
            .unwrap_or_else(|| panic!("{name} entry"));
        assert_eq!(t["ok"].as_bool(), Some(false));
        assert!(t["path"].is_null());
    }
}
