
use predicates::prelude::*;
use serde_json::json;
use test_utils::*;

// ============================================================================
// Fresh install
// ============================================================================

#[test]
fn test_fresh_install_with_transitive_dependency() {
    let profile = TestProfile::with_channels(&[]);
    let channel = standard_channel(profile.temp_dir.path());
    let mut config = profile.read_config();
    config["config"]["channels"] = json!([channel.url()]);
    profile.write_config(&config);

    sc4pac_cmd(&profile.root)
        .arg("add")
        .arg("memo:essential-fixes")
        .assert()
        .success()
        .stdout(predicate::str::contains("Added memo:essential-fixes"));

    sc4pac_cmd(&profile.root)
        .args(["update", "-y"])
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("Update complete"));

    // Both the explicit package and its transitive dependency are on disk
    let fixes = profile
        .plugins_dir()
        .join("150-mods/memo.essential-fixes.1.0.0.sc4pac");
    let common = profile
        .plugins_dir()
        .join("075-dependencies/bsc.common.2.1.0.sc4pac");
    assert!(fixes.join("roads.dat").exists());
    assert!(
        !fixes.join("docs/readme.html").exists(),
        "excluded entries must not be extracted"
    );
    assert!(common.join("common.dat").exists());

    // The lockfile records both packages and every recorded path exists
    let lock = profile.read_lock();
    let installed = lock["installed"].as_array().unwrap();
    assert_eq!(installed.len(), 2);
    let names: Vec<String> = installed
        .iter()
        .map(|e| format!("{}:{}", e["group"].as_str().unwrap(), e["name"].as_str().unwrap()))
        .collect();
    assert!(names.contains(&"memo:essential-fixes".to_string()));
    assert!(names.contains(&"bsc:common".to_string()));
    for entry in installed {
        for file in entry["files"].as_array().unwrap() {
            assert!(
                profile.plugins_dir().join(file.as_str().unwrap()).exists(),
                "lockfile references a path that does not exist: {}",
                file
            );
        }
    }
}

#[test]
fn test_update_is_idempotent() {
    let profile = TestProfile::with_channels(&[]);
    let channel = standard_channel(profile.temp_dir.path());
    let mut config = profile.read_config();
    config["config"]["channels"] = json!([channel.url()]);
    profile.write_config(&config);

    sc4pac_cmd(&profile.root)
        .arg("add")
        .arg("memo:essential-fixes")
        .assert()
        .success();
    sc4pac_cmd(&profile.root)
        .args(["update", "-y"])
        .assert()
        .success();

    sc4pac_cmd(&profile.root)
        .args(["update", "-y"])
        .assert()
        .success()
        .stdout(predicate::str::contains("up-to-date"));
}

// ============================================================================
// Variants
// ============================================================================

fn variant_channel(dir: &std::path::Path) -> ChannelBuilder {
    let lhd = make_zip(&dir.join("archives/roads-lhd.zip"), &[("lhd.dat", b"lhd")]);
    let rhd = make_zip(&dir.join("archives/roads-rhd.zip"), &[("rhd.dat", b"rhd")]);

    let mut channel = ChannelBuilder::new(dir.join("channel"));
    channel.add_asset("roads-lhd", "1", &lhd);
    channel.add_asset("roads-rhd", "1", &rhd);
    channel.add_package(
        "memo",
        "roads",
        "2.0.0",
        json!({
            "group": "memo",
            "name": "roads",
            "version": "2.0.0",
            "subfolder": "150-mods",
            "info": { "summary": "Road mod" },
            "variants": [
                {
                    "variant": { "driveside": "left" },
                    "assets": [{ "assetId": "roads-lhd" }]
                },
                {
                    "variant": { "driveside": "right" },
                    "assets": [{ "assetId": "roads-rhd" }]
                }
            ]
        }),
    );
    channel.write_index();
    channel
}

#[test]
fn test_missing_variant_aborts_non_interactive_update() {
    let profile = TestProfile::with_channels(&[]);
    let channel = variant_channel(profile.temp_dir.path());
    let mut config = profile.read_config();
    config["config"]["channels"] = json!([channel.url()]);
    profile.write_config(&config);

    sc4pac_cmd(&profile.root)
        .arg("add")
        .arg("memo:roads")
        .assert()
        .success();

    sc4pac_cmd(&profile.root)
        .args(["update", "-y"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("driveside"))
        .stderr(predicate::str::contains("left"))
        .stderr(predicate::str::contains("right"));
}

#[test]
fn test_configured_variant_selects_realization() {
    let profile = TestProfile::with_channels(&[]);
    let channel = variant_channel(profile.temp_dir.path());
    let mut config = profile.read_config();
    config["config"]["channels"] = json!([channel.url()]);
    config["config"]["variant"] = json!({ "driveside": "right" });
    profile.write_config(&config);

    sc4pac_cmd(&profile.root)
        .arg("add")
        .arg("memo:roads")
        .assert()
        .success();
    sc4pac_cmd(&profile.root)
        .args(["update", "-y"])
        .assert()
        .success();

    let folder = profile
        .plugins_dir()
        .join("150-mods/memo.roads.right.2.0.0.sc4pac");
    assert!(folder.join("rhd.dat").exists());
    assert!(!folder.join("lhd.dat").exists());

    let lock = profile.read_lock();
    assert_eq!(lock["installed"][0]["variant"]["driveside"], "right");

    // Resetting the key removes it from the config so the next update asks again
    sc4pac_cmd(&profile.root)
        .args(["variant", "reset", "driveside"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reset 'driveside'"));
    let config = profile.read_config();
    assert!(config["config"]["variant"].get("driveside").is_none());
}

// ============================================================================
// Asset updates force reinstalls
// ============================================================================

#[test]
fn test_asset_bump_forces_reinstall() {
    let profile = TestProfile::with_channels(&[]);
    let dir = profile.temp_dir.path();
    let archive_v1 = make_zip(&dir.join("archives/pkg-a.zip"), &[("a.dat", b"v1")]);

    let mut channel = ChannelBuilder::new(dir.join("channel"));
    channel.add_asset("asset-x", "1", &archive_v1);
    channel.add_package(
        "memo",
        "pkg-a",
        "1.0.0",
        json!({
            "group": "memo",
            "name": "pkg-a",
            "version": "1.0.0",
            "subfolder": "150-mods",
            "info": { "summary": "Package A" },
            "variants": [{ "assets": [{ "assetId": "asset-x" }] }]
        }),
    );
    channel.write_index();

    let mut config = profile.read_config();
    config["config"]["channels"] = json!([channel.url()]);
    profile.write_config(&config);

    sc4pac_cmd(&profile.root).arg("add").arg("memo:pkg-a").assert().success();
    sc4pac_cmd(&profile.root).args(["update", "-y"]).assert().success();
    let lock = profile.read_lock();
    assert_eq!(lock["installed"][0]["assets"][0]["version"], "1");

    // Channel bumps asset-x to version 2 with new content
    let archive_v2 = make_zip(&dir.join("archives/pkg-a-v2.zip"), &[("a.dat", b"v2")]);
    let mut channel = ChannelBuilder::new(dir.join("channel"));
    channel.add_asset("asset-x", "2", &archive_v2);
    channel.add_package(
        "memo",
        "pkg-a",
        "1.0.0",
        json!({
            "group": "memo",
            "name": "pkg-a",
            "version": "1.0.0",
            "subfolder": "150-mods",
            "info": { "summary": "Package A" },
            "variants": [{ "assets": [{ "assetId": "asset-x" }] }]
        }),
    );
    channel.write_index();
    profile.clear_cache();

    sc4pac_cmd(&profile.root)
        .args(["update", "-y"])
        .assert()
        .success()
        .stdout(predicate::str::contains("reinstall"));

    let folder = profile.plugins_dir().join("150-mods/memo.pkg-a.1.0.0.sc4pac");
    assert_eq!(std::fs::read(folder.join("a.dat")).unwrap(), b"v2");
    let lock = profile.read_lock();
    assert_eq!(lock["installed"][0]["assets"][0]["version"], "2");
}

// ============================================================================
// Channel priority
// ============================================================================

#[test]
fn test_first_channel_wins_even_with_lower_version() {
    let profile = TestProfile::with_channels(&[]);
    let dir = profile.temp_dir.path();
    let zip_a = make_zip(&dir.join("archives/a.zip"), &[("a.dat", b"a")]);
    let zip_b = make_zip(&dir.join("archives/b.zip"), &[("b.dat", b"b")]);

    let mut first = ChannelBuilder::new(dir.join("first"));
    first.add_asset("xy-asset", "1", &zip_a);
    first.add_package(
        "x",
        "y",
        "1.0",
        json!({
            "group": "x", "name": "y", "version": "1.0",
            "subfolder": "150-mods",
            "info": { "summary": "from first channel" },
            "variants": [{ "assets": [{ "assetId": "xy-asset" }] }]
        }),
    );
    first.write_index();

    let mut second = ChannelBuilder::new(dir.join("second"));
    second.add_asset("xy-asset-b", "1", &zip_b);
    second.add_package(
        "x",
        "y",
        "1.1",
        json!({
            "group": "x", "name": "y", "version": "1.1",
            "subfolder": "150-mods",
            "info": { "summary": "from second channel" },
            "variants": [{ "assets": [{ "assetId": "xy-asset-b" }] }]
        }),
    );
    second.write_index();

    let mut config = profile.read_config();
    config["config"]["channels"] = json!([first.url(), second.url()]);
    profile.write_config(&config);

    sc4pac_cmd(&profile.root)
        .arg("info")
        .arg("x:y")
        .assert()
        .success()
        .stdout(predicate::str::contains("1.0"))
        .stdout(predicate::str::contains("from first channel"));

    sc4pac_cmd(&profile.root).arg("add").arg("x:y").assert().success();
    sc4pac_cmd(&profile.root).args(["update", "-y"]).assert().success();
    let lock = profile.read_lock();
    assert_eq!(lock["installed"][0]["version"], "1.0");
}

// ============================================================================
// Removal
// ============================================================================

#[test]
fn test_remove_then_update_deletes_files() {
    let profile = TestProfile::with_channels(&[]);
    let channel = standard_channel(profile.temp_dir.path());
    let mut config = profile.read_config();
    config["config"]["channels"] = json!([channel.url()]);
    profile.write_config(&config);

    sc4pac_cmd(&profile.root)
        .arg("add")
        .arg("memo:essential-fixes")
        .assert()
        .success();
    sc4pac_cmd(&profile.root).args(["update", "-y"]).assert().success();
    assert!(profile
        .plugins_dir()
        .join("150-mods/memo.essential-fixes.1.0.0.sc4pac")
        .exists());

    sc4pac_cmd(&profile.root)
        .arg("remove")
        .arg("memo:essential-fixes")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed memo:essential-fixes"));

    sc4pac_cmd(&profile.root)
        .args(["update", "-y"])
        .assert()
        .success()
        .stdout(predicate::str::contains("remove"));

    assert!(!profile
        .plugins_dir()
        .join("150-mods/memo.essential-fixes.1.0.0.sc4pac")
        .exists());
    let lock = profile.read_lock();
    assert!(lock["installed"].as_array().unwrap().is_empty());
}

// ============================================================================
// Informational commands
// ============================================================================

#[test]
fn test_list_empty() {
    let profile = TestProfile::with_channels(&[]);
    sc4pac_cmd(&profile.root)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No packages installed"));
}

#[test]
fn test_list_marks_explicit_packages() {
    let profile = TestProfile::with_channels(&[]);
    let channel = standard_channel(profile.temp_dir.path());
    let mut config = profile.read_config();
    config["config"]["channels"] = json!([channel.url()]);
    profile.write_config(&config);

    sc4pac_cmd(&profile.root)
        .arg("add")
        .arg("memo:essential-fixes")
        .assert()
        .success();
    sc4pac_cmd(&profile.root).args(["update", "-y"]).assert().success();

    sc4pac_cmd(&profile.root)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("* memo:essential-fixes 1.0.0"))
        .stdout(predicate::str::contains("bsc:common 2.1.0"));
}

#[test]
fn test_search_finds_packages() {
    let profile = TestProfile::with_channels(&[]);
    let channel = standard_channel(profile.temp_dir.path());
    let mut config = profile.read_config();
    config["config"]["channels"] = json!([channel.url()]);
    profile.write_config(&config);

    sc4pac_cmd(&profile.root)
        .arg("search")
        .arg("fixes")
        .assert()
        .success()
        .stdout(predicate::str::contains("memo:essential-fixes"));

    sc4pac_cmd(&profile.root)
        .arg("search")
        .arg("no-such-package-anywhere")
        .assert()
        .success()
        .stdout(predicate::str::contains("No packages matching"));
}

#[test]
fn test_add_unknown_package_fails_with_suggestions() {
    let profile = TestProfile::with_channels(&[]);
    let channel = standard_channel(profile.temp_dir.path());
    let mut config = profile.read_config();
    config["config"]["channels"] = json!([channel.url()]);
    profile.write_config(&config);

    sc4pac_cmd(&profile.root)
        .arg("add")
        .arg("memo:essential-fixe")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("memo:essential-fixes"));
}

#[test]
fn test_channel_management() {
    let profile = TestProfile::with_channels(&["https://example.com/channel/".to_string()]);

    sc4pac_cmd(&profile.root)
        .args(["channel", "add", "https://other.example/channel"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added channel"));

    sc4pac_cmd(&profile.root)
        .args(["channel", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://example.com/channel/"))
        .stdout(predicate::str::contains("https://other.example/channel/"));

    sc4pac_cmd(&profile.root)
        .args(["channel", "remove", "https://other.example/channel/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed channel"));

    sc4pac_cmd(&profile.root)
        .args(["channel", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://other.example/channel/").not());
}

#[test]
fn test_update_without_channels_fails() {
    let profile = TestProfile::with_channels(&[]);
    sc4pac_cmd(&profile.root)
        .args(["update", "-y"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("channels"));
}
