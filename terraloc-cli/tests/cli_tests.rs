#[path = "../../tests/support/mod.rs"]
mod support;

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use terraloc_cli::{CliError, InputCommand, OutputCommand, parse_bool, parse_input, parse_output};

fn terraloc(dir: &Path, args: &[&str]) -> Output {
    Command::new(assert_cmd::cargo::cargo_bin!("terraloc"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .unwrap()
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn test_parse_bool_is_case_insensitive() {
    assert!(parse_bool("TRUE").unwrap());
    assert!(parse_bool("true").unwrap());
    assert!(!parse_bool("False").unwrap());
    assert!(matches!(parse_bool("yes"), Err(CliError::Usage(_))));
}

#[test]
fn test_parse_input_commands() {
    assert_eq!(
        parse_input(&strings(&["asm", "Terraria.exe", "true", "en-US", "zh-Hans"])).unwrap(),
        InputCommand::Asm {
            path: "Terraria.exe".into(),
            dump_all: true,
            languages: strings(&["en-US", "zh-Hans"]),
        }
    );
    assert_eq!(
        parse_input(&strings(&["json", "en-US", "zh-Hans"])).unwrap(),
        InputCommand::Json {
            src_lang: "en-US".to_string(),
            dst_lang: "zh-Hans".to_string(),
        }
    );
    assert_eq!(
        parse_input(&strings(&["po", "zh.po"])).unwrap(),
        InputCommand::Po { path: "zh.po".into() }
    );
}

#[test]
fn test_parse_input_arity() {
    for args in [
        vec!["asm", "Terraria.exe"],
        vec!["json", "en-US"],
        vec!["po"],
        vec!["po", "a.po", "b.po"],
        vec!["xliff", "a"],
        vec![],
    ] {
        let result = parse_input(&strings(&args));
        assert!(matches!(result, Err(CliError::Usage(_))), "{:?}", args);
    }
    assert!(matches!(
        parse_input(&strings(&["asm", "Terraria.exe", "maybe"])),
        Err(CliError::Usage(_))
    ));
}

#[test]
fn test_parse_output_commands() {
    assert_eq!(
        parse_output(&strings(&["asm", "Terraria.exe", "zh-Hans"])).unwrap(),
        OutputCommand::Asm {
            path: "Terraria.exe".into(),
            dst_lang: "zh-Hans".to_string(),
            use_main_replacement: true,
        }
    );
    assert_eq!(
        parse_output(&strings(&["json", "en", "False"])).unwrap(),
        OutputCommand::Json {
            dst_lang: "en".to_string(),
            use_main_replacement: false,
        }
    );
    assert!(matches!(
        parse_output(&strings(&["json"])),
        Err(CliError::Usage(_))
    ));
    assert!(matches!(
        parse_output(&strings(&["po", "a.po", "extra"])),
        Err(CliError::Usage(_))
    ));
}

#[test]
fn test_usage_error_exits_with_status_two() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("en-US")).unwrap();
    fs::write(dir.path().join("en-US").join("UI.json"), r#"{"Menu": {"Ok": "OK"}}"#).unwrap();
    let before = entries(dir.path());

    let output = terraloc(dir.path(), &["json", "en-US", "zh-Hans", "--", "po"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage:"));
    assert_eq!(entries(dir.path()), before);

    let output = terraloc(dir.path(), &["json", "en-US", "zh-Hans", "--", "json", "en", "maybe"]);
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(entries(dir.path()), before);
}

#[test]
fn test_missing_output_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = terraloc(dir.path(), &["po", "zh.po"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_missing_source_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = terraloc(dir.path(), &["json", "en-US", "zh-Hans", "--", "po", "out.po"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
    assert!(!dir.path().join("out.po").exists());
}

#[test]
fn test_json_to_po_and_back() {
    let dir = tempfile::tempdir().unwrap();
    for (lang, text) in [("en-US", "Sword"), ("zh-Hans", "剑")] {
        fs::create_dir(dir.path().join(lang)).unwrap();
        fs::write(
            dir.path().join(lang).join("Weapons.json"),
            format!(r#"{{"Items": {{"1": "{}"}}}}"#, text),
        )
        .unwrap();
    }

    let output = terraloc(dir.path(), &["json", "en-US", "zh-Hans", "--", "po", "zh.po"]);
    assert!(
        output.status.success(),
        "Command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let po = fs::read_to_string(dir.path().join("zh.po")).unwrap();
    assert!(po.contains("msgctxt \"Weapons.Items.1\""));
    assert!(po.contains("msgid \"Sword\""));
    assert!(po.contains("msgstr \"剑\""));

    let output = terraloc(dir.path(), &["po", "zh.po", "--", "json", "zh-Hans"]);
    assert!(output.status.success());
    let json = fs::read_to_string(
        dir.path()
            .join("Terraria.Localization.Content.zh-Hans.Weapons.json"),
    )
    .unwrap();
    assert!(json.contains("剑"));
}

#[test]
fn test_po_to_asm_writes_patched_copy() {
    let dir = tempfile::tempdir().unwrap();
    support::AssemblyBuilder::new()
        .embedded(
            "Terraria.Localization.Content.en-US.json",
            br#"{"UI": {"Ok": "OK"}}"#,
        )
        .write(&dir.path().join("Terraria.exe"));
    fs::write(
        dir.path().join("zh.po"),
        "msgid \"\"\nmsgstr \"Content-Type: text/plain; charset=UTF-8\\n\"\n\nmsgctxt \"Main.UI.Ok\"\nmsgid \"OK\"\nmsgstr \"确定\"\n",
    )
    .unwrap();

    let output = terraloc(dir.path(), &["po", "zh.po", "--", "asm", "Terraria.exe", "zh-Hans"]);
    assert!(
        output.status.success(),
        "Command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("✅ Added Terraria.Localization.Content.zh-Hans.json"));

    let patched = terraloc::ManagedAssembly::load(dir.path().join("Terraria_locpatched.exe")).unwrap();
    assert_eq!(patched.resources().count(), 2);

    // Read the patched assembly back as zh-Hans source text.
    let output = terraloc(
        dir.path(),
        &["asm", "Terraria_locpatched.exe", "false", "zh-Hans", "--", "po", "back.po"],
    );
    assert!(output.status.success());
    let po = fs::read_to_string(dir.path().join("back.po")).unwrap();
    assert!(po.contains("msgid \"确定\""));
}

#[test]
fn test_failed_resource_is_logged_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let items = "Terraria.Localization.Content.en-US.Items.json";
    support::AssemblyBuilder::new()
        .embedded("Terraria.Localization.Content.en-US.json", br#"{"UI": {"Ok": "OK"}}"#)
        .embedded(items, b"{}")
        .embedded(items, b"{}")
        .write(&dir.path().join("Terraria.exe"));
    fs::write(
        dir.path().join("en.po"),
        concat!(
            "msgid \"\"\nmsgstr \"Content-Type: text/plain; charset=UTF-8\\n\"\n\n",
            "msgctxt \"Main.UI.Ok\"\nmsgid \"OK\"\nmsgstr \"Okay\"\n\n",
            "msgctxt \"Items.ItemName.1\"\nmsgid \"Sword\"\nmsgstr \"Blade\"\n",
        ),
    )
    .unwrap();

    let output = terraloc(dir.path(), &["po", "en.po", "--", "asm", "Terraria.exe", "en-US", "false"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&format!("❌ Failed to write {}", items)));
    assert!(stdout.contains("✅ Replaced Terraria.Localization.Content.en-US.json"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("resource left unchanged"));
    assert!(dir.path().join("Terraria_locpatched.exe").is_file());
}
