//! Integration tests for the bootstrap protocol
//!
//! The context assembled on the host is decoded and planned exactly as the
//! in-container binary does it.

use drun::bootstrap::{Instruction, compose_script, load_env, plan};
use drun::config::PrefixCommand;
use drun::{BootstrapContext, HostContext, HostRunner, LaunchRequest, Settings};
use drun::{CommandAssembler, ConfigResolver};
use serial_test::serial;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn settings(text: &str) -> Settings {
    let params = ConfigResolver::parse_str(text, Path::new(".drun_root")).unwrap();
    Settings::from_params(&params, Path::new(".drun_root")).unwrap()
}

fn host() -> HostContext {
    HostContext {
        cwd: PathBuf::from("/home/carol/project/sub"),
        env: BTreeMap::from([("EDITOR".to_string(), "nano".to_string())]),
        uid: 2000,
        gid: 3000,
        username: "carol".to_string(),
        tty: false,
        arg_max: None,
    }
}

#[tokio::test]
async fn test_assembled_context_plans_full_sequence() {
    let settings = settings(
        "docker_container app\n\
         mount_to /code\n\
         env_overrides EDITOR\n\
         prefix_cmd_quiet make deps\n\
         persist_environment /var/tmp/drun-env.json\n",
    );
    let host = host();
    let runner = HostRunner::new();
    let assembled = CommandAssembler::new(&host, &settings, &runner)
        .assemble(LaunchRequest {
            root: PathBuf::from("/home/carol/project"),
            image: "app".to_string(),
            command: vec!["cargo".to_string(), "test".to_string()],
            ..LaunchRequest::default()
        })
        .await
        .unwrap();

    let context = BootstrapContext::decode(assembled.args.last().unwrap()).unwrap();
    assert_eq!(context.workdir, PathBuf::from("/code/sub"));
    assert_eq!(
        context.prefix,
        Some(PrefixCommand::Quiet(vec!["make".into(), "deps".into()]))
    );

    let steps = plan(&context);
    assert_eq!(
        steps.first(),
        Some(&Instruction::ChangeDir(PathBuf::from("/code/sub")))
    );
    assert!(steps.contains(&Instruction::CreateUser {
        name: "carol".to_string(),
        uid: 2000,
        gid: 3000,
        home: PathBuf::from("/tmp/drun-home-carol/carol"),
    }));
    assert!(steps.iter().any(|step| matches!(
        step,
        Instruction::ResolveEnvironment { overrides, .. }
            if overrides.get("EDITOR").map(String::as_str) == Some("nano")
    )));

    assert_eq!(
        compose_script(&context),
        "{ make deps; } < /dev/null > /dev/null 2>&1; { cargo test; }; drrc=$?; \
         /usr/local/bin/drun-bootstrap dump-env /var/tmp/drun-env.json; exit $drrc"
    );
}

#[test]
#[serial]
fn test_dump_env_binary_excludes_shell_depth() {
    let temp_dir = TempDir::new().unwrap();
    let snapshot = temp_dir.path().join("env.json");

    let status = Command::new(env!("CARGO_BIN_EXE_drun-bootstrap"))
        .arg("dump-env")
        .arg(&snapshot)
        .env_clear()
        .env("SHLVL", "3")
        .env("PROJECT_MODE", "debug")
        .status()
        .unwrap();
    assert!(status.success());

    let env = load_env(&snapshot).unwrap();
    assert_eq!(env.get("PROJECT_MODE").map(String::as_str), Some("debug"));
    assert!(!env.contains_key("SHLVL"));
}

#[test]
#[serial]
fn test_bootstrap_binary_rejects_bad_context() {
    let output = Command::new(env!("CARGO_BIN_EXE_drun-bootstrap"))
        .args(["run", "--context", "%%%"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to decode bootstrap context"));
}

#[test]
fn test_snapshot_file_format_is_json_object() {
    let temp_dir = TempDir::new().unwrap();
    let snapshot = temp_dir.path().join("env.json");
    fs::write(&snapshot, r#"{"A":"1","B":"two words"}"#).unwrap();

    let env = load_env(&snapshot).unwrap();
    assert_eq!(env.len(), 2);
    assert_eq!(env["B"], "two words");
}
