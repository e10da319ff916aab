//! Integration tests for the host launcher
//!
//! These tests drive the configuration, fingerprint and assembly layers
//! together. Unit tests for individual functions are located in the
//! respective module files.

use drun::config::{self, ConfigError, ConfigResolver};
use drun::launch::LaunchError;
use drun::{BootstrapContext, DrunError, HostContext, HostRunner, Launcher, Outcome};
use serial_test::serial;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn setup_project(config: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().canonicalize().unwrap();
    fs::write(root.join(".drun_root"), config).unwrap();
    (temp_dir, root)
}

fn host_at(cwd: &Path) -> HostContext {
    HostContext {
        cwd: cwd.to_path_buf(),
        env: BTreeMap::from([("USER".to_string(), "builder".to_string())]),
        uid: 1500,
        gid: 1500,
        username: "builder".to_string(),
        tty: false,
        arg_max: Some(131_072),
    }
}

fn to_args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

async fn launch(host: &HostContext, list: &[&str]) -> (Result<Outcome, DrunError>, String) {
    let runner = HostRunner::new();
    let mut out = Vec::new();
    let result = Launcher::new(host, &runner)
        .run(&to_args(list), &mut out)
        .await;
    (result, String::from_utf8(out).unwrap())
}

#[tokio::test]
async fn test_print_mode_minimal_config() {
    let (_temp_dir, root) = setup_project("docker_container myimg\n");
    let host = host_at(&root);

    let (result, out) = launch(&host, &["--drun-print", "echo", "hi"]).await;
    assert_eq!(result.unwrap(), Outcome::Exit(0));

    let tokens: Vec<&str> = out
        .lines()
        .map(|line| line.strip_prefix("++++ ").expect("every line is marked"))
        .collect();
    assert_eq!(tokens[0], "docker");
    assert!(tokens.contains(&"myimg"));
    assert!(!tokens.contains(&"-t"));
    assert!(tokens.contains(&"-i"));
    assert!(tokens.contains(&"--privileged=true"));

    let context = BootstrapContext::decode(tokens.last().unwrap()).unwrap();
    assert_eq!(context.command, vec!["echo", "hi"]);
    assert_eq!(context.user.name, "builder");
    assert_eq!(context.user.uid, 1500);
    assert_eq!(context.workdir, root);
}

#[tokio::test]
async fn test_runtime_args_before_delimiter() {
    let (_temp_dir, root) = setup_project("docker_container myimg\nextra_args --net=host\n");
    let host = host_at(&root);

    let (result, out) = launch(
        &host,
        &[
            "--drun-print",
            "--drun-extra-args=-e X=1",
            "--cpus=2",
            "--",
            "ls",
            "-la",
        ],
    )
    .await;
    assert_eq!(result.unwrap(), Outcome::Exit(0));

    let tokens: Vec<&str> = out.lines().map(|l| &l[5..]).collect();
    let position = |needle: &str| tokens.iter().position(|t| *t == needle).unwrap();
    assert!(position("-e") < position("--net=host"));
    assert!(position("--net=host") < position("--cpus=2"));
    assert!(position("--cpus=2") < position("-h"));

    let context = BootstrapContext::decode(tokens.last().unwrap()).unwrap();
    assert_eq!(context.command, vec!["ls", "-la"]);
}

#[tokio::test]
async fn test_length_guard_blocks_launch() {
    let (_temp_dir, root) = setup_project("docker_container myimg\n");
    let mut host = host_at(&root);
    host.arg_max = Some(256);
    let long_arg = "x".repeat(512);

    let (result, out) = launch(&host, &["echo", &long_arg]).await;
    assert!(matches!(
        result,
        Err(DrunError::Launch(LaunchError::CommandTooLong { limit: 256, .. }))
    ));
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_hostname_from_nested_image() {
    let (_temp_dir, root) = setup_project("docker_container org/My.Image_1\n");
    let host = host_at(&root);

    let (result, out) = launch(&host, &["--drun-print", "true"]).await;
    assert_eq!(result.unwrap(), Outcome::Exit(0));

    let tokens: Vec<&str> = out.lines().map(|l| &l[5..]).collect();
    let h = tokens.iter().position(|t| *t == "-h").unwrap();
    assert_eq!(tokens[h + 1], "My-Image-1");
}

#[tokio::test]
async fn test_symlinked_cwd_runs_inside_mounted_root() {
    let (_temp_dir, root) = setup_project("docker_container myimg\n");
    fs::create_dir_all(root.join("real/sub")).unwrap();
    fs::rename(root.join(".drun_root"), root.join("real/.drun_root")).unwrap();
    std::os::unix::fs::symlink(root.join("real"), root.join("link")).unwrap();
    let host = host_at(&root.join("link/sub"));

    let (result, out) = launch(&host, &["--drun-print", "pwd"]).await;
    assert_eq!(result.unwrap(), Outcome::Exit(0));

    let tokens: Vec<&str> = out.lines().map(|l| &l[5..]).collect();
    let real = root.join("real");
    let root_mount = format!("{}:{}", real.display(), real.display());
    assert!(tokens.contains(&root_mount.as_str()));

    let context = BootstrapContext::decode(tokens.last().unwrap()).unwrap();
    assert_eq!(context.workdir, real.join("sub"));
}

#[tokio::test]
async fn test_enclosing_checkout_git_dir_is_mounted() {
    if which::which("git").is_err() {
        return;
    }
    let (_temp_dir, root) = setup_project("docker_container myimg\n");
    let repo = root.join("repo");
    fs::create_dir_all(repo.join("sub")).unwrap();
    let status = Command::new("git")
        .args(["init", "-q"])
        .current_dir(&repo)
        .status()
        .unwrap();
    assert!(status.success());
    fs::write(
        repo.join("sub/.drun_root"),
        "docker_container myimg\nshare_git_dir\n",
    )
    .unwrap();
    let host = host_at(&repo.join("sub"));

    let (result, out) = launch(&host, &["--drun-print", "true"]).await;
    assert_eq!(result.unwrap(), Outcome::Exit(0));

    let git_dir = repo.join(".git");
    let git_mount = format!("++++ {}:{}", git_dir.display(), git_dir.display());
    assert!(out.lines().any(|line| line == git_mount), "{}", out);
}

#[tokio::test]
async fn test_fingerprint_stable_across_invocations() {
    let (_temp_dir, root) =
        setup_project("docker_container app\nversion_by_build_context .ctx_sha\n");
    fs::write(root.join(".dockerignore"), "*\n!src\n!Cargo.toml\n").unwrap();
    fs::write(root.join("Dockerfile"), "FROM rust\n").unwrap();
    fs::write(root.join("Cargo.toml"), "[package]\n").unwrap();
    fs::create_dir_all(root.join("src/bin")).unwrap();
    fs::write(root.join("src/lib.rs"), "").unwrap();
    fs::write(root.join("src/bin/tool.rs"), "fn main() {}\n").unwrap();
    let host = host_at(&root.join("src"));

    let (first, sha) = launch(&host, &["--drun-ctx"]).await;
    assert_eq!(first.unwrap(), Outcome::Exit(0));
    let (_, again) = launch(&host, &["--drun-ctx"]).await;
    assert_eq!(sha, again);

    let cache = fs::read_to_string(root.join(".ctx_sha")).unwrap();
    let lines: Vec<&str> = cache.lines().collect();
    assert_eq!(lines[0], sha.trim());
    assert_eq!(
        &lines[1..],
        &[".dockerignore", "Cargo.toml", "Dockerfile", "src/bin/tool.rs", "src/lib.rs"]
    );
}

#[tokio::test]
async fn test_malformed_ignore_file_is_fatal() {
    let (_temp_dir, root) =
        setup_project("docker_container app\nversion_by_build_context .ctx_sha\n");
    fs::write(root.join(".dockerignore"), "*\nsrc\n").unwrap();
    let host = host_at(&root);

    let (result, _) = launch(&host, &["--drun-print-image"]).await;
    let err = result.unwrap_err();
    assert!(matches!(err, DrunError::Fingerprint(_)));
    assert_eq!(err.exit_code(), 255);
}

#[test]
fn test_later_config_line_replaces_earlier() {
    let (_temp_dir, root) = setup_project(
        "docker_container first\n\
         extra_args -e A=1\n\
         # comment\n\
         \n\
         extra_args -e B=2\n\
         docker_container second\n",
    );

    let resolved = ConfigResolver::resolve(&root).unwrap();
    assert_eq!(resolved.params["extra_args"], vec!["-e", "B=2"]);
    assert_eq!(resolved.params["docker_container"], vec!["second"]);
}

#[test]
fn test_config_found_from_nested_directory() {
    let (_temp_dir, root) = setup_project("docker_container app\n");
    let nested = root.join("a/b/c");
    fs::create_dir_all(&nested).unwrap();

    let loaded = config::load(&nested, Vec::new()).unwrap();
    assert_eq!(loaded.root_dir, root);
    assert_eq!(loaded.config_path, root.join(".drun_root"));
}

#[test]
fn test_override_scoping_by_uuid() {
    let (_temp_dir, root) = setup_project(
        "docker_container app\nuuid 0f8fad5b-d9cb-469f-a165-70867728950e\n",
    );

    let other = vec![(
        "DRUN_OPT_SET_UUID_11111111111111111111111111111111_docker_container".to_string(),
        "other".to_string(),
    )];
    let loaded = config::load(&root, other).unwrap();
    assert_eq!(loaded.settings.image, "app");

    let matching = vec![(
        "DRUN_OPT_SET_UUID_0f8fad5bd9cb469fa16570867728950e_docker_container".to_string(),
        "scoped".to_string(),
    )];
    let loaded = config::load(&root, matching).unwrap();
    assert_eq!(loaded.settings.image, "scoped");
}

#[test]
fn test_override_delete_required_directive() {
    let (_temp_dir, root) = setup_project("docker_container app\n");
    let vars = vec![("DRUN_OPT_DEL_docker_container".to_string(), String::new())];

    let err = config::load(&root, vars).unwrap_err();
    assert!(matches!(err, ConfigError::MissingDirective { .. }));
}

#[test]
#[serial]
fn test_drun_binary_prints_command() {
    let (_temp_dir, root) = setup_project("docker_container myimg\n");

    let output = Command::new(env!("CARGO_BIN_EXE_drun"))
        .args(["--drun-print", "echo", "hi"])
        .current_dir(&root)
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.lines().all(|line| line.starts_with("++++ ")));
    assert!(stdout.lines().any(|line| line == "++++ myimg"));
    assert!(!stdout.lines().any(|line| line == "++++ -t"));
}

#[test]
#[serial]
fn test_drun_binary_exit_code_without_config() {
    let temp_dir = TempDir::new().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_drun"))
        .args(["echo", "hi"])
        .current_dir(temp_dir.path())
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(255));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("never found a config file"));
}
