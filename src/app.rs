//! The launcher pipeline from command line to [`Outcome`].
//!
//! Configuration is resolved from the invocation directory, the build context
//! is fingerprinted when configured, informational flags are answered, the
//! prelaunch hook and optional rebuild run, and finally the runtime
//! invocation is assembled and either printed or returned for exec.

use crate::cli::{CliAction, help_text, parse_invocation};
use crate::config::{self, Settings};
use crate::error::{DrunError, Result};
use crate::fingerprint::ContextFingerprinter;
use crate::launch::{CommandAssembler, HostContext, LaunchRequest};
use crate::process::{CommandRunner, Outcome, ProcessCommand};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Image reference for this invocation: the configured image tagged with the
/// fingerprint, unless an explicit image overrides both.
pub fn select_image(
    image: &str,
    fingerprint: Option<&str>,
    override_image: Option<&str>,
) -> String {
    match (override_image, fingerprint) {
        (Some(image), _) => image.to_string(),
        (None, Some(sha)) => format!("{}:{}", image, sha),
        (None, None) => image.to_string(),
    }
}

/// Runs one `drun` invocation against a host snapshot.
pub struct Launcher<'a, R: ?Sized> {
    host: &'a HostContext,
    runner: &'a R,
}

impl<'a, R> Launcher<'a, R>
where
    R: CommandRunner + ?Sized,
{
    pub fn new(host: &'a HostContext, runner: &'a R) -> Self {
        Self { host, runner }
    }

    /// Execute the pipeline for `args` (program name excluded), writing
    /// informational output to `out`.
    pub async fn run(&self, args: &[String], out: &mut dyn Write) -> Result<Outcome> {
        let (options, command) = parse_invocation(args)?;
        debug!("Parsed options: {:?}", options);

        if options.action == CliAction::Help {
            write!(out, "{}", help_text())?;
            return Ok(Outcome::Exit(0));
        }

        let loaded = config::load(&self.host.cwd, self.host.env.clone())?;
        let settings = &loaded.settings;
        let root = loaded.root_dir.as_path();
        debug!("Using config {:?}", loaded.config_path);

        let mut fingerprint = match &settings.context_cache {
            Some(cache) => {
                let mut fingerprinter = ContextFingerprinter::new(root, cache);
                Some(fingerprinter.fingerprint()?.digest)
            }
            None => None,
        };
        if let Some(forced) = &options.use_ctx {
            if fingerprint.is_none() {
                return Err(DrunError::ContextUnused);
            }
            fingerprint = Some(forced.clone());
        }

        if options.action == CliAction::PrintContext {
            let sha = fingerprint.ok_or(DrunError::ContextUnused)?;
            writeln!(out, "{}", sha)?;
            return Ok(Outcome::Exit(0));
        }

        let image = select_image(
            &settings.image,
            fingerprint.as_deref(),
            options.override_image.as_deref(),
        );

        match options.action {
            CliAction::PrintImage => {
                writeln!(out, "{}", image)?;
                return Ok(Outcome::Exit(0));
            }
            CliAction::ShowConfig => {
                write!(out, "{}", toml::to_string(&loaded.params)?)?;
                return Ok(Outcome::Exit(0));
            }
            _ => {}
        }

        if let Some(hook) = &settings.prelaunch_hook {
            self.run_hook(hook, root).await?;
        }
        if options.rebuild {
            writeln!(out, "Rebuilding container {}", image)?;
            self.rebuild(settings, &image, root).await?;
        }

        let request = LaunchRequest {
            root: root.to_path_buf(),
            image,
            wrapper_args: options.extra_args,
            runtime_args: options.runtime_args,
            command: command.argv,
        };
        let assembled = CommandAssembler::new(self.host, settings, self.runner)
            .assemble(request)
            .await?;
        assembled.check_length(self.host.arg_max)?;

        if options.action == CliAction::PrintCommand {
            assembled.write_print(out)?;
            return Ok(Outcome::Exit(0));
        }

        info!("Launching: {}", assembled.program);
        Ok(Outcome::Exec(assembled.into_exec()))
    }

    async fn run_hook(&self, hook: &[String], root: &Path) -> Result<()> {
        let Some(cmd) = ProcessCommand::from_argv(hook) else {
            return Ok(());
        };
        info!("Running prelaunch hook: {}", cmd.display());

        let output = self
            .runner
            .run(cmd.with_working_dir(root).inherit_stdio())
            .await?;
        if !output.success() {
            return Err(DrunError::HookFailed {
                code: output.exit_code,
            });
        }
        Ok(())
    }

    async fn rebuild(&self, settings: &Settings, image: &str, root: &Path) -> Result<()> {
        let cmd = ProcessCommand::new(
            settings.runtime.clone(),
            [
                "build".to_string(),
                "-t".to_string(),
                image.to_string(),
                root.to_string_lossy().into_owned(),
            ],
        )
        .inherit_stdio();
        info!("Rebuilding image: {}", cmd.display());

        let output = self.runner.run(cmd).await?;
        if !output.success() {
            return Err(DrunError::RebuildFailed {
                image: image.to_string(),
                code: output.exit_code,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::RecordingRunner;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn host(cwd: &Path) -> HostContext {
        HostContext {
            cwd: cwd.to_path_buf(),
            env: BTreeMap::new(),
            uid: 1000,
            gid: 1000,
            username: "alice".to_string(),
            tty: false,
            arg_max: Some(2_097_152),
        }
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn run(
        host: &HostContext,
        runner: &RecordingRunner,
        list: &[&str],
    ) -> (Result<Outcome>, String) {
        let mut out = Vec::new();
        let result = Launcher::new(host, runner).run(&args(list), &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    fn project(config: &str) -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::write(root.join(".drun_root"), config).unwrap();
        (temp, root)
    }

    #[test]
    fn test_select_image() {
        assert_eq!(select_image("app", None, None), "app");
        assert_eq!(select_image("app", Some("abc"), None), "app:abc");
        assert_eq!(select_image("app", Some("abc"), Some("other:1")), "other:1");
    }

    #[tokio::test]
    async fn test_help_without_config() {
        let temp = TempDir::new().unwrap();
        let host = host(temp.path());
        let runner = RecordingRunner::new();

        let (result, out) = run(&host, &runner, &["--drun-help", "ignored"]).await;
        assert_eq!(result.unwrap(), Outcome::Exit(0));
        assert!(out.contains("--drun-print"));
    }

    #[tokio::test]
    async fn test_run_returns_exec() {
        let (_temp, root) = project("docker_container myimg\n");
        let host = host(&root);
        let runner = RecordingRunner::new();

        let (result, out) = run(&host, &runner, &["echo", "hi"]).await;
        let Outcome::Exec(request) = result.unwrap() else {
            panic!("expected exec");
        };
        assert_eq!(request.program, "docker");
        assert!(request.args.contains(&"myimg".to_string()));
        assert!(request.env.is_none());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_print_image_with_override() {
        let (_temp, root) = project("docker_container myimg\n");
        let host = host(&root);
        let runner = RecordingRunner::new();

        let (result, out) = run(&host, &runner, &["--drun-img=x/y:z", "--drun-print-image"]).await;
        assert_eq!(result.unwrap(), Outcome::Exit(0));
        assert_eq!(out, "x/y:z\n");
    }

    #[tokio::test]
    async fn test_use_ctx_requires_fingerprinting() {
        let (_temp, root) = project("docker_container myimg\n");
        let host = host(&root);
        let runner = RecordingRunner::new();

        let (result, _) = run(&host, &runner, &["--drun-use-ctx=abc", "ls"]).await;
        let err = result.unwrap_err();
        assert!(matches!(err, DrunError::ContextUnused));
        assert_eq!(err.exit_code(), 255);

        let (result, _) = run(&host, &runner, &["--drun-ctx"]).await;
        assert!(matches!(result.unwrap_err(), DrunError::ContextUnused));
    }

    #[tokio::test]
    async fn test_fingerprint_tags_image() {
        let (_temp, root) = project("docker_container myimg\nversion_by_build_context .ctx_sha\n");
        fs::write(root.join(".dockerignore"), "*\n!src\n").unwrap();
        fs::write(root.join("Dockerfile"), "FROM scratch\n").unwrap();
        fs::create_dir(root.join("src")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}\n").unwrap();
        let host = host(&root);
        let runner = RecordingRunner::new();

        let (result, sha) = run(&host, &runner, &["--drun-ctx"]).await;
        assert_eq!(result.unwrap(), Outcome::Exit(0));
        let sha = sha.trim().to_string();
        assert_eq!(sha.len(), 40);
        assert!(root.join(".ctx_sha").exists());

        let (_, image) = run(&host, &runner, &["--drun-print-image"]).await;
        assert_eq!(image.trim(), format!("myimg:{}", sha));

        let (_, forced) = run(&host, &runner, &["--drun-use-ctx=feed", "--drun-print-image"]).await;
        assert_eq!(forced.trim(), "myimg:feed");
    }

    #[tokio::test]
    async fn test_show_config_renders_final_params() {
        let (_temp, root) = project("docker_container myimg\nextra_args -e A=1\n");
        let mut host = host(&root);
        host.env.insert(
            "DRUN_OPT_ADD_extra_args".to_string(),
            "-e B=2".to_string(),
        );
        let runner = RecordingRunner::new();

        let (result, out) = run(&host, &runner, &["--drun-show-config"]).await;
        assert_eq!(result.unwrap(), Outcome::Exit(0));

        let parsed: BTreeMap<String, Vec<String>> = toml::from_str(&out).unwrap();
        assert_eq!(parsed["docker_container"], vec!["myimg"]);
        assert_eq!(parsed["extra_args"], vec!["-e", "A=1", "-e", "B=2"]);
    }

    #[tokio::test]
    async fn test_hook_runs_in_root_and_failure_is_fatal() {
        let (_temp, root) = project("docker_container myimg\nprelaunch_hook ./prepare.sh fast\n");
        let sub = root.join("sub");
        fs::create_dir(&sub).unwrap();
        let host = host(&sub);

        let runner = RecordingRunner::new();
        let (result, _) = run(&host, &runner, &["--drun-print", "true"]).await;
        assert_eq!(result.unwrap(), Outcome::Exit(0));
        let hook = &runner.calls()[0];
        assert_eq!(hook.program, "./prepare.sh");
        assert_eq!(hook.working_dir.as_deref(), Some(root.as_path()));

        let failing = RecordingRunner::new().respond("./prepare.sh", 2, "");
        let (result, _) = run(&host, &failing, &["true"]).await;
        let err = result.unwrap_err();
        assert!(matches!(err, DrunError::HookFailed { code: 2 }));
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_uses_runtime_and_root() {
        let (_temp, root) = project("docker_container myimg\ncontainer_runtime podman\n");
        let host = host(&root);

        let runner = RecordingRunner::new();
        let (result, out) = run(&host, &runner, &["--drun-rebuild", "--drun-print", "ls"]).await;
        assert_eq!(result.unwrap(), Outcome::Exit(0));
        assert!(out.starts_with("Rebuilding container myimg\n"));
        let build = &runner.calls()[0];
        assert_eq!(build.program, "podman");
        assert_eq!(
            build.args,
            vec![
                "build".to_string(),
                "-t".to_string(),
                "myimg".to_string(),
                root.to_string_lossy().into_owned()
            ]
        );

        let failing = RecordingRunner::new().respond("podman", 1, "");
        let (result, _) = run(&host, &failing, &["--drun-rebuild", "ls"]).await;
        assert!(matches!(result.unwrap_err(), DrunError::RebuildFailed { .. }));
    }

    #[tokio::test]
    async fn test_oversized_command_fails_before_exec() {
        let (_temp, root) = project("docker_container myimg\n");
        let mut host = host(&root);
        host.arg_max = Some(64);
        let runner = RecordingRunner::new();

        let (result, out) = run(&host, &runner, &["--drun-print", "echo", "hi"]).await;
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            DrunError::Launch(crate::launch::LaunchError::CommandTooLong { limit: 64, .. })
        ));
        assert_eq!(err.exit_code(), 255);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_missing_config() {
        let temp = TempDir::new().unwrap();
        let host = host(temp.path());
        let runner = RecordingRunner::new();

        let (result, _) = run(&host, &runner, &["ls"]).await;
        let err = result.unwrap_err();
        assert!(matches!(err, DrunError::Config(config::ConfigError::NotFound { .. })));
        assert_eq!(err.exit_code(), 255);
    }
}
