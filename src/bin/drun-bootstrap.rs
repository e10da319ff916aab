use anyhow::Context;
use clap::Parser;
use drun::bootstrap::{BootstrapContext, Interpreter, LinuxSystem, dump_env, plan};
use drun::cli::{BootstrapArgs, BootstrapCommand};
use drun::env::{DEFAULT_LOG_FILTER, LOG_FILTER_VAR};
use drun::{HostRunner, Outcome, exec_replace};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_FILTER_VAR)
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = BootstrapArgs::parse();
    match args.command {
        BootstrapCommand::DumpEnv { path } => {
            dump_env(&path, std::env::vars())
                .with_context(|| format!("failed to persist environment to {}", path.display()))
        }
        BootstrapCommand::Run { context } => run(&context),
    }
}

fn run(blob: &str) -> anyhow::Result<()> {
    let context = BootstrapContext::decode(blob)?;
    info!(
        "Bootstrapping {} (uid={} gid={}) in {:?}",
        context.user.name, context.user.uid, context.user.gid, context.workdir
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let runner = HostRunner::new();
    let outcome = runtime.block_on(async {
        Interpreter::new(LinuxSystem::new(), &runner)
            .execute(plan(&context))
            .await
    })?;
    drop(runtime);

    match outcome {
        Outcome::Exit(code) => std::process::exit(code),
        Outcome::Exec(request) => {
            let err = exec_replace(&request);
            Err(err).with_context(|| format!("failed to launch command with {}", request.program))
        }
    }
}
