use anyhow::Context;
use drun::env::{DEFAULT_LOG_FILTER, LOG_FILTER_VAR};
use drun::error::EXIT_FATAL;
use drun::{HostContext, HostRunner, Launcher, Outcome, exec_replace};
use std::io::Write;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() {
    // Logging goes to stderr; stdout carries print output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_FILTER_VAR)
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match launch() {
        Ok(code) => code,
        Err(e) => {
            let code = e
                .downcast_ref::<drun::DrunError>()
                .map(drun::DrunError::exit_code)
                .unwrap_or(EXIT_FATAL);
            eprintln!("Error: {:#}", e);
            code
        }
    };
    std::process::exit(code);
}

fn launch() -> anyhow::Result<i32> {
    let host = HostContext::capture().context("failed to inspect the invoking process")?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let runner = HostRunner::new();
    let outcome = runtime.block_on(async {
        Launcher::new(&host, &runner)
            .run(&args, &mut std::io::stdout())
            .await
    })?;
    drop(runtime);
    std::io::stdout().flush().context("failed to flush stdout")?;

    match outcome {
        Outcome::Exit(code) => Ok(code),
        Outcome::Exec(request) => {
            debug!("Exec {} {:?}", request.program, request.args);
            let err = exec_replace(&request);
            Err(err).with_context(|| format!("failed to exec {}", request.program))
        }
    }
}
