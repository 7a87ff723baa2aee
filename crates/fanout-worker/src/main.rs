//! Worker process entry point.
//!
//! Serves one named task over stdio frames until the parent closes the
//! request channel. Logging goes to stderr; stdout is the reply channel.

use anyhow::{Context, Result, bail};

use fanout_worker::{Fallible, Reverse, Sleepy, Square};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let task = std::env::args()
        .nth(1)
        .context("missing task name argument")?;
    tracing::debug!(task, pid = std::process::id(), "worker starting");

    match task.as_str() {
        "square" => fanout::ipc::serve(&Square)?,
        "reverse" => fanout::ipc::serve(&Reverse)?,
        "fallible" => fanout::ipc::serve(&Fallible)?,
        "sleepy" => fanout::ipc::serve(&Sleepy)?,
        other => bail!("unknown task {other:?}"),
    }
    Ok(())
}
