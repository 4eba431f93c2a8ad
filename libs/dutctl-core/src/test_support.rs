//! In-process fixture modules used by this crate's own tests and by the
//! integration tests under `tests/`. Gated behind the `test-support`
//! feature so it never ships in a release build of a dependent crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::contracts::{Module, RunCtx};
use crate::session::Session;

/// Prints every argument it receives and echoes them back via `print`,
/// recording the args it was called with for assertions.
#[derive(Default)]
pub struct EchoModule {
    pub calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl Module for EchoModule {
    fn help(&self) -> String {
        "echoes its arguments".to_string()
    }

    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn deinit(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn run(&self, _ctx: RunCtx, session: Arc<dyn Session>, args: Vec<String>) -> anyhow::Result<()> {
        session.print(&args.join(" ")).await;
        self.calls.lock().unwrap().push(args);
        Ok(())
    }
}

/// Fails on its `run_on` call (1-indexed across the whole fixture's
/// lifetime) and succeeds otherwise; used to exercise the "module error
/// aborts the sequence" scenario.
pub struct FailingModule {
    run_on: usize,
    counter: AtomicUsize,
}

impl FailingModule {
    pub fn new(run_on: usize) -> Self {
        Self { run_on, counter: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Module for FailingModule {
    fn help(&self) -> String {
        "fails on a configured call".to_string()
    }

    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn deinit(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn run(&self, _ctx: RunCtx, session: Arc<dyn Session>, args: Vec<String>) -> anyhow::Result<()> {
        let call = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.run_on {
            anyhow::bail!("simulated failure on call {call}");
        }
        session.print(&args.join(" ")).await;
        Ok(())
    }
}

/// Exercises `RequestFile`/`SendFile`: requests a file named `request_name`
/// and, once received, sends it straight back to the client under
/// `response_name`.
pub struct FileEchoModule {
    pub request_name: String,
    pub response_name: String,
}

#[async_trait]
impl Module for FileEchoModule {
    fn help(&self) -> String {
        "round-trips an uploaded file".to_string()
    }

    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn deinit(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn run(&self, _ctx: RunCtx, session: Arc<dyn Session>, _args: Vec<String>) -> anyhow::Result<()> {
        let mut reader = session.request_file(&self.request_name).await?;
        let data = reader.read_to_end().await?;
        let size = data.len() as u64;
        session
            .send_file(&self.response_name, size, Box::new(crate::session::InMemoryFileSource::new(data)))
            .await?;
        Ok(())
    }
}

/// A module whose `init` always fails, for exercising Lifecycle Orchestrator
/// error aggregation.
pub struct FailingInitModule {
    pub message: String,
}

#[async_trait]
impl Module for FailingInitModule {
    fn help(&self) -> String {
        String::new()
    }

    async fn init(&self) -> anyhow::Result<()> {
        anyhow::bail!("{}", self.message)
    }

    async fn deinit(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn run(&self, _ctx: RunCtx, _session: Arc<dyn Session>, _args: Vec<String>) -> anyhow::Result<()> {
        Ok(())
    }
}
