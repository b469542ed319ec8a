//! Lifecycle guard
//!
//! Guarantees that a failed or interrupted provisioning attempt never leaves
//! orphaned resources silently: termination signals, recovered panics, and
//! plain provisioning errors all funnel into the same best-effort cleanup and
//! telemetry emission. Cleanup failures are logged with manual-remediation
//! guidance, never escalated.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ProvisionerError, ProvisionerResult};
use crate::telemetry::{StartupOutcome, STARTUP_RESULT_EVENT, STARTUP_TIME_EVENT};
use crate::traits::{ContainerEngine, Tracker};

/// Label attached to every container this tool creates.
pub const RESOURCE_LABEL: &str = "managed-by=don-provisioner";

pub const MANUAL_CLEANUP_MSG: &str = "unexpected startup error. this may have stranded resources. \
please manually remove containers with the 'managed-by=don-provisioner' label and delete their volumes";

/// Explicit per-attempt context. Created at call time and passed in, never a
/// package-level variable, so concurrent attempts stay independent.
#[derive(Clone)]
pub struct ProvisionContext {
    pub attempt_id: Uuid,
    pub started_at: Instant,
    /// Grace period before cleanup on the failure path, letting async
    /// teardown elsewhere settle.
    pub cleanup_wait: Duration,
    pub infra_type: String,
    pub tracker: Arc<dyn Tracker>,
}

impl ProvisionContext {
    pub fn new(infra_type: impl Into<String>, cleanup_wait: Duration, tracker: Arc<dyn Tracker>) -> Self {
        ProvisionContext {
            attempt_id: Uuid::new_v4(),
            started_at: Instant::now(),
            cleanup_wait,
            infra_type: infra_type.into(),
            tracker,
        }
    }
}

/// Wraps a provisioning attempt with signal handling, panic recovery,
/// best-effort cleanup, and startup telemetry.
pub struct LifecycleGuard<E>
where
    E: ContainerEngine,
{
    engine: E,
    ctx: ProvisionContext,
}

impl<E> LifecycleGuard<E>
where
    E: ContainerEngine,
{
    pub fn new(engine: E, ctx: ProvisionContext) -> Self {
        LifecycleGuard { engine, ctx }
    }

    pub fn context(&self) -> &ProvisionContext {
        &self.ctx
    }

    /// Run a provisioning future to completion under full protection.
    ///
    /// The future races a termination-signal watcher; on signal, labeled
    /// resources are removed best-effort and `Interrupted` is returned. The
    /// race with in-flight creation is intentional: cleanup is best-effort,
    /// not transactional.
    pub async fn run<F, T>(&self, has_built_image: bool, fut: F) -> ProvisionerResult<T>
    where
        F: Future<Output = ProvisionerResult<T>>,
    {
        let guarded = AssertUnwindSafe(fut).catch_unwind();

        tokio::select! {
            outcome = guarded => match outcome {
                Ok(Ok(value)) => {
                    self.emit_result(true, None, false).await;
                    self.emit_time(has_built_image).await;
                    Ok(value)
                }
                Ok(Err(err)) => {
                    error!("provisioning failed: {}", err.chain());
                    self.handle_failure(&err, false).await;
                    Err(err)
                }
                Err(panic) => {
                    let message = panic_message(panic);
                    error!("panicked while provisioning: {message}");
                    error!("stack trace: {}", std::backtrace::Backtrace::force_capture());
                    let err = ProvisionerError::Panicked { message };
                    self.handle_failure(&err, true).await;
                    Err(err)
                }
            },
            _ = termination_signal() => {
                warn!("received termination signal, removing provisioned resources");
                self.emit_result(false, Some("interrupted"), false).await;
                self.cleanup().await;
                Err(ProvisionerError::Interrupted)
            }
        }
    }

    /// Failure path shared by errors and recovered panics: telemetry, grace
    /// wait, best-effort removal.
    async fn handle_failure(&self, err: &ProvisionerError, panicked: bool) {
        self.emit_result(false, Some(&err.chain()), panicked).await;

        info!(
            "waiting {:?} before cleanup (attempt {})",
            self.ctx.cleanup_wait, self.ctx.attempt_id
        );
        tokio::time::sleep(self.ctx.cleanup_wait).await;
        self.cleanup().await;
    }

    /// Remove every resource tagged as ours. Idempotent; a second invocation
    /// only repeats the best-effort removal.
    pub async fn cleanup(&self) {
        if let Err(remove_err) = self.engine.remove_labeled(RESOURCE_LABEL).await {
            error!("{}: {MANUAL_CLEANUP_MSG}", remove_err.chain());
        }
    }

    async fn emit_result(&self, success: bool, error_message: Option<&str>, panicked: bool) {
        let outcome = StartupOutcome {
            success,
            elapsed: self.ctx.started_at.elapsed(),
            infra_type: self.ctx.infra_type.clone(),
            error_message: error_message.map(str::to_string),
            panicked,
            has_built_image: false,
        };
        if let Err(track_err) = self
            .ctx
            .tracker
            .track(STARTUP_RESULT_EVENT, outcome.result_properties())
            .await
        {
            error!("failed to track startup result: {track_err}");
        }
    }

    async fn emit_time(&self, has_built_image: bool) {
        let outcome = StartupOutcome {
            success: true,
            elapsed: self.ctx.started_at.elapsed(),
            infra_type: self.ctx.infra_type.clone(),
            error_message: None,
            panicked: false,
            has_built_image,
        };
        if let Err(track_err) = self
            .ctx
            .tracker
            .track(STARTUP_TIME_EVENT, outcome.time_properties())
            .await
        {
            error!("failed to track startup time: {track_err}");
        }
    }
}

/// Explicit teardown for the `stop` path. Unlike the guard's best-effort
/// cleanup, a removal failure here is returned to the caller, with the
/// manual-remediation guidance attached.
pub async fn teardown<E: ContainerEngine>(engine: &E) -> ProvisionerResult<()> {
    engine
        .remove_labeled(RESOURCE_LABEL)
        .await
        .map_err(|err| err.with_context(MANUAL_CLEANUP_MSG))
}

/// Resolves on SIGINT/SIGTERM-equivalent. If the watcher cannot be installed
/// the arm never fires and provisioning proceeds unguarded.
async fn termination_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
