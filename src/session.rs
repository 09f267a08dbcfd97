//! Engine session bootstrap.
//!
//! Wraps the DataFusion `SessionContext` in a scoped handle that is acquired
//! once at the start of a run and released exactly once at the end of every
//! code path, including early-exit error paths.

use datafusion::execution::SessionStateBuilder;
use datafusion::execution::runtime_env::RuntimeEnvBuilder;
use datafusion::prelude::{SessionConfig, SessionContext};
use snafu::prelude::*;
use tracing::{debug, info};

use crate::config::{EngineConfig, MB};
use crate::error::{RuntimeSnafu, SessionError};

/// A scoped handle to the compute engine.
///
/// Construction is fatal on failure. The session carries a bounded memory
/// pool so a pathological input cannot exhaust the host; engine-internal log
/// verbosity is reduced by the subscriber filter installed in `main`.
pub struct EngineSession {
    ctx: SessionContext,
    memory_limit_mb: usize,
}

impl EngineSession {
    /// Initialize the engine with a bounded memory budget.
    pub fn new(config: &EngineConfig) -> Result<Self, SessionError> {
        let runtime = RuntimeEnvBuilder::new()
            .with_memory_limit(config.memory_limit_mb * MB, 1.0)
            .build_arc()
            .context(RuntimeSnafu)?;

        let session_config = SessionConfig::new().with_batch_size(config.batch_size);

        let state = SessionStateBuilder::new()
            .with_default_features()
            .with_config(session_config)
            .with_runtime_env(runtime)
            .build();

        let ctx = SessionContext::new_with_state(state);

        info!(
            "Engine session initialized ({} MiB memory budget, batch size {})",
            config.memory_limit_mb, config.batch_size
        );

        Ok(Self {
            ctx,
            memory_limit_mb: config.memory_limit_mb,
        })
    }

    /// The underlying compute handle.
    pub fn ctx(&self) -> &SessionContext {
        &self.ctx
    }

    /// Release the session.
    ///
    /// Consumes the handle so a released session cannot be reused.
    pub fn shutdown(self) {
        debug!(
            "Releasing engine session ({} MiB budget)",
            self.memory_limit_mb
        );
        info!("Engine session stopped");
    }
}
