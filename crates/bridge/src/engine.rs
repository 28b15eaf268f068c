//! The debugger front end driving the bridge.
//!
//! The bridge reports lifecycle changes through [`EngineNotifier`] and is
//! driven through [`EngineCommand`]s.

use std::path::PathBuf;

use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    AdapterStarted,
    SetupSucceeded {
        pid: u32,
        main_thread: Option<u32>,
    },
    SetupFailed(String),
    /// Symbols for the executable should be loaded at these segment bases.
    LoadSymbolFile {
        module: String,
        symbol_file: Option<PathBuf>,
        code_segment: u64,
        data_segment: u64,
    },
    /// GDB can now attach to the bridge as a remote target.
    AttachRemoteTarget,
    ApplicationOutput(String),
    InferiorCrashed {
        thread: u32,
        reason: String,
    },
    InferiorExited,
    ShutdownFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    SetupInferior,
    InterruptInferior,
    Shutdown,
}

pub trait EngineNotifier: Send {
    fn notify(&self, event: EngineEvent);
}

impl EngineNotifier for mpsc::UnboundedSender<EngineEvent> {
    fn notify(&self, event: EngineEvent) {
        if let Err(e) = self.send(event) {
            tracing::debug!(event = ?e.0, "engine has gone away");
        }
    }
}
