//! Process level state of one debugging session.

use coda::ContextId;

/// How far the session has come since the adapter was started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Bootstrap {
    /// Connected to the agent, waiting for its hello.
    #[default]
    AwaitingHello,
    Connected,
    ProcessStarted,
    /// The executable has been loaded and GDB may attach.
    Attached,
    Terminated,
}

impl Bootstrap {
    pub fn name(self) -> &'static str {
        match self {
            Bootstrap::AwaitingHello => "awaiting hello",
            Bootstrap::Connected => "connected",
            Bootstrap::ProcessStarted => "process started",
            Bootstrap::Attached => "attached",
            Bootstrap::Terminated => "terminated",
        }
    }
}

/// A shared library loaded into the inferior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub name: String,
    pub code_segment: u64,
    pub data_segment: u64,
    pub pid: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub bootstrap: Bootstrap,
    pub pid: Option<u32>,
    main_thread: Option<u32>,
    pub current_thread: Option<u32>,
    pub code_segment_base: u64,
    pub data_segment_base: u64,
    pub libraries: Vec<Library>,
    pub modules: Vec<String>,
}

impl Session {
    /// State left behind once a session has been torn down.
    pub fn terminated() -> Self {
        Self {
            bootstrap: Bootstrap::Terminated,
            ..Self::default()
        }
    }

    pub fn main_thread(&self) -> Option<u32> {
        self.main_thread
    }

    /// Record the first thread ever reported. Later calls have no effect.
    pub fn note_thread(&mut self, tid: u32) {
        if self.main_thread.is_none() {
            tracing::debug!(tid, "main thread");
            self.main_thread = Some(tid);
        }
        if self.current_thread.is_none() {
            self.current_thread = Some(tid);
        }
    }

    pub fn process_context(&self) -> Option<ContextId> {
        self.pid.map(ContextId::process)
    }

    pub fn thread_context(&self, tid: u32) -> Option<ContextId> {
        self.pid.map(|pid| ContextId::thread(pid, tid))
    }

    pub fn main_thread_context(&self) -> Option<ContextId> {
        self.thread_context(self.main_thread?)
    }

    /// Add a library unless one with the same name is already known.
    pub fn add_library(&mut self, library: Library) -> bool {
        if self.libraries.iter().any(|l| l.name == library.name) {
            return false;
        }
        self.libraries.push(library);
        true
    }

    pub fn remove_library(&mut self, name: &str) -> Option<Library> {
        let index = self.libraries.iter().position(|l| l.name == name)?;
        Some(self.libraries.remove(index))
    }
}
