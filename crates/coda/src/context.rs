use std::fmt;

use serde::{Deserialize, Serialize};

/// What a context id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Process,
    Thread,
    /// Register groups and anything else below a thread.
    Other,
}

/// CODA execution context id.
///
/// Processes are `p<pid>`, threads `p<pid>.t<tid>`, both decimal. Register
/// contexts hang below a thread, e.g. `p12.t34.rGPR.R0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn process(pid: u32) -> Self {
        Self(format!("p{pid}"))
    }

    pub fn thread(pid: u32, tid: u32) -> Self {
        Self(format!("p{pid}.t{tid}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A child context, `<self>.<name>`.
    pub fn child(&self, name: &str) -> Self {
        Self(format!("{}.{name}", self.0))
    }

    pub fn kind(&self) -> ContextKind {
        let mut parts = self.0.split('.');
        let process = parts.next().and_then(|p| parse_component(p, 'p'));
        let thread = parts.next().map(|t| parse_component(t, 't'));
        match (process, thread, parts.next()) {
            (Some(_), None, None) => ContextKind::Process,
            (Some(_), Some(Some(_)), None) => ContextKind::Thread,
            _ => ContextKind::Other,
        }
    }

    pub fn process_id(&self) -> Option<u32> {
        self.0.split('.').next().and_then(|p| parse_component(p, 'p'))
    }

    pub fn thread_id(&self) -> Option<u32> {
        self.0.split('.').nth(1).and_then(|t| parse_component(t, 't'))
    }
}

fn parse_component(part: &str, prefix: char) -> Option<u32> {
    part.strip_prefix(prefix)?.parse().ok()
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ContextId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_and_thread_ids() {
        let thread = ContextId::thread(12, 34);
        assert_eq!(thread.as_str(), "p12.t34");
        assert_eq!(thread.kind(), ContextKind::Thread);
        assert_eq!(thread.process_id(), Some(12));
        assert_eq!(thread.thread_id(), Some(34));

        let process = ContextId::process(12);
        assert_eq!(process.kind(), ContextKind::Process);
        assert_eq!(process.thread_id(), None);
    }

    #[test]
    fn register_contexts_are_other() {
        let group = ContextId::thread(1, 2).child("rGPR");
        assert_eq!(group.as_str(), "p1.t2.rGPR");
        assert_eq!(group.kind(), ContextKind::Other);
        assert_eq!(group.thread_id(), Some(2));
        assert_eq!(ContextId::from("bogus").kind(), ContextKind::Other);
    }
}
