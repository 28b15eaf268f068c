//! Per-stop view of the inferior: threads, their registers and cached memory.

use crate::memory::{MemoryCache, MemoryRange};
use crate::registers::REGISTER_COUNT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: u32,
    pub registers: [u32; REGISTER_COUNT],
    /// Whether `registers` reflect the current stop.
    pub registers_valid: bool,
    /// Human readable state, reported through `qThreadExtraInfo`.
    pub state: String,
}

impl ThreadInfo {
    fn new(id: u32) -> Self {
        Self {
            id,
            registers: [0; REGISTER_COUNT],
            registers_valid: false,
            state: String::new(),
        }
    }
}

/// Line range recorded by `salstep`/`salnext` for the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRange {
    pub from: u64,
    pub to: u64,
    pub step_over: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ThreadSnapshot {
    threads: Vec<ThreadInfo>,
    pub memory: MemoryCache,
    /// The memory read GDB is waiting for.
    pub wanted: Option<MemoryRange>,
    pub step_range: Option<StepRange>,
    /// Bumped on every stop.
    generation: u64,
}

impl ThreadSnapshot {
    /// Drop everything that only holds for the previous stop. Threads stay,
    /// but their registers need reading again.
    pub fn reset(&mut self) {
        for thread in &mut self.threads {
            thread.registers_valid = false;
        }
        self.memory.clear();
        self.wanted = None;
        self.step_range = None;
        self.generation += 1;
    }

    /// Identifies the stop the snapshot describes. Data fetched under an
    /// older generation must not be cached.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn threads(&self) -> &[ThreadInfo] {
        &self.threads
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn thread(&self, id: u32) -> Option<&ThreadInfo> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn thread_mut(&mut self, id: u32) -> Option<&mut ThreadInfo> {
        self.threads.iter_mut().find(|t| t.id == id)
    }

    /// Look the thread up, adding it if it is new.
    pub fn add_thread(&mut self, id: u32) -> &mut ThreadInfo {
        match self.threads.iter().position(|t| t.id == id) {
            Some(index) => &mut self.threads[index],
            None => {
                tracing::debug!(tid = id, "new thread");
                self.threads.push(ThreadInfo::new(id));
                let last = self.threads.len() - 1;
                &mut self.threads[last]
            }
        }
    }

    pub fn remove_thread(&mut self, id: u32) -> bool {
        let before = self.threads.len();
        self.threads.retain(|t| t.id != id);
        self.threads.len() != before
    }

    /// Keep only the first thread. Others are rediscovered at the next stop.
    pub fn prune_to_first(&mut self) {
        self.threads.truncate(1);
    }

    pub fn invalidate_registers(&mut self, id: u32) {
        if let Some(thread) = self.thread_mut(id) {
            thread.registers_valid = false;
        }
    }

    pub fn registers_valid(&self, id: u32) -> bool {
        self.thread(id).is_some_and(|t| t.registers_valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn threads_are_unique() {
        let mut snapshot = ThreadSnapshot::default();
        snapshot.add_thread(1).state = "Running".to_string();
        snapshot.add_thread(2);
        snapshot.add_thread(1);
        assert_eq!(snapshot.thread_count(), 2);
        assert_eq!(snapshot.thread(1).unwrap().state, "Running");
    }

    #[test]
    fn prune_keeps_first_thread() {
        let mut snapshot = ThreadSnapshot::default();
        for id in [4, 5, 6] {
            snapshot.add_thread(id);
        }
        snapshot.prune_to_first();
        assert_eq!(snapshot.thread_count(), 1);
        assert!(snapshot.thread(4).is_some());
    }

    #[test]
    fn reset_keeps_threads() {
        let mut snapshot = ThreadSnapshot::default();
        snapshot.add_thread(1).registers_valid = true;
        snapshot
            .memory
            .insert(MemoryRange::new(0, 2), Bytes::from_static(b"ab"));
        snapshot.wanted = Some(MemoryRange::new(0, 1));
        let generation = snapshot.generation();

        snapshot.reset();
        assert_eq!(snapshot.generation(), generation + 1);
        assert!(snapshot.memory.is_empty());
        assert!(snapshot.wanted.is_none());
        assert_eq!(snapshot.thread_count(), 1);
        assert!(!snapshot.registers_valid(1));

        snapshot.add_thread(1).registers_valid = true;
        snapshot.invalidate_registers(1);
        assert!(!snapshot.registers_valid(1));
    }
}
