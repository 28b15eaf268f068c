//! Register numbering, formatting and name discovery.
//!
//! The agent exposes 17 registers: r0 to r15 followed by cpsr. GDB uses the
//! classic ARM layout, where r0 to r15 are followed by eight 12 byte FPA
//! registers, the FPA status register and then cpsr as register 25.

use coda::ContextId;

pub const REGISTER_COUNT: usize = 17;
pub const PC: usize = 15;
pub const CPSR: usize = 16;

/// GDB's number for cpsr.
pub const GDB_CPSR: usize = 25;

const FPA_REGISTERS: usize = 8;
const FPA_REGISTER_SIZE: usize = 12;
const FPS_SIZE: usize = 4;

/// Map a GDB register number onto the agent's register index.
pub fn coda_index(gdb_regnum: usize) -> Option<usize> {
    match gdb_regnum {
        0..=15 => Some(gdb_regnum),
        GDB_CPSR => Some(CPSR),
        _ => None,
    }
}

/// Size of the registers GDB knows about but the target does not have.
pub fn absent_register_size(gdb_regnum: usize) -> Option<usize> {
    match gdb_regnum {
        16..=23 => Some(FPA_REGISTER_SIZE),
        24 => Some(FPS_SIZE),
        _ => None,
    }
}

/// A register value in target (little-endian) byte order.
pub fn encode_value(value: u32) -> String {
    hex::encode(value.to_le_bytes())
}

pub fn decode_value(text: &[u8]) -> Option<u32> {
    let mut bytes = [0u8; 4];
    hex::decode_to_slice(text, &mut bytes).ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// The `g` reply: r0 to r15, zeroed FPA registers and status, then cpsr.
pub fn format_g(registers: &[u32; REGISTER_COUNT]) -> String {
    let mut out = String::with_capacity(2 * (16 * 4 + FPA_REGISTERS * FPA_REGISTER_SIZE + 8));
    for value in &registers[..16] {
        out.push_str(&encode_value(*value));
    }
    out.push_str(&"00".repeat(FPA_REGISTERS * FPA_REGISTER_SIZE + FPS_SIZE));
    out.push_str(&encode_value(registers[CPSR]));
    out
}

/// A register access that needs the register names first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterRequest {
    /// All registers for a `g` reply.
    Dump { thread: u32 },
    /// All registers for the stop reply following a suspension.
    StopReport { thread: u32, signal: u8 },
    Read { thread: u32, index: usize },
    Write { thread: u32, index: usize, value: u32 },
}

impl RegisterRequest {
    pub fn thread(&self) -> u32 {
        match self {
            RegisterRequest::Dump { thread }
            | RegisterRequest::StopReport { thread, .. }
            | RegisterRequest::Read { thread, .. }
            | RegisterRequest::Write { thread, .. } => *thread,
        }
    }
}

/// Register names are learnt from the agent once and shared by all threads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RegisterNames {
    #[default]
    Unknown,
    Discovering {
        deferred: Vec<RegisterRequest>,
    },
    /// Names relative to a thread context, e.g. `rGPR.R0`.
    Known(Vec<String>),
}

/// Outcome of one `getChildren` round during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// A single child, most likely a register group: look inside it.
    Descend(ContextId),
    Complete(Vec<String>),
    Failed(String),
}

pub fn discovery_step(thread: &ContextId, children: Vec<String>) -> Discovery {
    match children.len() {
        1 => Discovery::Descend(ContextId::new(children.into_iter().next().unwrap_or_default())),
        REGISTER_COUNT => {
            let prefix = format!("{thread}.");
            let names = children
                .into_iter()
                .map(|child| match child.strip_prefix(&prefix) {
                    Some(name) => name.to_string(),
                    None => child,
                })
                .collect();
            Discovery::Complete(names)
        }
        n => Discovery::Failed(format!(
            "expected {REGISTER_COUNT} registers below {thread}, got {n}"
        )),
    }
}

/// Full register ids for `thread`.
pub fn register_ids(thread: &ContextId, names: &[String]) -> Vec<ContextId> {
    names.iter().map(|name| thread.child(name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn children(thread: &str) -> Vec<String> {
        (0..REGISTER_COUNT)
            .map(|i| format!("{thread}.rGPR.R{i}"))
            .collect()
    }

    #[test]
    fn numbering() {
        assert_eq!(coda_index(0), Some(0));
        assert_eq!(coda_index(15), Some(PC));
        assert_eq!(coda_index(0x19), Some(CPSR));
        assert_eq!(coda_index(16), None);
        assert_eq!(absent_register_size(16), Some(12));
        assert_eq!(absent_register_size(24), Some(4));
        assert_eq!(absent_register_size(26), None);
    }

    #[test]
    fn values_are_little_endian() {
        assert_eq!(encode_value(0x1234_5678), "78563412");
        assert_eq!(decode_value(b"78563412"), Some(0x1234_5678));
        assert_eq!(decode_value(b"7856"), None);
    }

    #[test]
    fn g_layout() {
        let mut registers = [0u32; REGISTER_COUNT];
        registers[0] = 1;
        registers[CPSR] = 0x10;
        let g = format_g(&registers);
        assert_eq!(g.len(), 2 * (16 * 4 + 8 * 12 + 4 + 4));
        assert!(g.starts_with("01000000"));
        assert!(g.ends_with("0000000010000000"));
    }

    #[test]
    fn discovery_descends_then_strips_thread() {
        let thread = ContextId::thread(1, 2);
        assert_eq!(
            discovery_step(&thread, vec!["p1.t2.rGPR".to_string()]),
            Discovery::Descend(ContextId::from("p1.t2.rGPR"))
        );

        let Discovery::Complete(names) = discovery_step(&thread, children("p1.t2")) else {
            panic!("expected names");
        };
        assert_eq!(names[0], "rGPR.R0");
        assert_eq!(
            register_ids(&ContextId::thread(1, 5), &names[..1]),
            vec![ContextId::from("p1.t5.rGPR.R0")]
        );
    }

    #[test]
    fn discovery_rejects_wrong_count() {
        let thread = ContextId::thread(1, 2);
        assert!(matches!(
            discovery_step(&thread, vec!["a".to_string(), "b".to_string()]),
            Discovery::Failed(_)
        ));
    }
}
