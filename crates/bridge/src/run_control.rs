//! Resume, step and stop handling.

use coda::ResumeMode;

use crate::error::BridgeError;
use crate::registers::{self, CPSR, GDB_CPSR, REGISTER_COUNT};
use crate::snapshot::StepRange;

pub const SIGTRAP: u8 = 5;
pub const SIGSEGV: u8 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeKind {
    Continue,
    Step,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Idle,
    Running(ResumeKind),
    Stopped,
}

impl RunState {
    /// GDB asked the target to run. A running target is left alone.
    pub fn resume(&mut self, kind: ResumeKind) -> Result<(), BridgeError> {
        self.transition(RunState::Running(kind))
    }

    /// The agent reported a suspension. A target that is already stopped
    /// stays stopped and the transition is refused.
    pub fn stop(&mut self) -> Result<(), BridgeError> {
        self.transition(RunState::Stopped)
    }

    fn transition(&mut self, to: RunState) -> Result<(), BridgeError> {
        let allowed = matches!(
            (*self, to),
            (RunState::Idle | RunState::Stopped, RunState::Running(_))
                | (RunState::Idle | RunState::Running(_), RunState::Stopped)
        );
        if !allowed {
            return Err(BridgeError::InvalidTransition { from: *self, to });
        }
        *self = to;
        Ok(())
    }
}

/// Exceptions and panics become SIGSEGV so GDB reports a crash; anything else
/// is a trap.
pub fn signal_for_reason(reason: &str) -> u8 {
    let reason = reason.to_ascii_lowercase();
    if reason.contains("exception") || reason.contains("panic") {
        SIGSEGV
    } else {
        SIGTRAP
    }
}

/// Resume mode and range for a single step from `pc`.
///
/// The recorded line range is used only if `pc` lies inside it; otherwise the
/// step covers a single instruction.
pub fn step_plan(step: Option<StepRange>, pc: u64) -> (ResumeMode, Option<(u64, u64)>) {
    let step_over = step.is_some_and(|s| s.step_over);
    match step {
        Some(StepRange { from, to, .. }) if from <= pc && pc < to => {
            let mode = if step_over {
                ResumeMode::StepOverRange
            } else {
                ResumeMode::StepIntoRange
            };
            (mode, Some((from, to)))
        }
        _ => {
            let mode = if step_over {
                ResumeMode::StepOver
            } else {
                ResumeMode::StepInto
            };
            (mode, None)
        }
    }
}

/// `T<sig>thread:<id>;` followed by r0 to r15 and cpsr.
pub fn stop_reply(signal: u8, thread: u32, registers: &[u32; REGISTER_COUNT]) -> String {
    let mut reply = format!("T{signal:02x}thread:{thread:x};");
    for (regnum, value) in registers[..16].iter().enumerate() {
        reply.push_str(&format!("{regnum:02x}:{};", registers::encode_value(*value)));
    }
    reply.push_str(&format!(
        "{GDB_CPSR:02x}:{};",
        registers::encode_value(registers[CPSR])
    ));
    reply
}
