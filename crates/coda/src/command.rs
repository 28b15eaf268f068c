//! Commands the host sends to the agent.

use serde::Serialize;
use serde_json::{Value, json};

use crate::context::ContextId;

/// `RunControl resume` modes understood by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    Resume,
    StepOver,
    StepInto,
    StepOverRange,
    StepIntoRange,
}

impl ResumeMode {
    pub fn code(self) -> u32 {
        match self {
            ResumeMode::Resume => 0,
            ResumeMode::StepOver => 1,
            ResumeMode::StepInto => 2,
            ResumeMode::StepOverRange => 3,
            ResumeMode::StepIntoRange => 4,
        }
    }
}

/// Breakpoint properties for `Breakpoints add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetBreakpoint {
    #[serde(rename = "ID")]
    pub id: String,
    pub enabled: bool,
    /// `0x` prefixed hex address.
    pub location: String,
    pub size: u64,
    pub context_ids: Vec<ContextId>,
    #[serde(rename = "THUMB")]
    pub thumb: bool,
    #[serde(rename = "Type")]
    pub kind: &'static str,
}

/// Arguments for `Processes start`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessStart {
    pub executable: String,
    pub arguments: Vec<String>,
    pub working_directory: String,
    pub libraries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    RunControlResume {
        context: ContextId,
        mode: ResumeMode,
        count: u32,
        /// Half-open `[from, to)` range for the range stepping modes.
        range: Option<(u64, u64)>,
    },
    RunControlSuspend {
        context: ContextId,
    },
    RunControlTerminate {
        context: ContextId,
    },
    RegistersGetChildren {
        context: ContextId,
    },
    /// Read several registers, answered with their big-endian values as one
    /// hex string.
    RegistersGetM {
        registers: Vec<ContextId>,
    },
    RegistersSet {
        register: ContextId,
        value: u32,
    },
    MemoryGet {
        context: ContextId,
        address: u64,
        size: u64,
    },
    MemorySet {
        context: ContextId,
        address: u64,
        data: Vec<u8>,
    },
    BreakpointsAdd(SetBreakpoint),
    BreakpointsRemove {
        ids: Vec<String>,
    },
    LoggingAddListener,
    ProcessesStart(ProcessStart),
}

impl Command {
    pub fn service(&self) -> &'static str {
        match self {
            Command::RunControlResume { .. }
            | Command::RunControlSuspend { .. }
            | Command::RunControlTerminate { .. } => "RunControl",
            Command::RegistersGetChildren { .. }
            | Command::RegistersGetM { .. }
            | Command::RegistersSet { .. } => "Registers",
            Command::MemoryGet { .. } | Command::MemorySet { .. } => "Memory",
            Command::BreakpointsAdd(_) | Command::BreakpointsRemove { .. } => "Breakpoints",
            Command::LoggingAddListener => "Logging",
            Command::ProcessesStart(_) => "Processes",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::RunControlResume { .. } => "resume",
            Command::RunControlSuspend { .. } => "suspend",
            Command::RunControlTerminate { .. } => "terminate",
            Command::RegistersGetChildren { .. } => "getChildren",
            Command::RegistersGetM { .. } => "getm",
            Command::RegistersSet { .. } => "set",
            Command::MemoryGet { .. } => "get",
            Command::MemorySet { .. } => "set",
            Command::BreakpointsAdd(_) => "add",
            Command::BreakpointsRemove { .. } => "remove",
            Command::LoggingAddListener => "addListener",
            Command::ProcessesStart(_) => "start",
        }
    }

    /// JSON arguments in wire order.
    pub fn arguments(&self) -> Vec<Value> {
        match self {
            Command::RunControlResume {
                context,
                mode,
                count,
                range,
            } => {
                let mut args = vec![json!(context), json!(mode.code()), json!(count)];
                if let Some((from, to)) = range {
                    args.push(json!({
                        "RANGE_START": from,
                        "RANGE_END": to,
                    }));
                }
                args
            }
            Command::RunControlSuspend { context }
            | Command::RunControlTerminate { context }
            | Command::RegistersGetChildren { context } => vec![json!(context)],
            Command::RegistersGetM { registers } => vec![json!(registers)],
            Command::RegistersSet { register, value } => vec![
                json!(register),
                json!(hex::encode(value.to_be_bytes())),
            ],
            Command::MemoryGet {
                context,
                address,
                size,
            } => vec![json!(context), json!(address), json!(1), json!(size), json!(0)],
            Command::MemorySet {
                context,
                address,
                data,
            } => vec![
                json!(context),
                json!(address),
                json!(1),
                json!(data.len()),
                json!(0),
                json!(hex::encode(data)),
            ],
            Command::BreakpointsAdd(bp) => vec![json!(bp)],
            Command::BreakpointsRemove { ids } => vec![json!(ids)],
            Command::LoggingAddListener => vec![json!("ProgramOutputConsoleLogger")],
            Command::ProcessesStart(start) => vec![
                json!(start.working_directory),
                json!(start.executable),
                json!(start.arguments),
                json!(start.libraries),
                json!(true),
            ],
        }
    }
}
