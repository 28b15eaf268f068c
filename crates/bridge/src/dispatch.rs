//! GDB packet handling.
//!
//! Each packet body is matched against a flat table, literal commands first,
//! then prefixes. The first match wins. Anything unrecognised is logged and
//! left without a reply.

use coda::{Command, SetBreakpoint};
use rsp::packet::{self, parse_hex};
use tracing::{debug, info, warn};

use crate::breakpoint::BreakpointId;
use crate::bridge::ProtocolBridge;
use crate::memory::MemoryRange;
use crate::pending_calls::Continuation;
use crate::registers::{self, RegisterRequest};
use crate::snapshot::StepRange;

const SUPPORTED: &str =
    "PacketSize=7cf;QPassSignals+;QStartNoAckMode+;qXfer:libraries:read+;qXfer:features:read+";

const TARGET_XML: &str = concat!(
    "l<?xml version=\"1.0\"?>",
    "<!DOCTYPE target SYSTEM \"gdb-target.dtd\">",
    "<target><architecture>arm</architecture></target>"
);

fn hex(text: &str) -> Option<u64> {
    parse_hex(text.as_bytes())
}

/// Escape text for use inside a double quoted XML attribute.
fn xml_attribute(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// `<addr>,<len>`
fn address_and_length(text: &str) -> Option<(u64, u64)> {
    let (address, length) = text.split_once(',')?;
    Some((hex(address)?, hex(length)?))
}

impl ProtocolBridge {
    pub(crate) fn dispatch(&mut self, body: &[u8]) {
        // Binary payload, so this one is matched before any UTF-8 conversion.
        if let Some(args) = body.strip_prefix(b"X") {
            debug!(len = body.len(), "gdb: -> X");
            self.write_memory(args);
            return;
        }

        let Ok(command) = std::str::from_utf8(body) else {
            warn!(?body, "ignoring packet that is not UTF-8");
            return;
        };
        debug!(packet = command, "gdb: ->");

        match command {
            "!" => self.reply("OK", "extended mode"),
            "?" => self.reply("S05", "last signal"),
            "c" => self.continue_inferior(),
            "D" => self.reply("OK", "detach"),
            "g" => self.read_all_registers(false),
            "gg" => self.read_all_registers(true),
            "k" => self.kill(),
            "qC" => {
                let thread = self.current_thread().unwrap_or_default();
                self.reply(format!("QC{thread:x}"), "current thread");
            }
            "qTStatus" => self.reply("T0;tnotrun:0", "no trace experiment"),
            "qTfV" | "qTsP" | "qTfP" => self.reply("", "tracepoints unsupported"),
            "qfDllInfo" => {
                let info = self.dll_info();
                self.reply(info, "library list");
            }
            "qsDllInfo" => self.reply("l", "end of library list"),
            "qPacketInfo" => self.reply("", "packet info"),
            "qOffsets" => {
                let offsets = format!(
                    "TextSeg={:x};DataSeg={:x}",
                    self.session.code_segment_base, self.session.data_segment_base
                );
                self.reply(offsets, "section offsets");
            }
            "qSymbol::" => self.reply("OK", "no symbols needed"),
            "qfThreadInfo" => {
                let list = self.thread_list();
                self.reply(list, "thread list");
            }
            "qsThreadInfo" => self.reply("l", "end of thread list"),
            "QStartNoAckMode" => {
                self.reply("OK", "no-ack mode");
                self.framer.disable_ack_mode();
            }
            "s" => self.step_inferior(),
            "vCont?" => self.reply("vCont;c;C;s;S", "supported resume actions"),
            _ => self.dispatch_prefixed(command),
        }
    }

    fn dispatch_prefixed(&mut self, command: &str) {
        if let Some(args) = command.strip_prefix("salstep,") {
            self.record_step_range(args, false);
        } else if let Some(args) = command.strip_prefix("salnext,") {
            self.record_step_range(args, true);
        } else if let Some(id) = command
            .strip_prefix("Hc")
            .or_else(|| command.strip_prefix("Hg"))
        {
            self.set_current_thread(id);
        } else if command.starts_with("vKill") {
            self.kill();
            self.reply("OK", "killed");
        } else if let Some(args) = command.strip_prefix('m') {
            self.read_memory(args);
        } else if let Some(args) = command.strip_prefix('p') {
            self.read_register(args);
        } else if let Some(args) = command.strip_prefix('P') {
            self.write_register(args);
        } else if command.starts_with("qAttached") {
            self.reply("1", "attached");
        } else if command.starts_with("qSupported") {
            self.reply(SUPPORTED, "supported features");
        } else if let Some(id) = command.strip_prefix("qThreadExtraInfo,") {
            let text = self.thread_extra_info(id);
            self.reply(hex::encode(text.as_bytes()), &text);
        } else if command.starts_with("qXfer:features:read:target.xml:") {
            self.reply(TARGET_XML, "target description");
        } else if command.starts_with("qXfer:libraries:read") {
            let xml = self.library_list();
            self.reply(xml, "library list");
        } else if command.starts_with("QPassSignals") {
            self.reply("OK", "pass signals");
        } else if command.starts_with("qPart:") || command.starts_with("qXfer:") {
            warn!(packet = command, "unsupported transfer request");
            self.reply("E20", "unsupported transfer");
        } else if command.starts_with("vCont;s") || command.starts_with("vCont;S") {
            self.step_inferior();
        } else if command.starts_with("vCont;c") || command.starts_with("vCont;C") {
            self.continue_inferior();
        } else if let Some(args) = command.strip_prefix("Z0,") {
            self.set_breakpoint(args, false);
        } else if let Some(args) = command.strip_prefix("Z1,") {
            self.set_breakpoint(args, true);
        } else if let Some(args) = command
            .strip_prefix("z0,")
            .or_else(|| command.strip_prefix("z1,"))
        {
            self.remove_breakpoint(args);
        } else if let Some(args) = command.strip_prefix('C') {
            self.continue_with_signal(args);
        } else if command.starts_with('D') {
            self.reply("OK", "detach");
        } else if command.starts_with('T') {
            self.reply("OK", "thread alive");
        } else {
            warn!(packet = command, "unsupported packet");
        }
    }

    fn continue_with_signal(&mut self, args: &str) {
        let signal = args.split(';').next().and_then(hex);
        warn!(?signal, "continuing with a signal is not implemented");
        self.reply(
            format!("O{}", hex::encode(b"Console output")),
            "console output",
        );
        self.reply("W81", "exited");
        self.continue_inferior();
    }

    fn read_all_registers(&mut self, invalidate: bool) {
        let Some(thread) = self.current_thread() else {
            warn!("register read without a thread");
            self.reply("E20", "no thread");
            return;
        };
        if invalidate {
            self.snapshot.invalidate_registers(thread);
        }
        self.request_registers(RegisterRequest::Dump { thread });
    }

    fn read_register(&mut self, args: &str) {
        let Some(regnum) = hex(args).and_then(|r| usize::try_from(r).ok()) else {
            warn!(args, "malformed register read");
            self.reply("E20", "malformed register read");
            return;
        };
        match registers::coda_index(regnum) {
            Some(index) => {
                let Some(thread) = self.current_thread() else {
                    self.reply("E20", "no thread");
                    return;
                };
                self.request_registers(RegisterRequest::Read { thread, index });
            }
            None => match registers::absent_register_size(regnum) {
                Some(size) => self.reply("00".repeat(size), "absent register"),
                None => {
                    warn!(regnum, "unknown register");
                    self.reply("E20", "unknown register");
                }
            },
        }
    }

    fn write_register(&mut self, args: &str) {
        let parsed = args.split_once('=').and_then(|(regnum, value)| {
            let regnum = usize::try_from(hex(regnum)?).ok()?;
            Some((regnum, registers::decode_value(value.as_bytes())?))
        });
        let Some((regnum, value)) = parsed else {
            warn!(args, "malformed register write");
            self.reply("E21", "malformed register write");
            return;
        };

        let Some(index) = registers::coda_index(regnum) else {
            if registers::absent_register_size(regnum).is_some() {
                self.reply("OK", "absent register ignored");
            } else {
                warn!(regnum, "unknown register");
                self.reply("E21", "unknown register");
            }
            return;
        };
        let Some(thread) = self.current_thread() else {
            self.reply("E21", "no thread");
            return;
        };

        if let Some(info) = self.snapshot.thread_mut(thread) {
            info.registers[index] = value;
        }
        self.request_registers(RegisterRequest::Write {
            thread,
            index,
            value,
        });
    }

    fn read_memory(&mut self, args: &str) {
        let Some((address, length)) = address_and_length(args) else {
            warn!(args, "malformed memory read");
            self.reply("E20", "malformed memory read");
            return;
        };
        if length == 0 {
            self.reply("", "empty memory read");
            return;
        }
        if let Some(previous) = self.snapshot.wanted {
            warn!(%previous, "memory read replaced before it was answered");
        }
        self.snapshot.wanted = Some(MemoryRange::with_len(address, length));
        self.serve_memory();
    }

    fn write_memory(&mut self, args: &[u8]) {
        let Some(colon) = args.iter().position(|&b| b == b':') else {
            warn!("memory write without data separator");
            self.reply("E20", "malformed memory write");
            return;
        };
        let header = std::str::from_utf8(&args[..colon])
            .ok()
            .and_then(address_and_length);
        let Some((address, length)) = header else {
            warn!("malformed memory write");
            self.reply("E20", "malformed memory write");
            return;
        };
        if length == 0 {
            self.reply("OK", "empty memory write");
            return;
        }

        let data = packet::unescape_binary(&args[colon + 1..]);
        if data.len() as u64 != length {
            warn!(
                expected = length,
                received = data.len(),
                "memory write length mismatch"
            );
            self.reply("E20", "memory write length mismatch");
            return;
        }
        let Some(context) = self.session.process_context() else {
            self.reply("E21", "no process");
            return;
        };

        let range = MemoryRange::with_len(address, length);
        debug!(%range, "writing memory");
        self.send_command(
            Command::MemorySet {
                context,
                address,
                data,
            },
            Continuation::WriteMemory { range },
        );
    }

    fn record_step_range(&mut self, args: &str, step_over: bool) {
        let Some((from, to)) = address_and_length(args) else {
            warn!(args, "malformed step range");
            self.reply("", "malformed step range");
            return;
        };
        self.snapshot.step_range = Some(StepRange {
            from,
            to,
            step_over,
        });
        self.reply("", &format!("Stepping range received {from:#x}-{to:#x}"));
    }

    fn set_current_thread(&mut self, id: &str) {
        let requested = if id.starts_with('-') {
            None
        } else {
            hex(id)
                .and_then(|tid| u32::try_from(tid).ok())
                .filter(|tid| self.snapshot.thread(*tid).is_some())
        };
        if requested.is_none() && !matches!(id, "-1" | "0") {
            debug!(id, "unknown thread selected, using the main thread");
        }
        if let Some(thread) = requested.or(self.session.main_thread()) {
            self.session.current_thread = Some(thread);
        }
        self.reply("OK", "current thread set");
    }

    fn kill(&mut self) {
        let Some(context) = self
            .session
            .main_thread_context()
            .or_else(|| self.session.process_context())
        else {
            warn!("kill requested without a process");
            return;
        };
        info!(%context, "killing inferior");
        self.send_command(
            Command::RunControlTerminate { context },
            Continuation::Terminate,
        );
    }

    fn set_breakpoint(&mut self, args: &str, hardware: bool) {
        let args = args.split(';').next().unwrap_or_default();
        let Some((address, length)) = address_and_length(args) else {
            warn!(args, "malformed breakpoint");
            self.reply("E21", "malformed breakpoint");
            return;
        };
        let Some(context) = self.session.process_context() else {
            self.reply("E21", "no process");
            return;
        };

        let id = BreakpointId::from_address(address);
        info!(%id, hardware, "setting breakpoint");
        self.send_command(
            Command::BreakpointsAdd(SetBreakpoint {
                id: id.to_string(),
                enabled: true,
                location: format!("{address:#x}"),
                size: length,
                context_ids: vec![context],
                thumb: length == 2,
                kind: if hardware { "Hardware" } else { "Software" },
            }),
            Continuation::SetBreakpoint {
                id: id.into_string(),
            },
        );
    }

    fn remove_breakpoint(&mut self, args: &str) {
        let Some((address, _)) = address_and_length(args.split(';').next().unwrap_or_default())
        else {
            warn!(args, "malformed breakpoint");
            self.reply("OK", "malformed breakpoint ignored");
            return;
        };
        let id = BreakpointId::from_address(address);
        info!(%id, "removing breakpoint");
        self.send_command(
            Command::BreakpointsRemove {
                ids: vec![id.to_string()],
            },
            Continuation::RemoveBreakpoint {
                id: id.into_string(),
            },
        );
    }

    fn thread_list(&self) -> String {
        let threads = self.snapshot.threads();
        if threads.is_empty() {
            return "l".to_string();
        }
        let ids: Vec<String> = threads.iter().map(|t| format!("{:x}", t.id)).collect();
        format!("m{}", ids.join(","))
    }

    fn thread_extra_info(&self, id: &str) -> String {
        hex(id)
            .and_then(|tid| u32::try_from(tid).ok())
            .and_then(|tid| self.snapshot.thread(tid))
            .map(|thread| thread.state.clone())
            .filter(|state| !state.is_empty())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    fn dll_info(&self) -> String {
        if self.session.libraries.is_empty() {
            return "l".to_string();
        }
        let entries: Vec<String> = self
            .session
            .libraries
            .iter()
            .map(|lib| {
                format!(
                    "Name={},TextSeg={:x},DataSeg={:x}",
                    hex::encode(lib.name.as_bytes()),
                    lib.code_segment,
                    lib.data_segment
                )
            })
            .collect();
        format!("m{}", entries.join(";"))
    }

    fn library_list(&self) -> String {
        let mut xml = String::from("l<library-list>");
        for lib in &self.session.libraries {
            xml.push_str(&format!(
                "<library name=\"{}\"><segment address=\"{:#x}\"/></library>",
                xml_attribute(&lib.name),
                lib.code_segment
            ));
        }
        xml.push_str("</library-list>");
        xml
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_escaping() {
        assert_eq!(xml_attribute("euser.dll"), "euser.dll");
        assert_eq!(
            xml_attribute(r#"a&b<c>"d'"#),
            "a&amp;b&lt;c&gt;&quot;d&apos;"
        );
    }

    #[test]
    fn address_pairs() {
        assert_eq!(address_and_length("1000,4"), Some((0x1000, 4)));
        assert_eq!(address_and_length("1000"), None);
        assert_eq!(address_and_length("zz,4"), None);
    }
}
