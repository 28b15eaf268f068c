use bytes::Bytes;
use coda::{
    CodaError, Command, ContextId, ContextKind, Event, Incoming, ModuleLoad, ProcessStart, Reply,
    Request, ResumeMode, payload,
};
use config::Config;
use rsp::{RspEvent, RspFramer};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::device::DeviceRegistry;
use crate::engine::{EngineCommand, EngineEvent, EngineNotifier};
use crate::error::BridgeError;
use crate::memory::{self, FetchMode, MemoryRange, Plan};
use crate::pending_calls::{Continuation, PendingCalls};
use crate::registers::{
    self, Discovery, PC, REGISTER_COUNT, RegisterNames, RegisterRequest, register_ids,
};
use crate::run_control::{self, ResumeKind, RunState, SIGSEGV};
use crate::session::{Bootstrap, Library, Session};
use crate::snapshot::ThreadSnapshot;

type CodaResult = Result<Vec<Value>, CodaError>;

/// Settings fixed for the lifetime of a bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Name of the device claimed in the [`DeviceRegistry`].
    pub device: String,
    pub max_packet_size: usize,
    pub memory: FetchMode,
    pub inferior: config::InferiorConfig,
}

impl BridgeOptions {
    pub fn new(device: impl Into<String>, config: &Config) -> Self {
        let memory = if config.memory.buffered {
            FetchMode::Buffered {
                chunk_size: config.memory.chunk_size,
            }
        } else {
            FetchMode::Unbuffered
        };
        Self {
            device: device.into(),
            max_packet_size: config.gdb.max_packet_size,
            memory,
            inferior: config.inferior.clone(),
        }
    }
}

/// Translates between one GDB client and one CODA agent.
///
/// The bridge does no I/O itself. Bytes from GDB go into
/// [`ProtocolBridge::handle_gdb_input`], messages from the agent into
/// [`ProtocolBridge::handle_coda`]. Replies for GDB and requests for the agent
/// leave through the channels handed to [`ProtocolBridge::connect_gdb`] and
/// [`ProtocolBridge::start_adapter`].
pub struct ProtocolBridge {
    options: BridgeOptions,
    pub(crate) framer: RspFramer,
    coda: Option<mpsc::UnboundedSender<Request>>,
    pending: PendingCalls,
    pub(crate) session: Session,
    pub(crate) snapshot: ThreadSnapshot,
    pub(crate) run_state: RunState,
    register_names: RegisterNames,
    devices: DeviceRegistry,
    device_acquired: bool,
    engine: Box<dyn EngineNotifier>,
}

impl ProtocolBridge {
    pub fn new(
        options: BridgeOptions,
        devices: DeviceRegistry,
        engine: impl EngineNotifier + 'static,
    ) -> Self {
        Self {
            framer: RspFramer::new(options.max_packet_size),
            options,
            coda: None,
            pending: PendingCalls::default(),
            session: Session::default(),
            snapshot: ThreadSnapshot::default(),
            run_state: RunState::default(),
            register_names: RegisterNames::default(),
            devices,
            device_acquired: false,
            engine: Box::new(engine),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn snapshot(&self) -> &ThreadSnapshot {
        &self.snapshot
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn register_names(&self) -> &RegisterNames {
        &self.register_names
    }

    /// Number of agent calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.session.bootstrap == Bootstrap::Terminated
    }

    pub fn ack_mode(&self) -> bool {
        self.framer.ack_mode()
    }

    pub fn connect_gdb(&mut self, output: mpsc::UnboundedSender<Bytes>) {
        info!("gdb connected");
        self.framer.connect(output);
    }

    pub fn disconnect_gdb(&mut self) {
        info!("gdb disconnected");
        self.framer.disconnect();
    }

    /// Feed bytes received from GDB.
    pub fn handle_gdb_input(&mut self, bytes: &[u8]) {
        for event in self.framer.feed(bytes) {
            match event {
                RspEvent::Ack | RspEvent::Nak => {}
                RspEvent::Interrupt => {
                    info!("interrupt requested by gdb");
                    if let Err(e) = self.interrupt_inferior() {
                        warn!(error = %e, "cannot interrupt");
                    }
                }
                RspEvent::Packet(packet) => {
                    if let Err(e) = self.framer.send_ack() {
                        warn!(error = %e, "could not acknowledge packet");
                    }
                    self.dispatch(&packet.body);
                }
            }
        }
    }

    pub(crate) fn reply(&self, body: impl AsRef<[u8]>, note: &str) {
        if let Err(e) = self.framer.send_packet(body.as_ref(), note) {
            warn!(error = %e, note, "could not reply to gdb");
        }
    }

    /// Claim the device and start a fresh session talking to the agent
    /// through `coda`.
    #[tracing::instrument(skip(self, coda), fields(device = %self.options.device))]
    pub fn start_adapter(
        &mut self,
        coda: mpsc::UnboundedSender<Request>,
    ) -> Result<(), BridgeError> {
        if self.device_acquired {
            return Err(BridgeError::InvalidState {
                action: "start the adapter",
                state: self.session.bootstrap.name(),
            });
        }
        self.devices.acquire(&self.options.device)?;
        self.device_acquired = true;

        self.pending.invalidate_all();
        self.session = Session::default();
        self.snapshot = ThreadSnapshot::default();
        self.run_state = RunState::Idle;
        self.coda = Some(coda);
        info!("adapter started, waiting for the agent");
        Ok(())
    }

    /// Start the configured executable on the device.
    #[tracing::instrument(skip(self))]
    pub fn setup_inferior(&mut self) -> Result<(), BridgeError> {
        if !self.device_acquired {
            return Err(BridgeError::NoSession);
        }
        if self.session.bootstrap != Bootstrap::Connected {
            return Err(BridgeError::InvalidState {
                action: "start the inferior",
                state: self.session.bootstrap.name(),
            });
        }

        let inferior = &self.options.inferior;
        let start = ProcessStart {
            executable: inferior.executable.clone(),
            arguments: inferior.arguments.clone(),
            working_directory: inferior.working_directory.clone(),
            libraries: inferior.libraries.clone(),
        };
        info!(executable = %start.executable, "starting inferior");
        self.send_command(Command::ProcessesStart(start), Continuation::ProcessStart);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn interrupt_inferior(&mut self) -> Result<(), BridgeError> {
        let context = self
            .session
            .process_context()
            .ok_or(BridgeError::NoProcess("interrupt"))?;
        self.send_command(
            Command::RunControlSuspend { context },
            Continuation::Suspend,
        );
        Ok(())
    }

    /// End the session: terminate the inferior and release the device.
    #[tracing::instrument(skip(self))]
    pub fn shutdown_adapter(&mut self) {
        self.teardown(true);
    }

    /// The agent connection closed underneath us.
    pub fn agent_disconnected(&mut self) {
        error!("lost connection to the agent");
        self.coda = None;
        self.teardown(false);
    }

    pub fn handle_engine_command(&mut self, command: EngineCommand) {
        debug!(?command, "engine command");
        match command {
            EngineCommand::SetupInferior => {
                if let Err(e) = self.setup_inferior() {
                    error!(error = %e, "could not start the inferior");
                    self.engine.notify(EngineEvent::SetupFailed(e.to_string()));
                }
            }
            EngineCommand::InterruptInferior => {
                if let Err(e) = self.interrupt_inferior() {
                    warn!(error = %e, "cannot interrupt");
                }
            }
            EngineCommand::Shutdown => self.shutdown_adapter(),
        }
    }

    fn teardown(&mut self, terminate_process: bool) {
        if self.is_terminated() {
            debug!("already shut down");
            return;
        }

        if terminate_process && let Some(context) = self.session.process_context() {
            info!(%context, "terminating inferior");
            self.send_command(
                Command::RunControlTerminate { context },
                Continuation::Terminate,
            );
        }

        let dropped = self.pending.invalidate_all();
        if dropped > 0 {
            info!(dropped, "invalidated outstanding agent calls");
        }

        if self.device_acquired {
            self.devices.release(&self.options.device);
            self.device_acquired = false;
        }

        self.coda = None;
        self.session = Session::terminated();
        self.snapshot = ThreadSnapshot::default();
        self.run_state = RunState::Idle;
        self.engine.notify(EngineEvent::ShutdownFinished);
        info!("adapter shut down");
    }

    pub(crate) fn send_command(&mut self, command: Command, continuation: Continuation) {
        let token = self.pending.register(continuation);
        debug!(
            token,
            service = command.service(),
            name = command.name(),
            "coda: ->"
        );
        let delivered = self
            .coda
            .as_ref()
            .is_some_and(|coda| coda.send(Request { token, command }).is_ok());

        if !delivered {
            error!(token, "agent connection unavailable");
            if let Some(continuation) = self.pending.take(token) {
                self.complete(continuation, Err(CodaError::Disconnected));
            }
        }
    }

    /// Feed a message received from the agent.
    pub fn handle_coda(&mut self, incoming: Incoming) {
        match incoming {
            Incoming::Reply(reply) => self.handle_reply(reply),
            Incoming::Event(event) => self.handle_event(event),
        }
    }

    fn handle_reply(&mut self, reply: Reply) {
        let Some(continuation) = self.pending.take(reply.token) else {
            warn!(token = reply.token, "reply for an unknown or invalidated call");
            return;
        };
        debug!(token = reply.token, ?continuation, ok = reply.result.is_ok(), "coda: <-");
        self.complete(continuation, reply.result);
    }

    fn complete(&mut self, continuation: Continuation, result: CodaResult) {
        match continuation {
            Continuation::LoggingListener => match result {
                Ok(_) => debug!("logging listener installed"),
                Err(e) => warn!(error = %e, "could not install logging listener"),
            },
            Continuation::ProcessStart => self.on_process_started(result),
            Continuation::RegisterChildren { thread } => self.on_register_children(thread, result),
            Continuation::ReadRegisters {
                thread,
                stop_signal,
            } => self.on_registers_read(thread, stop_signal, result),
            Continuation::ReadRegister { thread, index } => {
                self.on_register_read(thread, index, result)
            }
            Continuation::WriteRegister { thread, index } => match result {
                Ok(_) => self.reply("OK", "register written"),
                Err(e) => {
                    error!(error = %e, thread, index, "register write failed");
                    self.reply("E21", "register write failed");
                }
            },
            Continuation::ReadMemory {
                range,
                needed,
                buffered,
                generation,
            } => self.on_memory_read(range, needed, buffered, generation, result),
            Continuation::WriteMemory { range } => match result {
                Ok(_) => {
                    self.snapshot.memory.clear();
                    self.reply("OK", "memory written");
                }
                Err(e) => {
                    error!(error = %e, %range, "memory write failed");
                    self.reply("E21", "memory write failed");
                }
            },
            Continuation::SetBreakpoint { id } => match result {
                Ok(_) => self.reply("OK", &format!("breakpoint {id} set")),
                Err(e) => {
                    error!(error = %e, %id, "could not set breakpoint");
                    self.reply("E21", "breakpoint not set");
                }
            },
            Continuation::RemoveBreakpoint { id } => {
                if let Err(e) = result {
                    error!(error = %e, %id, "could not remove breakpoint");
                }
                self.reply("OK", &format!("breakpoint {id} removed"));
            }
            Continuation::Continue => {
                if let Err(e) = result {
                    error!(error = %e, "resume failed");
                    self.stop_run_state();
                }
            }
            Continuation::Step => {
                if let Err(e) = result {
                    warn!(error = %e, "step failed, continuing instead");
                    self.stop_run_state();
                    self.continue_inferior();
                }
            }
            Continuation::ModuleResume { context } => {
                if let Err(e) = result {
                    error!(error = %e, %context, "could not resume after module load");
                }
            }
            Continuation::Suspend => {
                if let Err(e) = result {
                    error!(error = %e, "suspend failed");
                }
            }
            Continuation::Terminate => match result {
                Ok(_) => info!("inferior terminated"),
                Err(e) => warn!(error = %e, "terminate failed"),
            },
        }
    }

    fn on_process_started(&mut self, result: CodaResult) {
        match result.and_then(|results| parse_process_start(&results)) {
            Ok((pid, main_thread)) => {
                info!(pid, ?main_thread, "inferior started");
                self.session.pid = Some(pid);
                if self.session.bootstrap == Bootstrap::Connected {
                    self.session.bootstrap = Bootstrap::ProcessStarted;
                }
                if let Some(tid) = main_thread {
                    self.session.note_thread(tid);
                    self.snapshot.add_thread(tid);
                }
                self.engine
                    .notify(EngineEvent::SetupSucceeded { pid, main_thread });

                if let Some(tid) = main_thread
                    && self.register_names == RegisterNames::Unknown
                {
                    self.register_names = RegisterNames::Discovering {
                        deferred: Vec::new(),
                    };
                    self.discover_register_names(tid);
                }
            }
            Err(e) => {
                error!(error = %e, "inferior failed to start");
                self.engine.notify(EngineEvent::SetupFailed(e.to_string()));
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        debug!(?event, "coda: event");
        match event {
            Event::LocatorHello { services } => {
                if self.session.bootstrap != Bootstrap::AwaitingHello {
                    warn!(state = self.session.bootstrap.name(), "unexpected hello");
                    return;
                }
                info!(?services, "agent connected");
                self.session.bootstrap = Bootstrap::Connected;
                self.send_command(Command::LoggingAddListener, Continuation::LoggingListener);
                self.engine.notify(EngineEvent::AdapterStarted);
            }
            Event::ModuleLoaded { context, module, .. } => self.on_module_load(context, module),
            Event::ContextSuspended {
                context,
                pc,
                reason,
                message,
            } => self.on_stop(context, pc, reason, message),
            Event::ContextAdded { contexts } => {
                for context in contexts {
                    self.on_context_added(&context.id);
                }
            }
            Event::ContextRemoved { ids } => {
                for id in ids {
                    self.on_context_removed(&id);
                    if self.is_terminated() {
                        break;
                    }
                }
            }
            Event::LoggingWrite { message } => {
                self.engine.notify(EngineEvent::ApplicationOutput(message));
            }
            Event::Unknown { service, name } => {
                debug!(%service, %name, "ignoring event");
            }
        }
    }

    fn on_module_load(&mut self, context: ContextId, module: ModuleLoad) {
        info!(
            name = %module.name,
            loaded = module.loaded,
            code = format_args!("{:#x}", module.code_address),
            data = format_args!("{:#x}", module.data_address),
            "module event"
        );
        let pid = context
            .process_id()
            .or(self.session.pid)
            .unwrap_or_default();

        if module.loaded {
            if !self.session.modules.contains(&module.name) {
                self.session.modules.push(module.name.clone());
            }
        } else {
            self.session.modules.retain(|m| m != &module.name);
        }

        if !module.is_executable() {
            if module.loaded {
                self.session.add_library(Library {
                    name: module.name.clone(),
                    code_segment: module.code_address,
                    data_segment: module.data_address,
                    pid,
                });
            } else {
                self.session.remove_library(&module.name);
            }
        }

        if !module.require_resume {
            return;
        }

        let first_executable = module.is_executable()
            && module.loaded
            && matches!(
                self.session.bootstrap,
                Bootstrap::Connected | Bootstrap::ProcessStarted
            );
        if first_executable {
            self.session.code_segment_base = module.code_address;
            self.session.data_segment_base = module.data_address;
            if self.session.pid.is_none() {
                self.session.pid = context.process_id();
            }
            if let Some(tid) = context.thread_id() {
                self.session.note_thread(tid);
                self.snapshot.add_thread(tid);
            }
            self.session.bootstrap = Bootstrap::Attached;
            self.stop_run_state();

            info!("executable loaded, waiting for gdb to attach");
            self.engine.notify(EngineEvent::LoadSymbolFile {
                module: module.name,
                symbol_file: self.options.inferior.symbol_file.clone(),
                code_segment: module.code_address,
                data_segment: module.data_address,
            });
            self.engine.notify(EngineEvent::AttachRemoteTarget);
            return;
        }

        self.send_command(
            Command::RunControlResume {
                context: context.clone(),
                mode: ResumeMode::Resume,
                count: 1,
                range: None,
            },
            Continuation::ModuleResume { context },
        );
    }

    fn on_stop(&mut self, context: ContextId, pc: u64, reason: String, message: Option<String>) {
        let signal = run_control::signal_for_reason(&reason);
        info!(%context, pc = format_args!("{pc:#x}"), %reason, ?message, signal, "target stopped");
        self.stop_run_state();
        self.snapshot.reset();

        let Some(tid) = context.thread_id() else {
            warn!(%context, "stop reported without a thread");
            self.reply(format!("S{signal:02x}"), "stopped");
            return;
        };

        if self.session.pid.is_none() {
            self.session.pid = context.process_id();
        }
        self.session.note_thread(tid);
        self.session.current_thread = Some(tid);

        let thread = self.snapshot.add_thread(tid);
        thread.registers_valid = false;
        thread.state = match &message {
            Some(message) => format!("{reason}: {message}"),
            None => reason,
        };

        if signal == SIGSEGV {
            let reason = thread.state.clone();
            self.engine.notify(EngineEvent::InferiorCrashed {
                thread: tid,
                reason,
            });
        }

        self.request_registers(RegisterRequest::StopReport {
            thread: tid,
            signal,
        });
    }

    fn on_context_added(&mut self, id: &ContextId) {
        match id.kind() {
            ContextKind::Thread => {
                let belongs = self.session.pid.is_none() || id.process_id() == self.session.pid;
                if let (true, Some(tid)) = (belongs, id.thread_id()) {
                    debug!(%id, "thread created");
                    self.session.note_thread(tid);
                    self.snapshot.add_thread(tid).state = "Running".to_string();
                }
            }
            _ => debug!(%id, "context added"),
        }
    }

    fn on_context_removed(&mut self, id: &ContextId) {
        match id.kind() {
            ContextKind::Thread => {
                let Some(tid) = id.thread_id() else { return };
                if self.snapshot.remove_thread(tid) {
                    debug!(%id, "thread exited");
                }
                if self.session.current_thread == Some(tid) {
                    self.session.current_thread = self
                        .session
                        .main_thread()
                        .filter(|main| *main != tid)
                        .or_else(|| self.snapshot.threads().first().map(|t| t.id));
                }
            }
            ContextKind::Process if id.process_id() == self.session.pid => {
                info!(%id, "inferior exited");
                self.reply("W00", "process exited");
                self.engine.notify(EngineEvent::InferiorExited);
                self.teardown(false);
            }
            _ => debug!(%id, "context removed"),
        }
    }

    /// Stops are reported by the agent, so a refused transition is only
    /// logged.
    fn stop_run_state(&mut self) {
        if let Err(e) = self.run_state.stop() {
            debug!(error = %e, "stop while already stopped");
        }
    }

    pub(crate) fn current_thread(&self) -> Option<u32> {
        self.session.current_thread.or(self.session.main_thread())
    }

    pub(crate) fn continue_inferior(&mut self) {
        self.snapshot.prune_to_first();
        let Some(context) = self.session.process_context() else {
            warn!("continue requested without a process");
            return;
        };
        if let Err(e) = self.run_state.resume(ResumeKind::Continue) {
            warn!(error = %e, "ignoring continue");
            return;
        }
        self.send_command(
            Command::RunControlResume {
                context,
                mode: ResumeMode::Resume,
                count: 1,
                range: None,
            },
            Continuation::Continue,
        );
    }

    pub(crate) fn step_inferior(&mut self) {
        let Some(context) = self
            .current_thread()
            .and_then(|tid| self.session.thread_context(tid))
        else {
            warn!("step requested without a thread, continuing");
            self.continue_inferior();
            return;
        };
        let pc = context
            .thread_id()
            .and_then(|tid| self.snapshot.thread(tid))
            .map(|t| u64::from(t.registers[PC]))
            .unwrap_or_default();

        let (mode, range) = run_control::step_plan(self.snapshot.step_range, pc);
        debug!(%context, pc = format_args!("{pc:#x}"), ?mode, ?range, "stepping");
        if let Err(e) = self.run_state.resume(ResumeKind::Step) {
            warn!(error = %e, "ignoring step");
            return;
        }
        self.send_command(
            Command::RunControlResume {
                context,
                mode,
                count: 1,
                range,
            },
            Continuation::Step,
        );
    }

    /// Run `request` now if the register names are known, otherwise queue it
    /// behind name discovery.
    pub(crate) fn request_registers(&mut self, request: RegisterRequest) {
        if let RegisterNames::Discovering { deferred } = &mut self.register_names {
            debug!(?request, "waiting for register names");
            deferred.push(request);
            return;
        }
        if self.register_names == RegisterNames::Unknown {
            let thread = request.thread();
            self.register_names = RegisterNames::Discovering {
                deferred: vec![request],
            };
            self.discover_register_names(thread);
            return;
        }
        self.issue_register_request(request);
    }

    fn discover_register_names(&mut self, tid: u32) {
        let Some(thread) = self.session.thread_context(tid) else {
            self.discovery_failed("no process to discover registers for");
            return;
        };
        info!(%thread, "discovering register names");
        self.send_command(
            Command::RegistersGetChildren {
                context: thread.clone(),
            },
            Continuation::RegisterChildren { thread },
        );
    }

    fn on_register_children(&mut self, thread: ContextId, result: CodaResult) {
        let children = match result.and_then(|results| payload::strings(&results)) {
            Ok(children) => children,
            Err(e) => {
                self.discovery_failed(&e.to_string());
                return;
            }
        };

        match registers::discovery_step(&thread, children) {
            Discovery::Descend(child) => {
                debug!(%child, "descending into register group");
                self.send_command(
                    Command::RegistersGetChildren { context: child },
                    Continuation::RegisterChildren { thread },
                );
            }
            Discovery::Complete(names) => {
                info!(count = names.len(), "register names known");
                let previous =
                    std::mem::replace(&mut self.register_names, RegisterNames::Known(names));
                if let RegisterNames::Discovering { deferred } = previous {
                    for request in deferred {
                        self.issue_register_request(request);
                    }
                }
            }
            Discovery::Failed(reason) => self.discovery_failed(&reason),
        }
    }

    fn discovery_failed(&mut self, reason: &str) {
        error!(reason, "register discovery failed");
        if let RegisterNames::Discovering { deferred } = std::mem::take(&mut self.register_names) {
            for request in deferred {
                self.fail_register_request(request);
            }
        }
    }

    fn fail_register_request(&mut self, request: RegisterRequest) {
        match request {
            RegisterRequest::Dump { .. } | RegisterRequest::Read { .. } => {
                self.reply("E20", "registers unavailable");
            }
            RegisterRequest::Write { .. } => self.reply("E21", "register write failed"),
            RegisterRequest::StopReport { thread, signal } => {
                self.reply(
                    format!("T{signal:02x}thread:{thread:x};"),
                    "stopped, registers unavailable",
                );
            }
        }
    }

    fn issue_register_request(&mut self, request: RegisterRequest) {
        let tid = request.thread();
        let (Some(thread), RegisterNames::Known(names)) =
            (self.session.thread_context(tid), &self.register_names)
        else {
            warn!(?request, "cannot address registers");
            self.fail_register_request(request);
            return;
        };

        match request {
            RegisterRequest::Dump { thread: tid } => {
                if let Some(info) = self.snapshot.thread(tid).filter(|t| t.registers_valid) {
                    self.reply(registers::format_g(&info.registers), "registers (cached)");
                    return;
                }
                let ids = register_ids(&thread, names);
                self.send_command(
                    Command::RegistersGetM { registers: ids },
                    Continuation::ReadRegisters {
                        thread: tid,
                        stop_signal: None,
                    },
                );
            }
            RegisterRequest::StopReport { thread: tid, signal } => {
                let ids = register_ids(&thread, names);
                self.send_command(
                    Command::RegistersGetM { registers: ids },
                    Continuation::ReadRegisters {
                        thread: tid,
                        stop_signal: Some(signal),
                    },
                );
            }
            RegisterRequest::Read { thread: tid, index } => {
                if let Some(info) = self.snapshot.thread(tid).filter(|t| t.registers_valid) {
                    let value = info.registers[index];
                    self.reply(registers::encode_value(value), "register (cached)");
                    return;
                }
                let id = thread.child(&names[index]);
                self.send_command(
                    Command::RegistersGetM {
                        registers: vec![id],
                    },
                    Continuation::ReadRegister { thread: tid, index },
                );
            }
            RegisterRequest::Write {
                thread: tid,
                index,
                value,
            } => {
                let register = thread.child(&names[index]);
                self.send_command(
                    Command::RegistersSet { register, value },
                    Continuation::WriteRegister { thread: tid, index },
                );
            }
        }
    }

    fn on_registers_read(&mut self, tid: u32, stop_signal: Option<u8>, result: CodaResult) {
        let values = result
            .and_then(|results| payload::registers(&results))
            .and_then(|values| {
                <[u32; REGISTER_COUNT]>::try_from(values).map_err(|values| {
                    CodaError::unexpected(format!(
                        "expected {REGISTER_COUNT} registers, got {}",
                        values.len()
                    ))
                })
            });

        let registers = match values {
            Ok(registers) => registers,
            Err(e) => {
                error!(error = %e, thread = tid, "register read failed");
                let request = match stop_signal {
                    Some(signal) => RegisterRequest::StopReport {
                        thread: tid,
                        signal,
                    },
                    None => RegisterRequest::Dump { thread: tid },
                };
                self.fail_register_request(request);
                return;
            }
        };

        if let Some(thread) = self.snapshot.thread_mut(tid) {
            thread.registers = registers;
            thread.registers_valid = true;
        }

        match stop_signal {
            None => self.reply(registers::format_g(&registers), "registers"),
            Some(signal) => self.report_stop(tid, signal, &registers),
        }
    }

    fn report_stop(&self, tid: u32, signal: u8, registers: &[u32; REGISTER_COUNT]) {
        let pc = u64::from(registers[PC]);
        info!(
            thread = tid,
            pc = format_args!("{pc:#x}"),
            offset = format_args!("{:#x}", pc.wrapping_sub(self.session.code_segment_base)),
            "reporting stop"
        );
        debug!(registers = ?registers.map(|r| format!("{r:#010x}")), "register dump");
        self.reply(
            run_control::stop_reply(signal, tid, registers),
            "stopped",
        );
    }

    fn on_register_read(&mut self, tid: u32, index: usize, result: CodaResult) {
        match result.and_then(|results| payload::registers(&results)) {
            Ok(values) if !values.is_empty() => {
                let value = values[0];
                if let Some(thread) = self.snapshot.thread_mut(tid) {
                    thread.registers[index] = value;
                }
                self.reply(registers::encode_value(value), "register");
            }
            Ok(_) => {
                error!(thread = tid, index, "empty register read");
                self.reply("E20", "register read failed");
            }
            Err(e) => {
                error!(error = %e, thread = tid, index, "register read failed");
                self.reply("E20", "register read failed");
            }
        }
    }

    /// Answer the pending memory read, fetching from the agent as needed.
    pub(crate) fn serve_memory(&mut self) {
        let Some(wanted) = self.snapshot.wanted else {
            return;
        };
        match memory::plan(wanted, &self.snapshot.memory, self.options.memory) {
            Plan::Reply(data) => {
                self.snapshot.wanted = None;
                self.reply(hex::encode(&data), &format!("memory {wanted}"));
            }
            Plan::Unsatisfiable => {
                self.snapshot.wanted = None;
                warn!(%wanted, "read is cached but spans several blocks");
                self.reply("E22", "unsatisfiable read");
            }
            Plan::Fetch {
                range,
                needed,
                buffered,
            } => self.fetch_memory(range, needed, buffered),
        }
    }

    fn fetch_memory(&mut self, range: MemoryRange, needed: MemoryRange, buffered: bool) {
        let Some(context) = self.session.process_context() else {
            error!(%range, "memory read without a process");
            self.snapshot.wanted = None;
            self.reply("E20", "no process");
            return;
        };
        debug!(%range, %needed, buffered, "fetching memory");
        self.send_command(
            Command::MemoryGet {
                context,
                address: range.from,
                size: range.len(),
            },
            Continuation::ReadMemory {
                range,
                needed,
                buffered,
                generation: self.snapshot.generation(),
            },
        );
    }

    fn on_memory_read(
        &mut self,
        range: MemoryRange,
        needed: MemoryRange,
        buffered: bool,
        generation: u64,
        result: CodaResult,
    ) {
        if generation != self.snapshot.generation() {
            debug!(%range, "memory read before the last stop, dropping it");
            return;
        }
        if self.snapshot.wanted.is_none() {
            debug!(%range, "memory arrived after the read was abandoned");
            return;
        }

        let data = result
            .and_then(|results| payload::bytes(&results))
            .and_then(|data| {
                if data.len() as u64 == range.len() {
                    Ok(data)
                } else {
                    Err(CodaError::unexpected(format!(
                        "short read of {} bytes",
                        data.len()
                    )))
                }
            });

        match data {
            Ok(data) => {
                self.snapshot.memory.insert(range, Bytes::from(data));
                self.serve_memory();
            }
            Err(e) if buffered => {
                warn!(error = %e, %range, "buffered read failed, retrying unbuffered");
                self.fetch_memory(range, needed, false);
            }
            Err(e) => {
                error!(error = %e, %range, "memory read failed");
                self.snapshot.wanted = None;
                self.reply("E20", "memory read failed");
            }
        }
    }
}

/// Pid and main thread from a `Processes start` reply.
fn parse_process_start(results: &[Value]) -> Result<(u32, Option<u32>), CodaError> {
    let data = results
        .first()
        .ok_or_else(|| CodaError::unexpected("empty process start reply"))?;
    let pid = data
        .get("ID")
        .and_then(|id| context_number(id, ContextId::process_id))
        .ok_or_else(|| CodaError::unexpected(format!("no process id in {data}")))?;
    let main_thread = data
        .get("MainThread")
        .or_else(|| data.get("Threads").and_then(|threads| threads.get(0)))
        .and_then(|thread| context_number(thread, ContextId::thread_id));
    Ok((pid, main_thread))
}

/// Ids come either as plain numbers or as context ids.
fn context_number(value: &Value, component: fn(&ContextId) -> Option<u32>) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s
            .parse()
            .ok()
            .or_else(|| component(&ContextId::from(s.as_str()))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn process_start_reply_forms() {
        assert_eq!(
            parse_process_start(&[json!({"ID": "p12", "MainThread": "p12.t34"})]).unwrap(),
            (12, Some(34))
        );
        assert_eq!(
            parse_process_start(&[json!({"ID": "12", "Threads": [34, 35]})]).unwrap(),
            (12, Some(34))
        );
        assert_eq!(
            parse_process_start(&[json!({"ID": 12})]).unwrap(),
            (12, None)
        );
        assert!(parse_process_start(&[json!({})]).is_err());
        assert!(parse_process_start(&[]).is_err());
    }

    #[test]
    fn options_from_config() {
        let mut config = Config::default();
        let options = BridgeOptions::new("emulator", &config);
        assert_eq!(options.memory, FetchMode::Unbuffered);

        config.memory.buffered = true;
        let options = BridgeOptions::new("emulator", &config);
        assert_eq!(options.memory, FetchMode::Buffered { chunk_size: 256 });
        assert_eq!(options.max_packet_size, config::DEFAULT_MAX_PACKET_SIZE);
    }
}
