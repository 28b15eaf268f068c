//! Asynchronous events pushed by the agent.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::context::ContextId;

/// Reason the agent reports when a suspension is caused by a module load.
const SHARED_LIBRARY_REASON: &str = "Shared Library";

/// Module data attached to a module-load suspension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ModuleLoad {
    pub name: String,
    pub file: String,
    pub code_address: u64,
    pub data_address: u64,
    pub loaded: bool,
    pub require_resume: bool,
}

impl ModuleLoad {
    /// Executables are the inferior itself, everything else is a library.
    pub fn is_executable(&self) -> bool {
        self.name.to_ascii_lowercase().ends_with(".exe")
    }
}

/// A context announced by `RunControl contextAdded`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunControlContext {
    #[serde(rename = "ID")]
    pub id: ContextId,
    #[serde(rename = "ParentID", default)]
    pub parent_id: Option<ContextId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// First message on a new connection, lists the services the agent offers.
    LocatorHello { services: Vec<String> },
    ContextSuspended {
        context: ContextId,
        pc: u64,
        reason: String,
        message: Option<String>,
    },
    /// A suspension caused by a module being loaded or unloaded.
    ModuleLoaded {
        context: ContextId,
        pc: u64,
        module: ModuleLoad,
    },
    ContextAdded { contexts: Vec<RunControlContext> },
    ContextRemoved { ids: Vec<ContextId> },
    LoggingWrite { message: String },
    /// Anything the bridge has no use for, or could not make sense of.
    Unknown { service: String, name: String },
}

impl Event {
    pub fn parse(service: &str, name: &str, args: &[Value]) -> Event {
        let parsed = match (service, name) {
            ("Locator", "Hello") => parse_hello(args),
            ("RunControl", "contextSuspended") => parse_suspended(args),
            ("RunControl", "contextAdded") => args
                .first()
                .and_then(|v| Vec::<RunControlContext>::deserialize(v).ok())
                .map(|contexts| Event::ContextAdded { contexts }),
            ("RunControl", "contextRemoved") => args
                .first()
                .and_then(|v| Vec::<ContextId>::deserialize(v).ok())
                .map(|ids| Event::ContextRemoved { ids }),
            ("Logging", "write") => args
                .iter()
                .rev()
                .find_map(Value::as_str)
                .map(|message| Event::LoggingWrite {
                    message: message.to_string(),
                }),
            _ => None,
        };

        parsed.unwrap_or_else(|| {
            if matches!(service, "Locator" | "RunControl" | "Logging") {
                warn!(%service, %name, ?args, "could not parse event");
            }
            Event::Unknown {
                service: service.to_string(),
                name: name.to_string(),
            }
        })
    }
}

fn parse_hello(args: &[Value]) -> Option<Event> {
    let services = match args.first() {
        Some(v) => Vec::<String>::deserialize(v).ok()?,
        None => Vec::new(),
    };
    Some(Event::LocatorHello { services })
}

fn parse_suspended(args: &[Value]) -> Option<Event> {
    let context = ContextId::deserialize(args.first()?).ok()?;
    let pc = args.get(1).and_then(Value::as_u64).unwrap_or_default();
    let reason = args
        .get(2)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = args.get(3);

    if reason == SHARED_LIBRARY_REASON {
        let module = params
            .map(|p| ModuleLoad::deserialize(p))
            .transpose()
            .ok()?
            .unwrap_or_default();
        return Some(Event::ModuleLoaded {
            context,
            pc,
            module,
        });
    }

    let message = params
        .and_then(|p| p.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(Event::ContextSuspended {
        context,
        pc,
        reason,
        message,
    })
}
