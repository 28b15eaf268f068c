//! Wire level messages and their typed views.

use serde_json::Value;

use crate::command::Command;
use crate::error::CodaError;
use crate::event::Event;

/// Correlates a command with its reply.
pub type Token = u64;

/// One framed message, in either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Command {
        token: Token,
        service: String,
        name: String,
        args: Vec<Value>,
    },
    Reply {
        token: Token,
        /// `null` on success, an error report object otherwise.
        error: Value,
        results: Vec<Value>,
    },
    Event {
        service: String,
        name: String,
        args: Vec<Value>,
    },
}

/// A command paired with the token the caller registered for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub token: Token,
    pub command: Command,
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Command {
            token: request.token,
            service: request.command.service().to_string(),
            name: request.command.name().to_string(),
            args: request.command.arguments(),
        }
    }
}

/// The outcome of one command.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub token: Token,
    pub result: Result<Vec<Value>, CodaError>,
}

impl Reply {
    pub fn ok(token: Token, results: Vec<Value>) -> Self {
        Self {
            token,
            result: Ok(results),
        }
    }

    pub fn err(token: Token, error: CodaError) -> Self {
        Self {
            token,
            result: Err(error),
        }
    }
}

/// What the bridge receives from the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Reply(Reply),
    Event(Event),
}

impl TryFrom<Message> for Incoming {
    type Error = Message;

    /// Commands are never sent by the agent and are handed back unchanged.
    fn try_from(message: Message) -> Result<Self, Self::Error> {
        match message {
            Message::Reply {
                token,
                error,
                results,
            } => {
                let result = match error_report(&error) {
                    Some(err) => Err(err),
                    None => Ok(results),
                };
                Ok(Incoming::Reply(Reply { token, result }))
            }
            Message::Event {
                service,
                name,
                args,
            } => Ok(Incoming::Event(Event::parse(&service, &name, &args))),
            command @ Message::Command { .. } => Err(command),
        }
    }
}

/// Agent error reports look like `{"Code": 1, "Format": "text"}`.
fn error_report(error: &Value) -> Option<CodaError> {
    match error {
        Value::Null => None,
        Value::Object(report) => {
            let code = report.get("Code").and_then(Value::as_i64).unwrap_or(-1);
            let message = report
                .get("Format")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            Some(CodaError::Agent { code, message })
        }
        other => Some(CodaError::Agent {
            code: -1,
            message: other.to_string(),
        }),
    }
}
