//! Helpers for driving the host side against a scripted agent.

mod memory;

pub use memory::MemoryTransport;

use futures::StreamExt;
use serde_json::{Value, json};
use tokio::io::DuplexStream;

use crate::message::{Message, Token};
use crate::reader::CodaReader;
use crate::transport::split;
use crate::writer::CodaWriter;

/// A command as seen by the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedCommand {
    pub token: Token,
    pub service: String,
    pub name: String,
    pub args: Vec<Value>,
}

impl ReceivedCommand {
    pub fn is(&self, service: &str, name: &str) -> bool {
        self.service == service && self.name == name
    }
}

/// The agent end of a [`MemoryTransport`] pair.
pub struct FakeAgent {
    reader: CodaReader<DuplexStream>,
    writer: CodaWriter<DuplexStream>,
}

impl FakeAgent {
    /// Returns the agent and the transport the host should use.
    pub fn new() -> (Self, MemoryTransport) {
        let (host, agent) = MemoryTransport::pair();
        let (reader, writer) = split(agent);
        (Self { reader, writer }, host)
    }

    /// Wait for the next command from the host.
    ///
    /// # Panics
    ///
    /// If the connection closes or something other than a command arrives.
    pub async fn expect_command(&mut self) -> ReceivedCommand {
        let message = self
            .reader
            .next()
            .await
            .expect("host closed the connection")
            .expect("host sent an undecodable message");
        match message {
            Message::Command {
                token,
                service,
                name,
                args,
            } => ReceivedCommand {
                token,
                service,
                name,
                args,
            },
            other => panic!("expected a command, got {other:?}"),
        }
    }

    /// Wait for the next command and check its service and name.
    pub async fn expect(&mut self, service: &str, name: &str) -> ReceivedCommand {
        let command = self.expect_command().await;
        assert!(
            command.is(service, name),
            "expected {service} {name}, got {command:?}"
        );
        command
    }

    pub async fn reply(&mut self, token: Token, results: Vec<Value>) {
        self.send(Message::Reply {
            token,
            error: Value::Null,
            results,
        })
        .await;
    }

    pub async fn reply_error(&mut self, token: Token, code: i64, message: &str) {
        self.send(Message::Reply {
            token,
            error: json!({"Code": code, "Format": message}),
            results: Vec::new(),
        })
        .await;
    }

    pub async fn event(&mut self, service: &str, name: &str, args: Vec<Value>) {
        self.send(Message::Event {
            service: service.to_string(),
            name: name.to_string(),
            args,
        })
        .await;
    }

    async fn send(&mut self, message: Message) {
        self.writer
            .send(message)
            .await
            .expect("failed to write to the host");
    }
}
