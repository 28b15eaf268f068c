use coda::testing::FakeAgent;
use coda::{Command, ContextId, Event, Incoming, Request, split};
use futures::StreamExt;
use serde_json::json;

#[tokio::test]
async fn request_reply_and_event_over_memory_transport() {
    let (mut agent, transport) = FakeAgent::new();
    let (mut reader, mut writer) = split(transport);

    writer
        .send(Request {
            token: 1,
            command: Command::MemoryGet {
                context: ContextId::process(2),
                address: 0x1000,
                size: 4,
            },
        })
        .await
        .unwrap();

    let command = agent.expect("Memory", "get").await;
    assert_eq!(command.token, 1);
    assert_eq!(command.args, vec![json!("p2"), json!(4096), json!(1), json!(4), json!(0)]);

    agent.reply(command.token, vec![json!("01020304")]).await;
    agent
        .event("RunControl", "contextRemoved", vec![json!(["p2.t3"])])
        .await;

    let Ok(Incoming::Reply(reply)) = Incoming::try_from(reader.next().await.unwrap().unwrap())
    else {
        panic!("expected a reply");
    };
    assert_eq!(coda::payload::bytes(&reply.result.unwrap()).unwrap(), vec![1, 2, 3, 4]);

    let incoming = Incoming::try_from(reader.next().await.unwrap().unwrap()).unwrap();
    assert_eq!(
        incoming,
        Incoming::Event(Event::ContextRemoved {
            ids: vec![ContextId::thread(2, 3)]
        })
    );
}

#[tokio::test]
async fn agent_errors_surface_as_coda_errors() {
    let (mut agent, transport) = FakeAgent::new();
    let (mut reader, mut writer) = split(transport);

    writer
        .send(Request {
            token: 8,
            command: Command::BreakpointsRemove {
                ids: vec!["BP_0x2000".to_string()],
            },
        })
        .await
        .unwrap();
    let command = agent.expect("Breakpoints", "remove").await;
    agent.reply_error(command.token, 3, "no such breakpoint").await;

    let Ok(Incoming::Reply(reply)) = Incoming::try_from(reader.next().await.unwrap().unwrap())
    else {
        panic!("expected a reply");
    };
    assert_eq!(reply.token, 8);
    assert!(reply.result.is_err());
}
