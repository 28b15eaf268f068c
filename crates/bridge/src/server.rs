//! Socket plumbing around a [`ProtocolBridge`].
//!
//! One task owns the bridge and selects over the GDB client, the agent and the
//! engine. Writes to either peer happen on their own tasks, fed by the
//! channels the bridge sends into.

use bytes::{Bytes, BytesMut};
use coda::{CodaTransport, CodaWriter, Incoming, Request};
use eyre::WrapErr;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bridge::ProtocolBridge;
use crate::engine::EngineCommand;

const READ_BUFFER_SIZE: usize = 4096;

struct GdbClient {
    read: OwnedReadHalf,
    buffer: BytesMut,
    writer: JoinHandle<()>,
}

/// Run the bridge until the session ends or `cancel` fires.
///
/// GDB clients are accepted from `listener` one at a time; a client that
/// disconnects can be replaced by a new one while the session lives on.
pub async fn serve<T: CodaTransport>(
    listener: TcpListener,
    agent: T,
    mut bridge: ProtocolBridge,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
    cancel: CancellationToken,
) -> eyre::Result<()> {
    let (mut agent_reader, agent_writer) = coda::split(agent);
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let agent_writer = tokio::spawn(write_requests(agent_writer, request_rx));

    bridge
        .start_adapter(request_tx)
        .wrap_err("starting the adapter")?;

    let mut client: Option<GdbClient> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("bridge cancelled");
                bridge.shutdown_adapter();
                break;
            }
            accepted = listener.accept(), if client.is_none() => {
                let (stream, peer) = accepted.wrap_err("accepting a gdb connection")?;
                tracing::info!(%peer, "gdb client connected");
                stream.set_nodelay(true)?;
                let (read, write) = stream.into_split();
                let (output_tx, output_rx) = mpsc::unbounded_channel();
                bridge.connect_gdb(output_tx);
                client = Some(GdbClient {
                    read,
                    buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
                    writer: tokio::spawn(write_gdb(write, output_rx)),
                });
            }
            read = read_client(&mut client) => {
                match read {
                    Ok(0) => {
                        tracing::info!("gdb client closed the connection");
                        close_client(&mut bridge, &mut client).await;
                    }
                    Ok(_) => {
                        if let Some(gdb) = client.as_mut() {
                            let bytes = gdb.buffer.split();
                            bridge.handle_gdb_input(&bytes);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "reading from gdb");
                        close_client(&mut bridge, &mut client).await;
                    }
                }
            }
            message = agent_reader.next() => {
                match message {
                    Some(Ok(message)) => match Incoming::try_from(message) {
                        Ok(incoming) => bridge.handle_coda(incoming),
                        Err(message) => tracing::warn!(?message, "ignoring command sent by the agent"),
                    },
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "reading from the agent");
                        bridge.agent_disconnected();
                    }
                    None => bridge.agent_disconnected(),
                }
            }
            Some(command) = commands.recv() => bridge.handle_engine_command(command),
        }

        if bridge.is_terminated() {
            tracing::debug!("session over, leaving event loop");
            break;
        }
    }

    close_client(&mut bridge, &mut client).await;
    drop(bridge);
    if let Err(e) = agent_writer.await {
        tracing::warn!(error = %e, "agent writer task failed");
    }
    Ok(())
}

async fn read_client(client: &mut Option<GdbClient>) -> std::io::Result<usize> {
    match client {
        Some(gdb) => gdb.read.read_buf(&mut gdb.buffer).await,
        None => std::future::pending().await,
    }
}

/// Drop the client, letting its writer drain what the bridge already queued.
async fn close_client(bridge: &mut ProtocolBridge, client: &mut Option<GdbClient>) {
    let Some(gdb) = client.take() else {
        return;
    };
    bridge.disconnect_gdb();
    if let Err(e) = gdb.writer.await {
        tracing::warn!(error = %e, "gdb writer task failed");
    }
}

async fn write_gdb(mut write: OwnedWriteHalf, mut output: mpsc::UnboundedReceiver<Bytes>) {
    while let Some(bytes) = output.recv().await {
        tracing::trace!(?bytes, "gdb: <-");
        if let Err(e) = write.write_all(&bytes).await {
            tracing::warn!(error = %e, "writing to gdb");
            return;
        }
    }
    let _ = write.shutdown().await;
}

async fn write_requests<W>(mut writer: CodaWriter<W>, mut requests: mpsc::UnboundedReceiver<Request>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(request) = requests.recv().await {
        if let Err(e) = writer.send(request).await {
            tracing::error!(error = %e, "writing to the agent");
            return;
        }
    }
    tracing::debug!("agent writer finished");
}
