use std::net::SocketAddr;
use std::path::PathBuf;

use bridge::{BridgeOptions, DeviceRegistry, EngineCommand, EngineEvent, ProtocolBridge};
use clap::{Parser, ValueEnum};
use config::Config;
use eyre::WrapErr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file. Defaults to `<config dir>/gdb-coda/config.toml`.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Address GDB connects to.
    #[clap(short, long)]
    listen: Option<SocketAddr>,

    /// Name of the configured device to debug.
    #[clap(short, long)]
    device: Option<String>,

    /// Read target memory in whole chunks and cache them until the next stop.
    #[clap(long)]
    buffered: bool,

    #[clap(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Executable to start on the device, overriding the configuration.
    executable: Option<String>,

    /// Arguments for the executable.
    #[clap(trailing_var_arg = true)]
    arguments: Vec<String>,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(listen) = args.listen {
        config.gdb.listen = listen;
    }
    if let Some(device) = &args.device {
        config.device = Some(device.clone());
    }
    if args.buffered {
        config.memory.buffered = true;
    }
    if let Some(executable) = &args.executable {
        config.inferior.executable = executable.clone();
        config.inferior.arguments = args.arguments.clone();
    }
}

/// Stand-in for a debugger front end: start the inferior once the agent is
/// up and tell the user how to point GDB at the bridge.
async fn run_engine(
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
    commands: mpsc::UnboundedSender<EngineCommand>,
    listen: SocketAddr,
) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::AdapterStarted => {
                tracing::info!("agent ready, starting inferior");
                let _ = commands.send(EngineCommand::SetupInferior);
            }
            EngineEvent::SetupSucceeded { pid, main_thread } => {
                tracing::info!(pid, ?main_thread, "inferior running");
            }
            EngineEvent::SetupFailed(reason) => {
                tracing::error!(%reason, "could not start the inferior");
                let _ = commands.send(EngineCommand::Shutdown);
            }
            EngineEvent::LoadSymbolFile {
                module,
                symbol_file,
                code_segment,
                data_segment,
            } => {
                let file = symbol_file
                    .map(|path| path.display().to_string())
                    .unwrap_or(module);
                eprintln!(
                    "(gdb) add-symbol-file {file} -s .text {code_segment:#x} -s .data {data_segment:#x}"
                );
            }
            EngineEvent::AttachRemoteTarget => {
                eprintln!("(gdb) target extended-remote {listen}");
            }
            EngineEvent::ApplicationOutput(output) => print!("{output}"),
            EngineEvent::InferiorCrashed { thread, reason } => {
                tracing::warn!(thread, %reason, "inferior crashed");
            }
            EngineEvent::InferiorExited => tracing::info!("inferior exited"),
            EngineEvent::ShutdownFinished => {
                tracing::debug!("bridge shut down");
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing(args.log_format);
    tracing::debug!(?args, "parsed command line arguments");

    let mut config = Config::load(args.config.as_deref()).wrap_err("loading configuration")?;
    apply_overrides(&mut config, &args);
    let device = config
        .selected_device()
        .wrap_err("choosing a device")?
        .clone();

    let listener = TcpListener::bind(config.gdb.listen)
        .await
        .wrap_err_with(|| format!("listening on {}", config.gdb.listen))?;
    let listen = listener.local_addr()?;

    tracing::info!(device = %device.name, address = %device.address, "connecting to agent");
    let agent = TcpStream::connect(device.address.as_str())
        .await
        .wrap_err_with(|| format!("connecting to {} at {}", device.name, device.address))?;
    agent.set_nodelay(true)?;

    let (engine_tx, engine_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let bridge = ProtocolBridge::new(
        BridgeOptions::new(&device.name, &config),
        DeviceRegistry::default(),
        engine_tx,
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted, shutting down");
                cancel.cancel();
            }
        }
    });
    let engine = tokio::spawn(run_engine(engine_rx, command_tx, listen));

    tracing::info!(%listen, "waiting for gdb");
    bridge::serve(listener, agent, bridge, command_rx, cancel)
        .await
        .wrap_err("running the bridge")?;

    engine.await.wrap_err("engine task")?;
    Ok(())
}
