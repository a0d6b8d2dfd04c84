use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use clap::Parser;
use tokio::net::UnixListener;
use tokio::signal::unix::SignalKind;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vdwall::address::{DEFAULT_HOST, DEFAULT_PORT};
use vdwall::{ConnectionState, DeviceAddress, Transport};
use vdwalld::*;

/// Keeps the connection to a VDWall LVP processor and forwards commands
/// from local clients to it.
#[derive(Debug, clap::Parser)]
struct Args {
    /// Address of the processor
    #[clap(long, default_value = DEFAULT_HOST)]
    host: String,

    #[clap(long, default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Unit to address, 0 for all units on the link
    #[clap(long, default_value_t = 0)]
    serial_number: u8,

    /// Socket to listen on when none is passed in by the service manager
    #[clap(long, default_value = DEFAULT_SOCKET)]
    socket: PathBuf,
}

fn bind(path: &Path) -> Result<UnixListener, Error> {
    let mut listenfd = listenfd::ListenFd::from_env();
    if let Some(listener) = listenfd.take_unix_listener(0)? {
        info!("using socket from service manager");
        listener.set_nonblocking(true)?;
        return Ok(UnixListener::from_std(listener)?);
    }

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => std::fs::remove_file(path)?,
        _ => {}
    }

    info!("listening on {}", path.display());
    Ok(UnixListener::bind(path)?)
}

async fn serve(transport: &Transport, listener: &UnixListener) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                if let Err(e) = serve_client(transport, stream).await {
                    warn!("handle_client: {}", e)
                }
            }
            Err(e) => error!("listener error: {}", e),
        }
    }
}

async fn shutdown_signal() -> std::io::Result<()> {
    let mut terminate = tokio::signal::unix::signal(SignalKind::terminate())?;

    tokio::select! {
        r = tokio::signal::ctrl_c() => r,
        _ = terminate.recv() => Ok(()),
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let address = DeviceAddress::new(args.host, args.port, args.serial_number)?;
    let listener = bind(&args.socket)?;

    let transport = Transport::with_observer(
        tracing::info_span!("device"),
        |state: &ConnectionState| info!(%state, "device status"),
    );
    transport.connect(address).await;

    let result = tokio::select! {
        _ = serve(&transport, &listener) => Ok(()),
        r = shutdown_signal() => r,
    };

    info!("shutting down");
    transport.close();
    Ok(result?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Args::parse()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
