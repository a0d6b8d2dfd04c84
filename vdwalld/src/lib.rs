use futures::{SinkExt, TryStreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serde::formats::Bincode;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, warn};
use vdwall::{ConnectionState, DeviceAddress, ResolvedOptions, Transport};

pub const DEFAULT_SOCKET: &str = "/run/vdwalld/socket";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Address(#[from] vdwall::AddressError),

    #[error("daemon closed the connection")]
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Request {
    /// Encode and send one command for the configured serial number.
    Action {
        name: String,
        options: ResolvedOptions,
    },
    /// Switch to another device. The same address is only reconnected
    /// when the link is down.
    Reconfigure(DeviceAddress),
    Status,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Reply {
    /// Whether the command was written to the device socket.
    Sent(bool),
    State {
        address: Option<DeviceAddress>,
        state: ConnectionState,
    },
    Error(String),
}

pub type ServerFramed<T> =
    tokio_serde::Framed<Framed<T, LengthDelimitedCodec>, Request, Reply, Bincode<Request, Reply>>;
pub type ClientFramed<T> =
    tokio_serde::Framed<Framed<T, LengthDelimitedCodec>, Reply, Request, Bincode<Reply, Request>>;

pub fn server_framed<T: AsyncRead + AsyncWrite>(io: T) -> ServerFramed<T> {
    tokio_serde::Framed::new(
        Framed::new(io, LengthDelimitedCodec::new()),
        Bincode::default(),
    )
}

pub fn client_framed<T: AsyncRead + AsyncWrite>(io: T) -> ClientFramed<T> {
    tokio_serde::Framed::new(
        Framed::new(io, LengthDelimitedCodec::new()),
        Bincode::default(),
    )
}

fn status(transport: &Transport) -> Reply {
    Reply::State {
        address: transport.address(),
        state: transport.state(),
    }
}

pub async fn handle_request(transport: &Transport, request: Request) -> Reply {
    match request {
        Request::Action { name, options } => match transport.execute(&name, &options).await {
            Ok(sent) => {
                if !sent {
                    warn!("{} was not sent, device is {}", name, transport.state());
                }
                Reply::Sent(sent)
            }
            Err(e) => {
                warn!("rejected {}: {}", name, e);
                Reply::Error(e.to_string())
            }
        },
        Request::Reconfigure(address) => {
            transport.reconfigure(address).await;
            status(transport)
        }
        Request::Status => status(transport),
    }
}

/// Answers requests from one client until it hangs up.
pub async fn serve_client<T>(transport: &Transport, stream: T) -> Result<(), Error>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut frames = server_framed(stream);

    while let Some(request) = frames.try_next().await? {
        debug!(?request, "client request");
        let reply = handle_request(transport, request).await;
        frames.send(reply).await?;
    }

    Ok(())
}

/// Sends one request and waits for its reply.
pub async fn request<T>(frames: &mut ClientFramed<T>, request: Request) -> Result<Reply, Error>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    frames.send(request).await?;
    frames.try_next().await?.ok_or(Error::Disconnected)
}
