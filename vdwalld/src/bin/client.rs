use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use vdwall::address::DEFAULT_PORT;
use vdwall::command::InputSource;
use vdwall::{resolve_variables, ActionKind, DeviceAddress, OptionValue, RawOptions};
use vdwalld::*;

#[derive(Debug, thiserror::Error)]
enum ClientError {
    #[error(transparent)]
    Daemon(#[from] vdwalld::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Address(#[from] vdwall::AddressError),

    #[error("{0}")]
    Rejected(String),
    #[error("command not sent, device is not connected")]
    NotSent,
}

/// Sends a command to a running vdwalld.
#[derive(Debug, clap::Parser)]
struct Cli {
    #[clap(long, default_value = DEFAULT_SOCKET)]
    socket: PathBuf,

    /// Value for `$(NAME)` placeholders in options, as NAME=VALUE
    #[clap(long = "var", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, clap::Subcommand)]
enum Cmd {
    /// Switch the processor to another input
    InputSwitch {
        /// Input number 0-8 or its label (V1, V2, VGA1, VGA2, HDMI, DVI, DP, EXT, YPBPR)
        #[clap(long, default_value = "0")]
        input: String,
        /// Fade in half-second steps, 0-3
        #[clap(long, default_value = "0")]
        fade: String,
    },
    /// Set the brightness level, 0-64 or 0-100 depending on the unit
    Brightness { value: String },
    /// Point the daemon at another device
    Reconfigure {
        #[clap(long)]
        host: String,
        #[clap(long, default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,
        #[clap(long, default_value_t = 0)]
        serial_number: u8,
    },
    /// Show the daemon's connection state
    Status,
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", s))
}

fn input_value(input: String) -> OptionValue {
    match InputSource::from_name(&input) {
        Some(source) => OptionValue::Number(i64::from(source.id())),
        None => OptionValue::Text(input),
    }
}

fn build_request(cmd: Cmd, vars: &HashMap<String, String>) -> Result<Request, ClientError> {
    let (kind, raw) = match cmd {
        Cmd::InputSwitch { input, fade } => {
            let mut raw = RawOptions::new();
            raw.insert("input".into(), input_value(input));
            raw.insert("fade".into(), fade.into());
            (ActionKind::InputSwitch, raw)
        }
        Cmd::Brightness { value } => {
            let mut raw = RawOptions::new();
            raw.insert("value".into(), value.into());
            (ActionKind::Brightness, raw)
        }
        Cmd::Reconfigure {
            host,
            port,
            serial_number,
        } => {
            return Ok(Request::Reconfigure(DeviceAddress::new(
                host,
                port,
                serial_number,
            )?))
        }
        Cmd::Status => return Ok(Request::Status),
    };

    Ok(Request::Action {
        name: kind.name().to_string(),
        options: resolve_variables(&raw, vars),
    })
}

async fn run(cli: Cli) -> Result<(), ClientError> {
    let vars: HashMap<String, String> = cli.vars.into_iter().collect();
    let req = build_request(cli.cmd, &vars)?;

    let stream = tokio::net::UnixStream::connect(&cli.socket).await?;
    let mut frames = client_framed(stream);

    match request(&mut frames, req).await? {
        Reply::Sent(true) => Ok(()),
        Reply::Sent(false) => Err(ClientError::NotSent),
        Reply::Error(msg) => Err(ClientError::Rejected(msg)),
        Reply::State { address, state } => {
            match address {
                Some(address) => println!("{}: {}", address, state),
                None => println!("unconfigured: {}", state),
            }
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
