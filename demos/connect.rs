//! Connect to a broker and wait for the CONNACK.
//!
//! Usage:
//!   cargo run --example connect -- [address] [--debug]
//!
//! The address is `host:port` for TCP or a `ws://` / `wss://` URL.
//! Defaults to `127.0.0.1:1883`.

mod common;

use std::time::Duration;

use common::{Args, init_logging};
use mqtt_stream::transport::{socket, websocket};
use mqtt_stream::{Connect, ControlPacket, Result, Stream};
use tokio::time::timeout;

const DEFAULT_ADDRESS: &str = "127.0.0.1:1883";
const CONNACK_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let address = args.target.as_deref().unwrap_or(DEFAULT_ADDRESS);
    println!("[1] Connecting to {address}...");

    let stream: Stream = if address.starts_with("ws://") || address.starts_with("wss://") {
        websocket::connect(address).await?
    } else {
        socket::connect(address).await?
    };

    let connect = Connect {
        keep_alive: 30,
        ..Connect::new("mqtt-stream-demo")
    };
    if !stream.send(connect.into()).await {
        println!("[2] CONNECT failed: {:?}", stream.error());
        return Ok(());
    }
    println!("[2] CONNECT sent");

    match timeout(CONNACK_TIMEOUT, stream.recv()).await {
        Ok(Some(ControlPacket::Connack(connack))) => match connack.code() {
            Ok(code) => println!("[3] CONNACK: {code}"),
            Err(e) => println!("[3] CONNACK with invalid code: {e}"),
        },
        Ok(Some(other)) => println!("[3] Unexpected packet: {other:?}"),
        Ok(None) => println!("[3] Stream ended: {:?}", stream.error()),
        Err(_) => println!("[3] No CONNACK within {CONNACK_TIMEOUT:?}"),
    }

    stream.send(ControlPacket::Disconnect).await;
    stream.close();
    stream.closed().await;
    println!("[4] Closed");

    Ok(())
}
