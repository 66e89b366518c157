//! Interactive client for `ledgerd`.
//!
//! Prints the server greeting, then sends each line typed on stdin as one
//! request and prints the reply. A line starting with `q` quits.

use anyhow::{Context, bail};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use std::path::PathBuf;
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, FramedRead, LinesCodec};

#[derive(Parser, Debug)]
#[command(name = "ledgerd-client", version, about = "Talk to a ledgerd server")]
struct ClientArgs {
    /// Path of the server's Unix domain socket.
    ///
    /// Environment variable: `SOCKET_PATH`
    #[arg(long, env = "SOCKET_PATH", default_value = "./socket")]
    socket_path: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = ClientArgs::parse();

    let stream = UnixStream::connect(&args.socket_path)
        .await
        .with_context(|| format!("failed to connect to {}", args.socket_path.display()))?;
    let mut server = Framed::new(stream, LinesCodec::new());

    let Some(greeting) = server.next().await else {
        bail!("server closed the connection");
    };
    println!("{}", greeting?);

    let mut stdin = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
    while let Some(line) = stdin.next().await {
        let line = line?;
        if line.starts_with('q') {
            break;
        }

        server.send(line.as_str()).await?;
        match server.next().await {
            Some(reply) => println!("{}", reply?),
            None => {
                println!("server closed the connection");
                break;
            }
        }
    }

    Ok(())
}
