use clap::Parser;
use shared::{Message, Verb};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Hand-driven exerciser for a running server: registers a nickname, walks
/// through a few lobby commands and prints every line the server sends.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address to connect to
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    address: String,
    /// Nickname to register with
    #[clap(short, long, default_value = "rider")]
    nickname: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    println!("Connecting to {}", args.address);
    let stream = TcpStream::connect(&args.address).await?;
    let (read_half, mut write_half) = stream.into_split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Writer task: everything the script or the reader wants to send goes
    // through one queue.
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            let data = format!("{}\n", line);
            if write_half.write_all(data.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    // Reader task: print every server line and answer PING so the liveness
    // prober keeps the connection alive.
    let pong_tx = tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            println!("<- {}", line);
            if let Ok(msg) = Message::decode(&line) {
                if msg.verb == Verb::Ping {
                    let _ = pong_tx.send(Message::bare(Verb::Pong).encode());
                }
            }
        }
        println!("Server closed the connection");
    });

    let script = [
        Message::with_payload(Verb::Join, args.nickname.as_str()),
        Message::bare(Verb::List),
        Message::with_payload(Verb::Crlo, "testlobby"),
        Message::bare(Verb::Lome),
        // Starting alone is rejected; shows the error reporting path
        Message::bare(Verb::Strt),
        Message::with_payload(Verb::Chat, "hello from the test client"),
        Message::bare(Verb::Glst),
        Message::bare(Verb::High),
    ];

    for msg in script {
        let line = msg.encode();
        println!("-> {}", line);
        tx.send(line)?;
        sleep(Duration::from_millis(500)).await;
    }

    // Stay connected long enough to see a liveness probe go by
    sleep(Duration::from_secs(6)).await;

    let quit = Message::bare(Verb::Quit).encode();
    println!("-> {}", quit);
    tx.send(quit)?;
    sleep(Duration::from_millis(500)).await;

    println!("Test client finished");
    Ok(())
}
