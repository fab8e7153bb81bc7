use clap::Parser;
use server::liveness::ProbeConfig;
use server::net::Server;
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, binds the listener and runs the accept
/// loop until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Seconds between liveness probes
        #[clap(long, default_value = "5")]
        probe_interval: u64,
        /// Seconds an unanswered probe may stay outstanding
        #[clap(long, default_value = "15")]
        pong_timeout: u64,
    }

    env_logger::init();
    let args = Args::parse();

    let probe = ProbeConfig {
        interval: Duration::from_secs(args.probe_interval),
        timeout: Duration::from_secs(args.pong_timeout),
    };

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, probe).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server stopped with error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
