use std::net::SocketAddr;
use std::time::Instant;

use clap::{Parser, Subcommand};

use stack_server::client::{ClientError, StackClient};

#[derive(Parser)]
#[command(name = "stack-cli")]
#[command(about = "Command-line client for the stack server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push a UTF-8 payload (at most 127 bytes)
    Push { payload: String },
    /// Pop the most recent payload, waiting if the stack is empty
    Pop,
    /// Push `count` numbered payloads concurrently
    Flood {
        #[arg(default_value_t = 10)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = StackClient::new(cli.addr);

    match cli.command {
        Commands::Push { payload } => {
            client.push(payload.as_bytes()).await?;
            println!("ok");
        }
        Commands::Pop => {
            let payload = client.pop().await?;
            println!("{}", String::from_utf8_lossy(&payload));
        }
        Commands::Flood { count } => {
            let start = Instant::now();
            let mut tasks = Vec::with_capacity(count);
            for i in 0..count {
                let client = client.clone();
                tasks.push(tokio::spawn(async move {
                    client.push(format!("item-{i}").as_bytes()).await
                }));
            }

            let (mut ok, mut busy, mut failed) = (0usize, 0usize, 0usize);
            for task in tasks {
                match task.await? {
                    Ok(()) => ok += 1,
                    Err(ClientError::Busy) => busy += 1,
                    Err(e) => {
                        eprintln!("push failed: {e}");
                        failed += 1;
                    }
                }
            }
            println!(
                "{ok} pushed, {busy} refused, {failed} failed in {:?}",
                start.elapsed()
            );
        }
    }

    Ok(())
}
