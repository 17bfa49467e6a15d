// Keyboard teleop for the command server
// WASD drive, I/K front lift, O/L back lift, U/J both, Space stop,
// C climb, V downstairs, F find wall, Z zero, P sensors, Q quit
use std::time::Duration;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tracing::info;

type TeleopError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(about = "Keyboard client for the Spencer command server")]
struct Args {
    /// Command server address
    #[arg(long, default_value = "127.0.0.1:1050")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<(), TeleopError> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    info!("Connecting to {}...", args.addr);
    let stream = TcpStream::connect(&args.addr).await?;
    let (reader, mut writer) = stream.into_split();

    // Print whatever the server sends
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            print!("< {}\r\n", line);
        }
        print!("Server closed the connection\r\n");
    });

    info!("Controls: WASD=drive, I/K=front, O/L=back, U/J=both, Space=stop");
    info!("C=climb, V=downstairs, F=find wall, Z=zero, P=sensors, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&mut writer).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(writer: &mut OwnedWriteHalf) -> Result<(), TeleopError> {
    loop {
        // crossterm polling blocks, keep it off the runtime threads
        let key = tokio::task::spawn_blocking(|| -> std::io::Result<Option<KeyEvent>> {
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    return Ok(Some(key));
                }
            }
            Ok(None)
        })
        .await??;

        let Some(KeyEvent { code, kind, .. }) = key else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }

        let command = match code {
            KeyCode::Char('w') => "forward",
            KeyCode::Char('s') => "backward",
            KeyCode::Char('a') => "turn left",
            KeyCode::Char('d') => "turn right",
            KeyCode::Char(' ') => "stop",
            KeyCode::Char('i') => "lift front",
            KeyCode::Char('k') => "lower front",
            KeyCode::Char('o') => "lift back",
            KeyCode::Char('l') => "lower back",
            KeyCode::Char('u') => "lift both",
            KeyCode::Char('j') => "lower both",
            KeyCode::Char('c') => "climb",
            KeyCode::Char('v') => "downstairs",
            KeyCode::Char('f') => "find wall",
            KeyCode::Char('z') => "zero",
            KeyCode::Char('p') => "sensors",

            // Quit, stopping first
            KeyCode::Char('q') | KeyCode::Esc => {
                send(writer, "stop").await?;
                break;
            }

            _ => continue,
        };
        print!("> {}\r\n", command);
        send(writer, command).await?;
    }

    Ok(())
}

async fn send(writer: &mut OwnedWriteHalf, command: &str) -> std::io::Result<()> {
    writer.write_all(command.as_bytes()).await?;
    writer.write_all(b"\n").await
}
