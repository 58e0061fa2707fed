use phx_realtime::{Socket, SocketOptions};
use serde_json::json;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:4000/socket/websocket".to_string());

    let socket = Socket::new(
        endpoint,
        SocketOptions {
            params: vec![("user_id".to_string(), "demo".to_string())],
            ..Default::default()
        },
    )?;

    println!("Connecting...");
    socket.connect().await?;
    println!("Connected!");

    let channel = socket.channel("room:lobby", json!({})).await;

    channel
        .on("new_msg", |payload, _ref| {
            println!(
                "<{}> {}",
                payload["user"].as_str().unwrap_or("?"),
                payload["body"].as_str().unwrap_or("")
            );
        })
        .await;

    channel
        .join(None)
        .await?
        .receive("ok", |_| println!("Joined room:lobby"))
        .receive("error", |resp| eprintln!("Join rejected: {resp}"))
        .receive("timeout", |_| eprintln!("Join timed out, retrying..."));

    // Say hello once we are in.
    tokio::time::sleep(Duration::from_secs(1)).await;
    channel
        .push("new_msg", json!({"user": "demo", "body": "hello from rust"}))
        .await?
        .receive("ok", |_| println!("Message delivered"));

    // Keep the connection alive until interrupted
    tokio::signal::ctrl_c().await?;

    println!("Leaving...");
    channel.leave(None).await;
    socket.disconnect().await?;
    println!("Disconnected!");

    Ok(())
}
