//! Example: an echo server actor and a client agent
//!
//! The server actor drains its mailbox and echoes every position update back to
//! the sender. The client agent sends a position on every timer tick, offloads
//! a path computation to a worker, and stops after a few replies.
//!
//! Run with: `cargo run --example echo_actor`

#![allow(clippy::uninlined_format_args)]

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use simnet::config::{NetworkConfig, ServerConfig};
use simnet::core::serialization::SerializationFormat;
use simnet::protocol::ProtocolRegistry;
use simnet::receiver::{spawn_worker, Mailbox, ReceiverMessage};
use simnet::timer::TimerManager;
use simnet::transport::{connect_with_config, MailboxForwarder, SessionFactory, TcpServer};
use simnet::utils::logging::init_logging;
use simnet::utils::Metrics;
use tokio::sync::mpsc;

#[derive(Debug, Serialize, Deserialize)]
struct Position {
    agent: u32,
    x: i32,
    y: i32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = NetworkConfig::default_with_overrides(|c| {
        c.server = ServerConfig {
            address: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        };
    });
    init_logging(&config.logging)?;

    let registry = ProtocolRegistry::with_defaults(&config.transport)?;
    let metrics = Arc::new(Metrics::new());

    // server actor
    let mut server_mailbox = Mailbox::new("echo-server")?;
    let server_factory = SessionFactory::from_config(
        &registry,
        &config.transport,
        Arc::new(MailboxForwarder::new(server_mailbox.receiver())),
    )?
    .with_metrics(metrics.clone());
    let server = TcpServer::bind(&config.server, server_factory).await?;
    let address = server.local_addr()?;
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let server_task = tokio::spawn(server.run_with_shutdown(shutdown_rx));

    tokio::spawn(async move {
        while let Some(message) = server_mailbox.recv().await {
            if let ReceiverMessage::Network(m) = message {
                let (session, packet) = m.into_parts();
                if let Err(e) = session.send(packet) {
                    println!("server: reply failed: {}", e);
                }
            }
        }
    });

    // client agent
    let mut client_config = config.client.clone();
    client_config.address = address.to_string();

    let mut agent = Mailbox::new("agent-1")?;
    let client_factory = SessionFactory::from_config(
        &registry,
        &config.transport,
        Arc::new(MailboxForwarder::new(agent.receiver())),
    )?
    .with_metrics(metrics.clone());
    let session = connect_with_config(&client_config, &client_factory).await?;

    let timers = TimerManager::new()?.with_metrics(metrics.clone());
    let tick = timers.create_timer(&agent.receiver());
    tick.schedule_after(100);

    spawn_worker(&agent.receiver(), "path-planner", || {
        std::thread::sleep(Duration::from_millis(50));
        Ok(vec![(0, 0), (1, 0), (1, 1)])
    })?;

    let mut step = 0;
    let mut replies = 0;
    while let Some(message) = agent.recv().await {
        match message {
            ReceiverMessage::TimerFired(_) => {
                step += 1;
                let position = Position {
                    agent: 1,
                    x: step,
                    y: -step,
                };
                session.send_value(&position, SerializationFormat::Json)?;
                if step < 3 {
                    tick.schedule_after(100);
                }
            }
            ReceiverMessage::Network(m) => {
                let (echoed, format) = m.packet().to_value::<Position>()?;
                println!("agent: echo {:?} ({})", echoed, format.name());
                replies += 1;
                if replies == 3 {
                    break;
                }
            }
            ReceiverMessage::WorkerResult(r) => {
                println!("agent: path {:?}", r.downcast_ref::<Vec<(i32, i32)>>());
            }
            ReceiverMessage::WorkerException(e) => println!("agent: worker failed: {}", e.cause()),
            ReceiverMessage::WorkerFinished(f) => println!("agent: worker {} done", f.worker()),
        }
    }

    session.close(false);
    session.closed().await;
    shutdown_tx.send(()).await?;
    server_task.await??;

    metrics.log_metrics();
    println!("{:#?}", metrics.snapshot());
    Ok(())
}
