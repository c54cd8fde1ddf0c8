//! board-sync - Multicast Drawing Board Node
//!
//! This is the composition root that wires together all the components.

use board_sync::adapters::inbound::{stdin_lines, Console};
use board_sync::adapters::outbound::{LoggingBoard, MulticastTransport};
use board_sync::infrastructure::shutdown_signal;
use board_sync::load_config;
use board_sync::replication::SyncEngine;
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let multicast = cfg.multicast_config()?;
    tracing::info!(
        "starting board-sync node_id={} group={}",
        cfg.node_id,
        multicast.group_addr()
    );

    // ===== COMPOSITION ROOT =====

    // 1. Outbound adapters: the multicast group and the view
    let transport = Arc::new(MulticastTransport::bind(&multicast)?);
    let board = Arc::new(LoggingBoard::default());

    // 2. Sync engine
    let engine = Arc::new(SyncEngine::new(cfg.sync_config(), transport, board.clone())?);
    engine.start();

    // 3. Inbound adapter: console commands
    let console = Console::new(engine.clone());
    tokio::spawn(console.run(stdin_lines(), engine.shutdown_handle()));

    shutdown_signal(engine.shutdown_handle()).await;

    engine.stop();
    engine.wait().await;

    tracing::info!(
        "node {} stopped after applying {} events (highest v{})",
        engine.node_id(),
        board.applied(),
        engine.highest_version()
    );
    Ok(())
}
