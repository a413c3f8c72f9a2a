use std::sync::Arc;

use anyhow::{Context, Result};
use numarena_ai::{AiConfig, AiEngine, Difficulty};
use numarena_server::{drive_with_ai, ArenaConfig, Matchmaker, Peer, RatingSystem};
use protocol::{MatchState, MemoryRoomStore, RoomStore, Seat, DEFAULT_RATING};
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("numarena_server=debug".parse()?))
        .init();

    let difficulty = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<Difficulty>().map_err(anyhow::Error::msg)?,
        None => Difficulty::Advanced,
    };
    let config = ArenaConfig::from_env()?;
    info!("NumArena 演示对局 (难度 {})", difficulty);

    let store: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new());
    let matchmaker = Matchmaker::new(Arc::clone(&store), config.matchmaking.clone());
    let (host_ticket, guest_ticket) = tokio::join!(
        matchmaker.auto_match("host-ai", DEFAULT_RATING),
        matchmaker.auto_match("guest-ai", DEFAULT_RATING),
    );
    let tickets = [host_ticket?, guest_ticket?];

    let seed = store
        .get_room(&tickets[0].room_id)
        .await?
        .context("房间不存在")?
        .seed as u64;

    let ai_config = AiConfig {
        think_delay_ms: config.ai_think_delay_ms,
        ..AiConfig::from_difficulty(difficulty)
    };

    let mut sessions = Vec::new();
    for ticket in &tickets {
        // 两方都由 AI 操作，不计回合时间
        let peer = Peer::for_role(ticket.role, ticket.room_id.clone(), Arc::clone(&store), seed, &config)
            .with_human_seats(&[]);
        let (command_tx, command_rx) = mpsc::channel(8);
        let (view_tx, view_rx) = watch::channel(Arc::new(MatchState::default()));
        let engine = AiEngine::new(ai_config.clone());
        tokio::spawn(drive_with_ai(peer.seat(), engine, view_rx, command_tx));
        sessions.push((ticket.role, tokio::spawn(peer.run(command_rx, view_tx))));
    }

    let rating = RatingSystem::new();
    for (role, handle) in sessions {
        let state = handle.await.context("会话任务异常退出")??;
        if let Some(outcome) = rating.outcome(&state, role.seat(), DEFAULT_RATING) {
            info!(
                "{:?}: {:?} {}:{}，等级分 {} ({:+})",
                role,
                outcome.result,
                outcome.my_score,
                outcome.opponent_score,
                outcome.new_rating,
                outcome.rating_change
            );
        }
        if role.seat() == Seat::First {
            println!("{}", state.board);
            println!(
                "结果: {:?}，胜者 {:?}，比分 {}:{}",
                state.end_reason, state.winner, state.scores.player1, state.scores.player2
            );
        }
    }

    Ok(())
}
