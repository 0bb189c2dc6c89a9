use anyhow::Result;
use livelab_client::{
    ClientConfig, ClientError, Identity, LiveSession, RtcApi, SignalingClient, ViewerPhase,
};
use livelab_protocol::{Role, ServerMessage};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livelab_client=info,livelab_viewer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::load()?;
    let url = config.ws_url();
    tracing::info!("Starting Livelab viewer as {}", config.display_name);

    let (client, mut events) = SignalingClient::connect(&url).await?;
    let rtc = RtcApi::new(&config.ice_servers)?;

    let mut identity = Identity::new(
        config.identity_id.clone(),
        config.display_name.clone(),
        Role::Viewer,
    );
    if let Some(token) = &config.token {
        identity = identity.with_token(token.clone());
    }

    let mut session = LiveSession::new(identity, config.room_id.clone(), client.sender(), rtc, None)?;
    session.identify().await?;

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut phase = ViewerPhase::Idle;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(message) = event else {
                    tracing::info!("Disconnected from server");
                    break;
                };

                let went_live = matches!(message, ServerMessage::RoomStatus { live: true, .. });
                if let ServerMessage::ChatReceive(chat) = &message {
                    println!("[{}] {}: {}", chat.timestamp.format("%H:%M"), chat.author, chat.text);
                }

                if let Err(e) = session.handle(message).await {
                    tracing::warn!("{}", e);
                }

                if let LiveSession::Viewer(viewer) = &mut session {
                    if went_live && matches!(viewer.phase(), ViewerPhase::Idle | ViewerPhase::Ended) {
                        if let Err(e) = viewer.join().await {
                            tracing::error!("Join failed: {}", e);
                        }
                    }
                    if viewer.phase() != phase {
                        phase = viewer.phase();
                        println!("-- {:?}{}", phase, viewer.notice().map(|n| format!(": {}", n)).unwrap_or_default());
                    }
                }
            }
            line = input.next_line() => match line {
                Ok(Some(text)) => match session.send_chat(&text).await {
                    Ok(()) => {}
                    Err(ClientError::Muted) => println!("-- You are muted"),
                    Err(e) => tracing::warn!("Chat not sent: {}", e),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to read input: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.shutdown().await;
    tracing::info!("Viewer stopped");
    Ok(())
}
