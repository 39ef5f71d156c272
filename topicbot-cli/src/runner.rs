//! Stdin/stdout driver for the bot.
//!
//! Each stdin line is one JSON message. Responses are written to stdout as
//! JSON lines once due. Logs go to stderr.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use topicbot_common::config::Config;
use topicbot_core::{Bot, Engine, InboundMessage, MetadataIntentClassifier, NoopEntityExtractor};

async fn build_bot(config: &Config) -> Result<Bot> {
    let engine = Engine::from_config(
        config,
        Vec::new(),
        Arc::new(NoopEntityExtractor),
        Arc::new(MetadataIntentClassifier::default()),
    )
    .await?;
    Ok(Bot::new(Arc::new(engine), &config.session)?)
}

/// Build every collaborator to surface configuration errors.
pub async fn check(config: &Config) -> Result<()> {
    let bot = build_bot(config).await?;
    let engine = bot.engine();
    println!("topics:    {}", engine.topics().names().join(", "));
    println!("default:   {}", engine.topics().default_topic());
    println!(
        "protocols: {}",
        engine
            .renderers()
            .protocols()
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("cache:     {}", engine.cache().backend().name());
    Ok(())
}

pub async fn run(config: Config, tick_ms: u64) -> Result<()> {
    let bot = build_bot(&config).await?;
    info!(
        topics = bot.engine().topics().len(),
        max_clients = config.session.max_clients,
        "topicbot ready"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut input_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                match line? {
                    Some(line) => handle_line(&bot, &line).await,
                    None => {
                        input_open = false;
                        info!("Input closed, flushing pending responses");
                    }
                }
            }
            _ = ticker.tick() => {
                let now = Utc::now();
                if input_open {
                    bot.run_silence_check_at(now).await;
                }
                flush(&bot, &mut stdout).await?;
                if !input_open && bot.pending_count().await == 0 {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_line(bot: &Bot, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let result = match InboundMessage::from_json_str(line) {
        Ok(message) => bot.respond(message).await.map(|_| ()),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        warn!(error = %e, "Message dropped");
    }
}

async fn flush<W: AsyncWrite + Unpin>(bot: &Bot, out: &mut W) -> Result<()> {
    let due = bot.drain_due().await;
    if due.is_empty() {
        return Ok(());
    }
    for response in &due {
        let mut line = serde_json::to_vec(response)?;
        line.push(b'\n');
        out.write_all(&line).await?;
    }
    out.flush().await?;
    Ok(())
}
