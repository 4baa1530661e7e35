use std::{future::Future, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use antisc_core::{
    chat_state::ChatStateCache,
    config::Config,
    deletion::DeletionQueue,
    detector::ScriptDiffDetector,
    logging::Logger,
    messaging::{port::PlatformPort, throttled::ThrottledPlatform},
    pipeline::{ModerationConfig, ModerationPipeline},
    ports::ScriptConverter,
    store::{ChatStateStore, JsonFileStore},
};

use crate::handlers;
use crate::TelegramPlatform;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ModerationPipeline>,
    pub platform: Arc<dyn PlatformPort>,
    pub deletions: DeletionQueue,
}

pub async fn run_polling(
    cfg: Arc<Config>,
    converter: Arc<dyn ScriptConverter>,
    logger: Arc<dyn Logger>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());
    let signal = shutdown_signal()?;

    let store: Arc<dyn ChatStateStore> = Arc::new(JsonFileStore::new(&cfg.chat_store_file));
    let cache = Arc::new(ChatStateCache::new(store));
    load_chat_table(&cache, &cfg).await?;

    // Deletions come in bursts during spam waves; space them out to stay
    // clear of flood limits. 429s are still retried once by the adapter.
    let raw_platform: Arc<dyn PlatformPort> = Arc::new(TelegramPlatform::new(bot.clone()));
    let platform: Arc<dyn PlatformPort> =
        Arc::new(ThrottledPlatform::new(raw_platform, cfg.throttle()));

    let deletions = DeletionQueue::new(platform.clone(), logger.clone(), cfg.deletion());
    deletions.start().await;

    let detector = Arc::new(ScriptDiffDetector::new(converter, logger.clone()));
    let pipeline = Arc::new(ModerationPipeline::new(
        ModerationConfig::from(cfg.as_ref()),
        cache.clone(),
        detector,
        platform.clone(),
        deletions.clone(),
        logger,
    ));

    let state = Arc::new(AppState {
        pipeline,
        platform,
        deletions: deletions.clone(),
    });

    match bot.get_me().await {
        Ok(me) => tracing::info!("antisc started: @{}", me.username()),
        Err(e) => tracing::warn!("get_me failed: {e}"),
    }
    tracing::info!(
        chats = cache.len().await,
        threshold = cfg.ng_rate_threshold,
        "start polling messages"
    );

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|_| async {})
        .build();

    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(async move {
        match signal.await {
            Ok(name) => tracing::info!(signal = name, "shutdown requested"),
            Err(e) => {
                tracing::error!("cannot listen for shutdown signals: {e}");
                return;
            }
        }
        if let Ok(done) = shutdown.shutdown() {
            done.await;
        }
    });

    dispatcher.dispatch().await;

    deletions.stop().await;
    if let Err(e) = cache.save().await {
        tracing::error!("final save of chat table failed: {e}");
    }
    tracing::info!("shutdown complete");

    Ok(())
}

/// Resolves with the signal's name on SIGINT or SIGTERM.
///
/// The SIGTERM handler is installed before this returns.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = std::io::Result<&'static str>>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
            _ = term.recv() => Ok("SIGTERM"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = std::io::Result<&'static str>>> {
    Ok(async { tokio::signal::ctrl_c().await.map(|()| "ctrl-c") })
}

/// Load the saved table; on failure write an empty one so later saves have
/// a valid target, and start fresh.
async fn load_chat_table(cache: &ChatStateCache, cfg: &Config) -> anyhow::Result<()> {
    match cache.load().await {
        Ok(()) => {
            tracing::info!(
                path = %cfg.chat_store_file.display(),
                chats = cache.len().await,
                "loaded saved chat data"
            );
        }
        Err(e) => {
            tracing::warn!(
                path = %cfg.chat_store_file.display(),
                "no usable chat data ({e}); starting empty"
            );
            cache
                .save()
                .await
                .map_err(|e| anyhow::anyhow!("cannot write chat store: {e}"))?;
        }
    }
    Ok(())
}
