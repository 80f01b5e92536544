//! Cache command - manage the function cache

use crate::cache::CacheClient;
use crate::cli::args::{CacheAction, CacheArgs};
use crate::config::{CacheBackend, Config, ConfigManager};
use crate::error::LyraResult;
use crate::ui::{self, UiContext};

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config, manager: &ConfigManager) -> LyraResult<()> {
    let ctx = UiContext::detect();

    match args.action {
        CacheAction::Flush => flush(&ctx, config).await,
        CacheAction::Enable => set_enabled(&ctx, config, manager, true).await,
        CacheAction::Disable => set_enabled(&ctx, config, manager, false).await,
        CacheAction::Status => status(&ctx, config).await,
    }
}

async fn flush(ctx: &UiContext, config: &Config) -> LyraResult<()> {
    let client = CacheClient::connect(&config.cache).await?;
    client.flush_all().await?;
    ui::step_ok(ctx, &format!("Flushed {} cache", client.status().backend));
    Ok(())
}

/// Persist `cache.enabled` for later runs
async fn set_enabled(
    ctx: &UiContext,
    config: &Config,
    manager: &ConfigManager,
    enabled: bool,
) -> LyraResult<()> {
    let mut config = config.clone();
    config.cache.enabled = enabled;
    manager.save(&config).await?;

    let message = if enabled {
        "Caching enabled"
    } else {
        "Caching disabled"
    };
    ui::step_ok_detail(ctx, message, &manager.path().display().to_string());
    Ok(())
}

async fn status(ctx: &UiContext, config: &Config) -> LyraResult<()> {
    let client = CacheClient::connect(&config.cache).await?;
    let status = client.status();

    ui::key_value_status(
        ctx,
        "enabled",
        if status.enabled { "yes" } else { "no" },
        status.enabled,
    );
    ui::key_value_status(ctx, "backend", status.backend, true);
    if config.cache.backend == CacheBackend::File {
        let dir = config
            .cache
            .dir
            .clone()
            .unwrap_or_else(ConfigManager::cache_dir);
        ui::key_value_status(ctx, "directory", &dir.display().to_string(), true);
    }
    ui::key_value_status(
        ctx,
        "available",
        if status.available { "yes" } else { "no" },
        status.available,
    );

    Ok(())
}
