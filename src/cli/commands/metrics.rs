//! Metrics command - query catchment metrics

use crate::cache::CacheClient;
use crate::cli::args::MetricsArgs;
use crate::config::Config;
use crate::error::{LyraError, LyraResult};
use crate::metrics::{
    Aggregation, Granularity, MetricsRequest, MetricsService, SqliteStore, YearMonth,
};
use crate::rsb::RsbService;
use std::sync::Arc;

/// Execute the metrics command
pub async fn execute(args: MetricsArgs, config: &Config) -> LyraResult<()> {
    let database = args
        .database
        .or_else(|| config.metrics.database.clone())
        .ok_or(LyraError::SourceNotConfigured("metrics"))?;
    if !database.exists() {
        return Err(LyraError::io(
            format!("opening {}", database.display()),
            std::io::ErrorKind::NotFound.into(),
        ));
    }

    let store = Arc::new(SqliteStore::open(&database)?);
    let cache = CacheClient::connect(&config.cache).await?;
    let mut service = MetricsService::new(cache.clone(), store, config.metrics.clone());

    if args.list_variables {
        for category in service.categories().await? {
            println!("{:>6}  {}", category.variable, category.variable_name);
        }
        return Ok(());
    }

    if args.upstream {
        let topology = super::file_source(args.rsb_source, config.rsb.source.as_ref(), "rsb")?;
        service = service.with_rsb(RsbService::new(cache, topology, config.rsb.clone()));
    }

    let variable = args
        .variable
        .ok_or_else(|| LyraError::UnknownVariable(String::new()))?;
    let request = MetricsRequest {
        start: args.start.as_deref().map(str::parse::<YearMonth>).transpose()?,
        end: args.end.as_deref().map(str::parse::<YearMonth>).transpose()?,
        aggregation: args.agg.as_deref().map(str::parse::<Aggregation>).transpose()?,
        granularity: args.by.parse::<Granularity>()?,
        trace_upstream: args.upstream,
        ..MetricsRequest::new(args.catchidn, variable)
    };

    let bytes = service.query_metrics(&request).await?;
    super::emit(&bytes)
}
