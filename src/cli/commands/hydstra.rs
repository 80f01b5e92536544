//! Hydstra command - fetch a timeseries trace as a background task

use crate::cache::{CachedResponse, ResponseStatus};
use crate::cli::args::HydstraArgs;
use crate::config::Config;
use crate::error::{LyraError, LyraResult};
use crate::hydstra::{get_trace_with_fallback, HydstraClient, TimeseriesSource, TraceRequest};
use crate::tasks::TaskRunner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Execute the hydstra command
pub async fn execute(args: HydstraArgs, config: &Config) -> LyraResult<()> {
    let mut settings = config.hydstra.clone();
    if let Some(base_url) = args.base_url {
        settings.base_url = base_url;
    }
    let client = HydstraClient::new(&settings)?;

    let request = TraceRequest {
        varto: args.varto,
        start_date: args.start,
        end_date: args.end,
        ..TraceRequest::new(args.site, args.varfrom)
    };
    let runner = TaskRunner::new(&config.tasks);
    let wait = args
        .wait_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| runner.default_wait());

    let mut response = fetch(&runner, Arc::new(client), request, args.fallback_varfrom, wait).await;
    if response.status == ResponseStatus::Pending && !args.no_wait {
        info!(
            "Trace still running, polling {}",
            response.result_route.as_deref().unwrap_or_default()
        );
        response = runner.wait_for(response).await?;
    }
    if response.status == ResponseStatus::Failure {
        warn!("Trace fetch failed");
    }

    super::emit(&serde_json::to_vec(&response)?)
}

/// Start the fallback fetch on `runner` and wait up to `wait` for it
async fn fetch(
    runner: &TaskRunner,
    source: Arc<dyn TimeseriesSource>,
    request: TraceRequest,
    fallback_varfrom: Option<String>,
    wait: Duration,
) -> CachedResponse {
    let task = async move {
        let trace =
            get_trace_with_fallback(source.as_ref(), &request, fallback_varfrom.as_deref()).await?;
        Ok::<_, LyraError>(serde_json::to_vec(&trace)?)
    };
    runner.run(task, wait).await
}
