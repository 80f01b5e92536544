//! Trace command - catchments upstream or downstream of one catchment

use crate::cache::CacheClient;
use crate::cli::args::{OutputFormat, TraceArgs, TraceDirection};
use crate::config::Config;
use crate::error::LyraResult;
use crate::rsb::{Direction, RsbService};
use tracing::debug;

/// Execute the trace command
pub async fn execute(args: TraceArgs, config: &Config) -> LyraResult<()> {
    let source = super::file_source(args.source, config.rsb.source.as_ref(), "rsb")?;
    let cache = CacheClient::connect(&config.cache).await?;
    let service = RsbService::new(cache, source, config.rsb.clone());

    let direction = match args.direction {
        TraceDirection::Upstream => Direction::Upstream,
        TraceDirection::Downstream => Direction::Downstream,
    };
    debug!("Tracing {} from {}", direction, args.catchidn);

    if args.envelope {
        let bytes = service.trace_response(args.catchidn, direction).await?;
        return super::emit(&bytes);
    }

    let ids = service.trace_ids(args.catchidn, direction).await?;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&ids)?),
        OutputFormat::Plain => {
            for id in ids {
                println!("{}", id);
            }
        }
    }

    Ok(())
}
