//! Spatial command - render the catchment layer

use crate::cache::CacheClient;
use crate::cli::args::SpatialArgs;
use crate::config::Config;
use crate::error::LyraResult;
use crate::geometry::Bbox;
use crate::rsb::RsbService;
use crate::source::{ByteSource, FileSource};
use crate::spatial::{catchidns_upstream_of, SpatialFormat, SpatialRequest, SpatialService};
use std::sync::Arc;

/// Execute the spatial command
pub async fn execute(args: SpatialArgs, config: &Config) -> LyraResult<()> {
    let format: SpatialFormat = args.format.parse()?;
    let bbox = args.bbox.as_deref().map(str::parse::<Bbox>).transpose()?;

    let source = super::file_source(args.source, config.spatial.source.as_ref(), "spatial")?;
    let cache = CacheClient::connect(&config.cache).await?;

    let mut catchidns = args.catchidn;
    if let Some(id) = args.upstream_of {
        // The polygon layer carries the topology columns too
        let topology: Arc<dyn ByteSource> = match &config.rsb.source {
            Some(path) => Arc::new(FileSource::new(path)),
            None => Arc::clone(&source),
        };
        let rsb = RsbService::new(cache.clone(), topology, config.rsb.clone());
        catchidns.extend(catchidns_upstream_of(&rsb, id).await?);
    }

    let service = SpatialService::new(cache, source, config.spatial.clone());

    let bytes = if args.table {
        service.rsb_data(args.watershed, catchidns).await?
    } else {
        let request = SpatialRequest {
            format,
            bbox,
            watersheds: args.watershed,
            catchidns,
            toposimplify: args.toposimplify,
            topoquantize: args.topoquantize,
        };
        service.get_spatial(&request).await?
    };

    super::emit(&bytes)
}
