//! `codetriever index`: run a full incremental build for a scope.

use std::path::PathBuf;

use codetriever_config::EngineConfig;

use crate::bootstrap::build_engine;
use crate::error::CliResult;

pub struct IndexArgs {
    pub scope_id: String,
    pub path: Option<PathBuf>,
    pub exclude: Vec<String>,
}

pub async fn run(config: &EngineConfig, workspace_root: PathBuf, args: IndexArgs) -> CliResult<()> {
    let engine = build_engine(config, workspace_root.clone()).await?;
    let root = args.path.map_or_else(|| workspace_root.clone(), |rel| workspace_root.join(rel));

    let stats = engine.indexing_pipeline.run(&args.scope_id, &root, &args.exclude).await?;

    println!("scope:            {}", args.scope_id);
    println!("files discovered: {}", stats.files_discovered);
    println!("files processed:  {}", stats.files_processed);
    println!("files skipped:    {}", stats.files_skipped);
    println!("chunks stored:    {}", stats.chunks_stored);
    println!("chunks updated:   {}", stats.chunks_updated);
    println!("chunks skipped:   {}", stats.chunks_skipped);
    println!("errors:           {}", stats.error_count);
    println!("duration:         {}ms", stats.duration_ms);
    for err in &stats.errors {
        println!("  error: {} — {}", err.path, err.message);
    }

    Ok(())
}
