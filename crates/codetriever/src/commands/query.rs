//! `codetriever query`: answer a natural-language question against an
//! indexed scope, in the mode the user selected (or `auto` by default).

use std::path::PathBuf;

use codetriever_config::EngineConfig;
use codetriever_meta_data::ManifestStore;
use codetriever_search::{QueryContext, QueryMode};

use crate::bootstrap::build_engine;
use crate::error::{CliError, CliResult};

pub struct QueryArgs {
    pub scope_id: String,
    pub query: String,
    pub mode: QueryMode,
}

pub async fn run(config: &EngineConfig, workspace_root: PathBuf, args: QueryArgs) -> CliResult<()> {
    let manifest_store = ManifestStore::new(workspace_root.clone());
    let manifest = manifest_store
        .load_manifest(&args.scope_id)
        .await?
        .ok_or_else(|| CliError::ScopeNotIndexed(args.scope_id.clone()))?;

    let ctx = QueryContext {
        scope_id: args.scope_id.clone(),
        index_revision: manifest.index_revision,
        engine_config_hash: manifest.engine_config_hash,
        sources_digest: Some(manifest.sources_digest),
    };

    let engine = build_engine(config, workspace_root).await?;

    // Keep the overlay partition current with local git changes since the
    // base index's recorded revision before reading through it (spec §4.5).
    if let Err(error) = engine
        .overlay_manager
        .refresh(&args.scope_id, &engine.workspace_root, manifest.git_revision.as_deref())
        .await
    {
        tracing::warn!(%error, scope_id = %args.scope_id, "overlay refresh failed, querying base index only");
    }

    let response = engine.orchestrator.query(&args.scope_id, &args.query, args.mode, &ctx).await?;

    println!("{}", response.answer);
    println!();
    println!(
        "confidence: {:.2}  complete: {}  mode: {}  cached: {}  iterations: {}",
        response.confidence,
        response.complete,
        response.mode.as_str(),
        response.cached,
        response.iterations,
    );
    if !response.sources.is_empty() {
        println!();
        println!("sources:");
        for source in &response.sources {
            println!(
                "  {}:{}-{} (relevance {:.2})",
                source.file, source.start_line, source.end_line, source.relevance
            );
        }
    }
    for warning in &response.warnings {
        println!("warning: {warning}");
    }
    for suggestion in &response.suggestions {
        println!("suggestion: {suggestion}");
    }

    Ok(())
}
