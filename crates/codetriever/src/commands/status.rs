//! `codetriever status`: print the last-built manifest's stats for a scope.

use std::path::PathBuf;

use codetriever_meta_data::ManifestStore;

use crate::error::{CliError, CliResult};

pub async fn run(workspace_root: PathBuf, scope_id: String) -> CliResult<()> {
    let manifest_store = ManifestStore::new(workspace_root);
    let manifest = manifest_store
        .load_manifest(&scope_id)
        .await?
        .ok_or_else(|| CliError::ScopeNotIndexed(scope_id.clone()))?;

    println!("scope:              {scope_id}");
    println!("index revision:     {}", manifest.index_revision);
    println!("built at:           {}", manifest.built_at);
    println!("engine config hash: {}", manifest.engine_config_hash);
    println!("total chunks:       {}", manifest.stats.total_chunks);
    println!("total files:        {}", manifest.stats.total_files);
    println!("embedding model:    {}", manifest.stats.embedding_model);
    println!("embedding dim:      {}", manifest.stats.embedding_dimension);
    println!("last index time:    {}ms", manifest.stats.index_time_ms);

    Ok(())
}
