//! Construction of the triage pipeline from resolved configuration

use crate::config::IngestConfig;
use crate::db::Ledger;
use crate::services::{
    CommandMetadataInvoker, CommandScorer, FfmpegDenoiser, MetadataCompletionInvoker, Quarantine,
    RepairOrchestrator, RepairTool, Scorer, TriageEngine,
};
use nas_common::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Build the engine with the configured external programs.
///
/// A missing scorer program is a configuration error. An unusable repair
/// tool is not: the engine runs with repair disabled and dirty files stay
/// quarantined.
pub async fn build_engine(config: &IngestConfig, ledger: Arc<Ledger>) -> Result<TriageEngine> {
    let program = config.scorer.program.clone().ok_or_else(|| {
        Error::Config("No scorer configured: set `program` in the [scorer] table".to_string())
    })?;
    let scorer: Arc<dyn Scorer> = Arc::new(CommandScorer::new(
        program,
        config.scorer.args.clone(),
        Duration::from_secs(config.scorer.timeout_secs),
    ));

    let repair_tool: Option<Arc<dyn RepairTool>> = if config.repair.enabled {
        match FfmpegDenoiser::new(
            &config.repair.program,
            Duration::from_secs(config.repair.timeout_secs),
        )
        .await
        {
            Ok(tool) => Some(Arc::new(tool)),
            Err(e) => {
                error!(error = %e, "Repair branch disabled");
                None
            }
        }
    } else {
        info!("Repair disabled by configuration");
        None
    };

    let metadata: Option<Arc<dyn MetadataCompletionInvoker>> = if config.metadata.enabled {
        Some(Arc::new(CommandMetadataInvoker::new(
            config.metadata.program.clone(),
            config.metadata.args.clone(),
            Duration::from_secs(config.metadata.timeout_secs),
        )))
    } else {
        info!("Metadata completion disabled by configuration");
        None
    };

    let repair = RepairOrchestrator::new(
        repair_tool,
        Arc::clone(&ledger),
        config.ingest_dir.clone(),
        config.workspace_dir.clone(),
        config.repair.strength_db,
        config.repair.max_generations,
    );

    Ok(TriageEngine::new(
        ledger,
        scorer,
        metadata,
        Quarantine::new(config.quarantine_dir.clone()),
        repair,
        config.noise_threshold,
    ))
}
