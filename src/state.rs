use std::sync::Arc;

use crate::config::ScannerConfig;
use crate::credits::CreditLedger;
use crate::extractor::{ChromiumExtractor, PageExtractor};
use crate::insight::{InferenceClient, InsightGenerator, OpenAiClient};
use crate::orchestrator::{Orchestrator, ScanQueue};
use crate::scan_log::ScanLog;
use crate::store::{ScanDb, ScanStore};

pub type SharedState = Arc<ScannerState>;

pub struct ScannerState {
    pub config: ScannerConfig,
    /// Concrete handle for read projections; `store` and `ledger` are views
    /// of the same database.
    pub db: Arc<ScanDb>,
    pub store: Arc<dyn ScanStore>,
    pub ledger: Arc<dyn CreditLedger>,
    pub queue: ScanQueue,
    pub logs: Arc<ScanLog>,
}

impl ScannerState {
    /// Wire the pipeline around the given browser and inference boundaries
    /// and start the dispatcher. Must be called inside a tokio runtime.
    pub fn new(
        config: ScannerConfig,
        db: Arc<ScanDb>,
        extractor: Arc<dyn PageExtractor>,
        inference: Arc<dyn InferenceClient>,
    ) -> SharedState {
        let logs = Arc::new(ScanLog::new());
        let generator = InsightGenerator::new(inference, config.model.clone(), config.inference_timeout);
        let orchestrator = Arc::new(Orchestrator::new(
            db.clone(),
            extractor,
            generator,
            logs.clone(),
        ));

        let (queue, receiver) = ScanQueue::new(config.queue_capacity);
        queue.spawn_dispatcher(receiver, orchestrator, config.workers);

        Arc::new(Self {
            config,
            store: db.clone(),
            ledger: db.clone(),
            db,
            queue,
            logs,
        })
    }

    /// Production wiring: headless Chromium and the configured inference API.
    pub fn from_config(config: ScannerConfig, db: Arc<ScanDb>) -> anyhow::Result<SharedState> {
        let extractor = Arc::new(ChromiumExtractor::new(config.chrome.clone()));
        let inference = Arc::new(OpenAiClient::new(
            &config.inference_url,
            config.inference_api_key.clone(),
            config.inference_timeout,
        )?);
        Ok(Self::new(config, db, extractor, inference))
    }
}
