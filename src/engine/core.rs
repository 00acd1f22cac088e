//! Pipeline: acquisition → spectral processor → trainer orchestration.
//!
//! The pipeline owns one component of each stage and wires them together with
//! channel callbacks, so every hop runs on the publishing component's thread:
//! samples are windowed on the acquisition thread, feature vectors reach the
//! trainer on the transform worker thread. Front ends only talk to the
//! pipeline's channels and to the trainer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::acquisition::{Connector, ConnectorState};
use crate::analysis::{FeatureVector, SpectralProcessor};
use crate::config::AppConfig;
use crate::error::{AcquisitionError, PipelineError};
use crate::training::Trainer;

#[path = "core_subscriptions.rs"]
mod core_subscriptions;

pub use core_subscriptions::PipelineEvent;

/// One acquisition/training session, from sensor bytes to predictions
pub struct Pipeline {
    config: AppConfig,
    connector: Connector,
    processor: Arc<SpectralProcessor>,
    trainer: Arc<Trainer>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl Pipeline {
    /// Build every stage from `config` and wire the channels between them
    ///
    /// Nothing runs until `start()`.
    pub fn new(config: AppConfig) -> Result<Self, PipelineError> {
        let processor = Arc::new(SpectralProcessor::new(&config.processing, &config.channels)?);
        let trainer = Arc::new(Trainer::new(config.training.clone(), &config.channels));
        let connector = Connector::new(config.acquisition.clone(), &config.channels);

        Self::wire(&connector, &processor, &trainer);

        Ok(Self {
            config,
            connector,
            processor,
            trainer,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Load `assets/neurosky_config.json` (or defaults) and build a pipeline
    pub fn from_default_config() -> Result<Self, PipelineError> {
        Self::new(AppConfig::load())
    }

    fn wire(connector: &Connector, processor: &Arc<SpectralProcessor>, trainer: &Arc<Trainer>) {
        let sink = Arc::clone(processor);
        connector
            .samples()
            .subscribe(move |sample: &i32| sink.add_sample(*sample));

        let sink = Arc::clone(trainer);
        processor
            .features()
            .subscribe(move |features: &FeatureVector| sink.add_feature_vector(features.clone()));
    }

    /// Start the transform worker, then the acquisition thread
    ///
    /// # Errors
    /// `PipelineError` wrapping the first stage that refused to start; a
    /// pipeline starts at most once.
    pub fn start(&self) -> Result<(), PipelineError> {
        if self.closed.load(Ordering::SeqCst) || self.started.swap(true, Ordering::SeqCst) {
            return Err(AcquisitionError::AlreadyRunning.into());
        }

        self.processor.start()?;
        self.connector.start()?;

        tracing::info!(
            "[Pipeline] Started ({} source, window {} samples, {:?} slicing)",
            if self.config.acquisition.synthetic {
                "synthetic"
            } else {
                "ThinkGear"
            },
            self.config.processing.resolution,
            self.config.processing.slice_mode
        );
        Ok(())
    }

    /// Block until the acquisition session ends on its own (EOF or failure)
    pub fn join(&self) -> Result<(), AcquisitionError> {
        self.connector.join()
    }

    /// Tear the stages down upstream first. Idempotent.
    ///
    /// The processor drains windows already queued, so feature vectors produced
    /// from samples received before close still reach the trainer.
    ///
    /// # Returns
    /// The acquisition error that ended the session, if any
    pub fn close(&self) -> Result<(), AcquisitionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let result = self.connector.close();
        self.processor.close();
        self.trainer.close();

        let stats = self.processor.stats();
        match &result {
            Ok(()) => tracing::info!(
                "[Pipeline] Closed: {} windows, {} artifacts, {} dropped",
                stats.windows_emitted,
                stats.artifacts_rejected,
                stats.windows_dropped
            ),
            Err(err) => tracing::warn!("[Pipeline] Closed after session error: {}", err),
        }
        result
    }

    pub fn is_streaming(&self) -> bool {
        self.connector.state() == ConnectorState::Streaming
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn processor(&self) -> &Arc<SpectralProcessor> {
        &self.processor
    }

    pub fn trainer(&self) -> &Arc<Trainer> {
        &self.trainer
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::debug!("[Pipeline] Session error at drop: {}", err);
        }
    }
}
