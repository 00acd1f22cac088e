use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;

use super::Pipeline;
use crate::acquisition::{ConnectorStatus, Sample, SignalQuality};
use crate::analysis::FeatureVector;
use crate::error::ErrorCode;
use crate::training::{Prediction, SessionSummary, TrainerStatus};

/// Everything a front end may want to display, flattened into one stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Sample { value: Sample },
    Quality { value: SignalQuality },
    /// Raw samples counted in the last sampling-rate interval
    SamplingRate { samples: u32 },
    Features { values: FeatureVector },
    Prediction { identifier: String, target: usize },
    Connector { status: String },
    Trainer { status: String },
    SessionCompleted { summary: SessionSummary },
}

impl From<&ConnectorStatus> for PipelineEvent {
    fn from(status: &ConnectorStatus) -> Self {
        let status = match status {
            ConnectorStatus::Connecting => "connecting".to_string(),
            ConnectorStatus::Streaming => "streaming".to_string(),
            ConnectorStatus::Closed => "closed".to_string(),
            ConnectorStatus::Failed(err) => format!("failed: {}", err.message()),
        };
        PipelineEvent::Connector { status }
    }
}

impl From<&TrainerStatus> for PipelineEvent {
    fn from(status: &TrainerStatus) -> Self {
        let status = match status {
            TrainerStatus::Phase {
                state,
                identifier: Some(name),
            } => format!("{:?} {}", state, name),
            TrainerStatus::Phase {
                state,
                identifier: None,
            } => format!("{:?}", state),
            TrainerStatus::Scored { identifier, score } => {
                format!("scored {} at {:.3}", identifier, score)
            }
            TrainerStatus::Completed(summary) => {
                return PipelineEvent::SessionCompleted {
                    summary: summary.clone(),
                }
            }
            TrainerStatus::Rejected(err) => format!("rejected: {}", err.message()),
            TrainerStatus::Failed(err) => format!("failed: {}", err.message()),
        };
        PipelineEvent::Trainer { status }
    }
}

impl Pipeline {
    // ========================================================================
    // STREAM SUBSCRIPTIONS
    // ========================================================================
    //
    // Each stream is a bounded queue subscriber: a consumer that falls behind
    // skips the oldest values instead of stalling the publisher. Streams end
    // when the pipeline closes.

    pub fn sample_stream(&self) -> BoxStream<'static, Sample> {
        live("samples", self.connector.samples().subscribe_stream())
    }

    pub fn quality_stream(&self) -> BoxStream<'static, SignalQuality> {
        live("quality", self.connector.quality().subscribe_stream())
    }

    pub fn feature_stream(&self) -> BoxStream<'static, FeatureVector> {
        live("features", self.processor.features().subscribe_stream())
    }

    pub fn prediction_stream(&self) -> BoxStream<'static, Prediction> {
        live("predictions", self.trainer.predictions().subscribe_stream())
    }

    pub fn trainer_status_stream(&self) -> BoxStream<'static, TrainerStatus> {
        live("trainer_status", self.trainer.status().subscribe_stream())
    }

    /// Merge every channel into one event stream
    ///
    /// Raw samples arrive at the sensor rate, so they are only included when
    /// `include_samples` is set.
    pub fn events(&self, include_samples: bool) -> BoxStream<'static, PipelineEvent> {
        let mut streams: Vec<BoxStream<'static, PipelineEvent>> = vec![
            self.quality_stream()
                .map(|value| PipelineEvent::Quality { value })
                .boxed(),
            live("sampling_rate", self.connector.sampling_rate().subscribe_stream())
                .map(|samples| PipelineEvent::SamplingRate { samples })
                .boxed(),
            self.feature_stream()
                .map(|values| PipelineEvent::Features { values })
                .boxed(),
            self.prediction_stream()
                .map(|p| PipelineEvent::Prediction {
                    identifier: p.identifier,
                    target: p.target,
                })
                .boxed(),
            live("connector_status", self.connector.status().subscribe_stream())
                .map(|status| PipelineEvent::from(&status))
                .boxed(),
            self.trainer_status_stream()
                .map(|status| PipelineEvent::from(&status))
                .boxed(),
        ];
        if include_samples {
            streams.push(
                self.sample_stream()
                    .map(|value| PipelineEvent::Sample { value })
                    .boxed(),
            );
        }
        stream::select_all(streams).boxed()
    }
}

/// Adapt a channel's queue subscription, skipping over lag notifications
fn live<T: Clone + Send + 'static>(
    channel: &'static str,
    subscription: Option<BroadcastStream<T>>,
) -> BoxStream<'static, T> {
    if subscription.is_none() {
        tracing::debug!("[Pipeline] {} already closed, stream is empty", channel);
    }
    stream::iter(subscription)
        .flatten()
        .filter_map(move |item| async move {
            match item {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::debug!("[Pipeline] {} subscriber lagged: {}", channel, err);
                    None
                }
            }
        })
        .boxed()
}
