//! Default display collaborator.
//!
//! Real embedders render badges into the host page; this sink only logs, so
//! the pipeline can run headless without a renderer attached.

use tracing::{error, info};

use crate::domain::model::{MetricRow, ToastKind};
use crate::domain::AnnotationSink;

#[derive(Debug, Default)]
pub struct LoggingAnnotationSink;

impl AnnotationSink for LoggingAnnotationSink {
    fn render_annotations(&self, rows: &[MetricRow]) {
        info!("rendering annotations for {} metric rows", rows.len());
    }

    fn clear_annotations(&self) {
        info!("clearing rendered annotations");
    }

    fn toast(&self, message: &str, kind: ToastKind) {
        match kind {
            ToastKind::Error => error!("toast: {message}"),
            ToastKind::Success | ToastKind::Info => info!("toast: {message}"),
        }
    }
}
