//! Domain layer: entities, value types, collaborator seams and domain constants.

pub mod collaborators;
pub mod constants;
pub mod error;
pub mod model;

pub use collaborators::{AnnotationSink, MetricsFetch, PageProvider, SettingsProvider};
pub use error::OverlayError;
pub use model::{
    AreaKind, BackoffState, DateRange, FeatureConfig, FetchOutcome, IdentifierSet, MetricRow,
    PageContext, ParentIds, RefreshCacheEntry, RefreshRequestParams, StatusSnapshot, ToastKind,
};
