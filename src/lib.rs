//! Training-vector extraction for cloud-type classification.
//!
//! Pairs satellite and cloud-type label grids by timestamp, samples
//! per-cell feature vectors (optionally restricted by a mask), cleans and
//! transforms them, normalizes labels to one coding standard, and places
//! predicted labels back onto a reference grid.

pub mod data;
pub mod error;
pub mod handler;
pub mod labels;
pub mod mask;
pub mod matcher;
pub mod rehydrate;
pub mod sampler;
pub mod settings;
pub mod transform;

pub use data::model::{GridDataset, MaskRef, SpatialIndexSet, TrainingPair};
pub use error::{Error, Result};
pub use handler::DataHandler;
pub use labels::LabelStandard;
pub use settings::{Settings, SettingsLoader};
