pub mod aggregator;
pub mod buckets;
pub mod etl;
pub mod filename;
pub mod grouper;
pub mod output;
pub mod pipeline;
pub mod projector;
pub mod timeseries;

pub use crate::domain::model::{ExtractResult, RunReport, TransformResult};
pub use crate::domain::ports::{BoundarySource, ConfigProvider, OutputFiles, Pipeline, Storage, ZonalSum};
pub use crate::utils::error::Result;
