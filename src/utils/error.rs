use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Boundary file has none of the identifier fields: {}", candidates.join(", "))]
    MissingRegionIdentifier { candidates: Vec<String> },

    #[error("Feature #{index} has no usable value for identifier field '{field}'")]
    MissingRegionIdValue { index: usize, field: String },

    #[error("Region identifier '{id}' appears more than once in field '{field}'")]
    DuplicateRegionId { id: String, field: String },

    #[error("Boundary data error: {message}")]
    BoundaryError { message: String },

    #[error("Raster '{}' could not be read: {message}", path.display())]
    RasterError { path: PathBuf, message: String },

    #[error(
        "Zonal sum for '{}' returned {actual} values for {expected} regions",
        path.display()
    )]
    ZonalShapeMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("Aggregation worker failed: {message}")]
    WorkerError { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Raster,
    Output,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::MissingRegionIdentifier { .. } => ErrorCategory::Configuration,
            EtlError::MissingRegionIdValue { .. }
            | EtlError::DuplicateRegionId { .. }
            | EtlError::BoundaryError { .. } => ErrorCategory::Input,
            EtlError::RasterError { .. } | EtlError::ZonalShapeMismatch { .. } => {
                ErrorCategory::Raster
            }
            EtlError::ZipError(_) | EtlError::CsvError(_) | EtlError::SerializationError(_) => {
                ErrorCategory::Output
            }
            EtlError::IoError(_) | EtlError::WorkerError { .. } | EtlError::ProcessingError { .. } => {
                ErrorCategory::System
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EtlError::RasterError { .. } => ErrorSeverity::Medium,
            EtlError::WorkerError { .. } | EtlError::ZonalShapeMismatch { .. } => {
                ErrorSeverity::Critical
            }
            _ => ErrorSeverity::High,
        }
    }

    /// A single unreadable raster may be dropped from its group when the
    /// pipeline runs with `on_raster_error = "skip"`.
    pub fn is_skippable_raster_error(&self) -> bool {
        matches!(self, EtlError::RasterError { .. })
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            EtlError::MissingRegionIdentifier { candidates } => format!(
                "Add one of these properties to every boundary feature: {}",
                candidates.join(", ")
            ),
            EtlError::MissingRegionIdValue { field, .. } => {
                format!("Fill in '{}' for every boundary feature", field)
            }
            EtlError::DuplicateRegionId { field, .. } => format!(
                "Pick an identifier field that is unique per region (current: '{}')",
                field
            ),
            EtlError::BoundaryError { .. } => {
                "Check that the boundary file is a GeoJSON FeatureCollection of polygons".to_string()
            }
            EtlError::RasterError { .. } => {
                "Re-download the raster or set error_handling.on_raster_error = \"skip\"".to_string()
            }
            EtlError::ZonalShapeMismatch { .. } => {
                "The zonal statistics backend must return one value per region, in region order"
                    .to_string()
            }
            EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => {
                "Review the configuration file and command-line flags".to_string()
            }
            EtlError::IoError(_) => "Check that the paths exist and are writable".to_string(),
            EtlError::ZipError(_) | EtlError::CsvError(_) | EtlError::SerializationError(_) => {
                "Check free disk space and the output directory".to_string()
            }
            EtlError::WorkerError { .. } | EtlError::ProcessingError { .. } => {
                "Re-run with --verbose and inspect the log".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Input => format!("Boundary input problem: {}", self),
            ErrorCategory::Raster => format!("Raster problem: {}", self),
            ErrorCategory::Output => format!("Could not write outputs: {}", self),
            ErrorCategory::System => format!("Unexpected failure: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_identifier_is_fatal_configuration() {
        let err = EtlError::MissingRegionIdentifier {
            candidates: vec!["ADM3_PCODE".to_string(), "ADM3_EN".to_string()],
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(!err.is_skippable_raster_error());
        assert!(err.to_string().contains("ADM3_PCODE, ADM3_EN"));
    }

    #[test]
    fn test_raster_error_is_skippable() {
        let err = EtlError::RasterError {
            path: PathBuf::from("yem_f_05_2020_x.tif"),
            message: "truncated".to_string(),
        };
        assert!(err.is_skippable_raster_error());
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.user_friendly_message().starts_with("Raster problem"));
    }
}
