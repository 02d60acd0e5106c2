use crate::utils::error::{EtlError, Result};
use std::collections::HashSet;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: impl ToString, reason: impl Into<String>) -> EtlError {
    EtlError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }
    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }
    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(field_name, value, "Value cannot be blank"));
    }
    Ok(())
}

pub fn validate_non_empty_list<T>(field_name: &str, values: &[T]) -> Result<()> {
    if values.is_empty() {
        return Err(EtlError::MissingConfigError {
            field: field_name.to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

/// Target years must be reachable by the `20xx` file-name grammar.
pub fn validate_years(field_name: &str, years: &[i32]) -> Result<()> {
    validate_non_empty_list(field_name, years)?;
    years
        .iter()
        .try_for_each(|&year| validate_range(field_name, year, 2000, 2099))
}

/// Non-blank and pairwise distinct, e.g. identifier candidates.
pub fn validate_unique_strings(field_name: &str, values: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for value in values {
        validate_non_empty_string(field_name, value)?;
        if !seen.insert(value.as_str()) {
            return Err(invalid(field_name, value, "Duplicate entry"));
        }
    }
    Ok(())
}

pub fn validate_log_level(field_name: &str, level: &str) -> Result<()> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => Ok(()),
        _ => Err(invalid(
            field_name,
            level,
            "Expected one of trace, debug, info, warn, error or off",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_years() {
        assert!(validate_years("aggregation.years", &[2015, 2020]).is_ok());
        assert!(validate_years("aggregation.years", &[]).is_err());
        assert!(validate_years("aggregation.years", &[1999]).is_err());
        assert!(validate_years("aggregation.years", &[2100]).is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("aggregation.concurrency", 4, 1).is_ok());
        assert!(validate_positive_number("aggregation.concurrency", 0, 1).is_err());
    }

    #[test]
    fn test_validate_unique_strings() {
        let fields = vec!["ADM3_PCODE".to_string(), "ADM3_EN".to_string()];
        assert!(validate_unique_strings("source.id_fields", &fields).is_ok());

        let dupes = vec!["ADM3_EN".to_string(), "ADM3_EN".to_string()];
        assert!(validate_unique_strings("source.id_fields", &dupes).is_err());

        let blank = vec!["  ".to_string()];
        assert!(validate_unique_strings("source.id_fields", &blank).is_err());
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("source.raster_dir", "data/worldpop").is_ok());
        assert!(validate_path("source.raster_dir", "").is_err());
        assert!(validate_path("source.raster_dir", "bad\0path").is_err());
    }

    #[test]
    fn test_validate_log_level() {
        assert!(validate_log_level("monitoring.log_level", "DEBUG").is_ok());
        assert!(validate_log_level("monitoring.log_level", "verbose").is_err());
    }
}
