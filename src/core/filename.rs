//! Raster file-name grammar.
//!
//! Names look like `yem_f_05_2025_CN_1km_R2025A_UA_v1.tif`: a country
//! prefix, the sex letter, a two-digit age marker, a `20xx` year, then any
//! suffix before the extension.

use crate::core::buckets::MAX_AGE;
use crate::domain::model::{AgeBand, RasterDescriptor, Sex};
use crate::utils::error::{EtlError, Result};
use regex::{Regex, RegexBuilder};
use std::path::Path;

/// Age markers at or above this value denote the open-ended top band.
pub const OPEN_BAND_MARKER: u8 = 80;

#[derive(Debug, Clone)]
pub struct RasterNameParser {
    pattern: Regex,
}

impl RasterNameParser {
    pub fn new(country_code: Option<&str>, extension: &str) -> Result<Self> {
        let prefix = match country_code {
            Some(code) => regex::escape(code),
            None => "[a-z]{3}".to_string(),
        };
        let extension = regex::escape(extension.trim_start_matches('.'));
        let source = format!(
            r"^{prefix}_(?P<sex>[fm])_(?P<age>\d{{2}})_(?P<year>20\d{{2}})_.*\.{extension}$"
        );

        let pattern = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|e| EtlError::ConfigValidationError {
                field: "source.country_code".to_string(),
                message: format!("cannot build file-name pattern: {}", e),
            })?;

        Ok(Self { pattern })
    }

    /// Returns `None` for names outside the grammar; callers skip those.
    pub fn parse(&self, path: &Path) -> Option<RasterDescriptor> {
        let name = path.file_name()?.to_str()?;
        let caps = self.pattern.captures(name)?;

        let sex = Sex::from_letter(&caps["sex"])?;
        let marker: u8 = caps["age"].parse().ok()?;
        let year: i32 = caps["year"].parse().ok()?;

        Some(RasterDescriptor {
            path: path.to_path_buf(),
            year,
            band: band_for_marker(marker),
            sex,
        })
    }
}

/// Markers 00 and 01 both mean the 0-4 band; markers from 80 up mean 80+.
pub fn band_for_marker(marker: u8) -> AgeBand {
    match marker {
        0 | 1 => AgeBand::new(0, 4),
        m if m >= OPEN_BAND_MARKER => AgeBand::new(OPEN_BAND_MARKER, MAX_AGE),
        m => AgeBand::new(m, m + 4),
    }
}
