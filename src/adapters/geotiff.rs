//! Zonal sums over single-band, north-up GeoTIFFs.

use crate::core::ZonalSum;
use crate::domain::model::{RegionSet, ZonalOptions};
use crate::utils::error::{EtlError, Result};
use geo::{BoundingRect, Contains, Coord, Intersects, MultiPolygon, Rect};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType;

#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffZonalSum;

impl ZonalSum for GeoTiffZonalSum {
    fn zonal_sums(
        &self,
        regions: &RegionSet,
        raster: &Path,
        options: &ZonalOptions,
    ) -> Result<Vec<Option<f64>>> {
        let grid = GeoGrid::open(raster)?;
        tracing::debug!(
            "Summing {} ({}x{} px) over {} regions",
            raster.display(),
            grid.width,
            grid.height,
            regions.len()
        );
        Ok(regions
            .iter()
            .map(|region| grid.region_sum(&region.geometry, options))
            .collect())
    }
}

/// Decoded raster plus its pixel-to-lon/lat affine.
struct GeoGrid {
    width: usize,
    height: usize,
    origin_x: f64,
    origin_y: f64,
    pixel_w: f64,
    pixel_h: f64,
    file_nodata: Option<f64>,
    data: DecodingResult,
}

/// Pixel rectangle `[col0, col1) x [row0, row1)`.
#[derive(Debug, Clone, Copy)]
struct Window {
    col0: usize,
    col1: usize,
    row0: usize,
    row1: usize,
}

impl Window {
    fn is_empty(&self) -> bool {
        self.col0 >= self.col1 || self.row0 >= self.row1
    }
}

impl GeoGrid {
    fn open(path: &Path) -> Result<Self> {
        let fail = |message: String| EtlError::RasterError {
            path: path.to_path_buf(),
            message,
        };

        let file = File::open(path).map_err(|e| fail(e.to_string()))?;
        let mut decoder =
            Decoder::new(BufReader::new(file)).map_err(|e| fail(format!("not a TIFF: {}", e)))?;

        match decoder.colortype().map_err(|e| fail(e.to_string()))? {
            ColorType::Gray(_) => {}
            other => return Err(fail(format!("expected one band, found {:?}", other))),
        }

        let (width, height) = decoder.dimensions().map_err(|e| fail(e.to_string()))?;
        let scale = decoder
            .get_tag_f64_vec(Tag::ModelPixelScaleTag)
            .map_err(|e| fail(format!("missing ModelPixelScale: {}", e)))?;
        let tiepoint = decoder
            .get_tag_f64_vec(Tag::ModelTiepointTag)
            .map_err(|e| fail(format!("missing ModelTiepoint: {}", e)))?;
        if scale.len() < 2 || tiepoint.len() < 6 || scale[0] <= 0.0 || scale[1] <= 0.0 {
            return Err(fail("unsupported georeferencing".to_string()));
        }

        let file_nodata = decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok());

        let data = decoder
            .read_image()
            .map_err(|e| fail(format!("decode failed: {}", e)))?;

        let (pixel_w, pixel_h) = (scale[0], scale[1]);
        Ok(Self {
            width: width as usize,
            height: height as usize,
            origin_x: tiepoint[3] - tiepoint[0] * pixel_w,
            origin_y: tiepoint[4] + tiepoint[1] * pixel_h,
            pixel_w,
            pixel_h,
            file_nodata,
            data,
        })
    }

    #[allow(unreachable_patterns)]
    fn value(&self, col: usize, row: usize) -> f64 {
        let i = row * self.width + col;
        match &self.data {
            DecodingResult::U8(v) => v.get(i).map_or(f64::NAN, |x| f64::from(*x)),
            DecodingResult::U16(v) => v.get(i).map_or(f64::NAN, |x| f64::from(*x)),
            DecodingResult::U32(v) => v.get(i).map_or(f64::NAN, |x| f64::from(*x)),
            DecodingResult::U64(v) => v.get(i).map_or(f64::NAN, |x| *x as f64),
            DecodingResult::I8(v) => v.get(i).map_or(f64::NAN, |x| f64::from(*x)),
            DecodingResult::I16(v) => v.get(i).map_or(f64::NAN, |x| f64::from(*x)),
            DecodingResult::I32(v) => v.get(i).map_or(f64::NAN, |x| f64::from(*x)),
            DecodingResult::I64(v) => v.get(i).map_or(f64::NAN, |x| *x as f64),
            DecodingResult::F32(v) => v.get(i).map_or(f64::NAN, |x| f64::from(*x)),
            DecodingResult::F64(v) => v.get(i).copied().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    fn is_valid(&self, value: f64, options: &ZonalOptions) -> bool {
        value.is_finite() && value != options.nodata && Some(value) != self.file_nodata
    }

    fn col_at(&self, x: f64) -> f64 {
        (x - self.origin_x) / self.pixel_w
    }

    fn row_at(&self, y: f64) -> f64 {
        (self.origin_y - y) / self.pixel_h
    }

    fn cell_rect(&self, col: usize, row: usize) -> Rect<f64> {
        let min_x = self.origin_x + col as f64 * self.pixel_w;
        let max_y = self.origin_y - row as f64 * self.pixel_h;
        Rect::new(
            Coord {
                x: min_x,
                y: max_y - self.pixel_h,
            },
            Coord {
                x: min_x + self.pixel_w,
                y: max_y,
            },
        )
    }

    fn cell_centre(&self, col: usize, row: usize) -> Coord<f64> {
        Coord {
            x: self.origin_x + (col as f64 + 0.5) * self.pixel_w,
            y: self.origin_y - (row as f64 + 0.5) * self.pixel_h,
        }
    }

    fn clamp_col(&self, c: f64) -> usize {
        c.max(0.0).min(self.width as f64) as usize
    }

    fn clamp_row(&self, r: f64) -> usize {
        r.max(0.0).min(self.height as f64) as usize
    }

    fn window(&self, bbox: &Rect<f64>) -> Window {
        Window {
            col0: self.clamp_col(self.col_at(bbox.min().x).floor()),
            col1: self.clamp_col(self.col_at(bbox.max().x).ceil() + 1.0),
            row0: self.clamp_row(self.row_at(bbox.max().y).floor()),
            row1: self.clamp_row(self.row_at(bbox.min().y).ceil() + 1.0),
        }
    }

    /// Strict mode takes pixels whose centre lies inside a part (holes
    /// excluded); `all_touched` takes every cell that meets a part.
    fn selects(&self, shape: &MultiPolygon<f64>, col: usize, row: usize, all_touched: bool) -> bool {
        if all_touched {
            let cell = self.cell_rect(col, row);
            shape.0.iter().any(|part| part.intersects(&cell))
        } else {
            let centre = self.cell_centre(col, row);
            shape.0.iter().any(|part| part.contains(&centre))
        }
    }

    /// Sum of valid pixels selected by the region; `None` when no valid
    /// pixel is selected.
    fn region_sum(&self, shape: &MultiPolygon<f64>, options: &ZonalOptions) -> Option<f64> {
        let window = self.window(&shape.bounding_rect()?);
        if window.is_empty() {
            return None;
        }

        let mut sum = 0.0;
        let mut valid = 0usize;
        for row in window.row0..window.row1 {
            for col in window.col0..window.col1 {
                if !self.selects(shape, col, row, options.all_touched) {
                    continue;
                }
                let value = self.value(col, row);
                if self.is_valid(value, options) {
                    sum += value;
                    valid += 1;
                }
            }
        }

        (valid > 0).then_some(sum)
    }
}
