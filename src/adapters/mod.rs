// Adapters: concrete boundary and raster sources behind the core ports.

pub mod boundaries;
pub mod geotiff;
