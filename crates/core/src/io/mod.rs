//! Text I/O for elevation grids and derived rasters
//!
//! - ESRI ASCII grid (`.asc`) for integer DEMs
//! - Comma-separated output for direction and accumulation fields

mod ascii;
mod delimited;

pub use ascii::{read_ascii_grid, read_ascii_grid_from_str, write_ascii_grid, write_ascii_grid_to_buffer};
pub use delimited::{write_csv, write_csv_to_buffer, CsvOptions};
