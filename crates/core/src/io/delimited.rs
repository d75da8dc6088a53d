//! Comma-separated raster output
//!
//! One line per raster row, no header. No-data cells are written as a fixed
//! literal (by default the raster's own no-data value) so that downstream
//! tools see the same sentinel as the source DEM.

use crate::error::Result;
use crate::raster::{Raster, RasterElement};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Options for delimited output
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter (default `,`)
    pub delimiter: u8,
    /// Text written for no-data cells. `None` uses the raster's no-data value.
    pub nodata_literal: Option<String>,
    /// Decimal places for floating point cells. `None` uses shortest round-trip formatting.
    pub precision: Option<usize>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            nodata_literal: None,
            precision: None,
        }
    }
}

impl CsvOptions {
    /// Emit no-data cells as the given integer sentinel
    pub fn with_nodata(nodata: i64) -> Self {
        Self {
            nodata_literal: Some(nodata.to_string()),
            ..Default::default()
        }
    }
}

/// Write a raster as delimited text
pub fn write_csv<T, P>(raster: &Raster<T>, path: P, options: &CsvOptions) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_csv(raster, file, options)
}

/// Write a raster as delimited text into memory
pub fn write_csv_to_buffer<T>(raster: &Raster<T>, options: &CsvOptions) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_csv(raster, &mut buf, options)?;
    Ok(buf)
}

fn encode_csv<T, W>(raster: &Raster<T>, writer: W, options: &CsvOptions) -> Result<()>
where
    T: RasterElement,
    W: Write,
{
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(false)
        .from_writer(writer);

    let nodata_text = match (&options.nodata_literal, raster.nodata()) {
        (Some(lit), _) => lit.clone(),
        (None, Some(nd)) => nd.to_string(),
        (None, None) => T::default_nodata().to_string(),
    };

    let mut record: Vec<String> = Vec::with_capacity(raster.cols());
    for row in raster.data().rows() {
        record.clear();
        for &v in row.iter() {
            let field = if raster.is_nodata(v) {
                nodata_text.clone()
            } else {
                match options.precision {
                    Some(p) if T::is_float() => format!("{:.*}", p, v.to_f64().unwrap_or(f64::NAN)),
                    _ => v.to_string(),
                }
            };
            record.push(field);
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_rows_and_nodata_literal() {
        let mut r: Raster<i64> = Raster::from_vec(vec![1, 2, -9999, 4], 2, 2).unwrap();
        r.set_nodata(Some(-9999));

        let text = String::from_utf8(write_csv_to_buffer(&r, &CsvOptions::default()).unwrap()).unwrap();
        assert_eq!(text, "1,2\n-9999,4\n");
    }

    #[test]
    fn test_float_nan_uses_dem_sentinel() {
        let mut r: Raster<f64> = Raster::from_vec(vec![1.5, f64::NAN, 2.25, 3.0], 1, 4).unwrap();
        r.set_nodata(Some(f64::NAN));

        let opts = CsvOptions {
            precision: Some(2),
            ..CsvOptions::with_nodata(-9999)
        };
        let text = String::from_utf8(write_csv_to_buffer(&r, &opts).unwrap()).unwrap();
        assert_eq!(text, "1.50,-9999,2.25,3.00\n");
    }

    #[test]
    fn test_custom_delimiter() {
        let r: Raster<i32> = Raster::from_vec(vec![7, 8, 9], 1, 3).unwrap();
        let opts = CsvOptions {
            delimiter: b';',
            ..Default::default()
        };
        let text = String::from_utf8(write_csv_to_buffer(&r, &opts).unwrap()).unwrap();
        assert_eq!(text, "7;8;9\n");
    }

    #[test]
    fn test_write_to_file() {
        let r: Raster<u8> = Raster::filled(2, 3, 1);
        let tmp = tempfile::NamedTempFile::new().unwrap();
        write_csv(&r, tmp.path(), &CsvOptions::default()).unwrap();
        let text = std::fs::read_to_string(tmp.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert_eq!(text.lines().next(), Some("1,1,1"));
    }
}
