//! ESRI ASCII grid reading/writing
//!
//! ```text
//! ncols         4
//! nrows         3
//! xllcorner     500000.0
//! yllcorner     4000000.0
//! cellsize      90
//! NODATA_value  -9999
//! 12 13 14 15
//! ...
//! ```
//! Header keys are case-insensitive and may come in any order. Cell values
//! are read as integers.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Upper bound on the cell buffer reserved before the body is read
const MAX_PREALLOCATED_CELLS: usize = 1 << 20;

#[derive(Debug, Default)]
struct Header {
    ncols: Option<usize>,
    nrows: Option<usize>,
    xll: f64,
    yll: f64,
    /// `xllcenter` was given instead of `xllcorner`
    x_centered: bool,
    /// `yllcenter` was given instead of `yllcorner`
    y_centered: bool,
    cell_size: Option<f64>,
    nodata: Option<i32>,
}

/// Read an ESRI ASCII grid file into an integer raster
pub fn read_ascii_grid<P: AsRef<Path>>(path: P) -> Result<Raster<i32>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    debug!("Read {} bytes from {}", text.len(), path.as_ref().display());
    read_ascii_grid_from_str(&text)
}

/// Parse an ESRI ASCII grid from an in-memory string
pub fn read_ascii_grid_from_str(text: &str) -> Result<Raster<i32>> {
    let mut header = Header::default();
    let mut lines = text.lines().enumerate().peekable();

    // Header lines start with a keyword; the body starts at the first numeric token.
    while let Some(&(idx, line)) = lines.peek() {
        let mut tokens = line.split_whitespace();
        let Some(key) = tokens.next() else {
            lines.next();
            continue;
        };
        if !key.starts_with(|c: char| c.is_ascii_alphabetic()) {
            break;
        }
        let value = tokens.next().ok_or_else(|| Error::Parse {
            line: idx + 1,
            message: format!("missing value for header key '{}'", key),
        })?;
        parse_header_entry(&mut header, key, value, idx + 1)?;
        lines.next();
    }

    let cols = header.ncols.ok_or_else(|| missing_key("ncols"))?;
    let rows = header.nrows.ok_or_else(|| missing_key("nrows"))?;
    let cell_size = header.cell_size.ok_or_else(|| missing_key("cellsize"))?;
    if rows == 0 || cols == 0 {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }
    let cells = rows.checked_mul(cols).ok_or(Error::InvalidDimensions {
        width: cols,
        height: rows,
    })?;
    let nodata = header.nodata.unwrap_or_else(i32::default_nodata);

    // Header sizes are untrusted; the buffer grows as values are read.
    let mut data = Vec::with_capacity(cells.min(MAX_PREALLOCATED_CELLS));
    let mut last_line = 0;
    'body: for (idx, line) in lines {
        last_line = idx + 1;
        for token in line.split_whitespace() {
            if data.len() == cells {
                warn!("Ignoring trailing values after line {}", idx + 1);
                break 'body;
            }
            data.push(parse_cell(token, nodata, idx + 1));
        }
    }

    if data.len() < cells {
        return Err(Error::Parse {
            line: last_line,
            message: format!("expected {} cell values, found {}", cells, data.len()),
        });
    }

    let half = cell_size / 2.0;
    let xll = if header.x_centered { header.xll - half } else { header.xll };
    let yll = if header.y_centered { header.yll - half } else { header.yll };

    let mut raster = Raster::from_vec(data, rows, cols)?;
    raster.set_transform(GeoTransform::from_lower_left(xll, yll, cell_size, rows));
    raster.set_nodata(Some(nodata));
    debug!("Parsed {} x {} grid, cellsize={}, nodata={}", cols, rows, cell_size, nodata);
    Ok(raster)
}

fn parse_header_entry(header: &mut Header, key: &str, value: &str, line: usize) -> Result<()> {
    let bad = |what: &str| Error::Parse {
        line,
        message: format!("invalid {} value '{}'", what, value),
    };
    match key.to_ascii_lowercase().as_str() {
        "ncols" => header.ncols = Some(value.parse().map_err(|_| bad("ncols"))?),
        "nrows" => header.nrows = Some(value.parse().map_err(|_| bad("nrows"))?),
        "xllcorner" | "xllcenter" => {
            header.xll = value.parse().map_err(|_| bad("xll"))?;
            header.x_centered = key.eq_ignore_ascii_case("xllcenter");
        }
        "yllcorner" | "yllcenter" => {
            header.yll = value.parse().map_err(|_| bad("yll"))?;
            header.y_centered = key.eq_ignore_ascii_case("yllcenter");
        }
        "cellsize" => {
            let cs: f64 = value.parse().map_err(|_| bad("cellsize"))?;
            if !(cs > 0.0) {
                return Err(bad("cellsize"));
            }
            header.cell_size = Some(cs);
        }
        "nodata_value" => {
            let nd: f64 = value.parse().map_err(|_| bad("NODATA_value"))?;
            header.nodata = Some(nd as i32);
        }
        other => warn!("Ignoring unknown header key '{}' on line {}", other, line),
    }
    Ok(())
}

fn parse_cell(token: &str, nodata: i32, line: usize) -> i32 {
    if let Ok(v) = token.parse::<i32>() {
        return v;
    }
    match token.parse::<f64>() {
        // Decimal elevations are truncated to the integer model.
        Ok(v) if v.is_finite() => v as i32,
        _ => {
            warn!("Non-numeric value '{}' on line {}, using NODATA", token, line);
            nodata
        }
    }
}

fn missing_key(key: &str) -> Error {
    Error::Parse {
        line: 0,
        message: format!("missing header key '{}'", key),
    }
}

/// Write an integer raster as an ESRI ASCII grid
pub fn write_ascii_grid<P: AsRef<Path>>(raster: &Raster<i32>, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    encode_ascii_grid(raster, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Write an integer raster as an ESRI ASCII grid into memory
pub fn write_ascii_grid_to_buffer(raster: &Raster<i32>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_ascii_grid(raster, &mut buf)?;
    Ok(buf)
}

fn encode_ascii_grid<W: Write>(raster: &Raster<i32>, writer: &mut W) -> Result<()> {
    let (rows, cols) = raster.shape();
    let (xll, yll) = raster.transform().lower_left(rows);
    let nodata = raster.nodata().unwrap_or_else(i32::default_nodata);

    writeln!(writer, "ncols {}", cols)?;
    writeln!(writer, "nrows {}", rows)?;
    writeln!(writer, "xllcorner {}", xll)?;
    writeln!(writer, "yllcorner {}", yll)?;
    writeln!(writer, "cellsize {}", raster.cell_size())?;
    writeln!(writer, "NODATA_value {}", nodata)?;

    for row in raster.data().rows() {
        let mut first = true;
        for &v in row.iter() {
            if !first {
                writer.write_all(b" ")?;
            }
            first = false;
            let v = if raster.is_nodata(v) { nodata } else { v };
            write!(writer, "{}", v)?;
        }
        writer.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "ncols 4
nrows 3
xllcorner 100.0
yllcorner 200.0
cellsize 90
NODATA_value -9999
10 11 12 13
14 -9999 16 17
18 19 20.7 abc
";

    #[test]
    fn test_read_sample() {
        let dem = read_ascii_grid_from_str(SAMPLE).unwrap();
        assert_eq!(dem.shape(), (3, 4));
        assert_eq!(dem.nodata(), Some(-9999));
        assert_eq!(dem.get(0, 0).unwrap(), 10);
        assert!(!dem.is_valid(1, 1));
        assert_eq!(dem.get(2, 2).unwrap(), 20);
        assert_eq!(dem.get(2, 3).unwrap(), -9999);
        assert!((dem.cell_size() - 90.0).abs() < 1e-12);
        assert_eq!(dem.transform().lower_left(3), (100.0, 200.0));
    }

    #[test]
    fn test_missing_nodata_defaults() {
        let text = "NCOLS 2\nNROWS 1\nXLLCORNER 0\nYLLCORNER 0\nCELLSIZE 1\n1 2\n";
        let dem = read_ascii_grid_from_str(text).unwrap();
        assert_eq!(dem.nodata(), Some(-9999));
    }

    #[test]
    fn test_values_may_wrap_lines() {
        let text = "ncols 3\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2 3 4\n5 6\n";
        let dem = read_ascii_grid_from_str(text).unwrap();
        assert_eq!(dem.get(1, 0).unwrap(), 4);
        assert_eq!(dem.get(1, 2).unwrap(), 6);
    }

    #[test]
    fn test_truncated_body_is_rejected() {
        let text = "ncols 3\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2 3\n4\n";
        assert!(matches!(read_ascii_grid_from_str(text), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_missing_header_is_rejected() {
        let text = "ncols 3\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2 3\n";
        match read_ascii_grid_from_str(text) {
            Err(Error::Parse { message, .. }) => assert!(message.contains("nrows")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_header_is_rejected() {
        let text = "ncols 4294967296\nnrows 4294967297\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2\n";
        assert!(matches!(
            read_ascii_grid_from_str(text),
            Err(Error::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_large_header_with_short_body_fails_cleanly() {
        let text = "ncols 100000\nnrows 100000\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2 3\n";
        match read_ascii_grid_from_str(text) {
            Err(Error::Parse { message, .. }) => assert!(message.contains("found 3")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_center_keys_shift_each_axis_independently() {
        let y_center = "ncols 1\nnrows 1\nxllcorner 0\nyllcenter 100\ncellsize 10\n5\n";
        let dem = read_ascii_grid_from_str(y_center).unwrap();
        assert_eq!(dem.transform().lower_left(1), (0.0, 95.0));

        let x_center = "ncols 1\nnrows 1\nxllcenter 0\nyllcorner 100\ncellsize 10\n5\n";
        let dem = read_ascii_grid_from_str(x_center).unwrap();
        assert_eq!(dem.transform().lower_left(1), (-5.0, 100.0));

        let both = "ncols 1\nnrows 1\nyllcenter 100\nxllcenter 0\ncellsize 10\n5\n";
        let dem = read_ascii_grid_from_str(both).unwrap();
        assert_eq!(dem.transform().lower_left(1), (-5.0, 95.0));
    }

    #[test]
    fn test_write_then_read() {
        let dem = read_ascii_grid_from_str(SAMPLE).unwrap();
        let buf = write_ascii_grid_to_buffer(&dem).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("NODATA_value -9999"));

        let again = read_ascii_grid_from_str(&text).unwrap();
        assert_eq!(again.data(), dem.data());
        assert_eq!(again.transform().lower_left(3), (100.0, 200.0));
    }

    #[test]
    fn test_write_to_file() {
        let dem = read_ascii_grid_from_str(SAMPLE).unwrap();
        let tmp = tempfile::NamedTempFile::new().unwrap();
        write_ascii_grid(&dem, tmp.path()).unwrap();
        let again = read_ascii_grid(tmp.path()).unwrap();
        assert_eq!(again.data(), dem.data());
    }
}
