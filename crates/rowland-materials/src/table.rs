//! Tabulated response curves.
//!
//! Reflectivity and transmission curves are read from plain-text files with
//! one `k value` pair per row:
//!
//! ```text
//! # PG(002) reflectivity
//! # k [1/AA]   R
//! 1.0   0.62
//! 1.5   0.78
//! ```
//!
//! Columns may be separated by whitespace or commas; `#` starts a comment.
//! Rows are sorted on load and non-uniform tables are rebinned onto a uniform
//! grid, so lookups are a constant-time index followed by linear
//! interpolation. Values outside the tabulated range take the value at the
//! nearest end.

use std::path::Path;

use thiserror::Error;

use crate::provider::ResponseCurve;

/// Relative spacing tolerance under which a table counts as uniform.
const UNIFORM_TOLERANCE: f64 = 1e-6;

/// Upper bound on the number of rebinned points.
const MAX_REBIN_POINTS: usize = 100_000;

/// Errors while loading a lookup table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Failed to read table: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    FormatError { line: usize, message: String },

    #[error("Table has duplicate abscissa {0}")]
    DuplicateAbscissa(f64),
}

/// A monotonic, uniformly binned lookup table.
#[derive(Debug, Clone)]
pub struct LookupTable {
    name: String,
    /// First abscissa.
    x0: f64,
    /// Uniform bin width; zero for a single-row table.
    step: f64,
    ys: Vec<f64>,
}

impl LookupTable {
    /// Build a table from rows of `(x, y)`.
    ///
    /// Returns `Ok(None)` for an empty row set, which callers treat as "use
    /// the constant value".
    pub fn from_rows(
        name: impl Into<String>,
        mut rows: Vec<(f64, f64)>,
    ) -> Result<Option<Self>, TableError> {
        if rows.is_empty() {
            return Ok(None);
        }
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));
        for pair in rows.windows(2) {
            if pair[1].0 == pair[0].0 {
                return Err(TableError::DuplicateAbscissa(pair[0].0));
            }
        }

        let name = name.into();
        let x0 = rows[0].0;
        if rows.len() == 1 {
            return Ok(Some(Self {
                name,
                x0,
                step: 0.0,
                ys: vec![rows[0].1],
            }));
        }

        let min_step = rows
            .windows(2)
            .map(|p| p[1].0 - p[0].0)
            .fold(f64::INFINITY, f64::min);
        let span = rows[rows.len() - 1].0 - x0;
        let uniform = rows
            .windows(2)
            .all(|p| ((p[1].0 - p[0].0) - min_step).abs() <= UNIFORM_TOLERANCE * min_step);

        if uniform {
            let step = span / (rows.len() - 1) as f64;
            let ys = rows.iter().map(|r| r.1).collect();
            return Ok(Some(Self { name, x0, step, ys }));
        }

        let wanted = (span / min_step).round() as usize + 1;
        let n = wanted.min(MAX_REBIN_POINTS);
        if n < wanted {
            log::warn!(
                "Table '{}' needs {} bins to resolve its finest spacing, capped at {}",
                name,
                wanted,
                n
            );
        }
        let step = span / (n - 1) as f64;
        log::debug!(
            "Rebinning table '{}' from {} rows to {} uniform bins",
            name,
            rows.len(),
            n
        );
        let ys = (0..n)
            .map(|i| interpolate_rows(&rows, x0 + step * i as f64))
            .collect();
        Ok(Some(Self { name, x0, step, ys }))
    }

    /// Parse a table from text.
    pub fn parse(name: impl Into<String>, content: &str) -> Result<Option<Self>, TableError> {
        let mut rows = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = match line.find('#') {
                Some(pos) => &line[..pos],
                None => line,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|s| !s.is_empty())
                .collect();
            if parts.len() < 2 {
                return Err(TableError::FormatError {
                    line: idx + 1,
                    message: format!("Expected 'k value', got '{}'", line),
                });
            }
            let x: f64 = parts[0].parse().map_err(|_| TableError::FormatError {
                line: idx + 1,
                message: format!("Invalid wavenumber: {}", parts[0]),
            })?;
            let y: f64 = parts[1].parse().map_err(|_| TableError::FormatError {
                line: idx + 1,
                message: format!("Invalid value: {}", parts[1]),
            })?;
            if !x.is_finite() || !y.is_finite() {
                return Err(TableError::FormatError {
                    line: idx + 1,
                    message: format!("Non-finite entry '{}'", line),
                });
            }
            rows.push((x, y));
        }
        Self::from_rows(name, rows)
    }

    /// Load a table from a file.
    ///
    /// The identifiers `""`, `"NULL"` and `"0"` mean "no table" and return
    /// `Ok(None)`, as does a file without data rows.
    pub fn load(path: &Path) -> Result<Option<Self>, TableError> {
        let id = path.to_string_lossy();
        if is_disabled(&id) {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let table = Self::parse(id.into_owned(), &content)?;
        match &table {
            Some(t) => log::info!("Loaded table '{}' ({} bins)", t.name, t.bins()),
            None => log::warn!("Table '{}' is empty, using the constant value", path.display()),
        }
        Ok(table)
    }

    /// Number of uniform bins.
    pub fn bins(&self) -> usize {
        self.ys.len()
    }

    /// Tabulated range `(first, last)` of the abscissa.
    pub fn range(&self) -> (f64, f64) {
        (self.x0, self.x0 + self.step * (self.ys.len() - 1) as f64)
    }

    /// Linear interpolation with constant extrapolation.
    pub fn evaluate(&self, x: f64) -> f64 {
        let last = self.ys.len() - 1;
        if last == 0 || x <= self.x0 {
            return self.ys[0];
        }
        let pos = (x - self.x0) / self.step;
        if pos >= last as f64 {
            return self.ys[last];
        }
        let i = pos.floor() as usize;
        let frac = pos - i as f64;
        self.ys[i] + frac * (self.ys[i + 1] - self.ys[i])
    }
}

impl ResponseCurve for LookupTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn value_at(&self, k: f64) -> f64 {
        self.evaluate(k)
    }
}

/// Whether a table identifier explicitly disables the table.
pub fn is_disabled(id: &str) -> bool {
    let id = id.trim();
    id.is_empty() || id == "NULL" || id == "0"
}

/// Linear interpolation on sorted rows, binary search for the interval.
fn interpolate_rows(rows: &[(f64, f64)], x: f64) -> f64 {
    let n = rows.len();
    if x <= rows[0].0 {
        return rows[0].1;
    }
    if x >= rows[n - 1].0 {
        return rows[n - 1].1;
    }
    let mut lo = 0;
    let mut hi = n - 1;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if rows[mid].0 > x {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    let (x0, y0) = rows[lo];
    let (x1, y1) = rows[hi];
    y0 + (x - x0) / (x1 - x0) * (y1 - y0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::Write;

    #[test]
    fn test_uniform_table_passes_through_rows() {
        let t = LookupTable::from_rows("t", vec![(1.0, 0.2), (2.0, 0.4), (3.0, 0.3)])
            .unwrap()
            .unwrap();
        assert_eq!(t.bins(), 3);
        assert_abs_diff_eq!(t.evaluate(1.0), 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(t.evaluate(2.0), 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(t.evaluate(3.0), 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(t.evaluate(1.5), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_extrapolation_is_constant() {
        let t = LookupTable::from_rows("t", vec![(1.0, 0.2), (2.0, 0.4)])
            .unwrap()
            .unwrap();
        assert_abs_diff_eq!(t.evaluate(-5.0), 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(t.evaluate(50.0), 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_non_uniform_rows_are_rebinned() {
        let rows = vec![(3.0, 3.0), (0.0, 0.0), (0.5, 0.5), (1.0, 1.0)];
        let t = LookupTable::from_rows("t", rows).unwrap().unwrap();
        assert_eq!(t.bins(), 7);
        assert_eq!(t.range(), (0.0, 3.0));
        // y = x is reproduced exactly by linear rebinning
        for x in [0.1, 0.75, 1.7, 2.9] {
            assert_abs_diff_eq!(t.evaluate(x), x, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_duplicate_abscissa_rejected() {
        let err = LookupTable::from_rows("t", vec![(1.0, 0.2), (1.0, 0.4)]).unwrap_err();
        assert!(matches!(err, TableError::DuplicateAbscissa(_)));
    }

    #[test]
    fn test_parse_comments_and_commas() {
        let text = "# header\n\n1.0, 0.5  # inline\n2.0\t0.7\n";
        let t = LookupTable::parse("t", text).unwrap().unwrap();
        assert_abs_diff_eq!(t.evaluate(1.5), 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_parse_errors_report_line() {
        let err = LookupTable::parse("t", "1.0 0.5\nabc 0.3\n").unwrap_err();
        match err {
            TableError::FormatError { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_entries_rejected() {
        for text in ["1.0 0.5\n2.0 nan\n", "1.0 0.5\ninf 0.3\n", "1.0 -inf\n"] {
            match LookupTable::parse("t", text).unwrap_err() {
                TableError::FormatError { message, .. } => assert!(message.contains("Non-finite")),
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn test_fine_table_is_capped() {
        let rows = vec![(0.0, 0.0), (1e-7, 0.0), (1.0, 1.0)];
        let t = LookupTable::from_rows("t", rows).unwrap().unwrap();
        assert_eq!(t.bins(), MAX_REBIN_POINTS);
        assert_abs_diff_eq!(t.range().1, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(t.evaluate(0.5), 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_empty_and_disabled_tables() {
        assert!(LookupTable::parse("t", "# nothing\n").unwrap().is_none());
        assert!(LookupTable::load(Path::new("NULL")).unwrap().is_none());
        assert!(LookupTable::load(Path::new("")).unwrap().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# k R").unwrap();
        writeln!(file, "1.0 0.1").unwrap();
        writeln!(file, "3.0 0.9").unwrap();
        let t = LookupTable::load(file.path()).unwrap().unwrap();
        assert_abs_diff_eq!(t.value_at(2.0), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = LookupTable::load(Path::new("/nonexistent/reflectivity.dat")).unwrap_err();
        assert!(matches!(err, TableError::IoError(_)));
    }
}
