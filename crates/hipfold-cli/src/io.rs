use crate::error::{CliError, Result};
use hipfold::core::models::points::PointSet;
use nalgebra::DMatrix;
use std::path::Path;
use tracing::{debug, info, warn};

/// Asymmetry tolerated before the matrix is reported as symmetrised.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

fn parse_error(path: &Path, e: impl Into<anyhow::Error>) -> CliError {
    CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    }
}

fn invalid(path: &Path, reason: impl Into<String>) -> CliError {
    CliError::Input {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Reads a square restraint matrix from a header-less CSV file; `#` starts a
/// comment line. Plain distances are squared on load. An asymmetric matrix is
/// replaced by the mean of itself and its transpose.
pub fn read_matrix(path: &Path, plain_distances: bool) -> Result<DMatrix<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| parse_error(path, e))?;

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| parse_error(path, e))?;
        let row = record
            .iter()
            .filter(|field| !field.is_empty())
            .map(|field| {
                field.parse::<f64>().map_err(|e| {
                    invalid(path, format!("row {}: cannot read '{}' as a number ({})", line + 1, field, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if !row.is_empty() {
            rows.push(row);
        }
    }

    let n = rows.len();
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != n) {
        return Err(invalid(
            path,
            format!("row {} has {} entries but the matrix has {} rows", i + 1, row.len(), n),
        ));
    }
    if let Some(v) = rows.iter().flatten().find(|v| !v.is_finite() || **v < 0.0) {
        return Err(invalid(path, format!("entry {} is not a non-negative distance", v)));
    }

    let mut matrix = DMatrix::from_fn(n, n, |i, j| rows[i][j]);
    if plain_distances {
        matrix.apply(|v| *v = *v * *v);
    }
    let asymmetry = (&matrix - matrix.transpose()).amax();
    if asymmetry > SYMMETRY_TOLERANCE {
        warn!(asymmetry, "Restraint matrix is not symmetric; using its symmetric part.");
        matrix = (&matrix + matrix.transpose()) * 0.5;
    }
    matrix.fill_diagonal(0.0);

    info!(positions = n, plain_distances, "Loaded restraint matrix from {:?}", path);
    Ok(matrix)
}

fn axis_name(axis: usize) -> String {
    match axis {
        0 => "x".to_string(),
        1 => "y".to_string(),
        2 => "z".to_string(),
        _ => format!("d{}", axis + 1),
    }
}

/// Writes one row per position: `index,active,x,y,z[,d4,...]`.
pub fn write_coords(path: &Path, coords: &PointSet, precision: usize) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| parse_error(path, e))?;

    let mut header = vec!["index".to_string(), "active".to_string()];
    header.extend((0..coords.dim()).map(axis_name));
    writer.write_record(&header).map_err(|e| parse_error(path, e))?;

    for (i, p) in coords.points().iter().enumerate() {
        let mut record = vec![i.to_string(), u8::from(coords.is_active(i)).to_string()];
        record.extend(p.iter().map(|v| format!("{:.*}", precision, v)));
        writer.write_record(&record).map_err(|e| parse_error(path, e))?;
    }
    writer.flush()?;
    debug!(positions = coords.len(), dim = coords.dim(), "Wrote coordinates to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;
    use std::fs;

    fn write_temp(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn squared_matrix_is_read_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "d.csv", "# three points\n0, 1, 4\n1, 0, 1\n4, 1, 0\n");
        let m = read_matrix(&path, false).unwrap();
        assert_eq!(m, DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 4.0, 1.0, 0.0, 1.0, 4.0, 1.0, 0.0]));
    }

    #[test]
    fn plain_distances_are_squared() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "d.csv", "0,1,2\n1,0,1\n2,1,0\n");
        let m = read_matrix(&path, true).unwrap();
        assert_eq!(m[(0, 2)], 4.0);
        assert_eq!(m[(1, 2)], 1.0);
    }

    #[test]
    fn asymmetric_input_is_symmetrised() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "d.csv", "0,2\n4,0\n");
        let m = read_matrix(&path, false).unwrap();
        assert_eq!(m[(0, 1)], 3.0);
        assert_eq!(m[(1, 0)], 3.0);
    }

    #[test]
    fn ragged_matrix_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "d.csv", "0,1,4\n1,0\n4,1,0\n");
        let result = read_matrix(&path, false);
        assert!(matches!(result, Err(CliError::Input { reason, .. }) if reason.contains("row 2")));
    }

    #[test]
    fn non_numeric_and_negative_entries_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let text = write_temp(&dir, "a.csv", "0,x\n1,0\n");
        assert!(matches!(read_matrix(&text, false), Err(CliError::Input { .. })));
        let negative = write_temp(&dir, "b.csv", "0,-1\n-1,0\n");
        assert!(matches!(read_matrix(&negative, false), Err(CliError::Input { .. })));
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_matrix(&dir.path().join("absent.csv"), false);
        assert!(matches!(result, Err(CliError::FileParsing { .. })));
    }

    #[test]
    fn coordinates_are_written_with_header_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut coords = PointSet::from_points(vec![
            DVector::from_column_slice(&[0.0, 1.0, 2.0, 3.0]),
            DVector::from_column_slice(&[1.5, -1.0, 0.25, 0.0]),
        ])
        .unwrap();
        coords.set_active(1, false);
        write_coords(&path, &coords, 2).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "index,active,x,y,z,d4");
        assert_eq!(lines[1], "0,1,0.00,1.00,2.00,3.00");
        assert_eq!(lines[2], "1,0,1.50,-1.00,0.25,0.00");
    }
}
