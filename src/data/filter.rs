use ndarray::{Array1, Array2, Axis};

use super::model::SpatialIndexSet;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Row predicate: a sample is usable when nothing in it is missing
// ---------------------------------------------------------------------------

/// Return indices of rows whose features (and label, if given) are all
/// present.
pub fn valid_rows(vectors: &Array2<f64>, labels: Option<&Array1<f64>>) -> Vec<usize> {
    vectors
        .rows()
        .into_iter()
        .enumerate()
        .filter(|(i, row)| {
            let label_ok = labels.map_or(true, |l| !l[*i].is_nan());
            label_ok && row.iter().all(|v| !v.is_nan())
        })
        .map(|(i, _)| i)
        .collect()
}

fn check_rows(vectors: &Array2<f64>, other: usize, what: &str) -> Result<()> {
    if vectors.nrows() != other {
        return Err(Error::Value(format!(
            "{} vectors but {other} {what}",
            vectors.nrows()
        )));
    }
    Ok(())
}

/// Drop every training sample with a missing feature or label.
///
/// Surviving rows keep their relative order and their vector/label pairing.
pub fn clean(vectors: &Array2<f64>, labels: &Array1<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
    check_rows(vectors, labels.len(), "labels")?;
    let keep = valid_rows(vectors, Some(labels));
    log::debug!("Cleaning kept {} of {} samples", keep.len(), vectors.nrows());
    Ok((vectors.select(Axis(0), &keep), labels.select(Axis(0), &keep)))
}

/// Drop every test vector with a missing feature, keeping the grid indices
/// aligned with the surviving vectors.
pub fn clean_test(
    vectors: &Array2<f64>,
    indices: &SpatialIndexSet,
) -> Result<(Array2<f64>, SpatialIndexSet)> {
    check_rows(vectors, indices.len(), "indices")?;
    let keep = valid_rows(vectors, None);
    Ok((vectors.select(Axis(0), &keep), indices.select(&keep)))
}
