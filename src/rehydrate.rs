use std::path::Path;

use ndarray::{ArrayD, ArrayView1, IxDyn};

use crate::data::loader::{read_grid, write_grid};
use crate::data::model::{GridDataset, SpatialIndexSet};
use crate::error::{Error, Result};

/// Place `labels` at `indices` on the spatial grid of `reference`.
///
/// The result has the reference's spatial dimensions, coordinates and
/// attributes and a single variable `variable`; cells without a label are
/// NaN.
pub fn rehydrate(
    labels: ArrayView1<'_, f64>,
    indices: &SpatialIndexSet,
    reference: &GridDataset,
    variable: &str,
) -> Result<GridDataset> {
    if labels.len() != indices.len() {
        return Err(Error::Value(format!(
            "{} labels for {} indices",
            labels.len(),
            indices.len()
        )));
    }
    let mut dataset = reference.spatial_template();
    let shape = dataset.shape();
    if !indices.is_empty() && indices.ndim() != shape.len() {
        return Err(Error::Value(format!(
            "indices have {} dimensions, reference grid has {}",
            indices.ndim(),
            shape.len()
        )));
    }

    let mut grid = ArrayD::from_elem(IxDyn(&shape), f64::NAN);
    for (i, &label) in labels.iter().enumerate() {
        let cell = indices.cell(i);
        let slot = grid.get_mut(cell.as_slice()).ok_or_else(|| {
            Error::Value(format!("index {cell:?} outside reference grid {shape:?}"))
        })?;
        *slot = label;
    }
    dataset.insert_variable(variable, grid)?;
    Ok(dataset)
}

/// [`rehydrate`] against a reference file, optionally writing the result.
pub fn rehydrate_file(
    labels: ArrayView1<'_, f64>,
    indices: &SpatialIndexSet,
    reference: &Path,
    variable: &str,
    out: Option<&Path>,
) -> Result<GridDataset> {
    let reference_ds = read_grid(reference)?;
    let dataset = rehydrate(labels, indices, &reference_ds, variable)?;
    if let Some(out) = out {
        write_grid(&dataset, out)?;
        log::info!("Wrote {} labels to {}", labels.len(), out.display());
    }
    Ok(dataset)
}
