//! Feature-vector and label extraction from gridded files.
//!
//! A feature vector holds, for every input channel, either the value of one
//! cell or the `(2r+1)²` values of the square window centered on it
//! (row-major, center in the middle).

use std::borrow::Cow;

use ndarray::{Array1, Array2, ArrayViewD};
use rand::Rng;

use crate::data::loader::read_grid;
use crate::data::model::{GridDataset, SpatialIndexSet, TrainingPair};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// ChannelSpec – vector layout
// ---------------------------------------------------------------------------

/// Ordered input channels and the neighborhood radius read around a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    channels: Vec<String>,
    radius: usize,
}

impl ChannelSpec {
    pub fn new(channels: Vec<String>, radius: usize) -> Result<Self> {
        if channels.is_empty() {
            return Err(Error::Configuration("at least one input channel is required".into()));
        }
        Ok(Self { channels, radius })
    }

    /// Values each channel contributes.
    pub fn window_len(&self) -> usize {
        let side = 2 * self.radius + 1;
        side * side
    }

    pub fn n_columns(&self) -> usize {
        self.channels.len() * self.window_len()
    }

    /// Channel whose valid cells are sampled when no indices are given.
    pub fn reference_channel(&self) -> &str {
        &self.channels[0]
    }

    fn offsets(&self) -> Vec<(isize, isize)> {
        let r = self.radius as isize;
        (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| (dy, dx)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Cell access
// ---------------------------------------------------------------------------

fn value_at(slice: &ArrayViewD<'_, f64>, cell: &[usize]) -> Result<f64> {
    if cell.len() != slice.ndim() {
        return Err(Error::DataAccess(format!(
            "cell {cell:?} has {} coordinates, grid has {} dimensions",
            cell.len(),
            slice.ndim()
        )));
    }
    slice.get(cell).copied().ok_or_else(|| {
        Error::DataAccess(format!(
            "cell {cell:?} outside grid of shape {:?}",
            slice.shape()
        ))
    })
}

/// Append the vector of `cell` (all channels) to `out`.
fn push_vector(
    slices: &[ArrayViewD<'_, f64>],
    cell: &[usize],
    spec: &ChannelSpec,
    offsets: &[(isize, isize)],
    out: &mut Vec<f64>,
) -> Result<()> {
    for slice in slices {
        let center = value_at(slice, cell)?;
        if spec.radius == 0 {
            out.push(center);
            continue;
        }
        if slice.ndim() != 2 {
            return Err(Error::Configuration(format!(
                "neighborhoods need a 2-D grid, got {} dimensions",
                slice.ndim()
            )));
        }
        let (ny, nx) = (slice.shape()[0] as isize, slice.shape()[1] as isize);
        for &(dy, dx) in offsets {
            let (y, x) = (cell[0] as isize + dy, cell[1] as isize + dx);
            // cells whose window leaves the grid get NaN and are cleaned away
            let v = if (0..ny).contains(&y) && (0..nx).contains(&x) {
                slice[[y as usize, x as usize].as_slice()]
            } else {
                f64::NAN
            };
            out.push(v);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Extraction at fixed indices
// ---------------------------------------------------------------------------

/// Indices of every cell where `channel` holds data at `hour`.
pub fn valid_cells(dataset: &GridDataset, channel: &str, hour: usize) -> Result<SpatialIndexSet> {
    let slice = dataset.at_hour(channel, hour)?;
    Ok(SpatialIndexSet::where_true(slice, |v| !v.is_nan()))
}

/// Feature vectors of the cells in `indices` at `hour`, one row per cell.
pub fn extract_feature_vectors(
    dataset: &GridDataset,
    indices: &SpatialIndexSet,
    hour: usize,
    spec: &ChannelSpec,
) -> Result<Array2<f64>> {
    let slices = spec
        .channels
        .iter()
        .map(|c| dataset.at_hour(c, hour))
        .collect::<Result<Vec<_>>>()?;
    let offsets = spec.offsets();

    let mut flat = Vec::with_capacity(indices.len() * spec.n_columns());
    for i in 0..indices.len() {
        push_vector(&slices, &indices.cell(i), spec, &offsets, &mut flat)?;
    }
    Ok(Array2::from_shape_vec((indices.len(), spec.n_columns()), flat)?)
}

/// Values of `label_channel` at the cells in `indices` at `hour`.
pub fn extract_labels(
    dataset: &GridDataset,
    indices: &SpatialIndexSet,
    hour: usize,
    label_channel: &str,
) -> Result<Array1<f64>> {
    let slice = dataset.at_hour(label_channel, hour)?;
    (0..indices.len())
        .map(|i| value_at(&slice, &indices.cell(i)))
        .collect()
}

// ---------------------------------------------------------------------------
// Random sampling over training pairs
// ---------------------------------------------------------------------------

/// Draw `n_samples` vectors and labels per training pair and hour.
///
/// Cells are drawn uniformly with replacement from `indices`, or from the
/// valid cells of the reference channel when `indices` is `None`. Rows of
/// one (pair, hour) combination are contiguous, in draw order. Nothing is
/// cleaned here; missing values are kept.
pub fn sample_training_sets<R: Rng + ?Sized>(
    pairs: &[TrainingPair],
    n_samples: usize,
    hours: &[usize],
    indices: Option<&SpatialIndexSet>,
    spec: &ChannelSpec,
    label_channel: &str,
    rng: &mut R,
) -> Result<(Array2<f64>, Array1<f64>)> {
    let mut flat = Vec::new();
    let mut labels = Vec::new();

    for pair in pairs {
        let sat = read_grid(&pair.satellite)?;
        let lab = read_grid(&pair.labels)?;

        for &hour in hours {
            let candidates = match indices {
                Some(idx) => Cow::Borrowed(idx),
                None => Cow::Owned(valid_cells(&sat, spec.reference_channel(), hour)?),
            };
            if candidates.is_empty() {
                log::warn!(
                    "No candidate cells in {} at hour {hour}, skipping",
                    pair.satellite.display()
                );
                continue;
            }

            let draws: Vec<usize> = (0..n_samples)
                .map(|_| rng.gen_range(0..candidates.len()))
                .collect();
            let chosen = candidates.select(&draws);

            let vectors = extract_feature_vectors(&sat, &chosen, hour, spec)?;
            flat.extend(vectors.iter().copied());
            labels.extend(extract_labels(&lab, &chosen, hour, label_channel)?.iter().copied());
        }
        log::info!(
            "Sampled {} hour(s) from {}",
            hours.len(),
            pair.satellite.display()
        );
    }

    let n_rows = labels.len();
    Ok((
        Array2::from_shape_vec((n_rows, spec.n_columns()), flat)?,
        Array1::from(labels),
    ))
}
