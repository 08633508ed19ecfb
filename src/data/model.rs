use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use ndarray::{ArrayD, ArrayViewD, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the leading dimension indexed by hour offset.
pub const TIME_DIM: &str = "time";

// ---------------------------------------------------------------------------
// TrainingPair – one satellite file with its label file
// ---------------------------------------------------------------------------

/// A satellite file and the label file sharing its timestamp.
///
/// Serialized as a two-element array `[satellite, labels]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(PathBuf, PathBuf)", into = "(PathBuf, PathBuf)")]
pub struct TrainingPair {
    pub satellite: PathBuf,
    pub labels: PathBuf,
}

impl TrainingPair {
    pub fn new(satellite: impl Into<PathBuf>, labels: impl Into<PathBuf>) -> Self {
        Self {
            satellite: satellite.into(),
            labels: labels.into(),
        }
    }
}

impl From<(PathBuf, PathBuf)> for TrainingPair {
    fn from((satellite, labels): (PathBuf, PathBuf)) -> Self {
        Self { satellite, labels }
    }
}

impl From<TrainingPair> for (PathBuf, PathBuf) {
    fn from(pair: TrainingPair) -> Self {
        (pair.satellite, pair.labels)
    }
}

// ---------------------------------------------------------------------------
// MaskRef – which named mask in which container
// ---------------------------------------------------------------------------

/// A mask container file and the name of one mask inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(PathBuf, String)", into = "(PathBuf, String)")]
pub struct MaskRef {
    pub file: PathBuf,
    pub name: String,
}

impl From<(PathBuf, String)> for MaskRef {
    fn from((file, name): (PathBuf, String)) -> Self {
        Self { file, name }
    }
}

impl From<MaskRef> for (PathBuf, String) {
    fn from(mask: MaskRef) -> Self {
        (mask.file, mask.name)
    }
}

impl fmt::Display for MaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.name)
    }
}

// ---------------------------------------------------------------------------
// SpatialIndexSet – a fixed set of grid cells
// ---------------------------------------------------------------------------

/// One coordinate array per spatial dimension, all of the same length.
///
/// Cell `i` is `(axes[0][i], axes[1][i], ...)`. The set carries no grid
/// shape; readers and writers check bounds when they touch a grid.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpatialIndexSet {
    axes: Vec<Vec<usize>>,
}

impl SpatialIndexSet {
    pub fn new(axes: Vec<Vec<usize>>) -> Result<Self> {
        if let Some(first) = axes.first() {
            if let Some(bad) = axes.iter().position(|a| a.len() != first.len()) {
                return Err(Error::Value(format!(
                    "index axis {bad} has {} entries, axis 0 has {}",
                    axes[bad].len(),
                    first.len()
                )));
            }
        }
        Ok(Self { axes })
    }

    /// Indices of every cell of `view` for which `pred` holds, in row-major
    /// order.
    pub fn where_true<F>(view: ArrayViewD<'_, f64>, pred: F) -> Self
    where
        F: Fn(f64) -> bool,
    {
        let shape = view.shape().to_vec();
        let mut axes = vec![Vec::new(); shape.len()];
        for (flat, value) in view.iter().enumerate() {
            if pred(*value) {
                for (axis, i) in axes.iter_mut().zip(unravel(flat, &shape)) {
                    axis.push(i);
                }
            }
        }
        Self { axes }
    }

    pub fn len(&self) -> usize {
        self.axes.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ndim(&self) -> usize {
        self.axes.len()
    }

    pub fn axes(&self) -> &[Vec<usize>] {
        &self.axes
    }

    /// Coordinates of the `i`-th cell.
    pub fn cell(&self, i: usize) -> Vec<usize> {
        self.axes.iter().map(|axis| axis[i]).collect()
    }

    /// Keep only the cells at positions `keep`, in that order.
    pub fn select(&self, keep: &[usize]) -> Self {
        Self {
            axes: self
                .axes
                .iter()
                .map(|axis| keep.iter().map(|&k| axis[k]).collect())
                .collect(),
        }
    }
}

/// Row-major multi-index of flat position `flat` in `shape`.
pub fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut idx = vec![0; shape.len()];
    for (slot, &len) in idx.iter_mut().zip(shape).rev() {
        *slot = flat % len;
        flat /= len;
    }
    idx
}

// ---------------------------------------------------------------------------
// GridDataset – a self-describing gridded file in memory
// ---------------------------------------------------------------------------

/// A named dimension and its length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDimension {
    pub name: String,
    pub size: usize,
}

impl GridDimension {
    pub fn new(name: &str, size: usize) -> Self {
        Self {
            name: name.to_string(),
            size,
        }
    }
}

/// Gridded dataset: dimensions, one coordinate vector per dimension, and
/// `f64` variables spanning all dimensions. Missing values are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDataset {
    pub dims: Vec<GridDimension>,
    /// Dimension name → coordinate values (length = dimension size).
    pub coords: BTreeMap<String, Vec<f64>>,
    pub variables: BTreeMap<String, ArrayD<f64>>,
    pub attrs: BTreeMap<String, String>,
}

impl GridDataset {
    /// Empty dataset over `dims`. Every dimension needs a coordinate vector
    /// of matching length.
    pub fn new(dims: Vec<GridDimension>, coords: BTreeMap<String, Vec<f64>>) -> Result<Self> {
        for dim in &dims {
            match coords.get(&dim.name) {
                Some(c) if c.len() == dim.size => {}
                Some(c) => {
                    return Err(Error::Value(format!(
                        "coordinate '{}' has {} values, dimension size is {}",
                        dim.name,
                        c.len(),
                        dim.size
                    )))
                }
                None => {
                    return Err(Error::Value(format!(
                        "no coordinate values for dimension '{}'",
                        dim.name
                    )))
                }
            }
        }
        Ok(Self {
            dims,
            coords,
            variables: BTreeMap::new(),
            attrs: BTreeMap::new(),
        })
    }

    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().map(|d| d.size).collect()
    }

    /// Whether the leading dimension is the hour-indexed time axis.
    pub fn has_time(&self) -> bool {
        self.dims.first().is_some_and(|d| d.name == TIME_DIM)
    }

    pub fn spatial_dims(&self) -> &[GridDimension] {
        if self.has_time() {
            &self.dims[1..]
        } else {
            &self.dims
        }
    }

    pub fn spatial_shape(&self) -> Vec<usize> {
        self.spatial_dims().iter().map(|d| d.size).collect()
    }

    pub fn insert_variable(&mut self, name: &str, data: ArrayD<f64>) -> Result<()> {
        if data.shape() != self.shape().as_slice() {
            return Err(Error::Value(format!(
                "variable '{name}' has shape {:?}, dataset shape is {:?}",
                data.shape(),
                self.shape()
            )));
        }
        self.variables.insert(name.to_string(), data);
        Ok(())
    }

    pub fn variable(&self, name: &str) -> Result<&ArrayD<f64>> {
        self.variables
            .get(name)
            .ok_or_else(|| Error::DataAccess(format!("variable '{name}' not found in dataset")))
    }

    /// Spatial slice of `name` at hour offset `hour`.
    ///
    /// Datasets without a time axis only have hour 0.
    pub fn at_hour(&self, name: &str, hour: usize) -> Result<ArrayViewD<'_, f64>> {
        let data = self.variable(name)?;
        if self.has_time() {
            let n_times = self.dims[0].size;
            if hour >= n_times {
                return Err(Error::DataAccess(format!(
                    "hour {hour} out of range, dataset has {n_times} time steps"
                )));
            }
            Ok(data.index_axis(Axis(0), hour))
        } else if hour == 0 {
            Ok(data.view())
        } else {
            Err(Error::DataAccess(format!(
                "hour {hour} requested from a dataset without a time dimension"
            )))
        }
    }

    /// A dataset with this dataset's spatial dimensions, coordinates and
    /// attributes but no variables.
    pub fn spatial_template(&self) -> Self {
        let dims = self.spatial_dims().to_vec();
        let coords = dims
            .iter()
            .filter_map(|d| self.coords.get(&d.name).map(|c| (d.name.clone(), c.clone())))
            .collect();
        Self {
            dims,
            coords,
            variables: BTreeMap::new(),
            attrs: self.attrs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn grid(times: usize) -> GridDataset {
        let dims = vec![
            GridDimension::new(TIME_DIM, times),
            GridDimension::new("y", 2),
            GridDimension::new("x", 3),
        ];
        let coords = BTreeMap::from([
            (TIME_DIM.to_string(), (0..times).map(|t| t as f64).collect()),
            ("y".to_string(), vec![50.0, 51.0]),
            ("x".to_string(), vec![5.0, 6.0, 7.0]),
        ]);
        GridDataset::new(dims, coords).unwrap()
    }

    #[test]
    fn test_unravel_row_major() {
        assert_eq!(unravel(0, &[2, 3]), vec![0, 0]);
        assert_eq!(unravel(4, &[2, 3]), vec![1, 1]);
        assert_eq!(unravel(23, &[2, 3, 4]), vec![1, 2, 3]);
    }

    #[test]
    fn test_where_true_collects_matching_cells() {
        let data = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![0.0, 1.0, 0.0, 1.0, f64::NAN, 1.0])
            .unwrap();
        let idx = SpatialIndexSet::where_true(data.view(), |v| v == 1.0);
        assert_eq!(idx.axes(), &[vec![0, 1, 1], vec![1, 0, 2]]);
        assert_eq!(idx.cell(1), vec![1, 0]);
    }

    #[test]
    fn test_index_set_rejects_ragged_axes() {
        assert!(SpatialIndexSet::new(vec![vec![0, 1], vec![0]]).is_err());
        let idx = SpatialIndexSet::new(vec![vec![0, 1, 2], vec![3, 4, 5]]).unwrap();
        assert_eq!(idx.select(&[2, 0]).axes(), &[vec![2, 0], vec![5, 3]]);
    }

    #[test]
    fn test_coordinate_length_checked() {
        let dims = vec![GridDimension::new("y", 3)];
        let coords = BTreeMap::from([("y".to_string(), vec![1.0, 2.0])]);
        assert!(matches!(GridDataset::new(dims, coords), Err(Error::Value(_))));
    }

    #[test]
    fn test_at_hour_slices_time_axis() {
        let mut ds = grid(2);
        let data = ArrayD::from_shape_vec(IxDyn(&[2, 2, 3]), (0..12).map(f64::from).collect())
            .unwrap();
        ds.insert_variable("bt108", data).unwrap();

        let slice = ds.at_hour("bt108", 1).unwrap();
        assert_eq!(slice.shape(), &[2, 3]);
        assert_eq!(slice[IxDyn(&[0, 0])], 6.0);
        assert!(matches!(ds.at_hour("bt108", 2), Err(Error::DataAccess(_))));
        assert!(matches!(ds.at_hour("bt120", 0), Err(Error::DataAccess(_))));
    }

    #[test]
    fn test_spatial_template_drops_time() {
        let mut ds = grid(4);
        ds.attrs.insert("source".into(), "seviri".into());
        let template = ds.spatial_template();
        assert_eq!(template.shape(), vec![2, 3]);
        assert!(!template.coords.contains_key(TIME_DIM));
        assert_eq!(template.attrs.get("source").map(String::as_str), Some("seviri"));
    }

    #[test]
    fn test_training_pair_serializes_as_array() {
        let pair = TrainingPair::new("sat.parquet", "lab.parquet");
        let json = serde_json::to_string(&pair).unwrap();
        assert_eq!(json, r#"["sat.parquet","lab.parquet"]"#);
        let back: TrainingPair = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pair);
    }
}
