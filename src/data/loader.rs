use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use ndarray::{ArrayD, IxDyn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::{ArrowWriter, ProjectionMask};
use serde::{Deserialize, Serialize};

use super::model::{GridDataset, GridDimension};
use crate::error::{Error, Result};

/// Schema metadata key holding the JSON grid header.
pub const GRID_KEY: &str = "grid";
/// Schema metadata key holding the spatial shape shared by all masks.
pub const MASK_SHAPE_KEY: &str = "mask_shape";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// On-disk layout of grids and mask containers, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridFormat {
    /// `.nc` / `.nc4` / `.cdf`: NetCDF-4, as written by the satellite and
    /// label processing chains.
    NetCdf,
    /// `.parquet` / `.pq`: the Parquet layout described on [`read_grid`].
    Parquet,
}

impl GridFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "nc" | "nc4" | "cdf" => Ok(GridFormat::NetCdf),
            "parquet" | "pq" => Ok(GridFormat::Parquet),
            other => Err(Error::Configuration(format!(
                "unsupported grid file extension: .{other}"
            ))),
        }
    }
}

#[cfg(not(feature = "netcdf"))]
fn netcdf_disabled(path: &Path) -> Error {
    Error::Configuration(format!(
        "{}: built without the `netcdf` feature",
        path.display()
    ))
}

/// Read a gridded dataset. Dispatch by extension.
///
/// Supported formats:
/// * `.nc` / `.nc4` / `.cdf` – NetCDF-4 (see [`super::nc::read_grid`])
/// * `.parquet` / `.pq`     – schema metadata `grid`:
///   `{"dims": [{"name", "size"}], "coords": {..}, "attrs": {..}}` and one
///   column per variable, flattened in C order over all dimensions. Columns
///   of any numeric or boolean type are read as `f64`; nulls become NaN.
pub fn read_grid(path: &Path) -> Result<GridDataset> {
    let dataset = match GridFormat::from_path(path)? {
        #[cfg(feature = "netcdf")]
        GridFormat::NetCdf => super::nc::read_grid(path)?,
        #[cfg(not(feature = "netcdf"))]
        GridFormat::NetCdf => return Err(netcdf_disabled(path)),
        GridFormat::Parquet => read_parquet_grid(path)?,
    };
    log::debug!(
        "Read {} with dims {:?} and variables {:?}",
        path.display(),
        dataset.dims,
        dataset.variables.keys().collect::<Vec<_>>()
    );
    Ok(dataset)
}

/// Write a gridded dataset in the format its extension names.
pub fn write_grid(dataset: &GridDataset, path: &Path) -> Result<()> {
    if dataset.variables.is_empty() {
        return Err(Error::Value(format!(
            "refusing to write {}: dataset has no variables",
            path.display()
        )));
    }
    match GridFormat::from_path(path)? {
        #[cfg(feature = "netcdf")]
        GridFormat::NetCdf => super::nc::write_grid(dataset, path)?,
        #[cfg(not(feature = "netcdf"))]
        GridFormat::NetCdf => return Err(netcdf_disabled(path)),
        GridFormat::Parquet => write_parquet_grid(dataset, path)?,
    }
    log::debug!("Wrote {} ({:?})", path.display(), dataset.shape());
    Ok(())
}

/// Names of the masks stored in a mask container.
pub fn list_masks(path: &Path) -> Result<Vec<String>> {
    match GridFormat::from_path(path)? {
        #[cfg(feature = "netcdf")]
        GridFormat::NetCdf => super::nc::list_masks(path),
        #[cfg(not(feature = "netcdf"))]
        GridFormat::NetCdf => Err(netcdf_disabled(path)),
        GridFormat::Parquet => list_parquet_masks(path),
    }
}

/// Read one named mask as an `f64` grid of its stored spatial shape.
pub fn read_mask(path: &Path, name: &str) -> Result<ArrayD<f64>> {
    match GridFormat::from_path(path)? {
        #[cfg(feature = "netcdf")]
        GridFormat::NetCdf => super::nc::read_mask(path, name),
        #[cfg(not(feature = "netcdf"))]
        GridFormat::NetCdf => Err(netcdf_disabled(path)),
        GridFormat::Parquet => read_parquet_mask(path, name),
    }
}

/// Write named boolean masks sharing one spatial shape.
pub fn write_masks(path: &Path, masks: &BTreeMap<String, ArrayD<bool>>) -> Result<()> {
    let shape = shared_shape(masks)?;
    match GridFormat::from_path(path)? {
        #[cfg(feature = "netcdf")]
        GridFormat::NetCdf => super::nc::write_masks(path, masks, &shape),
        #[cfg(not(feature = "netcdf"))]
        GridFormat::NetCdf => Err(netcdf_disabled(path)),
        GridFormat::Parquet => write_parquet_masks(path, masks, &shape),
    }
}

fn shared_shape(masks: &BTreeMap<String, ArrayD<bool>>) -> Result<Vec<usize>> {
    let shape = masks
        .values()
        .next()
        .map(|m| m.shape().to_vec())
        .ok_or_else(|| Error::Value("no masks to write".into()))?;
    if let Some((name, _)) = masks.iter().find(|(_, m)| m.shape() != shape.as_slice()) {
        return Err(Error::Value(format!(
            "mask '{name}' does not have the shared shape {shape:?}"
        )));
    }
    Ok(shape)
}

// ---------------------------------------------------------------------------
// Parquet grids
// ---------------------------------------------------------------------------

/// Dimensions, coordinates and attributes; everything but the variables.
#[derive(Debug, Serialize, Deserialize)]
struct GridHeader {
    dims: Vec<GridDimension>,
    coords: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    attrs: BTreeMap<String, String>,
}

fn read_parquet_grid(path: &Path) -> Result<GridDataset> {
    let (metadata, columns) = read_columns(path, None)?;
    let header_json = metadata.get(GRID_KEY).ok_or_else(|| {
        Error::DataAccess(format!("{} has no '{GRID_KEY}' header", path.display()))
    })?;
    let header: GridHeader = serde_json::from_str(header_json)?;

    let mut dataset = GridDataset::new(header.dims, header.coords)?;
    dataset.attrs = header.attrs;
    let shape = dataset.shape();
    let expected: usize = shape.iter().product();

    for (name, values) in columns {
        if values.len() != expected {
            return Err(Error::Value(format!(
                "{}: variable '{name}' has {} values, grid {shape:?} needs {expected}",
                path.display(),
                values.len()
            )));
        }
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;
        dataset.insert_variable(&name, data)?;
    }
    Ok(dataset)
}

fn write_parquet_grid(dataset: &GridDataset, path: &Path) -> Result<()> {
    let header = GridHeader {
        dims: dataset.dims.clone(),
        coords: dataset.coords.clone(),
        attrs: dataset.attrs.clone(),
    };
    let metadata = HashMap::from([(GRID_KEY.to_string(), serde_json::to_string(&header)?)]);

    let columns: Vec<(String, ArrayRef)> = dataset
        .variables
        .iter()
        .map(|(name, data)| {
            let values: Float64Array = data.iter().copied().map(Some).collect();
            (name.clone(), Arc::new(values) as ArrayRef)
        })
        .collect();

    write_columns(path, columns, metadata)
}

// ---------------------------------------------------------------------------
// Parquet mask containers
// ---------------------------------------------------------------------------

fn list_parquet_masks(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    Ok(builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect())
}

fn read_parquet_mask(path: &Path, name: &str) -> Result<ArrayD<f64>> {
    let (metadata, mut columns) = read_columns(path, Some(name))?;
    let shape_json = metadata.get(MASK_SHAPE_KEY).ok_or_else(|| {
        Error::DataAccess(format!("{} has no '{MASK_SHAPE_KEY}' entry", path.display()))
    })?;
    let shape: Vec<usize> = serde_json::from_str(shape_json)?;
    let (_, values) = columns
        .pop()
        .ok_or_else(|| Error::DataAccess(format!("mask '{name}' not found in {}", path.display())))?;
    if values.len() != shape.iter().product::<usize>() {
        return Err(Error::Value(format!(
            "mask '{name}' has {} cells, shape {shape:?} disagrees",
            values.len()
        )));
    }
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?)
}

fn write_parquet_masks(
    path: &Path,
    masks: &BTreeMap<String, ArrayD<bool>>,
    shape: &[usize],
) -> Result<()> {
    let metadata = HashMap::from([(MASK_SHAPE_KEY.to_string(), serde_json::to_string(shape)?)]);
    let columns = masks
        .iter()
        .map(|(name, mask)| {
            let values: BooleanArray = mask.iter().copied().map(Some).collect();
            (name.clone(), Arc::new(values) as ArrayRef)
        })
        .collect();
    write_columns(path, columns, metadata)
}

// ---------------------------------------------------------------------------
// Parquet / Arrow helpers
// ---------------------------------------------------------------------------

/// Read every column (or only `only`) as `f64`, concatenating record batches.
fn read_columns(
    path: &Path,
    only: Option<&str>,
) -> Result<(HashMap<String, String>, Vec<(String, Vec<f64>)>)> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();

    let names: Vec<String> = match only {
        Some(name) => {
            let idx = schema.index_of(name).map_err(|_| {
                Error::DataAccess(format!("'{name}' not found in {}", path.display()))
            })?;
            let mask = ProjectionMask::leaves(builder.parquet_schema(), [idx]);
            builder = builder.with_projection(mask);
            vec![name.to_string()]
        }
        None => schema.fields().iter().map(|f| f.name().clone()).collect(),
    };
    let reader = builder.build()?;

    let mut columns: Vec<(String, Vec<f64>)> =
        names.into_iter().map(|name| (name, Vec::new())).collect();
    for batch in reader {
        let batch = batch?;
        for (i, (_, values)) in columns.iter_mut().enumerate() {
            extend_f64(values, batch.column(i))?;
        }
    }

    Ok((schema.metadata().clone(), columns))
}

/// Append a numeric or boolean Arrow column as `f64`, nulls as NaN.
fn extend_f64(out: &mut Vec<f64>, col: &ArrayRef) -> Result<()> {
    let cast = arrow::compute::cast(col, &DataType::Float64)?;
    let values = cast
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| Error::Value(format!("cannot read {:?} column as f64", col.data_type())))?;
    out.extend(values.iter().map(|v| v.unwrap_or(f64::NAN)));
    Ok(())
}

/// Write `columns` as a single record batch with schema-level `metadata`.
pub(crate) fn write_columns(
    path: &Path,
    columns: Vec<(String, ArrayRef)>,
    metadata: HashMap<String, String>,
) -> Result<()> {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, arr)| Field::new(name.as_str(), arr.data_type().clone(), true))
        .collect();
    let schema = Arc::new(Schema::new_with_metadata(fields, metadata));
    let batch = RecordBatch::try_new(
        schema.clone(),
        columns.into_iter().map(|(_, arr)| arr).collect(),
    )?;

    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}
