//! NetCDF-4 grids and mask containers.
//!
//! Reading follows the CF conventions the satellite and label products use:
//! values equal to `_FillValue` (or `missing_value`) become NaN and packed
//! variables are unpacked with `scale_factor` / `add_offset`. A dimension
//! without a coordinate variable gets its index positions as coordinates.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use netcdf::{AttributeValue, Variable};

use super::model::{GridDataset, GridDimension};
use crate::error::{Error, Result};

fn open(path: &Path) -> Result<netcdf::File> {
    if !path.exists() {
        return Err(Error::DataAccess(format!("file not found: {}", path.display())));
    }
    Ok(netcdf::open(path)?)
}

fn dim_names(var: &Variable<'_>) -> Vec<String> {
    var.dimensions().iter().map(|d| d.name()).collect()
}

/// Numeric scalar attribute of `var` as `f64`.
fn attr_f64(var: &Variable<'_>, name: &str) -> Option<f64> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(f64::from(v)),
        AttributeValue::Longlong(v) => Some(v as f64),
        AttributeValue::Ulonglong(v) => Some(v as f64),
        AttributeValue::Int(v) => Some(f64::from(v)),
        AttributeValue::Uint(v) => Some(f64::from(v)),
        AttributeValue::Short(v) => Some(f64::from(v)),
        AttributeValue::Ushort(v) => Some(f64::from(v)),
        AttributeValue::Schar(v) => Some(f64::from(v)),
        AttributeValue::Uchar(v) => Some(f64::from(v)),
        _ => None,
    }
}

/// All values of `var` as unpacked `f64`, fill values as NaN.
fn read_values(var: &Variable<'_>) -> Result<Vec<f64>> {
    let mut values: Vec<f64> = var.get_values::<f64, _>(..)?;
    let fill = attr_f64(var, "_FillValue").or_else(|| attr_f64(var, "missing_value"));
    let scale = attr_f64(var, "scale_factor").unwrap_or(1.0);
    let offset = attr_f64(var, "add_offset").unwrap_or(0.0);
    for v in values.iter_mut() {
        // fill values are compared in packed units
        *v = if fill == Some(*v) { f64::NAN } else { *v * scale + offset };
    }
    Ok(values)
}

// ---------------------------------------------------------------------------
// Grids
// ---------------------------------------------------------------------------

/// Read a NetCDF file as a [`GridDataset`].
///
/// The dataset takes the dimensions of the data variable with the most
/// dimensions; data variables over other dimensions, or of non-numeric
/// type, are skipped. String global attributes are kept.
pub fn read_grid(path: &Path) -> Result<GridDataset> {
    let file = open(path)?;
    let all_dims: Vec<String> = file.dimensions().map(|d| d.name()).collect();
    let data_vars: Vec<Variable<'_>> = file
        .variables()
        .filter(|v| !all_dims.contains(&v.name()))
        .collect();

    let layout = data_vars
        .iter()
        .max_by_key(|v| v.dimensions().len())
        .ok_or_else(|| Error::DataAccess(format!("{} has no data variables", path.display())))?;
    let dims: Vec<GridDimension> = layout
        .dimensions()
        .iter()
        .map(|d| GridDimension {
            name: d.name(),
            size: d.len(),
        })
        .collect();

    let mut coords = BTreeMap::new();
    for dim in &dims {
        let values = match file.variable(&dim.name) {
            Some(var) if var.dimensions().len() == 1 => read_values(&var)?,
            _ => (0..dim.size).map(|i| i as f64).collect(),
        };
        coords.insert(dim.name.clone(), values);
    }

    let names: Vec<String> = dims.iter().map(|d| d.name.clone()).collect();
    let mut dataset = GridDataset::new(dims, coords)?;
    let shape = dataset.shape();
    for var in &data_vars {
        let name = var.name();
        if dim_names(var) != names {
            log::debug!(
                "Skipping '{name}' in {}: dimensions {:?}",
                path.display(),
                dim_names(var)
            );
            continue;
        }
        let values = match read_values(var) {
            Ok(values) => values,
            Err(e) => {
                log::warn!("Skipping '{name}' in {}: {e}", path.display());
                continue;
            }
        };
        dataset.insert_variable(&name, ArrayD::from_shape_vec(IxDyn(&shape), values)?)?;
    }

    for attr in file.attributes() {
        if let Ok(AttributeValue::Str(text)) = attr.value() {
            dataset.attrs.insert(attr.name().to_string(), text);
        }
    }
    Ok(dataset)
}

/// Write `dataset` as NetCDF-4: one coordinate variable per dimension,
/// `f64` data variables with a NaN `_FillValue`, string global attributes.
pub fn write_grid(dataset: &GridDataset, path: &Path) -> Result<()> {
    let mut file = netcdf::create(path)?;
    for dim in &dataset.dims {
        file.add_dimension(&dim.name, dim.size)?;
    }
    for dim in &dataset.dims {
        if let Some(values) = dataset.coords.get(&dim.name) {
            let mut var = file.add_variable::<f64>(&dim.name, &[dim.name.as_str()])?;
            var.put_values(values.as_slice(), ..)?;
        }
    }

    let dims: Vec<&str> = dataset.dims.iter().map(|d| d.name.as_str()).collect();
    for (name, data) in &dataset.variables {
        let mut var = file.add_variable::<f64>(name, &dims)?;
        var.put_attribute("_FillValue", f64::NAN)?;
        let values: Vec<f64> = data.iter().copied().collect();
        var.put_values(values.as_slice(), ..)?;
    }

    for (key, value) in &dataset.attrs {
        file.add_attribute(key, value.as_str())?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Mask containers
// ---------------------------------------------------------------------------

/// Every non-coordinate variable is a mask.
pub fn list_masks(path: &Path) -> Result<Vec<String>> {
    let file = open(path)?;
    let all_dims: Vec<String> = file.dimensions().map(|d| d.name()).collect();
    let mut names: Vec<String> = file
        .variables()
        .map(|v| v.name())
        .filter(|n| !all_dims.contains(n))
        .collect();
    names.sort();
    Ok(names)
}

pub fn read_mask(path: &Path, name: &str) -> Result<ArrayD<f64>> {
    let file = open(path)?;
    let var = file
        .variable(name)
        .ok_or_else(|| Error::DataAccess(format!("mask '{name}' not found in {}", path.display())))?;
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), read_values(&var)?)?)
}

/// Masks are stored as `u8` (0/1) over dimensions `y, x` (2-D) or
/// `dim_0, dim_1, ..`.
pub fn write_masks(
    path: &Path,
    masks: &BTreeMap<String, ArrayD<bool>>,
    shape: &[usize],
) -> Result<()> {
    let dim_names: Vec<String> = if shape.len() == 2 {
        vec!["y".to_string(), "x".to_string()]
    } else {
        (0..shape.len()).map(|i| format!("dim_{i}")).collect()
    };

    let mut file = netcdf::create(path)?;
    for (name, &len) in dim_names.iter().zip(shape) {
        file.add_dimension(name, len)?;
    }
    let dims: Vec<&str> = dim_names.iter().map(String::as_str).collect();
    for (name, mask) in masks {
        let mut var = file.add_variable::<u8>(name, &dims)?;
        let values: Vec<u8> = mask.iter().map(|&m| u8::from(m)).collect();
        var.put_values(values.as_slice(), ..)?;
    }
    Ok(())
}
