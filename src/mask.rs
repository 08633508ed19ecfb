use std::path::Path;

use crate::data::loader;
use crate::data::model::{MaskRef, SpatialIndexSet};
use crate::error::Result;

/// A resolved mask: where it came from and the cells it selects.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveMask {
    pub source: MaskRef,
    pub indices: SpatialIndexSet,
}

/// Indices of all cells selected by mask `mask_name` in the container at
/// `filepath`. Non-zero, non-NaN values count as selected.
pub fn resolve(filepath: &Path, mask_name: &str) -> Result<SpatialIndexSet> {
    let mask = loader::read_mask(filepath, mask_name)?;
    let indices = SpatialIndexSet::where_true(mask.view(), |v| !v.is_nan() && v != 0.0);
    log::info!(
        "Mask '{mask_name}' from {} selects {} cells",
        filepath.display(),
        indices.len()
    );
    Ok(indices)
}

/// Resolve `mask` into an [`ActiveMask`].
pub fn load(mask: &MaskRef) -> Result<ActiveMask> {
    Ok(ActiveMask {
        indices: resolve(&mask.file, &mask.name)?,
        source: mask.clone(),
    })
}

/// Names of the masks available in a container.
pub fn list_masks(filepath: &Path) -> Result<Vec<String>> {
    loader::list_masks(filepath)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use ndarray::{ArrayD, IxDyn};
    use std::collections::BTreeMap;

    fn container(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("masks.parquet");
        let land = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![true, false, false, true]).unwrap();
        let empty = ArrayD::from_elem(IxDyn(&[2, 2]), false);
        let masks = BTreeMap::from([("land".to_string(), land), ("empty".to_string(), empty)]);
        loader::write_masks(&path, &masks).unwrap();
        path
    }

    #[test]
    fn test_resolve_returns_truthy_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = container(dir.path());
        let indices = resolve(&path, "land").unwrap();
        assert_eq!(indices.axes(), &[vec![0, 1], vec![0, 1]]);
    }

    #[test]
    fn test_empty_mask_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = container(dir.path());
        let indices = resolve(&path, "empty").unwrap();
        assert!(indices.is_empty());
    }

    #[test]
    fn test_missing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = container(dir.path());
        assert!(matches!(resolve(&path, "ocean"), Err(Error::DataAccess(_))));
        assert!(matches!(
            resolve(&dir.path().join("absent.parquet"), "land"),
            Err(Error::DataAccess(_))
        ));
    }

    #[test]
    fn test_load_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = container(dir.path());
        let source = MaskRef::from((path.clone(), "land".to_string()));
        let active = load(&source).unwrap();
        assert_eq!(active.source, source);
        assert_eq!(active.indices.len(), 2);
        assert_eq!(list_masks(&path).unwrap(), vec!["empty", "land"]);
    }
}
