use ndarray::{concatenate, Array2, Axis};

use crate::error::{Error, Result};

/// Express each neighborhood relative to its center cell.
///
/// Columns form consecutive groups of `group_size` values (one group per
/// channel); the center of a group is its middle column, `group_size / 2`.
/// Every value becomes `value - center`. With `preserve_originals` the
/// absolute columns are appended after the difference columns.
pub fn to_difference(
    vectors: &Array2<f64>,
    group_size: usize,
    preserve_originals: bool,
) -> Result<Array2<f64>> {
    if group_size == 0 || vectors.ncols() % group_size != 0 {
        return Err(Error::Value(format!(
            "{} columns cannot be split into groups of {group_size}",
            vectors.ncols()
        )));
    }
    let center = group_size / 2;

    let mut diff = vectors.clone();
    for mut row in diff.rows_mut() {
        for mut group in row.exact_chunks_mut(group_size) {
            let c = group[center];
            group.mapv_inplace(|v| v - c);
        }
    }

    if preserve_originals {
        Ok(concatenate(Axis(1), &[diff.view(), vectors.view()])?)
    } else {
        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_values_relative_to_center() {
        let v = array![[1.0, 5.0, 2.0, 10.0, 20.0, 40.0]];
        let d = to_difference(&v, 3, false).unwrap();
        assert_eq!(d, array![[-4.0, 0.0, -3.0, -10.0, 0.0, 20.0]]);
    }

    #[test]
    fn test_originals_appended() {
        let v = array![[1.0, 2.0, 3.0], [4.0, 4.0, 4.0]];
        let d = to_difference(&v, 3, true).unwrap();
        assert_eq!(d.dim(), (2, 6));
        assert_eq!(d.row(0).to_vec(), vec![-1.0, 0.0, 1.0, 1.0, 2.0, 3.0]);
        assert_eq!(d.row(1).to_vec(), vec![0.0, 0.0, 0.0, 4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_deterministic() {
        let v = array![[0.5, 1.5, 2.5, 3.5, 4.5, 5.5, 6.5, 7.5, 8.5]];
        assert_eq!(to_difference(&v, 9, true).unwrap(), to_difference(&v, 9, true).unwrap());
    }

    #[test]
    fn test_bad_group_size() {
        let v = array![[1.0, 2.0, 3.0, 4.0]];
        assert!(matches!(to_difference(&v, 3, false), Err(Error::Value(_))));
        assert!(matches!(to_difference(&v, 0, false), Err(Error::Value(_))));
    }
}
