use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array1, ArrayD, IxDyn};

use cloud_vectors::data::loader::{read_grid, write_grid, write_masks};
use cloud_vectors::data::model::{GridDataset, GridDimension, TIME_DIM};
use cloud_vectors::settings::InputStandard;
use cloud_vectors::{DataHandler, Error, LabelStandard, Settings, SpatialIndexSet};

const SHAPE: [usize; 3] = [2, 3, 4];

fn empty_grid() -> GridDataset {
    let dims = vec![
        GridDimension::new(TIME_DIM, SHAPE[0]),
        GridDimension::new("y", SHAPE[1]),
        GridDimension::new("x", SHAPE[2]),
    ];
    let coords = BTreeMap::from([
        (TIME_DIM.to_string(), vec![0.0, 1.0]),
        ("y".to_string(), vec![50.0, 50.5, 51.0]),
        ("x".to_string(), vec![7.0, 7.5, 8.0, 8.5]),
    ]);
    GridDataset::new(dims, coords).unwrap()
}

/// Writes `sat_<ts>` / `lab_<ts>` pairs plus one unmatched satellite file and
/// a mask container selecting the two left columns.
fn write_inputs(dir: &Path, ext: &str) {
    for (n, ts) in ["20200101", "20200102"].iter().enumerate() {
        let mut sat = empty_grid();
        let bt108 = ArrayD::from_shape_fn(IxDyn(&SHAPE), |ix| {
            250.0 + 10.0 * ix[0] as f64 + ix[1] as f64 + 0.1 * ix[2] as f64 + n as f64
        });
        let bt120 = bt108.mapv(|v| v - 2.0);
        sat.insert_variable("bt108", bt108).unwrap();
        sat.insert_variable("bt120", bt120).unwrap();
        write_grid(&sat, &dir.join(format!("sat_{ts}.{ext}"))).unwrap();

        // Legacy coding: 17 and 19 only exist in the 2013 standard.
        let mut lab = empty_grid();
        let ct = ArrayD::from_shape_fn(IxDyn(&SHAPE), |ix| [6.0, 17.0, 19.0][(ix[1] + ix[2]) % 3]);
        lab.insert_variable("CT", ct).unwrap();
        write_grid(&lab, &dir.join(format!("lab_{ts}.{ext}"))).unwrap();
    }

    let mut orphan = empty_grid();
    orphan
        .insert_variable("bt108", ArrayD::zeros(IxDyn(&SHAPE)))
        .unwrap();
    write_grid(&orphan, &dir.join(format!("sat_99999999.{ext}"))).unwrap();

    let left = ArrayD::from_shape_fn(IxDyn(&[SHAPE[1], SHAPE[2]]), |ix| ix[1] < 2);
    write_masks(
        &dir.join(format!("masks.{ext}")),
        &BTreeMap::from([("left".to_string(), left)]),
    )
    .unwrap();
}

fn settings(dir: &Path, ext: &str) -> Settings {
    Settings {
        data_source_folder: Some(dir.to_path_buf()),
        timestamp_length: 8,
        sat_file_structure: format!("sat_TIMESTAMP.{ext}"),
        label_file_structure: format!("lab_TIMESTAMP.{ext}"),
        input_channels: vec!["bt108".into(), "bt120".into()],
        cloudtype_channel: "CT".into(),
        samples: 10,
        hours: vec![0, 1],
        seed: Some(7),
        ..Settings::default()
    }
}

fn run_pipeline(ext: &str) {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path(), ext);

    let mut handler = DataHandler::new(settings(dir.path(), ext)).unwrap();
    assert_eq!(handler.generate_filelist_from_folder(None, false).unwrap(), 2);
    let pairs = handler.training_sets();
    assert_eq!(pairs[0].satellite, dir.path().join(format!("sat_20200101.{ext}")));
    assert_eq!(pairs[1].labels, dir.path().join(format!("lab_20200102.{ext}")));

    let mask = handler
        .set_indices_from_mask(&dir.path().join(format!("masks.{ext}")), "left")
        .unwrap();
    assert_eq!(mask.len(), 6);

    let (vectors, labels) = handler.create_training_set(None, None).unwrap();
    assert_eq!(vectors.dim(), (40, 2));
    assert_eq!(labels.len(), 40);
    assert!(labels.iter().all(|l| [5.0, 13.0, 10.0].contains(l)));
    for row in vectors.rows() {
        assert!((row[0] - row[1] - 2.0).abs() < 1e-9);
        // Masked cells only: x < 2.
        let x = ((row[0] * 10.0).round() as i64 % 10) as usize;
        assert!(x < 2);
    }

    let sat = dir.path().join(format!("sat_20200102.{ext}"));
    let (test_vectors, indices) = handler.create_test_vectors(&sat, 1).unwrap();
    assert_eq!(test_vectors.nrows(), 6);
    assert_eq!(handler.latest_test_file(), Some(sat.as_path()));

    let predicted = Array1::from_iter((0..indices.len()).map(|i| i as f64 + 1.0));
    let out = dir.path().join(format!("prediction.{ext}"));
    handler
        .make_xr_data(predicted.view(), &indices, None, Some(&out))
        .unwrap();

    let back = read_grid(&out).unwrap();
    assert_eq!(back.shape(), vec![3, 4]);
    let ct = back.variable("CT").unwrap();
    for i in 0..indices.len() {
        assert_eq!(ct[IxDyn(&indices.cell(i))], predicted[i]);
    }
    assert_eq!(ct.iter().filter(|v| v.is_nan()).count(), 6);
}

#[test]
fn test_match_sample_convert_rehydrate() {
    run_pipeline("parquet");
}

#[cfg(feature = "netcdf")]
#[test]
fn test_match_sample_convert_rehydrate_netcdf() {
    run_pipeline("nc");
}

#[test]
fn test_labels_extracted_in_output_standard() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path(), "parquet");

    let mut handler = DataHandler::new(settings(dir.path(), "parquet")).unwrap();
    let labels = handler
        .extract_labels(&dir.path().join("lab_20200101.parquet"), None, 0)
        .unwrap();
    assert_eq!(labels.len(), 12);
    assert_eq!(&labels.to_vec()[..4], &[5.0, 13.0, 10.0, 5.0]);
    assert_eq!(handler.settings.nwcsaf_in_version, InputStandard::V2013);

    // Only codes both standards share; the pinned legacy standard applies.
    let raw = Array1::from(vec![6.0, 8.0]);
    assert_eq!(handler.check_nwcsaf_version(raw.view(), true), None);
    assert_eq!(handler.settings.nwcsaf_in_version, InputStandard::V2013);
    let shared = SpatialIndexSet::new(vec![vec![0], vec![0]]).unwrap();
    let labels = handler
        .extract_labels(&dir.path().join("lab_20200102.parquet"), Some(&shared), 1)
        .unwrap();
    assert_eq!(labels.to_vec(), vec![5.0]);
    assert_eq!(
        handler.check_nwcsaf_version(Array1::from(vec![17.0]).view(), false),
        Some(LabelStandard::V2013)
    );
}

#[test]
fn test_difference_vectors_with_neighborhood() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path(), "parquet");

    let mut handler = DataHandler::new(Settings {
        neighborhood_radius: 1,
        difference_vectors: true,
        original_values: true,
        ..settings(dir.path(), "parquet")
    })
    .unwrap();
    handler.generate_filelist_from_folder(None, false).unwrap();

    // The only cells with a full 3x3 window.
    let interior = SpatialIndexSet::new(vec![vec![1, 1], vec![1, 2]]).unwrap();
    let (vectors, labels) = handler.create_training_set(None, Some(&interior)).unwrap();
    assert_eq!(vectors.dim(), (40, 2 * 9 * 2));
    assert_eq!(labels.len(), 40);
    for row in vectors.rows() {
        assert_eq!(row[4], 0.0);
        assert_eq!(row[13], 0.0);
        assert!(row.iter().all(|v| !v.is_nan()));
    }
}

#[test]
fn test_missing_reference() {
    let dir = tempfile::tempdir().unwrap();
    let handler = DataHandler::new(settings(dir.path(), "parquet")).unwrap();
    let indices = SpatialIndexSet::default();
    let err = handler
        .make_xr_data(Array1::<f64>::zeros(0).view(), &indices, None, None)
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}
