use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cloud_vectors::data::loader::{write_grid, write_masks};
use cloud_vectors::data::model::{GridDataset, GridDimension, TIME_DIM};

const HOURS: usize = 4;
const N_LAT: usize = 20;
const N_LON: usize = 30;
/// NetCDF when available, like the operational products.
const EXT: &str = if cfg!(feature = "netcdf") { "nc" } else { "parquet" };
const TIMESTAMPS: [&str; 3] = ["202001011200", "202001021200", "202001031200"];

/// Channel name, base brightness temperature (K), noise.
const CHANNELS: [(&str, f64, f64); 7] = [
    ("bt062", 235.0, 4.0),
    ("bt073", 250.0, 4.0),
    ("bt087", 275.0, 6.0),
    ("bt097", 255.0, 3.0),
    ("bt108", 280.0, 8.0),
    ("bt120", 278.0, 8.0),
    ("bt134", 260.0, 5.0),
];

/// Box-Muller transform for normal distribution
fn gauss(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

fn empty_grid() -> Result<GridDataset> {
    let dims = vec![
        GridDimension::new(TIME_DIM, HOURS),
        GridDimension::new("lat", N_LAT),
        GridDimension::new("lon", N_LON),
    ];
    let coords = BTreeMap::from([
        (TIME_DIM.to_string(), (0..HOURS).map(|h| h as f64).collect()),
        ("lat".to_string(), (0..N_LAT).map(|i| 45.0 + 0.25 * i as f64).collect()),
        ("lon".to_string(), (0..N_LON).map(|i| 5.0 + 0.25 * i as f64).collect()),
    ]);
    Ok(GridDataset::new(dims, coords)?)
}

/// Cloud type (2013 coding) from the 10.8 µm temperature: colder is higher
/// cloud.
fn cloud_type(bt108: f64, rng: &mut StdRng) -> f64 {
    if bt108.is_nan() {
        return f64::NAN;
    }
    match bt108 {
        t if t > 285.0 => 1.0,
        t if t > 278.0 => 6.0,
        t if t > 272.0 => 8.0,
        t if t > 266.0 => 10.0,
        t if t > 262.0 => 12.0,
        _ => [14.0, 15.0, 16.0, 17.0, 19.0][rng.gen_range(0..5)],
    }
}

fn main() -> Result<()> {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_data"));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = StdRng::seed_from_u64(42);
    let shape = [HOURS, N_LAT, N_LON];
    let n_cells = shape.iter().product::<usize>();

    for ts in TIMESTAMPS {
        let mut satellite = empty_grid()?;
        let mut bt108 = Vec::new();
        for (name, base, noise) in CHANNELS {
            let values: Vec<f64> = (0..n_cells)
                .map(|_| {
                    if rng.gen_bool(0.02) {
                        f64::NAN
                    } else {
                        gauss(&mut rng, base, noise)
                    }
                })
                .collect();
            if name == "bt108" {
                bt108 = values.clone();
            }
            satellite.insert_variable(name, ArrayD::from_shape_vec(IxDyn(&shape), values)?)?;
        }

        let mut labels = empty_grid()?;
        let codes: Vec<f64> = bt108.iter().map(|&t| cloud_type(t, &mut rng)).collect();
        labels.insert_variable("CT", ArrayD::from_shape_vec(IxDyn(&shape), codes)?)?;

        let sat_path = out_dir.join(format!("msevi_{ts}.{EXT}"));
        let lab_path = out_dir.join(format!("nwcsaf_{ts}.{EXT}"));
        write_grid(&satellite, &sat_path).context("writing satellite file")?;
        write_grid(&labels, &lab_path).context("writing label file")?;
    }

    let land = ArrayD::from_shape_fn(IxDyn(&[N_LAT, N_LON]), |ix| ix[1] < N_LON / 2);
    let north = ArrayD::from_shape_fn(IxDyn(&[N_LAT, N_LON]), |ix| ix[0] >= N_LAT / 2);
    let masks = BTreeMap::from([("land".to_string(), land), ("north".to_string(), north)]);
    let mask_path = out_dir.join(format!("masks.{EXT}"));
    write_masks(&mask_path, &masks).context("writing mask container")?;

    println!(
        "Wrote {} satellite/label pairs ({HOURS}x{N_LAT}x{N_LON}) and {} to {}",
        TIMESTAMPS.len(),
        mask_path.display(),
        out_dir.display()
    );
    Ok(())
}
