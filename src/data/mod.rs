/// Data layer: core types, file formats, and cleaning.
///
/// Architecture:
/// ```text
///  satellite / label .nc|.parquet    mask container .nc|.parquet
///        │                                   │
///        ▼                                   ▼
///   ┌──────────┐                       ┌──────────┐
///   │  loader   │  parse → GridDataset  │  loader   │  mask → bool grid
///   └──────────┘                       └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │  GridDataset  │  dims, coords, named variables
///   └──────────────┘
///        │   (sampler)
///        ▼
///   ┌──────────┐
///   │  filter   │  drop rows with missing values
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  store    │  training set → .parquet / .json / .csv
///   └──────────┘
/// ```

pub mod filter;
pub mod loader;
pub mod model;
#[cfg(feature = "netcdf")]
pub mod nc;
pub mod store;
