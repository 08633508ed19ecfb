use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::filter::{clean, clean_test};
use crate::data::loader::read_grid;
use crate::data::model::{GridDataset, MaskRef, SpatialIndexSet, TrainingPair};
use crate::data::store;
use crate::error::{Error, Result};
use crate::labels::{self, LabelStandard};
use crate::mask::{self, ActiveMask};
use crate::matcher::match_files;
use crate::rehydrate::rehydrate_file;
use crate::sampler::{self, ChannelSpec};
use crate::settings::{Settings, SettingsLoader};
use crate::transform::to_difference;

// ---------------------------------------------------------------------------
// Data handler
// ---------------------------------------------------------------------------

/// Extraction session: settings, registered training pairs, the active
/// mask and the last file test vectors were taken from.
///
/// Not meant to be shared between threads.
pub struct DataHandler {
    pub settings: Settings,

    /// Mask resolved by [`DataHandler::set_indices_from_mask`]; stays until
    /// replaced or cleared.
    active_mask: Option<ActiveMask>,

    /// Fallback reference grid for [`DataHandler::make_xr_data`].
    latest_test_file: Option<PathBuf>,

    rng: StdRng,
}

impl DataHandler {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            settings,
            active_mask: None,
            latest_test_file: None,
            rng,
        })
    }

    /// Settings from `<defaults>/settings/*.json` overridden by
    /// `<working>/settings/*.json`.
    pub fn from_dirs(defaults_dir: &Path, working_dir: &Path) -> Result<Self> {
        Self::new(SettingsLoader::layered(defaults_dir, working_dir).load()?)
    }

    /// Merge the settings files under `dir` over the current settings.
    pub fn load_settings(&mut self, dir: &Path) -> Result<()> {
        let settings = SettingsLoader::new().with_dir(dir).load_onto(&self.settings)?;
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    /// Returns the settings keys that no file under `dir` holds.
    pub fn save_settings(&self, dir: &Path) -> Result<Vec<&'static str>> {
        self.settings.save_dir(dir)
    }

    fn channel_spec(&self) -> Result<ChannelSpec> {
        ChannelSpec::new(
            self.settings.input_channels.clone(),
            self.settings.neighborhood_radius,
        )
    }

    // -- training files --

    pub fn training_sets(&self) -> &[TrainingPair] {
        &self.settings.training_sets
    }

    pub fn add_training_files(&mut self, satellite: impl Into<PathBuf>, labels: impl Into<PathBuf>) {
        self.settings
            .training_sets
            .push(TrainingPair::new(satellite, labels));
    }

    /// Register all matching satellite/label pairs found in `folder`
    /// (default: `data_source_folder`). Returns the number of pairs found.
    ///
    /// With `additive == false` previously registered pairs are dropped.
    pub fn generate_filelist_from_folder(
        &mut self,
        folder: Option<&Path>,
        additive: bool,
    ) -> Result<usize> {
        let folder = match folder {
            Some(f) => f.to_path_buf(),
            None => self
                .settings
                .data_source_folder
                .clone()
                .ok_or_else(|| Error::Configuration("no data source folder specified".into()))?,
        };

        let pairs = match_files(
            &folder,
            &self.settings.sat_file_structure,
            &self.settings.label_file_structure,
            self.settings.timestamp_length,
        )?;
        let found = pairs.len();

        if !additive {
            self.settings.training_sets.clear();
        }
        self.settings.training_sets.extend(pairs);
        self.settings.data_source_folder = Some(folder);
        Ok(found)
    }

    // -- mask --

    /// Resolve mask `name` in `file` and make it the active index set.
    pub fn set_indices_from_mask(&mut self, file: &Path, name: &str) -> Result<&SpatialIndexSet> {
        let source = MaskRef {
            file: file.to_path_buf(),
            name: name.to_string(),
        };
        let active = mask::load(&source)?;
        self.settings.mask = Some(source);
        Ok(&self.active_mask.insert(active).indices)
    }

    /// Resolve the mask named in the settings, if any.
    pub fn activate_configured_mask(&mut self) -> Result<Option<&SpatialIndexSet>> {
        match self.settings.mask.clone() {
            Some(source) => {
                let active = mask::load(&source)?;
                Ok(Some(&self.active_mask.insert(active).indices))
            }
            None => Ok(None),
        }
    }

    pub fn clear_mask(&mut self) {
        self.active_mask = None;
        self.settings.mask = None;
    }

    pub fn active_mask(&self) -> Option<&ActiveMask> {
        self.active_mask.as_ref()
    }

    // -- extraction --

    /// Sample, clean and post-process a training set.
    ///
    /// `pairs` defaults to the registered training pairs and `indices` to the
    /// active mask (no mask: all valid cells).
    pub fn create_training_set(
        &mut self,
        pairs: Option<&[TrainingPair]>,
        indices: Option<&SpatialIndexSet>,
    ) -> Result<(Array2<f64>, Array1<f64>)> {
        let spec = self.channel_spec()?;
        let pairs = pairs.unwrap_or(self.settings.training_sets.as_slice());
        if pairs.is_empty() {
            return Err(Error::Configuration("no training data added".into()));
        }
        let indices = indices.or(self.active_mask.as_ref().map(|m| &m.indices));

        let (vectors, labels) = sampler::sample_training_sets(
            pairs,
            self.settings.samples,
            &self.settings.hours,
            indices,
            &spec,
            &self.settings.cloudtype_channel,
            &mut self.rng,
        )?;
        let (vectors, labels) = clean(&vectors, &labels)?;
        log::info!("Training set has {} samples after cleaning", labels.len());

        let vectors = self.post_process(vectors, &spec)?;
        let labels = self.normalize_labels(labels)?;
        Ok((vectors, labels))
    }

    /// Feature vectors of every usable cell of `file` at `hour`, with the
    /// cells they belong to.
    pub fn create_test_vectors(
        &mut self,
        file: &Path,
        hour: usize,
    ) -> Result<(Array2<f64>, SpatialIndexSet)> {
        let spec = self.channel_spec()?;
        let dataset = read_grid(file)?;
        let indices = match &self.active_mask {
            Some(active) => active.indices.clone(),
            None => {
                log::info!("No mask indices given, using complete data set");
                sampler::valid_cells(&dataset, spec.reference_channel(), hour)?
            }
        };

        let vectors = sampler::extract_feature_vectors(&dataset, &indices, hour, &spec)?;
        let (vectors, indices) = clean_test(&vectors, &indices)?;
        let vectors = self.post_process(vectors, &spec)?;

        self.latest_test_file = Some(file.to_path_buf());
        Ok((vectors, indices))
    }

    /// Labels of `file` at `indices` (default: active mask, else every
    /// cell) and `hour`, re-coded to the output standard.
    pub fn extract_labels(
        &mut self,
        file: &Path,
        indices: Option<&SpatialIndexSet>,
        hour: usize,
    ) -> Result<Array1<f64>> {
        let dataset = read_grid(file)?;
        let channel = &self.settings.cloudtype_channel;
        let all_cells;
        let indices = match indices.or(self.active_mask.as_ref().map(|m| &m.indices)) {
            Some(idx) => idx,
            None => {
                log::info!("No mask indices given, using complete data set");
                all_cells = SpatialIndexSet::where_true(dataset.at_hour(channel, hour)?, |_| true);
                &all_cells
            }
        };
        let labels = sampler::extract_labels(&dataset, indices, hour, channel)?;
        self.normalize_labels(labels)
    }

    fn post_process(&self, vectors: Array2<f64>, spec: &ChannelSpec) -> Result<Array2<f64>> {
        if self.settings.difference_vectors {
            to_difference(&vectors, spec.window_len(), self.settings.original_values)
        } else {
            Ok(vectors)
        }
    }

    // -- label standards --

    /// Detect the coding standard of `labels`; with `set_value` a detected
    /// standard becomes the configured input standard.
    pub fn check_nwcsaf_version(
        &mut self,
        labels: ArrayView1<'_, f64>,
        set_value: bool,
    ) -> Option<LabelStandard> {
        let detected = detect_logged(labels);
        if let (Some(standard), true) = (detected, set_value) {
            self.settings.nwcsaf_in_version = standard.into();
        }
        detected
    }

    /// Re-code `labels` to the output standard. In auto mode the standard
    /// detected here is pinned for later calls.
    fn normalize_labels(&mut self, labels: Array1<f64>) -> Result<Array1<f64>> {
        if labels.is_empty() {
            return Ok(labels);
        }
        let target = self.settings.nwcsaf_out_version;
        let source = match self.settings.nwcsaf_in_version.fixed() {
            Some(standard) => Some(standard),
            None => self.check_nwcsaf_version(labels.view(), true),
        };
        if source == Some(target) {
            return Ok(labels);
        }
        labels::convert(labels.view(), source, target).map_err(|e| match source {
            None => Error::Value(format!(
                "{e}; set nwcsaf_in_version to v2013 or v2018 for this data"
            )),
            Some(_) => e,
        })
    }

    // -- predictions --

    /// Which grid predictions are placed on: `explicit`, else the latest
    /// test file, else the first training satellite file.
    pub fn reference_file(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = &self.latest_test_file {
            log::info!("Using latest test file {} as reference", path.display());
            return Ok(path.clone());
        }
        if let Some(pair) = self.settings.training_sets.first() {
            log::info!("Using training data {} as reference", pair.satellite.display());
            return Ok(pair.satellite.clone());
        }
        Err(Error::Configuration("no reference available".into()))
    }

    /// Grid `labels` at `indices` onto the reference grid; write the result
    /// to `out` when given.
    pub fn make_xr_data(
        &self,
        labels: ArrayView1<'_, f64>,
        indices: &SpatialIndexSet,
        reference: Option<&Path>,
        out: Option<&Path>,
    ) -> Result<GridDataset> {
        let reference = self.reference_file(reference)?;
        rehydrate_file(
            labels,
            indices,
            &reference,
            &self.settings.cloudtype_channel,
            out,
        )
    }

    pub fn latest_test_file(&self) -> Option<&Path> {
        self.latest_test_file.as_deref()
    }

    // -- persistence --

    pub fn save_training_set(
        &self,
        vectors: &Array2<f64>,
        labels: &Array1<f64>,
        path: &Path,
    ) -> Result<()> {
        store::save_training_set(path, vectors, labels)
    }

    pub fn load_training_set(&self, path: &Path) -> Result<(Array2<f64>, Array1<f64>)> {
        store::load_training_set(path)
    }
}

fn detect_logged(labels: ArrayView1<'_, f64>) -> Option<LabelStandard> {
    let detected = labels::detect(labels);
    match detected {
        Some(LabelStandard::V2013) => {
            log::info!("The cloud type data is coded after the old (2013) standard")
        }
        Some(LabelStandard::V2018) => {
            log::info!("The cloud type data is coded after the new (2018) standard")
        }
        None => log::warn!("Could not determine the NWC SAF version of the labels"),
    }
    detected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::InputStandard;
    use ndarray::array;

    fn handler() -> DataHandler {
        DataHandler::new(Settings {
            seed: Some(1),
            ..Settings::default()
        })
        .unwrap()
    }

    #[test]
    fn test_reference_resolution_order() {
        let mut h = handler();
        assert!(matches!(h.reference_file(None), Err(Error::Configuration(_))));

        h.add_training_files("sat_a.parquet", "lab_a.parquet");
        assert_eq!(h.reference_file(None).unwrap(), PathBuf::from("sat_a.parquet"));

        h.latest_test_file = Some(PathBuf::from("test.parquet"));
        assert_eq!(h.reference_file(None).unwrap(), PathBuf::from("test.parquet"));
        assert_eq!(
            h.reference_file(Some(Path::new("given.parquet"))).unwrap(),
            PathBuf::from("given.parquet")
        );
    }

    #[test]
    fn test_no_training_data() {
        let mut h = handler();
        let err = h.create_training_set(None, None).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_no_folder_configured() {
        let mut h = handler();
        let err = h.generate_filelist_from_folder(None, true).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_auto_mode_converts_detected_legacy_labels() {
        let mut h = handler();
        let out = h.normalize_labels(array![6.0, 17.0, 19.0]).unwrap();
        assert_eq!(out, array![5.0, 13.0, 10.0]);
    }

    #[test]
    fn test_detected_standard_carries_over_to_later_batches() {
        let mut h = handler();
        h.normalize_labels(array![6.0, 17.0, 19.0]).unwrap();
        assert_eq!(h.settings.nwcsaf_in_version, InputStandard::V2013);

        // Codes shared by both standards, converted as legacy data.
        let out = h.normalize_labels(array![6.0, 8.0]).unwrap();
        assert_eq!(out, array![5.0, 6.0]);
    }

    #[test]
    fn test_auto_mode_refuses_ambiguous_labels() {
        let mut h = handler();
        let err = h.normalize_labels(array![1.0, 5.0]).unwrap_err();
        assert!(matches!(err, Error::Value(_)));
    }

    #[test]
    fn test_fixed_input_standard_skips_detection() {
        let mut h = handler();
        h.settings.nwcsaf_in_version = InputStandard::V2018;
        let labels = array![1.0, 5.0];
        assert_eq!(h.normalize_labels(labels.clone()).unwrap(), labels);
    }

    #[test]
    fn test_check_version_pins_setting() {
        let mut h = handler();
        assert_eq!(h.check_nwcsaf_version(array![3.0].view(), true), None);
        assert_eq!(h.settings.nwcsaf_in_version, InputStandard::Auto);
        assert_eq!(
            h.check_nwcsaf_version(array![18.0].view(), true),
            Some(LabelStandard::V2013)
        );
        assert_eq!(h.settings.nwcsaf_in_version, InputStandard::V2013);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = Settings {
            input_channels: Vec::new(),
            ..Settings::default()
        };
        assert!(DataHandler::new(settings).is_err());
    }
}
