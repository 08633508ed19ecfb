use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ndarray::Array1;

use cloud_vectors::data::loader::read_grid;
use cloud_vectors::labels;
use cloud_vectors::mask::list_masks;
use cloud_vectors::{DataHandler, SettingsLoader, SpatialIndexSet};

#[derive(Parser)]
#[command(name = "cloud-vectors")]
#[command(author, version, about = "Cloud-type training vector extraction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the default `settings/*.json` files
    #[arg(long)]
    settings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Match satellite and label files in a folder
    Pairs {
        folder: PathBuf,

        /// Keep previously registered pairs
        #[arg(long)]
        additive: bool,

        /// Update the existing ./settings/*.json files (config.json is
        /// created when there are none); keys no file holds are not saved
        #[arg(long)]
        save: bool,
    },

    /// Sample a training set from the registered pairs
    Extract {
        /// Output file (.parquet, .json or .csv)
        out: PathBuf,
    },

    /// Feature vectors of every usable cell of one satellite file
    TestVectors {
        file: PathBuf,

        /// Output file (.parquet, .json or .csv); cell indices go to
        /// `<out>.indices.json`
        out: PathBuf,

        #[arg(long, default_value = "0")]
        hour: usize,
    },

    /// Place predicted labels back onto a reference grid
    Rehydrate {
        /// Training-set file whose label column holds the predictions
        labels: PathBuf,

        /// Index file written by `test-vectors`
        indices: PathBuf,

        /// Output grid file
        out: PathBuf,

        /// Reference grid (default: first registered satellite file)
        #[arg(long)]
        reference: Option<PathBuf>,
    },

    /// Report the label coding standard of a label file
    Detect {
        file: PathBuf,

        #[arg(long, default_value = "0")]
        hour: usize,
    },

    /// List the masks in a mask container
    Masks { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().context("reading working directory")?;
    let defaults = cli.settings.clone().unwrap_or_else(|| cwd.clone());
    let settings = SettingsLoader::layered(&defaults, &cwd)
        .load()
        .context("loading settings")?;

    let filter = if settings.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let mut handler = DataHandler::new(settings).context("invalid settings")?;

    match cli.command {
        Commands::Pairs {
            folder,
            additive,
            save,
        } => {
            let found = handler.generate_filelist_from_folder(Some(&folder), additive)?;
            for pair in handler.training_sets() {
                println!("{}\t{}", pair.satellite.display(), pair.labels.display());
            }
            println!("{found} pairs found");
            if save {
                let unsaved = handler.save_settings(&cwd).context("saving settings")?;
                if unsaved.contains(&"training_sets") {
                    log::warn!(
                        "Pairs not saved: add a \"training_sets\" key to \
                         settings/training_sets.json to store them"
                    );
                }
            }
        }
        Commands::Extract { out } => {
            if let Some(mask) = handler.settings.mask.clone() {
                handler
                    .activate_configured_mask()
                    .with_context(|| format!("resolving mask {mask}"))?;
            }
            let (vectors, labels) = handler.create_training_set(None, None)?;
            handler.save_training_set(&vectors, &labels, &out)?;
            println!(
                "Wrote {} vectors of length {} to {}",
                vectors.nrows(),
                vectors.ncols(),
                out.display()
            );
        }
        Commands::TestVectors { file, out, hour } => {
            if handler.settings.mask.is_some() {
                handler.activate_configured_mask()?;
            }
            let (vectors, indices) = handler
                .create_test_vectors(&file, hour)
                .with_context(|| format!("extracting test vectors from {}", file.display()))?;
            let placeholder = Array1::from_elem(vectors.nrows(), f64::NAN);
            handler.save_training_set(&vectors, &placeholder, &out)?;
            let index_path = indices_path(&out);
            let json = serde_json::to_string(indices.axes())?;
            fs::write(&index_path, json)
                .with_context(|| format!("writing {}", index_path.display()))?;
            println!(
                "Wrote {} test vectors to {} (indices in {})",
                vectors.nrows(),
                out.display(),
                index_path.display()
            );
        }
        Commands::Rehydrate {
            labels,
            indices,
            out,
            reference,
        } => {
            let (_, predicted) = handler.load_training_set(&labels)?;
            let text = fs::read_to_string(&indices)
                .with_context(|| format!("reading {}", indices.display()))?;
            let indices = SpatialIndexSet::new(serde_json::from_str(&text)?)?;
            handler.make_xr_data(predicted.view(), &indices, reference.as_deref(), Some(&out))?;
            println!("Wrote {} labels to {}", predicted.len(), out.display());
        }
        Commands::Detect { file, hour } => {
            let dataset = read_grid(&file)?;
            let channel = &handler.settings.cloudtype_channel;
            let values: Array1<f64> = dataset.at_hour(channel, hour)?.iter().copied().collect();
            let Some(standard) = labels::detect(values.view()) else {
                println!("{}: undetermined", file.display());
                return Ok(());
            };
            println!("{}: {standard}", file.display());

            let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
            for &v in values.iter().filter(|v| !v.is_nan()) {
                *counts.entry(v as i64).or_default() += 1;
            }
            for (code, count) in counts {
                let name = labels::describe(code, standard).unwrap_or("unknown");
                println!("{code:>4}  {name:<40} {count}");
            }
        }
        Commands::Masks { file } => {
            for name in list_masks(&file)? {
                println!("{name}");
            }
        }
    }

    Ok(())
}

fn indices_path(out: &Path) -> PathBuf {
    let mut name = out.as_os_str().to_os_string();
    name.push(".indices.json");
    PathBuf::from(name)
}
