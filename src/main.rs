extern crate recf;

use clap::Parser;
use recf::catalog::InMemoryCatalog;
use recf::config::RunConfig;
use recf::core::power_curve::PowerCurveTable;
use recf::core::solar_angles::InMemorySolarAngles;
use recf::core::weather::NearestGridResolver;
use recf::output::FileOutput;
use recf::run_project;
use recf::storage::InMemoryResultStore;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct RecfArgs {
    /// JSON run configuration.
    config_file: String,
    /// Unit catalog dump; defaults to <input_path>/units.json.
    #[arg(long)]
    units_file: Option<PathBuf>,
    /// Turbine power curves; defaults to <input_path>/power_curves.csv.
    #[arg(long)]
    power_curve_file: Option<PathBuf>,
    /// Precomputed solar angles; defaults to <input_path>/solar_angles.csv.
    #[arg(long)]
    solar_angle_file: Option<PathBuf>,
    /// Known weather grid points; defaults to <input_path>/grid_points.csv.
    #[arg(long)]
    grid_point_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let args = RecfArgs::parse();
    let config = RunConfig::from_reader(BufReader::new(File::open(&args.config_file)?))?;

    let units_file = args
        .units_file
        .unwrap_or_else(|| config.input_path.join("units.json"));
    let catalog = InMemoryCatalog::from_json(BufReader::new(File::open(units_file)?))?;

    // the curve and angle tables are only read when their technology runs
    let power_curves = if config.wind.enabled {
        let path = args
            .power_curve_file
            .unwrap_or_else(|| config.input_path.join("power_curves.csv"));
        PowerCurveTable::from_csv(BufReader::new(File::open(path)?))?
    } else {
        PowerCurveTable::default()
    };
    let solar_angles = if config.solar.enabled {
        let path = args
            .solar_angle_file
            .unwrap_or_else(|| config.input_path.join("solar_angles.csv"));
        InMemorySolarAngles::from_csv(BufReader::new(File::open(path)?))?
    } else {
        InMemorySolarAngles::default()
    };

    let grid_point_file = args
        .grid_point_file
        .unwrap_or_else(|| config.input_path.join("grid_points.csv"));
    let resolver = match File::open(&grid_point_file) {
        Ok(file) => NearestGridResolver::from_csv(BufReader::new(file))?,
        // without a grid list only pre-assigned grid points can be used;
        // units needing nearest-point resolution become placeholders
        Err(_) => NearestGridResolver::default(),
    };

    let store = Arc::new(InMemoryResultStore::new());
    let output = FileOutput::new(config.output_path.clone(), "{}.csv".to_owned());

    run_project(
        &config,
        &catalog,
        &resolver,
        Arc::new(solar_angles),
        Arc::new(power_curves),
        store,
        &output,
    )
}
