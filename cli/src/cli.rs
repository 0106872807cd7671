use std::path::PathBuf;

/// Area-weighted neighborhood indicators from a territorial grid
#[derive(clap::Parser, Debug)]
#[command(name = "quartier", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Aggregate grid variables over a drawn neighborhood
    Aggregate(AggregateArgs),

    /// List the variables of a grid or the columns of an override dataset
    Inspect(InspectArgs),
}

#[derive(clap::Args, Debug)]
pub struct AggregateArgs {
    /// Drawing as GeoJSON (EPSG:4326 unless it declares a CRS)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub drawing: PathBuf,

    /// JSON run configuration (grid, variables, overrides)
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Grid dataset path or URL; overrides the configured grid
    #[arg(short, long)]
    pub grid: Option<String>,

    /// EPSG code of the grid, when the dataset does not declare one
    #[arg(long)]
    pub epsg: Option<u32>,

    /// Replace a variable by a dataset column, as VARIABLE=PATH:COLUMN
    #[arg(long = "override", value_name = "VARIABLE=PATH:COLUMN")]
    pub overrides: Vec<String>,

    /// Output CSV file, defaults to stdout
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Add a column with variable labels
    #[arg(long)]
    pub labels: bool,
}

#[derive(clap::Args, Debug)]
pub struct InspectArgs {
    /// Dataset path or URL
    pub source: String,

    /// EPSG code of the dataset, when it does not declare one
    #[arg(long)]
    pub epsg: Option<u32>,
}
