use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan",
    version,
    about = "hipfold - Folds a polymer chain from noisy inter-residue distance restraints by hierarchic inertial projection, then removes secondary-structure tangles.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output and progress bars
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Project a distance matrix into coordinates and eliminate tangles.
    Fold(FoldArgs),
    /// Print the cluster layout that `fold` would use.
    Clusters(ClustersArgs),
}

/// Arguments for the `fold` subcommand.
#[derive(Args, Debug)]
pub struct FoldArgs {
    // --- Core Arguments ---
    /// CSV file holding the symmetric restraint matrix, one row per line.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path for the output coordinate CSV.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Optional configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Treat the input as plain distances and square them on load.
    #[arg(long)]
    pub plain_distances: bool,

    #[command(flatten)]
    pub overrides: Overrides,

    // --- Output Overrides ---
    /// Override the dimension of the written coordinates.
    #[arg(short = 'd', long, value_name = "INT")]
    pub target_dimension: Option<usize>,

    /// Override `output.refresh-ideal-segments`: overwrite restraints inside
    /// helices and strands with ideal geometry before projecting.
    #[arg(long)]
    pub refresh_ideal: bool,

    /// Override the number of decimals written per coordinate.
    #[arg(long, value_name = "INT")]
    pub precision: Option<usize>,
}

/// Arguments for the `clusters` subcommand.
#[derive(Args, Debug)]
pub struct ClustersArgs {
    /// Number of chain positions (matrix rows).
    #[arg(short = 'n', long, value_name = "INT", required_unless_present = "input")]
    pub length: Option<usize>,

    /// Take the number of positions from this restraint matrix instead.
    #[arg(short, long, value_name = "PATH", conflicts_with = "length")]
    pub input: Option<PathBuf>,

    /// Optional configuration file providing segments and the cluster count.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the number of generated meshing clusters (0 picks one from
    /// the chain length).
    #[arg(short = 'k', long, value_name = "INT")]
    pub cluster_count: Option<usize>,
}

/// Projection and tangle overrides shared with the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    // --- Projection Overrides ---
    /// Override the eigenvalue fraction an embedding must explain.
    #[arg(short = 'e', long, value_name = "FLOAT")]
    pub evfract: Option<f64>,

    /// Override the preferred embedding dimension.
    #[arg(short = 'p', long, value_name = "INT")]
    pub prior_dimension: Option<usize>,

    /// Override the number of generated meshing clusters (0 picks one from
    /// the chain length). Ignored when segments are configured.
    #[arg(short = 'k', long, value_name = "INT")]
    pub cluster_count: Option<usize>,

    /// Override the seed of the partial eigen-solver.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    // --- Tangle Overrides ---
    /// Override the separation step of tangle elimination.
    #[arg(short = 's', long, value_name = "FLOAT")]
    pub step: Option<f64>,

    /// Override the maximum number of tangle elimination rounds.
    #[arg(long, value_name = "INT")]
    pub max_iterations: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fold_arguments_parse_with_overrides() {
        let cli = Cli::try_parse_from([
            "hipfold", "-vv", "fold", "-i", "d.csv", "-o", "out.csv", "--plain-distances", "-e",
            "0.8", "--max-iterations", "4", "-d", "2",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Fold(args) = cli.command else {
            panic!("expected the fold command");
        };
        assert!(args.plain_distances);
        assert_eq!(args.overrides.evfract, Some(0.8));
        assert_eq!(args.overrides.max_iterations, Some(4));
        assert_eq!(args.target_dimension, Some(2));
        assert!(args.config.is_none());
    }

    #[test]
    fn clusters_needs_a_length_or_an_input() {
        assert!(Cli::try_parse_from(["hipfold", "clusters"]).is_err());
        assert!(Cli::try_parse_from(["hipfold", "clusters", "-n", "30"]).is_ok());
        assert!(Cli::try_parse_from(["hipfold", "clusters", "-n", "30", "-i", "d.csv"]).is_err());
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["hipfold", "-q", "-v", "clusters", "-n", "5"]).is_err());
    }
}
