use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "regtest")]
#[command(about = "Regression tests for HPC clusters: dispatch checks and judge their output")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Site configuration overlay (YAML)
    #[arg(long, global = true)]
    pub site_config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dispatch a check directory to the test runner
    Run(RunArgs),

    /// Judge the captured output of one check
    Check(CheckArgs),

    /// Judge every check of a directory from its stage directories
    Report(ReportArgs),

    /// Inspect the check tables
    #[command(subcommand)]
    Checks(ChecksCommands),

    /// Inspect the site configuration
    #[command(subcommand)]
    Site(SiteCommands),

    /// Download a benchmark archive into the source cache
    Fetch {
        /// Benchmark name, e.g. IOR or osu-micro-benchmarks
        benchmark: String,

        /// Source cache root (default: $REFRAME_SOURCEPATH or the user cache)
        #[arg(long)]
        source_path: Option<PathBuf>,

        /// Output format (json, yaml, or pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },

    /// Probes that run inside a job step
    #[command(subcommand)]
    Probe(ProbeCommands),
}

#[derive(Args)]
#[command(after_help = "\
options -c/--checkpath and -n/--name are passed to the runner unchanged
options --system and --partitions set --system and --setvar valid_systems=
option --valid-prog-environs sets --setvar valid_prog_environs=

arguments after -- are passed directly to the runner")]
pub struct RunArgs {
    /// Test directory or script, relative to the checks root
    #[arg(short, long)]
    pub checkpath: String,

    /// Check name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Run tests in the given cluster
    #[arg(long, default_value = "hydra", value_parser = ["hydra", "chimera", "manticore", "local"])]
    pub system: String,

    /// Comma-separated list of partitions
    #[arg(long, value_delimiter = ',')]
    pub partitions: Vec<String>,

    /// Comma-separated list of programming environments
    #[arg(long, alias = "valid_prog_environs", value_delimiter = ',')]
    pub valid_prog_environs: Vec<String>,

    /// Print the runner command without executing it
    #[arg(long)]
    pub dry_run: bool,

    /// Extra runner arguments
    #[arg(last = true)]
    pub passthrough: Vec<String>,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Check name, e.g. iorWriteTest
    pub name: String,

    /// Stage directory holding rfm_job.out, rfm_job.err and produced files
    #[arg(long, conflicts_with_all = ["stdout", "stderr"])]
    pub stagedir: Option<PathBuf>,

    /// Captured standard output
    #[arg(long, requires = "stderr")]
    pub stdout: Option<PathBuf>,

    /// Captured standard error
    #[arg(long, requires = "stdout")]
    pub stderr: Option<PathBuf>,

    /// Produced file as NAME=PATH, repeatable
    #[arg(long = "file")]
    pub files: Vec<String>,

    /// Exit status of the run
    #[arg(long)]
    pub exit_status: Option<i32>,

    /// System the check ran on
    #[arg(long, default_value = "hydra")]
    pub system: String,

    /// Variable assignment [Class.]key=value, repeatable
    #[arg(long)]
    pub setvar: Vec<String>,

    /// Append extracted metrics to perf logs under this directory
    #[arg(long, requires_all = ["partition", "environ"])]
    pub perflog: Option<PathBuf>,

    /// Partition the check ran on
    #[arg(long)]
    pub partition: Option<String>,

    /// Programming environment the check ran with
    #[arg(long)]
    pub environ: Option<String>,

    /// Scheduler job id
    #[arg(long, default_value = "")]
    pub jobid: String,

    /// Output format (json, yaml, or pretty)
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

#[derive(Args)]
pub struct ReportArgs {
    /// Test directory or script
    #[arg(short, long)]
    pub checkpath: String,

    /// Directory holding one stage directory per check
    #[arg(long)]
    pub stage_root: PathBuf,

    /// System the checks ran on
    #[arg(long, default_value = "hydra")]
    pub system: String,

    /// Output format (json, yaml, or pretty)
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

#[derive(Subcommand)]
pub enum ChecksCommands {
    /// List checks, optionally under one check path
    List {
        /// Test directory or script
        #[arg(short, long)]
        checkpath: Option<String>,

        /// System the tables are built for
        #[arg(long, default_value = "hydra")]
        system: String,

        /// Output format (json, yaml, or pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },
    /// Show one check after variable assignments
    Show {
        /// Check name
        name: String,

        /// System the tables are built for
        #[arg(long, default_value = "hydra")]
        system: String,

        /// Partition, to render its resource options
        #[arg(long)]
        partition: Option<String>,

        /// Programming environment, for build options
        #[arg(long, default_value = "builtin")]
        environ: String,

        /// Variable assignment [Class.]key=value, repeatable
        #[arg(long)]
        setvar: Vec<String>,

        /// Source cache root (default: $REFRAME_SOURCEPATH or the user cache)
        #[arg(long)]
        source_path: Option<PathBuf>,

        /// Stage root, to resolve programs built by a build check
        #[arg(long)]
        stage_root: Option<PathBuf>,

        /// Output format (json, yaml, or pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum SiteCommands {
    /// List systems
    Systems {
        /// Output format (json, yaml, or pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },
    /// List the partitions of a system
    Partitions {
        system: String,

        /// Output format (json, yaml, or pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },
    /// List programming environments
    Environs {
        /// Output format (json, yaml, or pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },
    /// Find the system a host belongs to
    Detect {
        /// Host name (default: this host)
        hostname: Option<String>,

        /// Output format (json, yaml, or pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum ProbeCommands {
    /// Record this task's CPU affinity as affinity<task>_<node>.json
    Affinity {
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,

        /// Seconds to hold the CPUs afterwards
        #[arg(long, default_value = "20")]
        hold: u64,
    },
    /// Record allocated CPUs and per-GPU CPU affinity as gpu_binding.json
    GpuBinding {
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Print True when the Java heap follows the job memory limit
    JavaMemory,
}
