use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use trident_core::prepare::PrepareTargets;
use trident_core::types::StoreKind;

#[derive(Parser, Debug)]
#[command(
    name = "trident",
    version,
    about = "Prepare a Yelp-shaped dataset and compare MongoDB, Neo4j and Redis over it"
)]
pub struct Cli {
    #[arg(short, long, value_name = "FILE", global = true, help = "YAML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'o',
        long = "override",
        value_name = "KEY=VALUE",
        action = ArgAction::Append,
        global = true,
        help = "Override a configuration value by dotted path, e.g. mongo.database=yelp"
    )]
    pub overrides: Vec<String>,

    #[arg(short, long, global = true, help = "Log at debug level")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Prepare, import, query and report")]
    Run {
        #[arg(long, value_enum, default_value_t = Mode::All)]
        mode: Mode,

        #[arg(long, help = "Write the report even when a single store is selected")]
        report: bool,

        #[arg(long, help = "Use generated records instead of the input directory")]
        synthetic: bool,

        #[arg(long, value_name = "DIR", help = "Directory with business.json, user.json and review.json")]
        input: Option<PathBuf>,

        #[arg(long, value_name = "DIR", help = "Directory for the bulk-import files")]
        output: Option<PathBuf>,
    },

    #[command(about = "Write bulk-import files without touching any database")]
    Prepare {
        #[arg(long, value_enum, default_value_t = PrepareTarget::All)]
        target: PrepareTarget,

        #[arg(long)]
        synthetic: bool,

        #[arg(long, value_name = "DIR")]
        input: Option<PathBuf>,

        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    #[command(about = "Write a deterministic synthetic raw dataset as JSON lines")]
    Generate {
        #[arg(long)]
        businesses: Option<usize>,

        #[arg(long)]
        users: Option<usize>,

        #[arg(long)]
        reviews: Option<usize>,

        #[arg(long, value_name = "DIR", help = "Defaults to the configured input directory")]
        output: Option<PathBuf>,
    },
}

/// Stores included in a run.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    All,
    Mongo,
    Neo4j,
    Redis,
}

impl Mode {
    /// Selected stores in processing order.
    pub fn kinds(&self) -> Vec<StoreKind> {
        match self {
            Mode::All => vec![StoreKind::Document, StoreKind::Graph, StoreKind::KeyValue],
            Mode::Mongo => vec![StoreKind::Document],
            Mode::Neo4j => vec![StoreKind::Graph],
            Mode::Redis => vec![StoreKind::KeyValue],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::All => "all",
            Mode::Mongo => "mongo",
            Mode::Neo4j => "neo4j",
            Mode::Redis => "redis",
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareTarget {
    All,
    Mongo,
    Neo4j,
}

impl PrepareTarget {
    pub fn targets(&self) -> PrepareTargets {
        match self {
            PrepareTarget::All => PrepareTargets::all(),
            PrepareTarget::Mongo => PrepareTargets {
                documents: true,
                graph: false,
            },
            PrepareTarget::Neo4j => PrepareTargets {
                documents: false,
                graph: true,
            },
        }
    }
}
