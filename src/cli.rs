//! CLI argument parsing using clap 4.x derive macros

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Manage and apply prompt templates for natural-language datasets
///
/// Templates live in a YAML store, one document per dataset (or per
/// dataset/subset). Each template renders a structured record into a
/// prompt/target pair for training or evaluation.
#[derive(Parser, Debug)]
#[command(name = "promptstore")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Root directory of the template store (defaults to ./templates)
    #[arg(long, global = true)]
    pub store_root: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Per-dataset template counts across the whole store
    Counts,

    /// List template names for one dataset
    List {
        /// Dataset name
        dataset: String,

        /// Subset (configuration) name
        #[arg(short, long)]
        subset: Option<String>,
    },

    /// Show a single template
    Show {
        /// Dataset name
        dataset: String,

        /// Template name
        name: String,

        /// Subset (configuration) name
        #[arg(short, long)]
        subset: Option<String>,
    },

    /// Render a template against a JSON record
    Apply {
        /// Dataset name
        dataset: String,

        /// Template name
        name: String,

        /// Path to a JSON object file (field name -> value)
        #[arg(short, long)]
        example: PathBuf,

        /// Subset (configuration) name
        #[arg(short, long)]
        subset: Option<String>,

        /// Disable per-variable truncation
        #[arg(long)]
        no_truncate: bool,

        /// Wrap substituted variables in highlight markup
        #[arg(long)]
        highlight: bool,
    },

    /// Statically validate a dataset's templates against a record schema
    Validate {
        /// Dataset name
        dataset: String,

        /// Subset (configuration) name
        #[arg(short, long)]
        subset: Option<String>,

        /// Known record field names (repeatable)
        #[arg(short = 'f', long = "field")]
        fields: Vec<String>,
    },

    /// Emit per-template summaries for mixture registration as JSON
    Summaries,
}
