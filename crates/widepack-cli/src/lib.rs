//! widepack - package index builder for Wyde distribution trees
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Scans a build output folder, records its files as one `Package` in a
//! cumulative `<WideIndex>` document and optionally stages them into a
//! deployment tree.
//!
//! ```text
//! widepack <ROOT> <INDEX> <PRODUCT> <VERSION> <DESCRIPTION> <UNIQUE_ID> [DESTINATION]
//! ```

pub mod report;

use std::path::PathBuf;

use clap::Parser;
use widepack_core::{PackRequest, PackagerConfig, PathCase};

/// Command line of the `widepack` binary.
#[derive(Debug, Parser)]
#[command(name = "widepack")]
#[command(author, version, about = "widepack - package index builder for Wyde distribution trees")]
pub struct Cli {
    /// Distribution tree to package
    pub root_folder: PathBuf,

    /// Index document to create or append to
    pub output_index_file: PathBuf,

    /// Product name
    pub product: String,

    /// Product version
    #[arg(value_name = "VERSION")]
    pub product_version: String,

    /// Package description
    pub description: String,

    /// Unique package id (lower-cased, spaces become hyphens)
    pub unique_id: String,

    /// Copy every classified file to <DEPLOY_DESTINATION>/<id>/
    pub deploy_destination: Option<PathBuf>,

    /// Show what would happen without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Fail on the first binary that cannot be introspected
    #[arg(long, env = "WIDEPACK_STRICT")]
    pub strict: bool,

    /// Compare the root prefix and file names case-insensitively
    #[arg(long, env = "WIDEPACK_CASE_INSENSITIVE_PATHS")]
    pub case_insensitive_paths: bool,

    /// Also copy the index document into the deployment root
    #[arg(long, requires = "deploy_destination")]
    pub publish_index: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Debug logging (when RUST_LOG is not set)
    #[arg(short, long)]
    pub verbose: bool,
}

/// Positional arguments the tool accepts: six required, one optional.
pub const POSITIONAL_ARGS: std::ops::RangeInclusive<usize> = 6..=7;

/// Count the positional arguments of a raw command line (program name
/// excluded). Every flag is a switch, so anything not starting with `-` is
/// positional, as is everything after `--`.
pub fn positional_count<S: AsRef<str>>(args: &[S]) -> usize {
    let mut count = 0;
    let mut rest_positional = false;
    for arg in args.iter().skip(1).map(AsRef::as_ref) {
        if rest_positional {
            count += 1;
        } else if arg == "--" {
            rest_positional = true;
        } else if !arg.starts_with('-') || arg == "-" {
            count += 1;
        }
    }
    count
}

impl Cli {
    /// Run switches from the flags.
    pub fn config(&self) -> PackagerConfig {
        PackagerConfig {
            path_case: if self.case_insensitive_paths {
                PathCase::Insensitive
            } else {
                PathCase::Sensitive
            },
            strict: self.strict,
            dry_run: self.dry_run,
            publish_index: self.publish_index,
        }
    }

    /// Run inputs from the positional arguments.
    pub fn request(&self) -> PackRequest {
        PackRequest {
            root: self.root_folder.clone(),
            index: self.output_index_file.clone(),
            product: self.product.clone(),
            version: self.product_version.clone(),
            description: self.description.clone(),
            unique_id: self.unique_id.clone(),
            destination: self.deploy_destination.clone(),
        }
    }
}
