use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "rezip")]
#[command(version)]
#[command(about = "Create, inspect and rewrite ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  rezip create out.zip src README.md      archive a directory and a file\n  \
  rezip extract out.zip -d build 'src/'   extract one directory into build\n  \
  rezip delete out.zip --regex '\\.tmp$'   drop temporary files\n  \
  rezip extract -p out.zip notes.txt | more")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count, global = true)]
    pub quiet: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new archive, replacing any existing file
    Create {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Files and directories to add
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        pack: PackArgs,
    },

    /// Append files to an archive, creating it if needed
    Add {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Files and directories to add
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        pack: PackArgs,
    },

    /// List archive contents
    #[command(alias = "l")]
    List {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// List verbosely
        #[arg(short = 'v')]
        verbose: bool,
    },

    /// Extract files from an archive
    #[command(alias = "x")]
    Extract(ExtractArgs),

    /// Remove entries from an archive
    Delete {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        #[command(flatten)]
        select: SelectArgs,
    },

    /// Append every entry of OTHER to ARCHIVE
    Merge {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        #[arg(value_name = "OTHER")]
        other: PathBuf,
    },

    /// Copy an archive byte for byte
    Duplicate {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        #[arg(value_name = "TARGET")]
        target: PathBuf,
    },

    /// Show entry count and comment
    Info {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,
    },
}

/// Options shared by `create` and `add`.
#[derive(Args, Debug)]
pub struct PackArgs {
    /// Store files without compression
    #[arg(short = '0', long = "store")]
    pub store_only: bool,

    /// Junk paths (store file names only)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Strip this leading directory from stored names
    #[arg(long, value_name = "DIR")]
    pub remove_path: Option<String>,

    /// Prefix stored names with this directory
    #[arg(long, value_name = "DIR")]
    pub add_path: Option<String>,

    /// Set the archive comment
    #[arg(short = 'z', long, value_name = "TEXT")]
    pub comment: Option<String>,
}

/// Entry selection for `extract` and `delete`. Without any, every entry is selected.
#[derive(Args, Debug)]
pub struct SelectArgs {
    /// Entry names; a trailing '/' selects a whole directory
    #[arg(value_name = "NAMES")]
    pub names: Vec<String>,

    /// Select entries whose name matches a regular expression
    #[arg(long, value_name = "PATTERN", conflicts_with_all = ["names", "index"])]
    pub regex: Option<String>,

    /// Select entries by index, e.g. 0-2,5,7-
    #[arg(long, value_name = "RANGES", conflicts_with = "names")]
    pub index: Option<String>,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    #[command(flatten)]
    pub select: SelectArgs,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<PathBuf>,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Never overwrite existing files
    #[arg(short = 'n', conflicts_with = "overwrite")]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Strip this leading directory from extracted names
    #[arg(long, value_name = "DIR")]
    pub remove_path: Option<String>,

    /// Extract under this extra directory
    #[arg(long, value_name = "DIR")]
    pub add_path: Option<String>,

    /// Fail on the first entry that cannot be extracted
    #[arg(long)]
    pub strict: bool,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || matches!(&self.command, Command::Extract(args) if args.pipe)
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }
}
