//! Main entry point for the rezip CLI application.
//!
//! Each subcommand maps onto one archive operation and prints unzip-style
//! progress lines for the entries it processed.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use clap::Parser;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};

use rezip::cli::{Command, ExtractArgs, PackArgs, SelectArgs};
use rezip::{
    ArchiveStatus, Cli, CommentRule, Entry, EntryStatus, IndexRange, OptionSet, Overwrite, Source,
    ZipArchive,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Create {
            archive,
            files,
            pack,
        } => pack_files(&cli, archive, files, pack, false),
        Command::Add {
            archive,
            files,
            pack,
        } => pack_files(&cli, archive, files, pack, true),
        Command::List { archive, verbose } => list_files(archive, *verbose),
        Command::Extract(args) => extract_files(&cli, args),
        Command::Delete { archive, select } => delete_files(&cli, archive, select),
        Command::Merge { archive, other } => {
            ZipArchive::new(archive)
                .merge(&ZipArchive::new(other))
                .with_context(|| format!("cannot merge {} into {}", other.display(), archive.display()))?;
            if !cli.is_quiet() {
                println!("merged {} into {}", other.display(), archive.display());
            }
            Ok(())
        }
        Command::Duplicate { archive, target } => {
            ZipArchive::new(archive)
                .duplicate(target)
                .with_context(|| format!("cannot copy {}", archive.display()))?;
            Ok(())
        }
        Command::Info { archive } => show_info(archive),
    }
}

/// Print the outcome of one entry and return whether it failed.
fn report(cli: &Cli, verb: &str, entry: &Entry) -> bool {
    match entry.status {
        EntryStatus::Ok => {
            if !cli.is_quiet() {
                println!("{:>12}: {}", verb, entry.stored_filename);
            }
            false
        }
        status => {
            if !cli.is_very_quiet() {
                eprintln!("Skipping: {} ({})", entry.stored_filename, status);
            }
            status.is_error()
        }
    }
}

/// Build an archive from `files`, or append them when `append` is set.
fn pack_files(cli: &Cli, archive: &Path, files: &[PathBuf], pack: &PackArgs, append: bool) -> Result<()> {
    let mut options = OptionSet::new()
        .store_only(pack.store_only)
        .remove_all_path(pack.junk_paths);
    if let Some(dir) = &pack.remove_path {
        options = options.remove_path(dir);
    }
    if let Some(dir) = &pack.add_path {
        options = options.add_path(dir);
    }
    if let Some(text) = &pack.comment {
        options = options.comment(CommentRule::Set(text.clone()));
    }

    let sources: Vec<Source> = files.iter().cloned().map(Source::from).collect();
    let zip = ZipArchive::new(archive);
    let entries = if append {
        zip.add(&sources, &options)
    } else {
        zip.create(&sources, &options)
    }
    .with_context(|| format!("cannot write {}", archive.display()))?;

    let failed = entries.iter().filter(|e| report(cli, "adding", e)).count();
    if failed > 0 {
        bail!("{} of {} files could not be added", failed, entries.len());
    }
    Ok(())
}

/// Percentage saved by compression, right-aligned for the listing.
fn ratio(uncompressed: u64, compressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// List files in the ZIP archive.
///
/// Supports two output formats:
/// - Simple format: just file names, one per line
/// - Verbose format (`-v`): table with size, compression ratio and timestamp
fn list_files(archive: &Path, verbose: bool) -> Result<()> {
    let entries = ZipArchive::new(archive)
        .list()
        .with_context(|| format!("cannot read {}", archive.display()))?;

    if !verbose {
        for entry in &entries {
            println!("{}", entry.stored_filename);
        }
        return Ok(());
    }

    println!(
        "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
        "Length", "Size", "Cmpr", "Date", "Time"
    );
    println!("{}", "-".repeat(70));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in &entries {
        let modified: DateTime<Local> = entry.modified.into();
        println!(
            "{:>10}  {:>10}  {}  {}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.uncompressed_size, entry.compressed_size),
            modified.format("%Y-%m-%d  %H:%M"),
            entry.stored_filename
        );

        // Directories don't count towards the totals
        if !entry.is_folder() {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {:>10}  {}  {:>17}  {} files",
        total_uncompressed,
        total_compressed,
        ratio(total_uncompressed, total_compressed),
        "",
        file_count
    );
    Ok(())
}

/// Apply name, regex or index selection to `options`.
fn select(options: OptionSet, select: &SelectArgs) -> Result<OptionSet> {
    if let Some(pattern) = &select.regex {
        let regex = Regex::new(pattern).with_context(|| format!("invalid pattern '{pattern}'"))?;
        return Ok(options.by_regex(regex));
    }
    if let Some(ranges) = &select.index {
        return Ok(options.by_index(IndexRange::parse_list(ranges)?));
    }
    if !select.names.is_empty() {
        return Ok(options.by_name(select.names.iter().cloned()));
    }
    Ok(options)
}

/// Extract files from the archive.
///
/// Handles various extraction options:
/// - Pipe mode (`-p`): write file contents to stdout
/// - Custom output directory (`-d`)
/// - Junk paths (`-j`): ignore directory structure in the archive
/// - Overwrite control (`-n`, `-o`)
fn extract_files(cli: &Cli, args: &ExtractArgs) -> Result<()> {
    let overwrite = if args.overwrite {
        Overwrite::Always
    } else if args.never_overwrite {
        Overwrite::Never
    } else {
        Overwrite::IfNotNewer
    };

    let mut options = OptionSet::new()
        .overwrite(overwrite)
        .remove_all_path(args.junk_paths)
        .strict(args.strict);
    if let Some(dir) = &args.remove_path {
        options = options.remove_path(dir);
    }
    if let Some(dir) = &args.add_path {
        options = options.add_path(dir);
    }
    let options = select(options, &args.select)?;

    let zip = ZipArchive::new(&args.archive);
    let context = || format!("cannot extract {}", args.archive.display());

    if args.pipe {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        zip.extract_to_writer(&mut out, &options).with_context(context)?;
        out.flush()?;
        return Ok(());
    }

    let dest = args.extract_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    if !cli.is_quiet() {
        println!("Archive:  {}", args.archive.display());
    }
    let entries = zip.extract(&dest, &options).with_context(context)?;

    let failed = entries
        .iter()
        .filter(|e| report(cli, if e.is_folder() { "creating" } else { "extracting" }, e))
        .count();
    if failed > 0 {
        bail!("{} of {} entries could not be extracted", failed, entries.len());
    }
    Ok(())
}

fn delete_files(cli: &Cli, archive: &Path, select_args: &SelectArgs) -> Result<()> {
    let options = select(OptionSet::new(), select_args)?;
    let removed = ZipArchive::new(archive)
        .delete(&options)
        .with_context(|| format!("cannot update {}", archive.display()))?;

    if !cli.is_quiet() {
        for entry in &removed {
            println!("{:>12}: {}", "deleting", entry.stored_filename);
        }
    }
    if removed.is_empty() && !cli.is_very_quiet() {
        eprintln!("nothing to delete in {}", archive.display());
    }
    Ok(())
}

fn show_info(archive: &Path) -> Result<()> {
    let props = ZipArchive::new(archive)
        .properties()
        .with_context(|| format!("cannot read {}", archive.display()))?;

    if props.status == ArchiveStatus::NotExist {
        bail!("{}: no such archive", archive.display());
    }
    println!("Archive:  {}", archive.display());
    println!("Entries:  {}", props.entry_count);
    if !props.comment.is_empty() {
        println!("Comment:  {}", props.comment);
    }
    Ok(())
}
