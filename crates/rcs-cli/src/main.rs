//! # rcs
//!
//! Command-line access to `.rcs` character sheet archives.
//!
//! ```bash
//! # Summarize a sheet
//! rcs info sheet.rcs
//!
//! # Generate the QML description (stdout unless -o is given)
//! rcs generate sheet.rcs -o sheet.qml --flickable --scale 1.5
//!
//! # Report structural warnings
//! rcs check sheet.rcs
//!
//! # Renumber every field field_1..field_n
//! rcs reset-ids sheet.rcs
//!
//! # Set a field property (true/false, numbers and "quoted text" are typed)
//! rcs set sheet.rcs field_3 label "Hit points"
//! ```

use clap::{Parser, Subcommand};
use rcs_core::keys::parse_literal;
use rcs_core::{Diagnostic, FieldId, FieldKind, SheetArchive, SheetError, Severity, generate};
use rcs_editor::Editor;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// rcs - character sheet archive tool
#[derive(Parser, Debug)]
#[command(name = "rcs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Summarize pages, fields, images and characters
    Info {
        /// Sheet archive
        file: PathBuf,
    },

    /// Generate the QML description of a sheet
    Generate {
        /// Sheet archive
        file: PathBuf,

        /// Write to FILE instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Scrollable sheet with a fixed scale
        #[arg(long)]
        flickable: bool,

        /// Scale used by flickable sheets (defaults to the archive's)
        #[arg(long)]
        scale: Option<f64>,
    },

    /// Report warnings; exits non-zero when any are found
    Check {
        /// Sheet archive
        file: PathBuf,
    },

    /// Renumber every field field_1..field_n in tree order
    ResetIds {
        /// Sheet archive
        file: PathBuf,

        /// Save to FILE instead of overwriting the input
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Set one property of a field
    Set {
        /// Sheet archive
        file: PathBuf,
        /// Field id
        field: String,
        /// Property key (e.g. label, fontSize, checked)
        key: String,
        /// New value
        value: String,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode, SheetError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { file } => {
            let (archive, diags) = SheetArchive::load(&file)?;
            print_info(&archive);
            report(&diags);
        }
        Commands::Generate {
            file,
            output,
            flickable,
            scale,
        } => {
            let (archive, _) = SheetArchive::load(&file)?;
            let mut options = archive.options.clone();
            options.flickable |= flickable;
            if let Some(scale) = scale {
                options.fixed_scale = scale;
            }
            let generation = generate(&archive.context, &options);
            report(&generation.warnings);
            match output {
                Some(path) => {
                    fs::write(&path, &generation.code)?;
                    log::info!("wrote {}", path.display());
                }
                None => print!("{}", generation.code),
            }
        }
        Commands::Check { file } => {
            let (_, diags) = SheetArchive::load(&file)?;
            report(&diags);
            if diags.iter().any(|d| d.severity == Severity::Warning) {
                return Ok(ExitCode::FAILURE);
            }
            println!("{}: ok", file.display());
        }
        Commands::ResetIds { file, output } => {
            let mut editor = open(&file)?;
            let pairs = editor.reset_all_ids()?;
            for (old, new) in &pairs {
                println!("{old} -> {new}");
            }
            let written = editor.save_as(output.as_deref().unwrap_or(file.as_path()))?;
            report(editor.warnings());
            println!("renamed {} field(s), saved {}", pairs.len(), written.display());
        }
        Commands::Set {
            file,
            field,
            key,
            value,
        } => {
            let mut editor = open(&file)?;
            let id = FieldId::intern(&field);
            editor.set_property(id, &key, parse_literal(&value))?;
            let written = editor.save_as(&file)?;
            println!("{field}.{key} = {value} ({})", written.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn open(path: &Path) -> Result<Editor, SheetError> {
    let mut editor = Editor::new();
    editor.open(path)?;
    report(editor.warnings());
    Ok(editor)
}

fn print_info(archive: &SheetArchive) {
    let ctx = &archive.context;
    println!("pages: {}", ctx.pages().len());
    for (i, page) in ctx.pages().iter().enumerate() {
        let size = page
            .background
            .as_deref()
            .and_then(|k| ctx.images().get(k))
            .and_then(|e| e.size)
            .map(|(w, h)| format!("{w}x{h}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  page {i}: {} field(s), background {size}",
            ctx.tree().fields_on_page(i).len()
        );
    }
    println!("fields: {}", ctx.tree().len());
    for kind in FieldKind::ALL {
        let count = ctx.tree().fields_of_kind(kind).len();
        if count > 0 {
            println!("  {kind}: {count}");
        }
    }
    println!("images: {}", ctx.images().len());
    println!("characters: {}", ctx.characters().len());
    println!("fonts: {}", archive.fonts.len());
    if !archive.passthrough.is_empty() {
        let keys: Vec<_> = archive.passthrough.keys().map(String::as_str).collect();
        println!("other keys: {}", keys.join(", "));
    }
}

fn report(diags: &[Diagnostic]) {
    for diag in diags {
        eprintln!("{diag}");
    }
}
