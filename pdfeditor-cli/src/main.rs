use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use pdfeditor_core::{DocumentLoader, FormFields, Rgba};
use pdfeditor_edit::StructureLoader;
use pdfeditor_render::PdfiumLoader;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

mod batch;
mod interactive;

#[derive(Debug, Parser)]
#[command(
    name = "pdfeditor",
    version,
    about = "Minimal PDF annotation tool for kitty-compatible terminals"
)]
struct Args {
    /// PDF to open instead of starting from a blank page
    file: Option<PathBuf>,

    #[command(flatten)]
    style: StyleArgs,

    /// Page renderer for the interactive viewer
    #[arg(long, value_enum, default_value_t = ViewerChoice::Auto)]
    viewer: ViewerChoice,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Debug, Clone, Default, clap::Args)]
struct StyleArgs {
    /// Form field assignment such as `size=20` or `text=Hello`; repeatable
    #[arg(long = "field", value_name = "KEY=VALUE")]
    fields: Vec<String>,

    /// TOML file with form field values, applied before any --field
    #[arg(long = "fields", value_name = "FILE")]
    field_file: Option<PathBuf>,

    /// Text color: #rgb, #rrggbb, #rrggbbaa, r,g,b[,a] or a color name
    #[arg(long)]
    color: Option<Rgba>,
}

impl StyleArgs {
    fn apply(&self, fields: &mut FormFields) -> Result<()> {
        if let Some(path) = &self.field_file {
            fields
                .load_toml(path)
                .with_context(|| format!("failed to read form fields from {path:?}"))?;
        }
        for assignment in &self.fields {
            fields
                .apply_assignment(assignment)
                .with_context(|| format!("bad --field {assignment:?}"))?;
        }
        Ok(())
    }
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Write a blank single-page document
    New {
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Draw the form-field text onto a document and save the result
    Annotate {
        /// Document to start from; a blank page when omitted
        #[arg(long, short)]
        input: Option<PathBuf>,

        #[arg(long, short)]
        output: PathBuf,

        #[command(flatten)]
        style: StyleArgs,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ViewerChoice {
    /// Pdfium when it can be bound, otherwise page outlines only
    Auto,
    Pdfium,
    Structure,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let batch_mode = args.command.is_some();
    let _log_guard = init_logging(batch_mode)?;

    match args.command {
        Some(Mode::New { output }) => batch::new_document(&output),
        Some(Mode::Annotate {
            input,
            output,
            style,
        }) => batch::annotate(input.as_deref(), &output, &style),
        None => {
            let loader = select_loader(args.viewer)?;
            interactive::run(loader, args.file.as_deref(), &args.style)
        }
    }
}

fn select_loader(choice: ViewerChoice) -> Result<Box<dyn DocumentLoader>> {
    match choice {
        ViewerChoice::Structure => Ok(Box::new(StructureLoader)),
        ViewerChoice::Pdfium => {
            let loader = PdfiumLoader::new().context("Pdfium viewer requested but unavailable")?;
            Ok(Box::new(loader))
        }
        ViewerChoice::Auto => match PdfiumLoader::new() {
            Ok(loader) => Ok(Box::new(loader)),
            Err(err) => {
                warn!(%err, "Pdfium unavailable, showing page outlines only");
                Ok(Box::new(StructureLoader))
            }
        },
    }
}

fn log_dir() -> PathBuf {
    match ProjectDirs::from("org", "pdfeditor", "pdfeditor") {
        Some(dirs) => dirs.data_local_dir().join("logs"),
        None => env::temp_dir().join("pdfeditor-logs"),
    }
}

/// File logging always; batch runs also log to stderr.
fn init_logging(batch_mode: bool) -> Result<WorkerGuard> {
    let mut dir = log_dir();
    if let Err(err) = fs::create_dir_all(&dir) {
        let fallback = env::temp_dir().join("pdfeditor-logs");
        fs::create_dir_all(&fallback)
            .with_context(|| format!("failed to create log directory {dir:?}: {err}"))?;
        dir = fallback;
    }

    let file_appender = tracing_appender::rolling::never(&dir, "pdfeditor.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let console_layer = batch_mode.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    info!(log_dir = %dir.display(), "logging initialised");
    Ok(guard)
}

/// Appends `.pdf` to paths typed without an extension.
fn with_pdf_extension(path: &Path) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension("pdf")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn arguments_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_annotate_with_fields() {
        let args = Args::try_parse_from([
            "pdfeditor",
            "annotate",
            "--output",
            "out.pdf",
            "--field",
            "text=Hi",
            "--field",
            "page=2",
            "--color",
            "#ff000080",
        ])
        .unwrap();
        match args.command {
            Some(Mode::Annotate {
                input,
                output,
                style,
            }) => {
                assert!(input.is_none());
                assert_eq!(output, PathBuf::from("out.pdf"));
                assert_eq!(style.fields, vec!["text=Hi", "page=2"]);
                assert_eq!(style.color, Some(Rgba::new(255, 0, 0, 128)));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_color() {
        assert!(Args::try_parse_from(["pdfeditor", "--color", "#12"]).is_err());
    }

    #[test]
    fn interactive_defaults() {
        let args = Args::try_parse_from(["pdfeditor", "doc.pdf"]).unwrap();
        assert_eq!(args.file, Some(PathBuf::from("doc.pdf")));
        assert_eq!(args.viewer, ViewerChoice::Auto);
        assert!(args.command.is_none());
    }

    #[test]
    fn style_args_apply_file_then_assignments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fields.toml");
        fs::write(&path, "text = \"from file\"\nsize = 30\n").unwrap();
        let style = StyleArgs {
            fields: vec!["size=12".into()],
            field_file: Some(path),
            color: None,
        };
        let mut fields = FormFields::new();
        style.apply(&mut fields).unwrap();
        assert_eq!(fields.text(), "from file");
        assert_eq!(fields.size(), 12.0);
    }

    #[test]
    fn adds_missing_pdf_extension() {
        assert_eq!(with_pdf_extension(Path::new("out")), PathBuf::from("out.pdf"));
        assert_eq!(
            with_pdf_extension(Path::new("out.PDF")),
            PathBuf::from("out.PDF")
        );
    }
}
