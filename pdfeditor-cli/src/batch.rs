//! Non-interactive front end: drives the same controller with answers taken from the command line.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use pdfeditor_core::{Action, Controller, Notice, Outcome, Prompter, Rgba, TempWorkspace};
use pdfeditor_edit::{LopdfEngine, StructureLoader};
use tracing::{info, warn};

use crate::StyleArgs;

/// Answers every prompt with a fixed value and reports notices on stderr.
struct ScriptedPrompter {
    open: Option<PathBuf>,
    save: PathBuf,
    failure: Option<String>,
}

impl ScriptedPrompter {
    fn new(open: Option<&Path>, save: &Path) -> Self {
        Self {
            open: open.map(Path::to_path_buf),
            save: save.to_path_buf(),
            failure: None,
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn open_path(&mut self) -> Option<PathBuf> {
        self.open.clone()
    }

    fn save_path(&mut self) -> Option<PathBuf> {
        Some(self.save.clone())
    }

    fn color(&mut self, current: Rgba) -> Option<Rgba> {
        Some(current)
    }

    fn notify(&mut self, notice: Notice) {
        match &notice {
            Notice::Failed { .. } => {
                warn!(%notice, "batch step failed");
                self.failure = Some(notice.to_string());
            }
            Notice::NothingToSave => warn!(%notice, "batch step skipped"),
            Notice::Saved(_) => info!(%notice, "batch step finished"),
        }
    }
}

type BatchController = Controller<LopdfEngine, StructureLoader>;

fn controller() -> BatchController {
    Controller::new(LopdfEngine, TempWorkspace::system(), StructureLoader)
}

fn run(
    controller: &mut BatchController,
    prompter: &mut ScriptedPrompter,
    action: Action,
) -> Result<()> {
    match controller.dispatch(action, prompter) {
        Outcome::Completed => Ok(()),
        Outcome::Cancelled => bail!("{action} did not run"),
        Outcome::Failed(kind) => {
            let message = prompter
                .failure
                .take()
                .unwrap_or_else(|| format!("{kind:?}"));
            bail!("{message}")
        }
    }
}

pub fn new_document(output: &Path) -> Result<()> {
    let mut controller = controller();
    let mut prompter = ScriptedPrompter::new(None, output);
    run(&mut controller, &mut prompter, Action::New)?;
    run(&mut controller, &mut prompter, Action::SaveAs)
        .with_context(|| format!("failed to write {output:?}"))?;
    controller.shutdown();
    println!("{}", output.display());
    Ok(())
}

pub fn annotate(input: Option<&Path>, output: &Path, style: &StyleArgs) -> Result<()> {
    let mut controller = controller();
    style.apply(controller.fields_mut())?;
    if let Some(color) = style.color {
        controller.set_color(color);
    }

    let mut prompter = ScriptedPrompter::new(input, output);
    match input {
        Some(source) => run(&mut controller, &mut prompter, Action::Open)
            .with_context(|| format!("failed to open {source:?}"))?,
        None => run(&mut controller, &mut prompter, Action::New)?,
    }
    run(&mut controller, &mut prompter, Action::AddText)?;
    run(&mut controller, &mut prompter, Action::SaveAs)
        .with_context(|| format!("failed to write {output:?}"))?;

    let pages = controller
        .viewer()
        .info()
        .map(|info| info.page_count)
        .unwrap_or_default();
    controller.shutdown();
    println!("{} ({pages} page{})", output.display(), if pages == 1 { "" } else { "s" });
    Ok(())
}
