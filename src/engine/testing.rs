use super::ids::SequentialIds;
use super::{CommandResult, Evaluator};
use crate::parser::parse;
use crate::state::{image_key, EngineContext, ImageRecord};
use crate::workspace::{self, WorkspaceFiles};
use chrono::{DateTime, Utc};

/// Evaluate once against `ctx` with deterministic ids and no workspace.
pub(crate) fn eval(ctx: &EngineContext, raw: &str) -> CommandResult {
    Evaluator::with_ids(SequentialIds::new()).evaluate(ctx, &parse(raw), None)
}

pub(crate) fn image(reference: &str) -> ImageRecord {
    let (repository, tag) = reference.split_once(':').unwrap_or((reference, "latest"));
    let seed: u32 = reference.bytes().map(u32::from).sum();
    ImageRecord {
        id: format!("sha256:{seed:064x}"),
        repository: repository.to_string(),
        tag: tag.to_string(),
        size: 187_000_000,
        created_at: DateTime::<Utc>::UNIX_EPOCH,
        layers: vec!["aaaa".to_string(), "bbbb".to_string()],
    }
}

pub(crate) fn with_image(reference: &str) -> EngineContext {
    with_images(&[reference])
}

pub(crate) fn with_images(references: &[&str]) -> EngineContext {
    let mut ctx = EngineContext::default();
    for reference in references {
        let img = image(reference);
        ctx.images.insert(image_key(&img.repository, &img.tag), img);
    }
    ctx
}

pub(crate) fn files(entries: &[(&str, &str)]) -> WorkspaceFiles {
    workspace::snapshot(entries.iter().copied())
}

/// A state that commands are applied to in sequence, like a session.
pub(crate) struct Sim {
    pub ctx: EngineContext,
    pub files: Option<WorkspaceFiles>,
    evaluator: Evaluator<SequentialIds>,
}

impl Sim {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            files: None,
            evaluator: Evaluator::with_ids(SequentialIds::new()),
        }
    }

    pub fn with_files(mut self, entries: &[(&str, &str)]) -> Self {
        self.files = Some(files(entries));
        self
    }

    /// Evaluate, then merge the delta and append the events.
    pub fn run(&mut self, raw: &str) -> CommandResult {
        let result = self.evaluator.evaluate(&self.ctx, &parse(raw), self.files.as_ref());
        self.ctx.apply(result.state_delta.clone());
        self.ctx.record(result.events.iter().cloned());
        result
    }

    /// Evaluate without applying anything.
    pub fn peek(&mut self, raw: &str) -> CommandResult {
        self.evaluator.evaluate(&self.ctx, &parse(raw), self.files.as_ref())
    }

    pub fn container_named(&self, name: &str) -> Option<&crate::state::ContainerRecord> {
        self.ctx.active_containers().find(|c| c.name == name)
    }
}
