//! Turns delete candidates into actions according to the delete mode: a
//! report only, a confirmation per item, or deleting everything.

use crate::{
    catalog::MediaItem,
    config::{DeleteMode, RunConfig},
    managers::{LibraryManagers, ManagerKind, ManagerRecord, RecordTarget},
    prompt::{Answer, Prompt},
    retention::RetentionDecision,
    utils::format_size,
};
use log::{debug, error, info, warn};
use std::collections::BTreeMap;

pub struct Executor<'a> {
    managers: &'a LibraryManagers,
    prompt: &'a (dyn Prompt + Sync),
    mode: DeleteMode,
    dry_run: bool,
    delete_files: bool,
    sort_by_size: bool,
}

/// A delete candidate together with what its library manager knows about it.
struct Candidate<'d> {
    decision: &'d RetentionDecision,
    record: Option<ManagerRecord>,
}

impl Candidate<'_> {
    fn item(&self) -> &MediaItem {
        &self.decision.item
    }

    fn size(&self) -> u64 {
        self.record.as_ref().map_or(0, |r| r.size_on_disk)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub candidates: usize,
    /// in a dry run: the items that would have been deleted
    pub deleted: usize,
    pub deleted_bytes: u64,
    /// episodes only unmonitored because files are kept, no space freed
    pub unmonitored: usize,
    pub declined: usize,
    /// candidates without a library manager record
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    fn log(&self, dry_run: bool) {
        let (verb, unmonitor_verb) = if dry_run {
            ("would delete", "would unmonitor")
        } else {
            ("deleted", "unmonitored")
        };
        info!(
            "{} candidates: {verb} {} ({}), {unmonitor_verb} {}, declined {}, skipped {}, failed {}",
            self.candidates,
            self.deleted,
            format_size(self.deleted_bytes),
            self.unmonitored,
            self.declined,
            self.skipped,
            self.failed,
        );
    }
}

impl<'a> Executor<'a> {
    pub fn new(
        managers: &'a LibraryManagers,
        prompt: &'a (dyn Prompt + Sync),
        config: &RunConfig,
    ) -> Self {
        Self {
            managers,
            prompt,
            mode: config.delete_mode,
            dry_run: config.dry_run,
            delete_files: config.delete_files,
            sort_by_size: config.sort_by_size,
        }
    }

    pub async fn execute(&self, decisions: &[RetentionDecision]) -> anyhow::Result<Summary> {
        let mut summary = Summary::default();

        let mut candidates = Vec::new();
        for decision in decisions.iter().filter(|d| d.is_candidate()) {
            let record = self.lookup(&decision.item).await;
            if record.is_none() {
                summary.skipped += 1;
            }
            candidates.push(Candidate { decision, record });
        }
        summary.candidates = candidates.len();

        if candidates.is_empty() {
            info!("no unwatched media found");
            return Ok(summary);
        }

        let groups = self.group_by_library(candidates);
        report(&groups);

        if self.mode == DeleteMode::None {
            info!("delete mode is \"none\", nothing will be deleted");
            summary.log(self.dry_run);
            return Ok(summary);
        }

        let mut quit = false;
        for candidate in groups.iter().flat_map(|(_, candidates)| candidates) {
            let Some(record) = &candidate.record else {
                continue;
            };
            let item = candidate.item();

            if self.mode == DeleteMode::Interactive {
                if quit {
                    summary.declined += 1;
                    continue;
                }
                let question = format!(
                    "delete {} \"{item}\" ({}) from {}?",
                    item.kind_name(),
                    format_size(record.size_on_disk),
                    record.manager
                );
                // reading the terminal blocks the worker thread
                let answer = tokio::task::block_in_place(|| self.prompt.confirm(&question))?;
                match answer {
                    Answer::Yes => {}
                    Answer::No => {
                        info!("keeping \"{item}\"");
                        summary.declined += 1;
                        continue;
                    }
                    Answer::Quit => {
                        info!("keeping \"{item}\" and everything after it");
                        quit = true;
                        summary.declined += 1;
                        continue;
                    }
                }
            }

            self.delete(item, record, &mut summary).await;
        }

        summary.log(self.dry_run);
        Ok(summary)
    }

    async fn lookup(&self, item: &MediaItem) -> Option<ManagerRecord> {
        let kind = ManagerKind::for_item(item);
        let Some(manager) = self.managers.get(kind) else {
            if self.mode == DeleteMode::None {
                debug!("{kind} is not configured, \"{item}\" is only reported");
            } else {
                warn!("{kind} is not configured, unable to delete \"{item}\"");
            }
            return None;
        };

        match manager.lookup(item).await {
            Ok(Some(record)) => {
                debug!("found \"{item}\" in {kind}: {record:?}");
                Some(record)
            }
            Ok(None) => {
                warn!("\"{item}\" not found in {kind}, skipping");
                None
            }
            Err(e) => {
                warn!("unable to look up \"{item}\" in {kind}, skipping: {e:#}");
                None
            }
        }
    }

    async fn delete(&self, item: &MediaItem, record: &ManagerRecord, summary: &mut Summary) {
        let size = format_size(record.size_on_disk);
        let unmonitor_only =
            !self.delete_files && matches!(record.target, RecordTarget::EpisodeFile { .. });
        if self.dry_run {
            if unmonitor_only {
                info!("dry run: would unmonitor \"{item}\" in {}", record.manager);
                summary.unmonitored += 1;
            } else {
                info!("dry run: would delete \"{item}\" ({size}) from {}", record.manager);
                summary.deleted += 1;
                summary.deleted_bytes += record.size_on_disk;
            }
            return;
        }

        let Some(manager) = self.managers.get(record.manager) else {
            error!("{} is not configured, unable to delete \"{item}\"", record.manager);
            summary.failed += 1;
            return;
        };

        match manager.delete(record, self.delete_files).await {
            Ok(()) if unmonitor_only => summary.unmonitored += 1,
            Ok(()) => {
                info!("deleted \"{item}\" ({size}) from {}", record.manager);
                summary.deleted += 1;
                summary.deleted_bytes += record.size_on_disk;
            }
            Err(e) => {
                error!(
                    "failed to delete \"{item}\" of library \"{}\" from {}: {e:#}",
                    item.library, record.manager
                );
                summary.failed += 1;
            }
        }
    }

    /// Libraries in order of first appearance. Within a library the
    /// evaluator's order is kept unless sorting by size.
    fn group_by_library<'d>(
        &self,
        candidates: Vec<Candidate<'d>>,
    ) -> Vec<(String, Vec<Candidate<'d>>)> {
        let mut groups: Vec<(String, Vec<Candidate<'d>>)> = Vec::new();
        for candidate in candidates {
            let library = &candidate.item().library;
            match groups.iter_mut().find(|(name, _)| name == library) {
                Some((_, group)) => group.push(candidate),
                None => groups.push((library.clone(), vec![candidate])),
            }
        }
        if self.sort_by_size {
            for (_, group) in &mut groups {
                group.sort_by_key(|c| std::cmp::Reverse(c.size()));
            }
        }
        groups
    }
}

fn report(groups: &[(String, Vec<Candidate<'_>>)]) {
    // kind -> (count, bytes)
    let mut totals: BTreeMap<&str, (usize, u64)> = BTreeMap::new();

    for (library, candidates) in groups {
        info!("unwatched media in library \"{library}\":");
        for candidate in candidates {
            let item = candidate.item();
            let size = match &candidate.record {
                Some(record) => format_size(record.size_on_disk),
                None => "unknown size".to_string(),
            };
            info!(
                "  [{}] {item} ({size}): {}",
                item.kind_name(),
                candidate.decision.reason
            );
            let paths = candidate
                .record
                .as_ref()
                .map(|r| r.paths.clone())
                .unwrap_or_else(|| item.path.clone().into_iter().collect());
            for path in paths {
                debug!("      {path}");
            }
            let total = totals.entry(item.kind_name()).or_default();
            total.0 += 1;
            total.1 += candidate.size();
        }
    }

    let mut grand_total = 0;
    for (kind, (count, bytes)) in &totals {
        info!("total {kind}s: {count} ({})", format_size(*bytes));
        grand_total += bytes;
    }
    info!("total size: {}", format_size(grand_total));
}
