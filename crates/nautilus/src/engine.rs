//! The per-session engine.
//!
//! `Engine` owns every cache of a visualization session (hierarchy snapshot, dimension and
//! position locks, size statistics, mutation queue) together with the scene adapter. The host
//! drives it with a logical clock: operations schedule work, [`Engine::tick`] runs whatever is
//! due. Nothing here blocks or spawns.

use crate::adapter::GeometryAdapter;
use crate::compact::{CompactionReport, Compactor};
use crate::config::EngineConfig;
use crate::dimension::{DimensionEntry, DimensionLock};
use crate::error::{Error, Result};
use crate::hierarchy::Hierarchy;
use crate::overlap::{self, OverlapReport};
use crate::position::{DriftVerdict, PositionLock};
use crate::schedule::{Scheduler, Task, TaskKey};
use crate::sequencer::{BatchId, BatchReport, MutationSequencer, NodeRemoval};
use crate::stats::NodeSizeStatistics;
use crate::threshold::AdaptiveThreshold;
use crate::visibility::{self, EdgeReport, PropagationReport, VisibilityPropagator};
use nautilus_graph::{EdgeSpec, NodeSpec, SceneEvent, StylePatch};
use std::time::Duration;

/// Event drains per pump; reverting drift produces events of its own.
const MAX_PUMP_ROUNDS: usize = 4;

/// Everything that happened during one [`Engine::tick`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tasks_run: usize,
    /// Tasks dropped because they belonged to a replaced graph.
    pub stale_tasks: usize,
    pub propagation: Option<PropagationReport>,
    pub overlap: Option<OverlapReport>,
    pub compaction: Option<CompactionReport>,
    pub batches_applied: Vec<BatchReport>,
    pub batches_finished: Vec<BatchId>,
    pub batches_timed_out: Vec<BatchId>,
    pub drift_reverted: usize,
    pub dimensions_repaired: Vec<String>,
}

pub struct Engine<A: GeometryAdapter> {
    adapter: Option<A>,
    config: EngineConfig,

    hierarchy: Hierarchy,
    dimensions: DimensionLock,
    positions: PositionLock,
    threshold: AdaptiveThreshold,
    propagator: VisibilityPropagator,
    compactor: Compactor,
    sequencer: MutationSequencer,
    scheduler: Scheduler,

    /// Bumped on every graph replacement; tasks from older generations are dropped.
    generation: u64,
    settles: u64,
    now: Duration,
    first_layout_complete: bool,
    adaptive: bool,
    depth_level: Option<usize>,
    debounce: Option<TaskKey>,
    last_dimension_check: Option<Duration>,
}

impl<A: GeometryAdapter> std::fmt::Debug for Engine<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("attached", &self.adapter.is_some())
            .field("generation", &self.generation)
            .field("settles", &self.settles)
            .field("now", &self.now)
            .field("first_layout_complete", &self.first_layout_complete)
            .field("adaptive", &self.adaptive)
            .field("depth_level", &self.depth_level)
            .field("queued", &self.sequencer.queued())
            .finish()
    }
}

impl<A: GeometryAdapter> Engine<A> {
    pub fn new(adapter: A, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let hierarchy = Hierarchy::build(&adapter);
        Ok(Self {
            adapter: Some(adapter),
            hierarchy,
            dimensions: DimensionLock::new(),
            positions: PositionLock::new(config.drift.tolerance),
            threshold: AdaptiveThreshold::new(config.threshold),
            propagator: VisibilityPropagator::new(),
            compactor: Compactor::new(),
            sequencer: MutationSequencer::new(config.placement),
            scheduler: Scheduler::new(),
            generation: 0,
            settles: 0,
            now: Duration::ZERO,
            first_layout_complete: false,
            adaptive: true,
            depth_level: None,
            debounce: None,
            last_dimension_check: None,
            config,
        })
    }

    // -- accessors ----------------------------------------------------------------------------

    pub fn adapter(&self) -> Result<&A> {
        self.adapter.as_ref().ok_or(Error::NoScene)
    }

    /// The scene, for host interaction (viewport changes, drags, selection).
    pub fn adapter_mut(&mut self) -> Result<&mut A> {
        self.adapter.as_mut().ok_or(Error::NoScene)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn dimensions(&self) -> &DimensionLock {
        &self.dimensions
    }

    pub fn positions(&self) -> &PositionLock {
        &self.positions
    }

    pub fn threshold(&self) -> &AdaptiveThreshold {
        &self.threshold
    }

    pub fn sequencer(&self) -> &MutationSequencer {
        &self.sequencer
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Due time of the earliest scheduled task.
    pub fn next_due(&self) -> Option<Duration> {
        self.scheduler.next_due()
    }

    /// Scheduled tasks of the current generation.
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.pending(self.generation).count()
    }

    pub fn is_first_layout_complete(&self) -> bool {
        self.first_layout_complete
    }

    pub fn is_adaptive_zoom_enabled(&self) -> bool {
        self.adaptive
    }

    pub fn depth_level(&self) -> Option<usize> {
        self.depth_level
    }

    // -- lifecycle ----------------------------------------------------------------------------

    /// Starts the initial sequence once the first layout produced positions.
    ///
    /// Everything is revealed and container sizes are locked right away; overlap resolution,
    /// compaction, position locking and the first visibility pass follow after the settle
    /// delay.
    pub fn apply_initial_visibility(&mut self, now: Duration) -> Result<()> {
        self.advance(now);
        let adapter = self.adapter.as_mut().ok_or(Error::NoScene)?;
        self.hierarchy.recompute(adapter);
        self.propagator.reveal_all(adapter, &self.hierarchy);
        if self.config.lock_dimensions {
            self.dimensions
                .capture_and_lock(adapter, &self.hierarchy, self.now);
        }
        // Nothing is position-locked yet: whatever moved so far is the layout.
        adapter.drain_events();
        self.first_layout_complete = false;
        let due = self.now + self.config.timing.settle_delay();
        self.scheduler.schedule(due, self.generation, Task::Settle);
        tracing::info!(
            nodes = self.hierarchy.len(),
            compounds = self.hierarchy.compounds().count(),
            "initial visibility applied, waiting for layout to settle"
        );
        Ok(())
    }

    /// Swaps in a new graph and drops every piece of session state tied to the old one.
    ///
    /// Queued and in-flight mutation batches are discarded and tasks scheduled so far become
    /// stale; they are dropped when they come due. Call [`Self::apply_initial_visibility`]
    /// afterwards.
    pub fn replace_graph(&mut self, adapter: A) -> Option<A> {
        self.reset_session();
        self.hierarchy.recompute(&adapter);
        tracing::info!(generation = self.generation, "graph replaced");
        self.adapter.replace(adapter)
    }

    /// Ends the session and hands the scene back. Later calls fail with [`Error::NoScene`].
    pub fn teardown(&mut self) -> Option<A> {
        self.reset_session();
        self.scheduler.clear();
        self.hierarchy = Hierarchy::new();
        tracing::info!("session torn down");
        self.adapter.take()
    }

    fn reset_session(&mut self) {
        self.generation += 1;
        let dropped = self.sequencer.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "queued mutation batches discarded");
        }
        self.dimensions.clear();
        self.positions.clear();
        self.threshold.set_stats(None);
        self.compactor.reset();
        self.first_layout_complete = false;
        self.debounce = None;
        self.last_dimension_check = None;
    }

    // -- host operations ----------------------------------------------------------------------

    /// Recomputes size statistics after a full re-layout and runs a visibility pass.
    pub fn recalculate_thresholds(&mut self) -> Result<Option<PropagationReport>> {
        self.sync()?;
        let adapter = self.adapter.as_mut().ok_or(Error::NoScene)?;
        self.hierarchy.recompute(adapter);
        self.threshold
            .set_stats(NodeSizeStatistics::collect(adapter));
        let report = self.propagate_now()?;
        self.sync()?;
        Ok(report)
    }

    pub fn on_node_added(&mut self, spec: NodeSpec) -> Result<BatchId> {
        self.enqueue(vec![], vec![spec], vec![])
    }

    pub fn on_node_removed(&mut self, id: &str, parent: Option<&str>) -> Result<BatchId> {
        let removal = NodeRemoval {
            id: id.to_string(),
            parent: parent.map(str::to_string),
        };
        self.enqueue(vec![removal], vec![], vec![])
    }

    pub fn on_nodes_added_batch(
        &mut self,
        nodes: Vec<NodeSpec>,
        edges: Vec<EdgeSpec>,
    ) -> Result<BatchId> {
        self.enqueue(vec![], nodes, edges)
    }

    /// Enables or disables coverage-driven visibility.
    ///
    /// Disabling falls back to the manual depth level, or to the whole hierarchy when no level
    /// was chosen yet.
    pub fn set_adaptive_zoom_enabled(
        &mut self,
        enabled: bool,
    ) -> Result<Option<PropagationReport>> {
        self.sync()?;
        self.adaptive = enabled;
        tracing::debug!(enabled, "adaptive zoom toggled");
        let report = if enabled {
            self.depth_level = None;
            self.propagate_now()?
        } else {
            self.cancel_debounce();
            let level = self.depth_level.unwrap_or(usize::MAX);
            self.show_depth(level)?
        };
        self.sync()?;
        Ok(report)
    }

    /// Shows every node down to `level`, bypassing coverage. Disables adaptive zoom.
    pub fn manually_set_depth_level(&mut self, level: usize) -> Result<Option<PropagationReport>> {
        self.sync()?;
        self.adaptive = false;
        self.depth_level = Some(level);
        self.cancel_debounce();
        let report = self.show_depth(level)?;
        self.sync()?;
        Ok(report)
    }

    pub fn force_update_edge_visibility(&mut self) -> Result<EdgeReport> {
        self.sync()?;
        let adapter = self.adapter.as_mut().ok_or(Error::NoScene)?;
        Ok(visibility::update_edges(adapter))
    }

    /// Re-measures and re-locks one container after an out-of-band structural change.
    pub fn recalculate_dimensions(&mut self, id: &str) -> Result<Option<DimensionEntry>> {
        self.sync()?;
        let adapter = self.adapter.as_mut().ok_or(Error::NoScene)?;
        self.hierarchy.recompute(adapter);
        let entry = self
            .dimensions
            .recalculate(adapter, &self.hierarchy, id, self.now);
        let moved = self.with_ancestors(&[id.to_string()]);
        self.absorb_own_moves(&moved, &mut TickReport::default())?;
        Ok(entry)
    }

    /// Separates overlapping visible siblings now.
    pub fn resolve_overlaps(&mut self) -> Result<OverlapReport> {
        self.sync()?;
        let adapter = self.adapter.as_mut().ok_or(Error::NoScene)?;
        let visible = visible_nodes(adapter, &self.hierarchy);
        let report = overlap::resolve(adapter, &self.hierarchy, &visible, &self.config.overlap);
        self.absorb_own_moves(&report.moved, &mut TickReport::default())?;
        Ok(report)
    }

    /// Compacts the visible nodes, at most once per settle.
    pub fn compact(&mut self) -> Result<Option<CompactionReport>> {
        self.sync()?;
        let adapter = self.adapter.as_mut().ok_or(Error::NoScene)?;
        let visible = visible_nodes(adapter, &self.hierarchy);
        let report = self.compactor.compact(
            adapter,
            &self.hierarchy,
            &visible,
            &self.config.compaction,
            self.settles,
        );
        let moved = report.as_ref().map(|r| r.moved.as_slice()).unwrap_or_default();
        self.absorb_own_moves(moved, &mut TickReport::default())?;
        Ok(report)
    }

    /// Advances the logical clock to `now` and runs every task that is due.
    ///
    /// Tasks scheduled while this tick runs wait for the next one.
    pub fn tick(&mut self, now: Duration) -> Result<TickReport> {
        self.adapter()?;
        self.advance(now);
        let mut report = TickReport::default();
        self.pump_events(&mut report)?;

        let watermark = self.scheduler.watermark();
        while let Some((generation, task)) = self.scheduler.pop_due(self.now, watermark) {
            if generation != self.generation {
                tracing::debug!(?task, generation, "stale task dropped");
                report.stale_tasks += 1;
                continue;
            }
            report.tasks_run += 1;
            self.run_task(task, &mut report)?;
        }

        self.pump_events(&mut report)?;
        Ok(report)
    }

    // -- internals ----------------------------------------------------------------------------

    fn advance(&mut self, now: Duration) {
        if now > self.now {
            self.now = now;
        }
    }

    fn enqueue(
        &mut self,
        removals: Vec<NodeRemoval>,
        additions: Vec<NodeSpec>,
        edges: Vec<EdgeSpec>,
    ) -> Result<BatchId> {
        self.adapter()?;
        let id = self.sequencer.enqueue(removals, additions, edges);
        self.schedule_queue();
        Ok(id)
    }

    fn schedule_queue(&mut self) {
        if !self
            .scheduler
            .pending(self.generation)
            .any(|t| t == Task::ProcessQueue)
        {
            self.scheduler
                .schedule(self.now, self.generation, Task::ProcessQueue);
        }
    }

    fn cancel_debounce(&mut self) {
        if let Some(key) = self.debounce.take() {
            self.scheduler.cancel(key);
        }
    }

    fn run_task(&mut self, task: Task, report: &mut TickReport) -> Result<()> {
        match task {
            Task::Propagate => {
                self.debounce = None;
                if let Some(p) = self.propagate_now()? {
                    report.propagation = Some(p);
                }
            }
            Task::Settle => self.settle(report)?,
            Task::ProcessQueue => self.process_queue(report)?,
            Task::FinishBatch(id) => {
                if self.sequencer.finish(id) {
                    tracing::debug!(batch = id, "mutation batch finished");
                    report.batches_finished.push(id);
                    self.after_batch(report)?;
                }
            }
            Task::BatchTimeout(id) => {
                if self.sequencer.finish(id) {
                    tracing::warn!(batch = id, "mutation batch timed out, forcing completion");
                    report.batches_timed_out.push(id);
                    self.after_batch(report)?;
                }
            }
        }
        Ok(())
    }

    fn settle(&mut self, report: &mut TickReport) -> Result<()> {
        self.pump_events(report)?;
        let adapter = self.adapter.as_mut().ok_or(Error::NoScene)?;
        let visible = visible_nodes(adapter, &self.hierarchy);
        report.overlap = Some(overlap::resolve(
            adapter,
            &self.hierarchy,
            &visible,
            &self.config.overlap,
        ));
        self.settles += 1;
        report.compaction = self.compactor.compact(
            adapter,
            &self.hierarchy,
            &visible,
            &self.config.compaction,
            self.settles,
        );
        adapter.drain_events();
        self.positions.lock_all(adapter);
        self.threshold
            .set_stats(NodeSizeStatistics::collect(adapter));
        self.first_layout_complete = true;
        tracing::info!(settle = self.settles, "first layout complete");
        report.propagation = self.propagate_now()?;
        Ok(())
    }

    fn process_queue(&mut self, report: &mut TickReport) -> Result<()> {
        let Some(mutation) = self.sequencer.begin_next(self.now) else {
            return Ok(());
        };
        self.pump_events(report)?;
        let adapter = self.adapter.as_mut().ok_or(Error::NoScene)?;
        let applied = match self.sequencer.apply(adapter, &mutation) {
            Ok(applied) => applied,
            Err(reason) => {
                tracing::warn!(
                    batch = mutation.id,
                    reason = reason.as_str(),
                    "mutation batch failed"
                );
                self.reset_session();
                return Err(Error::ReloadRequired {
                    batch: mutation.id,
                    reason,
                });
            }
        };

        self.hierarchy.recompute(adapter);
        for id in &applied.removed_nodes {
            self.dimensions.forget(id);
            self.positions.forget(id);
        }
        if !self.config.lock_dimensions {
            for p in &applied.touched_parents {
                self.dimensions.demote(adapter, p);
            }
        } else if self.sequencer.is_incremental() {
            self.dimensions.apply_incremental(
                adapter,
                &self.hierarchy,
                &applied.touched_parents,
                self.now,
            );
        } else {
            for p in &applied.touched_parents {
                self.dimensions
                    .recalculate(adapter, &self.hierarchy, p, self.now);
            }
        }
        if self.first_layout_complete {
            // New nodes start hidden; the follow-up pass decides what to show.
            for id in &applied.added_nodes {
                adapter.set_node_style(id, &StylePatch::hide());
            }
        }
        self.threshold
            .set_stats(NodeSizeStatistics::collect(adapter));
        let mut moved = applied.added_nodes.clone();
        moved.extend(self.with_ancestors(&applied.touched_parents));
        self.absorb_own_moves(&moved, report)?;

        let generation = self.generation;
        self.scheduler.schedule(
            self.now + self.config.timing.batch_settle(),
            generation,
            Task::FinishBatch(mutation.id),
        );
        self.scheduler.schedule(
            self.now + self.config.timing.batch_timeout(),
            generation,
            Task::BatchTimeout(mutation.id),
        );
        tracing::debug!(
            batch = mutation.id,
            added = applied.added_nodes.len(),
            removed = applied.removed_nodes.len(),
            "mutation batch applied"
        );
        report.batches_applied.push(applied);
        Ok(())
    }

    fn after_batch(&mut self, report: &mut TickReport) -> Result<()> {
        if let Some(p) = self.propagate_now()? {
            report.propagation = Some(p);
        } else if !self.adaptive {
            let level = self.depth_level.unwrap_or(usize::MAX);
            if let Some(p) = self.show_depth(level)? {
                report.propagation = Some(p);
            }
        } else {
            let adapter = self.adapter.as_mut().ok_or(Error::NoScene)?;
            visibility::update_edges(adapter);
        }
        if self.sequencer.queued() > 0 {
            self.schedule_queue();
        }
        Ok(())
    }

    /// Runs a coverage-driven pass if the session is ready for one.
    ///
    /// Container moves caused by the pass are left to the drift guard.
    fn propagate_now(&mut self) -> Result<Option<PropagationReport>> {
        let adapter = self.adapter.as_mut().ok_or(Error::NoScene)?;
        if !self.first_layout_complete || !self.adaptive {
            return Ok(None);
        }
        Ok(self
            .propagator
            .propagate(adapter, &self.hierarchy, &self.threshold))
    }

    fn show_depth(&mut self, level: usize) -> Result<Option<PropagationReport>> {
        let adapter = self.adapter.as_mut().ok_or(Error::NoScene)?;
        Ok(self
            .propagator
            .show_to_depth(adapter, &self.hierarchy, level))
    }

    /// Runs events the host produced since the last call through the guard.
    fn sync(&mut self) -> Result<()> {
        self.pump_events(&mut TickReport::default())
    }

    /// Feeds pending scene events through the drift guard, the debouncer and the dimension
    /// check.
    fn pump_events(&mut self, report: &mut TickReport) -> Result<()> {
        let adapter = self.adapter.as_mut().ok_or(Error::NoScene)?;
        for _ in 0..MAX_PUMP_ROUNDS {
            let events = adapter.drain_events();
            if events.is_empty() {
                break;
            }
            for event in &events {
                match event {
                    SceneEvent::Viewport(_) => {
                        if self.first_layout_complete && self.adaptive {
                            if let Some(key) = self.debounce.take() {
                                self.scheduler.cancel(key);
                            }
                            let due = self.now + self.config.timing.debounce();
                            let key =
                                self.scheduler
                                    .schedule(due, self.generation, Task::Propagate);
                            self.debounce = Some(key);
                        }
                    }
                    SceneEvent::RenderTick => {
                        // Sizes are being re-pinned while a batch is incremental.
                        if self.sequencer.is_incremental() {
                            continue;
                        }
                        let interval = self.config.timing.dimension_check_interval();
                        let due = self
                            .last_dimension_check
                            .is_none_or(|last| self.now.saturating_sub(last) >= interval);
                        if due && self.dimensions.locked_count() > 0 {
                            self.last_dimension_check = Some(self.now);
                            report
                                .dimensions_repaired
                                .extend(self.dimensions.verify(adapter));
                        }
                    }
                    SceneEvent::Grab { .. }
                    | SceneEvent::Release { .. }
                    | SceneEvent::Position { .. } => {
                        if self.positions.observe(adapter, &self.hierarchy, event)
                            == DriftVerdict::Reverted
                        {
                            report.drift_reverted += 1;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Accepts the current positions of nodes the engine itself moved (subtrees included),
    /// then runs every pending event through the guard.
    fn absorb_own_moves(&mut self, moved: &[String], report: &mut TickReport) -> Result<()> {
        let adapter = self.adapter.as_ref().ok_or(Error::NoScene)?;
        if self.positions.is_locked() && !moved.is_empty() {
            let mut ids: Vec<String> = Vec::with_capacity(moved.len());
            for id in moved {
                ids.push(id.clone());
                ids.extend(self.hierarchy.descendants(id));
            }
            self.positions.lock(adapter, &ids);
        }
        self.pump_events(report)
    }

    fn with_ancestors(&self, ids: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(id.clone());
            out.extend(self.hierarchy.ancestors(id));
        }
        out
    }
}

fn visible_nodes<A: GeometryAdapter + ?Sized>(adapter: &A, hierarchy: &Hierarchy) -> Vec<String> {
    hierarchy
        .ids()
        .filter(|id| adapter.is_visible(id))
        .map(str::to_string)
        .collect()
}
