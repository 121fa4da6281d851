//! The campaign: apps, their live tables and the active sampler and analysis.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uq_analysis::{AnalysisElement, AnalysisResult};
use uq_collate::{CollationBuilder, CollationTable, FailedRun};
use uq_core::{ErrorInfo, RunDescriptor, RunId, SeedSequence, UqError};
use uq_sampling::{Refinement, Sampler};

use crate::app::App;
use crate::dispatch::{execute_batch, BatchReport, DispatchOptions};
use crate::state::{self, CampaignManifest, MANIFEST_SCHEMA};
use crate::store::RunStore;

pub(crate) struct AppState {
    pub(crate) app: App,
    pub(crate) builder: CollationBuilder,
    pub(crate) sampler: Option<Box<dyn Sampler>>,
    pub(crate) sampler_id: Option<String>,
    pub(crate) analysis: Option<Box<dyn AnalysisElement>>,
    pub(crate) last_result: Option<AnalysisResult>,
}

impl AppState {
    /// Snapshot restricted to the attached sampler's runs; the whole table
    /// when no sampler was attached.
    fn sampler_view(&self) -> CollationTable {
        let snapshot = self.builder.snapshot();
        match self.sampler_id.as_deref() {
            Some(id) => snapshot.for_sampler(id),
            None => snapshot,
        }
    }

    fn new(app: App, table: CollationTable) -> Self {
        Self {
            app,
            builder: CollationBuilder::from_table(table),
            sampler: None,
            sampler_id: None,
            analysis: None,
            last_result: None,
        }
    }
}

/// A UQ campaign.
///
/// Owns one live collation table per app. Samplers and analyses are attached
/// to the active app; analyses only ever see snapshots of its table.
pub struct Campaign {
    name: String,
    work_dir: PathBuf,
    seeds: SeedSequence,
    config_hash: String,
    dispatch: DispatchOptions,
    store: RunStore,
    samplers: u64,
    pub(crate) apps: BTreeMap<String, AppState>,
    active: Option<String>,
    pub(crate) rounds: usize,
}

impl fmt::Debug for Campaign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Campaign")
            .field("name", &self.name)
            .field("work_dir", &self.work_dir)
            .field("apps", &self.apps.keys().collect::<Vec<_>>())
            .field("active", &self.active)
            .field("rounds", &self.rounds)
            .finish()
    }
}

impl Campaign {
    /// Creates a campaign writing its state under `work_dir`.
    pub fn new(name: impl Into<String>, work_dir: impl Into<PathBuf>, seed: u64) -> Result<Self, UqError> {
        let work_dir = work_dir.into();
        fs::create_dir_all(&work_dir).map_err(|err| {
            UqError::Serde(
                ErrorInfo::new("work-dir", err.to_string())
                    .with_context("path", work_dir.display().to_string()),
            )
        })?;
        Ok(Self {
            name: name.into(),
            work_dir,
            seeds: SeedSequence::new(seed),
            config_hash: String::new(),
            dispatch: DispatchOptions::default(),
            store: RunStore::new(),
            samplers: 0,
            apps: BTreeMap::new(),
            active: None,
            rounds: 0,
        })
    }

    /// Reopens a campaign persisted in `work_dir`.
    ///
    /// Every app named in the manifest must be supplied again; its table is
    /// reloaded and new runs continue the persisted run ids. Samplers and
    /// analyses are not persisted and have to be set again.
    pub fn reopen(work_dir: impl Into<PathBuf>, apps: Vec<App>) -> Result<Self, UqError> {
        let work_dir = work_dir.into();
        let manifest = state::read_manifest(&work_dir)?;
        let mut supplied: BTreeMap<String, App> =
            apps.into_iter().map(|app| (app.name.clone(), app)).collect();

        let mut states = BTreeMap::new();
        let mut runs = Vec::new();
        for name in manifest.apps.keys() {
            let app = supplied.remove(name).ok_or_else(|| {
                UqError::Config(
                    ErrorInfo::new("app-not-supplied", "persisted app has no definition")
                        .with_context("app", name.clone()),
                )
            })?;
            let table = state::load_table(&work_dir, name)?;
            runs.extend(table.rows().map(|row| RunDescriptor {
                run_id: row.run_id,
                app: row.app.clone(),
                sampler: row.sampler.clone(),
                params: row.params.clone(),
                lineage: row.lineage.clone(),
            }));
            states.insert(name.clone(), AppState::new(app, table));
        }
        for (name, app) in supplied {
            states.insert(name.clone(), AppState::new(app, CollationTable::new(name)));
        }

        let samplers = runs
            .iter()
            .filter_map(|run| run.sampler.rsplit_once('-'))
            .filter_map(|(_, seq)| seq.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        info!(
            campaign = %manifest.provenance.campaign,
            apps = states.len(),
            runs = runs.len(),
            "campaign reopened"
        );
        Ok(Self {
            name: manifest.provenance.campaign.clone(),
            seeds: SeedSequence::new(manifest.provenance.seed),
            config_hash: manifest.provenance.config_hash.clone(),
            dispatch: DispatchOptions::default(),
            store: RunStore::from_runs(runs)?,
            samplers,
            active: manifest
                .active_app
                .clone()
                .or_else(|| states.keys().next().cloned()),
            apps: states,
            rounds: manifest.rounds,
            work_dir,
        })
    }

    /// Records the hash of the configuration the campaign was built from.
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    /// Sets how batches are executed.
    pub fn set_dispatch(&mut self, dispatch: DispatchOptions) {
        self.dispatch = dispatch;
    }

    /// Campaign name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding run directories and persisted state.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Root seed sequence of the campaign.
    pub fn seeds(&self) -> SeedSequence {
        self.seeds
    }

    /// Completed loop rounds.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Registers an app. The first app becomes the active one.
    pub fn add_app(&mut self, app: App) -> Result<(), UqError> {
        if self.apps.contains_key(&app.name) {
            return Err(UqError::Config(
                ErrorInfo::new("app-duplicate", "an app with this name already exists")
                    .with_context("app", app.name.clone()),
            ));
        }
        let name = app.name.clone();
        self.apps
            .insert(name.clone(), AppState::new(app, CollationTable::new(name.clone())));
        if self.active.is_none() {
            self.active = Some(name);
        }
        Ok(())
    }

    /// Makes `name` the active app.
    pub fn set_app(&mut self, name: &str) -> Result<(), UqError> {
        if !self.apps.contains_key(name) {
            return Err(unknown_app(name));
        }
        self.active = Some(name.to_string());
        Ok(())
    }

    /// Name of the active app.
    pub fn active_app(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub(crate) fn active_state(&self) -> Result<&AppState, UqError> {
        let name = self.active.as_deref().ok_or_else(no_app)?;
        self.apps.get(name).ok_or_else(|| unknown_app(name))
    }

    pub(crate) fn active_state_mut(&mut self) -> Result<&mut AppState, UqError> {
        let name = self.active.as_deref().ok_or_else(no_app)?;
        self.apps.get_mut(name).ok_or_else(|| unknown_app(name))
    }

    /// Attaches a sampler to the active app and returns its sampler id.
    ///
    /// Every parameter the sampler varies must be declared by the app. Each
    /// call issues a new campaign-unique id (`<name>-<n>`) that is recorded
    /// against every run the sampler emits; analyses and refinement only see
    /// the runs of the active sampler id.
    pub fn set_sampler(&mut self, sampler: Box<dyn Sampler>) -> Result<String, UqError> {
        let sampler_id = format!("{}-{}", sampler.name(), self.samplers + 1);
        let state = self.active_state_mut()?;
        for input in sampler.inputs() {
            if state.app.params.get(&input).is_none() {
                return Err(UqError::Config(
                    ErrorInfo::new("sampler-param-undeclared", "sampler varies a parameter the app does not declare")
                        .with_context("app", state.app.name.clone())
                        .with_context("param", input),
                ));
            }
        }
        state.sampler = Some(sampler);
        state.sampler_id = Some(sampler_id.clone());
        self.samplers += 1;
        debug!(sampler = %sampler_id, "sampler attached");
        Ok(sampler_id)
    }

    /// Id of the sampler attached to the active app.
    pub fn sampler_id(&self) -> Option<&str> {
        self.active_state().ok().and_then(|state| state.sampler_id.as_deref())
    }

    /// Attaches the analysis run after every round of the active app.
    pub fn set_analysis(&mut self, analysis: Box<dyn AnalysisElement>) -> Result<(), UqError> {
        self.active_state_mut()?.analysis = Some(analysis);
        Ok(())
    }

    /// Draws one batch from the active sampler and executes it.
    ///
    /// Returns once every run of the batch is terminal and collated.
    pub fn run_batch(&mut self) -> Result<BatchReport, UqError> {
        let state = self.active_state_mut()?;
        let mut sampler = state.sampler.take().ok_or_else(|| {
            UqError::Config(
                ErrorInfo::new("sampler-missing", "no sampler set for the active app")
                    .with_context("app", state.app.name.clone()),
            )
        })?;
        let result = self.execute_sampler_batch(sampler.as_mut());
        self.active_state_mut()?.sampler = Some(sampler);
        result
    }

    fn execute_sampler_batch(&self, sampler: &mut dyn Sampler) -> Result<BatchReport, UqError> {
        let state = self.active_state()?;
        let sampler_id = state
            .sampler_id
            .clone()
            .unwrap_or_else(|| sampler.name().to_string());
        let points = sampler.next_batch()?;
        let mut runs = Vec::with_capacity(points.len());
        for point in points {
            let params = state.app.params.complete(&point.values)?;
            runs.push(self.store.create(&state.app.name, &sampler_id, params, point.lineage));
        }
        debug!(app = %state.app.name, sampler = %sampler_id, runs = runs.len(), "runs created");
        execute_batch(
            &state.app,
            &runs,
            &state.builder,
            &self.work_dir,
            self.seeds,
            &self.dispatch,
        )
    }

    /// Lets the active sampler refine from the current table and applies the
    /// runs it excludes.
    pub fn refine_sampler(&mut self, previous: Option<&AnalysisResult>) -> Result<Refinement, UqError> {
        let state = self.active_state_mut()?;
        let snapshot = state.sampler_view();
        let sampler = state.sampler.as_mut().ok_or_else(|| {
            UqError::Config(ErrorInfo::new("sampler-missing", "no sampler set for the active app"))
        })?;
        let refinement = sampler.refine(&snapshot, previous)?;
        for run_id in &refinement.ignored_runs {
            state.builder.mark_ignored(*run_id)?;
        }
        Ok(refinement)
    }

    /// Whether the active sampler is exhausted.
    pub fn sampler_exhausted(&self) -> Result<bool, UqError> {
        Ok(self
            .active_state()?
            .sampler
            .as_ref()
            .map_or(true, |sampler| sampler.exhausted()))
    }

    /// Point-in-time copy of the active app's table.
    pub fn snapshot(&self) -> Result<CollationTable, UqError> {
        Ok(self.active_state()?.builder.snapshot())
    }

    /// Point-in-time copy of any app's table.
    pub fn table(&self, app: &str) -> Result<CollationTable, UqError> {
        self.apps
            .get(app)
            .map(|state| state.builder.snapshot())
            .ok_or_else(|| unknown_app(app))
    }

    /// Descriptor of a run created by this campaign.
    pub fn run(&self, run_id: RunId) -> Option<RunDescriptor> {
        self.store.get(run_id)
    }

    /// Runs `element` on the active sampler's rows of the active table and
    /// keeps the result as the current one.
    pub fn apply_analysis(&mut self, element: &dyn AnalysisElement) -> Result<AnalysisResult, UqError> {
        let snapshot = self.active_state()?.sampler_view();
        let result = element.analyse(&snapshot)?;
        info!(analysis = element.name(), kind = result.kind(), rows = snapshot.len(), "analysis applied");
        self.active_state_mut()?.last_result = Some(result.clone());
        Ok(result)
    }

    /// Runs the attached analysis, if any, on the active sampler's rows.
    pub fn analyse(&mut self) -> Result<Option<AnalysisResult>, UqError> {
        let state = self.active_state_mut()?;
        let Some(analysis) = state.analysis.as_ref() else {
            return Ok(None);
        };
        let snapshot = state.sampler_view();
        let result = analysis.analyse(&snapshot)?;
        info!(analysis = analysis.name(), kind = result.kind(), rows = snapshot.len(), "analysis applied");
        state.last_result = Some(result.clone());
        Ok(Some(result))
    }

    /// Current result of the active app.
    pub fn last_result(&self) -> Option<&AnalysisResult> {
        self.active_state().ok().and_then(|state| state.last_result.as_ref())
    }

    /// Failed runs of the active app with their reasons.
    pub fn failed_runs(&self) -> Result<Vec<FailedRun>, UqError> {
        Ok(self.snapshot()?.failed_runs())
    }

    /// Persists every table and the manifest into the work directory.
    pub fn save(&self) -> Result<CampaignManifest, UqError> {
        let mut apps = BTreeMap::new();
        for (name, state) in &self.apps {
            let table = state.builder.snapshot();
            apps.insert(
                name.clone(),
                state::save_app(&self.work_dir, &table, state.last_result.as_ref())?,
            );
        }
        let manifest = CampaignManifest {
            schema: MANIFEST_SCHEMA,
            provenance: state::provenance(&self.name, &self.config_hash, self.seeds.master()),
            rounds: self.rounds,
            active_app: self.active.clone(),
            apps,
        };
        state::write_manifest(&self.work_dir, &manifest)?;
        debug!(campaign = %self.name, rounds = self.rounds, "state saved");
        Ok(manifest)
    }

    /// Reloads one app's persisted table without re-running anything.
    pub fn load_table(work_dir: &Path, app: &str) -> Result<CollationTable, UqError> {
        state::load_table(work_dir, app)
    }
}

fn no_app() -> UqError {
    UqError::Config(ErrorInfo::new("app-none", "campaign has no app yet").with_hint("call add_app first"))
}

fn unknown_app(name: &str) -> UqError {
    UqError::Config(ErrorInfo::new("app-unknown", "no app with this name").with_context("app", name))
}
