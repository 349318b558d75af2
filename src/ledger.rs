use crate::calc::{self, AggregateTotals, Overview, PayrollCalculator, SectionIncome};
use crate::date::DateController;
use crate::errors::LedgerError;
use crate::loader::{Completion, FetchTarget, SectionLoader};
use crate::models::{ModelRef, NewMonth};
use crate::notes;
use crate::render::{NodeId, Origin, RenderTree, Renderer};
use crate::server::{Server, month_path};
use crate::snapshot::{Section, Snapshot, parse_fragment};
use crate::trends::{TrendReport, Visualization};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Whether the neighbouring month documents exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Neighbours {
    pub previous: bool,
    pub next: bool,
}

/// Everything the engine renders and derives for the displayed month.
/// Created once per session and torn down on every navigation.
#[derive(Debug, Clone)]
pub struct LedgerState {
    pub date: DateController,
    pub currency: String,
    pub tree: RenderTree,
    pub snapshot: Snapshot,
    pub totals: AggregateTotals,
    pub overview: Overview,
    pub trend: Option<TrendReport>,
    pub visualization: Option<Visualization>,
    pub neighbours: Neighbours,
    pub settled: bool,
    /// Whether investment amounts count toward income.
    pub investments_included: bool,
    pub(crate) open_inputs: BTreeSet<NodeId>,
    /// Investment amounts held back while they are excluded.
    pub(crate) held_investments: Vec<(NodeId, f64)>,
}

impl LedgerState {
    pub fn new(date: DateController, currency: impl Into<String>) -> Self {
        Self {
            date,
            currency: currency.into(),
            tree: RenderTree::new(),
            snapshot: Snapshot::default(),
            totals: AggregateTotals::default(),
            overview: Overview::default(),
            trend: None,
            visualization: None,
            neighbours: Neighbours::default(),
            settled: false,
            investments_included: true,
            open_inputs: BTreeSet::new(),
            held_investments: Vec::new(),
        }
    }

    fn teardown(&mut self) {
        self.tree.clear();
        self.snapshot = Snapshot::default();
        self.totals = AggregateTotals::default();
        self.overview = Overview::default();
        self.trend = None;
        self.visualization = None;
        self.neighbours = Neighbours::default();
        self.settled = false;
        self.investments_included = true;
        self.open_inputs.clear();
        self.held_investments.clear();
    }

    /// Document that owns a top-level section.
    pub fn section_model(&self, section: Section) -> ModelRef {
        match self.snapshot.remote_file(section) {
            Some(file) => ModelRef::Remote {
                file: file.to_string(),
                scope: Some(section.key().to_string()),
            },
            None => ModelRef::Local {
                section: section.key().to_string(),
            },
        }
    }

    pub fn is_input_open(&self, id: NodeId) -> bool {
        self.open_inputs.contains(&id)
    }
}

/// Client-side ledger engine: loads a month, keeps the render tree and
/// aggregates current, and pushes edits to the backend.
pub struct Ledger {
    pub(crate) server: Arc<dyn Server>,
    pub(crate) loader: SectionLoader,
    pub(crate) state: LedgerState,
    pub(crate) payroll: Box<dyn PayrollCalculator>,
}

impl Ledger {
    pub fn new(server: Arc<dyn Server>, date: DateController, currency: impl Into<String>) -> Self {
        Self {
            loader: SectionLoader::new(Arc::clone(&server)),
            server,
            state: LedgerState::new(date, currency),
            payroll: Box::new(SectionIncome),
        }
    }

    pub fn with_payroll(mut self, payroll: impl PayrollCalculator + 'static) -> Self {
        self.payroll = Box::new(payroll);
        self
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn date_mut(&mut self) -> &mut DateController {
        &mut self.state.date
    }

    pub fn loader(&self) -> &SectionLoader {
        &self.loader
    }

    /// Tears down the current month and starts fetching the cursor's month.
    /// Results of any earlier cycle still in flight are discarded.
    pub fn start(&mut self) {
        self.state.teardown();
        let generation = self.loader.begin();
        let month_key = self.state.date.current().to_string();
        info!("loading {month_key} (generation {})", generation.value());
        self.loader.request(FetchTarget::Root { month_key });
    }

    /// Processes completions until the current cycle settles.
    pub async fn drive(&mut self) {
        while let Some(completion) = self.loader.next().await {
            // render first so discovered remotes are counted before this one
            self.apply(completion);
            if self.loader.complete() {
                self.on_settled().await;
            }
        }
    }

    pub async fn load(&mut self) {
        self.start();
        self.drive().await;
    }

    pub async fn refresh(&mut self) {
        self.load().await;
    }

    /// Moves the cursor by `delta` months and loads it, creating the month
    /// document first when moving forward into a month that does not exist.
    ///
    /// When the backend cannot be asked, the cursor stays on the displayed
    /// month and the error is returned.
    pub async fn navigate(&mut self, delta: i32) -> Result<(), LedgerError> {
        let last = self.state.date.current().to_string();
        let next = self.state.date.advance(delta).to_string();

        if delta > 0 {
            if let Err(err) = self.ensure_month(&last, &next).await {
                self.state.date.advance(-delta);
                warn!("staying on {last}: {err}");
                return Err(err);
            }
        }

        self.load().await;
        Ok(())
    }

    async fn ensure_month(&self, last: &str, next: &str) -> Result<(), LedgerError> {
        if self.server.month_exists(next).await? {
            return Ok(());
        }
        let descriptor = NewMonth {
            last_month: self.state.date.previous_key(),
            file: month_path(next),
            raw_date: next.to_string(),
            raw_date_last: last.to_string(),
        };
        info!("creating month {next} from {last}");
        if !self.server.create_month(&descriptor).await? {
            warn!("backend refused to create {next}");
        }
        Ok(())
    }

    /// Back to the real current month.
    pub async fn reset_month(&mut self) {
        self.state.date.reset();
        self.load().await;
    }

    fn apply(&mut self, completion: Completion) {
        let path = completion.target.path();
        let document = match completion.result {
            Ok(document) => document,
            Err(err) => {
                match completion.target {
                    FetchTarget::Root { .. } => error!("month document unavailable: {err}"),
                    FetchTarget::Slot { .. } => warn!("remote section unavailable: {err}"),
                }
                return;
            }
        };

        let requests = match completion.target {
            FetchTarget::Root { .. } => {
                let snapshot = match Snapshot::parse(&path, &document) {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        error!("{err}");
                        return;
                    }
                };
                let mut renderer = Renderer::new(&mut self.state.tree, &self.state.date);
                for (section, value) in &snapshot.sections {
                    renderer.render_section(*section, value, ModelRef::Local {
                        section: section.key().to_string(),
                    });
                }
                self.state.snapshot = snapshot;
                renderer.finish()
            }
            FetchTarget::Slot { slot, key, file } => {
                let (value, keyed) = match parse_fragment(&path, &key, &document) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        warn!("{err}");
                        return;
                    }
                };
                let origin = Origin::new(ModelRef::Remote {
                    file,
                    scope: keyed.then_some(key),
                });
                let mut renderer = Renderer::new(&mut self.state.tree, &self.state.date);
                renderer.render_slot(slot, &value, origin);
                renderer.finish()
            }
        };

        for request in requests {
            self.loader.request(FetchTarget::Slot {
                slot: request.slot,
                key: request.key,
                file: request.file,
            });
        }
    }

    async fn on_settled(&mut self) {
        let counter = self.loader.counter();
        info!(
            "{} settled after {} fetches",
            self.state.date.current(),
            counter.completed()
        );
        self.state.settled = true;

        calc::init(&mut self.state, self.payroll.as_ref());
        calc::update_overview(&mut self.state);
        notes::augment(&mut self.state);

        if let Err(err) = self.compute_trends().await {
            warn!("{err}");
        }
        self.check_neighbours().await;
    }

    async fn check_neighbours(&mut self) {
        let next = self.state.date.next_key();
        let previous = self.state.date.previous_key();
        let (next, previous) = tokio::join!(self.server.month_exists(&next), self.server.month_exists(&previous));
        self.state.neighbours = Neighbours {
            next: next.unwrap_or(false),
            previous: previous.unwrap_or(false),
        };
    }

    /// Recomputes every aggregate from the rendered tree.
    pub fn recalculate(&mut self) {
        calc::init(&mut self.state, self.payroll.as_ref());
        calc::update_overview(&mut self.state);
    }
}
