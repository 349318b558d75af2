use crate::errors::LedgerError;
use crate::render::NodeId;
use crate::server::{Server, remote_path};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::debug;

/// Monotonic id of a navigation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Expected/completed fetch bookkeeping for one load cycle.
///
/// `expected` grows while rendering discovers remote sections, so the
/// cycle is only settled once every discovered fetch has come back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadCounter {
    expected: usize,
    completed: usize,
    fired: bool,
}

impl LoadCounter {
    pub fn expect(&mut self) {
        self.expected += 1;
    }

    /// Records one finished fetch. Returns `true` exactly once, on the
    /// completion that settles the cycle.
    pub fn complete(&mut self) -> bool {
        if self.completed < self.expected {
            self.completed += 1;
        }
        if !self.fired && self.expected > 0 && self.completed == self.expected {
            self.fired = true;
            return true;
        }
        false
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn outstanding(&self) -> usize {
        self.expected - self.completed
    }

    pub fn is_settled(&self) -> bool {
        self.fired
    }
}

/// What a fetch result will be rendered into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTarget {
    Root { month_key: String },
    Slot { slot: NodeId, key: String, file: String },
}

impl FetchTarget {
    pub fn path(&self) -> String {
        match self {
            FetchTarget::Root { month_key } => crate::server::month_path(month_key),
            FetchTarget::Slot { file, .. } => remote_path(file),
        }
    }
}

#[derive(Debug)]
pub struct Completion {
    pub generation: Generation,
    pub target: FetchTarget,
    pub result: Result<Value, LedgerError>,
}

/// Issues month and remote-section fetches and hands their results back
/// in completion order, tagged with the generation that requested them.
pub struct SectionLoader {
    server: Arc<dyn Server>,
    generation: Generation,
    counter: LoadCounter,
    tx: UnboundedSender<Completion>,
    rx: UnboundedReceiver<Completion>,
}

impl SectionLoader {
    pub fn new(server: Arc<dyn Server>) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            server,
            generation: Generation::default(),
            counter: LoadCounter::default(),
            tx,
            rx,
        }
    }

    /// Starts a new cycle; results of earlier cycles are dropped from now on.
    pub fn begin(&mut self) -> Generation {
        self.generation = self.generation.next();
        self.counter = LoadCounter::default();
        self.generation
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn counter(&self) -> &LoadCounter {
        &self.counter
    }

    pub fn request(&mut self, target: FetchTarget) {
        self.counter.expect();
        let server = Arc::clone(&self.server);
        let tx = self.tx.clone();
        let generation = self.generation;
        debug!("fetching {} (generation {})", target.path(), generation.value());

        let fetch_target = target.clone();
        let fetch = tokio::spawn(async move {
            match &fetch_target {
                FetchTarget::Root { month_key } => server.fetch_month(month_key).await,
                FetchTarget::Slot { file, .. } => server.fetch_file(&remote_path(file)).await,
            }
        });

        // a fetch that panics still completes, so the cycle can settle
        tokio::spawn(async move {
            let result = fetch
                .await
                .unwrap_or_else(|err| Err(LedgerError::fetch(target.path(), err)));
            let path = target.path();
            if tx
                .send(Completion {
                    generation,
                    target,
                    result,
                })
                .is_err()
            {
                debug!("loader gone before {path} completed");
            }
        });
    }

    /// Next completion of the current cycle, or `None` once nothing is
    /// outstanding.
    pub async fn next(&mut self) -> Option<Completion> {
        while self.counter.outstanding() > 0 {
            let completion = self.rx.recv().await?;
            if completion.generation != self.generation {
                debug!(
                    "dropping stale result for {} (generation {}, current {})",
                    completion.target.path(),
                    completion.generation.value(),
                    self.generation.value()
                );
                continue;
            }
            return Some(completion);
        }
        None
    }

    /// Counts a processed completion; `true` when this settled the cycle.
    pub fn complete(&mut self) -> bool {
        self.counter.complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::fake::FakeServer;
    use serde_json::json;

    #[test]
    fn counter_settles_once() {
        let mut counter = LoadCounter::default();
        assert!(!counter.complete());
        counter.expect();
        counter.expect();
        assert!(!counter.complete());
        assert!(counter.complete());
        assert!(!counter.complete());
        assert!(counter.completed() <= counter.expected());
        assert!(counter.is_settled());
    }

    #[test]
    fn counter_grows_before_settling() {
        let mut counter = LoadCounter::default();
        counter.expect();
        // the root document discovers a remote section before it is counted
        counter.expect();
        assert!(!counter.complete());
        assert_eq!(counter.outstanding(), 1);
        assert!(counter.complete());
    }

    #[tokio::test]
    async fn errors_are_counted_so_the_cycle_ends() {
        let server = Arc::new(FakeServer::default());
        let mut loader = SectionLoader::new(server);
        loader.begin();
        loader.request(FetchTarget::Root {
            month_key: "2024_01".into(),
        });

        let completion = loader.next().await.expect("completion");
        assert!(completion.result.is_err());
        assert!(loader.complete());
        assert!(loader.next().await.is_none());
    }

    #[tokio::test]
    async fn panicking_fetch_is_counted_as_failed() {
        let server = Arc::new(FakeServer::default().panicking_on("data/2024_01.json"));
        let mut loader = SectionLoader::new(server);
        loader.begin();
        loader.request(FetchTarget::Root {
            month_key: "2024_01".into(),
        });

        let completion = loader.next().await.expect("completion");
        assert!(matches!(completion.result, Err(LedgerError::Fetch { .. })));
        assert!(loader.complete());
        assert!(loader.next().await.is_none());
    }

    #[tokio::test]
    async fn stale_generation_is_dropped() {
        let server = Arc::new(
            FakeServer::default()
                .with_file("data/2024_01.json", json!({"income": {"a": 1}}))
                .with_file("data/2024_02.json", json!({"income": {"b": 2}})),
        );
        let mut loader = SectionLoader::new(server);
        loader.begin();
        loader.request(FetchTarget::Root {
            month_key: "2024_01".into(),
        });
        let current = loader.begin();
        loader.request(FetchTarget::Root {
            month_key: "2024_02".into(),
        });

        let completion = loader.next().await.expect("completion");
        assert_eq!(completion.generation, current);
        assert_eq!(
            completion.target,
            FetchTarget::Root {
                month_key: "2024_02".into()
            }
        );
    }
}
