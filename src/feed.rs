use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::catalog::{Catalog, CatalogItem};
use crate::gate::{Focus, GateState, NavigationGate};
use crate::shuffle::ShufflePool;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("cannot build a feed from an empty catalog")]
    EmptyCatalog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Items drawn behind the start item on initialization.
    pub lookahead: usize,
    pub batch_size: usize,
    /// Focus this close to the end of the feed triggers the next batch.
    pub prefetch_margin: usize,
    /// An interstitial follows every `cadence`-th content entry; 0 disables them.
    pub cadence: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lookahead: 4,
            batch_size: 3,
            prefetch_margin: 2,
            cadence: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub item: CatalogItem,
    /// 0-based position among content entries only.
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterstitialEntry {
    pub index: usize,
    /// Content position this marker follows.
    pub after_position: usize,
}

impl InterstitialEntry {
    pub fn slot(&self) -> String {
        format!("ad-{}", self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEntry {
    Content(ContentEntry),
    Interstitial(InterstitialEntry),
}

impl FeedEntry {
    pub fn as_content(&self) -> Option<&ContentEntry> {
        match self {
            FeedEntry::Content(entry) => Some(entry),
            FeedEntry::Interstitial(_) => None,
        }
    }

    pub fn as_interstitial(&self) -> Option<&InterstitialEntry> {
        match self {
            FeedEntry::Interstitial(entry) => Some(entry),
            FeedEntry::Content(_) => None,
        }
    }

    pub fn is_interstitial(&self) -> bool {
        matches!(self, FeedEntry::Interstitial(_))
    }
}

impl fmt::Display for FeedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedEntry::Content(entry) => write!(f, "#{} {}", entry.position + 1, entry.item.id),
            FeedEntry::Interstitial(entry) => write!(f, "[{}]", entry.slot()),
        }
    }
}

/// Receives the id of each content entry that gains focus, for shareable URLs.
pub trait AddressReporter: Send + Sync {
    fn report(&self, item_id: &str);
}

impl<F> AddressReporter for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, item_id: &str) {
        self(item_id)
    }
}

#[derive(Debug, Default)]
pub struct NoopReporter;

impl AddressReporter for NoopReporter {
    fn report(&self, _item_id: &str) {}
}

/// Items drawn for a batch that has not been materialized yet.
///
/// While one of these is outstanding further batch requests are dropped.
#[derive(Debug)]
#[must_use = "commit or abandon the batch to release the append guard"]
pub struct PendingBatch {
    items: Vec<CatalogItem>,
    epoch: u64,
}

impl PendingBatch {
    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusChange {
    pub gate: GateState,
    /// Entries appended by the prefetch this focus change triggered.
    pub appended: Vec<FeedEntry>,
}

/// One viewing session: shuffle pool, interleaved feed and navigation gate.
pub struct FeedSession<R = StdRng> {
    config: Config,
    pool: ShufflePool<R>,
    entries: Vec<FeedEntry>,
    content_len: usize,
    interstitial_len: usize,
    gate: NavigationGate,
    focused: Option<usize>,
    initialized: bool,
    batch_in_flight: bool,
    epoch: u64,
    reporter: Arc<dyn AddressReporter>,
}

impl FeedSession<StdRng> {
    pub fn new(config: Config) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<R: Rng> FeedSession<R> {
    pub fn with_rng(config: Config, rng: R) -> Self {
        Self {
            config,
            pool: ShufflePool::with_rng(Catalog::default(), rng),
            entries: Vec::new(),
            content_len: 0,
            interstitial_len: 0,
            gate: NavigationGate::new(),
            focused: None,
            initialized: false,
            batch_in_flight: false,
            epoch: 0,
            reporter: Arc::new(NoopReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn AddressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn set_reporter(&mut self, reporter: Arc<dyn AddressReporter>) {
        self.reporter = reporter;
    }

    /// Builds the opening feed: `start` followed by `lookahead` shuffled items
    /// from the rest of the catalog. Calling it again is a no-op.
    pub fn initialize(
        &mut self,
        start: CatalogItem,
        catalog: Catalog,
    ) -> Result<Vec<FeedEntry>, FeedError> {
        if self.initialized {
            tracing::debug!(start = %start.id, "feed already initialized; ignoring");
            return Ok(Vec::new());
        }
        if catalog.is_empty() {
            return Err(FeedError::EmptyCatalog);
        }
        if catalog.get(&start.id).is_none() {
            tracing::debug!(start = %start.id, "start item is not in the catalog; showing it standalone");
        }

        self.pool.rebind(catalog, Some(&start.id));
        self.initialized = true;

        let mut appended = self.push_content(start);
        for _ in 0..self.config.lookahead {
            if let Some(item) = self.pool.next_item() {
                appended.extend(self.push_content(item));
            }
        }
        tracing::info!(
            entries = self.entries.len(),
            catalog = self.pool.catalog().len(),
            "feed initialized"
        );
        Ok(appended)
    }

    /// Draws a batch of the configured size and appends it.
    pub fn append_batch(&mut self) -> Vec<FeedEntry> {
        self.append_batch_of(self.config.batch_size)
    }

    pub fn append_batch_of(&mut self, count: usize) -> Vec<FeedEntry> {
        match self.request_batch_of(count) {
            Some(batch) => self.commit_batch(batch),
            None => Vec::new(),
        }
    }

    pub fn request_batch(&mut self) -> Option<PendingBatch> {
        self.request_batch_of(self.config.batch_size)
    }

    /// Draws `count` items and takes the append guard. Returns `None` if the
    /// feed is not initialized or another batch is still in flight.
    pub fn request_batch_of(&mut self, count: usize) -> Option<PendingBatch> {
        if !self.initialized {
            tracing::debug!("batch requested before initialization; dropping");
            return None;
        }
        if self.batch_in_flight {
            tracing::debug!("batch already in flight; dropping request");
            return None;
        }
        self.batch_in_flight = true;
        let items = (0..count).filter_map(|_| self.pool.next_item()).collect();
        Some(PendingBatch {
            items,
            epoch: self.epoch,
        })
    }

    /// Materializes a pending batch, returning only the new entries.
    pub fn commit_batch(&mut self, batch: PendingBatch) -> Vec<FeedEntry> {
        if batch.epoch != self.epoch {
            tracing::debug!("batch belongs to a torn down feed; ignoring");
            return Vec::new();
        }
        self.batch_in_flight = false;
        let mut appended = Vec::new();
        for item in batch.items {
            appended.extend(self.push_content(item));
        }
        appended
    }

    /// Releases the append guard without materializing the batch. The drawn
    /// items are skipped for the rest of the current cycle.
    pub fn abandon_batch(&mut self, batch: PendingBatch) {
        if batch.epoch == self.epoch {
            self.batch_in_flight = false;
        }
    }

    pub fn batch_in_flight(&self) -> bool {
        self.batch_in_flight
    }

    /// Handles the host reporting a new visible entry.
    pub fn on_focus_changed(&mut self, entry_index: usize) -> FocusChange {
        let Some(entry) = self.entries.get(entry_index) else {
            tracing::debug!(entry_index, len = self.entries.len(), "focus outside feed; ignoring");
            return FocusChange {
                gate: self.gate.state(),
                appended: Vec::new(),
            };
        };
        self.focused = Some(entry_index);

        let mut appended = Vec::new();
        let gate = match entry {
            FeedEntry::Content(content) => {
                self.reporter.report(&content.item.id);
                let gate = self.gate.focus_on(Focus::Content);
                if entry_index + self.config.prefetch_margin >= self.entries.len() {
                    appended = self.append_batch();
                }
                gate
            }
            FeedEntry::Interstitial(interstitial) => {
                let gate = self.gate.focus_on(Focus::Interstitial(interstitial.index));
                if gate.is_locked() {
                    tracing::debug!(interstitial = interstitial.index, "navigation locked");
                }
                gate
            }
        };
        FocusChange { gate, appended }
    }

    /// Marks an interstitial as viewed. Signals for interstitials this feed
    /// never produced are ignored.
    pub fn on_interstitial_viewed(&mut self, interstitial_index: usize) -> GateState {
        if !self.initialized || interstitial_index >= self.interstitial_len {
            tracing::debug!(interstitial_index, "stale interstitial signal; ignoring");
            return self.gate.state();
        }
        if self.gate.complete(interstitial_index) {
            tracing::debug!(interstitial_index, gate = %self.gate.state(), "interstitial viewed");
        }
        self.gate.state()
    }

    /// Like `on_interstitial_viewed`, but only applies while the feed is still
    /// at `epoch`. Returns `None` when the signal targets a torn down feed.
    pub fn on_interstitial_viewed_in(
        &mut self,
        epoch: u64,
        interstitial_index: usize,
    ) -> Option<GateState> {
        if epoch != self.epoch {
            tracing::debug!(interstitial_index, epoch, current = self.epoch, "signal from a torn down feed; ignoring");
            return None;
        }
        Some(self.on_interstitial_viewed(interstitial_index))
    }

    /// Generation counter bumped by every `reset`.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Preview resources of up to `count` content entries after `from`.
    pub fn preload_hints(&self, from: usize, count: usize) -> Vec<String> {
        self.entries
            .iter()
            .skip(from.saturating_add(1))
            .filter_map(FeedEntry::as_content)
            .take(count)
            .map(|entry| entry.item.thumb.clone())
            .collect()
    }

    /// Drops the feed back to its uninitialized state. Pending batches and
    /// signals aimed at the old feed become no-ops.
    pub fn reset(&mut self) {
        self.pool.rebind(Catalog::default(), None);
        self.entries.clear();
        self.content_len = 0;
        self.interstitial_len = 0;
        self.gate = NavigationGate::new();
        self.focused = None;
        self.initialized = false;
        self.batch_in_flight = false;
        self.epoch += 1;
    }

    pub fn entries(&self) -> &[FeedEntry] {
        &self.entries
    }

    pub fn get(&self, entry_index: usize) -> Option<&FeedEntry> {
        self.entries.get(entry_index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn content_len(&self) -> usize {
        self.content_len
    }

    pub fn interstitial_len(&self) -> usize {
        self.interstitial_len
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn is_interstitial_complete(&self, interstitial_index: usize) -> bool {
        self.gate.is_completed(interstitial_index)
    }

    pub fn focused(&self) -> Option<usize> {
        self.focused
    }

    pub fn focused_entry(&self) -> Option<&FeedEntry> {
        self.focused.and_then(|idx| self.entries.get(idx))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn push_content(&mut self, item: CatalogItem) -> Vec<FeedEntry> {
        let position = self.content_len;
        self.content_len += 1;

        let mut appended = vec![FeedEntry::Content(ContentEntry { item, position })];
        let cadence = self.config.cadence;
        if cadence > 0 && (position + 1) % cadence == 0 {
            appended.push(FeedEntry::Interstitial(InterstitialEntry {
                index: self.interstitial_len,
                after_position: position,
            }));
            self.interstitial_len += 1;
        }
        self.entries.extend(appended.iter().cloned());
        appended
    }
}

impl<R> fmt::Debug for FeedSession<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedSession")
            .field("config", &self.config)
            .field("entries", &self.entries.len())
            .field("content_len", &self.content_len)
            .field("interstitial_len", &self.interstitial_len)
            .field("gate", &self.gate.state())
            .field("focused", &self.focused)
            .field("initialized", &self.initialized)
            .field("batch_in_flight", &self.batch_in_flight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    fn catalog(n: usize) -> Catalog {
        Catalog::new(
            (0..n)
                .map(|i| CatalogItem::new(format!("img{i}"), format!("t{i}"), format!("f{i}")))
                .collect(),
        )
    }

    fn session(seed: u64) -> FeedSession<StdRng> {
        FeedSession::with_rng(Config::default(), StdRng::seed_from_u64(seed))
    }

    fn started(n: usize, seed: u64) -> FeedSession<StdRng> {
        let catalog = catalog(n);
        let start = catalog.items()[0].clone();
        let mut feed = session(seed);
        feed.initialize(start, catalog).unwrap();
        feed
    }

    fn interstitial_positions(feed: &FeedSession<StdRng>) -> Vec<usize> {
        feed.entries()
            .iter()
            .filter_map(FeedEntry::as_interstitial)
            .map(|entry| entry.after_position + 1)
            .collect()
    }

    fn first_interstitial(feed: &FeedSession<StdRng>) -> usize {
        feed.entries()
            .iter()
            .position(FeedEntry::is_interstitial)
            .unwrap()
    }

    #[test]
    fn initialize_places_start_first_and_skips_it_in_lookahead() {
        let feed = started(20, 1);
        assert_eq!(feed.len(), 5 + 1);
        assert_eq!(feed.content_len(), 5);
        let ids: Vec<&str> = feed
            .entries()
            .iter()
            .filter_map(FeedEntry::as_content)
            .map(|entry| entry.item.id.as_str())
            .collect();
        assert_eq!(ids[0], "img0");
        assert!(!ids[1..].contains(&"img0"));
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 5);
        // fifth content entry is followed by the first interstitial
        assert!(feed.entries()[5].is_interstitial());
    }

    #[test]
    fn initialize_is_idempotent() {
        let catalog = catalog(10);
        let start = catalog.items()[3].clone();
        let mut feed = session(2);
        let first = feed.initialize(start.clone(), catalog.clone()).unwrap();
        let snapshot = feed.entries().to_vec();
        let second = feed.initialize(start, catalog).unwrap();
        assert_eq!(first.len(), 6);
        assert!(second.is_empty());
        assert_eq!(feed.entries(), snapshot.as_slice());
    }

    #[test]
    fn empty_catalog_is_rejected() {
        let mut feed = session(3);
        let err = feed
            .initialize(CatalogItem::new("x", "t", "i"), Catalog::default())
            .unwrap_err();
        assert_eq!(err, FeedError::EmptyCatalog);
        assert!(!feed.is_initialized());
    }

    #[test]
    fn unknown_start_item_is_standalone() {
        let catalog = catalog(3);
        let mut feed = session(4);
        feed.initialize(CatalogItem::new("outsider", "t", "i"), catalog)
            .unwrap();
        let ids: Vec<&str> = feed
            .entries()
            .iter()
            .filter_map(FeedEntry::as_content)
            .map(|entry| entry.item.id.as_str())
            .collect();
        assert_eq!(ids[0], "outsider");
        assert!(!ids[1..].contains(&"outsider"));
        // the first cycle is the whole catalog, untouched by the exclusion
        let first_cycle: HashSet<_> = ids[1..4].iter().collect();
        assert_eq!(first_cycle.len(), 3);
    }

    #[test]
    fn interstitials_follow_every_fifth_content_entry() {
        for sizes in [vec![1], vec![2, 5], vec![3], vec![4, 1, 6], vec![7]] {
            let mut feed = started(9, 5);
            let mut step = 0;
            while feed.content_len() < 40 {
                feed.append_batch_of(sizes[step % sizes.len()]);
                step += 1;
            }
            let m = feed.content_len();
            let expected: Vec<usize> = (1..=m / 5).map(|k| k * 5).collect();
            assert_eq!(interstitial_positions(&feed), expected, "batches {sizes:?}");

            let indices: Vec<usize> = feed
                .entries()
                .iter()
                .filter_map(FeedEntry::as_interstitial)
                .map(|entry| entry.index)
                .collect();
            assert_eq!(indices, (0..indices.len()).collect::<Vec<_>>());
        }
    }

    #[test]
    fn twelve_items_yield_two_interstitials() {
        let mut feed = started(30, 6);
        feed.append_batch_of(7);
        assert_eq!(feed.content_len(), 12);
        assert_eq!(interstitial_positions(&feed), vec![5, 10]);
        assert!(!feed.entries().last().unwrap().is_interstitial());
    }

    #[test]
    fn append_returns_only_new_entries() {
        let mut feed = started(30, 7);
        let before = feed.len();
        let appended = feed.append_batch();
        assert_eq!(appended.len(), 3);
        assert_eq!(feed.len(), before + 3);
        assert_eq!(&feed.entries()[before..], appended.as_slice());
        let positions: Vec<usize> = appended
            .iter()
            .filter_map(FeedEntry::as_content)
            .map(|entry| entry.position)
            .collect();
        assert_eq!(positions, vec![5, 6, 7]);
    }

    #[test]
    fn overlapping_batch_requests_append_once() {
        let mut feed = started(30, 8);
        let before = feed.len();
        let first = feed.request_batch().expect("first request");
        assert!(feed.request_batch().is_none());
        assert!(feed.append_batch().is_empty());
        let appended = feed.commit_batch(first);
        assert_eq!(appended.len(), 3);
        assert_eq!(feed.len(), before + 3);
        assert!(!feed.batch_in_flight());

        let again = feed.request_batch().expect("guard released");
        feed.abandon_batch(again);
        assert!(!feed.batch_in_flight());
    }

    #[test]
    fn focus_prefetches_near_the_end() {
        let mut feed = started(30, 9);
        // entries: c0 c1 c2 c3 c4 ad0
        let change = feed.on_focus_changed(1);
        assert!(change.appended.is_empty());
        let change = feed.on_focus_changed(4);
        assert_eq!(change.appended.len(), 3);
        assert_eq!(feed.len(), 9);
    }

    #[test]
    fn focus_reports_content_ids() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = seen.clone();
        let catalog = catalog(10);
        let start = catalog.items()[2].clone();
        let mut feed = session(10)
            .with_reporter(Arc::new(move |id: &str| sink.lock().push(id.to_string())));
        feed.initialize(start, catalog).unwrap();

        feed.on_focus_changed(0);
        let ad = first_interstitial(&feed);
        feed.on_focus_changed(ad);
        assert_eq!(seen.lock().as_slice(), ["img2".to_string()]);
    }

    #[test]
    fn gate_locks_until_interstitial_viewed() {
        let mut feed = started(30, 11);
        let ad = first_interstitial(&feed);

        assert_eq!(feed.on_focus_changed(ad).gate, GateState::Locked);
        assert_eq!(feed.on_interstitial_viewed(0), GateState::Unlocked);
        assert_eq!(feed.on_focus_changed(ad - 1).gate, GateState::Unlocked);
        // revisiting a completed interstitial does not relock
        assert_eq!(feed.on_focus_changed(ad).gate, GateState::Unlocked);
        assert_eq!(feed.on_interstitial_viewed(0), GateState::Unlocked);
    }

    #[test]
    fn content_focus_unlocks_pending_interstitial() {
        let mut feed = started(30, 12);
        let ad = first_interstitial(&feed);
        feed.on_focus_changed(ad);
        assert!(feed.gate_state().is_locked());
        assert_eq!(feed.on_focus_changed(0).gate, GateState::Unlocked);
        assert!(!feed.is_interstitial_complete(0));
        assert_eq!(feed.on_focus_changed(ad).gate, GateState::Locked);
    }

    #[test]
    fn unknown_signals_and_focus_are_ignored() {
        let mut feed = started(30, 13);
        let ad = first_interstitial(&feed);
        feed.on_focus_changed(ad);
        assert_eq!(feed.on_interstitial_viewed(99), GateState::Locked);
        let change = feed.on_focus_changed(500);
        assert_eq!(change.gate, GateState::Locked);
        assert_eq!(feed.focused(), Some(ad));
    }

    #[test]
    fn reset_discards_stale_work() {
        let mut feed = started(30, 14);
        let pending = feed.request_batch().unwrap();
        feed.reset();
        assert!(feed.is_empty());
        assert!(!feed.is_initialized());
        assert!(feed.commit_batch(pending).is_empty());
        assert_eq!(feed.on_interstitial_viewed(0), GateState::Unlocked);

        let catalog = catalog(4);
        let start = catalog.items()[0].clone();
        assert_eq!(feed.initialize(start, catalog).unwrap().len(), 6);
    }

    #[test]
    fn signal_from_before_reset_does_not_unlock_new_feed() {
        let mut feed = started(30, 18);
        let old_epoch = feed.epoch();
        feed.reset();
        let catalog = catalog(30);
        let start = catalog.items()[0].clone();
        feed.initialize(start, catalog).unwrap();

        assert_eq!(feed.on_interstitial_viewed_in(old_epoch, 0), None);
        let ad = first_interstitial(&feed);
        assert_eq!(feed.on_focus_changed(ad).gate, GateState::Locked);
        assert!(!feed.is_interstitial_complete(0));

        let current = feed.epoch();
        assert_eq!(
            feed.on_interstitial_viewed_in(current, 0),
            Some(GateState::Unlocked)
        );
    }

    #[test]
    fn single_item_catalog_keeps_cadence() {
        let mut feed = started(1, 15);
        feed.append_batch_of(6);
        assert_eq!(feed.content_len(), 11);
        assert!(feed
            .entries()
            .iter()
            .filter_map(FeedEntry::as_content)
            .all(|entry| entry.item.id == "img0"));
        assert_eq!(interstitial_positions(&feed), vec![5, 10]);
    }

    #[test]
    fn preload_hints_skip_interstitials() {
        let feed = started(30, 16);
        let hints = feed.preload_hints(3, 3);
        let expected: Vec<String> = feed
            .entries()
            .iter()
            .filter_map(FeedEntry::as_content)
            .skip(4)
            .map(|entry| entry.item.thumb.clone())
            .collect();
        assert_eq!(hints, expected);
        assert_eq!(hints.len(), 1);
    }

    #[test]
    fn zero_cadence_disables_interstitials() {
        let config = Config {
            cadence: 0,
            ..Config::default()
        };
        let catalog = catalog(8);
        let start = catalog.items()[0].clone();
        let mut feed = FeedSession::with_rng(config, StdRng::seed_from_u64(17));
        feed.initialize(start, catalog).unwrap();
        feed.append_batch_of(10);
        assert_eq!(feed.interstitial_len(), 0);
    }

    #[test]
    fn entry_display() {
        let content = FeedEntry::Content(ContentEntry {
            item: CatalogItem::new("abc", "t", "i"),
            position: 0,
        });
        let ad = FeedEntry::Interstitial(InterstitialEntry {
            index: 2,
            after_position: 14,
        });
        assert_eq!(content.to_string(), "#1 abc");
        assert_eq!(ad.to_string(), "[ad-2]");
    }
}
