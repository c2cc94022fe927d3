use crate::config::{ConfigError, ConfigStore, CoordinateMap, ItemCatalog, Point, TimingConfig, MEATS};
use crate::engine::{AutomationEngine, RunOutcome, WorkItem};
use crate::expr::{self, ExprError};
use crate::input::{EnigoDriver, InputDriver};
use crate::signals::RunSignals;
use log::warn;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{mpsc, Arc};
use std::thread;
use thiserror::Error;

// -------------- Session / Run Control --------------

/// Seconds granted to surface the target window before replay begins.
const START_GRACE_SECS: f64 = 5.0;

/// Only one category accepts the arithmetic-sum shorthand in its quantity
/// fields; everywhere else the text must be a plain decimal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CategoryKind {
    Plain,
    Arithmetic,
}

pub fn kind_of(category: &str) -> CategoryKind {
    if category == MEATS {
        CategoryKind::Arithmetic
    } else {
        CategoryKind::Plain
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum QuantityError {
    #[error("invalid quantity '{raw}' for '{item}'")]
    NotANumber { item: String, raw: String },
    #[error("expression '{raw}' for '{item}' is invalid: {source}")]
    BadExpression {
        item: String,
        raw: String,
        #[source]
        source: ExprError,
    },
}

/// Why a start request was refused before any background work began.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StartRefusal {
    #[error("a run is already active")]
    AlreadyRunning,
    #[error("coordinates are not calibrated")]
    NotCalibrated,
    /// Carries the validation warnings gathered while resolving entries, so
    /// the UI can still surface them even though the run never starts.
    #[error("no item has a usable quantity")]
    NoWork { warnings: Vec<String> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Paused,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RunEvent {
    Log(String),
    Progress { done: usize, total: usize },
    Finished(RunResult),
}

#[derive(Clone, Debug, PartialEq)]
pub enum RunResult {
    Completed,
    Interrupted,
    Failed(String),
}

/// Resolves raw quantity text to a positive number, or to nothing.
///
/// Blank and literal "0" are omitted. In the arithmetic category, text with
/// an operator is decimal-normalized and evaluated; a non-positive result is
/// omitted. Plain text parses as a decimal with comma accepted as the
/// separator, non-positive values omitted.
pub fn resolve_quantity(
    kind: CategoryKind,
    item: &str,
    raw: &str,
) -> Result<Option<f64>, QuantityError> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "0" {
        return Ok(None);
    }
    let normalized = raw.replace(',', ".");
    if kind == CategoryKind::Arithmetic && raw.contains(['+', '-', '*', '/']) {
        let value = expr::evaluate(&normalized).map_err(|source| QuantityError::BadExpression {
            item: item.to_string(),
            raw: raw.to_string(),
            source,
        })?;
        Ok((value > 0.0).then_some(value))
    } else {
        let value: f64 = normalized
            .parse()
            .map_err(|_| QuantityError::NotANumber {
                item: item.to_string(),
                raw: raw.to_string(),
            })?;
        Ok((value > 0.0).then_some(value))
    }
}

/// Applies `resolve_quantity` over the displayed entries, in display order.
/// Validation failures are logged as warnings and the entry skipped.
pub fn collect_work_items(
    kind: CategoryKind,
    entries: &[(String, String)],
    mut on_log: impl FnMut(String),
) -> Vec<WorkItem> {
    let mut work = Vec::new();
    for (name, raw) in entries {
        match resolve_quantity(kind, name, raw) {
            Ok(Some(quantity)) => {
                if kind == CategoryKind::Arithmetic && raw.contains(['+', '-', '*', '/']) {
                    on_log(format!("{name}: {} = {quantity:.3}", raw.trim()));
                }
                work.push(WorkItem {
                    name: name.clone(),
                    quantity,
                });
            }
            Ok(None) => {}
            Err(err) => {
                warn!("{err}");
                on_log(format!("Warning: {err}"));
            }
        }
    }
    work
}

/// Owns the catalog, the persisted configuration, the two run signals and
/// the run lifecycle. The UI drives it and drains its events every frame.
pub struct Session {
    store: ConfigStore,
    catalog: ItemCatalog,
    coordinates: Option<CoordinateMap>,
    timing: TimingConfig,
    signals: Arc<RunSignals>,
    phase: RunPhase,
    events: Option<Receiver<RunEvent>>,
    humanize: bool,
}

impl Session {
    pub fn open(store: ConfigStore, humanize: bool) -> Self {
        let catalog = store.load_catalog();
        let (coordinates, timing) = store.load_settings();
        Self {
            store,
            catalog,
            coordinates,
            timing,
            signals: Arc::new(RunSignals::new()),
            phase: RunPhase::Idle,
            events: None,
            humanize,
        }
    }

    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn is_calibrated(&self) -> bool {
        self.coordinates.is_some()
    }

    /// Stores the freshly captured coordinates and persists them. The
    /// in-memory map survives a failed save; the caller surfaces the error.
    pub fn calibrate(&mut self, search: Point, quantity: Point) -> Result<(), ConfigError> {
        let coordinates = CoordinateMap { search, quantity };
        self.coordinates = Some(coordinates);
        self.store.save_settings(&coordinates, &self.timing)
    }

    /// Resolves the entries into a work list and hands it to the engine on a
    /// fresh background thread. Returns the number of work items started.
    pub fn start_run(
        &mut self,
        kind: CategoryKind,
        entries: &[(String, String)],
    ) -> Result<usize, StartRefusal> {
        if self.phase != RunPhase::Idle {
            return Err(StartRefusal::AlreadyRunning);
        }
        let engine = AutomationEngine::new(self.coordinates, self.timing)
            .map_err(|_| StartRefusal::NotCalibrated)?;

        let mut notes = Vec::new();
        let work = collect_work_items(kind, entries, |line| notes.push(line));
        if work.is_empty() {
            return Err(StartRefusal::NoWork { warnings: notes });
        }

        self.signals.reset();
        let (tx, rx) = mpsc::channel();
        for note in notes {
            let _ = tx.send(RunEvent::Log(note));
        }
        let _ = tx.send(RunEvent::Log(format!(
            "Starting run with {} item(s)...",
            work.len()
        )));

        let signals = Arc::clone(&self.signals);
        let total = work.len();
        let driver = EnigoDriver::new(self.timing.input_pause, self.humanize);
        thread::spawn(move || run_to_completion(engine, driver, work, signals, tx));

        self.events = Some(rx);
        self.phase = RunPhase::Running;
        Ok(total)
    }

    /// Idempotent. Also releases the pause gate so a paused run observes the
    /// stop promptly instead of staying parked.
    pub fn request_stop(&mut self) {
        if self.phase == RunPhase::Idle {
            return;
        }
        self.signals.request_stop();
        self.phase = RunPhase::Running;
    }

    /// Flips between paused and running; no effect while idle or once a stop
    /// has been requested.
    pub fn toggle_pause(&mut self) -> RunPhase {
        if self.phase != RunPhase::Idle {
            let held = self.signals.toggle_pause();
            self.phase = if held {
                RunPhase::Paused
            } else {
                RunPhase::Running
            };
        }
        self.phase
    }

    /// Drains pending run events. Observing `Finished` returns the session
    /// to idle regardless of which terminal path the run took.
    pub fn poll_events(&mut self) -> Vec<RunEvent> {
        let mut drained = Vec::new();
        if let Some(events) = &self.events {
            while let Ok(event) = events.try_recv() {
                drained.push(event);
            }
        }
        if drained
            .iter()
            .any(|event| matches!(event, RunEvent::Finished(_)))
        {
            self.phase = RunPhase::Idle;
            self.events = None;
        }
        drained
    }
}

/// Run-thread body. Exactly one terminal `Finished` event is emitted no
/// matter how the run ends, so the UI always returns to idle.
fn run_to_completion(
    engine: AutomationEngine,
    mut driver: EnigoDriver,
    work: Vec<WorkItem>,
    signals: Arc<RunSignals>,
    tx: Sender<RunEvent>,
) {
    let log_tx = tx.clone();
    let progress_tx = tx.clone();
    let mut on_log = move |line: String| {
        let _ = log_tx.send(RunEvent::Log(line));
    };
    let mut on_progress = move |done: usize, total: usize| {
        let _ = progress_tx.send(RunEvent::Progress { done, total });
    };

    on_log(format!(
        "Waiting {START_GRACE_SECS} s for you to surface the target window..."
    ));
    driver.suspend(START_GRACE_SECS);

    let result = match engine.run(&mut driver, &work, &signals, &mut on_log, &mut on_progress) {
        Ok(RunOutcome::Completed) => RunResult::Completed,
        Ok(RunOutcome::Interrupted) => RunResult::Interrupted,
        Err(err) => RunResult::Failed(err.to_string()),
    };
    let _ = tx.send(RunEvent::Finished(result));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_and_zero_always_omit() {
        for kind in [CategoryKind::Plain, CategoryKind::Arithmetic] {
            assert_eq!(resolve_quantity(kind, "Rice", ""), Ok(None));
            assert_eq!(resolve_quantity(kind, "Rice", "  "), Ok(None));
            assert_eq!(resolve_quantity(kind, "Rice", "0"), Ok(None));
        }
    }

    #[test]
    fn test_plain_decimal_with_comma() {
        let got = resolve_quantity(CategoryKind::Plain, "Rice", "2,5").unwrap();
        assert_eq!(got, Some(2.5));
        let got = resolve_quantity(CategoryKind::Plain, "Rice", "3").unwrap();
        assert_eq!(got, Some(3.0));
    }

    #[test]
    fn test_plain_non_positive_omitted() {
        assert_eq!(resolve_quantity(CategoryKind::Plain, "Rice", "0,0"), Ok(None));
        assert_eq!(resolve_quantity(CategoryKind::Plain, "Rice", "-2"), Ok(None));
    }

    #[test]
    fn test_plain_non_numeric_is_an_error() {
        let err = resolve_quantity(CategoryKind::Plain, "Rice", "abc").unwrap_err();
        assert!(matches!(err, QuantityError::NotANumber { .. }));
    }

    #[test]
    fn test_arithmetic_sum_normalizes_commas() {
        let got = resolve_quantity(CategoryKind::Arithmetic, "Picanha", "25,5+12,6")
            .unwrap()
            .unwrap();
        assert!((got - 38.1).abs() < 1e-9);
    }

    #[test]
    fn test_arithmetic_only_in_enabled_category() {
        // In the plain category an operator makes the text non-numeric.
        let err = resolve_quantity(CategoryKind::Plain, "Rice", "1+2").unwrap_err();
        assert!(matches!(err, QuantityError::NotANumber { .. }));
    }

    #[test]
    fn test_arithmetic_malformed_is_an_error() {
        let err = resolve_quantity(CategoryKind::Arithmetic, "Picanha", "abc+1").unwrap_err();
        assert!(matches!(err, QuantityError::BadExpression { .. }));
    }

    #[test]
    fn test_arithmetic_non_positive_omitted() {
        assert_eq!(
            resolve_quantity(CategoryKind::Arithmetic, "Picanha", "2-5"),
            Ok(None)
        );
    }

    #[test]
    fn test_collect_preserves_display_order_and_warns() {
        let entries = vec![
            ("A".to_string(), "1".to_string()),
            ("B".to_string(), "0".to_string()),
            ("C".to_string(), "bogus".to_string()),
            ("D".to_string(), "2,5".to_string()),
        ];
        let mut logs = Vec::new();
        let work = collect_work_items(CategoryKind::Plain, &entries, |line| logs.push(line));
        let names: Vec<_> = work.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["A", "D"]);
        assert_eq!(logs.len(), 1);
        assert!(logs[0].contains("bogus"));
    }

    #[test]
    fn test_collect_logs_arithmetic_resolution() {
        let entries = vec![("Picanha".to_string(), "25,5+12,6".to_string())];
        let mut logs = Vec::new();
        let work = collect_work_items(CategoryKind::Arithmetic, &entries, |line| logs.push(line));
        assert_eq!(work.len(), 1);
        assert_eq!(logs, vec!["Picanha: 25,5+12,6 = 38.100"]);
    }

    #[test]
    fn test_kind_of_categories() {
        assert_eq!(kind_of(MEATS), CategoryKind::Arithmetic);
        assert_eq!(kind_of("KITCHEN"), CategoryKind::Plain);
        assert_eq!(kind_of("DRINKS"), CategoryKind::Plain);
    }

    fn idle_session() -> Session {
        let store = ConfigStore::new("items.txt".into(), "/nonexistent/coordinates.json".into());
        Session::open(store, false)
    }

    #[test]
    fn test_start_refused_without_calibration() {
        let mut session = idle_session();
        assert!(!session.is_calibrated());
        let entries = vec![("A".to_string(), "1".to_string())];
        assert_eq!(
            session.start_run(CategoryKind::Plain, &entries),
            Err(StartRefusal::NotCalibrated)
        );
        assert_eq!(session.phase(), RunPhase::Idle);
    }

    #[test]
    fn test_start_refused_with_empty_work_set() {
        let mut session = idle_session();
        // Save fails (unwritable path) but the in-memory coordinates survive.
        let search = Point { x: 1, y: 2 };
        let quantity = Point { x: 3, y: 4 };
        assert!(session.calibrate(search, quantity).is_err());
        assert!(session.is_calibrated());

        let entries = vec![("A".to_string(), "0".to_string())];
        assert_eq!(
            session.start_run(CategoryKind::Plain, &entries),
            Err(StartRefusal::NoWork {
                warnings: Vec::new()
            })
        );
        assert_eq!(session.phase(), RunPhase::Idle);
    }

    #[test]
    fn test_refused_start_keeps_validation_warnings() {
        let mut session = idle_session();
        let _ = session.calibrate(Point { x: 1, y: 2 }, Point { x: 3, y: 4 });

        let entries = vec![
            ("A".to_string(), "bogus".to_string()),
            ("B".to_string(), "0".to_string()),
        ];
        match session.start_run(CategoryKind::Plain, &entries) {
            Err(StartRefusal::NoWork { warnings }) => {
                assert_eq!(warnings.len(), 1);
                assert!(warnings[0].contains("bogus"));
            }
            other => panic!("expected NoWork with warnings, got {other:?}"),
        }
    }

    #[test]
    fn test_pause_toggle_is_a_no_op_while_idle() {
        let mut session = idle_session();
        assert_eq!(session.toggle_pause(), RunPhase::Idle);
        session.request_stop();
        assert_eq!(session.phase(), RunPhase::Idle);
    }
}
