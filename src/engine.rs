use crate::config::{CoordinateMap, TimingConfig};
use crate::input::{InputDriver, InputError, InputKey};
use crate::signals::RunSignals;
use thiserror::Error;

// -------------- Automation Engine --------------

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("coordinates are not calibrated; calibrate before starting a run")]
    NotCalibrated,
    #[error("replaying '{item}' failed: {source}")]
    Replay {
        item: String,
        #[source]
        source: InputError,
    },
}

/// One (item name, resolved quantity) pair submitted for a single replay
/// sequence. Quantities are strictly positive by the time they get here.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkItem {
    pub name: String,
    pub quantity: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Interrupted,
}

/// Replays the fixed per-item input sequence at the calibrated coordinates.
/// Open loop: the delays are unconditional sleeps, never polls, because the
/// target application gives no completion signal.
pub struct AutomationEngine {
    coordinates: CoordinateMap,
    timing: TimingConfig,
}

impl AutomationEngine {
    pub fn new(
        coordinates: Option<CoordinateMap>,
        timing: TimingConfig,
    ) -> Result<Self, EngineError> {
        match coordinates {
            Some(coordinates) => Ok(Self {
                coordinates,
                timing,
            }),
            None => Err(EngineError::NotCalibrated),
        }
    }

    /// Processes the work list strictly in order. Stop and pause are observed
    /// at item boundaries only — a stop never interrupts an item mid-sequence,
    /// and input already sent to the target cannot be rolled back.
    pub fn run(
        &self,
        driver: &mut dyn InputDriver,
        work: &[WorkItem],
        signals: &RunSignals,
        on_log: &mut dyn FnMut(String),
        on_progress: &mut dyn FnMut(usize, usize),
    ) -> Result<RunOutcome, EngineError> {
        let total = work.len();
        for (index, item) in work.iter().enumerate() {
            signals.wait_at_boundary();
            if signals.stop.is_requested() {
                on_log("Run interrupted by user.".to_string());
                return Ok(RunOutcome::Interrupted);
            }

            on_log(format!(
                "Processing: {} | qty: {:.3}",
                item.name, item.quantity
            ));
            if let Err(source) = self.replay_item(driver, item) {
                let err = EngineError::Replay {
                    item: item.name.clone(),
                    source,
                };
                on_log(format!("ERROR: {err}"));
                return Err(err);
            }
            on_log(format!("Item '{}' processed.", item.name));
            on_progress(index + 1, total);
        }
        Ok(RunOutcome::Completed)
    }

    /// The four-step replay: search, quantity entry, confirm.
    fn replay_item(&self, driver: &mut dyn InputDriver, item: &WorkItem) -> Result<(), InputError> {
        let coords = &self.coordinates;

        driver.move_click(coords.search.x, coords.search.y)?;
        driver.select_all_and_clear()?;
        driver.type_text(&item.name)?;
        driver.press_key(InputKey::Enter)?;
        driver.suspend(self.timing.search_wait);

        driver.move_click(coords.quantity.x, coords.quantity.y)?;
        driver.select_all_and_clear()?;
        driver.type_text(&format_quantity(item.quantity))?;

        driver.press_key(InputKey::Tab)?;
        driver.suspend(self.timing.confirm_wait);
        driver.press_key(InputKey::Enter)?;
        Ok(())
    }
}

/// Decimal comma, per the target application's locale.
pub fn format_quantity(quantity: f64) -> String {
    format!("{quantity}").replace('.', ",")
}
