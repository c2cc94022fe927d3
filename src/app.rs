use crate::config::Point;
use crate::input;
use crate::session::{
    kind_of, CategoryKind, RunEvent, RunPhase, RunResult, Session, StartRefusal,
};
use chrono::Local;
use eframe::egui;
use std::time::{Duration, Instant};

// -------------- UI State --------------

/// Countdown before each calibration capture, long enough to reach the
/// target window and hover the field.
const CAPTURE_COUNTDOWN: Duration = Duration::from_secs(5);

struct Entry {
    name: String,
    raw: String,
}

enum Calibration {
    Search { deadline: Instant },
    Quantity { deadline: Instant, search: Point },
}

struct Popup {
    title: &'static str,
    message: String,
}

impl Popup {
    fn info(message: impl Into<String>) -> Self {
        Self {
            title: "Done",
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            title: "Error",
            message: message.into(),
        }
    }
}

pub struct RunnerApp {
    session: Session,
    selected_category: String,
    filter: String,
    entries: Vec<Entry>,
    log_lines: Vec<String>,
    progress: Option<(usize, usize)>,
    calibration: Option<Calibration>,
    // Set when calibration was entered from Start, so the run continues
    // once the second capture lands.
    start_pending: bool,
    confirm_stop: bool,
    popup: Option<Popup>,
}

impl RunnerApp {
    pub fn new(session: Session) -> Self {
        let selected_category = session
            .catalog()
            .category_names()
            .next()
            .unwrap_or_default()
            .to_string();
        let mut app = Self {
            session,
            selected_category,
            filter: String::new(),
            entries: Vec::new(),
            log_lines: Vec::new(),
            progress: None,
            calibration: None,
            start_pending: false,
            confirm_stop: false,
            popup: None,
        };
        app.rebuild_entries();
        app
    }

    fn rebuild_entries(&mut self) {
        self.entries = self
            .session
            .catalog()
            .items(&self.selected_category)
            .iter()
            .map(|name| Entry {
                name: name.clone(),
                raw: "0".to_string(),
            })
            .collect();
    }

    fn push_log(&mut self, line: impl Into<String>) {
        self.log_lines.push(format!(
            "[{}] {}",
            Local::now().format("%H:%M:%S"),
            line.into()
        ));
    }

    fn clear_fields(&mut self) {
        for entry in &mut self.entries {
            entry.raw = "0".to_string();
        }
        self.push_log("Quantity fields cleared.");
    }

    fn start_clicked(&mut self, ctx: &egui::Context) {
        if !self.session.is_calibrated() {
            self.push_log("Calibration required before the first run.");
            self.begin_calibration(true);
            return;
        }
        let entries: Vec<(String, String)> = self
            .entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.raw.clone()))
            .collect();
        match self
            .session
            .start_run(kind_of(&self.selected_category), &entries)
        {
            Ok(total) => {
                self.progress = Some((0, total));
                self.push_log(format!("Category: {}", self.selected_category));
                ctx.send_viewport_cmd(egui::ViewportCommand::Minimized(true));
            }
            Err(refusal) => {
                if let StartRefusal::NoWork { warnings } = &refusal {
                    for warning in warnings.clone() {
                        self.push_log(warning);
                    }
                }
                self.popup = Some(Popup::error(refusal.to_string()));
            }
        }
    }

    fn begin_calibration(&mut self, then_start: bool) {
        self.start_pending = then_start;
        self.calibration = Some(Calibration::Search {
            deadline: Instant::now() + CAPTURE_COUNTDOWN,
        });
    }

    /// Persists the captured pair and, when calibration was entered from
    /// Start, carries straight on into the run.
    fn finish_calibration(&mut self, ctx: &egui::Context, search: Point, quantity: Point) {
        let start_pending = std::mem::take(&mut self.start_pending);
        match self.session.calibrate(search, quantity) {
            Ok(()) => {
                self.push_log("Calibration saved.");
                if start_pending {
                    self.start_clicked(ctx);
                }
            }
            Err(err) => {
                if start_pending {
                    self.push_log("Run not started.");
                }
                self.popup = Some(Popup::error(err.to_string()));
            }
        }
    }

    fn drive_calibration(&mut self, ctx: &egui::Context) {
        let Some(state) = self.calibration.take() else {
            return;
        };
        let now = Instant::now();
        let (label, deadline) = match &state {
            Calibration::Search { deadline } => ("search field", *deadline),
            Calibration::Quantity { deadline, .. } => ("quantity field", *deadline),
        };
        let remaining = deadline.saturating_duration_since(now);

        if remaining.is_zero() {
            let (x, y) = input::pointer_position();
            let point = Point { x, y };
            match state {
                Calibration::Search { .. } => {
                    self.push_log(format!("Search field captured at ({x}, {y})."));
                    self.calibration = Some(Calibration::Quantity {
                        deadline: now + CAPTURE_COUNTDOWN,
                        search: point,
                    });
                }
                Calibration::Quantity { search, .. } => {
                    self.push_log(format!("Quantity field captured at ({x}, {y})."));
                    self.finish_calibration(ctx, search, point);
                }
            }
            return;
        }

        let mut cancelled = false;
        egui::Window::new("Calibration")
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.label(format!("Hover the pointer over the target's {label}."));
                ui.label(format!("Capturing in {} s...", remaining.as_secs() + 1));
                if ui.button("Cancel").clicked() {
                    cancelled = true;
                }
            });
        if cancelled {
            self.cancel_calibration();
        } else {
            self.calibration = Some(state);
        }
    }

    fn cancel_calibration(&mut self) {
        self.calibration = None;
        self.push_log("Calibration cancelled.");
        if std::mem::take(&mut self.start_pending) {
            self.push_log("Run not started.");
        }
    }

    /// Terminal handling for a run; every path re-surfaces the window and
    /// leaves the session idle for the next run.
    fn finish_run(&mut self, ctx: &egui::Context, result: RunResult) {
        ctx.send_viewport_cmd(egui::ViewportCommand::Minimized(false));
        match result {
            RunResult::Completed => {
                self.push_log("Run completed.");
                self.popup = Some(Popup::info("Run completed successfully."));
            }
            RunResult::Interrupted => self.push_log("Run interrupted."),
            RunResult::Failed(message) => {
                self.push_log(format!("Run failed: {message}"));
                self.popup = Some(Popup::error(message));
            }
        }
        self.push_log("Ready for a new run.");
    }

    fn drain_run_events(&mut self, ctx: &egui::Context) {
        for event in self.session.poll_events() {
            match event {
                RunEvent::Log(line) => self.push_log(line),
                RunEvent::Progress { done, total } => self.progress = Some((done, total)),
                RunEvent::Finished(result) => self.finish_run(ctx, result),
            }
        }
    }

    fn show_controls(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        let phase = self.session.phase();
        let idle = phase == RunPhase::Idle;
        ui.horizontal(|ui| {
            if ui.add_enabled(idle, egui::Button::new("Start")).clicked() {
                self.start_clicked(ctx);
            }
            let pause_label = if phase == RunPhase::Paused {
                "Resume"
            } else {
                "Pause"
            };
            if ui
                .add_enabled(!idle, egui::Button::new(pause_label))
                .clicked()
            {
                let now = self.session.toggle_pause();
                self.push_log(if now == RunPhase::Paused {
                    "Run paused."
                } else {
                    "Run resumed."
                });
            }
            if ui.add_enabled(!idle, egui::Button::new("Stop")).clicked() {
                self.confirm_stop = true;
            }
            if ui
                .add_enabled(idle, egui::Button::new("Clear fields"))
                .clicked()
            {
                self.clear_fields();
            }
            if ui
                .add_enabled(idle && self.calibration.is_none(), egui::Button::new("Calibrate"))
                .clicked()
            {
                self.begin_calibration(false);
            }
        });
    }

    fn show_modals(&mut self, ctx: &egui::Context) {
        if self.confirm_stop {
            egui::Window::new("Stop run?")
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.label("Abandon the remaining items at the next item boundary?");
                    ui.horizontal(|ui| {
                        if ui.button("Stop").clicked() {
                            self.session.request_stop();
                            self.push_log("Stop requested...");
                            self.confirm_stop = false;
                        }
                        if ui.button("Keep running").clicked() {
                            self.confirm_stop = false;
                        }
                    });
                });
        }

        let mut dismiss = false;
        if let Some(popup) = &self.popup {
            egui::Window::new(popup.title)
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.label(&popup.message);
                    if ui.button("OK").clicked() {
                        dismiss = true;
                    }
                });
        }
        if dismiss {
            self.popup = None;
        }
    }
}

impl eframe::App for RunnerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_run_events(ctx);
        if self.session.phase() != RunPhase::Idle {
            ctx.request_repaint_after(Duration::from_millis(200));
        }
        if self.calibration.is_some() {
            self.drive_calibration(ctx);
            ctx.request_repaint_after(Duration::from_millis(100));
        }
        self.show_modals(ctx);

        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            ui.heading("Item Runner");
        });

        egui::TopBottomPanel::bottom("controls").show(ctx, |ui| {
            if let Some((done, total)) = self.progress {
                ui.add(
                    egui::ProgressBar::new(done as f32 / total.max(1) as f32)
                        .text(format!("{done}/{total}")),
                );
            }
            egui::ScrollArea::vertical()
                .id_source("log")
                .max_height(140.0)
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for line in &self.log_lines {
                        ui.monospace(line);
                    }
                });
            ui.separator();
            self.show_controls(ctx, ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                let names: Vec<String> = self
                    .session
                    .catalog()
                    .category_names()
                    .map(str::to_string)
                    .collect();
                for name in names {
                    let selected = self.selected_category == name;
                    if ui.selectable_label(selected, &name).clicked() && !selected {
                        self.selected_category = name;
                        self.filter.clear();
                        self.rebuild_entries();
                    }
                }
            });

            ui.horizontal(|ui| {
                ui.label("Filter:");
                ui.text_edit_singleline(&mut self.filter);
            });
            if kind_of(&self.selected_category) == CategoryKind::Arithmetic {
                ui.label("Quantities accept sums, e.g. 25,5+12,6");
            }
            ui.separator();

            let needle = self.filter.to_lowercase();
            egui::ScrollArea::vertical()
                .id_source("items")
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    egui::Grid::new("item_grid")
                        .num_columns(2)
                        .striped(true)
                        .show(ui, |ui| {
                            for entry in &mut self.entries {
                                if !needle.is_empty()
                                    && !entry.name.to_lowercase().contains(&needle)
                                {
                                    continue;
                                }
                                ui.label(&entry.name);
                                ui.add(
                                    egui::TextEdit::singleline(&mut entry.raw)
                                        .desired_width(140.0),
                                );
                                ui.end_row();
                            }
                            if self.entries.is_empty() {
                                ui.label(format!(
                                    "No items in category {}",
                                    self.selected_category
                                ));
                                ui.end_row();
                            }
                        });
                });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;

    fn app_with_store(dir: &tempfile::TempDir) -> RunnerApp {
        let store = ConfigStore::new(
            dir.path().join("items.txt"),
            dir.path().join("coordinates.json"),
        );
        RunnerApp::new(Session::open(store, false))
    }

    #[test]
    fn test_first_run_calibration_continues_into_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_store(&dir);
        let ctx = egui::Context::default();

        app.start_clicked(&ctx);
        assert!(matches!(app.calibration, Some(Calibration::Search { .. })));
        assert!(app.start_pending);

        app.finish_calibration(&ctx, Point { x: 10, y: 20 }, Point { x: 30, y: 40 });
        assert!(app.session.is_calibrated());
        assert!(!app.start_pending);
        // The start was re-attempted; with no usable quantities it is
        // refused, which surfaces as the popup.
        let popup = app.popup.as_ref().expect("refusal popup");
        assert_eq!(popup.title, "Error");
    }

    #[test]
    fn test_cancelled_calibration_drops_pending_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_store(&dir);
        app.begin_calibration(true);
        assert!(app.start_pending);

        app.cancel_calibration();
        assert!(!app.start_pending);
        assert!(app.calibration.is_none());
        assert!(!app.session.is_calibrated());
        assert!(app
            .log_lines
            .iter()
            .any(|line| line.contains("Run not started.")));
    }

    #[test]
    fn test_completed_run_raises_info_popup() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_store(&dir);
        let ctx = egui::Context::default();

        app.finish_run(&ctx, RunResult::Completed);
        let popup = app.popup.as_ref().expect("completion popup");
        assert_eq!(popup.title, "Done");

        app.popup = None;
        app.finish_run(&ctx, RunResult::Interrupted);
        assert!(app.popup.is_none());

        app.finish_run(&ctx, RunResult::Failed("device failure".into()));
        assert_eq!(app.popup.as_ref().expect("failure popup").title, "Error");
    }

    #[test]
    fn test_refused_start_surfaces_warnings_in_log() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("items.txt"), "[KITCHEN]\nRice\n").unwrap();
        let mut app = app_with_store(&dir);
        let ctx = egui::Context::default();
        app.session
            .calibrate(Point { x: 1, y: 2 }, Point { x: 3, y: 4 })
            .unwrap();

        app.entries[0].raw = "bogus".to_string();
        app.start_clicked(&ctx);

        assert!(app.log_lines.iter().any(|line| line.contains("bogus")));
        assert_eq!(app.popup.as_ref().expect("refusal popup").title, "Error");
        assert_eq!(app.session.phase(), RunPhase::Idle);
    }
}
