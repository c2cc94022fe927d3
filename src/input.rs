use enigo::{Key, KeyboardControllable, MouseButton, MouseControllable};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::Rng;
use std::thread;
use std::time::Duration;
use thiserror::Error;

// -------------- Input Simulation --------------

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("input device failure: {0}")]
    Device(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKey {
    Enter,
    Tab,
}

/// Capability surface the engine replays through. Kept narrow so the engine
/// can run against a scripted driver in tests.
pub trait InputDriver {
    fn move_click(&mut self, x: i32, y: i32) -> Result<(), InputError>;
    fn select_all_and_clear(&mut self) -> Result<(), InputError>;
    fn type_text(&mut self, text: &str) -> Result<(), InputError>;
    fn press_key(&mut self, key: InputKey) -> Result<(), InputError>;
    fn suspend(&mut self, seconds: f64);
}

static ENIGO: Lazy<Mutex<enigo::Enigo>> = Lazy::new(|| Mutex::new(enigo::Enigo::new()));

/// Reads the current pointer position without constructing a driver; used by
/// the calibration flow on the UI thread.
pub fn pointer_position() -> (i32, i32) {
    ENIGO.lock().mouse_location()
}

/// Production driver backed by the process-wide enigo handle. A fixed
/// `input_pause` follows every simulated event; the target application drops
/// input delivered faster than that.
pub struct EnigoDriver {
    input_pause: Duration,
    humanize: bool,
}

impl EnigoDriver {
    pub fn new(input_pause_secs: f64, humanize: bool) -> Self {
        Self {
            input_pause: Duration::from_secs_f64(input_pause_secs.max(0.0)),
            humanize,
        }
    }

    fn settle(&self) {
        thread::sleep(self.input_pause);
    }
}

impl InputDriver for EnigoDriver {
    fn move_click(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        {
            let mut enigo = ENIGO.lock();
            if self.humanize {
                glide_to(&mut enigo, x, y);
            } else {
                enigo.mouse_move_to(x, y);
            }
            enigo.mouse_click(MouseButton::Left);
        }
        self.settle();
        Ok(())
    }

    fn select_all_and_clear(&mut self) -> Result<(), InputError> {
        {
            let mut enigo = ENIGO.lock();
            enigo.key_down(Key::Control);
            enigo.key_click(Key::Layout('a'));
            enigo.key_up(Key::Control);
            enigo.key_click(Key::Delete);
        }
        self.settle();
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> Result<(), InputError> {
        ENIGO.lock().key_sequence(text);
        self.settle();
        Ok(())
    }

    fn press_key(&mut self, key: InputKey) -> Result<(), InputError> {
        let key = match key {
            InputKey::Enter => Key::Return,
            InputKey::Tab => Key::Tab,
        };
        ENIGO.lock().key_click(key);
        self.settle();
        Ok(())
    }

    fn suspend(&mut self, seconds: f64) {
        thread::sleep(Duration::from_secs_f64(seconds.max(0.0)));
    }
}

/// Moves the cursor along a cubic Bézier arc with a little jitter instead of
/// teleporting it, for targets that ignore instantaneous moves.
fn glide_to(enigo: &mut enigo::Enigo, end_x: i32, end_y: i32) {
    let (start_x, start_y) = enigo.mouse_location();
    let mut rng = rand::thread_rng();

    let control1_x = start_x + (end_x - start_x) / 3 + rng.gen_range(-20..=20);
    let control1_y = start_y + (end_y - start_y) / 3 + rng.gen_range(-20..=20);
    let control2_x = start_x + 2 * (end_x - start_x) / 3 + rng.gen_range(-20..=20);
    let control2_y = start_y + 2 * (end_y - start_y) / 3 + rng.gen_range(-20..=20);

    let distance = (((end_x - start_x).pow(2) + (end_y - start_y).pow(2)) as f64).sqrt();
    let steps = ((distance / 2.0) as i32).clamp(10, 50);

    for i in 0..=steps {
        let t = i as f64 / steps as f64;

        let x = (1.0 - t).powi(3) * start_x as f64
            + 3.0 * (1.0 - t).powi(2) * t * control1_x as f64
            + 3.0 * (1.0 - t) * t.powi(2) * control2_x as f64
            + t.powi(3) * end_x as f64;

        let y = (1.0 - t).powi(3) * start_y as f64
            + 3.0 * (1.0 - t).powi(2) * t * control1_y as f64
            + 3.0 * (1.0 - t) * t.powi(2) * control2_y as f64
            + t.powi(3) * end_y as f64;

        enigo.mouse_move_to(x as i32, y as i32);
        thread::sleep(Duration::from_millis(rng.gen_range(5..=15)));
    }
}
