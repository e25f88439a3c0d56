use fahsetup::engine::progress::{Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

#[derive(Default)]
struct BarState {
    phase: Option<&'static str>,
    completed_phases: Vec<&'static str>,
}

/// Renders workflow [`Progress`] events as a spinner per phase that turns into a bar
/// while artifacts are being written.
#[derive(Clone)]
pub struct CliProgressHandler {
    pb: ProgressBar,
    state: Arc<Mutex<BarState>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let pb = ProgressBar::with_draw_target(Some(0), target)
            .with_style(Self::spinner_style())
            .with_message("Initializing...");

        Self {
            pb,
            state: Arc::new(Mutex::new(BarState::default())),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let handler = self.clone();
        Box::new(move |progress: Progress| handler.handle(progress))
    }

    fn handle(&self, progress: Progress) {
        let Ok(mut state) = self.state.lock() else {
            warn!("Progress state mutex was poisoned. Cannot update progress.");
            return;
        };
        let pb = &self.pb;

        match progress {
            Progress::PhaseStart { name } => {
                pb.reset();
                pb.set_length(0);
                pb.set_style(Self::spinner_style());
                pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                pb.set_message(name.to_string());
                state.phase = Some(name);
            }
            Progress::PhaseFinish => {
                pb.disable_steady_tick();
                let name = state.phase.take().unwrap_or("Done");
                pb.finish_with_message(format!("✓ {}", name));
                state.completed_phases.push(name);
            }
            Progress::TaskStart { total_steps } => {
                pb.disable_steady_tick();
                pb.reset();
                pb.set_length(total_steps);
                pb.set_position(0);
                pb.set_style(Self::bar_style());
            }
            Progress::TaskIncrement => pb.inc(1),
            Progress::TaskFinish => {
                let length = pb.length().unwrap_or(0);
                if pb.position() < length {
                    pb.set_position(length);
                }
            }
            Progress::Message(msg) => pb.println(format!("  {}", msg)),
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<20} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .with_key(
                "eta",
                |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
                },
            )
            .progress_chars("##-")
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn hidden_handler() -> CliProgressHandler {
        CliProgressHandler::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn handler_initializes_empty() {
        let handler = hidden_handler();
        assert_eq!(handler.pb.length(), Some(0));
        assert!(handler.state.lock().unwrap().phase.is_none());
    }

    #[test]
    fn callback_tracks_a_phase_with_artifact_task() {
        let handler = hidden_handler();
        let callback = handler.get_callback();

        callback(Progress::PhaseStart { name: "solvent" });
        assert_eq!(handler.pb.message(), "solvent");
        assert!(!handler.pb.is_finished());

        callback(Progress::TaskStart { total_steps: 9 });
        assert_eq!(handler.pb.length(), Some(9));
        assert_eq!(handler.pb.position(), 0);

        callback(Progress::TaskIncrement);
        callback(Progress::TaskIncrement);
        assert_eq!(handler.pb.position(), 2);

        callback(Progress::TaskFinish);
        assert_eq!(handler.pb.position(), 9);

        callback(Progress::PhaseFinish);
        assert!(handler.pb.is_finished());
        assert_eq!(handler.pb.message(), "✓ solvent");
        assert_eq!(handler.state.lock().unwrap().completed_phases, vec!["solvent"]);
    }

    #[test]
    fn consecutive_phases_reset_the_bar() {
        let handler = hidden_handler();
        let callback = handler.get_callback();

        callback(Progress::PhaseStart { name: "complex" });
        callback(Progress::TaskStart { total_steps: 9 });
        callback(Progress::TaskIncrement);
        callback(Progress::PhaseFinish);

        callback(Progress::PhaseStart { name: "vacuum" });
        assert_eq!(handler.pb.position(), 0);
        assert_eq!(handler.pb.message(), "vacuum");
        callback(Progress::Message("relaxation failed".to_string()));
        callback(Progress::PhaseFinish);

        assert_eq!(
            handler.state.lock().unwrap().completed_phases,
            vec!["complex", "vacuum"]
        );
    }

    #[test]
    fn callback_is_thread_safe() {
        let handler = hidden_handler();
        let callback = handler.get_callback();

        thread::spawn(move || {
            callback(Progress::PhaseStart {
                name: "Thread Test",
            });
            callback(Progress::TaskIncrement);
            callback(Progress::PhaseFinish);
        })
        .join()
        .unwrap();

        assert!(handler.pb.is_finished());
        assert_eq!(handler.pb.message(), "✓ Thread Test");
    }
}
