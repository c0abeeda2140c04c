#![forbid(unsafe_code)]

mod keys;
mod terminal;
mod view;

pub use keys::{Action, InputMode, KEYBINDINGS, Keybinding, UiState};
pub use terminal::{Tui, restore_terminal, setup_terminal};

use anyhow::Result;
use config::Config;
use crossterm::event::{self, Event, KeyEventKind};
use monitor::{Monitor, Pid};
use std::time::Duration;
use tracing::{debug, info, warn};

const EVENT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Run the interactive front-end until the user quits.
pub async fn run(config: Config) -> Result<()> {
    let mut monitor = Monitor::system(config);
    if let Err(err) = monitor.refresh_now().await {
        warn!(%err, "initial process scan failed");
    }

    let mut terminal = setup_terminal()?;
    let result = run_loop(&mut terminal, &mut monitor).await;
    restore_terminal(&mut terminal)?;
    monitor.shutdown().await?;
    info!("interactive session ended");
    result
}

async fn run_loop(terminal: &mut Tui, monitor: &mut Monitor) -> Result<()> {
    let mut ui = UiState::default();

    loop {
        monitor.poll_events();

        let now = monitor.now();
        terminal.draw(|frame| view::render(frame, &mut ui, monitor.controller(), now))?;

        if event::poll(EVENT_POLL_TIMEOUT)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            let visible: Vec<Pid> = monitor
                .controller()
                .visible()
                .iter()
                .map(|record| record.pid)
                .collect();
            let recording = monitor.controller().session().is_recording();

            match ui.handle_key(key, &visible, recording) {
                Action::None => {}
                Action::Quit => break,
                Action::Dispatch(command) => {
                    // Failures already surface as notices in the status bar.
                    if let Err(err) = monitor.dispatch(command).await {
                        debug!(%err, "command failed");
                    }
                }
            }
        }
    }

    Ok(())
}
