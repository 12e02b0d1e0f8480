/// Terminal driver: owns the terminal for one dashboard run.
///
/// Sets up raw mode and the alternate screen, starts the scan and the
/// metrics sampler, then alternates between merging background updates,
/// drawing a frame and waiting up to one tick for a key press. The terminal
/// is restored on the way out whether or not the loop failed.
use crate::context::RunContext;
use crate::engine::FsDeletionEngine;
use crate::render;
use crate::state::{Dashboard, Input, Phase};
use crate::theme::Theme;

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use dirscope_core::delete::DeletionEngine;
use dirscope_core::metrics::{default_source, start_sampler};
use ratatui::{backend::Backend, backend::CrosstermBackend, Terminal};
use std::io;
use std::panic;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Run the dashboard until the user quits.
pub fn run(ctx: &RunContext) -> anyhow::Result<()> {
    let engine: Arc<dyn DeletionEngine> = Arc::new(FsDeletionEngine::new());
    let mut dashboard = Dashboard::new(
        ctx.config.clone(),
        ctx.root.clone(),
        Arc::clone(&ctx.cache),
        engine,
    );
    dashboard.start();
    match start_sampler(default_source(), ctx.config.sample_interval) {
        Ok(sampler) => dashboard.attach_sampler(sampler),
        Err(err) => warn!("Metrics strip disabled: {err}"),
    }

    install_panic_hook();
    let result = match setup_terminal() {
        Ok(mut terminal) => event_loop(&mut terminal, &mut dashboard, ctx.config.tick_rate),
        Err(err) => Err(err),
    };
    restore_terminal();

    info!("Dashboard closed");
    result
}

fn setup_terminal() -> anyhow::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

/// Undo whatever [`setup_terminal`] managed to do. Every step is attempted
/// even when an earlier one fails, and it is safe to call when setup failed
/// part way.
fn restore_terminal() {
    if let Err(err) = disable_raw_mode() {
        warn!("Could not leave raw mode: {err}");
    }
    if let Err(err) = execute!(io::stdout(), LeaveAlternateScreen, cursor::Show) {
        warn!("Could not restore the screen: {err}");
    }
}

/// Restore the terminal before the panic message is printed.
fn install_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, cursor::Show);
        original_hook(panic_info);
    }));
}

fn event_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    dashboard: &mut Dashboard,
    tick_rate: Duration,
) -> anyhow::Result<()> {
    let theme = Theme::dark();
    loop {
        dashboard.tick();
        terminal.draw(|f| render::draw(f, dashboard, &theme))?;
        if dashboard.should_quit() {
            return Ok(());
        }

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(input) = map_key(key, dashboard.phase()) {
                    dashboard.handle_input(input);
                }
            }
        }
    }
}

/// Translate a key press into a dashboard input. Bindings depend on the
/// phase so `y`/`n` and `r` only mean something where they apply.
pub fn map_key(key: KeyEvent, phase: Phase) -> Option<Input> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Input::Quit);
    }

    match phase {
        Phase::ConfirmingDelete => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => Some(Input::Confirm),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Some(Input::Cancel),
            KeyCode::Char('q') => Some(Input::Quit),
            _ => None,
        },
        Phase::Error => match key.code {
            KeyCode::Char('r') | KeyCode::Enter => Some(Input::Retry),
            KeyCode::Char('q') | KeyCode::Esc => Some(Input::Quit),
            _ => None,
        },
        Phase::Browsing | Phase::Scanning => match key.code {
            KeyCode::Up | KeyCode::Char('k') => Some(Input::Up),
            KeyCode::Down | KeyCode::Char('j') => Some(Input::Down),
            KeyCode::Home | KeyCode::Char('g') => Some(Input::Top),
            KeyCode::End | KeyCode::Char('G') => Some(Input::Bottom),
            KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => Some(Input::Enter),
            KeyCode::Backspace | KeyCode::Left | KeyCode::Char('h') => Some(Input::Back),
            KeyCode::Delete | KeyCode::Char('d') => Some(Input::Delete),
            KeyCode::Esc => Some(Input::Cancel),
            KeyCode::Char('R') => Some(Input::Rescan),
            KeyCode::Char('q') => Some(Input::Quit),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn browsing_keys() {
        assert_eq!(map_key(key(KeyCode::Char('j')), Phase::Browsing), Some(Input::Down));
        assert_eq!(map_key(key(KeyCode::Up), Phase::Browsing), Some(Input::Up));
        assert_eq!(map_key(key(KeyCode::Char('G')), Phase::Browsing), Some(Input::Bottom));
        assert_eq!(map_key(key(KeyCode::Backspace), Phase::Scanning), Some(Input::Back));
        assert_eq!(map_key(key(KeyCode::Char('d')), Phase::Browsing), Some(Input::Delete));
        assert_eq!(map_key(key(KeyCode::Esc), Phase::Scanning), Some(Input::Cancel));
        assert_eq!(map_key(key(KeyCode::Char('y')), Phase::Browsing), None);
    }

    #[test]
    fn confirm_prompt_only_takes_yes_or_no() {
        assert_eq!(
            map_key(key(KeyCode::Char('y')), Phase::ConfirmingDelete),
            Some(Input::Confirm)
        );
        assert_eq!(
            map_key(key(KeyCode::Esc), Phase::ConfirmingDelete),
            Some(Input::Cancel)
        );
        assert_eq!(map_key(key(KeyCode::Char('d')), Phase::ConfirmingDelete), None);
    }

    #[test]
    fn error_screen_offers_retry() {
        assert_eq!(map_key(key(KeyCode::Char('r')), Phase::Error), Some(Input::Retry));
        assert_eq!(map_key(key(KeyCode::Down), Phase::Error), None);
    }

    #[test]
    fn restore_is_harmless_when_setup_never_ran() {
        restore_terminal();
        restore_terminal();
    }

    #[test]
    fn ctrl_c_always_quits() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        for phase in [Phase::Browsing, Phase::Scanning, Phase::ConfirmingDelete, Phase::Error] {
            assert_eq!(map_key(ctrl_c, phase), Some(Input::Quit));
        }
    }
}
