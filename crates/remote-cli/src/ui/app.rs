use std::io;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use media_remote::config::Settings;
use media_remote::logging::LogRing;
use media_remote::remote::{MediaRemote, TickReport};
use ratatui::{Terminal, backend::CrosstermBackend, widgets::ListState};

use super::render;

pub(crate) fn run_tui(settings: Settings, logs: LogRing) -> Result<()> {
    let ui = UiState::new(&settings);
    let mut app = App {
        remote: MediaRemote::connect(settings),
        ui,
        logs,
    };

    let mut terminal = init_terminal()?;
    let res = ui_loop(&mut terminal, &mut app);
    restore_terminal(&mut terminal)?;
    app.remote.shutdown();
    res
}

/// What a key press asks of the remote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Intent {
    PlayPause,
    Seek(i64),
    Scrub(i64),
    CommitScrub,
    CancelScrub,
    Volume(i32),
    ToggleMute,
    /// Index into the player sheet.
    SelectPlayer(usize),
    Quit,
}

/// Remote state the key handler needs to know about.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct KeyContext {
    pub(crate) player_count: usize,
    pub(crate) current_index: Option<usize>,
    pub(crate) scrubbing: bool,
    pub(crate) log_count: usize,
}

pub(crate) struct UiState {
    pub(crate) sheet_open: bool,
    pub(crate) sheet_state: ListState,
    pub(crate) show_debug: bool,
    pub(crate) logs_open: bool,
    pub(crate) logs_scroll: usize,
    pub(crate) help_open: bool,
    pub(crate) status: String,
}

impl UiState {
    pub(crate) fn new(settings: &Settings) -> Self {
        Self {
            sheet_open: settings.player_sheet_open,
            sheet_state: ListState::default(),
            show_debug: settings.show_debug_info,
            logs_open: false,
            logs_scroll: 0,
            help_open: false,
            status: "Connecting".into(),
        }
    }

    pub(crate) fn handle_key(&mut self, key: KeyEvent, ctx: KeyContext) -> Option<Intent> {
        if key.code == KeyCode::Char('q') {
            return Some(Intent::Quit);
        }
        if self.logs_open {
            match key.code {
                KeyCode::Esc | KeyCode::Char('l') => self.toggle_logs(),
                KeyCode::Up => {
                    let max = ctx.log_count.saturating_sub(1);
                    self.logs_scroll = (self.logs_scroll + 1).min(max);
                }
                KeyCode::Down => self.logs_scroll = self.logs_scroll.saturating_sub(1),
                _ => {}
            }
            return None;
        }
        if self.help_open {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('h') | KeyCode::Char('?')) {
                self.help_open = false;
            }
            return None;
        }
        if self.sheet_open {
            return self.handle_sheet_key(key, ctx);
        }

        let shift = key.modifiers.contains(KeyModifiers::SHIFT);
        match key.code {
            KeyCode::Char(' ') => Some(Intent::PlayPause),
            KeyCode::Left if shift => Some(Intent::Scrub(-1)),
            KeyCode::Right if shift => Some(Intent::Scrub(1)),
            KeyCode::Left => Some(Intent::Seek(-1)),
            KeyCode::Right => Some(Intent::Seek(1)),
            KeyCode::Enter if ctx.scrubbing => Some(Intent::CommitScrub),
            KeyCode::Esc if ctx.scrubbing => Some(Intent::CancelScrub),
            KeyCode::Char('+') | KeyCode::Char('=') => Some(Intent::Volume(1)),
            KeyCode::Char('-') => Some(Intent::Volume(-1)),
            KeyCode::Char('m') => Some(Intent::ToggleMute),
            KeyCode::Char('p') => {
                self.open_sheet(ctx);
                None
            }
            KeyCode::Char('i') => {
                self.show_debug = !self.show_debug;
                None
            }
            KeyCode::Char('l') => {
                self.toggle_logs();
                None
            }
            KeyCode::Char('h') | KeyCode::Char('?') => {
                self.help_open = true;
                None
            }
            _ => None,
        }
    }

    fn handle_sheet_key(&mut self, key: KeyEvent, ctx: KeyContext) -> Option<Intent> {
        match key.code {
            KeyCode::Esc | KeyCode::Char('p') => self.sheet_open = false,
            KeyCode::Up => {
                let i = self.sheet_state.selected().unwrap_or(0);
                self.sheet_state.select(Some(i.saturating_sub(1)));
            }
            KeyCode::Down => {
                if ctx.player_count > 0 {
                    let i = self.sheet_state.selected().unwrap_or(0);
                    self.sheet_state.select(Some((i + 1).min(ctx.player_count - 1)));
                }
            }
            KeyCode::Enter => {
                let index = self.sheet_state.selected().filter(|i| *i < ctx.player_count)?;
                self.sheet_open = false;
                return Some(Intent::SelectPlayer(index));
            }
            _ => {}
        }
        None
    }

    fn open_sheet(&mut self, ctx: KeyContext) {
        self.sheet_open = true;
        let selected = ctx.current_index.or((ctx.player_count > 0).then_some(0));
        self.sheet_state.select(selected);
    }

    fn toggle_logs(&mut self) {
        self.logs_open = !self.logs_open;
        if !self.logs_open {
            self.logs_scroll = 0;
        }
    }
}

pub(crate) struct App {
    pub(crate) remote: MediaRemote,
    pub(crate) ui: UiState,
    pub(crate) logs: LogRing,
}

impl App {
    fn key_context(&self) -> KeyContext {
        let current = self.remote.store().current();
        KeyContext {
            player_count: self.remote.store().state().len(),
            current_index: current
                .and_then(|id| self.remote.store().players().position(|(pid, _)| pid == id)),
            scrubbing: self.remote.slider().is_dragging() && !self.remote.slider().is_loading(),
            log_count: self.logs.len(),
        }
    }

    /// Returns `false` when the user asked to quit.
    fn apply(&mut self, intent: Intent) -> bool {
        let step = self.remote.settings().seek_step_secs;
        match intent {
            Intent::PlayPause => self.remote.play_pause(),
            Intent::Seek(steps) => self.remote.seek(steps),
            Intent::Scrub(direction) => self.remote.scrub(direction * step),
            Intent::CommitScrub => self.remote.commit_scrub(),
            Intent::CancelScrub => self.remote.cancel_scrub(),
            Intent::Volume(direction) => self.remote.volume_step(direction),
            Intent::ToggleMute => self.remote.toggle_mute(),
            Intent::SelectPlayer(index) => {
                let id = self
                    .remote
                    .store()
                    .players()
                    .nth(index)
                    .map(|(id, _)| id.clone());
                if let Some(id) = id {
                    self.remote.select_player(&id);
                }
            }
            Intent::Quit => return false,
        }
        true
    }

    fn note_report(&mut self, report: &TickReport) {
        let store = self.remote.store();
        let name_of = |id: &str| store.get_player(id).map(|p| p.name.clone());
        if let Some(status) = report_status(report, name_of) {
            self.ui.status = status;
        }
    }
}

/// Status line for what happened during a tick, if anything worth showing.
pub(crate) fn report_status(
    report: &TickReport,
    name_of: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    if let Some(failed) = report.commands.iter().find_map(|o| {
        o.result
            .as_ref()
            .err()
            .map(|e| format!("{} failed: {e}", o.command.label()))
    }) {
        return Some(failed);
    }
    if let Some(url) = report.failed_streams.first() {
        return Some(format!("Event stream lost: {url}"));
    }
    report.switched_to.as_deref().map(|id| {
        let name = name_of(id).unwrap_or_else(|| id.to_string());
        format!("Controlling {name}")
    })
}

fn ui_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    let tick = Duration::from_millis(33);
    let mut last_tick = Instant::now();

    loop {
        let report = app.remote.tick();
        app.note_report(&report);

        terminal.draw(|f| render::draw(f, app))?;

        let timeout = tick.saturating_sub(last_tick.elapsed());
        if event::poll(timeout).context("poll terminal events")? {
            if let CEvent::Key(k) = event::read().context("read terminal event")? {
                if k.kind == KeyEventKind::Press {
                    let ctx = app.key_context();
                    if let Some(intent) = app.ui.handle_key(k, ctx) {
                        if !app.apply(intent) {
                            return Ok(());
                        }
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick {
            last_tick = Instant::now();
        }
    }
}

fn init_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("create terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
    Ok(())
}
