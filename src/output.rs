//! Terminal frontend: draws the session and turns key presses into [`Key`]s.

use std::{
    fmt::Write as _,
    io::{self, Stdout, Write},
};

use anyhow::{Context as _, Result};
use crossterm::{
    cursor::{Hide, MoveTo, MoveToNextLine, Show},
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute, queue,
    style::{Print, PrintStyledContent, StyledContent, Stylize as _},
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::{future::ready, Stream, StreamExt as _};

use crate::{
    event_loop::session::{Connection, Key, Session},
    state::{PlaybackStatus, PlayerState},
};

const SHORT_HELP: &str = "space toggle • s stop • ↑/↓ volume • e edit host • r refresh • ? help • q quit";
const FULL_HELP: &[&str] = &[
    "space  toggle play/pause     p  play        a  pause      s  stop",
    "r      refresh state         ↑  volume up   ↓  volume down",
    "e      edit host URL         enter  save host             esc  cancel edit",
    "?      toggle help           q  quit",
];

/// Owns the terminal while the remote runs; restores it when dropped.
pub struct Terminal {
    out: Stdout,
}

impl Terminal {
    /// Switch to raw mode on the alternate screen.
    ///
    /// # Errors
    ///
    /// Fails if the terminal refuses raw mode or the escape sequences cannot be written.
    pub fn enter() -> Result<Self> {
        terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        let mut out = io::stdout();
        execute!(out, EnterAlternateScreen, Hide).context("Failed to enter alternate screen")?;
        Ok(Self { out })
    }

    /// Redraw the whole view.
    ///
    /// # Errors
    ///
    /// Fails if writing to the terminal fails.
    pub fn render(&mut self, session: &Session) -> Result<()> {
        queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        for line in view(session) {
            match line {
                Line::Plain(s) => queue!(self.out, Print(s))?,
                Line::Styled(parts) => {
                    for part in parts {
                        queue!(self.out, PrintStyledContent(part))?;
                    }
                }
            }
            queue!(self.out, MoveToNextLine(1))?;
        }
        self.out.flush()?;
        Ok(())
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if let Err(e) = execute!(self.out, Show, LeaveAlternateScreen) {
            tracing::warn!(?e, "Failed to leave alternate screen");
        }
        if let Err(e) = terminal::disable_raw_mode() {
            tracing::warn!(?e, "Failed to disable raw mode");
        }
    }
}

enum Line {
    Plain(String),
    Styled(Vec<StyledContent<String>>),
}

fn label(s: &str) -> StyledContent<String> {
    s.to_owned().dark_grey()
}

fn status_badge(state: Option<&PlayerState>) -> StyledContent<String> {
    let status = state.map_or(&PlaybackStatus::Unknown, |s| &s.status);
    match status {
        PlaybackStatus::Play => "PLAY".to_owned().green().bold(),
        PlaybackStatus::Pause => "PAUSE".to_owned().yellow().bold(),
        PlaybackStatus::Stop => "STOP".to_owned().grey().bold(),
        other => other.to_string().to_uppercase().dim(),
    }
}

fn format_seconds(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn view(session: &Session) -> Vec<Line> {
    let mut lines = vec![
        Line::Styled(vec!["Volumio Remote".to_owned().magenta().bold()]),
        Line::Styled(vec![
            label("Status: "),
            match session.connection() {
                Connection::Connected => "connected".to_owned().green(),
                Connection::Connecting => "connecting".to_owned().yellow(),
                Connection::Disconnected => "disconnected".to_owned().red(),
            },
            label("  Host: "),
            session.target_address().to_owned().white(),
        ]),
    ];

    if session.editing() {
        lines.push(Line::Plain(String::new()));
        lines.push(Line::Plain(format!(
            "Host: {}_",
            session.edit_buffer().unwrap_or_default()
        )));
        lines.push(Line::Styled(vec![
            "Press Enter to save, Esc to cancel".to_owned().dim(),
        ]));
    }

    let state = session.last_state();
    lines.push(Line::Plain(String::new()));
    lines.push(Line::Styled(vec![label("Playback: "), status_badge(state)]));
    let track = state.and_then(PlayerState::track_line).unwrap_or_else(|| "-".to_owned());
    lines.push(Line::Styled(vec![label("Track:    "), track.white()]));
    let volume = state.map_or_else(|| "-".to_owned(), |s| format!("{}%", s.volume));
    lines.push(Line::Styled(vec![label("Volume:   "), volume.white()]));
    if let Some(state) = state {
        let mut position = format_seconds(state.seek / 1000);
        if state.duration > 0.0 {
            let _ = write!(position, " / {}", format_seconds(state.duration as u64));
        }
        lines.push(Line::Styled(vec![label("Position: "), position.white()]));
        let flags = [("repeat", state.repeat), ("random", state.random), ("consume", state.consume)]
            .into_iter()
            .filter_map(|(name, on)| on.then_some(name))
            .collect::<Vec<_>>();
        if !flags.is_empty() {
            lines.push(Line::Styled(vec![label("Modes:    "), flags.join(", ").white()]));
        }
        if let Some(format) = state.format_line() {
            lines.push(Line::Styled(vec![label("Format:   "), format.white()]));
        }
    }

    if let Some(e) = session.last_error() {
        lines.push(Line::Plain(String::new()));
        lines.push(Line::Styled(vec![format!("Error: {e}").red()]));
    }
    if session.busy() {
        lines.push(Line::Plain(String::new()));
        lines.push(Line::Styled(vec!["Working...".to_owned().dim()]));
    }

    lines.push(Line::Plain(String::new()));
    if session.show_help() {
        lines.extend(FULL_HELP.iter().map(|l| Line::Styled(vec![(*l).to_owned().dim()])));
    } else {
        lines.push(Line::Styled(vec![SHORT_HELP.to_owned().dim()]));
    }
    lines
}

fn map_key(event: KeyEvent) -> Option<Key> {
    if event.kind != KeyEventKind::Press {
        return None;
    }
    Some(match event.code {
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => Key::Interrupt,
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Enter => Key::Enter,
        KeyCode::Esc => Key::Esc,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        _ => return None,
    })
}

/// Key presses from the terminal. Ends if the terminal stops producing events.
pub fn key_stream() -> impl Stream<Item = Key> + Unpin {
    EventStream::new()
        .filter_map(|event| {
            ready(match event {
                Ok(Event::Key(key)) => map_key(key),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(?e, "Failed to read terminal event");
                    None
                }
            })
        })
        .boxed_local()
}
