//! The control session: every state change of the remote happens here.
//!
//! [`Session::update`] consumes one [`Message`] at a time and answers with the
//! [`Effect`]s the loop should start. Effects run elsewhere and report back as
//! messages, so nothing outside this module mutates the session.


use std::{sync::Arc, time::Duration};

use crate::{
    client::{Command, ControlClient, ControlError},
    state::{clamp_volume, PlayerState},
};

/// Volume change per key press
pub const VOLUME_STEP: i64 = 5;
/// Volume assumed before the first state report
pub const VOLUME_BASELINE: i64 = 0;
/// Delay of the second refresh after a command, for state the player reports late
pub const FOLLOW_UP_REFRESH_DELAY: Duration = Duration::from_millis(500);
/// Consecutive failed refreshes after which the player counts as gone
pub const MAX_FAILED_REFRESHES: u32 = 3;
/// Longest host the edit buffer accepts
pub const EDIT_BUFFER_LIMIT: usize = 256;

/// Terminal-independent key presses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Esc,
    Backspace,
    Up,
    Down,
    /// Ctrl-C
    Interrupt,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Normal,
    /// Keys go to the host edit buffer
    Editing { buffer: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connection {
    Disconnected,
    /// A probe is in flight
    Connecting,
    Connected,
}

/// Input to the session
#[derive(Debug)]
pub enum Message {
    Key(Key),
    /// The periodic refresh timer fired
    Tick,
    Probed {
        seq: u64,
        result: Result<(), ControlError>,
    },
    CommandFinished {
        command: Command,
        result: Result<(), ControlError>,
    },
    /// The delay scheduled after a command has elapsed
    FollowUpRefresh,
    Refreshed {
        seq: u64,
        result: Result<PlayerState, ControlError>,
    },
}

/// Asynchronous work requested by the session
#[derive(Debug)]
pub enum Effect {
    Probe {
        seq: u64,
        client: Arc<ControlClient>,
    },
    Command {
        command: Command,
        client: Arc<ControlClient>,
    },
    Refresh {
        seq: u64,
        client: Arc<ControlClient>,
    },
    /// Post [`Message::FollowUpRefresh`] after the delay
    RefreshAfter(Duration),
    Quit,
}

#[derive(Debug)]
pub struct Session {
    target_address: String,
    client: Option<Arc<ControlClient>>,
    connection: Connection,
    last_state: Option<PlayerState>,
    last_error: Option<String>,
    mode: Mode,
    show_help: bool,
    quitting: bool,
    /// Operations started but not yet reported back
    in_flight: usize,
    /// Last sequence number handed out
    seq: u64,
    /// Newest probe result applied so far
    applied_probe: u64,
    /// Newest refresh result applied so far
    applied_refresh: u64,
    failed_refreshes: u32,
}

impl Session {
    /// A session targeting `address`. Call [`Session::start`] to begin connecting.
    pub fn new(address: String) -> Self {
        Self {
            target_address: address,
            client: None,
            connection: Connection::Disconnected,
            last_state: None,
            last_error: None,
            mode: Mode::Normal,
            show_help: false,
            quitting: false,
            in_flight: 0,
            seq: 0,
            applied_probe: 0,
            applied_refresh: 0,
            failed_refreshes: 0,
        }
    }

    /// A session with no address yet, waiting for the user to type one.
    pub fn without_target(reason: &str) -> Self {
        let mut session = Self::new(String::new());
        session.last_error = Some(reason.to_owned());
        session.mode = Mode::Editing {
            buffer: String::new(),
        };
        session
    }

    pub fn target_address(&self) -> &str {
        &self.target_address
    }
    pub const fn connection(&self) -> Connection {
        self.connection
    }
    pub fn connected(&self) -> bool {
        self.connection == Connection::Connected
    }
    pub const fn last_state(&self) -> Option<&PlayerState> {
        self.last_state.as_ref()
    }
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
    /// Whether any connect, command or refresh is still outstanding
    pub const fn busy(&self) -> bool {
        self.in_flight > 0
    }
    pub fn editing(&self) -> bool {
        matches!(self.mode, Mode::Editing { .. })
    }
    pub fn edit_buffer(&self) -> Option<&str> {
        match &self.mode {
            Mode::Editing { buffer } => Some(buffer),
            Mode::Normal => None,
        }
    }
    pub const fn show_help(&self) -> bool {
        self.show_help
    }
    pub const fn quitting(&self) -> bool {
        self.quitting
    }

    /// Effects to run once the loop is up.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.target_address.is_empty() {
            return Vec::new();
        }
        self.connect()
    }

    /// Apply one message.
    pub fn update(&mut self, message: Message) -> Vec<Effect> {
        if self.quitting {
            return Vec::new();
        }
        match message {
            Message::Key(key) => self.handle_key(key),
            Message::Tick => self.refresh().into_iter().collect(),
            Message::Probed { seq, result } => {
                self.finished();
                self.handle_probe(seq, result)
            }
            Message::CommandFinished { command, result } => {
                self.finished();
                self.handle_command(command, result)
            }
            Message::FollowUpRefresh => {
                self.finished();
                self.refresh().into_iter().collect()
            }
            Message::Refreshed { seq, result } => {
                self.finished();
                self.handle_refresh(seq, result);
                Vec::new()
            }
        }
    }

    fn finished(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.in_flight += 1;
        self.seq
    }

    /// Replace the client for the current target and probe it.
    fn connect(&mut self) -> Vec<Effect> {
        match ControlClient::new(&self.target_address) {
            Ok(client) => {
                let client = Arc::new(client);
                self.client = Some(Arc::clone(&client));
                self.connection = Connection::Connecting;
                tracing::info!(address = %self.target_address, "Connecting");
                vec![Effect::Probe {
                    seq: self.next_seq(),
                    client,
                }]
            }
            Err(e) => {
                tracing::warn!(?e, "Unusable player address");
                self.client = None;
                self.connection = Connection::Disconnected;
                self.last_error = Some(e.to_string());
                Vec::new()
            }
        }
    }

    fn refresh(&mut self) -> Option<Effect> {
        let client = Arc::clone(self.client.as_ref()?);
        Some(Effect::Refresh {
            seq: self.next_seq(),
            client,
        })
    }

    fn dispatch(&mut self, command: Command) -> Vec<Effect> {
        let Some(client) = self.client.as_ref().map(Arc::clone) else {
            tracing::debug!(?command, "No player address, ignoring command");
            return Vec::new();
        };
        self.in_flight += 1;
        vec![Effect::Command { command, client }]
    }

    fn change_volume(&mut self, delta: i64) -> Vec<Effect> {
        let current = self
            .last_state
            .as_ref()
            .map_or(VOLUME_BASELINE, |s| s.volume);
        self.dispatch(Command::SetVolume(clamp_volume(current.saturating_add(delta))))
    }

    fn handle_key(&mut self, key: Key) -> Vec<Effect> {
        if key == Key::Interrupt {
            return self.quit();
        }
        match self.mode {
            Mode::Normal => self.handle_normal_key(key),
            Mode::Editing { .. } => self.handle_editing_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: Key) -> Vec<Effect> {
        match key {
            Key::Char('q') => self.quit(),
            Key::Char('?') => {
                self.show_help = !self.show_help;
                Vec::new()
            }
            Key::Char('e') => {
                self.mode = Mode::Editing {
                    buffer: self.target_address.clone(),
                };
                Vec::new()
            }
            Key::Char(' ') => self.dispatch(Command::Toggle),
            Key::Char('p') => self.dispatch(Command::Play),
            Key::Char('a') => self.dispatch(Command::Pause),
            Key::Char('s') => self.dispatch(Command::Stop),
            Key::Char('r') => self.refresh().into_iter().collect(),
            Key::Up => self.change_volume(VOLUME_STEP),
            Key::Down => self.change_volume(-VOLUME_STEP),
            _ => Vec::new(),
        }
    }

    fn handle_editing_key(&mut self, key: Key) -> Vec<Effect> {
        let Mode::Editing { buffer } = &mut self.mode else {
            return Vec::new();
        };
        match key {
            Key::Enter => {
                let address = buffer.trim().to_owned();
                if address.is_empty() {
                    return Vec::new();
                }
                self.commit_address(address)
            }
            Key::Esc => {
                self.mode = Mode::Normal;
                Vec::new()
            }
            Key::Backspace => {
                buffer.pop();
                Vec::new()
            }
            Key::Char(c) if buffer.chars().count() < EDIT_BUFFER_LIMIT => {
                buffer.push(c);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn commit_address(&mut self, address: String) -> Vec<Effect> {
        tracing::info!(%address, "Player address changed");
        self.mode = Mode::Normal;
        self.target_address = address;
        self.failed_refreshes = 0;
        // Whatever is still in flight was aimed at the previous address
        self.applied_probe = self.seq;
        self.applied_refresh = self.seq;
        let mut effects = self.connect();
        effects.extend(self.refresh());
        effects
    }

    fn quit(&mut self) -> Vec<Effect> {
        tracing::info!("Quitting");
        self.quitting = true;
        vec![Effect::Quit]
    }

    fn handle_probe(&mut self, seq: u64, result: Result<(), ControlError>) -> Vec<Effect> {
        if seq <= self.applied_probe {
            tracing::debug!(seq, applied = self.applied_probe, "Dropping stale probe result");
            return Vec::new();
        }
        self.applied_probe = seq;
        match result {
            Ok(()) => {
                tracing::info!(address = %self.target_address, "Connected");
                self.connection = Connection::Connected;
                self.last_error = None;
                self.failed_refreshes = 0;
                self.refresh().into_iter().collect()
            }
            Err(e) => {
                tracing::warn!(?e, "Probe failed");
                self.connection = Connection::Disconnected;
                self.last_error = Some(e.to_string());
                Vec::new()
            }
        }
    }

    fn handle_command(&mut self, command: Command, result: Result<(), ControlError>) -> Vec<Effect> {
        if let Err(e) = result {
            tracing::warn!(?e, ?command, "Command failed");
            self.last_error = Some(e.to_string());
        }
        // Re-sync whether or not the command went through
        let mut effects: Vec<_> = self.refresh().into_iter().collect();
        self.in_flight += 1;
        effects.push(Effect::RefreshAfter(FOLLOW_UP_REFRESH_DELAY));
        effects
    }

    fn handle_refresh(&mut self, seq: u64, result: Result<PlayerState, ControlError>) {
        if seq <= self.applied_refresh {
            tracing::debug!(seq, applied = self.applied_refresh, "Dropping stale refresh result");
            return;
        }
        self.applied_refresh = seq;
        match result {
            Ok(state) => {
                self.last_state = Some(state);
                self.last_error = None;
                self.failed_refreshes = 0;
                self.connection = Connection::Connected;
            }
            Err(e) => {
                tracing::warn!(?e, "Refresh failed");
                self.last_error = Some(e.to_string());
                self.failed_refreshes += 1;
                if self.failed_refreshes >= MAX_FAILED_REFRESHES
                    && self.connection == Connection::Connected
                {
                    tracing::warn!(failures = self.failed_refreshes, "Player stopped answering");
                    self.connection = Connection::Disconnected;
                }
            }
        }
    }
}
