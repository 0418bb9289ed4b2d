//! Terminal presentation
//!
//! [`Renderer`] turns successive orchestrator snapshots into the lines that
//! need printing. [`Console`] reads commands from stdin and hands those lines
//! to a writer task that types assistant replies out.

use std::io::Write;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::Result;
use crate::conversation::{Role, Turn};
use crate::orchestrator::{Action, OrchestratorHandle, Phase, Snapshot};

const HELP: &str = "\
  <enter>     start / stop listening
  s, stop     stop speaking
  c, clear    clear the conversation
  h, help     show this help
  q, quit     exit";

/// A line of keyboard input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ToggleMic,
    StopSpeaking,
    Clear,
    Help,
    Quit,
    Unknown(String),
}

/// Parse one line typed at the prompt
#[must_use]
pub fn parse_command(line: &str) -> Command {
    match line.trim().to_lowercase().as_str() {
        "" => Command::ToggleMic,
        "s" | "stop" => Command::StopSpeaking,
        "c" | "clear" => Command::Clear,
        "h" | "help" | "?" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    }
}

/// What the microphone toggle does in `phase`
///
/// The toggle is ignored while a reply is pending.
#[must_use]
pub const fn mic_action(phase: Phase) -> Option<Action> {
    match phase {
        Phase::Idle => Some(Action::StartCapture),
        Phase::Capturing => Some(Action::StopCapture),
        Phase::AwaitingReply => None,
    }
}

/// Something to print
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A new transcript entry
    Turn(Turn),
    /// Live provisional transcript, overwritten in place
    Interim(String),
    Listening,
    Thinking(String),
    Speaking,
    Error(String),
    Cleared,
    /// Console text that isn't part of the conversation
    Notice(String),
}

/// Diffs snapshots against what has already been printed
#[derive(Debug)]
pub struct Renderer {
    persona: String,
    generation: u64,
    printed_turns: usize,
    phase: Phase,
    interim: String,
    error: Option<String>,
    speaking: bool,
}

impl Renderer {
    #[must_use]
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            generation: 0,
            printed_turns: 0,
            phase: Phase::Idle,
            interim: String::new(),
            error: None,
            speaking: false,
        }
    }

    /// Lines needed to bring the terminal up to date with `snapshot`
    pub fn update(&mut self, snapshot: &Snapshot) -> Vec<Line> {
        let mut lines = Vec::new();

        if snapshot.generation != self.generation {
            self.generation = snapshot.generation;
            self.printed_turns = 0;
            self.interim.clear();
            self.error = None;
            lines.push(Line::Cleared);
        }

        let new_turns = snapshot.turns.get(self.printed_turns..).unwrap_or_default();
        lines.extend(new_turns.iter().cloned().map(Line::Turn));
        self.printed_turns = snapshot.turns.len();

        if snapshot.phase != self.phase {
            match snapshot.phase {
                Phase::Capturing => lines.push(Line::Listening),
                Phase::AwaitingReply => lines.push(Line::Thinking(self.persona.clone())),
                Phase::Idle => {}
            }
            self.phase = snapshot.phase;
        }

        if snapshot.phase == Phase::Capturing
            && !snapshot.interim.is_empty()
            && snapshot.interim != self.interim
        {
            lines.push(Line::Interim(snapshot.interim.clone()));
        }
        self.interim.clone_from(&snapshot.interim);

        if snapshot.speaking && !self.speaking {
            lines.push(Line::Speaking);
        }
        self.speaking = snapshot.speaking;

        if snapshot.error != self.error {
            if let Some(error) = &snapshot.error {
                lines.push(Line::Error(error.clone()));
            }
            self.error.clone_from(&snapshot.error);
        }

        lines
    }
}

/// Label printed ahead of a turn, e.g. `You (14:05)`
#[must_use]
pub fn turn_label(turn: &Turn, persona: &str) -> String {
    let who = match turn.role() {
        Role::User => "You",
        Role::Assistant => persona,
    };
    format!("{who} ({})", turn.time_label())
}

/// Interactive terminal front end
pub struct Console {
    handle: OrchestratorHandle,
    renderer: Renderer,
    persona: String,
    typewriter_delay: Duration,
}

impl Console {
    #[must_use]
    pub fn new(handle: OrchestratorHandle, persona: &str, typewriter_delay: Duration) -> Self {
        Self {
            handle,
            renderer: Renderer::new(persona),
            persona: persona.to_string(),
            typewriter_delay,
        }
    }

    /// Read commands and render state until the user quits or stdin closes
    ///
    /// Output goes through a separate writer task, so a reply being typed out
    /// never delays the next command.
    ///
    /// # Errors
    ///
    /// Returns error if stdin can't be read or the orchestrator stops
    /// unexpectedly
    pub async fn run(mut self) -> Result<()> {
        let mut snapshots = self.handle.subscribe();
        let mut input = BufReader::new(tokio::io::stdin()).lines();

        let (lines, rx) = mpsc::unbounded_channel();
        let writer = Writer::new(std::io::stdout(), &self.persona, self.typewriter_delay);
        let writer = tokio::spawn(writer.run(rx));

        let _ = lines.send(Line::Notice(format!(
            "Talk to {}. Press Enter to start speaking.",
            self.persona
        )));
        let _ = lines.send(Line::Notice(format!("{HELP}\n")));

        let result = loop {
            tokio::select! {
                line = input.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => {
                            tracing::debug!("stdin closed");
                            break self.handle.shutdown();
                        }
                        Err(e) => break Err(e.into()),
                    };
                    match self.on_command(parse_command(&line), &lines) {
                        Ok(true) => {}
                        Ok(false) => break self.handle.shutdown(),
                        Err(e) => break Err(e),
                    }
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        tracing::debug!("orchestrator stopped");
                        break Ok(());
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    forward(&mut self.renderer, &snapshot, &lines);
                }
            }
        };

        writer.abort();
        result
    }

    /// Returns `false` when the user asked to quit
    fn on_command(&self, command: Command, lines: &mpsc::UnboundedSender<Line>) -> Result<bool> {
        match command {
            Command::ToggleMic => {
                if let Some(action) = mic_action(self.handle.snapshot().phase) {
                    self.handle.send(action)?;
                }
            }
            Command::StopSpeaking => self.handle.stop_speaking()?,
            Command::Clear => self.handle.clear()?,
            Command::Help => {
                let _ = lines.send(Line::Notice(HELP.to_string()));
            }
            Command::Quit => return Ok(false),
            Command::Unknown(other) => {
                let _ = lines.send(Line::Notice(format!(
                    "Unknown command '{other}'. Type h for help."
                )));
            }
        }
        Ok(true)
    }
}

/// Queue the lines `snapshot` adds for the writer
fn forward(renderer: &mut Renderer, snapshot: &Snapshot, lines: &mpsc::UnboundedSender<Line>) {
    for line in renderer.update(snapshot) {
        if lines.send(line).is_err() {
            tracing::debug!("console writer gone");
            return;
        }
    }
}

/// Prints queued lines in order, typing assistant replies out
struct Writer<W> {
    out: W,
    persona: String,
    typewriter_delay: Duration,
    interim_live: bool,
}

impl<W: Write> Writer<W> {
    fn new(out: W, persona: &str, typewriter_delay: Duration) -> Self {
        Self {
            out,
            persona: persona.to_string(),
            typewriter_delay,
            interim_live: false,
        }
    }

    async fn run(mut self, mut lines: mpsc::UnboundedReceiver<Line>) {
        while let Some(line) = lines.recv().await {
            if let Err(e) = self.print(line).await {
                tracing::warn!(error = %e, "terminal write failed");
                return;
            }
        }
    }

    async fn print(&mut self, line: Line) -> Result<()> {
        let out = &mut self.out;

        if self.interim_live {
            write!(out, "\r\x1b[2K")?;
            self.interim_live = false;
        }

        match line {
            Line::Turn(turn) => {
                writeln!(out, "{}", turn_label(&turn, &self.persona))?;
                match turn.role() {
                    Role::User => writeln!(out, "  {}", turn.text())?,
                    Role::Assistant => {
                        write!(out, "  ")?;
                        typewrite(out, turn.text(), self.typewriter_delay).await?;
                        writeln!(out)?;
                    }
                }
                writeln!(out)?;
            }
            Line::Interim(text) => {
                write!(out, "Listening… {text}")?;
                self.interim_live = true;
            }
            Line::Listening => writeln!(out, "Listening… (press Enter to stop)")?,
            Line::Thinking(name) => writeln!(out, "{name} is thinking...")?,
            Line::Speaking => writeln!(out, "Speaking… (type s to stop)")?,
            Line::Error(message) => writeln!(out, "! {message}")?,
            Line::Cleared => writeln!(out, "Conversation cleared.\n")?,
            Line::Notice(text) => writeln!(out, "{text}")?,
        }

        out.flush()?;
        Ok(())
    }
}

/// Reveal `text` one character at a time
async fn typewrite(out: &mut impl Write, text: &str, delay: Duration) -> Result<()> {
    if delay.is_zero() {
        write!(out, "{text}")?;
        return Ok(());
    }
    for ch in text.chars() {
        write!(out, "{ch}")?;
        out.flush()?;
        tokio::time::sleep(delay).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(phase: Phase, turns: Vec<Turn>) -> Snapshot {
        Snapshot {
            phase,
            turns,
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command(""), Command::ToggleMic);
        assert_eq!(parse_command("  \n"), Command::ToggleMic);
        assert_eq!(parse_command("S"), Command::StopSpeaking);
        assert_eq!(parse_command("clear"), Command::Clear);
        assert_eq!(parse_command("q"), Command::Quit);
        assert_eq!(parse_command("hello"), Command::Unknown("hello".to_string()));
    }

    #[test]
    fn test_mic_toggle_ignored_while_awaiting_reply() {
        assert_eq!(mic_action(Phase::Idle), Some(Action::StartCapture));
        assert_eq!(mic_action(Phase::Capturing), Some(Action::StopCapture));
        assert_eq!(mic_action(Phase::AwaitingReply), None);
    }

    #[test]
    fn test_renderer_prints_each_turn_once() {
        let mut renderer = Renderer::new("Sumanth SV");
        let question = Turn::user("what is your superpower");

        let lines = renderer.update(&snapshot(Phase::AwaitingReply, vec![question.clone()]));
        assert_eq!(
            lines,
            vec![
                Line::Turn(question.clone()),
                Line::Thinking("Sumanth SV".to_string())
            ]
        );

        let answer = Turn::assistant("I build AI systems.");
        let lines = renderer.update(&snapshot(Phase::Idle, vec![question, answer.clone()]));
        assert_eq!(lines, vec![Line::Turn(answer)]);
    }

    #[test]
    fn test_renderer_interim_and_error_once() {
        let mut renderer = Renderer::new("Ada");
        let mut snap = snapshot(Phase::Capturing, Vec::new());
        snap.interim = "what".to_string();

        assert_eq!(
            renderer.update(&snap),
            vec![Line::Listening, Line::Interim("what".to_string())]
        );
        assert!(renderer.update(&snap).is_empty());

        let mut failed = snapshot(Phase::Idle, Vec::new());
        failed.error = Some("No speech detected. Please try speaking again.".to_string());
        assert_eq!(
            renderer.update(&failed),
            vec![Line::Error(
                "No speech detected. Please try speaking again.".to_string()
            )]
        );
        assert!(renderer.update(&failed).is_empty());
    }

    #[test]
    fn test_renderer_detects_clear() {
        let mut renderer = Renderer::new("Ada");
        renderer.update(&snapshot(Phase::Idle, vec![Turn::user("hi")]));

        let mut cleared = snapshot(Phase::Idle, Vec::new());
        cleared.generation = 1;
        assert_eq!(renderer.update(&cleared), vec![Line::Cleared]);

        let next = Turn::user("again");
        let mut after = snapshot(Phase::Idle, vec![next.clone()]);
        after.generation = 1;
        assert_eq!(renderer.update(&after), vec![Line::Turn(next)]);
    }

    #[test]
    fn test_turn_label_uses_persona_name() {
        let turn = Turn::assistant("hello");
        assert!(turn_label(&turn, "Ada").starts_with("Ada ("));
        assert!(turn_label(&Turn::user("hi"), "Ada").starts_with("You ("));
    }

    #[tokio::test]
    async fn test_writer_types_reply_and_notices() {
        let mut writer = Writer::new(Vec::new(), "Ada", Duration::ZERO);
        writer.print(Line::Turn(Turn::assistant("hello there"))).await.unwrap();
        writer.print(Line::Notice("Unknown command 'x'. Type h for help.".to_string())).await.unwrap();

        let text = String::from_utf8(writer.out).unwrap();
        assert!(text.starts_with("Ada ("));
        assert!(text.contains("  hello there\n"));
        assert!(text.ends_with("Unknown command 'x'. Type h for help.\n"));
    }

    #[tokio::test]
    async fn test_writer_overwrites_interim() {
        let mut writer = Writer::new(Vec::new(), "Ada", Duration::ZERO);
        writer.print(Line::Interim("what is".to_string())).await.unwrap();
        writer.print(Line::Error("Network error".to_string())).await.unwrap();

        let text = String::from_utf8(writer.out).unwrap();
        assert_eq!(text, "Listening… what is\r\x1b[2K! Network error\n");
    }

    #[tokio::test]
    async fn test_slow_reply_does_not_hold_up_rendering() {
        let (lines, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(Writer::new(Vec::new(), "Ada", Duration::from_secs(1)).run(rx));
        let mut renderer = Renderer::new("Ada");

        let reply = Turn::assistant("A reply long enough to take minutes to type out.");
        let started = std::time::Instant::now();
        forward(&mut renderer, &snapshot(Phase::Idle, vec![reply.clone()]), &lines);
        tokio::task::yield_now().await;

        let mut capturing = snapshot(Phase::Capturing, vec![reply]);
        capturing.interim = "stop".to_string();
        forward(&mut renderer, &capturing, &lines);

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!writer.is_finished());
        writer.abort();
    }

    #[tokio::test]
    async fn test_typewrite_writes_all_text() {
        let mut out = Vec::new();
        typewrite(&mut out, "héllo", Duration::from_millis(1)).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "héllo");
    }
}
