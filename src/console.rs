//! Terminal kiosk front-end
//!
//! Renders session views as a running transcript and maps typed lines to
//! session commands. A typed line stands in for speech: it is delivered to
//! the recognizer feed as a final transcript.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};

use crate::Result;
use crate::locale::Strings;
use crate::session::{SessionCommand, SessionUpdate, SessionView, VoiceActivity};
use crate::speech::RecognizerFeed;

/// Countdown values announced on the console besides the first
const COUNTDOWN_ANNOUNCE_EVERY: u32 = 10;

/// What a typed line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Forward a command to the session
    Command(SessionCommand),
    /// Deliver text as if spoken
    Say(String),
    /// Nothing to do
    Ignore,
}

/// Interpret a typed line against the current view
#[must_use]
pub fn interpret(line: &str, view: &SessionView) -> Input {
    let line = line.trim();

    if let Some(command) = line.strip_prefix('/') {
        return match command.trim().to_lowercase().as_str() {
            "iniciar" | "start" => Input::Command(SessionCommand::StartTriage),
            "finalizar" | "finalize" => Input::Command(SessionCommand::Finalize),
            "destravar" | "unlock" => Input::Command(SessionCommand::EmergencyReset),
            "voltar" | "back" => Input::Command(SessionCommand::ReturnToWelcome),
            "sair" | "quit" | "exit" => Input::Command(SessionCommand::Shutdown),
            _ => Input::Ignore,
        };
    }

    if view.session_id.is_none() {
        return Input::Command(SessionCommand::StartTriage);
    }

    if !line.is_empty() {
        return Input::Say(line.to_string());
    }

    if view.controls.show_finalize {
        Input::Command(SessionCommand::Finalize)
    } else {
        Input::Command(SessionCommand::ToggleRecording)
    }
}

/// Lines to print for the change from `prev` to `view`
#[must_use]
pub fn render(prev: Option<&SessionView>, view: &SessionView, strings: &Strings) -> Vec<String> {
    let mut lines = Vec::new();
    let same_session = prev.is_some_and(|p| p.session_id == view.session_id);

    if view.session_id.is_none() {
        if !same_session {
            lines.push(String::new());
            lines.push(format!("== {} ==", strings.welcome_title));
            lines.push(strings.welcome_hint.to_string());
        }
        return lines;
    }

    if view.initializing && !prev.is_some_and(|p| same_session && p.initializing) {
        lines.push(strings.connecting.to_string());
    }

    let seen = if same_session {
        prev.map_or(0, |p| p.messages.len())
    } else {
        0
    };
    for message in view.messages.iter().skip(seen) {
        let label = if message.is_user() {
            strings.patient_label
        } else {
            strings.assistant_label
        };
        lines.push(format!("{label}: {}", message.text()));
    }

    if view.emergency_banner && !prev.is_some_and(|p| same_session && p.emergency_banner) {
        lines.push(format!("!!! {} !!!", strings.emergency_banner));
    }

    let prev_error = prev.filter(|_| same_session).and_then(|p| p.voice.error.as_deref());
    if let Some(error) = view.voice.error.as_deref()
        && prev_error != Some(error)
    {
        lines.push(format!("! {error}"));
    }

    let prev_activity = prev.filter(|_| same_session).map(|p| p.voice.activity);
    if prev_activity != Some(view.voice.activity) && !view.initializing {
        let hint = match view.voice.activity {
            VoiceActivity::Recording => strings.recording,
            VoiceActivity::Processing => strings.processing,
            VoiceActivity::Speaking => strings.speaking,
            VoiceActivity::Idle if view.controls.show_finalize => strings.finalize,
            VoiceActivity::Idle if view.controls.can_record => strings.idle,
            VoiceActivity::Idle => "",
        };
        if !hint.is_empty() {
            lines.push(format!("[{hint}]"));
        }
        if view.controls.show_unlock {
            lines.push(format!("  /destravar: {}", strings.unlock));
        }
    }

    let prev_countdown = prev.filter(|_| same_session).and_then(SessionView::countdown);
    if let Some(remaining) = view.countdown()
        && prev_countdown != Some(remaining)
        && (prev_countdown.is_none() || remaining % COUNTDOWN_ANNOUNCE_EVERY == 0 || remaining <= 5)
    {
        lines.push(strings.countdown(remaining));
    }

    lines
}

/// Interactive terminal front-end
pub struct Console {
    strings: &'static Strings,
    feed: RecognizerFeed,
    commands: mpsc::Sender<SessionCommand>,
    updates: broadcast::Receiver<SessionUpdate>,
    view: SessionView,
    pending: Option<String>,
}

impl Console {
    /// Create a console showing `initial` first
    #[must_use]
    pub const fn new(
        strings: &'static Strings,
        feed: RecognizerFeed,
        commands: mpsc::Sender<SessionCommand>,
        updates: broadcast::Receiver<SessionUpdate>,
        initial: SessionView,
    ) -> Self {
        Self {
            strings,
            feed,
            commands,
            updates,
            view: initial,
            pending: None,
        }
    }

    /// Read `input` and render updates to `output` until input ends or the session stops
    ///
    /// # Errors
    ///
    /// Returns error if reading input or writing output fails
    pub async fn run<R, W>(mut self, input: R, mut output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        write_lines(&mut output, &render(None, &self.view, self.strings)).await?;
        let mut lines = input.lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        tracing::debug!("console input closed");
                        let _ = self.commands.send(SessionCommand::Shutdown).await;
                        return Ok(());
                    };
                    if !self.handle_line(&line, &mut output).await? {
                        return Ok(());
                    }
                }
                update = self.updates.recv() => match update {
                    Ok(SessionUpdate::Changed(view)) => self.show(*view, &mut output).await?,
                    Ok(SessionUpdate::Notify(notification)) => {
                        let line = format!("* {}: {}", notification.title, notification.description);
                        write_lines(&mut output, &[line]).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "console lagging behind session updates");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
        }
    }

    /// Returns `false` once the session has been told to stop
    async fn handle_line<W>(&mut self, line: &str, output: &mut W) -> Result<bool>
    where
        W: AsyncWrite + Unpin,
    {
        match interpret(line, &self.view) {
            Input::Command(command) => {
                if self.commands.send(command).await.is_err() || command == SessionCommand::Shutdown {
                    return Ok(false);
                }
            }
            Input::Say(text) => {
                if self.view.voice.is_recording() {
                    self.feed.say(&text);
                } else if self.view.controls.can_record {
                    self.pending = Some(text);
                    if self.commands.send(SessionCommand::ToggleRecording).await.is_err() {
                        return Ok(false);
                    }
                } else {
                    let line = format!("! {}", self.strings.recording_unavailable);
                    write_lines(output, &[line]).await?;
                }
            }
            Input::Ignore => {}
        }
        Ok(true)
    }

    async fn show<W>(&mut self, view: SessionView, output: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        write_lines(output, &render(Some(&self.view), &view, self.strings)).await?;

        if view.voice.is_recording() {
            if let Some(text) = self.pending.take() {
                self.feed.say(&text);
            }
        } else if view.session_id.is_none() {
            self.pending = None;
        }

        self.view = view;
        Ok(())
    }
}

async fn write_lines<W>(output: &mut W, lines: &[String]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if lines.is_empty() {
        return Ok(());
    }
    let mut text = lines.join("\n");
    text.push('\n');
    output.write_all(text.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::conversation::ConversationStatus;
    use crate::locale::Locale;
    use crate::session::{Controls, Message, ReturnTimer, Screen, VoiceState};

    fn welcome() -> SessionView {
        SessionView {
            screen: Screen::Welcome,
            session_id: None,
            initializing: false,
            messages: Vec::new(),
            voice: VoiceState::default(),
            transcript: String::new(),
            status: ConversationStatus::Normal,
            timer: ReturnTimer::Normal,
            emergency_banner: false,
            controls: Controls {
                can_record: false,
                show_finalize: false,
                show_unlock: false,
                record_block: None,
            },
        }
    }

    fn active() -> SessionView {
        let mut view = welcome();
        view.screen = Screen::Active;
        view.session_id = Some(Uuid::new_v4());
        view.controls.can_record = true;
        view
    }

    #[test]
    fn enter_on_welcome_starts_triage() {
        assert_eq!(
            interpret("", &welcome()),
            Input::Command(SessionCommand::StartTriage)
        );
    }

    #[test]
    fn enter_in_session_toggles_or_finalizes() {
        let mut view = active();
        assert_eq!(
            interpret("", &view),
            Input::Command(SessionCommand::ToggleRecording)
        );

        view.controls.show_finalize = true;
        assert_eq!(interpret("  ", &view), Input::Command(SessionCommand::Finalize));
    }

    #[test]
    fn text_is_spoken_and_slash_commands_map() {
        let view = active();
        assert_eq!(
            interpret("estou com dor", &view),
            Input::Say("estou com dor".to_string())
        );
        assert_eq!(
            interpret("/destravar", &view),
            Input::Command(SessionCommand::EmergencyReset)
        );
        assert_eq!(interpret("/sair", &view), Input::Command(SessionCommand::Shutdown));
        assert_eq!(interpret("/???", &view), Input::Ignore);
    }

    #[test]
    fn renders_new_messages_only() {
        let strings = Locale::PtBr.strings();
        let mut before = active();
        before.messages.push(Message::assistant("Olá"));
        let mut after = before.clone();
        after.messages.push(Message::user("dor de cabeça"));

        let lines = render(Some(&before), &after, strings);
        assert_eq!(lines, vec!["Você: dor de cabeça".to_string()]);
    }

    #[test]
    fn renders_banner_and_countdown_once() {
        let strings = Locale::PtBr.strings();
        let before = active();
        let mut after = before.clone();
        after.emergency_banner = true;
        after.status = ConversationStatus::EmergencyAlert;
        after.timer = ReturnTimer::Alerting(30);

        let lines = render(Some(&before), &after, strings);
        assert!(lines.iter().any(|l| l.contains(strings.emergency_banner)));
        assert!(lines.contains(&strings.countdown(30)));

        let mut tick = after.clone();
        tick.timer = ReturnTimer::Alerting(29);
        assert!(render(Some(&after), &tick, strings).is_empty());
    }

    #[test]
    fn renders_welcome_after_session() {
        let strings = Locale::En.strings();
        let lines = render(Some(&active()), &welcome(), strings);
        assert!(lines.iter().any(|l| l.contains(strings.welcome_title)));
    }
}
