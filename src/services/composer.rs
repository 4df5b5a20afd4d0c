//! Terminal-style composer — the conversational form that collects a name,
//! then a message (optionally with an attached image), and submits both
//! through the storage proxy and the message repository in sequence.
//!
//! The transcript reproduces the script of the site's terminal widget.

use crate::services::message_service::MessageService;
use crate::services::storage_service::{BlobStore, StorageService, content_type_for};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Input that short-circuits the form into opening the board.
const BOARD_COMMAND: &str = "opslagstavle";

pub const INTRO_LINES: [&str; 3] = [
    "STRIK & DRIK TERMINAL",
    "Skriv en besked til vores opslagstavle...",
    "Indtast dit navn:",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComposerState {
    CollectingName,
    CollectingMessage,
    Sending,
    Done,
    Error,
}

/// Side effect requested from the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComposerSignal {
    None,
    /// The user typed the board command; navigate away from the form.
    OpenBoard,
}

/// Transcript lines plus an optional navigation signal.
#[derive(Debug)]
pub struct ComposerReply {
    pub lines: Vec<String>,
    pub signal: ComposerSignal,
}

impl ComposerReply {
    fn lines(lines: Vec<String>) -> Self {
        Self {
            lines,
            signal: ComposerSignal::None,
        }
    }
}

pub struct Composer<S: BlobStore> {
    state: ComposerState,
    name: Option<String>,
    attachment: Option<PathBuf>,
    storage: StorageService<S>,
    messages: MessageService,
}

impl<S: BlobStore> Composer<S> {
    pub fn new(storage: StorageService<S>, messages: MessageService) -> Self {
        Self {
            state: ComposerState::CollectingName,
            name: None,
            attachment: None,
            storage,
            messages,
        }
    }

    pub fn state(&self) -> ComposerState {
        self.state
    }

    /// Select an image to attach to the next submission.
    pub fn attach_image(&mut self, path: impl Into<PathBuf>) -> String {
        let path = path.into();
        let display = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.attachment = Some(path);
        format!("Billede valgt: {}", display)
    }

    /// Back to the start of the form. `Done` auto-resets through this.
    pub fn reset(&mut self) {
        self.state = ComposerState::CollectingName;
        self.name = None;
        self.attachment = None;
    }

    /// Feed one line of user input through the state machine.
    pub async fn input(&mut self, raw: &str) -> ComposerReply {
        let input = raw.trim();
        if input.is_empty() {
            return ComposerReply::lines(Vec::new());
        }

        if self.state == ComposerState::Done {
            self.reset();
        }

        if input.eq_ignore_ascii_case(BOARD_COMMAND) {
            return ComposerReply {
                lines: vec!["Omdirigerer til opslagstavlen...".into()],
                signal: ComposerSignal::OpenBoard,
            };
        }

        match self.state {
            ComposerState::CollectingName => {
                self.name = Some(input.to_string());
                self.state = ComposerState::CollectingMessage;
                ComposerReply::lines(vec!["Skriv din besked:".into()])
            }
            // After an error the user resubmits the message itself.
            ComposerState::CollectingMessage | ComposerState::Error => self.submit(input).await,
            ComposerState::Sending | ComposerState::Done => ComposerReply::lines(Vec::new()),
        }
    }

    /// Upload the attachment (if any), then save the message. Sequential:
    /// the insert waits for the upload result.
    async fn submit(&mut self, body: &str) -> ComposerReply {
        self.state = ComposerState::Sending;
        let mut lines = Vec::new();

        let image_url = if let Some(path) = self.attachment.clone() {
            lines.push("Uploader billede...".into());
            match self.upload(&path).await {
                Ok(url) => {
                    lines.push("Billede uploadet".into());
                    Some(url)
                }
                Err(err) => {
                    warn!("composer upload failed: {}", err);
                    return self.fail(lines, &err);
                }
            }
        } else {
            None
        };

        lines.push("Sender besked...".into());
        let name = self.name.clone().unwrap_or_default();
        match self.messages.save(&name, body, image_url).await {
            Ok(_) => {
                lines.push("Besked sendt!".into());
                lines.push("Din besked er nu synlig på opslagstavlen.".into());
                lines.push("Se den på /opslagstavle".into());
                self.state = ComposerState::Done;
                self.attachment = None;
                ComposerReply::lines(lines)
            }
            Err(err) => {
                warn!("composer save failed: {}", err);
                let text = err.to_string();
                self.fail(lines, &text)
            }
        }
    }

    async fn upload(&self, path: &Path) -> Result<String, String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| format!("Kunne ikke læse billede: {}", err))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "billede.jpg".into());
        let content_type = content_type_for(&filename);
        let stored = self
            .storage
            .store_image(&filename, Some(content_type), &bytes)
            .await
            .map_err(|err| err.to_string())?;
        Ok(stored.url)
    }

    /// Surface the raised message verbatim and park in the error state; the
    /// user resumes by entering the message again.
    fn fail(&mut self, mut lines: Vec<String>, err: impl std::fmt::Display) -> ComposerReply {
        lines.push(format!("Fejl: {}", err));
        lines.push("Prøv venligst igen".into());
        self.state = ComposerState::Error;
        ComposerReply::lines(lines)
    }
}

/// Drive the composer from stdin/stdout (`brevkasse --compose`).
///
/// `vedhæft <path>` attaches an image, anything else feeds the state
/// machine. The board command prints a pointer to the board and exits, like
/// the navigation in the browser widget.
pub async fn run_interactive<S: BlobStore>(mut composer: Composer<S>) -> anyhow::Result<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    for line in INTRO_LINES {
        println!("{}", line);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(path) = line.trim().strip_prefix("vedhæft ") {
            println!("{}", composer.attach_image(path.trim()));
            continue;
        }

        let reply = composer.input(&line).await;
        for out in &reply.lines {
            println!("{}", out);
        }
        if reply.signal == ComposerSignal::OpenBoard {
            println!("Åbn /opslagstavle i browseren.");
            break;
        }

        match composer.state() {
            ComposerState::Done => {
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                composer.reset();
                for line in INTRO_LINES {
                    println!("{}", line);
                }
            }
            ComposerState::Error => println!("Skriv din besked:"),
            _ => {}
        }
    }
    Ok(())
}
