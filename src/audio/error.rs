use thiserror::Error;

/// Failures reported back to the user who issued a command.
///
/// The `Display` text is the reply shown in chat.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("I'm already connected to a voice channel!")]
    AlreadyConnected,
    #[error("You must be connected to a voice channel!")]
    UserNotInVoice,
    #[error("I'm not connected to a voice channel.")]
    NotConnected,
    #[error("Please provide search terms.")]
    EmptyQuery,
    #[error("I wasn't able to find anything for `{0}`.")]
    NoMatches(String),
    #[error("I cannot pause when I'm not playing anything!")]
    NotPlaying,
    #[error("No current track to resume")]
    NotPaused,
    #[error("No current track playing")]
    NothingPlaying,
    #[error("Failed to {0}")]
    Backend(&'static str),
}

impl CommandError {
    /// Expected mistakes, as opposed to collaborator failures.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, CommandError::Backend(_))
    }
}

/// What a command handler shows the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
}

impl From<Result<String, CommandError>> for CommandOutcome {
    fn from(result: Result<String, CommandError>) -> Self {
        match result {
            Ok(message) => Self {
                success: true,
                message,
            },
            Err(error) => Self {
                success: false,
                message: error.to_string(),
            },
        }
    }
}
