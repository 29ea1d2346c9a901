use serenity::model::id::{ChannelId, GuildId};

use crate::audio::{error::CommandOutcome, player::MusicPlayer};

/// A prefix command understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join,
    Leave,
    Play(String),
    Pause,
    Resume,
    Stop,
    Skip,
    Queue,
    ClearQueue,
    NowPlaying,
}

impl Command {
    /// Parses `content` if it starts with `prefix` and names a known command.
    ///
    /// Command names are case-insensitive; everything after the name is the
    /// argument, trimmed.
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        let body = content.trim_start().strip_prefix(prefix)?;
        let (name, args) = match body.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (body, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "join" => Command::Join,
            "leave" => Command::Leave,
            "play" => Command::Play(args.to_string()),
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "stop" => Command::Stop,
            "skip" => Command::Skip,
            "queue" => Command::Queue,
            "clearqueue" => Command::ClearQueue,
            "nowplaying" | "np" => Command::NowPlaying,
            _ => return None,
        };
        Some(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Join => "join",
            Command::Leave => "leave",
            Command::Play(_) => "play",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop => "stop",
            Command::Skip => "skip",
            Command::Queue => "queue",
            Command::ClearQueue => "clearqueue",
            Command::NowPlaying => "nowplaying",
        }
    }
}

/// Where a command came from.
#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    pub guild_id: GuildId,
    pub text_channel_id: ChannelId,
    /// Voice channel the author is in, if any.
    pub author_voice_channel: Option<ChannelId>,
}

pub async fn execute(
    player: &MusicPlayer,
    command: Command,
    invocation: Invocation,
) -> CommandOutcome {
    let guild_id = invocation.guild_id;
    match command {
        Command::Join => {
            player
                .join(
                    guild_id,
                    invocation.author_voice_channel,
                    invocation.text_channel_id,
                )
                .await
        }
        Command::Leave => player.leave(guild_id).await,
        Command::Play(query) => player.play(guild_id, &query).await,
        Command::Pause => player.pause(guild_id).await,
        Command::Resume => player.resume(guild_id).await,
        Command::Stop => player.stop(guild_id).await,
        Command::Skip => player.skip(guild_id).await,
        Command::Queue => player.queue(guild_id).await,
        Command::ClearQueue => player.clear_queue(guild_id).await,
        Command::NowPlaying => player.now_playing(guild_id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{tracks, Harness, GUILD, TEXT, VOICE};
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_known_commands() {
        assert_eq!(Command::parse("!", "!join"), Some(Command::Join));
        assert_eq!(Command::parse("!", "!NP"), Some(Command::NowPlaying));
        assert_eq!(Command::parse("!", "!nowplaying"), Some(Command::NowPlaying));
        assert_eq!(Command::parse("!", "!clearqueue"), Some(Command::ClearQueue));
        assert_eq!(
            Command::parse("!", "  !play   never gonna give you up  "),
            Some(Command::Play("never gonna give you up".into()))
        );
    }

    #[test]
    fn play_without_arguments_keeps_empty_query() {
        assert_eq!(Command::parse("!", "!play"), Some(Command::Play(String::new())));
    }

    #[test]
    fn ignores_foreign_text() {
        assert_eq!(Command::parse("!", "join"), None);
        assert_eq!(Command::parse("!", "!lyrics"), None);
        assert_eq!(Command::parse("$$", "!play x"), None);
        assert_eq!(Command::parse("$$", "$$skip"), Some(Command::Skip));
    }

    #[test]
    fn names_round_trip_through_parse() {
        for command in [Command::Join, Command::Stop, Command::Queue, Command::NowPlaying] {
            let text = format!("!{}", command.name());
            assert_eq!(Command::parse("!", &text), Some(command));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_to_the_player() {
        let h = Harness::new();
        let invocation = Invocation {
            guild_id: GUILD,
            text_channel_id: TEXT,
            author_voice_channel: Some(VOICE),
        };

        let joined = execute(&h.player, Command::Join, invocation).await;
        assert!(joined.success);
        assert_eq!(h.platform.joins(), vec![(GUILD, VOICE)]);

        h.backend.respond_with(tracks(None, &["Intro"]));
        let played = execute(&h.player, Command::Play("intro".into()), invocation).await;
        assert!(played.success);
        assert_eq!(h.backend.played(), vec!["Intro".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn join_without_voice_channel_is_refused() {
        let h = Harness::new();
        let invocation = Invocation {
            guild_id: GUILD,
            text_channel_id: TEXT,
            author_voice_channel: None,
        };

        let outcome = execute(&h.player, Command::Join, invocation).await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "You must be connected to a voice channel!");
    }
}
