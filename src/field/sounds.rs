//! Match phase sound cues
//!
//! The match clock announces phase changes through [`PhaseAnnouncer`] and
//! never waits on the result.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::SoundConfig;

/// Sound cue played at a phase change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCue {
    Auto,
    Teleop,
    End,
    Abort,
}

impl SoundCue {
    pub const ALL: [SoundCue; 4] =
        [SoundCue::Auto, SoundCue::Teleop, SoundCue::End, SoundCue::Abort];

    pub fn file_name(self) -> &'static str {
        match self {
            SoundCue::Auto => "auto.mp3",
            SoundCue::Teleop => "teleop.mp3",
            SoundCue::End => "end.mp3",
            SoundCue::Abort => "abort.mp3",
        }
    }
}

/// Fire-and-forget sound output
///
/// Implementations must return promptly; the match clock calls them
/// while sequencing.
pub trait PhaseAnnouncer: Send + Sync {
    fn announce(&self, cue: SoundCue);

    /// Play every cue, for checking audio levels
    fn test_sounds(&self) {
        for cue in SoundCue::ALL {
            self.announce(cue);
        }
    }
}

/// Sounds disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAnnouncer;

impl PhaseAnnouncer for SilentAnnouncer {
    fn announce(&self, _cue: SoundCue) {}
}

/// Logs cues instead of playing them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAnnouncer;

impl PhaseAnnouncer for LogAnnouncer {
    fn announce(&self, cue: SoundCue) {
        tracing::info!(?cue, "Sound cue");
    }
}

/// Plays cues by spawning an external player on `<dir>/<cue file>`
#[derive(Debug, Clone)]
pub struct PlayerAnnouncer {
    program: String,
    dir: PathBuf,
}

impl PlayerAnnouncer {
    pub fn new(program: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            dir: dir.into(),
        }
    }

    fn command(&self, cue: SoundCue) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .arg(self.dir.join(cue.file_name()))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        command
    }

    fn spawn_sequence(&self, cues: Vec<SoundCue>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No runtime available for sound playback");
            return;
        };
        let player = self.clone();
        runtime.spawn(async move {
            for cue in cues {
                match player.command(cue).status().await {
                    Ok(status) if !status.success() => {
                        tracing::warn!(?cue, %status, "Sound player failed")
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(?cue, "Unable to run sound player {}: {}", player.program, e)
                    }
                }
            }
        });
    }
}

impl PhaseAnnouncer for PlayerAnnouncer {
    fn announce(&self, cue: SoundCue) {
        self.spawn_sequence(vec![cue]);
    }

    /// Cues play one after another rather than overlapping
    fn test_sounds(&self) {
        self.spawn_sequence(SoundCue::ALL.to_vec());
    }
}

/// Build the announcer described by the sound config
pub fn announcer_from_config(config: &SoundConfig) -> Arc<dyn PhaseAnnouncer> {
    match (&config.player, config.enabled) {
        (_, false) => Arc::new(SilentAnnouncer),
        (Some(program), true) => {
            Arc::new(PlayerAnnouncer::new(program.clone(), config.dir.clone()))
        }
        (None, true) => Arc::new(LogAnnouncer),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records every cue, for asserting on sequencing
    #[derive(Default)]
    pub(crate) struct RecordingAnnouncer {
        pub cues: Mutex<Vec<SoundCue>>,
    }

    impl PhaseAnnouncer for RecordingAnnouncer {
        fn announce(&self, cue: SoundCue) {
            self.cues.lock().push(cue);
        }
    }

    #[test]
    fn test_default_test_sounds_plays_all() {
        let announcer = RecordingAnnouncer::default();
        announcer.test_sounds();
        assert_eq!(*announcer.cues.lock(), SoundCue::ALL.to_vec());
    }

    #[test]
    fn test_file_names() {
        assert_eq!(SoundCue::Auto.file_name(), "auto.mp3");
        assert_eq!(SoundCue::Abort.file_name(), "abort.mp3");
    }

    #[test]
    fn test_player_without_runtime_does_not_panic() {
        PlayerAnnouncer::new("definitely-not-a-player", "sounds").announce(SoundCue::End);
    }
}
