use cogdir_core::{Cue, Direction, FocusColor};
use cogdir_experiment::Presenter;

/// Prints cues as plain terminal lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePresenter;

impl ConsolePresenter {
    pub fn render(cue: &Cue) -> Option<String> {
        let line = match cue {
            Cue::ModeAnnouncement { text, .. } => format!("\n{text}\n"),
            Cue::Countdown { remaining } => format!("Starting in {remaining}..."),
            Cue::Progress { trial, total } => format!("\nTrial {trial} of {total}"),
            Cue::Rest { .. } => return None,
            Cue::Focus { color, text } => match color {
                FocusColor::Hidden => return None,
                _ => format!("  ( o )  {text}"),
            },
            Cue::Direction { direction } => {
                format!("  {} {}", arrow(*direction), direction.as_str().to_uppercase())
            }
            Cue::Action { instruction, .. } => format!("  {instruction}"),
            Cue::Relax | Cue::TrialEnd { .. } => return None,
            Cue::AttentionCheck { .. } => {
                "\nATTENTION CHECK: which direction was just shown? [u]p [d]own [l]eft [r]ight"
                    .to_string()
            }
            Cue::AttentionFeedback { message, .. } => format!("  {message}"),
            Cue::Paused => "\nPAUSED (press p or start to continue)".to_string(),
            Cue::Resumed => "RESUMED".to_string(),
            Cue::SessionComplete { message } => format!("\n{message}"),
        };
        Some(line)
    }
}

impl Presenter for ConsolePresenter {
    fn present(&self, cue: &Cue) {
        if let Some(line) = Self::render(cue) {
            println!("{line}");
        }
    }
}

fn arrow(direction: Direction) -> char {
    match direction {
        Direction::Up => '↑',
        Direction::Down => '↓',
        Direction::Left => '←',
        Direction::Right => '→',
    }
}
