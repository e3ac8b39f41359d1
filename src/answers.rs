//! Subject input: attention-check answers and run commands.

use std::time::Duration;

use cogdir_core::{Direction, RunState};
use cogdir_experiment::SessionController;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Answer(Direction),
    Pause,
    Start,
    Stop,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "" => None,
            "p" | "pause" => Some(Command::Pause),
            "s" | "start" | "resume" => Some(Command::Start),
            "q" | "stop" | "quit" => Some(Command::Stop),
            other => other.parse().ok().map(Command::Answer),
        }
    }
}

/// Answers every check with the direction that was shown, after `reaction`.
pub async fn auto_answer(controller: SessionController, reaction: Duration) {
    let mut states = controller.subscribe();
    while states.changed().await.is_ok() {
        let state = *states.borrow_and_update();
        if state != RunState::AwaitingCheck {
            continue;
        }
        tokio::time::sleep(reaction).await;
        if let Some(direction) = controller.last_direction() {
            println!("  (auto) {direction}");
            if let Err(err) = controller.submit_answer(direction) {
                debug!(%err, "auto answer not accepted");
            }
        }
    }
}

/// Reads commands from stdin until it closes or a stop is requested.
pub async fn stdin_commands(controller: SessionController) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(err) => {
                warn!(%err, "stdin read failed");
                return;
            }
        };
        let Some(command) = Command::parse(&line) else {
            if !line.trim().is_empty() {
                println!("  unknown input {:?}; use u/d/l/r, p, s or q", line.trim());
            }
            continue;
        };
        let result = match command {
            Command::Answer(direction) => controller.submit_answer(direction),
            Command::Pause => controller.pause().map(|_| ()),
            Command::Start => controller.start().await,
            Command::Stop => {
                controller.stop().await;
                return;
            }
        };
        if let Err(err) = result {
            println!("  {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_directions() {
        assert_eq!(Command::parse("p"), Some(Command::Pause));
        assert_eq!(Command::parse(" Stop "), Some(Command::Stop));
        assert_eq!(Command::parse("s"), Some(Command::Start));
        assert_eq!(Command::parse("l"), Some(Command::Answer(Direction::Left)));
        assert_eq!(Command::parse("DOWN"), Some(Command::Answer(Direction::Down)));
        assert_eq!(Command::parse("x"), None);
        assert_eq!(Command::parse(""), None);
    }
}
