use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use scoreboard::config::{EngineConfig, init_logging};
use scoreboard::event::Interest;
use scoreboard::scoreboard::ScoreBoard;

fn main() -> scoreboard::Result<()> {
    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = EngineConfig::load(path.as_deref())?;
    init_logging(&config.log_filter);

    let board = ScoreBoard::new(&config)?;
    board.store().lock()?.subscribe(Interest::All, |event| match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!(error = %e, "cannot serialize event"),
    });
    board.media().prepare()?;
    let watcher = board.media().watch(Duration::from_millis(config.watch_interval_ms));
    info!("ready, commands: set <key> <value> | unset <key> | get <key> | quit");

    for line in io::stdin().lock().lines() {
        let line = line?;
        let mut words = line.trim().splitn(3, ' ');
        let result = match (words.next(), words.next(), words.next()) {
            (Some("set"), Some(key), Some(value)) => board.settings().set(key, Some(value)),
            (Some("unset"), Some(key), None) => board.settings().set(key, None),
            (Some("get"), Some(key), None) => board.settings().get(key).map(|value| match value {
                Some(value) => println!("{} = {}", key, value),
                None => println!("{} is not set", key),
            }),
            (Some("quit"), None, None) => break,
            (Some(""), None, None) | (None, _, _) => Ok(()),
            _ => {
                warn!(line = %line, "unknown command");
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "command failed");
        }
    }
    watcher.stop();
    Ok(())
}
