//! Collaborator seam for highscore persistence
//!
//! The core reports every finished game here; the storage format and file
//! handling belong to the persistence layer behind the trait.

use log::info;

/// Receives finished-game results in podium order.
pub trait HighscoreSink: Send {
    fn append_result(&mut self, lobby: &str, winners: &[String]);

    /// Formatted entries for HIGH replies, oldest first
    fn entries(&self) -> Vec<String>;
}

/// In-memory sink used when no persistent store is wired in.
#[derive(Debug, Default)]
pub struct MemoryHighscore {
    rows: Vec<String>,
}

impl MemoryHighscore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HighscoreSink for MemoryHighscore {
    fn append_result(&mut self, lobby: &str, winners: &[String]) {
        let row = format!("{}: {}", lobby, winners.join(", "));
        info!("Game result recorded - {}", row);
        self.rows.push(row);
    }

    fn entries(&self) -> Vec<String> {
        self.rows.clone()
    }
}
