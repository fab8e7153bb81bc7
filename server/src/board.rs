use shared::{DiceColor, START_FIELD};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    UnknownField,
    Unreachable,
    NoCredit,
    NotSelected,
    AlreadySelected,
    NothingSelected,
}

impl fmt::Display for BoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardError::UnknownField => write!(f, "no such field"),
            BoardError::Unreachable => write!(f, "field is not reachable from here"),
            BoardError::NoCredit => write!(f, "no dice credit left for that color"),
            BoardError::NotSelected => write!(f, "field is not selected"),
            BoardError::AlreadySelected => write!(f, "field is already selected"),
            BoardError::NothingSelected => write!(f, "no fields selected to move along"),
        }
    }
}

impl std::error::Error for BoardError {}

/// The immutable field graph shared by every board in a lobby.
///
/// Fields are identified by color + index ("purple1"); the start field is
/// the single white field. Adjacency is data-driven: every edge handed to
/// `new` is inserted in both directions, so the neighbor relation is
/// symmetric by construction regardless of how the layout lists it.
#[derive(Debug, PartialEq)]
pub struct BoardLayout {
    colors: HashMap<String, Option<DiceColor>>,
    neighbors: HashMap<String, Vec<String>>,
    finish: String,
}

impl BoardLayout {
    pub fn new(
        fields: Vec<(String, Option<DiceColor>)>,
        edges: Vec<(String, String)>,
        finish: String,
    ) -> Self {
        let mut colors = HashMap::new();
        let mut neighbors: HashMap<String, Vec<String>> = HashMap::new();
        for (id, color) in fields {
            neighbors.entry(id.clone()).or_default();
            colors.insert(id, color);
        }
        for (a, b) in edges {
            let fwd = neighbors.entry(a.clone()).or_default();
            if !fwd.contains(&b) {
                fwd.push(b.clone());
            }
            let back = neighbors.entry(b).or_default();
            if !back.contains(&a) {
                back.push(a);
            }
        }
        Self {
            colors,
            neighbors,
            finish,
        }
    }

    /// The canonical track: the white start field, then the six dice colors
    /// interleaved round-robin until each color's field count is exhausted,
    /// with consecutive fields linked as neighbors. The last field of the
    /// track is the finish.
    pub fn standard() -> Self {
        let mut fields: Vec<(String, Option<DiceColor>)> = vec![(START_FIELD.to_string(), None)];
        let mut used = [0usize; 6];

        let max_rounds = DiceColor::ALL
            .iter()
            .map(|c| c.field_count())
            .max()
            .unwrap_or(0);
        for round in 1..=max_rounds {
            for color in DiceColor::ALL {
                if round <= color.field_count() {
                    used[color.index()] += 1;
                    let id = format!("{}{}", color.as_str(), used[color.index()]);
                    fields.push((id, Some(color)));
                }
            }
        }

        let edges: Vec<(String, String)> = fields
            .windows(2)
            .map(|pair| (pair[0].0.clone(), pair[1].0.clone()))
            .collect();
        let finish = fields
            .last()
            .map(|(id, _)| id.clone())
            .unwrap_or_else(|| START_FIELD.to_string());

        Self::new(fields, edges, finish)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.colors.contains_key(field)
    }

    /// The dice color of a field; None for the start field or unknown ids.
    pub fn dice_color_of(&self, field: &str) -> Option<DiceColor> {
        self.colors.get(field).copied().flatten()
    }

    pub fn neighbors_of(&self, field: &str) -> &[String] {
        self.neighbors.get(field).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_finish(&self, field: &str) -> bool {
        self.finish == field
    }

    pub fn finish_field(&self) -> &str {
        &self.finish
    }

    pub fn field_count(&self) -> usize {
        self.colors.len()
    }
}

/// Per-color dice credits for one player's current turn.
///
/// Filled by a roll, drained by field selections, refilled one credit at a
/// time when a selection is taken back. Owned by the lobby layer; the board
/// only consults it for validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorTable {
    credits: [u8; 6],
}

impl ColorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.credits = [0; 6];
    }

    pub fn add(&mut self, color: DiceColor) {
        self.credits[color.index()] += 1;
    }

    pub fn available(&self, color: DiceColor) -> bool {
        self.credits[color.index()] > 0
    }

    /// Consumes one credit of the color; false if none remain.
    pub fn take(&mut self, color: DiceColor) -> bool {
        if self.credits[color.index()] == 0 {
            return false;
        }
        self.credits[color.index()] -= 1;
        true
    }

    /// Restores exactly one credit of the color.
    pub fn give_back(&mut self, color: DiceColor) {
        self.credits[color.index()] += 1;
    }

    pub fn remaining(&self, color: DiceColor) -> u8 {
        self.credits[color.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.credits.iter().all(|&c| c == 0)
    }
}

/// One player's position and pending selections on the shared field graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    layout: Arc<BoardLayout>,
    current: String,
    selected: Vec<String>,
}

impl Board {
    pub fn new(layout: Arc<BoardLayout>) -> Self {
        Self {
            layout,
            current: START_FIELD.to_string(),
            selected: Vec::new(),
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    /// True iff the field neighbors the current field or any already
    /// selected field (one-hop chaining through the selection), and a dice
    /// credit of its color remains.
    pub fn is_valid_target(&self, field: &str, credits: &ColorTable) -> bool {
        let Some(color) = self.layout.dice_color_of(field) else {
            return false;
        };
        if !credits.available(color) {
            return false;
        }
        self.is_reachable(field)
    }

    fn is_reachable(&self, field: &str) -> bool {
        if self.selected.iter().any(|s| s == field) {
            return false;
        }
        let neighbors = self.layout.neighbors_of(field);
        neighbors.iter().any(|n| *n == self.current)
            || neighbors
                .iter()
                .any(|n| self.selected.iter().any(|s| s == n))
    }

    /// Appends the field to the selection. The returned color is the credit
    /// the caller must consume from its table.
    pub fn select(&mut self, field: &str, credits: &ColorTable) -> Result<DiceColor, BoardError> {
        if !self.layout.contains(field) {
            return Err(BoardError::UnknownField);
        }
        if self.selected.iter().any(|s| s == field) {
            return Err(BoardError::AlreadySelected);
        }
        let color = self
            .layout
            .dice_color_of(field)
            .ok_or(BoardError::Unreachable)?;
        if !credits.available(color) {
            return Err(BoardError::NoCredit);
        }
        if !self.is_reachable(field) {
            return Err(BoardError::Unreachable);
        }
        self.selected.push(field.to_string());
        Ok(color)
    }

    /// Removes the field from the selection. The returned color is the
    /// credit the caller must restore to its table. Deselecting a field
    /// that is not selected is an error, not a panic.
    pub fn deselect(&mut self, field: &str) -> Result<DiceColor, BoardError> {
        let pos = self
            .selected
            .iter()
            .position(|s| s == field)
            .ok_or(BoardError::NotSelected)?;
        self.selected.remove(pos);
        self.layout
            .dice_color_of(field)
            .ok_or(BoardError::UnknownField)
    }

    /// Moves the current field to the last selected field and clears the
    /// selection. Returns the new current field id for finish detection.
    pub fn commit_move(&mut self) -> Result<String, BoardError> {
        let target = self
            .selected
            .last()
            .cloned()
            .ok_or(BoardError::NothingSelected)?;
        self.current = target.clone();
        self.selected.clear();
        Ok(target)
    }

    /// Drops every pending selection, restoring each credit to the table.
    pub fn clear_selection(&mut self, credits: &mut ColorTable) {
        for field in self.selected.drain(..) {
            if let Some(color) = self.layout.dice_color_of(&field) {
                credits.give_back(color);
            }
        }
    }

    /// Puts the rider back on the start field with nothing selected.
    pub fn reset(&mut self) {
        self.current = START_FIELD.to_string();
        self.selected.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Arc<BoardLayout> {
        Arc::new(BoardLayout::standard())
    }

    fn full_table() -> ColorTable {
        let mut table = ColorTable::new();
        for color in DiceColor::ALL {
            table.add(color);
            table.add(color);
        }
        table
    }

    #[test]
    fn test_standard_layout_field_count() {
        let layout = BoardLayout::standard();
        // 54 colored fields plus the white start field
        assert_eq!(layout.field_count(), 55);
        assert!(layout.contains(START_FIELD));
        assert!(layout.contains("red1"));
        assert!(layout.contains("blue10"));
        assert!(!layout.contains("red8"));
    }

    #[test]
    fn test_standard_layout_adjacency_is_symmetric() {
        let layout = BoardLayout::standard();
        for field in ["white1", "red1", "green5", "orange10"] {
            for neighbor in layout.neighbors_of(field) {
                assert!(
                    layout.neighbors_of(neighbor).iter().any(|n| n == field),
                    "edge {} -> {} has no reverse",
                    field,
                    neighbor
                );
            }
        }
    }

    #[test]
    fn test_standard_layout_start_and_finish() {
        let layout = BoardLayout::standard();
        assert_eq!(layout.neighbors_of(START_FIELD), &["red1".to_string()]);
        assert_eq!(layout.finish_field(), "orange10");
        assert!(layout.is_finish("orange10"));
        assert!(!layout.is_finish(START_FIELD));
    }

    #[test]
    fn test_injected_layout_symmetry() {
        let fields = vec![
            ("white1".to_string(), None),
            ("red1".to_string(), Some(DiceColor::Red)),
            ("blue1".to_string(), Some(DiceColor::Blue)),
        ];
        // One-directional edge list; the layout adds the reverse itself.
        let edges = vec![
            ("white1".to_string(), "red1".to_string()),
            ("red1".to_string(), "blue1".to_string()),
        ];
        let layout = BoardLayout::new(fields, edges, "blue1".to_string());

        assert!(layout.neighbors_of("red1").contains(&"white1".to_string()));
        assert!(layout.neighbors_of("blue1").contains(&"red1".to_string()));
    }

    #[test]
    fn test_select_neighbor_of_current() {
        let mut board = Board::new(layout());
        let table = full_table();

        assert!(board.is_valid_target("red1", &table));
        assert_eq!(board.select("red1", &table), Ok(DiceColor::Red));
        assert_eq!(board.selected(), &["red1".to_string()]);
    }

    #[test]
    fn test_selection_chains_one_hop() {
        let mut board = Board::new(layout());
        let table = full_table();

        // blue1 only becomes reachable through the selected red1
        assert!(!board.is_valid_target("blue1", &table));
        board.select("red1", &table).unwrap();
        assert!(board.is_valid_target("blue1", &table));
        assert_eq!(board.select("blue1", &table), Ok(DiceColor::Blue));
    }

    #[test]
    fn test_select_requires_credit() {
        let mut board = Board::new(layout());
        let mut table = ColorTable::new();
        table.add(DiceColor::Blue);

        assert!(!board.is_valid_target("red1", &table));
        assert_eq!(board.select("red1", &table), Err(BoardError::NoCredit));
        assert!(board.selected().is_empty());

        table.add(DiceColor::Red);
        assert_eq!(board.select("red1", &table), Ok(DiceColor::Red));
    }

    #[test]
    fn test_select_unknown_and_unreachable() {
        let mut board = Board::new(layout());
        let table = full_table();

        assert_eq!(board.select("pink3", &table), Err(BoardError::UnknownField));
        assert_eq!(
            board.select("green7", &table),
            Err(BoardError::Unreachable)
        );
    }

    #[test]
    fn test_select_deselect_is_credit_neutral() {
        let mut board = Board::new(layout());
        let mut table = ColorTable::new();
        table.add(DiceColor::Red);

        let color = board.select("red1", &table).unwrap();
        assert!(table.take(color));
        assert_eq!(table.remaining(DiceColor::Red), 0);

        let restored = board.deselect("red1").unwrap();
        table.give_back(restored);
        assert_eq!(table.remaining(DiceColor::Red), 1);
        assert!(board.selected().is_empty());
    }

    #[test]
    fn test_deselect_unselected_is_error() {
        let mut board = Board::new(layout());
        assert_eq!(board.deselect("red1"), Err(BoardError::NotSelected));
    }

    #[test]
    fn test_commit_move_lands_on_last_selected() {
        let mut board = Board::new(layout());
        let table = full_table();

        board.select("red1", &table).unwrap();
        board.select("blue1", &table).unwrap();

        assert_eq!(board.commit_move(), Ok("blue1".to_string()));
        assert_eq!(board.current(), "blue1");
        assert!(board.selected().is_empty());
    }

    #[test]
    fn test_commit_move_without_selection() {
        let mut board = Board::new(layout());
        assert_eq!(board.commit_move(), Err(BoardError::NothingSelected));
    }

    #[test]
    fn test_clear_selection_restores_all_credits() {
        let mut board = Board::new(layout());
        let mut table = ColorTable::new();
        table.add(DiceColor::Red);
        table.add(DiceColor::Blue);

        let c1 = board.select("red1", &table).unwrap();
        table.take(c1);
        let c2 = board.select("blue1", &table).unwrap();
        table.take(c2);
        assert!(table.is_empty());

        board.clear_selection(&mut table);
        assert!(board.selected().is_empty());
        assert_eq!(table.remaining(DiceColor::Red), 1);
        assert_eq!(table.remaining(DiceColor::Blue), 1);
    }

    #[test]
    fn test_reset_returns_to_start() {
        let mut board = Board::new(layout());
        let table = full_table();

        board.select("red1", &table).unwrap();
        board.commit_move().unwrap();
        assert_eq!(board.current(), "red1");

        board.reset();
        assert_eq!(board.current(), START_FIELD);
        assert!(board.selected().is_empty());
    }
}
