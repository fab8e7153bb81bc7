//! User registry and nickname management for the lobby server
//!
//! This module handles the server-side bookkeeping of registered users,
//! including:
//! - User lifecycle (registration, rename, removal)
//! - Nickname uniqueness with automatic numeric de-collision
//! - Routing handles for pushing lines to a user's connection
//! - Per-user game flags (bike color, dice roll state)
//!
//! The registry is the single source of truth for who is connected and what
//! they are called. It is shared between session tasks behind an
//! `Arc<RwLock<Registry>>`, so every operation below runs under one lock
//! acquisition and the nickname index can never be observed half-updated.

use log::info;
use shared::{is_valid_nickname, DiceColor, UserSnapshot};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

/// Handle for pushing one encoded protocol line to a user's connection.
///
/// The receiving end is owned by the session's writer task; any component
/// holding this sender may queue a reply or notification without touching
/// the socket itself.
pub type OutboundSender = UnboundedSender<String>;

/// A registered user and their per-connection game state
#[derive(Debug)]
pub struct User {
    /// Unique user identifier assigned by the server
    pub id: u32,
    /// Current nickname; unique across the registry at all times
    pub nickname: String,
    /// Outbound line queue for this user's connection
    pub sender: OutboundSender,
    /// Bike color chosen with VELO, if any
    pub bike_color: Option<DiceColor>,
    /// Whether the user has rolled the dice this turn
    pub has_rolled: bool,
    /// Total number of dice rolls across the whole session
    pub roll_count: u32,
}

impl User {
    fn new(id: u32, nickname: String, sender: OutboundSender) -> Self {
        Self {
            id,
            nickname,
            sender,
            bike_color: None,
            has_rolled: false,
            roll_count: 0,
        }
    }
}

/// Reasons a rename request can be rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameError {
    /// The requested name fails the nickname format check
    InvalidFormat,
    /// The requested name is already held by a different user
    Taken,
    /// The renaming user id is not registered
    UnknownUser,
}

impl fmt::Display for RenameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenameError::InvalidFormat => {
                write!(f, "nicknames are 3-15 letters, digits, '_' or '-'")
            }
            RenameError::Taken => write!(f, "that nickname is already taken"),
            RenameError::UnknownUser => write!(f, "unknown user"),
        }
    }
}

impl std::error::Error for RenameError {}

/// Maps user ids to users and maintains the nickname uniqueness index
///
/// Ids are assigned monotonically starting from 1 and are never reused.
/// Every mutation keeps `users` and `by_name` in step, so a lookup by name
/// always resolves to an id whose stored nickname matches.
pub struct Registry {
    /// Registered users indexed by their unique id
    users: HashMap<u32, User>,
    /// Derived index: nickname -> user id
    by_name: HashMap<String, u32>,
    /// Next available user id
    next_user_id: u32,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
            by_name: HashMap::new(),
            next_user_id: 1,
        }
    }

    /// Registers a user under the requested nickname
    ///
    /// Collisions are resolved by appending increasing integer suffixes
    /// starting at 1 until the candidate is unused, so N registrations of
    /// the same name yield N, N1, N2, ... in registration order. Returns
    /// the assigned id and the (possibly suffixed) nickname.
    pub fn register(&mut self, requested: &str, sender: OutboundSender) -> (u32, String) {
        let mut candidate = requested.to_string();
        let mut suffix = 1u32;
        while self.by_name.contains_key(&candidate) {
            candidate = format!("{}{}", requested, suffix);
            suffix += 1;
        }

        let id = self.next_user_id;
        self.next_user_id += 1;

        self.by_name.insert(candidate.clone(), id);
        self.users
            .insert(id, User::new(id, candidate.clone(), sender));
        info!("User {} registered as '{}'", id, candidate);

        (id, candidate)
    }

    /// Renames a user, keeping the id unchanged
    ///
    /// Rejects names that fail the format check or are held by a different
    /// user; a failed attempt leaves both the requester and the name's
    /// current owner untouched. On success returns the (old, new) pair so
    /// the caller can correlate the change in its outgoing notice.
    pub fn rename(&mut self, id: u32, new_name: &str) -> Result<(String, String), RenameError> {
        if !is_valid_nickname(new_name) {
            return Err(RenameError::InvalidFormat);
        }
        if let Some(&owner) = self.by_name.get(new_name) {
            if owner != id {
                return Err(RenameError::Taken);
            }
        }
        let user = self.users.get_mut(&id).ok_or(RenameError::UnknownUser)?;

        let old_name = std::mem::replace(&mut user.nickname, new_name.to_string());
        self.by_name.remove(&old_name);
        self.by_name.insert(new_name.to_string(), id);
        info!("User {} renamed '{}' -> '{}'", id, old_name, new_name);

        Ok((old_name, new_name.to_string()))
    }

    /// Removes a user and their nickname index entry
    ///
    /// Returns the removed user so the caller can finish lobby cleanup with
    /// the final nickname. Removing an unknown id returns None.
    pub fn remove(&mut self, id: u32) -> Option<User> {
        let user = self.users.remove(&id)?;
        self.by_name.remove(&user.nickname);
        info!("User {} ('{}') removed", id, user.nickname);
        Some(user)
    }

    pub fn lookup_by_id(&self, id: u32) -> Option<&User> {
        self.users.get(&id)
    }

    /// Resolves a nickname to its user id
    pub fn lookup_by_name(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn nickname_of(&self, id: u32) -> Option<&str> {
        self.users.get(&id).map(|u| u.nickname.as_str())
    }

    pub fn sender_of(&self, id: u32) -> Option<OutboundSender> {
        self.users.get(&id).map(|u| u.sender.clone())
    }

    pub fn sender_of_name(&self, name: &str) -> Option<OutboundSender> {
        self.lookup_by_name(name).and_then(|id| self.sender_of(id))
    }

    /// Sets the user's bike color; returns false for an unknown id
    pub fn set_bike_color(&mut self, id: u32, color: DiceColor) -> bool {
        match self.users.get_mut(&id) {
            Some(user) => {
                user.bike_color = Some(color);
                true
            }
            None => false,
        }
    }

    pub fn bike_color_of(&self, id: u32) -> Option<DiceColor> {
        self.users.get(&id).and_then(|u| u.bike_color)
    }

    /// Marks the user as having rolled this turn and bumps the roll counter
    pub fn mark_rolled(&mut self, id: u32) {
        if let Some(user) = self.users.get_mut(&id) {
            user.has_rolled = true;
            user.roll_count += 1;
        }
    }

    /// Clears the per-turn roll flag, e.g. on turn handoff or game restart
    pub fn clear_rolled(&mut self, id: u32) {
        if let Some(user) = self.users.get_mut(&id) {
            user.has_rolled = false;
        }
    }

    pub fn has_rolled(&self, id: u32) -> bool {
        self.users.get(&id).map(|u| u.has_rolled).unwrap_or(false)
    }

    /// Returns the number of registered users
    pub fn count(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Iterates all registered users, e.g. for LIST replies and broadcasts
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// All current nicknames, sorted for stable replies
    pub fn nicknames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshots every user for the presentation layer; `lobby_of` resolves
    /// the name of the lobby a user currently sits in.
    pub fn snapshot(&self, mut lobby_of: impl FnMut(u32) -> String) -> Vec<UserSnapshot> {
        let mut users: Vec<&User> = self.users.values().collect();
        users.sort_by_key(|u| u.id);
        users
            .into_iter()
            .map(|u| UserSnapshot {
                id: u.id,
                nickname: u.nickname.clone(),
                bike_color: u.bike_color.map(|c| c.as_str().to_string()),
                lobby: lobby_of(u.id),
            })
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
