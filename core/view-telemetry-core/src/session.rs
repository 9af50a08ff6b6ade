//! Session identity: one session per submitted search.
//!
//! The generation counter is what timers capture. It strictly increases, so a
//! timer armed in an earlier session can never match the current one, even when
//! the query text repeats.

use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Ulid,
    pub generation: u64,
    pub query: String,
}

#[derive(Debug, Default)]
pub struct SessionState {
    current: Option<Session>,
    generation: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any current session with a fresh one for `query`.
    pub fn begin(&mut self, query: &str) -> &Session {
        self.generation += 1;
        self.current.insert(Session {
            id: Ulid::new(),
            generation: self.generation,
            query: query.to_string(),
        })
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn current_generation(&self) -> Option<u64> {
        self.current.as_ref().map(|session| session.generation)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == Some(generation)
    }

    pub fn end(&mut self) -> Option<Session> {
        self.current.take()
    }
}
