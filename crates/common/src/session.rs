// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// The output side of a connected client, as seen by the world.
///
/// Lines are delivered immediately; there is no transactional buffering. Output failures are
/// never fatal to whatever produced the output, callers log and carry on.
pub trait Session: Send + Sync {
    /// Send one line of text to the client.
    fn send_text(&self, text: &str) -> Result<(), SessionError>;

    /// Ask the connection to close after any pending output.
    fn disconnect(&self) -> Result<(), SessionError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session is disconnected")]
    Disconnected,
    #[error("Could not deliver output: {0}")]
    DeliveryError(String),
}

/// A session that records its output, for tests.
pub struct MockSession {
    received: RwLock<Vec<String>>,
    disconnected: AtomicBool,
}

impl MockSession {
    pub fn new() -> Self {
        MockSession {
            received: RwLock::new(vec![]),
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn received(&self) -> Vec<String> {
        self.received.read().unwrap().clone()
    }

    /// Take everything received so far, leaving the buffer empty.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.received.write().unwrap())
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Session for MockSession {
    fn send_text(&self, text: &str) -> Result<(), SessionError> {
        if self.is_disconnected() {
            return Err(SessionError::Disconnected);
        }
        self.received.write().unwrap().push(text.to_string());
        Ok(())
    }

    fn disconnect(&self) -> Result<(), SessionError> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_collects_until_disconnect() {
        let session = MockSession::new();
        session.send_text("one").unwrap();
        session.send_text("two").unwrap();
        assert_eq!(session.drain(), vec!["one", "two"]);
        assert!(session.received().is_empty());
        session.disconnect().unwrap();
        assert_eq!(session.send_text("three"), Err(SessionError::Disconnected));
    }
}
