/// Caller-visible device state.
///
/// Transitions:
/// ```text
/// idle → opening → active ↔ paused
///           ↓         ↓
///         broken ← ─ ─ ┘   (fatal backend error)
///           ↓
///         closed           (explicit close / drop)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Constructed, `open` not called yet.
    Idle,
    /// `open` in progress: waiting for connection, discovery, or stream.
    Opening,
    /// Stream is ready; `read`/`write` are serviced.
    Active,
    /// Paused by the caller; backend stream is corked best-effort.
    Paused,
    /// Connection or stream reported a fatal failure. Subsequent I/O
    /// returns a device error; `restart()` may recover.
    Broken,
    /// Torn down.
    Closed,
}

impl DeviceState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    pub fn is_broken(&self) -> bool {
        matches!(self, Self::Broken)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
