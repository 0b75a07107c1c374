//! Shared mode register coordinating capture, playback and shutdown.
//!
//! One mutex guards all five flags; one condition variable wakes the capture
//! worker whenever a transition could make recording possible (or shutdown
//! necessary). `record_audio` is never written directly: every mutator
//! recomputes it so `playing_audio` always implies `!record_audio`.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Point-in-time copy of the register. Reads never block on anything but the
/// brief flag mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSnapshot {
    pub listen_audio: bool,
    pub wakeword_listen: bool,
    pub playing_audio: bool,
    pub record_audio: bool,
    pub server_stop: bool,
}

#[derive(Debug)]
struct Flags {
    listen_audio: bool,
    wakeword_listen: bool,
    playing_audio: bool,
    record_audio: bool,
    server_stop: bool,
}

impl Flags {
    fn recompute(&mut self) {
        self.record_audio = (self.listen_audio || self.wakeword_listen)
            && !self.playing_audio
            && !self.server_stop;
    }

    fn snapshot(&self) -> ModeSnapshot {
        ModeSnapshot {
            listen_audio: self.listen_audio,
            wakeword_listen: self.wakeword_listen,
            playing_audio: self.playing_audio,
            record_audio: self.record_audio,
            server_stop: self.server_stop,
        }
    }
}

/// The satellite's only shared mutable state.
#[derive(Debug)]
pub struct ModeRegister {
    flags: Mutex<Flags>,
    cv: Condvar,
}

impl ModeRegister {
    /// `wakeword_listen` is armed at startup when the recorder is configured
    /// for wake-word streaming; everything else starts cleared.
    pub fn new(wakeword_listen: bool) -> Self {
        let mut flags = Flags {
            listen_audio: false,
            wakeword_listen,
            playing_audio: false,
            record_audio: false,
            server_stop: false,
        };
        flags.recompute();
        Self {
            flags: Mutex::new(flags),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Flags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_listen(&self, on: bool) {
        let mut flags = self.lock();
        flags.listen_audio = on;
        flags.recompute();
        self.cv.notify_all();
    }

    pub fn set_wakeword(&self, on: bool) {
        let mut flags = self.lock();
        flags.wakeword_listen = on;
        flags.recompute();
        self.cv.notify_all();
    }

    pub fn set_playing(&self, on: bool) {
        let mut flags = self.lock();
        flags.playing_audio = on;
        flags.recompute();
        self.cv.notify_all();
    }

    /// Terminal: once set, `server_stop` is never cleared and recording can
    /// never resume.
    pub fn request_stop(&self) {
        let mut flags = self.lock();
        flags.server_stop = true;
        flags.recompute();
        self.cv.notify_all();
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        self.lock().snapshot()
    }

    /// Block until recording is wanted or shutdown is requested, and return
    /// the state observed at wake-up.
    pub fn wait_until_recordable(&self) -> ModeSnapshot {
        let mut flags = self.lock();
        while !flags.record_audio && !flags.server_stop {
            flags = self
                .cv
                .wait(flags)
                .unwrap_or_else(PoisonError::into_inner);
        }
        flags.snapshot()
    }
}
