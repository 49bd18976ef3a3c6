// src/driver/event.rs

use std::fmt;

use crate::types::Iens;

/// Scheduler-visible realization events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Started { iens: Iens },
    Finished { iens: Iens, returncode: i32 },
}

impl Event {
    pub fn iens(&self) -> Iens {
        match *self {
            Event::Started { iens } | Event::Finished { iens, .. } => iens,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Started { iens } => write!(f, "realization {iens} started"),
            Event::Finished { iens, returncode } => {
                write!(f, "realization {iens} finished with returncode {returncode}")
            }
        }
    }
}
