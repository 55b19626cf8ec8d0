//! Event counters for postmortem observability.
//!
//! Every framework entry point bumps one counter with a success or error
//! outcome. Counters never influence control flow.

use serde::Serialize;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Closed set of counted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagEvent {
    Alloc,
    Free,
    FreeReq,
    SetKey,
    ClearKey,
    Set,
    Get,
    GetDm,
    Crypt,
    Clear,
    SelfTest,
    Bypass,
    ErrInode,
    ErrSync,
    ErrDiskc,
    ErrNoKey,
    MergeNo,
    MergeDm,
    Merge,
    MergeDun,
}

impl DiagEvent {
    pub const ALL: [DiagEvent; 20] = [
        DiagEvent::Alloc,
        DiagEvent::Free,
        DiagEvent::FreeReq,
        DiagEvent::SetKey,
        DiagEvent::ClearKey,
        DiagEvent::Set,
        DiagEvent::Get,
        DiagEvent::GetDm,
        DiagEvent::Crypt,
        DiagEvent::Clear,
        DiagEvent::SelfTest,
        DiagEvent::Bypass,
        DiagEvent::ErrInode,
        DiagEvent::ErrSync,
        DiagEvent::ErrDiskc,
        DiagEvent::ErrNoKey,
        DiagEvent::MergeNo,
        DiagEvent::MergeDm,
        DiagEvent::Merge,
        DiagEvent::MergeDun,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Label used in the rendered report.
    pub fn name(self) -> &'static str {
        match self {
            DiagEvent::Alloc => "ALLOC",
            DiagEvent::Free => "FREE",
            DiagEvent::FreeReq => "FREEREQ",
            DiagEvent::SetKey => "SETKEY",
            DiagEvent::ClearKey => "CLEARKEY",
            DiagEvent::Set => "SET",
            DiagEvent::Get => "GET",
            DiagEvent::GetDm => "GET-dm",
            DiagEvent::Crypt => "CRYPT",
            DiagEvent::Clear => "CLEAR",
            DiagEvent::SelfTest => "SELFTEST",
            DiagEvent::Bypass => "BYPASS",
            DiagEvent::ErrInode => "err_inode",
            DiagEvent::ErrSync => "err_sync",
            DiagEvent::ErrDiskc => "err_diskc",
            DiagEvent::ErrNoKey => "err_no_key",
            DiagEvent::MergeNo => "no-merge",
            DiagEvent::MergeDm => "merge-dm",
            DiagEvent::Merge => "merge",
            DiagEvent::MergeDun => "merge-dun",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
struct Slot {
    ok: AtomicU32,
    err: AtomicU32,
}

/// Atomic success/error counters indexed by [`DiagEvent`].
#[derive(Debug)]
pub struct Diagnostics {
    enabled: AtomicBool,
    slots: [Slot; DiagEvent::COUNT],
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Diagnostics {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            slots: std::array::from_fn(|_| Slot::default()),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Count one occurrence of `event`.
    pub fn record(&self, event: DiagEvent, err: bool) {
        if !self.is_enabled() {
            return;
        }
        let slot = &self.slots[event.index()];
        let counter = if err { &slot.err } else { &slot.ok };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, event: DiagEvent) -> EventCount {
        let slot = &self.slots[event.index()];
        EventCount {
            ok: slot.ok.load(Ordering::Relaxed),
            err: slot.err.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for slot in &self.slots {
            slot.ok.store(0, Ordering::Relaxed);
            slot.err.store(0, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy of every non-zero counter.
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let entries = DiagEvent::ALL
            .iter()
            .map(|event| (*event, self.count(*event)))
            .filter(|(_, count)| !count.is_zero())
            .map(|(event, count)| CounterEntry {
                name: event.name(),
                ok: count.ok,
                err: count.err,
            })
            .collect();
        DiagnosticsSnapshot { entries }
    }

    /// Text block in the layout of the crypto proc listing.
    pub fn render(&self) -> String {
        let mut out = String::from("type         : diskcipher\n");
        for entry in self.snapshot().entries {
            let _ = writeln!(out, "{}\t: {:6}(err:{})", entry.name, entry.ok, entry.err);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCount {
    pub ok: u32,
    pub err: u32,
}

impl EventCount {
    pub fn is_zero(&self) -> bool {
        self.ok == 0 && self.err == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterEntry {
    pub name: &'static str,
    pub ok: u32,
    pub err: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub entries: Vec<CounterEntry>,
}

impl DiagnosticsSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
