//! Optional JSON-lines structured event log (`--trace FILE`), standing in
//! for the `kev(...)` scoped spans the reference implementation sprinkles
//! through `write.py`. The writer core has no compiled-in dependency on
//! this: it calls an optional `Tracer` at a handful of stage boundaries,
//! which is a no-op unless a caller installs one.

use std::fs::File;
use std::io::Write;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::Result;

#[derive(Serialize)]
struct TraceEvent<'a> {
    ts_us: u64,
    stage: &'a str,
    name: &'a str,
}

/// Appends one JSON object per line to a file, guarded by a mutex since
/// both the open-consumer and serializer threads record events.
pub struct Tracer {
    out: Mutex<File>,
}

impl Tracer {
    pub fn create(path: &std::path::Path) -> Result<Self> {
        let out = File::create(path)?;
        Ok(Tracer { out: Mutex::new(out) })
    }

    pub fn record(&self, stage: &str, name: &str) {
        let ts_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        let event = TraceEvent { ts_us, stage, name };
        if let Ok(line) = serde_json::to_string(&event) {
            let mut out = self.out.lock().expect("tracer mutex poisoned");
            let _ = writeln!(out, "{}", line);
        }
    }
}
