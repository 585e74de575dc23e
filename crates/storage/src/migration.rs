// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Legacy status migration on read (§9 Open Questions).
//!
//! The historical status `"running"` is rewritten to `"working"` before the
//! document is handed to serde; any other status string this engine
//! doesn't recognize is a [`StoreCorruptError`], not a silent pass-through.

use dispatch_core::StoreCorruptError;
use serde_json::Value;

const KNOWN_STATUSES: &[&str] = &["dispatched", "working", "auditing", "done", "failed", "stuck"];
const LEGACY_RUNNING: &str = "running";

/// Rewrite legacy status strings in-place and reject anything unrecognized.
/// A missing `dispatches`/`active` object (e.g. a brand new document) is
/// left untouched.
pub fn migrate_legacy_statuses(mut value: Value) -> Result<Value, StoreCorruptError> {
    if let Some(active) = value
        .pointer_mut("/dispatches/active")
        .and_then(Value::as_object_mut)
    {
        for (identifier, record) in active.iter_mut() {
            let Some(status_value) = record.get_mut("status") else {
                continue;
            };
            let Some(status) = status_value.as_str() else {
                continue;
            };
            if status == LEGACY_RUNNING {
                *status_value = Value::String("working".to_string());
            } else if !KNOWN_STATUSES.contains(&status) {
                return Err(StoreCorruptError::UnknownStatus {
                    identifier: identifier.clone(),
                    status: status.to_string(),
                });
            }
        }
    }
    Ok(value)
}
