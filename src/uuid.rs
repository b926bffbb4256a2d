//! Canonical hyphenated form for MTGJSON card identifiers.

use crate::error::{Result, SyncError};

/// Hyphen offsets in the compact 32-character form (8-4-4-4-12 grouping).
const GROUP_ENDS: [usize; 4] = [8, 12, 16, 20];

/// Normalize a feed identifier to the hyphenated 36-character form.
///
/// A 36-character input is assumed to be hyphenated already and is returned
/// as-is. A 32-character input gets hyphens inserted at offsets 8/12/16/20.
/// Anything else is rejected with [`SyncError::InvalidIdentifier`].
pub fn normalize_uuid(id: &str) -> Result<String> {
    let chars: Vec<char> = id.chars().collect();
    match chars.len() {
        36 => Ok(id.to_string()),
        32 => {
            let mut out = String::with_capacity(36);
            for (i, c) in chars.iter().enumerate() {
                if GROUP_ENDS.contains(&i) {
                    out.push('-');
                }
                out.push(*c);
            }
            Ok(out)
        }
        _ => Err(SyncError::InvalidIdentifier(id.to_string())),
    }
}
