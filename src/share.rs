//! Plain-text export of the shopping list
//!
//! ```text
//! 🛒 My shopping list:
//!
//! [ ] Bread (3)
//! [✔ Bought] Milk (2)
//! ```

use crate::store::ShoppingItem;
use anyhow::Context;
use arboard::Clipboard;
use std::fmt::Write as _;

/// Labels used by [`share_text`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareFormat {
    pub header: String,
    /// Shown between the brackets for checked items
    pub checked_marker: String,
    /// Shown between the brackets for unchecked items
    pub unchecked_marker: String,
}

impl Default for ShareFormat {
    fn default() -> Self {
        Self {
            header: "🛒 My shopping list:".to_string(),
            checked_marker: "✔ Bought".to_string(),
            unchecked_marker: " ".to_string(),
        }
    }
}

/// Render `items` in the given order: the header, a blank line, then one
/// `[status] name (quantity)` line per item
pub fn share_text(items: &[ShoppingItem], format: &ShareFormat) -> String {
    let mut text = format!("{}\n\n", format.header);
    for item in items {
        let status = if item.is_checked {
            &format.checked_marker
        } else {
            &format.unchecked_marker
        };
        // Writing into a String cannot fail
        let _ = writeln!(text, "[{}] {} ({})", status, item.name, item.quantity);
    }
    text
}

/// Copy text to the system clipboard
///
/// Fails without a display server (headless Linux) or when access is denied.
pub fn copy_to_clipboard(text: &str) -> anyhow::Result<()> {
    let mut clipboard = Clipboard::new().context("Failed to access clipboard")?;
    clipboard
        .set_text(text)
        .context("Failed to set clipboard text")?;
    Ok(())
}
