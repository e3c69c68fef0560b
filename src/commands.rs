//! One-shot list commands
//!
//! Each command goes through the view model like any other front end. Reads
//! wait for the live sequence to settle; writes are flushed by the caller
//! before the process exits.

use crate::cli::Commands;
use crate::config::Config;
use crate::live::LiveValue;
use crate::share;
use crate::store::ShoppingItem;
use crate::viewmodel::{parse_quantity, ListSummary, ShoppingViewModel};
use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use std::time::Duration;

/// How long a read waits for its first result
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a single list command
pub async fn run(vm: &ShoppingViewModel, config: &Config, command: Commands) -> Result<()> {
    match command {
        Commands::Add { name, quantity } => {
            if name.trim().is_empty() || quantity.trim().is_empty() {
                eprintln!("Nothing added: name and quantity must not be blank");
                return Ok(());
            }
            vm.add_item(&name, &quantity);
            println!("Added {} ({})", name, parse_quantity(&quantity));
        }
        Commands::List { search, json } => {
            let search = search.unwrap_or_default();
            vm.set_search_text(&search);
            let items = snapshot(vm.items()).await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&items).context("Failed to encode items")?
                );
            } else {
                snapshot(vm.all_items()).await?;
                print!("{}", render(&items, &vm.summary(), &search));
            }
        }
        Commands::Check { id } => set_checked(vm, id, true).await?,
        Commands::Uncheck { id } => set_checked(vm, id, false).await?,
        Commands::Edit { id, name, quantity } => {
            let item = lookup(vm, id).await?;
            let edited = apply_edit(&item, name.as_deref(), quantity.as_deref());
            vm.update_item(&edited);
            println!("Updated #{}: {} ({})", id, edited.name, edited.quantity);
        }
        Commands::Delete { id } => {
            let item = lookup(vm, id).await?;
            vm.delete_item(&item);
            println!("Deleted #{}: {}", id, item.name);
        }
        Commands::Clear => {
            vm.delete_all_items();
            println!("List cleared");
        }
        Commands::Share { copy } => {
            snapshot(vm.all_items()).await?;
            let text = vm.share_text(&config.share);
            print!("{}", text);
            if copy {
                share::copy_to_clipboard(&text)?;
                eprintln!("Copied to clipboard");
            }
        }
        Commands::Session { .. } | Commands::Config { .. } => {
            bail!("Not a one-shot command")
        }
    }
    Ok(())
}

/// Observe a live sequence until it has produced a fresh result
pub async fn snapshot(live: &LiveValue<Vec<ShoppingItem>>) -> Result<Vec<ShoppingItem>> {
    tokio::time::timeout(SETTLE_TIMEOUT, live.settled())
        .await
        .context("Timed out waiting for the item list")
}

async fn lookup(vm: &ShoppingViewModel, id: i64) -> Result<ShoppingItem> {
    match vm.find_item(id).await {
        Some(item) => Ok(item),
        None => bail!("No item with id {}", id),
    }
}

async fn set_checked(vm: &ShoppingViewModel, id: i64, is_checked: bool) -> Result<()> {
    let item = lookup(vm, id).await?;
    vm.update_item(&item.with_checked(is_checked));
    let state = if is_checked { "bought" } else { "not bought" };
    println!("#{} {} marked {}", id, item.name, state);
    Ok(())
}

/// Replace the name and/or quantity of `item`
///
/// A blank name keeps the old one. Quantity text that does not parse
/// becomes 1.
pub fn apply_edit(item: &ShoppingItem, name: Option<&str>, quantity: Option<&str>) -> ShoppingItem {
    let mut edited = item.clone();
    if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
        edited.name = name.to_string();
    }
    if let Some(quantity) = quantity {
        edited.quantity = parse_quantity(quantity);
    }
    edited
}

/// Render items in the given order followed by a progress line
///
/// An empty result reads differently when a search is active, since the
/// list itself may still have items.
pub fn render(items: &[ShoppingItem], summary: &ListSummary, search: &str) -> String {
    let mut out = String::new();
    if items.is_empty() {
        if search.trim().is_empty() {
            out.push_str("  (no items)\n");
        } else {
            let _ = writeln!(out, "  no match for '{}'", search);
        }
    }
    for item in items {
        let mark = if item.is_checked { "x" } else { " " };
        let _ = writeln!(
            out,
            "  #{:<4} [{}] {} ({})",
            item.id, mark, item.name, item.quantity
        );
    }
    let _ = writeln!(
        out,
        "{}/{} bought ({:.0}%)",
        summary.completed,
        summary.total,
        summary.progress * 100.0
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milk() -> ShoppingItem {
        ShoppingItem {
            id: 1,
            name: "Milk".to_string(),
            quantity: 2,
            is_checked: true,
        }
    }

    #[test]
    fn test_apply_edit_replaces_given_fields() {
        let edited = apply_edit(&milk(), Some("Oat milk"), Some("3"));
        assert_eq!(edited.name, "Oat milk");
        assert_eq!(edited.quantity, 3);
        assert_eq!(edited.id, 1);
        assert!(edited.is_checked);
    }

    #[test]
    fn test_apply_edit_blank_name_and_bad_quantity() {
        let edited = apply_edit(&milk(), Some("  "), Some("lots"));
        assert_eq!(edited.name, "Milk");
        assert_eq!(edited.quantity, 1);
    }

    #[test]
    fn test_apply_edit_nothing_given() {
        assert_eq!(apply_edit(&milk(), None, None), milk());
    }

    #[test]
    fn test_render_lists_items_and_progress() {
        let bread = ShoppingItem {
            id: 2,
            name: "Bread".to_string(),
            quantity: 1,
            is_checked: false,
        };
        let items = vec![bread, milk()];
        let text = render(&items, &ListSummary::from_items(&items), "");

        assert_eq!(
            text,
            "  #2    [ ] Bread (1)\n  #1    [x] Milk (2)\n1/2 bought (50%)\n"
        );
    }

    #[test]
    fn test_render_empty_list() {
        let text = render(&[], &ListSummary::from_items(&[]), "");
        assert_eq!(text, "  (no items)\n0/0 bought (0%)\n");

        // Whitespace-only search counts as no search
        let text = render(&[], &ListSummary::from_items(&[]), "  ");
        assert_eq!(text, "  (no items)\n0/0 bought (0%)\n");
    }

    #[test]
    fn test_render_search_without_match() {
        let all = vec![milk()];
        let text = render(&[], &ListSummary::from_items(&all), "Br");
        assert_eq!(text, "  no match for 'Br'\n1/1 bought (100%)\n");
    }
}
