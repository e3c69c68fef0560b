//! Interactive session
//!
//! Keeps both live sequences observed and redraws whenever either emits a
//! state that differs from the one on screen. Nothing is drawn until both
//! have produced their first query result. Commands are read line by line
//! from stdin.

use crate::commands::{apply_edit, render, snapshot};
use crate::config::Config;
use crate::share;
use crate::viewmodel::ShoppingViewModel;
use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Commands:
  add <name> <quantity>         add an item
  search [text]                 filter by name (empty clears)
  toggle <id>                   flip bought / not bought
  edit <id> <name> <quantity>   replace name and quantity
  delete <id>                   remove an item
  clear                         remove every item
  share                         print (and copy) the share text
  help                          show this help
  quit                          leave the session";

/// A parsed session line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Add { name: String, quantity: String },
    Search(String),
    Toggle(i64),
    Edit { id: i64, name: String, quantity: String },
    Delete(i64),
    Clear,
    Share,
    Help,
    Quit,
}

/// Parse one input line. Names may contain spaces; the quantity is always
/// the last word.
pub fn parse_command(line: &str) -> Result<Option<SessionCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_lowercase().as_str() {
        "add" | "a" => {
            let (name, quantity) = split_last_word(rest).ok_or("usage: add <name> <quantity>")?;
            SessionCommand::Add { name, quantity }
        }
        "search" | "s" | "/" => SessionCommand::Search(rest.to_string()),
        "toggle" | "t" => SessionCommand::Toggle(parse_id(rest)?),
        "edit" | "e" => {
            let (id, rest) = rest
                .split_once(char::is_whitespace)
                .ok_or("usage: edit <id> <name> <quantity>")?;
            let (name, quantity) =
                split_last_word(rest.trim()).ok_or("usage: edit <id> <name> <quantity>")?;
            SessionCommand::Edit {
                id: parse_id(id)?,
                name,
                quantity,
            }
        }
        "delete" | "d" | "rm" => SessionCommand::Delete(parse_id(rest)?),
        "clear" => SessionCommand::Clear,
        "share" => SessionCommand::Share,
        "help" | "h" | "?" => SessionCommand::Help,
        "quit" | "q" | "exit" => SessionCommand::Quit,
        other => return Err(format!("unknown command '{}' (try 'help')", other)),
    };
    Ok(Some(command))
}

fn split_last_word(text: &str) -> Option<(String, String)> {
    let (name, quantity) = text.rsplit_once(char::is_whitespace)?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), quantity.to_string()))
}

fn parse_id(text: &str) -> Result<i64, String> {
    text.trim()
        .parse()
        .map_err(|_| format!("'{}' is not an item id", text.trim()))
}

/// Run the interactive loop until `quit` or end of input
pub async fn run(vm: &ShoppingViewModel, config: &Config, search: Option<String>) -> Result<()> {
    if let Some(search) = search {
        vm.set_search_text(&search);
    }

    let mut items = vm.items().stream();
    let mut all_items = vm.all_items().stream();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", HELP);

    // The streams open with the placeholder empty list
    snapshot(vm.items()).await?;
    snapshot(vm.all_items()).await?;
    let mut screen = Screen::default();
    screen.redraw(vm);

    loop {
        tokio::select! {
            Some(_) = items.next() => screen.redraw(vm),
            Some(_) = all_items.next() => screen.redraw(vm),
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                match parse_command(&line) {
                    Ok(Some(SessionCommand::Quit)) => break,
                    Ok(Some(command)) => execute(vm, config, command).await,
                    Ok(None) => {}
                    Err(message) => println!("{}", message),
                }
            }
        }
    }

    Ok(())
}

/// Last frame printed, so repeated emissions of the same state stay quiet
#[derive(Default)]
struct Screen {
    last: Option<String>,
}

impl Screen {
    fn redraw(&mut self, vm: &ShoppingViewModel) {
        if let Some(text) = self.next_frame(frame(vm)) {
            print!("{}", text);
        }
    }

    /// The frame to print, or `None` if it is already on screen
    fn next_frame(&mut self, text: String) -> Option<String> {
        if self.last.as_deref() == Some(text.as_str()) {
            return None;
        }
        self.last = Some(text.clone());
        Some(text)
    }
}

fn frame(vm: &ShoppingViewModel) -> String {
    let search = vm.search_text().get();
    let title = if search.is_empty() {
        "Shopping list".to_string()
    } else {
        format!("Shopping list (search: {:?})", search)
    };
    format!(
        "\n{}\n{}",
        title,
        render(&vm.items().get(), &vm.summary(), &search)
    )
}

async fn execute(vm: &ShoppingViewModel, config: &Config, command: SessionCommand) {
    match command {
        SessionCommand::Add { name, quantity } => vm.add_item(&name, &quantity),
        SessionCommand::Search(text) => vm.set_search_text(&text),
        SessionCommand::Toggle(id) => match vm.find_item(id).await {
            Some(item) => vm.update_item(&item.with_checked(!item.is_checked)),
            None => println!("No item with id {}", id),
        },
        SessionCommand::Edit { id, name, quantity } => match vm.find_item(id).await {
            Some(item) => vm.update_item(&apply_edit(&item, Some(&name), Some(&quantity))),
            None => println!("No item with id {}", id),
        },
        SessionCommand::Delete(id) => match vm.find_item(id).await {
            Some(item) => vm.delete_item(&item),
            None => println!("No item with id {}", id),
        },
        SessionCommand::Clear => vm.delete_all_items(),
        SessionCommand::Share => {
            let text = vm.share_text(&config.share);
            print!("{}", text);
            if let Err(e) = share::copy_to_clipboard(&text) {
                tracing::debug!("Clipboard unavailable: {:#}", e);
            } else {
                println!("(copied to clipboard)");
            }
        }
        SessionCommand::Help => println!("{}", HELP),
        SessionCommand::Quit => {}
    }
}
