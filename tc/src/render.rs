//! Terminal rendering of itineraries and chat

use colored::Colorize;
use itinerary::{DayHeader, ItineraryItem, ItineraryList, ListEntry, OrderChange};

use crate::chat::ChatMessage;
use crate::sync::SyncEvent;

/// `Day N · <date label>`, or just `Day N` without a date
pub fn day_header(header: &DayHeader) -> String {
    match &header.date_label {
        Some(label) => format!("Day {} · {}", header.day, label),
        None => format!("Day {}", header.day),
    }
}

/// `N. place (start–end)`; the time range is omitted when unknown
pub fn item_line(item: &ItineraryItem) -> String {
    let times = match (item.start_time, item.end_time) {
        (Some(start), Some(end)) => format!(" ({}–{})", start.format("%H:%M"), end.format("%H:%M")),
        (Some(start), None) => format!(" ({}–)", start.format("%H:%M")),
        (None, Some(end)) => format!(" (–{})", end.format("%H:%M")),
        (None, None) => String::new(),
    };
    format!("{}. {}{}", item.order_in_day, item.place_name, times)
}

/// The whole list, one line per entry
pub fn itinerary(list: &ItineraryList) -> String {
    let mut out = String::new();
    for entry in list.entries() {
        match entry {
            ListEntry::DayHeader(header) => {
                out.push_str(&day_header(header).bright_cyan().bold().to_string());
                if list.items_on_day(header.day).is_empty() {
                    out.push_str(&format!(" {}", "(empty)".dimmed()));
                }
            }
            ListEntry::Item(item) => {
                out.push_str(&format!("  {} {}", item_line(item), format!("#{}", item.id).dimmed()));
            }
        }
        out.push('\n');
    }
    if list.is_empty() {
        out.push_str(&format!("{}\n", "No itinerary items yet.".dimmed()));
    }
    out
}

/// One chat line: `name: text`, assistant messages marked
pub fn chat_line(message: &ChatMessage) -> String {
    let author = if message.is_from_assistant {
        "assistant".bright_magenta().to_string()
    } else {
        match &message.sender {
            Some(sender) => sender.display_name.bright_green().to_string(),
            None => "someone".green().to_string(),
        }
    };
    let marker = if message.sent_to_assistant { " →assistant".dimmed().to_string() } else { String::new() };
    let pending = if message.id.is_local() { " …".dimmed().to_string() } else { String::new() };
    format!("{}{}: {}{}", author, marker, message.text, pending)
}

/// Persisted order changes, one per line
pub fn changes(changes: &[OrderChange]) -> String {
    if changes.is_empty() {
        return format!("{}\n", "No order changes.".dimmed());
    }
    changes
        .iter()
        .map(|change| format!("  #{} → day {}, #{}\n", change.id, change.day, change.order_in_day))
        .collect()
}

/// A sync event worth telling the user about, if any
pub fn event_line(event: &SyncEvent) -> Option<String> {
    let line = match event {
        SyncEvent::ChatAppended { message, replaced } => {
            if *replaced {
                return None;
            }
            chat_line(message)
        }
        SyncEvent::Notice { message } => format!("{} {}", "*".yellow(), message.yellow()),
        SyncEvent::RefetchStarted => "Refreshing itinerary...".dimmed().to_string(),
        SyncEvent::RefetchFailed { error } => format!("{} Refresh failed: {}", "!".red(), error),
        SyncEvent::PersistenceFailed { error } => {
            format!("{} Server rejected the change, reverting: {}", "!".red(), error)
        }
        SyncEvent::SnapshotRejected { error } => format!("{} Ignored inconsistent server data: {}", "!".red(), error),
        SyncEvent::EditRejected { error, .. } => {
            format!("{} Your change no longer fits the updated plan: {}", "!".red(), error)
        }
        SyncEvent::ChannelOpened => "Connected.".dimmed().to_string(),
        SyncEvent::ChannelClosed { reason } => format!("{} Disconnected: {}", "!".yellow(), reason),
        SyncEvent::Reconnecting { attempt, delay_ms } => {
            format!("Reconnecting in {}ms (attempt {})...", delay_ms, attempt).dimmed().to_string()
        }
        SyncEvent::ItineraryChanged { .. } => return None,
    };
    Some(line)
}
