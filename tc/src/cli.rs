//! CLI command definitions and subcommands

use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::preview::MoveSpec;

/// TripCrew - collaborative trip itinerary editor
#[derive(Parser)]
#[command(
    name = "tc",
    about = "Edit a shared trip itinerary together, with realtime chat and an assistant",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a trip's itinerary
    Show {
        /// Trip ID
        trip: i64,
    },

    /// Move one item and persist the new order
    Move {
        /// Trip ID
        trip: i64,

        /// Item ID
        item: i64,

        /// Target day (1-based)
        #[arg(short, long)]
        day: u32,

        /// Target position within the day (1-based)
        #[arg(short, long)]
        position: u32,
    },

    /// Delete an item
    Rm {
        /// Trip ID
        trip: i64,

        /// Item ID
        item: i64,
    },

    /// Add an item to the end of a day
    Add {
        /// Trip ID
        trip: i64,

        /// Day (1-based)
        #[arg(short, long)]
        day: u32,

        /// Place name
        #[arg(long)]
        place: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        address: Option<String>,

        /// Start time (HH:MM)
        #[arg(long, value_parser = parse_time)]
        start: Option<NaiveTime>,

        /// End time (HH:MM)
        #[arg(long, value_parser = parse_time)]
        end: Option<NaiveTime>,

        /// Latitude of the place
        #[arg(long, requires = "lng", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Longitude of the place
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lng: Option<f64>,
    },

    /// Join a trip: live chat, assistant prompts and itinerary edits
    Join {
        /// Trip ID
        trip: i64,
    },

    /// Preview moves against a saved trip snapshot, offline
    Preview {
        /// Trip snapshot JSON (as returned by the trip endpoint)
        file: PathBuf,

        /// Move as ITEM=DAY:POS; repeatable, applied in order
        #[arg(short = 'm', long = "move", value_name = "ITEM=DAY:POS")]
        moves: Vec<MoveSpec>,
    },
}

fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw, "%H:%M").map_err(|e| format!("expected HH:MM: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_move() {
        let cli = Cli::try_parse_from(["tc", "-l", "debug", "move", "3", "12", "--day", "2", "--position", "1"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Move {
                trip,
                item,
                day,
                position,
            } => {
                assert_eq!((trip, item, day, position), (3, 12, 2, 1));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_add_with_times() {
        let cli = Cli::try_parse_from([
            "tc", "add", "3", "--day", "1", "--place", "Kinkaku-ji", "--start", "09:30", "--end", "11:00",
        ])
        .unwrap();
        let Command::Add { start, end, place, .. } = cli.command else {
            panic!("expected add");
        };
        assert_eq!(place, "Kinkaku-ji");
        assert_eq!(start, NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(end, NaiveTime::from_hms_opt(11, 0, 0));

        assert!(Cli::try_parse_from(["tc", "add", "3", "--day", "1", "--place", "x", "--start", "9am"]).is_err());
    }

    #[test]
    fn test_parse_add_coordinates_come_in_pairs() {
        let cli = Cli::try_parse_from([
            "tc", "add", "3", "--day", "2", "--place", "Fushimi Inari", "--lat", "34.9671", "--lng", "135.7727",
        ])
        .unwrap();
        let Command::Add { lat, lng, .. } = cli.command else {
            panic!("expected add");
        };
        assert_eq!((lat, lng), (Some(34.9671), Some(135.7727)));

        let cli = Cli::try_parse_from(["tc", "add", "3", "--day", "1", "--place", "x", "--lat", "-33.9", "--lng", "18.4"])
            .unwrap();
        let Command::Add { lat, .. } = cli.command else {
            panic!("expected add");
        };
        assert_eq!(lat, Some(-33.9));

        assert!(Cli::try_parse_from(["tc", "add", "3", "--day", "1", "--place", "x", "--lat", "34.9"]).is_err());
    }

    #[test]
    fn test_parse_preview_moves() {
        let cli = Cli::try_parse_from(["tc", "preview", "trip.json", "--move", "2=2:1", "-m", "1=2:3"]).unwrap();
        let Command::Preview { file, moves } = cli.command else {
            panic!("expected preview");
        };
        assert_eq!(file, PathBuf::from("trip.json"));
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[1].position, 3);

        assert!(Cli::try_parse_from(["tc", "preview", "trip.json", "--move", "nonsense"]).is_err());
    }
}
