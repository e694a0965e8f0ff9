//! Terminal display for the CLI: tables, stage progress and colors.

pub mod progress;
pub mod tables;
pub mod theme;

pub use progress::{StageProgress, create_spinner};
pub use tables::{TableBuilder, create_cluster_table, create_stats_table, create_word_table};
pub use theme::{THEME, Theme};
