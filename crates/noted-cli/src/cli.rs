use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "noted")]
#[command(about = "Offline-first notes with background sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Quick capture: noted "my thought here"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note content
        content: Vec<String>,
        /// Notebook to file the note under (created if missing)
        #[arg(short, long, value_name = "TITLE")]
        notebook: Option<String>,
        /// Tag names to attach (created if missing)
        #[arg(short, long, value_name = "NAME")]
        tag: Vec<String>,
    },
    /// List recent notes
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Only notes in this notebook
        #[arg(long, value_name = "TITLE")]
        notebook: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a note
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Manage notebooks
    Notebook {
        #[command(subcommand)]
        command: NotebookCommands,
    },
    /// Manage tags
    Tag {
        #[command(subcommand)]
        command: TagCommands,
    },
    /// Run one sync cycle against the configured server
    Sync,
    /// Show sync state: pending records and last sync time
    Status,
}

#[derive(Subcommand)]
pub enum NotebookCommands {
    /// Create a notebook
    Add {
        /// Notebook title
        title: String,
    },
    /// List notebooks
    List,
    /// Delete a notebook
    Delete {
        /// Notebook ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum TagCommands {
    /// Create a tag
    Add {
        /// Tag name
        name: String,
        /// Display color, e.g. "#ff8800"
        #[arg(long, value_name = "COLOR")]
        color: Option<String>,
    },
    /// List tags
    List,
    /// Delete a tag
    Delete {
        /// Tag name
        name: String,
    },
}
