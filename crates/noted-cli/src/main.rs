//! Noted CLI - offline-first notes from the terminal
//!
//! Every command works against the local store; `noted sync` pushes
//! and pulls against a configured server when one is available.

mod cli;
mod error;

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{CommandFactory, Parser};
use serde::Serialize;
use tokio::sync::Mutex;

use noted_core::store::LocalStore;
use noted_core::sync::{HttpSyncTransport, SyncEngine};
use noted_core::{Note, Notebook, TagId};

use cli::{Cli, Commands, NotebookCommands, TagCommands};
use error::CliError;

const DEFAULT_NOTEBOOK: &str = "Inbox";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("noted=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Some(Commands::Add {
            content,
            notebook,
            tag,
        }) => run_add(&content, notebook.as_deref(), &tag, &db_path)?,
        Some(Commands::List {
            limit,
            notebook,
            json,
        }) => run_list(limit, notebook.as_deref(), json, &db_path)?,
        Some(Commands::Delete { id }) => run_delete(&id, &db_path)?,
        Some(Commands::Notebook { command }) => run_notebook(command, &db_path)?,
        Some(Commands::Tag { command }) => run_tag(command, &db_path)?,
        Some(Commands::Sync) => run_sync(&db_path).await?,
        Some(Commands::Status) => run_status(&db_path)?,
        None => {
            // Quick capture mode: noted "my thought"
            if cli.note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_add(&cli.note, None, &[], &db_path)?;
            }
        }
    }

    Ok(())
}

fn run_add(
    content_parts: &[String],
    notebook: Option<&str>,
    tag_names: &[String],
    db_path: &Path,
) -> Result<(), CliError> {
    let Some(text) = normalize_content(&content_parts.join(" ")) else {
        return Err(CliError::EmptyContent);
    };

    let store = LocalStore::open(db_path)?;
    let nb = resolve_or_create_notebook(&store, notebook.unwrap_or(DEFAULT_NOTEBOOK))?;

    let content = serde_json::json!({ "type": "text", "text": text });
    let mut note = store.create_note(nb.id, content, &text)?;

    if !tag_names.is_empty() {
        note.tag_ids = resolve_or_create_tags(&store, tag_names)?;
        note = store.update_note(&note)?;
    }

    tracing::debug!("Captured note {} in notebook '{}'", note.id, nb.title);
    println!("{}", note.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct NoteListItem {
    id: String,
    preview: String,
    notebook_id: String,
    updated_at: String,
    relative_time: String,
    tags: Vec<String>,
}

fn run_list(
    limit: usize,
    notebook: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = LocalStore::open(db_path)?;
    let mut notes = match notebook {
        Some(title) => {
            let nb = find_notebook(&store, title)?;
            store.notes_in(&nb.id)?
        }
        None => store.notes()?,
    };
    notes.truncate(limit);

    let tag_names = tag_name_index(&store)?;
    if as_json {
        let items = notes
            .iter()
            .map(|note| note_to_list_item(note, &tag_names))
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_note_lines(&notes, &tag_names) {
            println!("{line}");
        }
    }

    Ok(())
}

fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = LocalStore::open(db_path)?;
    let note = resolve_note(&store, id.trim())?;
    store.delete_note(&note.id)?;
    println!("{}", note.id);
    Ok(())
}

fn run_notebook(command: NotebookCommands, db_path: &Path) -> Result<(), CliError> {
    let store = LocalStore::open(db_path)?;
    match command {
        NotebookCommands::Add { title } => {
            let nb = store.create_notebook(title.trim())?;
            println!("{}", nb.id);
        }
        NotebookCommands::List => {
            for nb in store.notebooks()? {
                let count = store.notes_in(&nb.id)?.len();
                println!("{:<38}  {:<30}  {count} notes", nb.id, nb.title);
            }
        }
        NotebookCommands::Delete { id } => {
            let nb = resolve_notebook(&store, id.trim())?;
            store.delete_notebook(&nb.id)?;
            println!("{}", nb.id);
        }
    }
    Ok(())
}

fn run_tag(command: TagCommands, db_path: &Path) -> Result<(), CliError> {
    let store = LocalStore::open(db_path)?;
    match command {
        TagCommands::Add { name, color } => {
            let tag = store.create_tag(name.trim(), color.as_deref())?;
            println!("{}", tag.id);
        }
        TagCommands::List => {
            for tag in store.tags()? {
                if tag.color.is_empty() {
                    println!("#{}", tag.name);
                } else {
                    println!("#{:<20}  {}", tag.name, tag.color);
                }
            }
        }
        TagCommands::Delete { name } => {
            let tag = store
                .tag_by_name(name.trim())?
                .ok_or_else(|| CliError::TagNotFound(name.trim().to_string()))?;
            store.delete_tag(&tag.id)?;
            println!("#{}", tag.name);
        }
    }
    Ok(())
}

async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let Some((endpoint, token)) = sync_config_from_env() else {
        return Err(CliError::SyncNotConfigured);
    };
    tracing::info!("Syncing against {endpoint}");

    let store = Arc::new(Mutex::new(LocalStore::open(db_path)?));
    let transport = HttpSyncTransport::new(endpoint, token)?;
    let engine = SyncEngine::new(store, transport);

    let outcome = engine.sync().await?;
    println!("Pulled {}, pushed {}", outcome.pulled, outcome.pushed);
    if outcome.has_conflict {
        println!("Some changes lost a conflict and were replaced by the server copy");
    }
    Ok(())
}

fn run_status(db_path: &Path) -> Result<(), CliError> {
    let store = LocalStore::open(db_path)?;
    let pending = store.pending_count()?;
    match store.watermark()? {
        Some(at) => println!("Last sync: {}", at.to_rfc3339()),
        None => println!("Last sync: never"),
    }
    println!("Pending records: {pending}");
    Ok(())
}

fn sync_config_from_env() -> Option<(String, String)> {
    let endpoint = env::var("NOTED_SYNC_URL").ok()?;
    let token = env::var("NOTED_SYNC_TOKEN").ok()?;
    if endpoint.is_empty() || token.is_empty() {
        return None;
    }
    Some((endpoint, token))
}

fn resolve_or_create_notebook(store: &LocalStore, title: &str) -> Result<Notebook, CliError> {
    if let Some(nb) = store.notebooks()?.into_iter().find(|nb| nb.title == title) {
        return Ok(nb);
    }
    Ok(store.create_notebook(title)?)
}

fn find_notebook(store: &LocalStore, title: &str) -> Result<Notebook, CliError> {
    store
        .notebooks()?
        .into_iter()
        .find(|nb| nb.title == title)
        .ok_or_else(|| CliError::NotebookNotFound(title.to_string()))
}

fn resolve_or_create_tags(store: &LocalStore, names: &[String]) -> Result<Vec<TagId>, CliError> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let id = match store.tag_by_name(name.trim())? {
            Some(tag) => tag.id,
            None => store.create_tag(name.trim(), None)?.id,
        };
        ids.push(id);
    }
    Ok(ids)
}

fn resolve_note(store: &LocalStore, query: &str) -> Result<Note, CliError> {
    let mut matches = store
        .notes()?
        .into_iter()
        .filter(|note| note.id.as_str().starts_with(query))
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(CliError::NoteNotFound(query.to_string())),
        1 => Ok(matches.swap_remove(0)),
        _ => Err(ambiguous(query, matches.iter().map(|n| n.id.as_str()))),
    }
}

fn resolve_notebook(store: &LocalStore, query: &str) -> Result<Notebook, CliError> {
    let mut matches = store
        .notebooks()?
        .into_iter()
        .filter(|nb| nb.id.as_str().starts_with(query))
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(CliError::NotebookNotFound(query.to_string())),
        1 => Ok(matches.swap_remove(0)),
        _ => Err(ambiguous(query, matches.iter().map(|nb| nb.id.as_str()))),
    }
}

fn ambiguous(query: &str, ids: impl Iterator<Item = String>) -> CliError {
    let options = ids
        .take(3)
        .map(|id| id.chars().take(13).collect::<String>())
        .collect::<Vec<_>>()
        .join(", ");
    CliError::AmbiguousId(format!(
        "ID prefix '{query}' is ambiguous; matches: {options}"
    ))
}

fn tag_name_index(store: &LocalStore) -> Result<Vec<(TagId, String)>, CliError> {
    Ok(store
        .tags()?
        .into_iter()
        .map(|tag| (tag.id, tag.name))
        .collect())
}

fn format_note_lines(notes: &[Note], tag_names: &[(TagId, String)]) -> Vec<String> {
    let now = Utc::now();
    notes
        .iter()
        .map(|note| {
            let id = note.id.as_str();
            let short_id = id.chars().take(13).collect::<String>();
            let preview = note.title_preview(40);
            let relative = format_relative_time(note.updated_at, now);
            let tags = render_tags(note, tag_names);

            if tags.is_empty() {
                format!("{short_id:<13}  {preview:<40}  {relative}")
            } else {
                format!("{short_id:<13}  {preview:<40}  {relative:<10}  {tags}")
            }
        })
        .collect()
}

fn note_to_list_item(note: &Note, tag_names: &[(TagId, String)]) -> NoteListItem {
    NoteListItem {
        id: note.id.as_str(),
        preview: note.title_preview(80),
        notebook_id: note.notebook_id.as_str(),
        updated_at: note.updated_at.to_rfc3339(),
        relative_time: format_relative_time(note.updated_at, Utc::now()),
        tags: note
            .tag_ids
            .iter()
            .filter_map(|id| lookup_tag_name(tag_names, id))
            .collect(),
    }
}

fn render_tags(note: &Note, tag_names: &[(TagId, String)]) -> String {
    note.tag_ids
        .iter()
        .filter_map(|id| lookup_tag_name(tag_names, id))
        .map(|name| format!("#{name}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn lookup_tag_name(tag_names: &[(TagId, String)], id: &TagId) -> Option<String> {
    tag_names
        .iter()
        .find(|(tag_id, _)| tag_id == id)
        .map(|(_, name)| name.clone())
}

fn format_relative_time(at: chrono::DateTime<Utc>, now: chrono::DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(at).num_milliseconds().max(0);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("NOTED_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("noted")
        .join("noted.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn test_store() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noted.db");
        (dir, path)
    }

    #[test]
    fn test_normalize_content_trims_and_rejects_empty() {
        assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
        assert_eq!(normalize_content(" \n\t "), None);
    }

    #[test]
    fn test_format_relative_time_units() {
        let now = Utc::now();
        assert_eq!(format_relative_time(now - Duration::seconds(30), now), "just now");
        assert_eq!(format_relative_time(now - Duration::minutes(2), now), "2m ago");
        assert_eq!(format_relative_time(now - Duration::hours(2), now), "2h ago");
        assert_eq!(format_relative_time(now - Duration::days(3), now), "3d ago");
    }

    #[test]
    fn test_add_creates_default_notebook_and_tags() {
        let (_dir, path) = test_store();
        run_add(
            &["grocery".to_string(), "list".to_string()],
            None,
            &["errands".to_string()],
            &path,
        )
        .unwrap();

        let store = LocalStore::open(&path).unwrap();
        let notebooks = store.notebooks().unwrap();
        assert_eq!(notebooks.len(), 1);
        assert_eq!(notebooks[0].title, DEFAULT_NOTEBOOK);

        let notes = store.notes().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].plain_text, "grocery list");
        assert_eq!(notes[0].tag_ids.len(), 1);
        assert!(store.tag_by_name("errands").unwrap().is_some());
    }

    #[test]
    fn test_add_reuses_existing_notebook() {
        let (_dir, path) = test_store();
        run_add(&["one".to_string()], Some("Work"), &[], &path).unwrap();
        run_add(&["two".to_string()], Some("Work"), &[], &path).unwrap();

        let store = LocalStore::open(&path).unwrap();
        assert_eq!(store.notebooks().unwrap().len(), 1);
        assert_eq!(store.notes().unwrap().len(), 2);
    }

    #[test]
    fn test_resolve_note_by_prefix() {
        let (_dir, path) = test_store();
        run_add(&["findable".to_string()], None, &[], &path).unwrap();

        let store = LocalStore::open(&path).unwrap();
        let note = &store.notes().unwrap()[0];
        let prefix = note.id.as_str().chars().take(13).collect::<String>();

        let found = resolve_note(&store, &prefix).unwrap();
        assert_eq!(found.id, note.id);

        assert!(matches!(
            resolve_note(&store, "ffffffff"),
            Err(CliError::NoteNotFound(_))
        ));
    }

    #[test]
    fn test_delete_tombstones_note() {
        let (_dir, path) = test_store();
        run_add(&["short-lived".to_string()], None, &[], &path).unwrap();

        let store = LocalStore::open(&path).unwrap();
        let id = store.notes().unwrap()[0].id;
        drop(store);

        run_delete(&id.as_str(), &path).unwrap();

        let store = LocalStore::open(&path).unwrap();
        assert!(store.notes().unwrap().is_empty());
        let (note, _) = store.note(&id).unwrap().unwrap();
        assert!(note.is_tombstoned());
    }

    #[test]
    fn test_sync_without_configuration_fails() {
        let (_dir, path) = test_store();
        // Neither env var is set in the test environment
        let result = tokio::runtime::Runtime::new().unwrap().block_on(run_sync(&path));
        assert!(matches!(result, Err(CliError::SyncNotConfigured)));
    }

    #[test]
    fn test_status_reports_pending_and_watermark() {
        let (_dir, path) = test_store();
        run_add(&["unsent".to_string()], None, &[], &path).unwrap();

        let store = LocalStore::open(&path).unwrap();
        assert!(store.watermark().unwrap().is_none());
        assert_eq!(store.pending_count().unwrap(), 2);
    }
}
