use std::{env, path::PathBuf};

use clap::Parser;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Parser)]
#[command(name = "streak-todo", version, about = "Task lists that reward daily streaks")]
pub struct Config {
    /// SQLite database file
    #[arg(long, env = "STREAK_TODO_DB")]
    pub db: Option<PathBuf>,

    /// User id the session acts as; defaults to $USER
    #[arg(long, env = "STREAK_TODO_USER")]
    pub user: Option<String>,

    /// Log filter, e.g. "info" or "streak_todo=debug"
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log file; defaults to streaks.log next to the database
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Keep everything in memory for this session only
    #[arg(long)]
    pub ephemeral: bool,
}

fn data_dir() -> Result<PathBuf> {
    match env::var_os("HOME") {
        Some(home) => Ok(PathBuf::from(home).join(".todo")),
        None => Err(Error::InvalidInput(
            "could not determine home directory; pass --db".to_string(),
        )),
    }
}

impl Config {
    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.db {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("streaks.sqlite")),
        }
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.log_file {
            return Ok(path.clone());
        }
        let db = self.db_path()?;
        Ok(db.with_file_name("streaks.log"))
    }

    /// The signed-in user, if any. Blank values count as signed out.
    pub fn user_id(&self) -> Option<String> {
        self.user
            .clone()
            .or_else(|| env::var("USER").ok())
            .map(|user| user.trim().to_string())
            .filter(|user| !user.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_paths_win() {
        let config = Config::parse_from([
            "streak-todo",
            "--db",
            "/tmp/x/todo.sqlite",
            "--user",
            " ana ",
        ]);
        assert_eq!(config.db_path().unwrap(), PathBuf::from("/tmp/x/todo.sqlite"));
        assert_eq!(config.log_path().unwrap(), PathBuf::from("/tmp/x/streaks.log"));
        assert_eq!(config.user_id().as_deref(), Some("ana"));
        assert_eq!(config.log_level, "info");
        assert!(!config.ephemeral);
    }

    #[test]
    fn log_file_override() {
        let config = Config::parse_from([
            "streak-todo",
            "--db",
            "/tmp/a.sqlite",
            "--log-file",
            "/var/tmp/s.log",
            "--ephemeral",
        ]);
        assert_eq!(config.log_path().unwrap(), PathBuf::from("/var/tmp/s.log"));
        assert!(config.ephemeral);
    }
}
