use crate::classifier::{project_status, ActivityThresholds};
use crate::models::{LogFile, Project};
use crate::parser::stat_file;
use chrono::{DateTime, Utc};
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

const LOG_EXTENSION: &str = "jsonl";

/// Everything found under a scan root
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub log_files: Vec<LogFile>,
    pub projects: Vec<Project>,
}

/// Handles file system traversal and discovery of conversation log files
pub struct FileDiscovery {
    project_thresholds: ActivityThresholds,
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new(ActivityThresholds::projects_default())
    }
}

impl FileDiscovery {
    pub fn new(project_thresholds: ActivityThresholds) -> Self {
        Self { project_thresholds }
    }

    /// Walk `root` and collect every log file plus the first-level project
    /// directories. Unreadable directories are skipped; an unreadable root
    /// gives an empty result.
    pub fn discover(&self, root: &Path, now: DateTime<Utc>) -> Discovery {
        let mut log_files = Vec::new();
        let mut projects = Vec::new();
        let root_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());

        // WalkDir keeps its own stack, so nesting depth is unbounded.
        let walker = WalkDir::new(root).follow_links(false).into_iter();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let at = e.path().unwrap_or(root);
                    warn!(path = %at.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            let file_type = entry.file_type();

            if file_type.is_dir() {
                if entry.depth() == 1 {
                    if let Some(project) = self.project_from_dir(entry.file_name(), path, now) {
                        projects.push(project);
                    }
                }
                continue;
            }

            // Symlinked files are followed, symlinked directories are not.
            let is_file = file_type.is_file() || (entry.path_is_symlink() && path.is_file());
            if !is_file || !is_log_file(path) {
                continue;
            }

            match stat_file(path) {
                Ok(stat) => log_files.push(LogFile {
                    project_id: project_id_for(root, path, &root_name),
                    path: path.to_path_buf(),
                    size_bytes: stat.size_bytes,
                    modified_at: stat.modified_at,
                    created_at: stat.created_at,
                }),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping log file without metadata");
                }
            }
        }

        log_files.sort_by(|a, b| a.path.cmp(&b.path));
        projects.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then_with(|| a.name.cmp(&b.name))
        });

        debug!(
            root = %root.display(),
            log_files = log_files.len(),
            projects = projects.len(),
            "Discovery finished"
        );

        Discovery {
            log_files,
            projects,
        }
    }

    fn project_from_dir(&self, name: &OsStr, path: &Path, now: DateTime<Utc>) -> Option<Project> {
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            return None;
        }

        let last_activity: DateTime<Utc> = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified.into(),
            Err(e) => {
                warn!(dir = %path.display(), error = %e, "Skipping project without metadata");
                return None;
            }
        };

        Some(Project {
            name: name.into_owned(),
            path: path.to_path_buf(),
            last_activity,
            todo_file_count: find_todo_files(path).len(),
            status: project_status(last_activity, now, &self.project_thresholds),
        })
    }
}

fn is_log_file(path: &Path) -> bool {
    path.extension().and_then(OsStr::to_str) == Some(LOG_EXTENSION)
}

/// First directory under `root` that contains the file
fn project_id_for(root: &Path, path: &Path, root_name: &str) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut components = relative.components();
    match (components.next(), components.next()) {
        (Some(first), Some(_)) => first.as_os_str().to_string_lossy().into_owned(),
        _ => root_name.to_string(),
    }
}

/// Names of the direct entries of `dir` that look like todo files
pub fn find_todo_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains("todo") || name.contains("TODO"))
        .collect();
    names.sort();
    names
}

/// Strip the leading dash of an encoded project directory name
pub fn project_name_from_id(project_id: &str) -> String {
    project_id
        .strip_prefix('-')
        .unwrap_or(project_id)
        .to_string()
}
