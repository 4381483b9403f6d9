//! File mover (spec §4.9): atomic move with collision resolution, reversible
//! action logging, undo.
//!
//! Grounded on the teacher's move/rename pattern (formerly
//! `services::organizer`) and `original_source/.../organizer/file_mover.py`
//! for the `name (n).ext` collision-probing rule and the undo semantics.

use persistence::Store;
use shared::error::{MoveError, UndoError};
use shared::types::{ActionRecord, ActionType, FileState};
use std::path::{Path, PathBuf};

pub const MAX_COLLISION_PROBES: u32 = 1000;

pub struct Mover<'a> {
    store: &'a Store,
}

impl<'a> Mover<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Moves `source` to `destination_dir/<source file name>`, probing
    /// `name (1).ext`, `name (2).ext`, ... up to `MAX_COLLISION_PROBES`
    /// times if the target already exists (spec §4.9). Records a reversible
    /// `ActionRecord` on success.
    pub fn move_file(&self, file_id: i64, source: &Path, destination_dir: &Path) -> Result<PathBuf, MoveError> {
        if !source.exists() {
            return Err(MoveError::SourceMissingError { path: source.to_path_buf() });
        }

        let newly_created = missing_ancestors(destination_dir);
        std::fs::create_dir_all(destination_dir)
            .map_err(|e| MoveError::DestinationError { path: destination_dir.to_path_buf(), source: e })?;
        for level in &newly_created {
            self.record_create_folder(file_id, level);
        }

        let target = resolve_collision(destination_dir, source)?;

        let before = FileState {
            path: source.display().to_string(),
            filename: source.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        };

        move_or_copy(source, &target).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                MoveError::PermissionError { path: source.to_path_buf() }
            } else {
                MoveError::DestinationError { path: target.clone(), source: e }
            }
        })?;

        let after = FileState {
            path: target.display().to_string(),
            filename: target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        };

        let record = ActionRecord {
            id: None,
            timestamp: chrono::Utc::now(),
            action_type: ActionType::Move,
            file_id,
            before_state: Some(before),
            after_state: Some(after),
            undone: false,
            undone_at: None,
        };
        self.store.append_action(&record).map_err(|e| MoveError::DestinationError {
            path: target.clone(),
            source: std::io::Error::other(e.to_string()),
        })?;

        Ok(target)
    }

    /// Appends a best-effort `create_folder` action for a directory level
    /// created while making room for this move (spec §4.9 step 2). Undo of
    /// these actions is intentionally unimplemented (spec §9 Open
    /// Question), so a logging failure here is non-fatal to the move.
    fn record_create_folder(&self, file_id: i64, dir: &Path) {
        let after = FileState {
            path: dir.display().to_string(),
            filename: dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        };
        let record = ActionRecord {
            id: None,
            timestamp: chrono::Utc::now(),
            action_type: ActionType::CreateFolder,
            file_id,
            before_state: None,
            after_state: Some(after),
            undone: false,
            undone_at: None,
        };
        let _ = self.store.append_action(&record);
    }

    /// Reverses a `move` action by moving the file back to its recorded
    /// `before_state` path. `create_folder` actions are intentionally left
    /// non-undoable (spec Open Question: undo does not recursively clean up
    /// folders the move may have created).
    pub fn undo(&self, action_id: i64) -> Result<(), UndoError> {
        let action = match self.store.get_action(action_id) {
            Ok(Some(a)) => a,
            Ok(None) | Err(_) => return Err(UndoError::NotFound(action_id)),
        };

        if action.undone {
            return Err(UndoError::AlreadyUndone(action_id));
        }
        if action.action_type != ActionType::Move {
            return Err(UndoError::NotUndoable { id: action_id, kind: action.action_type.as_str().to_string() });
        }

        let (Some(before), Some(after)) = (&action.before_state, &action.after_state) else {
            return Err(UndoError::NotUndoable { id: action_id, kind: "move".into() });
        };

        let current_path = Path::new(&after.path);
        if !current_path.exists() {
            return Err(UndoError::FileMissing(current_path.to_path_buf()));
        }

        let restore_path = Path::new(&before.path);
        let restore_dir = restore_path.parent().unwrap_or(restore_path);
        std::fs::create_dir_all(restore_dir).ok();
        let restore_target = if restore_path.exists() {
            resolve_collision(restore_dir, restore_path).map_err(|_| UndoError::FileMissing(current_path.to_path_buf()))?
        } else {
            restore_path.to_path_buf()
        };
        move_or_copy(current_path, &restore_target).map_err(|_| UndoError::FileMissing(current_path.to_path_buf()))?;

        self.store
            .mark_action_undone(action_id)
            .map_err(|_| UndoError::NotFound(action_id))?;
        Ok(())
    }
}

/// Performs the move as a rename when possible; falls back to copy-and-delete
/// across filesystem boundaries (spec §4.9 step 5), which is the only case
/// `std::fs::rename` cannot handle on its own. The source is only removed
/// after the copy succeeds in full, so a partial copy leaves it intact.
/// `PermissionDenied` is returned immediately rather than retried as a copy,
/// since a copy would fail for the same reason.
fn move_or_copy(source: &Path, target: &Path) -> std::io::Result<()> {
    match std::fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Err(e),
        Err(rename_err) => match std::fs::copy(source, target) {
            Ok(_) => std::fs::remove_file(source),
            Err(_) => Err(rename_err),
        },
    }
}

/// Returns the ancestors of `dir` (including `dir` itself) that do not yet
/// exist on disk, ordered shallowest-first — the order `create_dir_all`
/// brings them into being (spec §4.9 step 2: "record a `create_folder`
/// action for each newly created level").
fn missing_ancestors(dir: &Path) -> Vec<PathBuf> {
    let mut missing = Vec::new();
    let mut current = Some(dir);
    while let Some(p) = current {
        if p.exists() {
            break;
        }
        missing.push(p.to_path_buf());
        current = p.parent();
    }
    missing.reverse();
    missing
}

/// Finds a non-colliding destination path: `name.ext`, then `name (1).ext`,
/// `name (2).ext`, ... (spec §4.9).
fn resolve_collision(destination_dir: &Path, source: &Path) -> Result<PathBuf, MoveError> {
    let stem = source.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = source.extension().map(|e| e.to_string_lossy().into_owned());

    let candidate = destination_dir.join(source.file_name().unwrap_or_default());
    if !candidate.exists() {
        return Ok(candidate);
    }

    for n in 1..=MAX_COLLISION_PROBES {
        let name = match &ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let probe = destination_dir.join(name);
        if !probe.exists() {
            return Ok(probe);
        }
    }

    Err(MoveError::CollisionError { path: source.to_path_buf() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::{FileRecord, FileStatus};
    use tempfile::tempdir;

    fn store_with_file(dir: &Path) -> (Store, i64) {
        let store = Store::open_in_memory().unwrap();
        let record = FileRecord {
            id: None,
            path: dir.join("a.txt").display().to_string(),
            filename: "a.txt".into(),
            extension: ".txt".into(),
            size_bytes: 1,
            md5: "x".into(),
            status: FileStatus::Pending,
            embedding_ref: None,
            created_at: chrono::Utc::now(),
            modified_at: chrono::Utc::now(),
            processed_at: None,
        };
        let id = store.insert_file(&record).unwrap();
        (store, id)
    }

    #[test]
    fn moves_file_to_destination() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        let source = src_dir.path().join("a.txt");
        std::fs::write(&source, "hello").unwrap();

        let (store, file_id) = store_with_file(src_dir.path());
        let mover = Mover::new(&store);
        let target = mover.move_file(file_id, &source, dst_dir.path()).unwrap();

        assert!(target.exists());
        assert!(!source.exists());
    }

    #[test]
    fn move_into_new_subfolders_records_create_folder_actions() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        let source = src_dir.path().join("a.txt");
        std::fs::write(&source, "hello").unwrap();

        let (store, file_id) = store_with_file(src_dir.path());
        let mover = Mover::new(&store);
        let nested_dest = dst_dir.path().join("Docs").join("2024");
        mover.move_file(file_id, &source, &nested_dest).unwrap();

        let actions = store.list_actions(10).unwrap();
        let create_folder_actions: Vec<_> =
            actions.iter().filter(|a| a.action_type == ActionType::CreateFolder).collect();
        assert_eq!(create_folder_actions.len(), 2);
        let recorded_paths: Vec<&str> =
            create_folder_actions.iter().map(|a| a.after_state.as_ref().unwrap().path.as_str()).collect();
        assert!(recorded_paths.contains(&dst_dir.path().join("Docs").display().to_string().as_str()));
        assert!(recorded_paths.contains(&nested_dest.display().to_string().as_str()));
    }

    #[test]
    fn collision_appends_counter_suffix() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        std::fs::write(dst_dir.path().join("a.txt"), "existing").unwrap();
        let source = src_dir.path().join("a.txt");
        std::fs::write(&source, "hello").unwrap();

        let (store, file_id) = store_with_file(src_dir.path());
        let mover = Mover::new(&store);
        let target = mover.move_file(file_id, &source, dst_dir.path()).unwrap();

        assert_eq!(target.file_name().unwrap().to_string_lossy(), "a (1).txt");
    }

    #[test]
    fn undo_restores_original_location() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        let source = src_dir.path().join("a.txt");
        std::fs::write(&source, "hello").unwrap();

        let (store, file_id) = store_with_file(src_dir.path());
        let mover = Mover::new(&store);
        let target = mover.move_file(file_id, &source, dst_dir.path()).unwrap();

        let actions = store.list_actions(10).unwrap();
        let action_id = actions.iter().find(|a| a.file_id == file_id).unwrap().id.unwrap();
        mover.undo(action_id).unwrap();

        assert!(source.exists());
        assert!(!target.exists());
    }

    #[test]
    fn undo_twice_errors_already_undone() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        let source = src_dir.path().join("a.txt");
        std::fs::write(&source, "hello").unwrap();

        let (store, file_id) = store_with_file(src_dir.path());
        let mover = Mover::new(&store);
        mover.move_file(file_id, &source, dst_dir.path()).unwrap();
        let actions = store.list_actions(10).unwrap();
        let action_id = actions.iter().find(|a| a.file_id == file_id).unwrap().id.unwrap();
        mover.undo(action_id).unwrap();

        let result = mover.undo(action_id);
        assert!(matches!(result, Err(UndoError::AlreadyUndone(_))));
    }
}
