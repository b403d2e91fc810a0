//! Conflict detection over a batch of operations.
//!
//! Writes to each file are checked in submission order. The first write is
//! compared with the disk: its read checksum must still match, a file it
//! modifies or deletes must still exist, and a file it creates must not.
//! Every later write must be planned against the content of the write
//! before it (its read checksum equals the hash of that content), or follow
//! a delete with a create. Anything else is a concurrent edit in which the
//! earlier operation proceeds and the later ones are flagged.

use rampart_core::{ContentHash, Operation, OperationId, OperationKind, PackageRequirement};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::conflict::{Conflict, ConflictKind, Resolution};
use crate::disk::{DiskState, normalize_resource};
use crate::error::{ConflictError, ConflictResult};
use crate::packages::{
    is_wildcard, normalize_name, parse_install_command, requirements_compatible,
};

/// Read-only analysis of operation batches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    /// Create a detector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Find every conflict in `operations` against `disk`.
    ///
    /// Conflicts are reported in a stable order: file conflicts by first
    /// appearance of the file, then dependency clashes, then merge markers.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictError::Io`] when the disk state cannot be read.
    pub fn detect(
        &self,
        operations: &[Operation],
        disk: &dyn DiskState,
    ) -> ConflictResult<Vec<Conflict>> {
        let mut conflicts = Vec::new();

        for (resource, writers) in group_writers(operations) {
            let name = resource.display().to_string();
            if let Some(first) = writers.first()
                && let Some(conflict) = check_first_write(&name, first, disk)?
            {
                conflicts.push(conflict);
            }
            if let Some(conflict) = check_sequencing(&name, &writers) {
                conflicts.push(conflict);
            }
        }
        conflicts.extend(check_dependencies(operations));
        conflicts.extend(check_merge_markers(operations));

        for conflict in &conflicts {
            info!(
                conflict = %conflict.id,
                kind = %conflict.kind,
                resources = ?conflict.resources,
                flagged = conflict.flagged.len(),
                "conflict detected"
            );
        }
        debug!(
            operations = operations.len(),
            conflicts = conflicts.len(),
            "conflict detection complete"
        );
        Ok(conflicts)
    }
}

/// File-mutating operations grouped by normalized target, in order of first
/// appearance.
fn group_writers(operations: &[Operation]) -> Vec<(PathBuf, Vec<&Operation>)> {
    let mut groups: Vec<(PathBuf, Vec<&Operation>)> = Vec::new();
    let mut index: HashMap<PathBuf, usize> = HashMap::new();
    for op in operations.iter().filter(|op| op.kind.mutates_file()) {
        let resource = normalize_resource(op.target_path());
        match index.get(&resource) {
            Some(&i) => {
                if let Some((_, writers)) = groups.get_mut(i) {
                    writers.push(op);
                }
            },
            None => {
                index.insert(resource.clone(), groups.len());
                groups.push((resource, vec![op]));
            },
        }
    }
    groups
}

fn check_first_write(
    name: &str,
    op: &Operation,
    disk: &dyn DiskState,
) -> ConflictResult<Option<Conflict>> {
    let current = disk
        .checksum(op.target_path())
        .map_err(|source| ConflictError::Io {
            path: op.target_path().to_path_buf(),
            source,
        })?;
    let ids = vec![op.id];

    let conflict = match (op.kind, current) {
        (kind, None) if kind.expects_existing() => {
            let reload = if kind == OperationKind::FileDelete {
                format!("drop {}: {name} is already gone", op.id)
            } else {
                format!("recreate {name} from the content of {}", op.id)
            };
            Some(
                Conflict::new(
                    ConflictKind::FileDeleted,
                    ids.clone(),
                    name,
                    format!("{name} no longer exists but {} expects it ({kind})", op.id),
                )
                .suggest(Resolution::Reload { operations: ids.clone() }, reload)
                .suggest(
                    Resolution::Discard { operations: ids },
                    format!("discard {}", op.id),
                ),
            )
        },
        (OperationKind::FileCreate, Some(now)) if op.read_checksum != Some(now) => Some(
            Conflict::new(
                ConflictKind::FileModifiedSinceRead,
                ids.clone(),
                name,
                format!(
                    "{name} already exists ({}) but {} creates it",
                    now.short(),
                    op.id
                ),
            )
            .suggest(
                Resolution::Reload { operations: ids.clone() },
                format!("reload {name} and turn {} into a modification", op.id),
            )
            .suggest(
                Resolution::Discard { operations: ids },
                format!("discard {} and keep the existing {name}", op.id),
            ),
        ),
        (_, Some(now)) => match op.read_checksum {
            Some(read) if read != now => Some(
                Conflict::new(
                    ConflictKind::FileModifiedSinceRead,
                    ids.clone(),
                    name,
                    format!(
                        "{name} changed on disk since {} read it (read {}, now {})",
                        op.id,
                        read.short(),
                        now.short()
                    ),
                )
                .suggest(
                    Resolution::Reload { operations: ids.clone() },
                    format!("reload {name} and re-diff {} against it", op.id),
                )
                .suggest(
                    Resolution::Discard { operations: ids },
                    format!("discard {} and keep the on-disk {name}", op.id),
                ),
            ),
            _ => None,
        },
        _ => None,
    };
    Ok(conflict)
}

/// Whether `next` was planned against the result of `prev`.
fn is_sequenced(prev: &Operation, next: &Operation) -> bool {
    match (prev.kind, next.kind) {
        (OperationKind::FileDelete, OperationKind::FileCreate) => true,
        (OperationKind::FileDelete, _) | (_, OperationKind::FileCreate) => false,
        _ => match (prev.content.as_deref(), next.read_checksum) {
            (Some(content), Some(read)) => ContentHash::hash(content.as_bytes()) == read,
            _ => false,
        },
    }
}

fn check_sequencing(name: &str, writers: &[&Operation]) -> Option<Conflict> {
    let flagged: Vec<OperationId> = writers
        .windows(2)
        .filter(|pair| !is_sequenced(pair[0], pair[1]))
        .map(|pair| pair[1].id)
        .collect();
    let earliest = writers.first()?.id;
    if flagged.is_empty() {
        return None;
    }

    let operations: Vec<OperationId> = writers.iter().map(|op| op.id).collect();
    let flagged_list = join_ids(&flagged);
    Some(
        Conflict::new(
            ConflictKind::ConcurrentEdit,
            operations,
            name,
            format!(
                "{} operations in the batch write {name}; {flagged_list} did not plan against the write before it",
                writers.len()
            ),
        )
        .with_flagged(flagged.clone())
        .suggest(
            Resolution::Merge,
            format!("apply {earliest} first, then {flagged_list} in order; the last write's content is kept"),
        )
        .suggest(
            Resolution::Discard {
                operations: flagged,
            },
            format!("discard {flagged_list} and keep {earliest}"),
        ),
    )
}

/// Package requirements an operation carries, explicit ones first.
pub(crate) fn requirements_of(op: &Operation) -> Vec<PackageRequirement> {
    let mut requirements = op.packages.clone();
    if op.kind == OperationKind::CommandExecute {
        for parsed in parse_install_command(&op.target) {
            if !requirements.contains(&parsed.requirement) {
                requirements.push(parsed.requirement);
            }
        }
    }
    requirements
}

fn check_dependencies(operations: &[Operation]) -> Vec<Conflict> {
    let mut by_package: Vec<(String, Vec<(OperationId, String)>)> = Vec::new();
    for op in operations {
        for requirement in requirements_of(op) {
            let package = normalize_name(&requirement.name);
            let entry = (op.id, requirement.requirement);
            match by_package.iter_mut().find(|(name, _)| *name == package) {
                Some((_, entries)) => entries.push(entry),
                None => by_package.push((package, vec![entry])),
            }
        }
    }

    let mut conflicts = Vec::new();
    for (package, entries) in by_package {
        let pinned: Vec<&(OperationId, String)> =
            entries.iter().filter(|(_, req)| !is_wildcard(req)).collect();
        let mut flagged: Vec<OperationId> = Vec::new();
        for (i, (id, req)) in pinned.iter().enumerate() {
            let clashes = pinned
                .iter()
                .take(i)
                .any(|(_, earlier)| !requirements_compatible(earlier, req));
            if clashes && !flagged.contains(id) {
                flagged.push(*id);
            }
        }
        let Some((earliest_op, earliest_req)) = pinned.first().map(|e| (e.0, e.1.clone())) else {
            continue;
        };
        if flagged.is_empty() {
            continue;
        }

        let mut operations: Vec<OperationId> = Vec::new();
        for (id, _) in &entries {
            if !operations.contains(id) {
                operations.push(*id);
            }
        }
        let wanted: Vec<String> = pinned
            .iter()
            .map(|(id, req)| format!("{req} ({id})"))
            .collect();
        let flagged_list = join_ids(&flagged);
        conflicts.push(
            Conflict::new(
                ConflictKind::DependencyVersionClash,
                operations,
                package.as_str(),
                format!(
                    "{package} is required as {}; no version satisfies all of them",
                    wanted.join(", ")
                ),
            )
            .with_flagged(flagged.clone())
            .suggest(
                Resolution::Merge,
                format!("pin every operation to {package} {earliest_req} as {earliest_op} asks"),
            )
            .suggest(
                Resolution::Discard {
                    operations: flagged,
                },
                format!("discard {flagged_list}"),
            ),
        );
    }
    conflicts
}

/// Whether `content` holds a `<<<<<<<` / `=======` / `>>>>>>>` block.
#[must_use]
pub fn has_merge_markers(content: &str) -> bool {
    let mut stage = 0u8;
    for line in content.lines() {
        stage = match stage {
            0 if line.starts_with("<<<<<<<") => 1,
            1 if line.trim_end() == "=======" => 2,
            2 if line.starts_with(">>>>>>>") => return true,
            current => current,
        };
    }
    false
}

fn check_merge_markers(operations: &[Operation]) -> Vec<Conflict> {
    operations
        .iter()
        .filter(|op| op.kind.mutates_file())
        .filter(|op| op.content.as_deref().is_some_and(has_merge_markers))
        .map(|op| {
            let name = normalize_resource(op.target_path()).display().to_string();
            Conflict::new(
                ConflictKind::MergeConflict,
                vec![op.id],
                name.as_str(),
                format!("new content of {name} from {} contains merge markers", op.id),
            )
            .suggest(
                Resolution::Discard {
                    operations: vec![op.id],
                },
                format!("discard {} until the markers in {name} are resolved", op.id),
            )
        })
        .collect()
}

fn join_ids(ids: &[OperationId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemoryDiskState;

    const ORIGINAL: &[u8] = b"retries: 3\n";

    fn disk() -> MemoryDiskState {
        MemoryDiskState::new().with_file("config.yaml", ORIGINAL)
    }

    fn detect(ops: &[Operation], disk: &MemoryDiskState) -> Vec<Conflict> {
        ConflictDetector::new().detect(ops, disk).unwrap()
    }

    #[test]
    fn test_clean_batch_has_no_conflicts() {
        let ops = vec![
            Operation::file_modify("config.yaml", "retries: 5\n").read_from(ORIGINAL),
            Operation::file_create("README.md", "# demo\n"),
            Operation::command("cargo test"),
        ];
        assert!(detect(&ops, &disk()).is_empty());
    }

    #[test]
    fn test_two_rewrites_flag_the_later_one() {
        let first = Operation::file_modify("config.yaml", "retries: 5\n").read_from(ORIGINAL);
        let second = Operation::file_modify("./config.yaml", "retries: 9\n").read_from(ORIGINAL);
        let conflicts = detect(&[first.clone(), second.clone()], &disk());

        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.kind, ConflictKind::ConcurrentEdit);
        assert_eq!(conflict.operations, vec![first.id, second.id]);
        assert_eq!(conflict.flagged, vec![second.id]);
        assert_eq!(conflict.resources, vec!["config.yaml".to_string()]);
        assert_eq!(conflict.recommended(), Some(&Resolution::Merge));
    }

    #[test]
    fn test_rebased_write_is_not_a_conflict() {
        let first = Operation::file_modify("config.yaml", "retries: 5\n").read_from(ORIGINAL);
        let second =
            Operation::file_modify("config.yaml", "retries: 9\n").read_from(b"retries: 5\n");
        assert!(detect(&[first, second], &disk()).is_empty());
    }

    #[test]
    fn test_delete_then_create_is_sequenced() {
        let ops = vec![
            Operation::file_delete("config.yaml"),
            Operation::file_create("config.yaml", "fresh: true\n"),
        ];
        assert!(detect(&ops, &disk()).is_empty());
    }

    #[test]
    fn test_modified_since_read() {
        let op = Operation::file_modify("config.yaml", "retries: 5\n").read_from(b"retries: 1\n");
        let conflicts = detect(std::slice::from_ref(&op), &disk());
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::FileModifiedSinceRead);
        assert_eq!(conflicts[0].flagged, vec![op.id]);
        assert!(conflicts[0].reason.contains("changed on disk"));
        assert_eq!(
            conflicts[0].recommended(),
            Some(&Resolution::Reload {
                operations: vec![op.id]
            })
        );
    }

    #[test]
    fn test_create_over_existing_file() {
        let op = Operation::file_create("config.yaml", "new\n");
        let conflicts = detect(&[op], &disk());
        assert_eq!(conflicts[0].kind, ConflictKind::FileModifiedSinceRead);
        assert!(conflicts[0].reason.contains("already exists"));
    }

    #[test]
    fn test_missing_file() {
        let modify = Operation::file_modify("gone.txt", "x").read_from(b"old");
        let delete = Operation::file_delete("also_gone.txt");
        let conflicts = detect(&[modify.clone(), delete.clone()], &disk());
        assert_eq!(conflicts.len(), 2);
        assert!(conflicts.iter().all(|c| c.kind == ConflictKind::FileDeleted));
        assert_eq!(conflicts[0].operations, vec![modify.id]);
        assert_eq!(conflicts[1].operations, vec![delete.id]);
    }

    #[test]
    fn test_dependency_clash_from_commands_and_packages() {
        let a = Operation::command("pip install requests==2.28.1");
        let b = Operation::command("echo ok")
            .with_package(PackageRequirement::new("Requests", "==2.31.0"));
        let c = Operation::command("pip install requests");
        let conflicts = detect(&[a.clone(), b.clone(), c.clone()], &disk());

        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.kind, ConflictKind::DependencyVersionClash);
        assert_eq!(conflict.resources, vec!["requests".to_string()]);
        assert_eq!(conflict.operations, vec![a.id, b.id, c.id]);
        assert_eq!(conflict.flagged, vec![b.id]);
        assert!(conflict.reason.contains("==2.28.1"));
    }

    #[test]
    fn test_compatible_ranges_do_not_clash() {
        let ops = vec![
            Operation::command("cargo add serde@1.0"),
            Operation::command("cargo add serde@^1.0.190"),
        ];
        assert!(detect(&ops, &disk()).is_empty());
    }

    #[test]
    fn test_merge_markers() {
        assert!(has_merge_markers(
            "a\n<<<<<<< HEAD\nb\n=======\nc\n>>>>>>> feature\n"
        ));
        assert!(!has_merge_markers("=======\nheading underline\n"));

        let op = Operation::file_create("notes.md", "<<<<<<< ours\nx\n=======\ny\n>>>>>>> theirs\n");
        let conflicts = detect(std::slice::from_ref(&op), &disk());
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::MergeConflict);
    }

    #[test]
    fn test_detection_does_not_mutate_batch() {
        let ops = vec![
            Operation::file_modify("config.yaml", "a\n").read_from(b"stale"),
            Operation::file_modify("config.yaml", "b\n"),
        ];
        let before = serde_json::to_string(&ops).unwrap();
        let _ = detect(&ops, &disk());
        assert_eq!(serde_json::to_string(&ops).unwrap(), before);
    }
}
