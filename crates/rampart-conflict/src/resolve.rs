//! Applying a chosen resolution to a batch.

use rampart_core::{ContentHash, Operation, OperationId, OperationKind};
use tracing::info;

use crate::conflict::{Conflict, ConflictKind, Resolution};
use crate::detector::requirements_of;
use crate::disk::{DiskState, normalize_resource};
use crate::error::{ConflictError, ConflictResult};
use crate::packages::{is_wildcard, normalize_name, rewrite_command};

/// Apply `resolution` to `batch` and mark `conflict` resolved.
///
/// - `Discard` removes the listed operations.
/// - `Reload` re-plans the listed operations against `disk`: the read
///   checksum becomes the current one, a create over an existing file
///   becomes a modify, a modify of a missing file becomes a create, and a
///   delete of a missing file is dropped.
/// - `Merge` rebases the flagged writers of a concurrent edit onto the write
///   before each, or pins every operation of a dependency clash to the
///   earliest requirement. Other kinds cannot be merged.
///
/// For a concurrent edit `Merge` sequences the writes; it does not combine
/// their content. Only each writer's read checksum changes, so the writes
/// apply in submission order and the last one's content is what ends up on
/// disk. Callers that need both edits must combine the content themselves
/// before submitting.
///
/// The batch is left untouched when an error is returned.
///
/// # Errors
///
/// Returns [`ConflictError::AlreadyResolved`],
/// [`ConflictError::UnknownOperation`] for ids not in the batch,
/// [`ConflictError::UnsupportedResolution`] for an impossible merge, or
/// [`ConflictError::Io`] when the disk cannot be read.
pub fn resolve_conflict(
    batch: &mut Vec<Operation>,
    conflict: &mut Conflict,
    resolution: &Resolution,
    disk: &dyn DiskState,
) -> ConflictResult<()> {
    if conflict.resolved {
        return Err(ConflictError::AlreadyResolved(conflict.id.to_string()));
    }

    match resolution {
        Resolution::Discard { operations } => discard(batch, operations)?,
        Resolution::Reload { operations } => reload(batch, operations, disk)?,
        Resolution::Merge => match conflict.kind {
            ConflictKind::ConcurrentEdit => rebase(batch, &conflict.flagged)?,
            ConflictKind::DependencyVersionClash => unify(batch, conflict)?,
            kind => {
                return Err(ConflictError::UnsupportedResolution {
                    kind,
                    resolution: resolution.name().to_string(),
                });
            },
        },
    }

    conflict.resolved = true;
    info!(
        conflict = %conflict.id,
        kind = %conflict.kind,
        resolution = %resolution,
        remaining = batch.len(),
        "conflict resolved"
    );
    Ok(())
}

fn position(batch: &[Operation], id: OperationId) -> ConflictResult<usize> {
    batch
        .iter()
        .position(|op| op.id == id)
        .ok_or(ConflictError::UnknownOperation(id))
}

fn discard(batch: &mut Vec<Operation>, ids: &[OperationId]) -> ConflictResult<()> {
    for id in ids {
        position(batch, *id)?;
    }
    batch.retain(|op| !ids.contains(&op.id));
    Ok(())
}

fn reload(
    batch: &mut Vec<Operation>,
    ids: &[OperationId],
    disk: &dyn DiskState,
) -> ConflictResult<()> {
    let mut plans = Vec::with_capacity(ids.len());
    for id in ids {
        let index = position(batch, *id)?;
        let path = batch[index].target_path();
        let current = disk.checksum(path).map_err(|source| ConflictError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        plans.push((index, current));
    }

    let mut dropped = Vec::new();
    for (index, current) in plans {
        let op = &mut batch[index];
        match (op.kind, current) {
            (OperationKind::FileCreate, Some(now)) => {
                op.kind = OperationKind::FileModify;
                op.read_checksum = Some(now);
            },
            (OperationKind::FileModify, None) => {
                op.kind = OperationKind::FileCreate;
                op.read_checksum = None;
            },
            (OperationKind::FileDelete, None) => dropped.push(op.id),
            (_, now) => op.read_checksum = now,
        }
    }
    batch.retain(|op| !dropped.contains(&op.id));
    Ok(())
}

/// Rebase each flagged writer onto the write before it on the same file.
fn rebase(batch: &mut Vec<Operation>, flagged: &[OperationId]) -> ConflictResult<()> {
    for id in flagged {
        position(batch, *id)?;
    }

    let mut dropped = Vec::new();
    for id in flagged {
        let index = position(batch, *id)?;
        let resource = normalize_resource(batch[index].target_path());
        let Some(prev) = batch[..index].iter().rposition(|op| {
            op.kind.mutates_file()
                && !dropped.contains(&op.id)
                && normalize_resource(op.target_path()) == resource
        }) else {
            continue;
        };
        let prev_kind = batch[prev].kind;
        let prev_hash = batch[prev]
            .content
            .as_deref()
            .map(|content| ContentHash::hash(content.as_bytes()));

        let op = &mut batch[index];
        match (prev_kind, op.kind) {
            (OperationKind::FileDelete, OperationKind::FileCreate) => {},
            (OperationKind::FileDelete, OperationKind::FileDelete) => dropped.push(op.id),
            (OperationKind::FileDelete, _) => {
                op.kind = OperationKind::FileCreate;
                op.read_checksum = None;
            },
            (_, kind) => {
                if kind == OperationKind::FileCreate {
                    op.kind = OperationKind::FileModify;
                }
                op.read_checksum = prev_hash;
            },
        }
    }
    batch.retain(|op| !dropped.contains(&op.id));
    Ok(())
}

/// Pin every operation of a dependency clash to the earliest requirement.
fn unify(batch: &mut [Operation], conflict: &Conflict) -> ConflictResult<()> {
    for id in &conflict.operations {
        position(batch, *id)?;
    }
    let Some(package) = conflict.resources.first() else {
        return Ok(());
    };

    let earliest = batch
        .iter()
        .filter(|op| conflict.involves(op.id))
        .flat_map(requirements_of)
        .find(|req| normalize_name(&req.name) == *package && !is_wildcard(&req.requirement))
        .map(|req| req.requirement);
    let Some(pinned) = earliest else {
        return Ok(());
    };

    for op in batch.iter_mut().filter(|op| conflict.involves(op.id)) {
        for req in &mut op.packages {
            if normalize_name(&req.name) == *package && !is_wildcard(&req.requirement) {
                req.requirement.clone_from(&pinned);
            }
        }
        if op.kind == OperationKind::CommandExecute {
            op.target = rewrite_command(&op.target, package, &pinned);
        }
    }
    Ok(())
}
