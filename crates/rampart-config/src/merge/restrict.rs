use tracing::warn;

use super::path::{get_nested, set_nested};

/// Enforce that the workspace layer can only tighten safety. Call after
/// merging the workspace layer and before deserializing.
///
/// `baseline` is the merged config before the workspace layer was applied,
/// so enforcement works even when no user config exists.
pub fn enforce_restrictions(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace_layer: &toml::Value,
) {
    // Auto-approval: a workspace may disable it, never enable it.
    bool_only_false(
        merged,
        baseline,
        workspace_layer,
        &["approval", "auto_approve_safe"],
    );

    // Dangerous patterns: workspace can only add.
    union_string_arrays(
        merged,
        baseline,
        workspace_layer,
        &["risk", "extra_dangerous"],
    );

    // Safe patterns: workspace cannot add any.
    block_expansion(merged, baseline, workspace_layer, &["risk", "extra_safe"]);

    // Undo capacity: can only decrease.
    clamp_max_int(merged, baseline, workspace_layer, &["undo", "max_points"]);
}

fn bool_only_false(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
) {
    let base = get_nested(baseline, path).and_then(toml::Value::as_bool);
    if let Some(true) = get_nested(workspace, path).and_then(toml::Value::as_bool)
        && base != Some(true)
    {
        warn!(
            field = %path.join("."),
            "workspace config tried to enable a setting it may only disable; forcing false"
        );
        set_nested(merged, path, toml::Value::Boolean(false));
    }
}

fn clamp_max_int(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
) {
    let base = get_nested(baseline, path).and_then(toml::Value::as_integer);
    let ws = get_nested(workspace, path).and_then(toml::Value::as_integer);
    if let (Some(base_v), Some(ws_v)) = (base, ws)
        && ws_v > base_v
    {
        warn!(
            field = %path.join("."),
            from = base_v,
            to = ws_v,
            "workspace config tried to increase a limit; clamping"
        );
        set_nested(merged, path, toml::Value::Integer(base_v));
    }
}

fn union_string_arrays(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
) {
    if get_nested(workspace, path).is_none() {
        return;
    }
    let baseline_items = get_nested(baseline, path)
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default();
    let mut result = get_nested(merged, path)
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default();
    for item in baseline_items {
        if !result.contains(&item) {
            warn!(
                field = %path.join("."),
                "workspace config removed an entry; restoring it"
            );
            result.push(item);
        }
    }
    set_nested(merged, path, toml::Value::Array(result));
}

fn block_expansion(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
) {
    let Some(ws_items) = get_nested(workspace, path).and_then(|v| v.as_array().cloned()) else {
        return;
    };
    let baseline_items = get_nested(baseline, path)
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default();
    if ws_items.iter().any(|item| !baseline_items.contains(item)) {
        warn!(
            field = %path.join("."),
            "workspace config tried to add entries; reverting to baseline"
        );
        set_nested(merged, path, toml::Value::Array(baseline_items));
    }
}
