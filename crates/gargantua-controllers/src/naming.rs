//! Deterministic names of generated objects.
//!
//! Re-running a reconcile must address the same objects, so every generated
//! name is derived from its owner and coordinates.

/// Lowercase, `[a-z0-9-]` only, no leading or trailing dashes.
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut dash = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

pub fn vm_set_name(event: &str, environment: &str, template: &str) -> String {
    sanitize(&format!("se-{event}-vms-{environment}-{template}"))
}

pub fn dbc_name(event: &str, environment: &str) -> String {
    sanitize(&format!("se-{event}-dbc-{environment}"))
}

/// VM created by dynamic placement for one claim slot.
pub fn dynamic_vm_name(prefix: &str, claim: &str, slot: &str) -> String {
    sanitize(&format!("{prefix}-{claim}-{slot}"))
}

/// `index`-th VM of a VMSet.
pub fn static_vm_name(prefix: &str, vm_set: &str, index: usize) -> String {
    sanitize(&format!("{prefix}-{vm_set}-{index}"))
}
