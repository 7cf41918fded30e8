//! Key schema for bulletin board records.
//!
//! | Path | Contents |
//! |---|---|
//! | `/v1/domain/<name>` | presence marker with a TTL |
//! | `/v1/desired-lrp/<process_guid>` | `DesiredLrp` JSON |
//! | `/v1/actual-lrp/<process_guid>/<index>` | `ActualLrp` JSON |
//! | `/v1/cell/<cell_id>` | `CellPresence` JSON |
//! | `/v1/locks/<lock_name>` | holder identifier with a TTL |

pub const SCHEMA_ROOT: &str = "/v1";
pub const DOMAIN_SCHEMA_ROOT: &str = "/v1/domain";
pub const DESIRED_LRP_SCHEMA_ROOT: &str = "/v1/desired-lrp";
pub const ACTUAL_LRP_SCHEMA_ROOT: &str = "/v1/actual-lrp";
pub const CELL_SCHEMA_ROOT: &str = "/v1/cell";
pub const LOCK_SCHEMA_ROOT: &str = "/v1/locks";

pub fn domain_schema_path(domain: &str) -> String {
    format!("{DOMAIN_SCHEMA_ROOT}/{domain}")
}

pub fn desired_lrp_schema_path(process_guid: &str) -> String {
    format!("{DESIRED_LRP_SCHEMA_ROOT}/{process_guid}")
}

pub fn actual_lrp_process_dir(process_guid: &str) -> String {
    format!("{ACTUAL_LRP_SCHEMA_ROOT}/{process_guid}")
}

pub fn actual_lrp_schema_path(process_guid: &str, index: i32) -> String {
    format!("{ACTUAL_LRP_SCHEMA_ROOT}/{process_guid}/{index}")
}

pub fn cell_schema_path(cell_id: &str) -> String {
    format!("{CELL_SCHEMA_ROOT}/{cell_id}")
}

pub fn lock_schema_path(lock_name: &str) -> String {
    format!("{LOCK_SCHEMA_ROOT}/{lock_name}")
}

/// The final `/`-separated segment of a key.
pub fn last_segment(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Split a key below `root` into its segments, or `None` if it is not
/// below `root`.
fn segments_below<'a>(root: &str, key: &'a str) -> Option<Vec<&'a str>> {
    let rest = key.strip_prefix(root)?.strip_prefix('/')?;
    Some(rest.split('/').collect())
}

/// The process guid named by a desired LRP key.
pub fn parse_desired_lrp_path(key: &str) -> Option<&str> {
    match segments_below(DESIRED_LRP_SCHEMA_ROOT, key)?.as_slice() {
        [guid] if !guid.is_empty() => Some(*guid),
        _ => None,
    }
}

/// The process guid and index named by an actual LRP key.
pub fn parse_actual_lrp_path(key: &str) -> Option<(&str, i32)> {
    match segments_below(ACTUAL_LRP_SCHEMA_ROOT, key)?.as_slice() {
        [guid, index] if !guid.is_empty() => Some((*guid, index.parse().ok()?)),
        _ => None,
    }
}
