//! Kubernetes resource quantity utilities
//!
//! Converts K8s resource quantities (CPU, memory) to and from the units the
//! scaling policy is expressed in: millicores and MiB.

const MIB: f64 = 1024.0 * 1024.0;

/// Split "1500m" into ("1500", "m"), "2Gi" into ("2", "Gi").
fn split_quantity(value: &str) -> (&str, &str) {
    let idx = value
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(value.len());
    value.split_at(idx)
}

/// Parse K8s CPU string to millicores.
///
/// Supports formats: "100m", "1", "1500m", "2.5", "250000u", "1000000000n".
/// Returns `None` for anything that is not a valid non-negative quantity.
///
/// # Examples
/// ```
/// use mpa_common::k8s::parse_cpu_millicores;
/// assert_eq!(parse_cpu_millicores("1"), Some(1000));
/// assert_eq!(parse_cpu_millicores("500m"), Some(500));
/// assert_eq!(parse_cpu_millicores("2.5"), Some(2500));
/// ```
pub fn parse_cpu_millicores(value: &str) -> Option<i64> {
    let (number, suffix) = split_quantity(value.trim());
    let number: f64 = number.parse().ok()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }

    let millicores = match suffix {
        "" => number * 1000.0,
        "m" => number,
        "u" => number / 1_000.0,
        "n" => number / 1_000_000.0,
        _ => return None,
    };
    Some(millicores.ceil() as i64)
}

/// Parse K8s memory string to MiB, rounding partial MiB up.
///
/// Supports binary ("Ki", "Mi", "Gi", "Ti"), decimal ("k", "M", "G", "T")
/// and raw byte quantities.
///
/// # Examples
/// ```
/// use mpa_common::k8s::parse_memory_mib;
/// assert_eq!(parse_memory_mib("1Gi"), Some(1024));
/// assert_eq!(parse_memory_mib("512Mi"), Some(512));
/// ```
pub fn parse_memory_mib(value: &str) -> Option<i64> {
    let (number, suffix) = split_quantity(value.trim());
    let number: f64 = number.parse().ok()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }

    let multiplier = match suffix {
        "" => 1.0,
        "Ki" => 1024.0,
        "Mi" => MIB,
        "Gi" => MIB * 1024.0,
        "Ti" => MIB * 1024.0 * 1024.0,
        "k" | "K" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        _ => return None,
    };
    Some((number * multiplier / MIB).ceil() as i64)
}

/// Format millicores the way the API server canonicalizes small CPU values.
pub fn format_cpu_millicores(millicores: i64) -> String {
    format!("{}m", millicores)
}

/// Format MiB as a binary memory quantity.
pub fn format_memory_mib(mib: i64) -> String {
    format!("{}Mi", mib)
}
