/// Bytes in one gibibyte (2^30).
pub const GIBIBYTE: u64 = 1 << 30;

/// Size in gibibytes as a float, used for formula inputs.
pub fn gibibytes(bytes: u64) -> f64 {
    bytes as f64 / GIBIBYTE as f64
}

/// Format bytes as a human readable binary size, e.g. `1.5GiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];

    let mut value = bytes as f64;
    for unit in UNITS {
        if value.abs() < 512.0 {
            return format!("{value:.1}{unit}B");
        }
        value /= 1024.0;
    }
    format!("{value:.1}YiB")
}
