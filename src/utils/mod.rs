use std::path::{Path, PathBuf};

/// Build the output path for a received file: timestamped name at second
/// resolution inside the receive directory. Two transfers completing in
/// the same second collide; that boundary condition is accepted rather
/// than resolved here.
pub fn received_file_name(dir: &Path, extension: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("received_file_{stamp}.{extension}"))
}

/// Format file size in human-readable format
pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = size as f64;
    let mut unit_index = 0;
    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }
    format!("{:.2} {}", size, UNITS[unit_index])
}
