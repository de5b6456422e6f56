use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern, PatternError};

/// `*.csv` files directly inside `dir` (any extension case), sorted by path.
pub fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>, PatternError> {
    let escaped = Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{}/*.csv", escaped.trim_end_matches('/'));
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    let mut files: Vec<PathBuf> = glob::glob_with(&pattern, options)?
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}
