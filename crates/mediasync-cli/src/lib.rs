use std::path::{Path, PathBuf};

/// Every regular file below `dir`, as `(relative path, absolute path)` pairs
/// sorted by relative path. Relative paths always use `/`.
pub fn collect_files(dir: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                if let Ok(relative) = path.strip_prefix(dir) {
                    let relative = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    files.push((relative, path.clone()));
                }
            }
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}
