use std::path::Path;

pub fn filename_from_path(path: &str) -> Option<String> {
    let escaped = path.replace('\\', "/");
    escaped.split('/').last().and_then(|last| {
        last.split('?').next().map(|c| c.to_owned())
    }).filter(|name| !name.is_empty())
}

pub fn remove_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(index) => &filename[..index],
        None => filename,
    }
}

/// Lowercased extension with the leading dot, or an empty string.
pub fn extension_with_dot(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

pub fn is_supported_image(path: &Path) -> bool {
    matches!(extension_with_dot(path).as_str(), ".jpg" | ".jpeg" | ".png" | ".webp" | ".bmp" | ".tif" | ".tiff")
}
