/// Returns the file-type tag of `path`: the text after the last `.` of its
/// final segment.
///
/// Paths without a dot, and dotfiles whose only dot is the leading one
/// (`config/.gitignore`), yield an empty tag.
pub fn classify_extension(path: &str) -> &str {
    let file_name = path.rsplit('/').next().unwrap_or(path);

    match file_name.rfind('.') {
        Some(0) | None => "",
        Some(dot) => &file_name[dot + 1..],
    }
}

/// Number of newline-separated segments in `content`.
///
/// A trailing newline opens one more (empty) line, and empty content counts
/// as one line. This is the count the criteria service's line thresholds
/// are defined against.
pub fn count_lines(content: &str) -> usize {
    content.split('\n').count()
}
