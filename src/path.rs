//! POSIX path algebra for archive-internal paths
//!
//! Every path inside an archive uses `/` as its only separator, regardless of
//! the host platform, so these helpers operate on plain strings rather than
//! `std::path::Path`. None of them touch the environment or the filesystem.

const SEPARATOR: u8 = b'/';
const DOT: u8 = b'.';

/// Whether `path` starts at the archive root
pub fn is_absolute(path: &str) -> bool {
    path.as_bytes().first() == Some(&SEPARATOR)
}

/// Normalize a path, resolving `.` and `..` segments
///
/// `..` above an absolute root is dropped; above a relative root it is kept.
/// Repeated separators collapse and a trailing separator is preserved.
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let absolute = is_absolute(path);
    let trailing_separator = path.as_bytes().last() == Some(&SEPARATOR);

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if !absolute => segments.push(".."),
                _ => {}
            },
            _ => segments.push(segment),
        }
    }

    let body = segments.join("/");
    if body.is_empty() {
        return match (absolute, trailing_separator) {
            (true, _) => "/".to_string(),
            (false, true) => "./".to_string(),
            (false, false) => ".".to_string(),
        };
    }

    let mut normalized = String::with_capacity(body.len() + 2);
    if absolute {
        normalized.push('/');
    }
    normalized.push_str(&body);
    if trailing_separator {
        normalized.push('/');
    }
    normalized
}

/// Join non-empty segments with `/` and normalize the result
pub fn join<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut joined: Option<String> = None;
    for segment in segments {
        let segment = segment.as_ref();
        if segment.is_empty() {
            continue;
        }
        match joined.as_mut() {
            Some(joined) => {
                joined.push('/');
                joined.push_str(segment);
            }
            None => joined = Some(segment.to_string()),
        }
    }

    match joined {
        Some(joined) => normalize(&joined),
        None => ".".to_string(),
    }
}

/// Directory portion of a path
pub fn dirname(path: &str) -> &str {
    let bytes = path.as_bytes();
    if bytes.is_empty() {
        return ".";
    }

    let has_root = bytes[0] == SEPARATOR;
    let mut end = None;
    let mut matched_slash = true;
    for i in (1..bytes.len()).rev() {
        if bytes[i] == SEPARATOR {
            if !matched_slash {
                end = Some(i);
                break;
            }
        } else {
            matched_slash = false;
        }
    }

    match end {
        None if has_root => "/",
        None => ".",
        Some(1) if has_root => "//",
        Some(end) => &path[..end],
    }
}

/// Last segment of a path, ignoring trailing separators
pub fn basename(path: &str) -> &str {
    let bytes = path.as_bytes();
    let mut start = 0;
    let mut end = None;

    for i in (0..bytes.len()).rev() {
        if bytes[i] == SEPARATOR {
            // Stop at the first separator that is not part of a trailing run
            if end.is_some() {
                start = i + 1;
                break;
            }
        } else if end.is_none() {
            end = Some(i + 1);
        }
    }

    match end {
        Some(end) => &path[start..end],
        None => "",
    }
}

/// Last segment of a path with `ext` removed when it is a strict suffix
pub fn basename_without<'a>(path: &'a str, ext: &str) -> &'a str {
    if ext.is_empty() || ext.len() > path.len() {
        return basename(path);
    }
    if ext == path {
        return "";
    }

    let bytes = path.as_bytes();
    let ext = ext.as_bytes();
    let mut start = 0;
    let mut end = None;
    let mut first_non_slash_end = None;
    // Index into `ext` of the next byte to match, walking backwards
    let mut ext_idx = Some(ext.len() - 1);

    for i in (0..bytes.len()).rev() {
        let code = bytes[i];
        if code == SEPARATOR {
            if first_non_slash_end.is_some() {
                start = i + 1;
                break;
            }
            continue;
        }

        if first_non_slash_end.is_none() {
            first_non_slash_end = Some(i + 1);
        }
        if let Some(idx) = ext_idx {
            if code == ext[idx] {
                if idx == 0 {
                    end = Some(i);
                    ext_idx = None;
                } else {
                    ext_idx = Some(idx - 1);
                }
            } else {
                ext_idx = None;
                end = first_non_slash_end;
            }
        }
    }

    let end = match end {
        Some(end) if end == start => first_non_slash_end.unwrap_or(path.len()),
        Some(end) => end,
        None => path.len(),
    };
    &path[start..end]
}

/// Extension of the last segment, including the leading dot
///
/// Returns `""` when the segment has no dot, starts with its only dot, or is
/// made only of dots.
pub fn extname(path: &str) -> &str {
    let bytes = path.as_bytes();
    let mut start_dot = None;
    let mut start_part = 0;
    let mut end = None;
    // 0: no dot seen yet, 1: dot run directly before the extension, -1: other
    let mut pre_dot_state = 0i8;

    for i in (0..bytes.len()).rev() {
        let code = bytes[i];
        if code == SEPARATOR {
            if end.is_some() {
                start_part = i + 1;
                break;
            }
            continue;
        }
        if end.is_none() {
            end = Some(i + 1);
        }
        if code == DOT {
            if start_dot.is_none() {
                start_dot = Some(i);
            } else if pre_dot_state != 1 {
                pre_dot_state = 1;
            }
        } else if start_dot.is_some() {
            pre_dot_state = -1;
        }
    }

    match (start_dot, end) {
        (Some(dot), Some(end)) => {
            let only_dots = pre_dot_state == 1 && dot + 1 == end && dot == start_part + 1;
            if pre_dot_state == 0 || only_dots {
                ""
            } else {
                &path[dot..end]
            }
        }
        _ => "",
    }
}
