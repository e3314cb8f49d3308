//! Filesystem naming for final outputs and resumable temp files.

use std::path::{Path, PathBuf};

use crate::model::TrackKind;

const DEFAULT_FILENAME: &str = "output";

/// Longest filename stem we will produce; titles past this are truncated
/// with the item id keeping names unique.
const MAX_STEM_LEN: usize = 180;

/// Sanitize a string for use as a filename.
pub fn sanitize_filename(input: &str) -> String {
    let invalid_chars = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    let mut result = String::with_capacity(input.len());

    for c in input.chars() {
        if invalid_chars.contains(&c) || c < ' ' {
            result.push('_');
        } else {
            result.push(c);
        }
    }

    // Remove leading and trailing dots and spaces
    let remove_array = ['.', ' '];
    let result = result
        .trim_start_matches(|c| remove_array.contains(&c))
        .trim_end_matches(|c| remove_array.contains(&c))
        .to_string();

    if result.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        result
    }
}

/// Bound a filename stem to `MAX_STEM_LEN` characters.
pub fn shorten_stem(stem: &str) -> String {
    if stem.chars().count() <= MAX_STEM_LEN {
        return stem.to_string();
    }
    stem.chars().take(MAX_STEM_LEN).collect()
}

/// Final output path for an item: sanitized title + item id + container
/// extension, inside `output_dir`.
pub fn final_path(output_dir: &Path, title: &str, item_id: &str, container: &str) -> PathBuf {
    let stem = shorten_stem(&sanitize_filename(title));
    let id = sanitize_filename(item_id);
    output_dir.join(format!("{stem}_{id}.{container}"))
}

/// Resumable temp path for one track of an item. Deterministic so a
/// future run picks the partial file back up.
pub fn temp_path(output_dir: &Path, item_id: &str, kind: TrackKind) -> PathBuf {
    let id = sanitize_filename(item_id);
    output_dir.join(format!("{id}.{kind}.part"))
}
