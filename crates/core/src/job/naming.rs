//! Artifact naming.
//!
//! Every name the pipeline writes into the engine filesystem is derived here.

/// Concat manifest written for the merge stage.
pub const MANIFEST_NAME: &str = "concat_list.txt";

/// Merged output of a batch job without segmentation.
pub const MERGED_OUTPUT_NAME: &str = "output.mp3";

/// printf-style pattern handed to the engine's segment muxer.
pub const SEGMENT_PATTERN: &str = "output_%03d.mp3";

const INTERMEDIATE_PREFIX: &str = "temp_";
const SEGMENT_PREFIX: &str = "output_";
const AUDIO_EXTENSION: &str = ".mp3";
const SEGMENT_INDEX_WIDTH: usize = 3;

/// Name of the per-file transcode output in batch mode.
pub fn intermediate_name(input_name: &str) -> String {
    format!("{}{}{}", INTERMEDIATE_PREFIX, input_name, AUDIO_EXTENSION)
}

/// Drops the last extension, if a non-empty stem precedes it.
pub fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Name of the final artifact in single-file mode.
pub fn final_name_single(input_name: &str) -> String {
    format!("{}{}", strip_extension(input_name), AUDIO_EXTENSION)
}

/// Name of the segment with the given index.
pub fn segment_name(index: usize) -> String {
    format!(
        "{}{:0width$}{}",
        SEGMENT_PREFIX,
        index,
        AUDIO_EXTENSION,
        width = SEGMENT_INDEX_WIDTH
    )
}

/// Parses the index out of a segment name, or `None` if it is not one.
pub fn parse_segment_index(name: &str) -> Option<usize> {
    let digits = name
        .strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(AUDIO_EXTENSION)?;
    if digits.len() < SEGMENT_INDEX_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
