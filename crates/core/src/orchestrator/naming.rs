//! Input validation and output naming.

/// Name used when an upload carries no file name.
pub const DEFAULT_UPLOAD_NAME: &str = "video.webm";

const WEBM_SUFFIX: &str = ".webm";
const MP4_SUFFIX: &str = ".mp4";

/// Whether a declared MIME type identifies a WebM container.
///
/// Case-sensitive substring match: `video/webm`, `audio/webm` and
/// `video/webm;codecs=vp9` pass, `video/WEBM` does not.
pub fn is_webm_type(declared: &str) -> bool {
    declared.contains("webm")
}

/// Replaces a trailing `.webm` (any case) with `.mp4`.
///
/// Names without that suffix are returned unchanged.
pub fn output_file_name(input: &str) -> String {
    let Some(stem_len) = input.len().checked_sub(WEBM_SUFFIX.len()) else {
        return input.to_string();
    };
    match input.get(stem_len..) {
        Some(suffix) if suffix.eq_ignore_ascii_case(WEBM_SUFFIX) => {
            format!("{}{}", &input[..stem_len], MP4_SUFFIX)
        }
        _ => input.to_string(),
    }
}
