//! Classification of image source strings.

use crate::PlatformFeatures;

/// Maximum number of characters of a source kept in logs and errors.
pub const KEY_DISPLAY_LIMIT: usize = 256;

fn has_prefix_ignore_case(src: &str, prefix: &str) -> bool {
    src.len() >= prefix.len()
        && src.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// `data:image/...` sources.
pub fn is_inline_image(src: &str) -> bool {
    has_prefix_ignore_case(src, "data:image/")
}

/// `data:image/...;base64,...` sources.
pub fn is_inline_base64_image(src: &str) -> bool {
    if !is_inline_image(src) {
        return false;
    }
    let Some((metadata, _)) = src.split_once(',') else {
        return false;
    };
    metadata
        .rsplit(';')
        .next()
        .is_some_and(|param| param.eq_ignore_ascii_case("base64"))
}

/// Object URLs (`blob:`).
pub fn is_blob_image(src: &str) -> bool {
    src.starts_with("blob")
}

/// SVG by extension or inline SVG media type.
pub fn is_svg(src: &str) -> bool {
    let tail_is_svg = src
        .len()
        .checked_sub(3)
        .and_then(|start| src.get(start..))
        .is_some_and(|tail| tail.eq_ignore_ascii_case("svg"));
    tail_is_svg || has_prefix_ignore_case(src, "data:image/svg+xml")
}

/// Whether the platform can draw this format.
pub fn is_renderable(src: &str, features: &PlatformFeatures) -> bool {
    features.svg_drawing || !is_svg(src)
}

/// Whether a source may be requested at all.
///
/// Inline data and object URLs are always eligible; remote sources only when
/// their format is renderable.
pub fn is_eligible(src: &str, features: &PlatformFeatures) -> bool {
    is_inline_image(src) || is_blob_image(src) || is_renderable(src, features)
}

/// The first [`KEY_DISPLAY_LIMIT`] characters of a source.
pub fn truncate_key(src: &str) -> String {
    src.chars().take(KEY_DISPLAY_LIMIT).collect()
}
