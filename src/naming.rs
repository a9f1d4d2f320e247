/// Short identifier a cloned course receives in a category tagged `destination_tag`.
///
/// Everything before the first `_` of the source identifier is kept as the
/// base; an identifier without `_` is used whole.
pub fn derive_short_identifier(source_short_identifier: &str, destination_tag: &str) -> String {
    let base = source_short_identifier
        .split_once('_')
        .map_or(source_short_identifier, |(base, _)| base);
    format!("{base}_{destination_tag}")
}

/// Full name of a cloned course: every occurrence of the source tag is
/// swapped for the destination tag.
pub fn derive_full_name(source_full_name: &str, source_tag: &str, destination_tag: &str) -> String {
    if source_tag.is_empty() {
        return source_full_name.to_string();
    }
    source_full_name.replace(source_tag, destination_tag)
}
