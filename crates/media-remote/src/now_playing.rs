//! Text shown for the current track.

pub const TITLE_MAX_CHARS: usize = 50;

/// Cut titles longer than [`TITLE_MAX_CHARS`] and mark the cut with `...`.
pub fn trim_title(title: &str) -> String {
    match title.char_indices().nth(TITLE_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &title[..cut]),
        None => title.to_string(),
    }
}

/// `"A, B - "` for a non-empty artist list, empty otherwise.
pub fn artist_prefix(artists: &[String]) -> String {
    let joined = artists.join(", ");
    if joined.is_empty() {
        joined
    } else {
        format!("{joined} - ")
    }
}

pub fn track_line(artists: &[String], title: &str) -> String {
    format!("{}{}", artist_prefix(artists), trim_title(title))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_titles_are_cut_at_fifty_chars() {
        let title = "x".repeat(60);
        let trimmed = trim_title(&title);
        assert_eq!(trimmed.len(), 53);
        assert!(trimmed.ends_with("..."));
        assert_eq!(trim_title(&"y".repeat(50)), "y".repeat(50));
    }

    #[test]
    fn multibyte_titles_cut_on_char_boundary() {
        let title = "ä".repeat(51);
        assert_eq!(trim_title(&title), format!("{}...", "ä".repeat(50)));
    }

    #[test]
    fn artists_prefix_the_title() {
        let artists = vec!["Daft Punk".to_string(), "Pharrell".to_string()];
        assert_eq!(track_line(&artists, "Get Lucky"), "Daft Punk, Pharrell - Get Lucky");
        assert_eq!(track_line(&[], "Get Lucky"), "Get Lucky");
    }
}
