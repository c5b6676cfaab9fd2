use anyhow::Error;
use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Fit text into a fixed-width column: pad with spaces, or truncate with a
/// trailing ellipsis when it does not fit. Works on characters, not bytes,
/// so accented names do not break the column grid.
pub(crate) fn fit_width(text: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= width {
        let mut fitted: String = chars.into_iter().collect();
        while fitted.chars().count() < width {
            fitted.push(' ');
        }
        return fitted;
    }

    let mut fitted: String = chars.into_iter().take(width.saturating_sub(1)).collect();
    fitted.push('…');
    fitted
}

/// Produce a rectangle centered within `area` that spans the requested
/// percent of the width and height. Used for modal dialogs.
pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(area);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(horizontal[1]);

    vertical[1]
}

/// Extract the most relevant error message from a chained error.
pub(crate) fn surface_error(err: &Error) -> String {
    err.chain()
        .last()
        .map(|cause| cause.to_string())
        .unwrap_or_else(|| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_width_pads_and_truncates() {
        assert_eq!(fit_width("ab", 4), "ab  ");
        assert_eq!(fit_width("abcdef", 4), "abc…");
        assert_eq!(fit_width("abcd", 4), "abcd");
        assert_eq!(fit_width("anything", 0), "");
    }

    #[test]
    fn fit_width_counts_characters_not_bytes() {
        assert_eq!(fit_width("héllo", 5), "héllo");
        assert_eq!(fit_width("héllo", 4), "hél…");
    }
}
