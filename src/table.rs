//! Plain-text tables for command output.

use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

/// Renders rows under a header line. Columns whose every non-empty cell is
/// numeric are right-aligned.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| cell_width(h)).collect::<Vec<_>>();
    let mut numeric = vec![true; headers.len()];
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(headers.len()) {
            widths[idx] = widths[idx].max(cell_width(cell));
            let trimmed = cell.trim();
            numeric[idx] &= trimmed.is_empty() || trimmed.parse::<f64>().is_ok();
        }
    }
    let aligns = numeric
        .iter()
        .map(|n| if *n && !rows.is_empty() { Align::Right } else { Align::Left })
        .collect::<Vec<_>>();

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths, &aligns));
    let rule = widths.iter().map(|w| "-".repeat((*w).max(3))).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &widths, &aligns));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, &aligns));
    }
    output
}

pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let headers = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    print!("{}", render_table(&headers, rows));
}

/// Points without a trailing `.0` for whole values.
pub fn format_points(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        let mut text = format!("{value:.2}");
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
        text
    }
}

fn format_row(values: &[String], widths: &[usize], aligns: &[Align]) -> String {
    let line = values
        .iter()
        .zip(widths.iter().zip(aligns))
        .map(|(value, (width, align))| {
            let cell = value.replace(['\n', '\r', '\t'], " ");
            let padding = " ".repeat(width.saturating_sub(cell_width(&cell)));
            match align {
                Align::Left => format!("{cell}{padding}"),
                Align::Right => format!("{padding}{cell}"),
            }
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn cell_width(value: &str) -> usize {
    value.chars().count().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_columns_align_right() {
        let headers = vec!["Activity".to_string(), "Points".to_string()];
        let rows = vec![
            vec!["Quiz".to_string(), "5".to_string()],
            vec!["Blood Donation".to_string(), "20".to_string()],
        ];
        let rendered = render_table(&headers, &rows);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "Activity        Points");
        assert_eq!(lines[2], "Quiz                 5");
        assert_eq!(lines[3], "Blood Donation      20");
    }

    #[test]
    fn points_drop_redundant_decimals() {
        assert_eq!(format_points(20.0), "20");
        assert_eq!(format_points(7.5), "7.5");
        assert_eq!(format_points(10.456), "10.46");
    }
}
