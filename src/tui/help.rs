use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(key: &'static str, pad: usize, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad)),
        Span::raw(desc),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit (q outside the Query tab)"),
        ]),
        key_line("tab", 9, "Next tab (shift-tab: previous)"),
        key_line("?", 11, "Show this help"),
        Line::from(""),
        Line::from("Query tab:"),
        key_line("enter", 7, "Send the question"),
        key_line("Ctrl-D", 6, "Cycle domain"),
        key_line("Ctrl-E", 6, "Export result rows as CSV"),
        key_line("Ctrl-Y", 6, "Copy exported path to clipboard"),
        Line::from(""),
        Line::from("Sentinel tab:"),
        key_line("s", 11, "Start a scan (cancels the running one)"),
        key_line("x", 11, "Close the running scan"),
        key_line("d", 11, "Cycle domain"),
        key_line("e", 11, "Export findings as CSV"),
        key_line("y", 11, "Copy exported path to clipboard"),
        Line::from(""),
        Line::from("History tab:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("↑/↓", Style::default().fg(Color::Magenta)),
            Span::raw(" or "),
            Span::styled("j/k", Style::default().fg(Color::Magenta)),
            Span::raw("  Navigate"),
        ]),
        key_line("enter", 7, "Load the selected scan"),
        key_line("e", 11, "Export loaded findings as CSV"),
        key_line("r", 11, "Refresh history"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
