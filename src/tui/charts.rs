use nightwatch::export::{cell_text, field_union};
use nightwatch::model::Record;
use nightwatch::viz::{self, RenderSpec};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Bar, BarChart, BarGroup, Block, Borders, Cell, Gauge, Paragraph, Row, Table},
    Frame,
};

/// Gauge colour by risk band.
fn risk_color(pct: f64) -> Color {
    if pct >= 70.0 {
        Color::Red
    } else if pct >= 40.0 {
        Color::Yellow
    } else {
        Color::Green
    }
}

/// Metric tile or horizontal bar chart for a resolved visualization.
pub fn draw_render_spec(f: &mut Frame, area: Rect, spec: Option<&RenderSpec>) {
    let block = Block::default().borders(Borders::ALL).title("Visualization");
    match spec {
        None => {
            let p = Paragraph::new(Line::from(Span::styled(
                "No chart for this result",
                Style::default().fg(Color::DarkGray),
            )))
            .block(block);
            f.render_widget(p, area);
        }
        Some(RenderSpec::Metric { label, value }) => {
            let p = Paragraph::new(vec![
                Line::from(""),
                Line::from(Span::styled(
                    value.clone(),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(label.clone(), Style::default().fg(Color::Gray))),
            ])
            .alignment(Alignment::Center)
            .block(block);
            f.render_widget(p, area);
        }
        Some(RenderSpec::Bars(bars)) => {
            let data: Vec<Bar> = bars
                .iter()
                .map(|b| {
                    Bar::default()
                        .value(u64::from(b.width_pct))
                        .label(Line::from(b.label.clone()))
                        .text_value(viz::format_number(b.value))
                        .style(Style::default().fg(Color::Cyan))
                })
                .collect();
            let chart = BarChart::default()
                .block(block)
                .direction(Direction::Horizontal)
                .data(BarGroup::default().bars(&data))
                .bar_width(1)
                .bar_gap(0)
                .max(100);
            f.render_widget(chart, area);
        }
    }
}

/// Rows as a table whose columns are the union of all row fields.
pub fn draw_records_table(f: &mut Frame, area: Rect, rows: &[Record], title: &str) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("{title} ({})", rows.len()));
    if rows.is_empty() {
        let p = Paragraph::new(Line::from(Span::styled(
            "No rows",
            Style::default().fg(Color::DarkGray),
        )))
        .block(block);
        f.render_widget(p, area);
        return;
    }

    let headers = field_union(rows);
    let header = Row::new(headers.iter().map(|h| Cell::from(h.to_string())))
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    let visible = usize::from(area.height.saturating_sub(3));
    let body: Vec<Row> = rows
        .iter()
        .take(visible)
        .map(|row| {
            Row::new(
                headers
                    .iter()
                    .map(|h| Cell::from(row.get(*h).map(cell_text).unwrap_or_default())),
            )
        })
        .collect();
    let widths = vec![Constraint::Fill(1); headers.len()];
    let table = Table::new(body, widths).header(header).block(block);
    f.render_widget(table, area);
}

/// Risk score gauge; `None` renders an empty gauge.
pub fn draw_risk_gauge(f: &mut Frame, area: Rect, score: Option<f64>) {
    let pct = score.map(viz::risk_gauge_percent).unwrap_or(0.0);
    let label = match score {
        Some(s) => format!("Risk {}", viz::format_number(s)),
        None => "Risk -".to_string(),
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Risk score"))
        .gauge_style(Style::default().fg(risk_color(pct)))
        .ratio(pct / 100.0)
        .label(label);
    f.render_widget(gauge, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_bands() {
        assert_eq!(risk_color(10.0), Color::Green);
        assert_eq!(risk_color(55.0), Color::Yellow);
        assert_eq!(risk_color(100.0), Color::Red);
    }
}
