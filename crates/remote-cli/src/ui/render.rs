use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    text::Line,
    widgets::{Clear, List, ListItem, Paragraph},
};

use super::app::App;
use super::view_model::{Progress, UiModal, UiView};
use super::widgets::{bar, centered_rect, panel, selectable_list};

pub(crate) fn draw(f: &mut ratatui::Frame, app: &mut App) {
    let view = UiView::from_app(app);

    let debug_height = view
        .debug_lines
        .as_ref()
        .map(|lines| lines.len() as u16 + 2)
        .unwrap_or(0);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(4),
            Constraint::Length(6),
            Constraint::Length(debug_height),
            Constraint::Min(0),
        ])
        .split(f.area());

    let header = Paragraph::new(view.header_lines.iter().map(|l| Line::from(l.as_str())).collect::<Vec<_>>())
        .block(panel("Target"));
    f.render_widget(header, chunks[0]);

    let now_playing = Paragraph::new(view.now_playing.iter().map(|l| Line::from(l.as_str())).collect::<Vec<_>>())
        .block(panel("Now Playing"));
    f.render_widget(now_playing, chunks[1]);

    let controls_block = panel("Status");
    let controls_inner = controls_block.inner(chunks[2]);
    f.render_widget(controls_block, chunks[2]);
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(controls_inner);

    f.render_widget(Paragraph::new(Line::from(view.status_line.as_str())), rows[0]);

    let progress_cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(10), Constraint::Length(32)])
        .split(rows[1]);
    let (ratio, label, enabled) = match &view.progress {
        Progress::Bar { ratio, label } => (*ratio, label.as_str(), true),
        Progress::Disabled { label } => (0.0, label.as_str(), false),
    };
    f.render_widget(bar(ratio, enabled), progress_cols[0]);
    f.render_widget(
        Paragraph::new(Line::from(label)).alignment(Alignment::Right),
        progress_cols[1],
    );

    let volume_cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(20), Constraint::Min(10)])
        .split(rows[2]);
    f.render_widget(Paragraph::new(Line::from(view.volume.1.as_str())), volume_cols[0]);
    f.render_widget(bar(view.volume.0, true), volume_cols[1]);

    f.render_widget(Paragraph::new(Line::from(view.keys_line.as_str())), rows[3]);

    if let Some(lines) = view.debug_lines.as_ref() {
        let debug = Paragraph::new(lines.iter().map(|l| Line::from(l.as_str())).collect::<Vec<_>>())
            .block(panel("Debug"));
        f.render_widget(debug, chunks[3]);
    }

    let Some(modal) = view.active_modal else {
        return;
    };
    match modal {
        UiModal::Players { title, items, layout } => {
            let area = centered_rect(layout.width_pct, layout.height_pct, f.area());
            f.render_widget(Clear, area);
            let items: Vec<ListItem> = if items.is_empty() {
                vec![ListItem::new("<no players>")]
            } else {
                items.into_iter().map(ListItem::new).collect()
            };
            let list = selectable_list(&title, items);
            f.render_stateful_widget(list, area, &mut app.ui.sheet_state);
        }
        UiModal::Help { title, body, layout } => {
            let area = centered_rect(layout.width_pct, layout.height_pct, f.area());
            f.render_widget(Clear, area);
            f.render_widget(Paragraph::new(body).block(panel(&title)), area);
        }
        UiModal::Logs { title, lines, layout } => {
            let area = centered_rect(layout.width_pct, layout.height_pct, f.area());
            f.render_widget(Clear, area);
            let block = panel(&title);
            let height = block.inner(area).height as usize;
            let total = lines.len();
            let end = total.saturating_sub(app.ui.logs_scroll);
            let start = end.saturating_sub(height);
            let mut items: Vec<ListItem> = lines[start..end]
                .iter()
                .map(|line| ListItem::new(line.as_str()))
                .collect();
            if items.is_empty() {
                items.push(ListItem::new("<no logs>"));
            }
            f.render_widget(List::new(items).block(block), area);
        }
    }
}
