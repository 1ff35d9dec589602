use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use nexus_equity::{
    format_currency, format_percentage, format_shares, format_signed_percentage_points,
    requires_special_warning, DilutionImpact, DilutionSeverity, StakeholderDilution,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::collections::HashSet;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dilution,
    Summary,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Dilution => Page::Summary,
            Page::Summary => Page::Dilution,
        }
    }

    pub fn previous(&self) -> Self {
        // Two pages: same as next
        self.next()
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Dilution => "Dilution",
            Page::Summary => "Summary",
        }
    }
}

pub struct App {
    pub cap_table: String,
    pub impact: DilutionImpact,
    pub founders: HashSet<String>,
    pub state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
}

impl App {
    pub fn new(cap_table: &str, impact: DilutionImpact, founders: HashSet<String>) -> Self {
        let mut state = TableState::default();
        if !impact.stakeholders.is_empty() {
            state.select(Some(0));
        }

        Self {
            cap_table: cap_table.to_string(),
            impact,
            founders,
            state,
            current_page: Page::Dilution,
            show_detail: false,
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected(&self) -> Option<&StakeholderDilution> {
        self.state
            .selected()
            .and_then(|i| self.impact.stakeholders.get(i))
    }

    pub fn is_founder(&self, row: &StakeholderDilution) -> bool {
        self.founders.contains(&row.stakeholder.id)
    }

    pub fn warning_count(&self) -> usize {
        self.impact
            .stakeholders
            .iter()
            .filter(|s| requires_special_warning(s, self.is_founder(s)))
            .count()
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    pub fn next(&mut self) {
        let len = self.impact.stakeholders.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i < len - 1 => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.impact.stakeholders.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }
}

fn severity_color(severity: DilutionSeverity) -> Color {
    match severity {
        DilutionSeverity::Low => Color::Green,
        DilutionSeverity::Medium => Color::Yellow,
        DilutionSeverity::High => Color::LightRed,
        DilutionSeverity::Severe => Color::Red,
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.map_err(Into::into)
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::Home => app.state.select(Some(0)),
                KeyCode::End => {
                    if !app.impact.stakeholders.is_empty() {
                        app.state.select(Some(app.impact.stakeholders.len() - 1));
                    }
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Dilution if app.show_detail => {
            let content_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(chunks[1]);

            render_table(f, content_chunks[0], app);
            render_detail_panel(f, content_chunks[1], app);
        }
        Page::Dilution => render_table(f, chunks[1], app),
        Page::Summary => render_summary(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![Span::styled(
        format!(" {} ", app.cap_table),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];

    for page in [Page::Dilution, Page::Summary] {
        spans.push(Span::raw(" │ "));
        let style = if page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(page.title().to_string(), style));
    }

    spans.push(Span::raw(format!(
        "   {} → {} shares (+{})",
        format_shares(app.impact.total_shares_before),
        format_shares(app.impact.total_shares_after),
        format_shares(app.impact.new_shares_issued),
    )));

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Nexus Cap Table "),
    );

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Stakeholder", "Shares", "Before", "After", "Δ", "Relative", "Severity"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows: Vec<Row> = app
        .impact
        .stakeholders
        .iter()
        .map(|s| {
            let severity = s.severity();
            let mut name = truncate(&s.stakeholder.name, 24);
            if requires_special_warning(s, app.is_founder(s)) {
                name.push_str(" ⚠");
            }

            Row::new(vec![
                Cell::from(name),
                Cell::from(format_shares(s.new_shares)),
                Cell::from(format_percentage(s.stakeholder.current_ownership, 2)),
                Cell::from(format_percentage(s.new_ownership, 2)),
                Cell::from(format_signed_percentage_points(-s.dilution)),
                Cell::from(format_percentage(s.dilution_percent, 1)),
                Cell::from(severity.as_str())
                    .style(Style::default().fg(severity_color(severity))),
            ])
            .height(1)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(28),
            Constraint::Length(14),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(10),
            Constraint::Length(9),
            Constraint::Length(9),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Post-Issuance Ownership "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn label(text: &str) -> Span<'static> {
    Span::styled(
        format!("  {}: ", text),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )
}

fn render_summary(f: &mut Frame, area: Rect, app: &App) {
    let impact = &app.impact;

    let mut content = vec![
        Line::from(""),
        Line::from(vec![label("Stakeholders"), Span::raw(impact.stakeholders.len().to_string())]),
        Line::from(vec![
            label("Shares before"),
            Span::raw(format_shares(impact.total_shares_before)),
        ]),
        Line::from(vec![
            label("Shares after"),
            Span::raw(format_shares(impact.total_shares_after)),
        ]),
        Line::from(vec![
            label("Issued"),
            Span::raw(format!(
                "{} ({} of post-round)",
                format_shares(impact.new_shares_issued),
                format_percentage(impact.issued_ownership(), 2)
            )),
        ]),
        Line::from(vec![
            label("Warnings"),
            Span::styled(
                app.warning_count().to_string(),
                Style::default().fg(if app.warning_count() > 0 { Color::Red } else { Color::Green }),
            ),
        ]),
    ];

    if let Some(most) = impact.most_diluted() {
        content.push(Line::from(vec![
            label("Most diluted"),
            Span::raw(format!(
                "{} ({})",
                most.stakeholder.name,
                format_signed_percentage_points(-most.dilution)
            )),
        ]));
    }

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Round Summary "),
    );

    f.render_widget(paragraph, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
    let total = app.impact.stakeholders.len();

    let status_spans = vec![
        Span::styled(
            format!(" Row: {}/{} ", selected, total),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" | "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" Details | "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" Page | "),
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(" Nav | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(Line::from(status_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Stakeholder Details ");

    let s = match app.selected() {
        Some(s) => s,
        None => {
            f.render_widget(Paragraph::new("No stakeholder selected").block(block), area);
            return;
        }
    };

    let severity = s.severity();
    let is_founder = app.is_founder(s);

    let mut content = vec![
        Line::from(""),
        Line::from(vec![label("Name"), Span::raw(s.stakeholder.name.clone())]),
        Line::from(vec![label("ID"), Span::raw(s.stakeholder.id.clone())]),
        Line::from(vec![
            label("Role"),
            Span::raw(if is_founder { "Founder" } else { "Stakeholder" }),
        ]),
        Line::from(""),
        Line::from(vec![label("Shares"), Span::raw(format_shares(s.new_shares))]),
        Line::from(vec![
            label("Ownership"),
            Span::raw(format!(
                "{} → {}",
                format_percentage(s.stakeholder.current_ownership, 4),
                format_percentage(s.new_ownership, 4)
            )),
        ]),
        Line::from(vec![
            label("Relative dilution"),
            Span::raw(format_percentage(s.dilution_percent, 2)),
        ]),
        Line::from(""),
        Line::from(vec![
            label("Severity"),
            Span::styled(
                severity.as_str(),
                Style::default()
                    .fg(severity_color(severity))
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled(
                severity.description(),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            ),
        ]),
    ];

    if let Some(value) = s.value {
        content.push(Line::from(""));
        content.push(Line::from(vec![
            label("Value before"),
            Span::raw(format_currency(value.current_value)),
        ]));
        content.push(Line::from(vec![
            label("Value after"),
            Span::raw(format_currency(value.new_value)),
        ]));
        content.push(Line::from(vec![
            label("Change"),
            Span::styled(
                format_currency(value.actual_change),
                Style::default().fg(if value.actual_change < 0.0 {
                    Color::Red
                } else {
                    Color::Green
                }),
            ),
        ]));
    }

    if requires_special_warning(s, is_founder) {
        content.push(Line::from(""));
        content.push(Line::from(Span::styled(
            "  ⚠ Dilution exceeds the warning threshold",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )));
    }

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_equity::{calculate_dilution, Stakeholder};

    fn app() -> App {
        let table = vec![
            Stakeholder::new("f", "Founder", 800, 80.0),
            Stakeholder::new("e", "Employee Pool", 200, 20.0),
        ];
        let impact = calculate_dilution(&table, 300, None, None);
        App::new("series-a", impact, HashSet::from(["f".to_string()]))
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = app();
        assert_eq!(app.state.selected(), Some(0));

        app.next();
        assert_eq!(app.state.selected(), Some(1));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
        app.previous();
        assert_eq!(app.state.selected(), Some(1));
    }

    #[test]
    fn test_founder_warning_count() {
        // 1000 → 1300: ~23% relative dilution for everyone
        let app = app();
        assert!(app.is_founder(&app.impact.stakeholders[0]));
        assert_eq!(app.warning_count(), 2);
    }

    #[test]
    fn test_pages_cycle() {
        let mut app = app();
        app.next_page();
        assert_eq!(app.current_page, Page::Summary);
        app.previous_page();
        assert_eq!(app.current_page, Page::Dilution);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long stakeholder name", 10), "a very ...");
    }
}
