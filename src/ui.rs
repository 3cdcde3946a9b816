use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use income_etl::{format_currency, Category, CleanRecord, MetricSet, PipelineRun};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Records,
    Metrics,
    GenderGap,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Records => Page::Metrics,
            Page::Metrics => Page::GenderGap,
            Page::GenderGap => Page::Records,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Records => Page::GenderGap,
            Page::Metrics => Page::Records,
            Page::GenderGap => Page::Metrics,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Records => "Records",
            Page::Metrics => "Metrics",
            Page::GenderGap => "Gender Gap",
        }
    }
}

pub struct App {
    pub records: Vec<CleanRecord>,
    pub filtered_records: Vec<CleanRecord>,
    pub metrics: Vec<MetricSet>,
    pub state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
    pub category_filter: Option<Category>,
    pub warning_count: usize,
    pub source: String,
}

impl App {
    pub fn new(run: &PipelineRun) -> Self {
        let records = run.cleaned.records.clone();
        let mut state = TableState::default();
        if !records.is_empty() {
            state.select(Some(0));
        }

        Self {
            filtered_records: records.clone(),
            records,
            metrics: run.metrics.clone(),
            state,
            current_page: Page::Records,
            show_detail: false,
            category_filter: None,
            warning_count: run.warnings.len(),
            source: run.source_path.display().to_string(),
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_record(&self) -> Option<&CleanRecord> {
        self.state.selected().and_then(|i| self.filtered_records.get(i))
    }

    pub fn apply_filter(&mut self, category: Option<Category>) {
        self.category_filter = category;
        self.filtered_records = match category {
            None => self.records.clone(),
            Some(c) => self
                .records
                .iter()
                .filter(|r| r.record.category == c)
                .cloned()
                .collect(),
        };

        self.state
            .select(if self.filtered_records.is_empty() { None } else { Some(0) });
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    pub fn next(&mut self) {
        let len = self.filtered_records.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.filtered_records.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) => len - 1,
            Some(i) => i - 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.filtered_records.len();
        if len == 0 {
            return;
        }
        let i = self.state.selected().map(|i| (i + 20).min(len - 1)).unwrap_or(0);
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let i = self.state.selected().map(|i| i.saturating_sub(20)).unwrap_or(0);
        self.state.select(Some(i));
    }

    pub fn outlier_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_outlier).count()
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

    res?;
    Ok(())
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
                KeyCode::Tab => app.next_page(),
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('0') => app.apply_filter(None),
                KeyCode::Char('1') => app.apply_filter(Some(Category::All)),
                KeyCode::Char('2') => app.apply_filter(Some(Category::Male)),
                KeyCode::Char('3') => app.apply_filter(Some(Category::Female)),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(())
                }
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.state.select(Some(0)),
                KeyCode::End => {
                    if !app.filtered_records.is_empty() {
                        app.state.select(Some(app.filtered_records.len() - 1));
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
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail && app.current_page == Page::Records {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(chunks[1]);

        render_records(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        match app.current_page {
            Page::Records => render_records(f, chunks[1], app),
            Page::Metrics => render_metrics(f, chunks[1], app),
            Page::GenderGap => render_gaps(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn header_style() -> Style {
    Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD)
}

fn category_color(category: Category) -> Color {
    match category {
        Category::All => Color::White,
        Category::Male => Color::Cyan,
        Category::Female => Color::Magenta,
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [Page::Records, Page::Metrics, Page::GenderGap];

    let mut tab_spans = vec![];
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Records: {}", app.records.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("⚠ {}", app.warning_count),
        Style::default().fg(Color::Yellow),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("◆ {} outliers", app.outlier_count()),
        Style::default().fg(Color::Red),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(format!(" {} ", app.source)),
    );

    f.render_widget(header, area);
}

fn render_records(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Year", "Region", "Category", "Income", "z", "Outlier"]
        .iter()
        .map(|h| Cell::from(*h).style(header_style()));

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.filtered_records.iter().map(|clean| {
        let r = &clean.record;
        let value_style = if clean.is_outlier {
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(category_color(r.category))
        };

        Row::new(vec![
            Cell::from(r.year.to_string()),
            Cell::from(truncate(&r.region_name, 28)),
            Cell::from(r.category_label.clone()).style(Style::default().fg(category_color(r.category))),
            Cell::from(r.formatted_income()).style(value_style),
            Cell::from(format!("{:+.2}", clean.z_score)),
            Cell::from(if clean.is_outlier { "◆" } else { "" }).style(value_style),
        ])
        .height(1)
    });

    let title = match app.category_filter {
        Some(c) => format!(" Records ({}) ", c.label()),
        None => " Records ".to_string(),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(30),
            Constraint::Length(13),
            Constraint::Length(18),
            Constraint::Length(8),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn opt_percent(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}%", v)).unwrap_or_else(|| "n/a".to_string())
}

fn render_metrics(f: &mut Frame, area: Rect, app: &App) {
    let header_cells = [
        "Region", "Category", "Years", "Growth", "Annual", "Trend", "Volatility", "Mean", "Min", "Max",
    ]
    .iter()
    .map(|h| Cell::from(*h).style(header_style()));
    let header = Row::new(header_cells).style(Style::default().bg(Color::DarkGray));

    let rows = app.metrics.iter().flat_map(|set| {
        set.categories.values().map(move |m| {
            let trend_color = match m.growth_rate_percent {
                Some(g) if g > 0.0 => Color::Green,
                Some(g) if g < 0.0 => Color::Red,
                _ => Color::Gray,
            };
            Row::new(vec![
                Cell::from(set.region_code.clone()),
                Cell::from(m.category.label()).style(Style::default().fg(category_color(m.category))),
                Cell::from(format!("{}-{}", m.start_year, m.end_year)),
                Cell::from(opt_percent(m.growth_rate_percent)).style(Style::default().fg(trend_color)),
                Cell::from(opt_percent(m.average_annual_growth)),
                Cell::from(m.trend_direction.map(|t| t.name()).unwrap_or("n/a")),
                Cell::from(m.volatility.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "n/a".to_string())),
                Cell::from(format_currency(m.stats.mean)),
                Cell::from(format_currency(m.stats.min)),
                Cell::from(format_currency(m.stats.max)),
            ])
        })
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(9),
            Constraint::Length(11),
            Constraint::Length(10),
            Constraint::Length(15),
            Constraint::Length(15),
            Constraint::Length(15),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(" Metrics per Category "));

    f.render_widget(table, area);
}

fn render_gaps(f: &mut Frame, area: Rect, app: &App) {
    let header_cells = ["Region", "Year", "Hombres", "Mujeres", "Ambos sexos", "Gap", "Gap %"]
        .iter()
        .map(|h| Cell::from(*h).style(header_style()));
    let header = Row::new(header_cells).style(Style::default().bg(Color::DarkGray));

    let rows = app.metrics.iter().flat_map(|set| {
        set.gender_gaps.iter().map(move |g| {
            Row::new(vec![
                Cell::from(set.region_code.clone()),
                Cell::from(g.year.to_string()),
                Cell::from(format_currency(g.male)).style(Style::default().fg(Color::Cyan)),
                Cell::from(format_currency(g.female)).style(Style::default().fg(Color::Magenta)),
                Cell::from(g.total.map(format_currency).unwrap_or_default()),
                Cell::from(format_currency(g.gap_absolute)),
                Cell::from(opt_percent(g.gap_percent)).style(Style::default().fg(Color::Yellow)),
            ])
        })
    });

    let skipped: Vec<String> = app
        .metrics
        .iter()
        .filter(|s| !s.skipped_gap_years.is_empty())
        .map(|s| format!("{}: {:?}", s.region_code, s.skipped_gap_years))
        .collect();
    let title = if skipped.is_empty() {
        " Gender Gap ".to_string()
    } else {
        format!(" Gender Gap (skipped {}) ", skipped.join(", "))
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Length(16),
            Constraint::Length(16),
            Constraint::Length(16),
            Constraint::Length(16),
            Constraint::Length(9),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title));

    f.render_widget(table, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
    let total = app.filtered_records.len();

    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let status_spans = vec![
        Span::styled(format!(" Row: {}/{} ", selected, total), Style::default().fg(Color::Cyan)),
        Span::raw(" | "),
        key("0-3"),
        Span::raw(" Filter | "),
        key("Enter"),
        Span::raw(" Details | "),
        key("Tab"),
        Span::raw(" Page | "),
        key("↑/↓"),
        Span::raw(" Nav | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let Some(clean) = app.selected_record() else {
        let empty = Paragraph::new("No record selected")
            .block(Block::default().borders(Borders::ALL).title(" Detail "));
        f.render_widget(empty, area);
        return;
    };
    let r = &clean.record;

    let field = |name: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("{:<12}", name), Style::default().fg(Color::DarkGray)),
            Span::raw(value),
        ])
    };

    let mut lines = vec![
        field("Indicator", r.indicator.clone()),
        field("Year", r.year.to_string()),
        field("Region", format!("{} ({})", r.region_name, r.region_code)),
        field("Category", format!("{} [{}]", r.category_label, r.category.code())),
        field("Income", r.formatted_income()),
        field("z-score", format!("{:+.3}", clean.z_score)),
        field("Source line", r.line.to_string()),
    ];
    if clean.is_outlier {
        lines.push(Line::from(Span::styled(
            "◆ Flagged as outlier",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )));
    }

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Detail "),
    );
    f.render_widget(panel, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
