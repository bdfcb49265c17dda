use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use rtab::cell::Cell as _;
use rtab::import::write_csv_file;
use rtab::period::PeriodSpec;
use rtab::validation::{validate_table, Alert, Severity};
use rtab::{RecordTable, RowId, Update};
use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Normal,
    /// Typing a new cell value
    EditCell { buffer: String },
    /// Typing "<timerange> <timestamp>" for the selected column
    EditHeader { buffer: String },
    /// Choosing a record type; typing narrows the list
    PickRtype { filter: String, selected: usize },
}

pub struct App {
    pub table: RecordTable,
    pub path: Option<PathBuf>,
    pub state: TableState,
    pub column: usize,
    pub mode: Mode,
    pub alerts: Vec<Alert>,
    pub show_alerts: bool,
    pub message: Option<String>,
}

impl App {
    pub fn new(table: RecordTable, path: Option<PathBuf>) -> Self {
        let mut state = TableState::default();
        if !table.is_empty() {
            state.select(Some(0));
        }

        Self {
            table,
            path,
            state,
            column: 0,
            mode: Mode::Normal,
            alerts: Vec::new(),
            show_alerts: false,
            message: None,
        }
    }

    pub fn selected_row(&self) -> Option<RowId> {
        self.state
            .selected()
            .and_then(|i| self.table.rows().get(i))
            .map(|row| row.id)
    }

    // ========================================================================
    // NAVIGATION
    // ========================================================================

    pub fn next(&mut self) {
        let len = self.table.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.table.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn right(&mut self) {
        if self.column + 1 < self.table.column_count() {
            self.column += 1;
        }
    }

    pub fn left(&mut self) {
        self.column = self.column.saturating_sub(1);
    }

    fn clamp_selection(&mut self) {
        let rows = self.table.row_count();
        match self.state.selected() {
            _ if rows == 0 => self.state.select(None),
            Some(i) if i >= rows => self.state.select(Some(rows - 1)),
            None => self.state.select(Some(0)),
            _ => {}
        }
        let columns = self.table.column_count();
        if self.column >= columns {
            self.column = columns.saturating_sub(1);
        }
    }

    // ========================================================================
    // ACTIONS
    // ========================================================================

    fn report(&mut self, result: rtab::error::Result<Vec<Update>>) {
        self.message = Some(match result {
            Ok(updates) if updates.is_empty() => "✓ Updated".to_string(),
            Ok(updates) => format!("✓ Updated, {} derived cells recomputed", updates.len()),
            Err(err) => format!("❌ {}", err),
        });
    }

    pub fn add_row(&mut self) {
        self.table.add_row(None);
        self.state.select(Some(self.table.row_count() - 1));
    }

    pub fn remove_row(&mut self) {
        if let Some(id) = self.selected_row() {
            if let Err(err) = self.table.remove_row(id) {
                self.message = Some(format!("❌ {}", err));
            }
            self.clamp_selection();
        }
    }

    pub fn add_column(&mut self) {
        let added = self.table.add_column(None);
        self.column = added.index;
        self.clamp_selection();
    }

    pub fn remove_column(&mut self) {
        if self.table.column_count() == 0 {
            return;
        }
        if let Err(err) = self.table.remove_column(self.column) {
            self.message = Some(format!("❌ {}", err));
        }
        self.clamp_selection();
    }

    pub fn cycle_unit(&mut self) {
        let Some(id) = self.selected_row() else { return };
        let current = self.table.row(id).map(|row| row.unit).unwrap_or(1);
        let next = self.table.schema().units.next_after(current).map(|unit| unit.id);
        if let Some(next) = next {
            let result = self.table.change_unit(id, next);
            self.report(result);
        }
    }

    pub fn toggle_calculable(&mut self) {
        let Some(id) = self.selected_row() else { return };
        let calculable = self.table.row(id).map(|row| row.calculable).unwrap_or(false);
        let result = if calculable {
            self.table.set_calculable(id, false).map(|_| Vec::new())
        } else {
            self.table.mark_calculable(id)
        };
        self.report(result);
    }

    pub fn validate(&mut self) {
        let validation = validate_table(&self.table, None);
        self.message = Some(if validation.result {
            "✅ Validation passed".to_string()
        } else {
            "❌ Validation failed".to_string()
        });
        self.alerts = validation.alerts;
        self.show_alerts = true;
    }

    pub fn recalculate(&mut self) {
        let result = self.table.recalculate_all();
        self.report(result);
    }

    pub fn save(&mut self) {
        self.message = Some(match &self.path {
            Some(path) => match write_csv_file(&self.table, path) {
                Ok(()) => format!("💾 Saved {}", path.display()),
                Err(err) => format!("❌ {:#}", err),
            },
            None => "❌ No file to save to".to_string(),
        });
    }

    /// Record-type names matching the picker filter.
    pub fn rtype_choices(&self, filter: &str) -> Vec<String> {
        let filter = filter.to_uppercase();
        self.table
            .schema()
            .record_types
            .iter()
            .filter(|rtype| rtype.name.to_uppercase().contains(&filter))
            .map(|rtype| rtype.name.clone())
            .collect()
    }

    fn commit(&mut self, mode: Mode) {
        match mode {
            Mode::EditCell { buffer } => {
                if let Some(id) = self.selected_row() {
                    let result = self.table.edit_cell(id, self.column, buffer.trim());
                    self.report(result);
                }
            }
            Mode::EditHeader { buffer } => {
                let mut parts = buffer.split_whitespace();
                let spec = match (parts.next(), parts.next()) {
                    (Some(timerange), Some(timestamp)) => PeriodSpec::new(timerange, timestamp),
                    _ => {
                        self.message = Some("❌ Expected: <months> <YYYY-MM>".to_string());
                        return;
                    }
                };
                if let Err(err) = self.table.set_period(self.column, &spec) {
                    self.message = Some(format!("❌ {}", err));
                }
            }
            Mode::PickRtype { filter, selected } => {
                let choices = self.rtype_choices(&filter);
                if let (Some(id), Some(name)) = (self.selected_row(), choices.get(selected)) {
                    let result = self.table.set_record_type(id, Some(name));
                    self.report(result.map(|_| Vec::new()));
                }
            }
            Mode::Normal => {}
        }
    }

    // ========================================================================
    // KEY HANDLING
    // ========================================================================

    /// Returns false when the app should quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        let mode = std::mem::replace(&mut self.mode, Mode::Normal);
        match mode {
            Mode::Normal => return self.handle_normal(key.code),
            Mode::EditCell { mut buffer } => match key.code {
                KeyCode::Enter => self.commit(Mode::EditCell { buffer }),
                KeyCode::Esc => {}
                KeyCode::Backspace => {
                    buffer.pop();
                    self.mode = Mode::EditCell { buffer };
                }
                KeyCode::Char(c) => {
                    buffer.push(c);
                    self.mode = Mode::EditCell { buffer };
                }
                _ => self.mode = Mode::EditCell { buffer },
            },
            Mode::EditHeader { mut buffer } => match key.code {
                KeyCode::Enter => self.commit(Mode::EditHeader { buffer }),
                KeyCode::Esc => {}
                KeyCode::Backspace => {
                    buffer.pop();
                    self.mode = Mode::EditHeader { buffer };
                }
                KeyCode::Char(c) => {
                    buffer.push(c);
                    self.mode = Mode::EditHeader { buffer };
                }
                _ => self.mode = Mode::EditHeader { buffer },
            },
            Mode::PickRtype { mut filter, selected } => {
                let count = self.rtype_choices(&filter).len();
                match key.code {
                    KeyCode::Enter => self.commit(Mode::PickRtype { filter, selected }),
                    KeyCode::Esc => {}
                    KeyCode::Down => {
                        let selected = if count == 0 { 0 } else { (selected + 1) % count };
                        self.mode = Mode::PickRtype { filter, selected };
                    }
                    KeyCode::Up => {
                        let selected = if selected == 0 { count.saturating_sub(1) } else { selected - 1 };
                        self.mode = Mode::PickRtype { filter, selected };
                    }
                    KeyCode::Backspace => {
                        filter.pop();
                        self.mode = Mode::PickRtype { filter, selected: 0 };
                    }
                    KeyCode::Char(c) => {
                        filter.push(c);
                        self.mode = Mode::PickRtype { filter, selected: 0 };
                    }
                    _ => self.mode = Mode::PickRtype { filter, selected },
                }
            }
        }
        true
    }

    fn handle_normal(&mut self, code: KeyCode) -> bool {
        self.message = None;
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Up | KeyCode::Char('k') => self.previous(),
            KeyCode::Right | KeyCode::Char('l') => self.right(),
            KeyCode::Left | KeyCode::Char('h') => self.left(),
            KeyCode::Enter => {
                if self.selected_row().is_some() && self.table.column_count() > 0 {
                    self.mode = Mode::EditCell {
                        buffer: String::new(),
                    };
                }
            }
            KeyCode::Char('p') if self.table.column_count() > 0 => {
                self.mode = Mode::EditHeader {
                    buffer: String::new(),
                };
            }
            KeyCode::Char('t') if self.selected_row().is_some() => {
                self.mode = Mode::PickRtype {
                    filter: String::new(),
                    selected: 0,
                };
            }
            KeyCode::Char('a') => self.add_row(),
            KeyCode::Char('d') => self.remove_row(),
            KeyCode::Char('c') => self.add_column(),
            KeyCode::Char('x') => self.remove_column(),
            KeyCode::Char('u') => self.cycle_unit(),
            KeyCode::Char('f') => self.toggle_calculable(),
            KeyCode::Char('r') => self.recalculate(),
            KeyCode::Char('v') => self.validate(),
            KeyCode::Char('s') => self.save(),
            KeyCode::Tab => self.show_alerts = !self.show_alerts,
            _ => {}
        }
        true
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press && !app.handle_key(key) {
                return Ok(());
            }
        }
    }
}

// ============================================================================
// RENDERING
// ============================================================================

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Grid
            Constraint::Length(3), // Status bar / input line
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let side_panel = app.show_alerts || matches!(app.mode, Mode::PickRtype { .. });
    if side_panel {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(chunks[1]);

        render_table(f, content_chunks[0], app);
        if let Mode::PickRtype { filter, selected } = app.mode.clone() {
            render_rtype_picker(f, content_chunks[1], app, &filter, selected);
        } else {
            render_alerts(f, content_chunks[1], app);
        }
    } else {
        render_table(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let title = app
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "untitled".to_string());

    let spans = vec![
        Span::styled(
            "rtab",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" │ "),
        Span::styled(title, Style::default().fg(Color::White)),
        Span::raw("  |  "),
        Span::styled(
            format!("{} rows × {} periods", app.table.row_count(), app.table.column_count()),
            Style::default().fg(Color::Cyan),
        ),
    ];

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let mut header_cells = vec!["Record type".to_string(), "Unit".to_string(), "Calc".to_string()];
    header_cells.extend(app.table.periods().iter().map(|p| p.label()));

    let header = Row::new(header_cells.into_iter().enumerate().map(|(i, h)| {
        let mut style = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
        if i >= 3 && i - 3 == app.column {
            style = style.add_modifier(Modifier::UNDERLINED);
        }
        Cell::from(h).style(style)
    }))
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let selected = app.state.selected();
    let units = &app.table.schema().units;
    let rows = app.table.rows().iter().enumerate().map(|(i, row)| {
        let rtype_style = match row.rtype() {
            Some(name) if app.table.schema().record_types.contains(name) => Style::default(),
            _ => Style::default().fg(Color::Red),
        };

        let mut cells = vec![
            Cell::from(row.rtype().unwrap_or("-").to_string()).style(rtype_style),
            Cell::from(units.text_of(row.unit).map(str::to_string).unwrap_or_else(|| row.unit.to_string())),
            Cell::from(if row.calculable { "Σ" } else { "" }),
        ];
        cells.extend(row.values.iter().enumerate().map(|(col, value)| {
            let mut style = if !value.is_numeric() {
                Style::default().fg(Color::Red)
            } else if row.calculable {
                Style::default().fg(Color::Green)
            } else {
                Style::default()
            };
            if selected == Some(i) && col == app.column {
                style = style.add_modifier(Modifier::REVERSED);
            }
            Cell::from(value.get().to_string()).style(style)
        }));

        Row::new(cells).height(1)
    });

    let mut widths = vec![Constraint::Length(28), Constraint::Length(8), Constraint::Length(5)];
    widths.extend(app.table.periods().iter().map(|_| Constraint::Length(26)));

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Records "),
        )
        .highlight_style(Style::default().add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_alerts(f: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = if app.alerts.is_empty() {
        vec![ListItem::new("No alerts. Press 'v' to validate.")]
    } else {
        app.alerts
            .iter()
            .map(|alert| {
                let color = match alert.severity {
                    Severity::Error => Color::Red,
                    Severity::Warning => Color::Yellow,
                };
                ListItem::new(alert.message.clone()).style(Style::default().fg(color))
            })
            .collect()
    };

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Validation "),
    );
    f.render_widget(list, area);
}

fn render_rtype_picker(f: &mut Frame, area: Rect, app: &App, filter: &str, selected: usize) {
    let items: Vec<ListItem> = app
        .rtype_choices(filter)
        .into_iter()
        .map(ListItem::new)
        .collect();

    let mut state = ListState::default();
    state.select(Some(selected));

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(format!(" Record type: {}_ ", filter)),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");
    f.render_stateful_widget(list, area, &mut state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));

    let spans = match &app.mode {
        Mode::EditCell { buffer } => vec![Span::raw(" Value: "), Span::raw(buffer.clone()), Span::raw("_")],
        Mode::EditHeader { buffer } => vec![
            Span::raw(" Period (<months> <YYYY-MM>): "),
            Span::raw(buffer.clone()),
            Span::raw("_"),
        ],
        Mode::PickRtype { .. } => vec![
            key(" ↑/↓"),
            Span::raw(" Choose | "),
            key("Enter"),
            Span::raw(" Assign | "),
            key("Esc"),
            Span::raw(" Cancel"),
        ],
        Mode::Normal => match &app.message {
            Some(message) => vec![Span::styled(format!(" {}", message), Style::default().fg(Color::Cyan))],
            None => vec![
                key(" Enter"),
                Span::raw(" Edit | "),
                key("t"),
                Span::raw(" Type | "),
                key("u"),
                Span::raw(" Unit | "),
                key("f"),
                Span::raw(" Calc | "),
                key("a/d"),
                Span::raw(" Row | "),
                key("c/x/p"),
                Span::raw(" Column | "),
                key("v"),
                Span::raw(" Validate | "),
                key("s"),
                Span::raw(" Save | "),
                Span::styled("q", Style::default().fg(Color::Red)),
                Span::raw(" Quit"),
            ],
        },
    };

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

// ============================================================================
// TESTS
// ============================================================================
