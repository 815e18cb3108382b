use anyhow::Result;
use balance_ledger::{accepts_amount_input, format_amount, format_relative, Ledger, LedgerSession};
use chrono::Utc;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

const PAGE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Amount,
    Description,
    List,
}

impl Focus {
    pub fn next(&self) -> Self {
        match self {
            Focus::Amount => Focus::Description,
            Focus::Description => Focus::List,
            Focus::List => Focus::Amount,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Focus::Amount => Focus::List,
            Focus::Description => Focus::Amount,
            Focus::List => Focus::Description,
        }
    }
}

pub struct App<'a> {
    session: &'a LedgerSession,
    pub changes: Ledger,
    pub state: TableState,
    pub focus: Focus,
    pub amount_input: String,
    pub description_input: String,
    pub status: Option<String>,
    /// Set after the first reset key press; the second press clears the ledger
    pub confirm_reset: bool,
}

impl<'a> App<'a> {
    pub fn new(session: &'a LedgerSession) -> Self {
        let mut app = Self {
            session,
            changes: Vec::new(),
            state: TableState::default(),
            focus: Focus::Amount,
            amount_input: String::new(),
            description_input: String::new(),
            status: None,
            confirm_reset: false,
        };
        app.refresh();
        app
    }

    pub fn balance(&self) -> f64 {
        balance_ledger::balance(&self.changes)
    }

    fn refresh(&mut self) {
        self.changes = self.session.changes().unwrap_or_default();

        let len = self.changes.len();
        let selected = match self.state.selected() {
            _ if len == 0 => None,
            Some(i) if i >= len => Some(len - 1),
            Some(i) => Some(i),
            None => Some(0),
        };
        self.state.select(selected);
    }

    pub fn submit(&mut self) {
        match self
            .session
            .push_input(&self.amount_input, &self.description_input)
        {
            Ok(ledger) => {
                self.status = Some(format!(
                    "Added #{} {}",
                    ledger[0].id,
                    format_amount(ledger[0].amount)
                ));
                self.amount_input.clear();
                self.description_input.clear();
                self.focus = Focus::Amount;
                self.state.select(Some(0));
            }
            Err(err) => self.status = Some(err.to_string()),
        }
        self.refresh();
    }

    pub fn delete_selected(&mut self) {
        let Some(change) = self.state.selected().and_then(|i| self.changes.get(i)) else {
            return;
        };
        let id = change.id;
        self.session.delete(id);
        self.status = Some(format!("Deleted #{}", id));
        self.refresh();
    }

    pub fn request_reset(&mut self) {
        if self.confirm_reset {
            self.session.reset();
            self.confirm_reset = false;
            self.status = Some("Ledger cleared".to_string());
            self.refresh();
        } else {
            self.confirm_reset = true;
            self.status = Some("Press reset again to delete every change".to_string());
        }
    }

    pub fn next(&mut self) {
        let len = self.changes.len();
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
        let len = self.changes.len();
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
        let len = self.changes.len();
        if len == 0 {
            return;
        }
        let i = self.state.selected().map(|i| (i + PAGE).min(len - 1)).unwrap_or(0);
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let i = self.state.selected().map(|i| i.saturating_sub(PAGE)).unwrap_or(0);
        self.state.select(Some(i));
    }

    /// Apply one key press. Returns `true` when the app should exit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        if key.code != KeyCode::Char('r') || !(ctrl || self.focus == Focus::List) {
            self.confirm_reset = false;
        }

        match key.code {
            KeyCode::Esc => return true,
            KeyCode::Char('c') if ctrl => return true,
            KeyCode::Char('r') if ctrl => self.request_reset(),
            KeyCode::Tab => self.focus = self.focus.next(),
            KeyCode::BackTab => self.focus = self.focus.previous(),
            _ => match self.focus {
                Focus::Amount => self.handle_amount_key(key),
                Focus::Description => self.handle_description_key(key),
                Focus::List => return self.handle_list_key(key),
            },
        }
        false
    }

    fn handle_amount_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(c) => {
                let mut candidate = self.amount_input.clone();
                candidate.push(c);
                // Keystrokes that would make the amount unparseable are ignored
                if accepts_amount_input(&candidate) {
                    self.amount_input = candidate;
                }
            }
            KeyCode::Backspace => {
                self.amount_input.pop();
            }
            KeyCode::Enter => self.focus = Focus::Description,
            _ => {}
        }
    }

    fn handle_description_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(c) => self.description_input.push(c),
            KeyCode::Backspace => {
                self.description_input.pop();
            }
            KeyCode::Enter => self.submit(),
            _ => {}
        }
    }

    fn handle_list_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('d') | KeyCode::Delete => self.delete_selected(),
            KeyCode::Char('r') => self.request_reset(),
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Up | KeyCode::Char('k') => self.previous(),
            KeyCode::PageDown => self.page_down(),
            KeyCode::PageUp => self.page_up(),
            KeyCode::Home => {
                if !self.changes.is_empty() {
                    self.state.select(Some(0));
                }
            }
            KeyCode::End => {
                if !self.changes.is_empty() {
                    self.state.select(Some(self.changes.len() - 1));
                }
            }
            _ => {}
        }
        false
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

    res?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press && app.handle_key(key) {
                return Ok(());
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Balance
            Constraint::Length(3), // Inputs
            Constraint::Min(0),    // Changes
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);
    render_inputs(f, chunks[1], app);
    render_table(f, chunks[2], app);
    render_status_bar(f, chunks[3], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let balance = app.balance();
    let color = if balance < 0.0 { Color::Red } else { Color::Green };

    let spans = vec![
        Span::styled("Your balance: ", Style::default().fg(Color::White)),
        Span::styled(
            format_amount(balance),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("{} changes", app.changes.len()),
            Style::default().fg(Color::DarkGray),
        ),
    ];

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn input_block(title: &str, focused: bool) -> Block<'_> {
    let color = if focused { Color::Yellow } else { Color::White };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(title)
}

fn render_inputs(f: &mut Frame, area: Rect, app: &App) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(20),
            Constraint::Min(0),
            Constraint::Length(9),
        ])
        .split(area);

    let amount = Paragraph::new(app.amount_input.as_str())
        .block(input_block(" Amount ", app.focus == Focus::Amount));
    let description = Paragraph::new(app.description_input.as_str())
        .block(input_block(" Description ", app.focus == Focus::Description));
    let add = Paragraph::new(Span::styled(
        " Add ",
        Style::default().fg(Color::Black).bg(Color::Green),
    ))
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(amount, columns[0]);
    f.render_widget(description, columns[1]);
    f.render_widget(add, columns[2]);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["#", "Change", "Description", "When"].iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let now = Utc::now();
    let rows = app.changes.iter().map(|change| {
        let color = if change.amount < 0.0 { Color::Red } else { Color::Green };

        let cells = vec![
            Cell::from(change.id.to_string()),
            Cell::from(format_amount(change.amount)).style(Style::default().fg(color)),
            Cell::from(truncate(&change.description, 40)),
            Cell::from(format_relative(&change.time, now)),
        ];

        Row::new(cells).height(1)
    });

    let border = if app.focus == Focus::List { Color::Yellow } else { Color::White };
    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(14),
            Constraint::Min(20),
            Constraint::Length(18),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(" Changes "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = Vec::new();

    if let Some(status) = &app.status {
        status_spans.push(Span::styled(format!(" {} ", status), Style::default().fg(Color::Cyan)));
        status_spans.push(Span::raw("| "));
    }

    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Focus | "));
    status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Add | "));
    status_spans.push(Span::styled("d", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Delete | "));
    status_spans.push(Span::styled("Ctrl-R", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Reset | "));
    status_spans.push(Span::styled("Esc", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::White)));

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
