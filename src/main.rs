use std::{
    cmp::min,
    error::Error,
    fs::{self, OpenOptions},
    io::{self, Stdout},
    sync::{Arc, Mutex},
    time::Duration,
};

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::{Alignment, Constraint, CrosstermBackend, Direction, Layout},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, List, ListItem, ListState, Paragraph},
    Terminal,
};
use streak_todo::{
    auth::StaticIdentity,
    clock::{Clock, DateKey, SystemClock},
    config::Config,
    model::{ListStats, Todo, TodoList},
    store::{DocumentStore, MemoryStore, SqliteStore},
    sync::{Invalidation, ViewKey},
    TodoService,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Copy, Clone)]
enum InputField {
    ListTitle,
    ListDescription,
    TaskText,
}

enum AppState {
    List,
    Create,
    CreateList,
    Input(InputField),
}

enum Notice {
    Info(String),
    Failure(String),
}

struct State {
    pub list_title: String,
    pub list_description: String,
    pub todo_text: String,
    pub state: AppState,
    pub input: String,
    pub lists_list_state: ListState,
    pub todo_list_state: ListState,
    pub selecting_list: bool,
    pub notice: Option<Notice>,
}

/// What the screen currently shows. Each part is refetched only when the
/// coordinator reports it stale.
#[derive(Default)]
struct Views {
    lists: Vec<TodoList>,
    stats: Vec<ListStats>,
    todos: Vec<Todo>,
    todos_of: Option<String>,
    completed_dates: Vec<DateKey>,
}

impl Views {
    fn refresh(&mut self, service: &TodoService, dirty: &Invalidation, selected: Option<usize>) {
        if dirty.contains(&ViewKey::Lists) {
            self.lists = service.get_lists();
        }
        if dirty.contains(&ViewKey::Lists) || dirty.touches_todos() {
            self.stats = service.get_list_stats();
        }

        let selected = selected
            .and_then(|index| self.lists.get(index))
            .map(|list| list.id.clone());
        if selected != self.todos_of || dirty.touches_todos() {
            self.todos = match &selected {
                Some(list_id) => service.get_todos(Some(list_id)),
                None => vec![],
            };
            self.todos_of = selected;
        }

        if dirty.contains(&ViewKey::CompletedDates) {
            self.completed_dates = service.get_completed_dates();
        }
    }

    fn selected_list(&self, state: &State) -> Option<&TodoList> {
        state
            .lists_list_state
            .selected()
            .and_then(|index| self.lists.get(index))
    }

    fn stats_of(&self, list_id: &str) -> Option<&ListStats> {
        self.stats.iter().find(|stats| stats.list_id == list_id)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::parse();
    init_logging(&config)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn DocumentStore> = if config.ephemeral {
        Arc::new(MemoryStore::new(clock.clone()))
    } else {
        Arc::new(SqliteStore::open(config.db_path()?, clock.clone())?)
    };
    let identity = match config.user_id() {
        Some(user) => StaticIdentity::signed_in(user),
        None => StaticIdentity::anonymous(),
    };
    let service = TodoService::new(store, Arc::new(identity), clock.clone());
    info!(user = ?config.user_id(), ephemeral = config.ephemeral, "session started");

    match service.sweep_orphans() {
        Ok(swept) if swept.value > 0 => info!(removed = swept.value, "cleaned up orphaned tasks"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "orphan sweep failed"),
    }

    let state = State {
        state: AppState::List,
        list_title: "".to_string(),
        list_description: "".to_string(),
        input: "".to_string(),
        todo_text: "".to_string(),
        lists_list_state: ListState::default(),
        todo_list_state: ListState::default(),
        selecting_list: true,
        notice: None,
    };
    let mut terminal = setup_terminal()?;
    let result = run(&mut terminal, &service, clock.as_ref(), state);
    restore_terminal(&mut terminal)?;
    result
}

fn init_logging(config: &Config) -> Result<(), Box<dyn Error>> {
    let path = config.log_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, Box<dyn Error>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn restore_terminal(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
) -> Result<(), Box<dyn Error>> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    Ok(terminal.show_cursor()?)
}

/// Records the outcome of a write: one notice either way.
fn report<T>(
    state: &mut State,
    action: &str,
    success: &str,
    result: streak_todo::Result<T>,
) -> Option<T> {
    match result {
        Ok(value) => {
            state.notice = Some(Notice::Info(success.to_string()));
            Some(value)
        }
        Err(e) => {
            if e.is_permission() {
                warn!(action, error = %e, "action refused");
            } else {
                error!(action, error = %e, "action failed");
            }
            state.notice = Some(Notice::Failure(e.user_message(action)));
            None
        }
    }
}

fn everything() -> Invalidation {
    [ViewKey::Lists, ViewKey::Todos(None), ViewKey::CompletedDates]
        .into_iter()
        .collect()
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    service: &TodoService,
    clock: &dyn Clock,
    mut state: State,
) -> Result<(), Box<dyn Error>> {
    let mut views = Views::default();
    views.refresh(service, &everything(), None);
    Ok(loop {
        let dirty = service.sync().take_dirty();
        views.refresh(service, &dirty, state.lists_list_state.selected());

        match state.state {
            AppState::List => draw_lists(terminal, &views, clock, &mut state),
            AppState::Create => draw_create_todo(terminal, &state),

            AppState::CreateList => draw_create_list(terminal, &state),

            AppState::Input(field) => draw_input(terminal, &mut state, field),
        };

        if event::poll(Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                match state.state {
                    AppState::List => {
                        state.notice = None;
                        match key.code {
                            KeyCode::Char('q') => {
                                break;
                            }
                            KeyCode::Char('N') => {
                                if views.selected_list(&state).is_some() {
                                    state.state = AppState::Create
                                }
                            }
                            KeyCode::Char('L') => state.state = AppState::CreateList,
                            KeyCode::Char('D') => match state.selecting_list {
                                true => {
                                    if let Some(list) = views.selected_list(&state) {
                                        let id = list.id.clone();
                                        report(
                                            &mut state,
                                            "delete list",
                                            "List deleted successfully",
                                            service.delete_list(&id),
                                        );
                                        state.lists_list_state.select(None);
                                        state.todo_list_state.select(None);
                                    }
                                }
                                false => {
                                    if let Some(todo) = state
                                        .todo_list_state
                                        .selected()
                                        .and_then(|index| views.todos.get(index))
                                    {
                                        let id = todo.id.clone();
                                        report(
                                            &mut state,
                                            "delete task",
                                            "Task deleted",
                                            service.delete_todo(&id),
                                        );
                                        let remaining = views.todos.len().saturating_sub(1);
                                        if remaining == 0 {
                                            state.todo_list_state.select(None);
                                        } else {
                                            todos_clamp(&mut state, remaining);
                                        }
                                    }
                                }
                            },
                            KeyCode::Char('j') => match state.selecting_list {
                                true => {
                                    lists_move_down(&mut state, &views.lists);
                                }
                                false => {
                                    todos_move_down(&mut state, &views.todos);
                                }
                            },
                            KeyCode::Char('k') => match state.selecting_list {
                                true => {
                                    lists_move_up(&mut state);
                                }
                                false => {
                                    todos_move_up(&mut state);
                                }
                            },
                            KeyCode::Char('h') => match state.selecting_list {
                                true => {}
                                false => {
                                    state.selecting_list = true;
                                    state.todo_list_state.select(None);
                                }
                            },
                            KeyCode::Char('l') => match state.selecting_list {
                                true => {
                                    if views.selected_list(&state).is_some() {
                                        state.selecting_list = false;
                                        if !views.todos.is_empty() {
                                            state.todo_list_state.select(Some(0));
                                        }
                                    }
                                }
                                false => {
                                    toggle_todo(service, &mut state, &views.todos);
                                }
                            },
                            KeyCode::Char(' ') => match state.selecting_list {
                                true => {}
                                false => {
                                    toggle_todo(service, &mut state, &views.todos);
                                }
                            },
                            _ => {}
                        }
                    }

                    AppState::Create => match key.code {
                        KeyCode::Char('q') => {
                            state.state = AppState::List;
                        }
                        KeyCode::Char('t') => {
                            state.state = AppState::Input(InputField::TaskText);
                        }
                        KeyCode::Char('s') => {
                            if let Some(list) = views.selected_list(&state) {
                                let list_id = list.id.clone();
                                save_todo(service, &mut state, &list_id);
                            }
                            state.todo_text = "".to_string();
                            state.state = AppState::List;
                        }
                        _ => {}
                    },
                    AppState::CreateList => match key.code {
                        KeyCode::Char('q') => {
                            state.state = AppState::List;
                        }
                        KeyCode::Char('t') => {
                            state.state = AppState::Input(InputField::ListTitle);
                        }
                        KeyCode::Char('d') => {
                            state.state = AppState::Input(InputField::ListDescription);
                        }
                        KeyCode::Char('s') => {
                            save_todo_list(service, &mut state);
                            state.list_title = "".to_string();
                            state.list_description = "".to_string();
                            state.input = "".to_string();
                            state.state = AppState::List;
                        }
                        _ => {}
                    },
                    AppState::Input(field) => match key.code {
                        KeyCode::Char(c) => {
                            state.input.push(c);
                        }
                        KeyCode::Backspace => {
                            state.input.pop();
                        }
                        KeyCode::Esc => {
                            state.input = "".to_string();
                            state.state = AppState::List
                        }
                        KeyCode::Enter => {
                            let value = std::mem::take(&mut state.input);
                            match field {
                                InputField::ListTitle => {
                                    state.list_title = value;
                                    state.state = AppState::CreateList;
                                }
                                InputField::ListDescription => {
                                    state.list_description = value;
                                    state.state = AppState::CreateList;
                                }
                                InputField::TaskText => {
                                    state.todo_text = value;
                                    state.state = AppState::Create;
                                }
                            }
                        }

                        _ => {}
                    },
                }
            }
        }
    })
}

fn save_todo_list(service: &TodoService, state: &mut State) {
    let title = state.list_title.clone();
    let description = state.list_description.clone();
    report(
        state,
        "create list",
        "List created",
        service.create_list(&title, Some(&description)),
    );
}

fn save_todo(service: &TodoService, state: &mut State, list_id: &str) {
    let text = state.todo_text.clone();
    report(state, "add task", "Task added", service.add_todo(list_id, &text));
}

fn toggle_todo(service: &TodoService, state: &mut State, todos: &[Todo]) {
    if let Some(todo) = state
        .todo_list_state
        .selected()
        .and_then(|index| todos.get(index))
    {
        let result = service.toggle_todo(&todo.id);
        if let Err(e) = result {
            error!(todo = %todo.id, error = %e, "toggle failed");
            state.notice = Some(Notice::Failure(e.user_message("update task")));
        }
    }
}

fn todos_clamp(state: &mut State, len: usize) {
    if let Some(v) = state.todo_list_state.selected() {
        state.todo_list_state.select(Some(min(v, len - 1)));
    }
}

fn todos_move_up(state: &mut State) {
    match state.todo_list_state.selected() {
        Some(v) => {
            let max = match v {
                0 => None,
                v => Some(v - 1),
            };
            state.todo_list_state.select(max);
        }
        None => {
            state.todo_list_state.select(Some(0));
        }
    }
}

fn lists_move_up(state: &mut State) {
    match state.lists_list_state.selected() {
        Some(v) => {
            let max = match v {
                0 => None,
                v => Some(v - 1),
            };
            state.lists_list_state.select(max);
        }
        None => {
            state.lists_list_state.select(Some(0));
        }
    }
}

fn todos_move_down(state: &mut State, todos: &[Todo]) {
    if todos.is_empty() {
        return;
    }
    match state.todo_list_state.selected() {
        Some(v) => {
            state.todo_list_state.select(Some(min(v + 1, todos.len() - 1)));
        }
        None => {
            state.todo_list_state.select(Some(0));
        }
    }
}

fn lists_move_down(state: &mut State, lists: &[TodoList]) {
    if lists.is_empty() {
        return;
    }
    match state.lists_list_state.selected() {
        Some(v) => {
            state.lists_list_state.select(Some(min(v + 1, lists.len() - 1)));
        }
        None => {
            state.lists_list_state.select(Some(0));
        }
    }
}

fn field_label(field: InputField) -> &'static str {
    match field {
        InputField::ListTitle => "List title",
        InputField::ListDescription => "List description",
        InputField::TaskText => "Task",
    }
}

fn draw_input(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    state: &mut State,
    field: InputField,
) {
    terminal
        .draw(|frame| {
            let size = frame.size();
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .margin(2)
                .constraints(
                    [
                        Constraint::Length(3),
                        Constraint::Length(4),
                        Constraint::Min(0),
                    ]
                    .as_ref(),
                )
                .split(size);

            frame.render_widget(
                Paragraph::new(field_label(field))
                    .style(Style::default())
                    .alignment(Alignment::Center),
                chunks[0],
            );
            frame.render_widget(
                Paragraph::new(state.input.clone())
                    .block(
                        Block::default()
                            .title(field_label(field))
                            .borders(Borders::ALL)
                            .border_type(BorderType::Rounded),
                    )
                    .style(Style::default())
                    .alignment(Alignment::Center),
                chunks[1],
            )
        })
        .ok();
}

fn draw_create_list(terminal: &mut Terminal<CrosstermBackend<Stdout>>, state: &State) {
    terminal
        .draw(|frame| {
            let size = frame.size();
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .margin(2)
                .constraints(
                    [
                        Constraint::Length(2),
                        Constraint::Min(5),
                        Constraint::Length(4),
                        Constraint::Length(4),
                    ]
                    .as_ref(),
                )
                .split(size);

            let text = vec![
                Line::from("(t) Input title"),
                Line::from("(d) Input description"),
                Line::from("(s) Save list".green().italic()),
                Line::from("(q) Cancel".red()),
            ];

            frame.render_widget(
                Paragraph::new("New list")
                    .style(Style::default())
                    .alignment(Alignment::Center),
                chunks[0],
            );
            frame.render_widget(
                Paragraph::new(text)
                    .style(Style::default())
                    .alignment(Alignment::Center),
                chunks[1],
            );

            frame.render_widget(
                Paragraph::new(state.list_title.clone())
                    .block(
                        Block::default()
                            .title("Title")
                            .borders(Borders::ALL)
                            .border_type(BorderType::Rounded),
                    )
                    .style(Style::default())
                    .alignment(Alignment::Center),
                chunks[2],
            );

            frame.render_widget(
                Paragraph::new(state.list_description.clone())
                    .block(
                        Block::default()
                            .title("Description")
                            .borders(Borders::ALL)
                            .border_type(BorderType::Rounded),
                    )
                    .style(Style::default())
                    .alignment(Alignment::Center),
                chunks[3],
            );
        })
        .ok();
}

fn list_line(list: &TodoList, stats: Option<&ListStats>, clock: &dyn Clock) -> String {
    let today = clock.today();
    let banked = list
        .last_completed_date
        .as_ref()
        .map_or(false, |date| clock.date_key_of(date) == today);
    let (done, total) = stats.map_or((0, 0), |s| (s.completed, s.total));
    format!(
        "{} {}  {}/{}  {} day streak",
        if banked { "✓" } else { " " },
        list.title,
        done,
        total,
        list.current_streak
    )
}

fn status_line(state: &State) -> Line<'static> {
    match &state.notice {
        Some(Notice::Failure(message)) => Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Red),
        )),
        Some(Notice::Info(message)) => Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Green),
        )),
        None => Line::from(
            "j/k move  h/l switch  space toggle  N task  L list  D delete  q quit".dark_gray(),
        ),
    }
}

fn draw_lists(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    views: &Views,
    clock: &dyn Clock,
    state: &mut State,
) {
    let lists_items: Vec<_> = views
        .lists
        .iter()
        .map(|list| {
            ListItem::new(vec![Line::from(vec![Span::styled(
                list_line(list, views.stats_of(&list.id), clock),
                Style::default(),
            )])])
        })
        .collect();

    let lists_ui = List::new(lists_items)
        .block(Block::default().title("Lists").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().add_modifier(Modifier::ITALIC))
        .highlight_symbol(">>");

    let todo_items: Vec<_> = views
        .todos
        .iter()
        .map(|todo| {
            ListItem::new(vec![Line::from(vec![Span::styled(
                format!(
                    "{} {}",
                    match todo.completed {
                        true => "[x]",
                        false => "[ ]",
                    },
                    todo.text
                ),
                Style::default(),
            )])])
        })
        .collect();

    let todos_title = views
        .selected_list(state)
        .and_then(|list| list.description.clone())
        .unwrap_or_else(|| "Tasks".to_string());
    let todo_ui = List::new(todo_items)
        .block(Block::default().title(todos_title).borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().add_modifier(Modifier::ITALIC))
        .highlight_symbol(">>");

    let today = clock.today();
    let header = format!(
        "{}  |  {} completed day(s){}",
        today,
        views.completed_dates.len(),
        if views.completed_dates.contains(&today) {
            "  |  a list is done today"
        } else {
            ""
        }
    );
    let status = status_line(state);

    terminal
        .draw(|frame| {
            let size = frame.size();
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .margin(1)
                .constraints(
                    [
                        Constraint::Length(1),
                        Constraint::Min(2),
                        Constraint::Length(1),
                    ]
                    .as_ref(),
                )
                .split(size);
            let chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(40), Constraint::Min(2)].as_ref())
                .split(rows[1]);

            frame.render_widget(
                Paragraph::new(header.clone()).alignment(Alignment::Center),
                rows[0],
            );
            frame.render_stateful_widget(lists_ui, chunks[0], &mut state.lists_list_state);
            frame.render_stateful_widget(todo_ui, chunks[1], &mut state.todo_list_state);
            frame.render_widget(Paragraph::new(vec![status.clone()]), rows[2]);
        })
        .ok();
}

fn draw_create_todo(terminal: &mut Terminal<CrosstermBackend<Stdout>>, state: &State) {
    terminal
        .draw(|frame| {
            let size = frame.size();
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .margin(2)
                .constraints(
                    [
                        Constraint::Min(2),
                        Constraint::Min(5),
                        Constraint::Length(4),
                    ]
                    .as_ref(),
                )
                .split(size);

            let text = vec![
                Line::from("Add a task"),
                Line::from("(t) Input task"),
                Line::from("(s) Save task".green().italic()),
                Line::from("(q) Cancel".red()),
            ];

            frame.render_widget(
                Paragraph::new("New task")
                    .style(Style::default())
                    .alignment(Alignment::Center),
                chunks[0],
            );
            frame.render_widget(
                Paragraph::new(text)
                    .style(Style::default())
                    .alignment(Alignment::Center),
                chunks[1],
            );

            frame.render_widget(
                Paragraph::new(state.todo_text.clone())
                    .block(
                        Block::default()
                            .title("Task")
                            .borders(Borders::ALL)
                            .border_type(BorderType::Rounded),
                    )
                    .style(Style::default())
                    .alignment(Alignment::Center),
                chunks[2],
            );
        })
        .ok();
}
