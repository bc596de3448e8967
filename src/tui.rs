use microasm::{ConstantInput, DebugInfo, Processor, RuntimeError, compile_with_debug};

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io;
use tui_textarea::TextArea;

const EDITOR_TITLE: &str = "Code Editor (F2: Load, F5: Run, F10: Step, Tab: Switch)";
const MEMORY_ROWS: usize = 16;

#[derive(Debug, PartialEq)]
pub enum Pane {
    Editor,
    State,
    Memory,
    Display,
    Logs,
}

#[derive(Debug, PartialEq)]
pub enum NumFormat {
    Hex,
    Binary,
    Decimal,
}

impl NumFormat {
    fn format(&self, value: i32) -> String {
        match self {
            NumFormat::Hex => format!("0x{:08x}", value),
            NumFormat::Binary => format!("0b{:032b}", value),
            NumFormat::Decimal => format!("{}", value),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum RunMode {
    Editing,
    Stepping,
    Running,
}

pub struct App<'a> {
    pub processor: Option<Processor>,
    pub debug_info: DebugInfo,
    pub input: ConstantInput,
    pub editor: TextArea<'a>,
    pub active_pane: Pane,
    pub number_format: NumFormat,
    pub mode: RunMode,
    pub state_scroll: u16,
    pub memory_scroll: usize,
    pub logs: Vec<String>,
    pub should_quit: bool,
}

impl<'a> App<'a> {
    pub fn new(source: &str) -> App<'a> {
        let mut editor = TextArea::from(source.lines());
        editor.set_block(
            ratatui::widgets::Block::default()
                .borders(ratatui::widgets::Borders::ALL)
                .title(EDITOR_TITLE),
        );

        App {
            processor: None,
            debug_info: DebugInfo::default(),
            input: ConstantInput::default(),
            editor,
            active_pane: Pane::Editor,
            number_format: NumFormat::Decimal,
            mode: RunMode::Editing,
            state_scroll: 0,
            memory_scroll: 0,
            logs: vec![],
            should_quit: false,
        }
    }

    fn compile_and_load(&mut self) -> bool {
        let source = self.editor.lines().join("\n");
        match compile_with_debug(&source) {
            Ok(assembly) => {
                self.logs.push(format!("Assembled {} words. Processor reset and loaded.", assembly.words.len()));
                self.processor = Some(Processor::new(assembly.words));
                self.debug_info = assembly.debug_info;
                self.memory_scroll = 0;
                true
            }
            Err(e) => {
                self.logs.push(format!("Compile error: {}", e));
                self.processor = None;
                false
            }
        }
    }

    fn step(&mut self) {
        if self.mode == RunMode::Editing {
            if !self.compile_and_load() {
                return;
            }
            self.mode = RunMode::Stepping;
        }
        let Some(processor) = self.processor.as_mut() else { return };
        let result = processor.step(&mut self.input);
        let halted = processor.is_halted();
        self.finish(result, halted);
    }

    fn run(&mut self) {
        if self.mode == RunMode::Editing && !self.compile_and_load() {
            return;
        }
        self.mode = RunMode::Running;
        let Some(processor) = self.processor.as_mut() else { return };
        let result = processor.run(&mut self.input).map(|_| ());
        let halted = processor.is_halted();
        self.finish(result, halted);
    }

    fn finish(&mut self, result: Result<(), RuntimeError>, halted: bool) {
        match result {
            Err(e) => {
                self.logs.push(format!("Stopped: {}", e));
                self.mode = RunMode::Editing;
            }
            Ok(()) if halted => {
                let cycles = self.processor.as_ref().map_or(0, |p| p.state().cycles);
                self.logs.push(format!("Halted after {} cycles.", cycles));
                self.mode = RunMode::Editing;
            }
            Ok(()) => {}
        }
    }

    /// Scope, source line and variable values at the current program counter.
    fn context_lines(&self) -> Vec<String> {
        let Some(processor) = &self.processor else { return vec![] };
        let state = processor.state();
        let pc = state.program_counter;
        let symbols = &self.debug_info.symbols;

        let mut lines = vec![];
        if let Some(mapping) = self.debug_info.address_to_source.get(&pc) {
            lines.push(format!("Line {}: {}", mapping.line, mapping.raw_text));
        }
        let Some(scope) = symbols.scope_at(pc) else { return lines };
        lines.push(format!("Scope: {}", scope));
        if let Some(variables) = symbols.variables(scope) {
            for (name, address) in variables.iter() {
                let value = state
                    .load(i64::from(address))
                    .map_or_else(|_| "?".to_string(), |v| self.number_format.format(v));
                lines.push(format!("  {:<10} [{:>3}] {}", name, address, value));
            }
        }
        lines
    }
}

pub fn run(source: &str) -> Result<(), io::Error> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // create app and run it
    let app = App::new(source);
    let res = run_app(&mut terminal, app);

    // restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, mut app: App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, &mut app))?;

        if let Event::Key(key) = event::read()?
            && key.kind == event::KeyEventKind::Press
        {
            if key.code == KeyCode::Esc {
                app.should_quit = true;
            }

            if app.should_quit {
                return Ok(());
            }

            match key.code {
                KeyCode::Tab => {
                    app.active_pane = match app.active_pane {
                        Pane::Editor => Pane::State,
                        Pane::State => Pane::Memory,
                        Pane::Memory => Pane::Display,
                        Pane::Display => Pane::Logs,
                        Pane::Logs => Pane::Editor,
                    };
                }
                KeyCode::F(2) => {
                    if app.mode == RunMode::Editing && app.compile_and_load() {
                        app.mode = RunMode::Stepping;
                    }
                }
                KeyCode::F(9) => {
                    app.number_format = match app.number_format {
                        NumFormat::Hex => NumFormat::Binary,
                        NumFormat::Binary => NumFormat::Decimal,
                        NumFormat::Decimal => NumFormat::Hex,
                    };
                }
                KeyCode::F(5) => app.run(),
                KeyCode::F(10) => app.step(),
                _ => match app.active_pane {
                    Pane::Editor => {
                        app.editor.input(key);
                        app.mode = RunMode::Editing;
                    }
                    Pane::State => match key.code {
                        KeyCode::Up => app.state_scroll = app.state_scroll.saturating_sub(1),
                        KeyCode::Down => app.state_scroll = app.state_scroll.saturating_add(1),
                        _ => {}
                    },
                    Pane::Memory => match key.code {
                        KeyCode::Up => app.memory_scroll = app.memory_scroll.saturating_sub(MEMORY_ROWS),
                        KeyCode::Down => {
                            app.memory_scroll = (app.memory_scroll + MEMORY_ROWS)
                                .min(microasm::config::MEMORY_SIZE - MEMORY_ROWS)
                        }
                        _ => {}
                    },
                    _ => {}
                },
            }
        }
    }
}

mod ui {
    use super::*;
    use ratatui::{
        Frame,
        layout::{Constraint, Direction, Layout, Rect},
        style::{Color, Style},
        text::{Line, Span},
        widgets::{Block, Borders, Paragraph},
    };

    fn pane_block<'b>(app: &App, pane: Pane, title: &'b str) -> Block<'b> {
        let style = if app.active_pane == pane { Style::default().fg(Color::Yellow) } else { Style::default() };
        Block::default().borders(Borders::ALL).border_style(style).title(title)
    }

    pub fn draw(f: &mut Frame, app: &mut App) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),  // Top bar
                Constraint::Min(10),    // Middle section
                Constraint::Length(8),  // Bottom logs
            ])
            .split(f.area());

        // Top bar
        let pc = app.processor.as_ref().map_or(0, |p| p.state().program_counter);
        let top_msg = Paragraph::new(format!(
            "Mode: {:?} | Format (F9): {:?} | Pane (Tab): {:?} | PC: {} | Press ESC to quit",
            app.mode, app.number_format, app.active_pane, pc
        ))
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(top_msg, chunks[0]);

        let middle_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(35), // Editor
                Constraint::Percentage(25), // State
                Constraint::Percentage(15), // Memory
                Constraint::Min(34),        // Display
            ])
            .split(chunks[1]);

        // Editor
        let editor_block = pane_block(app, Pane::Editor, EDITOR_TITLE);
        app.editor.set_block(editor_block);
        f.render_widget(&app.editor, middle_chunks[0]);

        draw_state(f, app, middle_chunks[1]);
        draw_memory(f, app, middle_chunks[2]);
        draw_display(f, app, middle_chunks[3]);

        // Logs, newest at the bottom
        let visible = chunks[2].height.saturating_sub(2) as usize;
        let start = app.logs.len().saturating_sub(visible);
        let logs = Paragraph::new(app.logs[start..].join("\n")).block(pane_block(app, Pane::Logs, "Execution Logs"));
        f.render_widget(logs, chunks[2]);
    }

    fn draw_state(f: &mut Frame, app: &App, area: Rect) {
        let mut lines = vec![];
        match &app.processor {
            Some(processor) => {
                let state = processor.state();
                let fmt = |v: i32| app.number_format.format(v);
                lines.push(format!("PC:     {}", state.program_counter));
                lines.push(format!("W:      {}", fmt(state.w)));
                lines.push(format!("OUT1:   {}", fmt(state.outputs[0])));
                lines.push(format!("OUT2:   {}", fmt(state.outputs[1])));
                lines.push(format!("IN:     {} {}", state.inputs[0], state.inputs[1]));
                lines.push(format!("Frame:  base {} size {}", state.frame_base(), state.frame_size));
                lines.push(format!("Calls:  {:?}", state.call_stack));
                lines.push(format!("Frames: {:?}", state.frame_stack));
                lines.push(format!("Cycles: {}", state.cycles));
                lines.push(format!("Screen: flag {} plane {}", state.display.status_flag(), state.display.active_index()));
                lines.push(String::new());
                lines.extend(app.context_lines());
            }
            None => lines.push("No program loaded (F2)".to_string()),
        }

        let p = Paragraph::new(lines.join("\n"))
            .scroll((app.state_scroll, 0))
            .block(pane_block(app, Pane::State, "State"));
        f.render_widget(p, area);
    }

    fn draw_memory(f: &mut Frame, app: &App, area: Rect) {
        let mut mem_lines: Vec<Line> = Vec::new();
        if let Some(processor) = &app.processor {
            let state = processor.state();
            let base = state.frame_base() as usize;
            for (addr, value) in state.memory.iter().enumerate().skip(app.memory_scroll).take(MEMORY_ROWS) {
                let formatted = format!("{:>4}: {}", addr, app.number_format.format(*value));
                // live frame of the executing scope
                if addr > base && addr <= base + state.frame_size as usize {
                    mem_lines.push(Line::from(vec![Span::styled(
                        formatted,
                        Style::default().bg(Color::DarkGray).fg(Color::Green),
                    )]));
                } else {
                    mem_lines.push(Line::from(formatted));
                }
            }
        }

        let mem_p = Paragraph::new(mem_lines).block(pane_block(app, Pane::Memory, "Memory"));
        f.render_widget(mem_p, area);
    }

    fn draw_display(f: &mut Frame, app: &App, area: Rect) {
        let lines = match &app.processor {
            Some(processor) => processor.state().display.to_lines(),
            None => vec![],
        };
        let p = Paragraph::new(lines.join("\n"))
            .style(Style::default().fg(Color::Green))
            .block(pane_block(app, Pane::Display, "Display"));
        f.render_widget(p, area);
    }
}
