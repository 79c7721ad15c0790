use anyhow::Result;
use clap::Parser;
use courier_world_core::{
    Position,
    planner::{Mode, PlanRequest, Strategy, plan},
    simulation::{Phase, SimulationOutcome, SimulationReport, run_replanning_simulation},
    world::{ScheduledObstacle, World, load_world_from_string},
};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    collections::HashSet,
    io::{self, Stdout},
    path::PathBuf,
    time::{Duration, Instant},
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Map file to load
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// Planning strategy: breadth-first, uniform-cost, heuristic, greedy-local
    #[arg(short, long, default_value = "heuristic")]
    strategy: String,

    /// State space: static or time-aware
    #[arg(long, default_value = "time-aware")]
    mode: String,

    /// Start position as row,col
    #[arg(long, default_value = "0,0")]
    start: String,

    /// Goal position as row,col (defaults to the far corner)
    #[arg(long)]
    goal: Option<String>,

    /// Initial fuel for the simulated agent
    #[arg(short, long, default_value_t = 50)]
    fuel: u32,

    /// Seed for the greedy-local restart randomization
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Register the built-in demo obstacle schedule
    #[arg(short, long)]
    dynamic: bool,

    /// Print a single plan and exit instead of opening the TUI
    #[arg(long)]
    headless: bool,

    /// Run every strategy on the same request and print a summary
    #[arg(long)]
    compare: bool,

    /// Milliseconds between simulation frames
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,
}

struct App {
    /// The simulated world, queried for rendering.
    world: World,
    goal: Position,
    /// The precomputed simulation, replayed one event per tick.
    report: SimulationReport,
    cursor: usize,
    /// Flag to control the main loop.
    should_quit: bool,
    /// Set once every event has been replayed.
    finished: bool,
}

impl App {
    fn new(world: World, goal: Position, report: SimulationReport) -> Self {
        App {
            world,
            goal,
            report,
            cursor: 0,
            should_quit: false,
            finished: false,
        }
    }

    /// Advances the replay by one recorded event.
    fn tick(&mut self) {
        if self.cursor + 1 < self.report.events.len() {
            self.cursor += 1;
        } else {
            self.finished = true;
        }
    }

    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let map_file = args.map.clone().unwrap_or(PathBuf::from("maps/small.txt"));
    if !map_file.exists() {
        return Err(anyhow::anyhow!(
            "Map file does not exist: {}",
            map_file.display()
        ));
    }

    let map_string = std::fs::read_to_string(&map_file)?;
    let mut world = load_world_from_string(&map_string)?;
    if args.dynamic {
        add_demo_obstacles(&mut world)?;
    }

    let start = parse_position(&args.start)?;
    let goal = match &args.goal {
        Some(raw) => parse_position(raw)?,
        None => Position::new(world.rows() - 1, world.cols() - 1),
    };
    for (name, position) in [("start", start), ("goal", goal)] {
        if position.row >= world.rows() || position.col >= world.cols() {
            return Err(anyhow::anyhow!(
                "{name} {:?} is outside the {}x{} map",
                position,
                world.rows(),
                world.cols()
            ));
        }
    }

    if args.compare {
        init_logging();
        return run_comparison(&world, &args, start, goal);
    }
    if args.headless {
        init_logging();
        return run_headless(&world, &args, start, goal);
    }

    // The replay is precomputed; the TUI only steps through its events.
    let report = run_replanning_simulation(&world, start, goal, args.fuel, args.seed);
    if report.outcome == SimulationOutcome::NoInitialPath {
        return Err(anyhow::anyhow!(
            "no initial path from {start:?} to {goal:?}"
        ));
    }

    let mut terminal = setup_terminal()?;
    let mut app = App::new(world, goal, report);
    let run_result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));
    restore_terminal(&mut terminal)?;
    run_result
}

/// Subscriber for the non-TUI modes; `RUST_LOG` selects the filter.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn parse_position(raw: &str) -> Result<Position> {
    let (row, col) = raw
        .split_once(',')
        .ok_or_else(|| anyhow::anyhow!("expected row,col but got '{raw}'"))?;
    Ok(Position::new(row.trim().parse()?, col.trim().parse()?))
}

/// The canned obstacle schedule: one vehicle sweeping east along row 2
/// starting at time 2, another heading south down column 3 starting at
/// time 3, both clipped to the map.
fn add_demo_obstacles(world: &mut World) -> Result<()> {
    if world.rows() > 2 {
        let path: Vec<Position> = (1..world.cols().min(5)).map(|c| Position::new(2, c)).collect();
        let schedule: Vec<u32> = (2..).take(path.len()).collect();
        world.add_obstacle(ScheduledObstacle::new(path, schedule)?)?;
    }
    if world.cols() > 3 {
        let path: Vec<Position> = (1..world.rows().min(5)).map(|r| Position::new(r, 3)).collect();
        let schedule: Vec<u32> = (3..).take(path.len()).collect();
        world.add_obstacle(ScheduledObstacle::new(path, schedule)?)?;
    }
    Ok(())
}

/// One-shot planning without the TUI.
fn run_headless(world: &World, args: &Args, start: Position, goal: Position) -> Result<()> {
    let strategy: Strategy = args.strategy.parse()?;
    let mode: Mode = args.mode.parse()?;
    let request = PlanRequest::new(start, goal, mode, strategy).with_seed(args.seed);
    let result = plan(world, &request);
    if result.found {
        println!(
            "{strategy} ({mode}): cost {}, {} moves, {:?}",
            result.total_cost, result.steps, result.elapsed
        );
        println!("path: {}", format_path(&result.path));
    } else {
        println!("{strategy} ({mode}): no path found ({:?})", result.elapsed);
    }
    Ok(())
}

/// Runs all four strategies on the same request and prints one line each.
fn run_comparison(world: &World, args: &Args, start: Position, goal: Position) -> Result<()> {
    let mode: Mode = args.mode.parse()?;
    println!(
        "{:<14} {:>6} {:>6} {:>12}",
        "strategy", "cost", "moves", "elapsed"
    );
    for strategy in Strategy::ALL {
        let request = PlanRequest::new(start, goal, mode, strategy).with_seed(args.seed);
        let result = plan(world, &request);
        if result.found {
            println!(
                "{:<14} {:>6} {:>6} {:>12}",
                strategy.to_string(),
                result.total_cost,
                result.steps,
                format!("{:?}", result.elapsed)
            );
        } else {
            println!(
                "{:<14} {:>6} {:>6} {:>12}",
                strategy.to_string(),
                "-",
                "-",
                "no path"
            );
        }
    }
    Ok(())
}

fn format_path(path: &[Position]) -> String {
    path.iter()
        .map(|p| format!("({},{})", p.row, p.col))
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),    // map
            Constraint::Length(6), // status
            Constraint::Length(2), // help
        ])
        .split(frame.area());

    render_map(frame, main_layout[0], app);
    render_status(frame, main_layout[1], app);

    let help_text = Paragraph::new("Press 'q' or 'Esc' to quit.")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Traveling => "traveling",
        Phase::Replanning => "replanning",
        Phase::Stuck => "stuck",
        Phase::Arrived => "arrived",
    }
}

/// Renders the world map at the currently displayed event.
fn render_map(frame: &mut Frame, area: Rect, app: &App) {
    let event = &app.report.events[app.cursor];
    let active_obstacles: HashSet<Position> =
        app.world.obstacle_positions_at(event.time).into_iter().collect();

    let mut lines: Vec<Line> = Vec::with_capacity(app.world.rows());
    for row in 0..app.world.rows() {
        let mut spans: Vec<Span> = Vec::with_capacity(app.world.cols());
        for col in 0..app.world.cols() {
            let position = Position::new(row, col);
            let span = if position == event.position {
                Span::styled("@", Style::default().fg(Color::Red).bold())
            } else if app.world.cells()[position].blocked {
                Span::styled("#", Style::default().fg(Color::DarkGray))
            } else if active_obstacles.contains(&position) {
                Span::styled("o", Style::default().fg(Color::Magenta))
            } else if position == app.goal {
                Span::styled("G", Style::default().fg(Color::Green).bold())
            } else {
                match app.world.cost_of(position) {
                    1 => Span::styled("·", Style::default().fg(Color::DarkGray)),
                    cost @ 2..=9 => Span::styled(
                        cost.to_string(),
                        Style::default().fg(Color::Yellow),
                    ),
                    _ => Span::styled("+", Style::default().fg(Color::Yellow)),
                }
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Courier World").borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(map_paragraph, area);
}

/// Renders the agent status for the currently displayed event.
fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let event = &app.report.events[app.cursor];
    let mut lines = vec![
        Line::from(format!("Time: {}", event.time)),
        Line::from(format!("Fuel: {}", event.fuel_remaining)),
        Line::from(format!("Phase: {}", phase_label(event.phase))),
    ];
    if app.finished {
        let outcome = match app.report.outcome {
            SimulationOutcome::Arrived => "agent arrived at the goal",
            SimulationOutcome::Stuck => "agent is stuck",
            SimulationOutcome::NoInitialPath => "no initial path",
        };
        lines.push(Line::from(Span::styled(
            outcome,
            Style::default().fg(Color::Cyan).bold(),
        )));
    }
    let status_widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(status_widget, area);
}
