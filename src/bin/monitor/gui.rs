use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use std::{
    io,
    time::{Duration, Instant},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    prelude::*,
    widgets::{block::Title, Block, Borders, Paragraph, Sparkline},
    Terminal,
};

use cyglidar::{
    cyglidar::{HEIGHT_3D, WIDTH_3D},
    depth_stats::{DepthStats, MAX_VALID_DEPTH},
    frame_writer::FrameWriter,
    gui::LidarGuiError,
    point_cloud_reader::PointCloudReader,
    CygLidarD1, Mode,
};

type Reader = PointCloudReader<CygLidarD1>;
type Writer = FrameWriter<CygLidarD1>;

struct App<'a> {
    lidar: &'a CygLidarD1,
    mode: Mode,
    reader: &'a Reader,
    writer: Option<&'a Writer>,
    stats: DepthStats,
    profile: Vec<u64>,
    frames: u64,
    frames_per_second: f64,
    last_tick: Instant,
}

impl<'a> App<'a> {
    fn new(lidar: &'a CygLidarD1, mode: Mode, reader: &'a Reader, writer: Option<&'a Writer>) -> Self {
        App {
            lidar,
            mode,
            reader,
            writer,
            stats: DepthStats::default(),
            profile: vec![],
            frames: lidar.frames_decoded(),
            frames_per_second: 0.0,
            last_tick: Instant::now(),
        }
    }

    fn on_tick(&mut self) {
        // invalid samples are drawn as gaps
        let depth = |sample: &u16| match *sample {
            s if s <= MAX_VALID_DEPTH => s as u64,
            _ => 0,
        };
        match self.mode {
            Mode::Mode3D => self.lidar.use_3d_point_cloud(|cloud| {
                self.stats = DepthStats::from_samples(cloud);
                let middle = HEIGHT_3D / 2 * WIDTH_3D;
                self.profile = cloud[middle..middle + WIDTH_3D].iter().map(depth).collect();
            }),
            Mode::Mode2D => self.lidar.use_2d_point_cloud(|cloud| {
                self.stats = DepthStats::from_samples(cloud);
                self.profile = cloud.iter().map(depth).collect();
            }),
            Mode::Dual => {}
        }

        let frames = self.lidar.frames_decoded();
        let elapsed = self.last_tick.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.frames_per_second = frames.saturating_sub(self.frames) as f64 / elapsed;
        }
        self.frames = frames;
        self.last_tick = Instant::now();
    }

    fn toggle_recording(&self) {
        if let Some(writer) = self.writer {
            writer.toggle_mute();
        }
    }
}

pub fn engage_gui(
    lidar: &CygLidarD1,
    mode: Mode,
    reader: &Reader,
    writer: Option<&Writer>,
) -> Result<(), LidarGuiError> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // create app and run it
    let tick_rate = Duration::from_millis(100);
    let app = App::new(lidar, mode, reader, writer);
    let res = run_app(&mut terminal, app, tick_rate);

    // restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    tick_rate: Duration,
) -> Result<(), LidarGuiError> {
    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| ui(f, &app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                            return Ok(())
                        }
                        KeyCode::Char('r') => app.toggle_recording(),
                        _ => {}
                    }
                }
            }
        }
        if last_tick.elapsed() >= tick_rate {
            app.on_tick();
            last_tick = Instant::now();
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(5)])
        .split(f.size());

    let recording = match app.writer {
        None => Span::from("off"),
        Some(writer) if writer.is_muted() => "muted".yellow(),
        Some(writer) => Span::from(writer.status().to_string()).green(),
    };
    let read_state = if app.lidar.read_failed() {
        "failing".red()
    } else {
        "ok".green()
    };

    let text = vec![
        Line::from(vec![
            " Mode ".into(),
            Span::from(app.mode.to_string()).bold(),
            "   Reader ".into(),
            Span::from(app.reader.status().to_string()).bold(),
            "   Last read ".into(),
            read_state,
        ]),
        Line::from(vec![
            " Frames ".into(),
            Span::from(app.frames.to_string()).bold(),
            format!("   {:.1} fps", app.frames_per_second).into(),
        ]),
        Line::from(vec![Span::from(" Depth "), Span::from(app.stats.to_string())]),
        Line::from(vec![" Recording ".into(), recording]),
    ];
    let title = Title::from(" CygLidar D1 ".magenta().bold());
    let instructions = Title::from(Line::from(vec![
        " Toggle recording ".into(),
        "<R>".magenta().bold(),
        " Quit ".into(),
        "<Q> ".magenta().bold(),
    ]));
    let block = Block::default()
        .title(title.alignment(Alignment::Center))
        .title(
            instructions
                .alignment(Alignment::Center)
                .position(ratatui::widgets::block::Position::Bottom),
        )
        .borders(Borders::ALL);
    f.render_widget(Paragraph::new(text).block(block), chunks[0]);

    let profile_title = match app.mode {
        Mode::Mode3D => " Middle row depth ",
        _ => " Depth profile ",
    };
    let sparkline = Sparkline::default()
        .block(Block::default().title(profile_title).borders(Borders::ALL))
        .data(&app.profile)
        .max(MAX_VALID_DEPTH as u64)
        .style(Style::default().fg(Color::Cyan));
    f.render_widget(sparkline, chunks[1]);
}
