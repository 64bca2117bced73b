use std::{
    io::stdout,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::gui::error::LidarGuiError;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// Let the user pick the serial port the lidar hangs off, which will be
/// opened at `baud_rate`. `None` means they quit without choosing, or there
/// was nothing to choose from.
pub fn device_selector(
    mut available_ports: Vec<PathBuf>,
    baud_rate: u32,
) -> Result<Option<PathBuf>, LidarGuiError> {
    if available_ports.is_empty() {
        return Ok(None);
    }

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let selected = select_loop(&available_ports, baud_rate);
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(selected?.map(|i| available_ports.swap_remove(i)))
}

/// The D1 talks through a USB UART bridge.
fn is_usb_serial(port: &Path) -> bool {
    port.file_name()
        .map(|name| name.to_string_lossy())
        .is_some_and(|name| name.starts_with("ttyUSB") || name.starts_with("ttyACM"))
}

/// Where the cursor starts: the first USB serial port, if any.
fn initial_cursor(ports: &[PathBuf]) -> usize {
    ports.iter().position(|p| is_usb_serial(p)).unwrap_or(0)
}

#[derive(Debug, PartialEq, Eq)]
enum Choice {
    Move(usize),
    Pick(usize),
    Quit,
    Ignore,
}

fn on_key(code: KeyCode, cursor: usize, n_ports: usize) -> Choice {
    match code {
        KeyCode::Down | KeyCode::Char('j') => Choice::Move((cursor + 1) % n_ports),
        KeyCode::Up | KeyCode::Char('k') => Choice::Move((cursor + n_ports - 1) % n_ports),
        KeyCode::Enter => Choice::Pick(cursor),
        KeyCode::Char('q') | KeyCode::Esc => Choice::Quit,
        _ => Choice::Ignore,
    }
}

fn port_item(port: &Path) -> ListItem<'_> {
    let name = Span::from(port.to_string_lossy());
    if is_usb_serial(port) {
        ListItem::new(Line::from(vec![name, "  usb serial".dark_gray()]))
    } else {
        ListItem::new(Line::from(name))
    }
}

fn select_loop(available_ports: &[PathBuf], baud_rate: u32) -> Result<Option<usize>, LidarGuiError> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let n_ports = available_ports.len();
    let mut cursor = initial_cursor(available_ports);
    let mut list_state = ListState::default().with_selected(Some(cursor));
    loop {
        let title = Title::from(Span::from(format!(" CygLidar Port @ {baud_rate} baud ")).magenta().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".magenta().bold(),
            " Open ".into(),
            "<Enter>".magenta().bold(),
            " Quit ".into(),
            "<Q> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let list = List::new(available_ports.iter().map(|p| port_item(p)))
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Magenta))
            .block(block);
        list_state.select(Some(cursor));
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_stateful_widget(list, area, &mut list_state);
        })?;

        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match on_key(key.code, cursor, n_ports) {
                        Choice::Move(next) => cursor = next,
                        Choice::Pick(picked) => return Ok(Some(picked)),
                        Choice::Quit => return Ok(None),
                        Choice::Ignore => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn cursor_starts_on_the_usb_bridge() {
        assert_eq!(initial_cursor(&ports(&["/dev/ttyS0", "/dev/ttyS1", "/dev/ttyUSB0"])), 2);
        assert_eq!(initial_cursor(&ports(&["/dev/ttyS0", "/dev/ttyACM3"])), 1);
        assert_eq!(initial_cursor(&ports(&["/dev/ttyS0", "/dev/ttyS1"])), 0);
    }

    #[test]
    fn arrows_wrap_around() {
        assert_eq!(on_key(KeyCode::Down, 2, 3), Choice::Move(0));
        assert_eq!(on_key(KeyCode::Up, 0, 3), Choice::Move(2));
        assert_eq!(on_key(KeyCode::Char('j'), 0, 3), Choice::Move(1));
    }

    #[test]
    fn enter_picks_and_escape_quits() {
        assert_eq!(on_key(KeyCode::Enter, 1, 3), Choice::Pick(1));
        assert_eq!(on_key(KeyCode::Esc, 1, 3), Choice::Quit);
        assert_eq!(on_key(KeyCode::Char('q'), 1, 3), Choice::Quit);
        assert_eq!(on_key(KeyCode::Char('x'), 1, 3), Choice::Ignore);
    }

    #[test]
    fn nothing_to_choose_from_is_no_choice() {
        assert!(device_selector(Vec::new(), 250_000).unwrap().is_none());
    }
}
