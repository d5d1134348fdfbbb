use std::{
    fmt::Display,
    io::stdout,
    sync::mpsc,
    thread::{spawn, JoinHandle},
    time::Duration,
};

use crate::gui::error::TuiError;

use crossterm::{
    event::{self, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};

use ratatui::{
    prelude::*,
    widgets::{block::Title, *},
    Terminal,
};

enum ThreadMessage {
    Stop,
}

enum WorkerMessage {
    Status(String),
    Failed(String),
}

/// Run `f` on a worker thread, showing the status line it returns each time,
/// until the user presses a key.
///
/// The function can be thought of as a recursive fold. `init` contains the
/// inital state of the loop, then `f` is called on the inital state to produce
/// a new state and a status line, and then `f` is called on that new state,
/// and so on until the user indicates that this should stop, or `f` fails.
pub fn fold_until_stop<F, T, E>(title: &str, init: T, f: F) -> Result<T, TuiError>
where
    F: FnMut(T) -> Result<(T, String), E> + Send + 'static,
    T: Send + 'static,
    E: Display + 'static,
{
    let (stop_tx, stop_rx) = mpsc::channel();
    let (status_tx, status_rx) = mpsc::channel();
    let th = spawn_fold(init, f, stop_rx, status_tx);

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let shown = show_status(title, &status_rx);
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    // the worker may already be gone if it failed
    let _ = stop_tx.send(ThreadMessage::Stop);
    let res = th.join().map_err(|_| TuiError::JoinError)?;
    shown?;

    res.map_err(TuiError::WorkerError)
}

fn spawn_fold<F, T, E>(
    init: T,
    mut f: F,
    stop_rx: mpsc::Receiver<ThreadMessage>,
    status_tx: mpsc::Sender<WorkerMessage>,
) -> JoinHandle<Result<T, String>>
where
    F: FnMut(T) -> Result<(T, String), E> + Send + 'static,
    T: Send + 'static,
    E: Display + 'static,
{
    spawn(move || {
        let mut val = init;

        loop {
            match f(val) {
                Ok((next, status)) => {
                    val = next;
                    let _ = status_tx.send(WorkerMessage::Status(status));
                }
                Err(e) => {
                    let msg = e.to_string();
                    let _ = status_tx.send(WorkerMessage::Failed(msg.clone()));
                    return Err(msg);
                }
            }
            if let Ok(ThreadMessage::Stop) = stop_rx.try_recv() {
                return Ok(val);
            }
        }
    })
}

fn show_status(title: &str, status_rx: &mpsc::Receiver<WorkerMessage>) -> Result<(), TuiError> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut status = String::from("Waiting for the first reading...");
    loop {
        while let Ok(msg) = status_rx.try_recv() {
            match msg {
                WorkerMessage::Status(s) => status = s,
                WorkerMessage::Failed(_) => return Ok(()),
            }
        }

        let header = Title::from(Span::from(format!(" {} ", title)).magenta().bold());
        let text = Paragraph::new(vec![
            Line::from(status.clone()),
            Line::from(" Press any key to stop ".dim()),
        ]);
        let block = Block::default()
            .title(header.alignment(Alignment::Center))
            .borders(Borders::ALL);
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_widget(text.block(block), area);
        })?;
        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(());
                }
            }
        }
    }
}
