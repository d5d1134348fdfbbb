use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
    Frame, Terminal,
};
use std::{error::Error, io};

use uwbcal::analysis::DistanceReport;

/// Distance either side of the ideal line that still counts as on target
const THRESHOLD_CM: f64 = 5.0;

struct App {
    title: String,
    measured: Vec<(f64, f64)>,
    ideal: Vec<(f64, f64)>,
    fit: Vec<(f64, f64)>,
    upper: Vec<(f64, f64)>,
    lower: Vec<(f64, f64)>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

impl App {
    fn new(report: &DistanceReport) -> App {
        let measured: Vec<(f64, f64)> = report
            .rows
            .iter()
            .map(|r| (r.actual as f64, r.mean))
            .collect();

        let x_min = measured.first().map(|p| p.0).unwrap_or(0.0);
        let x_max = measured.last().map(|p| p.0).unwrap_or(1.0).max(x_min + 1.0);
        let line = |f: &dyn Fn(f64) -> f64| vec![(x_min, f(x_min)), (x_max, f(x_max))];

        // a rescaled report already sits on y = x
        let fit = match &report.fit {
            Some(fit) if !report.scaled => line(&|x: f64| fit.predict(x)),
            _ => vec![],
        };

        let y_values = measured
            .iter()
            .map(|p| p.1)
            .chain(fit.iter().map(|p| p.1))
            .chain([x_min - THRESHOLD_CM, x_max + THRESHOLD_CM]);
        let (y_min, y_max) = y_values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| {
            (lo.min(y), hi.max(y))
        });

        App {
            title: report.title.clone(),
            ideal: line(&|x: f64| x),
            upper: line(&|x: f64| x + THRESHOLD_CM),
            lower: line(&|x: f64| x - THRESHOLD_CM),
            measured,
            fit,
            x_bounds: [x_min, x_max],
            y_bounds: [y_min.floor(), y_max.ceil()],
        }
    }
}

pub fn engage_gui(report: &DistanceReport) -> Result<(), Box<dyn Error>> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let app = App::new(report);
    let res = run_app(&mut terminal, &app);

    // restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if let KeyCode::Char('q') | KeyCode::Esc = key.code {
                return Ok(());
            }
        }
    }
}

fn axis_labels(bounds: [f64; 2]) -> Vec<Span<'static>> {
    let mid = (bounds[0] + bounds[1]) / 2.0;
    [bounds[0], mid, bounds[1]]
        .iter()
        .map(|v| Span::from(format!("{:.0}", v)))
        .collect()
}

fn ui(f: &mut Frame, app: &App) {
    let mut datasets = vec![
        Dataset::default()
            .name("Ideal")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Green))
            .data(&app.ideal),
        Dataset::default()
            .name(format!("+{} cm", THRESHOLD_CM))
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::DarkGray))
            .data(&app.upper),
        Dataset::default()
            .name(format!("-{} cm", THRESHOLD_CM))
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::DarkGray))
            .data(&app.lower),
        Dataset::default()
            .name("Average")
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Cyan))
            .data(&app.measured),
    ];
    if !app.fit.is_empty() {
        datasets.push(
            Dataset::default()
                .name("Fit")
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(Color::Red))
                .data(&app.fit),
        );
    }

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(app.title.as_str())
                .borders(Borders::ALL),
        )
        .x_axis(
            Axis::default()
                .title(Span::styled("Actual Distance (cm)", Style::default().fg(Color::Red)))
                .style(Style::default().fg(Color::White))
                .bounds(app.x_bounds)
                .labels(axis_labels(app.x_bounds)),
        )
        .y_axis(
            Axis::default()
                .title(Span::styled(
                    "Calculated Distance (cm)",
                    Style::default().fg(Color::Red),
                ))
                .style(Style::default().fg(Color::White))
                .bounds(app.y_bounds)
                .labels(axis_labels(app.y_bounds)),
        );

    f.render_widget(chart, f.size());
}
