//! Terminal dashboard for hierarchical training runs.
//!
//! One experiment at a time: metric charts grouped by tier, the derived
//! topology, client data distributions, and run metadata, all rendered from
//! the latest store snapshot. Background tasks keep the snapshot current
//! and report feed and reload outcomes through [`ConsoleEvent`].
//!
//! Launch with `fedscope-console`.

use std::io::{self, Stdout};

use chrono::{DateTime, Utc};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Context as CanvasContext, Line as CanvasLine, Rectangle},
        Axis, BarChart, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table,
    },
    Frame, Terminal,
};
use tokio::sync::mpsc;

use fedscope_backend::{load_all_experiments, BackendClient, LoadReport};
use fedscope_protocol::{MetricSample, NodeKind, SeriesKey};
use fedscope_store::{
    group_by_role, DistributionSelector, ExperimentContent, Selection, StoreHandle, StoreSnapshot,
};
use fedscope_topology::{
    derive_graph, layout, EdgeStyle, LayoutConfig, LayoutedGraph,
};

use crate::config::ConsoleConfig;
use crate::export;

/// Dash pattern for client data edges, in layout units.
const DASH_LEN: f64 = 8.0;
const DASH_GAP: f64 = 6.0;

/// What background work reports back to the dashboard.
#[derive(Debug)]
pub enum ConsoleEvent {
    /// The live feed connected.
    FeedUp,
    /// The live feed dropped or could not connect; carries the reason.
    FeedDown(String),
    /// A full reload pass finished.
    ReloadFinished(LoadReport),
    /// A full reload pass could not even list experiments.
    ReloadFailed(String),
}

/// The dashboard view currently occupying the main area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Metrics,
    Topology,
    Distributions,
    Metadata,
}

impl View {
    const ALL: [View; 4] = [
        View::Metrics,
        View::Topology,
        View::Distributions,
        View::Metadata,
    ];

    fn title(self) -> &'static str {
        match self {
            View::Metrics => "Metrics",
            View::Topology => "Topology",
            View::Distributions => "Distributions",
            View::Metadata => "Metadata",
        }
    }

    fn next(self) -> View {
        let position = View::ALL.iter().position(|view| *view == self).unwrap_or(0);
        View::ALL[(position + 1) % View::ALL.len()]
    }

    fn previous(self) -> View {
        let position = View::ALL.iter().position(|view| *view == self).unwrap_or(0);
        View::ALL[(position + View::ALL.len() - 1) % View::ALL.len()]
    }
}

/// The dashboard TUI state.
struct DashboardConsole {
    store: StoreHandle,
    client: BackendClient,
    config: ConsoleConfig,
    events_tx: mpsc::UnboundedSender<ConsoleEvent>,
    view: View,
    /// Active experiment id; `None` until the store holds one.
    selected_exp: Option<String>,
    /// Index into the grouped series order of the active experiment.
    series_index: usize,
    /// Client/loader selection for the distributions view.
    selector: DistributionSelector,
    /// `None` until the feed supervisor reports for the first time.
    feed_live: Option<bool>,
    reload_in_flight: bool,
    /// Messages displayed in the event log panel.
    messages: Vec<(DateTime<Utc>, String, Color)>,
}

impl DashboardConsole {
    fn new(
        store: StoreHandle,
        client: BackendClient,
        config: ConsoleConfig,
        events_tx: mpsc::UnboundedSender<ConsoleEvent>,
    ) -> Self {
        let mut messages = Vec::new();
        messages.push((
            Utc::now(),
            "FedScope console ready. 1-4 switch views, [ and ] switch experiment, \
             r reload, e export, q quit."
                .to_string(),
            Color::Cyan,
        ));

        Self {
            store,
            client,
            config,
            events_tx,
            view: View::Metrics,
            selected_exp: None,
            series_index: 0,
            selector: DistributionSelector::new(),
            feed_live: None,
            reload_in_flight: false,
            messages,
        }
    }

    fn add_message(&mut self, msg: &str, color: Color) {
        self.messages.push((Utc::now(), msg.to_string(), color));
        // Cap at 500 messages.
        if self.messages.len() > 500 {
            self.messages.remove(0);
        }
    }

    /// Apply everything the background tasks reported since the last frame.
    fn drain_events(&mut self, events: &mut mpsc::UnboundedReceiver<ConsoleEvent>) {
        while let Ok(event) = events.try_recv() {
            match event {
                ConsoleEvent::FeedUp => {
                    if self.feed_live != Some(true) {
                        self.add_message("live feed connected", Color::Green);
                    }
                    self.feed_live = Some(true);
                }
                ConsoleEvent::FeedDown(reason) => {
                    // Repeated failures while already down stay off the log.
                    if self.feed_live != Some(false) {
                        self.add_message(&format!("live feed lost: {reason}"), Color::Red);
                    }
                    self.feed_live = Some(false);
                }
                ConsoleEvent::ReloadFinished(report) => {
                    self.reload_in_flight = false;
                    self.add_message(
                        &format!("loaded {} experiments", report.loaded.len()),
                        Color::Green,
                    );
                    for (exp_id, error) in &report.failed {
                        self.add_message(&format!("  {exp_id}: {error}"), Color::Yellow);
                    }
                }
                ConsoleEvent::ReloadFailed(reason) => {
                    self.reload_in_flight = false;
                    self.add_message(&format!("reload failed: {reason}"), Color::Red);
                }
            }
        }
    }

    /// Keep selections valid against the latest snapshot.
    fn reconcile(&mut self, snapshot: &StoreSnapshot) {
        let valid = self
            .selected_exp
            .as_deref()
            .is_some_and(|id| snapshot.experiment(id).is_some());
        if !valid {
            match snapshot.experiment_ids().next() {
                Some(first) => {
                    let first = first.to_string();
                    self.select_experiment(first);
                }
                None => {
                    self.selected_exp = None;
                    self.series_index = 0;
                    self.selector.clear();
                }
            }
        }

        if let Some(content) = self.active_content(snapshot) {
            let count = series_count(content);
            if count == 0 {
                self.series_index = 0;
            } else if self.series_index >= count {
                self.series_index = count - 1;
            }
        }
    }

    fn select_experiment(&mut self, exp_id: String) {
        self.add_message(&format!("viewing {exp_id}"), Color::Cyan);
        self.selected_exp = Some(exp_id);
        self.series_index = 0;
        self.selector.clear();
    }

    fn active_content<'a>(&self, snapshot: &'a StoreSnapshot) -> Option<&'a ExperimentContent> {
        self.selected_exp
            .as_deref()
            .and_then(|id| snapshot.experiment(id))
            .map(|content| content.as_ref())
    }

    fn cycle_experiment(&mut self, snapshot: &StoreSnapshot, step: isize) {
        let ids: Vec<&str> = snapshot.experiment_ids().collect();
        if let Some(next) = next_in(&ids, self.selected_exp.as_deref(), step) {
            if self.selected_exp.as_deref() != Some(next) {
                self.select_experiment(next.to_string());
            }
        }
    }

    fn cycle_client(&mut self, content: &ExperimentContent, step: isize) {
        let clients: Vec<&str> = content.distributions.keys().map(String::as_str).collect();
        if let Some(next) = next_in(&clients, self.selector.client(), step) {
            self.selector.select_client(&content.distributions, next);
        }
    }

    fn cycle_loader(&mut self, content: &ExperimentContent, step: isize) {
        let loaders = self.selector.loader_ids(&content.distributions);
        if let Some(next) = next_in(&loaders, self.selector.loader(), step) {
            let next = next.to_string();
            self.selector.select_loader(next);
        }
    }

    /// Kick off a background reload of every experiment.
    fn start_reload(&mut self) {
        if self.reload_in_flight {
            self.add_message("reload already running", Color::Yellow);
            return;
        }
        self.reload_in_flight = true;
        self.add_message("reloading all experiments...", Color::Cyan);

        let client = self.client.clone();
        let store = self.store.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match load_all_experiments(&client, &store).await {
                Ok(report) => ConsoleEvent::ReloadFinished(report),
                Err(error) => ConsoleEvent::ReloadFailed(error.to_string()),
            };
            let _ = events.send(event);
        });
    }

    /// Write the active experiment's CSV files.
    fn export_active(&mut self, snapshot: &StoreSnapshot) {
        let Some(exp_id) = self.selected_exp.clone() else {
            self.add_message("no experiment to export", Color::Yellow);
            return;
        };
        let Some(content) = snapshot.experiment(&exp_id) else {
            self.add_message("no experiment to export", Color::Yellow);
            return;
        };

        match export::export_experiment(&self.config.export_dir, &exp_id, content) {
            Ok(paths) => {
                tracing::info!(
                    exp_id = %exp_id,
                    metrics = %paths.metrics.display(),
                    "experiment exported"
                );
                self.add_message(
                    &format!("exported {exp_id} to {}", self.config.export_dir.display()),
                    Color::Green,
                );
            }
            Err(error) => self.add_message(&format!("export failed: {error:#}"), Color::Red),
        }
    }

    /// Handle keyboard input. Returns `true` if the dashboard should exit.
    fn handle_key(
        &mut self,
        code: KeyCode,
        modifiers: KeyModifiers,
        snapshot: &StoreSnapshot,
    ) -> bool {
        if code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
            return true;
        }
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('1') => self.view = View::Metrics,
            KeyCode::Char('2') => self.view = View::Topology,
            KeyCode::Char('3') => self.view = View::Distributions,
            KeyCode::Char('4') => self.view = View::Metadata,
            KeyCode::Tab => self.view = self.view.next(),
            KeyCode::BackTab => self.view = self.view.previous(),
            KeyCode::Char('[') => self.cycle_experiment(snapshot, -1),
            KeyCode::Char(']') => self.cycle_experiment(snapshot, 1),
            KeyCode::Char('r') => self.start_reload(),
            KeyCode::Char('e') => self.export_active(snapshot),
            KeyCode::Up | KeyCode::Down | KeyCode::Left | KeyCode::Right => {
                self.handle_arrow(code, snapshot)
            }
            _ => {}
        }
        false
    }

    /// Arrow keys act on whatever the current view selects.
    fn handle_arrow(&mut self, code: KeyCode, snapshot: &StoreSnapshot) {
        let Some(content) = self.active_content(snapshot) else {
            return;
        };
        match (self.view, code) {
            (View::Metrics, KeyCode::Up) => {
                self.series_index = self.series_index.saturating_sub(1);
            }
            (View::Metrics, KeyCode::Down) => {
                if self.series_index + 1 < series_count(content) {
                    self.series_index += 1;
                }
            }
            (View::Distributions, KeyCode::Up) => self.cycle_client(content, -1),
            (View::Distributions, KeyCode::Down) => self.cycle_client(content, 1),
            (View::Distributions, KeyCode::Left) => self.cycle_loader(content, -1),
            (View::Distributions, KeyCode::Right) => self.cycle_loader(content, 1),
            _ => {}
        }
    }

    /// Render the full dashboard layout.
    fn render(&self, frame: &mut Frame, snapshot: &StoreSnapshot) {
        let active = self.selected_exp.as_deref();
        let content = self.active_content(snapshot);

        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Status bar
                Constraint::Length(2), // View tabs + experiment strip
                Constraint::Min(10),   // Active view
                Constraint::Length(7), // Event log
            ])
            .split(frame.area());

        self.render_status_bar(frame, outer[0], snapshot, active, content);
        self.render_tab_bar(frame, outer[1], snapshot);
        match self.view {
            View::Metrics => self.render_metrics(frame, outer[2], content),
            View::Topology => self.render_topology(frame, outer[2], content),
            View::Distributions => self.render_distributions(frame, outer[2], content),
            View::Metadata => self.render_metadata(frame, outer[2], content),
        }
        self.render_event_log(frame, outer[3]);
    }

    /// Render the top status bar.
    fn render_status_bar(
        &self,
        frame: &mut Frame,
        area: Rect,
        snapshot: &StoreSnapshot,
        active: Option<&str>,
        content: Option<&ExperimentContent>,
    ) {
        let block = Block::default()
            .title(" FedScope Console ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));

        let (feed_text, feed_color) = match self.feed_live {
            None => ("Connecting", Color::Yellow),
            Some(true) => ("Live", Color::Green),
            Some(false) => ("Down", Color::Red),
        };
        let last_round = content
            .and_then(ExperimentContent::latest_round)
            .map(|round| round.to_string())
            .unwrap_or_else(|| "-".to_string());
        let dropped = snapshot.dropped_unknown();

        let mut spans = vec![
            Span::styled("  Experiment: ", Style::default().fg(Color::Gray)),
            Span::styled(
                active.unwrap_or("-").to_string(),
                Style::default().fg(Color::White),
            ),
            Span::styled("  |  Feed: ", Style::default().fg(Color::Gray)),
            Span::styled(feed_text, Style::default().fg(feed_color)),
            Span::styled("  |  Experiments: ", Style::default().fg(Color::Gray)),
            Span::styled(
                snapshot.len().to_string(),
                Style::default().fg(Color::Green),
            ),
            Span::styled("  |  Last round: ", Style::default().fg(Color::Gray)),
            Span::styled(last_round, Style::default().fg(Color::Magenta)),
            Span::styled("  |  Dropped: ", Style::default().fg(Color::Gray)),
            Span::styled(
                dropped.to_string(),
                Style::default().fg(if dropped > 0 {
                    Color::Yellow
                } else {
                    Color::DarkGray
                }),
            ),
        ];
        if self.reload_in_flight {
            spans.push(Span::styled(
                "  |  Reloading...",
                Style::default().fg(Color::Yellow),
            ));
        }

        frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
    }

    /// Render the view tab strip, key hints, and the experiment strip.
    fn render_tab_bar(&self, frame: &mut Frame, area: Rect, snapshot: &StoreSnapshot) {
        let mut tabs = vec![Span::raw(" ")];
        for (i, view) in View::ALL.iter().enumerate() {
            let label = format!(" {}:{} ", i + 1, view.title());
            tabs.push(if *view == self.view {
                Span::styled(
                    label,
                    Style::default().fg(Color::Black).bg(Color::Cyan),
                )
            } else {
                Span::styled(label, Style::default().fg(Color::DarkGray))
            });
        }
        tabs.push(Span::styled(
            "   [ ]: experiment  r: reload  e: export  q: quit",
            Style::default().fg(Color::DarkGray),
        ));

        let mut experiments = vec![Span::styled(
            "  Experiments: ",
            Style::default().fg(Color::Gray),
        )];
        if snapshot.is_empty() {
            experiments.push(Span::styled("(none)", Style::default().fg(Color::DarkGray)));
        }
        for exp_id in snapshot.experiment_ids() {
            let style = if self.selected_exp.as_deref() == Some(exp_id) {
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            experiments.push(Span::styled(format!("{exp_id}  "), style));
        }

        frame.render_widget(
            Paragraph::new(vec![Line::from(tabs), Line::from(experiments)]),
            area,
        );
    }

    /// Render the metrics view: grouped series list plus one chart.
    fn render_metrics(&self, frame: &mut Frame, area: Rect, content: Option<&ExperimentContent>) {
        let Some(content) = content.filter(|content| !content.metrics.is_empty()) else {
            empty_panel(
                frame,
                area,
                " Metrics ",
                "No metric series yet. Waiting for the backend...",
            );
            return;
        };

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(36), // Series list
                Constraint::Min(30),    // Chart
            ])
            .split(area);

        self.render_series_list(frame, columns[0], content);
        self.render_series_chart(frame, columns[1], content);
    }

    /// Render the grouped series list panel.
    fn render_series_list(&self, frame: &mut Frame, area: Rect, content: &ExperimentContent) {
        let block = Block::default()
            .title(" Series ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White));

        let groups = group_by_role(content);
        let sections = [
            ("Central Server", &groups.central),
            ("Edge Servers", &groups.edge),
            ("Clients", &groups.clients),
        ];

        let mut lines: Vec<Line> = Vec::new();
        let mut selected_line = 0usize;
        let mut index = 0usize;
        for (title, series) in sections {
            if series.is_empty() {
                continue;
            }
            lines.push(Line::from(Span::styled(
                format!(" {title}"),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )));
            for (key, samples) in series {
                let selected = index == self.series_index;
                if selected {
                    selected_line = lines.len();
                }
                let marker = if selected { " > " } else { "   " };
                let style = if selected {
                    Style::default()
                        .fg(Color::White)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Gray)
                };
                let text = match samples.last() {
                    Some(last) => format!(
                        "{key}  r{} {:.2}/{:.2}",
                        last.round, last.accuracy, last.loss
                    ),
                    None => key.to_string(),
                };
                lines.push(Line::from(vec![
                    Span::styled(marker, Style::default().fg(Color::Green)),
                    Span::styled(text, style),
                ]));
                index += 1;
            }
        }

        // Keep the selection visible.
        let visible_height = area.height.saturating_sub(2) as usize;
        let skip = (selected_line + 1).saturating_sub(visible_height);
        let visible: Vec<Line> = lines.into_iter().skip(skip).take(visible_height).collect();

        frame.render_widget(Paragraph::new(visible).block(block), area);
    }

    /// Render accuracy and loss of the selected series.
    fn render_series_chart(&self, frame: &mut Frame, area: Rect, content: &ExperimentContent) {
        let ordered = ordered_series(content);
        let Some((key, samples)) = ordered.get(self.series_index).copied() else {
            empty_panel(frame, area, " Chart ", "No series selected.");
            return;
        };

        let accuracy: Vec<(f64, f64)> = samples
            .iter()
            .map(|sample| (sample.round as f64, sample.accuracy))
            .collect();
        let loss: Vec<(f64, f64)> = samples
            .iter()
            .map(|sample| (sample.round as f64, sample.loss))
            .collect();

        let first = samples.iter().map(|s| s.round).min().unwrap_or(0) as f64;
        let last = samples.iter().map(|s| s.round).max().unwrap_or(0);
        let x_max = (last as f64).max(first + 1.0);

        let datasets = vec![
            Dataset::default()
                .name("accuracy")
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(Color::Green))
                .data(&accuracy),
            Dataset::default()
                .name("loss")
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(Color::Red))
                .data(&loss),
        ];

        let chart = Chart::new(datasets)
            .block(
                Block::default()
                    .title(format!(" {key}  (last round {last}) "))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::White)),
            )
            .x_axis(
                Axis::default()
                    .title("round")
                    .style(Style::default().fg(Color::Gray))
                    .bounds([first, x_max])
                    .labels(vec![
                        Line::from(format!("{}", first as u64)),
                        Line::from(format!("{}", x_max as u64)),
                    ]),
            )
            .y_axis(
                Axis::default()
                    .style(Style::default().fg(Color::Gray))
                    .bounds([0.0, 1.0])
                    .labels(vec![
                        Line::from("0.0"),
                        Line::from("0.5"),
                        Line::from("1.0"),
                    ]),
            );

        frame.render_widget(chart, area);
    }

    /// Render the derived topology as layered boxes.
    fn render_topology(&self, frame: &mut Frame, area: Rect, content: Option<&ExperimentContent>) {
        let Some(content) = content.filter(|content| !content.topology.is_empty()) else {
            empty_panel(frame, area, " Topology ", "No topology reported.");
            return;
        };

        let graph = derive_graph(&content.topology);
        if graph.is_empty() {
            empty_panel(
                frame,
                area,
                " Topology ",
                "No coordinator in the reported topology.",
            );
            return;
        }

        let config = LayoutConfig::default();
        let layouted = layout(&graph, &config);

        let canvas = Canvas::default()
            .block(
                Block::default()
                    .title(" Topology ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow)),
            )
            .marker(symbols::Marker::Braille)
            .x_bounds([0.0, layouted.width])
            .y_bounds([0.0, layouted.height])
            .paint(|ctx| paint_topology(ctx, &layouted, &config));

        frame.render_widget(canvas, area);
    }

    /// Render the distributions view: selection lists plus a histogram.
    fn render_distributions(
        &self,
        frame: &mut Frame,
        area: Rect,
        content: Option<&ExperimentContent>,
    ) {
        let Some(content) = content.filter(|content| !content.distributions.is_empty()) else {
            empty_panel(
                frame,
                area,
                " Data Distributions ",
                "No distributions reported yet.",
            );
            return;
        };

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(30), // Client and loader selection
                Constraint::Min(24),    // Histogram
            ])
            .split(area);

        self.render_selection_lists(frame, columns[0], content);
        self.render_distribution_chart(frame, columns[1], content);
    }

    fn render_selection_lists(&self, frame: &mut Frame, area: Rect, content: &ExperimentContent) {
        let block = Block::default()
            .title(" Data Distributions ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta));

        let section = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);

        let mut lines = vec![Line::from(Span::styled(" Clients (Up/Down)", section))];
        for client in content.distributions.keys() {
            lines.push(selection_line(
                client,
                self.selector.client() == Some(client.as_str()),
            ));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(" Loaders (Left/Right)", section)));
        for loader in self.selector.loader_ids(&content.distributions) {
            lines.push(selection_line(
                loader,
                self.selector.loader() == Some(loader),
            ));
        }

        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_distribution_chart(
        &self,
        frame: &mut Frame,
        area: Rect,
        content: &ExperimentContent,
    ) {
        match self.selector.current(&content.distributions) {
            Selection::None => {
                let block = Block::default()
                    .title(" Histogram ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::DarkGray));
                let lines = vec![
                    Line::from(""),
                    Line::from(Span::styled(
                        "  No data selected.",
                        Style::default().fg(Color::DarkGray),
                    )),
                    Line::from(Span::styled(
                        "  Press Down to pick a client.",
                        Style::default().fg(Color::DarkGray),
                    )),
                ];
                frame.render_widget(Paragraph::new(lines).block(block), area);
            }
            Selection::Missing => {
                let block = Block::default()
                    .title(" Histogram ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow));
                let lines = vec![
                    Line::from(""),
                    Line::from(Span::styled(
                        "  Loader data missing.",
                        Style::default().fg(Color::Yellow),
                    )),
                ];
                frame.render_widget(Paragraph::new(lines).block(block), area);
            }
            Selection::Entry(distribution) => {
                let data: Vec<(&str, u64)> = distribution
                    .label_distribution
                    .iter()
                    .map(|(label, count)| (label.as_str(), *count))
                    .collect();
                let title = format!(
                    " {}  ({} items) ",
                    self.selector.loader().unwrap_or("-"),
                    distribution.num_items
                );
                let chart = BarChart::default()
                    .block(
                        Block::default()
                            .title(title)
                            .borders(Borders::ALL)
                            .border_style(Style::default().fg(Color::White)),
                    )
                    .data(&data)
                    .bar_width(4)
                    .bar_gap(1)
                    .bar_style(Style::default().fg(Color::LightBlue))
                    .value_style(Style::default().fg(Color::Black).bg(Color::LightBlue));
                frame.render_widget(chart, area);
            }
        }
    }

    /// Render the metadata table.
    fn render_metadata(&self, frame: &mut Frame, area: Rect, content: Option<&ExperimentContent>) {
        let Some(content) = content.filter(|content| !content.metadata.is_empty()) else {
            empty_panel(frame, area, " Run Metadata ", "No metadata.");
            return;
        };

        let rows: Vec<Row> = content
            .metadata
            .iter()
            .map(|(key, value)| {
                Row::new(vec![
                    Cell::from(Span::styled(
                        format!("  {key}"),
                        Style::default().fg(Color::Cyan),
                    )),
                    Cell::from(Span::styled(
                        export::display_value(value),
                        Style::default().fg(Color::White),
                    )),
                ])
            })
            .collect();

        let table = Table::new(
            rows,
            [Constraint::Percentage(30), Constraint::Percentage(70)],
        )
        .block(
            Block::default()
                .title(" Run Metadata ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White)),
        )
        .header(
            Row::new(vec!["  Key", "Value"])
                .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD)),
        );

        frame.render_widget(table, area);
    }

    /// Render the event log panel.
    fn render_event_log(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(" Events ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White));

        let inner_height = area.height.saturating_sub(2) as usize;

        // Show the most recent messages that fit.
        let start = self.messages.len().saturating_sub(inner_height);
        let lines: Vec<Line> = self.messages[start..]
            .iter()
            .map(|(ts, msg, color)| {
                Line::from(vec![
                    Span::styled(
                        format!("  [{}] ", ts.format("%H:%M:%S")),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::styled(msg.as_str(), Style::default().fg(*color)),
                ])
            })
            .collect();

        frame.render_widget(Paragraph::new(lines).block(block), area);
    }
}

/// Number of series the metrics view can select. Keys outside the three
/// known role prefixes are not listed, so they do not count.
fn series_count(content: &ExperimentContent) -> usize {
    group_by_role(content).len()
}

/// Series of one experiment in display order: central, then edges, then
/// clients.
fn ordered_series(content: &ExperimentContent) -> Vec<(&SeriesKey, &[MetricSample])> {
    let groups = group_by_role(content);
    let mut ordered = Vec::with_capacity(groups.len());
    ordered.extend(groups.central);
    ordered.extend(groups.edge);
    ordered.extend(groups.clients);
    ordered
}

/// Step through `items` from `current`, wrapping at both ends.
fn next_in<'a>(items: &[&'a str], current: Option<&str>, step: isize) -> Option<&'a str> {
    if items.is_empty() {
        return None;
    }
    let len = items.len() as isize;
    let position = current.and_then(|current| items.iter().position(|item| *item == current));
    let next = match position {
        Some(position) => (position as isize + step).rem_euclid(len),
        None if step < 0 => len - 1,
        None => 0,
    };
    items.get(next as usize).copied()
}

fn selection_line(label: &str, selected: bool) -> Line<'static> {
    let marker = if selected { " > " } else { "   " };
    let style = if selected {
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };
    Line::from(vec![
        Span::styled(marker, Style::default().fg(Color::Green)),
        Span::styled(label.to_string(), style),
    ])
}

/// Draw edges then node boxes; layout y grows downward, canvas y upward.
fn paint_topology(ctx: &mut CanvasContext, layouted: &LayoutedGraph, config: &LayoutConfig) {
    let flip = |y: f64| layouted.height - y;

    for edge in &layouted.edges {
        let (Some(source), Some(target)) =
            (layouted.node(&edge.source), layouted.node(&edge.target))
        else {
            continue;
        };
        let (x1, y1) = source.source_point(config);
        let (x2, y2) = target.target_point(config);
        match edge.style {
            EdgeStyle::Solid => ctx.draw(&CanvasLine {
                x1,
                y1: flip(y1),
                x2,
                y2: flip(y2),
                color: Color::Gray,
            }),
            EdgeStyle::Dashed => {
                for ((sx, sy), (ex, ey)) in
                    dash_segments((x1, flip(y1)), (x2, flip(y2)), DASH_LEN, DASH_GAP)
                {
                    ctx.draw(&CanvasLine {
                        x1: sx,
                        y1: sy,
                        x2: ex,
                        y2: ey,
                        color: Color::DarkGray,
                    });
                }
            }
        }
    }

    for positioned in &layouted.nodes {
        let color = kind_color(positioned.node.kind);
        ctx.draw(&Rectangle {
            x: positioned.x,
            y: flip(positioned.y) - config.node_height,
            width: config.node_width,
            height: config.node_height,
            color,
        });
        ctx.print(
            positioned.x + 8.0,
            flip(positioned.y) - config.node_height / 2.0,
            Line::from(Span::styled(
                positioned.node.label.clone(),
                Style::default().fg(color),
            )),
        );
    }
}

/// Split a line into dash segments of `dash` length separated by `gap`.
fn dash_segments(
    from: (f64, f64),
    to: (f64, f64),
    dash: f64,
    gap: f64,
) -> Vec<((f64, f64), (f64, f64))> {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let length = (dx * dx + dy * dy).sqrt();
    if length < f64::EPSILON {
        return Vec::new();
    }
    let (ux, uy) = (dx / length, dy / length);

    let mut segments = Vec::new();
    let mut start = 0.0;
    while start < length {
        let end = (start + dash).min(length);
        segments.push((
            (from.0 + ux * start, from.1 + uy * start),
            (from.0 + ux * end, from.1 + uy * end),
        ));
        start = end + gap;
    }
    segments
}

fn kind_color(kind: NodeKind) -> Color {
    match kind {
        NodeKind::Server => Color::Red,
        NodeKind::Edge => Color::Yellow,
        NodeKind::Client => Color::Green,
    }
}

fn empty_panel(frame: &mut Frame, area: Rect, title: &str, text: &str) {
    let block = Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("  {text}"),
            Style::default().fg(Color::DarkGray),
        )),
    ];
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// Set up the terminal for TUI rendering.
fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Run the dashboard event loop until the operator quits.
pub async fn run_dashboard_console(
    store: StoreHandle,
    client: BackendClient,
    config: ConsoleConfig,
    events_tx: mpsc::UnboundedSender<ConsoleEvent>,
    mut events_rx: mpsc::UnboundedReceiver<ConsoleEvent>,
) -> Result<(), anyhow::Error> {
    use std::io::IsTerminal;
    if !io::stdin().is_terminal() || !io::stdout().is_terminal() {
        return Err(anyhow::anyhow!("the dashboard requires a terminal (TTY)"));
    }

    // Set up panic hook to restore terminal.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let mut terminal = setup_terminal()?;
    let tick = config.tick;
    let mut console = DashboardConsole::new(store, client, config, events_tx);

    loop {
        console.drain_events(&mut events_rx);
        let snapshot = console.store.snapshot();
        console.reconcile(&snapshot);

        terminal.draw(|frame| console.render(frame, &snapshot))?;

        if event::poll(tick)? {
            if let Event::Key(key_event) = event::read()? {
                if key_event.kind == KeyEventKind::Press
                    && console.handle_key(key_event.code, key_event.modifiers, &snapshot)
                {
                    break;
                }
            }
        }
    }

    restore_terminal(&mut terminal)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedscope_protocol::Role;

    #[test]
    fn view_cycle_visits_every_view_and_wraps() {
        let mut view = View::Metrics;
        let mut seen = Vec::new();
        for _ in 0..View::ALL.len() {
            seen.push(view);
            view = view.next();
        }
        assert_eq!(seen, View::ALL.to_vec());
        assert_eq!(view, View::Metrics);
        assert_eq!(View::Metrics.previous(), View::Metadata);
    }

    #[test]
    fn next_in_wraps_both_directions() {
        let items = ["a", "b", "c"];
        assert_eq!(next_in(&items, Some("c"), 1), Some("a"));
        assert_eq!(next_in(&items, Some("a"), -1), Some("c"));
        assert_eq!(next_in(&items, Some("a"), 1), Some("b"));
    }

    #[test]
    fn next_in_enters_the_list_from_either_end() {
        let items = ["a", "b", "c"];
        assert_eq!(next_in(&items, None, 1), Some("a"));
        assert_eq!(next_in(&items, None, -1), Some("c"));
        // An id that vanished behaves like no selection.
        assert_eq!(next_in(&items, Some("gone"), 1), Some("a"));
        assert_eq!(next_in(&[], None, 1), None);
    }

    #[test]
    fn ordered_series_groups_central_edge_clients() {
        let mut content = ExperimentContent::default();
        for (role, device) in [
            (Role::Client, "c0"),
            (Role::Edge, "e0"),
            (Role::Central, "Central"),
            (Role::Client, "c1"),
        ] {
            content
                .metrics
                .insert(SeriesKey::new(role, device), Vec::new());
        }

        let keys: Vec<&str> = ordered_series(&content)
            .iter()
            .map(|(key, _)| key.as_str())
            .collect();
        assert_eq!(
            keys,
            vec!["central-Central", "edge-e0", "client-c0", "client-c1"]
        );
    }

    #[test]
    fn dash_segments_alternate_and_cover_the_line() {
        let segments = dash_segments((0.0, 0.0), (100.0, 0.0), 8.0, 6.0);
        assert!(!segments.is_empty());
        assert_eq!(segments[0], ((0.0, 0.0), (8.0, 0.0)));
        assert_eq!(segments[1].0 .0, 14.0);
        // Each dash is at most the dash length and ends within the line.
        for ((sx, _), (ex, _)) in &segments {
            assert!(ex - sx <= 8.0 + 1e-9);
            assert!(*ex <= 100.0 + 1e-9);
        }
    }

    #[test]
    fn series_bounds_ignore_keys_without_a_role_prefix() {
        let mut content = ExperimentContent::default();
        content
            .metrics
            .insert(SeriesKey::new(Role::Client, "c0"), Vec::new());
        content
            .metrics
            .insert(SeriesKey::from_raw("aggregator-x"), Vec::new());

        // Navigation clamps against what the list shows, not the raw map.
        assert_eq!(series_count(&content), 1);
        assert_eq!(ordered_series(&content).len(), series_count(&content));
        assert!(series_count(&content) < content.metrics.len());
    }

    #[test]
    fn dash_segments_of_a_point_are_empty() {
        assert!(dash_segments((5.0, 5.0), (5.0, 5.0), 8.0, 6.0).is_empty());
    }
}
