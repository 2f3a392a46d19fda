use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use eframe::egui::{self, Align, Layout};
use egui_extras::{Column, TableBuilder};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::feed::{self, FeedHandle, FeedSource};
use crate::filter::Blacklist;
use crate::ingest::{AcceptConfig, FilterStats, ResultInbox, SinkHandle};
use crate::model::{Pump, SearchModel, ViewEvent};
use crate::query::{SearchMode, parse_input};
use crate::record::{ContentHash, SearchRecord};
use crate::sort::{SortColumn, SortConfig, SortOrder};
use crate::transfer::{self, MemoryQueue, ShareIndex};
use crate::tree::NodeId;
use crate::util::{make_magnet, new_token};

const COLUMN_COUNT: usize = 13;
const DEFAULT_COLUMN_WIDTHS: [f32; COLUMN_COUNT] = [
    52.0, 260.0, 48.0, 90.0, 110.0, 150.0, 220.0, 120.0, 70.0, 70.0, 110.0, 140.0, 160.0,
];

const UI_STATE_VERSION: u32 = 1;

/// How long after firing a search we keep showing "receiving results".
const RESULT_WAIT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub download_dir: PathBuf,
    pub feed: Option<FeedSource>,
    pub strict_dedup: bool,
    pub sort_workers: Option<usize>,
    pub blacklist: Vec<String>,
    pub state_path: Option<PathBuf>,
    pub initial_search: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_dir: dirs::download_dir().unwrap_or_else(std::env::temp_dir),
            feed: None,
            strict_dedup: false,
            sort_workers: None,
            blacklist: Vec::new(),
            state_path: None,
            initial_search: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedUiState {
    version: u32,
    sort_column: SortColumn,
    sort_order: SortOrder,
    column_widths: Vec<f32>,
    search_mode: SearchMode,
    hide_shared: bool,
    free_slots_only: bool,
}

enum RowAction {
    Expand(NodeId),
    Collapse(NodeId),
    Download(NodeId),
    DownloadDir(NodeId),
    Remove(NodeId),
    CopyMagnet(NodeId),
}

pub struct SearchPanel {
    model: SearchModel,
    sink: SinkHandle,
    inbox_rx: Option<Receiver<SearchRecord>>,
    stop: Arc<AtomicBool>,
    stats: Arc<FilterStats>,
    share: Arc<HashSet<ContentHash>>,
    transfers: MemoryQueue,
    search_input: String,
    search_mode: SearchMode,
    hide_shared: bool,
    free_slots_only: bool,
    download_dir: PathBuf,
    session_token: String,
    search_deadline: Option<Instant>,
    status_text: Option<String>,
    last_error: Option<String>,
    column_widths: [f32; COLUMN_COUNT],
    show_layout_modal: bool,
    ui_state_path: Option<PathBuf>,
    ui_state_dirty: bool,
    ui_state_next_save: Option<Instant>,
    _feed: Option<FeedHandle>,
}

impl SearchPanel {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: AppConfig) -> Self {
        let blacklist = match Blacklist::new(&config.blacklist, Vec::new()) {
            Ok(blacklist) => blacklist,
            Err(err) => {
                warn!("invalid blacklist pattern, filtering disabled: {err}");
                Blacklist::default()
            }
        };

        let sort_config = config
            .sort_workers
            .map(|workers| SortConfig {
                workers: workers.max(1),
            })
            .unwrap_or_default();

        let mut model = SearchModel::with_sort_config(blacklist, sort_config);
        model.set_strict_dedup(config.strict_dedup);

        let sink = SinkHandle::new();
        let feed = config.feed.clone().and_then(|source| {
            match feed::spawn(source, sink.clone()) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    warn!("feed spawn failed: {err}");
                    None
                }
            }
        });

        let ui_state_path = config.state_path.clone().or_else(|| {
            dirs::config_dir().map(|dir| dir.join("hub-search").join("ui.json"))
        });

        let mut panel = Self {
            model,
            sink,
            inbox_rx: None,
            stop: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(FilterStats::default()),
            share: Arc::new(HashSet::new()),
            transfers: MemoryQueue::new(),
            search_input: config.initial_search.clone().unwrap_or_default(),
            search_mode: SearchMode::default(),
            hide_shared: false,
            free_slots_only: false,
            download_dir: config.download_dir.clone(),
            session_token: String::new(),
            search_deadline: None,
            status_text: None,
            last_error: None,
            column_widths: DEFAULT_COLUMN_WIDTHS,
            show_layout_modal: false,
            ui_state_path,
            ui_state_dirty: false,
            ui_state_next_save: None,
            _feed: feed,
        };

        panel.load_persisted_state();

        if config.initial_search.is_some() {
            panel.trigger_search();
        }

        panel
    }
}

impl eframe::App for SearchPanel {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_results(ctx);
        self.handle_events();

        egui::TopBottomPanel::top("search-bar").show(ctx, |ui| {
            self.render_search_bar(ui, ctx);
        });

        egui::TopBottomPanel::bottom("status-bar").show(ctx, |ui| {
            self.render_status_bar(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_table(ui);
        });

        self.render_layout_modal(ctx);
        self.persist_ui_state();

        // keep polling the inbox while the window is otherwise idle
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

impl SearchPanel {
    fn drain_results(&mut self, ctx: &egui::Context) {
        let mut wake = false;
        if let Some(rx) = &self.inbox_rx {
            let mut buffered = Vec::new();
            while let Ok(record) = rx.try_recv() {
                buffered.push(record);
            }
            for record in buffered {
                wake |= self.model.append_task(record);
            }
        }

        // one pump tick per frame bounds the work between repaints;
        // remaining backlog reschedules itself via repaint
        let pump = self.model.process_tasks();
        if wake || pump == Pump::Backlog {
            ctx.request_repaint();
        }
    }

    fn handle_events(&mut self) {
        for event in self.model.take_events() {
            match event {
                ViewEvent::ExpandRequest { node } => self.model.expand(node),
                ViewEvent::UpdateStatus => self.refresh_status(),
                _ => {}
            }
        }
    }

    fn refresh_status(&mut self) {
        let counters = self.model.counters();
        self.status_text = Some(format!(
            "{} results ({} unique, {} dropped)",
            counters.results, counters.unique, counters.dropped
        ));
    }

    fn trigger_search(&mut self) {
        let query = parse_input(&self.search_input, self.search_mode);
        if query.is_empty() {
            return;
        }

        self.stop.store(false, Ordering::SeqCst);
        self.stats.reset();
        self.session_token = new_token();
        self.model.clear();
        self.model.set_search_kind(query.kind.clone());
        self.search_deadline = Some(Instant::now() + RESULT_WAIT);
        self.last_error = None;
        self.status_text = Some(format!("Searching for {}…", query.raw));

        let share: Arc<dyn ShareIndex + Send + Sync> = self.share.clone();
        let (inbox, rx) = ResultInbox::new(
            AcceptConfig {
                query,
                token: self.session_token.clone(),
                hide_shared: self.hide_shared,
                free_slots_only: self.free_slots_only,
            },
            Some(share),
            self.stop.clone(),
            self.stats.clone(),
        );
        self.sink.install(inbox);
        self.inbox_rx = Some(rx);
    }

    fn stop_search(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.search_deadline = None;
        self.refresh_status();
    }

    fn schedule_ui_state_save(&mut self) {
        self.ui_state_dirty = true;
        self.ui_state_next_save = Some(Instant::now() + Duration::from_millis(400));
    }

    fn load_persisted_state(&mut self) {
        let Some(path) = self.ui_state_path.clone() else {
            return;
        };

        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(_) => return,
        };

        let state = match serde_json::from_str::<PersistedUiState>(&json) {
            Ok(state) if state.version == UI_STATE_VERSION => state,
            Ok(state) => {
                warn!(
                    "ui state version mismatch ({} vs {UI_STATE_VERSION})",
                    state.version
                );
                return;
            }
            Err(err) => {
                warn!("ui state parse error: {err}");
                return;
            }
        };

        self.model.sort(state.sort_column, state.sort_order);
        self.search_mode = state.search_mode;
        self.hide_shared = state.hide_shared;
        self.free_slots_only = state.free_slots_only;
        if state.column_widths.len() == COLUMN_COUNT {
            for (slot, value) in self.column_widths.iter_mut().zip(state.column_widths) {
                *slot = value;
            }
        }
    }

    fn persist_ui_state(&mut self) {
        if !self.ui_state_dirty {
            return;
        }

        if let Some(deadline) = self.ui_state_next_save {
            if Instant::now() < deadline {
                return;
            }
        }

        let Some(path) = self.ui_state_path.clone() else {
            self.ui_state_dirty = false;
            return;
        };

        let state = PersistedUiState {
            version: UI_STATE_VERSION,
            sort_column: self.model.sort_column(),
            sort_order: self.model.sort_order(),
            column_widths: self.column_widths.to_vec(),
            search_mode: self.search_mode,
            hide_shared: self.hide_shared,
            free_slots_only: self.free_slots_only,
        };

        match serde_json::to_string(&state) {
            Ok(json) => {
                if let Some(parent) = path.parent() {
                    let _ = fs::create_dir_all(parent);
                }
                if let Err(err) = fs::write(&path, json) {
                    self.last_error = Some(format!("Failed to persist UI state: {err}"));
                } else {
                    self.ui_state_dirty = false;
                    self.ui_state_next_save = None;
                }
            }
            Err(err) => {
                self.last_error = Some(format!("Failed to serialise UI state: {err}"));
            }
        }
    }

    fn render_search_bar(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.with_layout(Layout::left_to_right(Align::Center), |ui| {
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.search_input)
                    .hint_text("Search terms, -excluded, or a TTH: hash")
                    .desired_width(320.0),
            );

            let pressed_enter =
                response.lost_focus() && ctx.input(|i| i.key_pressed(egui::Key::Enter));
            if pressed_enter {
                ctx.memory_mut(|mem| mem.request_focus(response.id));
                self.trigger_search();
            }

            if ui.button("Search").clicked() {
                self.trigger_search();
            }
            if ui.button("Stop").clicked() {
                self.stop_search();
            }

            ui.add_space(12.0);
            let mode_label = match self.search_mode {
                SearchMode::Any => "Type: Any",
                SearchMode::Directories => "Type: Folders",
            };
            if ui.button(mode_label).clicked() {
                self.search_mode = match self.search_mode {
                    SearchMode::Any => SearchMode::Directories,
                    SearchMode::Directories => SearchMode::Any,
                };
                self.schedule_ui_state_save();
            }

            ui.add_space(12.0);
            if ui
                .checkbox(&mut self.hide_shared, "Hide shared")
                .changed()
            {
                self.schedule_ui_state_save();
            }
            if ui
                .checkbox(&mut self.free_slots_only, "Free slots only")
                .changed()
            {
                self.schedule_ui_state_save();
            }

            ui.add_space(8.0);
            if ui.button("Layout").clicked() {
                self.show_layout_modal = true;
            }
        });
    }

    fn collect_rows(&self) -> Vec<(NodeId, usize)> {
        let tree = self.model.tree();
        let mut rows = Vec::new();
        for group in tree.children(tree.root()) {
            rows.push((*group, 0));
            if tree.is_expanded(*group) {
                for child in tree.children(*group) {
                    rows.push((*child, 1));
                }
            }
        }
        rows
    }

    fn render_table(&mut self, ui: &mut egui::Ui) {
        let rows = self.collect_rows();
        if rows.is_empty() {
            ui.label("No results yet.");
            return;
        }

        let mut action: Option<RowAction> = None;
        let mut sort_clicked: Option<SortColumn> = None;

        egui::ScrollArea::both()
            .auto_shrink([false, false])
            .show(ui, |scroll_ui| {
                let mut table = TableBuilder::new(scroll_ui).striped(true);
                for width in self.column_widths {
                    table = table.column(Column::exact(width).clip(true));
                }

                let active_column = self.model.sort_column();
                let active_order = self.model.sort_order();

                table
                    .header(24.0, |mut header| {
                        for column in SortColumn::ALL {
                            header.col(|ui| {
                                let marker = if column == active_column {
                                    match active_order {
                                        SortOrder::Ascending => " ↑",
                                        SortOrder::Descending => " ↓",
                                    }
                                } else {
                                    ""
                                };
                                if ui
                                    .add(
                                        egui::Button::new(format!("{}{marker}", column.label()))
                                            .frame(false),
                                    )
                                    .clicked()
                                {
                                    sort_clicked = Some(column);
                                }
                            });
                        }
                    })
                    .body(|body| {
                        let row_count = rows.len();
                        body.rows(22.0, row_count, |mut table_row| {
                            let (node, depth) = rows[table_row.index()];
                            let tree = self.model.tree();
                            let is_group = tree.has_children(node);
                            let is_expanded = tree.is_expanded(node);

                            table_row.col(|ui| {
                                ui.add_space((depth as f32) * 14.0);
                                if is_group {
                                    let icon = if is_expanded { "▾" } else { "▸" };
                                    let button = egui::Button::new(icon)
                                        .frame(false)
                                        .min_size(egui::vec2(16.0, 16.0));
                                    if ui.add(button).clicked() {
                                        action = Some(if is_expanded {
                                            RowAction::Collapse(node)
                                        } else {
                                            RowAction::Expand(node)
                                        });
                                    }
                                }
                                ui.label(self.model.display_text(node, SortColumn::HitCount));
                            });

                            for column in &SortColumn::ALL[1..] {
                                table_row.col(|ui| {
                                    let response =
                                        ui.label(self.model.display_text(node, *column));
                                    if *column == SortColumn::FileName {
                                        response.context_menu(|ui| {
                                            if ui.button("Download").clicked() {
                                                action = Some(RowAction::Download(node));
                                                ui.close_menu();
                                            }
                                            if ui.button("Download folder").clicked() {
                                                action = Some(RowAction::DownloadDir(node));
                                                ui.close_menu();
                                            }
                                            if ui.button("Copy magnet").clicked() {
                                                action = Some(RowAction::CopyMagnet(node));
                                                ui.close_menu();
                                            }
                                            ui.separator();
                                            if ui.button("Remove").clicked() {
                                                action = Some(RowAction::Remove(node));
                                                ui.close_menu();
                                            }
                                        });
                                    }
                                });
                            }
                        });
                    });
            });

        if let Some(column) = sort_clicked {
            let order = if column == self.model.sort_column() {
                self.model.sort_order().toggled()
            } else {
                SortOrder::Descending
            };
            self.model.sort(column, order);
            self.schedule_ui_state_save();
        }

        if let Some(action) = action {
            self.apply_row_action(action, ui.ctx());
        }
    }

    fn apply_row_action(&mut self, action: RowAction, ctx: &egui::Context) {
        match action {
            RowAction::Expand(node) => self.model.expand(node),
            RowAction::Collapse(node) => self.model.collapse(node),
            RowAction::Download(node) => {
                match transfer::download(
                    self.model.tree(),
                    node,
                    &self.download_dir,
                    &self.transfers,
                ) {
                    Ok(count) => {
                        self.status_text = Some(format!("Queued {count} source(s)"));
                    }
                    Err(err) => {
                        self.last_error = Some(err.to_string());
                    }
                }
            }
            RowAction::DownloadDir(node) => {
                if let Err(err) = transfer::download_whole(
                    self.model.tree(),
                    node,
                    &self.download_dir,
                    &self.transfers,
                ) {
                    self.last_error = Some(err.to_string());
                }
            }
            RowAction::CopyMagnet(node) => {
                if let Some(record) = self.model.tree().record(node) {
                    if let Some(hash) = &record.hash {
                        let magnet = make_magnet(record.file_name(), record.size, hash);
                        ctx.output_mut(|out| out.copied_text = magnet);
                    }
                }
            }
            RowAction::Remove(node) => {
                let tree = self.model.tree();
                let parent = tree.parent(node).unwrap_or_else(|| tree.root());
                let row = tree.row_of(node);
                self.model.remove_rows(parent, row, 1);
                self.refresh_status();
            }
        }
    }

    fn render_status_bar(&mut self, ui: &mut egui::Ui) {
        if let Some(deadline) = self.search_deadline {
            if Instant::now() >= deadline {
                self.search_deadline = None;
                self.refresh_status();
            }
        }

        ui.with_layout(Layout::left_to_right(Align::Center), |ui| {
            if let Some(deadline) = self.search_deadline {
                let left = deadline.saturating_duration_since(Instant::now());
                ui.label(format!("Receiving results… {}s", left.as_secs()));
            } else if let Some(status) = &self.status_text {
                ui.label(status);
            } else {
                ui.label("Ready");
            }

            if let Some(error) = &self.last_error {
                ui.add_space(12.0);
                ui.colored_label(egui::Color32::from_rgb(200, 64, 64), error);
            }

            let backlog = self.model.backlog();
            if backlog > 0 {
                ui.add_space(16.0);
                ui.label(format!("backlog: {backlog}"));
            }

            ui.add_space(16.0);
            ui.label(format!(
                "filter: {} accepted, {} rejected",
                self.stats.accepted(),
                self.stats.rejected()
            ));
        });
    }

    fn render_layout_modal(&mut self, ctx: &egui::Context) {
        if !self.show_layout_modal {
            return;
        }

        let mut open_flag = true;
        egui::Window::new("Layout Settings")
            .collapsible(false)
            .resizable(false)
            .open(&mut open_flag)
            .show(ctx, |ui| {
                ui.label("Column widths (points):");
                ui.add_space(8.0);
                for (index, column) in SortColumn::ALL.iter().enumerate() {
                    let mut value = self.column_widths[index];
                    let mut changed = false;
                    ui.horizontal(|ui| {
                        ui.label(column.label());
                        let response = ui.add(
                            egui::DragValue::new(&mut value)
                                .clamp_range(20.0..=800.0)
                                .speed(4.0),
                        );
                        if response.changed() {
                            changed = true;
                        }
                    });
                    if changed {
                        self.column_widths[index] = value;
                        self.schedule_ui_state_save();
                    }
                }

                ui.add_space(12.0);
                ui.separator();
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Reset layout").clicked() {
                        self.column_widths = DEFAULT_COLUMN_WIDTHS;
                        self.schedule_ui_state_save();
                    }
                    if ui.button("Close").clicked() {
                        self.show_layout_modal = false;
                    }
                });
            });

        if !open_flag {
            self.show_layout_modal = false;
        }
    }
}
