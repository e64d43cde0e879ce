//! Top-level view controller.
//!
//! The explicit context object that owns the record store, track registry,
//! selection set and query adapter — there is no module-global state. The
//! host feeds it events (feed loaded, track ready or failed, hover, click,
//! drag-box, list click, visibility toggles) and applies the returned
//! [`ViewCommand`]s; every UI side effect is a command, so the highlight
//! invariant (highlighted exactly when selected) is enforced in one place,
//! the selection-event diff.

use std::io;

use log::{debug, warn};
use serde::Serialize;

use crate::error::ActivityMapError;
use crate::query::{DragSelectMode, SpatialQuery};
use crate::selection::{SelectionChange, SelectionEvent, SelectionSet};
use crate::store::{ActivityRecord, ActivityStore, TrackFileIndex};
use crate::summary::{detail, nice_date, summarize};
use crate::tracks::{BoundsQuery, TrackConfig, TrackRegistry};
use crate::{ActivityId, ActivityType, Extent, MapPoint};

/// One UI side effect for the host to apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ViewCommand {
    /// Fit the map view to an extent
    FitView(Extent),
    /// Turn a track's highlight style on or off
    SetHighlight { activity_id: ActivityId, on: bool },
    /// Turn a list entry's selected background on or off
    SetListBackground { activity_id: ActivityId, on: bool },
    /// Show or hide a track layer
    SetTrackVisible {
        activity_id: ActivityId,
        visible: bool,
    },
    /// Replace the info panel text
    ShowInfo(String),
}

/// One activity list entry, in feed order.
#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub id: ActivityId,
    pub label: String,
    pub activity_type: ActivityType,
}

/// Counters for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct ViewStats {
    pub activity_count: usize,
    pub track_count: usize,
    pub ready_track_count: usize,
    pub selected_count: usize,
}

/// Owns all engine state and routes host events.
#[derive(Debug, Default)]
pub struct ViewController {
    store: ActivityStore,
    registry: TrackRegistry,
    selection: SelectionSet,
    query: SpatialQuery,
    /// Most-recent activity (first retained feed row), auto-framed on load
    anchor: Option<ActivityId>,
}

impl ViewController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(track_config: TrackConfig, query: SpatialQuery) -> Self {
        Self {
            registry: TrackRegistry::with_config(track_config),
            query,
            ..Self::default()
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Populate the store from the CSV feed and attach a `Loading` track per
    /// retained record. Returns the number of records.
    ///
    /// Feed order is taken as-is: the caller guarantees
    /// chronological-descending rows, and the first retained row becomes the
    /// anchor for initial framing.
    pub fn load_feed<R: io::Read>(&mut self, reader: R, track_index: &TrackFileIndex) -> usize {
        self.store = ActivityStore::load(reader, track_index);
        self.anchor = self.store.first().cloned();

        let attachments: Vec<(ActivityId, ActivityType)> = self
            .store
            .records_in_order()
            .map(|r| (r.id.clone(), r.activity_type))
            .collect();
        for (id, activity_type) in attachments {
            self.registry.attach(&id, activity_type);
        }

        self.store.len()
    }

    /// The host's parser finished a track. The anchor activity's completion
    /// frames the view (first-activity auto-frame).
    pub fn track_ready(&mut self, activity_id: &str, points: &[MapPoint]) -> Vec<ViewCommand> {
        let extent = match self.registry.complete(activity_id, points) {
            Ok(extent) => extent,
            Err(e) => {
                warn!("{}", e);
                return Vec::new();
            }
        };

        if self.anchor.as_deref() == Some(activity_id) {
            return vec![ViewCommand::FitView(extent)];
        }
        Vec::new()
    }

    /// The host's parser gave up on a track. Logged; the track stays
    /// `Loading` and never appears.
    pub fn track_failed(&mut self, activity_id: &str, message: &str) {
        self.registry.fail(activity_id, message);
    }

    // ========================================================================
    // Pointer Events
    // ========================================================================

    /// Transient mouse-info display. Never touches the selection.
    pub fn hover(&mut self, point: MapPoint) -> Vec<ViewCommand> {
        let ids = self.query.hits_at(&mut self.registry, point);
        if ids.is_empty() {
            return Vec::new();
        }
        let records = self.records_for(&ids);
        vec![ViewCommand::ShowInfo(summarize(&records, false))]
    }

    /// Single-select click: the front-most hit replaces the selection.
    /// A miss leaves everything as it was.
    pub fn click(&mut self, point: MapPoint) -> Vec<ViewCommand> {
        let Some(id) = self.query.click(&mut self.registry, point) else {
            return Vec::new();
        };

        let mut commands = self.select_only(&id);
        commands.push(ViewCommand::ShowInfo(self.selection_text(false)));
        commands
    }

    /// Completed drag-box. `Replace` mode clears first; `Additive` only
    /// adds. Candidates not present in the store are logged no-ops.
    pub fn drag_select(&mut self, extent: Extent, view_rotation: f64) -> Vec<ViewCommand> {
        let candidates = self
            .query
            .drag_candidates(&mut self.registry, extent, view_rotation);

        let mut commands = Vec::new();
        if self.query.config.drag_mode == DragSelectMode::Replace {
            if let Some(event) = self.selection.clear() {
                commands.extend(Self::selection_commands(&event));
            }
        }

        for id in &candidates {
            if !self.store.contains(id) {
                warn!(
                    "{}",
                    ActivityMapError::UnknownActivityId {
                        activity_id: id.clone(),
                    }
                );
                continue;
            }
            if let Some(event) = self.selection.add(id) {
                commands.extend(Self::selection_commands(&event));
            }
        }

        commands.push(ViewCommand::ShowInfo(self.selection_text(true)));
        commands
    }

    // ========================================================================
    // List Events
    // ========================================================================

    /// List-entry click: single-select plus a view fit to the activity's
    /// track (skipped while the track is still loading) and the detail
    /// panel. Unknown ids are logged no-ops.
    pub fn list_click(&mut self, activity_id: &str) -> Vec<ViewCommand> {
        let Some(record) = self.store.get(activity_id) else {
            warn!(
                "{}",
                ActivityMapError::UnknownActivityId {
                    activity_id: activity_id.to_string(),
                }
            );
            return Vec::new();
        };
        let text = detail(record);

        let mut commands = self.select_only(activity_id);
        match self.registry.bounds_of(activity_id) {
            BoundsQuery::Ready(extent) => commands.push(ViewCommand::FitView(extent)),
            BoundsQuery::Pending => debug!("bounds for '{}' still pending", activity_id),
            BoundsQuery::Unknown => {}
        }
        commands.push(ViewCommand::ShowInfo(text));
        commands
    }

    /// Toggle one id in or out of the selection (multi-select lists).
    /// Unknown ids are logged no-ops.
    pub fn toggle_selection(&mut self, activity_id: &str) -> Vec<ViewCommand> {
        if !self.store.contains(activity_id) {
            warn!(
                "{}",
                ActivityMapError::UnknownActivityId {
                    activity_id: activity_id.to_string(),
                }
            );
            return Vec::new();
        }

        let event = self.selection.toggle(activity_id);
        let mut commands = Self::selection_commands(&event);
        commands.push(ViewCommand::ShowInfo(
            self.selection_text(self.selection.len() > 1),
        ));
        commands
    }

    /// Drop the whole selection.
    pub fn clear_selection(&mut self) -> Vec<ViewCommand> {
        let mut commands = match self.selection.clear() {
            Some(event) => Self::selection_commands(&event),
            None => return Vec::new(),
        };
        commands.push(ViewCommand::ShowInfo(self.selection_text(false)));
        commands
    }

    // ========================================================================
    // Visibility
    // ========================================================================

    /// Show or hide every track of one activity type (the per-type
    /// checkboxes). Hidden tracks are excluded from hit-testing.
    pub fn set_type_visible(&mut self, activity_type: ActivityType, visible: bool) -> Vec<ViewCommand> {
        let ids: Vec<ActivityId> = self
            .registry
            .draw_order()
            .iter()
            .filter(|id| {
                self.registry
                    .get(id)
                    .map(|t| t.activity_type == activity_type)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        self.apply_visibility(&ids, visible)
    }

    /// Show or hide every track (the show-all / hide-all buttons).
    pub fn set_all_visible(&mut self, visible: bool) -> Vec<ViewCommand> {
        let ids = self.registry.draw_order().to_vec();
        self.apply_visibility(&ids, visible)
    }

    fn apply_visibility(&mut self, ids: &[ActivityId], visible: bool) -> Vec<ViewCommand> {
        let mut commands = Vec::new();
        for id in ids {
            if self.registry.set_visible(id, visible) == Some(!visible) {
                commands.push(ViewCommand::SetTrackVisible {
                    activity_id: id.clone(),
                    visible,
                });
            }
        }
        commands
    }

    // ========================================================================
    // Host Exports
    // ========================================================================

    /// Activity list entries in feed order, as JSON for the host UI.
    pub fn list_entries_json(&self) -> String {
        let entries: Vec<ListEntry> = self
            .store
            .records_in_order()
            .map(|r| {
                let mut label = format!(
                    "{} - {}",
                    nice_date(r.timestamp, false),
                    r.activity_type.short_name()
                );
                if let Some(city) = &r.city {
                    label.push_str(" - ");
                    label.push_str(city);
                }
                ListEntry {
                    id: r.id.clone(),
                    label,
                    activity_type: r.activity_type,
                }
            })
            .collect();
        serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn stats(&self) -> ViewStats {
        ViewStats {
            activity_count: self.store.len(),
            track_count: self.registry.len(),
            ready_track_count: self.registry.ready_count(),
            selected_count: self.selection.len(),
        }
    }

    pub fn store(&self) -> &ActivityStore {
        &self.store
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Clear-then-add single selection, per the single-select contract.
    fn select_only(&mut self, activity_id: &str) -> Vec<ViewCommand> {
        let mut commands = Vec::new();
        if let Some(event) = self.selection.clear() {
            commands.extend(Self::selection_commands(&event));
        }
        if let Some(event) = self.selection.add(activity_id) {
            commands.extend(Self::selection_commands(&event));
        }
        commands
    }

    /// Highlight and list-background refreshes for one selection event.
    /// This is the only place membership turns into highlight state.
    fn selection_commands(event: &SelectionEvent) -> Vec<ViewCommand> {
        let pair = |id: &ActivityId, on: bool| {
            [
                ViewCommand::SetHighlight {
                    activity_id: id.clone(),
                    on,
                },
                ViewCommand::SetListBackground {
                    activity_id: id.clone(),
                    on,
                },
            ]
        };

        match &event.change {
            SelectionChange::Added(id) => pair(id, true).to_vec(),
            SelectionChange::Removed(id) => pair(id, false).to_vec(),
            SelectionChange::Cleared(ids) => ids.iter().flat_map(|id| pair(id, false)).collect(),
        }
    }

    fn records_for(&self, ids: &[ActivityId]) -> Vec<&ActivityRecord> {
        ids.iter().filter_map(|id| self.store.get(id)).collect()
    }

    /// Summary of the current selection, members in selection order.
    fn selection_text(&self, include_day_of_week: bool) -> String {
        let records = self.records_for(self.selection.members());
        summarize(&records, include_day_of_week)
    }
}
