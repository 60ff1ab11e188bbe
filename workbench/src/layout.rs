use common::{id_type, EntityCollection, EntityKey};
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::data_files::HduId;
use crate::error::LayoutError;
use crate::marker::Marker;

id_type!(ViewerId);
id_type!(LayoutItemId);

pub const ROOT_CONTAINER_ID: LayoutItemId = LayoutItemId::from_u128(0x726f_6f74);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewer {
    pub id: ViewerId,
    pub hdu_ids: Vec<HduId>,
    pub pan_enabled: bool,
    pub zoom_enabled: bool,
    /// Preview viewers (`false`) are reused by the next file selection.
    pub keep_open: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<Marker>,
}

impl EntityKey<ViewerId> for Viewer {
    fn key(&self) -> &ViewerId {
        &self.id
    }
}

impl Viewer {
    pub fn new(hdu_ids: Vec<HduId>) -> Self {
        Self {
            id: ViewerId::unique(),
            hdu_ids,
            pan_enabled: true,
            zoom_enabled: true,
            keep_open: false,
            markers: Vec::new(),
        }
    }

    pub fn hdu_id(&self) -> Option<HduId> {
        self.hdu_ids.first().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitDirection {
    Up,
    Down,
    Left,
    Right,
}

impl SplitDirection {
    pub fn axis(self) -> ContainerDirection {
        match self {
            SplitDirection::Up | SplitDirection::Down => ContainerDirection::Column,
            SplitDirection::Left | SplitDirection::Right => ContainerDirection::Row,
        }
    }

    /// The new panel goes before the split one.
    pub fn is_leading(self) -> bool {
        matches!(self, SplitDirection::Up | SplitDirection::Left)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub id: LayoutItemId,
    pub viewer_ids: Vec<ViewerId>,
    pub selected_viewer_id: Option<ViewerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: LayoutItemId,
    pub direction: ContainerDirection,
    pub item_ids: Vec<LayoutItemId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayoutItem {
    Panel(Panel),
    Container(Container),
}

impl EntityKey<LayoutItemId> for LayoutItem {
    fn key(&self) -> &LayoutItemId {
        match self {
            LayoutItem::Panel(panel) => &panel.id,
            LayoutItem::Container(container) => &container.id,
        }
    }
}

impl LayoutItem {
    pub fn as_panel(&self) -> Option<&Panel> {
        match self {
            LayoutItem::Panel(panel) => Some(panel),
            LayoutItem::Container(_) => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            LayoutItem::Container(container) => Some(container),
            LayoutItem::Panel(_) => None,
        }
    }
}

/// Viewers and the panel/container tree that arranges them.
#[derive(Debug, Clone)]
pub struct LayoutState {
    pub viewers: EntityCollection<ViewerId, Viewer>,
    pub items: EntityCollection<LayoutItemId, LayoutItem>,
    pub focused_panel_id: Option<LayoutItemId>,
}

impl Default for LayoutState {
    fn default() -> Self {
        let mut items = EntityCollection::default();
        items.add_many([LayoutItem::Container(Container {
            id: ROOT_CONTAINER_ID,
            direction: ContainerDirection::Row,
            item_ids: Vec::new(),
        })]);
        Self {
            viewers: EntityCollection::default(),
            items,
            focused_panel_id: None,
        }
    }
}

impl LayoutState {
    pub fn viewer(&self, viewer_id: &ViewerId) -> Option<&Viewer> {
        self.viewers.get_by_id(viewer_id)
    }

    pub fn panel(&self, panel_id: &LayoutItemId) -> Option<&Panel> {
        self.items.get_by_id(panel_id)?.as_panel()
    }

    pub fn container(&self, container_id: &LayoutItemId) -> Option<&Container> {
        self.items.get_by_id(container_id)?.as_container()
    }

    fn panel_mut(&mut self, panel_id: &LayoutItemId) -> Option<&mut Panel> {
        match self.items.get_by_id_mut(panel_id)? {
            LayoutItem::Panel(panel) => Some(panel),
            LayoutItem::Container(_) => None,
        }
    }

    fn container_mut(&mut self, container_id: &LayoutItemId) -> Option<&mut Container> {
        match self.items.get_by_id_mut(container_id)? {
            LayoutItem::Container(container) => Some(container),
            LayoutItem::Panel(_) => None,
        }
    }

    pub fn panels(&self) -> impl Iterator<Item = &Panel> {
        self.items.iter().filter_map(LayoutItem::as_panel)
    }

    pub fn panel_of(&self, viewer_id: &ViewerId) -> Option<LayoutItemId> {
        self.panels()
            .find(|panel| panel.viewer_ids.contains(viewer_id))
            .map(|panel| panel.id)
    }

    pub fn parent_of(&self, item_id: &LayoutItemId) -> Option<LayoutItemId> {
        self.items
            .iter()
            .filter_map(LayoutItem::as_container)
            .find(|container| container.item_ids.contains(item_id))
            .map(|container| container.id)
    }

    pub fn focused_panel(&self) -> Option<&Panel> {
        self.panel(self.focused_panel_id.as_ref()?)
    }

    pub fn focused_viewer_id(&self) -> Option<ViewerId> {
        self.focused_panel()?
            .selected_viewer_id
            .filter(|viewer_id| self.viewers.contains(viewer_id))
    }

    pub fn focused_viewer(&self) -> Option<&Viewer> {
        self.viewer(&self.focused_viewer_id()?)
    }

    /// Selected viewer of every panel, in panel order.
    pub fn visible_viewer_ids(&self) -> Vec<ViewerId> {
        self.panels()
            .filter_map(|panel| panel.selected_viewer_id)
            .filter(|viewer_id| self.viewers.contains(viewer_id))
            .collect()
    }

    /// Adds `viewer` to `panel_id`, or to the focused panel when that is not a
    /// panel. The first viewer ever created gets a fresh panel under the root.
    pub fn create_viewer(&mut self, viewer: Viewer, panel_id: Option<LayoutItemId>) -> LayoutItemId {
        let panel_id = match panel_id.filter(|id| self.panel(id).is_some()) {
            Some(panel_id) => panel_id,
            None => match self
                .focused_panel()
                .or_else(|| self.panels().next())
                .map(|panel| panel.id)
            {
                Some(panel_id) => panel_id,
                None => {
                    let panel_id = LayoutItemId::unique();
                    self.items.add_many([LayoutItem::Panel(Panel {
                        id: panel_id,
                        viewer_ids: Vec::new(),
                        selected_viewer_id: None,
                    })]);
                    if let Some(root) = self.container_mut(&ROOT_CONTAINER_ID) {
                        root.item_ids.push(panel_id);
                    }
                    self.focused_panel_id = Some(panel_id);
                    panel_id
                }
            },
        };

        let viewer_id = viewer.id;
        self.viewers.add_many([viewer]);
        if let Some(panel) = self.panel_mut(&panel_id) {
            panel.viewer_ids.push(viewer_id);
            panel.selected_viewer_id.get_or_insert(viewer_id);
        }
        panel_id
    }

    pub fn set_viewer_hdus(&mut self, viewer_id: &ViewerId, hdu_ids: Vec<HduId>) -> Result<(), LayoutError> {
        if self.viewers.update_one(viewer_id, |viewer| viewer.hdu_ids = hdu_ids) {
            Ok(())
        } else {
            Err(LayoutError::UnknownViewer(*viewer_id))
        }
    }

    /// Selects the viewer in its panel and focuses that panel.
    pub fn focus_viewer(&mut self, viewer_id: &ViewerId) -> Result<LayoutItemId, LayoutError> {
        let panel_id = self
            .panel_of(viewer_id)
            .ok_or(LayoutError::OrphanViewer(*viewer_id))?;
        if let Some(panel) = self.panel_mut(&panel_id) {
            panel.selected_viewer_id = Some(*viewer_id);
        }
        self.focused_panel_id = Some(panel_id);
        Ok(panel_id)
    }

    pub fn keep_viewer_open(&mut self, viewer_id: &ViewerId) -> Result<(), LayoutError> {
        if self.viewers.update_one(viewer_id, |viewer| viewer.keep_open = true) {
            Ok(())
        } else {
            Err(LayoutError::UnknownViewer(*viewer_id))
        }
    }

    /// Returns false when the markers were already equal.
    pub fn set_viewer_markers(&mut self, viewer_id: &ViewerId, markers: Vec<Marker>) -> bool {
        match self.viewers.get_by_id_mut(viewer_id) {
            Some(viewer) if viewer.markers != markers => {
                viewer.markers = markers;
                true
            }
            _ => false,
        }
    }

    pub fn clear_viewer_markers(&mut self) {
        self.viewers.iter_mut().for_each(|viewer| viewer.markers.clear());
    }

    /// Removes the viewer. An emptied panel is removed from the tree,
    /// otherwise the neighbour at the same index becomes selected.
    pub fn close_viewer(&mut self, viewer_id: &ViewerId) -> Result<Viewer, LayoutError> {
        let viewer = self
            .viewers
            .remove_one(viewer_id)
            .ok_or(LayoutError::UnknownViewer(*viewer_id))?;

        let Some(panel_id) = self.panel_of(viewer_id) else {
            return Ok(viewer);
        };
        let mut emptied = false;
        if let Some(panel) = self.panel_mut(&panel_id) {
            let index = panel.viewer_ids.iter().position(|id| id == viewer_id).unwrap_or(0);
            panel.viewer_ids.retain(|id| id != viewer_id);
            if panel.viewer_ids.is_empty() {
                panel.selected_viewer_id = None;
                emptied = true;
            } else if panel.selected_viewer_id == Some(*viewer_id) {
                let index = index.min(panel.viewer_ids.len() - 1);
                panel.selected_viewer_id = Some(panel.viewer_ids[index]);
            }
        }
        if emptied {
            self.remove_item(&panel_id)?;
        }
        Ok(viewer)
    }

    /// Moves the viewer out of a multi-viewer panel into a new panel placed on
    /// the requested side. Returns the new panel, which becomes focused.
    pub fn split_viewer_panel(
        &mut self,
        viewer_id: &ViewerId,
        direction: SplitDirection,
    ) -> Result<LayoutItemId, LayoutError> {
        let source_panel_id = self
            .panel_of(viewer_id)
            .ok_or(LayoutError::OrphanViewer(*viewer_id))?;
        let parent_id = self
            .parent_of(&source_panel_id)
            .ok_or(LayoutError::OrphanItem(source_panel_id))?;
        if self
            .panel(&source_panel_id)
            .is_some_and(|panel| panel.viewer_ids.len() <= 1)
        {
            return Err(LayoutError::SingleViewerPanel(source_panel_id));
        }

        let new_panel_id = LayoutItemId::unique();
        self.items.add_many([LayoutItem::Panel(Panel {
            id: new_panel_id,
            viewer_ids: vec![*viewer_id],
            selected_viewer_id: Some(*viewer_id),
        })]);
        if let Some(source) = self.panel_mut(&source_panel_id) {
            source.viewer_ids.retain(|id| id != viewer_id);
            source.selected_viewer_id = source.viewer_ids.first().copied();
        }

        let axis = direction.axis();
        let wrapper_id = LayoutItemId::unique();
        let parent = self
            .container_mut(&parent_id)
            .ok_or(LayoutError::UnknownItem(parent_id))?;
        let index = parent
            .item_ids
            .iter()
            .position(|id| *id == source_panel_id)
            .ok_or(LayoutError::OrphanItem(source_panel_id))?;

        if parent.direction == axis {
            let at = if direction.is_leading() { index } else { index + 1 };
            parent.item_ids.insert(at, new_panel_id);
        } else {
            parent.item_ids[index] = wrapper_id;
            let item_ids = if direction.is_leading() {
                vec![new_panel_id, source_panel_id]
            } else {
                vec![source_panel_id, new_panel_id]
            };
            self.items.add_many([LayoutItem::Container(Container {
                id: wrapper_id,
                direction: axis,
                item_ids,
            })]);
        }

        self.focused_panel_id = Some(new_panel_id);
        Ok(new_panel_id)
    }

    /// Inserts `source_viewer_id` at the position of `target_viewer_id` and
    /// selects it there.
    pub fn move_viewer(
        &mut self,
        source_viewer_id: &ViewerId,
        target_viewer_id: &ViewerId,
    ) -> Result<(), LayoutError> {
        let source_panel_id = self
            .panel_of(source_viewer_id)
            .ok_or(LayoutError::OrphanViewer(*source_viewer_id))?;
        let target_panel_id = self
            .panel_of(target_viewer_id)
            .ok_or(LayoutError::OrphanViewer(*target_viewer_id))?;

        let position_in = |state: &LayoutState, panel_id: &LayoutItemId, viewer_id: &ViewerId| {
            state
                .panel(panel_id)
                .and_then(|panel| panel.viewer_ids.iter().position(|id| id == viewer_id))
                .ok_or(LayoutError::OrphanViewer(*viewer_id))
        };
        let target_index = position_in(self, &target_panel_id, target_viewer_id)?;
        let mut source_index = position_in(self, &source_panel_id, source_viewer_id)?;

        if let Some(target) = self.panel_mut(&target_panel_id) {
            target.viewer_ids.insert(target_index, *source_viewer_id);
            target.selected_viewer_id = Some(*source_viewer_id);
        }
        if source_panel_id == target_panel_id && target_index <= source_index {
            source_index += 1;
        }

        let mut emptied = false;
        if let Some(source) = self.panel_mut(&source_panel_id) {
            source.viewer_ids.remove(source_index);
            if source.viewer_ids.is_empty() {
                emptied = true;
            } else if source_panel_id != target_panel_id {
                let index = source_index.saturating_sub(1).min(source.viewer_ids.len() - 1);
                source.selected_viewer_id = Some(source.viewer_ids[index]);
            }
        }
        if emptied {
            self.remove_item(&source_panel_id)?;
        }
        Ok(())
    }

    /// Removes a panel or non-root container with everything under it and
    /// collapses containers left with a single child. Returns the viewers that
    /// were closed along the way.
    pub fn remove_item(&mut self, item_id: &LayoutItemId) -> Result<Vec<Viewer>, LayoutError> {
        if *item_id == ROOT_CONTAINER_ID {
            return Err(LayoutError::RootNotRemovable);
        }
        if !self.items.contains(item_id) {
            return Err(LayoutError::UnknownItem(*item_id));
        }

        let subtree = self.subtree(item_id);
        let viewer_ids: Vec<ViewerId> = subtree
            .iter()
            .filter_map(|id| self.panel(id))
            .flat_map(|panel| panel.viewer_ids.iter().copied())
            .collect();
        let closed = self.viewers.remove_many(&viewer_ids);

        if self
            .focused_panel_id
            .is_some_and(|focused| subtree.contains(&focused))
        {
            let next_focus = self
                .panels()
                .find(|panel| !subtree.contains(&panel.id))
                .map(|panel| panel.id);
            self.focused_panel_id = next_focus;
        }

        let parent_id = self.parent_of(item_id);
        self.items.remove_many(&subtree);
        if let Some(parent_id) = parent_id {
            if let Some(parent) = self.container_mut(&parent_id) {
                parent.item_ids.retain(|id| id != item_id);
            }
            self.collapse(parent_id);
        }

        Ok(closed)
    }

    /// Replaces a non-root container holding a single child with that child,
    /// dropping empty ones, up to the root.
    fn collapse(&mut self, mut container_id: LayoutItemId) {
        while container_id != ROOT_CONTAINER_ID {
            let Some(children) = self.container(&container_id).map(|c| c.item_ids.clone()) else {
                return;
            };
            let Some(grandparent_id) = self.parent_of(&container_id) else {
                return;
            };
            let replacement = match children.as_slice() {
                [] => None,
                [only] => Some(*only),
                _ => return,
            };

            if let Some(grandparent) = self.container_mut(&grandparent_id) {
                match replacement {
                    Some(child) => {
                        for id in grandparent.item_ids.iter_mut() {
                            if *id == container_id {
                                *id = child;
                            }
                        }
                    }
                    None => grandparent.item_ids.retain(|id| *id != container_id),
                }
            }
            self.items.remove_one(&container_id);
            container_id = grandparent_id;
        }
    }

    fn subtree(&self, item_id: &LayoutItemId) -> Vec<LayoutItemId> {
        let mut result = vec![*item_id];
        let mut idx = 0;
        while idx < result.len() {
            if let Some(container) = self.container(&result[idx]) {
                result.extend(container.item_ids.iter().copied());
            }
            idx += 1;
        }
        result
    }

    /// Checks the tree invariants: every item except the root sits in
    /// exactly one container reachable from the root, non-root containers
    /// hold at least two children and every viewer lives in exactly one panel.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.container(&ROOT_CONTAINER_ID).is_none() {
            return Err(LayoutError::UnknownItem(ROOT_CONTAINER_ID));
        }

        let mut parents: HashMap<LayoutItemId, usize> = HashMap::new();
        for container in self.items.iter().filter_map(LayoutItem::as_container) {
            if container.id != ROOT_CONTAINER_ID && container.item_ids.len() < 2 {
                return Err(LayoutError::UncollapsedContainer(container.id));
            }
            for child in container.item_ids.iter() {
                if !self.items.contains(child) {
                    return Err(LayoutError::UnknownItem(*child));
                }
                *parents.entry(*child).or_default() += 1;
            }
        }

        for item_id in self.items.ids() {
            let count = parents.get(&item_id).copied().unwrap_or(0);
            match (item_id == ROOT_CONTAINER_ID, count) {
                (true, 0) | (false, 1) => {}
                (false, 0) => return Err(LayoutError::OrphanItem(item_id)),
                (_, parents) => return Err(LayoutError::SharedItem { item_id, parents }),
            }
        }

        let reachable: HashSet<LayoutItemId> = self.subtree(&ROOT_CONTAINER_ID).into_iter().collect();
        if let Some(item_id) = self.items.ids().into_iter().find(|id| !reachable.contains(id)) {
            return Err(LayoutError::OrphanItem(item_id));
        }

        let mut placements: HashMap<ViewerId, usize> = HashMap::new();
        for panel in self.panels() {
            for viewer_id in panel.viewer_ids.iter() {
                if !self.viewers.contains(viewer_id) {
                    return Err(LayoutError::UnknownViewer(*viewer_id));
                }
                *placements.entry(*viewer_id).or_default() += 1;
            }
        }
        if let Some(viewer_id) = self
            .viewers
            .ids()
            .into_iter()
            .find(|id| placements.get(id).copied() != Some(1))
        {
            return Err(LayoutError::OrphanViewer(viewer_id));
        }

        Ok(())
    }
}
