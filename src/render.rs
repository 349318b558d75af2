//! Turns parsed month documents into a tree of display entries.
//!
//! Every node lives in one arena (`RenderTree`); remote sections get a
//! reserved `Slot` node that is filled when the referenced file arrives,
//! so late results land in the same visual position they were declared in.

use crate::date::DateController;
use crate::models::ModelRef;
use crate::snapshot::{Detail, FieldValue, Section, is_index_key, label, title_case};
use std::collections::BTreeMap;

pub type NodeId = usize;

/// Group layout, chosen by `(nested, has_info)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Flat,
    FlatWithInfo,
    NestedContainer,
    NestedWithInfo,
}

impl Template {
    pub fn select(nested: bool, has_info: bool) -> Self {
        match (nested, has_info) {
            (false, false) => Template::Flat,
            (false, true) => Template::FlatWithInfo,
            (true, false) => Template::NestedContainer,
            (true, true) => Template::NestedWithInfo,
        }
    }

    pub fn is_nested(self) -> bool {
        matches!(self, Template::NestedContainer | Template::NestedWithInfo)
    }

    pub fn has_info(self) -> bool {
        matches!(self, Template::FlatWithInfo | Template::NestedWithInfo)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryValue {
    Empty,
    Amount(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueLabel {
    pub month: u32,
    pub day: u32,
    /// Due date when the entry tracks payment, closing date otherwise.
    pub due: bool,
}

impl DueLabel {
    pub fn text(&self) -> String {
        let kind = if self.due { "Due Date" } else { "Closing Date" };
        format!("{kind} : {}/{}", self.month, self.day)
    }
}

/// Where an entry lives inside the document that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    pub model: ModelRef,
    /// Keys from the model scope down to the entry's container.
    pub path: Vec<String>,
}

impl Origin {
    pub fn new(model: ModelRef) -> Self {
        Self {
            model,
            path: Vec::new(),
        }
    }

    fn child(&self, key: &str) -> Self {
        let mut path = self.path.clone();
        path.push(key.to_string());
        Self {
            model: self.model.clone(),
            path,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    /// Display label; empty for anonymous (index-keyed) entries.
    pub key: String,
    /// Lookup class used for merging; empty for anonymous entries.
    pub key_class: String,
    pub key_name: String,
    pub value: EntryValue,
    pub info: Option<String>,
    pub nested: bool,
    pub due: Option<DueLabel>,
    pub paid: Option<bool>,
    pub link: Option<String>,
    pub removable: bool,
    pub origin: Origin,
    /// Document that supplied the due-date metadata, if any.
    pub schedule_origin: Option<Origin>,
}

impl FieldEntry {
    fn new(key_name: &str, origin: Origin) -> Self {
        let anonymous = is_index_key(key_name);
        Self {
            key: if anonymous { String::new() } else { label(key_name) },
            key_class: if anonymous { String::new() } else { key_name.to_string() },
            key_name: key_name.to_string(),
            value: EntryValue::Empty,
            info: None,
            nested: false,
            due: None,
            paid: None,
            link: None,
            removable: anonymous,
            origin,
            schedule_origin: None,
        }
    }

    /// Machine-readable amount consumed by the calculations.
    pub fn numeric(&self) -> Option<f64> {
        match self.value {
            EntryValue::Amount(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.key_class.is_empty()
    }

    pub fn display_value(&self, currency: &str) -> String {
        match &self.value {
            EntryValue::Amount(value) => format!("{currency}{value}"),
            EntryValue::Text(text) => text.clone(),
            EntryValue::Empty => String::new(),
        }
    }

    /// Label text, title-cased when the entry renders as a link.
    pub fn display_key(&self) -> String {
        if self.link.is_some() {
            title_case(&self.key)
        } else {
            self.key.clone()
        }
    }

    fn decoration_only(&self) -> bool {
        !self.nested && self.value == EntryValue::Empty
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Section(Section),
    Group {
        name: String,
        title: String,
        template: Template,
        accepts_notes: bool,
    },
    Field(FieldEntry),
    Slot {
        key: String,
        file: String,
        resolved: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderNode {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Default)]
pub struct RenderTree {
    nodes: Vec<RenderNode>,
    sections: BTreeMap<Section, NodeId>,
}

impl RenderTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.sections.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&RenderNode> {
        self.nodes.get(id)
    }

    pub fn entry(&self, id: NodeId) -> Option<&FieldEntry> {
        match self.nodes.get(id).map(|node| &node.kind) {
            Some(NodeKind::Field(entry)) => Some(entry),
            _ => None,
        }
    }

    pub fn entry_mut(&mut self, id: NodeId) -> Option<&mut FieldEntry> {
        match self.nodes.get_mut(id).map(|node| &mut node.kind) {
            Some(NodeKind::Field(entry)) => Some(entry),
            _ => None,
        }
    }

    pub fn section_root(&self, section: Section) -> Option<NodeId> {
        self.sections.get(&section).copied()
    }

    /// Rendered sections in display order.
    pub fn sections(&self) -> impl Iterator<Item = (Section, NodeId)> + '_ {
        self.sections.iter().map(|(section, id)| (*section, *id))
    }

    fn ensure_section(&mut self, section: Section) -> NodeId {
        if let Some(id) = self.section_root(section) {
            return id;
        }
        let id = self.push(None, NodeKind::Section(section));
        self.sections.insert(section, id);
        id
    }

    fn push(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(RenderNode {
            parent,
            children: Vec::new(),
            kind,
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(id);
        }
        id
    }

    /// Removes a node from its parent, pruning containers left empty.
    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes[id].parent.take() else {
            return;
        };
        self.nodes[parent].children.retain(|child| *child != id);
        let prunable = match &self.nodes[parent].kind {
            NodeKind::Group { .. } => true,
            NodeKind::Field(entry) => entry.nested,
            _ => false,
        };
        if prunable && self.nodes[parent].children.is_empty() {
            self.detach(parent);
        }
    }

    /// All nodes below `id`, depth first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .nodes
            .get(id)
            .map(|node| node.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next].children.iter().rev());
        }
        out
    }

    /// Entries rendered under a section, depth first.
    pub fn fields_in(&self, section: Section) -> Vec<(NodeId, &FieldEntry)> {
        let Some(root) = self.section_root(section) else {
            return Vec::new();
        };
        self.descendants(root)
            .into_iter()
            .filter_map(|id| self.entry(id).map(|entry| (id, entry)))
            .collect()
    }

    /// Full-precision sum of every numeric entry in a section.
    pub fn sum(&self, section: Section) -> f64 {
        self.fields_in(section)
            .into_iter()
            .filter_map(|(_, entry)| entry.numeric())
            .fold(0.0, |acc, value| acc + value)
    }

    pub fn section_of(&self, mut id: NodeId) -> Option<Section> {
        loop {
            let node = self.nodes.get(id)?;
            if let NodeKind::Section(section) = node.kind {
                return Some(section);
            }
            id = node.parent?;
        }
    }

    pub fn groups_in(&self, section: Section) -> Vec<NodeId> {
        let Some(root) = self.section_root(section) else {
            return Vec::new();
        };
        self.descendants(root)
            .into_iter()
            .filter(|id| matches!(self.nodes[*id].kind, NodeKind::Group { .. }))
            .collect()
    }

    pub fn set_accepts_notes(&mut self, id: NodeId) {
        if let Some(NodeKind::Group { accepts_notes, .. }) = self.nodes.get_mut(id).map(|node| &mut node.kind) {
            *accepts_notes = true;
        }
    }

    fn find_group(&self, container: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[container].children.iter().copied().find(|child| {
            matches!(&self.nodes[*child].kind, NodeKind::Group { name: existing, .. } if existing == name)
        })
    }

    fn find_field(&self, container: NodeId, key_name: &str) -> Option<NodeId> {
        self.nodes[container]
            .children
            .iter()
            .copied()
            .find(|child| matches!(&self.nodes[*child].kind, NodeKind::Field(entry) if entry.key_name == key_name))
    }

    fn find_slot(&self, container: NodeId, file: &str) -> Option<NodeId> {
        self.nodes[container].children.iter().copied().find(|child| {
            matches!(&self.nodes[*child].kind, NodeKind::Slot { file: existing, .. } if existing == file)
        })
    }

    /// Named entry anywhere in the section that `container` belongs to.
    fn find_in_section(&self, container: NodeId, key_class: &str, pred: impl Fn(&FieldEntry) -> bool) -> Option<NodeId> {
        if key_class.is_empty() {
            return None;
        }
        let root = self.section_of(container).and_then(|section| self.section_root(section))?;
        self.descendants(root).into_iter().find(|id| {
            matches!(&self.nodes[*id].kind, NodeKind::Field(entry) if entry.key_class == key_class && pred(entry))
        })
    }
}

/// A remote reference discovered while rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    pub slot: NodeId,
    pub key: String,
    pub file: String,
}

/// One rendering pass over a section or a resolved slot.
pub struct Renderer<'a> {
    tree: &'a mut RenderTree,
    date: &'a DateController,
    requests: Vec<RemoteRequest>,
}

impl<'a> Renderer<'a> {
    pub fn new(tree: &'a mut RenderTree, date: &'a DateController) -> Self {
        Self {
            tree,
            date,
            requests: Vec::new(),
        }
    }

    /// Remote references that still need fetching.
    pub fn finish(self) -> Vec<RemoteRequest> {
        self.requests
    }

    pub fn render_section(&mut self, section: Section, value: &FieldValue, model: ModelRef) {
        let root = self.tree.ensure_section(section);
        self.render_body(root, section.key(), value, &Origin::new(model));
    }

    /// Renders a fetched remote fragment into its reserved slot.
    pub fn render_slot(&mut self, slot: NodeId, value: &FieldValue, origin: Origin) {
        let key = match self.tree.nodes.get_mut(slot).map(|node| &mut node.kind) {
            Some(NodeKind::Slot { key, resolved, .. }) => {
                *resolved = true;
                key.clone()
            }
            _ => return,
        };
        self.render_body(slot, &key, value, &origin);
    }

    fn render_body(&mut self, container: NodeId, key: &str, value: &FieldValue, origin: &Origin) {
        match value {
            FieldValue::Remote(file) => self.reserve(container, key, file),
            FieldValue::Nested(children) => {
                for (child_key, child) in children {
                    match child {
                        FieldValue::Remote(file) => self.reserve(container, child_key, file),
                        FieldValue::Nested(items) => {
                            self.render_group(container, child_key, items, origin.child(child_key))
                        }
                        leaf => self.render_leaf(container, child_key, leaf, origin),
                    }
                }
            }
            leaf => self.render_leaf(container, key, leaf, origin),
        }
    }

    fn reserve(&mut self, container: NodeId, key: &str, file: &str) {
        if self.tree.find_slot(container, file).is_some() {
            return;
        }
        let slot = self.tree.push(
            Some(container),
            NodeKind::Slot {
                key: key.to_string(),
                file: file.to_string(),
                resolved: false,
            },
        );
        self.requests.push(RemoteRequest {
            slot,
            key: key.to_string(),
            file: file.to_string(),
        });
    }

    fn render_group(&mut self, container: NodeId, name: &str, items: &[(String, FieldValue)], origin: Origin) {
        let nested = items
            .iter()
            .any(|(_, value)| matches!(value, FieldValue::Nested(_) | FieldValue::Remote(_)));
        let has_info = items.iter().any(|(_, value)| value.has_info());

        let mut group = self.tree.find_group(container, name);
        if let Some(id) = group {
            if let NodeKind::Group { template, .. } = &mut self.tree.nodes[id].kind {
                *template = Template::select(nested || template.is_nested(), has_info || template.has_info());
            }
        }

        for (key, value) in items {
            if self.merge_decoration(container, key, value, &origin) {
                continue;
            }
            let id = *group.get_or_insert_with(|| self.push_group(container, name, Template::select(nested, has_info)));
            match value {
                FieldValue::Remote(file) => self.reserve(id, key, file),
                FieldValue::Nested(children) => self.render_nested(id, key, children, origin.child(key)),
                leaf => self.render_leaf(id, key, leaf, &origin),
            }
        }

        // an empty category still shows, so notes can be added to it
        if items.is_empty() && group.is_none() {
            self.push_group(container, name, Template::Flat);
        }
    }

    fn push_group(&mut self, container: NodeId, name: &str, template: Template) -> NodeId {
        self.tree.push(
            Some(container),
            NodeKind::Group {
                name: name.to_string(),
                title: label(name),
                template,
                accepts_notes: false,
            },
        )
    }

    /// Entry flagged `nested` whose children render into its own container.
    fn render_nested(&mut self, container: NodeId, key: &str, children: &[(String, FieldValue)], origin: Origin) {
        let mut field = self.tree.find_field(container, key);
        for (child_key, child) in children {
            if self.merge_decoration(container, child_key, child, &origin) {
                continue;
            }
            let id = match field {
                Some(id) => id,
                None => {
                    let mut entry = FieldEntry::new(key, Origin {
                        model: origin.model.clone(),
                        path: origin.path[..origin.path.len().saturating_sub(1)].to_vec(),
                    });
                    entry.nested = true;
                    let id = self.tree.push(Some(container), NodeKind::Field(entry));
                    field = Some(id);
                    id
                }
            };
            match child {
                FieldValue::Remote(file) => self.reserve(id, child_key, file),
                FieldValue::Nested(grand) => self.render_nested(id, child_key, grand, origin.child(child_key)),
                leaf => self.render_leaf(id, child_key, leaf, &origin),
            }
        }
    }

    /// Pure due-date/link metadata decorates an entry that already exists
    /// anywhere in the section instead of rendering a new one.
    fn merge_decoration(&mut self, container: NodeId, key: &str, value: &FieldValue, origin: &Origin) -> bool {
        let FieldValue::Detail(detail) = value else {
            return false;
        };
        if detail.value.is_some() || is_index_key(key) {
            return false;
        }
        match self.tree.find_in_section(container, key, |entry| !entry.decoration_only()) {
            Some(target) => {
                self.decorate(target, detail, origin);
                true
            }
            None => false,
        }
    }

    fn render_leaf(&mut self, container: NodeId, key: &str, value: &FieldValue, origin: &Origin) {
        if self.merge_decoration(container, key, value, origin) {
            return;
        }

        let id = match self.tree.find_field(container, key) {
            Some(existing) => existing,
            None => {
                let mut entry = FieldEntry::new(key, origin.clone());
                if value.amount().is_some() {
                    // adopt metadata that arrived before the amount did
                    if let Some(orphan) = self.tree.find_in_section(container, key, FieldEntry::decoration_only) {
                        if let Some(previous) = self.tree.entry(orphan) {
                            entry.due = previous.due.clone();
                            entry.paid = previous.paid;
                            entry.link = previous.link.clone();
                            entry.schedule_origin = previous.schedule_origin.clone();
                        }
                        self.tree.detach(orphan);
                    }
                }
                self.tree.push(Some(container), NodeKind::Field(entry))
            }
        };

        match value {
            FieldValue::Number(amount) => self.set_value(id, EntryValue::Amount(*amount)),
            FieldValue::Text(text) => self.set_value(id, EntryValue::Text(text.clone())),
            FieldValue::Detail(detail) => {
                if let Some(amount) = detail.value {
                    self.set_value(id, EntryValue::Amount(amount));
                }
                self.decorate(id, detail, origin);
            }
            FieldValue::Nested(_) | FieldValue::Remote(_) => {}
        }
    }

    fn set_value(&mut self, id: NodeId, value: EntryValue) {
        if let Some(entry) = self.tree.entry_mut(id) {
            entry.value = value;
        }
    }

    fn decorate(&mut self, id: NodeId, detail: &Detail, origin: &Origin) {
        let schedule = &detail.schedule;
        let due = schedule.date.map(|day| DueLabel {
            month: self.date.due_month(schedule.next_month.unwrap_or(false)),
            day,
            due: schedule.paid.is_some(),
        });
        let Some(entry) = self.tree.entry_mut(id) else {
            return;
        };
        if let Some(info) = &detail.info {
            entry.info = Some(info.clone());
        }
        if due.is_some() {
            entry.due = due;
        }
        if schedule.paid.is_some() {
            entry.paid = schedule.paid;
            entry.schedule_origin = Some(origin.clone());
        }
        if let Some(link) = &schedule.link {
            entry.link = Some(link.clone());
        }
    }
}
