//! Dirty-flag render pool.
//!
//! A layer holds named drawables painted in insertion order. `render()` is
//! a no-op until someone calls `changed()`; an entry that returns `Err` is
//! logged and skipped so the rest of the pass still paints. Other
//! subsystems hook the pass through `on_before_render` / `on_render`.

use indexmap::IndexMap;
use log::{error, trace};

pub type Drawable<C> = Box<dyn FnMut(&mut C) -> anyhow::Result<()> + Send>;
pub type Listener<C> = Box<dyn FnMut(&mut C) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub struct RenderLayer<C> {
    name: String,
    entries: IndexMap<String, Drawable<C>>,
    changed: bool,
    before_render: Vec<(ListenerId, Listener<C>)>,
    on_render: Vec<(ListenerId, Listener<C>)>,
    next_listener: u64,
    destroyed: bool,
}

impl<C> std::fmt::Debug for RenderLayer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderLayer")
            .field("name", &self.name)
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .field("changed", &self.changed)
            .finish()
    }
}

impl<C> RenderLayer<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: IndexMap::new(),
            changed: false,
            before_render: Vec::new(),
            on_render: Vec::new(),
            next_listener: 1,
            destroyed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add or replace an entry. A replaced entry keeps its paint position.
    pub fn add<F>(&mut self, id: impl Into<String>, drawable: F)
    where
        F: FnMut(&mut C) -> anyhow::Result<()> + Send + 'static,
    {
        self.entries.insert(id.into(), Box::new(drawable));
        self.changed = true;
    }

    pub fn add_many(&mut self, drawables: impl IntoIterator<Item = (String, Drawable<C>)>) {
        self.entries.extend(drawables);
        self.changed = true;
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let removed = self.entries.shift_remove(id).is_some();
        if removed {
            self.changed = true;
        }
        removed
    }

    pub fn has(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Request a repaint on the next `render()`.
    pub fn changed(&mut self) {
        self.changed = true;
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Paint all entries if the layer is dirty. Returns whether a pass ran.
    pub fn render(&mut self, target: &mut C) -> bool {
        if !self.changed || self.destroyed {
            return false;
        }

        for (_, listener) in self.before_render.iter_mut() {
            listener(target);
        }
        for (id, drawable) in self.entries.iter_mut() {
            if let Err(err) = drawable(target) {
                error!("Layer '{}': entry '{}' failed: {:#}", self.name, id, err);
            }
        }
        for (_, listener) in self.on_render.iter_mut() {
            listener(target);
        }

        self.changed = false;
        trace!("Layer '{}' rendered {} entries", self.name, self.entries.len());
        true
    }

    pub fn on_before_render<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&mut C) + Send + 'static,
    {
        let id = self.listener_id();
        self.before_render.push((id, Box::new(listener)));
        id
    }

    pub fn on_render<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&mut C) + Send + 'static,
    {
        let id = self.listener_id();
        self.on_render.push((id, Box::new(listener)));
        id
    }

    /// Release a listener registered with either hook.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.before_render.len() + self.on_render.len();
        self.before_render.retain(|(lid, _)| *lid != id);
        self.on_render.retain(|(lid, _)| *lid != id);
        before != self.before_render.len() + self.on_render.len()
    }

    /// Drop all entries; listeners stay.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.changed = true;
    }

    /// Drop entries and listeners. Further renders are no-ops.
    pub fn destroy(&mut self) {
        self.entries.clear();
        self.before_render.clear();
        self.on_render.clear();
        self.changed = false;
        self.destroyed = true;
    }

    fn listener_id(&mut self) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        id
    }
}
