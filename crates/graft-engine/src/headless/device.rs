use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::coords::ViewportSize;
use crate::native::{NativeHandle, ViewDimension};
use crate::renderer::TextureFormat;

/// What a software native object stands for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ObjectKind {
    Device,
    DeviceContext,
    GlContext,
    NativeGlContext,
    Texture {
        size: ViewportSize,
        format: TextureFormat,
    },
    ColorView {
        resource: NativeHandle,
        dimension: ViewDimension,
    },
    DepthView {
        resource: NativeHandle,
    },
}

#[derive(Debug)]
struct Object {
    kind: ObjectKind,
    refs: u32,
}

#[derive(Debug, Default)]
struct ObjectTable {
    next: usize,
    objects: HashMap<NativeHandle, Object>,
    acquired: usize,
    released: usize,
}

/// Reference-counted software object table shared by a headless host and
/// the headless renderer drawing into it.
///
/// Creators hold one base reference that is not part of the acquire/release
/// accounting; every referenced handle returned to the interop layer counts as
/// an acquisition and every `release` as a release.
#[derive(Debug, Clone, Default)]
pub struct HeadlessDevice {
    table: Arc<Mutex<ObjectTable>>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, ObjectTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates an object holding its creator's base reference.
    pub fn create(&self, kind: ObjectKind) -> NativeHandle {
        let mut table = self.table();
        table.next += 1;
        let raw = table.next;
        let handle =
            NativeHandle::from_raw(raw).unwrap_or_else(|| unreachable!("object ids start at 1"));
        table.objects.insert(handle, Object { kind, refs: 1 });
        handle
    }

    /// Drops the creator's base reference.
    pub fn retire(&self, handle: NativeHandle) {
        let mut table = self.table();
        let gone = match table.objects.get_mut(&handle) {
            Some(object) => {
                object.refs = object.refs.saturating_sub(1);
                object.refs == 0
            }
            None => {
                log::warn!("retiring unknown object {handle}");
                false
            }
        };
        if gone {
            table.objects.remove(&handle);
        }
    }

    /// Hands out one counted reference.
    pub fn add_ref(&self, handle: NativeHandle) -> NativeHandle {
        let mut table = self.table();
        if let Some(object) = table.objects.get_mut(&handle) {
            object.refs += 1;
        }
        table.acquired += 1;
        handle
    }

    /// Gives back one counted reference; returns the remaining count.
    pub fn release(&self, handle: NativeHandle) -> u32 {
        let mut table = self.table();
        table.released += 1;
        let remaining = match table.objects.get_mut(&handle) {
            Some(object) => {
                object.refs = object.refs.saturating_sub(1);
                object.refs
            }
            None => {
                log::warn!("releasing unknown object {handle}");
                return 0;
            }
        };
        if remaining == 0 {
            table.objects.remove(&handle);
        }
        remaining
    }

    pub fn kind(&self, handle: NativeHandle) -> Option<ObjectKind> {
        self.table().objects.get(&handle).map(|object| object.kind)
    }

    #[inline]
    pub fn is_live(&self, handle: NativeHandle) -> bool {
        self.kind(handle).is_some()
    }

    pub fn live_objects(&self) -> usize {
        self.table().objects.len()
    }

    pub fn acquired(&self) -> usize {
        self.table().acquired
    }

    pub fn released(&self) -> usize {
        self.table().released
    }

    /// Counted references currently held outside the table.
    pub fn outstanding(&self) -> usize {
        let table = self.table();
        table.acquired.saturating_sub(table.released)
    }

    pub fn is_balanced(&self) -> bool {
        let table = self.table();
        table.acquired == table.released
    }
}
