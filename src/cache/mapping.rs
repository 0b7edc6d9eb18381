//! Fixed-capacity LRU cache over resolved code-point mappings.
//!
//! Records are intrusively linked through slot indices, so promotion and
//! eviction never allocate. Each record carries a *drop signature*: the
//! cache's generation counter at the time it was stored. Incrementing the
//! counter ([`MappingCache::invalidate`]) therefore invalidates every
//! record in O(1); a stale record found on lookup is revalidated against
//! the switch cache and refreshed for free when its case didn't actually
//! change.

use rustc_hash::FxHashMap;

use crate::cache::settings::SettingsCache;
use crate::font::mapping::{
    direct_group_at, group_record_at, GlyphMappingGroup, MappingEntry,
    SWITCH_TYPE_DIRECT, SWITCH_TYPE_GROUP,
};
use crate::font::Font;

const NO_SLOT: u16 = u16::MAX;

/// Hard cap on the cache capacity.
pub const MAX_MAPPING_CACHE_SIZE: u16 = 65000;

struct Slot {
    code_point: i32,
    signature: u32,
    prev: u16,
    next: u16,
    switch_type: u8,
    case: u8,
    entry_offset: u32,
    group_offset: u32,
}

/// Per-reader LRU over `code point -> glyph mapping group` resolutions.
pub struct MappingCache {
    font_id: u64,
    generation: u32,
    capacity: u16,
    slots: Vec<Slot>,
    index: FxHashMap<i32, u16>,
    head: u16,
    tail: u16,
}

impl MappingCache {
    /// Creates a cache with a fixed slot capacity.
    ///
    /// Panics when the capacity is zero or above
    /// [`MAX_MAPPING_CACHE_SIZE`]; that's a caller bug.
    pub fn new(font: &Font, capacity: u16) -> Self {
        assert!(
            capacity >= 1 && capacity <= MAX_MAPPING_CACHE_SIZE,
            "mapping cache capacity out of range",
        );
        Self {
            font_id: font.header().font_id(),
            generation: 0,
            capacity,
            slots: Vec::new(),
            index: FxHashMap::default(),
            head: NO_SLOT,
            tail: NO_SLOT,
        }
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Drops every cached resolution in O(1) by bumping the generation
    /// counter. Call after a mapping-relevant setting write.
    pub fn invalidate(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Resolves a code point through the cache. Misses and stale entries
    /// fall back to the font and the switch cache.
    pub fn lookup<'f>(
        &mut self,
        font: &'f Font,
        settings: &mut SettingsCache,
        code_point: i32,
    ) -> Option<GlyphMappingGroup<'f>> {
        debug_assert_eq!(self.font_id, font.header().font_id(), "invalid internal state");
        if let Some(&slot_index) = self.index.get(&code_point) {
            if !self.refresh(font, settings, slot_index) {
                return None;
            }
            self.touch(slot_index);
            return self.group_of(font, slot_index);
        }

        let entry = font.mapping().lookup(code_point)?;
        let slot = self.resolve(font, settings, &entry)?;
        let slot_index = self.store(slot);
        self.touch(slot_index);
        self.group_of(font, slot_index)
    }

    /// Brings a stale slot up to the current generation, re-resolving it
    /// when its switch case actually changed. Returns false when the font
    /// data backing the slot turned out unreadable.
    fn refresh(&mut self, font: &Font, settings: &mut SettingsCache, slot_index: u16) -> bool {
        let slot = &mut self.slots[slot_index as usize];
        if slot.signature == self.generation {
            return true;
        }
        match slot.switch_type {
            // settings can't change these outcomes: free refresh
            SWITCH_TYPE_DIRECT | SWITCH_TYPE_GROUP => {
                slot.signature = self.generation;
                true
            }
            switch => {
                let case = match settings.switch_case(font, switch) {
                    Ok(case) => case,
                    Err(_) => return false,
                };
                if case != slot.case {
                    let entry = MappingEntry::at_offset(
                        font,
                        slot.entry_offset as usize,
                        slot.code_point,
                    );
                    let (group_offset, _) = match entry.group_offset(case) {
                        Some(located) => located,
                        None => return false,
                    };
                    slot.case = case;
                    slot.group_offset = group_offset as u32;
                }
                slot.signature = self.generation;
                true
            }
        }
    }

    fn resolve(
        &mut self,
        font: &Font,
        settings: &mut SettingsCache,
        entry: &MappingEntry,
    ) -> Option<Slot> {
        let switch_type = entry.switch_type();
        let case = match switch_type {
            SWITCH_TYPE_DIRECT | SWITCH_TYPE_GROUP => 0,
            switch => settings.switch_case(font, switch).ok()?,
        };
        let (group_offset, _) = entry.group_offset(case)?;
        Some(Slot {
            code_point: entry.code_point(),
            signature: self.generation,
            prev: NO_SLOT,
            next: NO_SLOT,
            switch_type,
            case,
            entry_offset: entry.offset() as u32,
            group_offset: group_offset as u32,
        })
    }

    fn group_of<'f>(&self, font: &'f Font, slot_index: u16) -> Option<GlyphMappingGroup<'f>> {
        let slot = &self.slots[slot_index as usize];
        if slot.switch_type == SWITCH_TYPE_DIRECT {
            direct_group_at(font, slot.group_offset as usize)
        } else {
            group_record_at(font, slot.group_offset as usize).map(|(group, _)| group)
        }
    }

    /// Stores a new slot, reassigning the least-recently-used one when the
    /// cache is full. Returns the slot index.
    fn store(&mut self, slot: Slot) -> u16 {
        if (self.slots.len() as u16) < self.capacity {
            let slot_index = self.slots.len() as u16;
            self.index.insert(slot.code_point, slot_index);
            self.slots.push(slot);
            self.attach_front(slot_index);
            return slot_index;
        }
        let slot_index = self.tail;
        debug_assert_ne!(slot_index, NO_SLOT, "invalid internal state");
        self.detach(slot_index);
        let evicted = core::mem::replace(&mut self.slots[slot_index as usize], slot);
        self.index.remove(&evicted.code_point);
        self.index.insert(self.slots[slot_index as usize].code_point, slot_index);
        self.attach_front(slot_index);
        slot_index
    }

    /// Moves a slot to the most-recently-used position.
    fn touch(&mut self, slot_index: u16) {
        if self.head == slot_index {
            return;
        }
        self.detach(slot_index);
        self.attach_front(slot_index);
    }

    fn detach(&mut self, slot_index: u16) {
        let (prev, next) = {
            let slot = &self.slots[slot_index as usize];
            (slot.prev, slot.next)
        };
        if prev != NO_SLOT {
            self.slots[prev as usize].next = next;
        } else if self.head == slot_index {
            self.head = next;
        }
        if next != NO_SLOT {
            self.slots[next as usize].prev = prev;
        } else if self.tail == slot_index {
            self.tail = prev;
        }
        let slot = &mut self.slots[slot_index as usize];
        slot.prev = NO_SLOT;
        slot.next = NO_SLOT;
    }

    fn attach_front(&mut self, slot_index: u16) {
        let old_head = self.head;
        {
            let slot = &mut self.slots[slot_index as usize];
            slot.prev = NO_SLOT;
            slot.next = old_head;
        }
        if old_head != NO_SLOT {
            self.slots[old_head as usize].prev = slot_index;
        }
        self.head = slot_index;
        if self.tail == NO_SLOT {
            self.tail = slot_index;
        }
    }
}
