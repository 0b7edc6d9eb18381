//! Per-reader setting values, relevance bits and the mapping-switch cache.
//!
//! The cache holds the current value of every setting plus, per switch,
//! the case index it last resolved to. Invalidation is coarse: writing a
//! *mapping-relevant* setting clears every cached switch case in one pass.
//! A parallel pair of relevance bitsets (one bit for mapping, one for
//! rewrite conditions) makes irrelevant setting writes free.

use crate::cache::{Bitset256, NUM_SLOTS};
use crate::condition;
use crate::error::{Error, Result};
use crate::font::Font;

/// Which consumers a setting write may have affected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SettingChange {
    /// Some mapping switch reads the setting; mapping caches built on top
    /// of this font should be invalidated.
    pub mapping: bool,
    /// Some rewrite condition reads the setting; testers should resync.
    pub rewrites: bool,
}

/// Per-reader settings state. Owns no font data; every lookup takes the
/// font it was created for.
pub struct SettingsCache {
    font_id: u64,
    num_settings: u8,
    num_switches: u8,
    values: [u8; NUM_SLOTS],
    option_counts: [u8; NUM_SLOTS],
    mapping_relevant: Bitset256,
    rewrite_relevant: Bitset256,
    switch_cached: Bitset256,
    switch_cases: [u8; NUM_SLOTS],
}

impl SettingsCache {
    /// Creates the cache with every setting at its first option.
    pub fn new(font: &Font) -> Self {
        let settings = font.settings();
        let mapping = font.mapping();
        let rewrites = font.rewrites();

        let mut cache = Self {
            font_id: font.header().font_id(),
            num_settings: settings.num_settings(),
            num_switches: mapping.num_switches(),
            values: [0; NUM_SLOTS],
            option_counts: [0; NUM_SLOTS],
            mapping_relevant: Bitset256::default(),
            rewrite_relevant: Bitset256::default(),
            switch_cached: Bitset256::default(),
            switch_cases: [0; NUM_SLOTS],
        };
        for setting in 0..cache.num_settings {
            cache.option_counts[setting as usize] =
                settings.num_options(setting).unwrap_or(0);
        }
        for switch in 0..cache.num_switches {
            for &setting in mapping.switch_settings(switch).unwrap_or(&[]) {
                cache.mapping_relevant.set(setting);
            }
        }
        for nth in 0..rewrites.num_conditions() {
            if let Some(data) = rewrites.condition_data(nth) {
                condition::mark_settings(data, &mut |setting| {
                    cache.rewrite_relevant.set(setting);
                });
            }
        }
        cache
    }

    pub fn num_settings(&self) -> u8 {
        self.num_settings
    }

    /// Current values of every setting, indexed by setting.
    pub fn values(&self) -> &[u8] {
        &self.values[..self.num_settings as usize]
    }

    /// Current value of a setting.
    ///
    /// Panics when the setting doesn't exist.
    pub fn value(&self, setting: u8) -> u8 {
        assert!(setting < self.num_settings, "setting out of range");
        self.values[setting as usize]
    }

    pub fn setting_affects_mapping(&self, setting: u8) -> bool {
        self.mapping_relevant.get(setting)
    }

    pub fn setting_affects_rewrites(&self, setting: u8) -> bool {
        self.rewrite_relevant.get(setting)
    }

    /// Sets a setting to one of its options and reports which consumers
    /// the write may have affected. Writing the current value reports
    /// nothing.
    ///
    /// Panics when the setting or option is out of range; that's a caller
    /// bug, not a font defect.
    pub fn set(&mut self, setting: u8, value: u8) -> SettingChange {
        assert!(setting < self.num_settings, "setting out of range");
        assert!(
            value < self.option_counts[setting as usize],
            "option out of range",
        );
        if self.values[setting as usize] == value {
            return SettingChange::default();
        }
        self.values[setting as usize] = value;
        let change = SettingChange {
            mapping: self.mapping_relevant.get(setting),
            rewrites: self.rewrite_relevant.get(setting),
        };
        if change.mapping {
            // coarse: one pass drops every cached switch outcome
            self.switch_cached.clear_all();
        }
        change
    }

    /// Resolves the active case of a mapping switch, consulting the cache
    /// first. The case is the mixed-radix combination of the referenced
    /// settings' current values.
    pub fn switch_case(&mut self, font: &Font, switch: u8) -> Result<u8> {
        debug_assert_eq!(self.font_id, font.header().font_id(), "invalid internal state");
        if switch >= self.num_switches {
            return Err(Error::InvalidArgument("mapping switch index"));
        }
        if self.switch_cached.get(switch) {
            return Ok(self.switch_cases[switch as usize]);
        }
        let mapping = font.mapping();
        let settings = mapping
            .switch_settings(switch)
            .ok_or(Error::InvalidArgument("mapping switch index"))?;
        let mut case = 0u32;
        for &setting in settings {
            if setting >= self.num_settings {
                return Err(Error::InvalidSection("mapping switches"));
            }
            case = case * self.option_counts[setting as usize] as u32
                + self.values[setting as usize] as u32;
        }
        let case = case as u8;
        self.switch_cases[switch as usize] = case;
        self.switch_cached.set(switch);
        Ok(case)
    }

    /// Evaluates a rewrite condition against the current values.
    pub fn eval_condition(&self, font: &Font, nth: u8) -> Result<bool> {
        debug_assert_eq!(self.font_id, font.header().font_id(), "invalid internal state");
        font.rewrites().eval_condition(nth, self.values())
    }
}
