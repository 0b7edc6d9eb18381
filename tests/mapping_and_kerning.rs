use ggfnt::font::mapping::GroupFlags;
use ggfnt::{AlphaMask, Font, FontBuilder, MappingCache, MaskRect, SettingsCache};

/// Font with four glyphs, a two-option "style" setting and a switched
/// mapping for 'a' (plain style -> glyph 0, fancy style -> glyph 1).
fn switched_font() -> Font {
    let mut builder = FontBuilder::new().unwrap();
    builder.set_ascent(2, 0);
    let mut glyph_mask = AlphaMask::new(MaskRect::new(0, -1, 1, 0));
    glyph_mask.set(0, -1, 255);
    let plain = builder.add_glyph(&glyph_mask).unwrap();
    let fancy = builder.add_glyph(&glyph_mask).unwrap();
    let anim_a = builder.add_glyph(&glyph_mask).unwrap();
    let anim_b = builder.add_glyph(&glyph_mask).unwrap();

    builder.add_setting("style", &["plain", "fancy"]).unwrap();
    let switch = builder.add_mapping_switch(&[0]).unwrap();
    builder
        .map_switched(
            'a',
            switch,
            &[
                (vec![plain], GroupFlags::empty()),
                (vec![fancy], GroupFlags::empty()),
            ],
        )
        .unwrap();
    builder.map('b', plain).unwrap();
    builder
        .map_group('c', &[anim_a, anim_b], GroupFlags::LOOPABLE)
        .unwrap();

    builder.set_horz_kerning(plain, fancy, -2).unwrap();
    builder.set_vert_kerning(fancy, plain, 3).unwrap();
    builder.build().unwrap()
}

#[test]
fn switched_mapping_follows_settings() {
    let font = switched_font();
    let mut settings = SettingsCache::new(&font);

    let entry = font.mapping().lookup('a' as i32).unwrap();
    assert_eq!(entry.num_cases(), 2);
    assert_eq!(entry.resolve(&font, &mut settings).unwrap().first(), 0);

    let change = settings.set(0, 1);
    assert!(change.mapping);
    assert!(!change.rewrites);
    assert_eq!(entry.resolve(&font, &mut settings).unwrap().first(), 1);

    // direct entries don't care about settings
    let entry = font.mapping().lookup('b' as i32).unwrap();
    assert_eq!(entry.resolve(&font, &mut settings).unwrap().first(), 0);

    assert!(font.mapping().lookup('z' as i32).is_none());
}

#[test]
fn groups_carry_flags_and_glyphs() {
    let font = switched_font();
    let mut settings = SettingsCache::new(&font);
    let entry = font.mapping().lookup('c' as i32).unwrap();
    let group = entry.resolve(&font, &mut settings).unwrap();
    assert_eq!(group.len(), 2);
    assert_eq!(group.flags(), GroupFlags::LOOPABLE);
    // glyphs 2 and 3 were added consecutively
    assert_eq!(group.iter().collect::<Vec<_>>(), vec![2, 3]);
}

#[test]
fn switch_cache_matches_uncached_evaluation() {
    let font = switched_font();
    let mut cached = SettingsCache::new(&font);
    // oracle: recompute the mixed-radix case from scratch every time
    let oracle = |value: u8| value;

    for sequence in [[0u8, 1, 1, 0], [1u8, 0, 1, 1]] {
        for value in sequence {
            cached.set(0, value);
            assert_eq!(cached.switch_case(&font, 0).unwrap(), oracle(value));
            // hitting the cache twice returns the same case
            assert_eq!(cached.switch_case(&font, 0).unwrap(), oracle(value));
        }
    }
}

#[test]
fn irrelevant_settings_cost_nothing() {
    let mut builder = FontBuilder::new().unwrap();
    builder.set_ascent(2, 0);
    let mut glyph_mask = AlphaMask::new(MaskRect::new(0, -1, 1, 0));
    glyph_mask.set(0, -1, 255);
    let uid = builder.add_glyph(&glyph_mask).unwrap();
    builder.map('x', uid).unwrap();
    builder.add_setting("used", &["off", "on"]).unwrap();
    builder.add_setting("unused", &["off", "on"]).unwrap();
    builder.add_mapping_switch(&[0]).unwrap();
    let font = builder.build().unwrap();

    let mut settings = SettingsCache::new(&font);
    assert!(settings.setting_affects_mapping(0));
    assert!(!settings.setting_affects_mapping(1));
    let change = settings.set(1, 1);
    assert!(!change.mapping);
    assert!(!change.rewrites);
}

#[test]
fn mapping_cache_resolves_and_invalidates() {
    let font = switched_font();
    let mut settings = SettingsCache::new(&font);
    let mut cache = MappingCache::new(&font, 8);

    assert_eq!(cache.lookup(&font, &mut settings, 'a' as i32).unwrap().first(), 0);
    assert_eq!(cache.lookup(&font, &mut settings, 'b' as i32).unwrap().first(), 0);
    assert_eq!(cache.len(), 2);
    assert!(cache.lookup(&font, &mut settings, 'z' as i32).is_none());

    // cached result stays correct across an invalidation with no change
    cache.invalidate();
    assert_eq!(cache.lookup(&font, &mut settings, 'a' as i32).unwrap().first(), 0);

    // a real settings change re-resolves the switched entry
    let change = settings.set(0, 1);
    assert!(change.mapping);
    cache.invalidate();
    assert_eq!(cache.lookup(&font, &mut settings, 'a' as i32).unwrap().first(), 1);
    assert_eq!(cache.lookup(&font, &mut settings, 'b' as i32).unwrap().first(), 0);
    assert_eq!(cache.len(), 2);
}

#[test]
fn mapping_cache_evicts_least_recently_used() {
    let font = switched_font();
    let mut settings = SettingsCache::new(&font);
    let mut cache = MappingCache::new(&font, 2);

    cache.lookup(&font, &mut settings, 'a' as i32).unwrap();
    cache.lookup(&font, &mut settings, 'b' as i32).unwrap();
    // touch 'a' so 'b' is the least recently used
    cache.lookup(&font, &mut settings, 'a' as i32).unwrap();
    cache.lookup(&font, &mut settings, 'c' as i32).unwrap();
    assert_eq!(cache.len(), 2);
    // 'b' was evicted but still resolves through the font
    assert_eq!(cache.lookup(&font, &mut settings, 'b' as i32).unwrap().first(), 0);
}

#[test]
fn cached_lookups_agree_with_uncached_ones() {
    let font = switched_font();
    let mut cached_settings = SettingsCache::new(&font);
    let mut plain_settings = SettingsCache::new(&font);
    let mut cache = MappingCache::new(&font, 4);

    for value in [0u8, 1, 0, 0, 1] {
        cached_settings.set(0, value);
        plain_settings.set(0, value);
        cache.invalidate();
        for code_point in ['a', 'b', 'c'] {
            let through_cache = cache
                .lookup(&font, &mut cached_settings, code_point as i32)
                .unwrap()
                .first();
            let direct = font
                .mapping()
                .lookup(code_point as i32)
                .unwrap()
                .resolve(&font, &mut plain_settings)
                .unwrap()
                .first();
            assert_eq!(through_cache, direct, "code point {code_point:?}");
        }
    }
}

#[test]
fn lookups_scale_past_toy_sizes() {
    let mut builder = FontBuilder::new().unwrap();
    builder.set_ascent(2, 0);
    let mut glyph_mask = AlphaMask::new(MaskRect::new(0, -1, 1, 0));
    glyph_mask.set(0, -1, 255);
    let uids: Vec<u64> = (0..300)
        .map(|_| builder.add_glyph(&glyph_mask).unwrap())
        .collect();
    // map every other code point in a contiguous block
    for nth in 0..200u32 {
        let code_point = char::from_u32(0x100 + nth * 2).unwrap();
        builder.map(code_point, uids[nth as usize % 300]).unwrap();
    }
    for nth in 0..50u16 {
        builder
            .set_horz_kerning(
                uids[nth as usize],
                uids[(nth as usize + 1) % 300],
                (nth % 5) as i8 - 2,
            )
            .unwrap();
    }
    let font = builder.build().unwrap();
    let mut settings = SettingsCache::new(&font);
    let mut cache = MappingCache::new(&font, 64);

    assert_eq!(font.mapping().num_entries(), 200);
    for nth in 0..200u32 {
        let mapped = 0x100 + nth * 2;
        let entry = font.mapping().lookup(mapped as i32).unwrap();
        assert_eq!(
            entry.resolve(&font, &mut settings).unwrap().first(),
            (nth % 300) as u16,
        );
        // the odd code points in between are unmapped
        assert!(font.mapping().lookup(mapped as i32 + 1).is_none());
        // the cache agrees and stays within capacity
        assert_eq!(
            cache.lookup(&font, &mut settings, mapped as i32).unwrap().first(),
            (nth % 300) as u16,
        );
    }
    assert_eq!(cache.len(), 64);

    let kerning = font.kerning();
    // every fifth value lands on zero and is dropped
    assert_eq!(kerning.num_horz_pairs(), 40);
    for nth in 0..50u16 {
        let expected = (nth % 5) as i8 - 2;
        assert_eq!(kerning.horz(nth, nth + 1), expected);
    }
}

#[test]
fn kerning_pairs_resolve_and_default_to_zero() {
    let font = switched_font();
    let kerning = font.kerning();
    assert_eq!(kerning.num_horz_pairs(), 1);
    assert_eq!(kerning.num_vert_pairs(), 1);
    assert_eq!(kerning.horz(0, 1), -2);
    assert_eq!(kerning.vert(1, 0), 3);
    assert_eq!(kerning.horz(1, 0), 0);
    assert_eq!(kerning.vert(0, 1), 0);
    assert_eq!(kerning.horz_pair_at(0), Some((0, 1, -2)));
    assert_eq!(kerning.vert_pair_at(0), Some((1, 0, 3)));
    assert_eq!(kerning.horz_pair_at(1), None);
}
