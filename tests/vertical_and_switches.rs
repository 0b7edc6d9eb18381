use ggfnt::font::glyphs::GlyphPlacement;
use ggfnt::font::mapping::GroupFlags;
use ggfnt::{AlphaMask, Font, FontBuilder, MaskRect, SettingsCache};

fn dot_mask() -> AlphaMask {
    let mut glyph_mask = AlphaMask::new(MaskRect::new(0, -1, 1, 0));
    glyph_mask.set(0, -1, 255);
    glyph_mask
}

#[test]
fn vertical_layout_carries_full_placements() {
    let mut builder = FontBuilder::new().unwrap();
    builder.set_ascent(2, 0);
    builder.set_vert_layout(true);
    builder.set_vert_line_width(5);
    let uid = builder.add_glyph(&dot_mask()).unwrap();
    builder
        .set_glyph_placement(
            uid,
            GlyphPlacement { advance: 4, top_advance: 2, bottom_advance: 3, horz_center: 1 },
        )
        .unwrap();
    builder.map('.', uid).unwrap();
    let font = builder.build().unwrap();

    assert!(font.metrics().has_vert_layout());
    assert_eq!(font.metrics().vert_line_width(), 5);
    assert_eq!(
        font.glyphs().placement(0).unwrap(),
        GlyphPlacement { advance: 4, top_advance: 2, bottom_advance: 3, horz_center: 1 },
    );
    // the mask still decodes with the extra placement bytes in front
    assert_eq!(font.glyphs().decode_mask(0).unwrap(), dot_mask());

    // round trip with the 4-byte placements
    let mut file = Vec::new();
    font.export(&mut file).unwrap();
    assert_eq!(Font::parse(&file[..]).unwrap(), font);
}

#[test]
fn monospace_width_is_enforced() {
    let mut builder = FontBuilder::new().unwrap();
    builder.set_ascent(2, 0);
    builder.set_mono_width(6);
    let uid = builder.add_glyph(&dot_mask()).unwrap();
    // add_glyph defaulted to the mono width
    assert!(builder
        .set_glyph_placement(uid, GlyphPlacement { advance: 6, ..Default::default() })
        .is_ok());
    assert_eq!(
        builder
            .set_glyph_placement(uid, GlyphPlacement { advance: 3, ..Default::default() })
            .unwrap_err(),
        ggfnt::Error::MonoWidthViolated,
    );
}

/// Two settings (2 x 3 options) behind one switch: the case index is the
/// mixed-radix combination with the first setting most significant.
#[test]
fn mixed_radix_switch_cases() {
    let mut builder = FontBuilder::new().unwrap();
    builder.set_ascent(2, 0);
    let uids: Vec<u64> = (0..6).map(|_| builder.add_glyph(&dot_mask()).unwrap()).collect();
    builder.add_setting("weight", &["regular", "bold"]).unwrap();
    builder.add_setting("slant", &["none", "italic", "backslant"]).unwrap();
    let switch = builder.add_mapping_switch(&[0, 1]).unwrap();
    let cases: Vec<(Vec<u64>, GroupFlags)> = uids
        .iter()
        .map(|&uid| (vec![uid], GroupFlags::empty()))
        .collect();
    builder.map_switched('x', switch, &cases).unwrap();
    let font = builder.build().unwrap();

    assert_eq!(font.mapping().switch_case_count(0), Some(6));
    assert_eq!(font.mapping().switch_settings(0), Some(&[0u8, 1][..]));

    let mut settings = SettingsCache::new(&font);
    let entry = font.mapping().lookup('x' as i32).unwrap();
    for weight in 0..2u8 {
        for slant in 0..3u8 {
            settings.set(0, weight);
            settings.set(1, slant);
            let expected_case = weight * 3 + slant;
            assert_eq!(settings.switch_case(&font, 0).unwrap(), expected_case);
            assert_eq!(
                entry.resolve(&font, &mut settings).unwrap().first(),
                expected_case as u16,
                "weight {weight} slant {slant}",
            );
        }
    }
}

#[test]
fn switched_entries_expose_every_case() {
    let mut builder = FontBuilder::new().unwrap();
    builder.set_ascent(2, 0);
    let first = builder.add_glyph(&dot_mask()).unwrap();
    let second = builder.add_glyph(&dot_mask()).unwrap();
    builder.add_setting("style", &["plain", "fancy"]).unwrap();
    let switch = builder.add_mapping_switch(&[0]).unwrap();
    builder
        .map_switched(
            'y',
            switch,
            &[
                (vec![first], GroupFlags::empty()),
                (vec![first, second], GroupFlags::SEQUENTIAL),
            ],
        )
        .unwrap();
    let font = builder.build().unwrap();

    let entry = font.mapping().lookup('y' as i32).unwrap();
    assert_eq!(entry.num_cases(), 2);
    let plain = entry.group(0).unwrap();
    assert_eq!(plain.len(), 1);
    assert_eq!(plain.first(), 0);
    let fancy = entry.group(1).unwrap();
    assert_eq!(fancy.len(), 2);
    assert_eq!(fancy.flags(), GroupFlags::SEQUENTIAL);
    assert_eq!(fancy.iter().collect::<Vec<_>>(), vec![0, 1]);
    assert!(entry.group(2).is_none());
}

#[test]
fn single_glyph_animation_groups_are_rejected() {
    let mut builder = FontBuilder::new().unwrap();
    builder.set_ascent(2, 0);
    let first = builder.add_glyph(&dot_mask()).unwrap();
    let second = builder.add_glyph(&dot_mask()).unwrap();
    // the single-group entry form requires 2..=128 glyphs
    assert_eq!(
        builder
            .map_group('g', &[first], GroupFlags::empty())
            .unwrap_err(),
        ggfnt::Error::InvalidArgument("glyph group size"),
    );
    builder
        .map_group('g', &[first, second], GroupFlags::empty())
        .unwrap();
    // switched-entry cases may still hold single glyphs
    builder.add_setting("style", &["plain", "fancy"]).unwrap();
    let switch = builder.add_mapping_switch(&[0]).unwrap();
    builder
        .map_switched(
            'h',
            switch,
            &[
                (vec![first], GroupFlags::empty()),
                (vec![second], GroupFlags::empty()),
            ],
        )
        .unwrap();
    let font = builder.build().unwrap();
    let mut settings = SettingsCache::new(&font);
    let entry = font.mapping().lookup('h' as i32).unwrap();
    assert_eq!(entry.resolve(&font, &mut settings).unwrap().len(), 1);
}

#[test]
fn mapping_iterators_walk_in_order() {
    let mut builder = FontBuilder::new().unwrap();
    builder.set_ascent(2, 0);
    let uid = builder.add_glyph(&dot_mask()).unwrap();
    for code_point in ['m', 'a', 'z'] {
        builder.map(code_point, uid).unwrap();
    }
    builder.set_glyph_name(uid, "dot").unwrap();
    let font = builder.build().unwrap();

    let code_points: Vec<i32> =
        font.mapping().iter().map(|entry| entry.code_point()).collect();
    assert_eq!(code_points, vec!['a' as i32, 'm' as i32, 'z' as i32]);
    let names: Vec<&str> = font.glyphs().named_glyphs().map(|(_, name)| name).collect();
    assert_eq!(names, vec!["dot"]);
}
