use ggfnt::rewrite::rule::RulePattern;
use ggfnt::{
    AlphaMask, Font, FontBuilder, GlyphRef, GlyphTester, MaskRect, SettingsCache,
    Utf8Tester,
};

/// Font with five glyphs, a "ligatures" setting, one conditioned glyph
/// rule, one unconditional glyph rule over a set, and a utf8 rule.
fn rewrite_font() -> (Font, Vec<u64>) {
    let mut builder = FontBuilder::new().unwrap();
    builder.set_ascent(2, 0);
    let mut glyph_mask = AlphaMask::new(MaskRect::new(0, -1, 1, 0));
    glyph_mask.set(0, -1, 255);
    let uids: Vec<u64> = (0..5)
        .map(|_| builder.add_glyph(&glyph_mask).unwrap())
        .collect();

    builder.add_setting("ligatures", &["off", "on"]).unwrap();
    let ligatures_on = builder.add_rewrite_condition("#0 == 1").unwrap();

    // conditioned: glyphs 1,2 fuse into glyph 3 when ligatures are on
    builder
        .add_glyph_rule(
            ligatures_on,
            &[],
            &[
                RulePattern::Literal(GlyphRef::Uid(uids[1])),
                RulePattern::Literal(GlyphRef::Uid(uids[2])),
            ],
            &[],
            &[GlyphRef::Uid(uids[3])],
        )
        .unwrap();
    // unconditional: any glyph of the set followed by glyph 0 collapses
    // to glyph 4
    let set = builder.add_glyph_set(&[uids[1], uids[2]]).unwrap();
    builder
        .add_glyph_rule(
            0xFF,
            &[],
            &[
                RulePattern::Set(set),
                RulePattern::Literal(GlyphRef::Uid(uids[0])),
            ],
            &[],
            &[GlyphRef::Uid(uids[4])],
        )
        .unwrap();

    builder
        .add_utf8_rule(
            0xFF,
            &[],
            &[RulePattern::Literal('f'), RulePattern::Literal('i')],
            &[],
            &['ﬁ'],
        )
        .unwrap();

    let font = builder.build().unwrap();
    (font, uids)
}

fn run_glyphs(tester: &mut GlyphTester, input: &[u16]) -> Vec<u16> {
    let mut output = Vec::new();
    tester.begin_sequence();
    for &glyph in input {
        tester.feed(glyph, |out| output.push(out));
    }
    tester.finish_sequence(|out| output.push(out));
    output
}

#[test]
fn font_rules_load_into_a_tester() {
    let (font, _) = rewrite_font();
    let rewrites = font.rewrites();
    assert_eq!(rewrites.num_glyph_rules(), 2);
    assert_eq!(rewrites.num_utf8_rules(), 1);
    assert_eq!(rewrites.num_glyph_sets(), 1);
    assert_eq!(rewrites.num_conditions(), 1);

    let settings = SettingsCache::new(&font);
    let mut tester = GlyphTester::new();
    for nth in 0..rewrites.num_glyph_rules() {
        tester.add_rule(rewrites.glyph_rule(nth).unwrap()).unwrap();
    }
    assert!(tester.needs_resync());
    tester.resync(&font, &settings).unwrap();
    assert!(!tester.needs_resync());

    // ligatures default to off: only the set rule applies
    assert_eq!(run_glyphs(&mut tester, &[1, 2]), vec![1, 2]);
    assert_eq!(run_glyphs(&mut tester, &[1, 0]), vec![4]);
    assert_eq!(run_glyphs(&mut tester, &[2, 0, 3]), vec![4, 3]);
}

#[test]
fn conditions_gate_rules_on_settings() {
    let (font, _) = rewrite_font();
    let mut settings = SettingsCache::new(&font);
    let rewrites = font.rewrites();
    let mut tester = GlyphTester::new();
    for nth in 0..rewrites.num_glyph_rules() {
        tester.add_rule(rewrites.glyph_rule(nth).unwrap()).unwrap();
    }
    tester.resync(&font, &settings).unwrap();
    assert_eq!(run_glyphs(&mut tester, &[1, 2]), vec![1, 2]);

    let change = settings.set(0, 1);
    assert!(change.rewrites);
    tester.notify_settings_changed();
    assert!(tester.needs_resync());
    tester.resync(&font, &settings).unwrap();
    assert_eq!(run_glyphs(&mut tester, &[1, 2]), vec![3]);
    // the conditioned ligature rule and the set rule coexist
    assert_eq!(run_glyphs(&mut tester, &[1, 0, 1, 2]), vec![4, 3]);

    settings.set(0, 0);
    tester.notify_settings_changed();
    tester.resync(&font, &settings).unwrap();
    assert_eq!(run_glyphs(&mut tester, &[1, 2]), vec![1, 2]);
}

#[test]
fn utf8_rules_from_the_font() {
    let (font, _) = rewrite_font();
    let settings = SettingsCache::new(&font);
    let mut tester = Utf8Tester::new();
    tester
        .add_rule(font.rewrites().utf8_rule(0).unwrap())
        .unwrap();
    tester.resync(&font, &settings).unwrap();

    let mut output = String::new();
    tester.begin_sequence();
    for ch in "fig fish if".chars() {
        tester.feed(ch, |out| output.push(out));
    }
    tester.finish_sequence(|out| output.push(out));
    assert_eq!(output, "ﬁg ﬁsh if");
}

#[test]
fn chunked_feeding_matches_one_shot_through_font_rules() {
    let (font, _) = rewrite_font();
    let mut settings = SettingsCache::new(&font);
    settings.set(0, 1); // both rules active
    let rewrites = font.rewrites();

    let run = |input: &[u16], chunk: usize| -> Vec<u16> {
        let mut tester = GlyphTester::new();
        for nth in 0..rewrites.num_glyph_rules() {
            tester.add_rule(rewrites.glyph_rule(nth).unwrap()).unwrap();
        }
        tester.resync(&font, &settings).unwrap();
        let mut output = Vec::new();
        tester.begin_sequence();
        for piece in input.chunks(chunk) {
            for &glyph in piece {
                tester.feed(glyph, |out| output.push(out));
            }
        }
        tester.finish_sequence(|out| output.push(out));
        output
    };

    let input: Vec<u16> = (0..60).map(|nth| [0, 1, 2, 1, 0, 3][nth % 6]).collect();
    let whole = run(&input, input.len());
    for chunk in [1, 2, 3, 7] {
        assert_eq!(run(&input, chunk), whole, "chunk size {chunk}");
    }
}

#[test]
fn rule_accessors_expose_the_wire_form() {
    let (font, _) = rewrite_font();
    let rule = font.rewrites().glyph_rule(0).unwrap();
    assert_eq!(rule.condition(), 0);
    assert_eq!(rule.head_len(), 0);
    assert_eq!(rule.body_len(), 2);
    assert_eq!(rule.tail_len(), 0);
    assert_eq!(rule.out_len(), 1);
    assert_eq!(rule.output(0), Some(3));

    let set = font.rewrites().glyph_set(0).unwrap();
    assert!(set.contains(1));
    assert!(set.contains(2));
    assert!(!set.contains(3));
    // glyphs 1 and 2 are consecutive, so the builder packed them as one
    // range
    assert_eq!(set.normalized_ranges(), vec![(1, 2)]);
}
