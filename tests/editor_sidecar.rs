use ggfnt::editor::{ClassKerningPair, GlyphCategory, KerningClass};
use ggfnt::{AlphaMask, Error, Font, FontBuilder, FontEditData, MaskRect};

fn small_font(num_glyphs: u16) -> Font {
    let mut builder = FontBuilder::new().unwrap();
    builder.set_ascent(2, 0);
    let mut glyph_mask = AlphaMask::new(MaskRect::new(0, -1, 1, 0));
    glyph_mask.set(0, -1, 255);
    let mut first = None;
    for _ in 0..num_glyphs {
        let uid = builder.add_glyph(&glyph_mask).unwrap();
        first.get_or_insert(uid);
    }
    builder.map(' ', first.unwrap()).unwrap();
    builder.build().unwrap()
}

#[test]
fn sidecar_round_trips() {
    let font = small_font(5);
    let mut edit = FontEditData::for_font(&font);
    edit.categories = vec![
        GlyphCategory { name: "letters".to_string(), size: 3 },
        GlyphCategory { name: "symbols".to_string(), size: 2 },
    ];
    edit.kerning_classes = vec![
        KerningClass { name: "tight".to_string(), value: -2 },
        KerningClass { name: "loose".to_string(), value: 1 },
    ];
    edit.horz_class_pairs = vec![
        ClassKerningPair { first: 0, second: 1, class: 1 },
        ClassKerningPair { first: 1, second: 2, class: 2 },
    ];
    edit.vert_class_pairs = vec![ClassKerningPair { first: 2, second: 0, class: 1 }];

    let mut file = Vec::new();
    edit.export(&mut file).unwrap();
    assert_eq!(&file[..6], b"wkgfnt");
    let reparsed = FontEditData::parse(&file[..], &font).unwrap();
    assert_eq!(reparsed, edit);
}

#[test]
fn sidecar_rejects_the_wrong_font() {
    let font = small_font(2);
    let other = small_font(2);
    assert_ne!(font.header().font_id(), other.header().font_id());

    let edit = FontEditData::for_font(&font);
    let mut file = Vec::new();
    edit.export(&mut file).unwrap();
    assert_eq!(
        FontEditData::parse(&file[..], &other).unwrap_err(),
        Error::EditDataIdMismatch,
    );
}

#[test]
fn sidecar_category_sizes_must_cover_the_font() {
    let font = small_font(4);
    let mut edit = FontEditData::for_font(&font);
    edit.categories = vec![GlyphCategory { name: "letters".to_string(), size: 3 }];
    let mut file = Vec::new();
    edit.export(&mut file).unwrap();
    assert_eq!(
        FontEditData::parse(&file[..], &font).unwrap_err(),
        Error::InvalidSection("categories"),
    );
}

#[test]
fn sidecar_rejects_zero_classes_in_pairs() {
    let font = small_font(2);
    let mut edit = FontEditData::for_font(&font);
    edit.kerning_classes = vec![KerningClass { name: "tight".to_string(), value: -1 }];
    edit.horz_class_pairs = vec![ClassKerningPair { first: 0, second: 1, class: 0 }];
    let mut file = Vec::new();
    edit.export(&mut file).unwrap();
    assert_eq!(
        FontEditData::parse(&file[..], &font).unwrap_err(),
        Error::InvalidSection("classed kerning pairs"),
    );
}
