//! Prints a summary of a `.ggfnt` file.
//!
//! ```sh
//! cargo run --example inspect -- path/to/font.ggfnt
//! ```

use std::io::BufReader;

fn main() -> ggfnt::Result<()> {
    let path = std::env::args().nth(1).expect("usage: inspect <font.ggfnt>");
    let file = std::fs::File::open(&path).expect("can't open the font file");
    let font = ggfnt::Font::parse(BufReader::new(file))?;

    let header = font.header();
    println!(
        "{} v{}.{} (id {:016X})",
        header.name(),
        header.version_major(),
        header.version_minor(),
        header.font_id(),
    );
    if !header.family().is_empty() {
        println!("family: {}", header.family());
    }
    if !header.author().is_empty() {
        println!("author: {}", header.author());
    }

    let metrics = font.metrics();
    println!(
        "{} glyphs, ascent {}+{}, descent {}+{}{}",
        metrics.num_glyphs(),
        metrics.ascent(),
        metrics.extra_ascent(),
        metrics.descent(),
        metrics.extra_descent(),
        if metrics.has_vert_layout() { ", vertical layout" } else { "" },
    );

    let color = font.color();
    for section in 0..color.num_sections() {
        let (start, end) = color.section_range(section).unwrap_or((0, 0));
        println!(
            "color section {:?} ({}) {}..={}",
            color.section_name(section).unwrap_or("?"),
            if color.section_is_dye(section) { "dye" } else { "palette" },
            start,
            end,
        );
    }

    let settings = font.settings();
    for setting in 0..settings.num_settings() {
        let options: Vec<&str> = (0..settings.num_options(setting).unwrap_or(0))
            .filter_map(|option| settings.option_label(setting, option))
            .collect();
        println!(
            "setting {:?}: {}",
            settings.setting_name(setting).unwrap_or("?"),
            options.join(" | "),
        );
    }

    let named: Vec<&str> = font.glyphs().named_glyphs().map(|(_, name)| name).collect();
    if !named.is_empty() {
        println!("named glyphs: {}", named.join(", "));
    }

    let rewrites = font.rewrites();
    println!(
        "{} mapped code points, {} switches, {} glyph rules, {} utf8 rules, {}+{} kerning pairs",
        font.mapping().num_entries(),
        font.mapping().num_switches(),
        rewrites.num_glyph_rules(),
        rewrites.num_utf8_rules(),
        font.kerning().num_horz_pairs(),
        font.kerning().num_vert_pairs(),
    );
    Ok(())
}
